//! The classified inventory: named aggregates over file records.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tidymac_core::{format_size, Category, SafetyLabel};

/// A single file inside an inventory item, kept for the cleaner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<SystemTime>,
}

/// A named aggregate produced by classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Display name; the cleaner selects items by this.
    pub name: String,
    /// Category of the item.
    pub category: Category,
    /// Representative path (the scanned root or artifact directory).
    pub path: PathBuf,
    /// Total bytes.
    pub bytes: u64,
    /// Number of contributing files.
    pub file_count: u64,
    /// Safety judgment.
    pub safety: SafetyLabel,
    /// Why this item is flagged.
    pub reason: String,
    /// Individual files, when the item is cleaned file-by-file. Empty for
    /// items removed as a whole subtree (the representative path is the
    /// removal unit then).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileEntry>,
}

impl InventoryItem {
    /// Formatted byte count ("9.77 MiB").
    pub fn bytes_formatted(&self) -> String {
        format_size(self.bytes)
    }

    /// Every path the cleaner would operate on.
    pub fn removal_paths(&self) -> Vec<&PathBuf> {
        if self.files.is_empty() {
            vec![&self.path]
        } else {
            self.files.iter().map(|f| &f.path).collect()
        }
    }
}

/// Ordered sequence of inventory items plus scan metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    /// Profile the scan ran under.
    pub profile: String,
    /// When the scan was performed.
    pub scanned_at: DateTime<Utc>,
    /// Scan duration in seconds.
    pub duration_secs: f64,
    /// Classified items, ordered Safe → Caution → Dangerous, each tier by
    /// descending bytes, ties by name.
    pub items: Vec<InventoryItem>,
    /// Sum of item bytes.
    pub total_reclaimable: u64,
    /// Sum of item file counts.
    pub total_files: u64,
    /// Non-fatal errors collected during the scan.
    pub errors: Vec<String>,
}

impl Inventory {
    /// An empty inventory for a profile.
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            scanned_at: Utc::now(),
            duration_secs: 0.0,
            items: Vec::new(),
            total_reclaimable: 0,
            total_files: 0,
            errors: Vec::new(),
        }
    }

    /// Re-derive the totals from the items.
    pub fn recalculate(&mut self) {
        self.total_reclaimable = self.items.iter().map(|i| i.bytes).sum();
        self.total_files = self.items.iter().map(|i| i.file_count).sum();
    }

    /// Apply the output ordering.
    pub fn sort_items(&mut self) {
        self.items.sort_by(|a, b| {
            a.safety
                .cmp(&b.safety)
                .then_with(|| b.bytes.cmp(&a.bytes))
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    /// Select items by name; `None` selects everything.
    pub fn select(&self, names: Option<&[String]>) -> Vec<&InventoryItem> {
        match names {
            None => self.items.iter().collect(),
            Some(names) => self
                .items
                .iter()
                .filter(|item| names.iter().any(|n| n == &item.name))
                .collect(),
        }
    }

    /// Items of a given safety label.
    pub fn by_safety(&self, label: SafetyLabel) -> impl Iterator<Item = &InventoryItem> {
        self.items.iter().filter(move |i| i.safety == label)
    }
}
