//! The four-stage duplicate reduction.
//!
//! Stage 1 partitions by exact byte size and discards singletons. Stage 2
//! regroups the survivors by a SHA-256 digest of the first 4 KiB (files
//! smaller than the prefix skip straight to stage 3). Stage 3 confirms
//! byte-identity with a full-content digest. Stage 4, when enabled, groups
//! images by perceptual distance and reports them separately.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use derive_builder::Builder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use tidymac_core::{Result, TidyError};

use crate::bktree::BkTree;
use crate::hash::{full_digest, prefix_digest, PREFIX_LEN};
use crate::phash::{difference_hash, sniff_image};
use crate::resolver::{pick_keep_candidate, KeepPolicy};

/// Configuration for a duplicate scan.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct DupConfig {
    /// Root directory to scan.
    pub root: PathBuf,

    /// Minimum file size to consider.
    #[builder(default = "1024")]
    pub min_size: u64,

    /// Whether to run the perceptual image stage.
    #[builder(default = "false")]
    pub perceptual: bool,

    /// Maximum Hamming distance for "visually similar".
    #[builder(default = "10")]
    pub hamming_threshold: u32,

    /// Per-file budget for full-content hashing.
    #[builder(default = "Duration::from_secs(60)")]
    pub hash_timeout: Duration,

    /// Substring patterns excluded from the walk.
    #[builder(default)]
    pub exclude: Vec<String>,

    /// Which group member survives a cleanup.
    #[builder(default)]
    pub keep_policy: KeepPolicy,

    /// Cooperative cancellation, checked between files.
    #[builder(default)]
    pub cancel: Option<Arc<AtomicBool>>,
}

impl DupConfig {
    /// Config builder.
    pub fn builder() -> DupConfigBuilder {
        DupConfigBuilder::default()
    }

    /// Default config over a root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            min_size: 1024,
            perceptual: false,
            hamming_threshold: 10,
            hash_timeout: Duration::from_secs(60),
            exclude: Vec::new(),
            keep_policy: KeepPolicy::default(),
            cancel: None,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// Whether a group is byte-identical or only visually similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Similar,
}

/// A group of duplicate (or visually similar) files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Exact or perceptual match.
    pub kind: MatchKind,
    /// SHA-256 hex digest shared by exact groups; absent for similar groups.
    pub digest: Option<String>,
    /// Common byte size (the keep candidate's size for similar groups).
    pub size_bytes: u64,
    /// Member paths in lexicographic order.
    pub paths: Vec<PathBuf>,
    /// The member a cleanup would keep.
    pub keep: PathBuf,
    /// Bytes freed if every other member were removed.
    pub reclaimable_bytes: u64,
}

impl DuplicateGroup {
    /// Number of members.
    pub fn count(&self) -> usize {
        self.paths.len()
    }
}

/// Results of a duplicate scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DupReport {
    pub root: PathBuf,
    pub files_scanned: u64,
    /// Confirmed byte-identical groups, ordered by first member.
    pub exact_groups: Vec<DuplicateGroup>,
    /// Visually similar image groups, ordered by first member.
    pub similar_groups: Vec<DuplicateGroup>,
    /// Total reclaimable bytes across all groups.
    pub total_reclaimable: u64,
    pub duration_secs: f64,
    pub errors: Vec<String>,
}

/// The duplicate pipeline.
pub struct DuplicateFinder {
    config: DupConfig,
}

impl DuplicateFinder {
    /// Finder with default config over a root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            config: DupConfig::new(root),
        }
    }

    /// Finder with explicit config.
    pub fn with_config(config: DupConfig) -> Self {
        Self { config }
    }

    /// Run the pipeline.
    pub fn find(&self) -> Result<DupReport> {
        let start = Instant::now();
        if !self.config.root.is_dir() {
            return Err(TidyError::NotFound {
                path: self.config.root.clone(),
            });
        }

        let mut errors: Vec<String> = Vec::new();
        let candidates = self.collect_candidates(&mut errors);
        let files_scanned = candidates.len() as u64;

        // Stage 1: size partitioning.
        let size_groups = group_by_size(&candidates);

        // Stages 2 and 3 run per size group on the rayon pool.
        let staged: Vec<(Vec<DuplicateGroup>, Vec<String>)> = size_groups
            .into_par_iter()
            .map(|(size, paths)| self.reduce_size_group(size, paths))
            .collect();

        let mut exact_groups = Vec::new();
        for (groups, group_errors) in staged {
            exact_groups.extend(groups);
            errors.extend(group_errors);
        }

        // Stage 4: perceptual, over every sniffed image among the inputs.
        let mut similar_groups = if self.config.perceptual && !self.config.cancelled() {
            self.perceptual_stage(&candidates, &exact_groups, &mut errors)
        } else {
            Vec::new()
        };

        if self.config.cancelled() {
            return Err(TidyError::Cancelled);
        }

        exact_groups.sort_by(|a, b| a.paths[0].cmp(&b.paths[0]));
        similar_groups.sort_by(|a, b| a.paths[0].cmp(&b.paths[0]));

        let total_reclaimable = exact_groups
            .iter()
            .chain(similar_groups.iter())
            .map(|g| g.reclaimable_bytes)
            .sum();

        Ok(DupReport {
            root: self.config.root.clone(),
            files_scanned,
            exact_groups,
            similar_groups,
            total_reclaimable,
            duration_secs: start.elapsed().as_secs_f64(),
            errors,
        })
    }

    /// Collect candidate files under the root, keyed by canonical path so a
    /// hardlinked or symlink-aliased inode is never counted twice.
    fn collect_candidates(&self, errors: &mut Vec<String>) -> Vec<FileInfo> {
        let mut seen_canonical: HashSet<PathBuf> = HashSet::new();
        let mut files = Vec::new();

        let mut iter = WalkDir::new(&self.config.root)
            .follow_links(false)
            .into_iter();
        while let Some(entry) = iter.next() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    errors.push(format!("walk error: {e}"));
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                if entry.depth() > 0 && (name.starts_with('.') || name == "node_modules") {
                    iter.skip_current_dir();
                }
                continue;
            }
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !self.config.exclude.is_empty() {
                let s = path.to_string_lossy();
                if self.config.exclude.iter().any(|p| s.contains(p.as_str())) {
                    continue;
                }
            }
            let Ok(meta) = entry.metadata() else { continue };
            if meta.len() < self.config.min_size {
                continue;
            }
            let Ok(canonical) = path.canonicalize() else {
                continue;
            };
            if !seen_canonical.insert(canonical.clone()) {
                continue;
            }
            files.push(FileInfo {
                path: canonical,
                size: meta.len(),
            });
        }

        files
    }

    /// Stages 2 and 3 for one size bucket.
    fn reduce_size_group(
        &self,
        size: u64,
        paths: Vec<PathBuf>,
    ) -> (Vec<DuplicateGroup>, Vec<String>) {
        let mut errors = Vec::new();
        if self.config.cancelled() {
            return (Vec::new(), errors);
        }

        // Stage 2: prefix digest. Files shorter than the prefix would hash
        // their full content anyway; they skip straight to stage 3.
        let stage3_buckets: Vec<Vec<PathBuf>> = if (size as usize) < PREFIX_LEN {
            vec![paths]
        } else {
            let digests: Vec<(PathBuf, std::result::Result<String, TidyError>)> = paths
                .into_par_iter()
                .map(|p| {
                    let digest = prefix_digest(&p);
                    (p, digest)
                })
                .collect();

            let mut buckets: HashMap<String, Vec<PathBuf>> = HashMap::new();
            for (path, digest) in digests {
                match digest {
                    Ok(d) => buckets.entry(d).or_default().push(path),
                    Err(e) => {
                        debug!(path = %path.display(), error = %e, "dropped at prefix stage");
                        errors.push(format!("{}: {e}", path.display()));
                    }
                }
            }
            buckets.retain(|_, v| v.len() > 1);
            buckets.into_values().collect()
        };

        // Stage 3: full-content digest confirms byte identity.
        let mut groups = Vec::new();
        for bucket in stage3_buckets {
            if self.config.cancelled() {
                break;
            }
            let digests: Vec<(PathBuf, std::result::Result<String, TidyError>)> = bucket
                .into_par_iter()
                .map(|p| {
                    let digest = full_digest(&p, self.config.hash_timeout);
                    (p, digest)
                })
                .collect();

            let mut by_digest: HashMap<String, Vec<PathBuf>> = HashMap::new();
            for (path, digest) in digests {
                match digest {
                    Ok(d) => by_digest.entry(d).or_default().push(path),
                    Err(e) => errors.push(format!("{}: {e}", path.display())),
                }
            }

            for (digest, mut members) in by_digest {
                if members.len() < 2 {
                    continue;
                }
                members.sort();
                let keep = pick_keep_candidate(&members, &self.config.keep_policy);
                let reclaimable = size * (members.len() as u64 - 1);
                groups.push(DuplicateGroup {
                    kind: MatchKind::Exact,
                    digest: Some(digest),
                    size_bytes: size,
                    paths: members,
                    keep,
                    reclaimable_bytes: reclaimable,
                });
            }
        }

        (groups, errors)
    }

    /// Stage 4: perceptual grouping of images by Hamming distance, using a
    /// BK-tree for near-neighbor queries and union-find for transitive
    /// grouping.
    fn perceptual_stage(
        &self,
        candidates: &[FileInfo],
        exact_groups: &[DuplicateGroup],
        errors: &mut Vec<String>,
    ) -> Vec<DuplicateGroup> {
        let images: Vec<&FileInfo> = candidates
            .iter()
            .filter(|f| sniff_image(&f.path).is_some())
            .collect();
        if images.len() < 2 {
            return Vec::new();
        }

        let hashes: Vec<(usize, std::result::Result<u64, TidyError>)> = images
            .par_iter()
            .enumerate()
            .map(|(i, f)| (i, difference_hash(&f.path)))
            .collect();

        let mut hashed: Vec<(usize, u64)> = Vec::with_capacity(hashes.len());
        for (i, hash) in hashes {
            match hash {
                Ok(h) => hashed.push((i, h)),
                Err(e) => errors.push(e.to_string()),
            }
        }

        let mut tree = BkTree::new();
        for (slot, &(_, hash)) in hashed.iter().enumerate() {
            tree.insert(hash, slot);
        }

        // Union slots that fall within the threshold of one another.
        let mut uf = UnionFind::new(hashed.len());
        for (slot, &(_, hash)) in hashed.iter().enumerate() {
            for (other, _) in tree.query(hash, self.config.hamming_threshold) {
                uf.union(slot, other);
            }
        }

        let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
        for slot in 0..hashed.len() {
            components.entry(uf.find(slot)).or_default().push(slot);
        }

        // Exact groups already report these members; a similar group is
        // only interesting when it adds something new.
        let exact_paths: HashSet<&PathBuf> = exact_groups
            .iter()
            .flat_map(|g| g.paths.iter())
            .collect();

        let mut groups = Vec::new();
        for slots in components.into_values() {
            if slots.len() < 2 {
                continue;
            }
            let mut members: Vec<PathBuf> = slots
                .iter()
                .map(|&slot| images[hashed[slot].0].path.clone())
                .collect();
            members.sort();
            if members.iter().all(|p| exact_paths.contains(p)) {
                continue;
            }

            let sizes: HashMap<&PathBuf, u64> = slots
                .iter()
                .map(|&slot| {
                    let info = images[hashed[slot].0];
                    (&info.path, info.size)
                })
                .collect();
            let keep = pick_keep_candidate(&members, &self.config.keep_policy);
            let keep_size = sizes.get(&keep).copied().unwrap_or(0);
            let reclaimable: u64 = members
                .iter()
                .filter(|p| **p != keep)
                .filter_map(|p| sizes.get(p))
                .sum();

            groups.push(DuplicateGroup {
                kind: MatchKind::Similar,
                digest: None,
                size_bytes: keep_size,
                paths: members,
                keep,
                reclaimable_bytes: reclaimable,
            });
        }

        groups
    }
}

/// Candidate file with its size.
#[derive(Debug, Clone)]
struct FileInfo {
    path: PathBuf,
    size: u64,
}

/// Stage 1: group by exact byte size, discarding singletons.
fn group_by_size(files: &[FileInfo]) -> HashMap<u64, Vec<PathBuf>> {
    let mut groups: HashMap<u64, Vec<PathBuf>> = HashMap::new();
    for file in files {
        groups.entry(file.size).or_default().push(file.path.clone());
    }
    groups.retain(|_, v| v.len() > 1);
    groups
}

/// Path-compressed union-find over perceptual slots.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn finder(root: &Path) -> DuplicateFinder {
        DuplicateFinder::with_config(
            DupConfig::builder()
                .root(root)
                .min_size(1u64)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_exact_duplicates_found() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), b"same content here").unwrap();
        fs::write(temp.path().join("b.txt"), b"same content here").unwrap();
        fs::write(temp.path().join("c.txt"), b"different content").unwrap();

        let report = finder(temp.path()).find().unwrap();
        assert_eq!(report.files_scanned, 3);
        assert_eq!(report.exact_groups.len(), 1);
        let group = &report.exact_groups[0];
        assert_eq!(group.count(), 2);
        assert_eq!(group.size_bytes, 17);
        assert_eq!(group.reclaimable_bytes, 17);
        assert!(group.digest.is_some());
    }

    #[test]
    fn test_same_size_different_content_not_grouped() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), b"aaaaaaaa").unwrap();
        fs::write(temp.path().join("b"), b"bbbbbbbb").unwrap();

        let report = finder(temp.path()).find().unwrap();
        assert!(report.exact_groups.is_empty());
    }

    #[test]
    fn test_groups_are_deterministically_ordered() {
        let temp = TempDir::new().unwrap();
        for (name, content) in [
            ("z1", "group one"),
            ("z2", "group one"),
            ("a1", "group two!"),
            ("a2", "group two!"),
        ] {
            fs::write(temp.path().join(name), content).unwrap();
        }

        let report = finder(temp.path()).find().unwrap();
        assert_eq!(report.exact_groups.len(), 2);
        // Lexicographic by first member.
        assert!(report.exact_groups[0].paths[0] < report.exact_groups[1].paths[0]);
        for group in &report.exact_groups {
            let mut sorted = group.paths.clone();
            sorted.sort();
            assert_eq!(sorted, group.paths);
        }
    }

    #[test]
    fn test_small_files_bypass_prefix_stage() {
        let temp = TempDir::new().unwrap();
        // Well under PREFIX_LEN.
        fs::write(temp.path().join("s1"), b"tiny").unwrap();
        fs::write(temp.path().join("s2"), b"tiny").unwrap();

        let report = finder(temp.path()).find().unwrap();
        assert_eq!(report.exact_groups.len(), 1);
    }

    #[test]
    fn test_min_size_filters_candidates() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), b"xy").unwrap();
        fs::write(temp.path().join("b"), b"xy").unwrap();

        let config = DupConfig::builder()
            .root(temp.path())
            .min_size(1024u64)
            .build()
            .unwrap();
        let report = DuplicateFinder::with_config(config).find().unwrap();
        assert_eq!(report.files_scanned, 0);
        assert!(report.exact_groups.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_alias_not_double_counted() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("real"), b"content!").unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("alias")).unwrap();

        let report = finder(temp.path()).find().unwrap();
        // One physical file: no group.
        assert!(report.exact_groups.is_empty());
    }

    #[test]
    fn test_missing_root_is_error() {
        let temp = TempDir::new().unwrap();
        let err = finder(&temp.path().join("gone")).find().unwrap_err();
        assert_eq!(err.kind(), "path_not_found");
    }

    #[test]
    fn test_keep_candidate_is_group_member() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("x1"), b"payload....").unwrap();
        fs::write(temp.path().join("x2"), b"payload....").unwrap();
        fs::write(temp.path().join("x3"), b"payload....").unwrap();

        let report = finder(temp.path()).find().unwrap();
        let group = &report.exact_groups[0];
        assert!(group.paths.contains(&group.keep));
        assert_eq!(group.reclaimable_bytes, group.size_bytes * 2);
    }

    #[test]
    fn test_perceptual_groups_reencoded_images() {
        let temp = TempDir::new().unwrap();
        // Brightness rising left to right; survives JPEG re-encoding.
        let img = image::ImageBuffer::from_fn(64, 64, |x, _| image::Luma([(x * 4) as u8]));
        img.save_with_format(temp.path().join("img.png"), image::ImageFormat::Png)
            .unwrap();
        img.save_with_format(temp.path().join("img.jpg"), image::ImageFormat::Jpeg)
            .unwrap();
        // Opposite ramp: maximally distant difference hash.
        let other =
            image::ImageBuffer::from_fn(64, 64, |x, _| image::Luma([255u8 - (x * 4) as u8]));
        other
            .save_with_format(temp.path().join("other.png"), image::ImageFormat::Png)
            .unwrap();

        let config = DupConfig::builder()
            .root(temp.path())
            .min_size(1u64)
            .perceptual(true)
            .build()
            .unwrap();
        let report = DuplicateFinder::with_config(config).find().unwrap();

        assert_eq!(report.similar_groups.len(), 1);
        let group = &report.similar_groups[0];
        assert_eq!(group.kind, MatchKind::Similar);
        assert_eq!(group.count(), 2);
        assert!(group.paths.iter().all(|p| {
            let n = p.file_name().unwrap().to_string_lossy().into_owned();
            n == "img.png" || n == "img.jpg"
        }));
    }
}
