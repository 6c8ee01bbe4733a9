//! Core types and policy for tidymac.
//!
//! This crate provides the vocabulary shared by the scanner, the duplicate
//! pipeline, and the cleaner: error types, the safety guard, the scan-target
//! catalog, profile resolution, and size/path formatting.

mod config;
mod error;
mod format;
mod profile;
mod safety;
mod target;

pub use config::{CleanMode, Config, StateDir};
pub use error::{ScanWarning, TidyError, WarningKind};
pub use format::{format_duration, format_path, format_size};
pub use profile::{builtin_profiles, Aggression, Policy, Profile, ProfileOverlay};
pub use safety::{SafetyGuard, Verdict};
pub use target::{
    catalog, Category, DetectorRule, DevTool, SafetyLabel, ScanEnv, ScanTarget, TargetSource,
};

/// Result alias used throughout the tidymac crates.
pub type Result<T> = std::result::Result<T, TidyError>;
