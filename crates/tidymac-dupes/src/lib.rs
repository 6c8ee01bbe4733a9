//! Duplicate detection for tidymac.
//!
//! A four-stage reduction over candidate files: size partitioning, prefix
//! hashing, full-content hashing, and an optional perceptual stage for
//! images. Stages 1–3 produce confirmed byte-identical groups; stage 4
//! reports visually similar images separately.

mod bktree;
mod hash;
mod phash;
mod pipeline;
mod resolver;

pub use bktree::BkTree;
pub use hash::{full_digest, prefix_digest, PREFIX_LEN};
pub use phash::{difference_hash, hamming_distance, sniff_image, ImageKind};
pub use pipeline::{DupConfig, DupConfigBuilder, DupReport, DuplicateFinder, DuplicateGroup, MatchKind};
pub use resolver::{pick_keep_candidate, KeepPolicy};
