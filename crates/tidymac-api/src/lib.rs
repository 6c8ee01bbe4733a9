//! The synchronous consumer API.
//!
//! Front ends (the CLI, a GUI bridge) drive the engine exclusively through
//! [`Tidymac`]: eight operations, all synchronous, all returning
//! JSON-serializable values. Non-fatal problems appear as strings in the
//! result's `errors` array; fatal conditions are the `Err` branch.

mod ops;

pub use ops::{
    error_exit_code, CategoryUsage, DiskUsage, ProfileSummary, Tidymac, EXIT_IO, EXIT_NOOP,
    EXIT_OK, EXIT_PARTIAL, EXIT_SAFETY, EXIT_USAGE,
};

// The operation result types, re-exported for consumers.
pub use tidymac_clean::{
    CleanReport, PurgePolicy, PurgeReport, RestoreReport, SessionSummary, StagingHealth,
};
pub use tidymac_core::{CleanMode, Result, TidyError};
pub use tidymac_dupes::DupReport;
pub use tidymac_scan::Inventory;
