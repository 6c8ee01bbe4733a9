//! tidymac - a developer-aware disk cleanup engine.
//!
//! Usage:
//!   tidymac profiles               List cleanup profiles
//!   tidymac scan [-p PROFILE]      Scan and show the inventory
//!   tidymac usage                  Category breakdown of reclaimable space
//!   tidymac clean [-p PROFILE]     Remove (preview by default; --soft/--hard)
//!   tidymac sessions               List cleanup sessions
//!   tidymac restore [SESSION]      Undo a soft session
//!   tidymac dupes PATH             Find duplicate files
//!   tidymac purge                  Drop expired sessions
//!
//! Pass `--json` to any subcommand for machine-readable output.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;

use tidymac_api::{
    error_exit_code, CleanMode, PurgePolicy, Tidymac, EXIT_NOOP, EXIT_OK, EXIT_PARTIAL,
};
use tidymac_core::{format_path, format_size};

#[derive(Parser)]
#[command(
    name = "tidymac",
    version,
    about = "Reclaim disk space with an explicit recovery path",
    long_about = "tidymac scans caches, logs, developer build trees, and duplicates,\n\
                  then removes them in preview, reversible (soft), or permanent (hard)\n\
                  mode. Soft removals can be undone for 7 days."
)]
struct Cli {
    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available cleanup profiles.
    Profiles,

    /// Scan and print the classified inventory.
    Scan {
        /// Profile to scan with.
        #[arg(short, long, default_value = "quick")]
        profile: String,
    },

    /// Show a category breakdown of reclaimable space.
    Usage,

    /// Remove the scanned items.
    Clean {
        /// Profile to clean with.
        #[arg(short, long, default_value = "quick")]
        profile: String,

        /// Stage removals for a later undo.
        #[arg(long, conflicts_with = "hard")]
        soft: bool,

        /// Remove permanently (no undo).
        #[arg(long)]
        hard: bool,

        /// Only these inventory items (by name).
        #[arg(short, long)]
        item: Vec<String>,

        /// Remove files even if they changed since the scan.
        #[arg(long)]
        force: bool,
    },

    /// List cleanup sessions.
    Sessions,

    /// Restore a soft session (the most recent one by default).
    Restore {
        /// Session id to restore.
        session: Option<String>,
    },

    /// Find duplicate files under a directory.
    Dupes {
        /// Root directory to search.
        path: PathBuf,

        /// Also group visually similar images.
        #[arg(long)]
        perceptual: bool,
    },

    /// Remove expired sessions and their staged files.
    Purge {
        /// Remove every session, not only expired ones.
        #[arg(long)]
        all: bool,

        /// Required to purge sessions that have not expired.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let api = match Tidymac::open() {
        Ok(api) => api,
        Err(e) => {
            eprintln!("error: {e}");
            return Ok(ExitCode::from(error_exit_code(&e) as u8));
        }
    };

    let code = match run(&api, cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            error_exit_code(&e)
        }
    };
    Ok(ExitCode::from(code as u8))
}

fn run(api: &Tidymac, cli: Cli) -> tidymac_core::Result<i32> {
    match cli.command {
        Command::Profiles => {
            let profiles = api.list_profiles();
            if cli.json {
                print_json(&profiles);
            } else {
                for p in &profiles {
                    println!("{:<12} [{}] {}", p.name, p.aggression, p.description);
                }
            }
            Ok(EXIT_OK)
        }

        Command::Scan { profile } => {
            let inventory = api.scan(&profile)?;
            if cli.json {
                print_json(&inventory);
            } else {
                print_inventory(&inventory);
            }
            Ok(partial_or(EXIT_OK, !inventory.errors.is_empty()))
        }

        Command::Usage => {
            let usage = api.disk_usage()?;
            if cli.json {
                print_json(&usage);
            } else {
                for c in &usage.categories {
                    println!(
                        "{:<18} {:>10}  {} files",
                        c.category,
                        format_size(c.bytes),
                        c.files
                    );
                }
                if !usage.dev_tools.is_empty() {
                    println!("\nDeveloper tool caches:");
                    for t in &usage.dev_tools {
                        println!(
                            "  {:<12} {:>10}  {}",
                            t.tool.to_string(),
                            format_size(t.bytes),
                            format_path(&t.cache_path)
                        );
                    }
                }
                println!(
                    "\nTotal reclaimable: {} across {} files",
                    format_size(usage.total_bytes),
                    usage.total_files
                );
            }
            Ok(EXIT_OK)
        }

        Command::Clean {
            profile,
            soft,
            hard,
            item,
            force,
        } => {
            let mode = if hard {
                CleanMode::Hard
            } else if soft {
                CleanMode::Soft
            } else {
                CleanMode::Preview
            };
            let items = (!item.is_empty()).then_some(item);
            let report = api.clean(&profile, mode, items, force)?;

            if cli.json {
                print_json(&report);
            } else {
                match mode {
                    CleanMode::Preview => println!(
                        "Would remove {} files, freeing {}",
                        report.files_removed,
                        format_size(report.bytes_freed)
                    ),
                    _ => println!(
                        "Removed {} files, freed {}",
                        report.files_removed,
                        format_size(report.bytes_freed)
                    ),
                }
                if let Some(id) = &report.session_id {
                    println!("Session {id} (undo with `tidymac restore {id}`)");
                }
                for e in &report.errors {
                    eprintln!("warning: {e}");
                }
            }

            if report.files_removed == 0 && report.errors.is_empty() {
                Ok(EXIT_NOOP)
            } else {
                Ok(partial_or(EXIT_OK, !report.errors.is_empty()))
            }
        }

        Command::Sessions => {
            let sessions = api.list_sessions()?;
            if cli.json {
                print_json(&sessions);
            } else if sessions.is_empty() {
                println!("No sessions.");
            } else {
                if let Ok(health) = api.staging_health() {
                    if let Some(warning) = health.warning {
                        eprintln!("warning: {warning}");
                    }
                }
                for s in &sessions {
                    let status = if s.restored {
                        "restored"
                    } else if s.is_expired {
                        "expired"
                    } else {
                        "active"
                    };
                    println!(
                        "{}  {:<8} {:<9} {} files, {}",
                        s.session_id,
                        s.mode.to_string(),
                        status,
                        s.total_files,
                        format_size(s.total_bytes)
                    );
                }
            }
            Ok(EXIT_OK)
        }

        Command::Restore { session } => {
            let report = api.restore(session.as_deref())?;
            if cli.json {
                print_json(&report);
            } else {
                println!(
                    "Restored {} files ({})",
                    report.restored_count,
                    format_size(report.restored_bytes)
                );
                for e in &report.errors {
                    eprintln!("warning: {e}");
                }
            }
            Ok(partial_or(EXIT_OK, !report.errors.is_empty()))
        }

        Command::Dupes { path, perceptual } => {
            let report = api.find_duplicates(&path, perceptual)?;
            if cli.json {
                print_json(&report);
            } else {
                if report.exact_groups.is_empty() && report.similar_groups.is_empty() {
                    println!("No duplicates found in {} files.", report.files_scanned);
                } else {
                    for group in &report.exact_groups {
                        println!(
                            "{} copies of {} ({} reclaimable):",
                            group.count(),
                            format_size(group.size_bytes),
                            format_size(group.reclaimable_bytes)
                        );
                        for p in &group.paths {
                            let marker = if p == &group.keep { "keep " } else { "     " };
                            println!("  {marker}{}", format_path(p));
                        }
                    }
                    for group in &report.similar_groups {
                        println!("{} visually similar images:", group.count());
                        for p in &group.paths {
                            println!("       {}", format_path(p));
                        }
                    }
                    println!(
                        "\nTotal reclaimable: {}",
                        format_size(report.total_reclaimable)
                    );
                }
                for e in &report.errors {
                    eprintln!("warning: {e}");
                }
            }
            Ok(partial_or(EXIT_OK, !report.errors.is_empty()))
        }

        Command::Purge { all, force } => {
            let policy = if all {
                PurgePolicy::All
            } else {
                PurgePolicy::Expired
            };
            let report = api.purge(policy, force)?;
            if cli.json {
                print_json(&report);
            } else {
                println!(
                    "Purged {} sessions, freed {}",
                    report.sessions_purged,
                    format_size(report.bytes_freed)
                );
                for e in &report.errors {
                    eprintln!("warning: {e}");
                }
            }
            if report.sessions_purged == 0 && report.errors.is_empty() {
                Ok(EXIT_NOOP)
            } else {
                Ok(partial_or(EXIT_OK, !report.errors.is_empty()))
            }
        }
    }
}

fn partial_or(ok: i32, partial: bool) -> i32 {
    if partial {
        EXIT_PARTIAL
    } else {
        ok
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: cannot serialize output: {e}"),
    }
}

fn print_inventory(inventory: &tidymac_api::Inventory) {
    if inventory.items.is_empty() {
        println!("Nothing to clean.");
        return;
    }
    for item in &inventory.items {
        println!(
            "[{}] {:<40} {:>10}  {} files",
            item.safety,
            item.name,
            format_size(item.bytes),
            item.file_count
        );
        println!("        {} - {}", format_path(&item.path), item.reason);
    }
    println!(
        "\n{} reclaimable across {} files ({} items, scanned in {:.1}s)",
        format_size(inventory.total_reclaimable),
        inventory.total_files,
        inventory.items.len(),
        inventory.duration_secs
    );
    for e in &inventory.errors {
        eprintln!("warning: {e}");
    }
}
