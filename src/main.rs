//! # ewpatch: The Main Entry Point
//!
//! This module handles Command Line Interface (CLI) parsing, logging initialization,
//! and dispatching commands to the patcher.
//!
//! Run without arguments it links the TivaWare driver library into the Debug
//! configuration of `embProj.ewp` in the current directory.

use std::path::PathBuf;
use clap::{Args, Parser, Subcommand};
use log::{error, LevelFilter};
use simplelog::{Config, SimpleLogger};

mod invariant_ppt;
mod patcher;
mod scan;
mod store;

use patcher::{ExistingPolicy, PatchOptions, DEFAULT_LIB, DEFAULT_PROJECT};
use scan::{Target, DEFAULT_CONFIGURATION};

/// The primary Command Line Interface (CLI) configuration.
#[derive(Parser)]
#[command(name = "ewpatch")]
#[command(about = "Links a static library into an IAR Embedded Workbench project", long_about = None)]
struct Cli {
    /// The sub-command to execute (patch, inspect). Defaults to `patch`.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Turn on verbose logging.
    ///
    /// - `-v`: Debug
    /// - `-vv`: Trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Which project and configuration to work on.
#[derive(Args)]
struct ProjectArgs {
    /// Path of the `.ewp` project file.
    #[arg(long, default_value = DEFAULT_PROJECT)]
    project: PathBuf,

    /// Build configuration whose linker settings are edited.
    #[arg(long, default_value = DEFAULT_CONFIGURATION)]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill the linker's "additional libraries" option.
    ///
    /// Only the first empty option value in the configuration's ILINK block is
    /// edited; every other line is written back untouched.
    Patch {
        #[command(flatten)]
        project: ProjectArgs,

        /// Library to link.
        #[arg(long, default_value = DEFAULT_LIB)]
        lib: String,

        /// What to do when the option already lists another library.
        #[arg(long, value_enum, default_value_t = ExistingPolicy::Keep)]
        on_existing: ExistingPolicy,

        /// Dry run: report the edit without writing the project.
        #[arg(long)]
        dry_run: bool,

        /// Copy the original project to `<project>.bak` before writing.
        #[arg(long)]
        backup: bool,
    },
    /// Show what the linker's "additional libraries" option currently holds.
    Inspect {
        #[command(flatten)]
        project: ProjectArgs,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    // Logging failure shouldn't stop the patch
    let _ = SimpleLogger::init(log_level, Config::default());

    match cli.command {
        None => run_patch(PatchOptions::default()),
        Some(Commands::Patch { project, lib, on_existing, dry_run, backup }) => {
            run_patch(PatchOptions {
                project: project.project,
                lib,
                target: Target::new(&project.config),
                on_existing,
                dry_run,
                backup,
            })
        }
        Some(Commands::Inspect { project, json }) => {
            let target = Target::new(&project.config);
            let report = match patcher::inspect_project(&project.project, &target) {
                Ok(report) => report,
                Err(e) => {
                    error!("Inspection failed: {:#}", e);
                    std::process::exit(1);
                }
            };

            if json {
                match serde_json::to_string_pretty(&report) {
                    Ok(out) => println!("{}", out),
                    Err(e) => {
                        error!("Failed to serialize report: {}", e);
                        std::process::exit(1);
                    }
                }
            } else {
                print!("{}", report);
            }
        }
    }
}

fn run_patch(opts: PatchOptions) {
    let outcome = match patcher::patch_project(&opts) {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Failed to patch project: {:#}", e);
            std::process::exit(1);
        }
    };

    if outcome.changed() && !opts.dry_run {
        let name = opts
            .project
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| opts.project.display().to_string());
        println!("Successfully updated {}", name);
    } else if !outcome.changed() {
        println!("{} not modified: {}", opts.project.display(), outcome);
    }

    std::process::exit(outcome.exit_code());
}
