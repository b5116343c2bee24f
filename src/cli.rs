//! CLI argument parsing for the job list cleanup.
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "jobdedup",
    version,
    about = "Remove duplicate job entries from a controller job list",
    after_help = "Environment (used by `run`, and by `plan` without --file):\n  JOBDEDUP_JOB_ROOT          Directory holding JobList.xml and one folder per job\n  JOBDEDUP_CONTROLLER_EXE    Controller executable started after cleanup\n  JOBDEDUP_CONTROLLER_IMAGE  Controller process name stopped before cleanup\n  JOBDEDUP_GRACE_SECS        Wait after stop/start (default 5)\n\nExamples:\n  jobdedup clean -f /srv/jobs/JobList.xml\n  jobdedup clean -f /srv/jobs/JobList.xml --in-place --job-root /srv/jobs\n  jobdedup plan -f /srv/jobs/JobList.xml --json\n  jobdedup run",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Clean(CleanArgs),
    Plan(PlanArgs),
    /// Stop the controller, clean its job list in place, delete stale job folders, restart it
    Run,
}

/// Clean a job list file without touching the controller.
#[derive(Parser, Debug)]
#[command(about = "Write a deduplicated copy of a job list")]
pub struct CleanArgs {
    /// Job list to clean
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: PathBuf,

    /// Overwrite the job list instead of writing <name>_clean.xml
    #[arg(long)]
    pub in_place: bool,

    /// Delete the folders of removed jobs below this directory
    #[arg(long, value_name = "DIR")]
    pub job_root: Option<PathBuf>,
}

/// Report duplicates without changing anything.
#[derive(Parser, Debug)]
#[command(about = "Show which job entries a cleanup would remove")]
pub struct PlanArgs {
    /// Job list to inspect (defaults to JobList.xml in JOBDEDUP_JOB_ROOT)
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Emit machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}
