use crate::cleanup::{apply_resolution, CleanupOutcome, OutputTarget};
use crate::cli::{CleanArgs, PlanArgs};
use crate::config::{self, DedupConfig};
use crate::controller::{Controller, ProcessController};
use crate::joblist::JobList;
use crate::resolve::{find_duplicates, DuplicateGroup, Resolution};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub fn run_clean(args: CleanArgs) -> Result<()> {
    let target = if args.in_place {
        OutputTarget::InPlace
    } else {
        OutputTarget::Derived
    };
    let outcome = dedup_joblist(&args.file, target, args.job_root.as_deref())?;
    print_outcome(&outcome);
    Ok(())
}

pub fn run_plan(args: PlanArgs) -> Result<()> {
    let path = match args.file {
        Some(path) => path,
        None => config::joblist_path_in(&config::job_root_from_env()?),
    };
    let list = JobList::load(&path)?;
    let resolution = find_duplicates(list.items());
    if args.json {
        let report = PlanReport::new(&path, list.items().len(), &resolution);
        let text = serde_json::to_string_pretty(&report).context("serialize plan report")?;
        println!("{text}");
        return Ok(());
    }
    if resolution.is_empty() {
        println!("no duplicate jobs in {}", path.display());
        return Ok(());
    }
    for group in &resolution.groups {
        println!("{}", describe_group(group));
    }
    println!(
        "{} of {} entries would be removed from {}",
        resolution.discard_count(),
        list.items().len(),
        path.display()
    );
    Ok(())
}

/// Full controller cycle driven by the environment configuration.
pub fn run_cycle(config: &DedupConfig) -> Result<()> {
    let mut controller = ProcessController::new(config);
    let outcome = cycle(config, &mut controller)?;
    print_outcome(&outcome);
    Ok(())
}

pub(crate) fn cycle<C: Controller + ?Sized>(
    config: &DedupConfig,
    controller: &mut C,
) -> Result<CleanupOutcome> {
    with_controller(controller, || {
        dedup_joblist(
            &config.joblist_path(),
            OutputTarget::InPlace,
            Some(config.job_root.as_path()),
        )
    })
}

/// Stop the controller, run `body`, then start the controller again.
///
/// The restart also happens when `body` fails; its error still wins. Nothing
/// runs if the controller cannot be stopped.
pub(crate) fn with_controller<C, T, F>(controller: &mut C, body: F) -> Result<T>
where
    C: Controller + ?Sized,
    F: FnOnce() -> Result<T>,
{
    controller.stop().context("stop controller")?;
    let result = body();
    let restarted = controller.start().context("restart controller");
    match (result, restarted) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(restart_err)) => {
            tracing::error!(error = %format!("{restart_err:#}"), "controller restart failed");
            Err(err)
        }
    }
}

/// Load, resolve and clean one job list.
pub(crate) fn dedup_joblist(
    list_path: &Path,
    target: OutputTarget,
    job_root: Option<&Path>,
) -> Result<CleanupOutcome> {
    let mut list = JobList::load(list_path)?;
    let resolution = find_duplicates(list.items());
    tracing::info!(
        path = %list_path.display(),
        items = list.items().len(),
        duplicate_names = resolution.groups.len(),
        "job list loaded"
    );
    if resolution.is_empty() {
        tracing::info!("no duplicate jobs found");
        return Ok(CleanupOutcome::default());
    }
    for group in &resolution.groups {
        tracing::debug!("{}", describe_group(group));
    }

    let output = target.path_for(list.source());
    let outcome = apply_resolution(&mut list, &resolution, &output, job_root)
        .with_context(|| format!("clean job list {}", list_path.display()))?;
    tracing::info!(
        removed = outcome.removed.len(),
        deleted_dirs = outcome.deleted_dirs.len(),
        shared_dirs = outcome.shared_dirs.len(),
        "duplicates removed"
    );
    Ok(outcome)
}

fn print_outcome(outcome: &CleanupOutcome) {
    match &outcome.written {
        Some(path) => println!(
            "removed {} duplicate job(s); wrote {}",
            outcome.removed.len(),
            path.display()
        ),
        None => println!("no duplicate jobs found"),
    }
}

fn describe_group(group: &DuplicateGroup) -> String {
    let discarded: Vec<&str> = group
        .discard
        .iter()
        .map(|item| item.folder_stamp.as_str())
        .collect();
    format!(
        "{}: keep {}, discard {}",
        group.name,
        group.keep.folder_stamp,
        discarded.join(", ")
    )
}

#[derive(Serialize)]
struct PlanReport<'a> {
    joblist: PathBuf,
    items: usize,
    discard_count: usize,
    groups: &'a [DuplicateGroup],
}

impl<'a> PlanReport<'a> {
    fn new(joblist: &Path, items: usize, resolution: &'a Resolution) -> Self {
        Self {
            joblist: joblist.to_path_buf(),
            items,
            discard_count: resolution.discard_count(),
            groups: &resolution.groups,
        }
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
