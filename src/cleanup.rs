//! Applying a resolution: rewrite the job list, then delete job folders.
//!
//! The list is written before any folder is removed. An interrupted run can
//! leave orphaned folders behind but never a list entry whose folder is gone.
use crate::error::{DedupError, Result};
use crate::joblist::{JobItem, JobList};
use crate::resolve::Resolution;
use crate::staging::write_atomic;
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Where the cleaned job list is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputTarget {
    /// Overwrite the list that was loaded.
    InPlace,
    /// Write `<stem>_clean.<ext>` next to the loaded list.
    Derived,
}

impl OutputTarget {
    pub fn path_for(self, source: &Path) -> PathBuf {
        match self {
            Self::InPlace => source.to_path_buf(),
            Self::Derived => derived_path(source),
        }
    }
}

/// What a cleanup changed on disk.
#[derive(Debug, Clone, Default)]
pub struct CleanupOutcome {
    pub written: Option<PathBuf>,
    pub removed: Vec<JobItem>,
    pub deleted_dirs: Vec<PathBuf>,
    /// Folders of removed items left alone because a kept item uses them.
    pub shared_dirs: Vec<PathBuf>,
}

/// Remove the discarded items from `list`, write it to `output`, and delete
/// the discarded job folders below `job_root` when one is given.
///
/// Folders live flat under `job_root`, so a discarded item can name the same
/// folder as a surviving item of another name. Such a folder is kept and
/// reported in `shared_dirs`: with `A/2023-01-01`, `A/2023-06-01` and
/// `B/2023-01-01`, the `A/2023-01-01` entry is removed from the list but the
/// `2023-01-01` folder stays because `B` still uses it.
///
/// Nothing is touched when the resolution is empty.
pub fn apply_resolution(
    list: &mut JobList,
    resolution: &Resolution,
    output: &Path,
    job_root: Option<&Path>,
) -> Result<CleanupOutcome> {
    if resolution.is_empty() {
        return Ok(CleanupOutcome::default());
    }
    if job_root.is_some() {
        for item in resolution.discarded() {
            ensure_plain_folder(item)?;
        }
    }

    let removed = list.remove(&resolution.discard_ids());
    let bytes = list.to_bytes()?;
    write_atomic(output, &bytes)?;
    tracing::info!(
        removed = removed.len(),
        path = %output.display(),
        "job list written"
    );

    let mut outcome = CleanupOutcome {
        written: Some(output.to_path_buf()),
        removed,
        ..CleanupOutcome::default()
    };
    let Some(job_root) = job_root else {
        return Ok(outcome);
    };

    let in_use: HashSet<&str> = list
        .items()
        .iter()
        .map(|item| item.folder_stamp.as_str())
        .collect();
    let mut seen = HashSet::new();
    for item in &outcome.removed {
        let dir = job_root.join(&item.folder_stamp);
        if !seen.insert(item.folder_stamp.as_str()) {
            continue;
        }
        if in_use.contains(item.folder_stamp.as_str()) {
            tracing::warn!(
                job = %item.name,
                dir = %dir.display(),
                "folder still referenced by a kept job; not deleting"
            );
            outcome.shared_dirs.push(dir);
            continue;
        }
        fs::remove_dir_all(&dir)
            .map_err(|err| DedupError::filesystem("delete job folder", &dir, err))?;
        tracing::info!(job = %item.name, dir = %dir.display(), "job folder deleted");
        outcome.deleted_dirs.push(dir);
    }
    Ok(outcome)
}

/// `jobs.xml` becomes `jobs_clean.xml`; a name without extension gets a
/// plain `_clean` suffix.
pub fn derived_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match source.extension() {
        Some(ext) => format!("{stem}_clean.{}", ext.to_string_lossy()),
        None => format!("{stem}_clean"),
    };
    source.with_file_name(file_name)
}

fn ensure_plain_folder(item: &JobItem) -> Result<()> {
    let mut components = Path::new(&item.folder_stamp).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if plain {
        Ok(())
    } else {
        Err(DedupError::UnsafeFolder {
            name: item.name.clone(),
            stamp: item.folder_stamp.clone(),
        })
    }
}
