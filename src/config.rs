//! Run configuration sourced from the process environment.
//!
//! The environment is read exactly once, in `main`, and the resulting
//! `DedupConfig` is passed to everything that needs it.
use crate::error::{DedupError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const JOB_ROOT_ENV: &str = "JOBDEDUP_JOB_ROOT";
pub const CONTROLLER_EXE_ENV: &str = "JOBDEDUP_CONTROLLER_EXE";
pub const CONTROLLER_IMAGE_ENV: &str = "JOBDEDUP_CONTROLLER_IMAGE";
pub const GRACE_SECS_ENV: &str = "JOBDEDUP_GRACE_SECS";

/// File name of the job list inside the job root.
pub const JOBLIST_FILE_NAME: &str = "JobList.xml";

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Settings for a full controller cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupConfig {
    /// Directory holding one sub-directory per job, named by folder stamp.
    pub job_root: PathBuf,
    /// Executable launched to bring the controller back up.
    pub controller_exe: PathBuf,
    /// Process image name used to stop running controller instances.
    pub controller_image: String,
    /// Wait applied after both stopping and starting the controller.
    pub grace_period: Duration,
}

impl DedupConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Every missing required key is reported in a single error so the
    /// operator can fix them all at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let job_root = read(JOB_ROOT_ENV);
        let controller_exe = read(CONTROLLER_EXE_ENV);
        let controller_image = read(CONTROLLER_IMAGE_ENV);

        let mut missing = Vec::new();
        if job_root.is_none() {
            missing.push(JOB_ROOT_ENV);
        }
        if controller_exe.is_none() {
            missing.push(CONTROLLER_EXE_ENV);
        }
        if controller_image.is_none() {
            missing.push(CONTROLLER_IMAGE_ENV);
        }
        let (Some(job_root), Some(controller_exe), Some(controller_image)) =
            (job_root, controller_exe, controller_image)
        else {
            return Err(DedupError::MissingConfig(missing));
        };

        let grace_period = match read(GRACE_SECS_ENV) {
            Some(raw) => parse_grace_secs(&raw)?,
            None => DEFAULT_GRACE_PERIOD,
        };

        Ok(Self {
            job_root: PathBuf::from(job_root),
            controller_exe: PathBuf::from(controller_exe),
            controller_image,
            grace_period,
        })
    }

    /// Location of the job list maintained by the controller.
    pub fn joblist_path(&self) -> PathBuf {
        joblist_path_in(&self.job_root)
    }
}

/// Resolve the job list path under a job root.
pub fn joblist_path_in(job_root: &Path) -> PathBuf {
    job_root.join(JOBLIST_FILE_NAME)
}

/// Read only the job root, for commands that never touch the controller.
pub fn job_root_from_env() -> Result<PathBuf> {
    std::env::var(JOB_ROOT_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| DedupError::MissingConfig(vec![JOB_ROOT_ENV]))
}

fn parse_grace_secs(raw: &str) -> Result<Duration> {
    raw.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|err| DedupError::InvalidConfig {
            key: GRACE_SECS_ENV,
            reason: format!("{raw:?} is not a whole number of seconds ({err})"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn from_lookup_reads_all_settings() {
        let config = DedupConfig::from_lookup(lookup(&[
            (JOB_ROOT_ENV, "/srv/jobs"),
            (CONTROLLER_EXE_ENV, "/opt/controller/bin/controller"),
            (CONTROLLER_IMAGE_ENV, "controller"),
            (GRACE_SECS_ENV, "12"),
        ]))
        .expect("config");

        assert_eq!(config.job_root, PathBuf::from("/srv/jobs"));
        assert_eq!(
            config.controller_exe,
            PathBuf::from("/opt/controller/bin/controller")
        );
        assert_eq!(config.controller_image, "controller");
        assert_eq!(config.grace_period, Duration::from_secs(12));
        assert_eq!(
            config.joblist_path(),
            PathBuf::from("/srv/jobs").join(JOBLIST_FILE_NAME)
        );
    }

    #[test]
    fn grace_period_defaults_when_unset() {
        let config = DedupConfig::from_lookup(lookup(&[
            (JOB_ROOT_ENV, "/srv/jobs"),
            (CONTROLLER_EXE_ENV, "controller"),
            (CONTROLLER_IMAGE_ENV, "controller"),
        ]))
        .expect("config");
        assert_eq!(config.grace_period, DEFAULT_GRACE_PERIOD);
    }

    #[test]
    fn reports_every_missing_key_at_once() {
        let err = DedupConfig::from_lookup(lookup(&[(CONTROLLER_EXE_ENV, "controller")]))
            .expect_err("missing keys");
        match err {
            DedupError::MissingConfig(keys) => {
                assert_eq!(keys, vec![JOB_ROOT_ENV, CONTROLLER_IMAGE_ENV]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_values_count_as_missing() {
        let err = DedupConfig::from_lookup(lookup(&[
            (JOB_ROOT_ENV, "   "),
            (CONTROLLER_EXE_ENV, "controller"),
            (CONTROLLER_IMAGE_ENV, "controller"),
        ]))
        .expect_err("blank job root");
        assert!(matches!(err, DedupError::MissingConfig(keys) if keys == vec![JOB_ROOT_ENV]));
    }

    #[test]
    fn rejects_non_numeric_grace_period() {
        let err = DedupConfig::from_lookup(lookup(&[
            (JOB_ROOT_ENV, "/srv/jobs"),
            (CONTROLLER_EXE_ENV, "controller"),
            (CONTROLLER_IMAGE_ENV, "controller"),
            (GRACE_SECS_ENV, "soon"),
        ]))
        .expect_err("bad grace period");
        assert!(matches!(
            err,
            DedupError::InvalidConfig {
                key: GRACE_SECS_ENV,
                ..
            }
        ));
    }
}
