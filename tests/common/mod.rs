//! Shared test infrastructure for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Environment keys the binary reads; cleared before every run so the host
/// environment cannot leak in.
const CONFIG_KEYS: [&str; 4] = [
    "JOBDEDUP_JOB_ROOT",
    "JOBDEDUP_CONTROLLER_EXE",
    "JOBDEDUP_CONTROLLER_IMAGE",
    "JOBDEDUP_GRACE_SECS",
];

/// A job root on disk with a `JobList.xml` and one folder per entry.
pub struct JobRoot {
    pub dir: TempDir,
}

impl JobRoot {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut text = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<JobList>\n");
        for (name, stamp) in entries {
            text.push_str(&format!(
                "  <Item Status=\"Finished\">\n    <Name>{name}</Name>\n    <Folder>{stamp}</Folder>\n  </Item>\n"
            ));
            let job_dir = dir.path().join(stamp);
            fs::create_dir_all(&job_dir).expect("create job folder");
            fs::write(job_dir.join("output.log"), b"done").expect("write job file");
        }
        text.push_str("</JobList>\n");
        fs::write(dir.path().join("JobList.xml"), text).expect("write job list");
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn joblist(&self) -> PathBuf {
        self.path().join("JobList.xml")
    }

    pub fn has_folder(&self, stamp: &str) -> bool {
        self.path().join(stamp).is_dir()
    }
}

/// Run the built binary with a scrubbed configuration environment.
pub fn jobdedup(args: &[&str], env: &[(&str, &str)]) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_jobdedup"));
    command.args(args);
    for key in CONFIG_KEYS {
        command.env_remove(key);
    }
    command.env("RUST_LOG", "info");
    for (key, value) in env {
        command.env(key, value);
    }
    command.output().expect("run jobdedup")
}

/// `(name, folder)` pairs of a job list, in document order.
pub fn entries(path: &Path) -> Vec<(String, String)> {
    let text = fs::read_to_string(path).expect("read job list");
    let mut entries = Vec::new();
    for block in text.split("<Item").skip(1) {
        let field = |tag: &str| {
            let open = format!("<{tag}>");
            let close = format!("</{tag}>");
            let start = block.find(&open).expect("field open") + open.len();
            let end = block.find(&close).expect("field close");
            block[start..end].trim().to_string()
        };
        entries.push((field("Name"), field("Folder")));
    }
    entries
}
