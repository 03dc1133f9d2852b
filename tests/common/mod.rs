//! Shared test utilities for the CLI end-to-end tests.
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = TestFixture::new().with_file("meta.yaml", metafiles::MINIMAL);
//! fixture.command().args(["validate", "meta.yaml"]).assert().success();
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::metafiles;
    #[allow(unused_imports)]
    pub use super::{git_available, run_git, BareRemote};
    pub use super::TestFixture;
}

/// Metafile snippets.
#[allow(dead_code)]
pub mod metafiles {
    /// Valid metafile with one rendered and one verbatim file.
    pub const MINIMAL: &str = r#"chart:
  name: app
  version: 1.0.0
  description: Demo application
files:
  - path: values.yaml
    template: true
    outputFilename: "values-{{ .Values.environment }}.yaml"
    content: |
      image: {{ .Values.image.repository }}:{{ .Values.image.tag }}
      replicas: {{ .Values.replicas }}
  - path: NOTES.txt
    content: "Installed {{ .Release.Name }}\n"
valuesSchema:
  environment: { type: string }
  image.repository: { type: string, default: nginx }
  image.tag: { type: string, required: true }
  replicas: { type: integer, default: 1 }
"#;

    /// Chart section without a version.
    pub const MISSING_VERSION: &str = r#"chart:
  name: app
  description: Demo application
files: []
"#;

    /// References a key valuesSchema does not declare.
    pub const UNDECLARED_KEY: &str = r#"chart: { name: app, version: 1.0.0, description: demo }
files:
  - path: values.yaml
    template: true
    content: "replicas: {{ .Values.replica }}"
valuesSchema:
  replicas: { type: integer }
"#;

    /// Declares a type outside the known set.
    pub const BAD_TYPE: &str = r#"chart: { name: app, version: 1.0.0, description: demo }
files: []
valuesSchema:
  replicas: { type: number }
"#;
}

/// Whether a `git` binary can be run.
#[allow(dead_code)]
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|o| o.status.success())
}

/// Run git in `dir` with a fixed identity, panicking on failure.
#[allow(dead_code)]
pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(["-c", "user.name=test-user", "-c", "user.email=test@example.com"])
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A local bare repository with one commit on `main`.
#[allow(dead_code)]
pub struct BareRemote {
    pub path: PathBuf,
}

#[allow(dead_code)]
impl BareRemote {
    pub fn create(root: &Path, files: &[(&str, &str)]) -> Self {
        let path = root.join("remote.git");
        let seed = root.join("seed");
        std::fs::create_dir_all(&path).expect("Failed to create remote dir");
        std::fs::create_dir_all(&seed).expect("Failed to create seed dir");
        run_git(&path, &["init", "--bare", "--initial-branch=main"]);
        run_git(&seed, &["init"]);
        run_git(&seed, &["checkout", "-b", "main"]);
        for (name, content) in files {
            let file = seed.join(name);
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create parent dir");
            }
            std::fs::write(file, content).expect("Failed to write seed file");
        }
        run_git(&seed, &["add", "-A"]);
        run_git(&seed, &["commit", "--allow-empty", "-m", "initial"]);
        run_git(&seed, &["remote", "add", "origin", &path.display().to_string()]);
        run_git(&seed, &["push", "origin", "main"]);
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }

    /// Content of `file` on `main`.
    pub fn show(&self, file: &str) -> String {
        run_git(&self.path, &["show", &format!("main:{}", file)])
    }

    pub fn last_subject(&self) -> String {
        run_git(&self.path, &["log", "-1", "--format=%s"]).trim().to_string()
    }

    pub fn commit_count(&self) -> usize {
        run_git(&self.path, &["rev-list", "--count", "main"])
            .trim()
            .parse()
            .expect("Failed to parse commit count")
    }
}

/// A temporary directory used as the working directory of the CLI.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Write `config/application.yaml`.
    #[allow(dead_code)]
    pub fn with_config(self, content: &str) -> Self {
        self.with_file("config/application.yaml", content)
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// A `chart-sync` command running in the fixture directory, with
    /// colours off and no inherited configuration or secrets.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("chart-sync");
        cmd.current_dir(self.path())
            .env_remove("CHART_SYNC_CONFIG")
            .env_remove("CHART_SYNC_SOURCE_SECRET")
            .env_remove("CHART_SYNC_DESTINATION_SECRET")
            .env_remove("CHART_SYNC_CHECK_SECRET")
            .env_remove("RUST_LOG")
            .arg("--color")
            .arg("never");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
