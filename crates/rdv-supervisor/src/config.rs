//! Launch configuration for the external worker program.

use std::path::{Path, PathBuf};

/// Everything needed to build the worker's command line and working
/// directory. The front-end assembles one of these from the model
/// description's vendor annotations before handing it to
/// [`crate::WorkerSupervisor::spawn`].
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Resolved path to the executable (absolute, from a `file://` URI, or
    /// a bare name resolved via `PATH`).
    pub executable: PathBuf,
    /// The entry-point file passed as the worker's default main argument.
    /// Absent when the model description supplies an explicit `mainArguments`
    /// string instead.
    pub entry_point: Option<PathBuf>,
    pub pre_args: Option<String>,
    pub main_args: Option<String>,
    pub post_args: Option<String>,
    /// Overrides the default working-directory resolution chain
    /// (entry-point dir → executable dir → current dir).
    pub working_dir_hint: Option<PathBuf>,
}

impl LaunchConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        LaunchConfig {
            executable: executable.into(),
            entry_point: None,
            pre_args: None,
            main_args: None,
            post_args: None,
            working_dir_hint: None,
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<PathBuf>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn with_pre_args(mut self, args: impl Into<String>) -> Self {
        self.pre_args = Some(args.into());
        self
    }

    pub fn with_main_args(mut self, args: impl Into<String>) -> Self {
        self.main_args = Some(args.into());
        self
    }

    pub fn with_post_args(mut self, args: impl Into<String>) -> Self {
        self.post_args = Some(args.into());
        self
    }

    pub fn with_working_dir_hint(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir_hint = Some(dir.into());
        self
    }

    /// The single command-line argument the worker sees for its "main"
    /// positional parameter: explicit `main_args` wins, otherwise the
    /// entry-point path.
    pub fn main_argument(&self) -> Option<String> {
        if let Some(main) = &self.main_args {
            return Some(main.clone());
        }
        self.entry_point
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
    }

    /// Working directory resolution chain: directory of the
    /// entry-point file; if missing, directory of the executable; if
    /// still missing, the process's current directory.
    pub fn resolve_working_dir(&self) -> PathBuf {
        if let Some(hint) = &self.working_dir_hint {
            if hint.is_dir() {
                return hint.clone();
            }
        }
        if let Some(entry) = &self.entry_point {
            if let Some(dir) = parent_dir(entry) {
                return dir;
            }
        }
        if let Some(dir) = parent_dir(&self.executable) {
            return dir;
        }
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    }
}

fn parent_dir(path: &Path) -> Option<PathBuf> {
    let parent = path.parent()?;
    if parent.as_os_str().is_empty() {
        return None;
    }
    parent.is_dir().then(|| parent.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_argument_prefers_explicit_main_args() {
        let cfg = LaunchConfig::new("/bin/worker")
            .with_entry_point("/models/a/input.dat")
            .with_main_args("--headless");
        assert_eq!(cfg.main_argument().as_deref(), Some("--headless"));
    }

    #[test]
    fn main_argument_falls_back_to_entry_point() {
        let cfg = LaunchConfig::new("/bin/worker").with_entry_point("/models/a/input.dat");
        assert_eq!(cfg.main_argument().as_deref(), Some("/models/a/input.dat"));
    }

    #[test]
    fn working_dir_falls_back_to_current_dir_when_nothing_exists() {
        let cfg = LaunchConfig::new("unknown_application");
        let dir = cfg.resolve_working_dir();
        assert!(dir.is_absolute() || dir == PathBuf::from("."));
    }

    #[test]
    fn working_dir_prefers_entry_point_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let entry = tmp.path().join("model.dat");
        std::fs::write(&entry, b"").unwrap();
        let cfg = LaunchConfig::new("unknown_application").with_entry_point(&entry);
        assert_eq!(cfg.resolve_working_dir(), tmp.path());
    }
}
