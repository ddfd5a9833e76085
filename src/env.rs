use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::LauncherError;

/// Snapshot of process environment variables.
///
/// The launcher never reads `std::env` after startup; everything downstream
/// works on an explicit `Environment` so it can be built by hand in tests.
///
/// Names are case-insensitive on Windows (`Path` and `PATH` are the same
/// variable there), so keys are folded to upper case when `fold_case` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Environment {
    vars: HashMap<String, String>,
    fold_case: bool,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            vars: HashMap::new(),
            fold_case: cfg!(windows),
        }
    }
}

impl Environment {
    /// Create a new empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the environment of the parent process.
    ///
    /// Variables whose name or value is not valid unicode are skipped.
    pub fn from_parent() -> Self {
        std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    /// Switch name matching between case-sensitive and case-insensitive,
    /// re-keying what is already stored
    pub fn with_case_folding(self, fold_case: bool) -> Self {
        let vars = self
            .vars
            .into_iter()
            .map(|(key, value)| (fold_key(key, fold_case), value))
            .collect();
        Self { vars, fold_case }
    }

    fn key(&self, key: &str) -> String {
        fold_key(key.to_string(), self.fold_case)
    }

    /// Get a variable, treating an empty value as undefined
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(&self.key(key))
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Set a variable
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = fold_key(key.into(), self.fold_case);
        self.vars.insert(key, value.into());
    }

    /// Remove a variable
    pub fn unset(&mut self, key: &str) -> Option<String> {
        let key = self.key(key);
        self.vars.remove(&key)
    }

    /// Check if a variable is defined with a non-empty value
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get the number of variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Directory under which per-user application data lives.
    ///
    /// `APPDATA` wins when set. Otherwise Windows falls back to
    /// `<home>/AppData/Roaming`, everything else to `XDG_DATA_HOME` or
    /// `<home>/.local/share`.
    pub fn app_data_root(&self) -> Result<PathBuf, LauncherError> {
        if let Some(appdata) = self.get("APPDATA") {
            return Ok(PathBuf::from(appdata));
        }

        if !cfg!(windows)
            && let Some(xdg) = self.get("XDG_DATA_HOME")
        {
            return Ok(PathBuf::from(xdg));
        }

        // HOME is either in the snapshot, or retrieved from the user database
        let home_dir = match self.get("HOME") {
            Some(home) => PathBuf::from(home),
            None => match home::home_dir() {
                Some(path) if !path.as_os_str().is_empty() => path,
                _ => return Err(LauncherError::NoAppDataDir),
            },
        };

        if cfg!(windows) {
            Ok(home_dir.join("AppData").join("Roaming"))
        } else {
            Ok(home_dir.join(".local").join("share"))
        }
    }

    /// `PATH` with `dir` prepended, using the platform separator
    pub fn path_with_prefix(&self, dir: &Path) -> OsString {
        let mut entries = vec![dir.to_path_buf()];
        if let Some(path) = self.get("PATH") {
            entries.extend(std::env::split_paths(path));
        }
        // Only fails if an entry contains the separator, which `dir` is not expected to
        std::env::join_paths(&entries).unwrap_or_else(|_| dir.as_os_str().to_os_string())
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Self::default();
        for (key, value) in iter {
            env.set(key, value);
        }
        env
    }
}

fn fold_key(key: String, fold_case: bool) -> String {
    if fold_case {
        key.to_uppercase()
    } else {
        key
    }
}
