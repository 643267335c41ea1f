//! Configuration types for directory watching.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};

/// Configuration for a watched tree.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Root directory of the tree.
    pub root: PathBuf,

    /// Pattern tested against changed path names.
    pub pattern: PathPattern,

    /// Admission limits for the watch registry.
    pub quota: Quota,
}

impl WatchConfig {
    /// Create a new watch config with the default quota.
    pub fn new(root: impl Into<PathBuf>, pattern: PathPattern) -> Self {
        Self {
            root: root.into(),
            pattern,
            quota: Quota::default(),
        }
    }

    /// Set the admission quota.
    pub fn with_quota(mut self, quota: Quota) -> Self {
        self.quota = quota;
        self
    }
}

/// Admission limits enforced by the [`WatchRegistry`](crate::WatchRegistry).
///
/// Both limits are only consulted when a path that is already being watched
/// is requested again. A first request for a new path is always admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quota {
    /// Maximum outstanding requests for a single path.
    pub per_path_limit: usize,

    /// Maximum distinct paths tolerated when a repeat request arrives.
    pub distinct_path_limit: usize,
}

impl Quota {
    /// Set the per-path limit.
    pub fn with_per_path_limit(mut self, limit: usize) -> Self {
        self.per_path_limit = limit;
        self
    }

    /// Set the distinct-path limit.
    pub fn with_distinct_path_limit(mut self, limit: usize) -> Self {
        self.distinct_path_limit = limit;
        self
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            per_path_limit: 40,
            distinct_path_limit: 3,
        }
    }
}

/// Regular expression matched against the full path name of a change.
#[derive(Debug, Clone)]
pub struct PathPattern(Regex);

impl PathPattern {
    /// Compile a pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|e| WatcherError::InvalidPattern(format!("{pattern}: {e}")))
    }

    /// Check if a changed path matches.
    pub fn is_match(&self, path: &Path) -> bool {
        self.0.is_match(&path.to_string_lossy())
    }

    /// The source text of the pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl FromStr for PathPattern {
    type Err = WatcherError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_watch_config_creation() {
        let pattern = PathPattern::new(r"\.go$").unwrap();
        let config = WatchConfig::new("/home/user/project", pattern)
            .with_quota(Quota::default().with_per_path_limit(2));

        assert_eq!(config.root, Path::new("/home/user/project"));
        assert_eq!(config.pattern.as_str(), r"\.go$");
        assert_eq!(config.quota.per_path_limit, 2);
        assert_eq!(config.quota.distinct_path_limit, 3);
    }

    #[test]
    fn test_pattern_matches_full_path() {
        let pattern: PathPattern = r"\.go$".parse().unwrap();

        assert!(pattern.is_match(Path::new("./foo.go")));
        assert!(pattern.is_match(Path::new("./pkg/sub/bar.go")));
        assert!(!pattern.is_match(Path::new("./foo.txt")));
        assert!(!pattern.is_match(Path::new("./foo.go.swp")));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PathPattern::new("(unclosed").unwrap_err();
        assert!(matches!(err, WatcherError::InvalidPattern(_)));
    }

    #[test]
    fn test_quota_from_partial_toml() {
        let quota: Quota = toml::from_str("per_path_limit = 7").unwrap();
        assert_eq!(
            quota,
            Quota {
                per_path_limit: 7,
                distinct_path_limit: 3,
            }
        );
    }
}
