//! # Config - bundle settings
//!
//! All settings come from environment variables with defaults:
//!
//! ```text
//! BUNDLE_PATH        bundle file path                 (default: "assets.bundle")
//! BUNDLE_READ_ONLY   open without write access        (default: "false")
//! BUNDLE_RESERVE     default slack bytes per import   (default: 0)
//! BUNDLE_COPY_CHUNK  compaction copy chunk in bytes   (default: 4096)
//! ```
//!
//! Unparseable values fall back to the default with a warning.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

pub const ENV_PATH: &str = "BUNDLE_PATH";
pub const ENV_READ_ONLY: &str = "BUNDLE_READ_ONLY";
pub const ENV_RESERVE: &str = "BUNDLE_RESERVE";
pub const ENV_COPY_CHUNK: &str = "BUNDLE_COPY_CHUNK";

pub const DEFAULT_PATH: &str = "assets.bundle";
pub const DEFAULT_RESERVE: u64 = 0;
pub const DEFAULT_COPY_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    pub path: PathBuf,
    pub read_only: bool,
    /// Slack reserved after each imported asset unless a command overrides it.
    pub default_reserve: u64,
    /// Buffer size for compaction block moves. Always at least 1.
    pub copy_chunk_size: usize,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_PATH),
            read_only: false,
            default_reserve: DEFAULT_RESERVE,
            copy_chunk_size: DEFAULT_COPY_CHUNK,
        }
    }
}

impl BundleConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup. Missing keys
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let path = lookup(ENV_PATH)
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.path);

        Self {
            path,
            read_only: parse_or(&lookup, ENV_READ_ONLY, defaults.read_only),
            default_reserve: parse_or(&lookup, ENV_RESERVE, defaults.default_reserve),
            copy_chunk_size: parse_or(&lookup, ENV_COPY_CHUNK, defaults.copy_chunk_size).max(1),
        }
    }

    pub fn with_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_default_reserve(mut self, reserve: u64) -> Self {
        self.default_reserve = reserve;
        self
    }

    pub fn with_copy_chunk_size(mut self, size: usize) -> Self {
        self.copy_chunk_size = size.max(1);
        self
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                warn!(key, value = %raw, "ignoring unparseable setting");
                default
            }
        },
        None => default,
    }
}
