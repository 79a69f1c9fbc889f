//! Process-wide configuration, loaded from the environment.

use std::path::PathBuf;

const DEFAULT_GENERATE_DIR: &str = "./generated";
const DEFAULT_MAX_UNIQUE_RETRIES: u32 = 1000;

/// Configuration for a `datagen` process, grounded on the original system's
/// `backend/config/config.go` (environment-variable-driven, with sane defaults so the binary
/// runs with zero setup).
#[derive(Clone, Debug)]
pub struct Config {
    /// Directory file-based sinks write into. Created if missing.
    pub generate_dir: PathBuf,
    /// Upper bound on retries when generating a value for a `unique` field.
    pub max_unique_retries: u32,
}

impl Config {
    /// Reads configuration from the environment:
    ///
    /// - `DATAGEN_GENERATE_DIR` (default `"./generated"`)
    /// - `DATAGEN_MAX_UNIQUE_RETRIES` (default `1000`; non-numeric values are ignored)
    pub fn from_env() -> Self {
        let generate_dir = std::env::var("DATAGEN_GENERATE_DIR")
            .unwrap_or_else(|_| DEFAULT_GENERATE_DIR.to_owned())
            .into();
        let max_unique_retries = std::env::var("DATAGEN_MAX_UNIQUE_RETRIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_UNIQUE_RETRIES);
        Self { generate_dir, max_unique_retries }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self { generate_dir: PathBuf::from(DEFAULT_GENERATE_DIR), max_unique_retries: DEFAULT_MAX_UNIQUE_RETRIES }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_fallbacks() {
        let config = Config::default();
        assert_eq!(config.generate_dir, PathBuf::from(DEFAULT_GENERATE_DIR));
        assert_eq!(config.max_unique_retries, DEFAULT_MAX_UNIQUE_RETRIES);
    }
}
