use std::path::PathBuf;

/// Startup configuration for the view layer.
///
/// Parsed from command-line arguments by the embedding binary and passed to
/// `ViewEngine::bootstrap` and `MemoryStore::from_config`.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Directory of seed data (`{EntityType}/{id}.json`).
    /// Loaded into the in-memory store when present.
    pub data_dir: Option<PathBuf>,

    /// Compose every contract's fetch specification at bootstrap, so a
    /// cyclic or misnamed contract aborts startup instead of the first call.
    pub precompose: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            precompose: true,
        }
    }
}

impl ViewConfig {
    /// Parse configuration from command-line arguments.
    ///
    /// Supported flags:
    /// - `--data-dir=PATH`
    /// - `--precompose=true|false`
    /// - `--no-precompose`
    ///
    /// Unknown flags are ignored.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = ViewConfig::default();

        for arg in args {
            if let Some(val) = arg.strip_prefix("--data-dir=") {
                config.data_dir = Some(PathBuf::from(val));
            } else if let Some(val) = arg.strip_prefix("--precompose=") {
                config.precompose = !matches!(val, "false" | "0" | "no");
            } else if arg == "--no-precompose" {
                config.precompose = false;
            }
        }

        config
    }
}
