//! Logging configuration
//!
//! A [`LogConfig`] picks the outputs and the filter. The filter is a default
//! level plus per-target overrides, so the per-packet trace output of the
//! tables can be silenced or opened up independently of the forwarder:
//!
//! ```toml
//! default_level = "info"
//!
//! [targets]
//! skein_table = "warn"
//! "skein_fw::forwarder" = "debug"
//!
//! [console]
//! format = "pretty"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Crates whose levels the presets tune
const FW_TARGET: &str = "skein_fw";
const TABLE_TARGET: &str = "skein_table";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for targets without an override; `RUST_LOG` replaces the
    /// whole filter when set
    pub default_level: String,
    /// Per-target level overrides
    pub targets: BTreeMap<String, String>,
    pub console: ConsoleConfig,
    pub file: Option<FileConfig>,
    pub jsonl: JsonlConfig,
}

impl Default for LogConfig {
    /// Info level, JSONL on stdout, table internals at warn
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            targets: BTreeMap::from([(TABLE_TARGET.to_string(), "warn".to_string())]),
            console: ConsoleConfig::default(),
            file: None,
            jsonl: JsonlConfig::default(),
        }
    }
}

impl LogConfig {
    /// Pretty console output at debug, tables at info
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleConfig::pretty(),
            ..Self::default()
        }
        .with_target(TABLE_TARGET, "info")
    }

    /// Every pipeline step and table operation, one JSON line each
    ///
    /// For following individual packets through a forwarder; the span list
    /// shows which node and pipeline produced each line.
    pub fn packet_trace() -> Self {
        Self {
            default_level: "info".to_string(),
            targets: BTreeMap::new(),
            jsonl: JsonlConfig {
                include_location: false,
                ..JsonlConfig::default()
            },
            ..Self::default()
        }
        .with_target(FW_TARGET, "trace")
        .with_target(TABLE_TARGET, "trace")
    }

    /// Daily-rotated JSONL files in `log_dir`, no console
    pub fn production(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            console: ConsoleConfig::disabled(),
            file: Some(FileConfig::rotating(log_dir, RotationStrategy::Daily).with_max_files(30)),
            ..Self::default()
        }
    }

    /// Warnings only
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            targets: BTreeMap::new(),
            ..Self::default()
        }
    }

    /// Override the level of one target
    pub fn with_target(mut self, target: impl Into<String>, level: impl Into<String>) -> Self {
        self.targets.insert(target.into(), level.into());
        self
    }

    /// `EnvFilter` directives: the default level, then each override
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.default_level.clone()];
        directives.extend(
            self.targets
                .iter()
                .map(|(target, level)| format!("{target}={level}")),
        );
        directives.join(",")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsoleFormat {
    /// JSON lines, same shape as file output
    #[default]
    Jsonl,
    /// Human-readable
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: ConsoleFormat,
    /// Colors; only used by the pretty format
    pub ansi: bool,
}

impl ConsoleConfig {
    pub fn pretty() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Pretty,
            ansi: true,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn is_pretty(&self) -> bool {
        self.format == ConsoleFormat::Pretty
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            format: ConsoleFormat::Jsonl,
            ansi: false,
        }
    }
}

/// JSONL file output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    pub directory: PathBuf,
    /// File name stem; rotated files get a date suffix
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub rotation: RotationStrategy,
    /// Rotated files kept; unlimited when absent
    #[serde(default)]
    pub max_files: Option<usize>,
}

fn default_prefix() -> String {
    "skein".to_string()
}

impl FileConfig {
    /// Rotated files named `skein.<date>.log` in `directory`
    pub fn rotating(directory: impl Into<PathBuf>, rotation: RotationStrategy) -> Self {
        Self {
            directory: directory.into(),
            prefix: default_prefix(),
            rotation,
            max_files: None,
        }
    }

    /// One file, `<prefix>.log`, truncated when logging starts
    ///
    /// Useful for a single run of a topology, where every forwarder's
    /// lines end up in the same file tagged with their node.
    pub fn single(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            rotation: RotationStrategy::Never,
            max_files: None,
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = Some(max_files);
        self
    }

    /// Path of the log file when rotation is off
    pub fn single_path(&self) -> PathBuf {
        Path::new(&self.directory).join(format!("{}.log", self.prefix))
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self::rotating("./logs", RotationStrategy::Daily).with_max_files(7)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Put event fields at the top level instead of under `fields`
    pub flatten_events: bool,
    /// Include the enclosing spans, which carry `node_id`
    pub include_spans: bool,
    pub include_thread_info: bool,
    pub include_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_thread_info: false,
            include_location: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quiets_tables() {
        let config = LogConfig::default();
        assert_eq!(config.filter_directives(), "info,skein_table=warn");
        assert!(!config.console.is_pretty());
        assert!(config.file.is_none());
    }

    #[test]
    fn test_packet_trace_opens_fw_and_tables() {
        let config = LogConfig::packet_trace();
        assert_eq!(config.filter_directives(), "info,skein_fw=trace,skein_table=trace");
        assert!(config.jsonl.include_spans);
        assert!(!config.jsonl.include_location);
    }

    #[test]
    fn test_development_and_testing() {
        let dev = LogConfig::development();
        assert_eq!(dev.filter_directives(), "debug,skein_table=info");
        assert!(dev.console.is_pretty() && dev.console.ansi);

        assert_eq!(LogConfig::testing().filter_directives(), "warn");
    }

    #[test]
    fn test_production_rotates_files() {
        let config = LogConfig::production("/var/log/skein");
        assert!(!config.console.enabled);
        let file = config.file.unwrap();
        assert_eq!(file.rotation, RotationStrategy::Daily);
        assert_eq!(file.max_files, Some(30));
        assert_eq!(file.prefix, "skein");
    }

    #[test]
    fn test_single_file_path() {
        let file = FileConfig::single("/tmp/run", "topology");
        assert_eq!(file.single_path(), PathBuf::from("/tmp/run/topology.log"));
        assert_eq!(file.rotation, RotationStrategy::Never);
    }

    #[test]
    fn test_partial_config_from_json() {
        let json = r#"{
            "default_level": "debug",
            "targets": { "skein_fw::forwarder": "trace" },
            "console": { "format": "pretty" },
            "file": { "directory": "/tmp/skein", "rotation": "hourly" }
        }"#;
        let config: LogConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.filter_directives(), "debug,skein_fw::forwarder=trace");
        assert!(config.console.enabled && config.console.is_pretty());
        let file = config.file.unwrap();
        assert_eq!(file.rotation, RotationStrategy::Hourly);
        assert_eq!(file.prefix, "skein");
        assert_eq!(config.jsonl, JsonlConfig::default());
    }
}
