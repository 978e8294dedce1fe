use serde::Deserialize;
use tracing::metadata::LevelFilter;
use tracing_appender::rolling::Rotation;

/// Logging setup of the host.
///
/// One global filter applies to every output; outputs only choose where
/// records go and how much source detail they carry.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enable: bool,
    /// Level used when no directive matches.
    pub max_level: LoggingLevel,
    /// Filter directives, e.g. `service_upload=debug`.
    pub level_filter: String,
    /// Environment variable read for directives when `level_filter` is empty.
    pub level_filter_env: String,
    pub console: ConsoleConfig,
    pub file: FileConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable: true,
            max_level: LoggingLevel::default(),
            level_filter: String::new(),
            level_filter_env: String::new(),
            console: ConsoleConfig::default(),
            file: FileConfig::default(),
        }
    }
}

#[derive(Default, Deserialize, Clone, Copy, Debug)]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<LoggingLevel> for LevelFilter {
    fn from(val: LoggingLevel) -> Self {
        match val {
            LoggingLevel::Error => LevelFilter::ERROR,
            LoggingLevel::Warn => LevelFilter::WARN,
            LoggingLevel::Info => LevelFilter::INFO,
            LoggingLevel::Debug => LevelFilter::DEBUG,
            LoggingLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enable: bool,
    /// Decorate records with file, line, thread and target.
    pub verbose: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enable: true,
            verbose: false,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct FileConfig {
    pub enable: bool,
    pub verbose: bool,
    pub path: String,
    /// File name, or its prefix when rolling.
    pub prefix: String,
    pub rolling_time: RotationLevel,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            enable: false,
            verbose: false,
            path: "./logs".to_owned(),
            prefix: "chunked-upload.log".to_owned(),
            rolling_time: RotationLevel::default(),
        }
    }
}

#[derive(Default, Deserialize, Clone, Copy, Debug)]
pub enum RotationLevel {
    Daily,
    Hourly,
    #[default]
    Never,
}

impl From<RotationLevel> for Rotation {
    fn from(val: RotationLevel) -> Self {
        match val {
            RotationLevel::Daily => Rotation::DAILY,
            RotationLevel::Hourly => Rotation::HOURLY,
            RotationLevel::Never => Rotation::NEVER,
        }
    }
}
