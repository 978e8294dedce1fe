use getset::Getters;
use serde::Deserialize;

use crate::telemetry::TelemetryConfig;

#[derive(Default, Clone, Deserialize, Debug, Getters)]
#[getset(get = "pub")]
pub struct UploadSystemConfig {
    #[serde(default)]
    host: HostConfig,
    #[serde(default)]
    telemetry: TelemetryConfig,
    #[serde(default)]
    file_system: FileSystemConfig,
}

#[derive(Deserialize, Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct HostConfig {
    #[serde(default = "HostConfig::default_address")]
    bind_address: String,
    #[serde(default = "HostConfig::default_port")]
    bind_port: u16,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_address: Self::default_address(),
            bind_port: Self::default_port(),
        }
    }
}

impl HostConfig {
    fn default_address() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        8080
    }
}

#[derive(Deserialize, Clone, Debug, Getters)]
#[getset(get = "pub")]
pub struct FileSystemConfig {
    /// Root of the per-upload scratch namespaces.
    #[serde(default = "FileSystemConfig::default_scratch_base")]
    scratch_base: String,
    /// Directory receiving assembled files.
    #[serde(default = "FileSystemConfig::default_artifact_base")]
    artifact_base: String,
    /// Upper bound of one multipart request in bytes.
    #[serde(default = "FileSystemConfig::default_multipart_total_limit")]
    multipart_total_limit: usize,
}

impl Default for FileSystemConfig {
    fn default() -> Self {
        Self {
            scratch_base: Self::default_scratch_base(),
            artifact_base: Self::default_artifact_base(),
            multipart_total_limit: Self::default_multipart_total_limit(),
        }
    }
}

impl FileSystemConfig {
    fn default_scratch_base() -> String {
        "scratch".to_string()
    }

    fn default_artifact_base() -> String {
        "uploads".to_string()
    }

    fn default_multipart_total_limit() -> usize {
        100 * 1024 * 1024
    }
}

/// Layers `config.yaml`, yaml files named on the command line and
/// `CHUNKED_UPLOAD__*` environment variables, later sources winning.
pub fn build_config() -> anyhow::Result<UploadSystemConfig> {
    let args: Vec<String> = std::env::args().collect();
    let mut config = config::Config::builder().add_source(
        config::File::with_name("config")
            .required(false)
            .format(config::FileFormat::Yaml),
    );
    for arg in args {
        if arg.ends_with("yaml") || arg.ends_with("yml") {
            config = config.add_source(
                config::File::from(std::path::Path::new(arg.as_str()))
                    .format(config::FileFormat::Yaml)
                    .required(false),
            );
        }
    }
    config = config.add_source(
        config::Environment::with_prefix("CHUNKED_UPLOAD")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );
    Ok(config.build()?.try_deserialize()?)
}
