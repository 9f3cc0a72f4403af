use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::{error::UploadResult, models::UploadDirectory};

/// Default config file looked up relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config/stl-upload";

/// Prefix for environment overrides, e.g. `STL_UPLOAD__STORAGE__UPLOAD_DIR`
pub const ENV_PREFIX: &str = "STL_UPLOAD";

/// Main configuration structure for the upload service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upload storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request size in bytes, unlimited when unset
    #[serde(default)]
    pub max_request_size: Option<usize>,
}

/// Local upload storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory that returned paths are relative to
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    /// Upload directory, relative to `root_dir` unless absolute
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Multipart field carrying the file
    #[serde(default = "default_field_name")]
    pub field_name: String,
    /// Required filename extension, without the dot
    #[serde(default = "default_allowed_extension")]
    pub allowed_extension: String,
    /// How many discriminators to try before giving up on a name collision
    #[serde(default = "default_max_name_attempts")]
    pub max_name_attempts: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of compact text
    #[serde(default = "default_false")]
    pub json_format: bool,
}

impl UploadServiceConfig {
    /// Load configuration from the config file, `STL_UPLOAD__*` variables and
    /// the `PORT` override, in increasing order of precedence.
    pub fn load(config_file: Option<&str>, port: Option<String>) -> UploadResult<Self> {
        let file = match config_file {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .set_override_option("server.port", port)?
            .build()?;

        Ok(settings.try_deserialize::<UploadServiceConfig>()?)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl StorageConfig {
    pub fn upload_directory(&self) -> UploadDirectory {
        UploadDirectory::new(self.root_dir.clone(), self.upload_dir.clone())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_root_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_field_name() -> String {
    "stl".to_string()
}

fn default_allowed_extension() -> String {
    "stl".to_string()
}

fn default_max_name_attempts() -> u32 {
    64
}

fn default_log_level() -> String {
    "stl_upload_service=info,stl_upload=info,tower_http=info".to_string()
}

fn default_false() -> bool {
    false
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_size: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            upload_dir: default_upload_dir(),
            field_name: default_field_name(),
            allowed_extension: default_allowed_extension(),
            max_name_attempts: default_max_name_attempts(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: default_false(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = UploadServiceConfig::default();

        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.max_request_size, None);
        assert_eq!(config.storage.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.storage.field_name, "stl");
        assert_eq!(config.storage.allowed_extension, "stl");
        assert!(!config.logging.json_format);
    }

    #[test]
    fn test_port_override() {
        let config = UploadServiceConfig::load(None, Some("4321".to_string())).unwrap();
        assert_eq!(config.server.port, 4321);
        assert_eq!(config.bind_address(), "0.0.0.0:4321");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 8085\nmax_request_size = 4096\n\n[storage]\nupload_dir = \"models\"\nallowed_extension = \"obj\""
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = UploadServiceConfig::load(Some(&path), None).unwrap();

        assert_eq!(config.server.port, 8085);
        assert_eq!(config.server.max_request_size, Some(4096));
        assert_eq!(config.storage.upload_dir, PathBuf::from("models"));
        assert_eq!(config.storage.allowed_extension, "obj");
        // Untouched keys keep their defaults
        assert_eq!(config.storage.field_name, "stl");
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_port_override_beats_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 8085").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = UploadServiceConfig::load(Some(&path), Some("9000".to_string())).unwrap();

        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = UploadServiceConfig::load(Some("/nonexistent/stl-upload"), None);
        assert!(result.is_err());
    }
}
