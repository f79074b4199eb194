//! Configuration management
//!
//! Configuration is loaded from a `config.yml` file and may be overridden by
//! `BACKDROP_*` environment variables. Missing values fall back to defaults,
//! so an absent or empty file is a valid configuration.

use argon2::password_hash::rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session cookie configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Artifact storage configuration
    #[serde(default)]
    pub upload: UploadConfig,
    /// External background removal command
    #[serde(default)]
    pub segmentation: SegmentationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL or file path
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Upper bound on pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/backdrop.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Key used to sign session cookies. Generated per process when absent.
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Session lifetime in days
    #[serde(default = "default_ttl_days")]
    pub ttl_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            ttl_days: default_ttl_days(),
        }
    }
}

fn default_ttl_days() -> i64 {
    7
}

impl SessionConfig {
    /// Key material for cookie signing.
    ///
    /// Without a configured key a random one is drawn, which means every
    /// restart logs all users out.
    pub fn signing_key(&self) -> Vec<u8> {
        match self.secret_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.as_bytes().to_vec(),
            _ => {
                tracing::warn!(
                    "No session secret key configured; generated a random one. \
                     Sessions will not survive a restart. Set BACKDROP_SECRET_KEY to fix this."
                );
                let mut key = vec![0u8; 32];
                OsRng.fill_bytes(&mut key);
                key
            }
        }
    }
}

/// Artifact storage configuration
///
/// The four artifact directories are relative to `static_root`; stored paths
/// in the database are relative to `static_root` as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Root directory served under `/static`
    #[serde(default = "default_static_root")]
    pub static_root: PathBuf,
    /// Subject photos as uploaded
    #[serde(default = "default_original_dir")]
    pub original_dir: String,
    /// Background-removed subjects
    #[serde(default = "default_cutout_dir")]
    pub cutout_dir: String,
    /// Background photos as uploaded
    #[serde(default = "default_background_dir")]
    pub background_dir: String,
    /// Cutouts composited over a background
    #[serde(default = "default_composed_dir")]
    pub composed_dir: String,
    /// Maximum size of one uploaded file, in bytes (default: 20MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

/// Room for the form fields and multipart framing around the files
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

impl UploadConfig {
    /// Body limit for upload requests: a subject and a background, each at
    /// the per-file limit.
    pub fn max_request_size(&self) -> u64 {
        self.max_file_size
            .saturating_mul(2)
            .saturating_add(MULTIPART_OVERHEAD)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            static_root: default_static_root(),
            original_dir: default_original_dir(),
            cutout_dir: default_cutout_dir(),
            background_dir: default_background_dir(),
            composed_dir: default_composed_dir(),
            max_file_size: default_max_file_size(),
        }
    }
}

fn default_static_root() -> PathBuf {
    PathBuf::from("static")
}

fn default_original_dir() -> String {
    "uploads/original".to_string()
}

fn default_cutout_dir() -> String {
    "uploads/cutout".to_string()
}

fn default_background_dir() -> String {
    "uploads/backgrounds".to_string()
}

fn default_composed_dir() -> String {
    "uploads/composed".to_string()
}

fn default_max_file_size() -> u64 {
    20 * 1024 * 1024 // 20MB
}

/// How backgrounds are removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentationBackend {
    /// Run an external program
    #[default]
    Command,
    /// Run an ONNX model in-process (requires the `imgly` feature)
    Imgly,
}

/// Background removal settings
///
/// With the `command` backend, `{input}` and `{output}` in `args` are
/// replaced with the source photo and the PNG the command must write.
/// The `imgly` backend loads `model_path` if set, otherwise the cached
/// model named by `model`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default)]
    pub backend: SegmentationBackend,
    /// Program to run
    #[serde(default = "default_segmentation_command")]
    pub command: String,
    /// Arguments passed to the program
    #[serde(default = "default_segmentation_args")]
    pub args: Vec<String>,
    /// Cached model id for the in-process backend
    #[serde(default = "default_segmentation_model")]
    pub model: String,
    /// ONNX model directory, overrides `model`
    #[serde(default)]
    pub model_path: Option<PathBuf>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            backend: SegmentationBackend::default(),
            command: default_segmentation_command(),
            args: default_segmentation_args(),
            model: default_segmentation_model(),
            model_path: None,
        }
    }
}

fn default_segmentation_command() -> String {
    "rembg".to_string()
}

fn default_segmentation_args() -> Vec<String> {
    vec![
        "i".to_string(),
        "{input}".to_string(),
        "{output}".to_string(),
    ]
}

fn default_segmentation_model() -> String {
    "imgly--isnet-general-onnx".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the default configuration; invalid YAML
    /// is reported with its line and column.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            })?;

        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - BACKDROP_SERVER_HOST
    /// - BACKDROP_SERVER_PORT
    /// - BACKDROP_DATABASE_URL
    /// - BACKDROP_SECRET_KEY
    /// - BACKDROP_UPLOAD_STATIC_ROOT
    /// - BACKDROP_SEGMENTATION_COMMAND
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("BACKDROP_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("BACKDROP_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(url) = std::env::var("BACKDROP_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(key) = std::env::var("BACKDROP_SECRET_KEY") {
            if !key.trim().is_empty() {
                self.session.secret_key = Some(key);
            }
        }

        if let Ok(root) = std::env::var("BACKDROP_UPLOAD_STATIC_ROOT") {
            self.upload.static_root = PathBuf::from(root);
        }

        if let Ok(command) = std::env::var("BACKDROP_SEGMENTATION_COMMAND") {
            self.segmentation.command = command;
        }
    }
}

/// Format YAML parsing error with location
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ENV_VARS: &[&str] = &[
        "BACKDROP_SERVER_HOST",
        "BACKDROP_SERVER_PORT",
        "BACKDROP_DATABASE_URL",
        "BACKDROP_SECRET_KEY",
        "BACKDROP_UPLOAD_STATIC_ROOT",
        "BACKDROP_SEGMENTATION_COMMAND",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = super::CONFIG_ENV_MUTEX
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        guard
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let path = std::path::Path::new("nonexistent_config.yml");
        let config = Config::load(path).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database.url, "data/backdrop.db");
        assert_eq!(config.session.ttl_days, 7);
        assert!(config.session.secret_key.is_none());
        assert_eq!(config.upload.static_root, PathBuf::from("static"));
        assert_eq!(config.upload.original_dir, "uploads/original");
        assert_eq!(config.upload.cutout_dir, "uploads/cutout");
        assert_eq!(config.upload.background_dir, "uploads/backgrounds");
        assert_eq!(config.upload.composed_dir, "uploads/composed");
        assert_eq!(config.segmentation.backend, SegmentationBackend::Command);
        assert_eq!(config.segmentation.command, "rembg");
        assert_eq!(config.segmentation.args, vec!["i", "{input}", "{output}"]);
        assert_eq!(config.segmentation.model, "imgly--isnet-general-onnx");
        assert!(config.segmentation.model_path.is_none());
    }

    #[test]
    fn test_request_limit_fits_two_files() {
        let upload = UploadConfig {
            max_file_size: 1000,
            ..UploadConfig::default()
        };
        assert_eq!(upload.max_request_size(), 2000 + 64 * 1024);

        let unbounded = UploadConfig {
            max_file_size: u64::MAX,
            ..UploadConfig::default()
        };
        assert_eq!(unbounded.max_request_size(), u64::MAX);
    }

    #[test]
    fn test_load_imgly_backend() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            "segmentation:\n  backend: imgly\n  model_path: /opt/models/isnet\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.segmentation.backend, SegmentationBackend::Imgly);
        assert_eq!(
            config.segmentation.model_path,
            Some(PathBuf::from("/opt/models/isnet"))
        );
        assert_eq!(config.segmentation.command, "rembg");
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "segmentation:\n  backend: magic\n").unwrap();

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_empty_file_returns_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "   \n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_load_partial_config_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "upload:\n  static_root: /srv/backdrop\n").unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.upload.static_root, PathBuf::from("/srv/backdrop"));
        assert_eq!(config.upload.cutout_dir, "uploads/cutout");
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
server:
  host: "127.0.0.1"
  port: 9000
database:
  url: "sqlite:/tmp/gallery.db"
  max_connections: 4
session:
  secret_key: "correct horse battery staple"
  ttl_days: 30
upload:
  static_root: "public"
  original_dir: "in"
  cutout_dir: "cut"
  background_dir: "bg"
  composed_dir: "out"
  max_file_size: 1024
segmentation:
  command: "python3"
  args: ["-m", "rembg.cli", "i", "{{input}}", "{{output}}"]
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.url, "sqlite:/tmp/gallery.db");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(
            config.session.secret_key.as_deref(),
            Some("correct horse battery staple")
        );
        assert_eq!(config.session.ttl_days, 30);
        assert_eq!(config.upload.static_root, PathBuf::from("public"));
        assert_eq!(config.upload.composed_dir, "out");
        assert_eq!(config.upload.max_file_size, 1024);
        assert_eq!(config.segmentation.command, "python3");
        assert_eq!(config.segmentation.args.len(), 5);
        assert_eq!(config.segmentation.args[3], "{input}");
    }

    #[test]
    fn test_load_invalid_yaml_returns_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: not_a_number\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();

        assert!(err.to_string().contains("Failed to parse config file"));
        assert!(err.to_string().contains("line"));
    }

    #[test]
    fn test_env_override_server_and_database() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("BACKDROP_SERVER_HOST", "192.168.1.1");
        std::env::set_var("BACKDROP_SERVER_PORT", "4000");
        std::env::set_var("BACKDROP_DATABASE_URL", ":memory:");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.database.url, ":memory:");

        std::env::remove_var("BACKDROP_SERVER_HOST");
        std::env::remove_var("BACKDROP_SERVER_PORT");
        std::env::remove_var("BACKDROP_DATABASE_URL");
    }

    #[test]
    fn test_env_override_secret_and_storage() {
        let _guard = lock_env();

        let file = NamedTempFile::new().unwrap();

        std::env::set_var("BACKDROP_SECRET_KEY", "from-env");
        std::env::set_var("BACKDROP_UPLOAD_STATIC_ROOT", "/var/lib/backdrop");
        std::env::set_var("BACKDROP_SEGMENTATION_COMMAND", "/usr/local/bin/rembg");

        let config = Config::load_with_env(file.path()).unwrap();

        assert_eq!(config.session.secret_key.as_deref(), Some("from-env"));
        assert_eq!(
            config.upload.static_root,
            PathBuf::from("/var/lib/backdrop")
        );
        assert_eq!(config.segmentation.command, "/usr/local/bin/rembg");

        std::env::remove_var("BACKDROP_SECRET_KEY");
        std::env::remove_var("BACKDROP_UPLOAD_STATIC_ROOT");
        std::env::remove_var("BACKDROP_SEGMENTATION_COMMAND");
    }

    #[test]
    fn test_env_override_invalid_port_ignored() {
        let _guard = lock_env();

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "server:\n  port: 8080\n").unwrap();

        std::env::set_var("BACKDROP_SERVER_PORT", "not_a_number");

        let config = Config::load_with_env(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);

        std::env::remove_var("BACKDROP_SERVER_PORT");
    }

    #[test]
    fn test_blank_secret_key_env_ignored() {
        let _guard = lock_env();

        let file = NamedTempFile::new().unwrap();
        std::env::set_var("BACKDROP_SECRET_KEY", "   ");

        let config = Config::load_with_env(file.path()).unwrap();
        assert!(config.session.secret_key.is_none());

        std::env::remove_var("BACKDROP_SECRET_KEY");
    }

    #[test]
    fn test_signing_key_uses_configured_secret() {
        let session = SessionConfig {
            secret_key: Some("s3cret".to_string()),
            ttl_days: 7,
        };
        assert_eq!(session.signing_key(), b"s3cret".to_vec());
    }

    #[test]
    fn test_signing_key_generated_when_missing() {
        let session = SessionConfig::default();
        let first = session.signing_key();
        let second = session.signing_key();

        assert_eq!(first.len(), 32);
        assert_ne!(first, second);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        /// Any serialized configuration parses back to the same values.
        #[test]
        fn config_yaml_roundtrip(
            host in "[a-z][a-z0-9]{0,10}",
            port in 1u16..=65535,
            ttl in 1i64..365,
            dir in "[a-z]{1,8}/[a-z]{1,8}",
        ) {
            let mut config = Config::default();
            config.server.host = host.clone();
            config.server.port = port;
            config.session.ttl_days = ttl;
            config.upload.cutout_dir = dir.clone();

            let yaml = serde_yaml::to_string(&config).unwrap();
            let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

            prop_assert_eq!(parsed.server.host, host);
            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.session.ttl_days, ttl);
            prop_assert_eq!(parsed.upload.cutout_dir, dir);
        }
    }
}
