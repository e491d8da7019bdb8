use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::domain::profile::{ColorPolicy, DeploymentProfile, Variant};

/// One week.
pub const MAX_IDLE_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub session: SessionConfig,

    pub uploads: UploadConfig,

    pub profile: ProfileConfig,

    pub models: ModelsConfig,

    pub security: SecurityConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/imgclass.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    pub port: u16,

    /// Whether to set the Secure flag on session cookies.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Request body limit for upload endpoints, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            secure_cookies: true,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie signing key. At least 64 bytes when set; a random key is
    /// generated per process when empty.
    pub secret: String,

    pub idle_timeout_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            idle_timeout_minutes: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub directory: String,

    /// Prefix stored filenames with a random token so concurrent uploads
    /// of the same name never overwrite each other.
    pub namespace_files: bool,

    /// Keep uploaded files after a successful classification.
    pub retain: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            directory: "uploads".to_string(),
            namespace_files: true,
            retain: false,
        }
    }
}

/// Variant selection plus optional per-field overrides of its preset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub variant: Variant,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_extensions: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_threshold: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_login_route: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_policy: Option<ColorPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive_label: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_label: Option<String>,
}

impl ProfileConfig {
    /// Applies the configured overrides on top of the variant preset.
    #[must_use]
    pub fn resolve(&self) -> DeploymentProfile {
        let mut profile = self.variant.preset();

        if let Some(extensions) = &self.allowed_extensions {
            profile.allowed_extensions = extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect();
        }
        if let Some(size) = self.image_size {
            profile.image_size = size;
        }
        if let Some(threshold) = self.decision_threshold {
            profile.decision_threshold = threshold;
        }
        if let Some(route) = &self.post_login_route {
            profile.post_login_route.clone_from(route);
        }
        if let Some(policy) = self.color_policy {
            profile.color_policy = policy;
        }
        if let Some(label) = &self.positive_label {
            profile.labels.positive.clone_from(label);
        }
        if let Some(label) = &self.negative_label {
            profile.labels.negative.clone_from(label);
        }

        profile
    }
}

/// How a model's raw output tensor is reduced to a single score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputReduction {
    #[default]
    First,
    Max,
    Mean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub path: String,

    #[serde(default)]
    pub reduction: OutputReduction,

    /// Intra-op thread count for the inference session (0 = runtime default).
    #[serde(default)]
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub classifier: ModelConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmenter: Option<ModelConfig>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            classifier: ModelConfig {
                path: "static/catdog.onnx".to_string(),
                reduction: OutputReduction::First,
                threads: 0,
            },
            segmenter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Config {
    /// Default configuration for the given variant, including a sensible
    /// model layout for it.
    #[must_use]
    pub fn for_variant(variant: Variant) -> Self {
        let mut config = Self::default();
        config.profile.variant = variant;

        if variant == Variant::Medical {
            config.models.classifier.path = "static/mri_classifier.onnx".to_string();
            config.models.segmenter = Some(ModelConfig {
                path: "static/unet.onnx".to_string(),
                reduction: OutputReduction::Max,
                threads: 0,
            });
        }

        config
    }

    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("imgclass").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".imgclass").join("config.toml"));
        }

        paths
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    /// Overrides selected settings from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("IMGCLASS_DATABASE_URL") {
            self.general.database_path = url;
        }
        if let Some(secret) = lookup("IMGCLASS_SESSION_SECRET") {
            self.session.secret = secret;
        }
        if let Some(port) = lookup("IMGCLASS_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid IMGCLASS_PORT value: {port}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let profile = self.profile.resolve();

        if !(profile.decision_threshold > 0.0 && profile.decision_threshold < 1.0) {
            anyhow::bail!(
                "Decision threshold must be between 0 and 1 (got {})",
                profile.decision_threshold
            );
        }

        if profile.image_size == 0 {
            anyhow::bail!("Image size must be greater than 0");
        }

        if profile.allowed_extensions.is_empty() {
            anyhow::bail!("At least one allowed upload extension is required");
        }

        if !profile.post_login_route.starts_with('/') {
            anyhow::bail!(
                "Post-login route must be an absolute path (got '{}')",
                profile.post_login_route
            );
        }

        if !self.session.secret.is_empty() && self.session.secret.len() < 64 {
            anyhow::bail!("Session secret must be at least 64 bytes long");
        }

        if !(1..=MAX_IDLE_TIMEOUT_MINUTES).contains(&self.session.idle_timeout_minutes) {
            anyhow::bail!(
                "Session idle timeout must be between 1 and {MAX_IDLE_TIMEOUT_MINUTES} minutes"
            );
        }

        if self.models.classifier.path.trim().is_empty() {
            anyhow::bail!("Classifier model path cannot be empty");
        }

        if let Some(segmenter) = &self.models.segmenter
            && segmenter.path.trim().is_empty()
        {
            anyhow::bail!("Segmentation model path cannot be empty when configured");
        }

        if self.uploads.directory.trim().is_empty() {
            anyhow::bail!("Upload directory cannot be empty");
        }

        Ok(())
    }
}
