use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod defaults;

use defaults::*;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "AIMGLYZE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    /// Maximum entry age in seconds
    #[serde(default = "default_cache_max_age")]
    pub max_age: u64,
    #[serde(default = "default_cleanup_on_start")]
    pub cleanup_on_start: bool,
    /// Upper bound on entries held by the in-memory tier
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
    /// Coalesce concurrent misses for the same fingerprint into one backend call
    #[serde(default = "default_single_flight")]
    pub single_flight: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_frontend_root")]
    pub frontend_root: PathBuf,
    #[serde(default = "default_sample_file")]
    pub sample_file: PathBuf,
    #[serde(default = "default_save_upload")]
    pub save_upload: bool,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Maximum upload size in whole megabytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub debug: bool,
}

/// UI-only settings echoed to the frontend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    #[serde(default = "default_frontend_title")]
    pub title: String,
    #[serde(default = "default_frontend_subtitle")]
    pub subtitle: String,
    #[serde(default = "default_frontend_theme")]
    pub theme: String,
    #[serde(default = "default_show_sample_data")]
    pub show_sample_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Provider preset: zhipu, gemini, deepseek or openai
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Overrides the provider's API key environment variable
    pub api_key_env: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub thinking: bool,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_user_prompt")]
    pub user_prompt: String,
    #[serde(default = "default_analyzer_timeout")]
    pub timeout: String,
}

// Cache defaults
fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_cache_max_age() -> u64 {
    DEFAULT_CACHE_MAX_AGE
}

fn default_cleanup_on_start() -> bool {
    DEFAULT_CLEANUP_ON_START
}

fn default_memory_capacity() -> usize {
    DEFAULT_MEMORY_CAPACITY
}

fn default_single_flight() -> bool {
    DEFAULT_SINGLE_FLIGHT
}

// Web defaults
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_frontend_root() -> PathBuf {
    PathBuf::from(DEFAULT_FRONTEND_ROOT)
}

fn default_sample_file() -> PathBuf {
    PathBuf::from(DEFAULT_SAMPLE_FILE)
}

fn default_save_upload() -> bool {
    DEFAULT_SAVE_UPLOAD
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from(DEFAULT_UPLOAD_DIR)
}

fn default_max_upload_size() -> u64 {
    DEFAULT_MAX_UPLOAD_SIZE_MB
}

fn default_allowed_extensions() -> Vec<String> {
    DEFAULT_ALLOWED_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

// Frontend defaults
fn default_frontend_title() -> String {
    DEFAULT_FRONTEND_TITLE.to_string()
}

fn default_frontend_subtitle() -> String {
    DEFAULT_FRONTEND_SUBTITLE.to_string()
}

fn default_frontend_theme() -> String {
    DEFAULT_FRONTEND_THEME.to_string()
}

fn default_show_sample_data() -> bool {
    true
}

// Analyzer defaults
fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_user_prompt() -> String {
    DEFAULT_USER_PROMPT.to_string()
}

fn default_analyzer_timeout() -> String {
    DEFAULT_ANALYZER_TIMEOUT.to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_age: default_cache_max_age(),
            cleanup_on_start: default_cleanup_on_start(),
            memory_capacity: default_memory_capacity(),
            single_flight: default_single_flight(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            frontend_root: default_frontend_root(),
            sample_file: default_sample_file(),
            save_upload: default_save_upload(),
            upload_dir: default_upload_dir(),
            max_upload_size: default_max_upload_size(),
            allowed_extensions: default_allowed_extensions(),
            debug: false,
        }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            title: default_frontend_title(),
            subtitle: default_frontend_subtitle(),
            theme: default_frontend_theme(),
            show_sample_data: default_show_sample_data(),
        }
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            api_key_env: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            thinking: false,
            system_prompt: default_system_prompt(),
            user_prompt: default_user_prompt(),
            timeout: default_analyzer_timeout(),
        }
    }
}

impl ServerConfig {
    /// Upload limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        (self.max_upload_size as usize).saturating_mul(1024 * 1024)
    }

    /// Request body limit: the upload limit plus multipart framing
    pub fn body_limit_bytes(&self) -> usize {
        self.max_upload_bytes()
            .saturating_add(MULTIPART_OVERHEAD_BYTES)
    }

    /// Check a dotted extension against the allow-list (case-insensitive).
    /// An empty allow-list accepts everything.
    pub fn is_extension_allowed(&self, extension: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        let extension = normalize_extension(extension);
        self.allowed_extensions
            .iter()
            .any(|allowed| normalize_extension(allowed) == extension)
    }
}

impl AnalyzerConfig {
    pub fn timeout_duration(&self) -> Result<Duration> {
        humantime::parse_duration(&self.timeout)
            .with_context(|| format!("Invalid analyzer timeout: {}", self.timeout))
    }
}

/// Lowercase an extension and make sure it carries a leading dot
pub fn normalize_extension(extension: &str) -> String {
    let extension = extension.trim().to_lowercase();
    if extension.starts_with('.') {
        extension
    } else {
        format!(".{extension}")
    }
}

impl Config {
    /// Load configuration: defaults, then the TOML file, then `AIMGLYZE_*`
    /// environment overrides. A missing file is created with defaults.
    pub fn load_from_file(config_file: &str) -> Result<Self> {
        let path = Path::new(config_file);
        if !path.exists() {
            let contents = toml::to_string_pretty(&Self::default())?;
            std::fs::write(path, contents)
                .with_context(|| format!("Failed to write default config: {config_file}"))?;
            info!("Created default config file: {}", config_file);
        }

        let mut config: Config = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config: {config_file}"))?;

        let base_dir = std::path::absolute(path)?
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.resolve_relative_paths(&base_dir);
        Ok(config)
    }

    /// Make every relative path absolute against `base_dir`
    pub fn resolve_relative_paths(&mut self, base_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        };
        resolve(&mut self.cache.dir);
        resolve(&mut self.server.frontend_root);
        resolve(&mut self.server.sample_file);
        resolve(&mut self.server.upload_dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();
        assert_eq!(config.cache.max_age, 2_592_000);
        assert!(!config.cache.cleanup_on_start);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.max_upload_size, 10);
        assert!(!config.server.save_upload);
        assert_eq!(config.server.allowed_extensions.len(), 4);
        assert_eq!(config.analyzer.provider, "zhipu");
    }

    #[test]
    fn test_extension_allow_list_is_case_insensitive() {
        let server = ServerConfig::default();
        assert!(server.is_extension_allowed(".JPG"));
        assert!(server.is_extension_allowed("png"));
        assert!(!server.is_extension_allowed(".gif"));

        let open = ServerConfig {
            allowed_extensions: Vec::new(),
            ..ServerConfig::default()
        };
        assert!(open.is_extension_allowed(".gif"));
    }

    #[test]
    fn test_upload_limits() {
        let server = ServerConfig::default();
        assert_eq!(server.max_upload_bytes(), 10 * 1024 * 1024);
        assert!(server.body_limit_bytes() > server.max_upload_bytes());
    }

    #[test]
    fn test_load_creates_default_and_resolves_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let config = Config::load_from_file(config_path.to_str().unwrap()).unwrap();

        assert!(config_path.exists());
        assert!(config.cache.dir.is_absolute());
        assert!(config.cache.dir.starts_with(temp_dir.path()));
        assert!(config.server.upload_dir.ends_with("uploads"));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("app.toml");
        std::fs::write(
            &config_path,
            "[cache]\nmax_age = 60\n\n[server]\nsave_upload = true\nupload_dir = \"/srv/uploads\"\n",
        )
        .unwrap();

        let config = Config::load_from_file(config_path.to_str().unwrap()).unwrap();
        assert_eq!(config.cache.max_age, 60);
        assert!(config.server.save_upload);
        assert_eq!(config.server.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_timeout_parsing() {
        let analyzer = AnalyzerConfig::default();
        assert_eq!(analyzer.timeout_duration().unwrap(), Duration::from_secs(120));
        let bad = AnalyzerConfig {
            timeout: "soon".to_string(),
            ..AnalyzerConfig::default()
        };
        assert!(bad.timeout_duration().is_err());
    }
}
