/// Configuration default values
///
/// This module contains all the default values for configuration options,
/// making them easily changeable in one central location.
// Cache defaults
pub const DEFAULT_CACHE_DIR: &str = "./cache";
pub const DEFAULT_CACHE_MAX_AGE: u64 = 30 * 24 * 60 * 60; // 30 days
pub const DEFAULT_CLEANUP_ON_START: bool = false;
pub const DEFAULT_MEMORY_CAPACITY: usize = 1024;
pub const DEFAULT_SINGLE_FLIGHT: bool = true;

// Web server defaults
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_FRONTEND_ROOT: &str = "./frontend";
pub const DEFAULT_SAMPLE_FILE: &str = "./sample-msg.json";

// Upload defaults
pub const DEFAULT_SAVE_UPLOAD: bool = false;
pub const DEFAULT_UPLOAD_DIR: &str = "./uploads";
pub const DEFAULT_MAX_UPLOAD_SIZE_MB: u64 = 10;
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];
/// Extension used when a MIME type has no known mapping
pub const DEFAULT_UPLOAD_EXTENSION: &str = ".jpg";
/// Slack on top of the upload limit for multipart framing and headers
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

// Frontend defaults
pub const DEFAULT_FRONTEND_TITLE: &str = "Image Analysis";
pub const DEFAULT_FRONTEND_SUBTITLE: &str = "AI powered image description and tagging";
pub const DEFAULT_FRONTEND_THEME: &str = "light";

// Analyzer defaults
pub const DEFAULT_PROVIDER: &str = "zhipu";
pub const DEFAULT_MAX_TOKENS: u32 = 8192;
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_ANALYZER_TIMEOUT: &str = "120s";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional image analyzer. The user provides \
an image; analyze its content accurately, choose suitable tags and describe it as requested. \
Reply strictly with a JSON object of the form \
{\"name\": \"image title\", \"desc\": \"detailed description\", \"tags\": [\"tag\"], \
\"confidence\": 0.0}, where confidence is a number between 0 and 1.";
pub const DEFAULT_USER_PROMPT: &str = "Keep the description to about 200 words.";

// Maintenance defaults
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
