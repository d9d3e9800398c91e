use std::env;
use std::path::PathBuf;

/// Process-level configuration, read once at startup. Branding lives in the
/// settings table instead, since administrators edit it at runtime.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Public origin used to build verification URLs, e.g. "https://lms.example.com".
    pub base_url: String,
    /// Root directory for generated artifacts.
    pub data_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let base_url = env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8081".into());
        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".into()));
        Self { base_url, data_dir }
    }

    pub fn certificates_dir(&self) -> PathBuf {
        self.data_dir.join("certificates")
    }

    pub fn qrcodes_dir(&self) -> PathBuf {
        self.data_dir.join("qrcodes")
    }
}
