use config::{Config, File};
use serde::Deserialize;

use crate::error::VigilError;

#[derive(Debug, Deserialize, Clone)]
pub struct VigilConfig {
    pub database: DatabaseConfig,
    pub reporting: ReportingConfig,
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    pub repos: RepoConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportingConfig {
    pub run_interval_secs: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            run_interval_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            temperature: 0.7,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    pub enabled: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { enabled: false }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepoConfig {
    pub workdir: String,
    pub git_timeout_secs: u64,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            workdir: "/var/lib/vigil/repos".to_string(),
            git_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8767,
        }
    }
}

impl VigilConfig {
    pub fn load(path: &str) -> Result<Self, VigilError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        let mut cfg: VigilConfig = s.try_deserialize()?;

        // DATABASE_URL from the environment wins over the file value
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.is_empty() {
                cfg.database.url = url;
            }
        }

        // A zero period would panic inside tokio's interval timer
        if cfg.reporting.run_interval_secs == 0 {
            return Err(VigilError::Validation(
                "reporting.run_interval_secs must be greater than zero".to_string(),
            ));
        }

        Ok(cfg)
    }
}
