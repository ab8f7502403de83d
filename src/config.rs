use std::path::PathBuf;

/// Process configuration, read once at startup. API keys may instead live
/// in the settings table; handlers fall back to it when the env is empty.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub port: u16,
    pub ai_provider: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("HOMEROOM_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("homeroom-data"));
        let port = std::env::var("HOMEROOM_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7150);
        Self {
            data_dir,
            port,
            ai_provider: env_nonempty("AI_PROVIDER"),
            anthropic_api_key: env_nonempty("ANTHROPIC_API_KEY"),
            openai_api_key: env_nonempty("OPENAI_API_KEY"),
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
