use std::{collections::HashMap, fs};

use tracing::warn;

pub const CONFIG_FILE: &str = "chat.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub access_token: Option<String>,
    pub username: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            access_token: None,
            username: None,
        }
    }
}

/// Defaults, then `chat.toml`, then the environment.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(CONFIG_FILE) {
        apply_file(&mut settings, &raw);
    }
    apply_env(&mut settings, |key| std::env::var(key).ok());

    settings
}

fn apply_file(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<HashMap<String, String>>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!(file = CONFIG_FILE, error = %err, "ignoring unreadable config file");
            return;
        }
    };
    if let Some(v) = file_cfg.get("api_url") {
        settings.api_url = v.clone();
    }
    if let Some(v) = file_cfg.get("access_token") {
        settings.access_token = Some(v.clone());
    }
    if let Some(v) = file_cfg.get("username") {
        settings.username = Some(v.clone());
    }
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("CHAT_API_URL") {
        settings.api_url = v;
    }
    if let Some(v) = var("APP__API_URL") {
        settings.api_url = v;
    }

    if let Some(v) = var("CHAT_ACCESS_TOKEN") {
        settings.access_token = Some(v);
    }
    if let Some(v) = var("APP__ACCESS_TOKEN") {
        settings.access_token = Some(v);
    }

    if let Some(v) = var("APP__USERNAME") {
        settings.username = Some(v);
    }

    if settings.access_token.as_deref().is_some_and(|token| token.trim().is_empty()) {
        settings.access_token = None;
    }
}
