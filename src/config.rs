use serde::Deserialize;
use std::path::PathBuf;

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Clone, Deserialize)]
pub struct Config {
    pub gemini_api_key: String,
    #[serde(default = "default_caption_model")]
    pub caption_model: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_caption_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("lost_and_found.db")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::from_env()
    }
}
