use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{env, fs};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub database_url: String,
    /// Path to the SeetaFace detection model used by the face pipeline.
    pub face_model_path: String,
    /// Euclidean-distance tolerance for face matching.
    pub face_match_tolerance: f64,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    pub fn init(env_path: &str) -> &'static Self {
        dotenvy::from_filename(env_path).ok();

        CONFIG.get_or_init(|| {
            let project_name = env::var("PROJECT_NAME").unwrap_or_else(|_| "attendance".into());
            let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".into());
            let log_file = env::var("LOG_FILE").unwrap_or_else(|_| "logs/attendance.log".into());
            let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
            let face_model_path = env::var("FACE_MODEL_PATH")
                .unwrap_or_else(|_| "models/seeta_fd_frontal.bin".into());
            let face_match_tolerance = env::var("FACE_MATCH_TOLERANCE")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(5000.0);

            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                fs::create_dir_all(parent).expect("Failed to create log directory");
            }

            Config {
                project_name,
                log_level,
                log_file,
                database_url,
                face_model_path,
                face_match_tolerance,
            }
        })
    }

    pub fn get() -> &'static Self {
        CONFIG.get().expect("Config not initialized")
    }
}
