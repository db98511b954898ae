// src/utils/env.rs
use log::{debug, info};

/// Loads a `.env` file from the working directory or its parents, if any.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) => debug!("No .env file loaded ({}); using process environment", e),
    }
}

/// Reads a boolean variable, falling back to `default` when unset or unparsable.
pub fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<bool>().ok())
        .unwrap_or(default)
}
