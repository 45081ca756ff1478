//! Runtime configuration for the Warcamp battle server.

use once_cell::sync::Lazy;
use std::env;

#[derive(Debug)]
pub struct Settings {
    /// Redis presence-key TTL (seconds).
    pub presence_ttl: u64,
    /// Postgres pool size.
    pub max_connections: u32,
}

impl Settings {
    fn from_env() -> Self {
        let presence_ttl = env::var("PRESENCE_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(600);

        let max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(5);

        Settings {
            presence_ttl,
            max_connections,
        }
    }
}

static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);

pub fn settings() -> &'static Settings {
    &SETTINGS
}
