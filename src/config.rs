use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,

    /// Path to the SQLite database. `None` runs against the in-memory store
    /// (no durability across restarts).
    pub database_path: Option<PathBuf>,

    // Session document caps
    pub activity_window_cap: usize,
    pub screenshot_cap: usize,

    /// Device type assumed for joiners that do not announce one.
    pub default_device_type: String,

    // Graceful shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            database_path: None,
            activity_window_cap: 500,
            screenshot_cap: 100,
            default_device_type: "Android Mobile".to_string(),
            shutdown_timeout_secs: 30,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("SLG_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }

        if let Ok(path) = std::env::var("SLG_DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Ok(cap) = std::env::var("SLG_ACTIVITY_WINDOW_CAP") {
            config.activity_window_cap = cap.parse()?;
        }

        if let Ok(cap) = std::env::var("SLG_SCREENSHOT_CAP") {
            config.screenshot_cap = cap.parse()?;
        }

        if let Ok(device) = std::env::var("SLG_DEFAULT_DEVICE_TYPE") {
            config.default_device_type = device;
        }

        if let Ok(secs) = std::env::var("SLG_SHUTDOWN_TIMEOUT_SECS") {
            config.shutdown_timeout_secs = secs.parse()?;
        }

        Ok(config)
    }

    pub fn from_toml(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: GatewayConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.activity_window_cap == 0 {
            anyhow::bail!("activity_window_cap must be > 0");
        }

        if self.screenshot_cap == 0 {
            anyhow::bail!("screenshot_cap must be > 0");
        }

        if self.default_device_type.is_empty() {
            anyhow::bail!("default_device_type must not be empty");
        }

        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
