//! Configuration: the CLI surface contract the core expects, as
//! plain structs the binaries fill in from hand-parsed flags. Loading from
//! JSON strings is kept for parity with embedders that want to configure
//! the engine without a CLI at all — file IO itself stays an external
//! collaborator.

use serde::{Deserialize, Serialize};

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    40000
}

fn default_tick_hz() -> u32 {
    crate::physics::DEFAULT_TICK_HZ
}

/// Server-side CLI surface: host, port, tick-rate, loss, latency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// Simulated outbound loss probability in `[0, 1]`, 0 disables.
    #[serde(default)]
    pub loss: f64,
    /// Simulated outbound base latency in seconds, 0 disables.
    #[serde(default)]
    pub latency_secs: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_hz: default_tick_hz(),
            loss: 0.0,
            latency_secs: 0.0,
        }
    }
}

impl ServerConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// tick-rate <= 0 is a fatal misconfiguration, caught before the
    /// socket is even bound.
    pub fn validate(&self) -> Result<(), String> {
        if self.tick_hz == 0 {
            return Err("tick-rate must be > 0".to_string());
        }
        Ok(())
    }
}

/// Client-side CLI surface: host, port, tick-rate, headless, loss, latency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,
    /// True when running without a rendering surface (the core never
    /// renders either way; this only gates the external renderer hookup).
    #[serde(default)]
    pub headless: bool,
    #[serde(default)]
    pub loss: f64,
    #[serde(default)]
    pub latency_secs: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tick_hz: default_tick_hz(),
            headless: true,
            loss: 0.0,
            latency_secs: 0.0,
        }
    }
}

impl ClientConfig {
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tick_hz == 0 {
            return Err("tick-rate must be > 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_config_defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tick_hz, 20);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:40000");
    }

    #[test]
    fn zero_tick_rate_is_invalid() {
        let mut cfg = ServerConfig::default();
        cfg.tick_hz = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn server_config_json_round_trip() {
        let cfg = ServerConfig {
            host: "0.0.0.0".into(),
            port: 9999,
            tick_hz: 30,
            loss: 0.1,
            latency_secs: 0.05,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back = ServerConfig::from_json_str(&json).unwrap();
        assert_eq!(back.port, 9999);
        assert_eq!(back.tick_hz, 30);
    }
}
