use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use crate::lobby::room::LOBBY_MAX_EMPTY_TIME_MS;
use crate::net::packets::ProtocolVariant;
use crate::net::session::DEFAULT_OUTBOUND_QUEUE_SIZE;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Which packet tag space this deployment serves
    pub protocol: ProtocolVariant,
    /// Largest inbound WebSocket message accepted, in bytes
    pub max_message_size: usize,
    /// Frames a session may have waiting for its socket before sends to it fail
    pub outbound_queue_size: usize,
    /// How long a lobby may stay empty before a sweep may delete it
    pub lobby_max_empty_time: Duration,
    /// JSON map definition file given to new lobbies
    pub map_path: Option<PathBuf>,
    /// Port of the metrics endpoint, 0 disables it
    pub metrics_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 8080,
            protocol: ProtocolVariant::Arena,
            max_message_size: 65536,
            outbound_queue_size: DEFAULT_OUTBOUND_QUEUE_SIZE,
            lobby_max_empty_time: Duration::from_millis(LOBBY_MAX_EMPTY_TIME_MS),
            map_path: None,
            metrics_port: 9090,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse::<u16>() {
                Ok(parsed) if parsed > 0 => config.port = parsed,
                Ok(_) => tracing::warn!("PORT must be > 0, using default"),
                Err(_) => tracing::warn!("Invalid PORT '{}', using default", port),
            }
        }

        if let Ok(protocol) = std::env::var("PROTOCOL") {
            match protocol.parse() {
                Ok(parsed) => config.protocol = parsed,
                Err(e) => tracing::warn!("Invalid PROTOCOL: {}, using default", e),
            }
        }

        if let Ok(size) = std::env::var("MAX_MESSAGE_SIZE") {
            match size.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.max_message_size = parsed,
                _ => tracing::warn!("Invalid MAX_MESSAGE_SIZE '{}', using default", size),
            }
        }

        if let Ok(size) = std::env::var("OUTBOUND_QUEUE_SIZE") {
            match size.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.outbound_queue_size = parsed,
                _ => tracing::warn!("Invalid OUTBOUND_QUEUE_SIZE '{}', using default", size),
            }
        }

        if let Ok(ms) = std::env::var("LOBBY_MAX_EMPTY_TIME_MS") {
            if let Ok(parsed) = ms.parse::<u64>() {
                config.lobby_max_empty_time = Duration::from_millis(parsed);
            } else {
                tracing::warn!("Invalid LOBBY_MAX_EMPTY_TIME_MS '{}', using default", ms);
            }
        }

        if let Ok(path) = std::env::var("MAP_PATH") {
            config.map_path = Some(PathBuf::from(path));
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.metrics_port = parsed;
            } else {
                tracing::warn!("Invalid METRICS_PORT '{}', using default", port);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("Port cannot be 0".to_string());
        }
        if self.max_message_size == 0 {
            return Err("max_message_size must be at least 1".to_string());
        }
        if self.outbound_queue_size == 0 {
            return Err("outbound_queue_size must be at least 1".to_string());
        }
        if self.metrics_port != 0 && self.metrics_port == self.port {
            return Err("metrics_port must differ from port".to_string());
        }
        Ok(())
    }

    /// Read and check the configured map definition; empty when none is set
    pub fn load_map_definition(&self) -> anyhow::Result<String> {
        let Some(path) = &self.map_path else {
            return Ok(String::new());
        };
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str::<serde_json::Value>(&json)
            .map_err(|e| anyhow::anyhow!("Map file {} is not valid JSON: {}", path.display(), e))?;
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.protocol, ProtocolVariant::Arena);
        assert_eq!(config.lobby_max_empty_time, Duration::from_millis(10_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.port > 0);
    }

    #[test]
    fn test_validate_port_clash() {
        let config = ServerConfig {
            metrics_port: 8080,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        let disabled = ServerConfig {
            metrics_port: 0,
            ..ServerConfig::default()
        };
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_validate_queue_size() {
        let config = ServerConfig {
            outbound_queue_size: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(ServerConfig::default().outbound_queue_size, 256);
    }

    #[test]
    fn test_load_map_definition() {
        let config = ServerConfig::default();
        assert_eq!(config.load_map_definition().unwrap(), "");

        let dir = std::env::temp_dir();
        let good = dir.join(format!("tank-arena-map-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&good, r#"{"lines":[],"spawnPoints":[]}"#).unwrap();
        let config = ServerConfig {
            map_path: Some(good.clone()),
            ..ServerConfig::default()
        };
        assert!(config.load_map_definition().unwrap().contains("spawnPoints"));

        let bad = dir.join(format!("tank-arena-map-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&bad, "not json").unwrap();
        let config = ServerConfig {
            map_path: Some(bad.clone()),
            ..ServerConfig::default()
        };
        assert!(config.load_map_definition().is_err());

        let _ = std::fs::remove_file(good);
        let _ = std::fs::remove_file(bad);
    }
}
