//! Server configuration
//!
//! Loaded from `pixelgraph.toml` (or the file named by `PIXELGRAPH_CONFIG`),
//! every field defaulted so an empty or missing file yields a working
//! development setup: in-memory aggregates, blobs under `./blobs`.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 7401
//!
//! [database]
//! driver = "sqlite"
//! path = "pixelgraph.db"
//!
//! [blobs]
//! root = "/var/lib/pixelgraph/blobs"
//! ```

use serde::Deserialize;
use std::path::Path;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7401
}

fn default_database_path() -> String {
    "pixelgraph.db".to_string()
}

fn default_blob_root() -> String {
    "blobs".to_string()
}

/// Which aggregate backend to run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseDriver {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlobConfig {
    #[serde(default = "default_blob_root")]
    pub root: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: default_blob_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub blobs: BlobConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: DatabaseConfig::default(),
            blobs: BlobConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from `PIXELGRAPH_CONFIG` or `./pixelgraph.toml`; a missing file
    /// yields the defaults
    pub fn load() -> anyhow::Result<Self> {
        let path =
            std::env::var("PIXELGRAPH_CONFIG").unwrap_or_else(|_| "pixelgraph.toml".to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }

    /// Listen address, with `HOST`/`PORT` env overrides
    pub fn listen_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        let host = std::env::var("HOST").unwrap_or_else(|_| self.host.clone());
        let port = match std::env::var("PORT") {
            Ok(value) => value.parse()?,
            Err(_) => self.port,
        };
        Ok(format!("{host}:{port}").parse()?)
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.database.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7401);
        assert_eq!(config.database.driver, DatabaseDriver::Memory);
        assert_eq!(config.blobs.root, "blobs");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            port = 9000

            [database]
            driver = "sqlite"
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.database.driver, DatabaseDriver::Sqlite);
        assert_eq!(config.database.path, "pixelgraph.db");
        assert_eq!(config.database_url(), "sqlite://pixelgraph.db");
    }

    #[test]
    fn test_missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.port, 7401);
    }
}
