use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Working directory; other relative paths resolve under it.
    pub prefix: String,
    /// Directory of the secondary store (rocksdb).
    pub db_path: String,
    /// Base URL of the upstream full node's REST API.
    pub node_url: String,
    /// API key of the upstream node, if it requires one.
    pub node_api_key: String,
    pub http_host: String,
    pub http_port: u16,
    /// Basic-auth password for the explorer API; empty means unset.
    pub api_key: String,
    /// Disable auth entirely, regardless of host or key.
    pub no_auth: bool,
    pub cors: bool,
    pub ssl: bool,
    pub ssl_key: String,
    pub ssl_cert: String,
    /// main / testnet / regtest.
    pub network: String,
    /// Optional JSON file with the mining-pool attribution table.
    pub pools_file: String,
    /// Optional MaxMind database for peer geolocation.
    pub geoip_db: String,
}

impl Config {
    fn expand_path(path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        PathBuf::from(expanded.into_owned())
    }

    fn default_prefix() -> String {
        let home = dirs::home_dir().expect("Cannot find home directory");
        home.join(".hnscan").to_string_lossy().into_owned()
    }

    pub fn default_path() -> PathBuf {
        Self::expand_path(&Self::default_prefix()).join("config.json")
    }

    /// Prefix with tilde expansion applied.
    pub fn prefix_resolved(&self) -> PathBuf {
        Self::expand_path(&self.prefix)
    }

    /// Store directory, resolved under the prefix when relative.
    pub fn db_path_resolved(&self) -> PathBuf {
        let path = Self::expand_path(&self.db_path);
        if path.is_absolute() {
            path
        } else {
            self.prefix_resolved().join(path)
        }
    }

    /// Whether requests must present the API key. Loopback listeners are
    /// open by default.
    pub fn auth_enabled(&self) -> bool {
        if self.no_auth || self.api_key.is_empty() {
            return false;
        }
        !matches!(self.http_host.as_str(), "127.0.0.1" | "::1" | "localhost")
    }

    pub fn load() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            println!(
                "Configuration file not found. Creating default configuration.: {:?}",
                path
            );
            let cfg = Self::default();
            cfg.save();
            return cfg;
        }
        Self::from_file(&path).expect("Failed to read configuration file")
    }

    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading configuration at {:?}", path))?;
        serde_json::from_str(&data).context("configuration file format error")
    }

    pub fn save(&self) {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create configuration directory");
        }
        let json = serde_json::to_string_pretty(self).expect("Failed to serialize configuration");
        fs::write(&path, json).expect("Failed to write configuration file");
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> bool {
        match key {
            "prefix" => self.prefix = value.to_string(),
            "db_path" => self.db_path = value.to_string(),
            "node_url" => self.node_url = value.to_string(),
            "node_api_key" => self.node_api_key = value.to_string(),
            "http_host" => self.http_host = value.to_string(),
            "http_port" => match value.parse() {
                Ok(port) => self.http_port = port,
                Err(_) => {
                    println!("Invalid port: {}", value);
                    return false;
                }
            },
            "api_key" => self.api_key = value.to_string(),
            "no_auth" => self.no_auth = value == "true",
            "cors" => self.cors = value == "true",
            "ssl" => self.ssl = value == "true",
            "ssl_key" => self.ssl_key = value.to_string(),
            "ssl_cert" => self.ssl_cert = value.to_string(),
            "network" => self.network = value.to_string(),
            "pools_file" => self.pools_file = value.to_string(),
            "geoip_db" => self.geoip_db = value.to_string(),
            _ => {
                println!("Unknown configuration key: {}", key);
                return false;
            }
        }
        true
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: Self::default_prefix(),
            db_path: "index".to_string(),
            node_url: "http://127.0.0.1:12037".to_string(),
            node_api_key: String::new(),
            http_host: "127.0.0.1".to_string(),
            http_port: 8080,
            api_key: String::new(),
            no_auth: false,
            cors: true,
            ssl: false,
            ssl_key: String::new(),
            ssl_cert: String::new(),
            network: "main".to_string(),
            pools_file: String::new(),
            geoip_db: String::new(),
        }
    }
}
