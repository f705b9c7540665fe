//! Configuration types for towers

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TowersConfig {
    /// HTTP transport configuration
    pub server: HttpConfig,
    /// HTTPS listener, served next to plain HTTP when present
    pub tls: Option<TlsConfig>,
    /// Built-in authentication hooks
    pub auth: AuthConfig,
}

impl TowersConfig {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Mount path prefix for function routes (default: "/functions")
    pub endpoint: String,
    /// Host to bind to
    pub host: String,
    /// Port for plain HTTP (default: 3000)
    pub port: u16,
    /// Worker threads per listener
    pub workers: usize,
    /// Value of `Access-Control-Allow-Origin` (default: "*")
    pub allow_origin: String,
    /// Serve the function manifest at this path when set
    pub manifest_path: Option<String>,
    /// Refuse to start when functions need a hook that was never installed
    pub strict_hooks: bool,
    /// Maximum JSON/form body size in bytes
    pub body_limit: usize,
    /// Maximum size of a single uploaded file in bytes
    pub upload_limit: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: "/functions".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            workers: 4,
            allow_origin: "*".to_string(),
            manifest_path: None,
            strict_hooks: false,
            body_limit: 100 * 1024,
            upload_limit: 50 * 1024 * 1024,
        }
    }
}

impl HttpConfig {
    /// Mount path with exactly one leading slash and no trailing slash
    #[must_use]
    pub fn mount_path(&self) -> String {
        normalize_endpoint(&self.endpoint)
    }
}

/// Normalize a mount path prefix: `functions/` becomes `/functions`, `/` becomes ``
#[must_use]
pub fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// HTTPS listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Port for HTTPS (default: 3443)
    #[serde(default = "default_tls_port")]
    pub port: u16,
    /// Private key file (PEM)
    pub key_path: PathBuf,
    /// Certificate chain file (PEM)
    pub cert_path: PathBuf,
}

fn default_tls_port() -> u16 {
    3443
}

impl TlsConfig {
    pub fn new(port: u16, key_path: impl Into<PathBuf>, cert_path: impl Into<PathBuf>) -> Self {
        Self {
            port,
            key_path: key_path.into(),
            cert_path: cert_path.into(),
        }
    }
}

/// Built-in authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static API keys, keyed by the key value
    pub api_keys: HashMap<String, ApiKeyConfig>,
    /// HS256 bearer tokens
    pub jwt: Option<JwtConfig>,
}

/// Identity granted to one API key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// Principal id
    pub principal: String,
    /// Granted rights, scope to permissions
    #[serde(default)]
    pub rights: BTreeMap<String, BTreeSet<String>>,
}

/// JWT validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_audience() -> String {
    "authenticated".to_string()
}
