//! Registry credentials.
//!
//! A [`CredentialContext`] is built once at startup and passed by reference to
//! every registry call. It wraps a [`Keychain`] that maps a registry host to
//! the authentication to use for it.
//!
//! # Sources
//!
//! - Docker `config.json` (`IMGSIG_DOCKER_CONFIG`, `$DOCKER_CONFIG/config.json`
//!   or `~/.docker/config.json`)
//! - Image pull secrets resolved through a [`SecretSource`], the way a
//!   cluster-side deployment would (namespace, service account, secret names)
//! - Anonymous access when nothing is configured

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{VerifyError, VerifyResult};
use crate::reference::normalize_registry;
use crate::types::RegistryConfig;

/// Authentication for one registry.
#[derive(Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    /// No credentials.
    Anonymous,

    /// Username and password (sent as Basic or exchanged for a token).
    Basic { username: String, password: String },

    /// Pre-issued bearer token.
    Bearer(String),
}

impl fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Basic { username, .. } => write!(f, "Basic({}, <redacted>)", username),
            Self::Bearer(_) => write!(f, "Bearer(<redacted>)"),
        }
    }
}

/// Resolves registry hosts to credentials.
pub trait Keychain: Send + Sync + fmt::Debug {
    /// Credentials for `registry` (a host, optionally with port).
    fn resolve(&self, registry: &str) -> RegistryAuth;
}

/// Keychain that never has credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousKeychain;

impl Keychain for AnonymousKeychain {
    fn resolve(&self, _registry: &str) -> RegistryAuth {
        RegistryAuth::Anonymous
    }
}

/// Keychain backed by docker config (`config.json` / `.dockerconfigjson`).
#[derive(Debug, Clone, Default)]
pub struct DockerConfigKeychain {
    auths: HashMap<String, RegistryAuth>,
}

#[derive(Debug, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    identitytoken: Option<String>,
    #[serde(default)]
    registrytoken: Option<String>,
}

impl DockerConfigKeychain {
    /// Parse docker config JSON.
    pub fn from_json(bytes: &[u8]) -> VerifyResult<Self> {
        let file: DockerConfigFile =
            serde_json::from_slice(bytes).map_err(|e| VerifyError::Config {
                message: format!("invalid docker config: {}", e),
            })?;

        let mut auths = HashMap::new();
        for (server, entry) in file.auths {
            let host = registry_host(&server).to_string();
            match entry_to_auth(&entry) {
                Ok(Some(auth)) => {
                    auths.entry(host).or_insert(auth);
                }
                Ok(None) => debug!(registry = %host, "docker config entry has no credentials"),
                Err(message) => {
                    return Err(VerifyError::Config {
                        message: format!("docker config entry for {}: {}", server, message),
                    })
                }
            }
        }

        Ok(Self { auths })
    }

    /// Read docker config from a file.
    pub fn from_file(path: &Path) -> VerifyResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| VerifyError::Config {
            message: format!("failed to read docker config {}: {}", path.display(), e),
        })?;
        Self::from_json(&bytes)
    }

    /// Add entries from `other` for hosts not already present.
    pub fn merge(&mut self, other: DockerConfigKeychain) {
        for (host, auth) in other.auths {
            self.auths.entry(host).or_insert(auth);
        }
    }

    /// Number of registries with credentials.
    pub fn len(&self) -> usize {
        self.auths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.auths.is_empty()
    }
}

impl Keychain for DockerConfigKeychain {
    fn resolve(&self, registry: &str) -> RegistryAuth {
        self.auths
            .get(normalize_registry(registry))
            .cloned()
            .unwrap_or(RegistryAuth::Anonymous)
    }
}

fn entry_to_auth(entry: &DockerAuthEntry) -> Result<Option<RegistryAuth>, String> {
    if let Some(token) = entry.registrytoken.as_deref().filter(|t| !t.is_empty()) {
        return Ok(Some(RegistryAuth::Bearer(token.to_string())));
    }

    if let Some(encoded) = entry.auth.as_deref().filter(|a| !a.is_empty()) {
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|e| format!("invalid base64 auth: {}", e))?;
        let decoded = String::from_utf8(decoded).map_err(|_| "auth is not UTF-8".to_string())?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| "auth must be 'username:password'".to_string())?;
        return Ok(Some(RegistryAuth::Basic {
            username: username.to_string(),
            password: password.to_string(),
        }));
    }

    // An identity token is a refresh token exchanged at the token endpoint
    if let Some(token) = entry.identitytoken.as_deref().filter(|t| !t.is_empty()) {
        return Ok(Some(RegistryAuth::Basic {
            username: "<token>".to_string(),
            password: token.to_string(),
        }));
    }

    match (&entry.username, &entry.password) {
        (Some(username), Some(password)) if !username.is_empty() => Ok(Some(RegistryAuth::Basic {
            username: username.clone(),
            password: password.clone(),
        })),
        _ => Ok(None),
    }
}

/// Host part of a docker config server key (`https://index.docker.io/v1/` →
/// `index.docker.io`).
fn registry_host(server: &str) -> &str {
    let server = server
        .strip_prefix("https://")
        .or_else(|| server.strip_prefix("http://"))
        .unwrap_or(server);
    let host = server.split('/').next().unwrap_or(server);
    normalize_registry(host)
}

/// Cluster identity used to look up image pull secrets.
#[derive(Debug, Clone, Default)]
pub struct KeychainOptions {
    /// Namespace the secrets live in.
    pub namespace: String,

    /// Service account whose pull secrets are included (empty for none).
    pub service_account: String,

    /// Explicit image pull secret names, consulted first.
    pub image_pull_secrets: Vec<String>,
}

/// Reads image pull secrets (e.g. from the Kubernetes API).
#[async_trait]
pub trait SecretSource: Send + Sync {
    /// Pull secret names attached to a service account.
    async fn service_account_pull_secrets(
        &self,
        namespace: &str,
        service_account: &str,
    ) -> VerifyResult<Vec<String>>;

    /// The `.dockerconfigjson` bytes of a secret, or `None` if it does not exist.
    async fn docker_config(&self, namespace: &str, name: &str) -> VerifyResult<Option<Vec<u8>>>;
}

/// Process-wide registry credentials. Cheap to clone; immutable.
#[derive(Debug, Clone)]
pub struct CredentialContext {
    keychain: Arc<dyn Keychain>,
}

impl CredentialContext {
    /// Wrap a keychain.
    pub fn new(keychain: impl Keychain + 'static) -> Self {
        Self {
            keychain: Arc::new(keychain),
        }
    }

    /// Context without credentials.
    pub fn anonymous() -> Self {
        Self::new(AnonymousKeychain)
    }

    /// Build the keychain from image pull secrets.
    ///
    /// Explicit secrets are consulted before the service account's. When two
    /// secrets carry credentials for the same registry, the first one wins.
    /// Secrets that do not exist are skipped.
    pub async fn initialize(
        options: &KeychainOptions,
        secrets: &dyn SecretSource,
    ) -> VerifyResult<Self> {
        let mut names = options.image_pull_secrets.clone();
        if !options.service_account.is_empty() {
            let from_account = secrets
                .service_account_pull_secrets(&options.namespace, &options.service_account)
                .await?;
            names.extend(from_account);
        }

        let mut keychain = DockerConfigKeychain::default();
        for name in &names {
            match secrets.docker_config(&options.namespace, name).await? {
                Some(bytes) => {
                    let parsed = DockerConfigKeychain::from_json(&bytes).map_err(|e| {
                        VerifyError::Config {
                            message: format!(
                                "failed to initialize registry keychain from secret {}/{}: {}",
                                options.namespace, name, e
                            ),
                        }
                    })?;
                    keychain.merge(parsed);
                }
                None => warn!(
                    namespace = %options.namespace,
                    secret = %name,
                    "image pull secret not found"
                ),
            }
        }

        debug!(
            namespace = %options.namespace,
            service_account = %options.service_account,
            registries = keychain.len(),
            "initialized registry keychain"
        );

        Ok(Self::new(keychain))
    }

    /// Build from configuration: an explicit docker config path, else the
    /// default docker config location, else anonymous.
    pub fn from_config(config: &RegistryConfig) -> VerifyResult<Self> {
        if let Some(path) = &config.docker_config {
            return Ok(Self::new(DockerConfigKeychain::from_file(path)?));
        }

        match default_docker_config_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "using docker config credentials");
                Ok(Self::new(DockerConfigKeychain::from_file(&path)?))
            }
            _ => Ok(Self::anonymous()),
        }
    }

    /// Build from environment (see [`RegistryConfig::from_env`]).
    pub fn from_env() -> VerifyResult<Self> {
        Self::from_config(&RegistryConfig::from_env())
    }

    /// Credentials for `registry`.
    pub fn auth_for(&self, registry: &str) -> RegistryAuth {
        self.keychain.resolve(registry)
    }
}

impl Default for CredentialContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

fn default_docker_config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG") {
        return Some(PathBuf::from(dir).join("config.json"));
    }
    dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
}
