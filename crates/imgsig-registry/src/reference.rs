//! Image reference parsing.
//!
//! Supports the usual registry reference formats:
//! - `nginx` → `index.docker.io/library/nginx:latest`
//! - `ghcr.io/org/app:v1` → explicit registry and tag
//! - `registry.example/app@sha256:abc...` → pinned digest
//! - `localhost:5000/app:v1@sha256:abc...` → tag and digest
//!
//! A [`Repository`] is the same coordinate without tag or digest.

use std::fmt;

use crate::error::{VerifyError, VerifyResult};

/// Registry used when a reference names none.
pub const DEFAULT_REGISTRY: &str = "index.docker.io";

/// Tag used when a reference names neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

const DOCKER_HUB_ALIASES: &[&str] = &["docker.io", "registry-1.docker.io", "index.docker.io"];

/// Registry host plus repository path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Repository {
    registry: String,
    path: String,
}

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    repository: Repository,
    tag: Option<String>,
    digest: Option<String>,
}

impl Repository {
    /// Parse a `host/path` repository string.
    ///
    /// # Examples
    ///
    /// ```
    /// use imgsig_registry::Repository;
    ///
    /// let repo = Repository::parse("registry.example/signatures/app").unwrap();
    /// assert_eq!(repo.registry(), "registry.example");
    /// assert_eq!(repo.path(), "signatures/app");
    ///
    /// // Tags are not part of a repository
    /// assert!(Repository::parse("registry.example/app:v1").is_err());
    /// ```
    pub fn parse(repository: &str) -> VerifyResult<Self> {
        let repository = repository.trim();
        let invalid = |reason: &str| VerifyError::RepositoryParse {
            repository: repository.to_string(),
            reason: reason.to_string(),
        };

        if repository.is_empty() {
            return Err(invalid("empty repository"));
        }
        if repository.contains('@') {
            return Err(invalid("repository must not contain a digest"));
        }
        if let Some((_, last)) = repository.rsplit_once('/') {
            if last.contains(':') {
                return Err(invalid("repository must not contain a tag"));
            }
        }

        split_repository(repository).map_err(|reason| invalid(&reason))
    }

    pub fn registry(&self) -> &str {
        &self.registry
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// URL scheme for reaching this repository's registry.
    ///
    /// Loopback registries and hosts listed in `insecure` use plain HTTP.
    pub fn scheme(&self, insecure: &[String]) -> &'static str {
        let host = host_without_port(&self.registry);
        if insecure.iter().any(|h| h == &self.registry || h == host)
            || matches!(host, "localhost" | "127.0.0.1" | "[::1]")
        {
            "http"
        } else {
            "https"
        }
    }
}

impl ImageRef {
    /// Parse an image reference string.
    ///
    /// # Examples
    ///
    /// ```
    /// use imgsig_registry::ImageRef;
    ///
    /// let image = ImageRef::parse("nginx").unwrap();
    /// assert_eq!(image.to_string(), "index.docker.io/library/nginx:latest");
    ///
    /// let image = ImageRef::parse("registry.example/app:v1").unwrap();
    /// assert_eq!(image.repository().path(), "app");
    /// assert_eq!(image.tag(), Some("v1"));
    /// ```
    pub fn parse(reference: &str) -> VerifyResult<Self> {
        let reference = reference.trim();
        let invalid = |reason: &str| VerifyError::ImageRefParse {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        if reference.is_empty() {
            return Err(invalid("empty reference"));
        }

        // Digest comes last and may itself contain ':'
        let (name, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                validate_digest(digest).map_err(|reason| invalid(&reason))?;
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A tag is a ':' after the last '/', otherwise it is a registry port
        let last_slash = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let tag = &name[last_slash + i + 1..];
                validate_tag(tag).map_err(|reason| invalid(&reason))?;
                (&name[..last_slash + i], Some(tag.to_string()))
            }
            None => (name, None),
        };

        let repository = split_repository(name).map_err(|reason| invalid(&reason))?;

        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(Self {
            repository,
            tag,
            digest,
        })
    }

    /// The repository the image lives in.
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// The manifest identifier to request: the digest if pinned, else the tag.
    pub fn identifier(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.path)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageRef {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::str::FromStr for Repository {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Canonical registry host (Docker Hub aliases collapse to one name).
pub(crate) fn normalize_registry(registry: &str) -> &str {
    if DOCKER_HUB_ALIASES.contains(&registry) {
        DEFAULT_REGISTRY
    } else {
        registry
    }
}

fn host_without_port(registry: &str) -> &str {
    if registry.starts_with('[') {
        return registry
            .find(']')
            .map(|i| &registry[..=i])
            .unwrap_or(registry);
    }
    registry.split(':').next().unwrap_or(registry)
}

/// Split `name` into registry host and repository path, applying Docker Hub
/// defaults.
fn split_repository(name: &str) -> Result<Repository, String> {
    let (registry, path) = match name.split_once('/') {
        Some((first, rest)) if looks_like_registry(first) => (first, rest),
        _ => (DEFAULT_REGISTRY, name),
    };

    validate_registry(registry)?;
    let registry = normalize_registry(registry);

    let path = if registry == DEFAULT_REGISTRY && !path.contains('/') {
        format!("library/{}", path)
    } else {
        path.to_string()
    };

    validate_path(&path)?;

    Ok(Repository {
        registry: registry.to_string(),
        path,
    })
}

fn looks_like_registry(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn validate_registry(registry: &str) -> Result<(), String> {
    if registry.is_empty() {
        return Err("registry cannot be empty".to_string());
    }
    if !registry
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
    {
        return Err(format!("invalid registry host '{}'", registry));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("repository path cannot be empty".to_string());
    }
    if path.len() > 255 {
        return Err("repository path exceeds 255 characters".to_string());
    }

    for component in path.split('/') {
        if component.is_empty() {
            return Err("repository path has an empty component".to_string());
        }
        if !component.chars().all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-')
        }) {
            return Err(format!(
                "repository component '{}' may only contain lowercase letters, digits, '.', '_' and '-'",
                component
            ));
        }
        let first = component.chars().next().unwrap_or('-');
        let last = component.chars().last().unwrap_or('-');
        if !first.is_ascii_alphanumeric() || !last.is_ascii_alphanumeric() {
            return Err(format!(
                "repository component '{}' must start and end with a letter or digit",
                component
            ));
        }
    }

    Ok(())
}

fn validate_tag(tag: &str) -> Result<(), String> {
    if tag.is_empty() || tag.len() > 128 {
        return Err("tag must be 1 to 128 characters".to_string());
    }
    let mut chars = tag.chars();
    let first_ok = chars
        .next()
        .map(|c| c.is_ascii_alphanumeric() || c == '_')
        .unwrap_or(false);
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return Err(format!("invalid tag '{}'", tag));
    }
    Ok(())
}

fn validate_digest(digest: &str) -> Result<(), String> {
    let hex_part = digest
        .strip_prefix("sha256:")
        .ok_or_else(|| "digest must start with 'sha256:'".to_string())?;
    if hex_part.len() != 64
        || !hex_part
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    {
        return Err("digest must be 64 lowercase hex characters".to_string());
    }
    Ok(())
}
