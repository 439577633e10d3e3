//! HTTP layer: auth challenges and status mapping.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::credentials::RegistryAuth;
use crate::error::{RegistryError, RegistryResult};
use crate::reference::Repository;
use crate::types::RegistryConfig;

use super::helpers::{parse_api_error, parse_challenge, Challenge};

/// What a request addresses; decides the error code for a bare 404.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Resource {
    Manifest,
    Blob,
}

impl Resource {
    fn not_found(self) -> (&'static str, &'static str) {
        match self {
            Self::Manifest => ("MANIFEST_UNKNOWN", "manifest unknown"),
            Self::Blob => ("BLOB_UNKNOWN", "blob unknown to registry"),
        }
    }
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// HTTP backend for making requests (holds reqwest client and config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) config: RegistryConfig,
}

impl HttpBackend {
    /// Base URL of the registry serving `repository`.
    pub(crate) fn registry_url(&self, repository: &Repository) -> String {
        format!(
            "{}://{}",
            repository.scheme(&self.config.insecure_registries),
            repository.registry()
        )
    }

    /// Make a request against `repository`, answering one auth challenge.
    ///
    /// Pre-issued bearer tokens are sent up front. Otherwise the request goes
    /// out anonymously; a `401` with a Basic challenge is repeated with the
    /// credentials, a Bearer challenge is answered by fetching a pull token
    /// from the realm.
    pub(crate) async fn request(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
        repository: &Repository,
        auth: &RegistryAuth,
        resource: Resource,
    ) -> RegistryResult<reqwest::Response> {
        let initial = match auth {
            RegistryAuth::Bearer(token) => Some(format!("Bearer {}", token)),
            _ => None,
        };

        let response = self
            .send(method.clone(), url, accept, initial.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED || initial.is_some() {
            return map_status(response, resource).await;
        }

        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_challenge);

        let authorization = match challenge {
            Some(Challenge::Basic) => match auth {
                RegistryAuth::Basic { username, password } => {
                    Some(basic_header(username, password))
                }
                _ => None,
            },
            Some(Challenge::Bearer {
                realm,
                service,
                scope,
            }) => {
                let scope =
                    scope.unwrap_or_else(|| format!("repository:{}:pull", repository.path()));
                let token = self
                    .fetch_token(&realm, service.as_deref(), &scope, auth)
                    .await?;
                Some(format!("Bearer {}", token))
            }
            None => None,
        };

        let Some(authorization) = authorization else {
            return Err(RegistryError::Unauthorized {
                message: format!("registry {} requires authentication", repository.registry()),
            });
        };

        debug!(url = %url, "retrying request with credentials");
        let response = self
            .send(method, url, accept, Some(&authorization))
            .await?;
        map_status(response, resource).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        accept: Option<&str>,
        authorization: Option<&str>,
    ) -> RegistryResult<reqwest::Response> {
        let mut request = self.client.request(method, url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(authorization) = authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        Ok(request.send().await?)
    }

    async fn fetch_token(
        &self,
        realm: &str,
        service: Option<&str>,
        scope: &str,
        auth: &RegistryAuth,
    ) -> RegistryResult<String> {
        debug!(realm = %realm, scope = %scope, "requesting registry token");

        let mut query: Vec<(&str, &str)> = vec![("scope", scope)];
        if let Some(service) = service {
            query.push(("service", service));
        }

        let mut request = self.client.get(realm).query(&query);
        if let RegistryAuth::Basic { username, password } = auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Unauthorized {
                message: format!("token endpoint returned HTTP {}", status.as_u16()),
            });
        }

        let body: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| RegistryError::InvalidResponse {
                    message: format!("failed to parse token response: {}", e),
                })?;

        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RegistryError::Unauthorized {
                message: "token endpoint returned no token".to_string(),
            })
    }
}

fn basic_header(username: &str, password: &str) -> String {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    format!(
        "Basic {}",
        BASE64.encode(format!("{}:{}", username, password))
    )
}

async fn map_status(
    response: reqwest::Response,
    resource: Resource,
) -> RegistryResult<reqwest::Response> {
    let status = response.status();

    match status.as_u16() {
        200..=299 => Ok(response),

        401 => Err(RegistryError::Unauthorized {
            message: "invalid or expired credentials".to_string(),
        }),

        404 => {
            let (code, message) = resource.not_found();
            let body = response.text().await.unwrap_or_default();
            Err(parse_api_error(&body, code, message))
        }

        400..=499 => {
            let body = response.text().await.unwrap_or_default();
            Err(parse_api_error(
                &body,
                "UNKNOWN",
                &format!("HTTP {}", status.as_u16()),
            ))
        }

        _ => {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(RegistryError::Network {
                message: format!("HTTP {}: {}", status.as_u16(), message),
            })
        }
    }
}
