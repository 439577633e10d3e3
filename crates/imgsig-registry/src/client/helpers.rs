//! Pure helpers: auth challenges, error bodies, artifact tags (no HTTP, no status logic).

use std::collections::HashMap;

use crate::digest::digest_hex;
use crate::error::RegistryError;
use crate::types::ApiErrors;

/// Tag suffix of cosign signature artifacts.
pub const SIGNATURE_TAG_SUFFIX: &str = "sig";

/// Tag suffix of cosign attestation artifacts.
pub const ATTESTATION_TAG_SUFFIX: &str = "att";

/// Tag under which cosign stores artifacts for `digest`.
///
/// `sha256:abc...` with suffix `sig` → `sha256-abc....sig`
pub fn artifact_tag(digest: &str, suffix: &str) -> String {
    format!("sha256-{}.{}", digest_hex(digest), suffix)
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

/// Parse a `WWW-Authenticate` header value.
///
/// `Bearer realm="https://auth.example/token",service="registry.example"`
pub(crate) fn parse_challenge(header: &str) -> Option<Challenge> {
    let header = header.trim();
    let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));

    if scheme.eq_ignore_ascii_case("basic") {
        return Some(Challenge::Basic);
    }
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }

    let params = parse_params(params);
    let realm = params.get("realm")?.clone();
    Some(Challenge::Bearer {
        realm,
        service: params.get("service").cloned(),
        scope: params.get("scope").cloned(),
    })
}

fn parse_params(params: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    let mut rest = params.trim();

    while !rest.is_empty() {
        let Some((key, after)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_ascii_lowercase();

        let (value, remaining) = if let Some(quoted) = after.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (&quoted[..end], &quoted[end + 1..]),
                None => (quoted, ""),
            }
        } else {
            match after.find(',') {
                Some(end) => (&after[..end], &after[end..]),
                None => (after, ""),
            }
        };

        out.insert(key, value.to_string());
        rest = remaining.trim_start_matches(',').trim();
    }

    out
}

/// Map a distribution API error body to a [`RegistryError`].
///
/// Falls back to `default_code` when the body carries no error entries.
pub(crate) fn parse_api_error(body: &str, default_code: &str, default_message: &str) -> RegistryError {
    let first = serde_json::from_str::<ApiErrors>(body)
        .ok()
        .and_then(|errors| errors.errors.into_iter().next());

    match first {
        Some(entry) if !entry.code.is_empty() => RegistryError::Api {
            code: entry.code,
            message: entry.message,
        },
        _ => RegistryError::Api {
            code: default_code.to_string(),
            message: default_message.to_string(),
        },
    }
}
