//! Decoding of verified attestations into in-toto statements.
//!
//! A verified attestation payload is a DSSE envelope whose `payload` field is
//! a base64 in-toto statement. Statements are flattened into JSON maps; cosign
//! custom provenance predicates get their string-encoded `Data` expanded.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{VerifyError, VerifyResult};
use crate::types::SignedPayload;

/// Predicate type of `cosign attest --type custom`.
pub const COSIGN_CUSTOM_PROVENANCE_V01: &str = "https://cosign.sigstore.dev/attestation/v1";

/// A decoded in-toto statement with nested string-encoded JSON expanded.
pub type DecodedStatement = Map<String, Value>;

/// In-toto statement.
///
/// Missing or null fields decode to their empty value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "_type", default, deserialize_with = "null_as_default")]
    pub statement_type: String,

    #[serde(rename = "predicateType", default, deserialize_with = "null_as_default")]
    pub predicate_type: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: Vec<Subject>,

    #[serde(default)]
    pub predicate: Value,
}

/// Artifact a statement is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub digest: BTreeMap<String, String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Predicate of a statement, split by whether it needs normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Cosign custom provenance: `Data` plus the remaining fields.
    CustomProvenance {
        predicate_type: String,
        data: Value,
        rest: Map<String, Value>,
    },
    /// Any other predicate, kept as is.
    Passthrough(Value),
}

impl Predicate {
    /// Split `predicate` according to `predicate_type`.
    pub fn classify(predicate_type: &str, predicate: Value) -> VerifyResult<Self> {
        if predicate_type != COSIGN_CUSTOM_PROVENANCE_V01 {
            return Ok(Self::Passthrough(predicate));
        }

        let missing = || VerifyError::MissingPredicateData {
            predicate_type: predicate_type.to_string(),
        };

        let Value::Object(mut rest) = predicate else {
            return Err(missing());
        };
        match rest.remove("Data") {
            None | Some(Value::Null) => Err(missing()),
            Some(data) => Ok(Self::CustomProvenance {
                predicate_type: predicate_type.to_string(),
                data,
                rest,
            }),
        }
    }

    /// Predicate value with custom provenance `Data` expanded.
    ///
    /// A `Data` string holding a JSON object becomes that object; anything
    /// else is left untouched. Expansion only happens when the carried
    /// predicate type is the custom provenance type.
    pub fn normalize(self) -> Value {
        match self {
            Self::Passthrough(value) => value,
            Self::CustomProvenance {
                predicate_type,
                data,
                mut rest,
            } => {
                let data = match data {
                    Value::String(text) if predicate_type == COSIGN_CUSTOM_PROVENANCE_V01 => {
                        match serde_json::from_str::<Map<String, Value>>(&text) {
                            Ok(object) => Value::Object(object),
                            Err(_) => Value::String(text),
                        }
                    }
                    other => other,
                };
                rest.insert("Data".to_string(), data);
                Value::Object(rest)
            }
        }
    }
}

/// Decode verified attestation payloads, in order.
///
/// An empty input yields an empty output.
pub fn decode_statements(payloads: &[SignedPayload]) -> VerifyResult<Vec<DecodedStatement>> {
    payloads.iter().map(decode_payload).collect()
}

fn decode_payload(payload: &SignedPayload) -> VerifyResult<DecodedStatement> {
    let envelope: Value =
        serde_json::from_slice(payload.payload()).map_err(|e| VerifyError::PayloadDecode {
            reason: format!("failed to parse attestation envelope: {}", e),
        })?;

    let encoded = envelope
        .get("payload")
        .and_then(Value::as_str)
        .ok_or_else(|| VerifyError::PayloadDecode {
            reason: "attestation envelope has no string payload field".to_string(),
        })?;

    decode_statement(encoded)
}

/// Decode one base64 in-toto statement.
pub fn decode_statement(payload_base64: &str) -> VerifyResult<DecodedStatement> {
    let raw = BASE64
        .decode(payload_base64)
        .map_err(|e| VerifyError::StatementDecode {
            reason: format!("invalid base64 payload: {}", e),
        })?;

    let mut statement: Statement =
        serde_json::from_slice(&raw).map_err(|e| VerifyError::StatementDecode {
            reason: format!("invalid in-toto statement: {}", e),
        })?;

    let predicate = std::mem::take(&mut statement.predicate);
    statement.predicate = Predicate::classify(&statement.predicate_type, predicate)?.normalize();

    match serde_json::to_value(&statement) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(VerifyError::StatementDecode {
            reason: format!("statement is not an object: {}", other),
        }),
        Err(e) => Err(VerifyError::StatementDecode {
            reason: e.to_string(),
        }),
    }
}
