//! Public key decoding.
//!
//! Cosign keys are ECDSA keys in SPKI PEM form (P-256 by default, P-384
//! accepted); signatures are ECDSA over a SHA-256 prehash, ASN.1 DER encoded.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use pkcs8::{DecodePublicKey, EncodePublicKey};
use sha2::{Digest, Sha256};

use crate::digest::sha256_hex_bytes;
use crate::error::{RegistryError, RegistryResult, VerifyError, VerifyResult};

#[derive(Debug, Clone)]
enum EcdsaKey {
    P256(p256::ecdsa::VerifyingKey),
    P384(p384::ecdsa::VerifyingKey),
}

/// ECDSA / SHA-256 verifier derived from a PEM public key.
#[derive(Debug, Clone)]
pub struct PublicVerifierKey {
    key: EcdsaKey,
    key_id: String,
}

impl PublicVerifierKey {
    /// Decode a PEM-encoded (SPKI) ECDSA public key on P-256 or P-384.
    pub fn from_pem(pem: &[u8]) -> VerifyResult<Self> {
        let text = std::str::from_utf8(pem).map_err(|e| VerifyError::KeyDecode {
            reason: format!("PEM is not valid UTF-8: {}", e),
        })?;
        let text = text.trim();

        let (key, der) = match p256::ecdsa::VerifyingKey::from_public_key_pem(text) {
            Ok(key) => {
                let der = key.to_public_key_der();
                (EcdsaKey::P256(key), der)
            }
            Err(p256_err) => {
                let key = p384::ecdsa::VerifyingKey::from_public_key_pem(text).map_err(|_| {
                    VerifyError::KeyDecode {
                        reason: format!("not an ECDSA P-256 or P-384 public key: {}", p256_err),
                    }
                })?;
                let der = key.to_public_key_der();
                (EcdsaKey::P384(key), der)
            }
        };

        let der = der.map_err(|e| VerifyError::KeyDecode {
            reason: format!("failed to encode public key: {}", e),
        })?;

        Ok(Self {
            key,
            key_id: sha256_hex_bytes(der.as_bytes()),
        })
    }

    /// SHA-256 of the SPKI DER encoding (`sha256:<hex>`).
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Verify a raw signature over `message`.
    ///
    /// DER signatures are expected; fixed-width `r || s` is accepted too.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> RegistryResult<()> {
        let prehash = Sha256::digest(message);

        let verified = match &self.key {
            EcdsaKey::P256(key) => {
                let signature = p256::ecdsa::Signature::from_der(signature)
                    .or_else(|_| p256::ecdsa::Signature::from_slice(signature))
                    .map_err(invalid_encoding)?;
                key.verify_prehash(&prehash[..], &signature)
            }
            EcdsaKey::P384(key) => {
                let signature = p384::ecdsa::Signature::from_der(signature)
                    .or_else(|_| p384::ecdsa::Signature::from_slice(signature))
                    .map_err(invalid_encoding)?;
                key.verify_prehash(&prehash[..], &signature)
            }
        };

        verified.map_err(|_| RegistryError::NoMatchingSignatures {
            reason: "ecdsa verification failed".to_string(),
        })
    }

    /// Verify a base64-encoded signature over `message`.
    pub fn verify_b64(&self, message: &[u8], signature_b64: &str) -> RegistryResult<()> {
        let signature =
            BASE64
                .decode(signature_b64.trim())
                .map_err(|e| RegistryError::NoMatchingSignatures {
                    reason: format!("invalid base64 signature: {}", e),
                })?;
        self.verify(message, &signature)
    }
}

fn invalid_encoding(e: p256::ecdsa::Error) -> RegistryError {
    RegistryError::NoMatchingSignatures {
        reason: format!("invalid signature encoding: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::hazmat::PrehashSigner;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};
    use pkcs8::LineEnding;

    fn generate_keypair() -> SigningKey {
        SigningKey::random(&mut rand::thread_rng())
    }

    fn public_pem(key: &SigningKey) -> String {
        key.verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    #[test]
    fn test_round_trip_accepts_matching_key() {
        let signing_key = generate_keypair();
        let verifier = PublicVerifierKey::from_pem(public_pem(&signing_key).as_bytes()).unwrap();

        let message = br#"{"critical":{}}"#;
        let signature: Signature = signing_key.sign(message);

        assert!(verifier
            .verify(message, signature.to_der().as_bytes())
            .is_ok());
        assert!(verifier.verify(message, &signature.to_bytes()).is_ok());
    }

    #[test]
    fn test_rejects_other_key() {
        let signing_key = generate_keypair();
        let other_key = generate_keypair();
        let verifier = PublicVerifierKey::from_pem(public_pem(&other_key).as_bytes()).unwrap();

        let message = b"payload";
        let signature: Signature = signing_key.sign(message);

        let result = verifier.verify(message, signature.to_der().as_bytes());
        assert!(matches!(
            result,
            Err(RegistryError::NoMatchingSignatures { .. })
        ));
    }

    #[test]
    fn test_rejects_tampered_message() {
        let signing_key = generate_keypair();
        let verifier = PublicVerifierKey::from_pem(public_pem(&signing_key).as_bytes()).unwrap();

        let signature: Signature = signing_key.sign(b"payload");
        let b64 = BASE64.encode(signature.to_der().as_bytes());

        assert!(verifier.verify_b64(b"payload", &b64).is_ok());
        assert!(verifier.verify_b64(b"payload!", &b64).is_err());
    }

    #[test]
    fn test_invalid_base64_signature() {
        let verifier =
            PublicVerifierKey::from_pem(public_pem(&generate_keypair()).as_bytes()).unwrap();
        assert!(verifier.verify_b64(b"payload", "not base64!!!").is_err());
    }

    #[test]
    fn test_decode_garbage() {
        let result = PublicVerifierKey::from_pem(b"not a pem");
        assert!(matches!(result, Err(VerifyError::KeyDecode { .. })));
    }

    #[test]
    fn test_decode_wrong_label() {
        let pem = public_pem(&generate_keypair()).replace("PUBLIC KEY", "PRIVATE KEY");
        let result = PublicVerifierKey::from_pem(pem.as_bytes());
        assert!(matches!(result, Err(VerifyError::KeyDecode { .. })));
    }

    #[test]
    fn test_key_id_format() {
        let verifier =
            PublicVerifierKey::from_pem(public_pem(&generate_keypair()).as_bytes()).unwrap();
        let key_id = verifier.key_id();
        assert!(key_id.starts_with("sha256:"));
        assert_eq!(key_id.len(), 7 + 64);
    }

    fn p384_keypair() -> p384::ecdsa::SigningKey {
        p384::ecdsa::SigningKey::random(&mut rand::thread_rng())
    }

    fn p384_pem(key: &p384::ecdsa::SigningKey) -> String {
        key.verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    #[test]
    fn test_p384_round_trip_with_sha256() {
        let signing_key = p384_keypair();
        let verifier = PublicVerifierKey::from_pem(p384_pem(&signing_key).as_bytes()).unwrap();

        let message = br#"{"critical":{}}"#;
        let prehash = Sha256::digest(message);
        let signature: p384::ecdsa::Signature = signing_key.sign_prehash(&prehash[..]).unwrap();

        assert!(verifier
            .verify(message, signature.to_der().as_bytes())
            .is_ok());
        assert!(verifier.verify(message, &signature.to_bytes()).is_ok());
        assert!(verifier
            .verify(b"other", signature.to_der().as_bytes())
            .is_err());
    }

    #[test]
    fn test_p384_rejects_other_key() {
        let signing_key = p384_keypair();
        let verifier = PublicVerifierKey::from_pem(p384_pem(&p384_keypair()).as_bytes()).unwrap();

        let prehash = Sha256::digest(b"payload");
        let signature: p384::ecdsa::Signature = signing_key.sign_prehash(&prehash[..]).unwrap();

        assert!(matches!(
            verifier.verify(b"payload", signature.to_der().as_bytes()),
            Err(RegistryError::NoMatchingSignatures { .. })
        ));
    }

    #[test]
    fn test_curves_get_distinct_key_ids() {
        let p256_id = PublicVerifierKey::from_pem(public_pem(&generate_keypair()).as_bytes())
            .unwrap()
            .key_id()
            .to_string();
        let p384_id = PublicVerifierKey::from_pem(p384_pem(&p384_keypair()).as_bytes())
            .unwrap()
            .key_id()
            .to_string();
        assert_ne!(p256_id, p384_id);
        assert!(p384_id.starts_with("sha256:"));
    }
}
