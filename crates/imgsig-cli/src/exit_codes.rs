//! Exit codes of the `imgsig` binary.
//! These codes are part of the public contract; policy scripts branch on them.

pub const SUCCESS: i32 = 0;
pub const NOT_FOUND: i32 = 1; // No signature or attestation (unsigned)
pub const MISMATCH: i32 = 2; // Signed, but not by the supplied key
pub const VERIFICATION_FAILED: i32 = 3; // Inconclusive; treat as failure
pub const INPUT_ERROR: i32 = 4; // Bad key, reference, repository or config
