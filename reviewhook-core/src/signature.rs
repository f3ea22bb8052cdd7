use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Check an `X-Hub-Signature-256` header against the raw request body.
///
/// Returns `false` for an empty secret, a missing header, a header without the
/// `sha256=` prefix, bad hex, or a digest mismatch. The digest comparison is
/// constant-time.
pub fn verify_signature(secret: &str, payload: &[u8], signature: Option<&str>) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Some(signature_hex) = signature.and_then(|s| s.strip_prefix(SIGNATURE_PREFIX)) else {
        return false;
    };

    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(payload);
    mac.verify_slice(&signature_bytes).is_ok()
}

/// Compute the `sha256=<hex>` header value GitHub would send for `payload`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(payload);
    format!("{}{}", SIGNATURE_PREFIX, hex::encode(mac.finalize().into_bytes()))
}
