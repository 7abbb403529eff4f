//! Payment webhook signature verification.

use hmac::digest::InvalidLength;
use hmac::{Hmac, Mac};
use sha2::Sha512;

/// Header carrying the hex HMAC-SHA512 of the raw request body.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

type HmacSha512 = Hmac<Sha512>;

/// Why a webhook signature was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("webhook signing secret is not configured")]
    NoSecret,
    #[error("missing signature")]
    Missing,
    #[error("malformed signature")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
}

/// Checks `signature` against the body, in constant time.
pub fn verify(secret: &str, body: &[u8], signature: Option<&str>) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::NoSecret);
    }
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::Missing)?;
    let expected = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

    let mut mac =
        HmacSha512::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Hex signature of `body`, as the gateway computes it.
pub fn sign(secret: &str, body: &[u8]) -> Result<String, InvalidLength> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"eventType":"SUCCESSFUL_TRANSACTION"}"#;

    #[test]
    fn test_valid_signature() {
        let signature = sign(SECRET, BODY).unwrap();
        assert_eq!(signature.len(), 128);
        assert_eq!(verify(SECRET, BODY, Some(&signature)), Ok(()));
        assert_eq!(
            verify(SECRET, BODY, Some(&signature.to_uppercase())),
            Ok(())
        );
    }

    #[test]
    fn test_rejections() {
        let signature = sign(SECRET, BODY).unwrap();
        assert_eq!(verify(SECRET, BODY, None), Err(SignatureError::Missing));
        assert_eq!(
            verify(SECRET, BODY, Some("not-hex")),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify(SECRET, b"tampered", Some(&signature)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify("other", BODY, Some(&signature)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(verify("", BODY, Some(&signature)), Err(SignatureError::NoSecret));
    }
}
