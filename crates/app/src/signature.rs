use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

/// Checks `X-Line-Signature` tokens against the shared channel secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Arc<[u8]>,
}

impl SignatureVerifier {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            secret: Arc::from(secret.to_vec().into_boxed_slice()),
        }
    }

    /// Returns `true` when `token` is the base64 HMAC-SHA256 of `body`.
    ///
    /// Malformed tokens are rejected before any comparison is made.
    pub fn verify(&self, body: &[u8], token: &str) -> bool {
        let provided = match STANDARD.decode(token) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(stage = "ingress", error = %err, "signature is not valid base64");
                return false;
            }
        };

        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(body);
        let expected = mac.finalize().into_bytes();
        let expected_bytes: &[u8] = expected.as_ref();

        expected_bytes.ct_eq(provided.as_slice()).into()
    }

    /// Produces the token a sender holding the same secret would attach to `body`.
    #[cfg(test)]
    pub(crate) fn sign(&self, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.secret).expect("hmac key");
        mac.update(body);
        STANDARD.encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"destination":"d1","events":[]}"#;

    #[test]
    fn accepts_token_computed_with_same_secret() {
        let verifier = SignatureVerifier::new(b"channel-secret");
        let token = verifier.sign(BODY);
        assert!(verifier.verify(BODY, &token));
    }

    #[test]
    fn rejects_token_from_other_secret() {
        let verifier = SignatureVerifier::new(b"channel-secret");
        let token = SignatureVerifier::new(b"other-secret").sign(BODY);
        assert!(!verifier.verify(BODY, &token));
    }

    #[test]
    fn rejects_any_single_bit_flip_in_body() {
        let verifier = SignatureVerifier::new(b"channel-secret");
        let token = verifier.sign(BODY);
        for index in 0..BODY.len() {
            for bit in 0..8 {
                let mut mutated = BODY.to_vec();
                mutated[index] ^= 1 << bit;
                assert!(
                    !verifier.verify(&mutated, &token),
                    "bit {bit} of byte {index} flipped but verified"
                );
            }
        }
    }

    #[test]
    fn rejects_any_single_bit_flip_in_token() {
        let verifier = SignatureVerifier::new(b"channel-secret");
        let digest = STANDARD
            .decode(verifier.sign(BODY))
            .expect("token is base64");
        for index in 0..digest.len() {
            for bit in 0..8 {
                let mut mutated = digest.clone();
                mutated[index] ^= 1 << bit;
                assert!(!verifier.verify(BODY, &STANDARD.encode(&mutated)));
            }
        }
    }

    #[test]
    fn rejects_malformed_and_truncated_tokens() {
        let verifier = SignatureVerifier::new(b"channel-secret");
        assert!(!verifier.verify(BODY, "not base64!"));
        assert!(!verifier.verify(BODY, ""));

        let digest = STANDARD.decode(verifier.sign(BODY)).expect("base64");
        assert!(!verifier.verify(BODY, &STANDARD.encode(&digest[..16])));
    }
}
