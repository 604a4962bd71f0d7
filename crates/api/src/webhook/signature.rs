//! HMAC-SHA256 webhook signature verification, grounded on
//! `other_examples/.../github-rust-src-webhooks-mod.rs`'s
//! `WebhookVerifier::verify` — constant-time via `Mac::verify_slice`
//! rather than the teacher's own plain `==` secret comparison in
//! `trigger_mr_route.rs` (spec.md §4.1 "compares against the configured
//! secret using a constant-time comparison").

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature, in `sha256=<hex>` form.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

pub fn verify(secret: &str, signature_header: &str, body: &[u8]) -> bool {
    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(hex_sig) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&sig_bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn verifies_matching_signature() {
        let body = b"{\"kind\":\"merge_request\"}";
        let sig = sign("s3cr3t", body);
        assert!(verify("s3cr3t", &sig, body));
    }

    #[test]
    fn rejects_wrong_secret() {
        let body = b"{\"kind\":\"merge_request\"}";
        let sig = sign("s3cr3t", body);
        assert!(!verify("wrong", &sig, body));
    }

    #[test]
    fn rejects_malformed_header() {
        assert!(!verify("s3cr3t", "not-a-signature", b"body"));
    }
}
