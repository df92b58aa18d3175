use crate::error::{Result, ServiceError};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn signing_mac(secret: &str, order_id: &str, payment_id: &str) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| {
        ServiceError::PaymentProcessing(format!("failed to calculate signature: {e}"))
    })?;
    mac.update(order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    Ok(mac)
}

/// Lowercase hex HMAC-SHA256 of `"<order_id>|<payment_id>"` keyed with the
/// provider secret. This is what the provider attaches to a checkout result.
pub fn payment_signature(secret: &str, order_id: &str, payment_id: &str) -> Result<String> {
    let mac = signing_mac(secret, order_id, payment_id)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks a provider signature against the expected one in constant time.
///
/// Only the lowercase hex form the provider emits is accepted.
pub fn verify_payment_signature(
    secret: &str,
    order_id: &str,
    payment_id: &str,
    signature: &str,
) -> Result<bool> {
    if signature.bytes().any(|b| b.is_ascii_uppercase()) {
        return Ok(false);
    }
    let Ok(supplied) = hex::decode(signature) else {
        return Ok(false);
    };
    let mac = signing_mac(secret, order_id, payment_id)?;
    Ok(mac.verify_slice(&supplied).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // Reference value from an independent HMAC-SHA256 implementation.
        assert_eq!(
            payment_signature("test_secret", "order_RZP123", "pay_ABC456").unwrap(),
            "1e6d7f3daacb1e13deb9a2970b2c2e899434dfd4041036c19c8d32da02ddab40"
        );
    }

    #[test]
    fn test_deterministic_and_lowercase_hex() {
        let a = payment_signature("secret", "order_1", "pay_1").unwrap();
        let b = payment_signature("secret", "order_1", "pay_1").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_single_character_change_alters_signature() {
        let base = payment_signature("secret", "order_1", "pay_1").unwrap();
        assert_ne!(base, payment_signature("secret", "order_2", "pay_1").unwrap());
        assert_ne!(base, payment_signature("secret", "order_1", "pay_2").unwrap());
        assert_ne!(base, payment_signature("secreT", "order_1", "pay_1").unwrap());
    }

    #[test]
    fn test_separator_is_part_of_payload() {
        assert_ne!(
            payment_signature("secret", "ab", "c").unwrap(),
            payment_signature("secret", "a", "bc").unwrap()
        );
    }

    #[test]
    fn test_verify_accepts_only_exact_signature() {
        let signature = payment_signature("secret", "order_1", "pay_1").unwrap();
        assert!(verify_payment_signature("secret", "order_1", "pay_1", &signature).unwrap());
        assert!(
            !verify_payment_signature("secret", "order_1", "pay_1", &signature.to_uppercase())
                .unwrap()
        );
        assert!(!verify_payment_signature("secret", "order_1", "pay_2", &signature).unwrap());
        assert!(!verify_payment_signature("secret", "order_1", "pay_1", "not-hex").unwrap());
        assert!(!verify_payment_signature("secret", "order_1", "pay_1", &signature[..62]).unwrap());
    }
}
