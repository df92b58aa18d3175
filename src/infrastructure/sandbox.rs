//! A local stand-in for the payment gateway.
//!
//! Orders are numbered `order_sbx_0001`, `order_sbx_0002`, ... and a checkout
//! can be completed locally by signing the order with the shared secret, the
//! same way the gateway would.

use crate::application::signature::payment_signature;
use crate::domain::ports::{OrderRequest, PaymentProvider, ProviderOrder};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Payment id and signature the gateway hands back after a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutResult {
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Default)]
pub struct SandboxPaymentProvider {
    key_secret: Option<String>,
    orders: AtomicU64,
    payments: AtomicU64,
    unavailable: AtomicBool,
}

impl SandboxPaymentProvider {
    pub fn new(key_secret: Option<String>) -> Self {
        Self {
            key_secret,
            ..Default::default()
        }
    }

    /// Makes subsequent `create_order` calls fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Completes a checkout for `order_id`, returning what the gateway would
    /// post back to the merchant.
    pub fn checkout(&self, order_id: &str) -> Result<CheckoutResult> {
        let secret = self.key_secret.as_deref().ok_or_else(|| {
            ServiceError::PaymentProcessing("sandbox has no key secret to sign with".to_string())
        })?;
        let n = self.payments.fetch_add(1, Ordering::SeqCst) + 1;
        let payment_id = format!("pay_sbx_{n:04}");
        let signature = payment_signature(secret, order_id, &payment_id)?;
        Ok(CheckoutResult {
            payment_id,
            signature,
        })
    }
}

#[async_trait]
impl PaymentProvider for SandboxPaymentProvider {
    async fn create_order(&self, request: &OrderRequest) -> Result<ProviderOrder> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ServiceError::PaymentProcessing(
                "sandbox gateway unavailable".to_string(),
            ));
        }
        if request.amount_minor_units <= 0 {
            return Err(ServiceError::PaymentProcessing(format!(
                "order amount must be positive, got {}",
                request.amount_minor_units
            )));
        }
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        let order_id = format!("order_sbx_{n:04}");
        debug!(%order_id, receipt = %request.receipt, amount = request.amount_minor_units, "sandbox order created");
        Ok(ProviderOrder { order_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::signature::verify_payment_signature;
    use std::collections::BTreeMap;

    fn request(amount_minor_units: i64) -> OrderRequest {
        OrderRequest {
            amount_minor_units,
            currency: "INR".to_string(),
            receipt: "INV-2026-0001".to_string(),
            notes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_order_ids_are_sequential() {
        let provider = SandboxPaymentProvider::new(None);
        let first = provider.create_order(&request(29500)).await.unwrap();
        let second = provider.create_order(&request(29500)).await.unwrap();
        assert_eq!(first.order_id, "order_sbx_0001");
        assert_eq!(second.order_id, "order_sbx_0002");
    }

    #[tokio::test]
    async fn test_unavailable_and_zero_amount_fail() {
        let provider = SandboxPaymentProvider::new(None);
        assert!(provider.create_order(&request(0)).await.is_err());
        provider.set_unavailable(true);
        assert!(matches!(
            provider.create_order(&request(100)).await,
            Err(ServiceError::PaymentProcessing(_))
        ));
    }

    #[test]
    fn test_checkout_signature_verifies() {
        let provider = SandboxPaymentProvider::new(Some("s3cret".to_string()));
        let result = provider.checkout("order_sbx_0001").unwrap();
        assert_eq!(result.payment_id, "pay_sbx_0001");
        assert!(
            verify_payment_signature("s3cret", "order_sbx_0001", &result.payment_id, &result.signature)
                .unwrap()
        );
        assert!(SandboxPaymentProvider::new(None).checkout("order_sbx_0001").is_err());
    }
}
