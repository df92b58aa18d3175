use super::billing::{BillingEngine, BillingParty, InvoiceView};
use super::signature::verify_payment_signature;
use super::validation::VerifyPayment;
use crate::config::PaymentConfig;
use crate::domain::invoice::{Invoice, InvoiceId, PaymentMethod};
use crate::domain::money::Money;
use crate::domain::ports::{ClockRef, InvoiceStoreRef, OrderRequest, PaymentProviderRef};
use crate::error::{Result, ServiceError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub const MSG_MISSING_ORDER: &str = "system error: invoice is missing order reference";
pub const MSG_INCOMPLETE: &str = "incomplete payment information";
pub const MSG_ORDER_MISMATCH: &str = "order id mismatch";
pub const MSG_INVALID_SIGNATURE: &str = "invalid payment signature";
pub const MSG_ALREADY_PAID: &str = "invoice already paid";
pub const MSG_PAID: &str = "payment successful";

/// Everything the checkout UI needs to collect a payment. The provider
/// secret is deliberately absent.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentOrder {
    pub order_id: String,
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub amount: Money,
    pub amount_minor_units: i64,
    pub currency: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub key_id: String,
}

/// Outcome of a verification attempt. Business rejections are reported here
/// rather than as errors.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentVerification {
    pub verified: bool,
    pub message: String,
    pub invoice: Option<InvoiceView>,
}

impl PaymentVerification {
    fn rejected(message: &str) -> Self {
        Self {
            verified: false,
            message: message.to_string(),
            invoice: None,
        }
    }
}

/// Payment order creation and checkout verification for invoices.
pub struct PaymentWorkflow {
    invoices: InvoiceStoreRef,
    billing: Arc<BillingEngine>,
    provider: PaymentProviderRef,
    clock: ClockRef,
    config: PaymentConfig,
    write_lock: Mutex<()>,
}

impl PaymentWorkflow {
    pub fn new(
        invoices: InvoiceStoreRef,
        billing: Arc<BillingEngine>,
        provider: PaymentProviderRef,
        clock: ClockRef,
        config: PaymentConfig,
    ) -> Self {
        Self {
            invoices,
            billing,
            provider,
            clock,
            config,
            write_lock: Mutex::new(()),
        }
    }

    /// Reserves the invoice total with the provider and moves the invoice to
    /// INITIATED. A provider failure leaves the invoice untouched.
    pub async fn create_payment_order(&self, invoice_id: InvoiceId) -> Result<PaymentOrder> {
        let _guard = self.write_lock.lock().await;
        let mut invoice = self.load(invoice_id).await?;
        if invoice.is_paid() {
            return Err(ServiceError::InvalidOperation(format!(
                "invoice {} is already paid",
                invoice.invoice_number
            )));
        }
        let BillingParty { customer, .. } = self.billing.billing_party(invoice.job_card_id).await?;

        let amount = invoice.amounts.total_amount;
        let mut notes = BTreeMap::new();
        notes.insert("invoice_id".to_string(), invoice.id.to_string());
        notes.insert("invoice_number".to_string(), invoice.invoice_number.clone());
        notes.insert("job_card_id".to_string(), invoice.job_card_id.to_string());
        let request = OrderRequest {
            amount_minor_units: amount.to_minor_units()?,
            currency: self.config.currency.clone(),
            receipt: invoice.invoice_number.clone(),
            notes,
        };

        let order = match tokio::time::timeout(
            self.config.provider_timeout,
            self.provider.create_order(&request),
        )
        .await
        {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => {
                error!(invoice_id, error = %e, "payment order creation failed");
                let reason = match e {
                    ServiceError::PaymentProcessing(reason) => reason,
                    other => other.to_string(),
                };
                return Err(ServiceError::PaymentProcessing(format!(
                    "failed to create payment order: {reason}"
                )));
            }
            Err(_) => {
                error!(
                    invoice_id,
                    timeout_ms = self.config.provider_timeout.as_millis() as u64,
                    "payment provider timed out"
                );
                return Err(ServiceError::PaymentProcessing(
                    "payment provider timed out".to_string(),
                ));
            }
        };

        invoice.initiate(order.order_id.clone(), self.clock.now())?;
        let saved = self.invoices.save(invoice).await?;
        info!(
            invoice_id,
            order_id = %order.order_id,
            invoice_number = %saved.invoice_number,
            "payment order created"
        );

        Ok(PaymentOrder {
            order_id: order.order_id,
            invoice_id: saved.id,
            invoice_number: saved.invoice_number,
            amount,
            amount_minor_units: request.amount_minor_units,
            currency: request.currency,
            customer_name: customer.name,
            customer_email: customer.email,
            customer_phone: customer.mobile,
            key_id: self.config.key_id.clone(),
        })
    }

    /// Checks a checkout result against the stored order and the provider
    /// signature, settling the invoice on success.
    ///
    /// A signature mismatch is persisted as FAILED before returning.
    pub async fn verify_payment(
        &self,
        invoice_id: InvoiceId,
        request: VerifyPayment,
    ) -> Result<PaymentVerification> {
        let _guard = self.write_lock.lock().await;
        let mut invoice = self.load(invoice_id).await?;
        if invoice.is_paid() {
            warn!(invoice_id, "verification attempted on a paid invoice");
            return Ok(PaymentVerification::rejected(MSG_ALREADY_PAID));
        }

        let Some(stored_order_id) = invoice.external_order_id.clone() else {
            error!(invoice_id, "invoice has no payment order recorded");
            return Ok(PaymentVerification::rejected(MSG_MISSING_ORDER));
        };
        let Some((order_id, payment_id, signature)) = request.complete_fields() else {
            error!(invoice_id, "payment verification request is missing data");
            return Ok(PaymentVerification::rejected(MSG_INCOMPLETE));
        };
        if order_id != stored_order_id {
            error!(
                invoice_id,
                expected = %stored_order_id,
                got = %order_id,
                "payment order id mismatch"
            );
            return Ok(PaymentVerification::rejected(MSG_ORDER_MISMATCH));
        }

        let secret = self.config.key_secret.as_deref().ok_or_else(|| {
            ServiceError::PaymentProcessing("payment key secret is not configured".to_string())
        })?;
        if !verify_payment_signature(secret, order_id, payment_id, signature)? {
            invoice.mark_failed(self.clock.now())?;
            self.invoices.save(invoice).await?;
            warn!(invoice_id, "payment signature verification failed");
            return Ok(PaymentVerification::rejected(MSG_INVALID_SIGNATURE));
        }

        let method = PaymentMethod::from_reported(request.payment_method.as_deref());
        invoice.mark_paid(
            Some(payment_id.to_string()),
            Some(signature.to_string()),
            method,
            self.clock.now(),
        )?;
        let saved = self.invoices.save(invoice).await?;
        info!(invoice_id, invoice_number = %saved.invoice_number, %method, "payment verified");

        Ok(PaymentVerification {
            verified: true,
            message: MSG_PAID.to_string(),
            invoice: self.settled_view(saved).await,
        })
    }

    /// Marks an invoice paid without any provider round-trip.
    ///
    /// Compiled only with the `payment-simulation` feature and refused unless
    /// the configuration allows simulated payments.
    #[cfg(feature = "payment-simulation")]
    pub async fn simulate_payment(&self, invoice_id: InvoiceId) -> Result<PaymentVerification> {
        if !self.config.allow_simulated_payments {
            return Err(ServiceError::InvalidOperation(
                "simulated payments are disabled".to_string(),
            ));
        }
        let _guard = self.write_lock.lock().await;
        let mut invoice = self.load(invoice_id).await?;
        if invoice.is_paid() {
            return Ok(PaymentVerification {
                verified: true,
                message: MSG_ALREADY_PAID.to_string(),
                invoice: Some(self.billing.project(invoice).await?),
            });
        }

        invoice.mark_paid(None, None, PaymentMethod::Simulated, self.clock.now())?;
        let saved = self.invoices.save(invoice).await?;
        warn!(invoice_id, "invoice marked as paid via simulation");
        Ok(PaymentVerification {
            verified: true,
            message: "payment simulated successfully".to_string(),
            invoice: Some(self.billing.project(saved).await?),
        })
    }

    /// The payment is already committed, so a projection failure only costs
    /// the caller the invoice details.
    async fn settled_view(&self, invoice: Invoice) -> Option<InvoiceView> {
        let invoice_id = invoice.id;
        match self.billing.project(invoice).await {
            Ok(view) => Some(view),
            Err(e) => {
                warn!(invoice_id, error = %e, "projection failed after successful payment");
                None
            }
        }
    }

    async fn load(&self, id: InvoiceId) -> Result<Invoice> {
        self.invoices
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("invoice", id))
    }
}
