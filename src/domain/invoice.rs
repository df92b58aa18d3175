use super::job_card::{JobCard, JobCardId};
use super::money::Money;
use crate::error::{Result, ServiceError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type InvoiceId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Initiated,
    Paid,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Initiated => "INITIATED",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Card,
    Upi,
    NetBanking,
    Wallet,
    Cash,
    Online,
    Simulated,
}

impl PaymentMethod {
    /// Maps a provider-reported method name, falling back to `Online` for
    /// anything unknown or absent.
    pub fn from_reported(method: Option<&str>) -> Self {
        let Some(method) = method else {
            return Self::Online;
        };
        match method.trim().to_ascii_lowercase().as_str() {
            "card" => Self::Card,
            "upi" => Self::Upi,
            "netbanking" | "net_banking" => Self::NetBanking,
            "wallet" => Self::Wallet,
            "cash" => Self::Cash,
            _ => Self::Online,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Card => "CARD",
            Self::Upi => "UPI",
            Self::NetBanking => "NET_BANKING",
            Self::Wallet => "WALLET",
            Self::Cash => "CASH",
            Self::Online => "ONLINE",
            Self::Simulated => "SIMULATED",
        };
        f.write_str(name)
    }
}

/// The amounts printed on an invoice.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
pub struct InvoiceAmounts {
    pub base_amount: Money,
    pub labor_cost: Money,
    pub tax_percentage: Decimal,
    pub tax_amount: Money,
    pub total_amount: Money,
}

impl InvoiceAmounts {
    /// `tax = round_half_up((base + labor) * pct / 100)`, `total = base + labor + tax`.
    pub fn compute(base_amount: Money, labor_cost: Money, tax_percentage: Decimal) -> Self {
        let taxable = base_amount + labor_cost;
        let tax_amount = taxable.percent(tax_percentage);
        Self {
            base_amount,
            labor_cost,
            tax_percentage,
            tax_amount,
            total_amount: taxable + tax_amount,
        }
    }

    pub fn for_job_card(job_card: &JobCard, tax_percentage: Decimal) -> Self {
        Self::compute(job_card.parts_total(), job_card.labor_cost, tax_percentage)
    }
}

/// Formats `INV-<year>-<4-digit sequence>`.
pub fn invoice_number(year: i32, sequence: u64) -> String {
    format!("INV-{year}-{sequence:04}")
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub job_card_id: JobCardId,
    #[serde(flatten)]
    pub amounts: InvoiceAmounts,
    pub payment_status: PaymentStatus,
    pub external_order_id: Option<String>,
    pub external_payment_id: Option<String>,
    pub signature: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        invoice_number: String,
        job_card_id: JobCardId,
        amounts: InvoiceAmounts,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            invoice_number,
            job_card_id,
            amounts,
            payment_status: PaymentStatus::Pending,
            external_order_id: None,
            external_payment_id: None,
            signature: None,
            payment_method: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    fn require_unpaid(&self) -> Result<()> {
        if self.is_paid() {
            Err(ServiceError::InvalidOperation(format!(
                "invoice {} is already paid",
                self.invoice_number
            )))
        } else {
            Ok(())
        }
    }

    /// Records a freshly created provider order. Allowed from any unpaid state,
    /// which is how a failed payment gets retried.
    pub fn initiate(&mut self, order_id: String, now: DateTime<Utc>) -> Result<()> {
        self.require_unpaid()?;
        self.external_order_id = Some(order_id);
        self.payment_status = PaymentStatus::Initiated;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require_unpaid()?;
        self.payment_status = PaymentStatus::Failed;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_paid(
        &mut self,
        payment_id: Option<String>,
        signature: Option<String>,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.require_unpaid()?;
        self.external_payment_id = payment_id;
        self.signature = signature;
        self.payment_method = Some(method);
        self.payment_status = PaymentStatus::Paid;
        self.paid_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
