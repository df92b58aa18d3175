use crate::config::BillingConfig;
use crate::domain::directory::{User, UserId, Vehicle};
use crate::domain::invoice::{
    Invoice, InvoiceAmounts, InvoiceId, PaymentMethod, PaymentStatus, invoice_number,
};
use crate::domain::job_card::{JobCard, JobCardId, JobCardStatus};
use crate::domain::money::Money;
use crate::domain::ports::{
    AppointmentStoreRef, ClockRef, DirectoryStoreRef, InvoiceFilter, InvoiceStoreRef,
    JobCardStoreRef,
};
use crate::error::{Result, ServiceError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Attempts at inserting a new invoice before giving up on number clashes.
const MAX_ISSUE_ATTEMPTS: usize = 3;

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct InvoiceLine {
    pub item_name: String,
    pub item_price: Money,
    pub quantity: u32,
    pub total_price: Money,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct InvoiceView {
    pub id: InvoiceId,
    pub invoice_number: String,
    pub job_card_id: JobCardId,
    pub job_card_status: JobCardStatus,
    pub customer_id: UserId,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub vehicle_registration: String,
    pub vehicle_brand: String,
    pub vehicle_model: String,
    pub base_amount: Money,
    pub labor_cost: Money,
    pub tax_percentage: Decimal,
    pub tax_amount: Money,
    pub total_amount: Money,
    pub payment_status: PaymentStatus,
    pub external_order_id: Option<String>,
    pub external_payment_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub paid_at: Option<DateTime<Utc>>,
    pub items: Vec<InvoiceLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Customer and vehicle an invoice is addressed to.
pub(crate) struct BillingParty {
    pub job_card: JobCard,
    pub vehicle: Vehicle,
    pub customer: User,
}

/// Turns completed job cards into invoices and reports on revenue.
pub struct BillingEngine {
    invoices: InvoiceStoreRef,
    job_cards: JobCardStoreRef,
    appointments: AppointmentStoreRef,
    directory: DirectoryStoreRef,
    clock: ClockRef,
    config: BillingConfig,
    /// Serialises issuance so the count-based sequence cannot be handed out twice.
    issue_lock: Mutex<()>,
}

impl BillingEngine {
    pub fn new(
        invoices: InvoiceStoreRef,
        job_cards: JobCardStoreRef,
        appointments: AppointmentStoreRef,
        directory: DirectoryStoreRef,
        clock: ClockRef,
        config: BillingConfig,
    ) -> Self {
        Self {
            invoices,
            job_cards,
            appointments,
            directory,
            clock,
            config,
            issue_lock: Mutex::new(()),
        }
    }

    /// Issues the invoice for a completed job card, or returns the one that
    /// already exists.
    pub async fn generate_invoice(&self, job_card_id: JobCardId) -> Result<InvoiceView> {
        let job_card = self.job_card(job_card_id).await?;
        if job_card.status != JobCardStatus::Completed {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot generate invoice for job card {job_card_id} with status {}",
                job_card.status
            )));
        }
        if let Some(existing) = self.invoices.find_by_job_card(job_card_id).await? {
            return self.project(existing).await;
        }

        let _guard = self.issue_lock.lock().await;
        let amounts = InvoiceAmounts::for_job_card(&job_card, self.config.tax_percentage);
        for attempt in 1..=MAX_ISSUE_ATTEMPTS {
            if let Some(existing) = self.invoices.find_by_job_card(job_card_id).await? {
                return self.project(existing).await;
            }

            let sequence = self.invoices.count(&InvoiceFilter::default()).await? + 1;
            let number = invoice_number(self.clock.current_year(), sequence);
            let invoice = Invoice::new(number, job_card_id, amounts, self.clock.now());
            match self.invoices.insert(invoice).await {
                Ok(saved) => {
                    info!(
                        job_card_id,
                        invoice_number = %saved.invoice_number,
                        total = %saved.amounts.total_amount,
                        "invoice generated"
                    );
                    return self.project(saved).await;
                }
                Err(ServiceError::DuplicateResource(reason)) => {
                    warn!(job_card_id, attempt, %reason, "invoice insert conflicted, re-reading");
                }
                Err(e) => return Err(e),
            }
        }

        match self.invoices.find_by_job_card(job_card_id).await? {
            Some(existing) => self.project(existing).await,
            None => Err(ServiceError::DuplicateResource(format!(
                "could not allocate an invoice number for job card {job_card_id}"
            ))),
        }
    }

    /// Fetches an invoice by id without issuing anything.
    pub async fn get_invoice(&self, id: InvoiceId) -> Result<InvoiceView> {
        let invoice = self.load(id).await?;
        self.project(invoice).await
    }

    pub async fn get_invoice_by_number(&self, invoice_number: &str) -> Result<InvoiceView> {
        let invoice = self
            .invoices
            .find_by_number(invoice_number)
            .await?
            .ok_or_else(|| ServiceError::not_found("invoice", invoice_number))?;
        self.project(invoice).await
    }

    /// Returns the job card's invoice, issuing it on the spot when the card is
    /// completed but nobody has billed it yet.
    pub async fn get_invoice_by_job_card(&self, job_card_id: JobCardId) -> Result<InvoiceView> {
        if let Some(invoice) = self.invoices.find_by_job_card(job_card_id).await? {
            return self.project(invoice).await;
        }
        let job_card = self.job_card(job_card_id).await?;
        if job_card.status == JobCardStatus::Completed {
            info!(job_card_id, "proactively generating invoice for completed job card");
            return self.generate_invoice(job_card_id).await;
        }
        Err(ServiceError::NotFound(format!(
            "invoice has not been generated for job card {job_card_id}"
        )))
    }

    pub async fn all_invoices(&self) -> Result<Vec<InvoiceView>> {
        self.query(InvoiceFilter::default()).await
    }

    pub async fn invoices_by_customer(&self, customer_id: UserId) -> Result<Vec<InvoiceView>> {
        self.query(InvoiceFilter {
            customer_id: Some(customer_id),
            ..Default::default()
        })
        .await
    }

    pub async fn invoices_by_status(&self, status: PaymentStatus) -> Result<Vec<InvoiceView>> {
        self.query(InvoiceFilter {
            payment_status: Some(status),
            ..Default::default()
        })
        .await
    }

    pub async fn total_invoice_count(&self) -> Result<u64> {
        self.invoices.count(&InvoiceFilter::default()).await
    }

    pub async fn pending_payment_count(&self) -> Result<u64> {
        self.invoices.count(&by_status(PaymentStatus::Pending)).await
    }

    pub async fn paid_invoice_count(&self) -> Result<u64> {
        self.invoices.count(&by_status(PaymentStatus::Paid)).await
    }

    /// Sum of paid invoice totals.
    pub async fn total_revenue(&self) -> Result<Money> {
        self.invoices.sum_total(&by_status(PaymentStatus::Paid)).await
    }

    /// Sum of paid invoice totals over the manager's job cards.
    pub async fn revenue_by_manager(&self, manager_id: UserId) -> Result<Money> {
        self.invoices
            .sum_total(&InvoiceFilter {
                manager_id: Some(manager_id),
                payment_status: Some(PaymentStatus::Paid),
                ..Default::default()
            })
            .await
    }

    /// Sum of invoice totals still awaiting a payment order.
    pub async fn pending_revenue(&self) -> Result<Money> {
        self.invoices.sum_total(&by_status(PaymentStatus::Pending)).await
    }

    pub(crate) async fn billing_party(&self, job_card_id: JobCardId) -> Result<BillingParty> {
        let job_card = self.job_card(job_card_id).await?;
        let appointment = self
            .appointments
            .get(job_card.appointment_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("appointment", job_card.appointment_id))?;
        let vehicle = self
            .directory
            .vehicle(appointment.vehicle_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("vehicle", appointment.vehicle_id))?;
        let customer = self
            .directory
            .user(vehicle.customer_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("customer", vehicle.customer_id))?;
        Ok(BillingParty {
            job_card,
            vehicle,
            customer,
        })
    }

    pub(crate) async fn project(&self, invoice: Invoice) -> Result<InvoiceView> {
        let BillingParty {
            job_card,
            vehicle,
            customer,
        } = self.billing_party(invoice.job_card_id).await?;

        let items = job_card
            .items
            .iter()
            .map(|item| InvoiceLine {
                item_name: item.snapshot_name.clone(),
                item_price: item.snapshot_price,
                quantity: item.quantity,
                total_price: item.total_price,
            })
            .collect();

        Ok(InvoiceView {
            id: invoice.id,
            invoice_number: invoice.invoice_number,
            job_card_id: job_card.id,
            job_card_status: job_card.status,
            customer_id: customer.id,
            customer_name: customer.name,
            customer_email: customer.email,
            customer_phone: customer.mobile,
            vehicle_registration: vehicle.license_plate,
            vehicle_brand: vehicle.brand,
            vehicle_model: vehicle.model,
            base_amount: invoice.amounts.base_amount,
            labor_cost: invoice.amounts.labor_cost,
            tax_percentage: invoice.amounts.tax_percentage,
            tax_amount: invoice.amounts.tax_amount,
            total_amount: invoice.amounts.total_amount,
            payment_status: invoice.payment_status,
            external_order_id: invoice.external_order_id,
            external_payment_id: invoice.external_payment_id,
            payment_method: invoice.payment_method,
            paid_at: invoice.paid_at,
            items,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        })
    }

    async fn query(&self, filter: InvoiceFilter) -> Result<Vec<InvoiceView>> {
        let invoices = self.invoices.find(&filter).await?;
        let mut views = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            views.push(self.project(invoice).await?);
        }
        Ok(views)
    }

    async fn load(&self, id: InvoiceId) -> Result<Invoice> {
        self.invoices
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("invoice", id))
    }

    async fn job_card(&self, id: JobCardId) -> Result<JobCard> {
        self.job_cards
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("job card", id))
    }
}

fn by_status(status: PaymentStatus) -> InvoiceFilter {
    InvoiceFilter {
        payment_status: Some(status),
        ..Default::default()
    }
}
