//! Traits the workflows need from the outside world.
//!
//! Stores enforce the two uniqueness rules the workflows rely on: one job
//! card per appointment and one invoice per job card. A conflicting insert
//! fails with `ServiceError::DuplicateResource`.

use super::appointment::{Appointment, AppointmentId, AppointmentStatus};
use super::directory::{InventoryId, InventoryPart, User, UserId, Vehicle, VehicleId};
use super::invoice::{Invoice, InvoiceId, PaymentStatus};
use super::job_card::{JobCard, JobCardId, JobCardStatus};
use super::money::Money;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub customer_id: Option<UserId>,
    pub vehicle_id: Option<VehicleId>,
    pub manager_id: Option<UserId>,
    pub mechanic_id: Option<UserId>,
    pub status: Option<AppointmentStatus>,
    pub rsa: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobCardFilter {
    pub customer_id: Option<UserId>,
    pub manager_id: Option<UserId>,
    pub mechanic_id: Option<UserId>,
    pub status: Option<JobCardStatus>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvoiceFilter {
    pub customer_id: Option<UserId>,
    pub manager_id: Option<UserId>,
    pub payment_status: Option<PaymentStatus>,
}

#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn store_user(&self, user: User) -> Result<()>;
    async fn user(&self, id: UserId) -> Result<Option<User>>;
    async fn store_vehicle(&self, vehicle: Vehicle) -> Result<()>;
    async fn vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>>;
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn store_part(&self, part: InventoryPart) -> Result<()>;
    async fn part(&self, id: InventoryId) -> Result<Option<InventoryPart>>;
    async fn update_price(&self, id: InventoryId, price: Money) -> Result<InventoryPart>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Persists a new appointment under a fresh id, ignoring `appointment.id`.
    async fn insert(&self, appointment: Appointment) -> Result<Appointment>;
    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>>;
    async fn save(&self, appointment: Appointment) -> Result<Appointment>;
    /// Matching appointments, oldest first.
    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>>;
    async fn count(&self, filter: &AppointmentFilter) -> Result<u64>;
}

#[async_trait]
pub trait JobCardStore: Send + Sync {
    /// Persists a new job card under a fresh id. Fails with
    /// `DuplicateResource` when the appointment already has one.
    async fn insert(&self, job_card: JobCard) -> Result<JobCard>;
    async fn get(&self, id: JobCardId) -> Result<Option<JobCard>>;
    async fn save(&self, job_card: JobCard) -> Result<JobCard>;
    async fn find_by_appointment(&self, appointment_id: AppointmentId) -> Result<Option<JobCard>>;
    /// Matching job cards, newest first.
    async fn find(&self, filter: &JobCardFilter) -> Result<Vec<JobCard>>;
    async fn count(&self, filter: &JobCardFilter) -> Result<u64>;
    /// Job cards of `manager_id` whose licence plate or customer name
    /// contains `keyword`, ignoring case.
    async fn search(&self, keyword: &str, manager_id: UserId) -> Result<Vec<JobCard>>;
    /// Sum of `snapshot_price * quantity` over completed job cards.
    async fn parts_revenue(&self, manager_id: Option<UserId>) -> Result<Money>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Persists a new invoice under a fresh id. Fails with
    /// `DuplicateResource` when the job card already has an invoice or the
    /// invoice number is taken.
    async fn insert(&self, invoice: Invoice) -> Result<Invoice>;
    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>>;
    async fn save(&self, invoice: Invoice) -> Result<Invoice>;
    async fn find_by_job_card(&self, job_card_id: JobCardId) -> Result<Option<Invoice>>;
    async fn find_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>>;
    async fn find(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>>;
    async fn count(&self, filter: &InvoiceFilter) -> Result<u64>;
    /// Sum of `total_amount`; zero when nothing matches.
    async fn sum_total(&self, filter: &InvoiceFilter) -> Result<Money>;
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    AppointmentCreated,
    AppointmentCancelled,
    AppointmentApproved,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: UserId,
    pub context: BTreeMap<String, String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Uploads the image and returns the URL it is served from.
    async fn upload(&self, bytes: &[u8]) -> Result<String>;
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct OrderRequest {
    pub amount_minor_units: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ProviderOrder {
    pub order_id: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(&self, request: &OrderRequest) -> Result<ProviderOrder>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    fn current_year(&self) -> i32 {
        self.now().year()
    }
}

pub type DirectoryStoreRef = Arc<dyn DirectoryStore>;
pub type InventoryStoreRef = Arc<dyn InventoryStore>;
pub type AppointmentStoreRef = Arc<dyn AppointmentStore>;
pub type JobCardStoreRef = Arc<dyn JobCardStore>;
pub type InvoiceStoreRef = Arc<dyn InvoiceStore>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type ImageStoreRef = Arc<dyn ImageStore>;
pub type PaymentProviderRef = Arc<dyn PaymentProvider>;
pub type ClockRef = Arc<dyn Clock>;
