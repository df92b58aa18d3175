#![allow(dead_code)]

use async_trait::async_trait;
use autoserve::application::appointments::{AppointmentView, AppointmentWorkflow};
use autoserve::application::authorization::Caller;
use autoserve::application::billing::{BillingEngine, InvoiceView};
use autoserve::application::job_cards::{JobCardView, JobCardWorkflow};
use autoserve::application::notifications::NotificationOutbox;
use autoserve::application::payments::{PaymentVerification, PaymentWorkflow};
use autoserve::application::validation::{
    CreateAppointment, CreateJobCard, PartRequest, VerifyPayment,
};
use autoserve::config::AppConfig;
use autoserve::domain::directory::{InventoryPart, Role, User, UserId, Vehicle, VehicleId};
use autoserve::domain::money::Money;
use autoserve::domain::ports::{
    ClockRef, DirectoryStore, InventoryStore, Notification, Notifier, PaymentProviderRef,
};
use autoserve::error::Result;
use autoserve::infrastructure::clock::FixedClock;
use autoserve::infrastructure::in_memory::InMemoryStore;
use autoserve::infrastructure::media::InMemoryImageStore;
use autoserve::infrastructure::sandbox::SandboxPaymentProvider;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SECRET: &str = "test_secret";

pub const ASHA: UserId = 1;
pub const VIKRAM: UserId = 2;
pub const MANAGER: UserId = 20;
pub const MECHANIC: UserId = 30;
pub const OTHER_MECHANIC: UserId = 31;
pub const ADMIN: UserId = 99;

pub const ASHA_CAR: VehicleId = 100;
pub const VIKRAM_CAR: VehicleId = 200;
pub const SOLD_CAR: VehicleId = 300;

pub const BRAKE_PAD: u64 = 1;
pub const OIL_FILTER: u64 = 2;

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn caller(id: UserId) -> Caller {
    let role = match id {
        ASHA | VIKRAM => Role::Customer,
        MANAGER => Role::Manager,
        MECHANIC | OTHER_MECHANIC => Role::Mechanic,
        _ => Role::Admin,
    };
    Caller::new(id, role)
}

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub received: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.received.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// All workflows wired over one in-memory store and a fixed clock.
pub struct Harness {
    pub store: InMemoryStore,
    pub clock: Arc<FixedClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub provider: Arc<SandboxPaymentProvider>,
    pub images: Arc<InMemoryImageStore>,
    pub appointments: AppointmentWorkflow,
    pub job_cards: JobCardWorkflow,
    pub billing: Arc<BillingEngine>,
    pub payments: PaymentWorkflow,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let provider = Arc::new(SandboxPaymentProvider::new(config.payment.key_secret.clone()));
        Self::with_provider(config, provider.clone(), provider).await
    }

    /// Wires the payment workflow to `gateway` while keeping the sandbox
    /// around for signing checkouts.
    pub async fn with_provider(
        config: AppConfig,
        provider: Arc<SandboxPaymentProvider>,
        gateway: PaymentProviderRef,
    ) -> Self {
        let store = InMemoryStore::new();
        seed(&store).await;
        let shared = Arc::new(store.clone());
        let clock = Arc::new(FixedClock::new(now()));
        let clock_ref: ClockRef = clock.clone();
        let notifier = Arc::new(RecordingNotifier::default());
        let images = Arc::new(InMemoryImageStore::new());
        let (outbox, _worker) = NotificationOutbox::start(notifier.clone());

        let billing = Arc::new(BillingEngine::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            shared.clone(),
            clock_ref.clone(),
            config.billing.clone(),
        ));
        Self {
            appointments: AppointmentWorkflow::new(
                shared.clone(),
                shared.clone(),
                images.clone(),
                outbox,
                clock_ref.clone(),
                config.appointments.clone(),
            ),
            job_cards: JobCardWorkflow::new(
                shared.clone(),
                shared.clone(),
                shared.clone(),
                shared.clone(),
                images.clone(),
                clock_ref.clone(),
            ),
            payments: PaymentWorkflow::new(
                shared,
                billing.clone(),
                gateway,
                clock_ref,
                config.payment.clone(),
            ),
            billing,
            store,
            clock,
            notifier,
            provider,
            images,
        }
    }

    /// Waits for the outbox to deliver at least `count` notifications.
    pub async fn notifications(&self, count: usize) -> Vec<Notification> {
        for _ in 0..200 {
            {
                let received = self.notifier.received.lock().unwrap();
                if received.len() >= count {
                    return received.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.notifier.received.lock().unwrap().clone()
    }

    pub async fn create_appointment(&self, customer: UserId, vehicle: VehicleId) -> AppointmentView {
        self.appointments
            .create_appointment(
                &caller(customer),
                CreateAppointment {
                    vehicle_id: Some(vehicle),
                    request_date: Some(date(2026, 3, 10)),
                    description: "Brakes squeal when stopping".to_string(),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap()
    }

    pub async fn approved_appointment(&self, customer: UserId, vehicle: VehicleId) -> AppointmentView {
        let appointment = self.create_appointment(customer, vehicle).await;
        self.appointments
            .approve_appointment(appointment.id)
            .await
            .unwrap()
    }

    pub async fn job_card(&self, customer: UserId, vehicle: VehicleId, labor: Decimal, parts: &[(u64, u32)]) -> JobCardView {
        let appointment = self.approved_appointment(customer, vehicle).await;
        self.job_cards
            .create_job_card(CreateJobCard {
                appointment_id: Some(appointment.id),
                manager_id: Some(MANAGER),
                mechanic_id: Some(MECHANIC),
                labor_cost: Some(labor),
                parts: parts
                    .iter()
                    .map(|&(inventory_id, quantity)| PartRequest {
                        inventory_id,
                        quantity,
                    })
                    .collect(),
                estimated_completion_date: Some(date(2026, 3, 12)),
            })
            .await
            .unwrap()
    }

    pub async fn completed_job_card(&self, customer: UserId, vehicle: VehicleId, labor: Decimal, parts: &[(u64, u32)]) -> JobCardView {
        let job_card = self.job_card(customer, vehicle, labor, parts).await;
        self.job_cards
            .start_work(&caller(MECHANIC), job_card.id)
            .await
            .unwrap();
        self.job_cards.complete_work(job_card.id).await.unwrap()
    }

    /// Creates a payment order and settles it through a signed checkout.
    pub async fn pay(&self, invoice_id: u64) -> PaymentVerification {
        let order = self.payments.create_payment_order(invoice_id).await.unwrap();
        let checkout = self.provider.checkout(&order.order_id).unwrap();
        let verification = self
            .payments
            .verify_payment(
                invoice_id,
                VerifyPayment {
                    external_order_id: Some(order.order_id),
                    external_payment_id: Some(checkout.payment_id),
                    signature: Some(checkout.signature),
                    payment_method: Some("upi".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(verification.verified, "{}", verification.message);
        verification
    }

    /// One brake pad line of 2 x 100 and 50 labour.
    pub async fn invoice(&self) -> InvoiceView {
        let job_card = self
            .completed_job_card(ASHA, ASHA_CAR, dec!(50), &[(BRAKE_PAD, 2)])
            .await;
        self.billing.generate_invoice(job_card.id).await.unwrap()
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.payment.key_id = "rzp_test_key".to_string();
    config.payment.key_secret = Some(SECRET.to_string());
    config.payment.allow_simulated_payments = true;
    config
}

async fn seed(store: &InMemoryStore) {
    for (id, name, role, mobile) in [
        (ASHA, "Asha Rao", Role::Customer, Some("9800000001")),
        (VIKRAM, "Vikram Shah", Role::Customer, None),
        (MANAGER, "Meera Iyer", Role::Manager, None),
        (MECHANIC, "Ravi Kumar", Role::Mechanic, None),
        (OTHER_MECHANIC, "Sunil Das", Role::Mechanic, None),
        (ADMIN, "Root", Role::Admin, None),
    ] {
        store
            .store_user(User {
                id,
                name: name.to_string(),
                email: format!("user{id}@example.com"),
                mobile: mobile.map(str::to_string),
                role,
            })
            .await
            .unwrap();
    }
    for (id, customer_id, plate, active) in [
        (ASHA_CAR, ASHA, "KA01AB1234", true),
        (VIKRAM_CAR, VIKRAM, "MH12XY9876", true),
        (SOLD_CAR, ASHA, "DL3CAB0001", false),
    ] {
        store
            .store_vehicle(Vehicle {
                id,
                customer_id,
                license_plate: plate.to_string(),
                brand: "Maruti".to_string(),
                model: "Swift".to_string(),
                color: Some("Red".to_string()),
                active,
            })
            .await
            .unwrap();
    }
    for (id, name, price) in [(BRAKE_PAD, "Brake pad", dec!(100)), (OIL_FILTER, "Oil filter", dec!(25.50))] {
        store
            .store_part(InventoryPart {
                id,
                name: name.to_string(),
                price: Money::new(price),
            })
            .await
            .unwrap();
    }
}
