use crate::domain::appointment::{Appointment, AppointmentId};
use crate::domain::directory::{InventoryId, InventoryPart, User, UserId, Vehicle, VehicleId};
use crate::domain::invoice::{Invoice, InvoiceId};
use crate::domain::job_card::{JobCard, JobCardId, JobCardStatus};
use crate::domain::money::Money;
use crate::domain::ports::{
    AppointmentFilter, AppointmentStore, DirectoryStore, InventoryStore, InvoiceFilter,
    InvoiceStore, JobCardFilter, JobCardStore,
};
use crate::error::{Result, ServiceError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    vehicles: HashMap<VehicleId, Vehicle>,
    parts: HashMap<InventoryId, InventoryPart>,
    appointments: HashMap<AppointmentId, Appointment>,
    job_cards: HashMap<JobCardId, JobCard>,
    invoices: HashMap<InvoiceId, Invoice>,
    last_appointment_id: AppointmentId,
    last_job_card_id: JobCardId,
    last_invoice_id: InvoiceId,
}

impl Tables {
    fn customer_of_appointment(&self, appointment_id: AppointmentId) -> Option<&User> {
        let appointment = self.appointments.get(&appointment_id)?;
        let vehicle = self.vehicles.get(&appointment.vehicle_id)?;
        self.users.get(&vehicle.customer_id)
    }

    fn appointment_matches(&self, appointment: &Appointment, filter: &AppointmentFilter) -> bool {
        if filter.vehicle_id.is_some_and(|id| id != appointment.vehicle_id)
            || filter.status.is_some_and(|s| s != appointment.status)
            || filter.rsa.is_some_and(|rsa| rsa != appointment.rsa)
            || filter.manager_id.is_some_and(|id| Some(id) != appointment.manager_id)
            || filter.mechanic_id.is_some_and(|id| Some(id) != appointment.mechanic_id)
        {
            return false;
        }
        match filter.customer_id {
            Some(customer_id) => self
                .vehicles
                .get(&appointment.vehicle_id)
                .is_some_and(|v| v.customer_id == customer_id),
            None => true,
        }
    }

    fn job_card_matches(&self, job_card: &JobCard, filter: &JobCardFilter) -> bool {
        if filter.manager_id.is_some_and(|id| id != job_card.manager_id)
            || filter.mechanic_id.is_some_and(|id| Some(id) != job_card.mechanic_id)
            || filter.status.is_some_and(|s| s != job_card.status)
        {
            return false;
        }
        match filter.customer_id {
            Some(customer_id) => self
                .customer_of_appointment(job_card.appointment_id)
                .is_some_and(|c| c.id == customer_id),
            None => true,
        }
    }

    fn invoice_matches(&self, invoice: &Invoice, filter: &InvoiceFilter) -> bool {
        if filter.payment_status.is_some_and(|s| s != invoice.payment_status) {
            return false;
        }
        if filter.manager_id.is_none() && filter.customer_id.is_none() {
            return true;
        }
        let Some(job_card) = self.job_cards.get(&invoice.job_card_id) else {
            return false;
        };
        let scope = JobCardFilter {
            customer_id: filter.customer_id,
            manager_id: filter.manager_id,
            ..Default::default()
        };
        self.job_card_matches(job_card, &scope)
    }

    fn matching_invoices<'a>(
        &'a self,
        filter: &'a InvoiceFilter,
    ) -> impl Iterator<Item = &'a Invoice> + 'a {
        self.invoices
            .values()
            .filter(move |invoice| self.invoice_matches(invoice, filter))
    }
}

/// A thread-safe in-memory implementation of every store port.
///
/// All tables live behind a single `RwLock` so joins across them (customer
/// filters, keyword search) see a consistent snapshot. Cloning shares the
/// underlying tables.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn store_user(&self, user: User) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.users.insert(user.id, user);
        Ok(())
    }

    async fn user(&self, id: UserId) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn store_vehicle(&self, vehicle: Vehicle) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.vehicles.insert(vehicle.id, vehicle);
        Ok(())
    }

    async fn vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>> {
        let tables = self.tables.read().await;
        Ok(tables.vehicles.get(&id).cloned())
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn store_part(&self, part: InventoryPart) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.parts.insert(part.id, part);
        Ok(())
    }

    async fn part(&self, id: InventoryId) -> Result<Option<InventoryPart>> {
        let tables = self.tables.read().await;
        Ok(tables.parts.get(&id).cloned())
    }

    async fn update_price(&self, id: InventoryId, price: Money) -> Result<InventoryPart> {
        let mut tables = self.tables.write().await;
        let part = tables
            .parts
            .get_mut(&id)
            .ok_or_else(|| ServiceError::not_found("inventory part", id))?;
        part.price = price;
        Ok(part.clone())
    }
}

#[async_trait]
impl AppointmentStore for InMemoryStore {
    async fn insert(&self, mut appointment: Appointment) -> Result<Appointment> {
        let mut tables = self.tables.write().await;
        tables.last_appointment_id += 1;
        appointment.id = tables.last_appointment_id;
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get(&self, id: AppointmentId) -> Result<Option<Appointment>> {
        let tables = self.tables.read().await;
        Ok(tables.appointments.get(&id).cloned())
    }

    async fn save(&self, appointment: Appointment) -> Result<Appointment> {
        let mut tables = self.tables.write().await;
        if !tables.appointments.contains_key(&appointment.id) {
            return Err(ServiceError::not_found("appointment", appointment.id));
        }
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| tables.appointment_matches(a, filter))
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.created_at, a.id));
        Ok(found)
    }

    async fn count(&self, filter: &AppointmentFilter) -> Result<u64> {
        let tables = self.tables.read().await;
        let count = tables
            .appointments
            .values()
            .filter(|a| tables.appointment_matches(a, filter))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl JobCardStore for InMemoryStore {
    async fn insert(&self, mut job_card: JobCard) -> Result<JobCard> {
        let mut tables = self.tables.write().await;
        if tables
            .job_cards
            .values()
            .any(|existing| existing.appointment_id == job_card.appointment_id)
        {
            return Err(ServiceError::DuplicateResource(format!(
                "job card already exists for appointment {}",
                job_card.appointment_id
            )));
        }
        tables.last_job_card_id += 1;
        job_card.id = tables.last_job_card_id;
        tables.job_cards.insert(job_card.id, job_card.clone());
        Ok(job_card)
    }

    async fn get(&self, id: JobCardId) -> Result<Option<JobCard>> {
        let tables = self.tables.read().await;
        Ok(tables.job_cards.get(&id).cloned())
    }

    async fn save(&self, job_card: JobCard) -> Result<JobCard> {
        let mut tables = self.tables.write().await;
        if !tables.job_cards.contains_key(&job_card.id) {
            return Err(ServiceError::not_found("job card", job_card.id));
        }
        tables.job_cards.insert(job_card.id, job_card.clone());
        Ok(job_card)
    }

    async fn find_by_appointment(&self, appointment_id: AppointmentId) -> Result<Option<JobCard>> {
        let tables = self.tables.read().await;
        Ok(tables
            .job_cards
            .values()
            .find(|j| j.appointment_id == appointment_id)
            .cloned())
    }

    async fn find(&self, filter: &JobCardFilter) -> Result<Vec<JobCard>> {
        let tables = self.tables.read().await;
        let mut found: Vec<JobCard> = tables
            .job_cards
            .values()
            .filter(|j| tables.job_card_matches(j, filter))
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(found)
    }

    async fn count(&self, filter: &JobCardFilter) -> Result<u64> {
        let tables = self.tables.read().await;
        let count = tables
            .job_cards
            .values()
            .filter(|j| tables.job_card_matches(j, filter))
            .count();
        Ok(count as u64)
    }

    async fn search(&self, keyword: &str, manager_id: UserId) -> Result<Vec<JobCard>> {
        let needle = keyword.to_lowercase();
        let tables = self.tables.read().await;
        let mut found: Vec<JobCard> = tables
            .job_cards
            .values()
            .filter(|j| j.manager_id == manager_id)
            .filter(|j| {
                let Some(appointment) = tables.appointments.get(&j.appointment_id) else {
                    return false;
                };
                let Some(vehicle) = tables.vehicles.get(&appointment.vehicle_id) else {
                    return false;
                };
                let plate_hit = vehicle.license_plate.to_lowercase().contains(&needle);
                let name_hit = tables
                    .users
                    .get(&vehicle.customer_id)
                    .is_some_and(|c| c.name.to_lowercase().contains(&needle));
                plate_hit || name_hit
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(found)
    }

    async fn parts_revenue(&self, manager_id: Option<UserId>) -> Result<Money> {
        let tables = self.tables.read().await;
        Ok(tables
            .job_cards
            .values()
            .filter(|j| j.status == JobCardStatus::Completed)
            .filter(|j| manager_id.is_none_or(|id| id == j.manager_id))
            .flat_map(|j| j.items.iter())
            .map(|item| item.snapshot_price * item.quantity)
            .sum())
    }
}

#[async_trait]
impl InvoiceStore for InMemoryStore {
    async fn insert(&self, mut invoice: Invoice) -> Result<Invoice> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.invoices.values().find(|existing| {
            existing.job_card_id == invoice.job_card_id
                || existing.invoice_number == invoice.invoice_number
        }) {
            return Err(ServiceError::DuplicateResource(format!(
                "invoice {} conflicts with job card {} or number {}",
                existing.invoice_number, invoice.job_card_id, invoice.invoice_number
            )));
        }
        tables.last_invoice_id += 1;
        invoice.id = tables.last_invoice_id;
        tables.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let tables = self.tables.read().await;
        Ok(tables.invoices.get(&id).cloned())
    }

    async fn save(&self, invoice: Invoice) -> Result<Invoice> {
        let mut tables = self.tables.write().await;
        if !tables.invoices.contains_key(&invoice.id) {
            return Err(ServiceError::not_found("invoice", invoice.id));
        }
        tables.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn find_by_job_card(&self, job_card_id: JobCardId) -> Result<Option<Invoice>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .values()
            .find(|i| i.job_card_id == job_card_id)
            .cloned())
    }

    async fn find_by_number(&self, invoice_number: &str) -> Result<Option<Invoice>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .values()
            .find(|i| i.invoice_number == invoice_number)
            .cloned())
    }

    async fn find(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        let tables = self.tables.read().await;
        let mut found: Vec<Invoice> = tables.matching_invoices(filter).cloned().collect();
        found.sort_by_key(|i| i.id);
        Ok(found)
    }

    async fn count(&self, filter: &InvoiceFilter) -> Result<u64> {
        let tables = self.tables.read().await;
        Ok(tables.matching_invoices(filter).count() as u64)
    }

    async fn sum_total(&self, filter: &InvoiceFilter) -> Result<Money> {
        let tables = self.tables.read().await;
        Ok(tables
            .matching_invoices(filter)
            .map(|i| i.amounts.total_amount)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::appointment::AppointmentStatus;
    use crate::domain::directory::Role;
    use crate::domain::invoice::{InvoiceAmounts, PaymentStatus, invoice_number};
    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn appointment(vehicle_id: VehicleId, created_at: DateTime<Utc>) -> Appointment {
        Appointment {
            id: 0,
            vehicle_id,
            request_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            problem_description: "Brakes squeal".to_string(),
            customer_photo_url: None,
            vehicle_image_url: None,
            rsa: false,
            rsa_coordinates: None,
            status: AppointmentStatus::Approved,
            rejection_reason: None,
            manager_id: None,
            mechanic_id: None,
            created_at,
            updated_at: created_at,
        }
    }

    fn part(id: InventoryId, price: rust_decimal::Decimal) -> InventoryPart {
        InventoryPart {
            id,
            name: format!("part-{id}"),
            price: Money::new(price),
        }
    }

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        for (id, name, role) in [
            (1, "Asha Rao", Role::Customer),
            (2, "Vikram Shah", Role::Customer),
            (10, "Meera", Role::Manager),
        ] {
            store
                .store_user(User {
                    id,
                    name: name.to_string(),
                    email: format!("{id}@example.com"),
                    mobile: None,
                    role,
                })
                .await
                .unwrap();
        }
        for (id, customer_id, plate) in [(100, 1, "KA01AB1234"), (200, 2, "MH12XY9876")] {
            store
                .store_vehicle(Vehicle {
                    id,
                    customer_id,
                    license_plate: plate.to_string(),
                    brand: "Maruti".to_string(),
                    model: "Swift".to_string(),
                    color: None,
                    active: true,
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_appointment_ids_and_customer_filter() {
        let store = seeded().await;
        let first = AppointmentStore::insert(&store, appointment(100, now())).await.unwrap();
        let second = AppointmentStore::insert(&store, appointment(200, now() + Duration::minutes(1)))
            .await
            .unwrap();
        assert_eq!((first.id, second.id), (1, 2));

        let filter = AppointmentFilter {
            customer_id: Some(2),
            ..Default::default()
        };
        let found = AppointmentStore::find(&store, &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].vehicle_id, 200);
        assert_eq!(AppointmentStore::count(&store, &AppointmentFilter::default()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_one_job_card_per_appointment() {
        let store = seeded().await;
        let appt = AppointmentStore::insert(&store, appointment(100, now())).await.unwrap();
        let card = JobCard::new(appt.id, 10, None, Money::ZERO, None, now());
        JobCardStore::insert(&store, card.clone()).await.unwrap();

        let second = JobCardStore::insert(&store, card).await;
        assert!(matches!(second, Err(ServiceError::DuplicateResource(_))));
    }

    #[tokio::test]
    async fn test_search_matches_plate_or_customer_name() {
        let store = seeded().await;
        for vehicle_id in [100, 200] {
            let appt = AppointmentStore::insert(&store, appointment(vehicle_id, now()))
                .await
                .unwrap();
            JobCardStore::insert(&store, JobCard::new(appt.id, 10, None, Money::ZERO, None, now()))
                .await
                .unwrap();
        }

        let by_plate = store.search("ka01", 10).await.unwrap();
        assert_eq!(by_plate.len(), 1);
        let by_name = store.search("VIKRAM", 10).await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert!(store.search("ka01", 11).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parts_revenue_counts_completed_only() {
        let store = seeded().await;
        for (vehicle_id, complete) in [(100, true), (200, false)] {
            let appt = AppointmentStore::insert(&store, appointment(vehicle_id, now()))
                .await
                .unwrap();
            let mut card = JobCard::new(appt.id, 10, None, Money::new(dec!(500)), None, now());
            card.add_item(&part(1, dec!(100)), 2, now()).unwrap();
            if complete {
                card.start(now()).unwrap();
                card.complete(now()).unwrap();
            }
            JobCardStore::insert(&store, card).await.unwrap();
        }

        assert_eq!(store.parts_revenue(None).await.unwrap(), Money::new(dec!(200)));
        assert_eq!(store.parts_revenue(Some(10)).await.unwrap(), Money::new(dec!(200)));
        assert_eq!(store.parts_revenue(Some(11)).await.unwrap(), Money::ZERO);
    }

    #[tokio::test]
    async fn test_invoice_uniqueness_and_sums() {
        let store = seeded().await;
        let appt = AppointmentStore::insert(&store, appointment(100, now())).await.unwrap();
        let card = JobCardStore::insert(&store, JobCard::new(appt.id, 10, None, Money::ZERO, None, now()))
            .await
            .unwrap();
        let amounts = InvoiceAmounts::compute(Money::new(dec!(200)), Money::new(dec!(50)), dec!(18));

        let invoice = InvoiceStore::insert(
            &store,
            Invoice::new(invoice_number(2026, 1), card.id, amounts, now()),
        )
        .await
        .unwrap();
        let clash = InvoiceStore::insert(
            &store,
            Invoice::new(invoice_number(2026, 2), card.id, amounts, now()),
        )
        .await;
        assert!(matches!(clash, Err(ServiceError::DuplicateResource(_))));

        let pending = InvoiceFilter {
            payment_status: Some(PaymentStatus::Pending),
            ..Default::default()
        };
        assert_eq!(store.sum_total(&pending).await.unwrap(), Money::new(dec!(295)));
        let customer = InvoiceFilter {
            customer_id: Some(2),
            ..Default::default()
        };
        assert_eq!(InvoiceStore::count(&store, &customer).await.unwrap(), 0);
        assert_eq!(
            store.find_by_number(&invoice.invoice_number).await.unwrap(),
            Some(invoice)
        );
    }

    #[tokio::test]
    async fn test_update_price_leaves_snapshots_alone() {
        let store = seeded().await;
        store.store_part(part(1, dec!(100))).await.unwrap();
        let appt = AppointmentStore::insert(&store, appointment(100, now())).await.unwrap();
        let mut card = JobCard::new(appt.id, 10, None, Money::ZERO, None, now());
        card.add_item(&store.part(1).await.unwrap().unwrap(), 1, now())
            .unwrap();
        let card = JobCardStore::insert(&store, card).await.unwrap();

        let updated = store.update_price(1, Money::new(dec!(150))).await.unwrap();
        assert_eq!(updated.price, Money::new(dec!(150)));
        let stored = JobCardStore::get(&store, card.id).await.unwrap().unwrap();
        assert_eq!(stored.items[0].snapshot_price, Money::new(dec!(100)));

        assert!(matches!(
            store.update_price(9, Money::ZERO).await,
            Err(ServiceError::NotFound(_))
        ));
    }
}
