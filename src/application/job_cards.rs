use super::authorization::{Caller, is_assigned_mechanic, require_user_role};
use super::validation::CreateJobCard;
use crate::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use crate::domain::directory::{InventoryId, InventoryPart, Role, User, UserId};
use crate::domain::job_card::{
    EvidenceId, JobCard, JobCardEvidence, JobCardId, JobCardItem, JobCardItemId, JobCardStatus,
};
use crate::domain::money::Money;
use crate::domain::ports::{
    AppointmentStoreRef, ClockRef, DirectoryStoreRef, ImageStoreRef, InventoryStoreRef,
    JobCardFilter, JobCardStoreRef,
};
use crate::error::{Result, ServiceError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::info;

const RECENT_JOB_CARDS: usize = 5;

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct JobCardView {
    pub id: JobCardId,
    pub appointment_id: AppointmentId,
    pub problem_description: String,
    pub license_plate: String,
    pub customer_id: UserId,
    pub customer_name: String,
    pub manager_id: UserId,
    pub manager_name: Option<String>,
    pub mechanic_id: Option<UserId>,
    pub mechanic_name: Option<String>,
    pub status: JobCardStatus,
    pub labor_cost: Money,
    pub parts_total: Money,
    pub items: Vec<JobCardItem>,
    pub evidence: Vec<JobCardEvidence>,
    pub estimated_completion_date: Option<NaiveDate>,
    pub rating: Option<u8>,
    pub feedback: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ManagerDashboard {
    pub total_job_cards: u64,
    pub in_progress_job_cards: u64,
    pub completed_job_cards: u64,
    pub recent_job_cards: Vec<JobCardView>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct MechanicDashboard {
    pub total_job_cards: u64,
    pub assigned_job_cards: Vec<JobCardView>,
    pub in_progress_job_cards: Vec<JobCardView>,
    pub completed_job_cards: u64,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct MechanicWorkload {
    pub mechanic_id: UserId,
    pub mechanic_name: String,
    pub active_jobs: u64,
    pub total_jobs: u64,
}

/// Where a piece of evidence comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum EvidenceSource {
    Url(String),
    Upload(Vec<u8>),
}

/// Work orders for approved appointments: staffing, parts, execution.
pub struct JobCardWorkflow {
    job_cards: JobCardStoreRef,
    appointments: AppointmentStoreRef,
    directory: DirectoryStoreRef,
    inventory: InventoryStoreRef,
    images: ImageStoreRef,
    clock: ClockRef,
    write_lock: Mutex<()>,
}

impl JobCardWorkflow {
    pub fn new(
        job_cards: JobCardStoreRef,
        appointments: AppointmentStoreRef,
        directory: DirectoryStoreRef,
        inventory: InventoryStoreRef,
        images: ImageStoreRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            job_cards,
            appointments,
            directory,
            inventory,
            images,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Opens a job card for an approved appointment.
    ///
    /// A second job card for the same appointment is refused with
    /// `DuplicateResource`; the request's parts and labour would otherwise be
    /// silently discarded.
    pub async fn create_job_card(&self, request: CreateJobCard) -> Result<JobCardView> {
        request.validate().into_result()?;
        let (Some(appointment_id), Some(manager_id), Some(labor_cost)) =
            (request.appointment_id, request.manager_id, request.labor_cost)
        else {
            return Err(ServiceError::invalid_field("job_card", "required fields missing"));
        };

        let _guard = self.write_lock.lock().await;
        let appointment = self.appointment(appointment_id).await?;
        if appointment.status != AppointmentStatus::Approved {
            return Err(ServiceError::InvalidOperation(format!(
                "job cards can only be created for approved appointments, appointment {appointment_id} is {}",
                appointment.status
            )));
        }
        if self.job_cards.find_by_appointment(appointment_id).await?.is_some() {
            return Err(ServiceError::DuplicateResource(format!(
                "job card already exists for appointment {appointment_id}"
            )));
        }

        let manager = self.user(manager_id, "manager").await?;
        require_user_role(&manager, Role::Manager)?;
        if let Some(mechanic_id) = request.mechanic_id {
            let mechanic = self.user(mechanic_id, "mechanic").await?;
            require_user_role(&mechanic, Role::Mechanic)?;
        }

        let now = self.clock.now();
        let mut job_card = JobCard::new(
            appointment_id,
            manager_id,
            request.mechanic_id,
            Money::non_negative("labor_cost", labor_cost)?,
            request.estimated_completion_date,
            now,
        );
        for part_request in &request.parts {
            let part = self.part(part_request.inventory_id).await?;
            job_card.add_item(&part, part_request.quantity, now)?;
        }

        let saved = self.job_cards.insert(job_card).await?;
        info!(
            job_card_id = saved.id,
            appointment_id,
            items = saved.items.len(),
            "job card created"
        );
        self.project(saved).await
    }

    /// Reassigns the mechanic on a card that is not yet completed or cancelled.
    pub async fn update_mechanic(&self, id: JobCardId, mechanic_id: UserId) -> Result<JobCardView> {
        let _guard = self.write_lock.lock().await;
        let mut job_card = self.load(id).await?;
        let mechanic = self.user(mechanic_id, "mechanic").await?;
        require_user_role(&mechanic, Role::Mechanic)?;

        job_card.assign_mechanic(mechanic_id, self.clock.now())?;
        let saved = self.job_cards.save(job_card).await?;
        info!(job_card_id = id, mechanic_id, "mechanic assigned to job card");
        self.project(saved).await
    }

    /// Only the assigned mechanic may start work.
    pub async fn start_work(&self, caller: &Caller, id: JobCardId) -> Result<JobCardView> {
        let _guard = self.write_lock.lock().await;
        let mut job_card = self.load(id).await?;
        if !is_assigned_mechanic(&job_card, caller) {
            return Err(ServiceError::Forbidden(format!(
                "user {} is not the mechanic assigned to job card {id}",
                caller.user_id
            )));
        }
        job_card.start(self.clock.now())?;

        let saved = self.job_cards.save(job_card).await?;
        info!(job_card_id = id, "work started");
        self.project(saved).await
    }

    /// Marks IN_PROGRESS work as done, making the card billable.
    pub async fn complete_work(&self, id: JobCardId) -> Result<JobCardView> {
        let _guard = self.write_lock.lock().await;
        let mut job_card = self.load(id).await?;
        job_card.complete(self.clock.now())?;

        let saved = self.job_cards.save(job_card).await?;
        info!(job_card_id = id, "work completed");
        self.project(saved).await
    }

    /// Cancels a card that is neither completed nor cancelled. A reason is
    /// required.
    pub async fn cancel_job_card(&self, id: JobCardId, reason: &str) -> Result<JobCardView> {
        let _guard = self.write_lock.lock().await;
        let mut job_card = self.load(id).await?;
        job_card.cancel(reason, self.clock.now())?;

        let saved = self.job_cards.save(job_card).await?;
        info!(job_card_id = id, reason = reason.trim(), "job card cancelled");
        self.project(saved).await
    }

    /// Adds a part line priced at the catalogue price of this moment.
    pub async fn add_item(
        &self,
        id: JobCardId,
        inventory_id: InventoryId,
        quantity: u32,
    ) -> Result<JobCardView> {
        let _guard = self.write_lock.lock().await;
        let mut job_card = self.load(id).await?;
        let part = self.part(inventory_id).await?;
        let item_id = job_card.add_item(&part, quantity, self.clock.now())?.id;

        let saved = self.job_cards.save(job_card).await?;
        info!(job_card_id = id, item_id, inventory_id, quantity, "item added");
        self.project(saved).await
    }

    /// Deletes one part line; the other lines keep their snapshot prices.
    pub async fn remove_item(&self, id: JobCardId, item_id: JobCardItemId) -> Result<JobCardView> {
        let _guard = self.write_lock.lock().await;
        let mut job_card = self.load(id).await?;
        job_card.remove_item(item_id, self.clock.now())?;

        let saved = self.job_cards.save(job_card).await?;
        info!(job_card_id = id, item_id, "item removed");
        self.project(saved).await
    }

    pub async fn items(&self, id: JobCardId) -> Result<Vec<JobCardItem>> {
        Ok(self.load(id).await?.items)
    }

    /// Attaches a photo or document to the card, uploading raw bytes first.
    ///
    /// The card is checked before anything is uploaded; the status is checked
    /// again under the write lock when the evidence is saved.
    pub async fn add_evidence(
        &self,
        id: JobCardId,
        source: EvidenceSource,
        caption: Option<String>,
    ) -> Result<JobCardEvidence> {
        self.load(id).await?.require_accepts_evidence()?;
        let url = match source {
            EvidenceSource::Url(url) => url,
            EvidenceSource::Upload(bytes) => self.images.upload(&bytes).await?,
        };

        let _guard = self.write_lock.lock().await;
        let mut job_card = self.load(id).await?;
        let evidence = job_card.add_evidence(url, caption, self.clock.now())?.clone();
        self.job_cards.save(job_card).await?;
        info!(job_card_id = id, evidence_id = evidence.id, "evidence added");
        Ok(evidence)
    }

    pub async fn remove_evidence(&self, id: JobCardId, evidence_id: EvidenceId) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut job_card = self.load(id).await?;
        job_card.remove_evidence(evidence_id, self.clock.now())?;
        self.job_cards.save(job_card).await?;
        Ok(())
    }

    pub async fn evidence(&self, id: JobCardId) -> Result<Vec<JobCardEvidence>> {
        Ok(self.load(id).await?.evidence)
    }

    /// Customers may rate completed work on their own vehicles.
    pub async fn submit_rating(
        &self,
        caller: &Caller,
        id: JobCardId,
        rating: u8,
        feedback: Option<String>,
    ) -> Result<JobCardView> {
        let _guard = self.write_lock.lock().await;
        let mut job_card = self.load(id).await?;
        let owner = self.owner_of(&job_card).await?;
        if caller.role != Role::Customer || owner.id != caller.user_id {
            return Err(ServiceError::Forbidden(format!(
                "job card {id} does not belong to user {}",
                caller.user_id
            )));
        }
        job_card.rate(rating, feedback, self.clock.now())?;

        let saved = self.job_cards.save(job_card).await?;
        info!(job_card_id = id, rating, "rating submitted");
        self.project(saved).await
    }

    pub async fn get_job_card(&self, id: JobCardId) -> Result<JobCardView> {
        let job_card = self.load(id).await?;
        self.project(job_card).await
    }

    pub async fn job_card_by_appointment(&self, appointment_id: AppointmentId) -> Result<JobCardView> {
        let job_card = self
            .job_cards
            .find_by_appointment(appointment_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("no job card for appointment {appointment_id}"))
            })?;
        self.project(job_card).await
    }

    pub async fn all_job_cards(&self) -> Result<Vec<JobCardView>> {
        self.query(JobCardFilter::default()).await
    }

    pub async fn job_cards_by_manager(&self, manager_id: UserId) -> Result<Vec<JobCardView>> {
        self.query(JobCardFilter {
            manager_id: Some(manager_id),
            ..Default::default()
        })
        .await
    }

    pub async fn job_cards_by_mechanic(&self, mechanic_id: UserId) -> Result<Vec<JobCardView>> {
        self.query(JobCardFilter {
            mechanic_id: Some(mechanic_id),
            ..Default::default()
        })
        .await
    }

    pub async fn job_cards_by_status(&self, status: JobCardStatus) -> Result<Vec<JobCardView>> {
        self.query(JobCardFilter {
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    pub async fn manager_job_cards_by_status(
        &self,
        manager_id: UserId,
        status: JobCardStatus,
    ) -> Result<Vec<JobCardView>> {
        self.query(JobCardFilter {
            manager_id: Some(manager_id),
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    pub async fn mechanic_job_cards_by_status(
        &self,
        mechanic_id: UserId,
        status: JobCardStatus,
    ) -> Result<Vec<JobCardView>> {
        self.query(JobCardFilter {
            mechanic_id: Some(mechanic_id),
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    pub async fn customer_job_cards(&self, customer_id: UserId) -> Result<Vec<JobCardView>> {
        self.query(JobCardFilter {
            customer_id: Some(customer_id),
            ..Default::default()
        })
        .await
    }

    /// Number of job cards matching `filter`; the empty filter counts all.
    pub async fn count(&self, filter: &JobCardFilter) -> Result<u64> {
        self.job_cards.count(filter).await
    }

    pub async fn manager_dashboard(&self, manager_id: UserId) -> Result<ManagerDashboard> {
        let by_manager = |status| JobCardFilter {
            manager_id: Some(manager_id),
            status,
            ..Default::default()
        };
        let recent: Vec<JobCard> = self
            .job_cards
            .find(&by_manager(None))
            .await?
            .into_iter()
            .take(RECENT_JOB_CARDS)
            .collect();

        let mut recent_job_cards = Vec::with_capacity(recent.len());
        for job_card in recent {
            recent_job_cards.push(self.project(job_card).await?);
        }

        Ok(ManagerDashboard {
            total_job_cards: self.job_cards.count(&by_manager(None)).await?,
            in_progress_job_cards: self
                .job_cards
                .count(&by_manager(Some(JobCardStatus::InProgress)))
                .await?,
            completed_job_cards: self
                .job_cards
                .count(&by_manager(Some(JobCardStatus::Completed)))
                .await?,
            recent_job_cards,
        })
    }

    pub async fn mechanic_dashboard(&self, mechanic_id: UserId) -> Result<MechanicDashboard> {
        let by_mechanic = |status| JobCardFilter {
            mechanic_id: Some(mechanic_id),
            status,
            ..Default::default()
        };
        Ok(MechanicDashboard {
            total_job_cards: self.job_cards.count(&by_mechanic(None)).await?,
            assigned_job_cards: self
                .query(by_mechanic(Some(JobCardStatus::Created)))
                .await?,
            in_progress_job_cards: self
                .query(by_mechanic(Some(JobCardStatus::InProgress)))
                .await?,
            completed_job_cards: self
                .job_cards
                .count(&by_mechanic(Some(JobCardStatus::Completed)))
                .await?,
        })
    }

    /// Per-mechanic load across the job cards a manager owns.
    pub async fn team_workload(&self, manager_id: UserId) -> Result<Vec<MechanicWorkload>> {
        let job_cards = self
            .job_cards
            .find(&JobCardFilter {
                manager_id: Some(manager_id),
                ..Default::default()
            })
            .await?;

        let mut tally: BTreeMap<UserId, (u64, u64)> = BTreeMap::new();
        for job_card in &job_cards {
            if let Some(mechanic_id) = job_card.mechanic_id {
                let (active, total) = tally.entry(mechanic_id).or_default();
                *total += 1;
                if job_card.status.is_active() {
                    *active += 1;
                }
            }
        }

        let mut workload = Vec::with_capacity(tally.len());
        for (mechanic_id, (active_jobs, total_jobs)) in tally {
            let mechanic_name = self
                .directory
                .user(mechanic_id)
                .await?
                .map(|u| u.name)
                .unwrap_or_else(|| "Unknown".to_string());
            workload.push(MechanicWorkload {
                mechanic_id,
                mechanic_name,
                active_jobs,
                total_jobs,
            });
        }
        Ok(workload)
    }

    pub async fn search_history(&self, keyword: &str, manager_id: UserId) -> Result<Vec<JobCardView>> {
        let job_cards = self.job_cards.search(keyword.trim(), manager_id).await?;
        let mut views = Vec::with_capacity(job_cards.len());
        for job_card in job_cards {
            views.push(self.project(job_card).await?);
        }
        Ok(views)
    }

    /// Parts revenue across completed job cards; labour is excluded.
    pub async fn total_parts_revenue(&self) -> Result<Money> {
        self.job_cards.parts_revenue(None).await
    }

    pub async fn manager_parts_revenue(&self, manager_id: UserId) -> Result<Money> {
        self.job_cards.parts_revenue(Some(manager_id)).await
    }

    async fn query(&self, filter: JobCardFilter) -> Result<Vec<JobCardView>> {
        let job_cards = self.job_cards.find(&filter).await?;
        let mut views = Vec::with_capacity(job_cards.len());
        for job_card in job_cards {
            views.push(self.project(job_card).await?);
        }
        Ok(views)
    }

    async fn load(&self, id: JobCardId) -> Result<JobCard> {
        self.job_cards
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("job card", id))
    }

    async fn appointment(&self, id: AppointmentId) -> Result<Appointment> {
        self.appointments
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("appointment", id))
    }

    async fn user(&self, id: UserId, what: &str) -> Result<User> {
        self.directory
            .user(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(what, id))
    }

    async fn part(&self, id: InventoryId) -> Result<InventoryPart> {
        self.inventory
            .part(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("inventory item", id))
    }

    async fn owner_of(&self, job_card: &JobCard) -> Result<User> {
        let appointment = self.appointment(job_card.appointment_id).await?;
        let vehicle = self
            .directory
            .vehicle(appointment.vehicle_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("vehicle", appointment.vehicle_id))?;
        self.user(vehicle.customer_id, "customer").await
    }

    async fn project(&self, job_card: JobCard) -> Result<JobCardView> {
        let appointment = self.appointment(job_card.appointment_id).await?;
        let vehicle = self
            .directory
            .vehicle(appointment.vehicle_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("vehicle", appointment.vehicle_id))?;
        let customer = self.user(vehicle.customer_id, "customer").await?;
        let manager_name = self.directory.user(job_card.manager_id).await?.map(|u| u.name);
        let mechanic_name = match job_card.mechanic_id {
            Some(id) => self.directory.user(id).await?.map(|u| u.name),
            None => None,
        };
        let parts_total = job_card.parts_total();

        Ok(JobCardView {
            id: job_card.id,
            appointment_id: job_card.appointment_id,
            problem_description: appointment.problem_description,
            license_plate: vehicle.license_plate,
            customer_id: customer.id,
            customer_name: customer.name,
            manager_id: job_card.manager_id,
            manager_name,
            mechanic_id: job_card.mechanic_id,
            mechanic_name,
            status: job_card.status,
            labor_cost: job_card.labor_cost,
            parts_total,
            items: job_card.items,
            evidence: job_card.evidence,
            estimated_completion_date: job_card.estimated_completion_date,
            rating: job_card.rating,
            feedback: job_card.feedback,
            cancellation_reason: job_card.cancellation_reason,
            created_at: job_card.created_at,
            updated_at: job_card.updated_at,
        })
    }
}
