use super::appointment::AppointmentId;
use super::directory::{InventoryId, InventoryPart, UserId};
use super::money::Money;
use crate::error::{Result, ServiceError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type JobCardId = u64;
pub type JobCardItemId = u64;
pub type EvidenceId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobCardStatus {
    Created,
    InProgress,
    Completed,
    Cancelled,
}

impl JobCardStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Created or in progress.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for JobCardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "CREATED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// A part line on a job card.
///
/// Name and unit price are copied from the catalogue when the line is added
/// and never change afterwards, so invoices stay correct if the catalogue
/// price moves later.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct JobCardItem {
    pub id: JobCardItemId,
    pub inventory_id: InventoryId,
    pub quantity: u32,
    pub snapshot_name: String,
    pub snapshot_price: Money,
    pub total_price: Money,
}

impl JobCardItem {
    fn snapshot(id: JobCardItemId, part: &InventoryPart, quantity: u32) -> Result<Self> {
        if quantity == 0 {
            return Err(ServiceError::invalid_field(
                "quantity",
                "quantity must be greater than zero",
            ));
        }
        Ok(Self {
            id,
            inventory_id: part.id,
            quantity,
            snapshot_name: part.name.clone(),
            snapshot_price: part.price,
            total_price: part.price * quantity,
        })
    }
}

/// Photo or note attached by staff while working on a job card.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct JobCardEvidence {
    pub id: EvidenceId,
    pub url: String,
    pub caption: Option<String>,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct JobCard {
    pub id: JobCardId,
    pub appointment_id: AppointmentId,
    pub manager_id: UserId,
    pub mechanic_id: Option<UserId>,
    pub labor_cost: Money,
    pub items: Vec<JobCardItem>,
    pub evidence: Vec<JobCardEvidence>,
    pub status: JobCardStatus,
    pub estimated_completion_date: Option<NaiveDate>,
    pub rating: Option<u8>,
    pub feedback: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Last id handed out to an item or evidence entry on this card.
    pub line_seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobCard {
    pub fn new(
        appointment_id: AppointmentId,
        manager_id: UserId,
        mechanic_id: Option<UserId>,
        labor_cost: Money,
        estimated_completion_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            appointment_id,
            manager_id,
            mechanic_id,
            labor_cost,
            items: Vec::new(),
            evidence: Vec::new(),
            status: JobCardStatus::Created,
            estimated_completion_date,
            rating: None,
            feedback: None,
            cancellation_reason: None,
            line_seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn next_line_id(&mut self) -> u64 {
        self.line_seq += 1;
        self.line_seq
    }

    fn require_active(&self, action: &str) -> Result<()> {
        if self.status.is_active() {
            Ok(())
        } else {
            Err(ServiceError::InvalidOperation(format!(
                "cannot {action} job card {} with status {}",
                self.id, self.status
            )))
        }
    }

    /// Sum of the snapshotted part totals. Labour is not included.
    pub fn parts_total(&self) -> Money {
        self.items.iter().map(|item| item.total_price).sum()
    }

    pub fn add_item(
        &mut self,
        part: &InventoryPart,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<&JobCardItem> {
        self.require_active("add items to")?;
        let id = self.line_seq + 1;
        let item = JobCardItem::snapshot(id, part, quantity)?;
        self.line_seq = id;
        self.items.push(item);
        self.updated_at = now;
        Ok(&self.items[self.items.len() - 1])
    }

    /// Deletes one line; the other lines are left untouched.
    pub fn remove_item(&mut self, item_id: JobCardItemId, now: DateTime<Utc>) -> Result<JobCardItem> {
        self.require_active("remove items from")?;
        let index = self
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or_else(|| ServiceError::not_found("job card item", item_id))?;
        self.updated_at = now;
        Ok(self.items.remove(index))
    }

    /// Evidence may be attached at any point except after cancellation.
    pub fn require_accepts_evidence(&self) -> Result<()> {
        if self.status == JobCardStatus::Cancelled {
            return Err(ServiceError::InvalidOperation(format!(
                "cannot add evidence to cancelled job card {}",
                self.id
            )));
        }
        Ok(())
    }

    pub fn add_evidence(
        &mut self,
        url: String,
        caption: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&JobCardEvidence> {
        self.require_accepts_evidence()?;
        let id = self.next_line_id();
        self.evidence.push(JobCardEvidence {
            id,
            url,
            caption,
            added_at: now,
        });
        self.updated_at = now;
        Ok(&self.evidence[self.evidence.len() - 1])
    }

    pub fn remove_evidence(&mut self, evidence_id: EvidenceId, now: DateTime<Utc>) -> Result<()> {
        let index = self
            .evidence
            .iter()
            .position(|e| e.id == evidence_id)
            .ok_or_else(|| ServiceError::not_found("evidence", evidence_id))?;
        self.evidence.remove(index);
        self.updated_at = now;
        Ok(())
    }

    pub fn assign_mechanic(&mut self, mechanic_id: UserId, now: DateTime<Utc>) -> Result<()> {
        self.require_active("reassign mechanic on")?;
        self.mechanic_id = Some(mechanic_id);
        self.updated_at = now;
        Ok(())
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != JobCardStatus::Created {
            return Err(ServiceError::InvalidOperation(format!(
                "job card {} can only be started from CREATED, current status is {}",
                self.id, self.status
            )));
        }
        self.status = JobCardStatus::InProgress;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != JobCardStatus::InProgress {
            return Err(ServiceError::InvalidOperation(format!(
                "job card {} can only be completed from IN_PROGRESS, current status is {}",
                self.id, self.status
            )));
        }
        self.status = JobCardStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.require_active("cancel")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::invalid_field(
                "cancellation_reason",
                "cancellation reason is required",
            ));
        }
        self.status = JobCardStatus::Cancelled;
        self.cancellation_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn rate(&mut self, rating: u8, feedback: Option<String>, now: DateTime<Utc>) -> Result<()> {
        if self.status != JobCardStatus::Completed {
            return Err(ServiceError::InvalidOperation(format!(
                "only completed job cards can be rated, job card {} is {}",
                self.id, self.status
            )));
        }
        if !(1..=5).contains(&rating) {
            return Err(ServiceError::invalid_field(
                "rating",
                "rating must be between 1 and 5",
            ));
        }
        self.rating = Some(rating);
        self.feedback = feedback;
        self.updated_at = now;
        Ok(())
    }
}
