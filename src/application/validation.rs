//! Inbound request shapes and their validators.
//!
//! Each validator returns every field-level problem it finds. Workflows run
//! them before touching any state.

use crate::domain::appointment::{AppointmentId, RsaLocation};
use crate::domain::directory::{InventoryId, UserId, VehicleId};
use crate::error::{FieldErrors, ServiceError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CreateAppointment {
    pub vehicle_id: Option<VehicleId>,
    pub request_date: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub rsa: bool,
    pub rsa_coordinates: Option<String>,
    pub customer_photo_url: Option<String>,
}

impl CreateAppointment {
    /// RSA requests skip the past-date check and must carry coordinates.
    pub fn validate(&self, today: NaiveDate, longitude_bound: f64) -> FieldErrors {
        let mut errors = FieldErrors::default();
        if self.vehicle_id.is_none() {
            errors.push("vehicle_id", "vehicle id is required");
        }
        match self.request_date {
            None => errors.push("request_date", "request date is required"),
            Some(date) if !self.rsa && date < today => {
                errors.push("request_date", "appointment date cannot be in the past")
            }
            Some(_) => {}
        }
        if self.rsa {
            if let Err(ServiceError::InvalidInput(rsa_errors)) =
                RsaLocation::validate(self.rsa_coordinates.as_deref(), longitude_bound)
            {
                errors.0.extend(rsa_errors.0);
            }
        }
        errors
    }
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct UpdateAppointment {
    pub request_date: Option<NaiveDate>,
    pub description: Option<String>,
    pub customer_photo_url: Option<String>,
}

impl UpdateAppointment {
    pub fn validate(&self, today: NaiveDate) -> FieldErrors {
        let mut errors = FieldErrors::default();
        if let Some(date) = self.request_date
            && date < today
        {
            errors.push("request_date", "appointment date cannot be in the past");
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PartRequest {
    pub inventory_id: InventoryId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct CreateJobCard {
    pub appointment_id: Option<AppointmentId>,
    pub manager_id: Option<UserId>,
    pub mechanic_id: Option<UserId>,
    pub labor_cost: Option<Decimal>,
    #[serde(default)]
    pub parts: Vec<PartRequest>,
    pub estimated_completion_date: Option<NaiveDate>,
}

impl CreateJobCard {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::default();
        if self.appointment_id.is_none() {
            errors.push("appointment_id", "appointment id cannot be null");
        }
        if self.manager_id.is_none() {
            errors.push("manager_id", "manager id cannot be null");
        }
        match self.labor_cost {
            None => errors.push("labor_cost", "labor cost cannot be null"),
            Some(cost) if cost < Decimal::ZERO => {
                errors.push("labor_cost", "labor cost must not be negative")
            }
            Some(_) => {}
        }
        if self.parts.iter().any(|part| part.quantity == 0) {
            errors.push("parts", "every part quantity must be greater than zero");
        }
        errors
    }
}

/// What the checkout UI posts back after the customer pays.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct VerifyPayment {
    pub external_order_id: Option<String>,
    pub external_payment_id: Option<String>,
    pub signature: Option<String>,
    pub payment_method: Option<String>,
}

impl VerifyPayment {
    /// Order id, payment id and signature, when all three are present and
    /// non-blank.
    pub fn complete_fields(&self) -> Option<(&str, &str, &str)> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.trim().is_empty())
        }
        Some((
            present(&self.external_order_id)?,
            present(&self.external_payment_id)?,
            present(&self.signature)?,
        ))
    }
}
