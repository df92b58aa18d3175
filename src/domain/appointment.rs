use super::directory::{UserId, VehicleId};
use crate::error::{FieldErrors, Result, ServiceError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type AppointmentId = u64;

pub const MAX_LATITUDE: f64 = 90.0;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// A roadside-assistance location parsed from a `"lat,lon"` string.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
pub struct RsaLocation {
    pub latitude: f64,
    pub longitude: f64,
}

impl RsaLocation {
    /// Parses `"lat,lon"` without range checks. Returns `None` when the
    /// string is not two comma-separated numbers.
    pub fn parse(coordinates: &str) -> Option<Self> {
        let (lat, lon) = coordinates.split_once(',')?;
        let latitude = lat.trim().parse::<f64>().ok()?;
        let longitude = lon.trim().parse::<f64>().ok()?;
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }

    /// Parses and range-checks RSA coordinates.
    ///
    /// `longitude_bound` is configurable; see `AppointmentPolicy`.
    pub fn validate(coordinates: Option<&str>, longitude_bound: f64) -> Result<Self> {
        let raw = match coordinates.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => {
                return Err(ServiceError::invalid_field(
                    "rsa_coordinates",
                    "RSA coordinates required",
                ));
            }
        };

        let location = Self::parse(raw).ok_or_else(|| {
            ServiceError::invalid_field(
                "rsa_coordinates",
                "invalid coordinates format, expected 'latitude,longitude'",
            )
        })?;

        let mut errors = FieldErrors::default();
        if !(-MAX_LATITUDE..=MAX_LATITUDE).contains(&location.latitude) {
            errors.push("rsa_coordinates", "latitude must be between -90 and 90");
        }
        if !(-longitude_bound..=longitude_bound).contains(&location.longitude) {
            errors.push(
                "rsa_coordinates",
                format!("longitude must be between -{longitude_bound} and {longitude_bound}"),
            );
        }
        errors.into_result()?;
        Ok(location)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Appointment {
    pub id: AppointmentId,
    pub vehicle_id: VehicleId,
    pub request_date: NaiveDate,
    pub problem_description: String,
    pub customer_photo_url: Option<String>,
    pub vehicle_image_url: Option<String>,
    pub rsa: bool,
    pub rsa_coordinates: Option<String>,
    pub status: AppointmentStatus,
    pub rejection_reason: Option<String>,
    pub manager_id: Option<UserId>,
    pub mechanic_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    fn require_pending(&self, action: &str) -> Result<()> {
        if self.status == AppointmentStatus::Pending {
            Ok(())
        } else {
            Err(ServiceError::InvalidOperation(format!(
                "cannot {action} appointment {} with status {}",
                self.id, self.status
            )))
        }
    }

    /// Fails for RSA appointments and anything no longer pending.
    pub fn ensure_editable(&self) -> Result<()> {
        if self.rsa {
            return Err(ServiceError::InvalidOperation(
                "RSA appointments cannot be modified".to_string(),
            ));
        }
        self.require_pending("update")
    }

    pub fn approve(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require_pending("approve")?;
        self.status = AppointmentStatus::Approved;
        self.updated_at = now;
        Ok(())
    }

    pub fn reject(&mut self, reason: &str, now: DateTime<Utc>) -> Result<()> {
        self.require_pending("reject")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ServiceError::invalid_field(
                "rejection_reason",
                "rejection reason is required",
            ));
        }
        self.status = AppointmentStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require_pending("cancel")?;
        self.status = AppointmentStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    pub fn assign_manager(&mut self, manager_id: UserId, now: DateTime<Utc>) {
        self.manager_id = Some(manager_id);
        self.updated_at = now;
    }

    /// Assigning a mechanic to a pending appointment approves it implicitly.
    pub fn assign_mechanic(&mut self, mechanic_id: UserId, now: DateTime<Utc>) {
        self.mechanic_id = Some(mechanic_id);
        if self.status == AppointmentStatus::Pending {
            self.status = AppointmentStatus::Approved;
        }
        self.updated_at = now;
    }

    pub fn rsa_location(&self) -> Option<RsaLocation> {
        self.rsa_coordinates.as_deref().and_then(RsaLocation::parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn pending() -> Appointment {
        Appointment {
            id: 1,
            vehicle_id: 10,
            request_date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
            problem_description: "brakes squeal".to_string(),
            customer_photo_url: None,
            vehicle_image_url: None,
            rsa: false,
            rsa_coordinates: None,
            status: AppointmentStatus::Pending,
            rejection_reason: None,
            manager_id: None,
            mechanic_id: None,
            created_at: now(),
            updated_at: now(),
        }
    }

    #[test]
    fn test_parse_coordinates() {
        let location = RsaLocation::parse(" 12.97 , 77.59 ").unwrap();
        assert_eq!(location.latitude, 12.97);
        assert_eq!(location.longitude, 77.59);
        assert!(RsaLocation::parse("12.97").is_none());
        assert!(RsaLocation::parse("north,east").is_none());
        assert!(RsaLocation::parse("1,2,3").is_none());
    }

    #[test]
    fn test_validate_coordinates_bounds() {
        assert!(RsaLocation::validate(Some("45,80"), 90.0).is_ok());
        assert!(matches!(
            RsaLocation::validate(Some("45,200"), 90.0),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            RsaLocation::validate(Some("91,0"), 90.0),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            RsaLocation::validate(Some("   "), 90.0),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(RsaLocation::validate(None, 90.0).is_err());
    }

    #[test]
    fn test_longitude_bound_is_configurable() {
        assert!(RsaLocation::validate(Some("45,120"), 90.0).is_err());
        assert!(RsaLocation::validate(Some("45,120"), 180.0).is_ok());
    }

    #[test]
    fn test_transitions_only_from_pending() {
        let mut appointment = pending();
        appointment.approve(now()).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Approved);

        assert!(matches!(
            appointment.approve(now()),
            Err(ServiceError::InvalidOperation(_))
        ));
        assert!(matches!(
            appointment.reject("late", now()),
            Err(ServiceError::InvalidOperation(_))
        ));
        assert!(matches!(
            appointment.cancel(now()),
            Err(ServiceError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_reject_requires_reason() {
        let mut appointment = pending();
        assert!(matches!(
            appointment.reject("  ", now()),
            Err(ServiceError::InvalidInput(_))
        ));
        assert_eq!(appointment.status, AppointmentStatus::Pending);

        appointment.reject("no slots", now()).unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Rejected);
        assert_eq!(appointment.rejection_reason.as_deref(), Some("no slots"));
    }

    #[test]
    fn test_assign_mechanic_approves_pending() {
        let mut appointment = pending();
        appointment.assign_mechanic(7, now());
        assert_eq!(appointment.status, AppointmentStatus::Approved);
        assert_eq!(appointment.mechanic_id, Some(7));

        let mut cancelled = pending();
        cancelled.cancel(now()).unwrap();
        cancelled.assign_mechanic(7, now());
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn test_rsa_is_not_editable() {
        let mut appointment = pending();
        appointment.rsa = true;
        assert!(matches!(
            appointment.ensure_editable(),
            Err(ServiceError::InvalidOperation(_))
        ));
    }
}
