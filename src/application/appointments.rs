use super::authorization::{Caller, require_user_role};
use super::notifications::NotificationOutbox;
use super::validation::{CreateAppointment, UpdateAppointment};
use crate::config::AppointmentPolicy;
use crate::domain::appointment::{Appointment, AppointmentId, AppointmentStatus, RsaLocation};
use crate::domain::directory::{Role, User, UserId, Vehicle, VehicleId};
use crate::domain::ports::{
    AppointmentFilter, AppointmentStoreRef, ClockRef, DirectoryStoreRef, ImageStoreRef,
    Notification, NotificationKind,
};
use crate::error::{Result, ServiceError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Appointment joined with the vehicle, its owner and the assigned staff.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct AppointmentView {
    pub id: AppointmentId,
    pub vehicle_id: VehicleId,
    pub license_plate: String,
    pub brand: String,
    pub model: String,
    pub color: Option<String>,
    pub customer_id: UserId,
    pub customer_name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub request_date: NaiveDate,
    pub problem_description: String,
    pub customer_photo_url: Option<String>,
    pub vehicle_image_url: Option<String>,
    pub rsa: bool,
    pub rsa_coordinates: Option<String>,
    pub rsa_location: Option<RsaLocation>,
    pub status: AppointmentStatus,
    pub rejection_reason: Option<String>,
    pub manager_id: Option<UserId>,
    pub manager_name: Option<String>,
    pub mechanic_id: Option<UserId>,
    pub mechanic_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Creation, triage and assignment of service appointments.
pub struct AppointmentWorkflow {
    appointments: AppointmentStoreRef,
    directory: DirectoryStoreRef,
    images: ImageStoreRef,
    outbox: NotificationOutbox,
    clock: ClockRef,
    policy: AppointmentPolicy,
    write_lock: Mutex<()>,
}

impl AppointmentWorkflow {
    /// Creates a new `AppointmentWorkflow`.
    ///
    /// # Arguments
    ///
    /// * `appointments` - The store appointments are filed in.
    /// * `directory` - Users and vehicles, for ownership checks and projections.
    /// * `images` - Where customer photos are uploaded.
    /// * `outbox` - Receives notifications once a transition is saved.
    /// * `clock` - Source of today's date for request date checks.
    /// * `policy` - Bounds applied to RSA coordinates.
    pub fn new(
        appointments: AppointmentStoreRef,
        directory: DirectoryStoreRef,
        images: ImageStoreRef,
        outbox: NotificationOutbox,
        clock: ClockRef,
        policy: AppointmentPolicy,
    ) -> Self {
        Self {
            appointments,
            directory,
            images,
            outbox,
            clock,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    /// Files a new PENDING appointment for an active vehicle.
    ///
    /// RSA requests skip the past-date check but must carry valid coordinates.
    /// A failed photo upload is logged and the appointment is filed without an
    /// image. The insert itself is atomic in the store, so no workflow lock is
    /// taken.
    pub async fn create_appointment(
        &self,
        caller: &Caller,
        request: CreateAppointment,
        photo: Option<&[u8]>,
    ) -> Result<AppointmentView> {
        request
            .validate(self.clock.today(), self.policy.rsa_longitude_bound)
            .into_result()?;
        let vehicle_id = request
            .vehicle_id
            .ok_or_else(|| ServiceError::invalid_field("vehicle_id", "vehicle id is required"))?;
        let request_date = request
            .request_date
            .ok_or_else(|| ServiceError::invalid_field("request_date", "request date is required"))?;

        info!(
            vehicle_id,
            rsa = request.rsa,
            "creating {} appointment",
            if request.rsa { "RSA" } else { "regular" }
        );

        let vehicle = self
            .directory
            .vehicle(vehicle_id)
            .await?
            .filter(|v| v.active)
            .ok_or_else(|| ServiceError::not_found("vehicle", vehicle_id))?;
        if caller.role == Role::Customer && vehicle.customer_id != caller.user_id {
            return Err(ServiceError::Forbidden(format!(
                "vehicle {vehicle_id} does not belong to user {}",
                caller.user_id
            )));
        }

        let vehicle_image_url = match photo {
            Some(bytes) if !bytes.is_empty() => match self.images.upload(bytes).await {
                Ok(url) => Some(url),
                Err(e) => {
                    error!(vehicle_id, error = %e, "vehicle image upload failed, continuing without image");
                    None
                }
            },
            _ => None,
        };

        let now = self.clock.now();
        let appointment = Appointment {
            id: 0,
            vehicle_id,
            request_date,
            problem_description: request.description,
            customer_photo_url: request.customer_photo_url,
            vehicle_image_url,
            rsa: request.rsa,
            rsa_coordinates: request.rsa_coordinates.map(|c| c.trim().to_string()),
            status: AppointmentStatus::Pending,
            rejection_reason: None,
            manager_id: None,
            mechanic_id: None,
            created_at: now,
            updated_at: now,
        };
        let saved = self.appointments.insert(appointment).await?;
        info!(appointment_id = saved.id, "appointment created");
        if saved.rsa {
            warn!(
                appointment_id = saved.id,
                coordinates = saved.rsa_coordinates.as_deref().unwrap_or_default(),
                "RSA alert: emergency appointment created"
            );
        }

        let view = self.project(saved).await?;
        self.notify(NotificationKind::AppointmentCreated, &view);
        Ok(view)
    }

    /// Edits a PENDING, non-RSA appointment. Only the fields present in the
    /// request change.
    pub async fn update_appointment(
        &self,
        caller: &Caller,
        id: AppointmentId,
        update: UpdateAppointment,
    ) -> Result<AppointmentView> {
        let _guard = self.write_lock.lock().await;
        let mut appointment = self.load(id).await?;
        self.ensure_customer_owns(caller, &appointment).await?;
        appointment.ensure_editable()?;
        update.validate(self.clock.today()).into_result()?;

        if let Some(date) = update.request_date {
            appointment.request_date = date;
        }
        if let Some(description) = update.description {
            appointment.problem_description = description;
        }
        if let Some(url) = update.customer_photo_url {
            appointment.customer_photo_url = Some(url);
        }
        appointment.updated_at = self.clock.now();

        let saved = self.appointments.save(appointment).await?;
        info!(appointment_id = id, "appointment updated");
        self.project(saved).await
    }

    /// Withdraws a PENDING appointment and notifies the customer.
    pub async fn cancel_appointment(&self, caller: &Caller, id: AppointmentId) -> Result<AppointmentView> {
        let _guard = self.write_lock.lock().await;
        let mut appointment = self.load(id).await?;
        self.ensure_customer_owns(caller, &appointment).await?;
        appointment.cancel(self.clock.now())?;

        let saved = self.appointments.save(appointment).await?;
        info!(appointment_id = id, "appointment cancelled by customer");
        let view = self.project(saved).await?;
        self.notify(NotificationKind::AppointmentCancelled, &view);
        Ok(view)
    }

    /// Approves a PENDING appointment and notifies the customer.
    pub async fn approve_appointment(&self, id: AppointmentId) -> Result<AppointmentView> {
        let _guard = self.write_lock.lock().await;
        let mut appointment = self.load(id).await?;
        appointment.approve(self.clock.now())?;

        let saved = self.appointments.save(appointment).await?;
        info!(appointment_id = id, "appointment approved");
        let view = self.project(saved).await?;
        self.notify(NotificationKind::AppointmentApproved, &view);
        Ok(view)
    }

    /// Rejects a PENDING appointment. The reason must not be blank.
    pub async fn reject_appointment(&self, id: AppointmentId, reason: &str) -> Result<AppointmentView> {
        let _guard = self.write_lock.lock().await;
        let mut appointment = self.load(id).await?;
        appointment.reject(reason, self.clock.now())?;

        let saved = self.appointments.save(appointment).await?;
        info!(appointment_id = id, reason = reason.trim(), "appointment rejected");
        self.project(saved).await
    }

    pub async fn assign_manager(&self, id: AppointmentId, manager_id: UserId) -> Result<AppointmentView> {
        let _guard = self.write_lock.lock().await;
        let mut appointment = self.load(id).await?;
        let manager = self.user(manager_id, "manager").await?;
        require_user_role(&manager, Role::Manager)?;

        appointment.assign_manager(manager_id, self.clock.now());
        let saved = self.appointments.save(appointment).await?;
        info!(appointment_id = id, manager_id, "manager assigned");
        self.project(saved).await
    }

    /// Assigns a mechanic, approving the appointment if it is still PENDING.
    pub async fn assign_mechanic(&self, id: AppointmentId, mechanic_id: UserId) -> Result<AppointmentView> {
        let _guard = self.write_lock.lock().await;
        let mut appointment = self.load(id).await?;
        let mechanic = self.user(mechanic_id, "mechanic").await?;
        require_user_role(&mechanic, Role::Mechanic)?;

        appointment.assign_mechanic(mechanic_id, self.clock.now());
        let saved = self.appointments.save(appointment).await?;
        info!(appointment_id = id, mechanic_id, status = %saved.status, "mechanic assigned");
        self.project(saved).await
    }

    pub async fn get_appointment(&self, id: AppointmentId) -> Result<AppointmentView> {
        let appointment = self.load(id).await?;
        self.project(appointment).await
    }

    pub async fn all_appointments(&self) -> Result<Vec<AppointmentView>> {
        self.query(AppointmentFilter::default()).await
    }

    pub async fn appointments_by_customer(&self, customer_id: UserId) -> Result<Vec<AppointmentView>> {
        self.query(AppointmentFilter {
            customer_id: Some(customer_id),
            ..Default::default()
        })
        .await
    }

    pub async fn appointments_by_vehicle(&self, vehicle_id: VehicleId) -> Result<Vec<AppointmentView>> {
        self.query(AppointmentFilter {
            vehicle_id: Some(vehicle_id),
            ..Default::default()
        })
        .await
    }

    pub async fn appointments_by_manager(&self, manager_id: UserId) -> Result<Vec<AppointmentView>> {
        self.query(AppointmentFilter {
            manager_id: Some(manager_id),
            ..Default::default()
        })
        .await
    }

    pub async fn appointments_by_mechanic(&self, mechanic_id: UserId) -> Result<Vec<AppointmentView>> {
        self.query(AppointmentFilter {
            mechanic_id: Some(mechanic_id),
            ..Default::default()
        })
        .await
    }

    pub async fn appointments_by_status(&self, status: AppointmentStatus) -> Result<Vec<AppointmentView>> {
        self.query(AppointmentFilter {
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    pub async fn pending_appointments(&self) -> Result<Vec<AppointmentView>> {
        self.appointments_by_status(AppointmentStatus::Pending).await
    }

    pub async fn rsa_appointments(&self) -> Result<Vec<AppointmentView>> {
        self.query(AppointmentFilter {
            rsa: Some(true),
            ..Default::default()
        })
        .await
    }

    pub async fn rsa_appointments_by_status(
        &self,
        status: AppointmentStatus,
    ) -> Result<Vec<AppointmentView>> {
        self.query(AppointmentFilter {
            rsa: Some(true),
            status: Some(status),
            ..Default::default()
        })
        .await
    }

    pub async fn pending_rsa_appointments(&self) -> Result<Vec<AppointmentView>> {
        self.rsa_appointments_by_status(AppointmentStatus::Pending).await
    }

    pub async fn pending_count(&self) -> Result<u64> {
        self.appointments
            .count(&AppointmentFilter {
                status: Some(AppointmentStatus::Pending),
                ..Default::default()
            })
            .await
    }

    pub async fn rsa_count(&self) -> Result<u64> {
        self.appointments
            .count(&AppointmentFilter {
                rsa: Some(true),
                ..Default::default()
            })
            .await
    }

    async fn query(&self, filter: AppointmentFilter) -> Result<Vec<AppointmentView>> {
        let appointments = self.appointments.find(&filter).await?;
        let mut views = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            views.push(self.project(appointment).await?);
        }
        Ok(views)
    }

    async fn load(&self, id: AppointmentId) -> Result<Appointment> {
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

    async fn ensure_customer_owns(&self, caller: &Caller, appointment: &Appointment) -> Result<()> {
        if caller.role != Role::Customer {
            return Ok(());
        }
        let vehicle = self.vehicle(appointment.vehicle_id).await?;
        if vehicle.customer_id == caller.user_id {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "appointment {} does not belong to user {}",
                appointment.id, caller.user_id
            )))
        }
    }

    async fn vehicle(&self, id: VehicleId) -> Result<Vehicle> {
        self.directory
            .vehicle(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("vehicle", id))
    }

    async fn staff_name(&self, id: Option<UserId>) -> Result<Option<String>> {
        match id {
            Some(id) => Ok(self.directory.user(id).await?.map(|u| u.name)),
            None => Ok(None),
        }
    }

    async fn project(&self, appointment: Appointment) -> Result<AppointmentView> {
        let vehicle = self.vehicle(appointment.vehicle_id).await?;
        let customer = self.user(vehicle.customer_id, "customer").await?;
        let manager_name = self.staff_name(appointment.manager_id).await?;
        let mechanic_name = self.staff_name(appointment.mechanic_id).await?;
        let rsa_location = appointment.rsa_location();

        Ok(AppointmentView {
            id: appointment.id,
            vehicle_id: vehicle.id,
            license_plate: vehicle.license_plate,
            brand: vehicle.brand,
            model: vehicle.model,
            color: vehicle.color,
            customer_id: customer.id,
            customer_name: customer.name,
            email: customer.email,
            mobile: customer.mobile,
            request_date: appointment.request_date,
            problem_description: appointment.problem_description,
            customer_photo_url: appointment.customer_photo_url,
            vehicle_image_url: appointment.vehicle_image_url,
            rsa: appointment.rsa,
            rsa_coordinates: appointment.rsa_coordinates,
            rsa_location,
            status: appointment.status,
            rejection_reason: appointment.rejection_reason,
            manager_id: appointment.manager_id,
            manager_name,
            mechanic_id: appointment.mechanic_id,
            mechanic_name,
            created_at: appointment.created_at,
            updated_at: appointment.updated_at,
        })
    }

    fn notify(&self, kind: NotificationKind, view: &AppointmentView) {
        let mut context = BTreeMap::new();
        context.insert("appointment_id".to_string(), view.id.to_string());
        context.insert("customer_name".to_string(), view.customer_name.clone());
        context.insert("email".to_string(), view.email.clone());
        context.insert("license_plate".to_string(), view.license_plate.clone());
        context.insert("request_date".to_string(), view.request_date.to_string());
        self.outbox.emit(Notification {
            kind,
            recipient: view.customer_id,
            context,
        });
    }
}
