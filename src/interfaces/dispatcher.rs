use super::csv::command_reader::{CommandKind, CommandRecord};
use crate::application::appointments::AppointmentWorkflow;
use crate::application::authorization::{Caller, require_role};
use crate::application::billing::{BillingEngine, InvoiceView};
use crate::application::job_cards::{EvidenceSource, JobCardWorkflow};
use crate::application::notifications::NotificationOutbox;
use crate::application::payments::{PaymentVerification, PaymentWorkflow};
use crate::application::validation::{
    CreateAppointment, CreateJobCard, PartRequest, UpdateAppointment, VerifyPayment,
};
use crate::config::AppConfig;
use crate::domain::directory::Role;
use crate::domain::directory::Role::{Admin, Customer, Manager, Mechanic};
use crate::domain::money::Money;
use crate::domain::ports::{ClockRef, DirectoryStoreRef, ImageStoreRef, InventoryStoreRef};
use crate::error::{Result, ServiceError};
use crate::infrastructure::in_memory::InMemoryStore;
use crate::infrastructure::sandbox::SandboxPaymentProvider;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Replays lifecycle commands against the workflows.
///
/// Every command names the acting user; the actor's role is checked against
/// the command before anything else runs.
pub struct CommandDispatcher {
    directory: DirectoryStoreRef,
    inventory: InventoryStoreRef,
    appointments: AppointmentWorkflow,
    job_cards: JobCardWorkflow,
    billing: Arc<BillingEngine>,
    payments: PaymentWorkflow,
    provider: Arc<SandboxPaymentProvider>,
}

impl CommandDispatcher {
    pub fn new(
        store: InMemoryStore,
        provider: Arc<SandboxPaymentProvider>,
        images: ImageStoreRef,
        outbox: NotificationOutbox,
        clock: ClockRef,
        config: AppConfig,
    ) -> Self {
        let shared = Arc::new(store);
        let billing = Arc::new(BillingEngine::new(
            shared.clone(),
            shared.clone(),
            shared.clone(),
            shared.clone(),
            clock.clone(),
            config.billing,
        ));
        Self {
            directory: shared.clone(),
            inventory: shared.clone(),
            appointments: AppointmentWorkflow::new(
                shared.clone(),
                shared.clone(),
                images.clone(),
                outbox,
                clock.clone(),
                config.appointments,
            ),
            job_cards: JobCardWorkflow::new(
                shared.clone(),
                shared.clone(),
                shared.clone(),
                shared.clone(),
                images,
                clock.clone(),
            ),
            payments: PaymentWorkflow::new(
                shared,
                billing.clone(),
                provider.clone(),
                clock,
                config.payment,
            ),
            billing,
            provider,
        }
    }

    pub async fn dispatch(&self, record: CommandRecord) -> Result<()> {
        let actor = self
            .directory
            .user(record.actor)
            .await?
            .ok_or_else(|| ServiceError::not_found("user", record.actor))?;
        let caller = Caller::from(&actor);
        require_role(&caller, allowed_roles(record.command))?;
        debug!(command = ?record.command, actor = caller.user_id, "dispatching command");

        match record.command {
            CommandKind::CreateAppointment | CommandKind::CreateRsa => {
                let rsa = record.command == CommandKind::CreateRsa;
                let request = CreateAppointment {
                    vehicle_id: record.id,
                    request_date: record.date,
                    description: record.text.clone().unwrap_or_default(),
                    rsa,
                    rsa_coordinates: record.reference.clone().filter(|_| rsa),
                    customer_photo_url: record.reference.clone().filter(|_| !rsa),
                };
                let view = self.appointments.create_appointment(&caller, request, None).await?;
                info!(appointment_id = view.id, rsa, "appointment created");
            }
            CommandKind::UpdateAppointment => {
                let request = UpdateAppointment {
                    request_date: record.date,
                    description: record.text.clone(),
                    customer_photo_url: record.reference.clone(),
                };
                self.appointments
                    .update_appointment(&caller, target(&record)?, request)
                    .await?;
            }
            CommandKind::Approve => {
                self.appointments.approve_appointment(target(&record)?).await?;
            }
            CommandKind::Reject => {
                let reason = record.text.as_deref().unwrap_or_default();
                self.appointments
                    .reject_appointment(target(&record)?, reason)
                    .await?;
            }
            CommandKind::Cancel => {
                self.appointments
                    .cancel_appointment(&caller, target(&record)?)
                    .await?;
            }
            CommandKind::AssignManager => {
                self.appointments
                    .assign_manager(target(&record)?, reference(&record)?)
                    .await?;
            }
            CommandKind::AssignMechanic => {
                self.appointments
                    .assign_mechanic(target(&record)?, reference(&record)?)
                    .await?;
            }
            CommandKind::CreateJobCard => {
                let request = CreateJobCard {
                    appointment_id: record.id,
                    manager_id: Some(caller.user_id),
                    mechanic_id: optional_reference(&record)?,
                    labor_cost: record.amount,
                    parts: parse_parts(record.text.as_deref())?,
                    estimated_completion_date: record.date,
                };
                self.job_cards.create_job_card(request).await?;
            }
            CommandKind::Reassign => {
                self.job_cards
                    .update_mechanic(target(&record)?, reference(&record)?)
                    .await?;
            }
            CommandKind::AddItem => {
                let quantity = record
                    .quantity
                    .ok_or_else(|| ServiceError::invalid_field("quantity", "quantity is required"))?;
                self.job_cards
                    .add_item(target(&record)?, reference(&record)?, quantity)
                    .await?;
            }
            CommandKind::RemoveItem => {
                self.job_cards
                    .remove_item(target(&record)?, reference(&record)?)
                    .await?;
            }
            CommandKind::AddEvidence => {
                let url = record
                    .reference
                    .clone()
                    .ok_or_else(|| ServiceError::invalid_field("ref", "evidence url is required"))?;
                self.job_cards
                    .add_evidence(target(&record)?, EvidenceSource::Url(url), record.text.clone())
                    .await?;
            }
            CommandKind::Start => {
                self.job_cards.start_work(&caller, target(&record)?).await?;
            }
            CommandKind::Complete => {
                self.job_cards.complete_work(target(&record)?).await?;
            }
            CommandKind::CancelJob => {
                let reason = record.text.as_deref().unwrap_or_default();
                self.job_cards
                    .cancel_job_card(target(&record)?, reason)
                    .await?;
            }
            CommandKind::Rate => {
                let rating = record
                    .quantity
                    .and_then(|q| u8::try_from(q).ok())
                    .ok_or_else(|| ServiceError::invalid_field("rating", "rating must be between 1 and 5"))?;
                self.job_cards
                    .submit_rating(&caller, target(&record)?, rating, record.text.clone())
                    .await?;
            }
            CommandKind::SetPrice => {
                let amount = record
                    .amount
                    .ok_or_else(|| ServiceError::invalid_field("amount", "price is required"))?;
                let part = self
                    .inventory
                    .update_price(target(&record)?, Money::non_negative("amount", amount)?)
                    .await?;
                info!(inventory_id = part.id, price = %part.price, "inventory price updated");
            }
            CommandKind::Invoice => {
                self.billing.generate_invoice(target(&record)?).await?;
            }
            CommandKind::PayOrder => {
                let invoice = self.payable_invoice(&caller, &record).await?;
                self.payments.create_payment_order(invoice.id).await?;
            }
            CommandKind::Verify => {
                let invoice = self.payable_invoice(&caller, &record).await?;
                let request = VerifyPayment {
                    external_order_id: invoice.external_order_id.clone(),
                    external_payment_id: record.reference.clone(),
                    signature: record.signature.clone(),
                    payment_method: record.text.clone(),
                };
                let outcome = self.payments.verify_payment(invoice.id, request).await?;
                settled(outcome)?;
            }
            CommandKind::Settle => {
                let invoice = self.payable_invoice(&caller, &record).await?;
                let order_id = invoice.external_order_id.clone().ok_or_else(|| {
                    ServiceError::InvalidOperation(format!(
                        "invoice {} has no payment order to settle",
                        invoice.invoice_number
                    ))
                })?;
                let checkout = self.provider.checkout(&order_id)?;
                let request = VerifyPayment {
                    external_order_id: Some(order_id),
                    external_payment_id: Some(checkout.payment_id),
                    signature: Some(checkout.signature),
                    payment_method: record.text.clone(),
                };
                let outcome = self.payments.verify_payment(invoice.id, request).await?;
                settled(outcome)?;
            }
            CommandKind::SimulatePay => {
                let invoice = self.payable_invoice(&caller, &record).await?;
                self.simulate(invoice).await?;
            }
        }
        Ok(())
    }

    pub async fn invoices(&self) -> Result<Vec<InvoiceView>> {
        self.billing.all_invoices().await
    }

    /// The invoice of the job card in `id`, which a customer may only touch
    /// when it is addressed to them.
    async fn payable_invoice(&self, caller: &Caller, record: &CommandRecord) -> Result<InvoiceView> {
        let invoice = self.billing.get_invoice_by_job_card(target(record)?).await?;
        if caller.role == Customer && invoice.customer_id != caller.user_id {
            return Err(ServiceError::Forbidden(format!(
                "invoice {} is not addressed to user {}",
                invoice.invoice_number, caller.user_id
            )));
        }
        Ok(invoice)
    }

    #[cfg(feature = "payment-simulation")]
    async fn simulate(&self, invoice: InvoiceView) -> Result<()> {
        self.payments.simulate_payment(invoice.id).await?;
        Ok(())
    }

    #[cfg(not(feature = "payment-simulation"))]
    async fn simulate(&self, invoice: InvoiceView) -> Result<()> {
        Err(ServiceError::InvalidOperation(format!(
            "cannot simulate payment for {}: built without payment simulation",
            invoice.invoice_number
        )))
    }
}

fn allowed_roles(command: CommandKind) -> &'static [Role] {
    match command {
        CommandKind::CreateAppointment
        | CommandKind::CreateRsa
        | CommandKind::UpdateAppointment
        | CommandKind::Cancel => &[Customer, Admin],
        CommandKind::Approve
        | CommandKind::Reject
        | CommandKind::AssignManager
        | CommandKind::AssignMechanic
        | CommandKind::Reassign
        | CommandKind::CancelJob
        | CommandKind::SetPrice
        | CommandKind::Invoice => &[Manager, Admin],
        CommandKind::CreateJobCard => &[Manager],
        CommandKind::AddItem
        | CommandKind::RemoveItem
        | CommandKind::AddEvidence
        | CommandKind::Complete => &[Manager, Mechanic, Admin],
        CommandKind::Start => &[Mechanic],
        CommandKind::Rate => &[Customer],
        CommandKind::PayOrder | CommandKind::Verify | CommandKind::Settle => &[Customer, Admin],
        CommandKind::SimulatePay => &[Admin],
    }
}

fn settled(outcome: PaymentVerification) -> Result<()> {
    if outcome.verified {
        Ok(())
    } else {
        Err(ServiceError::PaymentProcessing(format!(
            "payment not verified: {}",
            outcome.message
        )))
    }
}

fn target(record: &CommandRecord) -> Result<u64> {
    record
        .id
        .ok_or_else(|| ServiceError::invalid_field("id", "id is required"))
}

fn reference<T: FromStr>(record: &CommandRecord) -> Result<T> {
    optional_reference(record)?
        .ok_or_else(|| ServiceError::invalid_field("ref", "reference is required"))
}

fn optional_reference<T: FromStr>(record: &CommandRecord) -> Result<Option<T>> {
    match record.reference.as_deref() {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ServiceError::invalid_field("ref", format!("invalid reference {raw:?}"))),
    }
}

/// Parses `inventory:quantity` pairs separated by `;`.
fn parse_parts(parts: Option<&str>) -> Result<Vec<PartRequest>> {
    let Some(parts) = parts else {
        return Ok(Vec::new());
    };
    parts
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let invalid = || ServiceError::invalid_field("parts", format!("invalid part {pair:?}"));
            let (inventory_id, quantity) = pair.split_once(':').ok_or_else(invalid)?;
            Ok(PartRequest {
                inventory_id: inventory_id.trim().parse().map_err(|_| invalid())?,
                quantity: quantity.trim().parse().map_err(|_| invalid())?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parts() {
        let parts = parse_parts(Some("1:2; 7:1")).unwrap();
        assert_eq!(
            parts,
            vec![
                PartRequest {
                    inventory_id: 1,
                    quantity: 2
                },
                PartRequest {
                    inventory_id: 7,
                    quantity: 1
                },
            ]
        );
        assert!(parse_parts(None).unwrap().is_empty());
        assert!(parse_parts(Some("1x2")).is_err());
    }

    #[test]
    fn test_command_roles() {
        assert_eq!(allowed_roles(CommandKind::Start), &[Mechanic]);
        assert!(!allowed_roles(CommandKind::Approve).contains(&Customer));
        assert!(allowed_roles(CommandKind::Settle).contains(&Customer));
    }
}
