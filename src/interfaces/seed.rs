use crate::domain::directory::{InventoryPart, User, Vehicle};
use crate::domain::ports::{DirectoryStore, InventoryStore};
use crate::error::{Result, ServiceError};
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use tracing::info;

/// Reference data a replay starts from.
#[derive(Debug, Default, Deserialize, PartialEq, Clone)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    #[serde(default)]
    pub inventory: Vec<InventoryPart>,
}

impl Seed {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        serde_json::from_reader(source).map_err(|e| ServiceError::Internal(Box::new(e)))
    }

    /// Every vehicle must belong to a seeded user and part prices must not be
    /// negative.
    pub fn validate(&self) -> Result<()> {
        let user_ids: HashSet<_> = self.users.iter().map(|u| u.id).collect();
        if let Some(vehicle) = self
            .vehicles
            .iter()
            .find(|v| !user_ids.contains(&v.customer_id))
        {
            return Err(ServiceError::invalid_field(
                "vehicles",
                format!(
                    "vehicle {} references unknown customer {}",
                    vehicle.id, vehicle.customer_id
                ),
            ));
        }
        if let Some(part) = self.inventory.iter().find(|p| p.price.value().is_sign_negative()) {
            return Err(ServiceError::invalid_field(
                "inventory",
                format!("part {} has a negative price", part.id),
            ));
        }
        Ok(())
    }

    pub async fn load_into<S>(self, store: &S) -> Result<()>
    where
        S: DirectoryStore + InventoryStore,
    {
        self.validate()?;
        let (users, vehicles, parts) = (self.users.len(), self.vehicles.len(), self.inventory.len());
        for user in self.users {
            store.store_user(user).await?;
        }
        for vehicle in self.vehicles {
            store.store_vehicle(vehicle).await?;
        }
        for part in self.inventory {
            store.store_part(part).await?;
        }
        info!(users, vehicles, parts, "seed data loaded");
        Ok(())
    }
}
