//! Reference records the workflows read but never own: users, vehicles and
//! the parts catalogue.

use super::money::Money;
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type VehicleId = u64;
pub type InventoryId = u64;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Customer,
    Manager,
    Mechanic,
    Admin,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub mobile: Option<String>,
    pub role: Role,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Vehicle {
    pub id: VehicleId,
    pub customer_id: UserId,
    pub license_plate: String,
    pub brand: String,
    pub model: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

/// A catalogue part. Its price may change at any time; job cards keep their
/// own snapshot.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct InventoryPart {
    pub id: InventoryId,
    pub name: String,
    pub price: Money,
}

