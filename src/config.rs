//! Runtime configuration read from `AUTOSERVE_*` environment variables.

use crate::error::{Result, ServiceError};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_TAX_PERCENTAGE: Decimal = Decimal::from_parts(18, 0, 0, false, 0);
pub const DEFAULT_CURRENCY: &str = "INR";
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RSA_LONGITUDE_BOUND: f64 = 90.0;

#[derive(Debug, Clone, PartialEq)]
pub struct BillingConfig {
    /// Applied to parts plus labour when an invoice is generated.
    pub tax_percentage: Decimal,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            tax_percentage: DEFAULT_TAX_PERCENTAGE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfig {
    pub currency: String,
    /// Public key handed to the checkout UI.
    pub key_id: String,
    /// Shared secret for signature checks. Never leaves the service.
    pub key_secret: Option<String>,
    pub provider_timeout: Duration,
    pub allow_simulated_payments: bool,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            currency: DEFAULT_CURRENCY.to_string(),
            key_id: String::new(),
            key_secret: None,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            allow_simulated_payments: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentPolicy {
    // TODO: confirm with operations whether RSA longitudes should accept the
    // full [-180, 180] range; until then the historical 90 bound is kept.
    pub rsa_longitude_bound: f64,
}

impl Default for AppointmentPolicy {
    fn default() -> Self {
        Self {
            rsa_longitude_bound: DEFAULT_RSA_LONGITUDE_BOUND,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppConfig {
    pub billing: BillingConfig,
    pub payment: PaymentConfig,
    pub appointments: AppointmentPolicy,
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(tax) = parse::<Decimal>(&lookup, "AUTOSERVE_TAX_PERCENTAGE")? {
            if tax < Decimal::ZERO || tax > Decimal::ONE_HUNDRED {
                return Err(ServiceError::Configuration(format!(
                    "AUTOSERVE_TAX_PERCENTAGE must be within 0..=100, got {tax}"
                )));
            }
            config.billing.tax_percentage = tax;
        }
        if let Some(currency) = lookup("AUTOSERVE_CURRENCY") {
            config.payment.currency = currency.trim().to_ascii_uppercase();
        }
        if let Some(key_id) = lookup("AUTOSERVE_PAYMENT_KEY_ID") {
            config.payment.key_id = key_id;
        }
        config.payment.key_secret =
            lookup("AUTOSERVE_PAYMENT_KEY_SECRET").filter(|secret| !secret.is_empty());
        if let Some(secs) = parse::<u64>(&lookup, "AUTOSERVE_PROVIDER_TIMEOUT_SECS")? {
            config.payment.provider_timeout = Duration::from_secs(secs);
        }
        if let Some(allow) = parse::<bool>(&lookup, "AUTOSERVE_ALLOW_SIMULATED_PAYMENTS")? {
            config.payment.allow_simulated_payments = allow;
        }
        if let Some(bound) = parse::<f64>(&lookup, "AUTOSERVE_RSA_LONGITUDE_BOUND")? {
            if !(0.0..=180.0).contains(&bound) {
                return Err(ServiceError::Configuration(format!(
                    "AUTOSERVE_RSA_LONGITUDE_BOUND must be within 0..=180, got {bound}"
                )));
            }
            config.appointments.rsa_longitude_bound = bound;
        }

        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ServiceError::Configuration(format!("{key}={raw:?}: {e}"))),
    }
}
