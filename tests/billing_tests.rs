mod common;

use autoserve::config::BillingConfig;
use autoserve::domain::invoice::PaymentStatus;
use autoserve::domain::money::Money;
use autoserve::domain::ports::InventoryStore;
use autoserve::error::ServiceError;
use chrono::{TimeZone, Utc};
use common::*;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_invoice_amounts() {
    let harness = Harness::new().await;
    let invoice = harness.invoice().await;

    assert_eq!(invoice.invoice_number, "INV-2026-0001");
    assert_eq!(invoice.base_amount, Money::new(dec!(200)));
    assert_eq!(invoice.labor_cost, Money::new(dec!(50)));
    assert_eq!(invoice.tax_percentage, dec!(18));
    assert_eq!(invoice.tax_amount, Money::new(dec!(45)));
    assert_eq!(invoice.total_amount, Money::new(dec!(295)));
    assert_eq!(invoice.payment_status, PaymentStatus::Pending);
    assert_eq!(invoice.customer_name, "Asha Rao");
    assert_eq!(invoice.vehicle_registration, "KA01AB1234");
    assert_eq!(invoice.items.len(), 1);
    assert_eq!(invoice.items[0].item_name, "Brake pad");
    assert_eq!(invoice.items[0].quantity, 2);
}

#[tokio::test]
async fn test_tax_is_rounded_half_up() {
    let mut config = test_config();
    config.billing = BillingConfig {
        tax_percentage: dec!(5),
    };
    let harness = Harness::with_config(config).await;
    // 10.10 labour * 5% = 0.505 -> 0.51
    let job_card = harness
        .completed_job_card(ASHA, ASHA_CAR, dec!(10.10), &[])
        .await;
    let invoice = harness.billing.generate_invoice(job_card.id).await.unwrap();

    assert_eq!(invoice.tax_amount, Money::new(dec!(0.51)));
    assert_eq!(invoice.total_amount, Money::new(dec!(10.61)));
}

#[tokio::test]
async fn test_generation_is_idempotent() {
    let harness = Harness::new().await;
    let first = harness.invoice().await;
    let again = harness
        .billing
        .generate_invoice(first.job_card_id)
        .await
        .unwrap();

    assert_eq!(again.id, first.id);
    assert_eq!(again.invoice_number, first.invoice_number);
    assert_eq!(harness.billing.total_invoice_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_requires_completed_job_card() {
    let harness = Harness::new().await;
    let job_card = harness
        .job_card(ASHA, ASHA_CAR, dec!(50), &[(BRAKE_PAD, 1)])
        .await;

    let result = harness.billing.generate_invoice(job_card.id).await;
    assert!(matches!(result, Err(ServiceError::InvalidOperation(_))));
    let lookup = harness.billing.get_invoice_by_job_card(job_card.id).await;
    assert!(matches!(lookup, Err(ServiceError::NotFound(_))));
    assert!(matches!(
        harness.billing.generate_invoice(404).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_lookup_by_job_card_generates_lazily() {
    let harness = Harness::new().await;
    let job_card = harness
        .completed_job_card(ASHA, ASHA_CAR, dec!(50), &[(BRAKE_PAD, 2)])
        .await;
    assert_eq!(harness.billing.total_invoice_count().await.unwrap(), 0);

    let invoice = harness
        .billing
        .get_invoice_by_job_card(job_card.id)
        .await
        .unwrap();
    assert_eq!(invoice.total_amount, Money::new(dec!(295)));
    assert_eq!(harness.billing.total_invoice_count().await.unwrap(), 1);

    let by_number = harness
        .billing
        .get_invoice_by_number(&invoice.invoice_number)
        .await
        .unwrap();
    assert_eq!(by_number.id, invoice.id);
    assert!(matches!(
        harness.billing.get_invoice_by_number("INV-1999-0001").await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_invoice_keeps_snapshot_prices() {
    let harness = Harness::new().await;
    let job_card = harness
        .completed_job_card(ASHA, ASHA_CAR, dec!(50), &[(BRAKE_PAD, 2)])
        .await;
    harness
        .store
        .update_price(BRAKE_PAD, Money::new(dec!(999)))
        .await
        .unwrap();

    let invoice = harness.billing.generate_invoice(job_card.id).await.unwrap();
    assert_eq!(invoice.base_amount, Money::new(dec!(200)));
}

#[tokio::test]
async fn test_numbers_follow_sequence_and_year() {
    let harness = Harness::new().await;
    let first = harness.invoice().await;
    let job_card = harness
        .completed_job_card(VIKRAM, VIKRAM_CAR, dec!(20), &[])
        .await;
    harness
        .clock
        .set(Utc.with_ymd_and_hms(2027, 1, 2, 10, 0, 0).unwrap());
    let second = harness.billing.generate_invoice(job_card.id).await.unwrap();

    assert_eq!(first.invoice_number, "INV-2026-0001");
    assert_eq!(second.invoice_number, "INV-2027-0002");
}

#[tokio::test]
async fn test_queries_counts_and_revenue() {
    let harness = Harness::new().await;
    let paid = harness.invoice().await;
    let job_card = harness
        .completed_job_card(VIKRAM, VIKRAM_CAR, dec!(100), &[])
        .await;
    let pending = harness.billing.generate_invoice(job_card.id).await.unwrap();
    harness.pay(paid.id).await;

    assert_eq!(harness.billing.total_invoice_count().await.unwrap(), 2);
    assert_eq!(harness.billing.paid_invoice_count().await.unwrap(), 1);
    assert_eq!(harness.billing.pending_payment_count().await.unwrap(), 1);
    assert_eq!(harness.billing.total_revenue().await.unwrap(), Money::new(dec!(295)));
    assert_eq!(
        harness.billing.revenue_by_manager(MANAGER).await.unwrap(),
        Money::new(dec!(295))
    );
    assert_eq!(harness.billing.revenue_by_manager(ADMIN).await.unwrap(), Money::ZERO);
    assert_eq!(harness.billing.pending_revenue().await.unwrap(), Money::new(dec!(118)));

    let vikram = harness.billing.invoices_by_customer(VIKRAM).await.unwrap();
    assert_eq!(vikram.len(), 1);
    assert_eq!(vikram[0].id, pending.id);
    let paid_list = harness
        .billing
        .invoices_by_status(PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(paid_list[0].id, paid.id);
    assert_eq!(harness.billing.all_invoices().await.unwrap().len(), 2);
}
