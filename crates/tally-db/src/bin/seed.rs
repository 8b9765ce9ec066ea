//! Development seed data for Tally Ops.
//!
//! Usage: `cargo run -p tally-db --bin seed -- [path/to/tally.db]`

use chrono::Utc;
use tracing::info;

use tally_core::{
    AdjustmentPolicy, AdjustmentReason, AdjustmentType, ExpenseStatus, NewAdjustment,
    NewBalanceSheetEntry, PaymentStatus,
};
use tally_db::{Database, DbConfig, DbResult, NewDelivery, NewExpense};

#[tokio::main]
async fn main() -> DbResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let path = std::env::args().nth(1).unwrap_or_else(|| "./tally.db".to_string());
    info!(path = %path, "Seeding development database");

    let db = Database::new(DbConfig::new(&path)).await?;
    seed(&db).await?;
    db.close().await;

    info!("Seed complete");
    Ok(())
}

async fn seed(db: &Database) -> DbResult<()> {
    let products = db.products();
    let policy = AdjustmentPolicy::default();
    let today = Utc::now().date_naive();

    let widget = products.create("WID-330", "Widget, 330ml", 1_000, 120).await?;
    let crate_ = products.create("CRT-24", "Crate of 24", 22_000, 40).await?;
    let gasket = products.create("GSK-05", "Gasket 5mm", 250, 900).await?;

    info!(count = 3, "Products created");

    // A decided adjustment and a couple awaiting review.
    let decided = db
        .adjustments()
        .propose(
            &NewAdjustment {
                product_id: widget.id.clone(),
                adjustment_type: AdjustmentType::Decrease,
                quantity_adjusted: 6,
                reason: AdjustmentReason::Damage,
                adjustment_date: today,
                notes: Some("forklift incident, bay 3".to_string()),
            },
            &policy,
            "emp-ayesha",
        )
        .await?;
    db.adjustments().approve(&decided.id, "mgr-tariq").await?;

    db.adjustments()
        .propose(
            &NewAdjustment {
                product_id: crate_.id.clone(),
                adjustment_type: AdjustmentType::Increase,
                quantity_adjusted: 2,
                reason: AdjustmentReason::Return,
                adjustment_date: today,
                notes: None,
            },
            &policy,
            "emp-bilal",
        )
        .await?;
    db.adjustments()
        .propose(
            &NewAdjustment {
                product_id: gasket.id.clone(),
                adjustment_type: AdjustmentType::Decrease,
                quantity_adjusted: 40,
                reason: AdjustmentReason::Loss,
                adjustment_date: today,
                notes: Some("stock-take variance".to_string()),
            },
            &policy,
            "emp-ayesha",
        )
        .await?;

    info!("Adjustments created");

    // Activity for two delivery employees.
    let activity = db.activity();
    for (employee_id, product_id, cents, status) in [
        ("emp-ayesha", &widget.id, 48_000, PaymentStatus::Pending),
        ("emp-ayesha", &crate_.id, 66_000, PaymentStatus::Paid),
        ("emp-bilal", &widget.id, 24_000, PaymentStatus::Pending),
    ] {
        activity
            .record_delivery(&NewDelivery {
                employee_id: employee_id.to_string(),
                product_id: product_id.clone(),
                quantity: 12,
                total_amount_cents: cents,
                payment_status: status,
                delivered_at: Utc::now(),
            })
            .await?;
    }

    activity
        .record_expense(&NewExpense {
            employee_id: "emp-ayesha".to_string(),
            category: "fuel".to_string(),
            description: Some("weekly route".to_string()),
            amount_cents: 7_500,
            status: ExpenseStatus::Approved,
            incurred_at: Utc::now(),
        })
        .await?;

    activity.set_stock_lot("emp-ayesha", &widget.id, 18).await?;
    activity.set_stock_lot("emp-bilal", &gasket.id, 60).await?;

    for (employee_id, balance) in [("emp-ayesha", 150_000), ("emp-bilal", 42_000)] {
        db.balances()
            .record_entry(&NewBalanceSheetEntry {
                employee_id: employee_id.to_string(),
                entry_date: today,
                location: Some("north route".to_string()),
                delivery_amount_cents: 0,
                expense_amount_cents: 0,
                current_balance_cents: balance,
                notes: None,
            })
            .await?;
    }

    info!("Activity and balance entries created");
    Ok(())
}
