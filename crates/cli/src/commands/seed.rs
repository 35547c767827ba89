//! Database seeding command.
//!
//! Seeds a handful of demo products and dated batches so the allocation and
//! traceability endpoints have something to work with in a fresh environment.
//! Safe to re-run: existing batch numbers are skipped.

use chrono::{Duration, Utc};

use lotwise_server::models::NewBatch;
use lotwise_server::store::{PgStore, Store, StoreError, StoreSession as _};

use super::{CommandError, database_url};

/// Demo products and their batches: (external id, name, sku, batches).
/// Each batch is (number, days-until-expiry, quantity); no expiry when None.
const SEED_DATA: &[(&str, &str, &str, &[(&str, Option<i64>, i64)])] = &[
    (
        "1001",
        "Set Yoghurt 500g",
        "YOG-500",
        &[
            ("YOG-500-A1", Some(10), 40),
            ("YOG-500-A2", Some(25), 120),
        ],
    ),
    (
        "1002",
        "Kefir 1L",
        "KEF-1000",
        &[("KEF-1000-B1", Some(14), 60)],
    ),
    (
        "1003",
        "Aged Gouda Wheel",
        "GOU-W",
        &[("GOU-W-C1", None, 12)],
    ),
];

/// Insert demo data.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url()?;
    let pool = lotwise_server::store::create_pool(&database_url).await?;
    let store = PgStore::new(pool);

    let today = Utc::now();
    let mut created = 0usize;

    for (external_id, name, sku, batches) in SEED_DATA {
        let mut session = store.begin().await?;
        let product = session
            .ensure_product(external_id, Some(name), Some(sku))
            .await?;

        for (number, expiry_days, quantity) in *batches {
            let input = NewBatch {
                product_id: product.id,
                batch_number: (*number).to_string(),
                expires_on: expiry_days.map(|days| (today + Duration::days(days)).date_naive()),
                quantity: *quantity,
            };
            match session.insert_batch(&input).await {
                Ok(batch) => {
                    created += 1;
                    tracing::info!(
                        batch_number = %batch.batch_number,
                        product = %product.external_id,
                        quantity = batch.remaining,
                        "seeded batch"
                    );
                }
                Err(StoreError::DuplicateBatchNumber(_)) => {
                    tracing::info!(batch_number = %number, "batch already seeded, skipping");
                }
                Err(err) => return Err(err.into()),
            }
        }
        session.commit().await?;
    }

    tracing::info!(created, "seed complete");
    Ok(())
}
