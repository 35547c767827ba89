//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! lotwise migrate
//! ```
//!
//! # Environment Variables
//!
//! - `LOTWISE_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`)

use lotwise_server::store;

use super::{CommandError, database_url};

/// Run pending migrations against the configured database.
pub async fn run() -> Result<(), CommandError> {
    let database_url = database_url()?;

    tracing::info!("Connecting to database...");
    let pool = store::create_pool(&database_url).await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("../server/migrations").run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
