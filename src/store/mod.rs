//! Data access for the persisted tables.
//!
//! Runtime-bound sqlx queries against Postgres; one module per aggregate.
//! Writes are short transactions, idempotent where possible. All queries are
//! dealership-scoped — nothing here ever reads across tenants except the
//! phone resolver's explicit config scan.

pub mod approvals;
pub mod conversations;
pub mod dealerships;
pub mod inventory;
pub mod invites;
pub mod leads;
pub mod profiles;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Connect to Postgres with the configured pool size.
///
/// # Errors
///
/// Returns the sqlx error when the database is unreachable.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
}
