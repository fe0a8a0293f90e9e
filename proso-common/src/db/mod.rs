//! Database initialization and schema migrations

pub mod init;
pub mod migrations;

pub use init::*;
pub use migrations::*;

use sqlx::{QueryBuilder, Sqlite};

/// Append `?, ?, ...` bound to the given ids, for `IN (...)` lists
pub fn push_ids(query: &mut QueryBuilder<'_, Sqlite>, ids: &[i64]) {
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
}
