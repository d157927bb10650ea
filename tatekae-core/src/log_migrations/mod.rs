//! Event log database migrations
//!
//! Applied to logs.duckdb by the same runner as the ledger migrations,
//! tracked in that database's own sys_migrations table.

/// All log migrations, embedded at compile time, in application order.
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
