use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

pub mod entities;
pub mod enums;
pub mod schema;
pub mod services;
pub mod tenant_db;

pub use tenant_db::{TenantDb, TenantOwned};

pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    if database_url.starts_with("sqlite::memory:") {
        // Each pooled connection to an in-memory SQLite database sees its own empty database.
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(10);
    }
    opt.sqlx_logging(false);
    Database::connect(opt).await
}

/// Connects and brings the schema up to date.
pub async fn connect_and_prepare(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let db = connect(database_url).await?;
    schema::ensure_schema(&db).await?;
    Ok(db)
}
