//! Database bootstrap: create the database if missing, then the tables the API needs.
//! Every statement is idempotent, so this runs on each start.

use crate::error::{AppError, ConfigError};
use sqlx::{ConnectOptions, PgPool};
use std::str::FromStr;

/// DDL in dependency order: records first, then the association and auth tables.
const SCHEMA: &[(&str, &str)] = &[
    (
        "address",
        r#"CREATE TABLE IF NOT EXISTS "address" (
            "id" BIGSERIAL PRIMARY KEY,
            "street" VARCHAR(100) NOT NULL,
            "house_number" VARCHAR(10) NOT NULL,
            "location" VARCHAR(100) NOT NULL,
            "postcode" VARCHAR(10) NOT NULL,
            CONSTRAINT "address_value_unique" UNIQUE ("street", "house_number", "location", "postcode")
        )"#,
    ),
    (
        "opening_hours",
        r#"CREATE TABLE IF NOT EXISTS "opening_hours" (
            "id" BIGSERIAL PRIMARY KEY,
            "day_of_week" SMALLINT NOT NULL,
            "opening_time" TIME NOT NULL,
            "closing_time" TIME NOT NULL,
            "is_closed" BOOLEAN NOT NULL DEFAULT FALSE,
            "is_special_time" BOOLEAN NOT NULL DEFAULT FALSE,
            CONSTRAINT "opening_hours_day_of_week" CHECK ("day_of_week" BETWEEN 1 AND 7),
            CONSTRAINT "opening_hours_closing_after_opening" CHECK ("closing_time" > "opening_time"),
            CONSTRAINT "opening_hours_value_unique"
                UNIQUE ("day_of_week", "opening_time", "closing_time", "is_closed", "is_special_time")
        )"#,
    ),
    (
        "store",
        r#"CREATE TABLE IF NOT EXISTS "store" (
            "id" BIGSERIAL PRIMARY KEY,
            "name" VARCHAR(150) NOT NULL
        )"#,
    ),
    (
        "store_address",
        r#"CREATE TABLE IF NOT EXISTS "store_address" (
            "store_id" BIGINT NOT NULL REFERENCES "store" ("id") ON DELETE CASCADE,
            "address_id" BIGINT NOT NULL REFERENCES "address" ("id") ON DELETE CASCADE,
            PRIMARY KEY ("store_id", "address_id")
        )"#,
    ),
    (
        "store_opening_hours",
        r#"CREATE TABLE IF NOT EXISTS "store_opening_hours" (
            "store_id" BIGINT NOT NULL REFERENCES "store" ("id") ON DELETE CASCADE,
            "opening_hours_id" BIGINT NOT NULL REFERENCES "opening_hours" ("id") ON DELETE CASCADE,
            PRIMARY KEY ("store_id", "opening_hours_id")
        )"#,
    ),
    (
        "app_user",
        r#"CREATE TABLE IF NOT EXISTS "app_user" (
            "id" BIGSERIAL PRIMARY KEY,
            "username" VARCHAR(150) NOT NULL UNIQUE,
            "password_hash" TEXT NOT NULL
        )"#,
    ),
    (
        "auth_token",
        r#"CREATE TABLE IF NOT EXISTS "auth_token" (
            "key" VARCHAR(40) PRIMARY KEY,
            "user_id" BIGINT NOT NULL UNIQUE REFERENCES "app_user" ("id") ON DELETE CASCADE,
            "created_at" TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )"#,
    ),
];

/// Reverse-lookup indexes for "which stores reference this record".
const INDEXES: &[&str] = &[
    r#"CREATE INDEX IF NOT EXISTS "store_address_address_id_idx" ON "store_address" ("address_id")"#,
    r#"CREATE INDEX IF NOT EXISTS "store_opening_hours_opening_hours_id_idx" ON "store_opening_hours" ("opening_hours_id")"#,
];

/// Create every table and index that does not exist yet.
pub async fn apply_migrations(pool: &PgPool) -> Result<(), AppError> {
    for (table, ddl) in SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
        tracing::debug!(table = %table, "table ready");
    }
    for ddl in INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!(tables = SCHEMA.len(), "migrations applied");
    Ok(())
}

/// Connect to the `postgres` maintenance database on the same server and create the
/// target database when it does not exist. No-op when the URL already names `postgres`.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), AppError> {
    let (admin_url, db_name) = split_database_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| ConfigError::DatabaseUrl(e.to_string()))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(database = %db_name, "database created");
    }
    Ok(())
}

/// `(url of the postgres database on the same server, target database name)`.
fn split_database_url(url: &str) -> Result<(String, String), ConfigError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| ConfigError::DatabaseUrl("no database path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let mut parts = path_and_query.splitn(2, '?');
    let db_name = parts.next().unwrap_or("").trim().to_string();
    let query = parts.next().map(|q| format!("?{}", q)).unwrap_or_default();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres{}", base, query), db_name))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
