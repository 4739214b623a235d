//! PostgreSQL backend over a shared `PgPool`.

use super::{
    normalize_ids, AddressRepository, OpeningHoursRepository, Page, StoreRepository, UserRepository,
    USERNAME_TAKEN,
};
use crate::error::{AppError, NON_FIELD_ERRORS};
use crate::model::{
    Address, AddressValue, OpeningHours, OpeningHoursValue, Relation, StoreRecord, StoreRef, User,
};
use crate::query::ListQuery;
use crate::service::validation::{ADDRESS_NOT_UNIQUE, CLOSING_AFTER_OPENING, OPENING_HOURS_NOT_UNIQUE};
use crate::sql::{select_list, to_arguments, ListSql, TableDef, ADDRESS_TABLE, OPENING_HOURS_TABLE, STORE_TABLE};
use async_trait::async_trait;
use chrono::NaiveTime;
use sqlx::PgPool;
use std::collections::HashMap;

type AddressRow = (i64, String, String, String, String);
type OpeningHoursRow = (i64, i16, NaiveTime, NaiveTime, bool, bool);

const ADDRESS_COLUMNS: &str = "id, street, house_number, location, postcode";
const OPENING_HOURS_COLUMNS: &str = "id, day_of_week, opening_time, closing_time, is_closed, is_special_time";

fn address_from_row((id, street, house_number, location, postcode): AddressRow) -> Address {
    Address {
        id,
        street,
        house_number,
        location,
        postcode,
    }
}

fn opening_hours_from_row(
    (id, day_of_week, opening_time, closing_time, is_closed, is_special_time): OpeningHoursRow,
) -> OpeningHours {
    OpeningHours {
        id,
        day_of_week,
        opening_time,
        closing_time,
        is_closed,
        is_special_time,
    }
}

/// Association table and target column for a store relation.
fn link(relation: Relation) -> (&'static str, &'static str) {
    match relation {
        Relation::Address => ("store_address", "address_id"),
        Relation::OpeningHours => ("store_opening_hours", "opening_hours_id"),
    }
}

/// Constraint violations on insert/update become validation errors; the app-level
/// checks run first, so these only fire when two requests race.
fn constraint_error(e: sqlx::Error, unique_message: &str) -> AppError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return AppError::invalid(NON_FIELD_ERRORS, unique_message);
        }
        if db.is_check_violation() {
            return AppError::invalid(NON_FIELD_ERRORS, CLOSING_AFTER_OPENING);
        }
    }
    AppError::Db(e)
}

#[derive(Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        PgRepository { pool }
    }

    async fn page<R>(&self, def: &TableDef, query: &ListQuery) -> Result<(Vec<R>, u64), AppError>
    where
        R: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let ListSql { select, count } = select_list(def, query);
        tracing::debug!(sql = %select.sql, params = ?select.params, "query");
        let rows: Vec<R> = sqlx::query_as_with(&select.sql, to_arguments(&select.params)?)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar_with(&count.sql, to_arguments(&count.params)?)
            .fetch_one(&self.pool)
            .await?;
        Ok((rows, total.max(0) as u64))
    }

    /// Association ids per store for `store_ids`, each list sorted.
    async fn relation_ids(&self, relation: Relation, store_ids: &[i64]) -> Result<HashMap<i64, Vec<i64>>, AppError> {
        if store_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let (table, column) = link(relation);
        let sql = format!(
            "SELECT store_id, {} FROM {} WHERE store_id = ANY($1) ORDER BY store_id, {}",
            column, table, column
        );
        tracing::debug!(sql = %sql, "query");
        let rows: Vec<(i64, i64)> = sqlx::query_as(&sql).bind(store_ids).fetch_all(&self.pool).await?;
        let mut out: HashMap<i64, Vec<i64>> = HashMap::new();
        for (store_id, target) in rows {
            out.entry(store_id).or_default().push(target);
        }
        Ok(out)
    }

    async fn store_records(&self, rows: Vec<(i64, String)>) -> Result<Vec<StoreRecord>, AppError> {
        let ids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();
        let mut addresses = self.relation_ids(Relation::Address, &ids).await?;
        let mut opening_hours = self.relation_ids(Relation::OpeningHours, &ids).await?;
        Ok(rows
            .into_iter()
            .map(|(id, name)| StoreRecord {
                id,
                name,
                address_ids: addresses.remove(&id).unwrap_or_default(),
                opening_hours_ids: opening_hours.remove(&id).unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl AddressRepository for PgRepository {
    async fn list(&self, query: &ListQuery) -> Result<Page<Address>, AppError> {
        let (rows, count) = self.page::<AddressRow>(&ADDRESS_TABLE, query).await?;
        Ok(Page {
            items: rows.into_iter().map(address_from_row).collect(),
            count,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Address>, AppError> {
        let sql = format!("SELECT {} FROM address WHERE id = $1", ADDRESS_COLUMNS);
        let row: Option<AddressRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(address_from_row))
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Address>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {} FROM address WHERE id = ANY($1) ORDER BY id", ADDRESS_COLUMNS);
        let rows: Vec<AddressRow> = sqlx::query_as(&sql)
            .bind(normalize_ids(ids))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(address_from_row).collect())
    }

    async fn find_by_value(&self, value: &AddressValue) -> Result<Option<Address>, AppError> {
        let sql = format!(
            "SELECT {} FROM address WHERE street = $1 AND house_number = $2 AND location = $3 AND postcode = $4",
            ADDRESS_COLUMNS
        );
        let row: Option<AddressRow> = sqlx::query_as(&sql)
            .bind(&value.street)
            .bind(&value.house_number)
            .bind(&value.location)
            .bind(&value.postcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(address_from_row))
    }

    async fn create(&self, value: &AddressValue) -> Result<Address, AppError> {
        let sql = format!(
            "INSERT INTO address (street, house_number, location, postcode) VALUES ($1, $2, $3, $4) RETURNING {}",
            ADDRESS_COLUMNS
        );
        let row: AddressRow = sqlx::query_as(&sql)
            .bind(&value.street)
            .bind(&value.house_number)
            .bind(&value.location)
            .bind(&value.postcode)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| constraint_error(e, ADDRESS_NOT_UNIQUE))?;
        Ok(address_from_row(row))
    }

    async fn update(&self, id: i64, value: &AddressValue) -> Result<Option<Address>, AppError> {
        let sql = format!(
            "UPDATE address SET street = $1, house_number = $2, location = $3, postcode = $4 WHERE id = $5 RETURNING {}",
            ADDRESS_COLUMNS
        );
        let row: Option<AddressRow> = sqlx::query_as(&sql)
            .bind(&value.street)
            .bind(&value.house_number)
            .bind(&value.location)
            .bind(&value.postcode)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| constraint_error(e, ADDRESS_NOT_UNIQUE))?;
        Ok(row.map(address_from_row))
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let done = sqlx::query("DELETE FROM address WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl OpeningHoursRepository for PgRepository {
    async fn list(&self, query: &ListQuery) -> Result<Page<OpeningHours>, AppError> {
        let (rows, count) = self.page::<OpeningHoursRow>(&OPENING_HOURS_TABLE, query).await?;
        Ok(Page {
            items: rows.into_iter().map(opening_hours_from_row).collect(),
            count,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<OpeningHours>, AppError> {
        let sql = format!("SELECT {} FROM opening_hours WHERE id = $1", OPENING_HOURS_COLUMNS);
        let row: Option<OpeningHoursRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(opening_hours_from_row))
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<OpeningHours>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM opening_hours WHERE id = ANY($1) ORDER BY id",
            OPENING_HOURS_COLUMNS
        );
        let rows: Vec<OpeningHoursRow> = sqlx::query_as(&sql)
            .bind(normalize_ids(ids))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(opening_hours_from_row).collect())
    }

    async fn find_by_value(&self, value: &OpeningHoursValue) -> Result<Option<OpeningHours>, AppError> {
        let sql = format!(
            "SELECT {} FROM opening_hours WHERE day_of_week = $1 AND opening_time = $2 AND closing_time = $3 \
             AND is_closed = $4 AND is_special_time = $5",
            OPENING_HOURS_COLUMNS
        );
        let row: Option<OpeningHoursRow> = sqlx::query_as(&sql)
            .bind(value.day_of_week)
            .bind(value.opening_time)
            .bind(value.closing_time)
            .bind(value.is_closed)
            .bind(value.is_special_time)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(opening_hours_from_row))
    }

    async fn create(&self, value: &OpeningHoursValue) -> Result<OpeningHours, AppError> {
        let sql = format!(
            "INSERT INTO opening_hours (day_of_week, opening_time, closing_time, is_closed, is_special_time) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            OPENING_HOURS_COLUMNS
        );
        let row: OpeningHoursRow = sqlx::query_as(&sql)
            .bind(value.day_of_week)
            .bind(value.opening_time)
            .bind(value.closing_time)
            .bind(value.is_closed)
            .bind(value.is_special_time)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| constraint_error(e, OPENING_HOURS_NOT_UNIQUE))?;
        Ok(opening_hours_from_row(row))
    }

    async fn update(&self, id: i64, value: &OpeningHoursValue) -> Result<Option<OpeningHours>, AppError> {
        let sql = format!(
            "UPDATE opening_hours SET day_of_week = $1, opening_time = $2, closing_time = $3, is_closed = $4, \
             is_special_time = $5 WHERE id = $6 RETURNING {}",
            OPENING_HOURS_COLUMNS
        );
        let row: Option<OpeningHoursRow> = sqlx::query_as(&sql)
            .bind(value.day_of_week)
            .bind(value.opening_time)
            .bind(value.closing_time)
            .bind(value.is_closed)
            .bind(value.is_special_time)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| constraint_error(e, OPENING_HOURS_NOT_UNIQUE))?;
        Ok(row.map(opening_hours_from_row))
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let done = sqlx::query("DELETE FROM opening_hours WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl StoreRepository for PgRepository {
    async fn list(&self, query: &ListQuery) -> Result<Page<StoreRecord>, AppError> {
        let (rows, count) = self.page::<(i64, String)>(&STORE_TABLE, query).await?;
        Ok(Page {
            items: self.store_records(rows).await?,
            count,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<StoreRecord>, AppError> {
        let row: Option<(i64, String)> = sqlx::query_as("SELECT id, name FROM store WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.store_records(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn create(&self, name: &str) -> Result<StoreRecord, AppError> {
        let (id, name): (i64, String) = sqlx::query_as("INSERT INTO store (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(StoreRecord {
            id,
            name,
            address_ids: Vec::new(),
            opening_hours_ids: Vec::new(),
        })
    }

    async fn rename(&self, id: i64, name: &str) -> Result<Option<StoreRecord>, AppError> {
        let row: Option<(i64, String)> = sqlx::query_as("UPDATE store SET name = $1 WHERE id = $2 RETURNING id, name")
            .bind(name)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.store_records(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let done = sqlx::query("DELETE FROM store WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    /// Delete-then-insert inside one transaction, so readers never see a half-replaced set.
    async fn set_relation(&self, id: i64, relation: Relation, target_ids: &[i64]) -> Result<(), AppError> {
        let (table, column) = link(relation);
        let delete_sql = format!("DELETE FROM {} WHERE store_id = $1", table);
        let insert_sql = format!(
            "INSERT INTO {} (store_id, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            table, column
        );
        let mut tx = self.pool.begin().await?;
        sqlx::query(&delete_sql).bind(id).execute(&mut *tx).await?;
        for target in normalize_ids(target_ids) {
            sqlx::query(&insert_sql)
                .bind(id)
                .bind(target)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(db) = &e {
                        if db.is_foreign_key_violation() {
                            return AppError::InvalidReference {
                                kind: relation.kind(),
                                id: target,
                            };
                        }
                    }
                    AppError::Db(e)
                })?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn owners(&self, relation: Relation, target_id: i64) -> Result<Vec<StoreRef>, AppError> {
        let (table, column) = link(relation);
        let sql = format!(
            "SELECT s.id, s.name FROM store s JOIN {} l ON l.store_id = s.id WHERE l.{} = $1 ORDER BY s.id",
            table, column
        );
        let rows: Vec<(i64, String)> = sqlx::query_as(&sql).bind(target_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id, name)| StoreRef { id, name }).collect())
    }
}

#[async_trait]
impl UserRepository for PgRepository {
    async fn find_user(&self, username: &str) -> Result<Option<User>, AppError> {
        let row: Option<(i64, String, String)> =
            sqlx::query_as("SELECT id, username, password_hash FROM app_user WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, username, password_hash)| User {
            id,
            username,
            password_hash,
        }))
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, AppError> {
        let (id, username, password_hash): (i64, String, String) = sqlx::query_as(
            "INSERT INTO app_user (username, password_hash) VALUES ($1, $2) RETURNING id, username, password_hash",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return AppError::invalid("username", USERNAME_TAKEN);
                }
            }
            AppError::Db(e)
        })?;
        Ok(User {
            id,
            username,
            password_hash,
        })
    }

    async fn token_for_user(&self, user_id: i64) -> Result<Option<String>, AppError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT key FROM auth_token WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(key,)| key))
    }

    async fn insert_token(&self, user_id: i64, key: &str) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO auth_token (key, user_id) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET key = EXCLUDED.key, created_at = NOW()",
        )
        .bind(key)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_for_token(&self, key: &str) -> Result<Option<User>, AppError> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT u.id, u.username, u.password_hash FROM auth_token t JOIN app_user u ON u.id = t.user_id \
             WHERE t.key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, username, password_hash)| User {
            id,
            username,
            password_hash,
        }))
    }
}
