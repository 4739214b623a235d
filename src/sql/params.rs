//! Convert typed field values into bound PostgreSQL arguments.

use crate::error::AppError;
use crate::query::FieldValue;
use sqlx::postgres::PgArguments;
use sqlx::Arguments;

/// Bind `params` in order as `$1..$n`.
pub fn to_arguments(params: &[FieldValue]) -> Result<PgArguments, AppError> {
    let mut args = PgArguments::default();
    for p in params {
        let added = match p {
            FieldValue::Int(n) => args.add(*n),
            FieldValue::Text(s) => args.add(s.clone()),
            FieldValue::Time(t) => args.add(*t),
            FieldValue::Bool(b) => args.add(*b),
        };
        added.map_err(|e| AppError::Internal(format!("bind parameter: {}", e)))?;
    }
    Ok(args)
}
