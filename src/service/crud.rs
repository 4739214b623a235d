//! Standalone Address and OpeningHours CRUD through the repository seams.

use super::validation::{RequestValidator, ADDRESS_NOT_UNIQUE, OPENING_HOURS_NOT_UNIQUE};
use crate::error::{AppError, NON_FIELD_ERRORS};
use crate::model::{Address, AddressValue, OpeningHours, OpeningHoursValue};
use crate::payload::{AddressPayload, OpeningHoursPayload};
use crate::query::ListQuery;
use crate::repo::Page;
use crate::state::AppState;

pub struct CrudService;

impl CrudService {
    pub async fn list_addresses(state: &AppState, query: &ListQuery) -> Result<Page<Address>, AppError> {
        state.addresses.list(query).await
    }

    pub async fn get_address(state: &AppState, id: i64) -> Result<Address, AppError> {
        state
            .addresses
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("address {}", id)))
    }

    /// Insert a new address; every field is required and the value tuple must be unused.
    pub async fn create_address(state: &AppState, payload: &AddressPayload) -> Result<Address, AppError> {
        let value = RequestValidator::address(payload, None)?;
        Self::ensure_address_unique(state, &value, None).await?;
        let created = state.addresses.create(&value).await?;
        tracing::info!(id = created.id, "address created");
        Ok(created)
    }

    /// Full update: every field is required, uniqueness excludes the record itself.
    pub async fn replace_address(state: &AppState, id: i64, payload: &AddressPayload) -> Result<Address, AppError> {
        Self::get_address(state, id).await?;
        let value = RequestValidator::address(payload, None)?;
        Self::ensure_address_unique(state, &value, Some(id)).await?;
        let updated = state
            .addresses
            .update(id, &value)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("address {}", id)))?;
        tracing::info!(id, "address updated");
        Ok(updated)
    }

    pub async fn delete_address(state: &AppState, id: i64) -> Result<(), AppError> {
        if !state.addresses.delete(id).await? {
            return Err(AppError::NotFound(format!("address {}", id)));
        }
        tracing::info!(id, "address deleted");
        Ok(())
    }

    /// Reject `value` when another row (not `except`) already holds the same tuple.
    pub async fn ensure_address_unique(
        state: &AppState,
        value: &AddressValue,
        except: Option<i64>,
    ) -> Result<(), AppError> {
        match state.addresses.find_by_value(value).await? {
            Some(existing) if Some(existing.id) != except => {
                Err(AppError::invalid(NON_FIELD_ERRORS, ADDRESS_NOT_UNIQUE))
            }
            _ => Ok(()),
        }
    }

    pub async fn list_opening_hours(state: &AppState, query: &ListQuery) -> Result<Page<OpeningHours>, AppError> {
        state.opening_hours.list(query).await
    }

    pub async fn get_opening_hours(state: &AppState, id: i64) -> Result<OpeningHours, AppError> {
        state
            .opening_hours
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("opening hours {}", id)))
    }

    pub async fn create_opening_hours(
        state: &AppState,
        payload: &OpeningHoursPayload,
    ) -> Result<OpeningHours, AppError> {
        let value = RequestValidator::opening_hours(payload, None)?;
        Self::ensure_opening_hours_unique(state, &value, None).await?;
        let created = state.opening_hours.create(&value).await?;
        tracing::info!(id = created.id, "opening hours created");
        Ok(created)
    }

    pub async fn replace_opening_hours(
        state: &AppState,
        id: i64,
        payload: &OpeningHoursPayload,
    ) -> Result<OpeningHours, AppError> {
        Self::get_opening_hours(state, id).await?;
        let value = RequestValidator::opening_hours(payload, None)?;
        Self::ensure_opening_hours_unique(state, &value, Some(id)).await?;
        let updated = state
            .opening_hours
            .update(id, &value)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("opening hours {}", id)))?;
        tracing::info!(id, "opening hours updated");
        Ok(updated)
    }

    pub async fn delete_opening_hours(state: &AppState, id: i64) -> Result<(), AppError> {
        if !state.opening_hours.delete(id).await? {
            return Err(AppError::NotFound(format!("opening hours {}", id)));
        }
        tracing::info!(id, "opening hours deleted");
        Ok(())
    }

    pub async fn ensure_opening_hours_unique(
        state: &AppState,
        value: &OpeningHoursValue,
        except: Option<i64>,
    ) -> Result<(), AppError> {
        match state.opening_hours.find_by_value(value).await? {
            Some(existing) if Some(existing.id) != except => {
                Err(AppError::invalid(NON_FIELD_ERRORS, OPENING_HOURS_NOT_UNIQUE))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(street: &str) -> AddressPayload {
        AddressPayload {
            id: None,
            street: Some(street.into()),
            house_number: Some("1".into()),
            location: Some("Berlin".into()),
            postcode: Some("10115".into()),
        }
    }

    fn not_unique(err: AppError) -> bool {
        matches!(err, AppError::Validation(ref e) if e.get(NON_FIELD_ERRORS).is_some())
    }

    #[tokio::test]
    async fn duplicate_create_is_a_validation_error() {
        let state = AppState::memory();
        CrudService::create_address(&state, &address("Main")).await.unwrap();
        let err = CrudService::create_address(&state, &address("Main")).await.unwrap_err();
        assert!(not_unique(err));
    }

    #[tokio::test]
    async fn replace_may_keep_its_own_tuple_but_not_take_another() {
        let state = AppState::memory();
        let a = CrudService::create_address(&state, &address("Main")).await.unwrap();
        let b = CrudService::create_address(&state, &address("Side")).await.unwrap();

        let same = CrudService::replace_address(&state, a.id, &address("Main")).await.unwrap();
        assert_eq!(same, a);

        let err = CrudService::replace_address(&state, b.id, &address("Main")).await.unwrap_err();
        assert!(not_unique(err));
    }

    #[tokio::test]
    async fn replace_requires_every_field() {
        let state = AppState::memory();
        let a = CrudService::create_address(&state, &address("Main")).await.unwrap();
        let partial = AddressPayload {
            street: Some("Other".into()),
            ..Default::default()
        };
        match CrudService::replace_address(&state, a.id, &partial).await.unwrap_err() {
            AppError::Validation(errors) => {
                assert!(errors.get("houseNumber").is_some());
                assert!(errors.get("street").is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let state = AppState::memory();
        assert!(matches!(
            CrudService::get_opening_hours(&state, 99).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            CrudService::delete_address(&state, 99).await,
            Err(AppError::NotFound(_))
        ));
    }
}
