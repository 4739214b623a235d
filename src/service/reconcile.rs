//! Resolve nested Address / OpeningHours items of a Store write into stored records.
//!
//! Each item is handled on its own and in order:
//!
//! * with `id`: the record must exist. If no supplied comparison field differs from the
//!   stored value it is reused untouched. Otherwise no store other than `owner` may
//!   reference it; the supplied fields are merged onto the stored record, validated and
//!   written.
//! * without `id`: the item is validated as a new record, then an existing row with the
//!   same value tuple is reused or a new one created.
//!
//! Writes made for earlier items stay in place when a later item fails. The owner check
//! and the update that follows it are separate operations.

use super::crud::CrudService;
use super::validation::RequestValidator;
use crate::error::AppError;
use crate::model::{Address, OpeningHours, Relation};
use crate::payload::{AddressPayload, OpeningHoursPayload};
use crate::state::AppState;

/// Wire name of the nested address list, used to prefix item errors.
pub const ADDRESS_FIELD: &str = "address";
pub const OPENING_HOURS_FIELD: &str = "openingHours";

/// Resolve `items` for the store `owner` (`None` while the store is being created).
pub async fn resolve_addresses(
    state: &AppState,
    items: &[AddressPayload],
    owner: Option<i64>,
) -> Result<Vec<Address>, AppError> {
    let mut resolved = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let address = resolve_address(state, item, owner)
            .await
            .map_err(|e| e.nested(ADDRESS_FIELD, index))?;
        resolved.push(address);
    }
    Ok(resolved)
}

pub async fn resolve_opening_hours(
    state: &AppState,
    items: &[OpeningHoursPayload],
    owner: Option<i64>,
) -> Result<Vec<OpeningHours>, AppError> {
    let mut resolved = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let opening_hours = resolve_one_opening_hours(state, item, owner)
            .await
            .map_err(|e| e.nested(OPENING_HOURS_FIELD, index))?;
        resolved.push(opening_hours);
    }
    Ok(resolved)
}

async fn resolve_address(state: &AppState, item: &AddressPayload, owner: Option<i64>) -> Result<Address, AppError> {
    let Some(id) = item.id else {
        let value = RequestValidator::address(item, None)?;
        if let Some(existing) = state.addresses.find_by_value(&value).await? {
            tracing::debug!(id = existing.id, "reusing identical address");
            return Ok(existing);
        }
        let created = state.addresses.create(&value).await?;
        tracing::info!(id = created.id, "address created from store payload");
        return Ok(created);
    };

    let stored = state.addresses.get(id).await?.ok_or(AppError::InvalidReference {
        kind: Relation::Address.kind(),
        id,
    })?;
    if !address_changed(item, &stored) {
        return Ok(stored);
    }
    ensure_unshared(state, Relation::Address, id, owner).await?;
    let merged = RequestValidator::address(item, Some(&stored))?;
    CrudService::ensure_address_unique(state, &merged, Some(id)).await?;
    let updated = state.addresses.update(id, &merged).await?.ok_or(AppError::InvalidReference {
        kind: Relation::Address.kind(),
        id,
    })?;
    tracing::info!(id, "address updated from store payload");
    Ok(updated)
}

async fn resolve_one_opening_hours(
    state: &AppState,
    item: &OpeningHoursPayload,
    owner: Option<i64>,
) -> Result<OpeningHours, AppError> {
    let Some(id) = item.id else {
        let value = RequestValidator::opening_hours(item, None)?;
        if let Some(existing) = state.opening_hours.find_by_value(&value).await? {
            tracing::debug!(id = existing.id, "reusing identical opening hours");
            return Ok(existing);
        }
        let created = state.opening_hours.create(&value).await?;
        tracing::info!(id = created.id, "opening hours created from store payload");
        return Ok(created);
    };

    let stored = state.opening_hours.get(id).await?.ok_or(AppError::InvalidReference {
        kind: Relation::OpeningHours.kind(),
        id,
    })?;
    if !opening_hours_changed(item, &stored)? {
        return Ok(stored);
    }
    ensure_unshared(state, Relation::OpeningHours, id, owner).await?;
    let merged = RequestValidator::opening_hours(item, Some(&stored))?;
    CrudService::ensure_opening_hours_unique(state, &merged, Some(id)).await?;
    let updated = state
        .opening_hours
        .update(id, &merged)
        .await?
        .ok_or(AppError::InvalidReference {
            kind: Relation::OpeningHours.kind(),
            id,
        })?;
    tracing::info!(id, "opening hours updated from store payload");
    Ok(updated)
}

/// True when a supplied field differs from the stored one. Absent fields never differ.
fn address_changed(item: &AddressPayload, stored: &Address) -> bool {
    let differs = |supplied: &Option<String>, current: &str| supplied.as_deref().is_some_and(|v| v.trim() != current);
    item.has_comparison_fields()
        && (differs(&item.street, &stored.street)
            || differs(&item.house_number, &stored.house_number)
            || differs(&item.location, &stored.location)
            || differs(&item.postcode, &stored.postcode))
}

/// Like [`address_changed`]; supplied times are parsed before comparing.
fn opening_hours_changed(item: &OpeningHoursPayload, stored: &OpeningHours) -> Result<bool, AppError> {
    if !item.has_comparison_fields() {
        return Ok(false);
    }
    let opening = RequestValidator::supplied_time("openingTime", item.opening_time.as_deref())?;
    let closing = RequestValidator::supplied_time("closingTime", item.closing_time.as_deref())?;
    Ok(item.day_of_week.is_some_and(|d| d != i64::from(stored.day_of_week))
        || opening.is_some_and(|t| t != stored.opening_time)
        || closing.is_some_and(|t| t != stored.closing_time)
        || item.is_closed.is_some_and(|b| b != stored.is_closed)
        || item.is_special_time.is_some_and(|b| b != stored.is_special_time))
}

/// Fail with a conflict naming the first store other than `owner` that references the record.
async fn ensure_unshared(state: &AppState, relation: Relation, id: i64, owner: Option<i64>) -> Result<(), AppError> {
    let owners = state.stores.owners(relation, id).await?;
    match owners.into_iter().find(|s| Some(s.id) != owner) {
        Some(other) => {
            tracing::warn!(kind = relation.kind(), id, store = other.id, "refusing to change shared record");
            Err(AppError::Conflict {
                kind: relation.kind(),
                id,
                store: other.name,
            })
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NON_FIELD_ERRORS;
    use crate::model::AddressValue;
    use crate::query::ListQuery;
    use crate::repo::{AddressRepository, MemoryRepository, Page};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts address writes on top of the memory backend.
    struct CountingAddresses {
        inner: MemoryRepository,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl AddressRepository for CountingAddresses {
        async fn list(&self, query: &ListQuery) -> Result<Page<Address>, AppError> {
            AddressRepository::list(&self.inner, query).await
        }
        async fn get(&self, id: i64) -> Result<Option<Address>, AppError> {
            AddressRepository::get(&self.inner, id).await
        }
        async fn get_many(&self, ids: &[i64]) -> Result<Vec<Address>, AppError> {
            AddressRepository::get_many(&self.inner, ids).await
        }
        async fn find_by_value(&self, value: &AddressValue) -> Result<Option<Address>, AppError> {
            AddressRepository::find_by_value(&self.inner, value).await
        }
        async fn create(&self, value: &AddressValue) -> Result<Address, AppError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            AddressRepository::create(&self.inner, value).await
        }
        async fn update(&self, id: i64, value: &AddressValue) -> Result<Option<Address>, AppError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            AddressRepository::update(&self.inner, id, value).await
        }
        async fn delete(&self, id: i64) -> Result<bool, AppError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            AddressRepository::delete(&self.inner, id).await
        }
    }

    fn counting_state() -> (AppState, Arc<CountingAddresses>) {
        let repo = MemoryRepository::new();
        let counting = Arc::new(CountingAddresses {
            inner: repo.clone(),
            writes: AtomicUsize::new(0),
        });
        let state = AppState {
            addresses: counting.clone(),
            opening_hours: Arc::new(repo.clone()),
            stores: Arc::new(repo.clone()),
            users: Arc::new(repo),
            pool: None,
        };
        (state, counting)
    }

    fn new_address(street: &str) -> AddressPayload {
        AddressPayload {
            id: None,
            street: Some(street.into()),
            house_number: Some("123".into()),
            location: Some("Test City".into()),
            postcode: Some("12345".into()),
        }
    }

    fn by_id(id: i64) -> AddressPayload {
        AddressPayload {
            id: Some(id),
            ..Default::default()
        }
    }

    fn new_hours(open: &str, close: &str) -> OpeningHoursPayload {
        OpeningHoursPayload {
            id: None,
            day_of_week: Some(1),
            opening_time: Some(open.into()),
            closing_time: Some(close.into()),
            is_closed: None,
            is_special_time: None,
        }
    }

    async fn store_with_address(state: &AppState, name: &str, address_id: i64) -> i64 {
        let store = state.stores.create(name).await.unwrap();
        state
            .stores
            .set_relation(store.id, Relation::Address, &[address_id])
            .await
            .unwrap();
        store.id
    }

    #[tokio::test]
    async fn identical_tuple_is_reused_without_a_write() {
        let (state, counting) = counting_state();
        let first = resolve_addresses(&state, &[new_address("Test Street")], None).await.unwrap();
        assert_eq!(counting.writes.load(Ordering::SeqCst), 1);

        let again = resolve_addresses(&state, &[new_address("Test Street")], None).await.unwrap();
        assert_eq!(again, first);
        assert_eq!(counting.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn padded_duplicate_reuses_the_existing_row() {
        let (state, counting) = counting_state();
        let first = resolve_addresses(&state, &[new_address("Main")], None).await.unwrap();
        let padded = resolve_addresses(&state, &[new_address("Main ")], None).await.unwrap();
        assert_eq!(padded, first);
        assert_eq!(padded[0].street, "Main");
        assert_eq!(counting.writes.load(Ordering::SeqCst), 1);

        let mut by_id_padded = new_address(" Main");
        by_id_padded.id = Some(first[0].id);
        let same = resolve_addresses(&state, &[by_id_padded], None).await.unwrap();
        assert_eq!(same, first);
        assert_eq!(counting.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unchanged_item_by_id_performs_no_write() {
        let (state, counting) = counting_state();
        let created = resolve_addresses(&state, &[new_address("Test Street")], None).await.unwrap();
        let mut same = new_address("Test Street");
        same.id = Some(created[0].id);

        let resolved = resolve_addresses(&state, &[same, by_id(created[0].id)], None).await.unwrap();
        assert_eq!(resolved, vec![created[0].clone(), created[0].clone()]);
        assert_eq!(counting.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_item_owned_only_by_this_store_is_merged() {
        let (state, counting) = counting_state();
        let created = resolve_addresses(&state, &[new_address("Test Street")], None).await.unwrap();
        let store = store_with_address(&state, "A", created[0].id).await;

        let change = AddressPayload {
            id: Some(created[0].id),
            postcode: Some("54321".into()),
            ..Default::default()
        };
        let resolved = resolve_addresses(&state, &[change], Some(store)).await.unwrap();
        assert_eq!(resolved[0].id, created[0].id);
        assert_eq!(resolved[0].postcode, "54321");
        assert_eq!(resolved[0].street, "Test Street");
        assert_eq!(counting.writes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn changed_item_shared_with_another_store_conflicts() {
        let (state, counting) = counting_state();
        let created = resolve_addresses(&state, &[new_address("Test Street")], None).await.unwrap();
        let id = created[0].id;
        let a = store_with_address(&state, "A", id).await;
        store_with_address(&state, "B", id).await;

        let change = AddressPayload {
            id: Some(id),
            street: Some("Other Street".into()),
            ..Default::default()
        };
        match resolve_addresses(&state, &[change], Some(a)).await.unwrap_err() {
            AppError::Conflict { kind, id: conflict_id, store } => {
                assert_eq!(kind, "address");
                assert_eq!(conflict_id, id);
                assert_eq!(store, "B");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(counting.writes.load(Ordering::SeqCst), 1);
        assert_eq!(state.addresses.get(id).await.unwrap(), Some(created[0].clone()));
    }

    #[tokio::test]
    async fn unknown_id_is_a_reference_error() {
        let (state, _) = counting_state();
        let err = resolve_addresses(&state, &[new_address("Kept"), by_id(404)], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidReference { kind: "address", id: 404 }));
        // the first item was written before the second failed
        assert_eq!(state.addresses.list(&ListQuery::default()).await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn merge_that_collides_with_another_row_is_rejected() {
        let (state, _) = counting_state();
        let rows = resolve_addresses(&state, &[new_address("One"), new_address("Two")], None)
            .await
            .unwrap();
        let change = AddressPayload {
            id: Some(rows[1].id),
            street: Some("One".into()),
            ..Default::default()
        };
        match resolve_addresses(&state, &[change], None).await.unwrap_err() {
            AppError::Validation(errors) => {
                assert!(errors.get(&format!("address[0].{}", NON_FIELD_ERRORS)).is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn item_errors_are_keyed_by_position() {
        let (state, _) = counting_state();
        let mut bad = new_address("");
        bad.postcode = None;
        match resolve_addresses(&state, &[new_address("Fine"), bad], None).await.unwrap_err() {
            AppError::Validation(errors) => {
                assert!(errors.get("address[1].street").is_some());
                assert!(errors.get("address[1].postcode").is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn opening_hours_compare_parsed_times_and_all_flags() {
        let (state, _) = counting_state();
        let created = resolve_opening_hours(&state, &[new_hours("08:00", "17:00")], None)
            .await
            .unwrap();
        let id = created[0].id;
        let store = state.stores.create("A").await.unwrap();
        state
            .stores
            .set_relation(store.id, Relation::OpeningHours, &[id])
            .await
            .unwrap();
        let other = state.stores.create("B").await.unwrap();
        state
            .stores
            .set_relation(other.id, Relation::OpeningHours, &[id])
            .await
            .unwrap();

        // same instant written differently: no change, so sharing does not matter
        let same = OpeningHoursPayload {
            id: Some(id),
            opening_time: Some("08:00:00".into()),
            ..Default::default()
        };
        assert_eq!(
            resolve_opening_hours(&state, &[same], Some(store.id)).await.unwrap(),
            created
        );

        // the special-time flag takes part in the comparison
        let flagged = OpeningHoursPayload {
            id: Some(id),
            is_special_time: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            resolve_opening_hours(&state, &[flagged], Some(store.id)).await,
            Err(AppError::Conflict { .. })
        ));

        let malformed = OpeningHoursPayload {
            id: Some(id),
            closing_time: Some("late".into()),
            ..Default::default()
        };
        match resolve_opening_hours(&state, &[malformed], Some(store.id)).await.unwrap_err() {
            AppError::Validation(errors) => assert!(errors.get("openingHours[0].closingTime").is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn closing_before_opening_is_rejected_for_new_items() {
        let (state, _) = counting_state();
        match resolve_opening_hours(&state, &[new_hours("17:00", "08:00")], None).await.unwrap_err() {
            AppError::Validation(errors) => {
                assert!(errors.get(&format!("openingHours[0].{}", NON_FIELD_ERRORS)).is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
