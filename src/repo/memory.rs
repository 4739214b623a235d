//! In-process backend. All tables sit behind one lock; each call is atomic on its own.

use super::{
    normalize_ids, AddressRepository, OpeningHoursRepository, Page, StoreRepository, UserRepository,
    USERNAME_TAKEN,
};
use crate::error::{AppError, NON_FIELD_ERRORS};
use crate::model::{
    Address, AddressValue, OpeningHours, OpeningHoursValue, Relation, StoreRecord, StoreRef, User,
};
use crate::query::{FieldSpec, FieldValue, ListQuery, ADDRESS_FIELDS, OPENING_HOURS_FIELDS, STORE_FIELDS};
use crate::service::validation::{ADDRESS_NOT_UNIQUE, OPENING_HOURS_NOT_UNIQUE};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct StoreRow {
    name: String,
    address_ids: BTreeSet<i64>,
    opening_hours_ids: BTreeSet<i64>,
}

impl StoreRow {
    fn ids(&self, relation: Relation) -> &BTreeSet<i64> {
        match relation {
            Relation::Address => &self.address_ids,
            Relation::OpeningHours => &self.opening_hours_ids,
        }
    }

    fn ids_mut(&mut self, relation: Relation) -> &mut BTreeSet<i64> {
        match relation {
            Relation::Address => &mut self.address_ids,
            Relation::OpeningHours => &mut self.opening_hours_ids,
        }
    }

    fn record(&self, id: i64) -> StoreRecord {
        StoreRecord {
            id,
            name: self.name.clone(),
            address_ids: self.address_ids.iter().copied().collect(),
            opening_hours_ids: self.opening_hours_ids.iter().copied().collect(),
        }
    }
}

#[derive(Default)]
struct Tables {
    next_address: i64,
    next_opening_hours: i64,
    next_store: i64,
    next_user: i64,
    addresses: BTreeMap<i64, Address>,
    opening_hours: BTreeMap<i64, OpeningHours>,
    stores: BTreeMap<i64, StoreRow>,
    users: BTreeMap<i64, User>,
    tokens: HashMap<String, i64>,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Memory-backed implementation of every repository trait. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, AppError> {
        self.tables
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, AppError> {
        self.tables
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }
}

fn address_field(a: &Address, field: &str) -> Vec<FieldValue> {
    match field {
        "id" => vec![FieldValue::Int(a.id)],
        "street" => vec![FieldValue::Text(a.street.clone())],
        "houseNumber" => vec![FieldValue::Text(a.house_number.clone())],
        "location" => vec![FieldValue::Text(a.location.clone())],
        "postcode" => vec![FieldValue::Text(a.postcode.clone())],
        _ => Vec::new(),
    }
}

fn opening_hours_field(oh: &OpeningHours, field: &str) -> Vec<FieldValue> {
    match field {
        "id" => vec![FieldValue::Int(oh.id)],
        "dayOfWeek" => vec![FieldValue::Int(i64::from(oh.day_of_week))],
        "openingTime" => vec![FieldValue::Time(oh.opening_time)],
        "closingTime" => vec![FieldValue::Time(oh.closing_time)],
        "isClosed" => vec![FieldValue::Bool(oh.is_closed)],
        "isSpecialTime" => vec![FieldValue::Bool(oh.is_special_time)],
        _ => Vec::new(),
    }
}

fn store_field(tables: &Tables, id: i64, row: &StoreRow, field: &str) -> Vec<FieldValue> {
    match field.split_once("__") {
        None => match field {
            "id" => vec![FieldValue::Int(id)],
            "name" => vec![FieldValue::Text(row.name.clone())],
            _ => Vec::new(),
        },
        Some(("address", inner)) => row
            .address_ids
            .iter()
            .filter_map(|a| tables.addresses.get(a))
            .flat_map(|a| address_field(a, inner))
            .collect(),
        Some(("openingHours", inner)) => row
            .opening_hours_ids
            .iter()
            .filter_map(|oh| tables.opening_hours.get(oh))
            .flat_map(|oh| opening_hours_field(oh, inner))
            .collect(),
        Some(_) => Vec::new(),
    }
}

/// Filter, search, order and page `rows` the way the SQL backend does:
/// nested fields match when any associated value matches, sort on their smallest
/// value, and rows without a value sort last in both directions. Ties break on id.
fn run_query<T>(
    rows: Vec<(i64, T)>,
    query: &ListQuery,
    fields: &[FieldSpec],
    read: impl Fn(i64, &T, &str) -> Vec<FieldValue>,
) -> Page<(i64, T)> {
    let terms: Vec<String> = query.search.iter().map(|t| t.to_lowercase()).collect();
    let mut matched: Vec<(i64, T)> = rows
        .into_iter()
        .filter(|(id, row)| {
            query
                .filters
                .iter()
                .all(|(field, value)| read(*id, row, *field).contains(value))
        })
        .filter(|(id, row)| {
            terms.iter().all(|term| {
                fields.iter().any(|f| {
                    read(*id, row, f.name)
                        .iter()
                        .any(|v| v.search_text().to_lowercase().contains(term))
                })
            })
        })
        .collect();

    matched.sort_by(|(a_id, a), (b_id, b)| {
        for key in &query.ordering {
            let ka = read(*a_id, a, key.field).into_iter().min_by(|x, y| x.compare(y));
            let kb = read(*b_id, b, key.field).into_iter().min_by(|x, y| x.compare(y));
            let ord = match (ka, kb) {
                (Some(x), Some(y)) => {
                    let o = x.compare(&y);
                    if key.descending {
                        o.reverse()
                    } else {
                        o
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a_id.cmp(b_id)
    });

    let count = matched.len() as u64;
    let items = matched
        .into_iter()
        .skip(query.offset() as usize)
        .take(query.page_size as usize)
        .collect();
    Page { items, count }
}

#[async_trait]
impl AddressRepository for MemoryRepository {
    async fn list(&self, query: &ListQuery) -> Result<Page<Address>, AppError> {
        let tables = self.read()?;
        let rows = tables.addresses.iter().map(|(id, a)| (*id, a.clone())).collect();
        Ok(run_query(rows, query, ADDRESS_FIELDS, |_, a, f| address_field(a, f)).map(|(_, a)| a))
    }

    async fn get(&self, id: i64) -> Result<Option<Address>, AppError> {
        Ok(self.read()?.addresses.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<Address>, AppError> {
        let tables = self.read()?;
        Ok(normalize_ids(ids)
            .iter()
            .filter_map(|id| tables.addresses.get(id).cloned())
            .collect())
    }

    async fn find_by_value(&self, value: &AddressValue) -> Result<Option<Address>, AppError> {
        let tables = self.read()?;
        Ok(tables.addresses.values().find(|a| a.value() == *value).cloned())
    }

    async fn create(&self, value: &AddressValue) -> Result<Address, AppError> {
        let mut tables = self.write()?;
        if tables.addresses.values().any(|a| a.value() == *value) {
            return Err(AppError::invalid(NON_FIELD_ERRORS, ADDRESS_NOT_UNIQUE));
        }
        let id = next_id(&mut tables.next_address);
        let address = Address::from_value(id, value.clone());
        tables.addresses.insert(id, address.clone());
        Ok(address)
    }

    async fn update(&self, id: i64, value: &AddressValue) -> Result<Option<Address>, AppError> {
        let mut tables = self.write()?;
        if !tables.addresses.contains_key(&id) {
            return Ok(None);
        }
        if tables.addresses.values().any(|a| a.id != id && a.value() == *value) {
            return Err(AppError::invalid(NON_FIELD_ERRORS, ADDRESS_NOT_UNIQUE));
        }
        let address = Address::from_value(id, value.clone());
        tables.addresses.insert(id, address.clone());
        Ok(Some(address))
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.write()?;
        if tables.addresses.remove(&id).is_none() {
            return Ok(false);
        }
        for row in tables.stores.values_mut() {
            row.address_ids.remove(&id);
        }
        Ok(true)
    }
}

#[async_trait]
impl OpeningHoursRepository for MemoryRepository {
    async fn list(&self, query: &ListQuery) -> Result<Page<OpeningHours>, AppError> {
        let tables = self.read()?;
        let rows = tables.opening_hours.iter().map(|(id, oh)| (*id, oh.clone())).collect();
        Ok(run_query(rows, query, OPENING_HOURS_FIELDS, |_, oh, f| opening_hours_field(oh, f))
            .map(|(_, oh)| oh))
    }

    async fn get(&self, id: i64) -> Result<Option<OpeningHours>, AppError> {
        Ok(self.read()?.opening_hours.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[i64]) -> Result<Vec<OpeningHours>, AppError> {
        let tables = self.read()?;
        Ok(normalize_ids(ids)
            .iter()
            .filter_map(|id| tables.opening_hours.get(id).cloned())
            .collect())
    }

    async fn find_by_value(&self, value: &OpeningHoursValue) -> Result<Option<OpeningHours>, AppError> {
        let tables = self.read()?;
        Ok(tables.opening_hours.values().find(|oh| oh.value() == *value).cloned())
    }

    async fn create(&self, value: &OpeningHoursValue) -> Result<OpeningHours, AppError> {
        let mut tables = self.write()?;
        if tables.opening_hours.values().any(|oh| oh.value() == *value) {
            return Err(AppError::invalid(NON_FIELD_ERRORS, OPENING_HOURS_NOT_UNIQUE));
        }
        let id = next_id(&mut tables.next_opening_hours);
        let oh = OpeningHours::from_value(id, value.clone());
        tables.opening_hours.insert(id, oh.clone());
        Ok(oh)
    }

    async fn update(&self, id: i64, value: &OpeningHoursValue) -> Result<Option<OpeningHours>, AppError> {
        let mut tables = self.write()?;
        if !tables.opening_hours.contains_key(&id) {
            return Ok(None);
        }
        if tables.opening_hours.values().any(|oh| oh.id != id && oh.value() == *value) {
            return Err(AppError::invalid(NON_FIELD_ERRORS, OPENING_HOURS_NOT_UNIQUE));
        }
        let oh = OpeningHours::from_value(id, value.clone());
        tables.opening_hours.insert(id, oh.clone());
        Ok(Some(oh))
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let mut tables = self.write()?;
        if tables.opening_hours.remove(&id).is_none() {
            return Ok(false);
        }
        for row in tables.stores.values_mut() {
            row.opening_hours_ids.remove(&id);
        }
        Ok(true)
    }
}

#[async_trait]
impl StoreRepository for MemoryRepository {
    async fn list(&self, query: &ListQuery) -> Result<Page<StoreRecord>, AppError> {
        let tables = self.read()?;
        let rows: Vec<(i64, &StoreRow)> = tables.stores.iter().map(|(id, row)| (*id, row)).collect();
        let page = run_query(rows, query, STORE_FIELDS, |id, row, f| store_field(&tables, id, row, f));
        Ok(page.map(|(id, row)| row.record(id)))
    }

    async fn get(&self, id: i64) -> Result<Option<StoreRecord>, AppError> {
        Ok(self.read()?.stores.get(&id).map(|row| row.record(id)))
    }

    async fn create(&self, name: &str) -> Result<StoreRecord, AppError> {
        let mut tables = self.write()?;
        let id = next_id(&mut tables.next_store);
        let row = StoreRow {
            name: name.to_string(),
            ..Default::default()
        };
        let record = row.record(id);
        tables.stores.insert(id, row);
        Ok(record)
    }

    async fn rename(&self, id: i64, name: &str) -> Result<Option<StoreRecord>, AppError> {
        let mut tables = self.write()?;
        Ok(tables.stores.get_mut(&id).map(|row| {
            row.name = name.to_string();
            row.record(id)
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, AppError> {
        Ok(self.write()?.stores.remove(&id).is_some())
    }

    async fn set_relation(&self, id: i64, relation: Relation, target_ids: &[i64]) -> Result<(), AppError> {
        let mut tables = self.write()?;
        for target in target_ids {
            let exists = match relation {
                Relation::Address => tables.addresses.contains_key(target),
                Relation::OpeningHours => tables.opening_hours.contains_key(target),
            };
            if !exists {
                return Err(AppError::InvalidReference {
                    kind: relation.kind(),
                    id: *target,
                });
            }
        }
        let row = tables
            .stores
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("store {}", id)))?;
        *row.ids_mut(relation) = target_ids.iter().copied().collect();
        Ok(())
    }

    async fn owners(&self, relation: Relation, target_id: i64) -> Result<Vec<StoreRef>, AppError> {
        let tables = self.read()?;
        Ok(tables
            .stores
            .iter()
            .filter(|(_, row)| row.ids(relation).contains(&target_id))
            .map(|(id, row)| StoreRef {
                id: *id,
                name: row.name.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn find_user(&self, username: &str) -> Result<Option<User>, AppError> {
        let tables = self.read()?;
        Ok(tables.users.values().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> Result<User, AppError> {
        let mut tables = self.write()?;
        if tables.users.values().any(|u| u.username == username) {
            return Err(AppError::invalid("username", USERNAME_TAKEN));
        }
        let id = next_id(&mut tables.next_user);
        let user = User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn token_for_user(&self, user_id: i64) -> Result<Option<String>, AppError> {
        let tables = self.read()?;
        Ok(tables
            .tokens
            .iter()
            .find(|(_, uid)| **uid == user_id)
            .map(|(key, _)| key.clone()))
    }

    async fn insert_token(&self, user_id: i64, key: &str) -> Result<(), AppError> {
        let mut tables = self.write()?;
        if !tables.users.contains_key(&user_id) {
            return Err(AppError::NotFound(format!("user {}", user_id)));
        }
        tables.tokens.retain(|_, uid| *uid != user_id);
        tables.tokens.insert(key.to_string(), user_id);
        Ok(())
    }

    async fn user_for_token(&self, key: &str) -> Result<Option<User>, AppError> {
        let tables = self.read()?;
        Ok(tables
            .tokens
            .get(key)
            .and_then(|uid| tables.users.get(uid))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortKey;
    use chrono::NaiveTime;

    fn address(street: &str, postcode: &str) -> AddressValue {
        AddressValue {
            street: street.into(),
            house_number: "1".into(),
            location: "Town".into(),
            postcode: postcode.into(),
        }
    }

    fn hours(day: i16, open: u32, close: u32) -> OpeningHoursValue {
        OpeningHoursValue {
            day_of_week: day,
            opening_time: NaiveTime::from_hms_opt(open, 0, 0).unwrap(),
            closing_time: NaiveTime::from_hms_opt(close, 0, 0).unwrap(),
            is_closed: false,
            is_special_time: false,
        }
    }

    #[tokio::test]
    async fn duplicate_address_tuple_is_rejected() {
        let repo = MemoryRepository::new();
        AddressRepository::create(&repo, &address("Main", "1")).await.unwrap();
        let err = AddressRepository::create(&repo, &address("Main", "1")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn deleting_an_address_drops_it_from_stores() {
        let repo = MemoryRepository::new();
        let a = AddressRepository::create(&repo, &address("Main", "1")).await.unwrap();
        let s = StoreRepository::create(&repo, "Shop").await.unwrap();
        repo.set_relation(s.id, Relation::Address, &[a.id]).await.unwrap();
        assert_eq!(repo.owners(Relation::Address, a.id).await.unwrap().len(), 1);

        assert!(AddressRepository::delete(&repo, a.id).await.unwrap());
        let s = StoreRepository::get(&repo, s.id).await.unwrap().unwrap();
        assert!(s.address_ids.is_empty());
    }

    #[tokio::test]
    async fn store_list_filters_and_orders_through_associations() {
        let repo = MemoryRepository::new();
        let zoo = AddressRepository::create(&repo, &address("Zoo Road", "9")).await.unwrap();
        let abbey = AddressRepository::create(&repo, &address("Abbey Road", "2")).await.unwrap();
        let monday = OpeningHoursRepository::create(&repo, &hours(1, 8, 17)).await.unwrap();

        let first = StoreRepository::create(&repo, "First").await.unwrap();
        let second = StoreRepository::create(&repo, "Second").await.unwrap();
        let bare = StoreRepository::create(&repo, "Bare").await.unwrap();
        repo.set_relation(first.id, Relation::Address, &[zoo.id]).await.unwrap();
        repo.set_relation(second.id, Relation::Address, &[abbey.id]).await.unwrap();
        repo.set_relation(second.id, Relation::OpeningHours, &[monday.id]).await.unwrap();

        let query = ListQuery {
            ordering: vec![SortKey { field: "address__street", descending: false }],
            ..Default::default()
        };
        let page = StoreRepository::list(&repo, &query).await.unwrap();
        let names: Vec<&str> = page.items.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Second", "First", "Bare"]);

        let query = ListQuery {
            filters: vec![("openingHours__dayOfWeek", FieldValue::Int(1))],
            ..Default::default()
        };
        let page = StoreRepository::list(&repo, &query).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.items[0].id, second.id);
        assert_eq!(page.items[0].address_ids, vec![abbey.id]);

        let query = ListQuery {
            search: vec!["zoo".into()],
            ..Default::default()
        };
        let page = StoreRepository::list(&repo, &query).await.unwrap();
        assert_eq!(page.items.iter().map(|s| s.id).collect::<Vec<_>>(), vec![first.id]);
        assert_ne!(bare.id, first.id);
    }

    #[tokio::test]
    async fn pages_are_sliced_after_counting() {
        let repo = MemoryRepository::new();
        for n in 0..25 {
            AddressRepository::create(&repo, &address("Street", &n.to_string())).await.unwrap();
        }
        let query = ListQuery {
            page: 3,
            ..Default::default()
        };
        let page = AddressRepository::list(&repo, &query).await.unwrap();
        assert_eq!(page.count, 25);
        assert_eq!(page.items.len(), 5);
        assert_eq!(page.items[0].id, 21);
    }

    #[tokio::test]
    async fn tokens_resolve_to_users() {
        let repo = MemoryRepository::new();
        let user = repo.create_user("tester", "hash").await.unwrap();
        repo.insert_token(user.id, "abc").await.unwrap();
        assert_eq!(repo.token_for_user(user.id).await.unwrap().as_deref(), Some("abc"));
        assert_eq!(repo.user_for_token("abc").await.unwrap().map(|u| u.id), Some(user.id));
        assert!(repo.user_for_token("nope").await.unwrap().is_none());
    }
}
