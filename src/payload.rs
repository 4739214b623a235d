//! Request bodies. Fields are optional so that "not sent" stays distinguishable from
//! "sent"; validation decides which ones are required for a given write.

use crate::error::{AppError, FieldErrors};
use crate::service::validation::TIME_FORMAT;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use utoipa::ToSchema;

pub const INVALID_STRING: &str = "Not a valid string.";
pub const INVALID_INTEGER: &str = "A valid integer is required.";
pub const INVALID_BOOLEAN: &str = "Must be a valid boolean.";

/// A body key that is either absent or present with a value.
///
/// `null` is read as absent. A present empty list is still `Present`.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch<T> {
    Absent,
    Present(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(v) => Patch::Present(v),
            None => Patch::Absent,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressPayload {
    /// Refers to an existing address when set.
    pub id: Option<i64>,
    pub street: Option<String>,
    pub house_number: Option<String>,
    pub location: Option<String>,
    pub postcode: Option<String>,
}

impl AddressPayload {
    /// True when any field taking part in duplicate detection was sent.
    pub fn has_comparison_fields(&self) -> bool {
        self.street.is_some()
            || self.house_number.is_some()
            || self.location.is_some()
            || self.postcode.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpeningHoursPayload {
    /// Refers to existing opening hours when set.
    pub id: Option<i64>,
    pub day_of_week: Option<i64>,
    /// `HH:MM`, `HH:MM:SS` or `HH:MM:SS.ffffff`.
    #[schema(example = "08:00")]
    pub opening_time: Option<String>,
    #[schema(example = "17:00")]
    pub closing_time: Option<String>,
    pub is_closed: Option<bool>,
    pub is_special_time: Option<bool>,
}

impl OpeningHoursPayload {
    /// True when any field taking part in duplicate detection was sent.
    pub fn has_comparison_fields(&self) -> bool {
        self.day_of_week.is_some()
            || self.opening_time.is_some()
            || self.closing_time.is_some()
            || self.is_closed.is_some()
            || self.is_special_time.is_some()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorePayload {
    pub name: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Vec<AddressPayload>>)]
    pub address: Patch<Vec<AddressPayload>>,
    #[serde(default)]
    #[schema(value_type = Option<Vec<OpeningHoursPayload>>)]
    pub opening_hours: Patch<Vec<OpeningHoursPayload>>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Wire type of a body field, checked before decoding.
#[derive(Clone, Copy, Debug)]
enum FieldKind {
    /// Strings; numbers are read as their decimal text.
    Text,
    Time,
    /// Integers or strings holding one.
    Integer,
    /// Booleans, `0` / `1`, or the usual true/false spellings.
    Boolean,
}

const ADDRESS_FIELDS: [(&str, FieldKind); 5] = [
    ("id", FieldKind::Integer),
    ("street", FieldKind::Text),
    ("houseNumber", FieldKind::Text),
    ("location", FieldKind::Text),
    ("postcode", FieldKind::Text),
];

const OPENING_HOURS_FIELDS: [(&str, FieldKind); 6] = [
    ("id", FieldKind::Integer),
    ("dayOfWeek", FieldKind::Integer),
    ("openingTime", FieldKind::Time),
    ("closingTime", FieldKind::Time),
    ("isClosed", FieldKind::Boolean),
    ("isSpecialTime", FieldKind::Boolean),
];

/// A request body that can coerce and type-check its raw JSON object before decoding,
/// so wrong types are reported per field instead of failing the whole body.
pub trait RequestBody: DeserializeOwned {
    fn check_fields(body: &mut Map<String, Value>, errors: &mut FieldErrors);
}

impl RequestBody for AddressPayload {
    fn check_fields(body: &mut Map<String, Value>, errors: &mut FieldErrors) {
        check_scalars(body, &ADDRESS_FIELDS, errors);
    }
}

impl RequestBody for OpeningHoursPayload {
    fn check_fields(body: &mut Map<String, Value>, errors: &mut FieldErrors) {
        check_scalars(body, &OPENING_HOURS_FIELDS, errors);
    }
}

impl RequestBody for StorePayload {
    fn check_fields(body: &mut Map<String, Value>, errors: &mut FieldErrors) {
        check_scalars(body, &[("name", FieldKind::Text)], errors);
        check_list::<AddressPayload>(body, "address", errors);
        check_list::<OpeningHoursPayload>(body, "openingHours", errors);
    }
}

impl RequestBody for Credentials {
    fn check_fields(body: &mut Map<String, Value>, errors: &mut FieldErrors) {
        check_scalars(body, &[("username", FieldKind::Text), ("password", FieldKind::Text)], errors);
    }
}

/// Decode a JSON object body into `T`. Field type errors become a validation error
/// keyed by wire name (`openingHours[0].dayOfWeek` for list items).
pub fn parse_body<T: RequestBody>(body: Value) -> Result<T, AppError> {
    let Value::Object(mut map) = body else {
        return Err(AppError::BadRequest("body must be a JSON object".into()));
    };
    let mut errors = FieldErrors::new();
    T::check_fields(&mut map, &mut errors);
    errors.into_result()?;
    serde_json::from_value(Value::Object(map)).map_err(|e| AppError::BadRequest(format!("invalid body: {}", e)))
}

fn check_scalars(body: &mut Map<String, Value>, fields: &[(&str, FieldKind)], errors: &mut FieldErrors) {
    for (name, kind) in fields {
        let Some(value) = body.get_mut(*name) else {
            continue;
        };
        match coerce(*kind, value) {
            Ok(Some(coerced)) => *value = coerced,
            Ok(None) => {}
            Err(message) => errors.add(*name, message),
        }
    }
}

/// Nested list of objects under `field`; `null` is left for the decoder to read as absent.
fn check_list<T: RequestBody>(body: &mut Map<String, Value>, field: &str, errors: &mut FieldErrors) {
    let Some(value) = body.get_mut(field) else {
        return;
    };
    let items = match value {
        Value::Null => return,
        Value::Array(items) => items,
        other => {
            errors.add(
                field,
                format!("Expected a list of items but got type \"{}\".", json_type(other)),
            );
            return;
        }
    };
    for (index, item) in items.iter_mut().enumerate() {
        let prefix = format!("{}[{}]", field, index);
        match item {
            Value::Object(map) => {
                let mut item_errors = FieldErrors::new();
                T::check_fields(map, &mut item_errors);
                errors.extend(item_errors.prefixed(&prefix));
            }
            other => errors.add(
                prefix,
                format!("Invalid data. Expected a dictionary, but got {}.", json_type(other)),
            ),
        }
    }
}

/// `Ok(None)` keeps the value, `Ok(Some(v))` replaces it, `Err` is the field message.
fn coerce(kind: FieldKind, value: &Value) -> Result<Option<Value>, &'static str> {
    if value.is_null() {
        return Ok(None);
    }
    match kind {
        FieldKind::Text => match value {
            Value::String(_) => Ok(None),
            Value::Number(n) => Ok(Some(Value::String(n.to_string()))),
            _ => Err(INVALID_STRING),
        },
        FieldKind::Time => match value {
            Value::String(_) => Ok(None),
            _ => Err(TIME_FORMAT),
        },
        FieldKind::Integer => match value {
            Value::Number(n) if n.is_i64() => Ok(None),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(Value::from(f as i64))),
                _ => Err(INVALID_INTEGER),
            },
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|n| Some(Value::from(n)))
                .map_err(|_| INVALID_INTEGER),
            _ => Err(INVALID_INTEGER),
        },
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(None),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Some(Value::Bool(false))),
                Some(1) => Ok(Some(Value::Bool(true))),
                _ => Err(INVALID_BOOLEAN),
            },
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "y" | "on" | "1" => Ok(Some(Value::Bool(true))),
                "false" | "f" | "no" | "n" | "off" | "0" => Ok(Some(Value::Bool(false))),
                _ => Err(INVALID_BOOLEAN),
            },
            _ => Err(INVALID_BOOLEAN),
        },
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field_errors(err: AppError) -> FieldErrors {
        match err {
            AppError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn absent_null_and_empty_lists_are_distinct() {
        let absent: StorePayload = parse_body(json!({ "name": "A" })).unwrap();
        assert_eq!(absent.address, Patch::Absent);
        assert_eq!(absent.opening_hours, Patch::Absent);

        let null: StorePayload = parse_body(json!({ "name": "A", "address": null })).unwrap();
        assert_eq!(null.address, Patch::Absent);

        let empty: StorePayload = parse_body(json!({ "name": "A", "address": [] })).unwrap();
        assert_eq!(empty.address, Patch::Present(vec![]));
    }

    #[test]
    fn nested_items_keep_camel_case_fields() {
        let payload: StorePayload = parse_body(json!({
            "name": "A",
            "address": [{ "id": 3, "houseNumber": "12" }],
            "openingHours": [{ "dayOfWeek": 2, "openingTime": "09:00", "isClosed": true }]
        }))
        .unwrap();
        let Patch::Present(addresses) = &payload.address else {
            panic!("address list missing");
        };
        assert_eq!(addresses[0].id, Some(3));
        assert_eq!(addresses[0].house_number.as_deref(), Some("12"));
        assert!(addresses[0].has_comparison_fields());

        let Patch::Present(hours) = &payload.opening_hours else {
            panic!("opening hours list missing");
        };
        assert_eq!(hours[0].day_of_week, Some(2));
        assert_eq!(hours[0].is_closed, Some(true));
        assert_eq!(hours[0].closing_time, None);
    }

    #[test]
    fn id_only_items_carry_no_comparison_fields() {
        let item: AddressPayload = parse_body(json!({ "id": 5 })).unwrap();
        assert!(!item.has_comparison_fields());
        let item: OpeningHoursPayload = parse_body(json!({ "id": 5 })).unwrap();
        assert!(!item.has_comparison_fields());
    }

    #[test]
    fn numeric_strings_and_loose_scalars_are_coerced() {
        let payload: StorePayload = parse_body(json!({
            "name": "A",
            "address": [{ "id": "4", "houseNumber": 12 }],
            "openingHours": [{ "dayOfWeek": "1", "isClosed": "false", "isSpecialTime": 1 }]
        }))
        .unwrap();
        let Patch::Present(addresses) = &payload.address else {
            panic!("address list missing");
        };
        assert_eq!(addresses[0].id, Some(4));
        assert_eq!(addresses[0].house_number.as_deref(), Some("12"));
        let Patch::Present(hours) = &payload.opening_hours else {
            panic!("opening hours list missing");
        };
        assert_eq!(hours[0].day_of_week, Some(1));
        assert_eq!(hours[0].is_closed, Some(false));
        assert_eq!(hours[0].is_special_time, Some(true));
    }

    #[test]
    fn wrong_types_are_reported_per_field() {
        let err = parse_body::<StorePayload>(json!({
            "name": ["A"],
            "address": [{ "street": "Main" }, 7],
            "openingHours": [{}, { "dayOfWeek": "monday", "openingTime": 800, "isClosed": "maybe" }]
        }))
        .unwrap_err();
        let errors = field_errors(err);
        assert_eq!(errors.get("name"), Some(&[INVALID_STRING.to_string()][..]));
        assert!(errors.get("address[0].street").is_none());
        assert_eq!(
            errors.get("address[1]"),
            Some(&["Invalid data. Expected a dictionary, but got number.".to_string()][..])
        );
        assert_eq!(
            errors.get("openingHours[1].dayOfWeek"),
            Some(&[INVALID_INTEGER.to_string()][..])
        );
        assert_eq!(errors.get("openingHours[1].openingTime"), Some(&[TIME_FORMAT.to_string()][..]));
        assert_eq!(errors.get("openingHours[1].isClosed"), Some(&[INVALID_BOOLEAN.to_string()][..]));

        let errors = field_errors(parse_body::<StorePayload>(json!({ "address": { "street": "Main" } })).unwrap_err());
        assert_eq!(
            errors.get("address"),
            Some(&["Expected a list of items but got type \"dict\".".to_string()][..])
        );

        let errors = field_errors(parse_body::<OpeningHoursPayload>(json!({ "dayOfWeek": "monday" })).unwrap_err());
        assert_eq!(errors.get("dayOfWeek"), Some(&[INVALID_INTEGER.to_string()][..]));
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(matches!(parse_body::<StorePayload>(json!([1, 2])), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_body::<Credentials>(json!("admin")), Err(AppError::BadRequest(_))));
    }
}
