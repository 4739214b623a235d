//! Persisted records and their value tuples.
//!
//! Addresses and opening hours are shared between stores; equality of the value tuple
//! (everything but the id) is what makes two rows duplicates.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const STREET_MAX_LEN: usize = 100;
pub const HOUSE_NUMBER_MAX_LEN: usize = 10;
pub const LOCATION_MAX_LEN: usize = 100;
pub const POSTCODE_MAX_LEN: usize = 10;
pub const STORE_NAME_MAX_LEN: usize = 150;

/// Monday = 1 .. Sunday = 7.
pub const DAYS_OF_WEEK: [(i16, &str); 7] = [
    (1, "Monday"),
    (2, "Tuesday"),
    (3, "Wednesday"),
    (4, "Thursday"),
    (5, "Friday"),
    (6, "Saturday"),
    (7, "Sunday"),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: i64,
    pub street: String,
    pub house_number: String,
    pub location: String,
    pub postcode: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AddressValue {
    pub street: String,
    pub house_number: String,
    pub location: String,
    pub postcode: String,
}

impl Address {
    pub fn from_value(id: i64, value: AddressValue) -> Self {
        Address {
            id,
            street: value.street,
            house_number: value.house_number,
            location: value.location,
            postcode: value.postcode,
        }
    }

    pub fn value(&self) -> AddressValue {
        AddressValue {
            street: self.street.clone(),
            house_number: self.house_number.clone(),
            location: self.location.clone(),
            postcode: self.postcode.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OpeningHours {
    pub id: i64,
    pub day_of_week: i16,
    #[schema(value_type = String, example = "08:00:00")]
    pub opening_time: NaiveTime,
    #[schema(value_type = String, example = "17:00:00")]
    pub closing_time: NaiveTime,
    pub is_closed: bool,
    pub is_special_time: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OpeningHoursValue {
    pub day_of_week: i16,
    pub opening_time: NaiveTime,
    pub closing_time: NaiveTime,
    pub is_closed: bool,
    pub is_special_time: bool,
}

impl OpeningHours {
    pub fn from_value(id: i64, value: OpeningHoursValue) -> Self {
        OpeningHours {
            id,
            day_of_week: value.day_of_week,
            opening_time: value.opening_time,
            closing_time: value.closing_time,
            is_closed: value.is_closed,
            is_special_time: value.is_special_time,
        }
    }

    pub fn value(&self) -> OpeningHoursValue {
        OpeningHoursValue {
            day_of_week: self.day_of_week,
            opening_time: self.opening_time,
            closing_time: self.closing_time,
            is_closed: self.is_closed,
            is_special_time: self.is_special_time,
        }
    }
}

/// Store row plus the ids of its associations, sorted ascending.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreRecord {
    pub id: i64,
    pub name: String,
    pub address_ids: Vec<i64>,
    pub opening_hours_ids: Vec<i64>,
}

/// Store as returned to clients, with its associations embedded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: i64,
    pub name: String,
    pub address: Vec<Address>,
    pub opening_hours: Vec<OpeningHours>,
}

/// Minimal store identity, used when reporting who else references a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreRef {
    pub id: i64,
    pub name: String,
}

/// The two association tables hanging off a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relation {
    Address,
    OpeningHours,
}

impl Relation {
    pub fn kind(self) -> &'static str {
        match self {
            Relation::Address => "address",
            Relation::OpeningHours => "opening hours",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_hours_serialize_with_camel_case_and_seconds() {
        let oh = OpeningHours {
            id: 4,
            day_of_week: 1,
            opening_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            closing_time: NaiveTime::from_hms_opt(17, 30, 0).unwrap(),
            is_closed: false,
            is_special_time: true,
        };
        let json = serde_json::to_value(&oh).unwrap();
        assert_eq!(json["dayOfWeek"], 1);
        assert_eq!(json["openingTime"], "08:00:00");
        assert_eq!(json["closingTime"], "17:30:00");
        assert_eq!(json["isSpecialTime"], true);
    }

    #[test]
    fn value_round_trips_through_record() {
        let value = AddressValue {
            street: "Main".into(),
            house_number: "1a".into(),
            location: "Berlin".into(),
            postcode: "10115".into(),
        };
        let address = Address::from_value(7, value.clone());
        assert_eq!(address.id, 7);
        assert_eq!(address.value(), value);
    }
}
