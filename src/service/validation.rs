//! Field and record rules for addresses, opening hours and stores.
//!
//! Every builder takes an optional `base`: when present, fields missing from the
//! payload fall back to the stored record (partial update); when absent, the payload
//! must be complete (create / full replace).

use crate::error::{AppError, FieldErrors, NON_FIELD_ERRORS};
use crate::model::{
    Address, AddressValue, OpeningHours, OpeningHoursValue, DAYS_OF_WEEK, HOUSE_NUMBER_MAX_LEN,
    LOCATION_MAX_LEN, POSTCODE_MAX_LEN, STORE_NAME_MAX_LEN, STREET_MAX_LEN,
};
use crate::payload::{AddressPayload, OpeningHoursPayload};
use chrono::NaiveTime;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const TIME_FORMAT: &str =
    "Time has wrong format. Use one of these formats instead: hh:mm[:ss[.uuuuuu]].";
pub const CLOSING_AFTER_OPENING: &str = "Closing time must be after opening time.";
pub const ADDRESS_NOT_UNIQUE: &str =
    "The fields street, houseNumber, location, postcode must make a unique set.";
pub const OPENING_HOURS_NOT_UNIQUE: &str =
    "The fields dayOfWeek, openingTime, closingTime, isClosed, isSpecialTime must make a unique set.";

const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];

/// Parse a wire time of day.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
}

pub struct RequestValidator;

impl RequestValidator {
    /// Build a complete address value from a payload, or from a payload merged onto `base`.
    pub fn address(payload: &AddressPayload, base: Option<&Address>) -> Result<AddressValue, AppError> {
        let mut errors = FieldErrors::new();
        let street = text(&mut errors, "street", payload.street.as_deref(), base.map(|b| b.street.as_str()), STREET_MAX_LEN);
        let house_number = text(
            &mut errors,
            "houseNumber",
            payload.house_number.as_deref(),
            base.map(|b| b.house_number.as_str()),
            HOUSE_NUMBER_MAX_LEN,
        );
        let location = text(&mut errors, "location", payload.location.as_deref(), base.map(|b| b.location.as_str()), LOCATION_MAX_LEN);
        let postcode = text(&mut errors, "postcode", payload.postcode.as_deref(), base.map(|b| b.postcode.as_str()), POSTCODE_MAX_LEN);
        errors.into_result()?;
        match (street, house_number, location, postcode) {
            (Some(street), Some(house_number), Some(location), Some(postcode)) => Ok(AddressValue {
                street,
                house_number,
                location,
                postcode,
            }),
            _ => Err(AppError::Internal("address fields missing after validation".into())),
        }
    }

    /// Build a complete opening-hours value. `isClosed` / `isSpecialTime` default to false.
    /// Closing time must be strictly after opening time, whether or not the day is closed.
    pub fn opening_hours(
        payload: &OpeningHoursPayload,
        base: Option<&OpeningHours>,
    ) -> Result<OpeningHoursValue, AppError> {
        let mut errors = FieldErrors::new();
        let day_of_week = match (payload.day_of_week, base) {
            (Some(day), _) => day_choice(&mut errors, day),
            (None, Some(b)) => Some(b.day_of_week),
            (None, None) => {
                errors.add("dayOfWeek", REQUIRED);
                None
            }
        };
        let opening_time = time(&mut errors, "openingTime", payload.opening_time.as_deref(), base.map(|b| b.opening_time));
        let closing_time = time(&mut errors, "closingTime", payload.closing_time.as_deref(), base.map(|b| b.closing_time));
        let is_closed = payload.is_closed.or(base.map(|b| b.is_closed)).unwrap_or(false);
        let is_special_time = payload
            .is_special_time
            .or(base.map(|b| b.is_special_time))
            .unwrap_or(false);
        errors.into_result()?;
        match (day_of_week, opening_time, closing_time) {
            (Some(day_of_week), Some(opening_time), Some(closing_time)) => {
                if closing_time <= opening_time {
                    return Err(AppError::invalid(NON_FIELD_ERRORS, CLOSING_AFTER_OPENING));
                }
                Ok(OpeningHoursValue {
                    day_of_week,
                    opening_time,
                    closing_time,
                    is_closed,
                    is_special_time,
                })
            }
            _ => Err(AppError::Internal("opening hours fields missing after validation".into())),
        }
    }

    /// Store name: required, non-blank, bounded.
    pub fn store_name(name: Option<&str>) -> Result<String, AppError> {
        let mut errors = FieldErrors::new();
        let name = text(&mut errors, "name", name, None, STORE_NAME_MAX_LEN);
        errors.into_result()?;
        name.ok_or_else(|| AppError::Internal("store name missing after validation".into()))
    }

    /// Parse a supplied time field for comparison against a stored value.
    pub fn supplied_time(field: &str, raw: Option<&str>) -> Result<Option<NaiveTime>, AppError> {
        match raw {
            None => Ok(None),
            Some(raw) => parse_time(raw)
                .map(Some)
                .ok_or_else(|| AppError::invalid(field, TIME_FORMAT)),
        }
    }
}

fn text(errors: &mut FieldErrors, field: &str, value: Option<&str>, base: Option<&str>, max: usize) -> Option<String> {
    let Some(v) = value else {
        if base.is_none() {
            errors.add(field, REQUIRED);
        }
        return base.map(str::to_string);
    };
    let v = v.trim();
    if v.is_empty() {
        errors.add(field, BLANK);
        return None;
    }
    if v.chars().count() > max {
        errors.add(field, format!("Ensure this field has no more than {} characters.", max));
        return None;
    }
    Some(v.to_string())
}

fn day_choice(errors: &mut FieldErrors, day: i64) -> Option<i16> {
    let found = DAYS_OF_WEEK.iter().find(|(d, _)| i64::from(*d) == day).map(|(d, _)| *d);
    if found.is_none() {
        errors.add("dayOfWeek", format!("\"{}\" is not a valid choice.", day));
    }
    found
}

fn time(errors: &mut FieldErrors, field: &str, raw: Option<&str>, base: Option<NaiveTime>) -> Option<NaiveTime> {
    match raw {
        Some(raw) => {
            let parsed = parse_time(raw);
            if parsed.is_none() {
                errors.add(field, TIME_FORMAT);
            }
            parsed
        }
        None => {
            if base.is_none() {
                errors.add(field, REQUIRED);
            }
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn address_payload() -> AddressPayload {
        AddressPayload {
            id: None,
            street: Some("Test Street".into()),
            house_number: Some("123".into()),
            location: Some("Test City".into()),
            postcode: Some("12345".into()),
        }
    }

    fn field_errors(err: AppError) -> FieldErrors {
        match err {
            AppError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn parse_time_accepts_minutes_seconds_and_fractions() {
        assert_eq!(parse_time("08:00"), Some(hm(8, 0)));
        assert_eq!(parse_time("17:30:00"), Some(hm(17, 30)));
        assert!(parse_time("09:15:00.250000").is_some());
        assert_eq!(parse_time("50:00"), None);
        assert_eq!(parse_time("eight"), None);
    }

    #[test]
    fn complete_address_is_accepted() {
        let value = RequestValidator::address(&address_payload(), None).unwrap();
        assert_eq!(value.street, "Test Street");
        assert_eq!(value.postcode, "12345");
    }

    #[test]
    fn address_reports_every_bad_field() {
        let mut payload = address_payload();
        payload.street = None;
        payload.house_number = Some("55555555555555555".into());
        payload.location = Some("   ".into());
        let errors = field_errors(RequestValidator::address(&payload, None).unwrap_err());
        assert_eq!(errors.get("street"), Some(&[REQUIRED.to_string()][..]));
        assert_eq!(
            errors.get("houseNumber"),
            Some(&["Ensure this field has no more than 10 characters.".to_string()][..])
        );
        assert_eq!(errors.get("location"), Some(&[BLANK.to_string()][..]));
        assert!(errors.get("postcode").is_none());
    }

    #[test]
    fn text_fields_are_stored_trimmed() {
        let mut payload = address_payload();
        payload.street = Some("  Main Street ".into());
        payload.postcode = Some(" 1234567890 ".into());
        let value = RequestValidator::address(&payload, None).unwrap();
        assert_eq!(value.street, "Main Street");
        assert_eq!(value.postcode, "1234567890");
        assert_eq!(RequestValidator::store_name(Some(" Corner ")).unwrap(), "Corner");
    }

    #[test]
    fn partial_address_falls_back_to_base() {
        let base = Address {
            id: 1,
            street: "Old".into(),
            house_number: "1".into(),
            location: "Town".into(),
            postcode: "999".into(),
        };
        let payload = AddressPayload {
            street: Some("New".into()),
            ..Default::default()
        };
        let value = RequestValidator::address(&payload, Some(&base)).unwrap();
        assert_eq!(value.street, "New");
        assert_eq!(value.location, "Town");
    }

    #[test]
    fn opening_hours_defaults_flags_and_orders_times() {
        let payload = OpeningHoursPayload {
            day_of_week: Some(1),
            opening_time: Some("08:00".into()),
            closing_time: Some("17:00".into()),
            ..Default::default()
        };
        let value = RequestValidator::opening_hours(&payload, None).unwrap();
        assert_eq!(value.day_of_week, 1);
        assert!(!value.is_closed);
        assert!(!value.is_special_time);
        assert_eq!(value.closing_time, hm(17, 0));
    }

    #[test]
    fn closing_before_opening_is_rejected_even_when_closed() {
        let payload = OpeningHoursPayload {
            day_of_week: Some(1),
            opening_time: Some("17:00".into()),
            closing_time: Some("08:00".into()),
            is_closed: Some(true),
            ..Default::default()
        };
        let errors = field_errors(RequestValidator::opening_hours(&payload, None).unwrap_err());
        assert_eq!(errors.get(NON_FIELD_ERRORS), Some(&[CLOSING_AFTER_OPENING.to_string()][..]));

        let equal = OpeningHoursPayload {
            closing_time: Some("17:00".into()),
            ..payload
        };
        assert!(RequestValidator::opening_hours(&equal, None).is_err());
    }

    #[test]
    fn bad_day_and_time_are_field_errors() {
        let payload = OpeningHoursPayload {
            day_of_week: Some(10),
            opening_time: Some("50:00".into()),
            closing_time: None,
            ..Default::default()
        };
        let errors = field_errors(RequestValidator::opening_hours(&payload, None).unwrap_err());
        assert_eq!(errors.get("dayOfWeek"), Some(&["\"10\" is not a valid choice.".to_string()][..]));
        assert_eq!(errors.get("openingTime"), Some(&[TIME_FORMAT.to_string()][..]));
        assert_eq!(errors.get("closingTime"), Some(&[REQUIRED.to_string()][..]));
    }

    #[test]
    fn merged_opening_hours_check_order_against_stored_times() {
        let base = OpeningHours {
            id: 2,
            day_of_week: 3,
            opening_time: hm(9, 0),
            closing_time: hm(12, 0),
            is_closed: false,
            is_special_time: false,
        };
        let later_opening = OpeningHoursPayload {
            opening_time: Some("13:00".into()),
            ..Default::default()
        };
        assert!(RequestValidator::opening_hours(&later_opening, Some(&base)).is_err());

        let special = OpeningHoursPayload {
            is_special_time: Some(true),
            ..Default::default()
        };
        let value = RequestValidator::opening_hours(&special, Some(&base)).unwrap();
        assert!(value.is_special_time);
        assert_eq!(value.day_of_week, 3);
    }

    #[test]
    fn store_name_rules() {
        assert_eq!(RequestValidator::store_name(Some("Corner Shop")).unwrap(), "Corner Shop");
        assert!(RequestValidator::store_name(None).is_err());
        assert!(RequestValidator::store_name(Some("")).is_err());
        let long = "x".repeat(151);
        assert!(RequestValidator::store_name(Some(&long)).is_err());
    }
}
