//! List query parameters: pagination, search, exact-match filters and ordering.

use crate::error::AppError;
use crate::service::validation::parse_time;
use chrono::NaiveTime;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Text,
    Time,
    Bool,
}

/// A wire field that can be searched, filtered and ordered on.
#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, kind }
}

pub const ADDRESS_FIELDS: &[FieldSpec] = &[
    field("street", FieldKind::Text),
    field("location", FieldKind::Text),
    field("postcode", FieldKind::Text),
    field("houseNumber", FieldKind::Text),
    field("id", FieldKind::Int),
];

pub const OPENING_HOURS_FIELDS: &[FieldSpec] = &[
    field("dayOfWeek", FieldKind::Int),
    field("openingTime", FieldKind::Time),
    field("closingTime", FieldKind::Time),
    field("isClosed", FieldKind::Bool),
    field("isSpecialTime", FieldKind::Bool),
    field("id", FieldKind::Int),
];

/// `a__b` fields look through the store's associations.
pub const STORE_FIELDS: &[FieldSpec] = &[
    field("name", FieldKind::Text),
    field("address__street", FieldKind::Text),
    field("address__location", FieldKind::Text),
    field("address__postcode", FieldKind::Text),
    field("openingHours__dayOfWeek", FieldKind::Int),
    field("address__id", FieldKind::Int),
    field("openingHours__id", FieldKind::Int),
    field("id", FieldKind::Int),
];

/// A typed field value, used both for filter arguments and for reading row fields.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Text(String),
    Time(NaiveTime),
    Bool(bool),
}

impl FieldValue {
    /// Text form used by substring search.
    pub fn search_text(&self) -> String {
        match self {
            FieldValue::Int(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Time(t) => t.to_string(),
            FieldValue::Bool(b) => b.to_string(),
        }
    }

    /// Same-kind comparison; mixed kinds compare equal.
    pub fn compare(&self, other: &FieldValue) -> CmpOrdering {
        match (self, other) {
            (FieldValue::Int(a), FieldValue::Int(b)) => a.cmp(b),
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Time(a), FieldValue::Time(b)) => a.cmp(b),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            _ => CmpOrdering::Equal,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub field: &'static str,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListQuery {
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    /// Every term must match at least one searchable field.
    pub search: Vec<String>,
    pub filters: Vec<(&'static str, FieldValue)>,
    pub ordering: Vec<SortKey>,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            search: Vec::new(),
            filters: Vec::new(),
            ordering: Vec::new(),
        }
    }
}

impl ListQuery {
    /// Parse query-string parameters against the entity's field set.
    /// Unknown parameters and unknown ordering fields are ignored.
    pub fn parse(params: &HashMap<String, String>, fields: &'static [FieldSpec]) -> Result<Self, AppError> {
        let mut query = ListQuery::default();
        let mut filters: Vec<(&'static str, FieldValue)> = Vec::new();

        for (k, v) in params {
            match k.as_str() {
                "page" => {
                    query.page = v
                        .parse()
                        .ok()
                        .filter(|p: &u32| *p >= 1)
                        .ok_or_else(|| AppError::NotFound("invalid page".into()))?;
                }
                "page_size" => {
                    if let Some(size) = v.parse::<u32>().ok().filter(|s| *s >= 1) {
                        query.page_size = size.min(MAX_PAGE_SIZE);
                    }
                }
                "search" => {
                    query.search = v
                        .split(|c: char| c.is_whitespace() || c == ',')
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect();
                }
                "ordering" => {
                    query.ordering = parse_ordering(v, fields);
                }
                _ => {
                    if let Some(spec) = fields.iter().find(|f| f.name == k) {
                        filters.push((spec.name, parse_value(spec, v)?));
                    }
                }
            }
        }
        // HashMap iteration order is arbitrary; keep filters stable for SQL generation.
        filters.sort_by(|a, b| a.0.cmp(b.0));
        query.filters = filters;
        Ok(query)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Escaped `%term%` patterns for `ILIKE`.
    pub fn search_patterns(&self) -> Vec<String> {
        self.search
            .iter()
            .map(|t| {
                let escaped = t.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
                format!("%{}%", escaped)
            })
            .collect()
    }
}

fn parse_ordering(raw: &str, fields: &'static [FieldSpec]) -> Vec<SortKey> {
    raw.split(',')
        .map(str::trim)
        .filter_map(|term| {
            let (name, descending) = match term.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (term, false),
            };
            fields
                .iter()
                .find(|f| f.name == name)
                .map(|f| SortKey { field: f.name, descending })
        })
        .collect()
}

fn parse_value(spec: &FieldSpec, raw: &str) -> Result<FieldValue, AppError> {
    match spec.kind {
        FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
        FieldKind::Int => raw
            .trim()
            .parse()
            .map(FieldValue::Int)
            .map_err(|_| AppError::invalid(spec.name, "Enter a number.")),
        FieldKind::Time => parse_time(raw.trim())
            .map(FieldValue::Time)
            .ok_or_else(|| AppError::invalid(spec.name, "Enter a valid time.")),
        FieldKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(FieldValue::Bool(true)),
            "false" | "0" => Ok(FieldValue::Bool(false)),
            _ => Err(AppError::invalid(spec.name, "Select a valid choice.")),
        },
    }
}
