//! Builds parameterized list queries (filter, search, order, page) from static table
//! descriptions. Identifiers only ever come from those descriptions; values are
//! always bound parameters.

use crate::query::{FieldValue, ListQuery, SortKey};

/// Quote identifier for PostgreSQL (safe: only from static table descriptions).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

const MAIN_ALIAS: &str = "main";

/// Where a wire field lives in the database.
#[derive(Clone, Copy, Debug)]
pub enum ColumnRef {
    /// Column on the listed table itself.
    Own(&'static str),
    /// Column of a record reached through an association table keyed by the listed row's id.
    Via {
        link: &'static str,
        owner_fk: &'static str,
        target: &'static str,
        target_fk: &'static str,
        column: &'static str,
    },
}

pub struct TableDef {
    pub table: &'static str,
    /// Select list, qualified with the `main` alias.
    pub select: &'static str,
    pub columns: &'static [(&'static str, ColumnRef)],
}

impl TableDef {
    fn column(&self, field: &str) -> Option<ColumnRef> {
        self.columns.iter().find(|(name, _)| *name == field).map(|(_, c)| *c)
    }
}

pub const ADDRESS_TABLE: TableDef = TableDef {
    table: "address",
    select: "main.id, main.street, main.house_number, main.location, main.postcode",
    columns: &[
        ("id", ColumnRef::Own("id")),
        ("street", ColumnRef::Own("street")),
        ("houseNumber", ColumnRef::Own("house_number")),
        ("location", ColumnRef::Own("location")),
        ("postcode", ColumnRef::Own("postcode")),
    ],
};

pub const OPENING_HOURS_TABLE: TableDef = TableDef {
    table: "opening_hours",
    select: "main.id, main.day_of_week, main.opening_time, main.closing_time, main.is_closed, main.is_special_time",
    columns: &[
        ("id", ColumnRef::Own("id")),
        ("dayOfWeek", ColumnRef::Own("day_of_week")),
        ("openingTime", ColumnRef::Own("opening_time")),
        ("closingTime", ColumnRef::Own("closing_time")),
        ("isClosed", ColumnRef::Own("is_closed")),
        ("isSpecialTime", ColumnRef::Own("is_special_time")),
    ],
};

const fn via_address(column: &'static str) -> ColumnRef {
    ColumnRef::Via {
        link: "store_address",
        owner_fk: "store_id",
        target: "address",
        target_fk: "address_id",
        column,
    }
}

const fn via_opening_hours(column: &'static str) -> ColumnRef {
    ColumnRef::Via {
        link: "store_opening_hours",
        owner_fk: "store_id",
        target: "opening_hours",
        target_fk: "opening_hours_id",
        column,
    }
}

pub const STORE_TABLE: TableDef = TableDef {
    table: "store",
    select: "main.id, main.name",
    columns: &[
        ("id", ColumnRef::Own("id")),
        ("name", ColumnRef::Own("name")),
        ("address__street", via_address("street")),
        ("address__location", via_address("location")),
        ("address__postcode", via_address("postcode")),
        ("address__id", via_address("id")),
        ("openingHours__dayOfWeek", via_opening_hours("day_of_week")),
        ("openingHours__id", via_opening_hours("id")),
    ],
};

#[derive(Clone, Debug, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: FieldValue) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// Page query and its matching COUNT query (same WHERE, same parameters).
pub struct ListSql {
    pub select: QueryBuf,
    pub count: QueryBuf,
}

/// `FROM link l JOIN target t ... WHERE l.owner = main.id` for a `Via` column.
fn via_from(link: &str, owner_fk: &str, target: &str, target_fk: &str) -> String {
    format!(
        "FROM {} l JOIN {} t ON t.\"id\" = l.{} WHERE l.{} = {}.\"id\"",
        quoted(link),
        quoted(target),
        quoted(target_fk),
        quoted(owner_fk),
        MAIN_ALIAS
    )
}

/// Predicate `<col> <op> $n`, looking through the association for `Via` columns.
fn predicate(col: ColumnRef, op: &str, param: u32, as_text: bool) -> String {
    let wrap = |e: String| if as_text { format!("CAST({} AS TEXT)", e) } else { e };
    match col {
        ColumnRef::Own(c) => format!("{} {} ${}", wrap(format!("{}.{}", MAIN_ALIAS, quoted(c))), op, param),
        ColumnRef::Via {
            link,
            owner_fk,
            target,
            target_fk,
            column,
        } => format!(
            "EXISTS (SELECT 1 {} AND {} {} ${})",
            via_from(link, owner_fk, target, target_fk),
            wrap(format!("t.{}", quoted(column))),
            op,
            param
        ),
    }
}

fn order_expr(col: ColumnRef) -> String {
    match col {
        ColumnRef::Own(c) => format!("{}.{}", MAIN_ALIAS, quoted(c)),
        ColumnRef::Via {
            link,
            owner_fk,
            target,
            target_fk,
            column,
        } => format!(
            "(SELECT MIN(t.{}) {})",
            quoted(column),
            via_from(link, owner_fk, target, target_fk)
        ),
    }
}

fn where_clause(def: &TableDef, query: &ListQuery, q: &mut QueryBuf) -> String {
    let mut parts = Vec::new();
    for (field, value) in &query.filters {
        if let Some(col) = def.column(field) {
            let n = q.push_param(value.clone());
            parts.push(predicate(col, "=", n, false));
        }
    }
    for pattern in query.search_patterns() {
        let n = q.push_param(FieldValue::Text(pattern));
        let any: Vec<String> = def
            .columns
            .iter()
            .map(|(_, col)| predicate(*col, "ILIKE", n, true))
            .collect();
        parts.push(format!("({})", any.join(" OR ")));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn order_clause(def: &TableDef, ordering: &[SortKey]) -> String {
    let mut parts: Vec<String> = ordering
        .iter()
        .filter_map(|key| {
            def.column(key.field).map(|col| {
                let dir = if key.descending { "DESC" } else { "ASC" };
                format!("{} {} NULLS LAST", order_expr(col), dir)
            })
        })
        .collect();
    parts.push(format!("{}.\"id\" ASC", MAIN_ALIAS));
    parts.join(", ")
}

/// SELECT page with filters (exact match), search (ILIKE on every field), ordering
/// (then id), LIMIT/OFFSET from the query; plus the COUNT over the same WHERE.
pub fn select_list(def: &TableDef, query: &ListQuery) -> ListSql {
    let mut q = QueryBuf::new();
    let table = quoted(def.table);
    let where_sql = where_clause(def, query, &mut q);
    let count = QueryBuf {
        sql: format!("SELECT COUNT(*) FROM {} {}{}", table, MAIN_ALIAS, where_sql),
        params: q.params.clone(),
    };
    q.sql = format!(
        "SELECT {} FROM {} {}{} ORDER BY {} LIMIT {} OFFSET {}",
        def.select,
        table,
        MAIN_ALIAS,
        where_sql,
        order_clause(def, &query.ordering),
        query.page_size,
        query.offset()
    );
    ListSql { select: q, count }
}
