//! Turns raw listing query parameters into a typed [`Retrieval`].
//!
//! ```text
//! ?price[gte]=100&difficulty=easy&sort=-price,name&fields=name,price&page=2&limit=5
//! ```
//!
//! Stages run in order `filter → sort → limit_fields → paginate`; each one is
//! optional. Nothing here touches the database: a [`Retrieval`] is executed by
//! a document store.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Number, Value};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::{
    error::{AppError, AppResult},
    resources::Collection,
};

mod sql;

pub type RawParams = HashMap<String, String>;

pub const ID_FIELD: &str = "id";
pub const CREATED_AT_FIELD: &str = "createdAt";
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 100;

const RESERVED: [&str; 4] = ["page", "sort", "limit", "fields"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Comparison {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    fn from_suffix(op: &str) -> Option<Self> {
        match op {
            "gt" => Some(Self::Gt),
            "gte" => Some(Self::Gte),
            "lt" => Some(Self::Lt),
            "lte" => Some(Self::Lte),
            _ => None,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub op: Comparison,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: Direction::Desc,
        }
    }
}

/// Which fields of each document to return. `id` always survives.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    Include(BTreeSet<String>),
    Exclude(BTreeSet<String>),
}

impl Projection {
    pub fn apply(&self, doc: Value) -> Value {
        let Value::Object(map) = doc else {
            return doc;
        };
        let kept: Map<String, Value> = match self {
            Projection::All => map,
            Projection::Include(fields) => map
                .into_iter()
                .filter(|(k, _)| k == ID_FIELD || fields.contains(k))
                .collect(),
            Projection::Exclude(fields) => map
                .into_iter()
                .filter(|(k, _)| k == ID_FIELD || !fields.contains(k))
                .collect(),
        };
        Value::Object(kept)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub fn skip(&self) -> u64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Typed form of the listing parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QuerySpec {
    pub filters: BTreeMap<String, Vec<Condition>>,
    /// Empty means storage order.
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    /// `None` means unpaginated.
    pub page: Option<Page>,
}

/// A shaped, not yet executed, read over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    pub collection: Collection,
    pub spec: QuerySpec,
}

/// Runs all four stages.
pub fn build(base: Retrieval, params: &RawParams) -> AppResult<Retrieval> {
    Ok(base
        .filter(params)?
        .sort(params)
        .limit_fields(params)?
        .paginate(params))
}

lazy_static! {
    static ref OPERATOR_KEY: Regex = Regex::new(r"^(?P<field>[^\[\]]+)\[(?P<op>[a-z]+)\]$").unwrap();
}

/// Numbers and booleans are typed; everything else stays a string.
fn parse_scalar(raw: &str) -> Value {
    let trimmed = raw.trim();
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    match trimmed {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// `createdAt` conditions must name an instant: epoch seconds or RFC 3339.
fn timestamp_value(raw: &str, value: Value) -> AppResult<Value> {
    if value.is_number() {
        return Ok(value);
    }
    let trimmed = raw.trim();
    OffsetDateTime::parse(trimmed, &Rfc3339)
        .map(|_| Value::String(trimmed.to_string()))
        .map_err(|_| {
            AppError::validation(format!("invalid {CREATED_AT_FIELD} value: {raw}"))
        })
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn positive(params: &RawParams, key: &str, default: u64) -> u64 {
    params
        .get(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

impl Retrieval {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            spec: QuerySpec::default(),
        }
    }

    /// Every non-reserved key becomes a condition; `field[gt|gte|lt|lte]`
    /// keys become range conditions, anything else is an equality on the key
    /// as written. `createdAt` values that are not timestamps are rejected.
    pub fn filter(mut self, params: &RawParams) -> AppResult<Self> {
        for (key, raw) in params {
            if RESERVED.contains(&key.as_str()) {
                continue;
            }
            let (field, op) = match OPERATOR_KEY.captures(key) {
                Some(caps) => match Comparison::from_suffix(&caps["op"]) {
                    Some(op) => (caps["field"].to_string(), op),
                    None => (key.clone(), Comparison::Eq),
                },
                None => (key.clone(), Comparison::Eq),
            };
            let value = match field.as_str() {
                CREATED_AT_FIELD => timestamp_value(raw, parse_scalar(raw))?,
                _ => parse_scalar(raw),
            };
            let conditions = self.spec.filters.entry(field).or_default();
            conditions.push(Condition { op, value });
            conditions.sort_by_key(|c| c.op);
        }
        Ok(self)
    }

    /// `sort=-price,name`; newest first when absent.
    pub fn sort(mut self, params: &RawParams) -> Self {
        let keys: Vec<SortKey> = params
            .get("sort")
            .map(|raw| {
                split_list(raw)
                    .filter_map(|item| match item.strip_prefix('-') {
                        Some("") => None,
                        Some(field) => Some(SortKey::desc(field)),
                        None => Some(SortKey {
                            field: item.to_string(),
                            direction: Direction::Asc,
                        }),
                    })
                    .collect()
            })
            .unwrap_or_default();
        self.spec.sort = if keys.is_empty() {
            vec![SortKey::desc(CREATED_AT_FIELD)]
        } else {
            keys
        };
        self
    }

    /// `fields=name,price` keeps only those (plus `id`); `fields=-secret`
    /// drops those. Mixing both forms is rejected.
    pub fn limit_fields(mut self, params: &RawParams) -> AppResult<Self> {
        let Some(raw) = params.get("fields") else {
            return Ok(self);
        };
        let mut include = BTreeSet::new();
        let mut exclude = BTreeSet::new();
        for item in split_list(raw) {
            match item.strip_prefix('-') {
                Some(field) if !field.is_empty() => {
                    exclude.insert(field.to_string());
                }
                Some(_) => {}
                None => {
                    include.insert(item.to_string());
                }
            }
        }
        exclude.remove(ID_FIELD);
        self.spec.projection = match (include.is_empty(), exclude.is_empty()) {
            (true, true) => Projection::All,
            (false, true) => {
                include.insert(ID_FIELD.to_string());
                Projection::Include(include)
            }
            (true, false) => Projection::Exclude(exclude),
            (false, false) => {
                return Err(AppError::validation(
                    "fields cannot mix included and excluded fields",
                ));
            }
        };
        Ok(self)
    }

    /// `page` and `limit` as positive integers, defaulting to 1 and 100.
    pub fn paginate(mut self, params: &RawParams) -> Self {
        self.spec.page = Some(Page {
            page: positive(params, "page", DEFAULT_PAGE),
            limit: positive(params, "limit", DEFAULT_LIMIT),
        });
        self
    }
}
