use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Sentinel accepted as a date column default, resolved to the creation timestamp.
pub const NOW_SENTINEL: &str = "now";

/// Definition of a single column, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnDescriptor {
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<u32>,
        #[serde(default, skip_serializing_if = "is_false")]
        unique: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        identifier: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    Number {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<u32>,
        #[serde(default, skip_serializing_if = "is_false")]
        unique: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        identifier: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<serde_json::Number>,
    },
    Boolean {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<u32>,
        #[serde(default, skip_serializing_if = "is_false")]
        unique: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        identifier: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<bool>,
    },
    Date {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        length: Option<u32>,
        #[serde(default, skip_serializing_if = "is_false")]
        unique: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        identifier: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<DateDefault>,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Column type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Number,
    Boolean,
    Date,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::String => "string",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
        };
        f.write_str(name)
    }
}

impl ColumnDescriptor {
    pub fn string() -> Self {
        ColumnDescriptor::String {
            length: None,
            unique: false,
            identifier: false,
            default: None,
        }
    }

    pub fn number() -> Self {
        ColumnDescriptor::Number {
            length: None,
            unique: false,
            identifier: false,
            default: None,
        }
    }

    pub fn boolean() -> Self {
        ColumnDescriptor::Boolean {
            length: None,
            unique: false,
            identifier: false,
            default: None,
        }
    }

    pub fn date() -> Self {
        ColumnDescriptor::Date {
            length: None,
            unique: false,
            identifier: false,
            default: None,
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            ColumnDescriptor::String { .. } => ColumnType::String,
            ColumnDescriptor::Number { .. } => ColumnType::Number,
            ColumnDescriptor::Boolean { .. } => ColumnType::Boolean,
            ColumnDescriptor::Date { .. } => ColumnType::Date,
        }
    }

    pub fn length(&self) -> Option<u32> {
        match self {
            ColumnDescriptor::String { length, .. }
            | ColumnDescriptor::Number { length, .. }
            | ColumnDescriptor::Boolean { length, .. }
            | ColumnDescriptor::Date { length, .. } => *length,
        }
    }

    pub fn is_unique(&self) -> bool {
        match self {
            ColumnDescriptor::String { unique, .. }
            | ColumnDescriptor::Number { unique, .. }
            | ColumnDescriptor::Boolean { unique, .. }
            | ColumnDescriptor::Date { unique, .. } => *unique,
        }
    }

    pub fn is_identifier(&self) -> bool {
        match self {
            ColumnDescriptor::String { identifier, .. }
            | ColumnDescriptor::Number { identifier, .. }
            | ColumnDescriptor::Boolean { identifier, .. }
            | ColumnDescriptor::Date { identifier, .. } => *identifier,
        }
    }

    /// The value this column takes when a record omits it, if any.
    /// `now` is the timestamp substituted for the `"now"` sentinel.
    pub fn default_value(&self, now: DateTime<Utc>) -> Option<Value> {
        match self {
            ColumnDescriptor::String { default, .. } => default.clone().map(Value::String),
            ColumnDescriptor::Number { default, .. } => default.clone().map(Value::Number),
            ColumnDescriptor::Boolean { default, .. } => default.map(Value::Bool),
            ColumnDescriptor::Date { default, .. } => default
                .as_ref()
                .map(|d| Value::String(format_timestamp(d.resolve(now)))),
        }
    }

    /// Builder-style setters used when declaring schemas in code.
    pub fn with_length(mut self, value: u32) -> Self {
        match &mut self {
            ColumnDescriptor::String { length, .. }
            | ColumnDescriptor::Number { length, .. }
            | ColumnDescriptor::Boolean { length, .. }
            | ColumnDescriptor::Date { length, .. } => *length = Some(value),
        }
        self
    }

    pub fn unique(mut self) -> Self {
        match &mut self {
            ColumnDescriptor::String { unique, .. }
            | ColumnDescriptor::Number { unique, .. }
            | ColumnDescriptor::Boolean { unique, .. }
            | ColumnDescriptor::Date { unique, .. } => *unique = true,
        }
        self
    }

    pub fn identifier(mut self) -> Self {
        match &mut self {
            ColumnDescriptor::String { identifier, .. }
            | ColumnDescriptor::Number { identifier, .. }
            | ColumnDescriptor::Boolean { identifier, .. }
            | ColumnDescriptor::Date { identifier, .. } => *identifier = true,
        }
        self
    }

    /// Sets a date column's default. Has no effect on other column types.
    pub fn with_date_default(mut self, value: DateDefault) -> Self {
        if let ColumnDescriptor::Date { default, .. } = &mut self {
            *default = Some(value);
        }
        self
    }
}

/// Default for a date column: the creation time, or a fixed instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateDefault {
    Now,
    At(DateTime<Utc>),
}

impl DateDefault {
    pub fn resolve(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DateDefault::Now => now,
            DateDefault::At(at) => *at,
        }
    }
}

impl TryFrom<String> for DateDefault {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == NOW_SENTINEL {
            return Ok(DateDefault::Now);
        }
        DateTime::parse_from_rfc3339(&value)
            .map(|dt| DateDefault::At(dt.with_timezone(&Utc)))
            .map_err(|e| format!("invalid date default '{value}': {e}"))
    }
}

impl From<DateDefault> for String {
    fn from(value: DateDefault) -> Self {
        match value {
            DateDefault::Now => NOW_SENTINEL.to_string(),
            DateDefault::At(at) => format_timestamp(at),
        }
    }
}

/// Canonical text form of a stored date: RFC 3339, millisecond precision, `Z` suffix.
/// Sorting these strings sorts the instants.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A table's schema: column name to descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    columns: BTreeMap<String, ColumnDescriptor>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Builder-style insert, used when declaring schemas in code.
    pub fn column(mut self, name: impl Into<String>, descriptor: ColumnDescriptor) -> Self {
        self.columns.insert(name.into(), descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, descriptor: ColumnDescriptor) {
        self.columns.insert(name.into(), descriptor);
    }

    pub fn remove(&mut self, name: &str) -> Option<ColumnDescriptor> {
        self.columns.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnDescriptor)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Apply a change: columns in `add` that are not yet declared are added,
    /// existing columns are left untouched, then every column in `remove` is dropped.
    pub fn merge(&mut self, change: &SchemaChange) {
        for (name, descriptor) in &change.add.columns {
            self.columns
                .entry(name.clone())
                .or_insert_with(|| descriptor.clone());
        }
        for name in &change.remove {
            self.columns.remove(name);
        }
    }

    /// Default values for every column that declares one.
    pub fn defaults(&self, now: DateTime<Utc>) -> serde_json::Map<String, Value> {
        self.columns
            .iter()
            .filter_map(|(name, d)| d.default_value(now).map(|v| (name.clone(), v)))
            .collect()
    }
}

/// A schema write: columns to add and column names to remove.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaChange {
    pub add: Schema,
    pub remove: BTreeSet<String>,
}

impl SchemaChange {
    pub fn add(schema: Schema) -> Self {
        SchemaChange {
            add: schema,
            remove: BTreeSet::new(),
        }
    }

    pub fn removing<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove.extend(columns.into_iter().map(Into::into));
        self
    }
}
