mod operator;

pub use operator::{Direction, Operator};

use crate::document::{self, Record};
use crate::error::{FolderDbError, Result};
use crate::schema::Schema;
use crate::store::Database;
use crate::validation::ID_COLUMN;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;

/// A single `where` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub operator: Operator,
    pub value: Value,
}

impl Predicate {
    pub fn matches(&self, record: &Record) -> bool {
        let stored = record.get(&self.column).unwrap_or(&Value::Null);
        self.operator.evaluate(stored, &self.value)
    }
}

/// A join attached to a query.
/// With a `column` it follows that column's value to a record id in `table`;
/// without one it reads the link table `<source>-<table>` by `<source>Id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    pub column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum Projection {
    #[default]
    All,
    Columns(Vec<String>),
}

/// Fluent query over one table. Directives accumulate; nothing touches storage
/// until [`Query::get`] runs.
///
/// ```no_run
/// # fn demo(db: &folderdb::Database) -> folderdb::Result<()> {
/// use folderdb::Direction;
///
/// let adults = db
///     .for_read("users")
///     .filter("age", ">", 18)
///     .order_by("name", Direction::Asc)
///     .limit(10)
///     .join("roles", Some("roleId"))
///     .get()?;
/// # let _ = adults;
/// # Ok(())
/// # }
/// ```
pub struct Query<'a> {
    db: &'a Database,
    table: String,
    predicates: Vec<Predicate>,
    order: Option<(String, Direction)>,
    limit: Option<usize>,
    projection: Projection,
    joins: Vec<Join>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(db: &'a Database, table: &str) -> Self {
        Query {
            db,
            table: table.to_string(),
            predicates: Vec::new(),
            order: None,
            limit: None,
            projection: Projection::All,
            joins: Vec::new(),
        }
    }

    /// Add a predicate. All predicates must hold for a record to match.
    pub fn filter(
        &mut self,
        column: impl Into<String>,
        operator: impl Into<Operator>,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.predicates.push(Predicate {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
        });
        self
    }

    /// Sort by the string form of `column`.
    pub fn order_by(&mut self, column: impl Into<String>, direction: Direction) -> &mut Self {
        self.order = Some((column.into(), direction));
        self
    }

    /// Keep at most `n` rows. Applied after sorting and before joins.
    /// `limit(0)` yields no rows; leave the limit unset to return everything.
    pub fn limit(&mut self, n: usize) -> &mut Self {
        self.limit = Some(n);
        self
    }

    /// Project rows down to the named columns. No names, or the single name `*`,
    /// selects every column.
    pub fn columns<I, S>(&mut self, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        self.projection = if names.is_empty() || names == ["*"] {
            Projection::All
        } else {
            Projection::Columns(names)
        };
        self
    }

    /// Attach matching rows from another table under a key named after `table`.
    pub fn join(&mut self, table: impl Into<String>, column: Option<&str>) -> &mut Self {
        self.joins.push(Join {
            table: table.into(),
            column: column.map(str::to_string),
        });
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// Execute the query.
    pub fn get(&self) -> Result<Vec<Record>> {
        let dir = self.db.table_dir(&self.table)?;
        let schema = self.db.schemas().read(&self.table)?;
        let candidates = document::list_record_ids(&dir)?;

        if let Projection::Columns(columns) = &self.projection {
            self.check_projection(columns, &schema)?;
            if candidates.is_empty() {
                return Ok(Vec::new());
            }
        }

        let mut rows = self.load(&dir, &candidates)?;

        if let Some((column, direction)) = &self.order {
            rows.sort_by(|a, b| {
                let ordering =
                    operator::sort_key(a.get(column)).cmp(&operator::sort_key(b.get(column)));
                match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }

        for join in &self.joins {
            rows = self.resolve_join(join, rows)?;
        }

        if let Projection::Columns(columns) = &self.projection {
            rows = rows
                .into_iter()
                .map(|row| project(row, columns))
                .collect();
        }

        log::debug!(
            "Query on '{}' scanned {} records, returned {}",
            self.table,
            candidates.len(),
            rows.len()
        );
        Ok(rows)
    }

    /// Execute the query and deserialize each row.
    pub fn get_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.get()?
            .into_iter()
            .map(|row| serde_json::from_value(Value::Object(row)).map_err(FolderDbError::from))
            .collect()
    }

    fn check_projection(&self, columns: &[String], schema: &Schema) -> Result<()> {
        let invalid: Vec<String> = columns
            .iter()
            .filter(|c| {
                c.as_str() != ID_COLUMN
                    && !schema.contains(c)
                    && !self.joins.iter().any(|j| &j.table == *c)
            })
            .cloned()
            .collect();
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(FolderDbError::InvalidColumns(invalid))
        }
    }

    /// Load candidates in parallel, keeping those that satisfy every predicate.
    /// A record removed since enumeration is skipped.
    fn load(&self, dir: &Path, candidates: &[String]) -> Result<Vec<Record>> {
        let loaded: Vec<Option<Record>> = candidates
            .par_iter()
            .map(|id| -> Result<Option<Record>> {
                let Some(record) = document::read_record(&document::record_path(dir, id))? else {
                    log::warn!("Record {}/{} vanished during scan", self.table, id);
                    return Ok(None);
                };
                let keep = self.predicates.iter().all(|p| p.matches(&record));
                Ok(keep.then_some(record))
            })
            .collect::<Result<_>>()?;

        Ok(loaded.into_iter().flatten().collect())
    }

    fn resolve_join(&self, join: &Join, rows: Vec<Record>) -> Result<Vec<Record>> {
        rows.into_par_iter()
            .map(|mut row| {
                let matched = match &join.column {
                    Some(column) => {
                        let key = row.get(column).map(id_value).unwrap_or(Value::Null);
                        let mut sub = Query::new(self.db, &join.table);
                        sub.filter(ID_COLUMN, Operator::Eq, key);
                        sub.get()
                    }
                    None => {
                        let link_table = format!("{}-{}", self.table, join.table);
                        let key = row.get(ID_COLUMN).cloned().unwrap_or(Value::Null);
                        let mut sub = Query::new(self.db, &link_table);
                        sub.filter(format!("{}Id", self.table), Operator::Eq, key);
                        sub.get()
                    }
                };

                match matched {
                    Ok(found) => {
                        let found = found.into_iter().map(Value::Object).collect();
                        row.insert(join.table.clone(), Value::Array(found));
                    }
                    Err(FolderDbError::TableNotFound { table }) => {
                        log::warn!("Join target '{table}' does not exist; row left unjoined");
                    }
                    Err(e) => return Err(e),
                }
                Ok(row)
            })
            .collect()
    }
}

/// Record ids are strings; a numeric foreign key still addresses `"<n>"`.
fn id_value(value: &Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        other => other.clone(),
    }
}

fn project(mut row: Record, columns: &[String]) -> Record {
    columns
        .iter()
        .filter_map(|c| row.remove_entry(c))
        .collect()
}
