//! Database schema model and table-level comparison.
//!
//! The site reports its live schema and the schema it is expected to have;
//! the schema check compares the two table by table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Keyed by table name; names compare case-sensitively.
    #[serde(default)]
    pub tables: BTreeMap<String, Table>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default)]
    pub indexes: Vec<Index>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// One structural difference between the expected and the actual table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum TableChange {
    MissingColumn { column: String },
    ExtraColumn { column: String },
    ChangedColumn { column: String, expected: String, actual: String },
    MissingIndex { index: String },
    ExtraIndex { index: String },
    ChangedIndex { index: String, expected: String, actual: String },
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(length) = self.length {
            write!(f, "({})", length)?;
        }
        if self.not_null {
            f.write_str(" NOT NULL")?;
        }
        if let Some(default) = &self.default {
            write!(f, " DEFAULT {}", default)?;
        }
        Ok(())
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unique {
            f.write_str("UNIQUE ")?;
        }
        write!(f, "({})", self.columns.join(", "))
    }
}

impl fmt::Display for TableChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableChange::MissingColumn { column } => write!(f, "missing column {}", column),
            TableChange::ExtraColumn { column } => write!(f, "extra column {}", column),
            TableChange::ChangedColumn {
                column,
                expected,
                actual,
            } => write!(
                f,
                "column {} is {} (expected {})",
                column, actual, expected
            ),
            TableChange::MissingIndex { index } => write!(f, "missing index {}", index),
            TableChange::ExtraIndex { index } => write!(f, "extra index {}", index),
            TableChange::ChangedIndex {
                index,
                expected,
                actual,
            } => write!(f, "index {} is {} (expected {})", index, actual, expected),
        }
    }
}

impl Table {
    fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn index(&self, name: &str) -> Option<&Index> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Compares `self` (expected) with `actual`. Columns are reported in
    /// expected order followed by extras; indexes likewise.
    pub fn diff(&self, actual: &Table) -> Vec<TableChange> {
        let mut changes = Vec::new();

        for expected in &self.columns {
            match actual.column(&expected.name) {
                None => changes.push(TableChange::MissingColumn {
                    column: expected.name.clone(),
                }),
                Some(found) if found != expected => changes.push(TableChange::ChangedColumn {
                    column: expected.name.clone(),
                    expected: expected.to_string(),
                    actual: found.to_string(),
                }),
                Some(_) => {}
            }
        }
        for found in &actual.columns {
            if self.column(&found.name).is_none() {
                changes.push(TableChange::ExtraColumn {
                    column: found.name.clone(),
                });
            }
        }

        for expected in &self.indexes {
            match actual.index(&expected.name) {
                None => changes.push(TableChange::MissingIndex {
                    index: expected.name.clone(),
                }),
                Some(found) if found != expected => changes.push(TableChange::ChangedIndex {
                    index: expected.name.clone(),
                    expected: expected.to_string(),
                    actual: found.to_string(),
                }),
                Some(_) => {}
            }
        }
        for found in &actual.indexes {
            if self.index(&found.name).is_none() {
                changes.push(TableChange::ExtraIndex {
                    index: found.name.clone(),
                });
            }
        }

        changes
    }

    /// Self-consistency problems: duplicate names, indexes over unknown
    /// columns, indexes without columns.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.columns.is_empty() {
            problems.push("table has no columns".to_string());
        }

        let mut seen = BTreeSet::new();
        for column in &self.columns {
            if !seen.insert(column.name.as_str()) {
                problems.push(format!("duplicate column {}", column.name));
            }
        }

        let mut seen_indexes = BTreeSet::new();
        for index in &self.indexes {
            if !seen_indexes.insert(index.name.as_str()) {
                problems.push(format!("duplicate index {}", index.name));
            }
            if index.columns.is_empty() {
                problems.push(format!("index {} has no columns", index.name));
            }
            for column in &index.columns {
                if self.column(column).is_none() {
                    problems.push(format!(
                        "index {} refers to unknown column {}",
                        index.name, column
                    ));
                }
            }
        }

        problems
    }
}
