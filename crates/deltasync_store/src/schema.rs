//! Dataset schema declarations.

use deltasync_protocol::CHANGELOG_TABLE;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Name of the local bookkeeping table holding `parameter`/`value` pairs
/// (client identity and similar). Always untracked.
pub const CONFIG_TABLE: &str = "Configuration";

/// Column data type, as declared by a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Variable-length text.
    #[default]
    String,
    /// Calendar timestamp; carried as formatted text in row payloads.
    Date,
    /// Signed integer.
    Integer,
    /// Backend-assigned incrementing integer.
    Autoincrement,
}

/// One column declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// Maximum length for text columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    /// Whether the column is NOT NULL.
    #[serde(default)]
    pub required: bool,
}

impl FieldDef {
    /// Creates a field declaration.
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            length: None,
            required: false,
        }
    }
}

/// One table declaration: an ordered field list plus an optional explicit
/// primary-key column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    /// Ordered column declarations.
    pub fields: Vec<FieldDef>,
    /// Primary-key column, when it differs from the dataset default.
    #[serde(rename = "primaryKey", default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
}

impl TableDef {
    /// Creates a table declaration from its fields.
    pub fn new(fields: Vec<FieldDef>) -> Self {
        Self {
            fields,
            primary_key: None,
        }
    }
}

/// A per-dataset declaration: table name → field list, the dataset-wide
/// primary-key column, and the set of untracked tables.
///
/// Table creation from this declaration is a backend concern; the sync
/// core consumes only the primary-key convention and the tracked table
/// set. The change log and the local configuration table are always
/// untracked.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    tables: BTreeMap<String, TableDef>,
    primary_key: String,
    untracked: BTreeSet<String>,
}

impl Schema {
    /// Creates an empty schema with the default `id` primary key.
    pub fn new() -> Self {
        let mut untracked = BTreeSet::new();
        untracked.insert(CHANGELOG_TABLE.to_string());
        untracked.insert(CONFIG_TABLE.to_string());
        Self {
            tables: BTreeMap::new(),
            primary_key: "id".to_string(),
            untracked,
        }
    }

    /// Adds a table declaration.
    pub fn with_table(mut self, name: impl Into<String>, def: TableDef) -> Self {
        self.tables.insert(name.into(), def);
        self
    }

    /// Overrides the dataset-wide primary-key column.
    pub fn with_primary_key(mut self, field: impl Into<String>) -> Self {
        self.primary_key = field.into();
        self
    }

    /// Marks a table as untracked: its mutations are never logged and it
    /// is skipped by extraction.
    pub fn with_untracked(mut self, name: impl Into<String>) -> Self {
        self.untracked.insert(name.into());
        self
    }

    /// Loads table declarations from a JSON dataset declaration
    /// (`{ "Table": { "fields": [...], "primaryKey"?: ... }, ... }`).
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        let tables: BTreeMap<String, TableDef> = serde_json::from_slice(bytes)?;
        let mut schema = Self::new();
        schema.tables = tables;
        Ok(schema)
    }

    /// Returns the primary-key column for a table (the table's explicit
    /// declaration, else the dataset default).
    pub fn primary_key(&self, table: &str) -> &str {
        self.tables
            .get(table)
            .and_then(|t| t.primary_key.as_deref())
            .unwrap_or(&self.primary_key)
    }

    /// Returns the dataset-wide primary-key column.
    pub fn default_primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Returns a table declaration.
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    /// Iterates over all declared table names.
    pub fn table_names(&self) -> impl Iterator<Item = &String> {
        self.tables.keys()
    }

    /// Iterates over the declared tables that participate in change
    /// tracking and extraction.
    pub fn tracked_tables(&self) -> impl Iterator<Item = &String> {
        self.tables
            .keys()
            .filter(move |name| !self.untracked.contains(*name))
    }

    /// Returns true if mutations to the table are logged.
    pub fn is_tracked(&self, table: &str) -> bool {
        !self.untracked.contains(table)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}
