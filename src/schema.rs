//! Declared tables, their columns, and the foreign keys between them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    Bits16,
    Bits32,
    Bits64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    Bits32,
    Bits64,
}

/// Postgres column types a table can declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgType {
    Integer { width: IntWidth, serial: bool },
    Float { width: FloatWidth },
    Text { max_len: Option<u32> },
    Boolean,
    Enum { name: String, values: Vec<String> },
}

impl PgType {
    pub fn integer(width: IntWidth) -> Self {
        Self::Integer {
            width,
            serial: false,
        }
    }

    pub fn serial(width: IntWidth) -> Self {
        Self::Integer {
            width,
            serial: true,
        }
    }

    pub fn text() -> Self {
        Self::Text { max_len: None }
    }

    pub fn varchar(max_len: u32) -> Self {
        Self::Text {
            max_len: Some(max_len),
        }
    }

    /// Enum values form an ordered set: repeats keep their first position.
    pub fn enumeration<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for value in values {
            let value = value.into();
            if !unique.contains(&value) {
                unique.push(value);
            }
        }
        Self::Enum {
            name: name.into(),
            values: unique,
        }
    }

    /// Spelling used in a column definition.
    pub fn column_type(&self) -> String {
        match self {
            Self::Integer { width, serial } => match (width, serial) {
                (IntWidth::Bits16, false) => "smallint".to_string(),
                (IntWidth::Bits32, false) => "int".to_string(),
                (IntWidth::Bits64, false) => "bigint".to_string(),
                (IntWidth::Bits16, true) => "smallserial".to_string(),
                (IntWidth::Bits32, true) => "serial".to_string(),
                (IntWidth::Bits64, true) => "bigserial".to_string(),
            },
            _ => self.param_type(),
        }
    }

    /// Spelling usable as a prepared statement parameter type.
    pub fn param_type(&self) -> String {
        match self {
            Self::Integer { width, .. } => match width {
                IntWidth::Bits16 => "smallint".to_string(),
                IntWidth::Bits32 => "int".to_string(),
                IntWidth::Bits64 => "bigint".to_string(),
            },
            Self::Float { width } => match width {
                FloatWidth::Bits32 => "real".to_string(),
                FloatWidth::Bits64 => "double precision".to_string(),
            },
            Self::Text { max_len: Some(n) } => format!("varchar({})", n),
            Self::Text { max_len: None } => "text".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Enum { name, .. } => name.clone(),
        }
    }
}

impl fmt::Display for PgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub pg_type: PgType,
    pub unique: bool,
    pub nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, pg_type: PgType) -> Self {
        Self {
            name: name.into(),
            pg_type,
            unique: false,
            nullable: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub referred_column: String,
    pub pointing_column: String,
    pub pointing_unique: bool,
}

/// Which side of a foreign key a table sits on, seen from that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// The other table points at this one.
    Remote,
    /// This table points at the other one.
    Local,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Self::Remote => Self::Local,
            Self::Local => Self::Remote,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub direction: Direction,
    pub foreign_key: ForeignKey,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<Column>,
    /// Neighbor table name -> every foreign key shared with it.
    pub links: BTreeMap<String, Vec<Link>>,
}

impl Table {
    pub fn links_to(&self, table: &str) -> &[Link] {
        self.links.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every (neighbor, link) pair, in neighbor name order.
    pub fn neighbors(&self) -> impl Iterator<Item = (&str, &Link)> {
        self.links
            .iter()
            .flat_map(|(name, links)| links.iter().map(move |link| (name.as_str(), link)))
    }
}

/// Every table the host has declared. Built during setup, then only read.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    tables: HashMap<String, Table>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Redeclaring a table replaces it and forgets every foreign key touching it.
    pub fn declare_table(
        &mut self,
        name: impl Into<String>,
        primary_key: impl Into<String>,
        columns: Vec<Column>,
    ) {
        let name = name.into();
        let table = Table {
            name: name.clone(),
            primary_key: primary_key.into(),
            columns,
            links: BTreeMap::new(),
        };
        log::debug!("declared table {} ({} columns)", name, table.columns.len());

        if let Some(previous) = self.tables.insert(name.clone(), table) {
            for neighbor in previous.links.keys().filter(|n| **n != name) {
                if let Some(other) = self.tables.get_mut(neighbor) {
                    other.links.remove(&name);
                }
            }
        }
    }

    pub fn declare_foreign_key(
        &mut self,
        referred_table: &str,
        referred_column: &str,
        pointing_table: &str,
        pointing_column: &str,
        pointing_unique: bool,
    ) -> Result<()> {
        // only the tables must exist, columns are taken on trust
        self.lookup_table(referred_table)?;
        self.lookup_table(pointing_table)?;

        let foreign_key = ForeignKey {
            referred_column: referred_column.to_string(),
            pointing_column: pointing_column.to_string(),
            pointing_unique,
        };
        log::debug!(
            "declared foreign key {}.{} -> {}.{}{}",
            pointing_table,
            pointing_column,
            referred_table,
            referred_column,
            if pointing_unique { " (unique)" } else { "" }
        );

        self.link(referred_table, pointing_table, Direction::Remote, &foreign_key);
        self.link(pointing_table, referred_table, Direction::Local, &foreign_key);
        Ok(())
    }

    fn link(&mut self, from: &str, to: &str, direction: Direction, foreign_key: &ForeignKey) {
        if let Some(table) = self.tables.get_mut(from) {
            table.links.entry(to.to_string()).or_default().push(Link {
                direction,
                foreign_key: foreign_key.clone(),
            });
        }
    }

    pub fn lookup_table(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| CompileError::table_not_found(name))
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
