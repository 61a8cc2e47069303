use crate::error::Result;
use crate::query::Query;
use crate::schema::{Column, Schema};

/// Everything one source file declares.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub tables: Vec<TableDecl>,
    pub queries: Vec<Query>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDecl {
    pub name: String,
    pub primary_key: String,
    pub columns: Vec<Column>,
    pub references: Vec<Reference>,
}

/// `column -> table.referred_column` on a table's column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub column: String,
    pub table: String,
    pub referred_column: String,
    pub unique: bool,
}

impl Document {
    /// Declare every table, then every foreign key, so references may point forward.
    pub fn declare_into(&self, schema: &mut Schema) -> Result<()> {
        for table in &self.tables {
            schema.declare_table(&table.name, &table.primary_key, table.columns.clone());
        }
        for table in &self.tables {
            for reference in &table.references {
                schema.declare_foreign_key(
                    &reference.table,
                    &reference.referred_column,
                    &table.name,
                    &reference.column,
                    reference.unique,
                )?;
            }
        }
        Ok(())
    }
}
