//! Errors raised while declaring a schema or compiling a query.

use thiserror::Error;

use crate::cardinality::Cardinality;

pub type Result<T, E = CompileError> = std::result::Result<T, E>;

/// Something a declaration or query named that the schema does not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Missing {
    #[error("table `{0}`")]
    Table(String),
    #[error("pointing column `{column}` visible from table `{table}`")]
    PointingColumn { table: String, column: String },
    #[error("foreign key between `{from}` and `{to}`")]
    Link { from: String, to: String },
}

/// Why a query block cannot be rendered as written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlockProblem {
    #[error("reaches its table through a chain but has no parent table to start from")]
    ChainAtRoot,
    #[error("orders or limits a relation that yields a single row")]
    ControlsOnSingle,
    #[error("has neither columns nor nested blocks")]
    Empty,
    #[error("uses the same name as its parent alias")]
    ShadowsParent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("non-existent {0}")]
    NotFound(Missing),
    #[error(
        "ambiguous reference `{reference}` from table `{table}`, qualify it with one of: {}",
        .candidates.join(", ")
    )]
    AmbiguousReference {
        table: String,
        reference: String,
        candidates: Vec<String>,
    },
    #[error("incorrect destination table: chain ends at `{actual}` but `{expected}` was declared")]
    IncorrectDestination { expected: String, actual: String },
    #[error("incorrectly wanting {wanted} where the schema gives {actual}")]
    InvalidCardinality {
        wanted: Cardinality,
        actual: Cardinality,
    },
    #[error("block `{block}` {problem}")]
    InvalidBlock { block: String, problem: BlockProblem },
}

impl CompileError {
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::NotFound(Missing::Table(table.into()))
    }

    pub fn invalid_block(block: impl Into<String>, problem: BlockProblem) -> Self {
        Self::InvalidBlock {
            block: block.into(),
            problem,
        }
    }
}
