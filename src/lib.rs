pub mod cardinality;
pub mod chain;
pub mod document;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod query;
pub mod render;
pub mod schema;

use wasm_bindgen::prelude::*;

pub use cardinality::{Cardinality, check_many_correctness};
pub use chain::{ForeignKeyChain, JoinStep, KeyReference};
pub use error::{BlockProblem, CompileError, Missing};
pub use parser::{ParseError, Parser};
pub use query::{
    Access, Arg, FilterDirective, FilterType, Limit, Literal, OrderBy, Query, QueryBlock,
    QueryColumn, SortDirection,
};
pub use schema::{Column, Direction, ForeignKey, PgType, Schema, Table};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),
}

/// One rendered query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub query: String,
    pub sql: String,
}

/// Parse a document, declare its tables into a fresh schema and render its queries.
///
/// An empty `only` renders every query in declaration order.
pub fn compile_source(source: &str, only: &[String]) -> Result<Vec<Statement>, Error> {
    let document = Parser::new(source)?.parse()?;
    let mut schema = Schema::new();
    document.declare_into(&mut schema)?;

    let mut statements = Vec::new();
    for query in &document.queries {
        if !only.is_empty() && !only.contains(&query.name) {
            continue;
        }
        statements.push(Statement {
            query: query.name.clone(),
            sql: query.render(&schema)?,
        });
    }
    Ok(statements)
}

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Compile every query in a source document, one statement per line
#[wasm_bindgen(js_name = "compileQueries")]
pub fn compile_queries(source: &str) -> Result<String, String> {
    let statements = compile_source(source, &[]).map_err(|e| e.to_string())?;
    let lines: Vec<String> = statements.into_iter().map(|s| s.sql).collect();
    Ok(lines.join("\n"))
}
