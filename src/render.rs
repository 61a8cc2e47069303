//! SQL rendering for query trees.
//!
//! Every block renders to one `select json_agg(json_build_object(..)) as <display>`.
//! Nested blocks become correlated sub-selects keyed by their display name:
//! the first hop of their access path correlates with the parent alias, the
//! remaining hops are joined inside the sub-select.

use std::collections::HashSet;

use crate::cardinality::{Cardinality, check_cardinality};
use crate::chain::{JoinStep, direct_step, named_chain_steps};
use crate::error::{BlockProblem, CompileError, Result};
use crate::query::{
    Access, FilterDirective, Limit, OrderBy, Query, QueryBlock, QueryColumn, SortDirection,
};
use crate::schema::Schema;

/// The row a nested block correlates with.
#[derive(Debug, Clone, Copy)]
pub struct ParentTable<'a> {
    pub alias: &'a str,
    pub table: &'a str,
}

impl Query {
    /// Render as one prepared statement.
    pub fn render(&self, schema: &Schema) -> Result<String> {
        let mut sql = format!("prepare __cq_query_{}", self.name);
        if !self.args.is_empty() {
            let types: Vec<&str> = self.args.iter().map(|a| a.sql_type.as_str()).collect();
            sql.push_str(&format!(" ({})", types.join(", ")));
        }
        sql.push_str(" as ");
        sql.push_str(&self.root.render(schema, None)?);
        sql.push(';');

        log::debug!("rendered query {}", self.name);
        Ok(sql)
    }
}

impl QueryColumn {
    pub fn render(&self, alias: &str) -> String {
        format!("'{}', {}.{}", self.display, alias, self.column)
    }
}

impl FilterDirective {
    pub fn render(&self, alias: &str) -> String {
        format!(
            "{}.{} {} {}",
            alias,
            self.column,
            self.filter_type.operator(),
            self.arg.placeholder()
        )
    }
}

impl OrderBy {
    pub fn render(&self, alias: &str) -> String {
        let direction = match self.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        };
        format!("{}.{} {}", alias, self.column, direction)
    }
}

impl Limit {
    pub fn render(&self) -> String {
        match self {
            Self::Rows(n) => n.to_string(),
            Self::Arg(arg) => arg.placeholder(),
        }
    }
}

impl QueryBlock {
    pub fn render(&self, schema: &Schema, parent: Option<ParentTable<'_>>) -> Result<String> {
        self.validate(schema, parent)?;
        let alias = self.display.as_str();

        let mut conditions = Vec::new();
        let from = match parent {
            None => match self.access {
                Access::DirectTable => format!("{} as {}", self.target, alias),
                _ => {
                    return Err(CompileError::invalid_block(alias, BlockProblem::ChainAtRoot));
                }
            },
            Some(parent) => {
                let steps = self.access_steps(schema, parent)?;
                let actual = Cardinality::along(steps.iter().map(JoinStep::cardinality));
                check_cardinality(actual, self.is_many)?;

                let mut from = String::new();
                for (hop, step) in steps.iter().enumerate() {
                    if hop == 0 {
                        from.push_str(&format!("{} as {}", step.table, step.alias));
                        conditions.push(step.condition());
                    } else {
                        from.push_str(&format!(
                            " join {} as {} on {}",
                            step.table,
                            step.alias,
                            step.condition()
                        ));
                    }
                }
                from
            }
        };

        if !self.filters.is_empty() {
            let filters: Vec<String> = self.filters.iter().map(|f| f.render(alias)).collect();
            conditions.push(format!("({})", filters.join(" and ")));
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" where {}", conditions.join(" and "))
        };

        let ordering = if self.order_by.is_empty() {
            String::new()
        } else {
            let keys: Vec<String> = self.order_by.iter().map(|o| o.render(alias)).collect();
            format!(" order by {}", keys.join(", "))
        };

        let mut pairs: Vec<String> = self.columns.iter().map(|c| c.render(alias)).collect();
        for block in &self.blocks {
            let nested = block.render(
                schema,
                Some(ParentTable {
                    alias,
                    table: &self.target,
                }),
            )?;
            pairs.push(format!("'{}', ({})", block.display, nested));
        }

        let projection = format!(
            "select json_agg(json_build_object({}){}) as {}",
            pairs.join(", "),
            ordering,
            alias
        );
        log::debug!(
            "rendered block {} over {} ({} columns, {} nested)",
            alias,
            self.target,
            self.columns.len(),
            self.blocks.len()
        );

        Ok(match &self.limit {
            None => format!("{} from {}{}", projection, from, where_clause),
            Some(limit) => format!(
                "{} from (select {}.* from {}{}{} limit {}) as {}",
                projection,
                alias,
                from,
                where_clause,
                ordering,
                limit.render(),
                alias
            ),
        })
    }

    fn validate(&self, schema: &Schema, parent: Option<ParentTable<'_>>) -> Result<()> {
        let block = self.display.as_str();
        if self.columns.is_empty() && self.blocks.is_empty() {
            return Err(CompileError::invalid_block(block, BlockProblem::Empty));
        }
        if !self.is_many && (self.limit.is_some() || !self.order_by.is_empty()) {
            return Err(CompileError::invalid_block(block, BlockProblem::ControlsOnSingle));
        }
        if parent.is_some_and(|p| p.alias == block) {
            return Err(CompileError::invalid_block(block, BlockProblem::ShadowsParent));
        }

        // column names are passed through as written
        schema.lookup_table(&self.target)?;
        Ok(())
    }

    /// Join path from the parent row to this block's table, aliased so the
    /// last hop carries the display name.
    fn access_steps(&self, schema: &Schema, parent: ParentTable<'_>) -> Result<Vec<JoinStep>> {
        let steps = match &self.access {
            Access::DirectTable => vec![direct_step(
                schema,
                parent.alias,
                parent.table,
                &self.target,
            )?],
            Access::NamedChain(through) => {
                named_chain_steps(schema, parent.alias, parent.table, through, &self.target)?
            }
            Access::ResolvedChain(chain) => {
                if chain.destination != self.target {
                    return Err(CompileError::IncorrectDestination {
                        expected: self.target.clone(),
                        actual: chain.destination.clone(),
                    });
                }
                chain.join_steps(schema, parent.alias, parent.table)?
            }
        };
        Ok(realias(steps, parent.alias, &self.display))
    }
}

fn realias(steps: Vec<JoinStep>, start_alias: &str, display: &str) -> Vec<JoinStep> {
    let last = steps.len().saturating_sub(1);
    let mut used: HashSet<String> = [start_alias.to_string(), display.to_string()].into();
    let mut previous = start_alias.to_string();

    steps
        .into_iter()
        .enumerate()
        .map(|(hop, mut step)| {
            step.from_alias = previous.clone();
            step.alias = if hop == last {
                display.to_string()
            } else {
                let mut alias = format!("{}__{}", display, step.table);
                if !used.insert(alias.clone()) {
                    alias = format!("{}_{}", alias, hop);
                    used.insert(alias.clone());
                }
                alias
            };
            previous = step.alias.clone();
            step
        })
        .collect()
}
