//! Foreign key chain resolution.
//!
//! A chain names the pointing column of each hop, optionally qualified with
//! the neighbor table, and the table it expects to end on. Resolution walks
//! the schema hop by hop and yields one [`JoinStep`] per hop; the destination
//! is checked only after every hop resolved.

use std::fmt;

use crate::cardinality::Cardinality;
use crate::error::{CompileError, Missing, Result};
use crate::schema::{Direction, ForeignKey, Link, Schema, Table};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyReference {
    pub column: String,
    /// Neighbor table the hop must land on.
    pub table: Option<String>,
    /// Side of the key the hop must start from. Only needed when a table
    /// refers to itself and both directions share one neighbor name.
    pub direction: Option<Direction>,
}

impl KeyReference {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            table: None,
            direction: None,
        }
    }

    pub fn qualified(column: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            table: Some(table.into()),
            direction: None,
        }
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }
}

impl fmt::Display for KeyReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}", table, self.column),
            None => f.write_str(&self.column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyChain {
    pub references: Vec<KeyReference>,
    pub destination: String,
}

/// One resolved hop: join `table as alias` onto `from_alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub from_alias: String,
    pub table: String,
    pub alias: String,
    /// Direction of the foreign key as seen from the table being left.
    pub direction: Direction,
    pub foreign_key: ForeignKey,
}

impl JoinStep {
    fn new(from_alias: &str, table: &str, link: &Link) -> Self {
        Self {
            from_alias: from_alias.to_string(),
            table: table.to_string(),
            alias: table.to_string(),
            direction: link.direction,
            foreign_key: link.foreign_key.clone(),
        }
    }

    pub fn condition(&self) -> String {
        let fk = &self.foreign_key;
        match self.direction {
            Direction::Remote => format!(
                "{}.{} = {}.{}",
                self.from_alias, fk.referred_column, self.alias, fk.pointing_column
            ),
            Direction::Local => format!(
                "{}.{} = {}.{}",
                self.from_alias, fk.pointing_column, self.alias, fk.referred_column
            ),
        }
    }

    pub fn cardinality(&self) -> Cardinality {
        Cardinality::of_link(self.foreign_key.pointing_unique, self.direction)
    }

    /// `(condition, table, alias)`
    pub fn to_triple(&self) -> (String, String, String) {
        (self.condition(), self.table.clone(), self.alias.clone())
    }
}

impl ForeignKeyChain {
    pub fn new(references: Vec<KeyReference>, destination: impl Into<String>) -> Self {
        Self {
            references,
            destination: destination.into(),
        }
    }

    /// Resolve every hop starting from `start_table` aliased as `start_alias`.
    /// Each reached table is aliased with its own name.
    pub fn join_steps(
        &self,
        schema: &Schema,
        start_alias: &str,
        start_table: &str,
    ) -> Result<Vec<JoinStep>> {
        let mut current = schema.lookup_table(start_table)?;
        let mut current_alias = start_alias.to_string();
        let mut steps = Vec::with_capacity(self.references.len());

        for reference in &self.references {
            let (neighbor, link) = resolve_hop(current, reference)?;
            let step = JoinStep::new(&current_alias, neighbor, link);
            log::debug!("chain hop {} from {}: {}", reference, current.name, step.condition());

            current = schema.lookup_table(neighbor)?;
            current_alias = step.alias.clone();
            steps.push(step);
        }

        if current.name != self.destination {
            return Err(CompileError::IncorrectDestination {
                expected: self.destination.clone(),
                actual: current.name.clone(),
            });
        }
        Ok(steps)
    }
}

fn resolve_hop<'t>(table: &'t Table, reference: &KeyReference) -> Result<(&'t str, &'t Link)> {
    let candidates: Vec<(&str, &Link)> = table
        .neighbors()
        .filter(|(_, link)| link.foreign_key.pointing_column == reference.column)
        .collect();
    log::trace!(
        "{} candidates for {} from {}",
        candidates.len(),
        reference,
        table.name
    );

    let named: Vec<(&str, &Link)> = match &reference.table {
        Some(qualifier) => candidates
            .iter()
            .copied()
            .filter(|(neighbor, _)| *neighbor == qualifier.as_str())
            .collect(),
        None if candidates.is_empty() => {
            return Err(CompileError::NotFound(Missing::PointingColumn {
                table: table.name.clone(),
                column: reference.column.clone(),
            }));
        }
        None => candidates.clone(),
    };
    let named: Vec<(&str, &Link)> = named
        .into_iter()
        .filter(|(_, link)| reference.direction.is_none_or(|d| link.direction == d))
        .collect();

    match named.as_slice() {
        [only] => Ok(*only),
        _ => {
            let mut names: Vec<String> = candidates.iter().map(|(n, _)| n.to_string()).collect();
            names.dedup();
            Err(CompileError::AmbiguousReference {
                table: table.name.clone(),
                reference: reference.to_string(),
                candidates: names,
            })
        }
    }
}

/// The hop between two tables sharing exactly one foreign key.
pub fn direct_step(
    schema: &Schema,
    from_alias: &str,
    from_table: &str,
    to_table: &str,
) -> Result<JoinStep> {
    let from = schema.lookup_table(from_table)?;
    schema.lookup_table(to_table)?;

    match from.links_to(to_table) {
        [] => Err(CompileError::NotFound(Missing::Link {
            from: from_table.to_string(),
            to: to_table.to_string(),
        })),
        [link] => Ok(JoinStep::new(from_alias, to_table, link)),
        links => Err(CompileError::AmbiguousReference {
            table: from_table.to_string(),
            reference: to_table.to_string(),
            candidates: links
                .iter()
                .map(|l| l.foreign_key.pointing_column.clone())
                .collect(),
        }),
    }
}

/// Start table -> `through` -> `target`, one unique link per pair.
pub fn named_chain_steps(
    schema: &Schema,
    start_alias: &str,
    start_table: &str,
    through: &str,
    target: &str,
) -> Result<Vec<JoinStep>> {
    let first = direct_step(schema, start_alias, start_table, through)?;
    let second = direct_step(schema, &first.alias, through, target)?;
    Ok(vec![first, second])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triple(condition: &str, table: &str, alias: &str) -> (String, String, String) {
        (condition.into(), table.into(), alias.into())
    }

    fn triples(steps: &[JoinStep]) -> Vec<(String, String, String)> {
        steps.iter().map(JoinStep::to_triple).collect()
    }

    fn letters() -> Schema {
        let mut schema = Schema::new();
        for name in ["a", "b", "c", "d", "e", "f"] {
            schema.declare_table(name, "id", vec![]);
        }

        let keys = [
            ("a", "b", "a_id"),
            ("b", "c", "b_id"),
            ("c", "d", "c_id"),
            ("b", "d", "right_b_id"),
            ("b", "d", "left_b_id"),
            ("a", "d", "a_id"),
            ("d", "e", "d_id"),
            ("d", "f", "d_id"),
        ];
        for (referred, pointing, column) in keys {
            schema
                .declare_foreign_key(referred, "id", pointing, column, false)
                .unwrap();
        }
        schema
    }

    #[test]
    fn test_unambiguous_chains() {
        let schema = letters();

        let chain = ForeignKeyChain::new(vec![KeyReference::new("b_id")], "c");
        let steps = chain.join_steps(&schema, "b", "b").unwrap();
        assert_eq!(triples(&steps), vec![triple("b.id = c.b_id", "c", "c")]);

        let chain = ForeignKeyChain::new(
            vec![KeyReference::new("b_id"), KeyReference::new("c_id")],
            "d",
        );
        let steps = chain.join_steps(&schema, "b", "b").unwrap();
        assert_eq!(
            triples(&steps),
            vec![
                triple("b.id = c.b_id", "c", "c"),
                triple("c.id = d.c_id", "d", "d"),
            ]
        );

        for column in ["right_b_id", "left_b_id"] {
            let chain = ForeignKeyChain::new(vec![KeyReference::new(column)], "d");
            let steps = chain.join_steps(&schema, "b", "b").unwrap();
            assert_eq!(
                triples(&steps),
                vec![triple(&format!("b.id = d.{}", column), "d", "d")]
            );
        }
    }

    #[test]
    fn test_qualified_references() {
        let schema = letters();

        let chain = ForeignKeyChain::new(vec![KeyReference::qualified("a_id", "b")], "b");
        let steps = chain.join_steps(&schema, "a", "a").unwrap();
        assert_eq!(triples(&steps), vec![triple("a.id = b.a_id", "b", "b")]);

        for last in ["e", "f"] {
            let chain = ForeignKeyChain::new(
                vec![
                    KeyReference::qualified("a_id", "d"),
                    KeyReference::qualified("d_id", last),
                ],
                last,
            );
            let steps = chain.join_steps(&schema, "a", "a").unwrap();
            assert_eq!(
                triples(&steps),
                vec![
                    triple("a.id = d.a_id", "d", "d"),
                    triple(&format!("d.id = {}.d_id", last), last, last),
                ]
            );
        }
    }

    #[test]
    fn test_unqualified_shared_column_is_ambiguous() {
        let schema = letters();
        let chain = ForeignKeyChain::new(vec![KeyReference::new("a_id")], "b");
        assert_eq!(
            chain.join_steps(&schema, "a", "a"),
            Err(CompileError::AmbiguousReference {
                table: "a".into(),
                reference: "a_id".into(),
                candidates: vec!["b".into(), "d".into()],
            })
        );
    }

    #[test]
    fn test_qualifier_outside_candidates() {
        let schema = letters();
        let chain = ForeignKeyChain::new(vec![KeyReference::qualified("a_id", "c")], "c");
        assert!(matches!(
            chain.join_steps(&schema, "a", "a"),
            Err(CompileError::AmbiguousReference { ref reference, .. }) if reference == "c.a_id"
        ));
    }

    #[test]
    fn test_qualified_reference_without_candidates() {
        let schema = letters();
        let chain = ForeignKeyChain::new(vec![KeyReference::qualified("zzz_id", "b")], "b");
        assert_eq!(
            chain.join_steps(&schema, "a", "a"),
            Err(CompileError::AmbiguousReference {
                table: "a".into(),
                reference: "b.zzz_id".into(),
                candidates: vec![],
            })
        );
    }

    #[test]
    fn test_self_reference_needs_direction() {
        let mut schema = Schema::new();
        schema.declare_table("employee", "id", vec![]);
        schema
            .declare_foreign_key("employee", "id", "employee", "manager_id", false)
            .unwrap();

        let chain = ForeignKeyChain::new(vec![KeyReference::new("manager_id")], "employee");
        assert_eq!(
            chain.join_steps(&schema, "e", "employee"),
            Err(CompileError::AmbiguousReference {
                table: "employee".into(),
                reference: "manager_id".into(),
                candidates: vec!["employee".into()],
            })
        );

        let manager = ForeignKeyChain::new(
            vec![KeyReference::new("manager_id").direction(Direction::Local)],
            "employee",
        );
        let steps = manager.join_steps(&schema, "e", "employee").unwrap();
        assert_eq!(
            triples(&steps),
            vec![triple("e.manager_id = employee.id", "employee", "employee")]
        );
        assert_eq!(steps[0].cardinality(), Cardinality::One);

        let reports = ForeignKeyChain::new(
            vec![KeyReference::qualified("manager_id", "employee").direction(Direction::Remote)],
            "employee",
        );
        let steps = reports.join_steps(&schema, "e", "employee").unwrap();
        assert_eq!(
            triples(&steps),
            vec![triple("e.id = employee.manager_id", "employee", "employee")]
        );
        assert_eq!(steps[0].cardinality(), Cardinality::Many);
    }

    #[test]
    fn test_unknown_pointing_column() {
        let schema = letters();
        let chain = ForeignKeyChain::new(vec![KeyReference::new("zzz_id")], "b");
        assert_eq!(
            chain.join_steps(&schema, "a", "a"),
            Err(CompileError::NotFound(Missing::PointingColumn {
                table: "a".into(),
                column: "zzz_id".into(),
            }))
        );
    }

    #[test]
    fn test_incorrect_destination() {
        let schema = letters();
        let chain = ForeignKeyChain::new(vec![KeyReference::qualified("a_id", "b")], "c");
        assert_eq!(
            chain.join_steps(&schema, "a", "a"),
            Err(CompileError::IncorrectDestination {
                expected: "c".into(),
                actual: "b".into(),
            })
        );
    }

    #[test]
    fn test_walks_child_to_parent() {
        let schema = letters();
        let chain = ForeignKeyChain::new(
            vec![KeyReference::new("c_id"), KeyReference::new("b_id")],
            "b",
        );
        let steps = chain.join_steps(&schema, "d", "d").unwrap();
        assert_eq!(
            triples(&steps),
            vec![
                triple("d.c_id = c.id", "c", "c"),
                triple("c.b_id = b.id", "b", "b"),
            ]
        );
        assert_eq!(Cardinality::along(steps.iter().map(JoinStep::cardinality)), Cardinality::One);
    }

    #[test]
    fn test_named_chain() {
        let schema = letters();
        let steps = named_chain_steps(&schema, "root", "b", "c", "d").unwrap();
        assert_eq!(
            triples(&steps),
            vec![
                triple("root.id = c.b_id", "c", "c"),
                triple("c.id = d.c_id", "d", "d"),
            ]
        );

        assert!(matches!(
            direct_step(&schema, "b", "b", "d"),
            Err(CompileError::AmbiguousReference { ref candidates, .. })
                if candidates == &["right_b_id".to_string(), "left_b_id".to_string()]
        ));
        assert_eq!(
            direct_step(&schema, "a", "a", "e"),
            Err(CompileError::NotFound(Missing::Link {
                from: "a".into(),
                to: "e".into(),
            }))
        );
    }
}
