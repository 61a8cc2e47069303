//! Singular vs. collection-valued relationships.

use std::fmt;

use crate::error::{CompileError, Result};
use crate::schema::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    pub fn from_many(is_many: bool) -> Self {
        if is_many { Self::Many } else { Self::One }
    }

    pub fn is_many(self) -> bool {
        self == Self::Many
    }

    /// What the schema gives a single foreign key hop.
    ///
    /// A child row always points at exactly one parent, and a unique pointing
    /// column makes the relation one-to-one whichever side it is read from.
    pub fn of_link(pointing_unique: bool, direction: Direction) -> Self {
        if pointing_unique || direction == Direction::Local {
            Self::One
        } else {
            Self::Many
        }
    }

    /// A path of hops is singular only if every hop is.
    pub fn along(hops: impl IntoIterator<Item = Cardinality>) -> Self {
        if hops.into_iter().any(Cardinality::is_many) {
            Self::Many
        } else {
            Self::One
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => f.write_str("only one"),
            Self::Many => f.write_str("many"),
        }
    }
}

/// Reject a one/many claim that contradicts the schema's uniqueness facts.
pub fn check_many_correctness(
    pointing_unique: bool,
    direction: Direction,
    wants_many: bool,
) -> Result<()> {
    check_cardinality(Cardinality::of_link(pointing_unique, direction), wants_many)
}

pub fn check_cardinality(actual: Cardinality, wants_many: bool) -> Result<()> {
    let wanted = Cardinality::from_many(wants_many);
    if wanted == actual {
        Ok(())
    } else {
        Err(CompileError::InvalidCardinality { wanted, actual })
    }
}
