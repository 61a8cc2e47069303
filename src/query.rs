//! Query tree: a named statement, its arguments, and nested blocks.
//!
//! Nodes refer to tables and columns by name only; they are checked against
//! a [`Schema`](crate::schema::Schema) when rendered.

use std::fmt;

use crate::chain::ForeignKeyChain;

/// Literal usable as an argument default.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{:?}", x),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    /// 1-based position in the prepared statement.
    pub index: usize,
    pub name: String,
    pub sql_type: String,
    pub default: Option<Literal>,
}

impl Arg {
    pub fn new(index: usize, name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
            sql_type: sql_type.into(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Literal) -> Self {
        self.default = Some(default);
        self
    }

    /// `$n`, or `coalesce($n, default)` when the argument has a default.
    pub fn placeholder(&self) -> String {
        match &self.default {
            Some(default) => format!("coalesce(${}, {})", self.index, default),
            None => format!("${}", self.index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Eq,
    NotEq,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    ILike,
}

impl FilterType {
    pub fn operator(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Like => "like",
            Self::ILike => "ilike",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterDirective {
    pub column: String,
    pub arg: Arg,
    pub filter_type: FilterType,
}

impl FilterDirective {
    pub fn new(column: impl Into<String>, arg: Arg, filter_type: FilterType) -> Self {
        Self {
            column: column.into(),
            arg,
            filter_type,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryColumn {
    /// Source column on the block's table.
    pub column: String,
    /// JSON key it is emitted under.
    pub display: String,
}

impl QueryColumn {
    pub fn new(column: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            display: display.into(),
        }
    }

    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::new(name.clone(), name)
    }
}

/// How a block reaches its target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    DirectTable,
    /// Through one intermediate table.
    NamedChain(String),
    ResolvedChain(ForeignKeyChain),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Limit {
    Rows(u64),
    Arg(Arg),
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryBlock {
    /// JSON key and SQL alias.
    pub display: String,
    pub target: String,
    pub access: Access,
    pub is_many: bool,
    pub filters: Vec<FilterDirective>,
    pub blocks: Vec<QueryBlock>,
    pub columns: Vec<QueryColumn>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Limit>,
}

impl QueryBlock {
    pub fn new(
        display: impl Into<String>,
        target: impl Into<String>,
        access: Access,
        is_many: bool,
    ) -> Self {
        Self {
            display: display.into(),
            target: target.into(),
            access,
            is_many,
            filters: Vec::new(),
            blocks: Vec::new(),
            columns: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn filter(mut self, filter: FilterDirective) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn block(mut self, block: QueryBlock) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn column(mut self, column: QueryColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub name: String,
    pub args: Vec<Arg>,
    pub root: QueryBlock,
}

impl Query {
    pub fn new(name: impl Into<String>, args: Vec<Arg>, root: QueryBlock) -> Self {
        Self {
            name: name.into(),
            args,
            root,
        }
    }

    pub fn arg(&self, name: &str) -> Option<&Arg> {
        self.args.iter().find(|a| a.name == name)
    }
}
