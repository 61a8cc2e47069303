use crate::chain::{ForeignKeyChain, KeyReference};
use crate::document::{Document, Reference, TableDecl};
use crate::lexer::{LexError, Lexer, Token};
use crate::query::{
    Access, Arg, FilterDirective, FilterType, Limit, Literal, OrderBy, Query, QueryBlock,
    QueryColumn,
};
use crate::schema::{Column, Direction, FloatWidth, IntWidth, PgType};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),
    #[error("Unexpected token: {0:?}, expected {1}")]
    Unexpected(Token, &'static str),
    #[error("Unexpected end of input")]
    UnexpectedEof,
    #[error("Unknown column type: {0}")]
    UnknownType(String),
    #[error("Table {table} must mark exactly one column pk, found {count}")]
    PrimaryKey { table: String, count: usize },
    #[error("Query {query} has no argument ${name}")]
    UnknownArgument { query: String, name: String },
    #[error("Query {query} declares argument {name} twice")]
    DuplicateArgument { query: String, name: String },
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(input: &str) -> Result<Self, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> &Token {
        let tok = self.tokens.get(self.pos).unwrap_or(&Token::Eof);
        self.pos += 1;
        tok
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.advance().clone() {
            Token::Ident(s) => Ok(s),
            Token::Eof => Err(ParseError::UnexpectedEof),
            tok => Err(ParseError::Unexpected(tok, "identifier")),
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), ParseError> {
        let tok = self.advance().clone();
        if tok == expected {
            Ok(())
        } else if tok == Token::Eof {
            Err(ParseError::UnexpectedEof)
        } else {
            Err(ParseError::Unexpected(tok, what))
        }
    }

    fn check_ident(&self, name: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == name)
    }

    fn eat_ident(&mut self, name: &str) -> bool {
        if self.check_ident(name) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Loop guard for `{ ... }` bodies.
    fn at_close(&self, close: &Token) -> Result<bool, ParseError> {
        match self.peek() {
            Token::Eof => Err(ParseError::UnexpectedEof),
            tok => Ok(tok == close),
        }
    }

    pub fn parse(&mut self) -> Result<Document, ParseError> {
        let mut tables = Vec::new();
        let mut queries = Vec::new();

        while *self.peek() != Token::Eof {
            if self.eat_ident("table") {
                tables.push(self.parse_table()?);
            } else if self.eat_ident("query") {
                queries.push(self.parse_query()?);
            } else {
                return Err(ParseError::Unexpected(self.peek().clone(), "table or query"));
            }
        }

        Ok(Document { tables, queries })
    }

    fn parse_table(&mut self) -> Result<TableDecl, ParseError> {
        let name = self.expect_ident()?;
        self.expect(Token::LBrace, "{")?;

        let mut columns = Vec::new();
        let mut references = Vec::new();
        let mut primary_keys = Vec::new();

        while !self.at_close(&Token::RBrace)? {
            let (column, is_pk, reference) = self.parse_column()?;
            if is_pk {
                primary_keys.push(column.name.clone());
            }
            if let Some(reference) = reference {
                references.push(reference);
            }
            columns.push(column);
        }
        self.expect(Token::RBrace, "}")?;

        let primary_key = match primary_keys.as_slice() {
            [pk] => pk.clone(),
            _ => {
                return Err(ParseError::PrimaryKey {
                    table: name,
                    count: primary_keys.len(),
                });
            }
        };

        Ok(TableDecl {
            name,
            primary_key,
            columns,
            references,
        })
    }

    fn parse_column(&mut self) -> Result<(Column, bool, Option<Reference>), ParseError> {
        let name = self.expect_ident()?;
        let mut column = Column::new(name, self.parse_type()?);
        let mut is_pk = false;
        let mut target = None;

        loop {
            if self.eat_ident("pk") {
                is_pk = true;
                column.unique = true;
            } else if self.eat_ident("unique") {
                column.unique = true;
            } else if self.eat_ident("null") {
                column.nullable = true;
            } else if self.eat_ident("not") {
                if !self.eat_ident("null") {
                    return Err(ParseError::Unexpected(self.peek().clone(), "null after not"));
                }
                column.nullable = false;
            } else if *self.peek() == Token::Arrow {
                self.advance();
                let table = self.expect_ident()?;
                self.expect(Token::Dot, ".")?;
                target = Some((table, self.expect_ident()?));
            } else {
                break;
            }
        }

        // uniqueness may come after the arrow, so build the reference last
        let reference = target.map(|(table, referred_column)| Reference {
            column: column.name.clone(),
            table,
            referred_column,
            unique: column.unique,
        });
        Ok((column, is_pk, reference))
    }

    fn parse_type(&mut self) -> Result<PgType, ParseError> {
        let name = self.expect_ident()?;
        let typ = match name.as_str() {
            "int2" | "smallint" => PgType::integer(IntWidth::Bits16),
            "int" | "int4" | "integer" => PgType::integer(IntWidth::Bits32),
            "int8" | "bigint" => PgType::integer(IntWidth::Bits64),
            "serial2" | "smallserial" => PgType::serial(IntWidth::Bits16),
            "serial" | "serial4" => PgType::serial(IntWidth::Bits32),
            "serial8" | "bigserial" => PgType::serial(IntWidth::Bits64),
            "float4" | "real" => PgType::Float {
                width: FloatWidth::Bits32,
            },
            "float8" | "double" => {
                self.eat_ident("precision");
                PgType::Float {
                    width: FloatWidth::Bits64,
                }
            }
            "text" => PgType::text(),
            "varchar" => {
                self.expect(Token::LParen, "(")?;
                let len = match self.advance().clone() {
                    Token::Num(n) if n > 0 => u32::try_from(n)
                        .map_err(|_| ParseError::Unexpected(Token::Num(n), "32-bit varchar length"))?,
                    tok => return Err(ParseError::Unexpected(tok, "varchar length")),
                };
                self.expect(Token::RParen, ")")?;
                PgType::varchar(len)
            }
            "bool" | "boolean" => PgType::Boolean,
            "enum" => {
                let enum_name = self.expect_ident()?;
                self.expect(Token::LParen, "(")?;
                let values = self.parse_ident_list()?;
                self.expect(Token::RParen, ")")?;
                PgType::enumeration(enum_name, values)
            }
            _ => return Err(ParseError::UnknownType(name)),
        };
        Ok(typ)
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut list = vec![self.expect_ident()?];
        while *self.peek() == Token::Comma {
            self.advance();
            list.push(self.expect_ident()?);
        }
        Ok(list)
    }

    fn parse_query(&mut self) -> Result<Query, ParseError> {
        let name = self.expect_ident()?;

        let mut args: Vec<Arg> = Vec::new();
        if *self.peek() == Token::LParen {
            self.advance();
            loop {
                let arg = self.parse_param(args.len() + 1)?;
                if args.iter().any(|a| a.name == arg.name) {
                    return Err(ParseError::DuplicateArgument {
                        query: name,
                        name: arg.name,
                    });
                }
                args.push(arg);
                if *self.peek() == Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(Token::RParen, ")")?;
        }

        self.expect(Token::LBrace, "{")?;
        let scope = ArgScope {
            query: &name,
            args: &args,
        };
        let display = self.expect_ident()?;
        self.expect(Token::Colon, ":")?;
        let root = self.parse_block(display, &scope)?;
        self.expect(Token::RBrace, "}")?;

        Ok(Query::new(name, args, root))
    }

    fn parse_param(&mut self, index: usize) -> Result<Arg, ParseError> {
        let name = self.expect_ident()?;
        self.expect(Token::Colon, ":")?;
        let sql_type = match self.advance().clone() {
            Token::Ident(s) | Token::Str(s) => s,
            tok => return Err(ParseError::Unexpected(tok, "argument type")),
        };

        let mut arg = Arg::new(index, name, sql_type);
        if *self.peek() == Token::Eq {
            self.advance();
            arg = arg.with_default(self.parse_literal()?);
        }
        Ok(arg)
    }

    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        match self.advance().clone() {
            Token::Num(n) => Ok(Literal::Int(n)),
            Token::Float(x) => Ok(Literal::Float(x)),
            Token::Str(s) => Ok(Literal::Text(s)),
            Token::Ident(s) if s == "true" => Ok(Literal::Bool(true)),
            Token::Ident(s) if s == "false" => Ok(Literal::Bool(false)),
            Token::Ident(s) if s == "null" => Ok(Literal::Null),
            tok => Err(ParseError::Unexpected(tok, "default value")),
        }
    }

    /// Everything after `display:` in a block.
    fn parse_block(&mut self, display: String, scope: &ArgScope) -> Result<QueryBlock, ParseError> {
        let (target, access) = self.parse_access()?;
        let is_many = if *self.peek() == Token::Star {
            self.advance();
            true
        } else {
            false
        };
        let mut block = QueryBlock::new(display, target, access, is_many);

        if self.eat_ident("where") {
            loop {
                block = block.filter(self.parse_condition(scope)?);
                if !self.eat_ident("and") {
                    break;
                }
            }
        }

        if self.eat_ident("order") {
            if !self.eat_ident("by") {
                return Err(ParseError::Unexpected(self.peek().clone(), "by after order"));
            }
            loop {
                let column = self.expect_ident()?;
                let order = if self.eat_ident("desc") {
                    OrderBy::desc(column)
                } else {
                    self.eat_ident("asc");
                    OrderBy::asc(column)
                };
                block = block.order_by(order);
                if *self.peek() == Token::Comma {
                    self.advance();
                } else {
                    break;
                }
            }
        }

        if self.eat_ident("limit") {
            let limit = match self.advance().clone() {
                Token::Num(n) if n >= 0 => Limit::Rows(n as u64),
                Token::Dollar => Limit::Arg(scope.lookup(&self.expect_ident()?)?),
                tok => return Err(ParseError::Unexpected(tok, "row count or $argument")),
            };
            block = block.limit(limit);
        }

        self.expect(Token::LBrace, "{")?;
        while !self.at_close(&Token::RBrace)? {
            let name = self.expect_ident()?;
            if *self.peek() != Token::Colon {
                block = block.column(QueryColumn::same(name));
            } else {
                self.advance();
                if self.starts_block() {
                    block = block.block(self.parse_block(name, scope)?);
                } else {
                    block = block.column(QueryColumn::new(self.expect_ident()?, name));
                }
            }
            if *self.peek() == Token::Comma {
                self.advance();
            }
        }
        self.expect(Token::RBrace, "}")?;

        Ok(block)
    }

    /// After `name:`, a nested block opens with a chain or with a table name
    /// whose header runs up to `{`. A renamed column is followed by the next
    /// entry instead, which reaches a `:` or the closing `}` first.
    fn starts_block(&self) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Token::LBracket, _) => true,
            (Token::Ident(_), Token::Star) => true,
            (Token::Ident(_), _) => self
                .tokens
                .iter()
                .skip(self.pos + 1)
                .find_map(|tok| match tok {
                    Token::LBrace => Some(true),
                    Token::Colon | Token::RBrace | Token::Eof => Some(false),
                    _ => None,
                })
                .unwrap_or(false),
            _ => false,
        }
    }

    fn parse_access(&mut self) -> Result<(String, Access), ParseError> {
        if *self.peek() == Token::LBracket {
            self.advance();
            let mut references = vec![self.parse_key_reference()?];
            while *self.peek() == Token::Comma {
                self.advance();
                references.push(self.parse_key_reference()?);
            }
            self.expect(Token::RBracket, "]")?;
            self.expect(Token::Arrow, "->")?;
            let destination = self.expect_ident()?;
            let chain = ForeignKeyChain::new(references, destination.clone());
            return Ok((destination, Access::ResolvedChain(chain)));
        }

        let target = self.expect_ident()?;
        if self.eat_ident("via") {
            let through = self.expect_ident()?;
            return Ok((target, Access::NamedChain(through)));
        }
        Ok((target, Access::DirectTable))
    }

    fn parse_key_reference(&mut self) -> Result<KeyReference, ParseError> {
        let first = self.expect_ident()?;
        if *self.peek() == Token::Dot {
            self.advance();
            let column = self.expect_ident()?;
            return Ok(self.parse_hop_direction(KeyReference::qualified(column, first)));
        }
        Ok(self.parse_hop_direction(KeyReference::new(first)))
    }

    /// `local` follows the key to the referred row, `remote` walks back to
    /// the rows pointing here.
    fn parse_hop_direction(&mut self, reference: KeyReference) -> KeyReference {
        if self.eat_ident("local") {
            reference.direction(Direction::Local)
        } else if self.eat_ident("remote") {
            reference.direction(Direction::Remote)
        } else {
            reference
        }
    }

    fn parse_condition(&mut self, scope: &ArgScope) -> Result<FilterDirective, ParseError> {
        let column = self.expect_ident()?;
        let filter_type = match self.advance().clone() {
            Token::Eq => FilterType::Eq,
            Token::NotEq => FilterType::NotEq,
            Token::Lt => FilterType::Lt,
            Token::Lte => FilterType::Lte,
            Token::Gt => FilterType::Gt,
            Token::Gte => FilterType::Gte,
            Token::Ident(s) if s == "like" => FilterType::Like,
            Token::Ident(s) if s == "ilike" => FilterType::ILike,
            tok => return Err(ParseError::Unexpected(tok, "comparison operator")),
        };
        self.expect(Token::Dollar, "$argument")?;
        let arg = scope.lookup(&self.expect_ident()?)?;
        Ok(FilterDirective::new(column, arg, filter_type))
    }
}

struct ArgScope<'a> {
    query: &'a str,
    args: &'a [Arg],
}

impl ArgScope<'_> {
    fn lookup(&self, name: &str) -> Result<Arg, ParseError> {
        self.args
            .iter()
            .find(|a| a.name == name)
            .cloned()
            .ok_or_else(|| ParseError::UnknownArgument {
                query: self.query.to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_table() {
        let input = r#"
            table users {
                id serial pk
                name varchar(80) not null
                email text unique null
                mood enum mood(happy, sad)
                team_id int -> teams.id
            }
        "#;
        let doc = Parser::new(input).unwrap().parse().unwrap();
        let users = &doc.tables[0];
        assert_eq!(users.name, "users");
        assert_eq!(users.primary_key, "id");
        assert_eq!(users.columns.len(), 5);
        assert_eq!(users.columns[0].pg_type, PgType::serial(IntWidth::Bits32));
        assert_eq!(users.columns[1].pg_type, PgType::varchar(80));
        assert!(users.columns[2].unique && users.columns[2].nullable);
        assert_eq!(
            users.references,
            vec![Reference {
                column: "team_id".into(),
                table: "teams".into(),
                referred_column: "id".into(),
                unique: false,
            }]
        );
    }

    #[test]
    fn test_unique_after_arrow() {
        let input = "table profile { id int pk  user_id int -> users.id unique }";
        let doc = Parser::new(input).unwrap().parse().unwrap();
        assert!(doc.tables[0].references[0].unique);
    }

    #[test]
    fn test_primary_key_required() {
        let input = "table t { a int }";
        assert!(matches!(
            Parser::new(input).unwrap().parse(),
            Err(ParseError::PrimaryKey { count: 0, .. })
        ));
    }

    #[test]
    fn test_parse_query() {
        let input = r#"
            query thing(id: int, amount: "double precision" = 2000) {
                root_display: root* where id = $id order by name desc limit $amount {
                    root_column
                    renamed: source_column,
                    bs: b* via mid { b_column }
                    deep: [d.a_id, e.d_id] -> e { e_column }
                    owner: users { name }
                }
            }
        "#;
        let doc = Parser::new(input).unwrap().parse().unwrap();
        let query = &doc.queries[0];
        assert_eq!(query.name, "thing");
        assert_eq!(query.args[0], Arg::new(1, "id", "int"));
        assert_eq!(
            query.args[1],
            Arg::new(2, "amount", "double precision").with_default(Literal::Int(2000))
        );

        let root = &query.root;
        assert_eq!(root.display, "root_display");
        assert!(root.is_many);
        assert_eq!(root.filters[0].column, "id");
        assert_eq!(root.filters[0].arg.index, 1);
        assert_eq!(root.order_by, vec![OrderBy::desc("name")]);
        assert_eq!(root.limit, Some(Limit::Arg(query.args[1].clone())));
        assert_eq!(
            root.columns,
            vec![
                QueryColumn::same("root_column"),
                QueryColumn::new("source_column", "renamed"),
            ]
        );

        assert_eq!(root.blocks.len(), 3);
        assert_eq!(root.blocks[0].access, Access::NamedChain("mid".into()));
        assert_eq!(
            root.blocks[1].access,
            Access::ResolvedChain(ForeignKeyChain::new(
                vec![
                    KeyReference::qualified("a_id", "d"),
                    KeyReference::qualified("d_id", "e"),
                ],
                "e",
            ))
        );
        assert_eq!(root.blocks[1].target, "e");
        assert!(!root.blocks[2].is_many);
        assert_eq!(root.blocks[2].access, Access::DirectTable);
    }

    #[test]
    fn test_rename_before_keyword_named_columns() {
        let input = "query q { r: root* { renamed: name order limit via, kids: kid* { id } } }";
        let doc = Parser::new(input).unwrap().parse().unwrap();
        let root = &doc.queries[0].root;
        assert_eq!(
            root.columns,
            vec![
                QueryColumn::new("name", "renamed"),
                QueryColumn::same("order"),
                QueryColumn::same("limit"),
                QueryColumn::same("via"),
            ]
        );
        assert_eq!(root.blocks[0].display, "kids");
    }

    #[test]
    fn test_self_reference_directions() {
        let input = r#"
            query org {
                people: employee* {
                    boss: [manager_id local] -> employee { name }
                    reports: [employee.manager_id remote] -> employee* { name }
                }
            }
        "#;
        let doc = Parser::new(input).unwrap().parse().unwrap();
        let blocks = &doc.queries[0].root.blocks;
        assert_eq!(
            blocks[0].access,
            Access::ResolvedChain(ForeignKeyChain::new(
                vec![KeyReference::new("manager_id").direction(Direction::Local)],
                "employee",
            ))
        );
        assert!(matches!(
            &blocks[1].access,
            Access::ResolvedChain(chain)
                if chain.references[0].direction == Some(Direction::Remote)
                    && chain.references[0].table.as_deref() == Some("employee")
        ));
        assert!(blocks[1].is_many);
    }

    #[test]
    fn test_varchar_length_out_of_range() {
        let input = "table t { id int pk  name varchar(5000000000) }";
        assert!(matches!(
            Parser::new(input).unwrap().parse(),
            Err(ParseError::Unexpected(Token::Num(5000000000), _))
        ));
    }

    #[test]
    fn test_unknown_argument() {
        let input = "query q(id: int) { r: root where id = $nope { id } }";
        assert!(matches!(
            Parser::new(input).unwrap().parse(),
            Err(ParseError::UnknownArgument { ref name, .. }) if name == "nope"
        ));
    }

    #[test]
    fn test_unterminated_block() {
        let input = "query q { r: root { id ";
        assert!(matches!(
            Parser::new(input).unwrap().parse(),
            Err(ParseError::UnexpectedEof)
        ));
    }
}
