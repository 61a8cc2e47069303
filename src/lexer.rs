use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Num(i64),
    Float(f64),

    LBrace,   // {
    RBrace,   // }
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Colon,    // :
    Dot,      // .
    Star,     // *
    Dollar,   // $
    Arrow,    // ->
    Eq,       // =
    NotEq,    // != or <>
    Lt,       // <
    Lte,      // <=
    Gt,       // >
    Gte,      // >=

    Eof,
}

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("Unexpected character: {0}")]
    UnexpectedChar(char),
    #[error("Unterminated string")]
    UnterminatedString,
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn skip_line(&mut self) {
        for c in self.chars.by_ref() {
            if c == '\n' {
                break;
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some('#') => self.skip_line(),
                Some('-') => {
                    // `--` starts a comment, a lone `-` is a token
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.peek() == Some(&'-') {
                        self.skip_line();
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    fn read_ident(&mut self, first: char) -> String {
        let mut s = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }

    fn read_string(&mut self) -> Result<String, LexError> {
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(s),
                Some('\\') => {
                    if let Some(c) = self.chars.next() {
                        match c {
                            'n' => s.push('\n'),
                            't' => s.push('\t'),
                            'r' => s.push('\r'),
                            _ => s.push(c),
                        }
                    }
                }
                Some(c) => s.push(c),
                None => return Err(LexError::UnterminatedString),
            }
        }
    }

    fn read_digits(&mut self, s: &mut String) {
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self, first: String) -> Result<Token, LexError> {
        let mut s = first;
        self.read_digits(&mut s);

        // a dot only belongs to the number when a digit follows it
        let mut ahead = self.chars.clone();
        if ahead.next() == Some('.') && ahead.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.chars.next();
            s.push('.');
            self.read_digits(&mut s);
            return s
                .parse()
                .map(Token::Float)
                .map_err(|_| LexError::InvalidNumber(s));
        }

        s.parse().map(Token::Num).map_err(|_| LexError::InvalidNumber(s))
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        let c = match self.chars.next() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        let next = self.chars.peek().copied();
        let tok = match c {
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            ':' => Token::Colon,
            '.' => Token::Dot,
            '*' => Token::Star,
            '$' => Token::Dollar,
            '=' => Token::Eq,
            '!' => {
                if next == Some('=') {
                    self.chars.next();
                    Token::NotEq
                } else {
                    return Err(LexError::UnexpectedChar(c));
                }
            }
            '<' => match next {
                Some('=') => {
                    self.chars.next();
                    Token::Lte
                }
                Some('>') => {
                    self.chars.next();
                    Token::NotEq
                }
                _ => Token::Lt,
            },
            '>' => {
                if next == Some('=') {
                    self.chars.next();
                    Token::Gte
                } else {
                    Token::Gt
                }
            }
            '-' => match next {
                Some('>') => {
                    self.chars.next();
                    Token::Arrow
                }
                Some(d) if d.is_ascii_digit() => self.read_number(String::from('-'))?,
                _ => return Err(LexError::UnexpectedChar(c)),
            },
            '"' => Token::Str(self.read_string()?),
            c if c.is_ascii_digit() => self.read_number(String::from(c))?,
            c if c.is_alphabetic() || c == '_' => Token::Ident(self.read_ident(c)),
            _ => return Err(LexError::UnexpectedChar(c)),
        };

        Ok(tok)
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            if tok == Token::Eof {
                tokens.push(tok);
                break;
            }
            tokens.push(tok);
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_tokens() {
        let tokens = Lexer::new("table users { }").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("table".into()),
                Token::Ident("users".into()),
                Token::LBrace,
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        let input = "# comment\ntable t { -- inline\n}";
        let tokens = Lexer::new(input).tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("table".into()),
                Token::Ident("t".into()),
                Token::LBrace,
                Token::RBrace,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        let tokens = Lexer::new("= != <> < <= > >= -> $id").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Eq,
                Token::NotEq,
                Token::NotEq,
                Token::Lt,
                Token::Lte,
                Token::Gt,
                Token::Gte,
                Token::Arrow,
                Token::Dollar,
                Token::Ident("id".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens = Lexer::new("2000 -3 1.5 a.id").tokenize().unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Num(2000),
                Token::Num(-3),
                Token::Float(1.5),
                Token::Ident("a".into()),
                Token::Dot,
                Token::Ident("id".into()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_lone_dash() {
        assert!(matches!(
            Lexer::new("a - b").tokenize(),
            Err(LexError::UnexpectedChar('-'))
        ));
    }
}
