//! Recursive-descent statement parser
//!
//! Keywords match case-insensitively; identifiers stay as written. Every
//! production consumes the tokens it recognizes and anything left over at
//! the end of the line (after an optional `;`) is a parse error.

use super::ast::{Literal, Projection, ScanOrder, Statement, TableRef};
use super::token::{tokenize, Token};
use crate::error::{LodeError, Result};
use crate::value::DataType;

/// Parse one statement line
pub fn parse(input: &str) -> Result<Statement> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let statement = parser.statement()?;
    parser.finish()?;
    Ok(statement)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    // =========================================================================
    // Statement dispatch
    // =========================================================================

    fn statement(&mut self) -> Result<Statement> {
        let head = match self.peek_word() {
            Some(word) => word.to_ascii_lowercase(),
            None => return Err(err("expected a statement")),
        };
        match head.as_str() {
            "ping" => {
                self.bump();
                Ok(Statement::Ping)
            }
            "auth" => {
                self.bump();
                let username = self.string()?;
                let password = self.string()?;
                Ok(Statement::Auth { username, password })
            }
            "use" => {
                self.bump();
                let keyspace = self.ident()?;
                Ok(Statement::Use { keyspace })
            }
            "show" => {
                self.bump();
                self.show()
            }
            "describe" => {
                self.bump();
                self.expect_keyword("TABLE")?;
                let table = self.table_ref()?;
                Ok(Statement::DescribeTable { table })
            }
            "create" => {
                self.bump();
                self.create()
            }
            "drop" => {
                self.bump();
                self.drop_object()
            }
            "truncate" => {
                self.bump();
                self.expect_keyword("TABLE")?;
                let table = self.table_ref()?;
                Ok(Statement::TruncateTable { table })
            }
            "insert" => {
                self.bump();
                self.insert()
            }
            "select" => {
                self.bump();
                self.select()
            }
            "update" => {
                self.bump();
                self.update()
            }
            "delete" => {
                self.bump();
                self.expect_keyword("FROM")?;
                let table = self.table_ref()?;
                self.expect_keyword("WHERE")?;
                let filter = self.equality()?;
                Ok(Statement::Delete { table, filter })
            }
            "flush" => {
                self.bump();
                let table = self.table_ref()?;
                Ok(Statement::Flush { table })
            }
            other => Err(err(&format!("unknown statement \"{}\"", other))),
        }
    }

    fn show(&mut self) -> Result<Statement> {
        if self.eat_keyword("KEYSPACES") {
            return Ok(Statement::ShowKeyspaces);
        }
        if self.eat_keyword("TABLES") {
            self.expect_keyword("IN")?;
            let keyspace = self.ident()?;
            return Ok(Statement::ShowTables { keyspace });
        }
        if self.eat_keyword("CREATE") {
            self.expect_keyword("TABLE")?;
            let table = self.table_ref()?;
            return Ok(Statement::ShowCreateTable { table });
        }
        Err(err("expected KEYSPACES, TABLES, or CREATE after SHOW"))
    }

    fn create(&mut self) -> Result<Statement> {
        if self.eat_keyword("KEYSPACE") {
            let if_not_exists = self.if_not_exists()?;
            let keyspace = self.ident()?;
            return Ok(Statement::CreateKeyspace {
                keyspace,
                if_not_exists,
            });
        }
        if self.eat_keyword("TABLE") {
            let if_not_exists = self.if_not_exists()?;
            return self.create_table(if_not_exists);
        }
        Err(err("expected KEYSPACE or TABLE after CREATE"))
    }

    fn create_table(&mut self, if_not_exists: bool) -> Result<Statement> {
        let table = self.table_ref()?;
        self.expect(Token::LParen)?;

        let mut columns: Vec<(String, DataType)> = Vec::new();
        let mut primary_key: Option<String> = None;
        loop {
            if self.eat_keyword("PRIMARY") {
                self.expect_keyword("KEY")?;
                self.expect(Token::LParen)?;
                let pk = self.ident()?;
                self.expect(Token::RParen)?;
                if primary_key.replace(pk).is_some() {
                    return Err(err("duplicate PRIMARY KEY clause"));
                }
            } else {
                let name = self.ident()?;
                let type_word = self.ident()?;
                let data_type = DataType::parse(&type_word)
                    .ok_or_else(|| err(&format!("unknown column type \"{}\"", type_word)))?;
                columns.push((name, data_type));
            }
            if self.eat(Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            break;
        }

        let primary_key = primary_key.ok_or_else(|| err("missing PRIMARY KEY clause"))?;
        if columns.is_empty() {
            return Err(err("a table needs at least one column"));
        }
        Ok(Statement::CreateTable {
            table,
            columns,
            primary_key,
            if_not_exists,
        })
    }

    fn drop_object(&mut self) -> Result<Statement> {
        if self.eat_keyword("KEYSPACE") {
            let if_exists = self.if_exists()?;
            let keyspace = self.ident()?;
            return Ok(Statement::DropKeyspace {
                keyspace,
                if_exists,
            });
        }
        if self.eat_keyword("TABLE") {
            let if_exists = self.if_exists()?;
            let table = self.table_ref()?;
            return Ok(Statement::DropTable { table, if_exists });
        }
        Err(err("expected KEYSPACE or TABLE after DROP"))
    }

    fn insert(&mut self) -> Result<Statement> {
        self.expect_keyword("INTO")?;
        let table = self.table_ref()?;

        self.expect(Token::LParen)?;
        let mut columns = vec![self.ident()?];
        while self.eat(Token::Comma) {
            columns.push(self.ident()?);
        }
        self.expect(Token::RParen)?;

        self.expect_keyword("VALUES")?;
        let mut rows = vec![self.tuple()?];
        while self.eat(Token::Comma) {
            rows.push(self.tuple()?);
        }
        Ok(Statement::Insert {
            table,
            columns,
            rows,
        })
    }

    fn tuple(&mut self) -> Result<Vec<Literal>> {
        self.expect(Token::LParen)?;
        let mut values = vec![self.literal()?];
        while self.eat(Token::Comma) {
            values.push(self.literal()?);
        }
        self.expect(Token::RParen)?;
        Ok(values)
    }

    fn select(&mut self) -> Result<Statement> {
        let projection = if self.eat(Token::Star) {
            Projection::All
        } else {
            let mut columns = vec![self.ident()?];
            while self.eat(Token::Comma) {
                columns.push(self.ident()?);
            }
            Projection::Columns(columns)
        };
        self.expect_keyword("FROM")?;
        let table = self.table_ref()?;

        let filter = if self.eat_keyword("WHERE") {
            Some(self.equality()?)
        } else {
            None
        };
        let order = if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            let column = self.ident()?;
            let direction = if self.eat_keyword("DESC") {
                ScanOrder::Descending
            } else {
                self.eat_keyword("ASC");
                ScanOrder::Ascending
            };
            Some((column, direction))
        } else {
            None
        };
        let limit = if self.eat_keyword("LIMIT") {
            match self.bump() {
                Some(Token::Number(n)) if n >= 0 => Some(n as u64),
                _ => return Err(err("LIMIT takes a non-negative integer")),
            }
        } else {
            None
        };

        Ok(Statement::Select {
            table,
            projection,
            filter,
            order,
            limit,
        })
    }

    fn update(&mut self) -> Result<Statement> {
        let table = self.table_ref()?;
        self.expect_keyword("SET")?;
        let mut assignments = vec![self.equality()?];
        while self.eat(Token::Comma) {
            assignments.push(self.equality()?);
        }
        self.expect_keyword("WHERE")?;
        let filter = self.equality()?;
        Ok(Statement::Update {
            table,
            assignments,
            filter,
        })
    }

    // =========================================================================
    // Shared productions
    // =========================================================================

    /// `<ident> = <literal>`
    fn equality(&mut self) -> Result<(String, Literal)> {
        let column = self.ident()?;
        self.expect(Token::Eq)?;
        let literal = self.literal()?;
        Ok((column, literal))
    }

    fn table_ref(&mut self) -> Result<TableRef> {
        let first = self.ident()?;
        if self.eat(Token::Dot) {
            let table = self.ident()?;
            Ok(TableRef {
                keyspace: Some(first),
                table,
            })
        } else {
            Ok(TableRef {
                keyspace: None,
                table: first,
            })
        }
    }

    fn literal(&mut self) -> Result<Literal> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(Literal::Int(n)),
            Some(Token::Str(s)) => Ok(Literal::Str(s)),
            Some(Token::Hex(b)) => Ok(Literal::Bytes(b)),
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("true") => Ok(Literal::Bool(true)),
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("false") => Ok(Literal::Bool(false)),
            Some(Token::Ident(w)) if w.eq_ignore_ascii_case("null") => Ok(Literal::Null),
            _ => Err(err("expected a literal")),
        }
    }

    fn if_not_exists(&mut self) -> Result<bool> {
        if self.eat_keyword("IF") {
            self.expect_keyword("NOT")?;
            self.expect_keyword("EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn if_exists(&mut self) -> Result<bool> {
        if self.eat_keyword("IF") {
            self.expect_keyword("EXISTS")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // =========================================================================
    // Token plumbing
    // =========================================================================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_word(&self) -> Option<&str> {
        match self.peek() {
            Some(Token::Ident(w)) => Some(w),
            _ => None,
        }
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.peek() == Some(&token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        if self.eat(token.clone()) {
            Ok(())
        } else {
            Err(err(&format!("expected {:?}", token)))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek_word() {
            Some(word) if word.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(err(&format!("expected {}", keyword)))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::Ident(w)) => Ok(w),
            _ => Err(err("expected an identifier")),
        }
    }

    fn string(&mut self) -> Result<String> {
        match self.bump() {
            Some(Token::Str(s)) => Ok(s),
            _ => Err(err("expected a string literal")),
        }
    }

    /// Optional `;`, then end of line
    fn finish(&mut self) -> Result<()> {
        while self.eat(Token::Semi) {}
        if self.pos < self.tokens.len() {
            return Err(err("unexpected trailing input"));
        }
        Ok(())
    }
}

fn err(msg: &str) -> LodeError {
    LodeError::Parse(msg.to_string())
}
