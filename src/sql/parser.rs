//! Recursive-descent parser over the lexed token stream.
//!
//! Covers the dialect the engine generates: SELECT (with CTEs, joins,
//! grouping, ordering, limits), INSERT with multi-row VALUES, UPDATE,
//! DELETE, CREATE TABLE and CREATE INDEX. Precedence, highest to lowest:
//! unary sign, `* / %`, `+ -`, comparison/LIKE/IN/IS, NOT, AND, OR, all
//! left-associative.

use super::ParseError;
use super::ast::{
    BinaryOp, ColumnSpec, CreateIndex, CreateTable, Cte, Delete, Expr, Insert, Join, JoinKind,
    OrderItem, Select, SelectItem, Statement, TableConstraint, TableRef, UnaryOp, Update,
};
use super::lexer::lex;
use super::token::{Keyword, Token};

/// Parse a single statement.
///
/// # Errors
///
/// Returns [`ParseError`] with the expected token kind and position on any
/// mismatch.
pub fn parse(input: &str) -> Result<Statement, ParseError> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let statement = parser.statement()?;
    parser.eat(&Token::Semicolon);
    parser.expect(&Token::Eof)?;
    Ok(statement)
}

/// Parse a standalone expression (used by predicate round-trip tests).
///
/// # Errors
///
/// Returns [`ParseError`] on any mismatch or trailing input.
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    let tokens = lex(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.expr()?;
    parser.expect(&Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_ahead(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&Token::Keyword(keyword))
    }

    fn expect(&mut self, token: &Token) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&token.describe()))
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        self.expect(&Token::Keyword(keyword))
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Identifier(name) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("an identifier")),
        }
    }

    fn error(&self, expected: &str) -> ParseError {
        ParseError::at(self.pos, expected, &self.peek().describe())
    }

    // ── statements ─────────────────────────────────────────────

    fn statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek() {
            Token::Keyword(Keyword::SELECT | Keyword::WITH) => {
                Ok(Statement::Select(self.select()?))
            }
            Token::Keyword(Keyword::INSERT) => Ok(Statement::Insert(self.insert()?)),
            Token::Keyword(Keyword::UPDATE) => Ok(Statement::Update(self.update()?)),
            Token::Keyword(Keyword::DELETE) => Ok(Statement::Delete(self.delete()?)),
            Token::Keyword(Keyword::CREATE) => self.create(),
            _ => Err(self.error("SELECT, INSERT, UPDATE, DELETE or CREATE")),
        }
    }

    fn select(&mut self) -> Result<Select, ParseError> {
        let mut select = Select::default();

        if self.eat_keyword(Keyword::WITH) {
            select.recursive = self.eat_keyword(Keyword::RECURSIVE);
            loop {
                select.ctes.push(self.cte()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        self.expect_keyword(Keyword::SELECT)?;
        select.distinct = self.eat_keyword(Keyword::DISTINCT);

        loop {
            select.items.push(self.select_item()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        if self.eat_keyword(Keyword::FROM) {
            select.from = Some(self.table_ref()?);
            while let Some(join) = self.join()? {
                select.joins.push(join);
            }
        }

        if self.eat_keyword(Keyword::WHERE) {
            select.where_clause = Some(self.expr()?);
        }

        if self.eat_keyword(Keyword::GROUP) {
            self.expect_keyword(Keyword::BY)?;
            loop {
                select.group_by.push(self.expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        if self.eat_keyword(Keyword::HAVING) {
            select.having = Some(self.expr()?);
        }

        if self.eat_keyword(Keyword::ORDER) {
            self.expect_keyword(Keyword::BY)?;
            loop {
                select.order_by.push(self.order_item()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }

        if self.eat_keyword(Keyword::LIMIT) {
            select.limit = Some(self.expr()?);
        }
        if self.eat_keyword(Keyword::OFFSET) {
            select.offset = Some(self.expr()?);
        }

        Ok(select)
    }

    fn cte(&mut self) -> Result<Cte, ParseError> {
        let name = self.expect_identifier()?;
        let mut columns = Vec::new();
        if self.eat(&Token::LParen) {
            loop {
                columns.push(self.expect_identifier()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }
        self.expect_keyword(Keyword::AS)?;
        self.expect(&Token::LParen)?;
        let query = self.select()?;
        self.expect(&Token::RParen)?;
        Ok(Cte {
            name,
            columns,
            query: Box::new(query),
        })
    }

    fn select_item(&mut self) -> Result<SelectItem, ParseError> {
        if self.eat(&Token::Star) {
            return Ok(SelectItem::Wildcard);
        }
        let expr = self.expr()?;
        let alias = if self.eat_keyword(Keyword::AS) {
            Some(self.expect_identifier()?)
        } else if let Token::Identifier(name) = self.peek().clone() {
            self.pos += 1;
            Some(name)
        } else {
            None
        };
        Ok(SelectItem::Expr { expr, alias })
    }

    fn table_ref(&mut self) -> Result<TableRef, ParseError> {
        let name = self.expect_identifier()?;
        let alias = if self.eat_keyword(Keyword::AS) {
            Some(self.expect_identifier()?)
        } else if let Token::Identifier(alias) = self.peek().clone() {
            self.pos += 1;
            Some(alias)
        } else {
            None
        };
        Ok(TableRef { name, alias })
    }

    /// A bare JOIN defaults to INNER; CROSS JOIN takes no ON clause.
    fn join(&mut self) -> Result<Option<Join>, ParseError> {
        let kind = match self.peek() {
            Token::Keyword(Keyword::JOIN) => {
                self.pos += 1;
                JoinKind::Inner
            }
            Token::Keyword(Keyword::INNER) => {
                self.pos += 1;
                self.expect_keyword(Keyword::JOIN)?;
                JoinKind::Inner
            }
            Token::Keyword(Keyword::LEFT) => {
                self.pos += 1;
                self.eat_keyword(Keyword::OUTER);
                self.expect_keyword(Keyword::JOIN)?;
                JoinKind::Left
            }
            Token::Keyword(Keyword::RIGHT) => {
                self.pos += 1;
                self.eat_keyword(Keyword::OUTER);
                self.expect_keyword(Keyword::JOIN)?;
                JoinKind::Right
            }
            Token::Keyword(Keyword::FULL) => {
                self.pos += 1;
                self.eat_keyword(Keyword::OUTER);
                self.expect_keyword(Keyword::JOIN)?;
                JoinKind::Full
            }
            Token::Keyword(Keyword::CROSS) => {
                self.pos += 1;
                self.expect_keyword(Keyword::JOIN)?;
                JoinKind::Cross
            }
            _ => return Ok(None),
        };

        let table = self.table_ref()?;
        let on = if kind == JoinKind::Cross {
            None
        } else if self.eat_keyword(Keyword::ON) {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(Some(Join { kind, table, on }))
    }

    fn order_item(&mut self) -> Result<OrderItem, ParseError> {
        let expr = self.expr()?;
        let descending = if self.eat_keyword(Keyword::DESC) {
            true
        } else {
            self.eat_keyword(Keyword::ASC);
            false
        };
        Ok(OrderItem { expr, descending })
    }

    fn insert(&mut self) -> Result<Insert, ParseError> {
        self.expect_keyword(Keyword::INSERT)?;
        self.expect_keyword(Keyword::INTO)?;
        let table = self.expect_identifier()?;

        let mut columns = Vec::new();
        if self.eat(&Token::LParen) {
            loop {
                columns.push(self.expect_identifier()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }

        self.expect_keyword(Keyword::VALUES)?;
        let mut rows = Vec::new();
        loop {
            self.expect(&Token::LParen)?;
            let mut row = Vec::new();
            loop {
                row.push(self.expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
            rows.push(row);
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        Ok(Insert {
            table,
            columns,
            rows,
        })
    }

    fn update(&mut self) -> Result<Update, ParseError> {
        self.expect_keyword(Keyword::UPDATE)?;
        let table = self.expect_identifier()?;
        self.expect_keyword(Keyword::SET)?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_identifier()?;
            self.expect(&Token::Eq)?;
            let value = self.expr()?;
            assignments.push((column, value));
            if !self.eat(&Token::Comma) {
                break;
            }
        }

        let where_clause = if self.eat_keyword(Keyword::WHERE) {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(Update {
            table,
            assignments,
            where_clause,
        })
    }

    fn delete(&mut self) -> Result<Delete, ParseError> {
        self.expect_keyword(Keyword::DELETE)?;
        self.expect_keyword(Keyword::FROM)?;
        let table = self.expect_identifier()?;
        let where_clause = if self.eat_keyword(Keyword::WHERE) {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(Delete {
            table,
            where_clause,
        })
    }

    fn create(&mut self) -> Result<Statement, ParseError> {
        self.expect_keyword(Keyword::CREATE)?;
        let unique = self.eat_keyword(Keyword::UNIQUE);
        if self.eat_keyword(Keyword::TABLE) {
            if unique {
                return Err(self.error("INDEX after UNIQUE"));
            }
            Ok(Statement::CreateTable(self.create_table()?))
        } else if self.eat_keyword(Keyword::INDEX) {
            Ok(Statement::CreateIndex(self.create_index(unique)?))
        } else {
            Err(self.error("TABLE or INDEX"))
        }
    }

    fn if_not_exists(&mut self) -> Result<bool, ParseError> {
        if self.eat_keyword(Keyword::IF) {
            self.expect_keyword(Keyword::NOT)?;
            self.expect_keyword(Keyword::EXISTS)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn create_table(&mut self) -> Result<CreateTable, ParseError> {
        let if_not_exists = self.if_not_exists()?;
        let table = self.expect_identifier()?;
        self.expect(&Token::LParen)?;

        let mut columns = Vec::new();
        let mut constraints = Vec::new();
        loop {
            match self.peek() {
                Token::Keyword(
                    Keyword::CONSTRAINT
                    | Keyword::PRIMARY
                    | Keyword::FOREIGN
                    | Keyword::CHECK
                    | Keyword::UNIQUE,
                ) => constraints.push(self.table_constraint()?),
                _ => columns.push(self.column_spec()?),
            }
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;

        Ok(CreateTable {
            table,
            if_not_exists,
            columns,
            constraints,
        })
    }

    fn column_spec(&mut self) -> Result<ColumnSpec, ParseError> {
        let name = self.expect_identifier()?;
        let mut type_name = self.expect_identifier()?;
        if self.eat(&Token::LParen) {
            let mut args = Vec::new();
            loop {
                match self.advance() {
                    Token::Number(n) => args.push(n),
                    other => {
                        return Err(ParseError::at(
                            self.pos - 1,
                            "a numeric type argument",
                            &other.describe(),
                        ));
                    }
                }
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
            type_name = format!("{type_name}({})", args.join(", "));
        }

        let mut spec = ColumnSpec {
            name,
            type_name,
            not_null: false,
            unique: false,
            inline_primary_key: false,
            autoincrement: false,
            default: None,
            check: None,
            computed: None,
        };

        loop {
            match self.peek() {
                Token::Keyword(Keyword::NOT) => {
                    self.pos += 1;
                    self.expect_keyword(Keyword::NULL)?;
                    spec.not_null = true;
                }
                Token::Keyword(Keyword::UNIQUE) => {
                    self.pos += 1;
                    spec.unique = true;
                }
                Token::Keyword(Keyword::PRIMARY) => {
                    self.pos += 1;
                    self.expect_keyword(Keyword::KEY)?;
                    spec.inline_primary_key = true;
                    spec.autoincrement = self.eat_keyword(Keyword::AUTOINCREMENT);
                }
                Token::Keyword(Keyword::DEFAULT) => {
                    self.pos += 1;
                    spec.default = Some(self.unary()?);
                }
                Token::Keyword(Keyword::CHECK) => {
                    self.pos += 1;
                    self.expect(&Token::LParen)?;
                    spec.check = Some(self.expr()?);
                    self.expect(&Token::RParen)?;
                }
                Token::Keyword(Keyword::AS) => {
                    self.pos += 1;
                    self.expect(&Token::LParen)?;
                    spec.computed = Some(self.expr()?);
                    self.expect(&Token::RParen)?;
                }
                _ => break,
            }
        }

        Ok(spec)
    }

    fn table_constraint(&mut self) -> Result<TableConstraint, ParseError> {
        let name = if self.eat_keyword(Keyword::CONSTRAINT) {
            Some(self.expect_identifier()?)
        } else {
            None
        };

        match self.peek() {
            Token::Keyword(Keyword::PRIMARY) => {
                self.pos += 1;
                self.expect_keyword(Keyword::KEY)?;
                Ok(TableConstraint::PrimaryKey(self.identifier_list()?))
            }
            Token::Keyword(Keyword::UNIQUE) => {
                self.pos += 1;
                Ok(TableConstraint::Unique(self.identifier_list()?))
            }
            Token::Keyword(Keyword::FOREIGN) => {
                self.pos += 1;
                self.expect_keyword(Keyword::KEY)?;
                let columns = self.identifier_list()?;
                self.expect_keyword(Keyword::REFERENCES)?;
                let referenced_table = self.expect_identifier()?;
                let referenced_columns = self.identifier_list()?;

                let mut on_delete = None;
                let mut on_update = None;
                while self.eat_keyword(Keyword::ON) {
                    match self.advance() {
                        Token::Keyword(Keyword::DELETE) => on_delete = Some(self.fk_action()?),
                        Token::Keyword(Keyword::UPDATE) => on_update = Some(self.fk_action()?),
                        other => {
                            return Err(ParseError::at(
                                self.pos - 1,
                                "DELETE or UPDATE",
                                &other.describe(),
                            ));
                        }
                    }
                }

                Ok(TableConstraint::ForeignKey {
                    name,
                    columns,
                    referenced_table,
                    referenced_columns,
                    on_delete,
                    on_update,
                })
            }
            Token::Keyword(Keyword::CHECK) => {
                self.pos += 1;
                self.expect(&Token::LParen)?;
                let expr = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(TableConstraint::Check { name, expr })
            }
            _ => Err(self.error("PRIMARY, UNIQUE, FOREIGN or CHECK")),
        }
    }

    fn fk_action(&mut self) -> Result<String, ParseError> {
        if self.eat_keyword(Keyword::SET) {
            self.expect_keyword(Keyword::NULL)?;
            return Ok("SET NULL".to_string());
        }
        let first = self.expect_identifier()?;
        if first.eq_ignore_ascii_case("NO") {
            let second = self.expect_identifier()?;
            return Ok(format!("{} {}", first.to_uppercase(), second.to_uppercase()));
        }
        Ok(first.to_uppercase())
    }

    fn identifier_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&Token::LParen)?;
        let mut names = Vec::new();
        loop {
            names.push(self.expect_identifier()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(names)
    }

    fn create_index(&mut self, unique: bool) -> Result<CreateIndex, ParseError> {
        let if_not_exists = self.if_not_exists()?;
        let name = self.expect_identifier()?;
        self.expect_keyword(Keyword::ON)?;
        let table = self.expect_identifier()?;

        self.expect(&Token::LParen)?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.order_item()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;

        let where_clause = if self.eat_keyword(Keyword::WHERE) {
            Some(self.expr()?)
        } else {
            None
        };

        Ok(CreateIndex {
            name,
            unique,
            if_not_exists,
            table,
            columns,
            where_clause,
        })
    }

    // ── expressions ────────────────────────────────────────────

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.and()?;
        while self.eat_keyword(Keyword::OR) {
            let right = self.and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.not()?;
        while self.eat_keyword(Keyword::AND) {
            let right = self.not()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ParseError> {
        if self.eat_keyword(Keyword::NOT) {
            let expr = self.not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                Token::Keyword(Keyword::LIKE) => BinaryOp::Like,
                Token::Keyword(Keyword::IS) => {
                    self.pos += 1;
                    let negated = self.eat_keyword(Keyword::NOT);
                    self.expect_keyword(Keyword::NULL)?;
                    left = Expr::Binary {
                        op: if negated { BinaryOp::IsNot } else { BinaryOp::Is },
                        left: Box::new(left),
                        right: Box::new(Expr::Null),
                    };
                    continue;
                }
                Token::Keyword(Keyword::IN) => {
                    self.pos += 1;
                    left = self.in_list(left)?;
                    continue;
                }
                _ => break,
            };
            self.pos += 1;
            let right = self.additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
            // LIKE may carry an ESCAPE clause; the escape literal is not
            // kept in the AST.
            if op == BinaryOp::Like && self.eat_keyword(Keyword::ESCAPE) {
                match self.advance() {
                    Token::StringLit(_) => {}
                    other => {
                        return Err(ParseError::at(
                            self.pos - 1,
                            "a string escape character",
                            &other.describe(),
                        ));
                    }
                }
            }
        }
        Ok(left)
    }

    /// `IN` is represented as a call node named `IN` with arguments
    /// `[left, v1, v2, …]` (or `[left, subquery]`).
    fn in_list(&mut self, left: Expr) -> Result<Expr, ParseError> {
        self.expect(&Token::LParen)?;
        let mut args = vec![left];
        if matches!(self.peek(), Token::Keyword(Keyword::SELECT | Keyword::WITH)) {
            args.push(Expr::Subquery(Box::new(self.select()?)));
        } else {
            loop {
                args.push(self.expr()?);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(&Token::RParen)?;
        Ok(Expr::Call {
            name: "IN".to_string(),
            args,
        })
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Token::Plus => {
                self.pos += 1;
                let expr = self.primary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Plus,
                    expr: Box::new(expr),
                })
            }
            Token::Minus => {
                self.pos += 1;
                let expr = self.primary()?;
                Ok(Expr::Unary {
                    op: UnaryOp::Minus,
                    expr: Box::new(expr),
                })
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Token::StringLit(s) => {
                self.pos += 1;
                Ok(Expr::String(s))
            }
            Token::Parameter(p) => {
                self.pos += 1;
                Ok(Expr::Parameter(p))
            }
            Token::Star => {
                self.pos += 1;
                Ok(Expr::Wildcard)
            }
            Token::Keyword(Keyword::NULL) => {
                self.pos += 1;
                Ok(Expr::Null)
            }
            Token::Keyword(Keyword::CASE) => self.case(),
            Token::Keyword(Keyword::EXISTS) => {
                self.pos += 1;
                self.expect(&Token::LParen)?;
                let select = self.select()?;
                self.expect(&Token::RParen)?;
                Ok(Expr::Exists(Box::new(select)))
            }
            Token::LParen => {
                self.pos += 1;
                if matches!(self.peek(), Token::Keyword(Keyword::SELECT | Keyword::WITH)) {
                    let select = self.select()?;
                    self.expect(&Token::RParen)?;
                    Ok(Expr::Subquery(Box::new(select)))
                } else {
                    let expr = self.expr()?;
                    self.expect(&Token::RParen)?;
                    Ok(expr)
                }
            }
            Token::Identifier(_) => self.identifier_or_call(),
            _ => Err(self.error("an expression")),
        }
    }

    fn case(&mut self) -> Result<Expr, ParseError> {
        self.expect_keyword(Keyword::CASE)?;
        let mut whens = Vec::new();
        while self.eat_keyword(Keyword::WHEN) {
            let when = self.expr()?;
            self.expect_keyword(Keyword::THEN)?;
            let then = self.expr()?;
            whens.push((when, then));
        }
        let else_expr = if self.eat_keyword(Keyword::ELSE) {
            Some(Box::new(self.expr()?))
        } else {
            None
        };
        self.expect_keyword(Keyword::END)?;
        Ok(Expr::Case { whens, else_expr })
    }

    fn identifier_or_call(&mut self) -> Result<Expr, ParseError> {
        let first = self.expect_identifier()?;

        if self.peek() == &Token::LParen && self.peek_ahead(1) != &Token::Keyword(Keyword::SELECT) {
            self.pos += 1;
            let mut args = Vec::new();
            if self.peek() != &Token::RParen {
                loop {
                    args.push(self.expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
            }
            self.expect(&Token::RParen)?;
            return Ok(Expr::Call { name: first, args });
        }

        let mut parts = vec![first];
        while self.eat(&Token::Dot) {
            parts.push(self.expect_identifier()?);
        }
        Ok(Expr::Identifier(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_select() {
        let Statement::Select(select) = parse("SELECT * FROM Users").expect("parse") else {
            panic!("expected select");
        };
        assert_eq!(select.items, vec![SelectItem::Wildcard]);
        assert_eq!(select.from.as_ref().map(|t| t.name.as_str()), Some("Users"));
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        let expr = parse_expression("a = 1 OR b = 2 AND c = 3").expect("parse");
        let Expr::Binary { op: BinaryOp::Or, right, .. } = expr else {
            panic!("OR should be the root");
        };
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn precedence_arithmetic_over_comparison() {
        let expr = parse_expression("a + 1 * 2 < b").expect("parse");
        let Expr::Binary { op: BinaryOp::Lt, left, .. } = expr else {
            panic!("comparison should be the root");
        };
        let Expr::Binary { op: BinaryOp::Add, right, .. } = *left else {
            panic!("addition under comparison");
        };
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn in_becomes_a_call_node() {
        let expr = parse_expression("Status IN ('a', 'b', 'c')").expect("parse");
        let Expr::Call { name, args } = expr else {
            panic!("IN should be a call");
        };
        assert_eq!(name, "IN");
        assert_eq!(args.len(), 4);
        assert_eq!(args[0].column_name(), Some("Status"));
    }

    #[test]
    fn case_with_else() {
        let expr =
            parse_expression("CASE WHEN a = 1 THEN 'one' ELSE 'other' END").expect("parse");
        let Expr::Case { whens, else_expr } = expr else {
            panic!("expected case");
        };
        assert_eq!(whens.len(), 1);
        assert!(else_expr.is_some());
    }

    #[test]
    fn joins_default_to_inner() {
        let Statement::Select(select) =
            parse("SELECT * FROM a JOIN b ON a.id = b.id LEFT JOIN c ON b.id = c.id")
                .expect("parse")
        else {
            panic!("expected select");
        };
        assert_eq!(select.joins.len(), 2);
        assert_eq!(select.joins[0].kind, JoinKind::Inner);
        assert_eq!(select.joins[1].kind, JoinKind::Left);
    }

    #[test]
    fn cross_join_has_no_on() {
        let Statement::Select(select) =
            parse("SELECT * FROM a CROSS JOIN b").expect("parse")
        else {
            panic!("expected select");
        };
        assert_eq!(select.joins[0].kind, JoinKind::Cross);
        assert!(select.joins[0].on.is_none());
    }

    #[test]
    fn with_recursive_cte() {
        let Statement::Select(select) = parse(
            "WITH RECURSIVE nums(n) AS (SELECT 1) SELECT n FROM nums LIMIT 10 OFFSET 5",
        )
        .expect("parse") else {
            panic!("expected select");
        };
        assert!(select.recursive);
        assert_eq!(select.ctes.len(), 1);
        assert_eq!(select.ctes[0].columns, vec!["n".to_string()]);
        assert_eq!(select.limit, Some(Expr::Number("10".into())));
        assert_eq!(select.offset, Some(Expr::Number("5".into())));
    }

    #[test]
    fn multi_row_insert_with_parameters() {
        let Statement::Insert(insert) = parse(
            "INSERT INTO T (A, B) VALUES (@A_0, @B_0), (@A_1, @B_1)",
        )
        .expect("parse") else {
            panic!("expected insert");
        };
        assert_eq!(insert.columns, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(insert.rows.len(), 2);
        assert_eq!(insert.rows[1][0], Expr::Parameter("A_1".into()));
    }

    #[test]
    fn update_with_arithmetic_assignment() {
        let Statement::Update(update) = parse(
            "UPDATE T SET Version = Version + 1, Title = @Title WHERE Id = @Id AND Version = @V",
        )
        .expect("parse") else {
            panic!("expected update");
        };
        assert_eq!(update.assignments.len(), 2);
        assert!(update.where_clause.is_some());
    }

    #[test]
    fn create_table_with_constraints() {
        let sql = "CREATE TABLE IF NOT EXISTS T (\
            Id TEXT NOT NULL, \
            Amount DECIMAL(10, 2), \
            Version INTEGER NOT NULL DEFAULT 1, \
            Total REAL AS (Amount * 2), \
            PRIMARY KEY (Id, Version), \
            CONSTRAINT FK_T_P FOREIGN KEY (Pid) REFERENCES P (Id) ON DELETE CASCADE, \
            CONSTRAINT CK_T_1 CHECK (Amount >= 0))";
        let Statement::CreateTable(table) = parse(sql).expect("parse") else {
            panic!("expected create table");
        };
        assert!(table.if_not_exists);
        assert_eq!(table.primary_key_columns(), vec!["Id", "Version"]);
        assert_eq!(table.column("Amount").map(|c| c.type_name.as_str()), Some("DECIMAL(10, 2)"));
        assert!(table.column("Total").and_then(|c| c.computed.as_ref()).is_some());
        let fk = table.constraints.iter().find_map(|c| match c {
            TableConstraint::ForeignKey { on_delete, .. } => on_delete.as_deref(),
            _ => None,
        });
        assert_eq!(fk, Some("CASCADE"));
    }

    #[test]
    fn create_partial_index() {
        let sql = "CREATE UNIQUE INDEX IF NOT EXISTS IX_T_A ON T (A DESC, B) WHERE IsDeleted = 0";
        let Statement::CreateIndex(index) = parse(sql).expect("parse") else {
            panic!("expected create index");
        };
        assert!(index.unique);
        assert!(index.if_not_exists);
        assert!(index.columns[0].descending);
        assert!(!index.columns[1].descending);
        assert!(index.where_clause.is_some());
    }

    #[test]
    fn is_null_and_is_not_null() {
        let expr = parse_expression("a IS NULL AND b IS NOT NULL").expect("parse");
        let Expr::Binary { op: BinaryOp::And, left, right } = expr else {
            panic!("expected AND");
        };
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Is, .. }));
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::IsNot, .. }));
    }

    #[test]
    fn subquery_in_comparison() {
        let expr =
            parse_expression("Version = (SELECT MAX(Version) FROM T WHERE Id = @Id)")
                .expect("parse");
        let Expr::Binary { op: BinaryOp::Eq, right, .. } = expr else {
            panic!("expected comparison");
        };
        assert!(matches!(*right, Expr::Subquery(_)));
    }

    #[test]
    fn mismatched_token_reports_expected_and_position() {
        let err = parse("SELECT FROM").expect_err("must fail");
        let msg = err.to_string();
        assert!(msg.contains("expected"), "got: {msg}");
        assert!(msg.contains("position"), "got: {msg}");
    }

    #[test]
    fn distinct_group_by_and_having() {
        let Statement::Select(select) = parse(
            "SELECT DISTINCT Kind, COUNT(*) AS Total FROM Events \
             GROUP BY Kind HAVING COUNT(*) > 10 ORDER BY Total DESC",
        )
        .expect("parse") else {
            panic!("expected select");
        };
        assert!(select.distinct);
        assert_eq!(select.group_by.len(), 1);
        assert!(select.having.is_some());
        let SelectItem::Expr { alias, .. } = &select.items[1] else {
            panic!("expected aliased expression");
        };
        assert_eq!(alias.as_deref(), Some("Total"));
    }

    #[test]
    fn like_with_escape_clause() {
        let expr = parse_expression("Title LIKE @p0 ESCAPE '\\'").expect("parse");
        assert!(matches!(expr, Expr::Binary { op: BinaryOp::Like, .. }));
    }

    #[test]
    fn bracketed_identifiers_parse_as_plain_names() {
        let Statement::Select(select) =
            parse("SELECT [Order] FROM [Order Items] WHERE [Group] = 1").expect("parse")
        else {
            panic!("expected select");
        };
        assert_eq!(
            select.from.as_ref().map(|t| t.name.as_str()),
            Some("Order Items")
        );
    }
}
