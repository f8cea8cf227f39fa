//! AST produced by the bundled SQL parser.

/// A parsed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    CreateTable(CreateTable),
    CreateIndex(CreateIndex),
}

/// Common table expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Cte {
    pub name: String,
    pub columns: Vec<String>,
    pub query: Box<Select>,
}

/// SELECT statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Select {
    pub recursive: bool,
    pub ctes: Vec<Cte>,
    pub distinct: bool,
    pub items: Vec<SelectItem>,
    pub from: Option<TableRef>,
    pub joins: Vec<Join>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

/// One entry of the select list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// Bare `*`.
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

/// Table reference with optional alias.
#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: TableRef,
    /// Absent for CROSS joins.
    pub on: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub descending: bool,
}

/// INSERT with one or more row tuples.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub where_clause: Option<Expr>,
}

/// CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    pub table: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnSpec>,
    pub constraints: Vec<TableConstraint>,
}

impl CreateTable {
    /// All primary-key column names: the table-level constraint when
    /// present, otherwise the inline-marked columns.
    #[must_use]
    pub fn primary_key_columns(&self) -> Vec<&str> {
        for constraint in &self.constraints {
            if let TableConstraint::PrimaryKey(cols) = constraint {
                return cols.iter().map(String::as_str).collect();
            }
        }
        self.columns
            .iter()
            .filter(|c| c.inline_primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One column of a CREATE TABLE.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    /// Type name plus any parenthesized arguments, e.g. `VARCHAR(40)`.
    pub type_name: String,
    pub not_null: bool,
    pub unique: bool,
    pub inline_primary_key: bool,
    pub autoincrement: bool,
    pub default: Option<Expr>,
    pub check: Option<Expr>,
    /// Computed column expression (`AS (...)`).
    pub computed: Option<Expr>,
}

/// Table-level constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum TableConstraint {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    ForeignKey {
        name: Option<String>,
        columns: Vec<String>,
        referenced_table: String,
        referenced_columns: Vec<String>,
        on_delete: Option<String>,
        on_update: Option<String>,
    },
    Check {
        name: Option<String>,
        expr: Expr,
    },
}

/// CREATE INDEX.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndex {
    pub name: String,
    pub unique: bool,
    pub if_not_exists: bool,
    pub table: String,
    pub columns: Vec<OrderItem>,
    pub where_clause: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    Is,
    IsNot,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(String),
    String(String),
    Null,
    /// Possibly qualified identifier (`alias.Column` keeps both parts).
    Identifier(Vec<String>),
    /// Named placeholder `@name`.
    Parameter(String),
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Function call; `IN` lists are uniformly represented as a call named
    /// `IN` with arguments `[left, v1, v2, …]`.
    Call {
        name: String,
        args: Vec<Expr>,
    },
    /// Bare `*` inside a call argument list (`COUNT(*)`).
    Wildcard,
    Case {
        whens: Vec<(Expr, Expr)>,
        else_expr: Option<Box<Expr>>,
    },
    Subquery(Box<Select>),
    Exists(Box<Select>),
}

impl Expr {
    /// Column name when this node is a (possibly qualified) identifier.
    #[must_use]
    pub fn column_name(&self) -> Option<&str> {
        match self {
            Self::Identifier(parts) => parts.last().map(String::as_str),
            _ => None,
        }
    }
}
