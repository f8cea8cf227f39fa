//! Predicate and order-by translation.
//!
//! A [`Predicate`] is a typed boolean expression over an entity's columns.
//! [`translate`] walks it and emits a parameterized SQL fragment with
//! positional placeholders `@p0, @p1, …` assigned to constants in
//! left-to-right order — one parameter per constant leaf, nulls included.
//!
//! Date arithmetic is folded at translation time: a [`Operand::DateAdd`]
//! node captures its receiver when the predicate is built and becomes a
//! single datetime parameter (snapshot semantics, no SQL-side arithmetic).

use chrono::{DateTime, Duration, Utc};

use crate::error::{Result, StrataError};
use crate::schema::escape_identifier;
use crate::value::{Parameters, Value};

/// Comparison operator; inequality renders as the SQL `<>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    const fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Unit for folded date arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

/// A leaf of a comparison: a column reference, a constant, or a
/// date-arithmetic expression on a constant receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(String),
    Constant(Value),
    DateAdd {
        base: DateTime<Utc>,
        unit: DateUnit,
        amount: i64,
    },
}

impl Operand {
    #[must_use]
    pub fn compare(self, op: CompareOp, other: Self) -> Predicate {
        Predicate::Compare {
            op,
            left: self,
            right: other,
        }
    }

    #[must_use]
    pub fn eq(self, other: Self) -> Predicate {
        self.compare(CompareOp::Eq, other)
    }

    #[must_use]
    pub fn ne(self, other: Self) -> Predicate {
        self.compare(CompareOp::Ne, other)
    }

    #[must_use]
    pub fn lt(self, other: Self) -> Predicate {
        self.compare(CompareOp::Lt, other)
    }

    #[must_use]
    pub fn le(self, other: Self) -> Predicate {
        self.compare(CompareOp::Le, other)
    }

    #[must_use]
    pub fn gt(self, other: Self) -> Predicate {
        self.compare(CompareOp::Gt, other)
    }

    #[must_use]
    pub fn ge(self, other: Self) -> Predicate {
        self.compare(CompareOp::Ge, other)
    }
}

/// Column reference operand.
#[must_use]
pub fn col(name: &str) -> Operand {
    Operand::Column(name.to_string())
}

/// Constant operand.
#[must_use]
pub fn val(value: impl Into<Value>) -> Operand {
    Operand::Constant(value.into())
}

/// Date-arithmetic operand on a constant receiver, e.g.
/// `date_add(Utc::now(), DateUnit::Days, -90)`.
#[must_use]
pub fn date_add(base: DateTime<Utc>, unit: DateUnit, amount: i64) -> Operand {
    Operand::DateAdd { base, unit, amount }
}

/// Typed boolean expression over one entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
    /// `column LIKE '%needle%'` with pattern metacharacters escaped.
    Contains { column: String, needle: String },
    /// `column LIKE 'prefix%'`.
    StartsWith { column: String, prefix: String },
    /// `column LIKE '%suffix'`.
    EndsWith { column: String, suffix: String },
    /// `column IN (@p0, @p1, …)`, one parameter per element.
    InValues { column: String, values: Vec<Value> },
}

impl Predicate {
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    #[must_use]
    pub fn contains(column: &str, needle: &str) -> Self {
        Self::Contains {
            column: column.to_string(),
            needle: needle.to_string(),
        }
    }

    #[must_use]
    pub fn starts_with(column: &str, prefix: &str) -> Self {
        Self::StartsWith {
            column: column.to_string(),
            prefix: prefix.to_string(),
        }
    }

    #[must_use]
    pub fn ends_with(column: &str, suffix: &str) -> Self {
        Self::EndsWith {
            column: column.to_string(),
            suffix: suffix.to_string(),
        }
    }

    #[must_use]
    pub fn in_values(column: &str, values: Vec<Value>) -> Self {
        Self::InValues {
            column: column.to_string(),
            values,
        }
    }
}

/// One key of an order-by chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderKey {
    pub column: String,
    pub descending: bool,
}

impl OrderKey {
    #[must_use]
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: false,
        }
    }

    #[must_use]
    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            descending: true,
        }
    }
}

/// A translated SQL fragment and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Parameters,
}

/// Translate `predicate` into a WHERE fragment.
///
/// With `alias` set, column references are prefixed (`t.Column`); references
/// already carrying a qualifier are left alone.
///
/// # Errors
///
/// Returns `InvalidArgument` on an untranslatable subtree, e.g. an empty
/// `IN` list.
pub fn translate(predicate: &Predicate, alias: Option<&str>) -> Result<SqlFragment> {
    let mut translator = Translator {
        alias,
        params: Parameters::new(),
    };
    let sql = translator.predicate(predicate)?;
    Ok(SqlFragment {
        sql,
        params: translator.params,
    })
}

/// Lower an order-by chain to `col1 ASC, col2 DESC, …` with escaped names.
#[must_use]
pub fn order_by_clause(keys: &[OrderKey], alias: Option<&str>) -> String {
    keys.iter()
        .map(|key| {
            format!(
                "{} {}",
                qualify(&key.column, alias),
                if key.descending { "DESC" } else { "ASC" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

struct Translator<'a> {
    alias: Option<&'a str>,
    params: Parameters,
}

impl Translator<'_> {
    fn predicate(&mut self, predicate: &Predicate) -> Result<String> {
        match predicate {
            Predicate::Compare { op, left, right } => {
                let l = self.operand(left)?;
                let r = self.operand(right)?;
                Ok(format!("{l} {} {r}", op.sql()))
            }
            Predicate::And(left, right) => {
                let l = self.predicate(left)?;
                let r = self.predicate(right)?;
                Ok(format!("({l}) AND ({r})"))
            }
            Predicate::Or(left, right) => {
                let l = self.predicate(left)?;
                let r = self.predicate(right)?;
                Ok(format!("({l}) OR ({r})"))
            }
            Predicate::Not(inner) => {
                let x = self.predicate(inner)?;
                Ok(format!("NOT ({x})"))
            }
            Predicate::Contains { column, needle } => {
                Ok(self.like(column, &format!("%{}%", escape_like(needle)), needle))
            }
            Predicate::StartsWith { column, prefix } => {
                Ok(self.like(column, &format!("{}%", escape_like(prefix)), prefix))
            }
            Predicate::EndsWith { column, suffix } => {
                Ok(self.like(column, &format!("%{}", escape_like(suffix)), suffix))
            }
            Predicate::InValues { column, values } => {
                if values.is_empty() {
                    return Err(StrataError::InvalidArgument(format!(
                        "IN predicate on '{column}' has no values"
                    )));
                }
                let placeholders: Vec<String> = values
                    .iter()
                    .map(|value| self.parameter(value.clone()))
                    .collect();
                Ok(format!(
                    "{} IN ({})",
                    qualify(column, self.alias),
                    placeholders.join(", ")
                ))
            }
        }
    }

    fn operand(&mut self, operand: &Operand) -> Result<String> {
        match operand {
            Operand::Column(name) => Ok(qualify(name, self.alias)),
            Operand::Constant(value) => Ok(self.parameter(value.clone())),
            Operand::DateAdd { base, unit, amount } => {
                let folded = fold_date_add(*base, *unit, *amount)?;
                Ok(self.parameter(Value::DateTime(folded)))
            }
        }
    }

    fn like(&mut self, column: &str, pattern: &str, raw: &str) -> String {
        let placeholder = self.parameter(Value::Text(pattern.to_string()));
        let escaped = raw.contains(['%', '_', '\\']);
        if escaped {
            format!(
                "{} LIKE {placeholder} ESCAPE '\\'",
                qualify(column, self.alias)
            )
        } else {
            format!("{} LIKE {placeholder}", qualify(column, self.alias))
        }
    }

    fn parameter(&mut self, value: Value) -> String {
        let name = format!("@p{}", self.params.len());
        self.params.push((name.clone(), value));
        name
    }
}

fn qualify(column: &str, alias: Option<&str>) -> String {
    // A reference that already carries a qualifier is never re-prefixed.
    if column.contains('.') {
        return column.to_string();
    }
    match alias {
        Some(a) => format!("{a}.{}", escape_identifier(column)),
        None => escape_identifier(column),
    }
}

fn fold_date_add(base: DateTime<Utc>, unit: DateUnit, amount: i64) -> Result<DateTime<Utc>> {
    let delta = match unit {
        DateUnit::Days => Duration::try_days(amount),
        DateUnit::Hours => Duration::try_hours(amount),
        DateUnit::Minutes => Duration::try_minutes(amount),
        DateUnit::Seconds => Duration::try_seconds(amount),
    };
    let delta = delta.ok_or_else(|| {
        StrataError::InvalidArgument(format!("date offset {amount} out of range"))
    })?;
    base.checked_add_signed(delta).ok_or_else(|| {
        StrataError::InvalidArgument(format!("date arithmetic overflow adding {amount}"))
    })
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_of_two_comparisons() {
        let predicate = col("Name").eq(val("Test")).and(col("Status").eq(val("Active")));
        let fragment = translate(&predicate, None).expect("translate");
        assert_eq!(fragment.sql, "(Name = @p0) AND (Status = @p1)");
        assert_eq!(
            fragment.params,
            vec![
                ("@p0".to_string(), Value::Text("Test".into())),
                ("@p1".to_string(), Value::Text("Active".into())),
            ]
        );
    }

    #[test]
    fn parameters_number_constants_left_to_right() {
        let predicate = col("A")
            .gt(val(1))
            .or(col("B").le(val(2)).and(col("C").ne(val(3))));
        let fragment = translate(&predicate, None).expect("translate");
        assert_eq!(fragment.sql, "(A > @p0) OR ((B <= @p1) AND (C <> @p2))");
        let names: Vec<&str> = fragment.params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["@p0", "@p1", "@p2"]);
    }

    #[test]
    fn null_constants_still_take_a_parameter() {
        let predicate = col("Deleted").eq(Operand::Constant(Value::Null));
        let fragment = translate(&predicate, None).expect("translate");
        assert_eq!(fragment.sql, "Deleted = @p0");
        assert_eq!(fragment.params[0].1, Value::Null);
    }

    #[test]
    fn contains_builds_like_pattern() {
        let fragment =
            translate(&Predicate::contains("Title", "draft"), None).expect("translate");
        assert_eq!(fragment.sql, "Title LIKE @p0");
        assert_eq!(fragment.params[0].1, Value::Text("%draft%".into()));
    }

    #[test]
    fn like_metacharacters_are_escaped() {
        let fragment =
            translate(&Predicate::starts_with("Path", "C:\\tmp_100%"), None).expect("translate");
        assert!(fragment.sql.ends_with("ESCAPE '\\'"), "sql: {}", fragment.sql);
        assert_eq!(
            fragment.params[0].1,
            Value::Text("C:\\\\tmp\\_100\\%%".into())
        );
    }

    #[test]
    fn ends_with_pattern() {
        let fragment =
            translate(&Predicate::ends_with("FileName", ".log"), None).expect("translate");
        assert_eq!(fragment.params[0].1, Value::Text("%.log".into()));
    }

    #[test]
    fn not_wraps_in_parentheses() {
        let predicate = col("Age").ge(val(18)).not();
        let fragment = translate(&predicate, None).expect("translate");
        assert_eq!(fragment.sql, "NOT (Age >= @p0)");
    }

    #[test]
    fn alias_prefixes_every_column_once() {
        let predicate = col("Name").eq(val("x")).and(col("t.Status").eq(val("y")));
        let fragment = translate(&predicate, Some("t")).expect("translate");
        assert_eq!(fragment.sql, "(t.Name = @p0) AND (t.Status = @p1)");
    }

    #[test]
    fn reserved_column_names_are_escaped() {
        let predicate = col("Order").eq(val(5));
        let fragment = translate(&predicate, None).expect("translate");
        assert_eq!(fragment.sql, "[Order] = @p0");
    }

    #[test]
    fn date_add_folds_to_a_single_parameter() {
        let base = Utc::now();
        let predicate = col("CreatedTime").ge(date_add(base, DateUnit::Days, -90));
        let fragment = translate(&predicate, None).expect("translate");
        assert_eq!(fragment.sql, "CreatedTime >= @p0");
        let Value::DateTime(folded) = &fragment.params[0].1 else {
            panic!("expected datetime parameter");
        };
        assert_eq!(*folded, base - Duration::try_days(90).unwrap());
    }

    #[test]
    fn in_values_emits_one_parameter_per_element() {
        let predicate = Predicate::in_values(
            "Status",
            vec![Value::from("a"), Value::from("b"), Value::from("c")],
        );
        let fragment = translate(&predicate, None).expect("translate");
        assert_eq!(fragment.sql, "Status IN (@p0, @p1, @p2)");
        assert_eq!(fragment.params.len(), 3);
    }

    #[test]
    fn empty_in_list_is_rejected() {
        let err = translate(&Predicate::in_values("Status", vec![]), None)
            .expect_err("must fail");
        assert!(err.to_string().contains("no values"));
    }

    #[test]
    fn order_by_lowering() {
        let keys = vec![OrderKey::asc("Priority"), OrderKey::desc("CreatedTime")];
        assert_eq!(
            order_by_clause(&keys, None),
            "Priority ASC, CreatedTime DESC"
        );
        assert_eq!(
            order_by_clause(&keys, Some("t")),
            "t.Priority ASC, t.CreatedTime DESC"
        );
    }
}
