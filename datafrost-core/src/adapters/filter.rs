//! Filter to WHERE-clause compilation.
//!
//! Every backend compiles the same [`Filter`] list, but placeholder syntax,
//! identifier quoting and type coercion differ. Backends describe those
//! differences through [`SqlDialect`]; [`build_where_clause`] owns the
//! shared rules:
//!
//! - filters with a blank column are dropped
//! - unknown operators produce no condition
//! - `is_null` / `is_not_null` bind no argument
//! - every other operator binds exactly one argument, in filter order
//! - conditions are joined with `AND`, without a leading `WHERE`

use super::helpers::quote_double;
use serde::{Deserialize, Serialize};

/// Comparison operator of a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
    NotLike,
    IsNull,
    IsNotNull,
    /// Any operator this version does not understand; compiles to nothing
    #[serde(other)]
    Unknown,
}

impl FilterOperator {
    /// SQL operator for value comparisons; `None` for the null checks and
    /// unknown operators.
    pub fn sql_operator(self) -> Option<&'static str> {
        match self {
            FilterOperator::Eq => Some("="),
            FilterOperator::Neq => Some("!="),
            FilterOperator::Gt => Some(">"),
            FilterOperator::Lt => Some("<"),
            FilterOperator::Gte => Some(">="),
            FilterOperator::Lte => Some("<="),
            FilterOperator::Like => Some("LIKE"),
            FilterOperator::NotLike => Some("NOT LIKE"),
            FilterOperator::IsNull | FilterOperator::IsNotNull | FilterOperator::Unknown => None,
        }
    }

    /// True for `like` / `not_like`.
    pub fn is_pattern(self) -> bool {
        matches!(self, FilterOperator::Like | FilterOperator::NotLike)
    }
}

/// One column/operator/value predicate supplied by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Client-side identifier, not used for compilation
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
}

impl Filter {
    /// Creates a filter without a client identifier.
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            column: column.into(),
            operator,
            value: value.into(),
        }
    }
}

/// Backend-specific SQL spelling used by the compiler.
pub trait SqlDialect {
    /// Quotes a column identifier.
    fn quote_identifier(&self, column: &str) -> String;

    /// Placeholder for the bound argument at 1-based `position`.
    fn placeholder(&self, position: usize) -> String;

    /// Left-hand side of a value comparison.
    fn column_operand(&self, column: &str, _operator: FilterOperator) -> String {
        self.quote_identifier(column)
    }

    /// Right-hand side of a value comparison.
    fn argument_operand(&self, _column: &str, _operator: FilterOperator, position: usize) -> String {
        self.placeholder(position)
    }
}

/// Double-quoted identifiers with positional `?` placeholders
/// (SQLite, libSQL, Snowflake).
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionMarkDialect;

impl SqlDialect for QuestionMarkDialect {
    fn quote_identifier(&self, column: &str) -> String {
        quote_double(column)
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }
}

/// Compiled WHERE body and its bound arguments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhereClause {
    /// Conditions joined with `AND`; empty when nothing applies
    pub sql: String,
    /// Bound values in placeholder order
    pub args: Vec<String>,
}

impl WhereClause {
    /// True when no condition was produced.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// The clause with a leading ` WHERE `, or an empty string.
    pub fn to_sql_suffix(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.sql)
        }
    }
}

/// True when compiling `filters` binds at least one argument.
///
/// Dialects that cast arguments use this to skip the column-type lookup
/// when nothing would be cast.
pub fn binds_arguments(filters: &[Filter]) -> bool {
    filters
        .iter()
        .any(|f| !f.column.trim().is_empty() && f.operator.sql_operator().is_some())
}

/// Compiles filters into a parameterized WHERE body for `dialect`.
///
/// # Example
/// ```rust
/// use datafrost_core::adapters::filter::{
///     Filter, FilterOperator, QuestionMarkDialect, build_where_clause,
/// };
///
/// let clause = build_where_clause(
///     &[
///         Filter::new("age", FilterOperator::Gte, "21"),
///         Filter::new("email", FilterOperator::IsNotNull, ""),
///     ],
///     &QuestionMarkDialect,
/// );
/// assert_eq!(clause.sql, "\"age\" >= ? AND \"email\" IS NOT NULL");
/// assert_eq!(clause.args, vec!["21".to_string()]);
/// ```
pub fn build_where_clause(filters: &[Filter], dialect: &dyn SqlDialect) -> WhereClause {
    let mut conditions = Vec::new();
    let mut args = Vec::new();

    for filter in filters {
        if filter.column.trim().is_empty() {
            continue;
        }

        match filter.operator {
            FilterOperator::IsNull => conditions.push(format!(
                "{} IS NULL",
                dialect.quote_identifier(&filter.column)
            )),
            FilterOperator::IsNotNull => conditions.push(format!(
                "{} IS NOT NULL",
                dialect.quote_identifier(&filter.column)
            )),
            operator => {
                let Some(sql_operator) = operator.sql_operator() else {
                    continue;
                };
                let position = args.len().saturating_add(1);
                conditions.push(format!(
                    "{} {} {}",
                    dialect.column_operand(&filter.column, operator),
                    sql_operator,
                    dialect.argument_operand(&filter.column, operator, position)
                ));
                args.push(filter.value.clone());
            }
        }
    }

    WhereClause {
        sql: conditions.join(" AND "),
        args,
    }
}
