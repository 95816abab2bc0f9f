//! Filter construction and parsing for document queries.
//!
//! Filters arrive either as filter documents in the familiar operator syntax
//! (`{"mileage": {"$gte": 10000}, "$or": [...]}`) or are built programmatically
//! with [`Filter`]. Both produce the same [`Expr`] tree, which backends evaluate
//! through a [`QueryVisitor`].
//!
//! # Filter documents
//!
//! Keys are combined with logical AND. Supported keys and operators:
//!
//! - Logical: `$or`, `$and` (each takes a list of filter documents)
//! - Comparison: `$gt`, `$gte`, `$lt`, `$lte`, `$ne`, `$in`
//! - Pattern: `$regex` with optional `$options` (`"i"` for case-insensitive)
//! - A plain value (or a mapping without operator keys) means equality
//!
//! Only the operators listed above are special. A mapping such as
//! `{"cost": {"parts": 250}}` is compared as a whole value, and so is
//! `{"$options": "i"}` without a `$regex`. A mapping that mixes operators with
//! plain keys matches nothing.
//!
//! ```ignore
//! use docstash::query::{Expr, Filter};
//! use bson::doc;
//!
//! let parsed = Expr::from(doc! { "type": "repair", "mileage": { "$gte": 10000 } });
//! let built = Filter::eq("type", "repair").and(Filter::gte("mileage", 10000));
//! ```

use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};

use crate::{error::DocumentStoreError, value::stringify};

/// Operator keys that give a filter mapping special meaning.
const OPERATOR_KEYS: [&str; 7] = ["$gt", "$gte", "$lt", "$lte", "$ne", "$in", "$regex"];

/// Modifier accepted next to `$regex`; it is not an operator on its own.
const OPTIONS_KEY: &str = "$options";

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

impl From<i32> for SortDirection {
    /// Maps the conventional `1` / `-1` direction values; any negative value is descending.
    fn from(value: i32) -> Self {
        if value < 0 { SortDirection::Desc } else { SortDirection::Asc }
    }
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// The field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(field: impl Into<String>, direction: impl Into<SortDirection>) -> Self {
        Self { field: field.into(), direction: direction.into() }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to (a missing field equals null).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Member of the supplied list.
    In,
}

/// A compiled `$regex` pattern.
///
/// Patterns that fail to compile fall back to a literal substring search, so a
/// filter never fails to build.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    case_insensitive: bool,
    matcher: Matcher,
}

#[derive(Debug, Clone)]
enum Matcher {
    Regex(Regex),
    Literal(String),
}

impl Pattern {
    /// Compiles a pattern. `options` follows the `$options` convention; only `i` is honored.
    pub fn new(source: impl Into<String>, options: &str) -> Self {
        let source = source.into();
        let case_insensitive = options.contains('i');
        let matcher = match RegexBuilder::new(&source)
            .case_insensitive(case_insensitive)
            .build()
        {
            Ok(regex) => Matcher::Regex(regex),
            Err(err) => {
                tracing::warn!(target: "docstash::query", pattern = %source, error = %err, "invalid regex, matching literally");
                Matcher::Literal(if case_insensitive { source.to_lowercase() } else { source.clone() })
            }
        };

        Self { source, case_insensitive, matcher }
    }

    /// Searches `text` for the pattern anywhere within it.
    pub fn is_match(&self, text: &str) -> bool {
        match &self.matcher {
            Matcher::Regex(regex) => regex.is_match(text),
            Matcher::Literal(needle) if self.case_insensitive => text.to_lowercase().contains(needle.as_str()),
            Matcher::Literal(needle) => text.contains(needle.as_str()),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`)
/// to build complex filter predicates. An empty `And` matches every document and
/// an empty `Or` matches none.
#[derive(Debug, Clone)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Field comparison expression.
    Field {
        /// The field path to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
    /// Pattern search against the field's text form.
    Regex {
        /// The field path to search.
        field: String,
        /// The compiled pattern.
        pattern: Pattern,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field: field.into(), op, value }
    }

    /// An expression matching every document.
    pub fn all() -> Self {
        Expr::And(Vec::new())
    }

    /// An expression matching no document.
    pub fn none() -> Self {
        Expr::Or(Vec::new())
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Parses a filter document. Parsing never fails; shapes that cannot match
    /// (for example `$or` with a non-list value) become [`Expr::none`].
    pub fn from_document(filter: &Document) -> Self {
        Expr::And(
            filter
                .iter()
                .map(|(key, value)| Self::parse_entry(key, value))
                .collect()
        )
    }

    fn parse_entry(key: &str, value: &Bson) -> Self {
        match key {
            "$or" => match value {
                Bson::Array(clauses) => Expr::Or(clauses.iter().map(Self::parse_clause).collect()),
                _ => Expr::none(),
            },
            "$and" => match value {
                Bson::Array(clauses) => Expr::And(clauses.iter().map(Self::parse_clause).collect()),
                _ => Expr::none(),
            },
            _ => match value {
                Bson::Document(operators) if Self::has_operators(operators) => {
                    Self::parse_operators(key, operators)
                }
                _ => Expr::field(key, FieldOp::Eq, value.clone()),
            },
        }
    }

    fn parse_clause(clause: &Bson) -> Self {
        match clause {
            Bson::Document(filter) => Self::from_document(filter),
            _ => Expr::none(),
        }
    }

    fn has_operators(mapping: &Document) -> bool {
        mapping
            .keys()
            .any(|key| OPERATOR_KEYS.contains(&key.as_str()))
    }

    fn parse_operators(field: &str, operators: &Document) -> Self {
        if let Some(stray) = operators
            .keys()
            .find(|key| !OPERATOR_KEYS.contains(&key.as_str()) && key.as_str() != OPTIONS_KEY)
        {
            tracing::warn!(target: "docstash::query", field, key = %stray, "operator mapping with a plain key never matches");
            return Expr::none();
        }

        let options = match operators.get("$options") {
            Some(Bson::String(options)) => options.as_str(),
            _ => "",
        };

        Expr::And(
            operators
                .iter()
                .filter_map(|(op, value)| {
                    let op = match op.as_str() {
                        "$gt" => FieldOp::Gt,
                        "$gte" => FieldOp::Gte,
                        "$lt" => FieldOp::Lt,
                        "$lte" => FieldOp::Lte,
                        "$ne" => FieldOp::Ne,
                        "$in" => FieldOp::In,
                        "$regex" => {
                            return Some(Expr::Regex {
                                field: field.to_string(),
                                pattern: Pattern::new(stringify(value), options),
                            });
                        }
                        _ => return None,
                    };

                    Some(Expr::field(field, op, value.clone()))
                })
                .collect()
        )
    }
}

impl From<Document> for Expr {
    fn from(filter: Document) -> Self {
        Expr::from_document(&filter)
    }
}

impl From<&Document> for Expr {
    fn from(filter: &Document) -> Self {
        Expr::from_document(filter)
    }
}

/// Helper struct for constructing filter expressions.
///
/// Provides static methods to construct common filter expressions.
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
///
/// # Example
///
/// ```ignore
/// use docstash::query::Filter;
///
/// let expr = Filter::eq("repo_id", repo_id)
///     .and(Filter::regex("title", "机油", "i"));
/// ```
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Eq, value.into())
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Ne, value.into())
    }

    /// Matches documents where the field is greater than the specified value.
    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Gt, value.into())
    }

    /// Matches documents where the field is greater than or equal to the specified value.
    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Gte, value.into())
    }

    /// Matches documents where the field is less than the specified value.
    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Lt, value.into())
    }

    /// Matches documents where the field is less than or equal to the specified value.
    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field, FieldOp::Lte, value.into())
    }

    /// Matches documents where the field equals any of the specified values.
    pub fn any_of(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<Bson>>) -> Expr {
        Expr::field(
            field,
            FieldOp::In,
            Bson::Array(values.into_iter().map(Into::into).collect()),
        )
    }

    /// Matches documents where the field's text form contains the pattern.
    pub fn regex(field: impl Into<String>, pattern: impl Into<String>, options: &str) -> Expr {
        Expr::Regex { field: field.into(), pattern: Pattern::new(pattern, options) }
    }

    /// Combines multiple expressions such that all must match for a document to be included.
    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    /// Combines multiple expressions such that any can match for a document to be included.
    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_regex(
        &mut self,
        field: &str,
        pattern: &Pattern,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Field { field, op, value } => self.visit_field(field, *op, value),
            Expr::Regex { field, pattern } => self.visit_regex(field, pattern),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn operator_mappings_become_conjunctive_field_exprs() {
        let expr = Expr::from(doc! { "mileage": { "$gte": 1000, "$lt": 5000 } });

        let Expr::And(outer) = expr else { panic!("expected top-level and") };
        let Expr::And(inner) = &outer[0] else { panic!("expected operator conjunction") };
        assert!(matches!(&inner[0], Expr::Field { field, op: FieldOp::Gte, .. } if field == "mileage"));
        assert!(matches!(&inner[1], Expr::Field { op: FieldOp::Lt, .. }));
    }

    #[test]
    fn mappings_without_operators_mean_equality() {
        let expr = Expr::from(doc! { "cost": { "parts": 250 } });

        let Expr::And(outer) = expr else { panic!("expected top-level and") };
        assert!(matches!(
            &outer[0],
            Expr::Field { op: FieldOp::Eq, value: Bson::Document(_), .. }
        ));
    }

    #[test]
    fn options_alone_is_not_an_operator() {
        let expr = Expr::from(doc! { "title": { "$options": "i" } });

        let Expr::And(outer) = expr else { panic!("expected top-level and") };
        assert!(matches!(
            &outer[0],
            Expr::Field { field, op: FieldOp::Eq, value: Bson::Document(_) } if field == "title"
        ));
    }

    #[test]
    fn plain_keys_beside_operators_never_match() {
        let expr = Expr::from(doc! { "mileage": { "$gte": 1000, "unit": "km" } });

        let Expr::And(outer) = expr else { panic!("expected top-level and") };
        assert!(matches!(&outer[0], Expr::Or(clauses) if clauses.is_empty()));
    }

    #[test]
    fn non_list_or_never_matches() {
        let expr = Expr::from(doc! { "$or": { "type": "repair" } });

        let Expr::And(outer) = expr else { panic!("expected top-level and") };
        assert!(matches!(&outer[0], Expr::Or(clauses) if clauses.is_empty()));
    }

    #[test]
    fn regex_options_enable_case_insensitivity() {
        let pattern = Pattern::new("oil", "i");
        assert!(pattern.is_match("Engine OIL change"));
        assert!(!Pattern::new("oil", "").is_match("Engine OIL change"));
    }

    #[test]
    fn invalid_regex_falls_back_to_literal_search() {
        let pattern = Pattern::new("(parts", "");
        assert!(pattern.is_match("spare (parts) list"));
        assert!(!pattern.is_match("spare parts"));
    }

    #[test]
    fn direction_follows_sign() {
        assert_eq!(SortDirection::from(1), SortDirection::Asc);
        assert_eq!(SortDirection::from(-1), SortDirection::Desc);
    }
}
