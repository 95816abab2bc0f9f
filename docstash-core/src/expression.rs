//! Expression language used inside aggregation stages.
//!
//! An expression is either a literal, a field reference written as `"$path.to.field"`,
//! a nested object or array of expressions, or one of the supported operators:
//!
//! | operator | form |
//! |---|---|
//! | `$add` | `{"$add": [expr, ...]}` |
//! | `$ifNull` | `{"$ifNull": [expr, fallback]}` |
//! | `$toDate` | `{"$toDate": expr}` |
//! | `$dateToString` | `{"$dateToString": {"format": "%Y-%m", "date": expr}}` |
//! | `$literal` | `{"$literal": value}` |
//!
//! Parsing is total: anything unrecognized becomes [`Expression::Unsupported`],
//! which evaluates to null.

use bson::{Bson, Document};

/// Format used by `$dateToString` when none is given.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.%LZ";

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A constant value.
    Literal(Bson),
    /// A dot-separated field path, without the leading `$`.
    Field(String),
    /// An array whose elements are evaluated.
    Array(Vec<Expression>),
    /// A document whose values are evaluated.
    Object(Vec<(String, Expression)>),
    /// Sum of the operands.
    Add(Vec<Expression>),
    /// First operand that is not null.
    IfNull(Vec<Expression>),
    /// Conversion of epoch milliseconds (or a date string) to a date.
    ToDate(Box<Expression>),
    /// Formatting of a date with a `%`-token template.
    DateToString {
        format: String,
        date: Box<Expression>,
    },
    /// An operator this engine does not implement.
    Unsupported(String),
}

impl Expression {
    /// Parses an expression from its document form.
    pub fn parse(value: &Bson) -> Self {
        match value {
            Bson::String(text) if text.len() > 1 && text.starts_with('$') && !text.starts_with("$$") => {
                Expression::Field(text[1..].to_string())
            }
            Bson::Array(items) => Expression::Array(items.iter().map(Expression::parse).collect()),
            Bson::Document(document) => Self::parse_document(document),
            other => Expression::Literal(other.clone()),
        }
    }

    fn parse_document(document: &Document) -> Self {
        let Some((name, argument)) = document.iter().next() else {
            return Expression::Object(Vec::new());
        };

        if !name.starts_with('$') {
            return Expression::Object(
                document
                    .iter()
                    .map(|(key, value)| (key.clone(), Expression::parse(value)))
                    .collect()
            );
        }

        match name.as_str() {
            "$add" => Expression::Add(Self::operands(argument)),
            "$ifNull" => Expression::IfNull(Self::operands(argument)),
            "$toDate" => Expression::ToDate(Box::new(Expression::parse(argument))),
            "$literal" => Expression::Literal(argument.clone()),
            "$dateToString" => match argument {
                Bson::Document(spec) => Expression::DateToString {
                    format: match spec.get("format") {
                        Some(Bson::String(format)) => format.clone(),
                        _ => DEFAULT_DATE_FORMAT.to_string(),
                    },
                    date: Box::new(
                        spec.get("date")
                            .map(Expression::parse)
                            .unwrap_or(Expression::Literal(Bson::Null))
                    ),
                },
                _ => Expression::Unsupported(name.clone()),
            },
            _ => Expression::Unsupported(name.clone()),
        }
    }

    fn operands(argument: &Bson) -> Vec<Expression> {
        match argument {
            Bson::Array(items) => items.iter().map(Expression::parse).collect(),
            single => vec![Expression::parse(single)],
        }
    }

    /// Shorthand for a field reference.
    pub fn field(path: impl Into<String>) -> Self {
        Expression::Field(path.into())
    }

    /// Whether this is the literal `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Expression::Literal(Bson::Null))
    }
}

impl From<&Bson> for Expression {
    fn from(value: &Bson) -> Self {
        Expression::parse(value)
    }
}
