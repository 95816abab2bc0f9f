//! Evaluation of aggregation expressions against a single document.

use bson::{Bson, DateTime, Document};
use chrono::{Datelike, Timelike, Utc};

use docstash_core::{
    expression::Expression,
    value::{Number, get_path},
};

/// Evaluates an expression in the context of one document.
///
/// Evaluation never fails. Unresolvable paths yield null and operators given
/// operands of the wrong kind degrade to null or zero.
pub(crate) fn evaluate(expr: &Expression, document: &Document) -> Bson {
    match expr {
        Expression::Literal(value) => value.clone(),
        Expression::Field(path) => get_path(document, path)
            .cloned()
            .unwrap_or(Bson::Null),
        Expression::Array(items) => Bson::Array(
            items
                .iter()
                .map(|item| evaluate(item, document))
                .collect()
        ),
        Expression::Object(fields) => {
            let mut output = Document::new();
            for (key, value) in fields {
                output.insert(key.clone(), evaluate(value, document));
            }
            Bson::Document(output)
        }
        Expression::Add(operands) => add(operands, document),
        Expression::IfNull(operands) => operands
            .iter()
            .map(|operand| evaluate(operand, document))
            .find(|value| !matches!(value, Bson::Null | Bson::Undefined))
            .unwrap_or(Bson::Null),
        Expression::ToDate(operand) => to_date(&evaluate(operand, document))
            .map(Bson::DateTime)
            .unwrap_or(Bson::Null),
        Expression::DateToString { format, date } => match evaluate(date, document) {
            Bson::DateTime(date) => Bson::String(format_date(format, date)),
            other => match Number::from_bson(&other) {
                Some(millis) => Bson::String(format_date(format, DateTime::from_millis(millis.as_millis()))),
                None => Bson::Null,
            },
        },
        Expression::Unsupported(_) => Bson::Null,
    }
}

fn add(operands: &[Expression], document: &Document) -> Bson {
    let mut base: Option<DateTime> = None;
    let mut sum = Number::default();

    for operand in operands {
        match evaluate(operand, document) {
            Bson::DateTime(date) if base.is_none() => base = Some(date),
            value => {
                if let Some(number) = Number::from_bson(&value) {
                    sum = sum + number;
                }
            }
        }
    }

    match base {
        Some(date) => Bson::DateTime(DateTime::from_millis(
            date.timestamp_millis().saturating_add(sum.as_millis())
        )),
        None => sum.into_bson(),
    }
}

fn to_date(value: &Bson) -> Option<DateTime> {
    match value {
        Bson::DateTime(date) => Some(*date),
        Bson::String(text) => chrono::DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|parsed| DateTime::from_millis(parsed.timestamp_millis())),
        other => Number::from_bson(other).map(|millis| DateTime::from_millis(millis.as_millis())),
    }
}

/// Renders a date in UTC using `%`-tokens.
///
/// Supported tokens are `%Y %m %d %H %M %S %L %j %%`; any other token is copied
/// through unchanged.
pub(crate) fn format_date(format: &str, date: DateTime) -> String {
    let Some(date) = chrono::DateTime::<Utc>::from_timestamp_millis(date.timestamp_millis()) else {
        return String::new();
    };

    let mut output = String::with_capacity(format.len() + 8);
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            output.push(c);
            continue;
        }

        match chars.next() {
            Some('Y') => output.push_str(&format!("{:04}", date.year())),
            Some('m') => output.push_str(&format!("{:02}", date.month())),
            Some('d') => output.push_str(&format!("{:02}", date.day())),
            Some('H') => output.push_str(&format!("{:02}", date.hour())),
            Some('M') => output.push_str(&format!("{:02}", date.minute())),
            Some('S') => output.push_str(&format!("{:02}", date.second())),
            Some('L') => output.push_str(&format!("{:03}", date.timestamp_subsec_millis())),
            Some('j') => output.push_str(&format!("{:03}", date.ordinal())),
            Some('%') => output.push('%'),
            Some(other) => {
                output.push('%');
                output.push(other);
            }
            None => output.push('%'),
        }
    }

    output
}
