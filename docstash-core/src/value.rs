//! Structural access and comparison over document values.
//!
//! Documents carry no schema, so every helper here is total: a path that does not
//! resolve yields `None`, a value of the wrong kind compares as unequal, and the
//! ordering used for sorting is defined across every pair of value kinds.

use std::{cmp::Ordering, collections::HashMap, ops::Add};
use bson::{Bson, Document, oid::ObjectId};


/// Resolves a dot-separated path against a document.
///
/// An exact top-level key wins over path traversal, so a field literally named
/// `"a.b"` is still reachable. Numeric segments index into arrays.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    if let Some(value) = document.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Assigns a value at a dot-separated path, creating intermediate documents.
///
/// An intermediate value that is not a document is replaced.
pub fn set_path(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }

            if let Some(Bson::Document(inner)) = document.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Renders a value as plain text.
///
/// Null renders as the empty string and identifiers render as their canonical hex
/// form, which makes this the canonical string used for identifier comparison and
/// regex matching.
pub fn stringify(value: &Bson) -> String {
    match value {
        Bson::Null | Bson::Undefined => String::new(),
        Bson::String(value) => value.clone(),
        Bson::Boolean(value) => value.to_string(),
        Bson::Int32(value) => value.to_string(),
        Bson::Int64(value) => value.to_string(),
        Bson::Double(value) => value.to_string(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::DateTime(value) => chrono::DateTime::from_timestamp_millis(value.timestamp_millis())
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| value.timestamp_millis().to_string()),
        other => other.to_string(),
    }
}

/// A numeric value with integer precision preserved where possible.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Extracts a number from a numeric value; anything else yields `None`.
    pub fn from_bson(value: &Bson) -> Option<Number> {
        match value {
            Bson::Int32(value) => Some(Number::Int(*value as i64)),
            Bson::Int64(value) => Some(Number::Int(*value)),
            Bson::Double(value) => Some(Number::Float(*value)),
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Float(value) => value,
        }
    }

    /// Rounds to whole milliseconds, for date arithmetic.
    pub fn as_millis(self) -> i64 {
        match self {
            Number::Int(value) => value,
            Number::Float(value) => value.round() as i64,
        }
    }

    /// Converts back into a value, narrowing integers to 32 bits when they fit.
    pub fn into_bson(self) -> Bson {
        match self {
            Number::Int(value) => match i32::try_from(value) {
                Ok(narrow) => Bson::Int32(narrow),
                Err(_) => Bson::Int64(value),
            },
            Number::Float(value) => Bson::Double(value),
        }
    }
}

impl Default for Number {
    fn default() -> Self {
        Number::Int(0)
    }
}

impl Add for Number {
    type Output = Number;

    fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => match a.checked_add(b) {
                Some(sum) => Number::Int(sum),
                None => Number::Float(a as f64 + b as f64),
            },
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}


/// Type-erased, comparable view of a value used for filter evaluation.
///
/// Numbers compare across integer and float representations, and an identifier
/// equals a string holding its canonical hex form, so `{_id: "<hex>"}` matches a
/// document whose `_id` is stored natively.
#[derive(Debug)]
pub enum Comparable<'a> {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Numeric value
    Number(Number),
    /// DateTime value
    DateTime(bson::DateTime),
    /// String value
    String(&'a str),
    /// Document identifier
    ObjectId(ObjectId),
    /// Array of comparable values
    Array(Vec<Comparable<'a>>),
    /// Map/Object of comparable values
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other value, compared structurally
    Opaque(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Number::from_bson(bson)
                .map(Comparable::Number)
                .unwrap_or(Comparable::Null),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(oid) => Comparable::ObjectId(*oid),
            Bson::Array(arr) => Comparable::Array(
                arr
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Bson::Document(doc) => Comparable::Map(
                doc
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
            other => Comparable::Opaque(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::String(b))
            | (Comparable::String(b), Comparable::ObjectId(a)) => a.to_hex() == *b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Opaque(a), Comparable::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}


/// Rank of a value kind in the cross-kind sort order.
fn kind_rank(value: &Bson) -> u8 {
    match value {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Total order over values, used by every sort.
///
/// Values of different kinds order by kind (null before numbers before strings,
/// and so on); values of the same kind order naturally. Never panics.
pub fn compare_values(left: &Bson, right: &Bson) -> Ordering {
    let rank = kind_rank(left).cmp(&kind_rank(right));
    if rank != Ordering::Equal {
        return rank;
    }

    match (left, right) {
        (Bson::String(a), Bson::String(b)) => a.cmp(b),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.cmp(b),
        (Bson::Array(a), Bson::Array(b)) => compare_sequences(a.iter(), b.iter()),
        (Bson::Document(a), Bson::Document(b)) => {
            for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                let ordering = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => match (Number::from_bson(left), Number::from_bson(right)) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

fn compare_sequences<'a>(
    mut left: impl Iterator<Item = &'a Bson>,
    mut right: impl Iterator<Item = &'a Bson>,
) -> Ordering {
    loop {
        match (left.next(), right.next()) {
            (Some(a), Some(b)) => {
                let ordering = compare_values(a, b);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(_), None) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn nested_paths_resolve_and_missing_paths_are_none() {
        let document = doc! { "cost": { "parts": 250, "labor": 80 }, "tags": ["a", "b"] };

        assert_eq!(get_path(&document, "cost.parts"), Some(&Bson::Int32(250)));
        assert_eq!(get_path(&document, "tags.1"), Some(&Bson::String("b".into())));
        assert_eq!(get_path(&document, "cost.tax"), None);
        assert_eq!(get_path(&document, "cost.parts.deep"), None);
    }

    #[test]
    fn set_path_creates_intermediate_documents() {
        let mut document = doc! { "a": 1 };
        set_path(&mut document, "a.b", Bson::Int32(2));
        set_path(&mut document, "c.d.e", Bson::Boolean(true));

        assert_eq!(document, doc! { "a": { "b": 2 }, "c": { "d": { "e": true } } });
    }

    #[test]
    fn identifiers_equal_their_canonical_string() {
        let oid = ObjectId::new();
        let native = Bson::ObjectId(oid);
        let text = Bson::String(oid.to_hex());

        assert_eq!(Comparable::from(&native), Comparable::from(&text));
        assert_eq!(stringify(&native), oid.to_hex());
    }

    #[test]
    fn integers_and_floats_compare_numerically() {
        assert_eq!(Comparable::from(&Bson::Int32(5)), Comparable::from(&Bson::Double(5.0)));
        assert_eq!((Number::Int(2) + Number::Float(0.5)).into_bson(), Bson::Double(2.5));
        assert_eq!((Number::Int(250) + Number::Int(80)).into_bson(), Bson::Int32(330));
    }

    #[test]
    fn cross_kind_ordering_is_total() {
        assert_eq!(compare_values(&Bson::Null, &Bson::Int32(-10)), Ordering::Less);
        assert_eq!(compare_values(&Bson::Int32(3), &Bson::String("1".into())), Ordering::Less);
        assert_eq!(compare_values(&Bson::Double(2.5), &Bson::Int64(2)), Ordering::Greater);
        assert_eq!(
            compare_values(&Bson::Array(vec![Bson::Int32(1)]), &Bson::Array(vec![Bson::Int32(1), Bson::Int32(0)])),
            Ordering::Less,
        );
    }
}
