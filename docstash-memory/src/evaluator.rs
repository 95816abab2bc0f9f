//! Filter evaluation for in-memory documents.
//!
//! [`DocumentEvaluator`] walks a decoded filter [`Expr`] against one document.
//! Evaluation is total: unresolvable paths behave as null, and comparisons
//! between values of different kinds simply do not match.

use std::{cmp::Ordering, convert::Infallible};
use bson::{Bson, Document};

use docstash_core::{
    query::{Expr, FieldOp, Pattern, QueryVisitor},
    value::{Comparable, get_path, stringify},
};

static NULL: Bson = Bson::Null;

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> bool {
        match self.visit_expr(expr) {
            Ok(matched) => matched,
            Err(never) => match never {},
        }
    }

    /// Whether `document` satisfies `expr`.
    pub fn matches(document: &Document, expr: &Expr) -> bool {
        DocumentEvaluator::new(document).evaluate(expr)
    }

    /// Copies of the documents satisfying `expr`, in input order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Document>,
        expr: &Expr,
    ) -> Vec<Document> {
        documents
            .into_iter()
            .filter(|doc| DocumentEvaluator::matches(doc, expr))
            .cloned()
            .collect::<Vec<_>>()
    }

    fn resolve(&self, field: &str) -> Option<&'a Bson> {
        get_path(self.document, field)
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = Infallible;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_field(&mut self, field: &str, op: FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let resolved = self.resolve(field);

        Ok(match op {
            FieldOp::Eq => Comparable::from(resolved.unwrap_or(&NULL)) == Comparable::from(value),
            FieldOp::Ne => Comparable::from(resolved.unwrap_or(&NULL)) != Comparable::from(value),
            FieldOp::In => match value {
                Bson::Array(candidates) => {
                    let actual = Comparable::from(resolved.unwrap_or(&NULL));
                    candidates
                        .iter()
                        .any(|candidate| actual == Comparable::from(candidate))
                }
                _ => false,
            },
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                let Some(actual) = resolved else {
                    return Ok(false);
                };

                match Comparable::from(actual).partial_cmp(&Comparable::from(value)) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            }
        })
    }

    fn visit_regex(&mut self, field: &str, pattern: &Pattern) -> Result<Self::Output, Self::Error> {
        let text = self
            .resolve(field)
            .map(stringify)
            .unwrap_or_default();

        Ok(pattern.is_match(&text))
    }
}
