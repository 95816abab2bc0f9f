//! Aggregation pipeline descriptions.
//!
//! A pipeline is an ordered list of stages, each decoded once from its document
//! form into a [`Stage`]. Stage documents this engine does not understand decode to
//! [`Stage::Passthrough`] and leave their input unchanged.
//!
//! # Example
//!
//! ```ignore
//! use docstash::pipeline::Pipeline;
//! use bson::doc;
//!
//! let pipeline = Pipeline::from(vec![
//!     doc! { "$match": { "repo_id": repo_id } },
//!     doc! { "$group": {
//!         "_id": "$type",
//!         "value": { "$sum": { "$add": ["$cost.parts", "$cost.labor"] } },
//!     } },
//! ]);
//! ```

use bson::{Bson, Document};

use crate::{
    document::ID_FIELD,
    expression::Expression,
    query::{Expr, SortKey},
};

/// A per-group reduction inside `$group`.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Sum of numeric values; a numeric constant counts it once per document.
    Sum(Expression),
    /// Mean of numeric values, 0 when there are none.
    Avg(Expression),
    /// Largest numeric value, 0 when there are none.
    Max(Expression),
    /// Smallest numeric value, 0 when there are none.
    Min(Expression),
    /// Every value, in group order.
    Push(Expression),
    /// Value for the first document of the group.
    First(Expression),
    /// Value for the last document of the group.
    Last(Expression),
    /// Number of documents in the group.
    Count,
    /// An accumulator this engine does not implement; produces null.
    Unsupported(String),
}

impl Accumulator {
    fn parse(spec: &Bson) -> Self {
        let Some((name, argument)) = spec.as_document().and_then(|spec| spec.iter().next()) else {
            return Accumulator::Unsupported(String::new());
        };
        let operand = Expression::parse(argument);

        match name.as_str() {
            "$sum" => Accumulator::Sum(operand),
            "$avg" => Accumulator::Avg(operand),
            "$max" => Accumulator::Max(operand),
            "$min" => Accumulator::Min(operand),
            "$push" => Accumulator::Push(operand),
            "$first" => Accumulator::First(operand),
            "$last" => Accumulator::Last(operand),
            "$count" => Accumulator::Count,
            _ => Accumulator::Unsupported(name.clone()),
        }
    }
}

/// `$group` specification.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    /// Grouping key; the literal null puts every document in one group.
    pub key: Expression,
    /// Output fields in declaration order.
    pub fields: Vec<(String, Accumulator)>,
}

/// How `$project` treats one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Copy the field when present (`1` or `true`).
    Include,
    /// Leave the field out (`0` or `false`).
    Exclude,
    /// Assign this value as-is; it is not evaluated as an expression.
    Literal(Bson),
}

impl Projection {
    fn parse(value: &Bson) -> Self {
        match value {
            Bson::Boolean(true) => Projection::Include,
            Bson::Boolean(false) => Projection::Exclude,
            Bson::Int32(1) | Bson::Int64(1) => Projection::Include,
            Bson::Int32(0) | Bson::Int64(0) => Projection::Exclude,
            Bson::Double(value) if *value == 1.0 => Projection::Include,
            Bson::Double(value) if *value == 0.0 => Projection::Exclude,
            other => Projection::Literal(other.clone()),
        }
    }
}

/// One decoded pipeline stage.
#[derive(Debug, Clone)]
pub enum Stage {
    /// `$match`: keep documents matching the filter.
    Match(Expr),
    /// `$facet`: run named sub-pipelines over the same input; ends the pipeline.
    Facet(Vec<(String, Pipeline)>),
    /// `$group`: one output document per group key.
    Group(GroupSpec),
    /// `$addFields`: evaluate and assign fields on each document.
    AddFields(Vec<(String, Expression)>),
    /// `$sort`: stable sort, first key most significant.
    Sort(Vec<SortKey>),
    /// `$project`: rebuild each document from the listed fields.
    Project(Vec<(String, Projection)>),
    /// `$limit`: keep the first n documents.
    Limit(usize),
    /// `$skip`: drop the first n documents.
    Skip(usize),
    /// `$count`: one document holding the input size under the given field.
    Count(String),
    /// A stage this engine does not implement; input passes through unchanged.
    Passthrough(String),
}

impl Stage {
    /// Decodes a stage document. Only the first key is considered.
    pub fn parse(stage: &Document) -> Self {
        let Some((name, spec)) = stage.iter().next() else {
            return Stage::Passthrough(String::new());
        };

        let parsed = match (name.as_str(), spec) {
            ("$match", Bson::Document(filter)) => Some(Stage::Match(Expr::from_document(filter))),
            ("$facet", Bson::Document(facets)) => Some(Stage::Facet(
                facets
                    .iter()
                    .map(|(name, stages)| (name.clone(), Pipeline::from_bson(stages)))
                    .collect()
            )),
            ("$group", Bson::Document(group)) => Some(Stage::Group(GroupSpec {
                key: group
                    .get(ID_FIELD)
                    .map(Expression::parse)
                    .unwrap_or(Expression::Literal(Bson::Null)),
                fields: group
                    .iter()
                    .filter(|(field, _)| field.as_str() != ID_FIELD)
                    .map(|(field, spec)| (field.clone(), Accumulator::parse(spec)))
                    .collect(),
            })),
            ("$addFields", Bson::Document(fields)) => Some(Stage::AddFields(
                fields
                    .iter()
                    .map(|(field, expr)| (field.clone(), Expression::parse(expr)))
                    .collect()
            )),
            ("$sort", Bson::Document(keys)) => Some(Stage::Sort(
                keys
                    .iter()
                    .map(|(field, direction)| SortKey::new(field.clone(), direction_of(direction)))
                    .collect()
            )),
            ("$project", Bson::Document(fields)) => Some(Stage::Project(
                fields
                    .iter()
                    .map(|(field, value)| (field.clone(), Projection::parse(value)))
                    .collect()
            )),
            ("$limit", count) => count_of(count).map(Stage::Limit),
            ("$skip", count) => count_of(count).map(Stage::Skip),
            ("$count", Bson::String(field)) => Some(Stage::Count(field.clone())),
            _ => None,
        };

        parsed.unwrap_or_else(|| Stage::Passthrough(name.clone()))
    }
}

fn direction_of(value: &Bson) -> i32 {
    match value {
        Bson::Int32(value) => *value,
        Bson::Int64(value) if *value < 0 => -1,
        Bson::Double(value) if *value < 0.0 => -1,
        _ => 1,
    }
}

fn count_of(value: &Bson) -> Option<usize> {
    match value {
        Bson::Int32(value) => usize::try_from(*value).ok(),
        Bson::Int64(value) => usize::try_from(*value).ok(),
        Bson::Double(value) if *value >= 0.0 && value.fract() == 0.0 => Some(*value as usize),
        _ => None,
    }
}

/// An ordered list of stages.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// Decodes stage documents in order.
    pub fn from_documents<'a>(stages: impl IntoIterator<Item = &'a Document>) -> Self {
        Self { stages: stages.into_iter().map(Stage::parse).collect() }
    }

    /// Decodes a sub-pipeline value; non-document entries become pass-through stages.
    fn from_bson(value: &Bson) -> Self {
        match value {
            Bson::Array(items) => Self {
                stages: items
                    .iter()
                    .map(|item| match item {
                        Bson::Document(stage) => Stage::parse(stage),
                        _ => Stage::Passthrough(String::new()),
                    })
                    .collect(),
            },
            _ => Self::default(),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl From<Vec<Document>> for Pipeline {
    fn from(stages: Vec<Document>) -> Self {
        Pipeline::from_documents(stages.iter())
    }
}

impl From<&[Document]> for Pipeline {
    fn from(stages: &[Document]) -> Self {
        Pipeline::from_documents(stages)
    }
}

impl From<Vec<Stage>> for Pipeline {
    fn from(stages: Vec<Stage>) -> Self {
        Pipeline::new(stages)
    }
}
