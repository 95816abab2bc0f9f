//! Aggregation pipeline execution.
//!
//! Stages run strictly in order over an owned copy of the collection, each
//! stage's output feeding the next. `$facet` ends the pipeline: its single output
//! document is the final result and any later stages are skipped.

use bson::{Bson, Document};
use tracing::debug;

use docstash_core::{
    cursor::sort_documents,
    document::ID_FIELD,
    expression::Expression,
    pipeline::{Accumulator, GroupSpec, Pipeline, Projection, Stage},
    value::{Comparable, Number, get_path, set_path},
};

use crate::{evaluator::DocumentEvaluator, expression::evaluate};

/// Value that missing or null keys take in `$sort`.
const SORT_MISSING: Bson = Bson::Int32(0);

/// Runs every stage of `pipeline` over `documents`.
pub(crate) fn run_pipeline(pipeline: &Pipeline, mut documents: Vec<Document>) -> Vec<Document> {
    for stage in pipeline.stages() {
        documents = match stage {
            Stage::Match(expr) => {
                documents.retain(|document| DocumentEvaluator::matches(document, expr));
                documents
            }
            Stage::Facet(facets) => return vec![facet(facets, &documents)],
            Stage::Group(spec) => group(spec, documents),
            Stage::AddFields(fields) => {
                for document in documents.iter_mut() {
                    for (name, expr) in fields {
                        let value = evaluate(expr, document);
                        set_path(document, name, value);
                    }
                }
                documents
            }
            Stage::Sort(keys) => {
                sort_documents(&mut documents, keys, &SORT_MISSING);
                documents
            }
            Stage::Project(fields) => documents
                .iter()
                .map(|document| project(fields, document))
                .collect(),
            Stage::Limit(limit) => {
                documents.truncate(*limit);
                documents
            }
            Stage::Skip(skip) => documents
                .into_iter()
                .skip(*skip)
                .collect(),
            Stage::Count(field) => match documents.len() {
                0 => Vec::new(),
                count => {
                    let mut output = Document::new();
                    output.insert(field.clone(), count_value(count));
                    vec![output]
                }
            },
            Stage::Passthrough(name) => {
                debug!(target: "docstash::aggregate", stage = %name, "Passing through unsupported stage");
                documents
            }
        };
    }

    documents
}

fn facet(facets: &[(String, Pipeline)], documents: &[Document]) -> Document {
    let mut output = Document::new();

    for (name, pipeline) in facets {
        let results = run_pipeline(pipeline, documents.to_vec());
        output.insert(
            name.clone(),
            Bson::Array(results.into_iter().map(Bson::Document).collect()),
        );
    }

    output
}

fn group(spec: &GroupSpec, documents: Vec<Document>) -> Vec<Document> {
    let groups: Vec<(Bson, Vec<Document>)> = if spec.key.is_null() {
        vec![(Bson::Null, documents)]
    } else {
        let mut groups: Vec<(Bson, Vec<Document>)> = Vec::new();

        for document in documents {
            let key = evaluate(&spec.key, &document);
            let position = groups
                .iter()
                .position(|(existing, _)| Comparable::from(existing) == Comparable::from(&key));

            match position {
                Some(index) => groups[index].1.push(document),
                None => groups.push((key, vec![document])),
            }
        }

        groups
    };

    groups
        .into_iter()
        .map(|(key, members)| {
            let mut output = Document::new();
            output.insert(ID_FIELD, key);

            for (name, accumulator) in &spec.fields {
                output.insert(name.clone(), accumulate(accumulator, &members));
            }

            output
        })
        .collect()
}

fn accumulate(accumulator: &Accumulator, members: &[Document]) -> Bson {
    match accumulator {
        Accumulator::Sum(expr) => numbers(expr, members)
            .fold(Number::default(), |sum, value| sum + value)
            .into_bson(),
        Accumulator::Avg(expr) => {
            let (total, count) = numbers(expr, members)
                .fold((0.0, 0usize), |(total, count), value| (total + value.as_f64(), count + 1));

            match count {
                0 => Bson::Double(0.0),
                count => Bson::Double(total / count as f64),
            }
        }
        Accumulator::Max(expr) => numbers(expr, members)
            .reduce(|best, value| if value > best { value } else { best })
            .unwrap_or_default()
            .into_bson(),
        Accumulator::Min(expr) => numbers(expr, members)
            .reduce(|best, value| if value < best { value } else { best })
            .unwrap_or_default()
            .into_bson(),
        Accumulator::Push(expr) => Bson::Array(
            members
                .iter()
                .map(|document| evaluate(expr, document))
                .collect()
        ),
        Accumulator::First(expr) => members
            .first()
            .map(|document| evaluate(expr, document))
            .unwrap_or(Bson::Null),
        Accumulator::Last(expr) => members
            .last()
            .map(|document| evaluate(expr, document))
            .unwrap_or(Bson::Null),
        Accumulator::Count => count_value(members.len()),
        Accumulator::Unsupported(name) => {
            debug!(target: "docstash::aggregate", accumulator = %name, "Unsupported accumulator yields null");
            Bson::Null
        }
    }
}

/// Numeric values of `expr` across the group; other kinds are skipped.
fn numbers<'a>(expr: &'a Expression, members: &'a [Document]) -> impl Iterator<Item = Number> + 'a {
    members
        .iter()
        .filter_map(move |document| Number::from_bson(&evaluate(expr, document)))
}

fn project(fields: &[(String, Projection)], document: &Document) -> Document {
    let mut output = Document::new();

    for (name, projection) in fields {
        match projection {
            Projection::Include => {
                if let Some(value) = get_path(document, name) {
                    set_path(&mut output, name, value.clone());
                }
            }
            Projection::Exclude => {}
            Projection::Literal(value) => set_path(&mut output, name, value.clone()),
        }
    }

    output
}

fn count_value(count: usize) -> Bson {
    Number::Int(i64::try_from(count).unwrap_or(i64::MAX)).into_bson()
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::{DateTime, doc};

    fn run(stages: Vec<Document>, documents: Vec<Document>) -> Vec<Document> {
        run_pipeline(&Pipeline::from(stages), documents)
    }

    fn commits() -> Vec<Document> {
        vec![
            doc! { "type": "maintenance", "mileage": 1000, "cost": { "parts": 250, "labor": 80 } },
            doc! { "type": "repair", "mileage": 4000, "cost": { "parts": 600, "labor": 200 } },
            doc! { "type": "maintenance", "mileage": 2000, "cost": { "parts": 100 } },
        ]
    }

    #[test]
    fn group_by_expression_in_first_seen_order() {
        let output = run(
            vec![doc! { "$group": {
                "_id": "$type",
                "value": { "$sum": { "$add": ["$cost.parts", "$cost.labor"] } },
                "n": { "$sum": 1 },
            } }],
            commits(),
        );

        assert_eq!(
            output,
            vec![
                doc! { "_id": "maintenance", "value": 430, "n": 2 },
                doc! { "_id": "repair", "value": 800, "n": 1 },
            ],
        );
    }

    #[test]
    fn null_key_groups_everything_even_when_empty() {
        let stages = vec![doc! { "$group": {
            "_id": Bson::Null,
            "total": { "$sum": "$cost.parts" },
            "top": { "$max": "$mileage" },
            "mean": { "$avg": "$mileage" },
        } }];

        assert_eq!(
            run(stages.clone(), Vec::new()),
            vec![doc! { "_id": Bson::Null, "total": 0, "top": 0, "mean": 0.0 }],
        );
        assert_eq!(
            run(stages, commits()),
            vec![doc! { "_id": Bson::Null, "total": 950, "top": 4000, "mean": 7000.0 / 3.0 }],
        );
    }

    #[test]
    fn push_first_last_and_count() {
        let output = run(
            vec![doc! { "$group": {
                "_id": Bson::Null,
                "labor": { "$push": "$cost.labor" },
                "first": { "$first": "$mileage" },
                "last": { "$last": "$mileage" },
                "low": { "$min": "$mileage" },
                "n": { "$count": {} },
            } }],
            commits(),
        );

        assert_eq!(
            output,
            vec![doc! {
                "_id": Bson::Null,
                "labor": [80, 200, Bson::Null],
                "first": 1000,
                "last": 2000,
                "low": 1000,
                "n": 3,
            }],
        );
    }

    #[test]
    fn sort_is_stable_with_missing_keys_as_zero() {
        let output = run(
            vec![doc! { "$sort": { "a": 1, "b": 1 } }],
            vec![doc! { "a": 1, "b": 2 }, doc! { "a": 1, "b": 1 }, doc! { "a": -1 }, doc! { "b": 5 }],
        );

        assert_eq!(
            output,
            vec![doc! { "a": -1 }, doc! { "b": 5 }, doc! { "a": 1, "b": 1 }, doc! { "a": 1, "b": 2 }],
        );
    }

    #[test]
    fn facets_see_the_same_input_and_end_the_pipeline() {
        let output = run(
            vec![
                doc! { "$facet": {
                    "repairs": [{ "$match": { "type": "repair" } }],
                    "by_mileage": [{ "$sort": { "mileage": -1 } }, { "$limit": 1 }],
                    "everything": [],
                } },
                doc! { "$limit": 0 },
            ],
            commits(),
        );

        assert_eq!(output.len(), 1);
        let facets = &output[0];
        assert_eq!(facets.get_array("repairs").unwrap().len(), 1);
        assert_eq!(
            facets.get_array("by_mileage").unwrap()[0].as_document().unwrap().get_i32("mileage").unwrap(),
            4000,
        );
        assert_eq!(facets.get_array("everything").unwrap().len(), 3);
    }

    #[test]
    fn add_fields_applies_in_order_and_sets_nested_paths() {
        let output = run(
            vec![doc! { "$addFields": {
                "total": { "$add": ["$cost.parts", "$cost.labor"] },
                "cost.total": "$total",
                "month": { "$dateToString": { "format": "%Y-%m", "date": { "$toDate": "$timestamp" } } },
            } }],
            vec![doc! { "timestamp": DateTime::from_millis(1_709_622_489_010), "cost": { "parts": 250, "labor": 80 } }],
        );

        let document = &output[0];
        assert_eq!(document.get_i32("total").unwrap(), 330);
        assert_eq!(document.get_document("cost").unwrap().get_i32("total").unwrap(), 330);
        assert_eq!(document.get_str("month").unwrap(), "2024-03");
    }

    #[test]
    fn project_keeps_only_listed_fields() {
        let output = run(
            vec![doc! { "$project": { "title": 1, "cost.parts": 1, "mileage": 0, "source": "import" } }],
            vec![doc! { "_id": 1, "title": "oil", "mileage": 10, "cost": { "parts": 5, "labor": 2 } }],
        );

        assert_eq!(output, vec![doc! { "title": "oil", "cost": { "parts": 5 }, "source": "import" }]);
    }

    #[test]
    fn limit_skip_and_count() {
        let output = run(vec![doc! { "$skip": 1 }, doc! { "$limit": 1 }], commits());
        assert_eq!(output[0].get_i32("mileage").unwrap(), 4000);

        assert_eq!(run(vec![doc! { "$count": "total" }], commits()), vec![doc! { "total": 3 }]);
        assert!(run(vec![doc! { "$count": "total" }], Vec::new()).is_empty());
    }

    #[test]
    fn unknown_stages_pass_documents_through() {
        let output = run(vec![doc! { "$lookup": { "from": "repos" } }], commits());
        assert_eq!(output, commits());
    }
}
