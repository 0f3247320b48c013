//! Aggregation pipeline execution over in-memory documents.

use bson::{Bson, Document};
use tracing::trace;

use docshell_core::{
    aggregate::{Accumulator, AccumulatorOp, GroupStage, Pipeline, Stage},
    document::ID_FIELD,
    error::DocumentStoreResult,
};

use crate::evaluator::{Comparable, DocumentEvaluator, sort_documents};

/// Runs every stage of `pipeline` in order over `documents`.
pub(crate) fn execute(pipeline: &Pipeline, documents: Vec<Document>) -> DocumentStoreResult<Vec<Document>> {
    let mut current = documents;

    for stage in pipeline.stages() {
        let before = current.len();

        current = match stage {
            Stage::Match(filter) => current
                .into_iter()
                .filter(|document| DocumentEvaluator::matches(document, filter))
                .collect(),
            Stage::Group(group) => execute_group(group, &current),
            Stage::Sort(sort) => {
                sort_documents(&mut current, sort);
                current
            }
            Stage::Skip(count) => current.into_iter().skip(*count).collect(),
            Stage::Limit(count) => current.into_iter().take(*count).collect(),
        };

        trace!(?stage, before, after = current.len(), "applied pipeline stage");
    }

    Ok(current)
}

/// Folds documents into one output document per distinct key, in first-seen order.
fn execute_group(group: &GroupStage, documents: &[Document]) -> Vec<Document> {
    let mut groups: Vec<(Bson, Vec<AccumulatorState>)> = Vec::new();

    for document in documents {
        let key = group.key.evaluate(document).unwrap_or(Bson::Null);

        let position = match groups
            .iter()
            .position(|(existing, _)| Comparable::from(existing) == Comparable::from(&key))
        {
            Some(position) => position,
            None => {
                let states = group
                    .accumulators
                    .iter()
                    .map(AccumulatorState::new)
                    .collect();
                groups.push((key, states));
                groups.len() - 1
            }
        };

        for (state, accumulator) in groups[position].1.iter_mut().zip(&group.accumulators) {
            state.feed(accumulator.operand.evaluate(document));
        }
    }

    groups
        .into_iter()
        .map(|(key, states)| {
            let mut output = Document::new();
            output.insert(ID_FIELD, key);

            for (state, accumulator) in states.into_iter().zip(&group.accumulators) {
                output.insert(accumulator.name.clone(), state.finish());
            }

            output
        })
        .collect()
}

/// Running state of one accumulator within one group.
enum AccumulatorState {
    /// Exact integer total while every input is an integer and nothing overflows.
    Sum { integral: Option<i64>, total: f64 },
    Avg { total: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
    Last(Bson),
}

impl AccumulatorState {
    fn new(accumulator: &Accumulator) -> Self {
        match accumulator.op {
            AccumulatorOp::Sum => AccumulatorState::Sum { integral: Some(0), total: 0.0 },
            AccumulatorOp::Avg => AccumulatorState::Avg { total: 0.0, count: 0 },
            AccumulatorOp::Min => AccumulatorState::Min(None),
            AccumulatorOp::Max => AccumulatorState::Max(None),
            AccumulatorOp::First => AccumulatorState::First(None),
            AccumulatorOp::Last => AccumulatorState::Last(Bson::Null),
        }
    }

    /// Adds one document's operand value; `None` means the field is missing.
    fn feed(&mut self, value: Option<Bson>) {
        match self {
            // Non-numeric and missing values are ignored by $sum and $avg.
            AccumulatorState::Sum { integral, total } => {
                let Some(number) = value.as_ref().and_then(as_f64) else {
                    return;
                };

                *total += number;
                *integral = match (*integral, value) {
                    (Some(sum), Some(Bson::Int32(v))) => sum.checked_add(v as i64),
                    (Some(sum), Some(Bson::Int64(v))) => sum.checked_add(v),
                    _ => None,
                };
            }
            AccumulatorState::Avg { total, count } => {
                if let Some(number) = value.as_ref().and_then(as_f64) {
                    *total += number;
                    *count += 1;
                }
            }
            AccumulatorState::Min(current) => keep_extreme(current, value, std::cmp::Ordering::Less),
            AccumulatorState::Max(current) => keep_extreme(current, value, std::cmp::Ordering::Greater),
            AccumulatorState::First(current) => {
                if current.is_none() {
                    *current = Some(value.unwrap_or(Bson::Null));
                }
            }
            AccumulatorState::Last(current) => *current = value.unwrap_or(Bson::Null),
        }
    }

    fn finish(self) -> Bson {
        match self {
            AccumulatorState::Sum { integral: Some(sum), .. } => match i32::try_from(sum) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(sum),
            },
            AccumulatorState::Sum { integral: None, total } => Bson::Double(total),
            AccumulatorState::Avg { count: 0, .. } => Bson::Null,
            AccumulatorState::Avg { total, count } => Bson::Double(total / count as f64),
            AccumulatorState::Min(value) | AccumulatorState::Max(value) | AccumulatorState::First(value) => {
                value.unwrap_or(Bson::Null)
            }
            AccumulatorState::Last(value) => value,
        }
    }
}

/// Replaces `current` with `value` when `value` orders `wanted` relative to it.
/// Null and missing values are skipped.
fn keep_extreme(current: &mut Option<Bson>, value: Option<Bson>, wanted: std::cmp::Ordering) {
    let Some(value) = value.filter(|value| !matches!(value, Bson::Null)) else {
        return;
    };

    let replace = match current {
        Some(existing) => Comparable::from(&value).total_cmp(&Comparable::from(&*existing)) == wanted,
        None => true,
    };

    if replace {
        *current = Some(value);
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn run(stages: &[Document], documents: Vec<Document>) -> Vec<Document> {
        execute(&Pipeline::parse(stages).unwrap(), documents).unwrap()
    }

    fn books() -> Vec<Document> {
        vec![
            doc! { "title": "The hobbit", "publisherYear": 1937, "genre": "Fantasy", "rating": 4.5 },
            doc! { "title": "The well", "publisherYear": 2024, "genre": "action", "rating": 3.0 },
            doc! { "title": "The 5th wave", "publishedYear": 2013, "genre": "Science Fiction", "rating": 4.8 },
            doc! { "title": "Dolls House", "publishedYear": 1879, "genre": "Marriage", "rating": 4.1 },
            doc! { "title": "Chozi la kheri", "PublishedYear": 2012, "genre": "Fiction", "rating": 4.8 },
        ]
    }

    #[test]
    fn group_counts_in_first_seen_order() {
        let mut input = books();
        input.push(doc! { "title": "Another", "genre": "Fantasy" });

        let output = run(&[doc! { "$group": { "_id": "$genre", "totalBooks": { "$sum": 1 } } }], input);

        assert_eq!(output.len(), 5);
        assert_eq!(output[0], doc! { "_id": "Fantasy", "totalBooks": 2 });
        assert_eq!(output[4], doc! { "_id": "Fiction", "totalBooks": 1 });
    }

    #[test]
    fn avg_ignores_documents_without_the_field() {
        let output = run(
            &[doc! { "$group": { "_id": null, "averagePublishedYear": { "$avg": "$publishedYear" } } }],
            books(),
        );

        assert_eq!(output, vec![doc! { "_id": null, "averagePublishedYear": 1946.0 }]);
    }

    #[test]
    fn avg_without_numeric_inputs_is_null() {
        let output = run(
            &[doc! { "$group": { "_id": null, "avg": { "$avg": "$missing" }, "total": { "$sum": "$missing" } } }],
            books(),
        );

        assert_eq!(output, vec![doc! { "_id": null, "avg": null, "total": 0 }]);
    }

    #[test]
    fn sum_widens_with_its_inputs() {
        let max = i32::MAX;
        let input = vec![
            doc! { "n": max, "x": 1 },
            doc! { "n": 1, "x": 0.5 },
        ];

        let output = run(
            &[doc! { "$group": { "_id": 0, "n": { "$sum": "$n" }, "x": { "$sum": "$x" } } }],
            input,
        );

        let widened = max as i64 + 1;
        assert_eq!(output, vec![doc! { "_id": 0, "n": widened, "x": 1.5 }]);
    }

    #[test]
    fn min_max_first_last() {
        let output = run(
            &[doc! { "$group": {
                "_id": null,
                "lowest": { "$min": "$rating" },
                "highest": { "$max": "$rating" },
                "first": { "$first": "$title" },
                "last": { "$last": "$publishedYear" },
            } }],
            books(),
        );

        assert_eq!(
            output,
            vec![doc! { "_id": null, "lowest": 3.0, "highest": 4.8, "first": "The hobbit", "last": null }]
        );
    }

    #[test]
    fn sort_then_limit_picks_top_rated() {
        let output = run(&[doc! { "$sort": { "rating": -1 } }, doc! { "$limit": 1 }], books());

        assert_eq!(output.len(), 1);
        assert_eq!(output[0].get_str("title").unwrap(), "The 5th wave");
    }

    #[test]
    fn match_skip_and_empty_input() {
        let output = run(
            &[doc! { "$match": { "rating": { "$gte": 4.5 } } }, doc! { "$skip": 1 }],
            books(),
        );
        let titles = output.iter().map(|b| b.get_str("title").unwrap()).collect::<Vec<_>>();
        assert_eq!(titles, ["The 5th wave", "Chozi la kheri"]);

        assert!(run(&[doc! { "$group": { "_id": "$genre" } }], Vec::new()).is_empty());
    }
}
