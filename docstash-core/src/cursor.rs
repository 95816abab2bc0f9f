//! Result cursors for queries and aggregations.
//!
//! A [`Cursor`] holds a point-in-time copy of its results, so mutations issued
//! after the cursor was created are never observed through it. It can be sorted,
//! consumed as an iterator or a [`Stream`], or materialized with
//! [`Cursor::to_list`].

use std::{
    collections::VecDeque,
    pin::Pin,
    task::{Context, Poll},
};
use bson::{Bson, Document};
use futures::Stream;

use crate::{
    query::{SortDirection, SortKey},
    value::{compare_values, get_path},
};

/// Sorts documents by several keys, the first key being the most significant.
///
/// Each key is applied as a stable sort, from the least significant key to the
/// most significant one. Documents whose key is missing or null sort as if it held
/// `missing`.
pub fn sort_documents(documents: &mut [Document], keys: &[SortKey], missing: &Bson) {
    for key in keys.iter().rev() {
        documents.sort_by(|a, b| {
            let ordering = compare_values(
                sort_value(a, &key.field, missing),
                sort_value(b, &key.field, missing),
            );

            match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
}

fn sort_value<'a>(document: &'a Document, field: &str, missing: &'a Bson) -> &'a Bson {
    match get_path(document, field) {
        None | Some(Bson::Null) => missing,
        Some(value) => value,
    }
}

/// A finite sequence of result documents.
#[derive(Debug, Clone, Default)]
pub struct Cursor {
    documents: VecDeque<Document>,
}

impl Cursor {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents: documents.into() }
    }

    /// Orders the remaining documents by one key.
    ///
    /// Documents missing the key sort before every present value.
    pub fn sort(self, field: impl Into<String>, direction: impl Into<SortDirection>) -> Self {
        self.sort_by([SortKey::new(field, direction)])
    }

    /// Orders the remaining documents by several keys, primary key first.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let cursor = commits
    ///     .find(doc! { "repo_id": repo_id })
    ///     .await?
    ///     .sort_by([SortKey::new("timestamp", -1), SortKey::new("mileage", -1)]);
    /// ```
    pub fn sort_by(mut self, keys: impl IntoIterator<Item = SortKey>) -> Self {
        let keys = keys.into_iter().collect::<Vec<_>>();
        sort_documents(self.documents.make_contiguous(), &keys, &Bson::Null);
        self
    }

    /// Number of documents not yet consumed.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Materializes the remaining documents, keeping at most `limit` of them.
    pub fn to_list(self, limit: Option<usize>) -> Vec<Document> {
        let mut documents = Vec::from(self.documents);
        if let Some(limit) = limit {
            documents.truncate(limit);
        }
        documents
    }
}

impl IntoIterator for Cursor {
    type Item = Document;
    type IntoIter = std::collections::vec_deque::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

impl Stream for Cursor {
    type Item = Document;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.documents.pop_front())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.documents.len(), Some(self.documents.len()))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use futures::StreamExt;

    #[test]
    fn multi_key_sort_uses_first_key_as_primary() {
        let cursor = Cursor::new(vec![
            doc! { "a": 1, "b": 2 },
            doc! { "a": 0, "b": 9 },
            doc! { "a": 1, "b": 1 },
        ])
        .sort_by([SortKey::new("a", 1), SortKey::new("b", 1)]);

        assert_eq!(
            cursor.to_list(None),
            vec![doc! { "a": 0, "b": 9 }, doc! { "a": 1, "b": 1 }, doc! { "a": 1, "b": 2 }],
        );
    }

    #[test]
    fn missing_keys_sort_first_ascending_and_last_descending() {
        let documents = vec![doc! { "t": 5 }, doc! { "x": 1 }, doc! { "t": 2 }];

        let ascending = Cursor::new(documents.clone()).sort("t", 1).to_list(None);
        assert_eq!(ascending, vec![doc! { "x": 1 }, doc! { "t": 2 }, doc! { "t": 5 }]);

        let descending = Cursor::new(documents).sort("t", -1).to_list(None);
        assert_eq!(descending, vec![doc! { "t": 5 }, doc! { "t": 2 }, doc! { "x": 1 }]);
    }

    #[test]
    fn to_list_honors_limit() {
        let cursor = Cursor::new(vec![doc! { "n": 1 }, doc! { "n": 2 }, doc! { "n": 3 }]);
        assert_eq!(cursor.to_list(Some(2)).len(), 2);
    }

    #[tokio::test]
    async fn cursor_streams_documents_in_order() {
        let mut cursor = Cursor::new(vec![doc! { "n": 1 }, doc! { "n": 2 }]);

        assert_eq!(cursor.next().await, Some(doc! { "n": 1 }));
        assert_eq!(cursor.len(), 1);
        assert_eq!(cursor.next().await, Some(doc! { "n": 2 }));
        assert_eq!(cursor.next().await, None);
    }
}
