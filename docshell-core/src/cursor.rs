//! Lazy result sequences returned by `find`.

use std::fmt;

use bson::Document;
use serde::Deserialize;

use crate::{document::from_document, error::DocumentStoreResult};

/// A finite, lazily evaluated sequence of documents.
///
/// A cursor iterates over a snapshot taken when `find` was called; filtering
/// happens as the cursor is advanced. Calling `find` again starts a fresh scan.
pub struct Cursor {
    inner: Box<dyn Iterator<Item = Document> + Send>,
}

impl Cursor {
    /// Wraps any iterator of documents.
    pub fn new<I>(documents: I) -> Self
    where
        I: Iterator<Item = Document> + Send + 'static,
    {
        Self { inner: Box::new(documents) }
    }

    /// A cursor that yields nothing.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Drains the cursor and deserializes every document into `T`.
    ///
    /// # Errors
    ///
    /// Returns the first deserialization error encountered.
    pub fn deserialize<T>(self) -> DocumentStoreResult<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        self.map(from_document::<T>).collect()
    }
}

impl Iterator for Cursor {
    type Item = Document;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}
