//! Accumulates one logical batch of writes -- an ordered sequence of insert
//! documents, update specs, or delete specs -- along with the ordering and
//! bulk-insert flags that govern how the batch is executed.
//!
//! A [`CommandBuffer`] never mixes operation kinds: the kind is fixed at
//! construction and every subsequent `append_*` call must match it. The
//! underlying C driver this crate's design descends from represents the
//! batch as a `bson_t` keyed by stringified array indices ("0", "1", ...);
//! in Rust a plain `Vec<Document>` already gives the same dense,
//! order-preserving prefix for free, so that's what's used here. Explicit
//! `destroy` is unnecessary -- `Drop` releases the `Vec` when the buffer
//! goes out of scope.

use bson::{Bson, Document};

use crate::error::{Error, Result};
use crate::size_estimator::bson_len;

/// Which of the three write operations a [`CommandBuffer`] holds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Kind {
    Insert,
    Update,
    Delete,
}

/// One logical batch of same-kind write operations.
#[derive(Clone, Debug)]
pub struct CommandBuffer {
    kind: Kind,
    ordered: bool,
    /// Insert-only: if `false`, the legacy path must send exactly one
    /// document per `OP_INSERT` frame even though the command path still
    /// uses a single array.
    allow_bulk: bool,
    /// Delete-only: applies to every selector appended to this buffer.
    multi: bool,
    documents: Vec<Document>,
}

impl CommandBuffer {
    /// Builds a buffer for an insert batch, auto-assigning `_id` on any
    /// document that lacks one.
    pub fn new_insert(docs: &[Document], ordered: bool, allow_bulk: bool) -> Result<Self> {
        let mut buffer = CommandBuffer {
            kind: Kind::Insert,
            ordered,
            allow_bulk,
            multi: false,
            documents: Vec::with_capacity(docs.len()),
        };
        buffer.append_insert(docs)?;
        Ok(buffer)
    }

    /// Builds a buffer for an update batch with one initial entry.
    pub fn new_update(q: Document, u: Document, upsert: bool, multi: bool, ordered: bool) -> Self {
        let mut buffer = CommandBuffer {
            kind: Kind::Update,
            ordered,
            allow_bulk: true,
            multi: false,
            documents: Vec::new(),
        };
        buffer.append_update(q, u, upsert, multi);
        buffer
    }

    /// Builds a buffer for a delete batch with one initial entry. `multi`
    /// governs every selector subsequently appended to this buffer.
    pub fn new_delete(q: Document, multi: bool, ordered: bool) -> Self {
        let mut buffer = CommandBuffer {
            kind: Kind::Delete,
            ordered,
            allow_bulk: true,
            multi,
            documents: Vec::new(),
        };
        buffer.append_delete(q);
        buffer
    }

    /// Appends insert documents, auto-assigning `_id` on any that lack one.
    ///
    /// Each incoming document must encode to at least 5 bytes of BSON (the
    /// smallest legal empty document); anything smaller is rejected as an
    /// invalid argument before it ever reaches the wire.
    pub fn append_insert(&mut self, docs: &[Document]) -> Result<()> {
        debug_assert_eq!(self.kind, Kind::Insert);
        for doc in docs {
            if bson_len(doc)? < 5 {
                return Err(Error::invalid_arg(
                    "insert document encodes to less than the minimum legal BSON length",
                ));
            }
            let (with_id, _id) = crate::oid::with_auto_id(doc);
            self.documents.push(with_id);
        }
        Ok(())
    }

    /// Appends one update entry, wrapping `{q, u, upsert, multi}` in that
    /// field order.
    pub fn append_update(&mut self, q: Document, u: Document, upsert: bool, multi: bool) {
        debug_assert_eq!(self.kind, Kind::Update);
        self.documents.push(bson::doc! {
            "q": q,
            "u": u,
            "upsert": upsert,
            "multi": multi,
        });
    }

    /// Appends one delete entry, wrapping `{q, limit}` where `limit` is `0`
    /// when this buffer's `multi` flag is set, else `1`.
    pub fn append_delete(&mut self, q: Document) {
        debug_assert_eq!(self.kind, Kind::Delete);
        let limit: i32 = if self.multi { 0 } else { 1 };
        self.documents.push(bson::doc! {
            "q": q,
            "limit": limit,
        });
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn ordered(&self) -> bool {
        self.ordered
    }

    pub fn allow_bulk(&self) -> bool {
        self.allow_bulk
    }

    pub fn multi(&self) -> bool {
        self.multi
    }

    pub fn count(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Converts the buffer's entries into a BSON array value, for the
    /// command path's whole-buffer fast path.
    pub(crate) fn as_bson_array(&self) -> Bson {
        Bson::Array(self.documents.iter().cloned().map(Bson::Document).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_buffer_assigns_missing_ids_and_keeps_existing() {
        let existing = bson::oid::ObjectId::new();
        let docs = vec![bson::doc! { "a": 1 }, bson::doc! { "_id": existing, "a": 2 }];
        let buffer = CommandBuffer::new_insert(&docs, true, true).unwrap();
        assert_eq!(buffer.count(), 2);
        assert!(buffer.documents()[0].contains_key("_id"));
        assert_eq!(
            buffer.documents()[1].get_object_id("_id").unwrap(),
            existing
        );
    }

    #[test]
    fn delete_buffer_uses_multi_flag_for_every_entry() {
        let mut buffer = CommandBuffer::new_delete(bson::doc! { "x": 1 }, true, false);
        buffer.append_delete(bson::doc! { "x": 2 });
        for doc in buffer.documents() {
            assert_eq!(doc.get_i32("limit").unwrap(), 0);
        }
    }

    #[test]
    fn update_buffer_wraps_fields_in_order() {
        let buffer = CommandBuffer::new_update(
            bson::doc! { "x": 1 },
            bson::doc! { "$set": { "y": 2 } },
            true,
            false,
        );
        let keys: Vec<_> = buffer.documents()[0].keys().cloned().collect();
        assert_eq!(keys, vec!["q", "u", "upsert", "multi"]);
    }

    #[test]
    fn empty_document_is_the_minimum_legal_bson_length() {
        // `Document` can't underflow this, but the minimum is what the
        // length check in `append_insert` guards against.
        assert_eq!(bson_len(&bson::doc! {}).unwrap(), 5);
    }
}
