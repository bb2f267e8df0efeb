//! Auto-assignment of `_id` for documents inserted without one.
//!
//! The server never assigns an `_id` for non-command inserts, and result
//! merging for upsert indexing relies on the client knowing the identity of
//! every inserted document up front. [`with_auto_id`] mirrors the legacy
//! driver's insert helper: generate a fresh [`ObjectId`] and prepend it, so
//! the synthesized `_id` is always the document's first key (the server
//! rejects a document with a duplicate, later `_id` field, so prepending
//! -- not appending -- the original fields is required).

use bson::{oid::ObjectId, Bson, Document};

/// Returns `doc` unchanged if it already has an `_id`, or a copy of `doc`
/// with a freshly generated `_id` as its first field. Also returns the
/// `_id` that is now guaranteed to be present, for the caller to record in
/// the upsert/insert identity tracking.
pub fn with_auto_id(doc: &Document) -> (Document, Bson) {
    if let Some(id) = doc.get("_id") {
        return (doc.clone(), id.clone());
    }

    let id = Bson::ObjectId(ObjectId::new());
    let mut out = Document::new();
    out.insert("_id", id.clone());
    for (key, value) in doc.iter() {
        out.insert(key.clone(), value.clone());
    }

    (out, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_id_when_missing() {
        let doc = bson::doc! { "a": 1 };
        let (with_id, id) = with_auto_id(&doc);
        assert!(matches!(id, Bson::ObjectId(_)));
        assert_eq!(with_id.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(with_id.get_i32("a").unwrap(), 1);
    }

    #[test]
    fn preserves_existing_id() {
        let existing = ObjectId::new();
        let doc = bson::doc! { "_id": existing, "a": 1 };
        let (with_id, id) = with_auto_id(&doc);
        assert_eq!(id, Bson::ObjectId(existing));
        // No second `_id` key was introduced.
        assert_eq!(with_id.keys().filter(|k| *k == "_id").count(), 1);
    }
}
