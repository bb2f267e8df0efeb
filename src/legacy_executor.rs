//! Drives `OP_INSERT`/`OP_UPDATE`/`OP_DELETE` against nodes that predate
//! command-based writes, optionally followed by a `getLastError` when the
//! write concern requires acknowledgement.

use bson::Document;
use tracing::{debug, trace};

use crate::buffer::{CommandBuffer, Kind};
use crate::error::Error;
use crate::results::ResultAccumulator;
use crate::size_estimator::bson_len;
use crate::transport::{NodeCapabilities, NodeHint, Transport, WriteConcern};
use crate::wire::{self, flags, next_request_id};

/// Runs `buffer` against `hint` using the legacy opcode path, merging every
/// reply into a fresh [`ResultAccumulator`] with `initial_offset` added to
/// every index.
pub fn execute(
    buffer: &CommandBuffer,
    transport: &mut dyn Transport,
    hint: NodeHint,
    caps: &NodeCapabilities,
    db: &str,
    collection: &str,
    wc: &WriteConcern,
    initial_offset: i64,
) -> ResultAccumulator {
    let namespace = format!("{db}.{collection}");
    let mut acc = ResultAccumulator::new(buffer.kind());

    if buffer.is_empty() {
        acc.record_terminal_error(Error::empty_batch());
        return acc;
    }

    debug!(kind = ?buffer.kind(), count = buffer.count(), "dispatching to legacy opcode path");

    match buffer.kind() {
        Kind::Delete => execute_delete(buffer, transport, hint, &namespace, wc, initial_offset, &mut acc),
        Kind::Insert => execute_insert(
            buffer,
            transport,
            hint,
            &namespace,
            wc,
            caps,
            initial_offset,
            &mut acc,
        ),
        Kind::Update => execute_update(buffer, transport, hint, &namespace, wc, initial_offset, &mut acc),
    }

    acc
}

fn execute_delete(
    buffer: &CommandBuffer,
    transport: &mut dyn Transport,
    hint: NodeHint,
    namespace: &str,
    wc: &WriteConcern,
    initial_offset: i64,
    acc: &mut ResultAccumulator,
) {
    let single_remove_flag = if buffer.multi() {
        0
    } else {
        flags::delete::SINGLE_REMOVE
    };
    let ordered = buffer.ordered();

    for (i, entry) in buffer.documents().iter().enumerate() {
        let Ok(q) = entry.get_document("q") else {
            acc.record_terminal_error(Error::invalid_arg("delete entry missing 'q'"));
            return;
        };

        let frame = match wire::operations::build_op_delete(
            next_request_id(),
            namespace,
            single_remove_flag,
            q,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                acc.record_terminal_error(e);
                return;
            }
        };

        let Some(sent_hint) = transport.send(&frame, Some(hint), wc) else {
            acc.record_transport_failure(Error::transport_failure("OP_DELETE send failed"));
            return;
        };

        if wc.requires_ack() {
            match transport.recv_gle(sent_hint) {
                Ok(reply) => acc.merge_legacy(&reply, initial_offset + i as i64),
                Err(e) => {
                    acc.record_transport_failure(e);
                    return;
                }
            }
            if acc.failed() && ordered {
                return;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn execute_insert(
    buffer: &CommandBuffer,
    transport: &mut dyn Transport,
    hint: NodeHint,
    namespace: &str,
    wc: &WriteConcern,
    caps: &NodeCapabilities,
    initial_offset: i64,
    acc: &mut ResultAccumulator,
) {
    let ordered = buffer.ordered();
    let allow_bulk = buffer.allow_bulk();
    let docs = buffer.documents();

    let mut batch: Vec<Document> = Vec::new();
    let mut batch_bytes: i64 = 0;
    let mut batch_first_index: Option<i64> = None;

    for (i, doc) in docs.iter().enumerate() {
        let global_index = initial_offset + i as i64;
        let doc_len = match bson_len(doc) {
            Ok(len) => len as i64,
            Err(e) => {
                acc.record_terminal_error(e);
                return;
            }
        };

        if doc_len > caps.max_bson_object_size {
            acc.record_write_error(global_index, 2, "document exceeds maximum BSON object size");
            if ordered {
                return;
            }
            continue;
        }

        let would_overflow = !batch.is_empty()
            && (!allow_bulk || batch_bytes + doc_len > caps.max_message_size_bytes);

        if would_overflow {
            let offset = batch_first_index.expect("non-empty batch has a first index");
            if !flush_insert_batch(transport, hint, wc, namespace, ordered, &batch, offset, acc) {
                return;
            }
            batch.clear();
            batch_bytes = 0;
            batch_first_index = None;
        }

        if batch.is_empty() {
            batch_first_index = Some(global_index);
        }
        batch.push(doc.clone());
        batch_bytes += doc_len;
    }

    if !batch.is_empty() {
        let offset = batch_first_index.expect("non-empty batch has a first index");
        flush_insert_batch(transport, hint, wc, namespace, ordered, &batch, offset, acc);
    }
}

#[allow(clippy::too_many_arguments)]
fn flush_insert_batch(
    transport: &mut dyn Transport,
    hint: NodeHint,
    wc: &WriteConcern,
    namespace: &str,
    ordered: bool,
    batch: &[Document],
    offset: i64,
    acc: &mut ResultAccumulator,
) -> bool {
    let flags = if !ordered {
        flags::insert::CONTINUE_ON_ERROR
    } else {
        0
    };

    trace!(count = batch.len(), offset, "flushing OP_INSERT batch");

    let frame = match wire::operations::build_op_insert(next_request_id(), flags, namespace, batch)
    {
        Ok(frame) => frame,
        Err(e) => {
            acc.record_terminal_error(e);
            return false;
        }
    };

    let Some(sent_hint) = transport.send(&frame, Some(hint), wc) else {
        acc.record_transport_failure(Error::transport_failure("OP_INSERT send failed"));
        return false;
    };

    if wc.requires_ack() {
        match transport.recv_gle(sent_hint) {
            Ok(mut reply) => {
                // The server always returns n=0 for legacy insert
                // acknowledgement; substitute the batch size unless an
                // error was reported.
                if !reply.contains_key("err") && reply.get_i32("n").unwrap_or(0) == 0 {
                    reply.insert("n", batch.len() as i32);
                }
                acc.merge_legacy(&reply, offset);
            }
            Err(e) => {
                acc.record_transport_failure(e);
                return false;
            }
        }
        if acc.failed() && ordered {
            return false;
        }
    }

    true
}

fn execute_update(
    buffer: &CommandBuffer,
    transport: &mut dyn Transport,
    hint: NodeHint,
    namespace: &str,
    wc: &WriteConcern,
    initial_offset: i64,
    acc: &mut ResultAccumulator,
) {
    // Validate every replacement-style update document before sending
    // anything: a single malformed entry aborts the whole buffer.
    for (i, entry) in buffer.documents().iter().enumerate() {
        let Ok(u) = entry.get_document("u") else {
            acc.record_terminal_error(Error::invalid_arg("update entry missing 'u'"));
            return;
        };
        if let Some(message) = validate_update_document(u) {
            acc.record_terminal_error(Error::malformed_update(initial_offset + i as i64, message));
            return;
        }
    }

    let ordered = buffer.ordered();

    for (i, entry) in buffer.documents().iter().enumerate() {
        let q = entry.get_document("q").expect("validated above").clone();
        let u = entry.get_document("u").expect("validated above").clone();
        let multi = entry.get_bool("multi").unwrap_or(false);
        let upsert = entry.get_bool("upsert").unwrap_or(false);

        let mut op_flags = 0;
        if upsert {
            op_flags |= flags::update::UPSERT;
        }
        if multi {
            op_flags |= flags::update::MULTI_UPDATE;
        }

        let frame = match wire::operations::build_op_update(
            next_request_id(),
            namespace,
            op_flags,
            &q,
            &u,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                acc.record_terminal_error(e);
                return;
            }
        };

        let Some(sent_hint) = transport.send(&frame, Some(hint), wc) else {
            acc.record_transport_failure(Error::transport_failure("OP_UPDATE send failed"));
            return;
        };

        if wc.requires_ack() {
            match transport.recv_gle(sent_hint) {
                Ok(mut reply) => {
                    backfill_legacy_upsert_id(&mut reply, upsert, &q, &u);
                    acc.merge_legacy(&reply, initial_offset + i as i64);
                }
                Err(e) => {
                    acc.record_transport_failure(e);
                    return;
                }
            }
            if acc.failed() && ordered {
                return;
            }
        }
    }
}

/// Pre-2.6 servers don't report an `upserted` field for updates that
/// turned into inserts; back-fill one from the update document's (or
/// selector's) `_id` so `merge_legacy` can record the upsert identity.
fn backfill_legacy_upsert_id(reply: &mut Document, is_upsert: bool, q: &Document, u: &Document) {
    let n = reply.get_i32("n").unwrap_or(0);
    let updated_existing = reply.get_bool("updatedExisting").unwrap_or(true);

    if is_upsert && n > 0 && !reply.contains_key("upserted") && !updated_existing {
        if let Some(id) = u.get("_id").or_else(|| q.get("_id")).cloned() {
            reply.insert("upserted", id);
        }
    }
}

/// A dollar-prefixed first key marks an update-operator document, which is
/// exempt from the replacement-document key restriction. Otherwise every
/// top-level key must be neither dollar-prefixed nor dotted.
///
/// `Document` keys are always valid UTF-8 already, so the "invalid UTF-8"
/// check the legacy driver performed on raw bytes has no counterpart here.
fn validate_update_document(u: &Document) -> Option<String> {
    let is_operator_document = u
        .keys()
        .next()
        .map(|key| key.starts_with('$'))
        .unwrap_or(false);
    if is_operator_document {
        return None;
    }

    for key in u.keys() {
        if key.starts_with('$') {
            return Some(format!(
                "replacement document must not contain dollar-prefixed key '{key}'"
            ));
        }
        if key.contains('.') {
            return Some(format!(
                "replacement document must not contain dotted key '{key}'"
            ));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeTransport;

    fn caps() -> NodeCapabilities {
        NodeCapabilities::default()
    }

    #[test]
    fn s1_like_insert_ack_merges_batch_size_into_n() {
        let docs = vec![bson::doc! { "a": 1 }, bson::doc! { "a": 2 }];
        let buffer = CommandBuffer::new_insert(&docs, true, true).unwrap();
        let mut transport = FakeTransport::new().with_gle_replies(vec![bson::doc! { "n": 0, "ok": 1.0 }]);

        let acc = execute(
            &buffer,
            &mut transport,
            1,
            &caps(),
            "db",
            "coll",
            &WriteConcern::acknowledged(),
            0,
        );

        assert_eq!(acc.n_inserted(), 2);
        assert!(!acc.failed());
    }

    #[test]
    fn s3_like_oversize_ordered_stops_before_sending() {
        let big = bson::doc! { "a": "x".repeat(20_000_000) };
        let small = bson::doc! { "a": 1 };
        let buffer = CommandBuffer::new_insert(&[big, small], true, true).unwrap();
        let mut transport = FakeTransport::new();

        let acc = execute(
            &buffer,
            &mut transport,
            1,
            &caps(),
            "db",
            "coll",
            &WriteConcern::acknowledged(),
            0,
        );

        assert_eq!(acc.n_inserted(), 0);
        assert_eq!(acc.write_errors().len(), 1);
        assert_eq!(acc.write_errors()[0].get_i32("index").unwrap(), 0);
        assert_eq!(transport.sent_frame_count(), 0);
    }

    #[test]
    fn s4_like_legacy_upsert_object_id_backfill() {
        let buffer = CommandBuffer::new_update(
            bson::doc! { "_id": 7 },
            bson::doc! { "_id": 7, "a": 1 },
            true,
            false,
            true,
        );
        let mut transport =
            FakeTransport::new().with_gle_replies(vec![bson::doc! { "n": 1, "updatedExisting": false }]);

        let acc = execute(
            &buffer,
            &mut transport,
            1,
            &caps(),
            "db",
            "coll",
            &WriteConcern::acknowledged(),
            0,
        );

        assert_eq!(acc.n_upserted(), 1);
        assert_eq!(acc.upserted()[0].get_i32("index").unwrap(), 0);
        assert_eq!(acc.upserted()[0].get_i32("_id").unwrap(), 7);
    }

    #[test]
    fn s5_like_malformed_update_aborts_before_sending() {
        let buffer = CommandBuffer::new_update(
            bson::doc! { "x": 1 },
            bson::doc! { "a.b": 1 },
            false,
            false,
            true,
        );
        let mut transport = FakeTransport::new();

        let acc = execute(
            &buffer,
            &mut transport,
            1,
            &caps(),
            "db",
            "coll",
            &WriteConcern::acknowledged(),
            0,
        );

        assert!(acc.failed());
        assert_eq!(transport.sent_frame_count(), 0);
    }

    #[test]
    fn unordered_delete_continues_past_per_operation_errors() {
        let mut buffer = CommandBuffer::new_delete(bson::doc! { "x": 1 }, false, false);
        buffer.append_delete(bson::doc! { "x": 2 });
        let mut transport = FakeTransport::new().with_gle_replies(vec![
            bson::doc! { "n": 0, "err": "no match", "code": 0 },
            bson::doc! { "n": 1 },
        ]);

        let acc = execute(
            &buffer,
            &mut transport,
            1,
            &caps(),
            "db",
            "coll",
            &WriteConcern::acknowledged(),
            0,
        );

        assert_eq!(transport.sent_frame_count(), 2);
        assert_eq!(acc.n_removed(), 1);
    }
}
