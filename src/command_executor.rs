//! Drives the modern `insert`/`update`/`delete` commands against nodes
//! whose `maxWireVersion` indicates command support, splitting a buffer
//! into one or more command documents under the node's advertised size
//! and batch-count limits.

use bson::{Bson, Document};
use tracing::{debug, trace};

use crate::buffer::{CommandBuffer, Kind};
use crate::error::Error;
use crate::legacy_executor;
use crate::results::ResultAccumulator;
use crate::size_estimator::{bson_len, will_overflow, MAX_BSON_OVERHEAD};
use crate::transport::{NodeCapabilities, NodeHint, Transport, WriteConcern};

fn command_name(kind: Kind) -> &'static str {
    match kind {
        Kind::Insert => "insert",
        Kind::Update => "update",
        Kind::Delete => "delete",
    }
}

fn items_field(kind: Kind) -> &'static str {
    match kind {
        Kind::Insert => "documents",
        Kind::Update => "updates",
        Kind::Delete => "deletes",
    }
}

/// Runs `buffer` against `hint` using the command path, merging every
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
    let mut acc = ResultAccumulator::new(buffer.kind());

    if buffer.is_empty() {
        acc.record_terminal_error(Error::empty_batch());
        return acc;
    }

    // A command-capable node may still share a replica set with command-naive
    // secondaries. For an unacknowledged write we'd otherwise wait on a reply
    // nobody downstream needs, so fall back to the opcode path immediately
    // rather than spend a round trip proving the primary understands commands.
    if caps.min_wire_version == 0 && !wc.requires_ack() {
        debug!(kind = ?buffer.kind(), count = buffer.count(), "falling back to legacy path for unacknowledged write");
        return legacy_executor::execute(buffer, transport, hint, caps, db, collection, wc, initial_offset);
    }

    debug!(kind = ?buffer.kind(), count = buffer.count(), "dispatching to command path");

    let docs = buffer.documents();
    if fits_as_single_batch(docs, caps) {
        send_sub_batch(
            transport,
            hint,
            db,
            collection,
            wc,
            buffer,
            docs,
            initial_offset,
            &mut acc,
        );
        return acc;
    }

    execute_itemized(buffer, transport, hint, caps, db, collection, wc, initial_offset, &mut acc);
    acc
}

/// Whether the whole buffer can go out as a single command body without
/// walking it document by document: cheap to check, and the common case
/// for small batches.
fn fits_as_single_batch(docs: &[Document], caps: &NodeCapabilities) -> bool {
    if caps.max_write_batch_size > 0 && docs.len() as i64 > caps.max_write_batch_size {
        return false;
    }
    let Ok(total) = docs
        .iter()
        .try_fold(0i64, |acc, doc| bson_len(doc).map(|len| acc + len as i64))
    else {
        return false;
    };
    total <= caps.max_bson_object_size + MAX_BSON_OVERHEAD
}

#[allow(clippy::too_many_arguments)]
fn execute_itemized(
    buffer: &CommandBuffer,
    transport: &mut dyn Transport,
    hint: NodeHint,
    caps: &NodeCapabilities,
    db: &str,
    collection: &str,
    wc: &WriteConcern,
    initial_offset: i64,
    acc: &mut ResultAccumulator,
) {
    let ordered = buffer.ordered();
    let docs = buffer.documents();
    let max_bson = caps.max_bson_object_size;
    let max_batch = caps.max_write_batch_size;

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

        if doc_len > max_bson + MAX_BSON_OVERHEAD {
            acc.record_write_error(global_index, 2, "document exceeds maximum BSON size even alone");
            if ordered {
                if !batch.is_empty() {
                    let offset = batch_first_index.expect("non-empty batch has a first index");
                    send_sub_batch(transport, hint, db, collection, wc, buffer, &batch, offset, acc);
                }
                return;
            }
            continue;
        }

        // Per spec §4.5, the itemized path must account for the BSON
        // array-element framing around each item: a type byte, the
        // null-terminated stringified array index as the element's key,
        // and the terminating null of that cstring.
        let index_key_len = batch.len().to_string().len() as i64;
        let item_overhead = doc_len + index_key_len + 2;
        let would_overflow = !batch.is_empty()
            && will_overflow(batch_bytes, item_overhead, batch.len() as i64, max_bson, max_batch);

        if would_overflow {
            let offset = batch_first_index.expect("non-empty batch has a first index");
            send_sub_batch(transport, hint, db, collection, wc, buffer, &batch, offset, acc);
            batch.clear();
            batch_bytes = 0;
            batch_first_index = None;
            if acc.failed() && ordered {
                return;
            }
        }

        if batch.is_empty() {
            batch_first_index = Some(global_index);
        }
        let committed_key_len = batch.len().to_string().len() as i64;
        batch_bytes += doc_len + committed_key_len + 2;
        batch.push(doc.clone());
    }

    if !batch.is_empty() {
        let offset = batch_first_index.expect("non-empty batch has a first index");
        send_sub_batch(transport, hint, db, collection, wc, buffer, &batch, offset, acc);
    }
}

#[allow(clippy::too_many_arguments)]
fn send_sub_batch(
    transport: &mut dyn Transport,
    hint: NodeHint,
    db: &str,
    collection: &str,
    wc: &WriteConcern,
    buffer: &CommandBuffer,
    items: &[Document],
    offset: i64,
    acc: &mut ResultAccumulator,
) {
    trace!(count = items.len(), offset, "sending command sub-batch");

    let mut cmd = Document::new();
    cmd.insert(command_name(buffer.kind()), collection);
    cmd.insert(
        items_field(buffer.kind()),
        Bson::Array(items.iter().cloned().map(Bson::Document).collect()),
    );
    cmd.insert("ordered", buffer.ordered());
    let write_concern = wc.to_bson();
    if !write_concern.is_empty() {
        cmd.insert("writeConcern", write_concern);
    }

    match transport.command_simple(db, &cmd, hint) {
        Ok(reply) => acc.merge_command(&reply, offset),
        Err(e) => acc.record_transport_failure(e),
    }
}
