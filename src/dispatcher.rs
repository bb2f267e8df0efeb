//! The entry point tying node selection, protocol choice, and execution
//! together: given a buffer and a transport, pick a node, decide which
//! wire protocol it speaks, run the right executor, and finalize the
//! result.

use tracing::{info, warn};

use crate::buffer::{CommandBuffer, Kind};
use crate::command_executor;
use crate::error::Error;
use crate::legacy_executor;
use crate::results::{FinalizedResult, ResultAccumulator};
use crate::transport::{OperationHint, Transport, WriteConcern};

fn operation_hint(kind: Kind) -> OperationHint {
    match kind {
        Kind::Insert => OperationHint::Insert,
        Kind::Update => OperationHint::Update,
        Kind::Delete => OperationHint::Delete,
    }
}

/// Executes `buffer` against whatever node `transport` selects for
/// `db.collection` under `wc`, splitting and protocol-switching as needed,
/// and returns the finalized write result.
pub fn dispatch(
    buffer: &CommandBuffer,
    transport: &mut dyn Transport,
    db: &str,
    collection: &str,
    wc: &WriteConcern,
) -> FinalizedResult {
    let mut acc = ResultAccumulator::new(buffer.kind());

    if let Err(e) = wc.validate() {
        acc.record_terminal_error(e);
        return acc.finalize();
    }

    if buffer.is_empty() {
        acc.record_terminal_error(Error::empty_batch());
        return acc.finalize();
    }

    let Some(hint) = transport.preselect(operation_hint(buffer.kind()), wc) else {
        acc.record_terminal_error(Error::transport_failure(
            "no node available to accept this write",
        ));
        return acc.finalize();
    };

    let caps = transport.node_caps(hint);
    if caps.is_invalid() {
        acc.record_terminal_error(Error::transport_failure(
            "selected node is unreachable or reported invalid capabilities",
        ));
        return acc.finalize();
    }

    // Picking the command path here only means the node itself advertises
    // command support; the command executor may still fall back to the
    // legacy opcode path internally for an unacknowledged write against a
    // cluster with command-naive secondaries (see command_executor::execute).
    let use_command_path = caps.supports_write_commands();

    info!(
        kind = ?buffer.kind(),
        count = buffer.count(),
        node = hint,
        command_path = use_command_path,
        "dispatching write batch"
    );

    let acc = if use_command_path {
        command_executor::execute(buffer, transport, hint, &caps, db, collection, wc, 0)
    } else {
        legacy_executor::execute(buffer, transport, hint, &caps, db, collection, wc, 0)
    };

    if acc.failed() {
        warn!(kind = ?buffer.kind(), "write batch completed with failures");
    }

    acc.finalize()
}
