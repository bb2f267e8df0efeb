//! The write-command core of a MongoDB wire protocol driver.
//!
//! This crate turns a logical batch of inserts, updates, or deletes into one
//! or more on-wire exchanges with a single server node, splitting the batch
//! under the node's advertised size and count limits and merging the
//! replies into one [`FinalizedResult`](results::FinalizedResult).
//!
//! It speaks two protocols:
//!
//! - the modern **command** path (`insert`/`update`/`delete` commands),
//!   used against any node whose `maxWireVersion` is 2 or greater, and
//! - the legacy **opcode** path (`OP_INSERT`/`OP_UPDATE`/`OP_DELETE`,
//!   acknowledged with `getLastError`), used against older nodes.
//!
//! Network I/O, BSON encode/decode primitives, write-concern policy, and
//! node/connection selection are external collaborators; this crate depends
//! on them only through the [`transport::Transport`] trait.

pub mod buffer;
pub mod command_executor;
pub mod dispatcher;
pub mod error;
pub mod legacy_executor;
pub mod oid;
pub mod results;
pub mod size_estimator;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod test_support;

pub use buffer::{CommandBuffer, Kind};
pub use dispatcher::dispatch;
pub use error::{Error, ErrorKind, Result};
pub use results::{FinalizedResult, ResultAccumulator};
pub use transport::{NodeCapabilities, Transport};
