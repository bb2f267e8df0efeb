//! Bit-exact framing for the legacy `OP_INSERT`/`OP_UPDATE`/`OP_DELETE`
//! wire protocol messages. Everything past "build the bytes" -- opening a
//! socket, reading a reply -- is the transport's job; this module hands
//! back a single `Vec<u8>` per frame for [`Transport::send`] to deliver.
//!
//! [`Transport::send`]: crate::transport::Transport::send

pub mod flags;
pub mod header;
pub mod operations;
pub mod util;

pub use header::{Header, OpCode};
pub use util::next_request_id;

/// The maximum length, in bytes, of a fully qualified `<db>.<collection>`
/// namespace string accepted on the legacy wire protocol.
pub const MAX_NAMESPACE_LEN: usize = 255;
