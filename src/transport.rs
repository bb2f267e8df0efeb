//! The five operations the write-command core needs from a network
//! transport, and the small bits of node/write-concern state that travel
//! alongside them.
//!
//! Everything in this module is an external collaborator: connection
//! selection, socket I/O, and write-concern policy belong to a higher
//! layer. The core only ever reaches the network through the [`Transport`]
//! trait, which makes it possible to drive the executors in tests with a
//! fake that replays fixed replies and never touches a socket.

use bson::Document;

use crate::error::Result;

/// Opaque handle identifying a server connection/node, returned by
/// [`Transport::preselect`] and threaded through subsequent calls.
pub type NodeHint = u64;

/// The operation-kind hint passed to [`Transport::preselect`], used by
/// server selection policy to pick a node capable of accepting writes (the
/// transport's concern, not this crate's).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperationHint {
    Insert,
    Update,
    Delete,
}

/// The subset of write-concern policy the write-core reads. The full
/// policy object (timeouts, tag sets, journal requirements) is an external
/// collaborator; this crate only needs to know whether the caller wants an
/// acknowledgement and how to render the concern into the command/legacy
/// wire shapes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteConcern {
    w: Option<WValue>,
    j: Option<bool>,
    wtimeout_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq)]
enum WValue {
    Acks(i32),
    Mode(String),
}

impl WriteConcern {
    /// The default write concern: acknowledged, no special `w`/`j`/timeout.
    pub fn acknowledged() -> Self {
        WriteConcern::default()
    }

    /// `w: 0` -- fire-and-forget, no acknowledgement requested.
    pub fn unacknowledged() -> Self {
        WriteConcern {
            w: Some(WValue::Acks(0)),
            j: None,
            wtimeout_ms: None,
        }
    }

    pub fn with_tag(mode: impl Into<String>) -> Self {
        WriteConcern {
            w: Some(WValue::Mode(mode.into())),
            j: None,
            wtimeout_ms: None,
        }
    }

    pub fn with_wtimeout_ms(mut self, wtimeout_ms: i64) -> Self {
        self.wtimeout_ms = Some(wtimeout_ms);
        self
    }

    /// Whether this concern requires the server (or, on the legacy path,
    /// explicit `getLastError`) to acknowledge the write.
    pub fn requires_ack(&self) -> bool {
        !matches!(self.w, Some(WValue::Acks(0)))
    }

    /// Rejects write concerns that can never be satisfied: a negative
    /// timeout.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.wtimeout_ms, Some(t) if t < 0) {
            return Err(crate::error::Error::invalid_arg(
                "wtimeout must not be negative",
            ));
        }
        Ok(())
    }

    /// Renders this write concern as the document the command path embeds
    /// under `writeConcern`. An unset concern renders as the empty
    /// document, the shared "no options" sentinel the teacher's design
    /// treats as an immutable constant.
    pub fn to_bson(&self) -> Document {
        let mut doc = Document::new();
        match &self.w {
            Some(WValue::Acks(n)) => {
                doc.insert("w", *n);
            }
            Some(WValue::Mode(mode)) => {
                doc.insert("w", mode.clone());
            }
            None => {}
        }
        if let Some(j) = self.j {
            doc.insert("j", j);
        }
        if let Some(wtimeout) = self.wtimeout_ms {
            doc.insert("wtimeout", wtimeout);
        }
        doc
    }
}

/// A node's advertised capability limits, as reported by
/// [`Transport::node_caps`].
///
/// Per the external `node_caps` contract, `-1` on any field signals that
/// the node is unreachable or its capabilities are unknown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeCapabilities {
    pub min_wire_version: i32,
    pub max_wire_version: i32,
    pub max_bson_object_size: i64,
    pub max_message_size_bytes: i64,
    pub max_write_batch_size: i64,
}

impl NodeCapabilities {
    /// `true` when `max_wire_version` carries the `-1` invalid-node
    /// sentinel.
    pub fn is_invalid(&self) -> bool {
        self.max_wire_version == -1
    }

    /// `true` when this node understands the command-based write path
    /// (`insert`/`update`/`delete` commands), i.e. `max_wire_version >= 2`.
    pub fn supports_write_commands(&self) -> bool {
        self.max_wire_version >= 2
    }
}

impl Default for NodeCapabilities {
    /// The historical legacy wire protocol limits: a 16 MiB document, a 48
    /// MB message, and 1000 operations per write batch.
    fn default() -> Self {
        NodeCapabilities {
            min_wire_version: 0,
            max_wire_version: 0,
            max_bson_object_size: 16_777_216,
            max_message_size_bytes: 48_000_000,
            max_write_batch_size: 1_000,
        }
    }
}

/// The network transport, as consumed by the write-command core. A real
/// implementation owns connection pooling, TLS, and wire framing beyond
/// what this crate builds; this crate only calls these five operations.
pub trait Transport {
    /// Sends a pre-built wire message (an `OP_INSERT`/`OP_UPDATE`/
    /// `OP_DELETE` frame) to the node identified by `hint`, or lets the
    /// transport pick one if `hint` is `None`. Returns the node the message
    /// was actually sent to, or `None` on failure.
    fn send(
        &mut self,
        rpc: &[u8],
        hint: Option<NodeHint>,
        wc: &WriteConcern,
    ) -> Option<NodeHint>;

    /// Receives a single `getLastError`-shaped reply document from `hint`.
    fn recv_gle(&mut self, hint: NodeHint) -> Result<Document>;

    /// Sends `cmd` to `db` on `hint` as a single command round-trip and
    /// returns the single reply document.
    fn command_simple(&mut self, db: &str, cmd: &Document, hint: NodeHint) -> Result<Document>;

    /// Asks the transport to select a node suitable for the given
    /// operation kind under the given write concern. Returns `None` on
    /// failure.
    fn preselect(&mut self, op: OperationHint, wc: &WriteConcern) -> Option<NodeHint>;

    /// Returns the capability limits of the node identified by `hint`.
    fn node_caps(&mut self, hint: NodeHint) -> NodeCapabilities;
}
