//! A [`Transport`] that never touches a socket: replies are queued up
//! front and handed back in order, while every outgoing frame/command is
//! recorded for assertions. Used only by this crate's own unit tests.

use std::collections::VecDeque;

use bson::Document;

use crate::error::{Error, Result};
use crate::transport::{NodeCapabilities, NodeHint, OperationHint, Transport, WriteConcern};

#[derive(Clone, Debug)]
pub(crate) struct FakeTransport {
    sent_frames: Vec<Vec<u8>>,
    sent_commands: Vec<Document>,
    gle_replies: VecDeque<Document>,
    command_replies: VecDeque<Document>,
    node_caps: NodeCapabilities,
    next_hint: NodeHint,
    fail_preselect: bool,
    fail_send: bool,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        FakeTransport {
            sent_frames: Vec::new(),
            sent_commands: Vec::new(),
            gle_replies: VecDeque::new(),
            command_replies: VecDeque::new(),
            node_caps: NodeCapabilities::default(),
            next_hint: 1,
            fail_preselect: false,
            fail_send: false,
        }
    }

    pub(crate) fn with_gle_replies(mut self, replies: Vec<Document>) -> Self {
        self.gle_replies = replies.into();
        self
    }

    pub(crate) fn with_command_replies(mut self, replies: Vec<Document>) -> Self {
        self.command_replies = replies.into();
        self
    }

    pub(crate) fn with_node_caps(mut self, caps: NodeCapabilities) -> Self {
        self.node_caps = caps;
        self
    }

    pub(crate) fn failing_preselect() -> Self {
        let mut t = FakeTransport::new();
        t.fail_preselect = true;
        t
    }

    pub(crate) fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    pub(crate) fn sent_frame_count(&self) -> usize {
        self.sent_frames.len()
    }

    pub(crate) fn sent_commands(&self) -> &[Document] {
        &self.sent_commands
    }
}

impl Transport for FakeTransport {
    fn send(&mut self, rpc: &[u8], hint: Option<NodeHint>, _wc: &WriteConcern) -> Option<NodeHint> {
        if self.fail_send {
            return None;
        }
        self.sent_frames.push(rpc.to_vec());
        Some(hint.unwrap_or(self.next_hint))
    }

    fn recv_gle(&mut self, _hint: NodeHint) -> Result<Document> {
        self.gle_replies
            .pop_front()
            .ok_or_else(|| Error::transport_failure("FakeTransport: no queued getLastError reply"))
    }

    fn command_simple(&mut self, _db: &str, cmd: &Document, _hint: NodeHint) -> Result<Document> {
        self.sent_commands.push(cmd.clone());
        self.command_replies
            .pop_front()
            .ok_or_else(|| Error::transport_failure("FakeTransport: no queued command reply"))
    }

    fn preselect(&mut self, _op: OperationHint, _wc: &WriteConcern) -> Option<NodeHint> {
        if self.fail_preselect {
            None
        } else {
            Some(self.next_hint)
        }
    }

    fn node_caps(&mut self, _hint: NodeHint) -> NodeCapabilities {
        self.node_caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_sent_frames_and_replays_queued_replies() {
        let mut transport = FakeTransport::new().with_gle_replies(vec![bson::doc! { "n": 1 }]);
        let hint = transport.preselect(OperationHint::Insert, &WriteConcern::acknowledged());
        assert_eq!(hint, Some(1));
        let sent = transport.send(&[1, 2, 3], hint, &WriteConcern::acknowledged());
        assert_eq!(sent, Some(1));
        assert_eq!(transport.sent_frame_count(), 1);
        let reply = transport.recv_gle(sent.unwrap()).unwrap();
        assert_eq!(reply.get_i32("n").unwrap(), 1);
    }

    #[test]
    fn preselect_fails_when_configured_to() {
        let mut transport = FakeTransport::failing_preselect();
        assert_eq!(
            transport.preselect(OperationHint::Update, &WriteConcern::acknowledged()),
            None
        );
    }

    #[test]
    fn send_fails_when_configured_to() {
        let mut transport = FakeTransport::new().failing_send();
        let sent = transport.send(&[1, 2, 3], Some(1), &WriteConcern::acknowledged());
        assert_eq!(sent, None);
        assert_eq!(transport.sent_frame_count(), 0);
    }
}
