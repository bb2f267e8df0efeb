//! Aggregates per-request server replies into a single user-facing write
//! result: counters, a per-operation write error array, an upsert array,
//! and a terminal status.
//!
//! There are two merge entry points, one per wire protocol the executors
//! speak -- [`ResultAccumulator::merge_command`] for command-path replies
//! and [`ResultAccumulator::merge_legacy`] for `getLastError` replies -- and
//! both thread an `offset` through every index they record, so that
//! `writeErrors` and `upserted` entries always carry the position in the
//! caller's original logical batch rather than the position within
//! whichever server sub-batch produced them.

use bson::{Bson, Document};

use crate::buffer::Kind;
use crate::error::{Error, ErrorKind};

/// The finalized, user-visible outcome of executing a [`CommandBuffer`].
///
/// [`CommandBuffer`]: crate::buffer::CommandBuffer
#[derive(Clone, Debug)]
pub struct FinalizedResult {
    /// The BSON document in the shape described by the write-core result
    /// document contract: counters, `upserted`, `writeErrors`, and
    /// `writeConcernError`.
    pub document: Document,
    /// `true` iff nothing failed and both `writeErrors` and
    /// `writeConcernError` are empty.
    pub ok: bool,
    /// The first terminal error encountered, if any, surfaced for callers
    /// that want a `Result`-shaped outcome rather than just the document.
    pub error: Option<Error>,
}

/// Accumulates replies from one or more sub-batches of a single
/// [`CommandBuffer`](crate::buffer::CommandBuffer) execution.
#[derive(Clone, Debug)]
pub struct ResultAccumulator {
    kind: Kind,
    n_inserted: i64,
    n_matched: i64,
    n_modified: i64,
    n_removed: i64,
    n_upserted: i64,
    upserted: Vec<Document>,
    write_errors: Vec<Document>,
    write_concern_error: Option<Document>,
    failed: bool,
    omit_n_modified: bool,
    error: Option<Error>,
}

impl ResultAccumulator {
    pub fn new(kind: Kind) -> Self {
        ResultAccumulator {
            kind,
            n_inserted: 0,
            n_matched: 0,
            n_modified: 0,
            n_removed: 0,
            n_upserted: 0,
            upserted: Vec::new(),
            write_errors: Vec::new(),
            write_concern_error: None,
            failed: false,
            omit_n_modified: false,
            error: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn n_inserted(&self) -> i64 {
        self.n_inserted
    }

    pub fn n_matched(&self) -> i64 {
        self.n_matched
    }

    pub fn n_modified(&self) -> i64 {
        self.n_modified
    }

    pub fn n_removed(&self) -> i64 {
        self.n_removed
    }

    pub fn n_upserted(&self) -> i64 {
        self.n_upserted
    }

    pub fn write_errors(&self) -> &[Document] {
        &self.write_errors
    }

    pub fn upserted(&self) -> &[Document] {
        &self.upserted
    }

    /// Records a per-operation write error the executor synthesized itself
    /// (document too large, malformed update, ...) rather than one the
    /// server reported. `index` is already in the caller's original batch
    /// coordinates.
    pub fn record_write_error(&mut self, index: i64, code: i32, message: impl Into<String>) {
        self.write_errors.push(bson::doc! {
            "index": index,
            "code": code,
            "errmsg": message.into(),
        });
        self.failed = true;
    }

    /// Marks the accumulator as terminally failed due to a transport error.
    /// No further operations in this buffer's execution will be attempted.
    pub fn record_transport_failure(&mut self, err: Error) {
        self.failed = true;
        self.error = Some(err);
    }

    /// Marks the accumulator as terminally failed for a reason that isn't a
    /// per-operation write error (invalid write concern, empty batch, ...).
    pub fn record_terminal_error(&mut self, err: Error) {
        self.failed = true;
        self.error = Some(err);
    }

    fn append_write_errors(&mut self, errors: &[Bson], offset: i64) {
        for item in errors {
            let Bson::Document(doc) = item else { continue };
            let mut rewritten = doc.clone();
            let index = doc
                .get_i32("index")
                .map(i64::from)
                .or_else(|_| doc.get_i64("index"))
                .unwrap_or(0);
            rewritten.insert("index", offset + index);
            self.write_errors.push(rewritten);
            self.failed = true;
        }
    }

    /// Merges a reply to a command-path (`insert`/`update`/`delete`
    /// command) sub-batch sent starting at `offset`.
    pub fn merge_command(&mut self, reply: &Document, offset: i64) {
        let n = reply.get_i32("n").unwrap_or(0) as i64;

        match self.kind {
            Kind::Insert => self.n_inserted += n,
            Kind::Delete => self.n_removed += n,
            Kind::Update => {
                if let Ok(upserted) = reply.get_array("upserted") {
                    let mut u = 0i64;
                    for item in upserted {
                        let Bson::Document(doc) = item else { continue };
                        let index = doc
                            .get_i32("index")
                            .map(i64::from)
                            .or_else(|_| doc.get_i64("index"))
                            .unwrap_or(0);
                        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
                        self.upserted.push(bson::doc! {
                            "index": offset + index,
                            "_id": id,
                        });
                        u += 1;
                    }
                    self.n_upserted += u;
                    self.n_matched += (n - u).max(0);
                } else {
                    self.n_matched += n;
                }

                match reply.get("nModified") {
                    Some(Bson::Int32(v)) => self.n_modified += *v as i64,
                    _ => self.omit_n_modified = true,
                }
            }
        }

        if let Ok(errors) = reply.get_array("writeErrors") {
            if !errors.is_empty() {
                self.failed = true;
            }
            self.append_write_errors(errors, offset);
        }

        if let Ok(wce) = reply.get_document("writeConcernError") {
            self.write_concern_error = Some(wce.clone());
        }
    }

    /// Merges a flat `getLastError` reply for a legacy-path operation sent
    /// at `offset`. Legacy replies never carry a modified count, so this
    /// always marks the result as omitting `nModified`.
    pub fn merge_legacy(&mut self, reply: &Document, offset: i64) {
        let n = reply.get_i32("n").unwrap_or(0) as i64;
        let err = reply.get_str("err").ok();
        let code = reply.get_i32("code").ok();

        if let (Some(err), Some(code)) = (err, code) {
            self.failed = true;
            let synthetic = bson::doc! {
                "index": 0i64,
                "code": code,
                "errmsg": err.to_string(),
            };
            self.append_write_errors(&[Bson::Document(synthetic)], offset);
        }

        match self.kind {
            Kind::Insert => self.n_inserted += n,
            Kind::Delete => self.n_removed += n,
            Kind::Update => match reply.get("upserted") {
                Some(Bson::Array(arr)) => {
                    for item in arr {
                        let Bson::Document(doc) = item else { continue };
                        let index = doc
                            .get_i32("index")
                            .map(i64::from)
                            .or_else(|_| doc.get_i64("index"))
                            .unwrap_or(0);
                        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
                        self.upserted.push(bson::doc! {
                            "index": offset + index,
                            "_id": id,
                        });
                    }
                    self.n_upserted += n;
                }
                Some(scalar) => {
                    self.upserted.push(bson::doc! {
                        "index": offset,
                        "_id": scalar.clone(),
                    });
                    self.n_upserted += n;
                }
                None => {
                    let updated_existing = reply.get_bool("updatedExisting").ok();
                    if n == 1 && updated_existing == Some(false) {
                        self.n_upserted += n;
                    } else {
                        self.n_matched += n;
                    }
                }
            },
        }

        // Legacy replies never carry `nModified`.
        self.omit_n_modified = true;
    }

    /// Emits the accumulated state as a finalized result document. Pure:
    /// calling this twice on the same accumulator yields identical output.
    pub fn finalize(&self) -> FinalizedResult {
        let mut document = Document::new();
        document.insert("nInserted", self.n_inserted as i32);
        document.insert("nMatched", self.n_matched as i32);
        if !self.omit_n_modified {
            document.insert("nModified", self.n_modified as i32);
        }
        document.insert("nRemoved", self.n_removed as i32);
        document.insert("nUpserted", self.n_upserted as i32);

        if !self.upserted.is_empty() {
            document.insert(
                "upserted",
                Bson::Array(self.upserted.iter().cloned().map(Bson::Document).collect()),
            );
        }

        document.insert(
            "writeErrors",
            Bson::Array(
                self.write_errors
                    .iter()
                    .cloned()
                    .map(Bson::Document)
                    .collect(),
            ),
        );

        if let Some(wce) = &self.write_concern_error {
            document.insert("writeConcernError", wce.clone());
        }

        let ok = !self.failed && self.write_concern_error.is_none() && self.write_errors.is_empty();

        let error = self.error.clone().or_else(|| {
            if ok {
                None
            } else {
                self.write_errors.first().map(|first| {
                    let code = first.get_i32("code").unwrap_or(0);
                    let message = first.get_str("errmsg").unwrap_or_default().to_string();
                    let index = first
                        .get_i32("index")
                        .map(i64::from)
                        .or_else(|_| first.get_i64("index"))
                        .unwrap_or(0);
                    Error::new(ErrorKind::ServerWriteError {
                        index,
                        code,
                        message,
                    })
                })
            }
        });

        FinalizedResult {
            document,
            ok,
            error,
        }
    }
}
