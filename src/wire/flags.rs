//! Per-message flag bits for the three legacy write opcodes.

/// `OP_INSERT` flags.
pub mod insert {
    /// If set, the server keeps processing remaining documents in the
    /// batch after one fails, instead of stopping at the first error.
    pub const CONTINUE_ON_ERROR: i32 = 1 << 0;
}

/// `OP_UPDATE` flags.
pub mod update {
    /// Insert the update document as a new document if no match is found.
    pub const UPSERT: i32 = 1 << 0;
    /// Update all matching documents instead of just the first.
    pub const MULTI_UPDATE: i32 = 1 << 1;
}

/// `OP_DELETE` flags.
pub mod delete {
    /// Remove only the first matching document instead of all matches.
    pub const SINGLE_REMOVE: i32 = 1 << 0;
}
