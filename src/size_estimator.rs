//! Decides when adding the next operation to a sub-batch would exceed the
//! server's advertised size or count limits.

use bson::Document;

use crate::error::Result;

/// The server guarantees a 16 KiB minus 2 byte overhead allowance on top of
/// `max_bson_object_size` for command bodies, to leave room for the
/// surrounding command document (`insert`/`update`/`delete`, `ordered`,
/// `writeConcern`, and array framing).
pub const MAX_BSON_OVERHEAD: i64 = 16_382;

/// Returns the encoded BSON length of `doc`, used both to size-check
/// individual insert documents and to estimate running batch totals.
pub fn bson_len(doc: &Document) -> Result<usize> {
    Ok(bson::to_vec(doc)
        .map_err(|e| crate::error::Error::invalid_arg(e.to_string()))?
        .len())
}

/// Returns `true` if appending an item of `next_item_bytes` on top of
/// `bytes_so_far` would overflow either the size limit or the batch-count
/// limit.
///
/// `max_batch <= 0` means "no count limit" (only the size limit applies).
pub fn will_overflow(
    bytes_so_far: i64,
    next_item_bytes: i64,
    n_written: i64,
    max_bson: i64,
    max_batch: i64,
) -> bool {
    if bytes_so_far + next_item_bytes > max_bson + MAX_BSON_OVERHEAD {
        return true;
    }
    max_batch > 0 && n_written >= max_batch
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflows_on_size_alone() {
        assert!(will_overflow(100, 50, 0, 100, 0));
        assert!(!will_overflow(0, 16_382 + 100, 0, 100, 0));
    }

    #[test]
    fn overflows_on_count_alone() {
        assert!(will_overflow(0, 0, 5, 16_000_000, 5));
        assert!(!will_overflow(0, 0, 4, 16_000_000, 5));
    }

    #[test]
    fn no_count_limit_when_max_batch_is_zero() {
        assert!(!will_overflow(0, 0, 1_000_000, 16_000_000, 0));
    }

    #[test]
    fn empty_document_length_matches_bson_minimum() {
        assert_eq!(bson_len(&bson::doc! {}).unwrap(), 5);
    }
}
