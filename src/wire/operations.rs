//! Builds the three legacy write frames bit-exact per the wire protocol:
//!
//! - `OP_INSERT`: header, int32 flags, cstring namespace, one or more BSON
//!   documents concatenated.
//! - `OP_UPDATE`: header, int32 zero, cstring namespace, int32 flags, BSON
//!   selector, BSON update.
//! - `OP_DELETE`: header, int32 zero, cstring namespace, int32 flags, BSON
//!   selector.

use bson::Document;
use byteorder::{LittleEndian, WriteBytesExt};

use super::header::{Header, OpCode};
use super::MAX_NAMESPACE_LEN;
use crate::error::{Error, Result};

fn check_namespace(namespace: &str) -> Result<()> {
    if namespace.len() > MAX_NAMESPACE_LEN {
        return Err(Error::invalid_arg(format!(
            "namespace '{namespace}' exceeds the maximum length of {MAX_NAMESPACE_LEN} bytes"
        )));
    }
    Ok(())
}

fn write_cstring(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

fn write_document(out: &mut Vec<u8>, doc: &Document) -> Result<()> {
    let bytes = bson::to_vec(doc).map_err(|e| Error::invalid_arg(e.to_string()))?;
    out.extend_from_slice(&bytes);
    Ok(())
}

fn finish_frame(request_id: i32, op_code: OpCode, body: Vec<u8>) -> Result<Vec<u8>> {
    let message_length = (Header::LENGTH + body.len()) as i32;
    let header = Header {
        message_length,
        request_id,
        response_to: 0,
        op_code,
    };
    let mut frame = Vec::with_capacity(Header::LENGTH + body.len());
    header.write_to(&mut frame)?;
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Builds a single `OP_INSERT` frame carrying every document in `docs`.
/// Callers are responsible for having already split `docs` to respect
/// `max_message_size_bytes` and `max_write_batch_size`/`allow_bulk`.
pub fn build_op_insert(
    request_id: i32,
    flags: i32,
    namespace: &str,
    docs: &[Document],
) -> Result<Vec<u8>> {
    check_namespace(namespace)?;
    let mut body = Vec::new();
    body.write_i32::<LittleEndian>(flags)
        .map_err(|e| Error::invalid_arg(e.to_string()))?;
    write_cstring(&mut body, namespace);
    for doc in docs {
        write_document(&mut body, doc)?;
    }
    finish_frame(request_id, OpCode::Insert, body)
}

/// Builds a single `OP_UPDATE` frame.
pub fn build_op_update(
    request_id: i32,
    namespace: &str,
    flags: i32,
    selector: &Document,
    update: &Document,
) -> Result<Vec<u8>> {
    check_namespace(namespace)?;
    let mut body = Vec::new();
    body.write_i32::<LittleEndian>(0)
        .map_err(|e| Error::invalid_arg(e.to_string()))?;
    write_cstring(&mut body, namespace);
    body.write_i32::<LittleEndian>(flags)
        .map_err(|e| Error::invalid_arg(e.to_string()))?;
    write_document(&mut body, selector)?;
    write_document(&mut body, update)?;
    finish_frame(request_id, OpCode::Update, body)
}

/// Builds a single `OP_DELETE` frame.
pub fn build_op_delete(
    request_id: i32,
    namespace: &str,
    flags: i32,
    selector: &Document,
) -> Result<Vec<u8>> {
    check_namespace(namespace)?;
    let mut body = Vec::new();
    body.write_i32::<LittleEndian>(0)
        .map_err(|e| Error::invalid_arg(e.to_string()))?;
    write_cstring(&mut body, namespace);
    body.write_i32::<LittleEndian>(flags)
        .map_err(|e| Error::invalid_arg(e.to_string()))?;
    write_document(&mut body, selector)?;
    finish_frame(request_id, OpCode::Delete, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_insert_frame_has_correct_header_length() {
        let docs = vec![bson::doc! { "a": 1 }, bson::doc! { "a": 2 }];
        let frame = build_op_insert(7, 0, "db.coll", &docs).unwrap();
        let message_length = i32::from_le_bytes(frame[0..4].try_into().unwrap());
        assert_eq!(message_length as usize, frame.len());
        let request_id = i32::from_le_bytes(frame[4..8].try_into().unwrap());
        assert_eq!(request_id, 7);
        let op_code = i32::from_le_bytes(frame[12..16].try_into().unwrap());
        assert_eq!(op_code, OpCode::Insert as i32);
    }

    #[test]
    fn rejects_oversize_namespace() {
        let long_name = "x".repeat(MAX_NAMESPACE_LEN + 1);
        let result = build_op_delete(1, &long_name, 0, &bson::doc! {});
        assert!(result.is_err());
    }

    #[test]
    fn op_update_frame_contains_namespace_cstring() {
        let frame =
            build_op_update(1, "db.coll", flags_for_test(), &bson::doc! {}, &bson::doc! {})
                .unwrap();
        // header(16) + zero(4) + "db.coll\0"
        let ns_start = 20;
        let ns_end = ns_start + "db.coll".len();
        assert_eq!(&frame[ns_start..ns_end], b"db.coll");
        assert_eq!(frame[ns_end], 0);
    }

    fn flags_for_test() -> i32 {
        super::super::flags::update::UPSERT | super::super::flags::update::MULTI_UPDATE
    }
}
