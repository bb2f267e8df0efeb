//! The 16-byte header prefixed to every legacy wire protocol message.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};

/// The wire protocol op codes this crate emits.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OpCode {
    Update = 2001,
    Insert = 2002,
    Delete = 2006,
}

/// The header for any wire protocol message.
#[derive(Debug)]
pub struct Header {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: OpCode,
}

impl Header {
    pub const LENGTH: usize = 4 * std::mem::size_of::<i32>();

    /// Serializes the header, little-endian, into `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_i32::<LittleEndian>(self.message_length)
            .map_err(|e| Error::invalid_arg(e.to_string()))?;
        out.write_i32::<LittleEndian>(self.request_id)
            .map_err(|e| Error::invalid_arg(e.to_string()))?;
        out.write_i32::<LittleEndian>(self.response_to)
            .map_err(|e| Error::invalid_arg(e.to_string()))?;
        out.write_i32::<LittleEndian>(self.op_code as i32)
            .map_err(|e| Error::invalid_arg(e.to_string()))?;
        Ok(())
    }
}
