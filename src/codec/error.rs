// Mon Feb 2 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Unexpected end of stream at offset {0}")]
    UnexpectedEof(u64),
    #[error("Varint longer than 10 bytes at offset {0}")]
    VarintOverflow(u64),
    #[error("Invalid UTF-8 in string at offset {0}")]
    InvalidUtf8(u64),
    #[error("Stream is read-only")]
    ReadOnly,
    #[error("Seek past end of stream: offset {0}, length {1}")]
    SeekOutOfRange(u64, u64),
}
