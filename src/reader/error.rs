// Tue Feb 3 2026 - Alex

use crate::codec::CodecError;
use crate::graph::NodeKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decoding error: {0}")]
    Codec(#[from] CodecError),
    #[error("Database version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: i32, expected: i32 },
    #[error("Corrupt database: {0}")]
    Corrupt(String),
    #[error("Node {id} is a {found}, expected {expected}")]
    KindMismatch { id: u32, expected: &'static str, found: NodeKind },
    #[error("Type id {0} is not registered")]
    UnknownTypeId(u32),
}
