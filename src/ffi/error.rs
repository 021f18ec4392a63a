// Mon Feb 2 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Out of bounds: address 0x{0:x} not inside the module image")]
    OutOfBounds(u64),
    #[error("Value does not fit the target type representation")]
    TypeMismatch,
    #[error("Module image is not writable")]
    NotWritable,
}

#[derive(Error, Debug)]
pub enum FfiError {
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),
    #[error("Cannot compile call at 0x{address:x}: {reason}")]
    CompileFailed { address: u64, reason: String },
    #[error("Wrong argument count: expected {expected}, got {got}")]
    ArgumentCount { expected: usize, got: usize },
    #[error("Argument {index} has incompatible type {got}")]
    ArgumentType { index: usize, got: &'static str },
}
