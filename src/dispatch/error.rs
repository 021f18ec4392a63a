// Wed Feb 4 2026 - Alex

use crate::ffi::{FfiError, ModuleError};
use crate::reader::ReadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Database error: {0}")]
    Read(#[from] ReadError),
    #[error("FFI error: {0}")]
    Ffi(#[from] FfiError),
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),
    #[error("No overload of '{name}' matches the given arguments")]
    NoMatchingOverload { name: String },
    #[error("Overload of '{name}' has no receiver type, cannot search a vtable")]
    NoReceiverType { name: String },
}
