// Mon Feb 2 2026 - Alex

pub mod error;
pub mod fake;

pub use error::{FfiError, ModuleError};
pub use fake::{FakeModule, RecordingCompiler};

use crate::types::{TypeHandle, Value};
use bitflags::bitflags;
use std::rc::Rc;

bitflags! {
    /// Call-convention options recorded per overload.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CallOptions: u8 {
        /// The native function returns its result through a hidden output
        /// pointer passed as the first argument.
        const RETURNS_VIA_OUT = 0b0000_0001;
    }
}

/// A compiled callable bound to one native entry point.
pub type NativeThunk = dyn Fn(&[Value]) -> Result<Value, FfiError>;

/// Pointer width of the described module. Vtables are arrays of
/// `PTR_BYTES`-wide slots.
pub const PTR_BYTES: u64 = 8;

/// External FFI collaborator. Compiles call thunks into a loaded module
/// and callback entry points out of local callables.
pub trait NativeCallCompiler {
    /// Build a callable bound to the absolute `address` with the given
    /// signature. Called lazily, once per overload.
    fn compile_call(
        &self,
        address: u64,
        return_type: Option<TypeHandle>,
        options: CallOptions,
        param_types: &[TypeHandle],
    ) -> Result<Rc<NativeThunk>, FfiError>;

    /// Inverse direction: wrap a local callable as a native entry pointer
    /// suitable for passing into native code.
    fn compile_callback(
        &self,
        callable: Rc<NativeThunk>,
        return_type: Option<TypeHandle>,
        options: CallOptions,
        param_types: &[TypeHandle],
    ) -> Result<u64, FfiError>;
}

/// Read/write view of the loaded native module the database describes.
/// All database addresses are relative to `base()`.
pub trait ModuleImage {
    fn base(&self) -> u64;

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), ModuleError>;

    fn write(&self, address: u64, data: &[u8]) -> Result<(), ModuleError>;

    fn read_ptr(&self, address: u64) -> Result<u64, ModuleError> {
        let mut buf = [0u8; PTR_BYTES as usize];
        self.read(address, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Turn a module-relative address into an absolute one.
    fn absolute(&self, rva: u64) -> u64 {
        self.base() + rva
    }
}
