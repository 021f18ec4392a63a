// Mon Feb 2 2026 - Alex

use crate::ffi::{CallOptions, FfiError, ModuleError, ModuleImage, NativeCallCompiler, NativeThunk};
use crate::types::{TypeHandle, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// In-memory stand-in for a loaded module. Backs the tests and any host
/// that wants to exercise bindings without a live process.
pub struct FakeModule {
    base: u64,
    data: RefCell<Vec<u8>>,
}

impl FakeModule {
    pub fn new(base: u64, size: usize) -> Self {
        Self { base, data: RefCell::new(vec![0u8; size]) }
    }

    pub fn from_bytes(base: u64, data: Vec<u8>) -> Self {
        Self { base, data: RefCell::new(data) }
    }

    fn offset(&self, address: u64, len: usize) -> Result<usize, ModuleError> {
        let start = address
            .checked_sub(self.base)
            .ok_or(ModuleError::OutOfBounds(address))? as usize;
        if start + len > self.data.borrow().len() {
            return Err(ModuleError::OutOfBounds(address));
        }
        Ok(start)
    }

    /// Store a pointer-width slot, e.g. one vtable entry.
    pub fn store_ptr(&self, address: u64, value: u64) -> Result<(), ModuleError> {
        self.write(address, &value.to_le_bytes())
    }
}

impl ModuleImage for FakeModule {
    fn base(&self) -> u64 {
        self.base
    }

    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), ModuleError> {
        let start = self.offset(address, buf.len())?;
        buf.copy_from_slice(&self.data.borrow()[start..start + buf.len()]);
        Ok(())
    }

    fn write(&self, address: u64, data: &[u8]) -> Result<(), ModuleError> {
        let start = self.offset(address, data.len())?;
        self.data.borrow_mut()[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// One `compile_call` request seen by the recording compiler.
#[derive(Debug, Clone)]
pub struct CompiledCall {
    pub address: u64,
    pub options: CallOptions,
    pub param_count: usize,
}

/// Test double for the FFI collaborator. Each compiled thunk echoes the
/// target address so tests can assert which overload was dispatched.
#[derive(Default)]
pub struct RecordingCompiler {
    compiled: RefCell<Vec<CompiledCall>>,
    callbacks: RefCell<Vec<Rc<NativeThunk>>>,
}

impl RecordingCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compiled_count(&self) -> usize {
        self.compiled.borrow().len()
    }

    pub fn compiled(&self) -> Vec<CompiledCall> {
        self.compiled.borrow().clone()
    }
}

impl NativeCallCompiler for RecordingCompiler {
    fn compile_call(
        &self,
        address: u64,
        _return_type: Option<TypeHandle>,
        options: CallOptions,
        param_types: &[TypeHandle],
    ) -> Result<Rc<NativeThunk>, FfiError> {
        self.compiled.borrow_mut().push(CompiledCall {
            address,
            options,
            param_count: param_types.len(),
        });
        let expected = param_types.len();
        Ok(Rc::new(move |args: &[Value]| {
            if args.len() != expected {
                return Err(FfiError::ArgumentCount { expected, got: args.len() });
            }
            Ok(Value::UInt(address))
        }))
    }

    fn compile_callback(
        &self,
        callable: Rc<NativeThunk>,
        _return_type: Option<TypeHandle>,
        _options: CallOptions,
        _param_types: &[TypeHandle],
    ) -> Result<u64, FfiError> {
        let mut callbacks = self.callbacks.borrow_mut();
        callbacks.push(callable);
        // Fake entry pointers live in a range no real module occupies.
        Ok(0xCB00_0000 + callbacks.len() as u64 - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_module_bounds() {
        let module = FakeModule::new(0x1000, 16);
        let mut buf = [0u8; 8];
        assert!(module.read(0x1000, &mut buf).is_ok());
        assert!(module.read(0x0FFF, &mut buf).is_err());
        assert!(module.read(0x1009, &mut buf).is_err());
    }

    #[test]
    fn test_recording_compiler_echoes_address() {
        let compiler = RecordingCompiler::new();
        let thunk = compiler
            .compile_call(0x4000, None, CallOptions::empty(), &[])
            .unwrap();
        assert_eq!(thunk(&[]).unwrap(), Value::UInt(0x4000));
        assert_eq!(compiler.compiled_count(), 1);
    }
}
