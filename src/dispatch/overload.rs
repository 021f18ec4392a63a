// Wed Feb 4 2026 - Alex

use crate::dispatch::error::DispatchError;
use crate::ffi::{CallOptions, ModuleImage, NativeCallCompiler, NativeThunk};
use crate::graph::NodeKind;
use crate::reader::entry::{FunctionInfo, OverloadInfo, Payload};
use crate::reader::{Database, ReadError};
use crate::types::{template_key_from_values, TypeHandle, Value};
use log::debug;
use std::cell::RefCell;
use std::rc::Rc;

/// The two external collaborators every call needs: something that turns
/// addresses into callables and the module those addresses live in.
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    pub compiler: &'a dyn NativeCallCompiler,
    pub module: &'a dyn ModuleImage,
}

/// One concrete overload with its resolved signature. The call thunk is
/// compiled on first invocation and kept for the lifetime of the binding.
pub struct OverloadBinding {
    name: String,
    /// Module-relative entry address.
    rva: u64,
    receiver: Option<TypeHandle>,
    return_type: Option<TypeHandle>,
    params: Vec<TypeHandle>,
    options: CallOptions,
    template_key: Option<String>,
    thunk: RefCell<Option<Rc<NativeThunk>>>,
}

impl OverloadBinding {
    fn from_info(db: &Database, name: &str, info: &OverloadInfo) -> Result<Self, ReadError> {
        let mut params = Vec::with_capacity(info.params.len());
        for &param in &info.params {
            params.push(db.type_info(param)?);
        }
        let mut options = CallOptions::empty();
        if info.returns_via_out {
            options |= CallOptions::RETURNS_VIA_OUT;
        }
        Ok(Self {
            name: name.to_string(),
            rva: info.address,
            receiver: receiver_type(db, info.receiver)?,
            return_type: db.opt_type_info(info.return_type)?,
            params,
            options,
            template_key: info.template_key.clone(),
            thunk: RefCell::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rva(&self) -> u64 {
        self.rva
    }

    pub fn params(&self) -> &[TypeHandle] {
        &self.params
    }

    pub fn return_type(&self) -> Option<&TypeHandle> {
        self.return_type.as_ref()
    }

    pub fn receiver(&self) -> Option<&TypeHandle> {
        self.receiver.as_ref()
    }

    pub fn options(&self) -> CallOptions {
        self.options
    }

    pub fn template_key(&self) -> Option<&str> {
        self.template_key.as_deref()
    }

    /// Structural match: does every declared parameter accept the
    /// corresponding value, and does the receiver situation line up?
    pub fn accepts(&self, receiver: Option<&Value>, args: &[Value]) -> bool {
        if self.params.len() != args.len() {
            return false;
        }
        match (&self.receiver, receiver) {
            (Some(ty), Some(value)) => {
                if !ty.accepts_value(value) {
                    return false;
                }
            }
            (None, None) => {}
            _ => return false,
        }
        self.params.iter().zip(args).all(|(ty, value)| ty.accepts_value(value))
    }

    /// Exact signature match by persistent type id, receiver excluded.
    pub fn matches_types(&self, param_ids: &[u32]) -> bool {
        self.params.len() == param_ids.len()
            && self.params.iter().zip(param_ids).all(|(ty, &id)| ty.type_id() == id)
    }

    fn compiled(&self, ctx: &CallContext) -> Result<Rc<NativeThunk>, DispatchError> {
        if let Some(thunk) = self.thunk.borrow().as_ref() {
            return Ok(thunk.clone());
        }
        let mut signature: Vec<TypeHandle> = Vec::with_capacity(self.params.len() + 1);
        if let Some(receiver) = &self.receiver {
            signature.push(receiver.clone());
        }
        signature.extend(self.params.iter().cloned());
        debug!("compiling thunk for '{}' at rva 0x{:x}", self.name, self.rva);
        let thunk = ctx.compiler.compile_call(
            ctx.module.absolute(self.rva),
            self.return_type.clone(),
            self.options,
            &signature,
        )?;
        *self.thunk.borrow_mut() = Some(thunk.clone());
        Ok(thunk)
    }

    /// Invoke the overload, compiling its thunk on first use. The
    /// receiver, when present, is passed as the leading argument.
    pub fn invoke(
        &self,
        ctx: &CallContext,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        let thunk = self.compiled(ctx)?;
        let result = if let Some(receiver) = receiver {
            let mut full = Vec::with_capacity(args.len() + 1);
            full.push(receiver.clone());
            full.extend_from_slice(args);
            thunk(&full)?
        } else {
            thunk(args)?
        };
        Ok(result)
    }

    /// Swap in a replacement callable. Subsequent invocations go through
    /// `thunk` instead of the compiled original; hooks use this.
    pub fn replace(&self, thunk: Rc<NativeThunk>) {
        *self.thunk.borrow_mut() = Some(thunk);
    }

    /// Find this overload's slot in its receiver's virtual table by
    /// pointer comparison, scanning at most `window` slots.
    pub fn vtable_slot(
        &self,
        image: &dyn ModuleImage,
        window: usize,
    ) -> Result<Option<usize>, DispatchError> {
        let receiver = self.receiver.as_ref().ok_or_else(|| DispatchError::NoReceiverType {
            name: self.name.clone(),
        })?;
        let Some(vtable_base) = receiver.vtable_base() else {
            return Err(DispatchError::NoReceiverType { name: self.name.clone() });
        };
        let slot = crate::dispatch::vtable::find_vtable_slot(
            image,
            image.absolute(vtable_base),
            image.absolute(self.rva),
            window,
        )?;
        Ok(slot)
    }
}

/// A callable function: an ordered set of overloads materialized lazily
/// from the database. Clones share the overload cache, so a thunk
/// compiled through one handle is visible through every other.
#[derive(Clone)]
pub struct FunctionBinding {
    db: Rc<Database>,
    name: String,
    info: Rc<FunctionInfo>,
    overloads: Rc<RefCell<Option<Rc<Vec<Rc<OverloadBinding>>>>>>,
}

impl FunctionBinding {
    pub(crate) fn new(db: Rc<Database>, name: String, info: Rc<FunctionInfo>) -> Self {
        Self { db, name, info, overloads: Rc::new(RefCell::new(None)) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All overloads, declaration order. Materialized once per function.
    pub fn overloads(&self) -> Result<Rc<Vec<Rc<OverloadBinding>>>, DispatchError> {
        if let Some(overloads) = self.overloads.borrow().as_ref() {
            return Ok(overloads.clone());
        }
        let ids = self.db.function_overload_ids(&self.info)?;
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids.iter() {
            let id = self.db.resolve_id(id)?;
            let entry = self.db.entry(id)?;
            match &*self.db.payload(&entry)? {
                Payload::FunctionOverload(info) => out.push(Rc::new(OverloadBinding::from_info(
                    &self.db,
                    &self.name,
                    info,
                )?)),
                _ => {
                    return Err(DispatchError::Read(ReadError::KindMismatch {
                        id,
                        expected: "function-overload",
                        found: entry.kind,
                    }))
                }
            }
        }
        let out = Rc::new(out);
        *self.overloads.borrow_mut() = Some(out.clone());
        Ok(out)
    }

    /// First overload that structurally accepts the given values.
    pub fn resolve_by_value(
        &self,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Option<Rc<OverloadBinding>>, DispatchError> {
        let overloads = self.overloads()?;
        Ok(overloads.iter().find(|o| o.accepts(receiver, args)).cloned())
    }

    /// Overload with exactly the given declared receiver and parameter
    /// type ids. Identity comparison, never structural.
    pub fn resolve_by_types(
        &self,
        receiver: Option<u32>,
        param_ids: &[u32],
    ) -> Result<Option<Rc<OverloadBinding>>, DispatchError> {
        let overloads = self.overloads()?;
        Ok(overloads
            .iter()
            .find(|o| {
                let receiver_ok = match (&o.receiver, receiver) {
                    (Some(ty), Some(id)) => ty.type_id() == id,
                    (None, None) => true,
                    _ => false,
                };
                receiver_ok && o.matches_types(param_ids)
            })
            .cloned())
    }

    /// Overloads bound to one template instantiation. When the argument
    /// values encode to a key, only overloads recorded under that exact
    /// key qualify; unencodable arguments degrade to the full overload
    /// set and the caller disambiguates by value.
    pub fn resolve_template(
        &self,
        template_args: &[Value],
    ) -> Result<Vec<Rc<OverloadBinding>>, DispatchError> {
        let overloads = self.overloads()?;
        let out = match template_key_from_values(template_args) {
            Some(key) => overloads
                .iter()
                .filter(|o| o.template_key() == Some(key.as_str()))
                .cloned()
                .collect(),
            None => overloads.iter().cloned().collect(),
        };
        Ok(out)
    }

    /// Resolve by value and invoke in one step.
    pub fn call(
        &self,
        ctx: &CallContext,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<Value, DispatchError> {
        let overload = self
            .resolve_by_value(receiver, args)?
            .ok_or_else(|| DispatchError::NoMatchingOverload { name: self.name.clone() })?;
        overload.invoke(ctx, receiver, args)
    }
}

fn receiver_type(db: &Database, id: u32) -> Result<Option<TypeHandle>, ReadError> {
    if id == 0 {
        return Ok(None);
    }
    let id = db.resolve_id(id)?;
    let entry = db.entry(id)?;
    match entry.kind {
        NodeKind::NativeType => db.type_info(id).map(Some),
        // Class-shaped receivers resolve against the runtime registry by
        // name; an unregistered class just leaves the overload
        // receiver-less for vtable purposes.
        NodeKind::Class | NodeKind::ClassTemplate | NodeKind::TemplateInstantiation => {
            Ok(db.types().by_name(&entry.name))
        }
        _ => Err(ReadError::KindMismatch {
            id,
            expected: "receiver type",
            found: entry.kind,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{FakeModule, FfiError, RecordingCompiler};
    use crate::graph::{GraphBuilder, OverloadData};
    use crate::reader::Binding;
    use crate::types::{TypeRegistry, PRIMITIVE_TYPES};
    use crate::writer::save_to_vec;

    fn type_id(name: &str) -> u32 {
        PRIMITIVE_TYPES.iter().find(|(n, _, _)| *n == name).map(|(_, id, _)| *id).unwrap()
    }

    fn open_with(graph: crate::graph::Graph, types: Rc<TypeRegistry>) -> Rc<Database> {
        let (bytes, _) = save_to_vec(&graph).unwrap();
        Database::from_bytes(bytes, types).unwrap()
    }

    fn resolve_function(db: &Rc<Database>, name: &str) -> FunctionBinding {
        match db.root().unwrap().resolve(name).unwrap() {
            Some(Binding::Function(f)) => f,
            other => panic!("'{}' resolved to {:?}", name, other.map(|b| b.kind_name())),
        }
    }

    fn overloaded_db() -> Rc<Database> {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let int32 = builder.native_type("int32", type_id("int32"));
        let cstring = builder.native_type("cstring", type_id("cstring"));
        let func = builder.function(root, "SetValue").unwrap();
        builder
            .add_overload(
                func,
                OverloadData { address: 0x100, params: vec![int32], ..Default::default() },
            )
            .unwrap();
        builder
            .add_overload(
                func,
                OverloadData { address: 0x200, params: vec![cstring], ..Default::default() },
            )
            .unwrap();
        open_with(builder.finish(), Rc::new(TypeRegistry::new()))
    }

    #[test]
    fn test_selects_overload_by_argument_value() {
        let db = overloaded_db();
        let func = resolve_function(&db, "SetValue");
        let module = FakeModule::new(0x10000, 0x100);
        let compiler = RecordingCompiler::new();
        let ctx = CallContext { compiler: &compiler, module: &module };

        // The recording compiler's thunks echo their bound absolute
        // address, which tells us which overload was picked.
        let picked = func.call(&ctx, None, &[Value::Int(7)]).unwrap();
        assert_eq!(picked, Value::UInt(0x10100));
        let picked = func.call(&ctx, None, &[Value::Str("high".into())]).unwrap();
        assert_eq!(picked, Value::UInt(0x10200));
    }

    #[test]
    fn test_resolve_by_declared_types() {
        let db = overloaded_db();
        let func = resolve_function(&db, "SetValue");
        let overload = func.resolve_by_types(None, &[type_id("cstring")]).unwrap().unwrap();
        assert_eq!(overload.rva(), 0x200);
        assert!(func.resolve_by_types(None, &[type_id("float")]).unwrap().is_none());
    }

    #[test]
    fn test_no_matching_overload_is_an_error() {
        let db = overloaded_db();
        let func = resolve_function(&db, "SetValue");
        let module = FakeModule::new(0x10000, 0x100);
        let compiler = RecordingCompiler::new();
        let ctx = CallContext { compiler: &compiler, module: &module };
        let err = func.call(&ctx, None, &[Value::Int(1), Value::Int(2)]).unwrap_err();
        match err {
            DispatchError::NoMatchingOverload { name } => assert_eq!(name, "SetValue"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_thunk_compiled_once_and_shared_across_clones() {
        let db = overloaded_db();
        let func = resolve_function(&db, "SetValue");
        let module = FakeModule::new(0x10000, 0x100);
        let compiler = RecordingCompiler::new();
        let ctx = CallContext { compiler: &compiler, module: &module };

        func.call(&ctx, None, &[Value::Int(1)]).unwrap();
        func.call(&ctx, None, &[Value::Int(2)]).unwrap();
        let clone = func.clone();
        clone.call(&ctx, None, &[Value::Int(3)]).unwrap();
        assert_eq!(compiler.compiled_count(), 1);
    }

    #[test]
    fn test_replaced_thunk_intercepts_calls() {
        let db = overloaded_db();
        let func = resolve_function(&db, "SetValue");
        let module = FakeModule::new(0x10000, 0x100);
        let compiler = RecordingCompiler::new();
        let ctx = CallContext { compiler: &compiler, module: &module };

        let overload = func.resolve_by_value(None, &[Value::Int(0)]).unwrap().unwrap();
        overload.replace(Rc::new(|args: &[Value]| {
            let bumped = args[0].as_int().ok_or(FfiError::ArgumentType { index: 0, got: "?" })?;
            Ok(Value::Int(bumped + 100))
        }));
        assert_eq!(func.call(&ctx, None, &[Value::Int(5)]).unwrap(), Value::Int(105));
        // The replacement preempted compilation entirely.
        assert_eq!(compiler.compiled_count(), 0);
    }

    #[test]
    fn test_template_key_narrows_overload_set() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let int32 = builder.native_type("int32", type_id("int32"));
        let func = builder.function(root, "Cast").unwrap();
        for (address, key) in [(0x300u64, Some("t7")), (0x400, Some("t9")), (0x500, None)] {
            builder
                .add_overload(
                    func,
                    OverloadData {
                        address,
                        params: vec![int32],
                        template_key: key.map(str::to_string),
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        let db = open_with(builder.finish(), Rc::new(TypeRegistry::new()));
        let func = resolve_function(&db, "Cast");

        let narrowed = func.resolve_template(&[Value::Type(7)]).unwrap();
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].rva(), 0x300);

        // Unencodable template arguments degrade to a linear scan over
        // every overload, keyed or not.
        let fallback = func.resolve_template(&[Value::Float(1.0)]).unwrap();
        assert_eq!(fallback.len(), 3);
        assert!(fallback.iter().any(|o| o.rva() == 0x500));
    }

    #[test]
    fn test_vtable_slot_via_receiver_type() {
        let types = Rc::new(TypeRegistry::new());
        let player_id = types.register_class("Player", None, Some(0x40));

        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let player = builder.class(root, "Player", None).unwrap();
        let method = builder.method(player, "GetHealth").unwrap();
        builder
            .add_overload(
                method,
                OverloadData { address: 0x88, receiver: Some(player), ..Default::default() },
            )
            .unwrap();
        let db = open_with(builder.finish(), types.clone());

        let module = FakeModule::new(0x1000, 0x200);
        module.store_ptr(0x1040, 0x5555).unwrap();
        module.store_ptr(0x1048, 0x1088).unwrap();

        let class = match db.root().unwrap().resolve("Player").unwrap() {
            Some(Binding::Class(c)) => c,
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        };
        let method = class.property("GetHealth").unwrap().unwrap();
        let overload = method.overloads().unwrap()[0].clone();
        assert_eq!(overload.receiver().unwrap().type_id(), player_id);
        assert_eq!(overload.vtable_slot(&module, 8).unwrap(), Some(1));
    }
}
