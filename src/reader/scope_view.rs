// Wed Feb 4 2026 - Alex

use crate::dispatch::FunctionBinding;
use crate::ffi::{ModuleError, ModuleImage};
use crate::graph::NodeKind;
use crate::reader::database::Database;
use crate::reader::entry::{ClassInfo, Entry, Payload, ScopeTable};
use crate::reader::error::ReadError;
use crate::types::{template_key, TemplateArg, TypeHandle, Value};
use ahash::AHashMap;
use std::cell::RefCell;
use std::rc::Rc;

/// A namespace (or static-member scope) whose members materialize on
/// first resolution. Resolutions are memoized per scope handle, so the
/// second ask for the same name never touches the file.
#[derive(Clone)]
pub struct LazyScope {
    db: Rc<Database>,
    table: ScopeTable,
    resolved: Rc<RefCell<AHashMap<String, Binding>>>,
}

impl LazyScope {
    pub(crate) fn new(db: Rc<Database>, table: ScopeTable) -> Self {
        Self { db, table, resolved: Rc::new(RefCell::new(AHashMap::new())) }
    }

    /// Resolve one member by name. `Ok(None)` means the name is genuinely
    /// absent from this scope; errors are reserved for real failures.
    pub fn resolve(&self, name: &str) -> Result<Option<Binding>, ReadError> {
        if let Some(binding) = self.resolved.borrow().get(name) {
            return Ok(Some(binding.clone()));
        }
        let Some(id) = self.db.lookup(&self.table, name)? else {
            return Ok(None);
        };
        let binding = Binding::from_id(&self.db, id)?;
        self.resolved.borrow_mut().insert(name.to_string(), binding.clone());
        Ok(Some(binding))
    }

    /// Resolve a dot-free path of nested names, each step a scope.
    pub fn resolve_path(&self, path: &[&str]) -> Result<Option<Binding>, ReadError> {
        let (first, rest) = match path.split_first() {
            Some(split) => split,
            None => return Ok(None),
        };
        let mut binding = match self.resolve(first)? {
            Some(b) => b,
            None => return Ok(None),
        };
        for segment in rest {
            binding = match binding {
                Binding::Namespace(scope) => match scope.resolve(segment)? {
                    Some(b) => b,
                    None => return Ok(None),
                },
                Binding::Class(class) => match class.member(segment)? {
                    Some(b) => b,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            };
        }
        Ok(Some(binding))
    }

    /// Every member name in this scope, slot order. Forces a name read
    /// per member but no payloads.
    pub fn names(&self) -> Result<Vec<String>, ReadError> {
        let mut out = Vec::new();
        for id in self.db.scope_ids(&self.table)? {
            out.push(self.db.entry(id)?.name.clone());
        }
        Ok(out)
    }

    pub fn len(&self) -> u32 {
        self.table.len
    }

    pub fn is_empty(&self) -> bool {
        self.table.len == 0
    }

    pub fn database(&self) -> &Rc<Database> {
        &self.db
    }
}

/// What a name resolved to. Clones are cheap handle copies sharing the
/// underlying caches.
#[derive(Clone)]
pub enum Binding {
    Namespace(LazyScope),
    Class(ClassHandle),
    Function(FunctionBinding),
    Variable(VariableBinding),
    AddressVariable { name: String, address: u64 },
    Object(ObjectBinding),
    Type(TypeHandle),
    Getter(GetterBinding),
    AddressGetter(AddressGetterBinding),
    /// Kinds with no dedicated surface (type lists, references kept as
    /// data). The raw entry is still inspectable.
    Node(Rc<Entry>),
}

impl Binding {
    pub(crate) fn from_id(db: &Rc<Database>, id: u32) -> Result<Binding, ReadError> {
        Self::from_id_bounded(db, id, 0)
    }

    fn from_id_bounded(db: &Rc<Database>, id: u32, depth: u32) -> Result<Binding, ReadError> {
        if depth > 64 {
            return Err(ReadError::Corrupt("reference chain exceeds 64 links".to_string()));
        }
        let id = db.resolve_id(id)?;
        let entry = db.entry(id)?;
        let payload = db.payload(&entry)?;
        Ok(match &*payload {
            Payload::Namespace { scope } => {
                Binding::Namespace(LazyScope::new(db.clone(), *scope))
            }
            Payload::Class(info) => {
                Binding::Class(ClassHandle::plain(db.clone(), entry, info.clone()))
            }
            Payload::ClassTemplate { class, specializations, .. } => Binding::Class(
                ClassHandle::template(db.clone(), entry, class.clone(), specializations.clone()),
            ),
            Payload::TemplateInstantiation { class, .. } => {
                Binding::Class(ClassHandle::plain(db.clone(), entry, class.clone()))
            }
            Payload::Function(info) => {
                Binding::Function(FunctionBinding::new(db.clone(), entry.name.clone(), info.clone()))
            }
            Payload::Variable { type_ref, address } => Binding::Variable(VariableBinding {
                name: entry.name.clone(),
                type_info: db.type_info(*type_ref)?,
                address: *address,
            }),
            Payload::AddressVariable { address } => {
                Binding::AddressVariable { name: entry.name.clone(), address: *address }
            }
            Payload::StaticObject { type_ref, address } => Binding::Object(ObjectBinding {
                name: entry.name.clone(),
                type_info: db.type_info(*type_ref)?,
                address: *address,
            }),
            Payload::NativeType { .. } => Binding::Type(db.type_info(id)?),
            Payload::VariableGetter { entries } => Binding::Getter(GetterBinding {
                db: db.clone(),
                name: entry.name.clone(),
                entries: entries.clone(),
                resolved: Rc::new(RefCell::new(AHashMap::new())),
            }),
            Payload::AddressGetter { entries } => {
                Binding::AddressGetter(AddressGetterBinding {
                    name: entry.name.clone(),
                    entries: entries.clone(),
                })
            }
            Payload::Reference { target } => {
                return Self::from_id_bounded(db, *target, depth + 1)
            }
            _ => Binding::Node(entry),
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Binding::Namespace(_) => "namespace",
            Binding::Class(_) => "class",
            Binding::Function(_) => "function",
            Binding::Variable(_) => "variable",
            Binding::AddressVariable { .. } => "address-variable",
            Binding::Object(_) => "static-object",
            Binding::Type(_) => "type",
            Binding::Getter(_) => "variable-getter",
            Binding::AddressGetter(_) => "address-getter",
            Binding::Node(_) => "node",
        }
    }
}

/// A class, class template, or recorded template instantiation. Member
/// resolution searches static members, then instance functions, then the
/// parent chain.
#[derive(Clone)]
pub struct ClassHandle {
    db: Rc<Database>,
    entry: Rc<Entry>,
    info: Rc<ClassInfo>,
    /// Only populated for templates: specializations recorded at build
    /// time, by argument key.
    specs: Rc<Vec<(String, u32)>>,
    /// Instantiations produced at runtime by `make`, shared across
    /// clones of this handle.
    runtime: Rc<RefCell<AHashMap<String, ClassHandle>>>,
    /// Set on runtime-only instantiations, which have no node of their
    /// own to take a name from.
    runtime_name: Option<Rc<String>>,
}

impl ClassHandle {
    fn plain(db: Rc<Database>, entry: Rc<Entry>, info: Rc<ClassInfo>) -> Self {
        Self {
            db,
            entry,
            info,
            specs: Rc::new(Vec::new()),
            runtime: Rc::new(RefCell::new(AHashMap::new())),
            runtime_name: None,
        }
    }

    fn template(
        db: Rc<Database>,
        entry: Rc<Entry>,
        info: Rc<ClassInfo>,
        specs: Vec<(String, u32)>,
    ) -> Self {
        Self {
            db,
            entry,
            info,
            specs: Rc::new(specs),
            runtime: Rc::new(RefCell::new(AHashMap::new())),
            runtime_name: None,
        }
    }

    pub fn name(&self) -> &str {
        match &self.runtime_name {
            Some(name) => name,
            None => &self.entry.name,
        }
    }

    /// Id of the backing node. Runtime-only instantiations report their
    /// template's id.
    pub fn node_id(&self) -> u32 {
        self.entry.id
    }

    pub fn is_template(&self) -> bool {
        self.entry.kind == NodeKind::ClassTemplate && self.runtime_name.is_none()
    }

    pub fn parent(&self) -> Result<Option<ClassHandle>, ReadError> {
        if self.info.parent == 0 {
            return Ok(None);
        }
        match Binding::from_id(&self.db, self.info.parent)? {
            Binding::Class(parent) => Ok(Some(parent)),
            _ => Err(ReadError::KindMismatch {
                id: self.info.parent,
                expected: "class",
                found: self.db.entry(self.db.resolve_id(self.info.parent)?)?.kind,
            }),
        }
    }

    /// The static-member scope, lazily probed like any namespace.
    pub fn statics(&self) -> LazyScope {
        LazyScope::new(self.db.clone(), self.info.statics)
    }

    pub fn constructor(&self) -> Result<Option<FunctionBinding>, ReadError> {
        self.function_at(self.info.constructor)
    }

    /// An instance function by name, searching this class then its
    /// parent chain.
    pub fn property(&self, name: &str) -> Result<Option<FunctionBinding>, ReadError> {
        let mut current = self.clone();
        for _ in 0..64 {
            for &id in &current.info.properties {
                let entry = current.db.entry(id)?;
                if entry.name == name {
                    return current.function_at(id);
                }
            }
            current = match current.parent()? {
                Some(parent) => parent,
                None => return Ok(None),
            };
        }
        Err(ReadError::Corrupt("class parent chain exceeds 64 links".to_string()))
    }

    /// Full member resolution: statics first, then instance functions,
    /// then the parent chain for both.
    pub fn member(&self, name: &str) -> Result<Option<Binding>, ReadError> {
        let mut current = self.clone();
        for _ in 0..64 {
            if let Some(binding) = current.statics().resolve(name)? {
                return Ok(Some(binding));
            }
            for &id in &current.info.properties {
                if current.db.entry(id)?.name == name {
                    return Ok(current.function_at(id)?.map(Binding::Function));
                }
            }
            current = match current.parent()? {
                Some(parent) => parent,
                None => return Ok(None),
            };
        }
        Err(ReadError::Corrupt("class parent chain exceeds 64 links".to_string()))
    }

    pub fn property_names(&self) -> Result<Vec<String>, ReadError> {
        let mut out = Vec::with_capacity(self.info.properties.len());
        for &id in &self.info.properties {
            out.push(self.db.entry(id)?.name.clone());
        }
        Ok(out)
    }

    /// Instantiate a template. A recorded specialization resolves to its
    /// own node; an unrecorded argument list yields a runtime-only
    /// handle that shares the template's members. Either way the result
    /// is cached, so repeated calls with equal arguments return the same
    /// instantiation.
    pub fn make(&self, args: &[TemplateArg]) -> Result<ClassHandle, ReadError> {
        if !self.is_template() {
            return Err(ReadError::KindMismatch {
                id: self.entry.id,
                expected: "class-template",
                found: self.entry.kind,
            });
        }
        let key = template_key(args);
        if let Some(handle) = self.runtime.borrow().get(&key) {
            return Ok(handle.clone());
        }
        let handle = match self.specs.iter().find(|(k, _)| *k == key) {
            Some(&(_, id)) => match Binding::from_id(&self.db, id)? {
                Binding::Class(class) => class,
                _ => {
                    return Err(ReadError::KindMismatch {
                        id,
                        expected: "template-instantiation",
                        found: self.db.entry(self.db.resolve_id(id)?)?.kind,
                    })
                }
            },
            None => {
                // Nothing recorded for these arguments: a view of the
                // template itself under the instantiated name.
                let mut handle = ClassHandle::plain(
                    self.db.clone(),
                    self.entry.clone(),
                    self.info.clone(),
                );
                handle.runtime_name =
                    Some(Rc::new(format!("{}<{}>", self.entry.name, key)));
                handle
            }
        };
        self.runtime.borrow_mut().insert(key, handle.clone());
        Ok(handle)
    }

    fn function_at(&self, id: u32) -> Result<Option<FunctionBinding>, ReadError> {
        if id == 0 {
            return Ok(None);
        }
        let id = self.db.resolve_id(id)?;
        let entry = self.db.entry(id)?;
        match &*self.db.payload(&entry)? {
            Payload::Function(info) => Ok(Some(FunctionBinding::new(
                self.db.clone(),
                entry.name.clone(),
                info.clone(),
            ))),
            _ => Err(ReadError::KindMismatch { id, expected: "function", found: entry.kind }),
        }
    }
}

/// A typed variable at a fixed module-relative address.
#[derive(Clone)]
pub struct VariableBinding {
    pub name: String,
    pub type_info: TypeHandle,
    /// Module-relative.
    pub address: u64,
}

impl VariableBinding {
    pub fn get(&self, image: &dyn ModuleImage) -> Result<Value, ModuleError> {
        self.type_info.read(image, image.absolute(self.address), 0)
    }

    pub fn set(&self, image: &dyn ModuleImage, value: &Value) -> Result<(), ModuleError> {
        if !self.type_info.accepts_value(value) {
            return Err(ModuleError::TypeMismatch);
        }
        self.type_info.write(image, image.absolute(self.address), 0, value)
    }
}

/// A typed singleton object at a fixed module-relative address.
#[derive(Clone)]
pub struct ObjectBinding {
    pub name: String,
    pub type_info: TypeHandle,
    pub address: u64,
}

impl ObjectBinding {
    pub fn absolute(&self, image: &dyn ModuleImage) -> u64 {
        image.absolute(self.address)
    }

    pub fn value(&self, image: &dyn ModuleImage) -> Value {
        Value::Object { type_id: self.type_info.type_id(), address: self.absolute(image) }
    }
}

/// Key-indexed typed variables, e.g. one binding per build flavor.
#[derive(Clone)]
pub struct GetterBinding {
    db: Rc<Database>,
    pub name: String,
    entries: Vec<u32>,
    resolved: Rc<RefCell<AHashMap<String, VariableBinding>>>,
}

impl GetterBinding {
    pub fn get(&self, key: &str) -> Result<Option<VariableBinding>, ReadError> {
        if let Some(binding) = self.resolved.borrow().get(key) {
            return Ok(Some(binding.clone()));
        }
        for &id in &self.entries {
            let entry = self.db.entry(id)?;
            let payload = self.db.payload(&entry)?;
            let Payload::VariableOverload { key: stored, type_ref, address } = &*payload else {
                return Err(ReadError::KindMismatch {
                    id,
                    expected: "variable-overload",
                    found: entry.kind,
                });
            };
            if stored == key {
                let binding = VariableBinding {
                    name: format!("{}[{}]", self.name, key),
                    type_info: self.db.type_info(*type_ref)?,
                    address: *address,
                };
                self.resolved.borrow_mut().insert(key.to_string(), binding.clone());
                return Ok(Some(binding));
            }
        }
        Ok(None)
    }

    pub fn keys(&self) -> Result<Vec<String>, ReadError> {
        let mut out = Vec::with_capacity(self.entries.len());
        for &id in &self.entries {
            let entry = self.db.entry(id)?;
            match &*self.db.payload(&entry)? {
                Payload::VariableOverload { key, .. } => out.push(key.clone()),
                _ => {
                    return Err(ReadError::KindMismatch {
                        id,
                        expected: "variable-overload",
                        found: entry.kind,
                    })
                }
            }
        }
        Ok(out)
    }
}

/// Key-indexed raw addresses; the untyped sibling of [`GetterBinding`].
#[derive(Clone)]
pub struct AddressGetterBinding {
    pub name: String,
    entries: Vec<(String, u64)>,
}

impl AddressGetterBinding {
    pub fn address(&self, key: &str) -> Option<u64> {
        self.entries.iter().find(|(k, _)| k == key).map(|&(_, a)| a)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|(k, _)| k.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::FakeModule;
    use crate::graph::GraphBuilder;
    use crate::types::TypeRegistry;
    use crate::writer::save_to_vec;

    fn reopen(builder: GraphBuilder) -> Rc<Database> {
        let (bytes, _) = save_to_vec(&builder.finish()).unwrap();
        Database::from_bytes(bytes, Rc::new(TypeRegistry::new())).unwrap()
    }

    fn class_of(scope: &LazyScope, name: &str) -> ClassHandle {
        match scope.resolve(name).unwrap() {
            Some(Binding::Class(c)) => c,
            other => panic!("'{}' became {:?}", name, other.map(|b| b.kind_name())),
        }
    }

    #[test]
    fn test_variable_binding_reads_and_writes_module() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let int32 = builder.native_type("int32", 7);
        builder.variable(root, "MaxPlayers", int32, 0x40).unwrap();
        let db = reopen(builder);

        let var = match db.root().unwrap().resolve("MaxPlayers").unwrap() {
            Some(Binding::Variable(v)) => v,
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        };
        let module = FakeModule::new(0x1000, 0x100);
        var.set(&module, &Value::Int(28)).unwrap();
        assert_eq!(var.get(&module).unwrap(), Value::Int(28));
        // A string cannot land in an int32 slot.
        assert!(var.set(&module, &Value::Str("x".into())).is_err());
    }

    #[test]
    fn test_member_resolution_walks_parent_chain() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let int32 = builder.native_type("int32", 7);
        let actor = builder.class(root, "Actor", None).unwrap();
        builder.variable(actor, "RefCount", int32, 0x8).unwrap();
        builder.method(actor, "Destroy").unwrap();
        let player = builder.class(root, "Player", Some(actor)).unwrap();
        builder.method(player, "GetHealth").unwrap();
        let db = reopen(builder);

        let player = class_of(&db.root().unwrap(), "Player");
        // Own member.
        assert!(player.property("GetHealth").unwrap().is_some());
        // Inherited instance function and inherited static.
        assert!(player.property("Destroy").unwrap().is_some());
        match player.member("RefCount").unwrap() {
            Some(Binding::Variable(var)) => assert_eq!(var.address, 0x8),
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        }
        assert!(player.member("Missing").unwrap().is_none());
    }

    #[test]
    fn test_getter_binding_selects_by_key() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let int32 = builder.native_type("int32", 7);
        let double = builder.native_type("double", 12);
        builder
            .variable_getter(
                root,
                "FrameTime",
                &[
                    ("release".to_string(), int32, 0x100),
                    ("debug".to_string(), double, 0x200),
                ],
            )
            .unwrap();
        builder
            .address_getter(root, "Heartbeat", vec![("release".to_string(), 0x300)])
            .unwrap();
        let db = reopen(builder);
        let root = db.root().unwrap();

        let getter = match root.resolve("FrameTime").unwrap() {
            Some(Binding::Getter(g)) => g,
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        };
        let debug = getter.get("debug").unwrap().unwrap();
        assert_eq!(debug.address, 0x200);
        assert_eq!(debug.type_info.name(), "double");
        assert!(getter.get("beta").unwrap().is_none());
        assert_eq!(getter.keys().unwrap(), vec!["release", "debug"]);

        let addresses = match root.resolve("Heartbeat").unwrap() {
            Some(Binding::AddressGetter(g)) => g,
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        };
        assert_eq!(addresses.address("release"), Some(0x300));
        assert_eq!(addresses.address("debug"), None);
    }

    #[test]
    fn test_static_object_binding_carries_type_and_address() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let pointer = builder.native_type("pointer", 13);
        builder.static_object(root, "DataModel", pointer, 0x5000).unwrap();
        let db = reopen(builder);

        let object = match db.root().unwrap().resolve("DataModel").unwrap() {
            Some(Binding::Object(o)) => o,
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        };
        let module = FakeModule::new(0x10000, 0x10);
        assert_eq!(object.absolute(&module), 0x15000);
        assert_eq!(
            object.value(&module),
            Value::Object { type_id: 13, address: 0x15000 }
        );
    }

    #[test]
    fn test_scope_resolution_is_memoized() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        builder.namespace(root, "Engine").unwrap();
        let db = reopen(builder);
        let root = db.root().unwrap();
        let first = match root.resolve("Engine").unwrap() {
            Some(Binding::Namespace(s)) => s,
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        };
        let second = match root.resolve("Engine").unwrap() {
            Some(Binding::Namespace(s)) => s,
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        };
        // Cached resolution hands back the same scope (shared member cache).
        assert!(Rc::ptr_eq(&first.resolved, &second.resolved));
    }
}
