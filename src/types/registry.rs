// Mon Feb 2 2026 - Alex

use crate::ffi::{ModuleError, ModuleImage};
use crate::types::{TypeHandle, TypeInfo, Value};
use ahash::AHashMap;
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::rc::Rc;

/// The fixed primitive type list. Order matters: the writer enumerates
/// these nodes first, so the reader can register them by id without a file
/// read. The second element is the persistent type id.
pub static PRIMITIVE_TYPES: &[(&str, u32, PrimitiveKind)] = &[
    ("void", 1, PrimitiveKind::Void),
    ("bool", 2, PrimitiveKind::Bool),
    ("int8", 3, PrimitiveKind::Int { bytes: 1, signed: true }),
    ("uint8", 4, PrimitiveKind::Int { bytes: 1, signed: false }),
    ("int16", 5, PrimitiveKind::Int { bytes: 2, signed: true }),
    ("uint16", 6, PrimitiveKind::Int { bytes: 2, signed: false }),
    ("int32", 7, PrimitiveKind::Int { bytes: 4, signed: true }),
    ("uint32", 8, PrimitiveKind::Int { bytes: 4, signed: false }),
    ("int64", 9, PrimitiveKind::Int { bytes: 8, signed: true }),
    ("uint64", 10, PrimitiveKind::Int { bytes: 8, signed: false }),
    ("float", 11, PrimitiveKind::Float { bytes: 4 }),
    ("double", 12, PrimitiveKind::Float { bytes: 8 }),
    ("pointer", 13, PrimitiveKind::Pointer),
    ("cstring", 14, PrimitiveKind::CString),
];

/// First id available to caller-registered types. Ids below this are
/// reserved for the primitive table.
pub const FIRST_USER_TYPE_ID: u32 = 64;

static PRIMITIVE_IDS: Lazy<AHashMap<&'static str, u32>> =
    Lazy::new(|| PRIMITIVE_TYPES.iter().map(|&(name, id, _)| (name, id)).collect());

/// Persistent id of a built-in primitive, by name.
pub fn primitive_id(name: &str) -> Option<u32> {
    PRIMITIVE_IDS.get(name).copied()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Void,
    Bool,
    Int { bytes: u8, signed: bool },
    Float { bytes: u8 },
    Pointer,
    CString,
}

pub struct PrimitiveType {
    name: &'static str,
    type_id: u32,
    kind: PrimitiveKind,
}

impl PrimitiveType {
    pub fn new(name: &'static str, type_id: u32, kind: PrimitiveKind) -> Self {
        Self { name, type_id, kind }
    }

    pub fn kind(&self) -> PrimitiveKind {
        self.kind
    }
}

impl TypeInfo for PrimitiveType {
    fn name(&self) -> &str {
        self.name
    }

    fn type_id(&self) -> u32 {
        self.type_id
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match self.kind {
            PrimitiveKind::Void => value.is_null(),
            PrimitiveKind::Bool => matches!(value, Value::Bool(_)),
            PrimitiveKind::Int { .. } => value.as_int().is_some() && !matches!(value, Value::Bool(_)),
            PrimitiveKind::Float { .. } => value.as_float().is_some(),
            PrimitiveKind::Pointer => matches!(value, Value::Ptr(_) | Value::Object { .. } | Value::Null),
            PrimitiveKind::CString => matches!(value, Value::Str(_) | Value::Ptr(_)),
        }
    }

    fn read(&self, image: &dyn ModuleImage, address: u64, offset: u64) -> Result<Value, ModuleError> {
        let at = address + offset;
        match self.kind {
            PrimitiveKind::Void => Ok(Value::Null),
            PrimitiveKind::Bool => {
                let mut b = [0u8; 1];
                image.read(at, &mut b)?;
                Ok(Value::Bool(b[0] != 0))
            }
            PrimitiveKind::Int { bytes, signed } => {
                let mut buf = [0u8; 8];
                image.read(at, &mut buf[..bytes as usize])?;
                let raw = u64::from_le_bytes(buf);
                if signed {
                    let shift = 64 - bytes as u32 * 8;
                    Ok(Value::Int(((raw << shift) as i64) >> shift))
                } else {
                    Ok(Value::UInt(raw))
                }
            }
            PrimitiveKind::Float { bytes } => {
                if bytes == 4 {
                    let mut buf = [0u8; 4];
                    image.read(at, &mut buf)?;
                    Ok(Value::Float(f32::from_le_bytes(buf) as f64))
                } else {
                    let mut buf = [0u8; 8];
                    image.read(at, &mut buf)?;
                    Ok(Value::Float(f64::from_le_bytes(buf)))
                }
            }
            PrimitiveKind::Pointer | PrimitiveKind::CString => {
                Ok(Value::Ptr(image.read_ptr(at)?))
            }
        }
    }

    fn write(
        &self,
        image: &dyn ModuleImage,
        address: u64,
        offset: u64,
        value: &Value,
    ) -> Result<(), ModuleError> {
        let at = address + offset;
        match self.kind {
            PrimitiveKind::Void => Ok(()),
            PrimitiveKind::Bool => {
                let b = matches!(value, Value::Bool(true)) as u8;
                image.write(at, &[b])
            }
            PrimitiveKind::Int { bytes, .. } => {
                let raw = value
                    .as_int()
                    .map(|v| v as u64)
                    .or_else(|| value.as_u64())
                    .ok_or(ModuleError::TypeMismatch)?;
                image.write(at, &raw.to_le_bytes()[..bytes as usize])
            }
            PrimitiveKind::Float { bytes } => {
                let v = value.as_float().ok_or(ModuleError::TypeMismatch)?;
                if bytes == 4 {
                    image.write(at, &(v as f32).to_le_bytes())
                } else {
                    image.write(at, &v.to_le_bytes())
                }
            }
            PrimitiveKind::Pointer | PrimitiveKind::CString => {
                let p = value.as_u64().ok_or(ModuleError::TypeMismatch)?;
                image.write(at, &p.to_le_bytes())
            }
        }
    }
}

/// Base-class edges between registered class types, shared by every
/// `ClassType` so structural acceptance can walk the chain.
#[derive(Default)]
pub struct ClassHierarchy {
    parents: RefCell<AHashMap<u32, u32>>,
}

impl ClassHierarchy {
    pub fn set_parent(&self, type_id: u32, parent_id: u32) {
        self.parents.borrow_mut().insert(type_id, parent_id);
    }

    /// True when `type_id` is `ancestor_id` or derives from it.
    pub fn is_derived(&self, type_id: u32, ancestor_id: u32) -> bool {
        let parents = self.parents.borrow();
        let mut current = type_id;
        let mut steps = 0usize;
        loop {
            if current == ancestor_id {
                return true;
            }
            match parents.get(&current) {
                Some(&p) if steps < 64 => {
                    current = p;
                    steps += 1;
                }
                _ => return false,
            }
        }
    }
}

/// A native class used as a parameter/return/variable type. Represented as
/// a pointer at the call boundary.
pub struct ClassType {
    name: String,
    type_id: u32,
    hierarchy: Rc<ClassHierarchy>,
    vtable_base: Option<u64>,
}

impl ClassType {
    pub fn new(
        name: String,
        type_id: u32,
        hierarchy: Rc<ClassHierarchy>,
        vtable_base: Option<u64>,
    ) -> Self {
        Self { name, type_id, hierarchy, vtable_base }
    }
}

impl TypeInfo for ClassType {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_id(&self) -> u32 {
        self.type_id
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::Object { type_id, .. } => self.hierarchy.is_derived(*type_id, self.type_id),
            Value::Null => true,
            _ => false,
        }
    }

    fn read(&self, image: &dyn ModuleImage, address: u64, offset: u64) -> Result<Value, ModuleError> {
        let ptr = image.read_ptr(address + offset)?;
        Ok(Value::Object { type_id: self.type_id, address: ptr })
    }

    fn write(
        &self,
        image: &dyn ModuleImage,
        address: u64,
        offset: u64,
        value: &Value,
    ) -> Result<(), ModuleError> {
        let ptr = value.as_u64().ok_or(ModuleError::TypeMismatch)?;
        image.write(address + offset, &ptr.to_le_bytes())
    }

    fn vtable_base(&self) -> Option<u64> {
        self.vtable_base
    }
}

/// Registry of every type the database can reference, keyed by the
/// persistent type id. Primitives are pre-registered; the host adds its
/// class types before opening a database.
pub struct TypeRegistry {
    types: RefCell<AHashMap<u32, TypeHandle>>,
    by_name: RefCell<AHashMap<String, u32>>,
    hierarchy: Rc<ClassHierarchy>,
    next_id: RefCell<u32>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        let registry = Self {
            types: RefCell::new(AHashMap::new()),
            by_name: RefCell::new(AHashMap::new()),
            hierarchy: Rc::new(ClassHierarchy::default()),
            next_id: RefCell::new(FIRST_USER_TYPE_ID),
        };
        for &(name, id, kind) in PRIMITIVE_TYPES {
            registry.register(Rc::new(PrimitiveType::new(name, id, kind)));
        }
        registry
    }

    pub fn register(&self, ty: TypeHandle) {
        self.by_name.borrow_mut().insert(ty.name().to_string(), ty.type_id());
        self.types.borrow_mut().insert(ty.type_id(), ty);
    }

    /// Register a class type, allocating a fresh persistent id.
    pub fn register_class(&self, name: &str, parent: Option<u32>, vtable_base: Option<u64>) -> u32 {
        if let Some(existing) = self.id_by_name(name) {
            return existing;
        }
        let id = {
            let mut next = self.next_id.borrow_mut();
            let id = *next;
            *next += 1;
            id
        };
        if let Some(parent_id) = parent {
            self.hierarchy.set_parent(id, parent_id);
        }
        self.register(Rc::new(ClassType::new(
            name.to_string(),
            id,
            self.hierarchy.clone(),
            vtable_base,
        )));
        id
    }

    pub fn get(&self, type_id: u32) -> Option<TypeHandle> {
        self.types.borrow().get(&type_id).cloned()
    }

    pub fn id_by_name(&self, name: &str) -> Option<u32> {
        self.by_name.borrow().get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<TypeHandle> {
        self.id_by_name(name).and_then(|id| self.get(id))
    }

    pub fn hierarchy(&self) -> Rc<ClassHierarchy> {
        self.hierarchy.clone()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::FakeModule;

    #[test]
    fn test_primitive_acceptance() {
        let reg = TypeRegistry::new();
        let int32 = reg.by_name("int32").unwrap();
        assert!(int32.accepts_value(&Value::Int(42)));
        assert!(!int32.accepts_value(&Value::Str("42".into())));

        let cstr = reg.by_name("cstring").unwrap();
        assert!(cstr.accepts_value(&Value::Str("hello".into())));
        assert!(!cstr.accepts_value(&Value::Int(0)));
    }

    #[test]
    fn test_class_acceptance_walks_hierarchy() {
        let reg = TypeRegistry::new();
        let base = reg.register_class("Base", None, None);
        let derived = reg.register_class("Derived", Some(base), None);

        let base_ty = reg.get(base).unwrap();
        assert!(base_ty.accepts_value(&Value::Object { type_id: derived, address: 0x1000 }));

        let derived_ty = reg.get(derived).unwrap();
        assert!(!derived_ty.accepts_value(&Value::Object { type_id: base, address: 0x1000 }));
    }

    #[test]
    fn test_primitive_read_write_round_trip() {
        let reg = TypeRegistry::new();
        let module = FakeModule::new(0x1000, 64);

        let int16 = reg.by_name("int16").unwrap();
        int16.write(&module, 0x1000, 4, &Value::Int(-2)).unwrap();
        assert_eq!(int16.read(&module, 0x1000, 4).unwrap(), Value::Int(-2));

        let double = reg.by_name("double").unwrap();
        double.write(&module, 0x1000, 16, &Value::Float(3.25)).unwrap();
        assert_eq!(double.read(&module, 0x1000, 16).unwrap(), Value::Float(3.25));
    }

    #[test]
    fn test_register_class_is_idempotent_by_name() {
        let reg = TypeRegistry::new();
        let a = reg.register_class("Widget", None, None);
        let b = reg.register_class("Widget", None, None);
        assert_eq!(a, b);
    }
}
