// Mon Feb 2 2026 - Alex

pub mod registry;
pub mod template;
pub mod value;

pub use registry::{
    primitive_id, ClassType, PrimitiveKind, PrimitiveType, TypeRegistry, FIRST_USER_TYPE_ID,
    PRIMITIVE_TYPES,
};
pub use template::{template_key, template_key_from_values, TemplateArg};
pub use value::Value;

use crate::ffi::{ModuleError, ModuleImage};
use std::rc::Rc;

/// A resolvable native type, as seen by the dispatch facade and the
/// variable binding surface. Implementations carry a persistent numeric
/// id that survives serialization into the database.
pub trait TypeInfo {
    fn name(&self) -> &str;

    /// Persistent id used when the type is written into the database or
    /// into a template-argument key.
    fn type_id(&self) -> u32;

    /// Structural check: does this type accept the given runtime value?
    /// Permissive on purpose, e.g. a base-class type accepts a value of a
    /// derived class.
    fn accepts_value(&self, value: &Value) -> bool;

    /// Read this type's representation at `address + offset` inside the
    /// loaded module.
    fn read(&self, image: &dyn ModuleImage, address: u64, offset: u64) -> Result<Value, ModuleError>;

    /// Store `value` at `address + offset` inside the loaded module.
    fn write(
        &self,
        image: &dyn ModuleImage,
        address: u64,
        offset: u64,
        value: &Value,
    ) -> Result<(), ModuleError>;

    /// Base address of the type's virtual table, when it has one.
    fn vtable_base(&self) -> Option<u64> {
        None
    }
}

pub type TypeHandle = Rc<dyn TypeInfo>;
