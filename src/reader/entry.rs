// Tue Feb 3 2026 - Alex

use crate::graph::NodeKind;
use std::cell::RefCell;
use std::rc::Rc;

/// A scope's hash table as found in the file: `len` slots of
/// (id, hash) pairs starting at `table_pos`. Lookups probe this region at
/// the remembered position; nothing is parsed until a name is asked for.
#[derive(Debug, Clone, Copy)]
pub struct ScopeTable {
    pub table_pos: u64,
    pub len: u32,
}

/// Class payload. The static scope stays a raw table (probed lazily); the
/// property scope is the ordered instance-function list, constructor slot
/// first.
#[derive(Debug)]
pub struct ClassInfo {
    /// 0 when the class has no base.
    pub parent: u32,
    pub statics: ScopeTable,
    /// 0 when the class has no constructor.
    pub constructor: u32,
    pub properties: Vec<u32>,
}

/// Function payload. The overload list is re-read from `list_pos` on
/// first use and memoized.
#[derive(Debug)]
pub struct FunctionInfo {
    pub list_pos: u64,
    pub overloads: RefCell<Option<Rc<Vec<u32>>>>,
}

#[derive(Debug)]
pub struct OverloadInfo {
    /// Module-relative entry address.
    pub address: u64,
    pub returns_via_out: bool,
    /// 0 when the overload has no explicit receiver type.
    pub receiver: u32,
    pub template_key: Option<String>,
    /// 0 when the function returns nothing.
    pub return_type: u32,
    pub params: Vec<u32>,
}

/// Parsed content of one node. Produced at most once per id and cached on
/// the entry for the lifetime of the open database.
#[derive(Debug)]
pub enum Payload {
    NativeType { type_id: u32 },
    Class(Rc<ClassInfo>),
    ClassTemplate {
        class: Rc<ClassInfo>,
        /// 0 when no parameter list was captured.
        params: u32,
        specializations: Vec<(String, u32)>,
    },
    TemplateInstantiation { template: u32, key: String, class: Rc<ClassInfo> },
    Namespace { scope: ScopeTable },
    StaticObject { type_ref: u32, address: u64 },
    Function(Rc<FunctionInfo>),
    FunctionOverload(Rc<OverloadInfo>),
    FunctionType { return_type: u32, params: Vec<u32> },
    Variable { type_ref: u32, address: u64 },
    VariableOverload { key: String, type_ref: u32, address: u64 },
    AddressVariable { address: u64 },
    VariableGetter { entries: Vec<u32> },
    AddressGetter { entries: Vec<(String, u64)> },
    TypeList { items: Vec<u32> },
    Reference { target: u32 },
    Redirect { target: u32 },
}

/// Materialized node description: name and kind are read on first access,
/// the payload on first use. One entry exists per distinct id.
#[derive(Debug)]
pub struct Entry {
    pub id: u32,
    pub kind: NodeKind,
    pub name: String,
    /// File offset just past the name, where the kind payload starts.
    pub content_pos: u64,
    pub payload: RefCell<Option<Rc<Payload>>>,
}

impl Entry {
    pub fn new(id: u32, kind: NodeKind, name: String, content_pos: u64) -> Self {
        Self { id, kind, name, content_pos, payload: RefCell::new(None) }
    }

    pub fn preloaded(id: u32, kind: NodeKind, name: String, payload: Payload) -> Self {
        Self {
            id,
            kind,
            name,
            content_pos: 0,
            payload: RefCell::new(Some(Rc::new(payload))),
        }
    }
}
