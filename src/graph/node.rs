// Mon Feb 2 2026 - Alex

use crate::graph::scope::ScopeMap;
use indexmap::IndexMap;
use std::fmt;

/// Closed kind enumeration. The declaration order is the id-range order of
/// the file format: ids are partitioned into contiguous ranges, one per
/// kind, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Null,
    NativeType,
    Class,
    ClassTemplate,
    TemplateInstantiation,
    Namespace,
    StaticObject,
    Function,
    FunctionOverload,
    FunctionType,
    Variable,
    VariableOverload,
    AddressVariable,
    VariableGetter,
    AddressGetter,
    TypeList,
    Reference,
    Redirect,
}

pub const KIND_COUNT: usize = 18;

pub const ALL_KINDS: [NodeKind; KIND_COUNT] = [
    NodeKind::Null,
    NodeKind::NativeType,
    NodeKind::Class,
    NodeKind::ClassTemplate,
    NodeKind::TemplateInstantiation,
    NodeKind::Namespace,
    NodeKind::StaticObject,
    NodeKind::Function,
    NodeKind::FunctionOverload,
    NodeKind::FunctionType,
    NodeKind::Variable,
    NodeKind::VariableOverload,
    NodeKind::AddressVariable,
    NodeKind::VariableGetter,
    NodeKind::AddressGetter,
    NodeKind::TypeList,
    NodeKind::Reference,
    NodeKind::Redirect,
];

impl NodeKind {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        ALL_KINDS.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::Null => "null",
            NodeKind::NativeType => "native-type",
            NodeKind::Class => "class",
            NodeKind::ClassTemplate => "class-template",
            NodeKind::TemplateInstantiation => "template-instantiation",
            NodeKind::Namespace => "namespace",
            NodeKind::StaticObject => "static-object",
            NodeKind::Function => "function",
            NodeKind::FunctionOverload => "function-overload",
            NodeKind::FunctionType => "function-type",
            NodeKind::Variable => "variable",
            NodeKind::VariableOverload => "variable-overload",
            NodeKind::AddressVariable => "address-variable",
            NodeKind::VariableGetter => "variable-getter",
            NodeKind::AddressGetter => "address-getter",
            NodeKind::TypeList => "type-list",
            NodeKind::Reference => "reference",
            NodeKind::Redirect => "redirect",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arena index of a node. All cross-node edges on the write side are
/// arena indices; wire ids exist only during a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(pub u32);

impl NodeRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Class-shaped contents shared by classes, class templates and template
/// instantiations: one static scope, one property scope (instance
/// functions, with a dedicated constructor slot), optional single base.
#[derive(Debug, Default)]
pub struct ClassData {
    pub parent: Option<NodeRef>,
    pub statics: ScopeMap,
    pub constructor: Option<NodeRef>,
    pub properties: IndexMap<String, NodeRef>,
}

#[derive(Debug, Clone, Default)]
pub struct OverloadData {
    /// Module-relative entry address.
    pub address: u64,
    pub params: Vec<NodeRef>,
    pub return_type: Option<NodeRef>,
    pub receiver: Option<NodeRef>,
    pub returns_via_out: bool,
    /// Partitions overloads of one function into template-specialized
    /// groups.
    pub template_key: Option<String>,
}

#[derive(Debug)]
pub enum NodePayload {
    Null,
    /// Stand-in for a forward reference; must be replaced by the real
    /// node before a save.
    Placeholder,
    NativeType {
        type_id: u32,
    },
    Class(ClassData),
    ClassTemplate {
        class: ClassData,
        /// Template parameter list, when captured (a TypeList node).
        params: Option<NodeRef>,
        /// Serialized argument key -> previously built specialization.
        specializations: IndexMap<String, NodeRef>,
    },
    TemplateInstantiation {
        template: NodeRef,
        key: String,
        class: ClassData,
    },
    Namespace {
        scope: ScopeMap,
    },
    StaticObject {
        type_ref: NodeRef,
        address: u64,
    },
    Function {
        overloads: Vec<NodeRef>,
    },
    FunctionOverload(OverloadData),
    FunctionType {
        return_type: Option<NodeRef>,
        params: Vec<NodeRef>,
    },
    Variable {
        type_ref: NodeRef,
        address: u64,
    },
    VariableOverload {
        key: String,
        type_ref: NodeRef,
        address: u64,
    },
    AddressVariable {
        address: u64,
    },
    VariableGetter {
        entries: Vec<NodeRef>,
    },
    AddressGetter {
        entries: Vec<(String, u64)>,
    },
    TypeList {
        items: Vec<NodeRef>,
    },
    Reference {
        target: NodeRef,
    },
    Redirect {
        target: NodeRef,
    },
}

#[derive(Debug)]
pub struct NodeData {
    pub name: Option<String>,
    pub payload: NodePayload,
}

impl NodePayload {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodePayload::Null | NodePayload::Placeholder => NodeKind::Null,
            NodePayload::NativeType { .. } => NodeKind::NativeType,
            NodePayload::Class(_) => NodeKind::Class,
            NodePayload::ClassTemplate { .. } => NodeKind::ClassTemplate,
            NodePayload::TemplateInstantiation { .. } => NodeKind::TemplateInstantiation,
            NodePayload::Namespace { .. } => NodeKind::Namespace,
            NodePayload::StaticObject { .. } => NodeKind::StaticObject,
            NodePayload::Function { .. } => NodeKind::Function,
            NodePayload::FunctionOverload(_) => NodeKind::FunctionOverload,
            NodePayload::FunctionType { .. } => NodeKind::FunctionType,
            NodePayload::Variable { .. } => NodeKind::Variable,
            NodePayload::VariableOverload { .. } => NodeKind::VariableOverload,
            NodePayload::AddressVariable { .. } => NodeKind::AddressVariable,
            NodePayload::VariableGetter { .. } => NodeKind::VariableGetter,
            NodePayload::AddressGetter { .. } => NodeKind::AddressGetter,
            NodePayload::TypeList { .. } => NodeKind::TypeList,
            NodePayload::Reference { .. } => NodeKind::Reference,
            NodePayload::Redirect { .. } => NodeKind::Redirect,
        }
    }
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        self.payload.kind()
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.payload, NodePayload::Placeholder)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    fn class_edges(class: &ClassData, out: &mut Vec<NodeRef>) {
        if let Some(parent) = class.parent {
            out.push(parent);
        }
        out.extend(class.statics.values());
        if let Some(ctor) = class.constructor {
            out.push(ctor);
        }
        out.extend(class.properties.values().copied());
    }

    /// Every outgoing edge, tree and non-tree alike. Enumeration and the
    /// completion sweep both rely on this being exhaustive.
    pub fn edges(&self) -> Vec<NodeRef> {
        let mut out = Vec::new();
        match &self.payload {
            NodePayload::Null | NodePayload::Placeholder => {}
            NodePayload::NativeType { .. } | NodePayload::AddressVariable { .. } => {}
            NodePayload::AddressGetter { .. } => {}
            NodePayload::Class(class) => Self::class_edges(class, &mut out),
            NodePayload::ClassTemplate { class, params, specializations } => {
                Self::class_edges(class, &mut out);
                if let Some(p) = params {
                    out.push(*p);
                }
                out.extend(specializations.values().copied());
            }
            NodePayload::TemplateInstantiation { template, class, .. } => {
                out.push(*template);
                Self::class_edges(class, &mut out);
            }
            NodePayload::Namespace { scope } => out.extend(scope.values()),
            NodePayload::StaticObject { type_ref, .. } => out.push(*type_ref),
            NodePayload::Function { overloads } => out.extend(overloads.iter().copied()),
            NodePayload::FunctionOverload(data) => {
                if let Some(r) = data.receiver {
                    out.push(r);
                }
                if let Some(r) = data.return_type {
                    out.push(r);
                }
                out.extend(data.params.iter().copied());
            }
            NodePayload::FunctionType { return_type, params } => {
                if let Some(r) = return_type {
                    out.push(*r);
                }
                out.extend(params.iter().copied());
            }
            NodePayload::Variable { type_ref, .. } => out.push(*type_ref),
            NodePayload::VariableOverload { type_ref, .. } => out.push(*type_ref),
            NodePayload::VariableGetter { entries } => out.extend(entries.iter().copied()),
            NodePayload::TypeList { items } => out.extend(items.iter().copied()),
            NodePayload::Reference { target } | NodePayload::Redirect { target } => {
                out.push(*target)
            }
        }
        out
    }
}
