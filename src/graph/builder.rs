// Mon Feb 2 2026 - Alex

use crate::graph::error::GraphError;
use crate::graph::intern::{overload_key, CanonicalKey, KeyEncoder};
use crate::graph::node::{ClassData, NodeKind, NodePayload, NodeRef, OverloadData};
use crate::graph::scope::ScopeMap;
use crate::graph::Graph;
use crate::types::{template_key, TemplateArg};
use ahash::AHashMap;
use indexmap::IndexMap;
use log::debug;

/// One graph-building session. Owns the content-addressed intern table,
/// so structurally identical construction requests return the identical
/// node, which is what makes repeated references round-trip as one entry.
pub struct GraphBuilder {
    graph: Graph,
    interned: AHashMap<CanonicalKey, NodeRef>,
    types_by_id: AHashMap<u32, NodeRef>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        let graph = Graph::new();
        let mut types_by_id = AHashMap::new();
        for &node in graph.primitives() {
            if let NodePayload::NativeType { type_id } = graph.node(node).payload {
                types_by_id.insert(type_id, node);
            }
        }
        Self { graph, interned: AHashMap::new(), types_by_id }
    }

    pub fn root(&self) -> NodeRef {
        self.graph.root()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn finish(self) -> Graph {
        self.graph
    }

    // --- scope plumbing ---

    fn scope_map(&self, scope: NodeRef) -> Result<&ScopeMap, GraphError> {
        let node = self.graph.node(scope);
        match &node.payload {
            NodePayload::Namespace { scope } => Ok(scope),
            NodePayload::Class(class)
            | NodePayload::ClassTemplate { class, .. }
            | NodePayload::TemplateInstantiation { class, .. } => Ok(&class.statics),
            _ => Err(GraphError::NotAScope { kind: node.kind() }),
        }
    }

    fn scope_map_mut(&mut self, scope: NodeRef) -> Result<&mut ScopeMap, GraphError> {
        let kind = self.graph.node(scope).kind();
        let node = self.graph.node_mut(scope);
        match &mut node.payload {
            NodePayload::Namespace { scope } => Ok(scope),
            NodePayload::Class(class)
            | NodePayload::ClassTemplate { class, .. }
            | NodePayload::TemplateInstantiation { class, .. } => Ok(&mut class.statics),
            _ => Err(GraphError::NotAScope { kind }),
        }
    }

    /// Get-or-create a named child, replacing a placeholder in place if a
    /// forward reference got there first.
    fn define_named(
        &mut self,
        scope: NodeRef,
        name: &str,
        payload: NodePayload,
    ) -> Result<NodeRef, GraphError> {
        let wanted_kind = payload.kind();
        if let Some(existing) = self.scope_map(scope)?.get(name) {
            let node = self.graph.node_mut(existing);
            if node.is_placeholder() {
                debug!("resolving placeholder '{}' to {}", name, wanted_kind);
                node.payload = payload;
                return Ok(existing);
            }
            if node.kind() == wanted_kind {
                return Ok(existing);
            }
            return Err(GraphError::NameCollision {
                name: name.to_string(),
                existing: node.kind(),
            });
        }
        let node = self.graph.alloc(Some(name.to_string()), payload);
        self.scope_map_mut(scope)?
            .insert(name, node)
            .expect("scope changed underneath define_named");
        Ok(node)
    }

    fn intern(&mut self, key: CanonicalKey, name: Option<String>, payload: NodePayload) -> NodeRef {
        if let Some(&existing) = self.interned.get(&key) {
            return existing;
        }
        let node = self.graph.alloc(name, payload);
        self.interned.insert(key, node);
        node
    }

    // --- named nodes ---

    pub fn namespace(&mut self, scope: NodeRef, name: &str) -> Result<NodeRef, GraphError> {
        self.define_named(scope, name, NodePayload::Namespace { scope: ScopeMap::new() })
    }

    /// Walk (and create) a `::`-free namespace chain from the root.
    pub fn namespace_path(&mut self, parts: &[&str]) -> Result<NodeRef, GraphError> {
        let mut current = self.root();
        for part in parts {
            current = self.namespace(current, part)?;
        }
        Ok(current)
    }

    pub fn class(
        &mut self,
        scope: NodeRef,
        name: &str,
        parent: Option<NodeRef>,
    ) -> Result<NodeRef, GraphError> {
        let node = self.define_named(
            scope,
            name,
            NodePayload::Class(ClassData { parent, ..ClassData::default() }),
        )?;
        // A get-or-create hit may predate knowledge of the base class.
        if let NodePayload::Class(class) = &mut self.graph.node_mut(node).payload {
            if class.parent.is_none() {
                class.parent = parent;
            }
        }
        Ok(node)
    }

    pub fn class_template(
        &mut self,
        scope: NodeRef,
        name: &str,
        params: Option<NodeRef>,
    ) -> Result<NodeRef, GraphError> {
        self.define_named(
            scope,
            name,
            NodePayload::ClassTemplate {
                class: ClassData::default(),
                params,
                specializations: IndexMap::new(),
            },
        )
    }

    /// Get-or-create the specialization of `template` for `args`. Keyed by
    /// the serialized argument key, so identical requests are idempotent.
    pub fn specialize(
        &mut self,
        template: NodeRef,
        args: &[TemplateArg],
    ) -> Result<NodeRef, GraphError> {
        let key = template_key(args);
        let template_name = {
            let node = self.graph.node(template);
            match &node.payload {
                NodePayload::ClassTemplate { specializations, .. } => {
                    if let Some(&existing) = specializations.get(&key) {
                        return Ok(existing);
                    }
                    node.display_name().to_string()
                }
                _ => return Err(GraphError::NotATemplate { kind: node.kind() }),
            }
        };
        let name = format!("{}<{}>", template_name, key);
        let node = self.graph.alloc(
            Some(name),
            NodePayload::TemplateInstantiation {
                template,
                key: key.clone(),
                class: ClassData::default(),
            },
        );
        if let NodePayload::ClassTemplate { specializations, .. } =
            &mut self.graph.node_mut(template).payload
        {
            specializations.insert(key, node);
        }
        Ok(node)
    }

    pub fn function(&mut self, scope: NodeRef, name: &str) -> Result<NodeRef, GraphError> {
        self.define_named(scope, name, NodePayload::Function { overloads: Vec::new() })
    }

    /// Intern an overload and append it to `function`'s group.
    pub fn add_overload(
        &mut self,
        function: NodeRef,
        data: OverloadData,
    ) -> Result<NodeRef, GraphError> {
        {
            let node = self.graph.node(function);
            if !matches!(node.payload, NodePayload::Function { .. }) {
                return Err(GraphError::NotAFunction { kind: node.kind() });
            }
        }
        let name = self.graph.node(function).display_name().to_string();
        let key = overload_key(&data);
        let overload = self.intern(key, Some(name), NodePayload::FunctionOverload(data));
        if let NodePayload::Function { overloads } = &mut self.graph.node_mut(function).payload {
            if !overloads.contains(&overload) {
                overloads.push(overload);
            }
        }
        Ok(overload)
    }

    /// An instance function in the class's property scope.
    pub fn method(&mut self, class: NodeRef, name: &str) -> Result<NodeRef, GraphError> {
        if self.class_data(class).is_none() {
            return Err(GraphError::NotAScope { kind: self.graph.node(class).kind() });
        }
        if let Some(&existing) = self.class_data(class).unwrap().properties.get(name) {
            return Ok(existing);
        }
        let node = self
            .graph
            .alloc(Some(name.to_string()), NodePayload::Function { overloads: Vec::new() });
        self.class_data_mut(class).unwrap().properties.insert(name.to_string(), node);
        Ok(node)
    }

    /// Backfill the base class of an already-defined class.
    pub fn class_parent(&mut self, class: NodeRef, parent: NodeRef) -> Result<(), GraphError> {
        let kind = self.graph.node(class).kind();
        match self.class_data_mut(class) {
            Some(data) => {
                data.parent = Some(parent);
                Ok(())
            }
            None => Err(GraphError::NotAScope { kind }),
        }
    }

    /// The dedicated constructor slot of the class's property scope.
    pub fn constructor(&mut self, class: NodeRef) -> Result<NodeRef, GraphError> {
        if self.class_data(class).is_none() {
            return Err(GraphError::NotAScope { kind: self.graph.node(class).kind() });
        }
        if let Some(ctor) = self.class_data(class).unwrap().constructor {
            return Ok(ctor);
        }
        let node = self
            .graph
            .alloc(Some("new".to_string()), NodePayload::Function { overloads: Vec::new() });
        self.class_data_mut(class).unwrap().constructor = Some(node);
        Ok(node)
    }

    pub fn variable(
        &mut self,
        scope: NodeRef,
        name: &str,
        type_ref: NodeRef,
        address: u64,
    ) -> Result<NodeRef, GraphError> {
        self.define_named(scope, name, NodePayload::Variable { type_ref, address })
    }

    pub fn address_variable(
        &mut self,
        scope: NodeRef,
        name: &str,
        address: u64,
    ) -> Result<NodeRef, GraphError> {
        self.define_named(scope, name, NodePayload::AddressVariable { address })
    }

    /// A getter over (template key -> typed address) entries, for data
    /// members whose address depends on the active specialization.
    pub fn variable_getter(
        &mut self,
        scope: NodeRef,
        name: &str,
        entries: &[(String, NodeRef, u64)],
    ) -> Result<NodeRef, GraphError> {
        let mut refs = Vec::with_capacity(entries.len());
        for (key, type_ref, address) in entries {
            let canonical = KeyEncoder::new(NodeKind::VariableOverload)
                .str(key)
                .node(*type_ref)
                .u64(*address)
                .finish();
            refs.push(self.intern(
                canonical,
                Some(name.to_string()),
                NodePayload::VariableOverload {
                    key: key.clone(),
                    type_ref: *type_ref,
                    address: *address,
                },
            ));
        }
        self.define_named(scope, name, NodePayload::VariableGetter { entries: refs })
    }

    pub fn address_getter(
        &mut self,
        scope: NodeRef,
        name: &str,
        entries: Vec<(String, u64)>,
    ) -> Result<NodeRef, GraphError> {
        self.define_named(scope, name, NodePayload::AddressGetter { entries })
    }

    pub fn static_object(
        &mut self,
        scope: NodeRef,
        name: &str,
        type_ref: NodeRef,
        address: u64,
    ) -> Result<NodeRef, GraphError> {
        self.define_named(scope, name, NodePayload::StaticObject { type_ref, address })
    }

    /// Insert a placeholder for a name referenced before its definition.
    /// The real definition later replaces it in place.
    pub fn forward_ref(&mut self, scope: NodeRef, name: &str) -> Result<NodeRef, GraphError> {
        if let Some(existing) = self.scope_map(scope)?.get(name) {
            return Ok(existing);
        }
        let node = self.graph.alloc(Some(name.to_string()), NodePayload::Placeholder);
        self.scope_map_mut(scope)?
            .insert(name, node)
            .expect("scope changed underneath forward_ref");
        Ok(node)
    }

    // --- interned unnamed nodes ---

    pub fn native_type(&mut self, name: &str, type_id: u32) -> NodeRef {
        if let Some(&existing) = self.types_by_id.get(&type_id) {
            return existing;
        }
        let key = KeyEncoder::new(NodeKind::NativeType).str(name).u32(type_id).finish();
        let node =
            self.intern(key, Some(name.to_string()), NodePayload::NativeType { type_id });
        self.types_by_id.insert(type_id, node);
        node
    }

    pub fn reference(&mut self, target: NodeRef) -> NodeRef {
        let key = KeyEncoder::new(NodeKind::Reference).node(target).finish();
        self.intern(key, None, NodePayload::Reference { target })
    }

    pub fn redirect(&mut self, target: NodeRef) -> NodeRef {
        let key = KeyEncoder::new(NodeKind::Redirect).node(target).finish();
        self.intern(key, None, NodePayload::Redirect { target })
    }

    pub fn type_list(&mut self, items: Vec<NodeRef>) -> NodeRef {
        let key = KeyEncoder::new(NodeKind::TypeList).nodes(&items).finish();
        self.intern(key, None, NodePayload::TypeList { items })
    }

    pub fn function_type(
        &mut self,
        return_type: Option<NodeRef>,
        params: Vec<NodeRef>,
    ) -> NodeRef {
        let key = KeyEncoder::new(NodeKind::FunctionType)
            .opt_node(return_type)
            .nodes(&params)
            .finish();
        self.intern(key, None, NodePayload::FunctionType { return_type, params })
    }

    /// Create an alias `name` in `scope` that resolves transparently to
    /// `target`.
    pub fn alias(
        &mut self,
        scope: NodeRef,
        name: &str,
        target: NodeRef,
    ) -> Result<NodeRef, GraphError> {
        self.define_named(scope, name, NodePayload::Redirect { target })
    }

    fn class_data(&self, class: NodeRef) -> Option<&ClassData> {
        match &self.graph.node(class).payload {
            NodePayload::Class(class)
            | NodePayload::ClassTemplate { class, .. }
            | NodePayload::TemplateInstantiation { class, .. } => Some(class),
            _ => None,
        }
    }

    fn class_data_mut(&mut self, class: NodeRef) -> Option<&mut ClassData> {
        match &mut self.graph.node_mut(class).payload {
            NodePayload::Class(class)
            | NodePayload::ClassTemplate { class, .. }
            | NodePayload::TemplateInstantiation { class, .. } => Some(class),
            _ => None,
        }
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}
