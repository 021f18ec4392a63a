// Mon Feb 2 2026 - Alex

pub mod builder;
pub mod error;
pub mod intern;
pub mod node;
pub mod scope;

pub use builder::GraphBuilder;
pub use error::GraphError;
pub use node::{ClassData, NodeData, NodeKind, NodePayload, NodeRef, OverloadData, ALL_KINDS, KIND_COUNT};
pub use scope::ScopeMap;

use crate::types::PRIMITIVE_TYPES;

/// The write-side object graph: an arena of nodes addressed by index, one
/// rooted namespace scope, plus the registered-but-unreachable primitive
/// type nodes. Traversal state (visited sets) is always owned by the
/// traversal, never stored on nodes.
pub struct Graph {
    nodes: Vec<NodeData>,
    root: NodeRef,
    primitives: Vec<NodeRef>,
}

impl Graph {
    /// A fresh graph holding the root namespace and the fixed primitive
    /// native-type list, in table order. The reader re-registers these by
    /// id, so their discovery order must never change.
    pub fn new() -> Self {
        let mut graph = Self { nodes: Vec::new(), root: NodeRef(0), primitives: Vec::new() };
        graph.root = graph.alloc(Some("".to_string()), NodePayload::Namespace {
            scope: ScopeMap::new(),
        });
        for &(name, type_id, _) in PRIMITIVE_TYPES {
            let node = graph.alloc(Some(name.to_string()), NodePayload::NativeType { type_id });
            graph.primitives.push(node);
        }
        graph
    }

    pub fn alloc(&mut self, name: Option<String>, payload: NodePayload) -> NodeRef {
        let node = NodeRef(self.nodes.len() as u32);
        self.nodes.push(NodeData { name, payload });
        node
    }

    pub fn node(&self, node: NodeRef) -> &NodeData {
        &self.nodes[node.index()]
    }

    pub fn node_mut(&mut self, node: NodeRef) -> &mut NodeData {
        &mut self.nodes[node.index()]
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    pub fn primitives(&self) -> &[NodeRef] {
        &self.primitives
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Names of placeholders still reachable from the root and primitive
    /// roots. Must be empty before a save; the visited set guards against
    /// cycles (a class referencing its own specializations, for one).
    pub fn unresolved_placeholders(&self) -> Vec<String> {
        let mut visited = vec![false; self.nodes.len()];
        let mut unresolved = Vec::new();
        let mut stack: Vec<NodeRef> = self.primitives.clone();
        stack.push(self.root);
        while let Some(node) = stack.pop() {
            if visited[node.index()] {
                continue;
            }
            visited[node.index()] = true;
            let data = self.node(node);
            if data.is_placeholder() {
                unresolved.push(data.display_name().to_string());
                continue;
            }
            stack.extend(data.edges());
        }
        unresolved.sort();
        unresolved
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
