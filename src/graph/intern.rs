// Mon Feb 2 2026 - Alex

use crate::graph::node::{NodeKind, NodeRef, OverloadData};

/// Canonical byte encoding of a node constructor's arguments. Two
/// structurally identical construction requests produce the same key, so
/// the builder's intern table hands back the identical node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey(Vec<u8>);

pub struct KeyEncoder {
    bytes: Vec<u8>,
}

impl KeyEncoder {
    pub fn new(kind: NodeKind) -> Self {
        Self { bytes: vec![kind.index() as u8] }
    }

    pub fn node(mut self, node: NodeRef) -> Self {
        self.bytes.extend_from_slice(&node.0.to_le_bytes());
        self
    }

    pub fn opt_node(self, node: Option<NodeRef>) -> Self {
        match node {
            // u32::MAX cannot be a real arena index alongside a live graph.
            None => self.u32(u32::MAX),
            Some(n) => self.u32(n.0),
        }
    }

    pub fn nodes(mut self, nodes: &[NodeRef]) -> Self {
        self = self.u32(nodes.len() as u32);
        for &n in nodes {
            self = self.node(n);
        }
        self
    }

    pub fn u32(mut self, value: u32) -> Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn u64(mut self, value: u64) -> Self {
        self.bytes.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn bool(mut self, value: bool) -> Self {
        self.bytes.push(value as u8);
        self
    }

    pub fn str(mut self, value: &str) -> Self {
        self.bytes.extend_from_slice(&(value.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(value.as_bytes());
        self
    }

    pub fn opt_str(self, value: Option<&str>) -> Self {
        match value {
            None => self.u32(u32::MAX),
            Some(s) => self.str(s),
        }
    }

    pub fn finish(self) -> CanonicalKey {
        CanonicalKey(self.bytes)
    }
}

pub fn overload_key(data: &OverloadData) -> CanonicalKey {
    KeyEncoder::new(NodeKind::FunctionOverload)
        .u64(data.address)
        .nodes(&data.params)
        .opt_node(data.return_type)
        .opt_node(data.receiver)
        .bool(data.returns_via_out)
        .opt_str(data.template_key.as_deref())
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_args_identical_keys() {
        let a = KeyEncoder::new(NodeKind::FunctionType)
            .opt_node(Some(NodeRef(4)))
            .nodes(&[NodeRef(1), NodeRef(2)])
            .finish();
        let b = KeyEncoder::new(NodeKind::FunctionType)
            .opt_node(Some(NodeRef(4)))
            .nodes(&[NodeRef(1), NodeRef(2)])
            .finish();
        assert_eq!(a, b);
    }

    #[test]
    fn test_kind_tag_separates_key_spaces() {
        let a = KeyEncoder::new(NodeKind::Reference).node(NodeRef(9)).finish();
        let b = KeyEncoder::new(NodeKind::Redirect).node(NodeRef(9)).finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_string_args_unambiguous() {
        let a = KeyEncoder::new(NodeKind::NativeType).str("ab").str("c").finish();
        let b = KeyEncoder::new(NodeKind::NativeType).str("a").str("bc").finish();
        assert_ne!(a, b);
    }
}
