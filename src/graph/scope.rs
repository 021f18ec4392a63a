// Mon Feb 2 2026 - Alex

use crate::graph::node::NodeRef;
use indexmap::IndexMap;

/// Insertion-ordered name -> node mapping. Children are deduplicated by
/// name; a placeholder entry keeps its slot when the real node replaces
/// it, since replacement rewrites the arena entry in place.
#[derive(Debug, Default)]
pub struct ScopeMap {
    entries: IndexMap<String, NodeRef>,
}

impl ScopeMap {
    pub fn new() -> Self {
        Self { entries: IndexMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<NodeRef> {
        self.entries.get(name).copied()
    }

    /// Insert a new child. Returns the already-present ref when the name
    /// is taken, leaving the map unchanged.
    pub fn insert(&mut self, name: &str, node: NodeRef) -> Result<(), NodeRef> {
        match self.entries.get(name) {
            Some(&existing) => Err(existing),
            None => {
                self.entries.insert(name.to_string(), node);
                Ok(())
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeRef)> {
        self.entries.iter().map(|(name, &node)| (name.as_str(), node))
    }

    pub fn values(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.entries.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_preserves_order_and_dedupes() {
        let mut scope = ScopeMap::new();
        assert!(scope.insert("b", NodeRef(1)).is_ok());
        assert!(scope.insert("a", NodeRef(2)).is_ok());
        assert_eq!(scope.insert("b", NodeRef(3)), Err(NodeRef(1)));

        let names: Vec<&str> = scope.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
