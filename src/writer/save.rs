// Tue Feb 3 2026 - Alex

use crate::codec::ByteStream;
use crate::graph::scope::ScopeMap;
use crate::graph::{Graph, NodePayload, NodeRef, KIND_COUNT};
use crate::index;
use crate::writer::error::{IntegrityReport, UnwrittenNode, WriteError};
use ahash::AHashSet;
use log::{debug, info};
use std::path::Path;

/// Bumped on any change to the wire layout. The reader rejects every
/// other version outright.
pub const FORMAT_VERSION: i32 = 3;

const ADDR_SENTINEL: i64 = -1;

#[derive(Debug, Clone)]
pub struct SaveStats {
    pub total_nodes: u32,
    pub per_kind: [u32; KIND_COUNT],
    pub bytes_written: u64,
}

/// Serialize the graph into an in-memory database image. All-or-nothing:
/// any failure yields an error and no bytes.
pub fn save_to_vec(graph: &Graph) -> Result<(Vec<u8>, SaveStats), WriteError> {
    save_with(graph, &AHashSet::new())
}

/// Serialize and persist. The file is only created once the whole image
/// has been produced, so a failing save never leaves a partial database.
pub fn save_to_file<P: AsRef<Path>>(graph: &Graph, path: P) -> Result<SaveStats, WriteError> {
    let (bytes, stats) = save_to_vec(graph)?;
    std::fs::write(path, bytes)?;
    Ok(stats)
}

/// Test hook: nodes in `unwritable` are enumerated normally but skipped
/// by every write attempt, which must surface as a completion-sweep
/// failure rather than a truncated database.
pub(crate) fn save_with(
    graph: &Graph,
    unwritable: &AHashSet<NodeRef>,
) -> Result<(Vec<u8>, SaveStats), WriteError> {
    // Step 1: all placeholders must have been replaced by real nodes.
    let unresolved = graph.unresolved_placeholders();
    if !unresolved.is_empty() {
        return Err(WriteError::UnresolvedPlaceholders { names: unresolved });
    }

    let mut session = SaveSession {
        graph,
        stream: ByteStream::new(),
        wire: vec![0; graph.len()],
        addresses: vec![ADDR_SENTINEL; graph.len()],
        order: Vec::new(),
        table_pos: 0,
        unwritable,
    };

    // Step 2: reachability walk, primitives first so the reader can
    // re-register them by id without touching the file.
    let mut by_kind: Vec<Vec<NodeRef>> = vec![Vec::new(); KIND_COUNT];
    {
        let mut visited = vec![false; graph.len()];
        for &p in graph.primitives() {
            collect(graph, p, &mut visited, &mut by_kind);
        }
        collect(graph, graph.root(), &mut visited, &mut by_kind);
    }

    // Step 3: contiguous id ranges per kind, discovery order within.
    let mut per_kind = [0u32; KIND_COUNT];
    let mut next_id = 1u32;
    for (k, bucket) in by_kind.iter().enumerate() {
        per_kind[k] = bucket.len() as u32;
        for &node in bucket {
            session.wire[node.index()] = next_id;
            session.order.push(node);
            next_id += 1;
        }
    }
    let total = session.order.len() as u32;
    debug!("enumerated {} nodes across {} kinds", total, KIND_COUNT);

    // Step 4: header.
    session.stream.write_i32(FORMAT_VERSION)?;
    for count in per_kind {
        session.stream.write_i32(count as i32)?;
    }

    // Step 5: reserve the address table, backfilled in step 8.
    session.table_pos = session.stream.position();
    for _ in 0..total {
        session.stream.write_i32(0)?;
    }

    // Step 6: content, rooted at the primary (scope) edges.
    session.ensure_written(graph.root())?;

    // Step 7: completion sweep. Catches nodes reachable only through
    // non-tree edges (specialization caches, template parameter lists,
    // type references). Anything still unwritten afterwards aborts the
    // whole save.
    for node in session.order.clone() {
        session.ensure_written(node)?;
    }
    let mut failures = Vec::new();
    let mut failure_counts = [0u32; KIND_COUNT];
    for &node in &session.order {
        if session.addresses[node.index()] == ADDR_SENTINEL {
            let data = graph.node(node);
            failure_counts[data.kind().index()] += 1;
            failures.push(UnwrittenNode {
                id: session.wire[node.index()],
                kind: data.kind(),
                name: data.display_name().to_string(),
            });
        }
    }
    if !failures.is_empty() {
        let per_kind = crate::graph::ALL_KINDS
            .iter()
            .zip(failure_counts)
            .filter(|(_, c)| *c > 0)
            .map(|(&k, c)| (k, c))
            .collect();
        return Err(WriteError::UnwrittenNodes(IntegrityReport { nodes: failures, per_kind }));
    }

    // Step 8: backfill real offsets, in id order.
    for (i, &node) in session.order.iter().enumerate() {
        let offset = session.addresses[node.index()];
        if offset > i32::MAX as i64 {
            return Err(WriteError::AddressOverflow {
                name: graph.node(node).display_name().to_string(),
                offset: offset as u64,
            });
        }
        session.stream.seek(session.table_pos + i as u64 * 4)?;
        session.stream.write_i32(offset as i32)?;
    }

    let bytes = session.stream.into_vec();
    let stats = SaveStats { total_nodes: total, per_kind, bytes_written: bytes.len() as u64 };
    info!("saved {} nodes, {} bytes", stats.total_nodes, stats.bytes_written);
    Ok((bytes, stats))
}

fn collect(graph: &Graph, node: NodeRef, visited: &mut Vec<bool>, by_kind: &mut [Vec<NodeRef>]) {
    if visited[node.index()] {
        return;
    }
    visited[node.index()] = true;
    let data = graph.node(node);
    by_kind[data.kind().index()].push(node);
    for edge in data.edges() {
        collect(graph, edge, visited, by_kind);
    }
}

struct SaveSession<'a> {
    graph: &'a Graph,
    stream: ByteStream,
    wire: Vec<u32>,
    addresses: Vec<i64>,
    order: Vec<NodeRef>,
    table_pos: u64,
    unwritable: &'a AHashSet<NodeRef>,
}

impl<'a> SaveSession<'a> {
    fn wire_id(&self, node: NodeRef) -> u64 {
        self.wire[node.index()] as u64
    }

    fn write_ref(&mut self, node: Option<NodeRef>) -> Result<(), WriteError> {
        let id = node.map(|n| self.wire_id(n)).unwrap_or(0);
        self.stream.write_varint(id)?;
        Ok(())
    }

    fn write_scope_table(&mut self, scope: &ScopeMap) -> Result<(), WriteError> {
        let entries: Vec<(&str, u32)> = scope
            .iter()
            .map(|(name, node)| (name, self.wire[node.index()]))
            .collect();
        self.stream.write_varint(entries.len() as u64)?;
        let slots = index::build_slots(&entries);
        index::write_slots(&mut self.stream, &slots)?;
        Ok(())
    }

    fn write_ref_list(&mut self, nodes: &[NodeRef]) -> Result<(), WriteError> {
        for &node in nodes {
            self.write_ref(Some(node))?;
        }
        self.stream.write_varint(0)?;
        Ok(())
    }

    fn write_class_fields(&mut self, class: &crate::graph::ClassData) -> Result<(), WriteError> {
        self.write_ref(class.parent)?;
        self.write_scope_table(&class.statics)?;
        self.write_ref(class.constructor)?;
        let properties: Vec<NodeRef> = class.properties.values().copied().collect();
        self.write_ref_list(&properties)?;
        Ok(())
    }

    /// Write the node's content block unless it already has an address.
    /// Children reached through primary edges are appended after the
    /// block; everything else waits for the completion sweep.
    fn ensure_written(&mut self, node: NodeRef) -> Result<(), WriteError> {
        if self.addresses[node.index()] != ADDR_SENTINEL {
            return Ok(());
        }
        if self.unwritable.contains(&node) {
            return Ok(());
        }
        // Always append at the end; a nested backfill may have moved the
        // cursor.
        self.stream.seek(self.stream.len())?;
        self.addresses[node.index()] = self.stream.position() as i64;

        let data = self.graph.node(node);
        self.stream.write_string(data.display_name())?;

        let mut children: Vec<NodeRef> = Vec::new();
        match &data.payload {
            NodePayload::Null | NodePayload::Placeholder => {
                // Placeholders have no wire form; step 1 rejects them, so
                // reaching this arm means the graph mutated mid-save.
                self.addresses[node.index()] = ADDR_SENTINEL;
                return Ok(());
            }
            NodePayload::NativeType { type_id } => {
                self.stream.write_varint(*type_id as u64)?;
            }
            NodePayload::Class(class) => {
                self.write_class_fields(class)?;
                children.extend(class.statics.values());
                children.extend(class.constructor);
                children.extend(class.properties.values().copied());
            }
            NodePayload::ClassTemplate { class, params, specializations } => {
                self.write_class_fields(class)?;
                self.write_ref(*params)?;
                self.stream.write_varint(specializations.len() as u64)?;
                let specs: Vec<(String, NodeRef)> =
                    specializations.iter().map(|(k, &n)| (k.clone(), n)).collect();
                for (key, target) in specs {
                    self.stream.write_string(&key)?;
                    self.write_ref(Some(target))?;
                }
                children.extend(class.statics.values());
                children.extend(class.constructor);
                children.extend(class.properties.values().copied());
            }
            NodePayload::TemplateInstantiation { template, key, class } => {
                self.write_ref(Some(*template))?;
                self.stream.write_string(key)?;
                self.write_class_fields(class)?;
                children.extend(class.statics.values());
                children.extend(class.constructor);
                children.extend(class.properties.values().copied());
            }
            NodePayload::Namespace { scope } => {
                self.write_scope_table(scope)?;
                children.extend(scope.values());
            }
            NodePayload::StaticObject { type_ref, address } => {
                self.write_ref(Some(*type_ref))?;
                self.stream.write_varint(*address)?;
            }
            NodePayload::Function { overloads } => {
                self.write_ref_list(overloads)?;
                children.extend(overloads.iter().copied());
            }
            NodePayload::FunctionOverload(data) => {
                self.stream.write_varint(data.address)?;
                self.stream
                    .write_packed_bools(&[data.returns_via_out, data.template_key.is_some()])?;
                self.write_ref(data.receiver)?;
                if let Some(key) = &data.template_key {
                    let key = key.clone();
                    self.stream.write_string(&key)?;
                }
                self.write_ref(data.return_type)?;
                self.stream.write_varint(data.params.len() as u64)?;
                let params = data.params.clone();
                for param in params {
                    self.write_ref(Some(param))?;
                }
            }
            NodePayload::FunctionType { return_type, params } => {
                self.write_ref(*return_type)?;
                self.stream.write_varint(params.len() as u64)?;
                let params = params.clone();
                for param in params {
                    self.write_ref(Some(param))?;
                }
            }
            NodePayload::Variable { type_ref, address } => {
                self.write_ref(Some(*type_ref))?;
                self.stream.write_varint(*address)?;
            }
            NodePayload::VariableOverload { key, type_ref, address } => {
                let key = key.clone();
                self.stream.write_string(&key)?;
                self.write_ref(Some(*type_ref))?;
                self.stream.write_varint(*address)?;
            }
            NodePayload::AddressVariable { address } => {
                self.stream.write_varint(*address)?;
            }
            NodePayload::VariableGetter { entries } => {
                self.write_ref_list(entries)?;
                children.extend(entries.iter().copied());
            }
            NodePayload::AddressGetter { entries } => {
                self.stream.write_varint(entries.len() as u64)?;
                let entries = entries.clone();
                for (key, address) in entries {
                    self.stream.write_string(&key)?;
                    self.stream.write_varint(address)?;
                }
            }
            NodePayload::TypeList { items } => {
                self.stream.write_varint(items.len() as u64)?;
                let items = items.clone();
                for item in items {
                    self.write_ref(Some(item))?;
                }
            }
            NodePayload::Reference { target } | NodePayload::Redirect { target } => {
                self.write_ref(Some(*target))?;
            }
        }

        for child in children {
            self.ensure_written(child)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphBuilder, NodeKind, OverloadData};

    #[test]
    fn test_header_layout() {
        let builder = GraphBuilder::new();
        let (bytes, stats) = save_to_vec(&builder.finish()).unwrap();
        let mut stream = ByteStream::from_vec(bytes);
        assert_eq!(stream.read_i32().unwrap(), FORMAT_VERSION);
        let mut total = 0u32;
        for _ in 0..KIND_COUNT {
            total += stream.read_i32().unwrap() as u32;
        }
        assert_eq!(total, stats.total_nodes);
        // Root namespace plus the primitive table.
        assert_eq!(stats.per_kind[NodeKind::Namespace.index()], 1);
        assert!(stats.per_kind[NodeKind::NativeType.index()] > 0);
    }

    #[test]
    fn test_address_table_fully_backfilled() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let int32 = builder.native_type("int32", 7);
        builder.variable(root, "Gravity", int32, 0x2000).unwrap();
        let (bytes, stats) = save_to_vec(&builder.finish()).unwrap();

        let mut stream = ByteStream::from_vec(bytes);
        stream.seek((1 + KIND_COUNT as u64) * 4).unwrap();
        for _ in 0..stats.total_nodes {
            let offset = stream.read_i32().unwrap();
            assert!(offset > 0, "address table entry never backfilled");
        }
    }

    #[test]
    fn test_unresolved_placeholder_aborts_save() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        builder.forward_ref(root, "MissingClass").unwrap();
        let err = save_to_vec(&builder.finish()).unwrap_err();
        match err {
            WriteError::UnresolvedPlaceholders { names } => {
                assert_eq!(names, vec!["MissingClass".to_string()])
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_unwritable_node_fails_whole_save() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let int32 = builder.native_type("int32", 7);
        let func = builder.function(root, "GetValue").unwrap();
        let overload = builder
            .add_overload(func, OverloadData { address: 0x100, params: vec![int32], ..Default::default() })
            .unwrap();

        let graph = builder.finish();
        let mut unwritable = AHashSet::new();
        unwritable.insert(overload);
        let err = save_with(&graph, &unwritable).unwrap_err();
        match err {
            WriteError::UnwrittenNodes(report) => {
                assert_eq!(report.nodes.len(), 1);
                assert_eq!(report.nodes[0].kind, NodeKind::FunctionOverload);
                assert_eq!(report.nodes[0].name, "GetValue");
                assert_eq!(report.per_kind, vec![(NodeKind::FunctionOverload, 1)]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_save_is_deterministic() {
        let build = || {
            let mut builder = GraphBuilder::new();
            let root = builder.root();
            let int32 = builder.native_type("int32", 7);
            let class = builder.class(root, "Player", None).unwrap();
            builder.variable(class, "Health", int32, 0x30).unwrap();
            builder.finish()
        };
        let (a, _) = save_to_vec(&build()).unwrap();
        let (b, _) = save_to_vec(&build()).unwrap();
        assert_eq!(a, b);
    }
}
