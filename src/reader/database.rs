// Tue Feb 3 2026 - Alex

use crate::codec::{name_hash, ByteStream};
use crate::graph::{NodeKind, ALL_KINDS, KIND_COUNT};
use crate::index::{ProbeCursor, ProbeStep, SLOT_BYTES};
use crate::reader::entry::{ClassInfo, Entry, FunctionInfo, OverloadInfo, Payload, ScopeTable};
use crate::reader::error::ReadError;
use crate::reader::scope_view::LazyScope;
use crate::types::{TypeHandle, TypeRegistry, PRIMITIVE_TYPES};
use crate::writer::FORMAT_VERSION;
use ahash::AHashMap;
use log::{debug, info};
use std::cell::RefCell;
use std::fs::File;
use std::path::Path;
use std::rc::Rc;

/// An open database. The header and address table are the only eagerly
/// loaded structures; node contents are materialized one id at a time, on
/// first access, and cached for the lifetime of the handle.
///
/// Single logical thread by design: one shared stream cursor, `RefCell`
/// caches, no locks.
pub struct Database {
    stream: RefCell<ByteStream>,
    addresses: Vec<u32>,
    counts: [u32; KIND_COUNT],
    range_starts: [u32; KIND_COUNT],
    total: u32,
    entries: RefCell<AHashMap<u32, Rc<Entry>>>,
    types: Rc<TypeRegistry>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P, types: Rc<TypeRegistry>) -> Result<Rc<Self>, ReadError> {
        let file = File::open(path.as_ref())?;
        // The database is read-only for its whole lifetime.
        let map = unsafe { memmap2::Mmap::map(&file)? };
        let db = Self::from_stream(ByteStream::from_mmap(map), types)?;
        info!("opened database {} ({} nodes)", path.as_ref().display(), db.total);
        Ok(db)
    }

    pub fn from_bytes(bytes: Vec<u8>, types: Rc<TypeRegistry>) -> Result<Rc<Self>, ReadError> {
        Self::from_stream(ByteStream::from_vec(bytes), types)
    }

    fn from_stream(mut stream: ByteStream, types: Rc<TypeRegistry>) -> Result<Rc<Self>, ReadError> {
        stream.seek(0)?;
        let version = stream.read_i32()?;
        if version != FORMAT_VERSION {
            return Err(ReadError::VersionMismatch { found: version, expected: FORMAT_VERSION });
        }

        let mut counts = [0u32; KIND_COUNT];
        for count in counts.iter_mut() {
            let raw = stream.read_i32()?;
            if raw < 0 {
                return Err(ReadError::Corrupt(format!("negative kind count {}", raw)));
            }
            *count = raw as u32;
        }

        // Mirror of the writer's id assignment: prefix sums over the
        // per-kind counts, ids starting at 1.
        let mut range_starts = [0u32; KIND_COUNT];
        let mut next = 1u32;
        for (k, &count) in counts.iter().enumerate() {
            range_starts[k] = next;
            next += count;
        }
        let total = next - 1;

        let mut addresses = Vec::with_capacity(total as usize);
        for _ in 0..total {
            let raw = stream.read_i32()?;
            if raw <= 0 {
                return Err(ReadError::Corrupt(format!("address table holds {}", raw)));
            }
            addresses.push(raw as u32);
        }

        let db = Self {
            stream: RefCell::new(stream),
            addresses,
            counts,
            range_starts,
            total,
            entries: RefCell::new(AHashMap::new()),
            types,
        };

        // The fixed primitive list resolves by id with no file read.
        let native_start = db.range_starts[NodeKind::NativeType.index()];
        let native_count = db.counts[NodeKind::NativeType.index()] as usize;
        {
            let mut entries = db.entries.borrow_mut();
            for (i, &(name, type_id, _)) in
                PRIMITIVE_TYPES.iter().enumerate().take(native_count)
            {
                let id = native_start + i as u32;
                entries.insert(
                    id,
                    Rc::new(Entry::preloaded(
                        id,
                        NodeKind::NativeType,
                        name.to_string(),
                        Payload::NativeType { type_id },
                    )),
                );
            }
        }

        Ok(Rc::new(db))
    }

    pub fn node_count(&self) -> u32 {
        self.total
    }

    pub fn count_of(&self, kind: NodeKind) -> u32 {
        self.counts[kind.index()]
    }

    pub fn types(&self) -> &Rc<TypeRegistry> {
        &self.types
    }

    /// Kind is derived from the id's range, never stored per node.
    pub fn kind_of(&self, id: u32) -> Result<NodeKind, ReadError> {
        if id == 0 || id > self.total {
            return Err(ReadError::Corrupt(format!("node id {} out of range", id)));
        }
        for (k, &start) in self.range_starts.iter().enumerate().rev() {
            if id >= start && self.counts[k] > 0 && id < start + self.counts[k] {
                return Ok(ALL_KINDS[k]);
            }
        }
        Err(ReadError::Corrupt(format!("node id {} outside every kind range", id)))
    }

    fn address_of(&self, id: u32) -> Result<u64, ReadError> {
        let addr = *self
            .addresses
            .get(id as usize - 1)
            .ok_or_else(|| ReadError::Corrupt(format!("node id {} out of range", id)))?;
        let len = self.stream.borrow().len();
        if (addr as u64) >= len {
            return Err(ReadError::Corrupt(format!(
                "node {} address 0x{:x} past end of file",
                id, addr
            )));
        }
        Ok(addr as u64)
    }

    /// Materialize the description (kind + name) of `id`, reading at most
    /// its name from the file. Idempotent: one entry per distinct id.
    pub fn entry(&self, id: u32) -> Result<Rc<Entry>, ReadError> {
        if let Some(entry) = self.entries.borrow().get(&id) {
            return Ok(entry.clone());
        }
        let kind = self.kind_of(id)?;
        let addr = self.address_of(id)?;
        let (name, content_pos) = {
            let mut stream = self.stream.borrow_mut();
            let saved = stream.position();
            stream.seek(addr)?;
            let name = stream.read_string()?;
            let content_pos = stream.position();
            stream.seek(saved)?;
            (name, content_pos)
        };
        debug!("materialized node {} ({} '{}')", id, kind, name);
        let entry = Rc::new(Entry::new(id, kind, name, content_pos));
        self.entries.borrow_mut().insert(id, entry.clone());
        Ok(entry)
    }

    /// Parse (once) and return the entry's kind-specific payload.
    pub fn payload(&self, entry: &Entry) -> Result<Rc<Payload>, ReadError> {
        if let Some(payload) = entry.payload.borrow().as_ref() {
            return Ok(payload.clone());
        }
        let payload = Rc::new(self.parse_payload(entry)?);
        *entry.payload.borrow_mut() = Some(payload.clone());
        Ok(payload)
    }

    fn parse_payload(&self, entry: &Entry) -> Result<Payload, ReadError> {
        let mut stream = self.stream.borrow_mut();
        let saved = stream.position();
        stream.seek(entry.content_pos)?;
        let result = parse_payload_at(&mut stream, entry.kind, entry.id);
        let _ = stream.seek(saved);
        result
    }

    /// Probe a scope table for `name`. Compares the stored hash first and
    /// the stored name second; a colliding hash with a different name
    /// keeps probing. `Ok(None)` means genuinely absent.
    pub fn lookup(&self, table: &ScopeTable, name: &str) -> Result<Option<u32>, ReadError> {
        if table.len == 0 {
            return Ok(None);
        }
        let hash = name_hash(name);
        let mut cursor = ProbeCursor::start(table.table_pos, table.len, hash);
        loop {
            let step = {
                let mut stream = self.stream.borrow_mut();
                let saved = stream.position();
                let step = cursor.step(&mut stream, hash);
                let _ = stream.seek(saved);
                step?
            };
            match step {
                ProbeStep::Candidate { id, next } => {
                    if id > self.total {
                        return Err(ReadError::Corrupt(format!(
                            "scope slot holds id {} beyond node count {}",
                            id, self.total
                        )));
                    }
                    // Hash matched; only now pay for the name comparison.
                    let candidate = self.entry(id)?;
                    if candidate.name == name {
                        return Ok(Some(id));
                    }
                    cursor = next;
                }
                ProbeStep::NotFound => return Ok(None),
            }
        }
    }

    /// Every id stored in a scope table, insertion order not preserved
    /// (slot order). Used by the dump surface.
    pub fn scope_ids(&self, table: &ScopeTable) -> Result<Vec<u32>, ReadError> {
        let mut stream = self.stream.borrow_mut();
        let saved = stream.position();
        let mut ids = Vec::new();
        for slot in 0..table.len {
            stream.seek(table.table_pos + slot as u64 * SLOT_BYTES)?;
            let id = stream.read_u32()?;
            stream.read_u32()?;
            if id != 0 {
                ids.push(id);
            }
        }
        let _ = stream.seek(saved);
        Ok(ids)
    }

    /// Follow redirect aliases until a concrete node. Bounded so a
    /// corrupt cycle cannot hang the caller.
    pub fn resolve_id(&self, mut id: u32) -> Result<u32, ReadError> {
        for _ in 0..64 {
            if id == 0 || self.kind_of(id)? != NodeKind::Redirect {
                return Ok(id);
            }
            let entry = self.entry(id)?;
            match &*self.payload(&entry)? {
                Payload::Redirect { target } => id = *target,
                _ => unreachable!("redirect id parsed to non-redirect payload"),
            }
        }
        Err(ReadError::Corrupt("redirect chain exceeds 64 links".to_string()))
    }

    /// The deferred overload-id list of a function, read on first use.
    pub fn function_overload_ids(&self, info: &FunctionInfo) -> Result<Rc<Vec<u32>>, ReadError> {
        if let Some(ids) = info.overloads.borrow().as_ref() {
            return Ok(ids.clone());
        }
        let ids = {
            let mut stream = self.stream.borrow_mut();
            let saved = stream.position();
            stream.seek(info.list_pos)?;
            let ids = read_ref_list(&mut stream);
            let _ = stream.seek(saved);
            Rc::new(ids?)
        };
        *info.overloads.borrow_mut() = Some(ids.clone());
        Ok(ids)
    }

    /// Resolve a type reference (a native-type node id, possibly behind a
    /// redirect) to the registered runtime type.
    pub fn type_info(&self, id: u32) -> Result<TypeHandle, ReadError> {
        let id = self.resolve_id(id)?;
        let entry = self.entry(id)?;
        match &*self.payload(&entry)? {
            Payload::NativeType { type_id } => {
                self.types.get(*type_id).ok_or(ReadError::UnknownTypeId(*type_id))
            }
            _ => Err(ReadError::KindMismatch {
                id,
                expected: "native-type",
                found: entry.kind,
            }),
        }
    }

    pub fn opt_type_info(&self, id: u32) -> Result<Option<TypeHandle>, ReadError> {
        if id == 0 {
            return Ok(None);
        }
        self.type_info(id).map(Some)
    }

    /// The root namespace: the first namespace the writer discovered.
    pub fn root(self: &Rc<Self>) -> Result<LazyScope, ReadError> {
        if self.counts[NodeKind::Namespace.index()] == 0 {
            return Err(ReadError::Corrupt("database has no root namespace".to_string()));
        }
        let root_id = self.range_starts[NodeKind::Namespace.index()];
        let entry = self.entry(root_id)?;
        match &*self.payload(&entry)? {
            Payload::Namespace { scope } => Ok(LazyScope::new(self.clone(), *scope)),
            _ => Err(ReadError::KindMismatch {
                id: root_id,
                expected: "namespace",
                found: entry.kind,
            }),
        }
    }
}

fn read_ref_list(stream: &mut ByteStream) -> Result<Vec<u32>, ReadError> {
    let mut out = Vec::new();
    loop {
        let id = stream.read_varint()? as u32;
        if id == 0 {
            return Ok(out);
        }
        out.push(id);
    }
}

fn read_scope_table(stream: &mut ByteStream) -> Result<ScopeTable, ReadError> {
    let len = stream.read_varint()? as u32;
    let table_pos = stream.position();
    // Skip the slots; lookups come back to table_pos later.
    stream.seek(table_pos + len as u64 * SLOT_BYTES)?;
    Ok(ScopeTable { table_pos, len })
}

fn read_class_fields(stream: &mut ByteStream) -> Result<ClassInfo, ReadError> {
    let parent = stream.read_varint()? as u32;
    let statics = read_scope_table(stream)?;
    let constructor = stream.read_varint()? as u32;
    let properties = read_ref_list(stream)?;
    Ok(ClassInfo { parent, statics, constructor, properties })
}

/// Counts read from the file drive list parsing but must never drive
/// allocation: a corrupt count still only preallocates this much.
const MAX_PREALLOC: usize = 1024;

fn parse_payload_at(stream: &mut ByteStream, kind: NodeKind, id: u32) -> Result<Payload, ReadError> {
    match kind {
        NodeKind::Null => Err(ReadError::Corrupt(format!("null node {} has no content", id))),
        NodeKind::NativeType => {
            Ok(Payload::NativeType { type_id: stream.read_varint()? as u32 })
        }
        NodeKind::Class => Ok(Payload::Class(Rc::new(read_class_fields(stream)?))),
        NodeKind::ClassTemplate => {
            let class = Rc::new(read_class_fields(stream)?);
            let params = stream.read_varint()? as u32;
            let count = stream.read_varint()? as usize;
            let mut specializations = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                let key = stream.read_string()?;
                let target = stream.read_varint()? as u32;
                specializations.push((key, target));
            }
            Ok(Payload::ClassTemplate { class, params, specializations })
        }
        NodeKind::TemplateInstantiation => {
            let template = stream.read_varint()? as u32;
            let key = stream.read_string()?;
            let class = Rc::new(read_class_fields(stream)?);
            Ok(Payload::TemplateInstantiation { template, key, class })
        }
        NodeKind::Namespace => {
            Ok(Payload::Namespace { scope: read_scope_table(stream)? })
        }
        NodeKind::StaticObject => {
            let type_ref = stream.read_varint()? as u32;
            let address = stream.read_varint()?;
            Ok(Payload::StaticObject { type_ref, address })
        }
        NodeKind::Function => {
            // Defer the overload list; remember where it starts.
            Ok(Payload::Function(Rc::new(FunctionInfo {
                list_pos: stream.position(),
                overloads: RefCell::new(None),
            })))
        }
        NodeKind::FunctionOverload => {
            let address = stream.read_varint()?;
            let flags = stream.read_packed_bools(2)?;
            let receiver = stream.read_varint()? as u32;
            let template_key = if flags[1] { Some(stream.read_string()?) } else { None };
            let return_type = stream.read_varint()? as u32;
            let count = stream.read_varint()? as usize;
            let mut params = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                params.push(stream.read_varint()? as u32);
            }
            Ok(Payload::FunctionOverload(Rc::new(OverloadInfo {
                address,
                returns_via_out: flags[0],
                receiver,
                template_key,
                return_type,
                params,
            })))
        }
        NodeKind::FunctionType => {
            let return_type = stream.read_varint()? as u32;
            let count = stream.read_varint()? as usize;
            let mut params = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                params.push(stream.read_varint()? as u32);
            }
            Ok(Payload::FunctionType { return_type, params })
        }
        NodeKind::Variable => {
            let type_ref = stream.read_varint()? as u32;
            let address = stream.read_varint()?;
            Ok(Payload::Variable { type_ref, address })
        }
        NodeKind::VariableOverload => {
            let key = stream.read_string()?;
            let type_ref = stream.read_varint()? as u32;
            let address = stream.read_varint()?;
            Ok(Payload::VariableOverload { key, type_ref, address })
        }
        NodeKind::AddressVariable => {
            Ok(Payload::AddressVariable { address: stream.read_varint()? })
        }
        NodeKind::VariableGetter => {
            Ok(Payload::VariableGetter { entries: read_ref_list(stream)? })
        }
        NodeKind::AddressGetter => {
            let count = stream.read_varint()? as usize;
            let mut entries = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                let key = stream.read_string()?;
                let address = stream.read_varint()?;
                entries.push((key, address));
            }
            Ok(Payload::AddressGetter { entries })
        }
        NodeKind::TypeList => {
            let count = stream.read_varint()? as usize;
            let mut items = Vec::with_capacity(count.min(MAX_PREALLOC));
            for _ in 0..count {
                items.push(stream.read_varint()? as u32);
            }
            Ok(Payload::TypeList { items })
        }
        NodeKind::Reference => {
            Ok(Payload::Reference { target: stream.read_varint()? as u32 })
        }
        NodeKind::Redirect => {
            Ok(Payload::Redirect { target: stream.read_varint()? as u32 })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::reader::Binding;
    use crate::types::TemplateArg;
    use crate::writer::save_to_vec;

    fn reopen(builder: GraphBuilder) -> Rc<Database> {
        let (bytes, _) = save_to_vec(&builder.finish()).unwrap();
        Database::from_bytes(bytes, Rc::new(TypeRegistry::new())).unwrap()
    }

    #[test]
    fn test_round_trip_resolves_nested_paths() {
        let mut builder = GraphBuilder::new();
        let float = builder.native_type("float", 11);
        let engine = builder.namespace_path(&["Engine"]).unwrap();
        let actor = builder.class(engine, "Actor", None).unwrap();
        builder.class(engine, "Player", Some(actor)).unwrap();
        builder.variable(engine, "Gravity", float, 0x2000).unwrap();

        let db = reopen(builder);
        let root = db.root().unwrap();
        match root.resolve_path(&["Engine", "Gravity"]).unwrap() {
            Some(Binding::Variable(var)) => {
                assert_eq!(var.address, 0x2000);
                assert_eq!(var.type_info.name(), "float");
            }
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        }
        match root.resolve_path(&["Engine", "Player"]).unwrap() {
            Some(Binding::Class(player)) => {
                assert_eq!(player.name(), "Player");
                assert_eq!(player.parent().unwrap().unwrap().name(), "Actor");
            }
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        }
        assert!(root.resolve("Nothing").unwrap().is_none());
    }

    #[test]
    fn test_materialization_is_idempotent() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let int32 = builder.native_type("int32", 7);
        builder.variable(root, "Counter", int32, 0x10).unwrap();
        let db = reopen(builder);

        let id = db.lookup(&root_table(&db), "Counter").unwrap().unwrap();
        let first = db.entry(id).unwrap();
        let second = db.entry(id).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        let p1 = db.payload(&first).unwrap();
        let p2 = db.payload(&second).unwrap();
        assert!(Rc::ptr_eq(&p1, &p2));
    }

    fn root_table(db: &Rc<Database>) -> ScopeTable {
        let root_id = db.range_starts[NodeKind::Namespace.index()];
        let entry = db.entry(root_id).unwrap();
        match &*db.payload(&entry).unwrap() {
            Payload::Namespace { scope } => *scope,
            _ => panic!("root is not a namespace"),
        }
    }

    #[test]
    fn test_many_names_resolve_despite_probe_chains() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let int32 = builder.native_type("int32", 7);
        for i in 0..200u64 {
            builder.variable(root, &format!("Symbol{}", i), int32, 0x1000 + i).unwrap();
        }
        let db = reopen(builder);
        let root = db.root().unwrap();
        for i in 0..200u64 {
            match root.resolve(&format!("Symbol{}", i)).unwrap() {
                Some(Binding::Variable(var)) => assert_eq!(var.address, 0x1000 + i),
                other => panic!("Symbol{} became {:?}", i, other.map(|b| b.kind_name())),
            }
        }
        assert!(root.resolve("Symbol200").unwrap().is_none());
    }

    #[test]
    fn test_version_mismatch_rejected_outright() {
        let builder = GraphBuilder::new();
        let (mut bytes, _) = save_to_vec(&builder.finish()).unwrap();
        bytes[0] = bytes[0].wrapping_add(1);
        match Database::from_bytes(bytes, Rc::new(TypeRegistry::new())) {
            Err(ReadError::VersionMismatch { found, expected }) => {
                assert_eq!(found, FORMAT_VERSION + 1);
                assert_eq!(expected, FORMAT_VERSION);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("mismatched version was accepted"),
        }
    }

    #[test]
    fn test_malformed_image_is_an_error_not_a_panic() {
        let builder = GraphBuilder::new();
        let (bytes, _) = save_to_vec(&builder.finish()).unwrap();
        // Truncated mid address table.
        let cut = bytes[..(1 + KIND_COUNT) * 4 + 2].to_vec();
        assert!(Database::from_bytes(cut, Rc::new(TypeRegistry::new())).is_err());
    }

    #[test]
    fn test_recorded_specialization_found_after_reopen() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let template = builder.class_template(root, "Array", None).unwrap();
        builder.specialize(template, &[TemplateArg::Type(7)]).unwrap();
        let db = reopen(builder);

        let template = match db.root().unwrap().resolve("Array").unwrap() {
            Some(Binding::Class(c)) => c,
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        };
        assert!(template.is_template());
        let a = template.make(&[TemplateArg::Type(7)]).unwrap();
        assert_eq!(a.name(), "Array<t7>");
        assert!(!a.is_template());

        // Repeated instantiation returns the cached handle.
        let b = template.make(&[TemplateArg::Type(7)]).unwrap();
        assert_eq!(a.node_id(), b.node_id());
        assert_eq!(b.name(), "Array<t7>");

        // Unrecorded arguments still produce a usable runtime view.
        let c = template.make(&[TemplateArg::Int(4)]).unwrap();
        assert_eq!(c.name(), "Array<i4>");
    }

    #[test]
    fn test_placeholder_resolved_before_save_round_trips() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let forward = builder.forward_ref(root, "Lazy").unwrap();
        let defined = builder.class(root, "Lazy", None).unwrap();
        assert_eq!(forward, defined);
        let db = reopen(builder);
        match db.root().unwrap().resolve("Lazy").unwrap() {
            Some(Binding::Class(class)) => assert_eq!(class.name(), "Lazy"),
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        }
    }

    #[test]
    fn test_redirect_alias_resolves_to_target() {
        let mut builder = GraphBuilder::new();
        let root = builder.root();
        let class = builder.class(root, "Workspace", None).unwrap();
        builder.alias(root, "World", class).unwrap();
        let db = reopen(builder);
        match db.root().unwrap().resolve("World").unwrap() {
            Some(Binding::Class(class)) => assert_eq!(class.name(), "Workspace"),
            other => panic!("unexpected binding {:?}", other.map(|b| b.kind_name())),
        }
    }
}
