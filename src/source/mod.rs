// Thu Feb 5 2026 - Alex

use crate::graph::{GraphBuilder, GraphError, NodeRef, OverloadData};
use crate::types::{primitive_id, FIRST_USER_TYPE_ID, PRIMITIVE_TYPES};
use ahash::AHashMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed symbol dump: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
    #[error("Unknown type '{name}' referenced by '{path}'")]
    UnknownType { name: String, path: String },
    #[error("Bad symbol path '{0}'")]
    BadPath(String),
    #[error("Type '{name}' uses reserved id {id}; user ids start at {}", FIRST_USER_TYPE_ID)]
    ReservedTypeId { name: String, id: u32 },
}

/// A symbol dump as produced by an offline extraction pass: flat record
/// lists keyed by dot-separated paths. Every section is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SymbolDump {
    #[serde(default)]
    pub types: Vec<TypeRecord>,
    #[serde(default)]
    pub classes: Vec<ClassRecord>,
    #[serde(default)]
    pub functions: Vec<FunctionRecord>,
    #[serde(default)]
    pub variables: Vec<VariableRecord>,
    #[serde(default)]
    pub objects: Vec<ObjectRecord>,
    #[serde(default)]
    pub getters: Vec<GetterRecord>,
    #[serde(default)]
    pub address_getters: Vec<AddressGetterRecord>,
}

/// A named native type beyond the built-in primitive set.
#[derive(Debug, Serialize, Deserialize)]
pub struct TypeRecord {
    pub name: String,
    pub id: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassRecord {
    pub path: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub constructor: Vec<OverloadRecord>,
    #[serde(default)]
    pub methods: Vec<MethodRecord>,
    #[serde(default)]
    pub statics: Vec<MemberRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MethodRecord {
    pub name: String,
    pub overloads: Vec<OverloadRecord>,
}

/// A typed data member inside a class's static scope.
#[derive(Debug, Serialize, Deserialize)]
pub struct MemberRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub address: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub path: String,
    pub overloads: Vec<OverloadRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OverloadRecord {
    pub address: u64,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub returns_via_out: bool,
    #[serde(default)]
    pub template_key: Option<String>,
}

/// A typed variable, or a bare address when `type` is omitted.
#[derive(Debug, Serialize, Deserialize)]
pub struct VariableRecord {
    pub path: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    pub address: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub path: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub address: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetterRecord {
    pub path: String,
    pub entries: Vec<GetterEntryRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetterEntryRecord {
    pub key: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub address: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddressGetterRecord {
    pub path: String,
    pub entries: Vec<(String, u64)>,
}

/// Something that can populate a graph with symbols. The offline builder
/// takes one of these; the JSON dump below is the stock implementation.
pub trait SymbolSource {
    fn populate(&self, builder: &mut GraphBuilder) -> Result<(), SourceError>;
}

pub struct JsonSymbolSource {
    dump: SymbolDump,
}

impl JsonSymbolSource {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn from_json(data: &str) -> Result<Self, SourceError> {
        Ok(Self { dump: serde_json::from_str(data)? })
    }

    pub fn new(dump: SymbolDump) -> Self {
        Self { dump }
    }
}

impl SymbolSource for JsonSymbolSource {
    fn populate(&self, builder: &mut GraphBuilder) -> Result<(), SourceError> {
        let mut session = PopulateSession {
            builder,
            types: AHashMap::new(),
            classes: AHashMap::new(),
        };
        session.run(&self.dump)
    }
}

struct PopulateSession<'a> {
    builder: &'a mut GraphBuilder,
    types: AHashMap<String, NodeRef>,
    classes: AHashMap<String, NodeRef>,
}

impl<'a> PopulateSession<'a> {
    fn run(&mut self, dump: &SymbolDump) -> Result<(), SourceError> {
        for &(name, id, _) in PRIMITIVE_TYPES {
            let node = self.builder.native_type(name, id);
            self.types.insert(name.to_string(), node);
        }
        for record in &dump.types {
            // Redeclaring a primitive is harmless; colliding with the
            // reserved id space is not.
            if primitive_id(&record.name) == Some(record.id) {
                continue;
            }
            if record.id < FIRST_USER_TYPE_ID {
                return Err(SourceError::ReservedTypeId {
                    name: record.name.clone(),
                    id: record.id,
                });
            }
            let node = self.builder.native_type(&record.name, record.id);
            self.types.insert(record.name.clone(), node);
        }

        // Classes first, parents backfilled second, so declaration order
        // in the dump never matters.
        for record in &dump.classes {
            let (scope, name) = self.scope_of(&record.path)?;
            let node = self.builder.class(scope, name, None)?;
            self.classes.insert(record.path.clone(), node);
        }
        for record in &dump.classes {
            self.populate_class(record)?;
        }

        for record in &dump.functions {
            let (scope, name) = self.scope_of(&record.path)?;
            let function = self.builder.function(scope, name)?;
            for overload in &record.overloads {
                let data = self.overload_data(&record.path, overload, None)?;
                self.builder.add_overload(function, data)?;
            }
        }

        for record in &dump.variables {
            let (scope, name) = self.scope_of(&record.path)?;
            match &record.type_name {
                Some(type_name) => {
                    let type_ref = self.type_ref(type_name, &record.path)?;
                    self.builder.variable(scope, name, type_ref, record.address)?;
                }
                None => {
                    self.builder.address_variable(scope, name, record.address)?;
                }
            }
        }

        for record in &dump.objects {
            let (scope, name) = self.scope_of(&record.path)?;
            let type_ref = self.type_ref(&record.type_name, &record.path)?;
            self.builder.static_object(scope, name, type_ref, record.address)?;
        }

        for record in &dump.getters {
            let (scope, name) = self.scope_of(&record.path)?;
            let mut entries = Vec::with_capacity(record.entries.len());
            for entry in &record.entries {
                let type_ref = self.type_ref(&entry.type_name, &record.path)?;
                entries.push((entry.key.clone(), type_ref, entry.address));
            }
            self.builder.variable_getter(scope, name, &entries)?;
        }

        for record in &dump.address_getters {
            let (scope, name) = self.scope_of(&record.path)?;
            self.builder.address_getter(scope, name, record.entries.clone())?;
        }

        info!(
            "populated {} classes, {} functions, {} variables from symbol dump",
            dump.classes.len(),
            dump.functions.len(),
            dump.variables.len()
        );
        Ok(())
    }

    fn populate_class(&mut self, record: &ClassRecord) -> Result<(), SourceError> {
        let class = self.classes[&record.path];
        if let Some(parent_path) = &record.parent {
            let parent = match self.classes.get(parent_path) {
                Some(&parent) => parent,
                None => {
                    // A parent outside the dump still gets a class node at
                    // its declared path.
                    debug!("implicit parent class '{}'", parent_path);
                    let (scope, name) = self.scope_of(parent_path)?;
                    let parent = self.builder.class(scope, name, None)?;
                    self.classes.insert(parent_path.clone(), parent);
                    parent
                }
            };
            self.builder.class_parent(class, parent)?;
        }

        if !record.constructor.is_empty() {
            let ctor = self.builder.constructor(class)?;
            for overload in &record.constructor {
                let data = self.overload_data(&record.path, overload, Some(class))?;
                self.builder.add_overload(ctor, data)?;
            }
        }
        for method in &record.methods {
            let function = self.builder.method(class, &method.name)?;
            for overload in &method.overloads {
                let data = self.overload_data(&record.path, overload, Some(class))?;
                self.builder.add_overload(function, data)?;
            }
        }
        for member in &record.statics {
            let type_ref = self.type_ref(&member.type_name, &record.path)?;
            self.builder.variable(class, &member.name, type_ref, member.address)?;
        }
        Ok(())
    }

    fn overload_data(
        &mut self,
        path: &str,
        record: &OverloadRecord,
        receiver: Option<NodeRef>,
    ) -> Result<OverloadData, SourceError> {
        let mut params = Vec::with_capacity(record.params.len());
        for param in &record.params {
            params.push(self.type_ref(param, path)?);
        }
        let return_type = match &record.returns {
            Some(name) => Some(self.type_ref(name, path)?),
            None => None,
        };
        Ok(OverloadData {
            address: record.address,
            params,
            return_type,
            receiver,
            returns_via_out: record.returns_via_out,
            template_key: record.template_key.clone(),
        })
    }

    fn type_ref(&self, name: &str, path: &str) -> Result<NodeRef, SourceError> {
        if let Some(&node) = self.types.get(name) {
            return Ok(node);
        }
        // A class is a legitimate parameter/return type.
        if let Some(&node) = self.classes.get(name) {
            return Ok(node);
        }
        Err(SourceError::UnknownType { name: name.to_string(), path: path.to_string() })
    }

    /// Split `A.B.Name` into its namespace chain (created on demand) and
    /// the final component.
    fn scope_of<'p>(&mut self, path: &'p str) -> Result<(NodeRef, &'p str), SourceError> {
        let mut parts: Vec<&str> = path.split('.').collect();
        let name = match parts.pop() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(SourceError::BadPath(path.to_string())),
        };
        if parts.iter().any(|p| p.is_empty()) {
            return Err(SourceError::BadPath(path.to_string()));
        }
        let scope = self.builder.namespace_path(&parts)?;
        Ok((scope, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    const DUMP: &str = r#"{
        "classes": [
            {
                "path": "Engine.Player",
                "parent": "Engine.Actor",
                "methods": [
                    { "name": "GetHealth", "overloads": [ { "address": 256, "returns": "float" } ] }
                ],
                "statics": [ { "name": "MaxHealth", "type": "float", "address": 512 } ]
            },
            { "path": "Engine.Actor" }
        ],
        "functions": [
            { "path": "Engine.Spawn", "overloads": [
                { "address": 768, "params": ["cstring"], "returns": "pointer" },
                { "address": 1024, "params": ["int32"], "returns": "pointer" }
            ] }
        ],
        "variables": [
            { "path": "Engine.Gravity", "type": "float", "address": 2048 },
            { "path": "Engine.RawMarker", "address": 4096 }
        ]
    }"#;

    #[test]
    fn test_populates_builder_from_json() {
        let source = JsonSymbolSource::from_json(DUMP).unwrap();
        let mut builder = GraphBuilder::new();
        source.populate(&mut builder).unwrap();
        let graph = builder.finish();
        assert!(graph.unresolved_placeholders().is_empty());

        let mut kinds = std::collections::HashMap::new();
        for i in 0..graph.len() {
            let kind = graph.node(crate::graph::NodeRef(i as u32)).kind();
            *kinds.entry(kind).or_insert(0u32) += 1;
        }
        assert_eq!(kinds[&NodeKind::Class], 2);
        assert_eq!(kinds[&NodeKind::FunctionOverload], 3);
        assert_eq!(kinds[&NodeKind::AddressVariable], 1);
    }

    #[test]
    fn test_unknown_type_is_reported_with_path() {
        let dump = r#"{ "variables": [ { "path": "X", "type": "quaternion", "address": 1 } ] }"#;
        let source = JsonSymbolSource::from_json(dump).unwrap();
        let mut builder = GraphBuilder::new();
        let err = source.populate(&mut builder).unwrap_err();
        match err {
            SourceError::UnknownType { name, path } => {
                assert_eq!(name, "quaternion");
                assert_eq!(path, "X");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_path_component_rejected() {
        let dump = r#"{ "variables": [ { "path": "A..B", "address": 1 } ] }"#;
        let source = JsonSymbolSource::from_json(dump).unwrap();
        let mut builder = GraphBuilder::new();
        assert!(matches!(
            source.populate(&mut builder),
            Err(SourceError::BadPath(_))
        ));
    }
}
