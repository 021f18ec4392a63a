// Tue Feb 3 2026 - Alex

use crate::codec::CodecError;
use crate::graph::NodeKind;
use std::fmt;
use thiserror::Error;

/// One node left with a sentinel address after the completion sweep.
#[derive(Debug, Clone)]
pub struct UnwrittenNode {
    pub id: u32,
    pub kind: NodeKind,
    pub name: String,
}

/// Post-sweep integrity failure report: the offending nodes plus a
/// per-kind failure count.
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub nodes: Vec<UnwrittenNode>,
    pub per_kind: Vec<(NodeKind, u32)>,
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} node(s) never written:", self.nodes.len())?;
        for node in &self.nodes {
            write!(f, " [{} {} '{}']", node.kind, node.id, node.name)?;
        }
        write!(f, "; failures by kind:")?;
        for (kind, count) in &self.per_kind {
            write!(f, " {}={}", kind, count)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Encoding error: {0}")]
    Codec(#[from] CodecError),
    #[error("Unresolved placeholders: {}", names.join(", "))]
    UnresolvedPlaceholders { names: Vec<String> },
    #[error("Save aborted, database would be incomplete: {0}")]
    UnwrittenNodes(IntegrityReport),
    #[error("File offset 0x{offset:x} for node '{name}' exceeds the address table width")]
    AddressOverflow { name: String, offset: u64 },
}
