// Mon Feb 2 2026 - Alex

use crate::graph::node::NodeKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Name collision in scope: '{name}' already defined as {existing}")]
    NameCollision { name: String, existing: NodeKind },
    #[error("Node is not a scope owner: {kind}")]
    NotAScope { kind: NodeKind },
    #[error("Node is not a class template: {kind}")]
    NotATemplate { kind: NodeKind },
    #[error("Node is not a function: {kind}")]
    NotAFunction { kind: NodeKind },
    #[error("Empty path")]
    EmptyPath,
}
