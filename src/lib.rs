// Mon Feb 2 2026 - Alex

pub mod codec;
pub mod config;
pub mod dispatch;
pub mod ffi;
pub mod graph;
pub mod index;
pub mod reader;
pub mod source;
pub mod types;
pub mod utils;
pub mod writer;

pub use config::Config;
pub use dispatch::{CallContext, DispatchError, FunctionBinding, OverloadBinding};
pub use graph::{Graph, GraphBuilder, GraphError, NodeKind, NodeRef};
pub use reader::{Binding, ClassHandle, Database, LazyScope, ReadError};
pub use source::{JsonSymbolSource, SymbolSource};
pub use types::{TemplateArg, TypeRegistry, Value};
pub use writer::{save_to_file, save_to_vec, SaveStats, WriteError};
