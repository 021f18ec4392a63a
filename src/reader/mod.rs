// Tue Feb 3 2026 - Alex

pub mod database;
pub mod entry;
pub mod error;
pub mod scope_view;

pub use database::Database;
pub use entry::{ClassInfo, Entry, FunctionInfo, OverloadInfo, Payload, ScopeTable};
pub use error::ReadError;
pub use scope_view::{
    AddressGetterBinding, Binding, ClassHandle, GetterBinding, LazyScope, ObjectBinding,
    VariableBinding,
};
