// Wed Feb 4 2026 - Alex

pub mod error;
pub mod overload;
pub mod vtable;

pub use error::DispatchError;
pub use overload::{CallContext, FunctionBinding, OverloadBinding};
pub use vtable::find_vtable_slot;
