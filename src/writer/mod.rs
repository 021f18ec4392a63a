// Tue Feb 3 2026 - Alex

pub mod error;
pub mod save;

pub use error::{IntegrityReport, UnwrittenNode, WriteError};
pub use save::{save_to_file, save_to_vec, SaveStats, FORMAT_VERSION};
