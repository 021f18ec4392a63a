// Mon Feb 2 2026 - Alex

pub mod error;
pub mod name_hash;
pub mod stream;

pub use error::CodecError;
pub use name_hash::name_hash;
pub use stream::ByteStream;
