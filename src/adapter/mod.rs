mod memory;
mod sqlite;
mod verifier;

pub use memory::*;
pub use sqlite::*;
pub use verifier::*;
