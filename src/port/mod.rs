mod event_store;
mod ledger_store;
mod verifier;

pub use event_store::*;
pub use ledger_store::*;
pub use verifier::*;
