mod account;
mod error;
mod event;
mod ledger;

pub use account::*;
pub use error::*;
pub use event::*;
pub use ledger::*;
