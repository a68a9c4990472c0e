mod boot;
mod ledger;
mod mock;
mod orchestrator;
mod webhook;

pub use boot::*;
pub use ledger::*;
pub use mock::*;
pub use orchestrator::*;
pub use webhook::*;
