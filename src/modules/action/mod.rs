pub mod ledger;
pub mod publisher;

pub use ledger::{Ledger, LedgerStore};
pub use publisher::{PostRecord, Publisher, XPublisher};
