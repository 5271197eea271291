mod accounts;
mod client;
mod transactions;

pub use accounts::{mapping_candidates, AccountKind, LedgerAccount, LedgerAccountId};
pub use client::{Firefly, LedgerApi, ServerInfo};
pub use transactions::StoredTransaction;
