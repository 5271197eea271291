mod classify;
mod counter_parties;
mod filter;
mod progress;
mod resolver;
mod routine;
mod submit;
mod transaction;

pub use classify::{resolve_transaction_type, TransactionClassifier};
pub use counter_parties::counter_parties;
pub use filter::DeduplicationFilter;
pub use progress::Progress;
pub use resolver::{AccountResolver, ResolvedAccount, TargetAccountIndex};
pub use routine::RoutineManager;
pub use submit::{SubmissionResult, Submitter};
pub use transaction::{AccountRef, LedgerTransaction, TransactionType};
