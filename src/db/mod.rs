mod download;
mod identifier;
mod job_status;
mod payment;
mod store;

pub use download::{Download, DownloadStore};
pub use identifier::{generate_identifier, JobId};
pub use job_status::{JobState, JobStatus, JobStatusStore, Lines};
pub use payment::{bunq_timestamp, mapping_key, BunqAccountId, CounterParty, PaymentId, RawPayment};
pub use store::{FileStore, KeyValueStore, MemoryStore};
