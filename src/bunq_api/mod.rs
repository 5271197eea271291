mod accounts;
mod client;
mod payments;

pub use accounts::MonetaryAccount;
pub use client::{Bunq, SourceApi};
pub use payments::{DateFilter, PaymentFetcher, PaymentPage, MAX_PAGES, PAGE_SIZE};
