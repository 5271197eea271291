use std::collections::HashMap;

use super::progress::Progress;
use super::transaction::{LedgerTransaction, TransactionType};
use crate::db::PaymentId;

/// A transfer between two own accounts shows up in the download of both accounts.
/// Only the first of them is kept.
#[derive(Debug, Default)]
pub struct DeduplicationFilter {
    claimed: HashMap<String, PaymentId>,
}

impl DeduplicationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&mut self, transactions: Vec<LedgerTransaction>, progress: &mut Progress) -> Vec<LedgerTransaction> {
        let start = transactions.len();
        let mut unique = Vec::with_capacity(start);
        for mut transaction in transactions {
            let Some(key) = duplicate_key(&transaction) else {
                unique.push(transaction);
                continue;
            };
            if let Some(claimed_by) = self.claimed.get(&key) {
                log::info!(
                    "Skipping bunq payment #{} because payment #{claimed_by} already is the same transfer ({key})",
                    transaction.bunq_payment_id
                );
                continue;
            }
            log::debug!("bunq payment #{} claims {key}", transaction.bunq_payment_id);
            self.claimed.insert(key, transaction.bunq_payment_id);
            transaction.datetime = None;
            unique.push(transaction);
        }
        progress.add_message(
            0,
            format!(
                "Filtered down from {start} (possibly duplicate) entries to {} unique transactions.",
                unique.len()
            ),
        );
        unique
    }
}

/// Both directions of the same transfer share a key: the lower account id comes first
fn duplicate_key(transaction: &LedgerTransaction) -> Option<String> {
    if transaction.type_ != TransactionType::Transfer {
        return None;
    }
    let datetime = transaction.datetime?;
    let source = transaction.source.id()?;
    let destination = transaction.destination.id()?;
    let (low, high) = if source <= destination {
        (source, destination)
    } else {
        (destination, source)
    };
    Some(format!(
        "{low}/{high}({:.2}){}@{}",
        transaction.amount,
        transaction.description,
        datetime.format("%Y-%m-%d %H:%M:%S")
    ))
}
