use anyhow::{ensure, Result};
use rust_decimal::Decimal;

use super::progress::Progress;
use super::transaction::{AccountRef, LedgerTransaction};
use crate::firefly_api::{LedgerApi, StoredTransaction};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    /// Line of the bunq payment this transaction came from
    pub index: usize,
    pub outcome: Result<StoredTransaction, String>,
}

/// Posts transactions to Firefly III one by one
pub struct Submitter<'a, L: LedgerApi> {
    ledger: &'a L,
}

impl<'a, L: LedgerApi> Submitter<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    pub async fn send(&self, transactions: &[LedgerTransaction], progress: &mut Progress) -> Vec<SubmissionResult> {
        log::info!("Sending {} transactions to Firefly III...", transactions.len());
        let mut results = Vec::with_capacity(transactions.len());
        for transaction in transactions {
            let index = transaction.line;
            let outcome = match self.send_one(transaction).await {
                Ok(stored) => {
                    log::info!(
                        "Created transaction group #{} for bunq payment #{}",
                        stored.group_id,
                        transaction.bunq_payment_id
                    );
                    progress.add_message(
                        index,
                        format!(
                            "Created {} #{} \"{}\" ({} {})",
                            transaction.type_,
                            stored.journal_ids.first().unwrap_or(&stored.group_id),
                            transaction.description,
                            transaction.currency_code,
                            transaction.amount,
                        ),
                    );
                    Ok(stored)
                }
                Err(err) => {
                    let error = format!("{err:#}");
                    log::error!("Could not store bunq payment #{}: {error}", transaction.bunq_payment_id);
                    progress.add_error(index, error.clone());
                    Err(error)
                }
            };
            results.push(SubmissionResult { index, outcome });
        }
        log::info!("Sending {} transactions to Firefly III...done", transactions.len());
        results
    }

    async fn send_one(&self, transaction: &LedgerTransaction) -> Result<StoredTransaction> {
        check(transaction)?;
        self.ledger.store_transaction(transaction).await
    }
}

fn check(transaction: &LedgerTransaction) -> Result<()> {
    ensure!(
        transaction.amount > Decimal::ZERO,
        "Transaction amount must be positive, got {}",
        transaction.amount
    );
    ensure!(
        !transaction.currency_code.trim().is_empty(),
        "Transaction has no currency"
    );
    for side in [&transaction.source, &transaction.destination] {
        if let AccountRef::Unresolved { name, .. } = side {
            ensure!(!name.trim().is_empty(), "Transaction has an account without name");
        }
    }
    Ok(())
}
