use anyhow::{anyhow, bail, Result};
use rust_decimal::Decimal;

use super::progress::Progress;
use super::resolver::AccountResolver;
use super::transaction::{AccountRef, LedgerTransaction, TransactionType};
use crate::config::Config;
use crate::db::{Download, RawPayment};
use crate::firefly_api::{AccountKind, LedgerApi};

const AUTO_SAVE_DESCRIPTION: &str = "(auto save transaction)";
const UNNAMED_COUNTER_PARTY: &str = "(unknown counter-party)";

/// Sub-types bunq uses for payments that may not be what they seem
const SPECIAL_SUB_TYPES: [&str; 6] = ["REVERSAL", "REQUEST", "BILLING", "SCT", "SDD", "NLO"];

/// What Firefly III calls a transaction between accounts of these kinds
pub fn resolve_transaction_type(source: &AccountKind, destination: &AccountKind) -> Result<TransactionType> {
    match (source, destination) {
        (AccountKind::Asset, AccountKind::Liabilities) => Ok(TransactionType::Withdrawal),
        (AccountKind::Asset, AccountKind::Expense) => Ok(TransactionType::Withdrawal),
        (AccountKind::Asset, AccountKind::Asset) => Ok(TransactionType::Transfer),
        (AccountKind::Liabilities, AccountKind::Asset) => Ok(TransactionType::Deposit),
        (AccountKind::Revenue, AccountKind::Asset) => Ok(TransactionType::Deposit),
        (source, destination) => bail!(
            "Cannot determine transaction type between a {source} account and a {destination} account"
        ),
    }
}

/// Turns downloaded bunq payments into Firefly III transactions
pub struct TransactionClassifier<'a, L: LedgerApi> {
    config: &'a Config,
    resolver: AccountResolver<'a, L>,
}

impl<'a, L: LedgerApi> TransactionClassifier<'a, L> {
    pub fn new(config: &'a Config, resolver: AccountResolver<'a, L>) -> Self {
        Self { config, resolver }
    }

    /// Payments are numbered from 1 across all accounts. A payment that can't be
    /// classified is reported under its number and left out.
    pub async fn classify(&mut self, download: &Download, progress: &mut Progress) -> Vec<LedgerTransaction> {
        let mut transactions = Vec::new();
        let payments = download.values().flatten();
        for (position, payment) in payments.enumerate() {
            let index = position + 1;
            match self.classify_payment(index, payment, progress).await {
                Ok(Some(transaction)) => {
                    log::debug!("Classified bunq payment #{} as {transaction}", payment.id);
                    transactions.push(transaction);
                }
                Ok(None) => {}
                Err(err) => {
                    log::error!("Could not classify bunq payment #{}: {err:#}", payment.id);
                    progress.add_error(index, format!("{err:#}"));
                }
            }
        }
        progress.add_message(
            0,
            format!("Parsed {} bunq transactions for further processing.", transactions.len()),
        );
        transactions
    }

    async fn classify_payment(
        &mut self,
        index: usize,
        payment: &RawPayment,
        progress: &mut Progress,
    ) -> Result<Option<LedgerTransaction>> {
        let ledger_account = self.config.ledger_account_for(payment.bunq_account_id).ok_or_else(|| {
            anyhow!(
                "bunq account #{} of payment #{} is not linked to a Firefly III account",
                payment.bunq_account_id,
                payment.id
            )
        })?;

        if SPECIAL_SUB_TYPES.contains(&payment.sub_type.as_str()) {
            progress.add_warning(
                index,
                format!(
                    "bunq payment #{} has sub-type {}, it may need manual attention",
                    payment.id, payment.sub_type
                ),
            );
        }

        if payment.amount.is_zero() {
            log::warn!("Skipping bunq payment #{} because its amount is zero", payment.id);
            progress.add_warning(
                index,
                format!("Skipped bunq payment #{} because its amount is zero", payment.id),
            );
            return Ok(None);
        }

        let description = if payment.type_ == "SAVINGS" && payment.sub_type == "PAYMENT" {
            AUTO_SAVE_DESCRIPTION.to_string()
        } else {
            payment.description.clone()
        };

        let counter_party = &payment.counter_party;
        let resolved = self
            .resolver
            .resolve(&counter_party.display_name, counter_party.iban.as_deref())
            .await?;
        let counter_party_ref = match &resolved {
            Some(account) => AccountRef::Id(account.id),
            None => AccountRef::Unresolved {
                iban: counter_party.iban.clone(),
                name: counter_party_name(payment),
            },
        };

        let (type_, source, destination, amount) = if payment.amount > Decimal::ZERO {
            let type_ = match &resolved {
                Some(account) => resolve_transaction_type(&account.kind, &AccountKind::Asset)?,
                None => TransactionType::Deposit,
            };
            (type_, counter_party_ref, AccountRef::Id(ledger_account), payment.amount)
        } else {
            let type_ = match &resolved {
                Some(account) => resolve_transaction_type(&AccountKind::Asset, &account.kind)?,
                None => TransactionType::Withdrawal,
            };
            (type_, AccountRef::Id(ledger_account), counter_party_ref, -payment.amount)
        };

        Ok(Some(LedgerTransaction {
            line: index,
            type_,
            date: payment.created.date(),
            datetime: Some(payment.created),
            amount,
            currency_code: payment.currency_code.clone(),
            description,
            source,
            destination,
            tags: [&payment.type_, &payment.sub_type]
                .into_iter()
                .filter(|tag| !tag.is_empty())
                .cloned()
                .collect(),
            external_id: payment.id.to_string(),
            bunq_payment_id: payment.id,
            internal_reference: payment.bunq_account_id.to_string(),
            apply_rules: self.config.rules,
            error_if_duplicate_hash: true,
        }))
    }
}

fn counter_party_name(payment: &RawPayment) -> String {
    let counter_party = &payment.counter_party;
    [Some(counter_party.display_name.as_str()), counter_party.nick_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|name| !name.is_empty())
        .unwrap_or(UNNAMED_COUNTER_PARTY)
        .to_string()
}
