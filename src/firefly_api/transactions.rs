use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::LedgerAccountId;
use crate::sync::{AccountRef, LedgerTransaction};

/// What Firefly III answered after storing a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTransaction {
    pub group_id: String,
    pub journal_ids: Vec<String>,
}

#[derive(Serialize, Debug)]
pub(super) struct StoreTransactionRequest<'a> {
    apply_rules: bool,
    error_if_duplicate_hash: bool,
    transactions: [TransactionSplit<'a>; 1],
}

#[derive(Serialize, Debug)]
struct TransactionSplit<'a> {
    #[serde(rename = "type")]
    type_: &'static str,
    date: String,
    amount: String,
    description: &'a str,
    order: u32,
    currency_code: &'a str,
    tags: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    source_id: Option<LedgerAccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_iban: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_id: Option<LedgerAccountId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_iban: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_name: Option<&'a str>,
    external_id: &'a str,
    internal_reference: &'a str,
    bunq_payment_id: String,
}

struct Side<'a> {
    id: Option<LedgerAccountId>,
    iban: Option<&'a str>,
    name: Option<&'a str>,
}

fn side(account: &AccountRef) -> Side<'_> {
    match account {
        AccountRef::Id(id) => Side {
            id: Some(*id),
            iban: None,
            name: None,
        },
        AccountRef::Unresolved { iban, name } => Side {
            id: None,
            iban: iban.as_deref(),
            name: Some(name),
        },
    }
}

impl<'a> StoreTransactionRequest<'a> {
    pub fn new(transaction: &'a LedgerTransaction) -> Self {
        let source = side(&transaction.source);
        let destination = side(&transaction.destination);
        Self {
            apply_rules: transaction.apply_rules,
            error_if_duplicate_hash: transaction.error_if_duplicate_hash,
            transactions: [TransactionSplit {
                type_: transaction.type_.as_str(),
                date: transaction.date.format("%Y-%m-%d").to_string(),
                amount: transaction.amount.to_string(),
                description: &transaction.description,
                order: 0,
                currency_code: &transaction.currency_code,
                tags: &transaction.tags,
                source_id: source.id,
                source_iban: source.iban,
                source_name: source.name,
                destination_id: destination.id,
                destination_iban: destination.iban,
                destination_name: destination.name,
                external_id: &transaction.external_id,
                internal_reference: &transaction.internal_reference,
                bunq_payment_id: transaction.bunq_payment_id.to_string(),
            }],
        }
    }
}

#[derive(Deserialize)]
pub(super) struct StoreTransactionResponse {
    data: TransactionGroupData,
}

#[derive(Deserialize)]
struct TransactionGroupData {
    id: String,
    attributes: TransactionGroupAttributes,
}

#[derive(Deserialize)]
struct TransactionGroupAttributes {
    #[serde(default)]
    transactions: Vec<StoredSplit>,
}

#[derive(Deserialize)]
struct StoredSplit {
    transaction_journal_id: String,
}

impl From<StoreTransactionResponse> for StoredTransaction {
    fn from(response: StoreTransactionResponse) -> Self {
        StoredTransaction {
            group_id: response.data.id,
            journal_ids: response
                .data
                .attributes
                .transactions
                .into_iter()
                .map(|split| split.transaction_journal_id)
                .collect(),
        }
    }
}

/// Body of a 422 answer, e.g. for a duplicate hash
#[derive(Deserialize)]
pub(super) struct ValidationErrorResponse {
    message: String,
    #[serde(default)]
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationErrorResponse {
    pub fn describe(&self) -> String {
        if self.errors.is_empty() {
            return self.message.clone();
        }
        let details: Vec<String> = self
            .errors
            .iter()
            .flat_map(|(field, messages)| messages.iter().map(move |message| format!("{field}: {message}")))
            .collect();
        format!("{} ({})", self.message, details.join("; "))
    }
}
