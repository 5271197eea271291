use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::db::PaymentId;
use crate::firefly_api::LedgerAccountId;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Withdrawal,
    Deposit,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Deposit => "deposit",
            TransactionType::Transfer => "transfer",
        }
    }
}

impl Display for TransactionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a ledger transaction. Either an account Firefly III already has, or a
/// counter-party Firefly III will match or create by itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountRef {
    Id(LedgerAccountId),
    Unresolved { iban: Option<String>, name: String },
}

impl AccountRef {
    pub fn id(&self) -> Option<LedgerAccountId> {
        match self {
            AccountRef::Id(id) => Some(*id),
            AccountRef::Unresolved { .. } => None,
        }
    }
}

impl Display for AccountRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountRef::Id(id) => write!(f, "#{id}"),
            AccountRef::Unresolved { iban: Some(iban), name } => write!(f, "{name} ({iban})"),
            AccountRef::Unresolved { iban: None, name } => write!(f, "{name}"),
        }
    }
}

/// A transaction ready to be sent to Firefly III
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    /// Position of the bunq payment in the download, counted from 1
    pub line: usize,
    pub type_: TransactionType,
    pub date: NaiveDate,
    /// Only used to recognize duplicate transfers, Firefly III doesn't need it
    pub datetime: Option<NaiveDateTime>,
    pub amount: Decimal,
    pub currency_code: String,
    pub description: String,
    pub source: AccountRef,
    pub destination: AccountRef,
    pub tags: Vec<String>,
    pub external_id: String,
    pub bunq_payment_id: PaymentId,
    pub internal_reference: String,
    pub apply_rules: bool,
    pub error_if_duplicate_hash: bool,
}

impl Display for LedgerTransaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} \"{}\" {} {} from {} to {}",
            self.type_, self.date, self.description, self.currency_code, self.amount, self.source, self.destination,
        )
    }
}
