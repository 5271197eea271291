use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Id of a Firefly III account. The API sends ids as strings, configuration files
/// written by other tools use both strings and numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LedgerAccountId(pub u64);

impl Display for LedgerAccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LedgerAccountId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse()
            .map(LedgerAccountId)
            .map_err(|_| anyhow!("Invalid Firefly III account id: {s:?}"))
    }
}

impl Serialize for LedgerAccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for LedgerAccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum NumberOrString {
            Number(u64),
            String(String),
        }
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Number(id) => Ok(LedgerAccountId(id)),
            NumberOrString::String(id) => id.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AccountKind {
    Asset,
    Expense,
    Revenue,
    Liabilities,
    Cash,
    InitialBalance,
    Reconciliation,
    Other(String),
}

impl AccountKind {
    pub fn as_str(&self) -> &str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Expense => "expense",
            AccountKind::Revenue => "revenue",
            AccountKind::Liabilities => "liabilities",
            AccountKind::Cash => "cash",
            AccountKind::InitialBalance => "initial-balance",
            AccountKind::Reconciliation => "reconciliation",
            AccountKind::Other(kind) => kind,
        }
    }

    /// Bookkeeping accounts Firefly III manages itself. They never take part in an import.
    pub fn is_internal(&self) -> bool {
        matches!(self, AccountKind::InitialBalance | AccountKind::Reconciliation)
    }
}

impl From<String> for AccountKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "asset" => AccountKind::Asset,
            "expense" => AccountKind::Expense,
            "revenue" => AccountKind::Revenue,
            "liabilities" | "liability" => AccountKind::Liabilities,
            "cash" => AccountKind::Cash,
            "initial-balance" => AccountKind::InitialBalance,
            "reconciliation" => AccountKind::Reconciliation,
            _ => AccountKind::Other(value),
        }
    }
}

impl From<AccountKind> for String {
    fn from(value: AccountKind) -> Self {
        match value {
            AccountKind::Other(kind) => kind,
            kind => kind.as_str().to_string(),
        }
    }
}

impl Display for AccountKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAccount {
    pub id: LedgerAccountId,
    pub name: String,
    pub kind: AccountKind,
    pub iban: Option<String>,
    pub currency_code: Option<String>,
}

impl LedgerAccount {
    pub fn display_name(&self) -> String {
        match self.iban.as_deref().map(str::trim) {
            Some(iban) if !iban.is_empty() => format!("{} ({iban})", self.name),
            _ => self.name.clone(),
        }
    }
}

/// Accounts a counter-party can be mapped to, grouped by kind and sorted by name
pub fn mapping_candidates(accounts: &[LedgerAccount]) -> BTreeMap<AccountKind, Vec<(LedgerAccountId, String)>> {
    let mut grouped: BTreeMap<AccountKind, Vec<(LedgerAccountId, String)>> = BTreeMap::new();
    for account in accounts.iter().filter(|account| !account.kind.is_internal()) {
        grouped
            .entry(account.kind.clone())
            .or_default()
            .push((account.id, account.display_name()));
    }
    for candidates in grouped.values_mut() {
        candidates.sort_by(|lhs, rhs| lhs.1.cmp(&rhs.1));
    }
    grouped
}

#[derive(Deserialize)]
pub(super) struct AccountListResponse {
    pub data: Vec<AccountData>,
    pub meta: Option<ListMeta>,
}

#[derive(Deserialize)]
pub(super) struct SingleAccountResponse {
    pub data: AccountData,
}

#[derive(Deserialize)]
pub(super) struct ListMeta {
    pub pagination: Option<Pagination>,
}

#[derive(Deserialize)]
pub(super) struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
}

#[derive(Deserialize)]
pub(super) struct AccountData {
    pub id: LedgerAccountId,
    pub attributes: AccountAttributes,
}

#[derive(Deserialize)]
pub(super) struct AccountAttributes {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub iban: Option<String>,
    pub currency_code: Option<String>,
}

impl From<AccountData> for LedgerAccount {
    fn from(data: AccountData) -> Self {
        LedgerAccount {
            id: data.id,
            name: data.attributes.name,
            kind: AccountKind::from(data.attributes.type_),
            iban: data.attributes.iban.filter(|iban| !iban.trim().is_empty()),
            currency_code: data.attributes.currency_code,
        }
    }
}
