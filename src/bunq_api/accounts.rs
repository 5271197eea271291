use anyhow::{bail, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use crate::db::BunqAccountId;

const SUPPORTED_ACCOUNT_TYPES: [&str; 3] = [
    "MonetaryAccountBank",
    "MonetaryAccountSavings",
    "MonetaryAccountJoint",
];

#[derive(Clone, PartialEq, Eq)]
pub struct MonetaryAccount {
    pub id: BunqAccountId,
    pub currency: String,
    pub description: String,
    pub status: String,
    pub iban: Option<String>,
}

impl Debug for MonetaryAccount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {} [{}]", self.id, self.description, self.currency)?;
        if let Some(iban) = &self.iban {
            write!(f, " {iban}")?;
        }
        if self.status != "ACTIVE" {
            write!(f, " ({})", self.status)?;
        }
        Ok(())
    }
}

/// `{"MonetaryAccountBank": {...}}`, keyed by the kind of account
#[derive(Deserialize)]
#[serde(transparent)]
pub(super) struct MonetaryAccountItem(BTreeMap<String, MonetaryAccountData>);

#[derive(Deserialize)]
pub(super) struct MonetaryAccountData {
    id: u64,
    currency: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    alias: Vec<Alias>,
}

#[derive(Deserialize)]
struct Alias {
    #[serde(rename = "type")]
    type_: String,
    value: String,
}

impl TryFrom<MonetaryAccountItem> for MonetaryAccount {
    type Error = anyhow::Error;

    fn try_from(item: MonetaryAccountItem) -> Result<Self> {
        let Some((kind, data)) = item.0.into_iter().next() else {
            bail!("bunq returned an empty monetary account");
        };
        if !SUPPORTED_ACCOUNT_TYPES.contains(&kind.as_str()) {
            bail!("Unsupported bunq account type {kind} for account #{}", data.id);
        }
        let iban = data
            .alias
            .into_iter()
            .find(|alias| alias.type_ == "IBAN")
            .map(|alias| alias.value);
        Ok(MonetaryAccount {
            id: BunqAccountId(data.id),
            currency: data.currency,
            description: data.description,
            status: data.status,
            iban,
        })
    }
}
