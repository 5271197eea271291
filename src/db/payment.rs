use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// Id of a bunq monetary account
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct BunqAccountId(pub u64);

impl Display for BunqAccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PaymentId(pub u64);

impl Display for PaymentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A payment as downloaded from bunq, before any classification happened.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RawPayment {
    pub id: PaymentId,
    #[serde(with = "bunq_timestamp")]
    pub created: NaiveDateTime,
    #[serde(with = "bunq_timestamp")]
    pub updated: NaiveDateTime,
    pub bunq_account_id: BunqAccountId,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub currency_code: String,
    pub counter_party: CounterParty,
    pub description: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub sub_type: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_after: Decimal,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CounterParty {
    pub iban: Option<String>,
    pub display_name: String,
    pub nick_name: Option<String>,
    pub country: Option<String>,
}

impl CounterParty {
    pub fn mapping_key(&self) -> String {
        mapping_key(&self.display_name, self.iban.as_deref())
    }
}

impl Debug for CounterParty {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mapping_key())
    }
}

/// The key under which users map a counter-party to a Firefly III account:
/// `"Name (IBAN)"`, or just `"Name"` for counter-parties without IBAN.
pub fn mapping_key(display_name: &str, iban: Option<&str>) -> String {
    let display_name = display_name.trim();
    match iban.map(str::trim) {
        Some(iban) if !iban.is_empty() => format!("{display_name} ({iban})"),
        _ => display_name.to_string(),
    }
}

/// bunq reports timestamps as `2020-01-31 13:45:00.123456`
pub mod bunq_timestamp {
    use anyhow::{Context as _, Result};
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
    const READ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

    pub fn parse(value: &str) -> Result<NaiveDateTime> {
        NaiveDateTime::parse_from_str(value, READ_FORMAT)
            .with_context(|| format!("Invalid bunq timestamp: {value:?}"))
    }

    pub fn format(value: &NaiveDateTime) -> String {
        value.format(WRITE_FORMAT).to_string()
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse(&value).map_err(serde::de::Error::custom)
    }
}
