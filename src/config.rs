use anyhow::{anyhow, bail, ensure, Context as _, Result};
use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::db::BunqAccountId;
use crate::firefly_api::{AccountKind, LedgerAccountId};

pub const CONFIG_VERSION: u32 = 1;
const DEFAULT_DATE_RANGE_NUMBER: u32 = 30;
const DEFAULT_PAGE_DELAY_SECS: u64 = 2;
const DEFAULT_BUNQ_URI: &str = "https://api.bunq.com";
const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 31;

/// Import configuration, in the format of the configuration files the importer's web
/// interface exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    /// Let Firefly III apply its rules to imported transactions
    #[serde(default = "default_true")]
    pub rules: bool,
    /// bunq accounts to import, and the Firefly III asset account each one is imported into
    #[serde(default)]
    pub accounts: BTreeMap<BunqAccountId, LedgerAccountId>,
    /// Counter-party ("Name (IBAN)" or "Name") to Firefly III account
    #[serde(default)]
    pub mapping: HashMap<String, LedgerAccountId>,
    /// Known kinds of Firefly III accounts used in `mapping`
    #[serde(default)]
    pub account_types: HashMap<LedgerAccountId, AccountKind>,
    #[serde(default)]
    pub date_range: DateRange,
    #[serde(default)]
    pub date_range_number: Option<u32>,
    #[serde(default)]
    pub date_range_unit: Option<DateRangeUnit>,
    #[serde(default, deserialize_with = "optional_date")]
    pub date_not_before: Option<NaiveDate>,
    #[serde(default, deserialize_with = "optional_date")]
    pub date_not_after: Option<NaiveDate>,
    /// Pause between two pages of bunq payments
    #[serde(default = "default_page_delay_secs")]
    pub page_delay_secs: u64,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_true() -> bool {
    true
}

fn default_page_delay_secs() -> u64 {
    DEFAULT_PAGE_DELAY_SECS
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    #[default]
    All,
    /// Everything newer than `date_range_number` `date_range_unit`s
    Partial,
    /// Everything between `date_not_before` and `date_not_after`
    Range,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateRangeUnit {
    #[default]
    #[serde(rename = "d")]
    Days,
    #[serde(rename = "w")]
    Weeks,
    #[serde(rename = "m")]
    Months,
    #[serde(rename = "y")]
    Years,
}

impl DateRangeUnit {
    pub fn subtract_from(&self, date: NaiveDate, number: u32) -> Option<NaiveDate> {
        match self {
            DateRangeUnit::Days => date.checked_sub_days(Days::new(number.into())),
            DateRangeUnit::Weeks => date.checked_sub_days(Days::new(u64::from(number) * 7)),
            DateRangeUnit::Months => date.checked_sub_months(Months::new(number)),
            DateRangeUnit::Years => date.checked_sub_months(Months::new(number.checked_mul(12)?)),
        }
    }
}

/// Accepts `null`, `""` and `"YYYY-MM-DD"`
fn optional_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(date) => NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(Some)
            .map_err(|err| serde::de::Error::custom(format!("Invalid date {date:?}: {err}"))),
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.version == CONFIG_VERSION,
            "Configuration file version \"{}\" cannot be parsed",
            self.version
        );
        ensure!(
            !self.accounts.is_empty(),
            "Configuration doesn't select any bunq account to import"
        );
        for (bunq_account, ledger_account) in &self.accounts {
            ensure!(
                ledger_account.0 != 0,
                "bunq account #{bunq_account} isn't linked to a Firefly III account"
            );
        }
        Ok(())
    }

    /// Dates outside of which payments are skipped. Both are exclusive: `not_before` means
    /// after the start of that day, `not_after` means before the end of that day.
    pub fn date_bounds(&self, today: NaiveDate) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        match self.date_range {
            DateRange::All => Ok((None, None)),
            DateRange::Partial => {
                let number = self.date_range_number.unwrap_or(DEFAULT_DATE_RANGE_NUMBER);
                let unit = self.date_range_unit.unwrap_or_default();
                let not_before = unit
                    .subtract_from(today, number)
                    .ok_or_else(|| anyhow!("Date range of {number} {unit:?} is too large"))?;
                Ok((Some(not_before), None))
            }
            DateRange::Range => match (self.date_not_before, self.date_not_after) {
                (Some(before), Some(after)) if before > after => Ok((Some(after), Some(before))),
                bounds => Ok(bounds),
            },
        }
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }

    pub fn ledger_account_for(&self, bunq_account: BunqAccountId) -> Option<LedgerAccountId> {
        self.accounts.get(&bunq_account).copied()
    }
}

pub async fn load(path: &Path) -> Result<Config> {
    log::info!("Loading configuration from {}...", path.display());
    let content = tokio::fs::read(path)
        .await
        .with_context(|| anyhow!("Failed to read configuration file {}", path.display()))?;
    let config = parse(&content).with_context(|| anyhow!("Error in configuration file {}", path.display()))?;
    log::info!("Loading configuration from {}...done", path.display());
    Ok(config)
}

pub fn parse(content: &[u8]) -> Result<Config> {
    let config: Config = serde_json::from_slice(content)?;
    config.validate()?;
    Ok(config)
}

#[derive(Debug, Clone)]
pub struct FireflySettings {
    pub uri: String,
    pub access_token: String,
    pub connection_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BunqSettings {
    pub uri: String,
    pub session_token: String,
    pub connection_timeout: Duration,
}

/// Connection settings, taken from the environment
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub firefly: FireflySettings,
    pub bunq: BunqSettings,
}

impl ApiSettings {
    /// Reads `FIREFLY_III_URI`, `FIREFLY_III_ACCESS_TOKEN`, `BUNQ_API_URI` (defaults to the
    /// production API), `BUNQ_SESSION_TOKEN` and `CONNECTION_TIMEOUT` (seconds).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| match lookup(name) {
            Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            _ => Err(anyhow!("Environment variable {name} is not set")),
        };
        let connection_timeout = match lookup("CONNECTION_TIMEOUT") {
            None => Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) => Duration::from_secs(secs),
                Err(_) => bail!("CONNECTION_TIMEOUT must be a number of seconds, got {value:?}"),
            },
        };
        Ok(Self {
            firefly: FireflySettings {
                uri: required("FIREFLY_III_URI")?,
                access_token: required("FIREFLY_III_ACCESS_TOKEN")?,
                connection_timeout,
            },
            bunq: BunqSettings {
                uri: lookup("BUNQ_API_URI")
                    .filter(|uri| !uri.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_BUNQ_URI.to_string()),
                session_token: required("BUNQ_SESSION_TOKEN")?,
                connection_timeout,
            },
        })
    }
}
