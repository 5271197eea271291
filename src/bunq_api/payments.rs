use anyhow::{Context as _, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

use super::client::SourceApi;
use crate::db::{bunq_timestamp, BunqAccountId, CounterParty, Download, PaymentId, RawPayment};
use crate::sync::Progress;

/// Payments requested per page, the maximum bunq allows
pub const PAGE_SIZE: u32 = 197;
/// Pages requested per account before giving up on reaching the oldest payment
pub const MAX_PAGES: usize = 45;

const EMPTY_DESCRIPTION: &str = "(empty description)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentPage {
    pub payments: Vec<RawPayment>,
    /// Cursor for the next, older, page. None if this was the oldest page.
    pub older_id: Option<PaymentId>,
}

#[derive(Deserialize)]
pub(super) struct PaymentItem {
    #[serde(rename = "Payment")]
    pub payment: PaymentData,
}

#[derive(Deserialize)]
pub(super) struct PaymentData {
    id: u64,
    created: String,
    updated: String,
    monetary_account_id: u64,
    amount: Amount,
    #[serde(default)]
    description: String,
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    sub_type: String,
    #[serde(default)]
    counterparty_alias: Option<CounterpartyAlias>,
    balance_after_mutation: Amount,
}

#[derive(Deserialize)]
struct Amount {
    #[serde(with = "rust_decimal::serde::str")]
    value: Decimal,
    currency: String,
}

#[derive(Deserialize, Default)]
struct CounterpartyAlias {
    #[serde(default)]
    iban: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    label_user: Option<LabelUser>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Deserialize)]
struct LabelUser {
    #[serde(default)]
    display_name: Option<String>,
}

impl PaymentData {
    pub fn into_raw(self) -> Result<RawPayment> {
        let description = match self.description.trim() {
            "" => EMPTY_DESCRIPTION.to_string(),
            description => description.to_string(),
        };
        let alias = self.counterparty_alias.unwrap_or_default();
        Ok(RawPayment {
            id: PaymentId(self.id),
            created: bunq_timestamp::parse(&self.created)
                .with_context(|| format!("Payment #{} has an invalid creation time", self.id))?,
            updated: bunq_timestamp::parse(&self.updated)
                .with_context(|| format!("Payment #{} has an invalid update time", self.id))?,
            bunq_account_id: BunqAccountId(self.monetary_account_id),
            amount: self.amount.value,
            currency_code: self.amount.currency,
            counter_party: CounterParty {
                iban: alias.iban.filter(|iban| !iban.trim().is_empty()),
                display_name: alias.display_name.unwrap_or_default(),
                nick_name: alias.label_user.and_then(|label| label.display_name),
                country: alias.country,
            },
            description,
            type_: self.type_,
            sub_type: self.sub_type,
            balance_after: self.balance_after_mutation.value,
        })
    }
}

/// Skips payments created outside of a date range. Both ends are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateFilter {
    not_before: Option<NaiveDateTime>,
    not_after: Option<NaiveDateTime>,
}

impl DateFilter {
    /// `not_before` starts at midnight, `not_after` ends at the last microsecond of its day
    pub fn new(not_before: Option<NaiveDate>, not_after: Option<NaiveDate>) -> Self {
        Self {
            not_before: not_before.map(|date| date.and_time(NaiveTime::MIN)),
            not_after: not_after.and_then(|date| date.and_hms_micro_opt(23, 59, 59, 999_999)),
        }
    }

    pub fn accepts(&self, created: NaiveDateTime) -> bool {
        if let Some(not_before) = self.not_before {
            if created <= not_before {
                log::info!("Skip transaction because {created} is before {not_before}");
                return false;
            }
        }
        if let Some(not_after) = self.not_after {
            if created >= not_after {
                log::info!("Skip transaction because {created} is after {not_after}");
                return false;
            }
        }
        true
    }
}

pub struct PaymentFetcher<'a, A: SourceApi> {
    api: &'a A,
    filter: DateFilter,
    page_delay: Duration,
}

impl<'a, A: SourceApi> PaymentFetcher<'a, A> {
    pub fn new(api: &'a A, filter: DateFilter, page_delay: Duration) -> Self {
        Self {
            api,
            filter,
            page_delay,
        }
    }

    /// Downloads the payments of all accounts. Fails only if bunq can't be reached at all,
    /// problems with a single account end up in `progress` and the other accounts continue.
    pub async fn fetch(
        &self,
        accounts: impl IntoIterator<Item = BunqAccountId>,
        progress: &mut Progress,
    ) -> Result<Download> {
        self.api.bootstrap().await.context("Failed to connect to bunq")?;

        let mut download = Download::new();
        for account in accounts {
            let mut payments = Vec::new();
            if let Err(err) = self.fetch_account(account, &mut payments).await {
                log::error!("Failed to download payments of bunq account #{account}: {err:#}");
                progress.add_error(
                    0,
                    format!("Could not download payments of bunq account #{account}: {err:#}"),
                );
            }
            log::info!(
                "Downloaded and parsed {} transactions from bunq account #{account}",
                payments.len()
            );
            download.insert(account, payments);
        }
        Ok(download)
    }

    async fn fetch_account(&self, account: BunqAccountId, payments: &mut Vec<RawPayment>) -> Result<()> {
        let mut older_id = None;
        for page in 1..=MAX_PAGES {
            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
            log::info!("Requesting payments of bunq account #{account}...page {page}...");
            let response = self.api.payments_page(account, PAGE_SIZE, older_id).await?;

            let previously_accepted = payments.len();
            payments.extend(
                response
                    .payments
                    .into_iter()
                    .filter(|payment| self.filter.accepts(payment.created)),
            );

            let Some(next_older_id) = response.older_id else {
                log::debug!("No older payments in bunq account #{account}");
                return Ok(());
            };
            if payments.len() == previously_accepted {
                log::info!("No new transactions were added for bunq account #{account}");
                return Ok(());
            }
            older_id = Some(next_older_id);
        }
        log::warn!("Stopped downloading bunq account #{account} after {MAX_PAGES} pages");
        Ok(())
    }
}
