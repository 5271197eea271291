use anyhow::{anyhow, bail, Context as _, Result};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, USER_AGENT};
use reqwest::{Client, Url};
use serde::{de::DeserializeOwned, Deserialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::accounts::{MonetaryAccount, MonetaryAccountItem};
use super::payments::{PaymentItem, PaymentPage};
use crate::config::BunqSettings;
use crate::db::{BunqAccountId, PaymentId};

const MONETARY_ACCOUNT_PAGE_SIZE: u32 = 200;

/// Everything the importer needs from bunq
#[allow(async_fn_in_trait)]
pub trait SourceApi {
    /// Checks the session and finds out which user it belongs to.
    /// Must succeed before any other call.
    async fn bootstrap(&self) -> Result<()>;
    async fn monetary_accounts(&self) -> Result<Vec<MonetaryAccount>>;
    /// One page of payments, newest first, starting right before `older_id`
    async fn payments_page(
        &self,
        account: BunqAccountId,
        count: u32,
        older_id: Option<PaymentId>,
    ) -> Result<PaymentPage>;
}

pub struct Bunq {
    http: Client,
    base_url: Url,
    user_id: OnceLock<u64>,
}

/// bunq wraps every answer as `{"Response": [...], "Pagination": {...}}`
#[derive(Deserialize)]
pub(super) struct Envelope<T> {
    #[serde(rename = "Response")]
    pub response: Vec<T>,
    #[serde(rename = "Pagination", default)]
    pub pagination: Option<Pagination>,
}

#[derive(Deserialize)]
pub(super) struct Pagination {
    #[serde(default)]
    pub older_url: Option<String>,
}

#[derive(Deserialize)]
struct UserData {
    id: u64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Error")]
    errors: Vec<ErrorDescription>,
}

#[derive(Deserialize)]
struct ErrorDescription {
    error_description: String,
}

fn header(name: &'static str, value: &'static str) -> (HeaderName, HeaderValue) {
    (HeaderName::from_static(name), HeaderValue::from_static(value))
}

impl Bunq {
    pub fn new(settings: &BunqSettings) -> Result<Self> {
        let base_url = Url::parse(&settings.uri)
            .with_context(|| anyhow!("Invalid bunq API URI: {}", settings.uri))?;

        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("bunq-firefly-import/", env!("CARGO_PKG_VERSION"))),
        );
        headers.extend([
            header("x-bunq-language", "en_US"),
            header("x-bunq-region", "nl_NL"),
            header("x-bunq-geolocation", "0 0 0 0 000"),
        ]);
        let mut token = HeaderValue::from_str(&settings.session_token)
            .context("bunq session token contains invalid characters")?;
        token.set_sensitive(true);
        headers.insert(HeaderName::from_static("x-bunq-client-authentication"), token);

        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.connection_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            user_id: OnceLock::new(),
        })
    }

    fn user_id(&self) -> Result<u64> {
        self.user_id
            .get()
            .copied()
            .ok_or_else(|| anyhow!("Not connected to bunq yet"))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/v1/{path}"))
            .with_context(|| anyhow!("Failed to build bunq URL for {path}"))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<Envelope<T>> {
        let endpoint = self.endpoint(path)?;
        let request_id: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let response = self
            .http
            .get(endpoint.clone())
            .header("x-bunq-client-request-id", request_id)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {endpoint} failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("GET {endpoint} returned {status}: {}", describe_error_body(&body));
        }
        response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {endpoint}"))
    }

    /// `older_url` looks like `/v1/user/1/monetary-account/2/payment?count=197&older_id=123`
    fn older_id(&self, pagination: Option<Pagination>) -> Result<Option<PaymentId>> {
        let Some(older_url) = pagination.and_then(|pagination| pagination.older_url) else {
            return Ok(None);
        };
        let url = self
            .base_url
            .join(&older_url)
            .with_context(|| anyhow!("Invalid pagination URL from bunq: {older_url}"))?;
        let older_id = url
            .query_pairs()
            .find(|(key, _)| key == "older_id")
            .map(|(_, value)| value.parse::<u64>())
            .transpose()
            .with_context(|| anyhow!("Invalid older_id in pagination URL from bunq: {older_url}"))?;
        Ok(older_id.map(PaymentId))
    }
}

fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) if !error.errors.is_empty() => error
            .errors
            .into_iter()
            .map(|error| error.error_description)
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.trim().to_string(),
    }
}

impl SourceApi for Bunq {
    async fn bootstrap(&self) -> Result<()> {
        log::info!("Connecting to bunq...");
        let response: Envelope<BTreeMap<String, UserData>> = self.get("user", &[]).await?;
        let (kind, user) = response
            .response
            .into_iter()
            .flat_map(BTreeMap::into_iter)
            .next()
            .ok_or_else(|| anyhow!("bunq didn't return the user of this session"))?;
        log::info!("Connecting to bunq...done ({kind} #{})", user.id);
        // A second bootstrap with the same session finds the same user
        let _ = self.user_id.set(user.id);
        Ok(())
    }

    async fn monetary_accounts(&self) -> Result<Vec<MonetaryAccount>> {
        log::info!("Requesting bunq accounts...");
        let user_id = self.user_id()?;
        let response: Envelope<MonetaryAccountItem> = self
            .get(
                &format!("user/{user_id}/monetary-account"),
                &[("count", MONETARY_ACCOUNT_PAGE_SIZE.to_string())],
            )
            .await?;
        let accounts = response
            .response
            .into_iter()
            .map(MonetaryAccount::try_from)
            .collect::<Result<Vec<_>>>()?;
        log::info!("Requesting bunq accounts...done ({} accounts)", accounts.len());
        Ok(accounts)
    }

    async fn payments_page(
        &self,
        account: BunqAccountId,
        count: u32,
        older_id: Option<PaymentId>,
    ) -> Result<PaymentPage> {
        let user_id = self.user_id()?;
        let mut query = vec![("count", count.to_string())];
        if let Some(older_id) = older_id {
            query.push(("older_id", older_id.to_string()));
        }
        let response: Envelope<PaymentItem> = self
            .get(&format!("user/{user_id}/monetary-account/{account}/payment"), &query)
            .await?;
        let payments = response
            .response
            .into_iter()
            .map(|item| item.payment.into_raw())
            .collect::<Result<Vec<_>>>()?;
        Ok(PaymentPage {
            payments,
            older_id: self.older_id(response.pagination)?,
        })
    }
}
