use anyhow::{anyhow, bail, Context as _, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};

use super::accounts::{AccountListResponse, LedgerAccount, LedgerAccountId, SingleAccountResponse};
use super::transactions::{
    StoreTransactionRequest, StoreTransactionResponse, StoredTransaction, ValidationErrorResponse,
};
use crate::config::FireflySettings;
use crate::sync::LedgerTransaction;

/// Everything the importer needs from Firefly III
#[allow(async_fn_in_trait)]
pub trait LedgerApi {
    async fn about(&self) -> Result<ServerInfo>;
    async fn accounts(&self) -> Result<Vec<LedgerAccount>>;
    async fn account(&self, id: LedgerAccountId) -> Result<LedgerAccount>;
    async fn store_transaction(&self, transaction: &LedgerTransaction) -> Result<StoredTransaction>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    pub api_version: Option<String>,
}

#[derive(Deserialize)]
struct AboutResponse {
    data: ServerInfo,
}

pub struct Firefly {
    http: Client,
    base_url: Url,
}

impl Firefly {
    pub fn new(settings: &FireflySettings) -> Result<Self> {
        let base_url = Url::parse(&settings.uri)
            .with_context(|| anyhow!("Invalid Firefly III URI: {}", settings.uri))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", settings.access_token))
            .context("Firefly III access token contains invalid characters")?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(settings.connection_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/api/v1/{path}"))
            .with_context(|| anyhow!("Failed to build Firefly III URL for {path}"))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let endpoint = self.endpoint(path)?;
        let response = self
            .http
            .get(endpoint.clone())
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
}

fn describe_error_body(body: &str) -> String {
    match serde_json::from_str::<ValidationErrorResponse>(body) {
        Ok(error) => error.describe(),
        Err(_) => body.trim().to_string(),
    }
}

impl LedgerApi for Firefly {
    async fn about(&self) -> Result<ServerInfo> {
        let response: AboutResponse = self.get("about", &[]).await?;
        Ok(response.data)
    }

    async fn accounts(&self) -> Result<Vec<LedgerAccount>> {
        log::info!("Requesting Firefly III accounts...");
        let mut accounts = vec![];
        let mut page = 1;
        loop {
            log::info!("Requesting Firefly III accounts...page {page}...");
            let response: AccountListResponse = self
                .get("accounts", &[("page", page.to_string()), ("type", "all".to_string())])
                .await?;
            accounts.extend(response.data.into_iter().map(LedgerAccount::from));
            match response.meta.and_then(|meta| meta.pagination) {
                Some(pagination) if pagination.current_page < pagination.total_pages => {
                    page = pagination.current_page + 1;
                }
                _ => break,
            }
        }
        log::info!("Requesting Firefly III accounts...done ({} accounts)", accounts.len());
        Ok(accounts)
    }

    async fn account(&self, id: LedgerAccountId) -> Result<LedgerAccount> {
        log::debug!("Going to download account #{id} from Firefly III");
        let response: SingleAccountResponse = self.get(&format!("accounts/{id}"), &[]).await?;
        let account = LedgerAccount::from(response.data);
        log::debug!("Discovered that account #{id} is of type \"{}\"", account.kind);
        Ok(account)
    }

    async fn store_transaction(&self, transaction: &LedgerTransaction) -> Result<StoredTransaction> {
        let endpoint = self.endpoint("transactions")?;
        let response = self
            .http
            .post(endpoint.clone())
            .json(&StoreTransactionRequest::new(transaction))
            .send()
            .await
            .with_context(|| format!("POST {endpoint} failed"))?;
        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            let error: ValidationErrorResponse = response
                .json()
                .await
                .context("Firefly III rejected the transaction but the reason could not be parsed")?;
            bail!("Firefly III rejected the transaction: {}", error.describe());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("POST {endpoint} returned {status}: {}", describe_error_body(&body));
        }
        let stored: StoreTransactionResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response from {endpoint}"))?;
        Ok(stored.into())
    }
}
