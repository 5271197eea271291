use anyhow::{anyhow, bail, Result};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::bunq_api::{MonetaryAccount, PaymentPage, SourceApi};
use crate::db::{bunq_timestamp, BunqAccountId, CounterParty, PaymentId, RawPayment};
use crate::firefly_api::{AccountKind, LedgerAccount, LedgerAccountId, LedgerApi, ServerInfo, StoredTransaction};
use crate::sync::LedgerTransaction;

pub fn counter_party(display_name: &str, iban: Option<&str>) -> CounterParty {
    CounterParty {
        iban: iban.map(str::to_string),
        display_name: display_name.to_string(),
        nick_name: None,
        country: None,
    }
}

/// An EUR card payment with "Acme Corp" on the other side
pub fn payment(id: u64, account: u64, amount: &str, created: &str) -> RawPayment {
    let created = bunq_timestamp::parse(created).unwrap();
    RawPayment {
        id: PaymentId(id),
        created,
        updated: created,
        bunq_account_id: BunqAccountId(account),
        amount: amount.parse().unwrap(),
        currency_code: "EUR".to_string(),
        counter_party: counter_party("Acme Corp", None),
        description: format!("Payment {id}"),
        type_: "MASTERCARD".to_string(),
        sub_type: "PAYMENT".to_string(),
        balance_after: "100.00".parse().unwrap(),
    }
}

pub fn ledger_account(id: u64, name: &str, kind: AccountKind, iban: Option<&str>) -> LedgerAccount {
    LedgerAccount {
        id: LedgerAccountId(id),
        name: name.to_string(),
        kind,
        iban: iban.map(str::to_string),
        currency_code: Some("EUR".to_string()),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

/// A bunq stand-in serving scripted pages of payments
#[derive(Default)]
pub struct MockBank {
    pages: HashMap<BunqAccountId, Vec<Vec<RawPayment>>>,
    infinite: HashSet<BunqAccountId>,
    failures: HashSet<(BunqAccountId, usize)>,
    failing_bootstrap: bool,
    bootstraps: AtomicUsize,
    requests: Mutex<Vec<(BunqAccountId, Option<PaymentId>)>>,
}

impl MockBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each page points to the next one through the id of its last payment
    pub fn with_pages(mut self, account: u64, pages: Vec<Vec<RawPayment>>) -> Self {
        self.pages.insert(BunqAccountId(account), pages);
        self
    }

    /// Every page has one new payment and an older page to follow
    pub fn with_infinite_pages(mut self, account: u64) -> Self {
        self.infinite.insert(BunqAccountId(account));
        self
    }

    /// Requesting the given page (starting at 1) of this account fails
    pub fn with_failure_at_page(mut self, account: u64, page: usize) -> Self {
        self.failures.insert((BunqAccountId(account), page));
        self
    }

    pub fn with_failing_bootstrap(mut self) -> Self {
        self.failing_bootstrap = true;
        self
    }

    pub fn bootstraps(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }

    pub fn payment_requests(&self) -> Vec<(BunqAccountId, Option<PaymentId>)> {
        lock(&self.requests).clone()
    }
}

impl SourceApi for MockBank {
    async fn bootstrap(&self) -> Result<()> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        if self.failing_bootstrap {
            bail!("Session expired");
        }
        Ok(())
    }

    async fn monetary_accounts(&self) -> Result<Vec<MonetaryAccount>> {
        Ok(vec![])
    }

    async fn payments_page(
        &self,
        account: BunqAccountId,
        _count: u32,
        older_id: Option<PaymentId>,
    ) -> Result<PaymentPage> {
        let page = {
            let mut requests = lock(&self.requests);
            requests.push((account, older_id));
            requests.iter().filter(|(requested, _)| *requested == account).count()
        };
        if self.failures.contains(&(account, page)) {
            bail!("Connection reset");
        }
        if self.infinite.contains(&account) {
            let id = 1_000_000 - page as u64;
            let created = format!("2020-01-01 00:00:{:02}.0", page % 60);
            return Ok(PaymentPage {
                payments: vec![payment(id, account.0, "-1.00", &created)],
                older_id: Some(PaymentId(id)),
            });
        }
        let pages = self.pages.get(&account).map(Vec::as_slice).unwrap_or(&[]);
        let Some(payments) = pages.get(page - 1) else {
            return Ok(PaymentPage {
                payments: vec![],
                older_id: None,
            });
        };
        let older_id = if page < pages.len() {
            payments.last().map(|payment| payment.id)
        } else {
            None
        };
        Ok(PaymentPage {
            payments: payments.clone(),
            older_id,
        })
    }
}

/// A Firefly III stand-in that remembers what was stored
#[derive(Default)]
pub struct MockLedger {
    accounts: Vec<LedgerAccount>,
    rejected: HashSet<PaymentId>,
    failing_accounts: bool,
    lookups: Mutex<Vec<LedgerAccountId>>,
    stored: Mutex<Vec<LedgerTransaction>>,
}

impl MockLedger {
    pub fn new(accounts: Vec<LedgerAccount>) -> Self {
        Self {
            accounts,
            ..Self::default()
        }
    }

    /// Transactions for this bunq payment are refused like a duplicate
    pub fn rejecting(mut self, payment: u64) -> Self {
        self.rejected.insert(PaymentId(payment));
        self
    }

    pub fn with_failing_account_list(mut self) -> Self {
        self.failing_accounts = true;
        self
    }

    pub fn lookups(&self) -> Vec<LedgerAccountId> {
        lock(&self.lookups).clone()
    }

    pub fn stored(&self) -> Vec<LedgerTransaction> {
        lock(&self.stored).clone()
    }
}

impl LedgerApi for MockLedger {
    async fn about(&self) -> Result<ServerInfo> {
        Ok(ServerInfo {
            version: "6.1.0".to_string(),
            api_version: Some("2.1.0".to_string()),
        })
    }

    async fn accounts(&self) -> Result<Vec<LedgerAccount>> {
        if self.failing_accounts {
            bail!("Firefly III is down");
        }
        Ok(self.accounts.clone())
    }

    async fn account(&self, id: LedgerAccountId) -> Result<LedgerAccount> {
        lock(&self.lookups).push(id);
        self.accounts
            .iter()
            .find(|account| account.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("GET accounts/{id} returned 404 Not Found"))
    }

    async fn store_transaction(&self, transaction: &LedgerTransaction) -> Result<StoredTransaction> {
        if self.rejected.contains(&transaction.bunq_payment_id) {
            bail!("Firefly III rejected the transaction: Duplicate of transaction #1.");
        }
        let mut stored = lock(&self.stored);
        stored.push(transaction.clone());
        let id = (stored.len() + 100).to_string();
        Ok(StoredTransaction {
            group_id: id.clone(),
            journal_ids: vec![id],
        })
    }
}
