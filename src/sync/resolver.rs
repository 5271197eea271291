use anyhow::{Context as _, Result};
use std::collections::HashMap;

use crate::config::Config;
use crate::db::mapping_key;
use crate::firefly_api::{AccountKind, LedgerAccount, LedgerAccountId, LedgerApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAccount {
    pub id: LedgerAccountId,
    pub kind: AccountKind,
}

/// Firefly III accounts by IBAN, for counter-parties nobody mapped explicitly
#[derive(Debug, Clone, Default)]
pub struct TargetAccountIndex {
    by_iban: HashMap<String, ResolvedAccount>,
}

impl TargetAccountIndex {
    pub fn build(accounts: &[LedgerAccount]) -> Self {
        let mut by_iban = HashMap::new();
        for account in accounts {
            if account.kind.is_internal()
                || matches!(account.kind, AccountKind::Expense | AccountKind::Revenue)
            {
                continue;
            }
            let Some(iban) = account.iban.as_deref().map(str::trim).filter(|iban| !iban.is_empty()) else {
                continue;
            };
            log::debug!(
                "Account #{} ({}) is a possible target for IBAN {iban}",
                account.id,
                account.kind
            );
            by_iban.insert(
                iban.to_string(),
                ResolvedAccount {
                    id: account.id,
                    kind: account.kind.clone(),
                },
            );
        }
        Self { by_iban }
    }

    pub fn get(&self, iban: &str) -> Option<&ResolvedAccount> {
        self.by_iban.get(iban.trim())
    }

    pub fn len(&self) -> usize {
        self.by_iban.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_iban.is_empty()
    }
}

/// Finds the Firefly III account behind a counter-party. The user's mapping wins
/// over an IBAN match.
pub struct AccountResolver<'a, L: LedgerApi> {
    ledger: &'a L,
    mapping: &'a HashMap<String, LedgerAccountId>,
    kinds: HashMap<LedgerAccountId, AccountKind>,
    targets: TargetAccountIndex,
}

impl<'a, L: LedgerApi> AccountResolver<'a, L> {
    pub fn new(config: &'a Config, ledger: &'a L, targets: TargetAccountIndex) -> Self {
        Self {
            ledger,
            mapping: &config.mapping,
            kinds: config.account_types.clone(),
            targets,
        }
    }

    /// Downloads all Firefly III accounts to build the IBAN index
    pub async fn collect(config: &'a Config, ledger: &'a L) -> Result<Self> {
        log::info!("Collecting target accounts...");
        let accounts = ledger
            .accounts()
            .await
            .context("Failed to collect accounts from Firefly III")?;
        let targets = TargetAccountIndex::build(&accounts);
        log::info!("Collecting target accounts...done ({} accounts with IBAN)", targets.len());
        Ok(Self::new(config, ledger, targets))
    }

    pub async fn resolve(&mut self, display_name: &str, iban: Option<&str>) -> Result<Option<ResolvedAccount>> {
        let key = mapping_key(display_name, iban);
        if let Some(&id) = self.mapping.get(&key) {
            if id.0 != 0 {
                log::debug!("\"{key}\" is mapped to account #{id}");
                let kind = self.kind_of(id).await?;
                return Ok(Some(ResolvedAccount { id, kind }));
            }
        }
        let found = iban
            .and_then(|iban| self.targets.get(iban))
            .cloned();
        if let Some(account) = &found {
            log::debug!("\"{key}\" has the IBAN of account #{}", account.id);
        }
        Ok(found)
    }

    async fn kind_of(&mut self, id: LedgerAccountId) -> Result<AccountKind> {
        if let Some(kind) = self.kinds.get(&id) {
            return Ok(kind.clone());
        }
        let account = self
            .ledger
            .account(id)
            .await
            .with_context(|| format!("Could not find out the type of Firefly III account #{id}"))?;
        self.kinds.insert(id, account.kind.clone());
        Ok(account.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{ledger_account, MockLedger};
    use common_macros::hash_map;

    fn config(mapping: HashMap<String, LedgerAccountId>, account_types: HashMap<LedgerAccountId, AccountKind>) -> Config {
        let mut config = crate::config::parse(br#"{"accounts": {"1": 1}}"#).unwrap();
        config.mapping = mapping;
        config.account_types = account_types;
        config
    }

    fn accounts() -> Vec<LedgerAccount> {
        vec![
            ledger_account(1, "Checking", AccountKind::Asset, Some("NL02BUNQ0000000001")),
            ledger_account(2, "Credit card", AccountKind::Liabilities, Some("NL02BUNQ0000000002")),
            ledger_account(3, "Acme Corp", AccountKind::Expense, Some("NL01ACME0123456789")),
            ledger_account(4, "Employer", AccountKind::Revenue, Some("NL03WORK0123456789")),
            ledger_account(5, "Reconciliation", AccountKind::Reconciliation, Some("NL04RECO0123456789")),
            ledger_account(6, "Wallet", AccountKind::Asset, None),
            ledger_account(42, "Groceries", AccountKind::Expense, None),
        ]
    }

    #[test]
    fn index_skips_expense_revenue_internal_and_accounts_without_iban() {
        let index = TargetAccountIndex::build(&accounts());
        assert_eq!(2, index.len());
        assert_eq!(LedgerAccountId(1), index.get("NL02BUNQ0000000001").unwrap().id);
        assert_eq!(AccountKind::Liabilities, index.get(" NL02BUNQ0000000002").unwrap().kind);
        assert!(index.get("NL01ACME0123456789").is_none());
        assert!(index.get("NL04RECO0123456789").is_none());
    }

    #[tokio::test]
    async fn mapping_with_known_kind() {
        let ledger = MockLedger::new(accounts());
        let config = config(
            hash_map!["Acme Corp (NL01ACME0123456789)".to_string() => LedgerAccountId(42)],
            hash_map![LedgerAccountId(42) => AccountKind::Expense],
        );
        let mut resolver = AccountResolver::new(&config, &ledger, TargetAccountIndex::default());

        assert_eq!(
            Some(ResolvedAccount {
                id: LedgerAccountId(42),
                kind: AccountKind::Expense,
            }),
            resolver.resolve("Acme Corp", Some("NL01ACME0123456789")).await.unwrap()
        );
        assert!(ledger.lookups().is_empty());
    }

    #[tokio::test]
    async fn mapping_with_unknown_kind_is_looked_up_once() {
        let ledger = MockLedger::new(accounts());
        let config = config(hash_map!["Grandma".to_string() => LedgerAccountId(2)], HashMap::new());
        let mut resolver = AccountResolver::new(&config, &ledger, TargetAccountIndex::default());

        for _ in 0..3 {
            let resolved = resolver.resolve("Grandma", None).await.unwrap().unwrap();
            assert_eq!(AccountKind::Liabilities, resolved.kind);
        }
        assert_eq!(vec![LedgerAccountId(2)], ledger.lookups());
    }

    #[tokio::test]
    async fn failed_lookup_is_an_error() {
        let ledger = MockLedger::new(vec![]);
        let config = config(hash_map!["Grandma".to_string() => LedgerAccountId(99)], HashMap::new());
        let mut resolver = AccountResolver::new(&config, &ledger, TargetAccountIndex::default());

        assert!(resolver.resolve("Grandma", None).await.is_err());
    }

    #[tokio::test]
    async fn zero_mapping_falls_back_to_iban() {
        let ledger = MockLedger::new(accounts());
        let config = config(
            hash_map!["Me (NL02BUNQ0000000002)".to_string() => LedgerAccountId(0)],
            HashMap::new(),
        );
        let mut resolver = AccountResolver::collect(&config, &ledger).await.unwrap();

        let resolved = resolver.resolve("Me", Some("NL02BUNQ0000000002")).await.unwrap().unwrap();
        assert_eq!(LedgerAccountId(2), resolved.id);
        assert!(ledger.lookups().is_empty());
    }

    #[tokio::test]
    async fn unknown_counter_party() {
        let ledger = MockLedger::new(accounts());
        let config = config(HashMap::new(), HashMap::new());
        let mut resolver = AccountResolver::collect(&config, &ledger).await.unwrap();

        assert_eq!(None, resolver.resolve("Acme Corp", Some("NL01ACME0123456789")).await.unwrap());
        assert_eq!(None, resolver.resolve("Stranger", None).await.unwrap());
    }

    #[tokio::test]
    async fn collect_fails_with_ledger() {
        let ledger = MockLedger::new(accounts()).with_failing_account_list();
        let config = config(HashMap::new(), HashMap::new());
        assert!(AccountResolver::collect(&config, &ledger).await.is_err());
    }
}
