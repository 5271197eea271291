use anyhow::Result;
use chrono::{Local, NaiveDate};
use rand::thread_rng;

use super::classify::TransactionClassifier;
use super::filter::DeduplicationFilter;
use super::progress::Progress;
use super::resolver::AccountResolver;
use super::submit::Submitter;
use crate::bunq_api::{DateFilter, PaymentFetcher, SourceApi};
use crate::config::Config;
use crate::db::{
    generate_identifier, Download, DownloadStore, JobId, JobState, JobStatus, JobStatusStore, KeyValueStore,
};
use crate::firefly_api::LedgerApi;

const ALREADY_DOWNLOADED: &str = "Already had data. This is not a problem though.";

/// Runs one import job: download, classify, deduplicate and submit.
/// Progress is stored after every step so the job can be watched while it runs.
pub struct RoutineManager<'a, A: SourceApi, L: LedgerApi, S: KeyValueStore> {
    config: &'a Config,
    source: &'a A,
    ledger: &'a L,
    downloads: &'a DownloadStore<S>,
    statuses: &'a JobStatusStore<S>,
    identifier: JobId,
    today: NaiveDate,
}

impl<'a, A: SourceApi, L: LedgerApi, S: KeyValueStore> RoutineManager<'a, A, L, S> {
    /// Continues the job with the given identifier, or registers a new job
    pub async fn new(
        config: &'a Config,
        source: &'a A,
        ledger: &'a L,
        downloads: &'a DownloadStore<S>,
        statuses: &'a JobStatusStore<S>,
        identifier: Option<JobId>,
    ) -> Result<Self> {
        let identifier = match identifier {
            Some(identifier) => identifier,
            None => {
                let taken = statuses.identifiers().await?;
                generate_identifier(&mut thread_rng(), |candidate| taken.contains(candidate.as_str()))?
            }
        };
        statuses.start_or_find(&identifier).await?;
        Ok(Self {
            config,
            source,
            ledger,
            downloads,
            statuses,
            identifier,
            today: Local::now().date_naive(),
        })
    }

    pub fn identifier(&self) -> &JobId {
        &self.identifier
    }

    pub async fn status(&self) -> Result<JobStatus> {
        self.statuses.start_or_find(&self.identifier).await
    }

    /// Runs the job unless it already finished. A finished job is left alone and its
    /// status returned as is. A job stored as running is taken over, the run that
    /// stored it is gone. Callers sharing stores must not start the same job twice.
    pub async fn start(&self) -> Result<JobStatus> {
        let mut status = self.statuses.start_or_find(&self.identifier).await?;
        match status.status {
            JobState::Done => {
                log::info!("Not starting job \"{}\" because it is done", self.identifier);
                return Ok(status);
            }
            JobState::Running => {
                log::warn!("Job \"{}\" was left running by an earlier run, restarting it", self.identifier);
            }
            JobState::Waiting | JobState::Errored => {}
        }

        log::info!("Starting job \"{}\"...", self.identifier);
        let mut progress = Progress::new();
        status.status = JobState::Running;
        self.save(&mut status, &progress).await?;

        match self.run(&mut status, &mut progress).await {
            Ok(()) => {
                status.status = JobState::Done;
                log::info!("Starting job \"{}\"...done", self.identifier);
            }
            Err(err) => {
                log::error!("Job \"{}\" failed: {err:#}", self.identifier);
                progress.add_error(0, format!("{err:#}"));
                status.status = JobState::Errored;
            }
        }
        self.save(&mut status, &progress).await?;
        Ok(status)
    }

    async fn run(&self, status: &mut JobStatus, progress: &mut Progress) -> Result<()> {
        let download = self.download(status, progress).await?;
        self.save(status, progress).await?;

        let resolver = AccountResolver::collect(self.config, self.ledger).await?;
        let transactions = TransactionClassifier::new(self.config, resolver)
            .classify(&download, progress)
            .await;
        self.save(status, progress).await?;

        let transactions = DeduplicationFilter::new().filter(transactions, progress);
        self.save(status, progress).await?;

        Submitter::new(self.ledger).send(&transactions, progress).await;
        Ok(())
    }

    /// Downloads payments from bunq without importing them, and records how that went
    /// in the job status. A later start of the job imports this download.
    pub async fn prepare(&self) -> Result<(Download, JobStatus)> {
        let mut status = self.statuses.start_or_find(&self.identifier).await?;
        let mut progress = Progress::new();
        let download = self.download(&mut status, &mut progress).await?;
        if status.status == JobState::Done {
            progress.write_to(&mut status);
        } else {
            self.save(&mut status, &progress).await?;
        }
        Ok((download, status))
    }

    /// Downloads payments from bunq, unless this job already did
    async fn download(&self, status: &mut JobStatus, progress: &mut Progress) -> Result<Download> {
        if self.downloads.has(&self.identifier).await? {
            log::info!("Job \"{}\" already has a download", self.identifier);
            progress.add_message(0, ALREADY_DOWNLOADED);
            for (index, error) in status.download_errors.iter() {
                progress.add_error(index, error);
            }
            return self.downloads.get(&self.identifier).await;
        }
        let (not_before, not_after) = self.config.date_bounds(self.today)?;
        let fetcher = PaymentFetcher::new(
            self.source,
            DateFilter::new(not_before, not_after),
            self.config.page_delay(),
        );
        let mut fetched = Progress::new();
        let result = fetcher.fetch(self.config.accounts.keys().copied(), &mut fetched).await;
        for (index, error) in fetched.errors.iter() {
            progress.add_error(index, error);
        }
        let download = result?;
        self.downloads.put(&self.identifier, &download).await?;
        status.download_errors = fetched.errors;
        Ok(download)
    }

    async fn save(&self, status: &mut JobStatus, progress: &Progress) -> Result<()> {
        progress.write_to(status);
        self.statuses.put(&self.identifier, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{BunqAccountId, MemoryStore, PaymentId};
    use crate::firefly_api::{AccountKind, LedgerAccountId};
    use crate::sync::{AccountRef, TransactionType};
    use crate::testutils::{counter_party, ledger_account, payment, MockBank, MockLedger};

    struct Fixture {
        config: Config,
        downloads: DownloadStore<MemoryStore>,
        statuses: JobStatusStore<MemoryStore>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: crate::config::parse(br#"{"accounts": {"1": 7, "2": 8}, "page_delay_secs": 0}"#).unwrap(),
                downloads: DownloadStore::new(MemoryStore::new()),
                statuses: JobStatusStore::new(MemoryStore::new()),
            }
        }
    }

    fn id(identifier: &str) -> JobId {
        JobId::parse(identifier).unwrap()
    }

    fn ledger() -> MockLedger {
        MockLedger::new(vec![
            ledger_account(7, "Checking", AccountKind::Asset, Some("NL02BUNQ0000000001")),
            ledger_account(8, "Savings", AccountKind::Asset, Some("NL02BUNQ0000000002")),
        ])
    }

    /// A transfer from account 1 to account 2, seen from both sides, plus a card payment
    fn bank() -> MockBank {
        let mut outgoing = payment(10, 1, "-25.00", "2020-03-04 10:11:12.100000");
        outgoing.counter_party = counter_party("Savings", Some("NL02BUNQ0000000002"));
        outgoing.description = "Saving up".to_string();
        let mut incoming = payment(20, 2, "25.00", "2020-03-04 10:11:12.300000");
        incoming.counter_party = counter_party("Checking", Some("NL02BUNQ0000000001"));
        incoming.description = "Saving up".to_string();
        MockBank::new()
            .with_pages(1, vec![vec![outgoing, payment(11, 1, "-3.50", "2020-03-05 08:00:00.0")]])
            .with_pages(2, vec![vec![incoming]])
    }

    #[tokio::test]
    async fn runs_whole_pipeline() {
        let fixture = Fixture::new();
        let bank = bank();
        let ledger = ledger();
        let routine = RoutineManager::new(
            &fixture.config,
            &bank,
            &ledger,
            &fixture.downloads,
            &fixture.statuses,
            None,
        )
        .await
        .unwrap();
        assert_eq!(16, routine.identifier().as_str().len());
        assert_eq!(JobState::Waiting, routine.status().await.unwrap().status);

        let status = routine.start().await.unwrap();

        assert_eq!(JobState::Done, status.status);
        assert!(status.errors.is_empty(), "{:?}", status.errors);
        assert_eq!(
            &[
                "Parsed 3 bunq transactions for further processing.".to_string(),
                "Filtered down from 3 (possibly duplicate) entries to 2 unique transactions.".to_string(),
            ],
            status.messages.at(0)
        );
        assert_eq!(1, status.messages.at(1).len());
        assert_eq!(1, status.messages.at(2).len());
        assert_eq!(Some(status.clone()), fixture.statuses.get(routine.identifier()).await.unwrap());

        let stored = ledger.stored();
        assert_eq!(
            vec![PaymentId(10), PaymentId(11)],
            stored.iter().map(|t| t.bunq_payment_id).collect::<Vec<_>>()
        );
        assert_eq!(TransactionType::Transfer, stored[0].type_);
        assert_eq!(AccountRef::Id(LedgerAccountId(8)), stored[0].destination);
        assert_eq!(TransactionType::Withdrawal, stored[1].type_);

        let download = fixture.downloads.get(routine.identifier()).await.unwrap();
        assert_eq!(2, download[&BunqAccountId(1)].len());
        assert_eq!(1, download[&BunqAccountId(2)].len());
    }

    #[tokio::test]
    async fn reuses_existing_download() {
        let fixture = Fixture::new();
        let mut download = Download::new();
        download.insert(BunqAccountId(1), vec![payment(30, 1, "-1.00", "2020-03-04 10:11:12.0")]);
        fixture.downloads.put(&id("resumed"), &download).await.unwrap();
        let bank = bank();
        let ledger = ledger();
        let routine = RoutineManager::new(
            &fixture.config,
            &bank,
            &ledger,
            &fixture.downloads,
            &fixture.statuses,
            Some(id("resumed")),
        )
        .await
        .unwrap();

        let status = routine.start().await.unwrap();

        assert_eq!(JobState::Done, status.status);
        assert_eq!(ALREADY_DOWNLOADED, status.messages.at(0)[0]);
        assert_eq!(0, bank.bootstraps());
        assert!(bank.payment_requests().is_empty());
        assert_eq!(vec![PaymentId(30)], ledger.stored().iter().map(|t| t.bunq_payment_id).collect::<Vec<_>>());
        assert_eq!(
            serde_json::to_vec(&download).unwrap(),
            fixture.downloads.get_raw(&id("resumed")).await.unwrap().unwrap()
        );
    }

    #[tokio::test]
    async fn bootstrap_failure_errors_the_job() {
        let fixture = Fixture::new();
        let bank = bank().with_failing_bootstrap();
        let ledger = ledger();
        let routine = RoutineManager::new(
            &fixture.config,
            &bank,
            &ledger,
            &fixture.downloads,
            &fixture.statuses,
            Some(id("job")),
        )
        .await
        .unwrap();

        let status = routine.start().await.unwrap();

        assert_eq!(JobState::Errored, status.status);
        assert_eq!(1, status.errors.at(0).len());
        assert!(!fixture.downloads.has(&id("job")).await.unwrap());
        assert!(ledger.stored().is_empty());
    }

    #[tokio::test]
    async fn failing_account_list_errors_the_job() {
        let fixture = Fixture::new();
        let bank = bank();
        let ledger = ledger().with_failing_account_list();
        let routine = RoutineManager::new(
            &fixture.config,
            &bank,
            &ledger,
            &fixture.downloads,
            &fixture.statuses,
            Some(id("job")),
        )
        .await
        .unwrap();

        let status = routine.start().await.unwrap();

        assert_eq!(JobState::Errored, status.status);
        assert!(status.errors.at(0)[0].contains("Failed to collect accounts"));
        assert!(fixture.downloads.has(&id("job")).await.unwrap());
    }

    #[tokio::test]
    async fn errored_job_can_be_restarted_but_done_job_is_not_run_again() {
        let fixture = Fixture::new();
        let bank = bank();
        let failing_ledger = ledger().with_failing_account_list();
        let ledger = ledger();

        let first = RoutineManager::new(
            &fixture.config,
            &bank,
            &failing_ledger,
            &fixture.downloads,
            &fixture.statuses,
            Some(id("job")),
        )
        .await
        .unwrap();
        assert_eq!(JobState::Errored, first.start().await.unwrap().status);

        let second = RoutineManager::new(
            &fixture.config,
            &bank,
            &ledger,
            &fixture.downloads,
            &fixture.statuses,
            Some(id("job")),
        )
        .await
        .unwrap();
        let status = second.start().await.unwrap();
        assert_eq!(JobState::Done, status.status);
        assert!(status.errors.is_empty());
        assert_eq!(2, ledger.stored().len());

        let again = second.start().await.unwrap();
        assert_eq!(status, again);
        assert_eq!(2, ledger.stored().len());
        assert_eq!(1, bank.bootstraps());
    }

    #[tokio::test]
    async fn single_failures_are_reported_but_job_finishes() {
        let fixture = Fixture::new();
        let bank = bank().with_failure_at_page(2, 1);
        let ledger = ledger().rejecting(11);
        let routine = RoutineManager::new(
            &fixture.config,
            &bank,
            &ledger,
            &fixture.downloads,
            &fixture.statuses,
            Some(id("job")),
        )
        .await
        .unwrap();

        let status = routine.start().await.unwrap();

        assert_eq!(JobState::Done, status.status);
        assert_eq!(1, status.errors.at(0).len());
        assert_eq!(1, status.errors.at(2).len());
        assert_eq!(vec![PaymentId(10)], ledger.stored().iter().map(|t| t.bunq_payment_id).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn job_left_running_is_restarted() {
        let fixture = Fixture::new();
        let mut stale = JobStatus::new();
        stale.status = JobState::Running;
        fixture.statuses.put(&id("crashed"), &stale).await.unwrap();
        let bank = bank();
        let ledger = ledger();
        let routine = RoutineManager::new(
            &fixture.config,
            &bank,
            &ledger,
            &fixture.downloads,
            &fixture.statuses,
            Some(id("crashed")),
        )
        .await
        .unwrap();

        let status = routine.start().await.unwrap();

        assert_eq!(JobState::Done, status.status);
        assert_eq!(2, bank.payment_requests().len());
        assert_eq!(2, ledger.stored().len());
        assert_eq!(Some(status), fixture.statuses.get(&id("crashed")).await.unwrap());
    }

    #[tokio::test]
    async fn download_errors_are_kept_when_the_download_is_reused() {
        let fixture = Fixture::new();
        let bank = bank().with_failure_at_page(2, 1);
        let ledger = ledger();
        let routine = RoutineManager::new(
            &fixture.config,
            &bank,
            &ledger,
            &fixture.downloads,
            &fixture.statuses,
            Some(id("job")),
        )
        .await
        .unwrap();

        let (download, prepared) = routine.prepare().await.unwrap();

        assert_eq!(2, download.values().flatten().count());
        assert_eq!(JobState::Waiting, prepared.status);
        assert!(prepared.errors.at(0)[0].contains("bunq account #2"));
        assert_eq!(prepared.errors, prepared.download_errors);
        assert_eq!(Some(prepared.clone()), fixture.statuses.get(&id("job")).await.unwrap());

        let status = routine.start().await.unwrap();

        assert_eq!(JobState::Done, status.status);
        assert_eq!(ALREADY_DOWNLOADED, status.messages.at(0)[0]);
        assert_eq!(prepared.errors.at(0), status.errors.at(0));
        assert_eq!(2, bank.payment_requests().len());
        assert_eq!(1, bank.bootstraps());
    }

    #[tokio::test]
    async fn submission_lines_follow_the_download() {
        let fixture = Fixture::new();
        let mut outgoing = payment(10, 1, "-25.00", "2020-03-04 10:11:12.100000");
        outgoing.counter_party = counter_party("Savings", Some("NL02BUNQ0000000002"));
        outgoing.description = "Saving up".to_string();
        let mut incoming = payment(20, 2, "25.00", "2020-03-04 10:11:12.300000");
        incoming.counter_party = counter_party("Checking", Some("NL02BUNQ0000000001"));
        incoming.description = "Saving up".to_string();
        let bank = MockBank::new()
            .with_pages(1, vec![vec![outgoing]])
            .with_pages(2, vec![vec![incoming, payment(21, 2, "-3.50", "2020-03-05 08:00:00.0")]]);
        let ledger = ledger().rejecting(21);
        let routine = RoutineManager::new(
            &fixture.config,
            &bank,
            &ledger,
            &fixture.downloads,
            &fixture.statuses,
            Some(id("job")),
        )
        .await
        .unwrap();

        let status = routine.start().await.unwrap();

        assert_eq!(JobState::Done, status.status);
        assert_eq!(vec![PaymentId(10)], ledger.stored().iter().map(|t| t.bunq_payment_id).collect::<Vec<_>>());
        assert_eq!(1, status.messages.at(1).len());
        assert!(status.errors.at(2).is_empty());
        assert_eq!(1, status.errors.at(3).len());
    }
}
