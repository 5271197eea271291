use anyhow::{anyhow, bail, Context as _, Result};
use console::style;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::args::{Args, Command};
use crate::bunq_api::{Bunq, SourceApi};
use crate::config::{self, ApiSettings, Config};
use crate::db::{Download, DownloadStore, FileStore, JobId, JobState, JobStatus, JobStatusStore};
use crate::firefly_api::{mapping_candidates, Firefly, LedgerApi};
use crate::server::{self, ServerState};
use crate::sync::{counter_parties, RoutineManager};
use crate::terminal::{print_job_report, style_header, style_job_state, BulletPointPrinter, StdoutLineWriter};

pub async fn main(args: Args) -> Result<()> {
    let cli = Cli::new(args.config, args.storage_dir);
    match args.command {
        Command::TestConnection => cli.main_test_connection().await,
        Command::ListBunqAccounts => cli.main_list_bunq_accounts().await,
        Command::ListLedgerAccounts => cli.main_list_ledger_accounts().await,
        Command::Download { identifier } => cli.main_download(parse_identifier(identifier)?).await,
        Command::CounterParties { identifier } => cli.main_counter_parties(JobId::parse(&identifier)?).await,
        Command::Import { identifier } => cli.main_import(parse_identifier(identifier)?).await,
        Command::Status { identifier } => cli.main_status(JobId::parse(&identifier)?).await,
        Command::Serve { address, port } => cli.main_serve(address, port).await,
    }
}

fn parse_identifier(identifier: Option<String>) -> Result<Option<JobId>> {
    identifier.as_deref().map(JobId::parse).transpose()
}

pub struct Cli {
    config_path: PathBuf,
    storage_dir: PathBuf,
    downloads: DownloadStore<FileStore>,
    statuses: JobStatusStore<FileStore>,
}

impl Cli {
    pub fn new(config_path: PathBuf, storage_dir: PathBuf) -> Self {
        Self {
            downloads: DownloadStore::new(FileStore::new(storage_dir.join("downloads"))),
            statuses: JobStatusStore::new(FileStore::new(storage_dir.join("jobs"))),
            config_path,
            storage_dir,
        }
    }

    async fn load_config(&self) -> Result<Config> {
        config::load(&self.config_path).await
    }

    fn settings() -> Result<ApiSettings> {
        ApiSettings::from_env().context("Missing connection settings")
    }

    async fn connect_bunq(settings: &ApiSettings) -> Result<Bunq> {
        let bunq = Bunq::new(&settings.bunq)?;
        bunq.bootstrap().await.context("bunq API connection failed")?;
        Ok(bunq)
    }

    pub async fn main_test_connection(&self) -> Result<()> {
        let settings = Self::settings()?;
        let printer = BulletPointPrinter::new_stdout();
        println!("{}", style_header("Testing connections:"));

        Self::connect_bunq(&settings).await?;
        printer.print_item(format!("bunq at {}: {}", settings.bunq.uri, style("ok").green()));

        let firefly = Firefly::new(&settings.firefly)?;
        let about = firefly
            .about()
            .await
            .context("Firefly III API connection failed")?;
        printer.print_item(format!(
            "Firefly III {} at {}: {}",
            about.version,
            settings.firefly.uri,
            style("ok").green()
        ));
        Ok(())
    }

    pub async fn main_list_bunq_accounts(&self) -> Result<()> {
        let bunq = Self::connect_bunq(&Self::settings()?).await?;
        let accounts = bunq.monetary_accounts().await?;
        println!("{}", style_header("bunq accounts:"));
        let printer = BulletPointPrinter::new_stdout();
        if accounts.is_empty() {
            printer.print_none();
        }
        for account in &accounts {
            printer.print_item(style(format!("{account:?}")).magenta());
        }
        Ok(())
    }

    pub async fn main_list_ledger_accounts(&self) -> Result<()> {
        let firefly = Firefly::new(&Self::settings()?.firefly)?;
        let accounts = firefly.accounts().await?;
        println!("{}", style_header("Firefly III accounts:"));
        let printer = BulletPointPrinter::new_stdout();
        let candidates = mapping_candidates(&accounts);
        if candidates.is_empty() {
            printer.print_none();
        }
        for (kind, accounts) in candidates {
            printer.print_item(style(kind.as_str()).cyan().bold());
            let printer = printer.indent();
            for (id, name) in accounts {
                printer.print_item(format!("{} {}", style(format!("#{id}")).dim(), style(name).magenta()));
            }
        }
        Ok(())
    }

    pub async fn main_download(&self, identifier: Option<JobId>) -> Result<()> {
        let config = self.load_config().await?;
        let settings = Self::settings()?;
        let bunq = Bunq::new(&settings.bunq)?;
        let firefly = Firefly::new(&settings.firefly)?;
        let routine = RoutineManager::new(
            &config,
            &bunq,
            &firefly,
            &self.downloads,
            &self.statuses,
            identifier,
        )
        .await?;

        let (download, status) = routine.prepare().await?;
        println!("{}", style_header("Downloaded:"));
        print_download(&download);
        print_job_report(StdoutLineWriter, &status);
        println!("Job identifier: {}", style(routine.identifier()).bold());
        Ok(())
    }

    pub async fn main_counter_parties(&self, identifier: JobId) -> Result<()> {
        if !self.downloads.has(&identifier).await? {
            bail!("Job \"{identifier}\" has no download in {}", self.storage_dir.display());
        }
        let download = self.downloads.get(&identifier).await?;
        println!("{}", style_header("Counter-parties:"));
        let printer = BulletPointPrinter::new_stdout();
        let counter_parties = counter_parties(&download);
        if counter_parties.is_empty() {
            printer.print_none();
        }
        for counter_party in counter_parties {
            printer.print_item(counter_party);
        }
        Ok(())
    }

    pub async fn main_import(&self, identifier: Option<JobId>) -> Result<()> {
        let config = self.load_config().await?;
        let settings = Self::settings()?;
        let bunq = Bunq::new(&settings.bunq)?;
        let firefly = Firefly::new(&settings.firefly)?;
        let routine = RoutineManager::new(
            &config,
            &bunq,
            &firefly,
            &self.downloads,
            &self.statuses,
            identifier,
        )
        .await?;
        println!("Job identifier: {}", style(routine.identifier()).bold());

        let status = routine.start().await?;
        print_status(&status);
        if status.status == JobState::Errored {
            bail!("Import job \"{}\" failed", routine.identifier());
        }
        Ok(())
    }

    pub async fn main_status(&self, identifier: JobId) -> Result<()> {
        let status = self
            .statuses
            .get(&identifier)
            .await?
            .ok_or_else(|| anyhow!("No job with identifier \"{identifier}\""))?;
        print_status(&status);
        Ok(())
    }

    pub async fn main_serve(&self, address: IpAddr, port: u16) -> Result<()> {
        let config = self.load_config().await?;
        let state = ServerState::new(config, &Self::settings()?, &self.storage_dir)?;
        server::serve(state, address, port).await
    }
}

fn print_status(status: &JobStatus) {
    println!("{} {}", style_header("Status:"), style_job_state(status.status));
    print_job_report(StdoutLineWriter, status);
}

fn print_download(download: &Download) {
    let printer = BulletPointPrinter::new_stdout();
    if download.is_empty() {
        printer.print_none();
    }
    for (account, payments) in download {
        printer.print_item(format!(
            "{} {} payments",
            style(format!("bunq account #{account}")).magenta(),
            payments.len()
        ));
    }
}
