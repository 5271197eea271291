use anyhow::Result;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rocket::{get, post, routes, Build, Rocket, State};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Mutex;

use crate::bunq_api::Bunq;
use crate::config::{ApiSettings, Config};
use crate::db::{DownloadStore, FileStore, JobId, JobStatus, JobStatusStore};
use crate::firefly_api::Firefly;
use crate::sync::RoutineManager;

pub struct ServerState {
    config: Config,
    bunq: Bunq,
    firefly: Firefly,
    downloads: DownloadStore<FileStore>,
    statuses: JobStatusStore<FileStore>,
    active_jobs: Mutex<HashSet<JobId>>,
}

impl ServerState {
    pub fn new(config: Config, settings: &ApiSettings, storage_dir: &Path) -> Result<Self> {
        Ok(Self {
            config,
            bunq: Bunq::new(&settings.bunq)?,
            firefly: Firefly::new(&settings.firefly)?,
            downloads: DownloadStore::new(FileStore::new(storage_dir.join("downloads"))),
            statuses: JobStatusStore::new(FileStore::new(storage_dir.join("jobs"))),
            active_jobs: Mutex::new(HashSet::new()),
        })
    }

    /// Returns None if the job is already running in this server
    fn claim(&self, identifier: &JobId) -> Option<ActiveJob<'_>> {
        let claimed = self
            .active_jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(identifier.clone());
        claimed.then(|| ActiveJob {
            state: self,
            identifier: identifier.clone(),
        })
    }
}

/// Marks a job as running in this server until dropped
struct ActiveJob<'a> {
    state: &'a ServerState,
    identifier: JobId,
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.state
            .active_jobs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.identifier);
    }
}

#[derive(Serialize, Debug)]
struct JobResponse {
    identifier: JobId,
    #[serde(flatten)]
    status: JobStatus,
}

#[derive(Deserialize, Debug)]
struct StartRequest {
    #[serde(default)]
    identifier: Option<String>,
}

type ApiResult<T> = std::result::Result<Json<T>, Custom<String>>;

fn internal_error(err: anyhow::Error) -> Custom<String> {
    log::error!("Request failed: {err:#}");
    Custom(Status::InternalServerError, format!("{err:#}"))
}

fn parse_identifier(identifier: &str) -> std::result::Result<JobId, Custom<String>> {
    JobId::parse(identifier).map_err(|err| Custom(Status::BadRequest, format!("{err:#}")))
}

pub fn build(state: ServerState, address: IpAddr, port: u16) -> Rocket<Build> {
    rocket::custom(rocket::Config {
        log_level: rocket::config::LogLevel::Critical,
        address,
        port,
        ..Default::default()
    })
    .manage(state)
    .mount("/", routes![job_status, start_job])
}

pub async fn serve(state: ServerState, address: IpAddr, port: u16) -> Result<()> {
    log::info!("Listening on http://{address}:{port}");
    build(state, address, port).launch().await?;
    Ok(())
}

#[get("/status?<identifier>")]
async fn job_status(identifier: &str, state: &State<ServerState>) -> ApiResult<JobResponse> {
    let identifier = parse_identifier(identifier)?;
    match state.statuses.get(&identifier).await.map_err(internal_error)? {
        Some(status) => Ok(Json(JobResponse { identifier, status })),
        None => Err(Custom(
            Status::NotFound,
            format!("No job with identifier \"{identifier}\""),
        )),
    }
}

#[post("/start", format = "json", data = "<request>")]
async fn start_job(request: Json<StartRequest>, state: &State<ServerState>) -> ApiResult<JobResponse> {
    let identifier = request
        .into_inner()
        .identifier
        .map(|identifier| parse_identifier(&identifier))
        .transpose()?;
    let routine = RoutineManager::new(
        &state.config,
        &state.bunq,
        &state.firefly,
        &state.downloads,
        &state.statuses,
        identifier,
    )
    .await
    .map_err(internal_error)?;
    let identifier = routine.identifier().clone();

    let Some(_active) = state.claim(&identifier) else {
        let status = routine.status().await.map_err(internal_error)?;
        return Ok(Json(JobResponse { identifier, status }));
    };
    let status = routine.start().await.map_err(internal_error)?;
    Ok(Json(JobResponse { identifier, status }))
}
