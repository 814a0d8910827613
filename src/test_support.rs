//! Shared test doubles
//!
//! - [`FakeExecutor`]: scripted command results, records every command line
//! - [`RecordingFactory`] / [`RecordingMounter`]: mounters that log into a [`Journal`]
//! - [`FakeStorageServer`]: in-process HTTP fake of the remote storage API

use crate::domain::ports::{Mounter, MounterRef, Volume, VolumeConfig};
use crate::error::{Error, Result};
use crate::mounter::executor::{CommandOutput, Executor};
use crate::mounter::MounterFactory;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

// =============================================================================
// Journal
// =============================================================================

/// Ordered log of remote calls and mount actions shared by the doubles
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    /// Entries starting with `prefix`
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.0.lock().iter().position(|e| e == entry)
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Executor returning scripted output. Unscripted commands succeed with no output.
#[derive(Default)]
pub(crate) struct FakeExecutor {
    responses: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<String>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands whose line starts with `prefix`; later scripts win
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.responses.lock().push((prefix.to_string(), output));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn execute(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let line = if args.is_empty() {
            program.to_string()
        } else {
            format!("{} {}", program, args.join(" "))
        };
        self.calls.lock().push(line.clone());

        let output = self
            .responses
            .lock()
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }
}

// =============================================================================
// Mounters
// =============================================================================

/// Which mounter steps should fail
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct MounterFailures {
    pub mount: bool,
    pub unmount: bool,
    pub after_detach: bool,
}

/// Mounter that journals `mount:<backend>:<token>`, `unmount:<backend>`
/// and `after-detach:<backend>`
pub(crate) struct RecordingMounter {
    backend: String,
    journal: Journal,
    failures: MounterFailures,
}

#[async_trait]
impl Mounter for RecordingMounter {
    fn backend(&self) -> &str {
        &self.backend
    }

    async fn mount(&self, mountpoint: &str, _config: &VolumeConfig) -> Result<String> {
        self.journal.record(format!("mount:{}:{}", self.backend, mountpoint));
        if self.failures.mount {
            return Err(Error::MountFailed {
                backend: self.backend.clone(),
                reason: "scripted mount failure".into(),
            });
        }
        Ok(format!("/local{}", mountpoint))
    }

    async fn unmount(&self, _config: &VolumeConfig) -> Result<()> {
        self.journal.record(format!("unmount:{}", self.backend));
        if self.failures.unmount {
            return Err(Error::UnmountFailed {
                backend: self.backend.clone(),
                reason: "target is busy".into(),
            });
        }
        Ok(())
    }

    async fn action_after_detach(&self, _config: &VolumeConfig) -> Result<()> {
        self.journal.record(format!("after-detach:{}", self.backend));
        if self.failures.after_detach {
            return Err(Error::PostDetachFailed {
                backend: self.backend.clone(),
                reason: "multipath flush failed".into(),
            });
        }
        Ok(())
    }
}

/// Factory of [`RecordingMounter`]s. Backends named `unknown*` are not known.
pub(crate) struct RecordingFactory {
    journal: Journal,
    failures: MounterFailures,
    constructed: Arc<AtomicUsize>,
}

impl RecordingFactory {
    pub fn new(journal: Journal) -> Self {
        Self::with_failures(journal, MounterFailures::default())
    }

    pub fn with_failures(journal: Journal, failures: MounterFailures) -> Self {
        Self {
            journal,
            failures,
            constructed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Counter of constructed mounters
    pub fn constructed(&self) -> Arc<AtomicUsize> {
        self.constructed.clone()
    }
}

impl MounterFactory for RecordingFactory {
    fn create(&self, backend: &str) -> Option<MounterRef> {
        if backend.starts_with("unknown") {
            return None;
        }
        self.constructed.fetch_add(1, Ordering::SeqCst);
        // widen the race window for concurrent first resolves
        std::thread::sleep(std::time::Duration::from_millis(5));
        Some(Arc::new(RecordingMounter {
            backend: backend.to_string(),
            journal: self.journal.clone(),
            failures: self.failures,
        }))
    }
}

// =============================================================================
// Fake Remote Storage API
// =============================================================================

/// State behind the fake storage server
#[derive(Default)]
pub(crate) struct FakeStorageState {
    journal: Journal,
    volumes: Mutex<BTreeMap<String, Volume>>,
    configs: Mutex<BTreeMap<String, VolumeConfig>>,
    overrides: Mutex<HashMap<String, (StatusCode, String)>>,
    bodies: Mutex<HashMap<String, Value>>,
}

impl FakeStorageState {
    /// Journal entry `remote:<op>:<name>`, then any scripted response for `op`
    fn enter(&self, op: &str, name: &str) -> Option<Response> {
        self.journal.record(format!("remote:{}:{}", op, name));
        self.overrides
            .lock()
            .get(op)
            .map(|(status, body)| (*status, body.clone()).into_response())
    }
}

/// In-process fake of the remote storage API bound to an ephemeral port
pub(crate) struct FakeStorageServer {
    state: Arc<FakeStorageState>,
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl FakeStorageServer {
    pub async fn start(journal: Journal) -> Self {
        let state = Arc::new(FakeStorageState {
            journal,
            ..Default::default()
        });

        let app = Router::new()
            .route("/ubiquity_storage/activate", post(activate))
            .route("/ubiquity_storage/volumes", post(create_volume).get(list_volumes))
            .route(
                "/ubiquity_storage/volumes/:name",
                get(get_volume).delete(remove_volume),
            )
            .route("/ubiquity_storage/volumes/:name/config", get(get_volume_config))
            .route("/ubiquity_storage/volumes/:name/attach", put(attach))
            .route("/ubiquity_storage/volumes/:name/detach", put(detach))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            addr,
            handle,
        }
    }

    /// Base URL of the storage API
    pub fn url(&self) -> String {
        format!("http://{}/ubiquity_storage", self.addr)
    }

    pub fn add_volume(&self, volume: Volume, config: VolumeConfig) {
        self.state.configs.lock().insert(volume.name.clone(), config);
        self.state.volumes.lock().insert(volume.name.clone(), volume);
    }

    pub fn volume(&self, name: &str) -> Option<Volume> {
        self.state.volumes.lock().get(name).cloned()
    }

    /// Answer every `op` call with `status` and the raw `body`
    pub fn respond(&self, op: &str, status: StatusCode, body: &str) {
        self.state
            .overrides
            .lock()
            .insert(op.to_string(), (status, body.to_string()));
    }

    /// Last JSON body received for `op`
    pub fn last_body(&self, op: &str) -> Option<Value> {
        self.state.bodies.lock().get(op).cloned()
    }
}

impl Drop for FakeStorageServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn not_found(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "Err": format!("volume {} not found", name) })),
    )
        .into_response()
}

async fn activate(State(state): State<Arc<FakeStorageState>>, Json(body): Json<Value>) -> Response {
    if let Some(response) = state.enter("activate", "") {
        return response;
    }
    state.bodies.lock().insert("activate".into(), body);
    Json(json!({})).into_response()
}

async fn create_volume(
    State(state): State<Arc<FakeStorageState>>,
    Json(body): Json<Value>,
) -> Response {
    let name = body["Name"].as_str().unwrap_or_default().to_string();
    if let Some(response) = state.enter("create-volume", &name) {
        return response;
    }
    state.bodies.lock().insert("create-volume".into(), body.clone());

    let volume = Volume {
        name: name.clone(),
        backend: body["Backend"].as_str().unwrap_or_default().to_string(),
        capacity_bytes: body["CapacityBytes"].as_u64().unwrap_or_default(),
        ..Default::default()
    };
    state.volumes.lock().insert(name.clone(), volume);
    state.configs.lock().insert(name, VolumeConfig::new());
    Json(json!({})).into_response()
}

async fn list_volumes(State(state): State<Arc<FakeStorageState>>) -> Response {
    if let Some(response) = state.enter("list-volumes", "") {
        return response;
    }
    let volumes: Vec<Volume> = state.volumes.lock().values().cloned().collect();
    Json(json!({ "Volumes": volumes })).into_response()
}

async fn get_volume(State(state): State<Arc<FakeStorageState>>, Path(name): Path<String>) -> Response {
    if let Some(response) = state.enter("get-volume", &name) {
        return response;
    }
    match state.volumes.lock().get(&name) {
        Some(volume) => Json(json!({ "Volume": volume })).into_response(),
        None => not_found(&name),
    }
}

async fn remove_volume(
    State(state): State<Arc<FakeStorageState>>,
    Path(name): Path<String>,
) -> Response {
    if let Some(response) = state.enter("remove-volume", &name) {
        return response;
    }
    if state.volumes.lock().remove(&name).is_none() {
        return not_found(&name);
    }
    state.configs.lock().remove(&name);
    Json(json!({})).into_response()
}

async fn get_volume_config(
    State(state): State<Arc<FakeStorageState>>,
    Path(name): Path<String>,
) -> Response {
    if let Some(response) = state.enter("get-volume-config", &name) {
        return response;
    }
    match state.configs.lock().get(&name) {
        Some(config) => Json(json!({ "VolumeConfig": config })).into_response(),
        None => not_found(&name),
    }
}

async fn attach(
    State(state): State<Arc<FakeStorageState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(response) = state.enter("attach", &name) {
        return response;
    }
    state.bodies.lock().insert("attach".into(), body);

    let mut volumes = state.volumes.lock();
    match volumes.get_mut(&name) {
        Some(volume) => {
            volume.mountpoint = format!("/ubiquity/{}", name);
            Json(json!({ "Mountpoint": volume.mountpoint })).into_response()
        }
        None => not_found(&name),
    }
}

async fn detach(
    State(state): State<Arc<FakeStorageState>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(response) = state.enter("detach", &name) {
        return response;
    }
    state.bodies.lock().insert("detach".into(), body);

    let mut volumes = state.volumes.lock();
    match volumes.get_mut(&name) {
        Some(volume) => {
            volume.mountpoint.clear();
            Json(json!({})).into_response()
        }
        None => not_found(&name),
    }
}

/// Base URL nothing listens on
pub(crate) const UNREACHABLE_URL: &str = "http://127.0.0.1:1/ubiquity_storage";
