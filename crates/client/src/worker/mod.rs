//! The offline worker.
//!
//! A [`Worker`] owns the current bucket, the fetch interceptor and the
//! background task pool, and routes lifecycle, fetch, push, click and sync
//! events through an explicit [`Dispatcher`].
//!
//! ### Lifecycle
//! `parsed → installing → installed → activating → activated`. A failed
//! install leaves the worker `redundant`; install may then be retried.
//! Fetches are only intercepted once `activated`; before that every fetch
//! is passed through untouched.

pub mod cache;
pub mod dispatch;
pub mod intercept;
pub mod lifecycle;
pub mod notify;
pub mod tasks;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use waystation_core::{AppConfig, CacheDb, Error, FetchRequest, FetchResponse};

pub use self::cache::CacheManager;
pub use self::dispatch::{Dispatcher, Event, EventHandler, EventKind, Outcome};
pub use self::intercept::{FetchInterceptor, Interception, Resolution, Source, Strategy};
pub use self::lifecycle::{ActivateHandler, InstallHandler, WorkerState};
pub use self::notify::{Notification, NotificationClick, NotificationClickHandler, PushHandler, PushMessage, SyncHandler};
pub use self::tasks::BackgroundTasks;
use crate::fetch::Network;

pub struct Worker {
    dispatcher: Dispatcher,
    state: Mutex<WorkerState>,
    cache: Arc<CacheManager>,
    network: Arc<dyn Network>,
    tasks: BackgroundTasks,
    skip_waiting: bool,
}

impl Worker {
    /// Build a worker for the bucket and manifest named by `config`, with
    /// the default handler registered for every event kind.
    pub fn new(config: &AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let cache = Arc::new(CacheManager::from_config(db, config)?);
        let tasks = BackgroundTasks::new();

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(
            EventKind::Install,
            Arc::new(InstallHandler::new(Arc::clone(&cache), Arc::clone(&network))),
        );
        dispatcher.register(EventKind::Activate, Arc::new(ActivateHandler::new(Arc::clone(&cache))));
        dispatcher.register(
            EventKind::Fetch,
            Arc::new(FetchInterceptor::new(
                Arc::clone(&cache),
                Arc::clone(&network),
                tasks.clone(),
                config.api_host_pattern.clone(),
                config.offline_path.clone(),
            )),
        );
        dispatcher.register(EventKind::Push, Arc::new(PushHandler::new(config.notification.clone())));
        dispatcher.register(
            EventKind::NotificationClick,
            Arc::new(NotificationClickHandler::new(config.notification.default_url.clone())),
        );
        dispatcher.register(EventKind::Sync, Arc::new(SyncHandler::new(config.sync_tags.clone())));

        Ok(Self {
            dispatcher,
            state: Mutex::new(WorkerState::Parsed),
            cache,
            network,
            tasks,
            skip_waiting: config.skip_waiting,
        })
    }

    /// Replace the handler for `kind`.
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.dispatcher.register(kind, handler);
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.lock().await
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub fn tasks(&self) -> &BackgroundTasks {
        &self.tasks
    }

    pub fn skip_waiting(&self) -> bool {
        self.skip_waiting
    }

    /// Dispatch one event, enforcing the lifecycle gates.
    pub async fn dispatch(&self, event: Event) -> Result<Outcome, Error> {
        match event {
            Event::Install => self.install().await,
            Event::Activate => self.activate().await,
            Event::Fetch(request) => {
                if !self.state().await.can_intercept_fetch() {
                    return Ok(Outcome::Fetched(Interception::PassThrough(request)));
                }
                self.dispatcher.dispatch(Event::Fetch(request)).await
            }
            other => self.dispatcher.dispatch(other).await,
        }
    }

    /// Install, then activate if `skip_waiting` is set.
    ///
    /// Returns the state the worker ends in.
    pub async fn start(&self) -> Result<WorkerState, Error> {
        self.install().await?;
        if self.skip_waiting {
            self.activate().await?;
        }
        Ok(self.state().await)
    }

    /// Intercept `request` as an active worker would.
    pub async fn intercept(&self, request: FetchRequest) -> Result<Interception, Error> {
        match self.dispatch(Event::Fetch(request)).await? {
            Outcome::Fetched(interception) => Ok(interception),
            other => Err(Error::InvalidState(format!("fetch handler produced {other:?}"))),
        }
    }

    /// Perform a request the worker declined, as the page would without a
    /// worker. Relative URLs are resolved against the app origin first.
    pub async fn pass_through(&self, request: FetchRequest) -> Result<FetchResponse, Error> {
        let url = self.cache.resolve(&request.url)?;
        let request = FetchRequest { url: url.to_string(), ..request };
        self.network.fetch(&request).await
    }

    async fn install(&self) -> Result<Outcome, Error> {
        self.transition(WorkerState::can_install, WorkerState::Installing).await?;

        match self.dispatcher.dispatch(Event::Install).await {
            Ok(outcome) => {
                self.set_state(WorkerState::Installed).await;
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(bucket = %self.cache.bucket(), error = %e, "install failed");
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// A failed activation puts the worker back where it was: `Installed`,
    /// or still `Activated` when re-activating.
    async fn activate(&self) -> Result<Outcome, Error> {
        let previous = self.transition(WorkerState::can_activate, WorkerState::Activating).await?;

        match self.dispatcher.dispatch(Event::Activate).await {
            Ok(outcome) => {
                self.set_state(WorkerState::Activated).await;
                Ok(outcome)
            }
            Err(e) => {
                tracing::warn!(bucket = %self.cache.bucket(), error = %e, "activation failed");
                self.set_state(previous).await;
                Err(e)
            }
        }
    }

    /// Move to `next` if `allowed` holds for the current state; returns the
    /// state moved from.
    async fn transition(&self, allowed: fn(&WorkerState) -> bool, next: WorkerState) -> Result<WorkerState, Error> {
        let mut state = self.state.lock().await;
        if !allowed(&state) {
            return Err(Error::InvalidState(format!("cannot move from {} to {next}", *state)));
        }
        tracing::info!(from = %*state, to = %next, "worker state change");
        let previous = *state;
        *state = next;
        Ok(previous)
    }

    async fn set_state(&self, next: WorkerState) {
        let mut state = self.state.lock().await;
        tracing::info!(from = %*state, to = %next, "worker state change");
        *state = next;
    }
}

/// A worker-controlled client: requests are intercepted, pass-throughs go
/// straight to the underlying network.
#[async_trait]
impl Network for Worker {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        match self.intercept(request.clone()).await? {
            Interception::Resolved(resolution) => Ok(resolution.response),
            Interception::PassThrough(request) => self.pass_through(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{API_URL, FakeNetwork, ORIGIN, test_config};

    async fn worker(config: &AppConfig, network: &Arc<FakeNetwork>) -> Worker {
        let db = CacheDb::open_in_memory().await.unwrap();
        Worker::new(config, db, network.clone()).unwrap()
    }

    fn serve_manifest(network: &FakeNetwork) {
        network.respond("/a.html", 200, "a");
        network.respond("/offline.html", 200, "you are offline");
    }

    #[tokio::test]
    async fn test_start_installs_and_activates() {
        let network = FakeNetwork::new();
        serve_manifest(&network);
        let worker = worker(&test_config(), &network).await;

        assert_eq!(worker.state().await, WorkerState::Parsed);
        assert_eq!(worker.start().await.unwrap(), WorkerState::Activated);

        for path in worker.cache().manifest() {
            let response = worker.cache().read_url(path).await.unwrap().unwrap();
            assert!(!response.body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_without_skip_waiting_stays_installed() {
        let network = FakeNetwork::new();
        serve_manifest(&network);
        let config = AppConfig { skip_waiting: false, ..test_config() };
        let worker = worker(&config, &network).await;

        assert_eq!(worker.start().await.unwrap(), WorkerState::Installed);
        worker.dispatch(Event::Activate).await.unwrap();
        assert_eq!(worker.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_failed_install_is_redundant_then_retried() {
        let network = FakeNetwork::new();
        network.respond("/a.html", 200, "a");
        network.fail("/offline.html");
        let worker = worker(&test_config(), &network).await;

        assert!(matches!(worker.start().await, Err(Error::InstallFailed(_))));
        assert_eq!(worker.state().await, WorkerState::Redundant);
        assert!(worker.cache().read_url("/a.html").await.unwrap().is_none());

        network.respond("/offline.html", 200, "you are offline");
        assert_eq!(worker.start().await.unwrap(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activate_before_install_rejected() {
        let network = FakeNetwork::new();
        let worker = worker(&test_config(), &network).await;

        let result = worker.dispatch(Event::Activate).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_eq!(worker.state().await, WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_install_while_active_rejected() {
        let network = FakeNetwork::new();
        serve_manifest(&network);
        let worker = worker(&test_config(), &network).await;
        worker.start().await.unwrap();

        assert!(matches!(worker.dispatch(Event::Install).await, Err(Error::InvalidState(_))));
        assert_eq!(worker.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activation_reaps_old_buckets() {
        let network = FakeNetwork::new();
        serve_manifest(&network);
        let worker = worker(&test_config(), &network).await;
        worker.cache().db().open_bucket("waystation-v0").await.unwrap();
        worker.cache().db().open_bucket("steelwool-crm-v1").await.unwrap();

        worker.start().await.unwrap();

        let names = worker.cache().db().bucket_names().await.unwrap();
        assert_eq!(names, vec![worker.cache().bucket().to_string()]);

        worker.dispatch(Event::Activate).await.unwrap();
        assert_eq!(worker.cache().db().bucket_names().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_before_activation_passes_through() {
        let network = FakeNetwork::new();
        network.respond("/a.html", 200, "live");
        let worker = worker(&test_config(), &network).await;

        let interception = worker.intercept(FetchRequest::get("/a.html")).await.unwrap();
        assert!(matches!(interception, Interception::PassThrough(_)));
        assert_eq!(network.total_calls(), 0);

        let response = worker.fetch(&FetchRequest::get("/a.html")).await.unwrap();
        assert_eq!(response.body_text(), "live");
        assert_eq!(network.calls(&format!("{ORIGIN}/a.html")), 1);
    }

    #[tokio::test]
    async fn test_same_origin_with_url_in_query_is_intercepted() {
        let network = FakeNetwork::new();
        serve_manifest(&network);
        let worker = worker(&test_config(), &network).await;
        worker.start().await.unwrap();

        let request = FetchRequest::navigate("/login?next=https://app.test/");
        let interception = worker.intercept(request.clone()).await.unwrap();
        assert_eq!(interception.strategy(), Strategy::CacheFirst);

        let response = worker.fetch(&request).await.unwrap();
        assert_eq!(response.body_text(), "you are offline");
    }

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _event: Event) -> Result<Outcome, Error> {
            Err(Error::CorruptEntry("bucket table unreadable".into()))
        }
    }

    #[tokio::test]
    async fn test_failed_reactivation_stays_activated() {
        let network = FakeNetwork::new();
        serve_manifest(&network);
        let mut worker = worker(&test_config(), &network).await;
        worker.start().await.unwrap();

        worker.register(EventKind::Activate, Arc::new(Failing));
        assert!(worker.dispatch(Event::Activate).await.is_err());
        assert_eq!(worker.state().await, WorkerState::Activated);

        let interception = worker.intercept(FetchRequest::get("/a.html")).await.unwrap();
        assert!(matches!(interception, Interception::Resolved(_)));
        worker.tasks().drain().await;
    }

    #[tokio::test]
    async fn test_failed_first_activation_returns_to_installed() {
        let network = FakeNetwork::new();
        serve_manifest(&network);
        let config = AppConfig { skip_waiting: false, ..test_config() };
        let mut worker = worker(&config, &network).await;
        worker.start().await.unwrap();

        worker.register(EventKind::Activate, Arc::new(Failing));
        assert!(worker.dispatch(Event::Activate).await.is_err());
        assert_eq!(worker.state().await, WorkerState::Installed);
    }

    #[tokio::test]
    async fn test_cached_page_survives_server_error() {
        let network = FakeNetwork::new();
        let config = AppConfig { static_assets: vec!["/a.html".into()], ..test_config() };
        network.respond("/a.html", 200, "<h1>a</h1>");
        let worker = worker(&config, &network).await;
        worker.start().await.unwrap();

        let cached = worker.cache().read_url("/a.html").await.unwrap().unwrap();
        assert_eq!(cached.status, 200);

        network.respond("/a.html", 500, "boom");
        let response = worker.fetch(&FetchRequest::get("/a.html")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body_text(), "<h1>a</h1>");

        worker.tasks().drain().await;
        let still = worker.cache().read_url("/a.html").await.unwrap().unwrap();
        assert_eq!(still.body_text(), "<h1>a</h1>");
    }

    #[tokio::test]
    async fn test_worker_as_network() {
        let network = FakeNetwork::new();
        serve_manifest(&network);
        network.respond("https://cdn.example.com/lib.js", 200, "lib");
        let worker = worker(&test_config(), &network).await;
        worker.start().await.unwrap();

        let passed = worker.fetch(&FetchRequest::get("https://cdn.example.com/lib.js")).await.unwrap();
        assert_eq!(passed.body_text(), "lib");

        network.fail(API_URL);
        let fallback = worker.fetch(&FetchRequest::get(API_URL)).await.unwrap();
        assert_eq!(fallback.body_text(), "you are offline");

        let absolute = format!("{ORIGIN}/a.html");
        let cached = worker.fetch(&FetchRequest::get(absolute)).await.unwrap();
        assert_eq!(cached.body_text(), "a");
    }

    struct Silent;

    #[async_trait]
    impl EventHandler for Silent {
        async fn handle(&self, _event: Event) -> Result<Outcome, Error> {
            Ok(Outcome::Unhandled)
        }
    }

    #[tokio::test]
    async fn test_register_replaces_default_handler() {
        let network = FakeNetwork::new();
        let mut worker = worker(&test_config(), &network).await;
        worker.register(EventKind::Sync, Arc::new(Silent));

        let outcome = worker.dispatch(Event::Sync("sync-leads".into())).await.unwrap();
        assert!(matches!(outcome, Outcome::Unhandled));
    }

    #[tokio::test]
    async fn test_hooks_dispatched() {
        let network = FakeNetwork::new();
        let worker = worker(&test_config(), &network).await;

        let outcome = worker.dispatch(Event::Push(PushMessage { payload: Some("hi".into()) })).await.unwrap();
        assert!(matches!(outcome, Outcome::Notify(n) if n.body == "hi"));

        let outcome = worker.dispatch(Event::Sync("sync-leads".into())).await.unwrap();
        assert!(matches!(outcome, Outcome::Synced { recognized: true, .. }));
    }
}
