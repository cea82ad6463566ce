#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio::sync::{watch, Notify};
use tower::ServiceExt;

use idlewatch::error::{Error, Result};
use idlewatch::idle::IdleProbe;
use idlewatch::logging::Journal;
use idlewatch::monitor::MonitorState;
use idlewatch::power::ShutdownAction;
use idlewatch::server::{self, AppState};
use idlewatch::threshold::ThresholdStore;

/// Probe reporting a settable idle time in milliseconds. `u64::MAX` fails.
#[derive(Default)]
pub struct FixedProbe {
    millis: AtomicU64,
}

impl FixedProbe {
    pub fn new(millis: u64) -> Arc<Self> {
        Arc::new(Self {
            millis: AtomicU64::new(millis),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Self::new(u64::MAX)
    }
}

impl IdleProbe for FixedProbe {
    fn sample(&self) -> Result<Duration> {
        match self.millis.load(Ordering::SeqCst) {
            u64::MAX => Err(Error::ProbeUnavailable("no display".to_string())),
            ms => Ok(Duration::from_millis(ms)),
        }
    }
}

/// Probe that blocks inside `sample` until released by the test.
pub struct GatedProbe {
    pub started: Notify,
    release: Mutex<mpsc::Receiver<()>>,
    idle: Duration,
}

impl GatedProbe {
    pub fn new(idle: Duration) -> (Arc<Self>, mpsc::Sender<()>) {
        let (release, gate) = mpsc::channel();
        let probe = Arc::new(Self {
            started: Notify::new(),
            release: Mutex::new(gate),
            idle,
        });
        (probe, release)
    }
}

impl IdleProbe for GatedProbe {
    fn sample(&self) -> Result<Duration> {
        self.started.notify_one();
        self.release
            .lock()
            .unwrap()
            .recv_timeout(Duration::from_secs(5))
            .map(|()| self.idle)
            .map_err(|_| Error::ProbeUnavailable("never released".to_string()))
    }
}

/// Shutdown action that only counts invocations.
#[derive(Default)]
pub struct CountingShutdown {
    triggers: AtomicUsize,
    fail: bool,
}

impl CountingShutdown {
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            triggers: AtomicUsize::new(0),
            fail: true,
        })
    }

    pub fn triggers(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }
}

impl ShutdownAction for CountingShutdown {
    fn trigger(&self) -> Result<()> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(Error::ShutdownFailed("access denied".to_string()))
        } else {
            Ok(())
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<ThresholdStore>,
    pub action: Arc<CountingShutdown>,
    pub state_tx: watch::Sender<MonitorState>,
}

/// Build the control surface around the given fakes.
pub fn build_test_app(probe: Arc<dyn IdleProbe>, action: Arc<CountingShutdown>) -> TestApp {
    build_test_app_with_journal(probe, action, Journal::disabled())
}

pub fn build_test_app_with_journal(
    probe: Arc<dyn IdleProbe>,
    action: Arc<CountingShutdown>,
    journal: Journal,
) -> TestApp {
    let store = Arc::new(ThresholdStore::new());
    let (state_tx, monitor_state) = watch::channel(MonitorState::Uninitialized);

    let state = AppState {
        store: store.clone(),
        probe,
        action: action.clone(),
        monitor_state,
        journal,
    };

    TestApp {
        router: server::router(state),
        store,
        action,
        state_tx,
    }
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
