//! End-to-end cycle tests: a real `PlatformClient` and `SlackClient` against
//! stubbed HTTP endpoints, with an in-memory run-state store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use herald_bot::bot::{Bot, CycleError};
use herald_common::error::{CacheError, RemoteError};
use herald_common::http::build_http_client;
use herald_common::run_state::RunStateStore;
use herald_common::types::{InstanceUsage, LifecycleEvent, Workload};
use herald_notifier::{ChatNotifier, SlackClient};
use herald_platform::{EventsError, PlatformApi, PlatformClient};
use herald_platform::auth::Credentials;

const CHANNEL: &str = "platform-events";

// ============================================================
// Helpers
// ============================================================

#[derive(Default)]
struct MemoryRunState {
    value: Mutex<Option<DateTime<Utc>>>,
    fail_load: bool,
}

impl MemoryRunState {
    fn at(value: DateTime<Utc>) -> Self {
        Self {
            value: Mutex::new(Some(value)),
            fail_load: false,
        }
    }

    fn unreadable() -> Self {
        Self {
            value: Mutex::new(None),
            fail_load: true,
        }
    }

    fn current(&self) -> Option<DateTime<Utc>> {
        *self.value.lock().unwrap()
    }
}

#[async_trait]
impl RunStateStore for MemoryRunState {
    async fn load(&self) -> Result<Option<DateTime<Utc>>, CacheError> {
        if self.fail_load {
            return Err(CacheError::Timeout(Duration::from_secs(1)));
        }
        Ok(self.current())
    }

    async fn save(&self, at: DateTime<Utc>) -> Result<(), CacheError> {
        *self.value.lock().unwrap() = Some(at);
        Ok(())
    }
}

fn ts(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, 4, 5, h, m, 0).unwrap()
}

fn page(total_pages: u32, resources: Vec<Value>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "total_results": resources.len(),
        "total_pages": total_pages,
        "resources": resources
    }))
}

fn app(guid: &str, name: &str, memory: u64) -> Value {
    json!({
        "metadata": { "guid": guid },
        "entity": { "name": name, "state": "STARTED", "memory": memory, "disk_quota": 1024 }
    })
}

fn event(app: &str, at: DateTime<Utc>) -> Value {
    json!({
        "entity": {
            "type": "audit.app.update",
            "actor": "uaa-1",
            "actor_type": "user",
            "actor_name": "admin",
            "actee_name": app,
            "timestamp": at.to_rfc3339(),
            "metadata": { "request": { "state": "STARTED" } }
        }
    })
}

fn stats(mem: u64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "0": {
            "state": "RUNNING",
            "stats": { "uptime": 600, "usage": { "cpu": 0.01, "mem": mem, "disk": 64000000 } }
        }
    }))
}

async fn mount_auth(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/info"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "token_endpoint": server.uri() })),
        )
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

async fn mount_apps(server: &MockServer, apps: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/v2/apps"))
        .respond_with(page(1, apps))
        .mount(server)
        .await;
}

async fn mount_slack(server: &MockServer, expected_posts: u64) {
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(expected_posts)
        .mount(server)
        .await;
}

fn bot(platform: &MockServer, slack: &MockServer, run_state: Arc<MemoryRunState>) -> Bot {
    let platform_client = PlatformClient::new(
        platform.uri(),
        Credentials {
            username: "admin".to_string(),
            password: "secret".to_string(),
            client_id: "cf".to_string(),
            client_secret: String::new(),
        },
        Duration::from_secs(5),
        false,
    )
    .unwrap();
    let slack_client = SlackClient::new(
        build_http_client(Duration::from_secs(5), false).unwrap(),
        format!("{}/api/chat.postMessage", slack.uri()),
        "xoxb-test",
    );

    Bot::new(
        Arc::new(platform_client),
        Arc::new(slack_client),
        run_state,
        CHANNEL,
    )
}

/// Control plane that is always down; counts how many cycles reached it.
#[derive(Default)]
struct UnreachablePlatform {
    cycles: AtomicUsize,
}

impl UnreachablePlatform {
    fn cycles(&self) -> usize {
        self.cycles.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformApi for UnreachablePlatform {
    async fn list_workloads(&self) -> Result<Vec<Workload>, RemoteError> {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        Err(RemoteError::Status {
            operation: "list_workloads",
            status: 503,
            body: "unavailable".to_string(),
        })
    }

    async fn instance_usage(&self, _workload_id: &str) -> Result<Vec<InstanceUsage>, RemoteError> {
        Ok(vec![])
    }

    async fn events_since(
        &self,
        _threshold: Option<DateTime<Utc>>,
    ) -> Result<Vec<LifecycleEvent>, EventsError> {
        Ok(vec![])
    }
}

struct SilentNotifier;

#[async_trait]
impl ChatNotifier for SilentNotifier {
    async fn send(&self, _channel: &str, _text: &str) -> Result<(), RemoteError> {
        Ok(())
    }
}

fn looping_bot(
    platform: Arc<UnreachablePlatform>,
    run_state: Arc<MemoryRunState>,
    interval: Duration,
) -> Bot {
    Bot::new(platform, Arc::new(SilentNotifier), run_state, CHANNEL).with_interval(interval)
}

// ============================================================
// Scenarios
// ============================================================

#[tokio::test]
async fn test_run_starts_first_cycle_immediately() {
    let platform = Arc::new(UnreachablePlatform::default());
    let run_state = Arc::new(MemoryRunState::default());
    let bot = looping_bot(platform.clone(), run_state.clone(), Duration::from_secs(3600));

    let stopped = tokio::time::timeout(Duration::from_millis(200), bot.run()).await;

    assert!(stopped.is_err(), "run() should never return on its own");
    assert_eq!(platform.cycles(), 1);
    assert!(run_state.current().is_some());
}

#[tokio::test]
async fn test_run_keeps_polling_after_failed_cycles() {
    let platform = Arc::new(UnreachablePlatform::default());
    let run_state = Arc::new(MemoryRunState::default());
    let bot = looping_bot(platform.clone(), run_state, Duration::from_millis(20));

    let _ = tokio::time::timeout(Duration::from_millis(300), bot.run()).await;

    // Every cycle failed; the loop went on after each interval
    assert!(platform.cycles() >= 3, "only {} cycles ran", platform.cycles());
}

#[tokio::test]
async fn test_full_cycle_reports_usage_and_merged_events() {
    let platform = MockServer::start().await;
    let slack = MockServer::start().await;
    mount_auth(&platform).await;
    mount_apps(&platform, vec![app("g1", "billing", 512)]).await;
    Mock::given(method("GET"))
        .and(path("/v2/apps/g1/stats"))
        .respond_with(stats(256_000_000))
        .expect(1)
        .mount(&platform)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .and(query_param("page", "1"))
        .respond_with(page(2, vec![event("billing", ts(12, 30))]))
        .expect(1)
        .mount(&platform)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .and(query_param("page", "2"))
        .respond_with(page(2, vec![event("billing", ts(12, 10))]))
        .expect(1)
        .mount(&platform)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .and(body_string_contains(format!("channel={CHANNEL}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&slack)
        .await;

    let run_state = Arc::new(MemoryRunState::default());
    let before = Utc::now();
    let report = bot(&platform, &slack, run_state.clone()).tick().await.unwrap();

    // 256,000,000 bytes of a 512 MB quota
    let usage = report.workloads[0].usage.as_ref().unwrap();
    assert_eq!(usage[0].memory_mb(), 256.0);
    assert_eq!(usage[0].memory_percent(&report.workloads[0].workload), Some(50.0));
    assert!(report.message.contains("memory 256.0 MB (50.0%)"));

    // Page 1 then page 2
    let timestamps: Vec<DateTime<Utc>> = report.events.iter().map(|e| e.timestamp).collect();
    assert_eq!(timestamps, vec![ts(12, 30), ts(12, 10)]);

    assert_eq!(report.since, None);
    let after = Utc::now();
    let saved = run_state.current().unwrap();
    assert!(saved.timestamp() >= before.timestamp() - 1);
    // The next window reopens the second this cycle started in
    assert!(saved < after.trunc_subsecs(0));
}

#[tokio::test]
async fn test_cycle_without_new_events_still_sends_and_persists() {
    let platform = MockServer::start().await;
    let slack = MockServer::start().await;
    mount_auth(&platform).await;
    mount_apps(&platform, vec![]).await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .and(query_param("q", "timestamp>2017-04-05 12:00:00"))
        .respond_with(page(0, vec![]))
        .expect(1)
        .mount(&platform)
        .await;
    mount_slack(&slack, 1).await;

    let last_run = ts(12, 0);
    let run_state = Arc::new(MemoryRunState::at(last_run));
    let report = bot(&platform, &slack, run_state.clone()).tick().await.unwrap();

    assert_eq!(report.since, Some(last_run));
    assert!(report.events.is_empty());
    assert!(report.message.contains("_No new events._"));
    assert!(run_state.current().unwrap() > last_run);
}

#[tokio::test]
async fn test_stats_failure_is_isolated_per_workload() {
    let platform = MockServer::start().await;
    let slack = MockServer::start().await;
    mount_auth(&platform).await;
    mount_apps(
        &platform,
        vec![app("g1", "billing", 512), app("g2", "search", 256)],
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/v2/apps/g1/stats"))
        .respond_with(ResponseTemplate::new(400).set_body_string("CF-AppStoppedStatsError"))
        .mount(&platform)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/apps/g2/stats"))
        .respond_with(stats(128_000_000))
        .mount(&platform)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .respond_with(page(1, vec![]))
        .mount(&platform)
        .await;
    mount_slack(&slack, 1).await;

    let run_state = Arc::new(MemoryRunState::default());
    let report = bot(&platform, &slack, run_state).tick().await.unwrap();

    assert!(report.workloads[0].usage.is_none());
    assert_eq!(report.workloads[1].usage.as_ref().unwrap().len(), 1);
    assert!(report.message.contains("stats unavailable"));
    assert!(report.message.contains("memory 128.0 MB (50.0%)"));
}

#[tokio::test]
async fn test_event_failure_aborts_cycle_but_persists_run_state() {
    let platform = MockServer::start().await;
    let slack = MockServer::start().await;
    mount_auth(&platform).await;
    mount_apps(&platform, vec![]).await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .and(query_param("page", "1"))
        .respond_with(page(2, vec![event("billing", ts(12, 30))]))
        .mount(&platform)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&platform)
        .await;
    mount_slack(&slack, 0).await;

    let run_state = Arc::new(MemoryRunState::default());
    let err = bot(&platform, &slack, run_state.clone()).tick().await.unwrap_err();

    match err {
        CycleError::Events(e) => {
            assert_eq!(e.page, 2);
            assert_eq!(e.fetched.len(), 1);
        }
        other => panic!("expected events error, got {other:?}"),
    }
    assert!(run_state.current().is_some());
}

#[tokio::test]
async fn test_list_failure_aborts_cycle() {
    let platform = MockServer::start().await;
    let slack = MockServer::start().await;
    mount_auth(&platform).await;
    Mock::given(method("GET"))
        .and(path("/v2/apps"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&platform)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .respond_with(page(1, vec![]))
        .expect(0)
        .mount(&platform)
        .await;
    mount_slack(&slack, 0).await;

    let run_state = Arc::new(MemoryRunState::default());
    let err = bot(&platform, &slack, run_state.clone()).tick().await.unwrap_err();

    assert!(matches!(err, CycleError::ListWorkloads(_)));
    assert!(run_state.current().is_some());
}

#[tokio::test]
async fn test_unreadable_run_state_fetches_all_events() {
    let platform = MockServer::start().await;
    let slack = MockServer::start().await;
    mount_auth(&platform).await;
    mount_apps(&platform, vec![]).await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .respond_with(page(1, vec![event("billing", ts(9, 0))]))
        .expect(1)
        .mount(&platform)
        .await;
    mount_slack(&slack, 1).await;

    let run_state = Arc::new(MemoryRunState::unreadable());
    let report = bot(&platform, &slack, run_state).tick().await.unwrap();

    assert_eq!(report.since, None);
    assert_eq!(report.events.len(), 1);

    let requests = platform.received_requests().await.unwrap();
    let events_request = requests
        .iter()
        .find(|r| r.url.path() == "/v2/events")
        .unwrap();
    assert!(!events_request.url.query_pairs().any(|(k, _)| k == "q"));
}

#[tokio::test]
async fn test_chat_rejection_is_notify_error() {
    let platform = MockServer::start().await;
    let slack = MockServer::start().await;
    mount_auth(&platform).await;
    mount_apps(&platform, vec![]).await;
    Mock::given(method("GET"))
        .and(path("/v2/events"))
        .respond_with(page(1, vec![]))
        .mount(&platform)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "ok": false, "error": "invalid_auth" })),
        )
        .expect(1)
        .mount(&slack)
        .await;

    let run_state = Arc::new(MemoryRunState::default());
    let err = bot(&platform, &slack, run_state.clone()).tick().await.unwrap_err();

    assert!(matches!(err, CycleError::Notify(_)));
    assert!(run_state.current().is_some());
}
