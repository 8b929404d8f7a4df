use async_trait::async_trait;
use burrow_http::{
    FetchResponse, HttpFetch, Provider, RequestError, RequestService, TransportType,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Scripted behavior of one fake provider.
#[derive(Clone)]
enum Script {
    Ok(&'static str),
    Status(u16),
    NoResponse,
}

/// [`HttpFetch`] fake keyed by operator, recording every call.
struct ScriptedFetch {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetch {
    fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts
                .iter()
                .map(|(operator, script)| ((*operator).to_string(), script.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl HttpFetch for ScriptedFetch {
    async fn fetch(&self, provider: &Provider, _path: &str) -> Result<FetchResponse, RequestError> {
        self.calls
            .lock()
            .expect("lock")
            .push(provider.operator().to_string());
        match self.scripts.get(provider.operator()) {
            Some(Script::Ok(body)) => Ok(FetchResponse { status: 200, body: (*body).to_string() }),
            Some(Script::Status(status)) => {
                Ok(FetchResponse { status: *status, body: String::new() })
            }
            Some(Script::NoResponse) | None => {
                Err(RequestError::Fetch("connection refused".into()))
            }
        }
    }
}

fn provider(operator: &str) -> Provider {
    Provider::from_parts(format!("https://{operator}.example.com"), operator).expect("url")
}

fn onion_provider(operator: &str) -> Provider {
    Provider::from_parts(
        format!("http://{operator}x3wfygbq2wdde6qzjnpyrqn3gvbks7t5jdymmunxttdvvttpyd.onion"),
        operator,
    )
    .expect("url")
}

fn clear_only(
    configured: Vec<Provider>,
    fallback: Vec<Provider>,
    fetch: Arc<ScriptedFetch>,
) -> RequestService {
    let _ = tracing_subscriber::fmt::try_init();
    RequestService::new(configured, fallback, &[TransportType::Clear], fetch)
}

#[tokio::test]
async fn test_failover_reaches_the_healthy_provider() {
    let fetch = ScriptedFetch::new(&[("a", Script::Status(500)), ("b", Script::Ok("ok"))]);
    let service = clear_only(vec![provider("a"), provider("b")], vec![], Arc::clone(&fetch));

    let body = service.request("/time").await.expect("served by b");
    assert_eq!(body, "ok");

    // Either b answered directly or a failed exactly once first.
    let calls = fetch.calls();
    assert!(calls == vec!["b"] || calls == vec!["a", "b"], "calls: {calls:?}");
}

#[tokio::test]
async fn test_failed_providers_are_not_retried_within_a_cycle() {
    let fetch = ScriptedFetch::new(&[
        ("bad1", Script::Status(503)),
        ("bad2", Script::Status(503)),
        ("good1", Script::Ok("t")),
        ("good2", Script::Ok("t")),
    ]);
    let service = clear_only(
        vec![provider("bad1"), provider("bad2"), provider("good1"), provider("good2")],
        vec![],
        Arc::clone(&fetch),
    );

    service.request("/time").await.expect("a healthy provider exists");

    let calls = fetch.calls();
    assert!(calls.len() <= 3, "at most both bad providers plus one good: {calls:?}");
    let distinct: std::collections::HashSet<_> = calls.iter().collect();
    assert_eq!(distinct.len(), calls.len(), "no provider tried twice: {calls:?}");
    assert!(calls.last().expect("nonempty").starts_with("good"));
}

#[tokio::test]
async fn test_client_errors_fail_fast() {
    let fetch = ScriptedFetch::new(&[("a", Script::Status(404))]);
    let service = clear_only(vec![provider("a")], vec![], Arc::clone(&fetch));

    let error = service.request("/time").await.expect_err("404 is terminal");
    assert!(matches!(error, RequestError::Status { status: 404, .. }));
    assert_eq!(fetch.calls().len(), 1, "no rotation for client-side failures");
}

#[tokio::test]
async fn test_exhaustion_aggregates_the_failure() {
    let fetch = ScriptedFetch::new(&[("a", Script::Status(503)), ("b", Script::NoResponse)]);
    let service = clear_only(vec![provider("a"), provider("b")], vec![], Arc::clone(&fetch));

    let error = service.request("/time").await.expect_err("everything fails");
    match error {
        RequestError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(last.is_retryable(), "the terminal cause was transient: {last}");
        }
        other => panic!("expected Exhausted, got {other}"),
    }
    assert_eq!(fetch.calls().len(), 2, "every provider tried exactly once");
}

#[tokio::test]
async fn test_shutdown_fails_new_requests_fast() {
    let fetch = ScriptedFetch::new(&[("a", Script::Ok("t"))]);
    let service = clear_only(vec![provider("a")], vec![], Arc::clone(&fetch));

    service.shutdown();
    let error = service.request("/time").await.expect_err("shutting down");
    assert!(matches!(error, RequestError::ShuttingDown));
    assert!(fetch.calls().is_empty(), "no attempt after shutdown began");
}

#[tokio::test]
async fn test_no_usable_provider_disables_the_engine() {
    let fetch = ScriptedFetch::new(&[]);
    let service = clear_only(
        vec![onion_provider("runbtc")],
        vec![onion_provider("emzy")],
        Arc::clone(&fetch),
    );

    assert!(service.is_disabled());
    let error = service.request("/time").await.expect_err("disabled");
    assert!(matches!(error, RequestError::Disabled));
    assert!(fetch.calls().is_empty());
}

#[tokio::test]
async fn test_successful_calls_rotate_across_operators() {
    let fetch = ScriptedFetch::new(&[("a", Script::Ok("t")), ("b", Script::Ok("t"))]);
    let service = clear_only(vec![provider("a"), provider("b")], vec![], Arc::clone(&fetch));

    service.request("/time").await.expect("first");
    service.request("/time").await.expect("second");

    let calls = fetch.calls();
    assert_eq!(calls.len(), 2);
    assert_ne!(calls[0], calls[1], "consecutive calls spread over operators");
}

#[tokio::test]
async fn test_fallback_pool_serves_when_nothing_is_configured() {
    let fetch = ScriptedFetch::new(&[("fb", Script::Ok("fallback answer"))]);
    let service = clear_only(vec![], vec![provider("fb")], Arc::clone(&fetch));

    let body = service.request("/time").await.expect("fallback serves");
    assert_eq!(body, "fallback answer");
}

#[tokio::test]
async fn test_json_bodies_decode_through_the_engine() {
    let fetch = ScriptedFetch::new(&[("a", Script::Ok(r#"{"time_ms": 1700000000000}"#))]);
    let service = clear_only(vec![provider("a")], vec![], Arc::clone(&fetch));

    #[derive(Debug, serde::Deserialize)]
    struct TimeDoc {
        time_ms: u64,
    }
    let doc: TimeDoc = service.request_json("/time").await.expect("decodes");
    assert_eq!(doc.time_ms, 1_700_000_000_000);

    let fetch = ScriptedFetch::new(&[("a", Script::Ok("not json"))]);
    let service = clear_only(vec![provider("a")], vec![], fetch);
    let error = service.request_json::<TimeDoc>("/time").await.expect_err("garbage");
    assert!(matches!(error, RequestError::Body(_)));
}
