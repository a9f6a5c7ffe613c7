//! Integration tests for the webhook endpoints over real HTTP.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {futures::future::BoxFuture, secrecy::Secret, tokio::net::TcpListener};

use {
    pagehook_config::SignatureAlgorithm,
    pagehook_gateway::{AppState, build_webhook_app},
    pagehook_webhook::{
        ClassifiedEvent, EventDispatcher, EventKind, ReplyChannel, SenderBinder,
        SignatureVerifier, SubscriptionRegistry,
    },
};

const SECRET: &str = "app-secret";
const TOKEN: &str = "verify-me";

struct TestServer {
    addr: SocketAddr,
    texts: Arc<AtomicUsize>,
}

impl TestServer {
    fn url(&self, query: &str) -> String {
        format!("http://{}/webhook{query}", self.addr)
    }
}

/// Start a webhook server with one counting TextMessage handler.
async fn start_server(algorithm: SignatureAlgorithm) -> TestServer {
    let texts = Arc::new(AtomicUsize::new(0));
    let mut registry = SubscriptionRegistry::new();
    registry.on_fn(EventKind::TextMessage, "count", counting(&texts));
    let addr = serve(registry, algorithm, |state| state).await;
    TestServer { addr, texts }
}

type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;

fn counting(
    counter: &Arc<AtomicUsize>,
) -> impl Fn(ClassifiedEvent, ReplyChannel) -> HandlerFuture + Send + Sync + 'static {
    let counter = Arc::clone(counter);
    move |_, _| {
        let counter = Arc::clone(&counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

async fn serve(
    registry: SubscriptionRegistry,
    algorithm: SignatureAlgorithm,
    customize: impl FnOnce(AppState) -> AppState,
) -> SocketAddr {
    let dispatcher = EventDispatcher::new(registry, Arc::new(SenderBinder::disabled()));
    let state = customize(AppState::new(
        SignatureVerifier::new(algorithm, Secret::new(SECRET.into())),
        Secret::new(TOKEN.into()),
        dispatcher,
    ));
    let app = build_webhook_app(state, "/webhook");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

fn sign(algorithm: SignatureAlgorithm, body: &str) -> String {
    SignatureVerifier::new(algorithm, Secret::new(SECRET.into()))
        .sign(body.as_bytes())
        .unwrap()
}

fn text_envelope() -> String {
    serde_json::json!({
        "object": "page",
        "entry": [{
            "id": "PAGE",
            "time": 1,
            "messaging": [{
                "sender": {"id": "USER"},
                "recipient": {"id": "PAGE"},
                "timestamp": 2,
                "message": {"mid": "m1", "text": "hello"}
            }]
        }]
    })
    .to_string()
}

async fn post(url: &str, header: Option<(&str, String)>, body: String) -> reqwest::Response {
    let mut req = reqwest::Client::new()
        .post(url)
        .header("content-type", "application/json")
        .body(body);
    if let Some((name, value)) = header {
        req = req.header(name, value);
    }
    req.send().await.unwrap()
}

// ── Handshake ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn handshake_echoes_challenge() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let resp = reqwest::get(server.url(&format!(
        "?hub.mode=subscribe&hub.verify_token={TOKEN}&hub.challenge=123"
    )))
    .await
    .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    assert_eq!(resp.text().await.unwrap(), "123");
}

#[tokio::test]
async fn handshake_with_wrong_token_is_forbidden() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let resp = reqwest::get(server.url("?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=123"))
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    assert!(!resp.text().await.unwrap().contains("123"));
}

#[tokio::test]
async fn handshake_without_challenge_is_bad_request() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let resp = reqwest::get(server.url(&format!(
        "?hub.mode=subscribe&hub.verify_token={TOKEN}"
    )))
    .await
    .unwrap();
    assert_eq!(resp.status(), 400);
}

// ── Notifications ────────────────────────────────────────────────────────────

#[tokio::test]
async fn signed_notification_invokes_handler_once() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let body = text_envelope();
    let header = sign(SignatureAlgorithm::Sha1, &body);

    let resp = post(&server.url(""), Some(("x-hub-signature", header)), body).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "EVENT_RECEIVED");
    assert_eq!(server.texts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sha256_configuration_reads_its_own_header() {
    let server = start_server(SignatureAlgorithm::Sha256).await;
    let body = text_envelope();
    let header = sign(SignatureAlgorithm::Sha256, &body);

    let resp = post(&server.url(""), Some(("x-hub-signature-256", header)), body).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(server.texts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsigned_notification_is_unauthorized() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let resp = post(&server.url(""), None, text_envelope()).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(server.texts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bad_signature_is_forbidden() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let body = text_envelope();
    let header = sign(SignatureAlgorithm::Sha1, &format!("{body} "));

    let resp = post(&server.url(""), Some(("x-hub-signature", header)), body).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(server.texts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn other_algorithm_header_is_forbidden() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let body = text_envelope();
    let header = sign(SignatureAlgorithm::Sha256, &body);

    let resp = post(&server.url(""), Some(("x-hub-signature-256", header)), body).await;
    assert_eq!(resp.status(), 403);
    assert_eq!(server.texts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn signed_garbage_is_bad_request() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let body = "not json".to_string();
    let header = sign(SignatureAlgorithm::Sha1, &body);

    let resp = post(&server.url(""), Some(("x-hub-signature", header)), body).await;
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn non_page_envelope_is_acknowledged_without_dispatch() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let body = serde_json::json!({"object": "group", "entry": []}).to_string();
    let header = sign(SignatureAlgorithm::Sha1, &body);

    let resp = post(&server.url(""), Some(("x-hub-signature", header)), body).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(server.texts.load(Ordering::SeqCst), 0);
}

async fn erroring(_: ClassifiedEvent, _: ReplyChannel) -> anyhow::Result<()> {
    anyhow::bail!("handler rejected the event")
}

async fn panicking(_: ClassifiedEvent, _: ReplyChannel) -> anyhow::Result<()> {
    panic!("handler blew up")
}

async fn slow(_: ClassifiedEvent, _: ReplyChannel) -> anyhow::Result<()> {
    tokio::time::sleep(Duration::from_secs(60)).await;
    Ok(())
}

#[tokio::test]
async fn failing_and_slow_handlers_do_not_delay_acknowledgment() {
    let texts = Arc::new(AtomicUsize::new(0));
    let mut registry = SubscriptionRegistry::new();
    registry
        .on_fn(EventKind::TextMessage, "erroring", erroring)
        .on_fn(EventKind::TextMessage, "panicking", panicking)
        .on_fn(EventKind::TextMessage, "slow", slow)
        .on_fn(EventKind::TextMessage, "count", counting(&texts));
    let addr = serve(registry, SignatureAlgorithm::Sha1, |state| state).await;

    let body = text_envelope();
    let header = sign(SignatureAlgorithm::Sha1, &body);
    let resp = tokio::time::timeout(
        Duration::from_secs(10),
        post(
            &format!("http://{addr}/webhook"),
            Some(("x-hub-signature", header)),
            body,
        ),
    )
    .await
    .expect("acknowledgment waited on a handler");

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "EVENT_RECEIVED");
    assert_eq!(texts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn health_reports_ok() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let resp = reqwest::get(format!("http://{}/health", server.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["signature_algorithm"], "sha1");
    assert_eq!(json["subscriptions"], 1);
}

#[cfg(feature = "prometheus")]
#[tokio::test]
async fn metrics_with_handle_renders_text() {
    let addr = serve(SubscriptionRegistry::new(), SignatureAlgorithm::Sha1, |state| {
        state.with_metrics_handle(pagehook_metrics::MetricsHandle::default())
    })
    .await;
    let resp = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain; version=0.0.4")
    );
}

#[cfg(feature = "prometheus")]
#[tokio::test]
async fn metrics_without_recorder_is_unavailable() {
    let server = start_server(SignatureAlgorithm::Sha1).await;
    let resp = reqwest::get(format!("http://{}/metrics", server.addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
}
