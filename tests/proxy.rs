use std::{sync::Arc, time::Duration};

use ethrpc_proxy::{
    errors::{ProxyError, RpcError},
    proxy::{Proxy, ProxyState},
    rpc::registry::{handler_fn, Handler, Registry},
    services::net,
};
use serde_json::{json, Value};
use tokio::{
    sync::{oneshot, Notify},
    task::JoinHandle,
};

struct GatedHandler {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait::async_trait]
impl Handler for GatedHandler {
    async fn call(&self, _params: Vec<Value>) -> Result<Value, RpcError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok(json!("released"))
    }
}

struct PanickingHandler;

#[async_trait::async_trait]
impl Handler for PanickingHandler {
    async fn call(&self, _params: Vec<Value>) -> Result<Value, RpcError> {
        panic!("backend exploded")
    }
}

struct Running {
    proxy: Arc<Proxy>,
    url: String,
    served: JoinHandle<Result<(), ProxyError>>,
}

async fn spawn_proxy(registry: Registry, drain_timeout: Duration) -> Running {
    let addr = "127.0.0.1:0".parse().expect("valid socket");
    let proxy = Arc::new(Proxy::new(registry, addr).with_drain_timeout(drain_timeout));

    let mut state = proxy.subscribe_state();
    let served = tokio::spawn({
        let proxy = Arc::clone(&proxy);
        async move { proxy.start().await }
    });

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|state| *state == ProxyState::Listening),
    )
    .await
    .expect("proxy should start listening")
    .expect("state channel open");

    let addr = proxy.local_addr().expect("bound address");
    Running {
        proxy,
        url: format!("http://{addr}/"),
        served,
    }
}

fn default_registry() -> Registry {
    let mut builder = Registry::builder();
    builder
        .register(
            "eth",
            "GetCode",
            handler_fn(|_params| async { Ok(json!("0x11110")) }),
        )
        .expect("register eth.GetCode");
    net::register(&mut builder, net::DEFAULT_NETWORK_ID).expect("register net service");
    builder.build()
}

async fn post(client: &reqwest::Client, url: &str, body: &'static str) -> reqwest::Response {
    client
        .post(url)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .expect("request should complete")
}

async fn json_body(response: reqwest::Response) -> Value {
    let text = response.text().await.expect("response body");
    serde_json::from_str(&text).expect("valid json response")
}

#[tokio::test]
async fn serves_registered_handlers_end_to_end() {
    let running = spawn_proxy(default_registry(), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let response = post(
        &client,
        &running.url,
        r#"{"jsonrpc":"2.0","method":"eth_getCode","params":["0xa94f5374fce5edbc8e2a8697c15331677e6ebf0b"],"id":1}"#,
    )
    .await;
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.text().await.expect("response body"),
        r#"{"jsonrpc":"2.0","id":1,"result":"0x11110"}"#
    );

    let response = post(
        &client,
        &running.url,
        r#"{"jsonrpc":"2.0","method":"net_version","id":1}"#,
    )
    .await;
    assert_eq!(
        json_body(response).await,
        json!({"jsonrpc": "2.0", "id": 1, "result": hex::encode("fabric-evm")})
    );

    running.proxy.shutdown().await.expect("clean shutdown");
    running
        .served
        .await
        .expect("serve task")
        .expect("start should return cleanly");
    assert_eq!(running.proxy.state(), ProxyState::Stopped);
}

#[tokio::test]
async fn cors_preflight_over_the_wire() {
    let running = spawn_proxy(default_registry(), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let allowed = client
        .request(reqwest::Method::OPTIONS, &running.url)
        .header("Origin", "http://example.com")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .expect("pre-flight");
    assert_eq!(allowed.status(), 200);
    assert_eq!(
        allowed
            .headers()
            .get("Access-Control-Allow-Origin")
            .expect("allow origin header"),
        "*"
    );

    let rejected = client
        .request(reqwest::Method::OPTIONS, &running.url)
        .header("Origin", "http://example.com")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await
        .expect("pre-flight");
    assert_eq!(rejected.status(), 405);

    running.proxy.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn concurrent_requests_complete_independently() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let mut builder = Registry::builder();
    builder
        .register(
            "eth",
            "GetLogs",
            GatedHandler {
                entered: Arc::clone(&entered),
                release: Arc::clone(&release),
            },
        )
        .expect("register eth.GetLogs");
    builder
        .register(
            "eth",
            "BlockNumber",
            handler_fn(|_params| async { Ok(json!("0x2a")) }),
        )
        .expect("register eth.BlockNumber");

    let running = spawn_proxy(builder.build(), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let slow = tokio::spawn({
        let client = client.clone();
        let url = running.url.clone();
        async move {
            json_body(post(&client, &url, r#"{"jsonrpc":"2.0","method":"eth_getLogs","id":1}"#).await)
                .await
        }
    });
    entered.notified().await;

    // The gated request is still blocked in its handler.
    let fast = json_body(
        post(
            &client,
            &running.url,
            r#"{"jsonrpc":"2.0","method":"eth_blockNumber","id":2}"#,
        )
        .await,
    )
    .await;
    assert_eq!(fast, json!({"jsonrpc": "2.0", "id": 2, "result": "0x2a"}));

    release.notify_one();
    let slow = slow.await.expect("slow request task");
    assert_eq!(slow, json!({"jsonrpc": "2.0", "id": 1, "result": "released"}));

    running.proxy.shutdown().await.expect("clean shutdown");
}

#[tokio::test]
async fn shutdown_drains_in_flight_requests() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let mut builder = Registry::builder();
    builder
        .register(
            "eth",
            "GetLogs",
            GatedHandler {
                entered: Arc::clone(&entered),
                release: Arc::clone(&release),
            },
        )
        .expect("register eth.GetLogs");

    let running = spawn_proxy(builder.build(), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let in_flight = tokio::spawn({
        let url = running.url.clone();
        async move {
            json_body(post(&client, &url, r#"{"jsonrpc":"2.0","method":"eth_getLogs","id":9}"#).await)
                .await
        }
    });
    entered.notified().await;

    let (done_tx, mut done_rx) = oneshot::channel();
    let shutdown = tokio::spawn({
        let proxy = Arc::clone(&running.proxy);
        async move {
            let result = proxy.shutdown().await;
            let _ = done_tx.send(());
            result
        }
    });

    let mut state = running.proxy.subscribe_state();
    state
        .wait_for(|state| *state == ProxyState::ShuttingDown)
        .await
        .expect("state channel open");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        done_rx.try_recv().is_err(),
        "shutdown must wait for the in-flight request"
    );

    release.notify_one();
    let response = in_flight.await.expect("in-flight request task");
    assert_eq!(response["result"], "released");

    shutdown
        .await
        .expect("shutdown task")
        .expect("clean shutdown");
    assert_eq!(running.proxy.state(), ProxyState::Stopped);
    running
        .served
        .await
        .expect("serve task")
        .expect("start should return cleanly");
}

#[tokio::test]
async fn shutdown_reports_drain_timeout_and_still_stops() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let mut builder = Registry::builder();
    builder
        .register(
            "eth",
            "GetLogs",
            GatedHandler {
                entered: Arc::clone(&entered),
                release: Arc::clone(&release),
            },
        )
        .expect("register eth.GetLogs");

    let running = spawn_proxy(builder.build(), Duration::from_millis(100)).await;
    let client = reqwest::Client::new();

    let url = running.url.clone();
    let _stuck = tokio::spawn(async move {
        let _ = client
            .post(&url)
            .body(r#"{"jsonrpc":"2.0","method":"eth_getLogs","id":1}"#)
            .send()
            .await;
    });
    entered.notified().await;

    let err = running
        .proxy
        .shutdown()
        .await
        .expect_err("drain should time out");
    assert!(matches!(err, ProxyError::DrainTimeout(timeout) if timeout == Duration::from_millis(100)));
    assert_eq!(running.proxy.state(), ProxyState::Stopped);

    release.notify_one();
}

#[tokio::test]
async fn handler_panic_stops_the_proxy_with_an_error() {
    let mut builder = Registry::builder();
    builder
        .register("eth", "Crash", PanickingHandler)
        .expect("register eth.Crash");

    let running = spawn_proxy(builder.build(), Duration::from_secs(5)).await;
    let client = reqwest::Client::new();

    let response = post(
        &client,
        &running.url,
        r#"{"jsonrpc":"2.0","method":"eth_crash","id":1}"#,
    )
    .await;
    assert_eq!(response.status(), 500);
    drop(response);
    drop(client);

    let result = tokio::time::timeout(Duration::from_secs(5), running.served)
        .await
        .expect("proxy should stop after a handler panic")
        .expect("serve task");
    assert!(matches!(result, Err(ProxyError::HandlerPanicked { method }) if method == "eth_crash"));
    assert_eq!(running.proxy.state(), ProxyState::Stopped);
}

#[tokio::test]
async fn bind_conflict_fails_without_listening() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").expect("bind occupying listener");
    let addr = occupied.local_addr().expect("occupied address");

    let proxy = Proxy::new(default_registry(), addr);
    let err = proxy.start().await.expect_err("port is already bound");

    assert!(matches!(err, ProxyError::Bind { addr: failed, .. } if failed == addr));
    assert_eq!(proxy.state(), ProxyState::Created);
    assert_eq!(proxy.local_addr(), None);
    proxy.shutdown().await.expect("shutdown without listener");
}

#[tokio::test]
async fn shutdown_of_never_started_proxy_succeeds() {
    let proxy = Proxy::new(default_registry(), "127.0.0.1:0".parse().expect("valid socket"));

    proxy.shutdown().await.expect("shutdown should succeed");
    assert_eq!(proxy.state(), ProxyState::Created);
}

#[tokio::test]
async fn stopped_proxy_cannot_restart() {
    let running = spawn_proxy(default_registry(), Duration::from_secs(5)).await;
    running.proxy.shutdown().await.expect("clean shutdown");
    running
        .served
        .await
        .expect("serve task")
        .expect("start should return cleanly");

    let err = running.proxy.start().await.expect_err("restart is not allowed");
    assert!(matches!(err, ProxyError::InvalidState(ProxyState::Stopped)));
}

#[tokio::test]
async fn dropping_start_future_still_reaches_stopped() {
    let running = spawn_proxy(default_registry(), Duration::from_secs(5)).await;

    running.served.abort();
    let _ = running.served.await;
    assert_eq!(running.proxy.state(), ProxyState::Stopped);

    tokio::time::timeout(Duration::from_secs(5), running.proxy.shutdown())
        .await
        .expect("shutdown should not hang")
        .expect("shutdown after stop succeeds");
}
