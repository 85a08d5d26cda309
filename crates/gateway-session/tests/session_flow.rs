//! Session state machine against an in-process mock gateway.

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use gateway_core::{Interaction, UsageStats};
use gateway_rest::{CommandDeclaration, RestClient, RestConfig};
use gateway_session::{ConnectOutcome, SessionClient, SessionConfig, SessionError, run_session};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream, accept_async, accept_hdr_async,
    tungstenite::{
        Message, Utf8Bytes,
        handshake::server::{Request, Response},
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const WAIT: Duration = Duration::from_secs(5);

type ServerWs = WebSocketStream<TcpStream>;

enum ServerEvent {
    Frame(Value),
    Closed(Option<u16>),
    Ended,
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (tcp, _) = timeout(WAIT, listener.accept())
        .await
        .expect("client never connected")
        .unwrap();
    accept_async(tcp).await.unwrap()
}

async fn next_event(ws: &mut ServerWs) -> ServerEvent {
    loop {
        let message = timeout(WAIT, ws.next()).await.expect("no frame from client");
        match message {
            Some(Ok(Message::Text(text))) => {
                return ServerEvent::Frame(serde_json::from_str(text.as_str()).unwrap());
            }
            Some(Ok(Message::Close(frame))) => {
                return ServerEvent::Closed(frame.map(|f| u16::from(f.code)));
            }
            Some(Ok(_)) => {}
            Some(Err(_)) | None => return ServerEvent::Ended,
        }
    }
}

async fn recv_frame(ws: &mut ServerWs) -> Value {
    match next_event(ws).await {
        ServerEvent::Frame(value) => value,
        ServerEvent::Closed(code) => panic!("client closed with {code:?}"),
        ServerEvent::Ended => panic!("client connection ended"),
    }
}

/// Next frame with opcode `op`, skipping anything else (usually heartbeats).
async fn recv_op(ws: &mut ServerWs, op: u64) -> Value {
    loop {
        let frame = recv_frame(ws).await;
        if frame["op"] == op {
            return frame;
        }
    }
}

/// Close code the client sent, skipping frames before it.
async fn expect_close(ws: &mut ServerWs) -> Option<u16> {
    loop {
        match next_event(ws).await {
            ServerEvent::Frame(_) => {}
            ServerEvent::Closed(code) => return code,
            ServerEvent::Ended => panic!("connection ended without a close frame"),
        }
    }
}

async fn send(ws: &mut ServerWs, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn close_with(ws: &mut ServerWs, code: u16) {
    ws.close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: Utf8Bytes::from_static("bye"),
    }))
    .await
    .unwrap();
}

fn hello(interval_ms: u64) -> Value {
    json!({ "op": 10, "d": { "heartbeat_interval": interval_ms } })
}

fn ready(seq: u64, session_id: &str, resume_url: &str) -> Value {
    json!({
        "op": 0,
        "s": seq,
        "t": "READY",
        "d": { "session_id": session_id, "resume_gateway_url": resume_url }
    })
}

fn interaction(seq: u64, name: &str) -> Value {
    json!({
        "op": 0,
        "s": seq,
        "t": "INTERACTION_CREATE",
        "d": { "id": format!("i{seq}"), "token": "itok", "type": 2, "data": { "name": name } }
    })
}

fn rest_client(api_base: &str) -> RestClient {
    RestClient::new(RestConfig::new("app", SecretString::from("tok")).with_api_base(api_base))
        .unwrap()
}

fn session_config() -> SessionConfig {
    SessionConfig::new(SecretString::from("tok")).with_heartbeat_poll(Duration::from_millis(10))
}

fn client_for(url: &str) -> SessionClient {
    SessionClient::new(
        session_config().with_gateway_url(url),
        rest_client("http://127.0.0.1:1"),
    )
}

fn spawn_connect(
    client: &Arc<SessionClient>,
    resume: bool,
) -> JoinHandle<Result<ConnectOutcome, SessionError>> {
    let client = Arc::clone(client);
    tokio::spawn(async move { client.connect(resume).await })
}

async fn wait_for_session(client: &SessionClient) {
    timeout(WAIT, async {
        while client.session_id().await.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session never became ready");
}

/// Connect, identify and reach ready on a fresh client.
async fn ready_session(
    client: &Arc<SessionClient>,
    listener: &TcpListener,
    url: &str,
) -> (ServerWs, JoinHandle<Result<ConnectOutcome, SessionError>>) {
    let task = spawn_connect(client, false);
    let mut ws = accept(listener).await;
    recv_op(&mut ws, 2).await;
    send(&mut ws, hello(60_000)).await;
    send(&mut ws, ready(1, "sess-1", url)).await;
    wait_for_session(client).await;
    (ws, task)
}

#[tokio::test]
async fn test_identify_heartbeat_ready_then_resume() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));

    let task = spawn_connect(&client, false);
    let mut ws = accept(&listener).await;

    let identify = recv_frame(&mut ws).await;
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], "tok");
    assert_eq!(identify["d"]["intents"], 0);
    assert_eq!(identify["d"]["presence"]["status"], "online");
    assert!(identify["d"]["properties"]["os"].is_string());
    assert!(identify["d"].get("shard").is_none());

    send(&mut ws, hello(200)).await;
    let heartbeat = timeout(Duration::from_millis(400), recv_op(&mut ws, 1))
        .await
        .expect("no heartbeat within the interval");
    assert_eq!(heartbeat["d"], 0);

    send(&mut ws, json!({ "op": 11 })).await;
    send(&mut ws, ready(1, "sess-1", &url)).await;
    send(&mut ws, json!({ "op": 0, "s": 2, "t": "GUILD_CREATE", "d": {} })).await;
    wait_for_session(&client).await;

    close_with(&mut ws, 1001).await;
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, ConnectOutcome::Resume);
    assert_eq!(client.sequence(), 2);

    let task = spawn_connect(&client, true);
    let mut ws = accept(&listener).await;
    let resume = recv_frame(&mut ws).await;
    assert_eq!(
        resume,
        json!({ "op": 6, "d": { "token": "tok", "session_id": "sess-1", "seq": 2 } })
    );

    client.shutdown();
    assert_eq!(expect_close(&mut ws).await, Some(1000));
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Terminate);
}

#[tokio::test]
async fn test_unrecoverable_close_restarts_with_identify() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));
    let (mut ws, task) = ready_session(&client, &listener, &url).await;

    close_with(&mut ws, 4004).await;
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Restart);
    assert!(client.session_id().await.is_none());

    let task = spawn_connect(&client, true);
    let mut ws = accept(&listener).await;
    assert_eq!(recv_frame(&mut ws).await["op"], 2);
    assert_eq!(client.sequence(), 0);

    client.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_abnormal_drop_is_resumable() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));
    let (ws, task) = ready_session(&client, &listener, &url).await;

    drop(ws);
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Resume);
    assert_eq!(client.session_id().await.as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn test_drop_before_ready_restarts() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));

    let task = spawn_connect(&client, false);
    let mut ws = accept(&listener).await;
    recv_op(&mut ws, 2).await;
    drop(ws);

    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Restart);
}

#[tokio::test]
async fn test_only_registered_commands_are_dispatched() {
    let (listener, url) = bind().await;
    let stats = Arc::new(UsageStats::new());
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let mut client = client_for(&url).with_stats(Arc::clone(&stats));
    client
        .register(
            CommandDeclaration::slash("help", "Show help"),
            Arc::new(move |interaction: Interaction| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(interaction.id);
                }
            }),
            false,
        )
        .await;
    let client = Arc::new(client);

    let (mut ws, task) = ready_session(&client, &listener, &url).await;
    send(&mut ws, interaction(2, "draw")).await;
    send(&mut ws, interaction(3, "help")).await;

    let id = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(id, "i3");
    assert_eq!(stats.count("help"), 1);
    assert_eq!(stats.count("draw"), 0);
    assert_eq!(client.sequence(), 3);

    client.shutdown();
    task.await.unwrap().unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_component_identifier_is_dispatched() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel::<Option<String>>();

    let mut client = client_for(&url);
    client
        .register(
            CommandDeclaration::component("left"),
            Arc::new(move |interaction: Interaction| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(interaction.message_content().map(str::to_string));
                }
            }),
            true,
        )
        .await;
    let client = Arc::new(client);

    let (mut ws, task) = ready_session(&client, &listener, &url).await;
    send(
        &mut ws,
        json!({
            "op": 0,
            "s": 2,
            "t": "INTERACTION_CREATE",
            "d": {
                "id": "i2",
                "token": "itok",
                "type": 3,
                "data": { "custom_id": "left" },
                "message": { "id": "m1", "content": "canvas" }
            }
        }),
    )
    .await;

    let content = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(content.as_deref(), Some("canvas"));

    client.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_frames_are_dropped() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));
    let (mut ws, task) = ready_session(&client, &listener, &url).await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    send(&mut ws, json!({ "op": 42, "s": 5 })).await;
    send(&mut ws, json!({ "op": 0, "s": 6, "t": "INTERACTION_CREATE", "d": { "nope": true } }))
        .await;
    send(&mut ws, json!({ "op": 1 })).await;

    timeout(Duration::from_secs(1), async {
        while recv_op(&mut ws, 1).await["d"] != 6 {}
    })
    .await
    .expect("heartbeat with latest sequence not sent");

    client.shutdown();
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Terminate);
}

#[tokio::test]
async fn test_server_heartbeat_request() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));
    let (mut ws, task) = ready_session(&client, &listener, &url).await;

    send(&mut ws, json!({ "op": 0, "s": 5, "t": "MESSAGE_CREATE", "d": {} })).await;
    send(&mut ws, json!({ "op": 1, "d": null })).await;

    timeout(Duration::from_secs(1), async {
        while recv_op(&mut ws, 1).await["d"] != 5 {}
    })
    .await
    .expect("requested heartbeat not sent");

    client.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_reconnect_request() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));
    let (mut ws, task) = ready_session(&client, &listener, &url).await;

    send(&mut ws, json!({ "op": 7, "d": null })).await;
    assert_eq!(expect_close(&mut ws).await, Some(4000));
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Resume);
}

#[tokio::test]
async fn test_invalid_session_not_resumable() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));
    let (mut ws, task) = ready_session(&client, &listener, &url).await;

    send(&mut ws, json!({ "op": 9, "d": false })).await;
    assert_eq!(expect_close(&mut ws).await, Some(4000));
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Restart);
    assert!(client.session_id().await.is_none());
}

#[tokio::test]
async fn test_invalid_session_resumable() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));
    let (mut ws, task) = ready_session(&client, &listener, &url).await;

    send(&mut ws, json!({ "op": 9, "d": true })).await;
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Resume);
    drop(ws);
}

#[tokio::test]
async fn test_missed_ack_closes_resumably() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));

    let task = spawn_connect(&client, false);
    let mut ws = accept(&listener).await;
    recv_op(&mut ws, 2).await;
    send(&mut ws, ready(1, "sess-1", &url)).await;
    send(&mut ws, hello(100)).await;

    assert_eq!(recv_op(&mut ws, 1).await["d"], 1);
    assert_eq!(expect_close(&mut ws).await, Some(4000));
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Resume);
}

#[tokio::test]
async fn test_acked_heartbeats_keep_connection() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));
    let (mut ws, task) = ready_session(&client, &listener, &url).await;
    drop(ws);
    task.await.unwrap().unwrap();

    let task = spawn_connect(&client, true);
    let mut ws = accept(&listener).await;
    recv_op(&mut ws, 6).await;
    send(&mut ws, hello(50)).await;
    for _ in 0..4 {
        recv_op(&mut ws, 1).await;
        send(&mut ws, json!({ "op": 11 })).await;
    }
    assert!(!task.is_finished());

    client.shutdown();
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Terminate);
}

#[tokio::test]
async fn test_shutdown_before_connect() {
    let (_listener, url) = bind().await;
    let client = client_for(&url);
    client.shutdown();
    assert_eq!(client.connect(false).await.unwrap(), ConnectOutcome::Terminate);
}

#[tokio::test]
async fn test_discovery_failure_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = SessionClient::new(session_config(), rest_client(&server.uri()));
    assert!(matches!(
        client.connect(false).await,
        Err(SessionError::Discovery(_))
    ));
    assert!(matches!(
        run_session(&client).await,
        Err(SessionError::Discovery(_))
    ));
}

#[tokio::test]
async fn test_discovered_url_is_versioned() {
    let (listener, url) = bind().await;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": url, "shards": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(SessionClient::new(
        session_config().with_shard(0, 1),
        rest_client(&server.uri()),
    ));
    let task = spawn_connect(&client, false);

    let (tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let requested = Arc::new(StdMutex::new(String::new()));
    let captured = Arc::clone(&requested);
    let mut ws = accept_hdr_async(tcp, move |request: &Request, response: Response| {
        *captured.lock().unwrap() = request.uri().to_string();
        Ok(response)
    })
    .await
    .unwrap();

    let identify = recv_frame(&mut ws).await;
    assert_eq!(identify["d"]["shard"], json!([0, 1]));
    assert_eq!(*requested.lock().unwrap(), "/?v=10&encoding=json");

    client.shutdown();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_publish_failure_still_registers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/applications/app/commands"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = SessionClient::new(session_config(), rest_client(&server.uri()));
    client
        .register(
            CommandDeclaration::slash("help", "Show help"),
            Arc::new(|_interaction: Interaction| async {}),
            true,
        )
        .await;
    client
        .register(
            CommandDeclaration::component("left"),
            Arc::new(|_interaction: Interaction| async {}),
            true,
        )
        .await;

    assert!(client.registry().contains("help"));
    assert!(client.registry().contains("left"));
}

#[tokio::test]
async fn test_run_session_resumes_until_shutdown() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));

    let driver = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { run_session(&client).await })
    };

    let mut ws = accept(&listener).await;
    recv_op(&mut ws, 2).await;
    send(&mut ws, hello(60_000)).await;
    send(&mut ws, ready(4, "sess-9", &url)).await;
    wait_for_session(&client).await;
    close_with(&mut ws, 1001).await;

    let mut ws = accept(&listener).await;
    let resume = recv_op(&mut ws, 6).await;
    assert_eq!(resume["d"]["session_id"], "sess-9");
    assert_eq!(resume["d"]["seq"], 4);

    client.shutdown();
    timeout(WAIT, driver).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_while_upgrade_pending() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));
    let task = spawn_connect(&client, false);

    // Accept the socket but never answer the upgrade.
    let (_tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.shutdown();

    let outcome = timeout(Duration::from_secs(2), task)
        .await
        .expect("connect ignored shutdown")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ConnectOutcome::Terminate);
}

#[tokio::test]
async fn test_unanswered_upgrade_times_out() {
    let (listener, url) = bind().await;
    let client = Arc::new(SessionClient::new(
        session_config()
            .with_gateway_url(&url)
            .with_connect_timeout(Duration::from_millis(200)),
        rest_client("http://127.0.0.1:1"),
    ));
    let task = spawn_connect(&client, false);
    let (_tcp, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();

    let outcome = timeout(Duration::from_secs(2), task)
        .await
        .expect("connect never gave up")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ConnectOutcome::Restart);
}

#[tokio::test]
async fn test_resume_goes_to_resume_url() {
    let (listener, url) = bind().await;
    let (resume_listener, resume_url) = bind().await;
    let client = Arc::new(client_for(&url));
    let (mut ws, task) = ready_session(&client, &listener, &resume_url).await;

    close_with(&mut ws, 1001).await;
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Resume);

    let task = spawn_connect(&client, true);
    let mut ws = accept(&resume_listener).await;
    let resume = recv_frame(&mut ws).await;
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["session_id"], "sess-1");

    client.shutdown();
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Terminate);
}

#[tokio::test]
async fn test_unrecoverable_close_rediscovers_gateway() {
    let (listener, url) = bind().await;
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gateway/bot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": url })))
        .expect(2)
        .mount(&server)
        .await;

    let client = Arc::new(SessionClient::new(session_config(), rest_client(&server.uri())));
    let (mut ws, task) = ready_session(&client, &listener, &url).await;
    close_with(&mut ws, 4004).await;
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Restart);

    let task = spawn_connect(&client, false);
    let mut ws = accept(&listener).await;
    assert_eq!(recv_frame(&mut ws).await["op"], 2);

    client.shutdown();
    task.await.unwrap().unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_ack_then_silence_closes_resumably() {
    let (listener, url) = bind().await;
    let client = Arc::new(client_for(&url));

    let task = spawn_connect(&client, false);
    let mut ws = accept(&listener).await;
    recv_op(&mut ws, 2).await;
    send(&mut ws, ready(1, "sess-1", &url)).await;
    wait_for_session(&client).await;
    send(&mut ws, hello(100)).await;

    recv_op(&mut ws, 1).await;
    send(&mut ws, json!({ "op": 11 })).await;
    recv_op(&mut ws, 1).await;

    assert_eq!(expect_close(&mut ws).await, Some(4000));
    assert_eq!(task.await.unwrap().unwrap(), ConnectOutcome::Resume);
}
