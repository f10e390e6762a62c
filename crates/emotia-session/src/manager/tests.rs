use super::*;
use async_trait::async_trait;
use emotia_core::Emotion;
use std::collections::VecDeque;

enum Script {
    Refuse,
    Accept(MockConnection),
}

/// Replays scripted connect outcomes; once the script runs out, connects hang
struct MockTransport {
    script: Mutex<VecDeque<Script>>,
    connects: UnboundedSender<(String, Instant)>,
}

impl MockTransport {
    fn new(script: Vec<Script>) -> (Arc<Self>, UnboundedReceiver<(String, Instant)>) {
        let (connects, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            script: Mutex::new(script.into()),
            connects,
        });
        (transport, rx)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ConnectionError> {
        let _ = self.connects.send((url.to_string(), Instant::now()));
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Refuse) => Err(ConnectionError("connection refused".to_string())),
            Some(Script::Accept(connection)) => Ok(Box::new(connection)),
            None => std::future::pending().await,
        }
    }
}

struct MockConnection {
    inbound: UnboundedReceiver<String>,
    outbound: UnboundedSender<String>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn send_text(&mut self, text: String) -> Result<(), ConnectionError> {
        self.outbound
            .send(text)
            .map_err(|_| ConnectionError("server gone".to_string()))
    }

    async fn recv_text(&mut self) -> Result<Option<String>, ConnectionError> {
        Ok(self.inbound.recv().await)
    }

    async fn close(&mut self) {}
}

/// Server end of a mock connection
struct Server {
    to_client: Option<UnboundedSender<String>>,
    from_client: UnboundedReceiver<String>,
}

impl Server {
    fn push(&self, text: &str) {
        self.to_client
            .as_ref()
            .unwrap()
            .send(text.to_string())
            .unwrap();
    }

    async fn next_frame(&mut self) -> serde_json::Value {
        let text = self.from_client.recv().await.unwrap();
        serde_json::from_str(&text).unwrap()
    }

    fn hang_up(&mut self) {
        self.to_client = None;
    }
}

fn pair() -> (MockConnection, Server) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();
    (
        MockConnection { inbound, outbound },
        Server {
            to_client: Some(to_client),
            from_client,
        },
    )
}

struct Recorder {
    statuses: UnboundedReceiver<SessionStatus>,
    messages: UnboundedReceiver<ChatMessage>,
    typing: UnboundedReceiver<(String, bool)>,
    emotions: UnboundedReceiver<EmotionAnnotation>,
}

impl Recorder {
    fn attach(manager: &SessionManager) -> Self {
        let (status_tx, statuses) = mpsc::unbounded_channel();
        manager.on_status_change(move |status| {
            let _ = status_tx.send(status);
        });
        let (message_tx, messages) = mpsc::unbounded_channel();
        manager.on_message(move |message| {
            let _ = message_tx.send(message.clone());
        });
        let (typing_tx, typing) = mpsc::unbounded_channel();
        manager.on_typing(move |peer, is_typing| {
            let _ = typing_tx.send((peer.to_string(), is_typing));
        });
        let (emotion_tx, emotions) = mpsc::unbounded_channel();
        manager.on_emotion(move |emotion| {
            let _ = emotion_tx.send(emotion.clone());
        });
        Self {
            statuses,
            messages,
            typing,
            emotions,
        }
    }

    async fn status(&mut self) -> SessionStatus {
        self.statuses.recv().await.unwrap()
    }

    async fn message(&mut self) -> ChatMessage {
        self.messages.recv().await.unwrap()
    }

    async fn typing(&mut self) -> (String, bool) {
        self.typing.recv().await.unwrap()
    }

    /// Consume the Connecting/Connected pair and the connected notice
    async fn until_connected(&mut self) {
        assert_eq!(self.status().await, SessionStatus::Connecting);
        assert_eq!(self.status().await, SessionStatus::Connected);
        let notice = self.message().await;
        assert!(notice.is_system());
        assert_eq!(notice.text, CONNECTED_NOTICE);
    }
}

/// Paused-clock timers fire on millisecond ticks, so allow a little slack
fn assert_around(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(5),
        "expected about {expected:?}, got {actual:?}"
    );
}

fn manager(transport: Arc<MockTransport>) -> SessionManager {
    SessionManager::new(&SessionConfig::default(), "user_me", transport)
}

#[tokio::test(start_paused = true)]
async fn test_send_while_disconnected_is_rejected() {
    let (transport, mut connects) = MockTransport::new(Vec::new());
    let manager = manager(transport);

    assert_eq!(manager.status(), SessionStatus::Disconnected);
    assert_eq!(
        manager.send("hello"),
        Err(SendError::NotConnected(SessionStatus::Disconnected))
    );
    assert_eq!(
        manager.send_typing(true),
        Err(SendError::NotConnected(SessionStatus::Disconnected))
    );
    assert!(connects.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_connects_to_user_channel_and_sends_in_order() {
    let (connection, mut server) = pair();
    let (transport, mut connects) = MockTransport::new(vec![Script::Accept(connection)]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    events.until_connected().await;
    let (url, _) = connects.recv().await.unwrap();
    assert_eq!(url, "ws://localhost:8000/ws/user_me");
    assert_eq!(manager.status(), SessionStatus::Connected);

    let sent: Vec<ChatMessage> = ["one", "two", "three"]
        .into_iter()
        .map(|text| manager.send(text).unwrap())
        .collect();
    assert_ne!(sent[0].id, sent[1].id);

    for message in &sent {
        let frame = server.next_frame().await;
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["id"], message.id.as_str());
        assert_eq!(frame["sender"], "user_me");
        assert_eq!(frame["message"], message.text.as_str());
        assert!(frame["receiver"].is_null());
    }
}

#[tokio::test(start_paused = true)]
async fn test_blank_message_is_rejected() {
    let (connection, _server) = pair();
    let (transport, _connects) = MockTransport::new(vec![Script::Accept(connection)]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    events.until_connected().await;
    assert_eq!(manager.send("   "), Err(SendError::EmptyMessage));
}

#[tokio::test(start_paused = true)]
async fn test_annotated_and_typing_frames() {
    let (connection, mut server) = pair();
    let (transport, _connects) = MockTransport::new(vec![Script::Accept(connection)]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    events.until_connected().await;

    manager.send_typing(true).unwrap();
    manager
        .send_annotated("great news", Some(EmotionAnnotation::from_label("joy")))
        .unwrap();

    let typing = server.next_frame().await;
    assert_eq!(typing["type"], "typing");
    assert_eq!(typing["sender"], "user_me");
    assert_eq!(typing["isTyping"], true);

    let message = server.next_frame().await;
    assert_eq!(message["emotion"]["label"], "joy");
    assert_eq!(message["emotion"]["emoji"], Emotion::Joy.emoji());
}

#[tokio::test(start_paused = true)]
async fn test_keepalive_ping_every_interval() {
    let (connection, mut server) = pair();
    let (transport, _connects) = MockTransport::new(vec![Script::Accept(connection)]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    events.until_connected().await;
    let connected_at = Instant::now();

    let first = server.next_frame().await;
    assert_eq!(first["type"], "ping");
    assert_around(connected_at.elapsed(), Duration::from_secs(30));

    let second = server.next_frame().await;
    assert_eq!(second["type"], "ping");
    assert_around(connected_at.elapsed(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_inbound_frames_reach_handlers() {
    let (connection, server) = pair();
    let (transport, _connects) = MockTransport::new(vec![Script::Accept(connection)]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    events.until_connected().await;

    server.push(r#"{"type":"presence","sender":"u2"}"#);
    server.push("garbage");
    server.push(
        r#"{"type":"message","id":"m1","sender":"u2","message":"so sad","emotion":{"label":"sadness","score":0.8}}"#,
    );
    server.push(r#"{"type":"emotion","emotion":"joy","score":0.91}"#);

    let message = events.message().await;
    assert_eq!(message.id, "m1");
    assert_eq!(message.sender_id, "u2");
    assert_eq!(message.text, "so sad");
    let emotion = message.emotion.unwrap();
    assert_eq!(emotion.label, "sadness");
    assert_eq!(emotion.emoji, Emotion::Sadness.emoji());

    let echo = events.emotions.recv().await.unwrap();
    assert_eq!(echo.label, "joy");
    assert_eq!(echo.score, Some(0.91));

    // Bad frames are dropped without disturbing the connection
    assert_eq!(manager.status(), SessionStatus::Connected);
    assert!(events.statuses.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_peer_typing_clears_after_quiet_period() {
    let (connection, server) = pair();
    let (transport, _connects) = MockTransport::new(vec![Script::Accept(connection)]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    events.until_connected().await;

    server.push(r#"{"type":"typing","sender":"u2","isTyping":true}"#);
    assert_eq!(events.typing().await, ("u2".to_string(), true));
    assert!(manager.is_typing("u2"));
    assert_eq!(manager.typing_peers(), vec!["u2".to_string()]);

    tokio::time::advance(Duration::from_millis(1000)).await;
    server.push(r#"{"type":"typing","sender":"u2","isTyping":true}"#);
    assert_eq!(events.typing().await, ("u2".to_string(), true));

    tokio::time::advance(Duration::from_millis(1999)).await;
    assert!(manager.is_typing("u2"));

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(!manager.is_typing("u2"));
    assert_eq!(events.typing().await, ("u2".to_string(), false));
    assert!(manager.typing_peers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_own_typing_echo_is_ignored() {
    let (connection, server) = pair();
    let (transport, _connects) = MockTransport::new(vec![Script::Accept(connection)]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    events.until_connected().await;

    server.push(r#"{"type":"typing","sender":"user_me","isTyping":true}"#);
    server.push(r#"{"type":"typing","sender":"u3","isTyping":true}"#);
    assert_eq!(events.typing().await, ("u3".to_string(), true));
    assert!(!manager.is_typing("user_me"));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_delays_back_off_exponentially() {
    let script = (0..6).map(|_| Script::Refuse).collect();
    let (transport, mut connects) = MockTransport::new(script);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();

    let mut instants = Vec::new();
    for _ in 0..7 {
        instants.push(connects.recv().await.unwrap().1);
    }
    let expected = [1000, 2000, 4000, 8000, 16_000, 30_000];
    for (pair, millis) in instants.windows(2).zip(expected) {
        assert_around(pair[1] - pair[0], Duration::from_millis(millis));
    }

    assert_eq!(events.status().await, SessionStatus::Connecting);
    assert_eq!(events.status().await, SessionStatus::Reconnecting);
    assert_eq!(events.status().await, SessionStatus::Connecting);
    assert_eq!(manager.status(), SessionStatus::Connecting);
}

#[tokio::test(start_paused = true)]
async fn test_lost_connection_reconnects_and_resets_attempts() {
    let (first, mut first_server) = pair();
    let (second, mut second_server) = pair();
    let (transport, mut connects) =
        MockTransport::new(vec![Script::Accept(first), Script::Accept(second)]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    events.until_connected().await;
    let (_, first_at) = connects.recv().await.unwrap();

    first_server.hang_up();
    assert_eq!(events.status().await, SessionStatus::Reconnecting);
    assert_eq!(
        manager.send("lost"),
        Err(SendError::NotConnected(SessionStatus::Reconnecting))
    );

    events.until_connected().await;
    let (_, second_at) = connects.recv().await.unwrap();
    assert_around(second_at - first_at, Duration::from_millis(1000));

    manager.send("back").unwrap();
    assert_eq!(second_server.next_frame().await["message"], "back");
    assert!(first_server.from_client.try_recv().is_err());

    // Attempt counter was reset by the successful connection
    second_server.hang_up();
    assert_eq!(events.status().await, SessionStatus::Reconnecting);
    let lost_at = Instant::now();
    let (_, third_at) = connects.recv().await.unwrap();
    assert_around(third_at - lost_at, Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_close_cancels_everything() {
    let (connection, _server) = pair();
    let (transport, mut connects) = MockTransport::new(vec![Script::Accept(connection)]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    events.until_connected().await;
    connects.recv().await.unwrap();

    manager.close();
    assert_eq!(events.status().await, SessionStatus::Disconnected);
    assert_eq!(manager.status(), SessionStatus::Disconnected);
    assert_eq!(
        manager.send("bye"),
        Err(SendError::NotConnected(SessionStatus::Disconnected))
    );
    manager.join().await;

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(connects.try_recv().is_err());
    assert!(events.statuses.try_recv().is_err());
    assert!(events.messages.try_recv().is_err());
    assert!(manager.open().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_close_during_reconnect_wait() {
    let (transport, mut connects) = MockTransport::new(vec![Script::Refuse]);
    let manager = manager(transport);
    let mut events = Recorder::attach(&manager);

    manager.open().unwrap();
    assert_eq!(events.status().await, SessionStatus::Connecting);
    assert_eq!(events.status().await, SessionStatus::Reconnecting);
    connects.recv().await.unwrap();

    manager.close();
    manager.join().await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(connects.try_recv().is_err());
    assert_eq!(events.status().await, SessionStatus::Disconnected);
    assert!(events.statuses.try_recv().is_err());
}
