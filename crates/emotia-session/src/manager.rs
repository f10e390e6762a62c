use chrono::Utc;
use emotia_core::{ChatMessage, EmotionAnnotation, SessionConfig};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backoff::ReconnectPolicy;
use crate::error::{ConnectionError, SendError, TransitionError};
use crate::frame::Frame;
use crate::machine::{SessionMachine, SessionStatus};
use crate::transport::{Connection, Transport, WsTransport};
use crate::typing::TypingTracker;

/// Notice delivered through `on_message` each time the channel comes up
pub const CONNECTED_NOTICE: &str = "Connected to chat";

type MessageHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;
type StatusHandler = Arc<dyn Fn(SessionStatus) + Send + Sync>;
type TypingHandler = Arc<dyn Fn(&str, bool) + Send + Sync>;
type EmotionHandler = Arc<dyn Fn(&EmotionAnnotation) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    message: RwLock<Vec<MessageHandler>>,
    status: RwLock<Vec<StatusHandler>>,
    typing: RwLock<Vec<TypingHandler>>,
    emotion: RwLock<Vec<EmotionHandler>>,
}

fn snapshot<T: Clone>(handlers: &RwLock<Vec<T>>) -> Vec<T> {
    handlers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn register<T>(handlers: &RwLock<Vec<T>>, handler: T) {
    handlers
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(handler);
}

struct Inner {
    machine: SessionMachine,
    /// Present only while connected; dropping it discards anything unsent
    outbound: Option<UnboundedSender<Frame>>,
    typing: TypingTracker,
}

/// State shared between the handle and its driver task
struct Shared {
    user_id: String,
    inner: Mutex<Inner>,
    handlers: Handlers,
    cancel: CancellationToken,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit_status(&self, status: SessionStatus) {
        if self.cancel.is_cancelled() {
            return;
        }
        for handler in snapshot(&self.handlers.status) {
            handler(status);
        }
    }

    fn emit_message(&self, message: &ChatMessage) {
        if self.cancel.is_cancelled() {
            return;
        }
        for handler in snapshot(&self.handlers.message) {
            handler(message);
        }
    }

    fn emit_typing(&self, peer: &str, is_typing: bool) {
        if self.cancel.is_cancelled() {
            return;
        }
        for handler in snapshot(&self.handlers.typing) {
            handler(peer, is_typing);
        }
    }

    fn emit_emotion(&self, emotion: &EmotionAnnotation) {
        if self.cancel.is_cancelled() {
            return;
        }
        for handler in snapshot(&self.handlers.emotion) {
            handler(emotion);
        }
    }

    /// Enter `Connected` and open a fresh outbound queue for this connection
    fn on_connected(&self) -> Option<UnboundedReceiver<Frame>> {
        let rx = {
            let mut inner = self.lock();
            inner.machine.on_connected().ok()?;
            let (tx, rx) = mpsc::unbounded_channel();
            inner.outbound = Some(tx);
            rx
        };
        self.emit_status(SessionStatus::Connected);
        self.emit_message(&ChatMessage::system(CONNECTED_NOTICE));
        Some(rx)
    }

    /// Enter `Reconnecting`, returning the delay before the next attempt
    fn on_lost(&self) -> Option<Duration> {
        let (delay, cleared) = {
            let mut inner = self.lock();
            inner.outbound = None;
            let delay = inner.machine.on_lost().ok()?;
            (delay, inner.typing.clear())
        };
        for peer in cleared {
            self.emit_typing(&peer, false);
        }
        self.emit_status(SessionStatus::Reconnecting);
        Some(delay)
    }

    fn on_retry(&self) -> bool {
        let retried = self.lock().machine.on_retry().is_ok();
        if retried {
            self.emit_status(SessionStatus::Connecting);
        }
        retried
    }

    fn next_typing_deadline(&self) -> Option<Instant> {
        self.lock().typing.next_deadline()
    }

    fn expire_typing(&self) {
        let expired = self.lock().typing.expire(Instant::now());
        for peer in expired {
            log::debug!("{peer} stopped typing");
            self.emit_typing(&peer, false);
        }
    }

    fn dispatch(&self, text: &str) {
        match Frame::decode(text) {
            Ok(Frame::Message(frame)) => {
                let message = frame.into_chat_message(Utc::now());
                self.emit_message(&message);
            }
            Ok(Frame::Typing(frame)) => {
                if frame.sender == self.user_id {
                    return;
                }
                self.lock()
                    .typing
                    .set(&frame.sender, frame.is_typing, Instant::now());
                self.emit_typing(&frame.sender, frame.is_typing);
            }
            Ok(Frame::Ping) => log::trace!("Received ping"),
            Ok(Frame::Emotion(frame)) => self.emit_emotion(&frame.into()),
            Err(e) => log::warn!("Dropping inbound frame: {e}"),
        }
    }
}

enum Exit {
    Cancelled,
    Lost,
}

async fn send_frame(connection: &mut dyn Connection, frame: &Frame) -> Result<(), ConnectionError> {
    let text = frame
        .encode()
        .map_err(|e| ConnectionError(format!("Failed to encode {} frame: {e}", frame.kind())))?;
    connection.send_text(text).await
}

/// Scheduler loop owning the connection, timers and reconnects
struct Driver {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    url: String,
    keepalive: Duration,
}

impl Driver {
    async fn run(self) {
        loop {
            let connected = tokio::select! {
                () = self.shared.cancel.cancelled() => break,
                result = self.transport.connect(&self.url) => result,
            };

            let exit = match connected {
                Ok(mut connection) => match self.shared.on_connected() {
                    Some(outbound) => {
                        log::info!("Chat session connected as {}", self.shared.user_id);
                        let exit = self.pump(connection.as_mut(), outbound).await;
                        if matches!(exit, Exit::Cancelled) {
                            connection.close().await;
                        }
                        exit
                    }
                    None => {
                        connection.close().await;
                        Exit::Cancelled
                    }
                },
                Err(e) => {
                    log::warn!("Chat connection failed: {e}");
                    Exit::Lost
                }
            };
            if matches!(exit, Exit::Cancelled) {
                break;
            }

            let Some(delay) = self.shared.on_lost() else {
                break;
            };
            log::info!("Reconnecting in {}ms", delay.as_millis());
            tokio::select! {
                () = self.shared.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
            if !self.shared.on_retry() {
                break;
            }
        }
        log::debug!("Session driver for {} stopped", self.shared.user_id);
    }

    async fn pump(&self, connection: &mut dyn Connection, mut outbound: UnboundedReceiver<Frame>) -> Exit {
        let start = Instant::now();
        let mut keepalive = tokio::time::interval_at(start + self.keepalive, self.keepalive);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let typing_deadline = self.shared.next_typing_deadline();
            tokio::select! {
                () = self.shared.cancel.cancelled() => return Exit::Cancelled,
                incoming = connection.recv_text() => match incoming {
                    Ok(Some(text)) => self.shared.dispatch(&text),
                    Ok(None) => {
                        log::info!("Chat connection closed by server");
                        return Exit::Lost;
                    }
                    Err(e) => {
                        log::warn!("Chat connection error: {e}");
                        return Exit::Lost;
                    }
                },
                Some(frame) = outbound.recv() => {
                    if let Err(e) = send_frame(connection, &frame).await {
                        log::warn!("Failed to send {} frame: {e}", frame.kind());
                        return Exit::Lost;
                    }
                }
                _ = keepalive.tick() => {
                    log::trace!("Sending keepalive ping");
                    if let Err(e) = send_frame(connection, &Frame::Ping).await {
                        log::warn!("Keepalive failed: {e}");
                        return Exit::Lost;
                    }
                }
                () = tokio::time::sleep_until(typing_deadline.unwrap_or(start)), if typing_deadline.is_some() => {
                    self.shared.expire_typing();
                }
            }
        }
    }
}

/// Handle to one logical chat connection.
///
/// Opening spawns a driver task that connects, reconnects with exponential
/// backoff, sends keepalive pings and tracks peer typing. Connection
/// failures are never surfaced as errors; observers see status changes.
/// Dropping the handle tears the session down.
pub struct SessionManager {
    shared: Arc<Shared>,
    transport: Arc<dyn Transport>,
    url: String,
    keepalive: Duration,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(config: &SessionConfig, user_id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let user_id = user_id.into();
        let url = config.channel_url(&user_id);
        Self {
            shared: Arc::new(Shared {
                user_id,
                inner: Mutex::new(Inner {
                    machine: SessionMachine::new(ReconnectPolicy::from_config(config)),
                    outbound: None,
                    typing: TypingTracker::new(config.typing_timeout()),
                }),
                handlers: Handlers::default(),
                cancel: CancellationToken::new(),
            }),
            transport,
            url,
            keepalive: config.keepalive().max(Duration::from_millis(1)),
            driver: Mutex::new(None),
        }
    }

    /// Session over a real WebSocket
    #[must_use]
    pub fn websocket(config: &SessionConfig, user_id: impl Into<String>) -> Self {
        Self::new(config, user_id, Arc::new(WsTransport))
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.shared.user_id
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.shared.lock().machine.status()
    }

    pub fn on_message(&self, handler: impl Fn(&ChatMessage) + Send + Sync + 'static) {
        register(&self.shared.handlers.message, Arc::new(handler) as MessageHandler);
    }

    pub fn on_status_change(&self, handler: impl Fn(SessionStatus) + Send + Sync + 'static) {
        register(&self.shared.handlers.status, Arc::new(handler) as StatusHandler);
    }

    /// Called with `(peer, is_typing)` for each inbound typing event and auto-clear
    pub fn on_typing(&self, handler: impl Fn(&str, bool) + Send + Sync + 'static) {
        register(&self.shared.handlers.typing, Arc::new(handler) as TypingHandler);
    }

    /// Called when the server reports the emotion of our last message
    pub fn on_emotion(&self, handler: impl Fn(&EmotionAnnotation) + Send + Sync + 'static) {
        register(&self.shared.handlers.emotion, Arc::new(handler) as EmotionHandler);
    }

    /// Start connecting. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Fails if the session was already opened or has been closed
    pub fn open(&self) -> Result<(), TransitionError> {
        self.shared.lock().machine.open()?;
        self.shared.emit_status(SessionStatus::Connecting);

        let driver = Driver {
            shared: Arc::clone(&self.shared),
            transport: Arc::clone(&self.transport),
            url: self.url.clone(),
            keepalive: self.keepalive,
        };
        let handle = tokio::spawn(driver.run());
        *self.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Tear the session down for good, cancelling every pending timer
    pub fn close(&self) {
        self.shared.cancel.cancel();
        let changed = {
            let mut inner = self.shared.lock();
            inner.outbound = None;
            inner.typing.clear();
            inner.machine.close()
        };
        // Observers hear the final transition even though the token is cancelled
        if changed {
            for handler in snapshot(&self.shared.handlers.status) {
                handler(SessionStatus::Disconnected);
            }
        }
        log::info!("Chat session for {} closed", self.shared.user_id);
    }

    /// Wait for the driver task to finish after [`Self::close`]
    pub async fn join(&self) {
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("Session driver ended abnormally: {e}");
            }
        }
    }

    /// Send a chat message stamped with a fresh id, our user id and the current time
    ///
    /// # Errors
    ///
    /// Rejected without transmitting unless the session is connected
    pub fn send(&self, text: &str) -> Result<ChatMessage, SendError> {
        self.send_annotated(text, None)
    }

    /// Like [`Self::send`], attaching an emotion annotation the caller already knows
    ///
    /// # Errors
    ///
    /// Rejected without transmitting unless the session is connected
    pub fn send_annotated(
        &self,
        text: &str,
        emotion: Option<EmotionAnnotation>,
    ) -> Result<ChatMessage, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }
        let message = ChatMessage::outgoing(&self.shared.user_id, text).with_emotion(emotion);
        self.enqueue(Frame::message(&message))?;
        Ok(message)
    }

    /// Tell peers whether we are typing; sent immediately
    ///
    /// # Errors
    ///
    /// Rejected without transmitting unless the session is connected
    pub fn send_typing(&self, is_typing: bool) -> Result<(), SendError> {
        self.enqueue(Frame::typing(&self.shared.user_id, is_typing))
    }

    #[must_use]
    pub fn is_typing(&self, peer: &str) -> bool {
        self.shared.lock().typing.is_typing(peer, Instant::now())
    }

    #[must_use]
    pub fn typing_peers(&self) -> Vec<String> {
        self.shared.lock().typing.peers(Instant::now())
    }

    fn enqueue(&self, frame: Frame) -> Result<(), SendError> {
        let inner = self.shared.lock();
        let status = inner.machine.status();
        match (&inner.outbound, status) {
            (Some(tx), SessionStatus::Connected) => tx
                .send(frame)
                .map_err(|_| SendError::NotConnected(status)),
            _ => Err(SendError::NotConnected(status)),
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

#[cfg(test)]
mod tests;
