//! In-process transports for exercising the worker pool
#![allow(dead_code)] // Test utility module - not all methods used in every test

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use courier_delivery::{MailTransport, OutboundMessage, TransportError};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{
    Event, Subscriber,
    field::{Field, Visit},
    subscriber::DefaultGuard,
};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    registry::Registry,
};

/// How a scripted recipient behaves
#[derive(Debug, Clone, Copy)]
enum Script {
    /// Fail this many more times, then succeed
    FailTimes(usize),
    /// Never succeed
    FailAlways,
}

/// Transport that succeeds unless told otherwise for a recipient, and
/// records every attempt in order
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    attempts: Mutex<Vec<OutboundMessage>>,
    delay: Option<Duration>,
    attempted: Notify,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `times` attempts to `recipient`
    pub fn fail(self, recipient: &str, times: usize) -> Self {
        self.scripts
            .lock()
            .insert(recipient.to_string(), Script::FailTimes(times));
        self
    }

    /// Fail every attempt to `recipient`
    pub fn fail_always(self, recipient: &str) -> Self {
        self.scripts
            .lock()
            .insert(recipient.to_string(), Script::FailAlways);
        self
    }

    /// Take this long over every attempt
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn attempts(&self) -> Vec<OutboundMessage> {
        self.attempts.lock().clone()
    }

    pub fn attempts_for(&self, recipient: &str) -> usize {
        self.attempts
            .lock()
            .iter()
            .filter(|message| message.recipient == recipient)
            .count()
    }

    /// Resolves after the next attempt starts
    pub async fn next_attempt(&self) {
        self.attempted.notified().await;
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.attempts.lock().push(message.clone());
        self.attempted.notify_waiters();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut scripts = self.scripts.lock();
        match scripts.get_mut(&message.recipient) {
            Some(Script::FailAlways) => Err(TransportError::Unavailable(format!(
                "{} is unreachable",
                message.recipient
            ))),
            Some(Script::FailTimes(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(TransportError::Unavailable(format!(
                    "{} is temporarily unreachable",
                    message.recipient
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Transport whose deliveries never finish
#[derive(Debug, Default)]
pub struct HangingTransport {
    started: Mutex<Vec<OutboundMessage>>,
    attempted: Notify,
}

impl HangingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> usize {
        self.started.lock().len()
    }

    /// Resolves once at least `count` deliveries are hanging
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.attempted.notified();
            if self.started() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl MailTransport for HangingTransport {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        self.started.lock().push(message.clone());
        self.attempted.notify_waiters();

        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Records the message of every event emitted while installed
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CapturedLogs {
    /// Capture events on the current thread until the guard is dropped.
    ///
    /// Only events from tasks polled on this thread are seen, so use it with
    /// the current-thread runtime.
    pub fn install() -> (Self, DefaultGuard) {
        let logs = Self::default();
        let guard = tracing::subscriber::set_default(Registry::default().with(logs.clone()));
        (logs, guard)
    }

    /// Number of captured messages containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|message| message.contains(needle))
            .count()
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> tracing_subscriber::Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        self.messages.lock().push(visitor.0);
    }
}
