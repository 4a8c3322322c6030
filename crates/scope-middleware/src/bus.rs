//! Headless, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Operator`] | Rotary encoder and button presses from the sensor board |
//! | [`Topic::SystemAlerts`] | Link resets, calibration faults, shutdown notices |
//! | [`Topic::AimEvents`] | Fire / fail outcomes of each tracking attempt |

use scope_types::{Event, ScopeError};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Operator input decoded from the sensor-board link.
    Operator,
    /// Faults and lifecycle notices that an operator or log should see.
    SystemAlerts,
    /// Outcomes emitted by the aim controller when it leaves tracking.
    AimEvents,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    operator: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
    aim_events: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus; `capacity` applies to every topic independently.
    pub fn new(capacity: usize) -> Self {
        let (operator, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        let (aim_events, _) = broadcast::channel(capacity);
        Self {
            operator,
            system_alerts,
            aim_events,
        }
    }

    /// Publish `event` to `topic`.
    ///
    /// Returns the number of subscribers that were handed the event, or
    /// [`ScopeError::Channel`] when nobody is listening on the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, ScopeError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| ScopeError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a single topic. Only events published after this call
    /// are delivered.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Operator => &self.operator,
            Topic::SystemAlerts => &self.system_alerts,
            Topic::AimEvents => &self.aim_events,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Topic-based receiver
// ────────────────────────────────────────────────────────────────────────────

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   messages were dropped.
    /// * `Err(RecvError::Closed)` – every sender has been dropped.
    pub async fn recv(&mut self) -> Result<Event, RecvError> {
        self.receiver.recv().await
    }

    /// Next queued event without waiting. Lag is logged and skipped over;
    /// `None` means nothing is queued right now (or the bus is gone).
    pub fn try_next(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
