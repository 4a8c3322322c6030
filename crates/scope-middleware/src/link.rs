//! Serial link supervision.
//!
//! Each physical link (radar data port, sensor-board port) is owned by one
//! blocking thread running this loop:
//!
//! ```text
//!   ┌────────────► open source ──(err)──► wait reopen_delay ─┐
//!   │                  │                                     │
//!   │                  ▼                                     │
//!   │         Framer::next_frame ──► handler(frame)          │
//!   │                  │                 │                   │
//!   │    ResetRequired / I/O error   Break(()) ──► stop      │
//!   │                  ▼                                     │
//!   └──── wait reopen_delay ◄── publish LinkReset alert ◄────┘
//! ```
//!
//! Decoding is left to the handler so the supervisor stays format-agnostic.

use std::io::{self, Read};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use scope_protocol::{Framer, FramerConfig, LinkError, TlvFrame};
use scope_types::{Event, EventPayload};
use tracing::{debug, info, warn};

use crate::bus::{EventBus, Topic};

/// Granularity of the interruptible reopen wait.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Short label used in logs, alerts and the thread name.
    pub name: String,
    pub framer: FramerConfig,
    /// Pause before reopening a stalled or failed link.
    pub reopen_delay: Duration,
}

impl LinkConfig {
    pub fn radar() -> Self {
        Self {
            name: "radar".to_string(),
            framer: FramerConfig::radar(),
            reopen_delay: Duration::from_secs(3),
        }
    }

    pub fn sensor_board() -> Self {
        Self {
            name: "sensor-board".to_string(),
            framer: FramerConfig::sensor_board(),
            reopen_delay: Duration::from_secs(3),
        }
    }
}

/// What a supervisor did before it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkReport {
    /// Successful opens of the source.
    pub sessions: u64,
    /// Sessions ended by a stall.
    pub resets: u64,
    /// Sessions ended by an open or read error.
    pub io_failures: u64,
    /// Frames handed to the handler.
    pub frames: u64,
}

pub struct LinkSupervisor {
    config: LinkConfig,
    shutdown: Arc<AtomicBool>,
    bus: Option<EventBus>,
}

impl LinkSupervisor {
    pub fn new(config: LinkConfig, shutdown: Arc<AtomicBool>) -> Self {
        Self { config, shutdown, bus: None }
    }

    /// Publish a [`EventPayload::LinkReset`] on [`Topic::SystemAlerts`] for
    /// every stall.
    pub fn with_alerts(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Run the supervision loop on a named thread.
    pub fn spawn<R, O, H>(self, open: O, handler: H) -> io::Result<JoinHandle<LinkReport>>
    where
        R: Read,
        O: FnMut() -> io::Result<R> + Send + 'static,
        H: FnMut(TlvFrame) -> ControlFlow<()> + Send + 'static,
    {
        thread::Builder::new()
            .name(format!("link-{}", self.config.name))
            .spawn(move || self.run(open, handler))
    }

    /// Run the supervision loop on the current thread until shutdown is
    /// requested or the handler breaks.
    ///
    /// The shutdown flag is checked between frames and during reopen waits;
    /// a read that blocks forever keeps the loop alive.
    pub fn run<R, O, H>(self, mut open: O, mut handler: H) -> LinkReport
    where
        R: Read,
        O: FnMut() -> io::Result<R>,
        H: FnMut(TlvFrame) -> ControlFlow<()>,
    {
        let link = self.config.name.as_str();
        let mut report = LinkReport::default();

        while !self.stopping() {
            let source = match open() {
                Ok(source) => source,
                Err(e) => {
                    report.io_failures += 1;
                    warn!(link, error = %e, "Failed to open link");
                    self.wait_before_reopen();
                    continue;
                }
            };
            report.sessions += 1;
            info!(link, session = report.sessions, "Link opened");

            let mut framer = Framer::new(source, self.config.framer);
            loop {
                if self.stopping() {
                    return self.finish(report);
                }
                match framer.next_frame() {
                    Ok(frame) => {
                        report.frames += 1;
                        if handler(frame).is_break() {
                            debug!(link, "Frame handler stopped the link");
                            return self.finish(report);
                        }
                    }
                    Err(LinkError::ResetRequired { zero_reads }) => {
                        report.resets += 1;
                        warn!(link, zero_reads, "Link stalled; resetting");
                        self.alert_reset(zero_reads);
                        break;
                    }
                    Err(LinkError::Io(e)) => {
                        report.io_failures += 1;
                        warn!(link, error = %e, "Link read failed; reopening");
                        break;
                    }
                }
            }
            let stats = framer.stats();
            debug!(
                link,
                frames = stats.frames,
                framing_errors = stats.framing_errors,
                skipped_bytes = stats.skipped_bytes,
                "Link session ended"
            );
            self.wait_before_reopen();
        }
        self.finish(report)
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn wait_before_reopen(&self) {
        let deadline = Instant::now() + self.config.reopen_delay;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(SHUTDOWN_POLL.min(deadline - now));
        }
    }

    fn alert_reset(&self, zero_reads: u32) {
        let Some(bus) = &self.bus else { return };
        let event = Event::new(
            format!("scope-middleware::link::{}", self.config.name),
            EventPayload::LinkReset { link: self.config.name.clone(), zero_reads },
        );
        if let Err(e) = bus.publish_to(Topic::SystemAlerts, event) {
            debug!(link = %self.config.name, error = %e, "Link reset alert not delivered");
        }
    }

    fn finish(&self, report: LinkReport) -> LinkReport {
        info!(
            link = %self.config.name,
            sessions = report.sessions,
            resets = report.resets,
            frames = report.frames,
            "Link supervisor stopped"
        );
        report
    }
}
