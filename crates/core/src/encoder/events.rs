//! Events published by the supervisor, keyed by job id.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::warn;

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EncodingEvent {
    /// Raw diagnostic output from the encoder.
    Log { job_id: String, text: String },
    /// Overall job progress, 0..=100.
    Progress { job_id: String, percent: u8 },
    /// The job finished and the output is written.
    Complete { job_id: String, output_path: PathBuf },
    /// The job failed.
    Error { job_id: String, message: String },
}

impl EncodingEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Log { job_id, .. }
            | Self::Progress { job_id, .. }
            | Self::Complete { job_id, .. }
            | Self::Error { job_id, .. } => job_id,
        }
    }

    /// Short name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Log { .. } => "log",
            Self::Progress { .. } => "progress",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// Whether this is the last event a job emits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// Terminal events kept for subscribers that fall behind the channel.
#[derive(Debug)]
struct TerminalLedger {
    next_seq: u64,
    recent: VecDeque<(u64, EncodingEvent)>,
    capacity: usize,
}

impl TerminalLedger {
    fn since(&self, seq: u64) -> impl Iterator<Item = &(u64, EncodingEvent)> {
        self.recent.iter().filter(move |(s, _)| *s >= seq)
    }
}

/// What travels on the channel: the event plus its ledger sequence if terminal.
#[derive(Debug, Clone)]
struct Envelope {
    terminal_seq: Option<u64>,
    event: EncodingEvent,
}

/// Fan-out of [`EncodingEvent`]s to any number of subscribers.
///
/// The channel is bounded and drops the oldest events for slow subscribers.
/// `complete` and `error` events are also recorded in a bounded ledger, and
/// subscribers replay the ones they missed after a lag, so every job's terminal
/// event reaches each subscriber exactly once.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Envelope>,
    ledger: Arc<Mutex<TerminalLedger>>,
}

fn lock(ledger: &Mutex<TerminalLedger>) -> MutexGuard<'_, TerminalLedger> {
    ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EventBus {
    /// Creates a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            ledger: Arc::new(Mutex::new(TerminalLedger {
                next_seq: 0,
                recent: VecDeque::new(),
                capacity,
            })),
        }
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn emit(&self, event: EncodingEvent) {
        // Held across the send so ledger order and channel order agree.
        let mut ledger = lock(&self.ledger);
        let terminal_seq = if event.is_terminal() {
            let seq = ledger.next_seq;
            ledger.next_seq += 1;
            ledger.recent.push_back((seq, event.clone()));
            if ledger.recent.len() > ledger.capacity {
                ledger.recent.pop_front();
            }
            Some(seq)
        } else {
            None
        };
        let _ = self.sender.send(Envelope {
            terminal_seq,
            event,
        });
    }

    /// Receives every event for every job.
    pub fn subscribe(&self) -> EventStream {
        let ledger = lock(&self.ledger);
        EventStream {
            rx: self.sender.subscribe(),
            ledger: Arc::clone(&self.ledger),
            next_terminal: ledger.next_seq,
            replay: VecDeque::new(),
            skipped: 0,
        }
    }

    /// Receives only the events of one job.
    pub fn subscribe_job(&self, job_id: impl Into<String>) -> JobEvents {
        JobEvents {
            job_id: job_id.into(),
            stream: self.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Every event on the bus, in order.
///
/// Non-terminal events lost to lag are gone; terminal ones are replayed.
#[derive(Debug)]
pub struct EventStream {
    rx: broadcast::Receiver<Envelope>,
    ledger: Arc<Mutex<TerminalLedger>>,
    /// Sequence of the next terminal event not yet delivered.
    next_terminal: u64,
    replay: VecDeque<EncodingEvent>,
    skipped: u64,
}

impl EventStream {
    /// Next event; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EncodingEvent> {
        loop {
            if let Some(event) = self.replay.pop_front() {
                return Some(event);
            }
            match self.rx.recv().await {
                Ok(envelope) => {
                    if let Some(event) = self.accept(envelope) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => self.recover(n),
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<EncodingEvent> {
        loop {
            if let Some(event) = self.replay.pop_front() {
                return Some(event);
            }
            match self.rx.try_recv() {
                Ok(envelope) => {
                    if let Some(event) = self.accept(envelope) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => self.recover(n),
                Err(_) => return None,
            }
        }
    }

    /// Total events dropped because this subscriber fell behind.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn accept(&mut self, envelope: Envelope) -> Option<EncodingEvent> {
        match envelope.terminal_seq {
            // Already replayed from the ledger.
            Some(seq) if seq < self.next_terminal => None,
            Some(seq) => {
                self.next_terminal = seq + 1;
                Some(envelope.event)
            }
            None => Some(envelope.event),
        }
    }

    fn recover(&mut self, n: u64) {
        self.skipped += n;
        let ledger = lock(&self.ledger);
        let mut missed = 0;
        if let Some((oldest, _)) = ledger.recent.front() {
            if *oldest > self.next_terminal {
                missed = oldest - self.next_terminal;
            }
        }
        for (seq, event) in ledger.since(self.next_terminal) {
            self.replay.push_back(event.clone());
            self.next_terminal = seq + 1;
        }
        if missed > 0 {
            warn!(
                skipped = n,
                lost_terminal = missed,
                "Event subscriber lagged past the terminal ledger"
            );
        } else {
            warn!(skipped = n, replayed = self.replay.len(), "Event subscriber lagged");
        }
    }
}

/// Event stream filtered to a single job.
#[derive(Debug)]
pub struct JobEvents {
    job_id: String,
    stream: EventStream,
}

impl JobEvents {
    /// Next event for this job; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<EncodingEvent> {
        loop {
            let event = self.stream.recv().await?;
            if event.job_id() == self.job_id {
                return Some(event);
            }
        }
    }
}
