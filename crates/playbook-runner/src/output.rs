//! Fan-out of captured runner output.
//!
//! The hub owns one broadcast channel per stream. Publishing never waits on
//! subscribers: each channel buffers `capacity` records and a subscriber that
//! falls further behind loses the oldest ones, learning how many through
//! [`Received::Lagged`]. Records published while nobody is subscribed are
//! dropped, so subscribe before starting the run you want to watch.
//!
//! Every reader publishes one [`OutputEvent::Closed`] for its stream after
//! its last line. Those sentinels share the lossy buffer, so a run's end is
//! also signalled through a per-run `watch` channel that cannot be evicted.
//! A run subscription that lagged past its `Closed` events still ends.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::watch;
use tokio_stream::wrappers::BroadcastStream;

type RunSignals = Arc<Mutex<HashMap<String, watch::Sender<bool>>>>;

fn lock(signals: &RunSignals) -> MutexGuard<'_, HashMap<String, watch::Sender<bool>>> {
    signals.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputSource {
    Stdout,
    Stderr,
}

impl OutputSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputSource::Stdout => "stdout",
            OutputSource::Stderr => "stderr",
        }
    }
}

/// One captured line, tagged with the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputLine {
    pub run_id: String,
    pub source: OutputSource,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputEvent {
    Line(OutputLine),
    /// End of one stream for one run. No further lines follow for that pair.
    Closed {
        run_id: String,
        source: OutputSource,
    },
}

impl OutputEvent {
    pub fn run_id(&self) -> &str {
        match self {
            OutputEvent::Line(l) => &l.run_id,
            OutputEvent::Closed { run_id, .. } => run_id,
        }
    }

    pub fn source(&self) -> OutputSource {
        match self {
            OutputEvent::Line(l) => l.source,
            OutputEvent::Closed { source, .. } => *source,
        }
    }
}

// ---------------------------------------------------------------------------
// OutputHub
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct OutputHub {
    stdout: broadcast::Sender<OutputEvent>,
    stderr: broadcast::Sender<OutputEvent>,
    finished: RunSignals,
}

impl Default for OutputHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl OutputHub {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (stdout, _) = broadcast::channel(capacity);
        let (stderr, _) = broadcast::channel(capacity);
        Self {
            stdout,
            stderr,
            finished: RunSignals::default(),
        }
    }

    fn sender(&self, source: OutputSource) -> &broadcast::Sender<OutputEvent> {
        match source {
            OutputSource::Stdout => &self.stdout,
            OutputSource::Stderr => &self.stderr,
        }
    }

    pub(crate) fn publish(&self, event: OutputEvent) {
        // Err only means there are no subscribers right now.
        let _ = self.sender(event.source()).send(event);
    }

    /// Mark `run_id` as finished. Every record of the run must already be
    /// published. Run subscriptions drain what is buffered and then end.
    pub(crate) fn finish(&self, run_id: &str) {
        if let Some(done) = lock(&self.finished).remove(run_id) {
            done.send_replace(true);
        }
    }

    /// Raw receiver for one stream, all runs.
    pub fn receiver(&self, source: OutputSource) -> broadcast::Receiver<OutputEvent> {
        self.sender(source).subscribe()
    }

    /// One stream as a `Stream`, all runs.
    pub fn stream(&self, source: OutputSource) -> BroadcastStream<OutputEvent> {
        BroadcastStream::new(self.receiver(source))
    }

    /// Both streams, all runs. Ends only when the hub is dropped.
    pub fn subscribe(&self) -> OutputSubscription {
        OutputSubscription::new(self, None)
    }

    /// Both streams, one run. Ends after that run's two `Closed` events, or
    /// once the run has finished and the buffered records are drained.
    ///
    /// Subscribe before the run starts; a subscription to a run that already
    /// finished waits until the hub is dropped.
    pub fn subscribe_run(&self, run_id: impl Into<String>) -> OutputSubscription {
        OutputSubscription::new(self, Some(run_id.into()))
    }
}

// ---------------------------------------------------------------------------
// OutputSubscription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Event(OutputEvent),
    /// The subscriber fell behind and `skipped` records on `source` were lost.
    Lagged { source: OutputSource, skipped: u64 },
}

pub struct OutputSubscription {
    stdout: broadcast::Receiver<OutputEvent>,
    stderr: broadcast::Receiver<OutputEvent>,
    run_id: Option<String>,
    stdout_open: bool,
    stderr_open: bool,
    done: Option<watch::Receiver<bool>>,
    finished: bool,
    signals: RunSignals,
}

impl OutputSubscription {
    fn new(hub: &OutputHub, run_id: Option<String>) -> Self {
        let done = run_id.as_ref().map(|id| {
            lock(&hub.finished)
                .entry(id.clone())
                .or_insert_with(|| watch::channel(false).0)
                .subscribe()
        });
        Self {
            stdout: hub.receiver(OutputSource::Stdout),
            stderr: hub.receiver(OutputSource::Stderr),
            run_id,
            stdout_open: true,
            stderr_open: true,
            done,
            finished: false,
            signals: Arc::clone(&hub.finished),
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Next record from either stream, or `None` once the subscription ends.
    ///
    /// Within one stream order is preserved; between streams it is not.
    pub async fn recv(&mut self) -> Option<Received> {
        loop {
            if self.finished {
                return self.drain_next();
            }
            let streams_open = self.stdout_open || self.stderr_open;
            let (source, res) = tokio::select! {
                r = self.stdout.recv(), if self.stdout_open => (OutputSource::Stdout, r),
                r = self.stderr.recv(), if self.stderr_open => (OutputSource::Stderr, r),
                _ = run_finished(&mut self.done), if streams_open && self.done.is_some() => {
                    self.finished = true;
                    continue;
                }
                else => return None,
            };
            if let Some(received) = self.accept(source, res) {
                return Some(received);
            }
        }
    }

    /// Drain until the subscription ends, keeping only lines.
    pub async fn collect_lines(mut self) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        while let Some(received) = self.recv().await {
            if let Received::Event(OutputEvent::Line(line)) = received {
                lines.push(line);
            }
        }
        lines
    }

    /// Filter one channel result. `None` means nothing to hand out.
    fn accept(
        &mut self,
        source: OutputSource,
        res: Result<OutputEvent, RecvError>,
    ) -> Option<Received> {
        match res {
            Ok(event) => {
                let Some(wanted) = self.run_id.as_deref() else {
                    return Some(Received::Event(event));
                };
                if event.run_id() != wanted {
                    return None;
                }
                if matches!(event, OutputEvent::Closed { .. }) {
                    self.close(source);
                }
                Some(Received::Event(event))
            }
            Err(RecvError::Lagged(skipped)) => Some(Received::Lagged { source, skipped }),
            Err(RecvError::Closed) => {
                self.close(source);
                None
            }
        }
    }

    /// The run has finished: hand out what is still buffered without waiting.
    fn drain_next(&mut self) -> Option<Received> {
        for source in [OutputSource::Stdout, OutputSource::Stderr] {
            while self.is_open(source) {
                let res = match self.receiver(source).try_recv() {
                    Ok(event) => Ok(event),
                    Err(TryRecvError::Lagged(skipped)) => Err(RecvError::Lagged(skipped)),
                    Err(TryRecvError::Closed) => Err(RecvError::Closed),
                    Err(TryRecvError::Empty) => {
                        self.close(source);
                        break;
                    }
                };
                if let Some(received) = self.accept(source, res) {
                    return Some(received);
                }
            }
        }
        None
    }

    fn receiver(&mut self, source: OutputSource) -> &mut broadcast::Receiver<OutputEvent> {
        match source {
            OutputSource::Stdout => &mut self.stdout,
            OutputSource::Stderr => &mut self.stderr,
        }
    }

    fn is_open(&self, source: OutputSource) -> bool {
        match source {
            OutputSource::Stdout => self.stdout_open,
            OutputSource::Stderr => self.stderr_open,
        }
    }

    fn close(&mut self, source: OutputSource) {
        match source {
            OutputSource::Stdout => self.stdout_open = false,
            OutputSource::Stderr => self.stderr_open = false,
        }
    }
}

impl Drop for OutputSubscription {
    fn drop(&mut self) {
        let (Some(run_id), Some(_)) = (self.run_id.as_deref(), self.done.as_ref()) else {
            return;
        };
        // Forget the signal of a run nobody else is waiting on.
        let mut signals = lock(&self.signals);
        if signals
            .get(run_id)
            .is_some_and(|done| done.receiver_count() <= 1)
        {
            signals.remove(run_id);
        }
    }
}

/// Resolves once the watched run has finished or its signal is gone.
async fn run_finished(done: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = done {
        let _ = rx.wait_for(|finished| *finished).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
