use crate::watch::{EventSink, FsEvent};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Collapses a burst of notifications into one event, emitted once the
/// stream has been quiet for `window`. Time is passed in explicitly.
#[derive(Debug)]
pub struct Coalescer {
    window: Duration,
    pending: Option<(FsEvent, Instant)>,
}

impl Coalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: None,
        }
    }

    /// Merge `event` into the pending burst and push its deadline back.
    pub fn push(&mut self, event: FsEvent, now: Instant) {
        let merged = match self.pending.take() {
            Some((prev, _)) => FsEvent {
                kind: prev.kind.max(event.kind),
                path: event.path,
            },
            None => event,
        };
        self.pending = Some((merged, now));
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, last)| *last + self.window)
    }

    /// Take the merged event if its quiet period has elapsed.
    pub fn poll(&mut self, now: Instant) -> Option<FsEvent> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.pending.take().map(|(event, _)| event),
            _ => None,
        }
    }
}

/// Drive a [`Coalescer`] on its own thread, feeding merged events to `sink`.
///
/// The thread exits when every sender for `events` is gone; a burst still
/// pending at that point is dropped.
pub fn spawn(
    window: Duration,
    events: Receiver<FsEvent>,
    sink: EventSink,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("marksync-coalesce".to_string())
        .spawn(move || {
            let mut coalescer = Coalescer::new(window);
            loop {
                let received = match coalescer.deadline() {
                    None => match events.recv() {
                        Ok(event) => Some(event),
                        Err(_) => break,
                    },
                    Some(deadline) => {
                        let wait = deadline.saturating_duration_since(Instant::now());
                        match events.recv_timeout(wait) {
                            Ok(event) => Some(event),
                            Err(RecvTimeoutError::Timeout) => None,
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                };

                if let Some(event) = received {
                    coalescer.push(event, Instant::now());
                }
                if let Some(event) = coalescer.poll(Instant::now()) {
                    sink(event);
                }
            }
        })
}
