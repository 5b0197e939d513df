//! The decoder's event loop.
//!
//! Key events and deadline firings are handled one at a time on the calling
//! thread, so the engine needs no locking. The capture is opened when the
//! loop starts and released on every way out of it.

use std::time::Instant;

use crossbeam_channel::{after, bounded, never, select, unbounded, Receiver, Sender};
use log::{debug, info};

use crate::cw::{ArmedDeadline, CwEngine, DeadlineToken, KeyDisposition, SpeedLevel};
use crate::error::InputError;
use crate::input::{KeySource, KeyTransitionEvent};
use crate::sink::TextSink;

/// Clock-side mirror of the decoder's single armed deadline
#[derive(Debug, Clone, Copy)]
struct Countdown {
    token: DeadlineToken,
    due: Instant,
}

impl Countdown {
    /// Follow the decoder: keep the running countdown if it is still the
    /// live deadline, otherwise start counting the new one from now.
    fn sync(current: Option<Countdown>, armed: Option<ArmedDeadline>) -> Option<Countdown> {
        match (current, armed) {
            (_, None) => None,
            (Some(c), Some(d)) if c.token == d.token => Some(c),
            (_, Some(d)) => Some(Countdown {
                token: d.token,
                due: Instant::now() + d.after,
            }),
        }
    }
}

/// Counters for one run of the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: usize,
    pub passed_through: usize,
    pub boundaries: usize,
    pub sink_failures: usize,
}

/// Stops a running loop from another thread
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    stop_tx: Sender<()>,
}

impl RuntimeHandle {
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }
}

pub struct Runtime {
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl Runtime {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = bounded(1);
        Self { stop_tx, stop_rx }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            stop_tx: self.stop_tx.clone(),
        }
    }

    /// Drive `engine` from `source` until the source runs dry or a stop is
    /// requested. Once the source closes, any armed boundary still gets to
    /// fire so the last character (and its word space) are committed.
    pub fn run<S: TextSink>(
        &self,
        source: Box<dyn KeySource>,
        engine: &mut CwEngine<S>,
        mut on_speed_change: impl FnMut(SpeedLevel),
    ) -> Result<RunSummary, InputError> {
        let (events_tx, events_rx) = unbounded::<KeyTransitionEvent>();
        let closed = never::<KeyTransitionEvent>();
        let capture = source.open(events_tx)?;
        info!("[runtime] decoding from {}", capture.name());

        let mut summary = RunSummary::default();
        let mut countdown: Option<Countdown> = None;
        let mut connected = true;

        loop {
            countdown = Countdown::sync(countdown, engine.state().armed_deadline());
            if !connected && countdown.is_none() {
                break;
            }

            let live = if connected { &events_rx } else { &closed };
            let timer = match countdown {
                Some(c) => after(c.due.saturating_duration_since(Instant::now())),
                None => never(),
            };

            select! {
                recv(live) -> msg => match msg {
                    Ok(event) => {
                        summary.events += 1;
                        match engine.handle_event(&event) {
                            Ok(dispatched) => {
                                if let Some(level) = dispatched.speed_change() {
                                    on_speed_change(level);
                                }
                                if dispatched.disposition == KeyDisposition::PassThrough {
                                    summary.passed_through += 1;
                                    debug!("[runtime] {} passed through", event.key);
                                }
                            }
                            Err(err) => {
                                summary.sink_failures += 1;
                                debug!("[runtime] dropped {:?}: {}", event, err);
                            }
                        }
                    }
                    Err(_) => {
                        debug!("[runtime] source closed");
                        connected = false;
                    }
                },
                recv(timer) -> _ => {
                    if let Some(c) = countdown.take() {
                        summary.boundaries += 1;
                        // a failed firing leaves the deadline armed; the next
                        // sync starts it again
                        if let Err(err) = engine.boundary_elapsed(c.token) {
                            summary.sink_failures += 1;
                            debug!("[runtime] boundary deferred: {}", err);
                        }
                    }
                },
                recv(self.stop_rx) -> _ => {
                    info!("[runtime] stop requested");
                    break;
                },
            }
        }

        capture.release();
        Ok(summary)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cw::Boundary;
    use std::time::Duration;

    #[test]
    fn test_countdown_follows_armed_deadline() {
        let mut scheduler = crate::cw::BoundaryScheduler::new();
        let first = scheduler.arm(Duration::from_millis(50), Boundary::Char);

        let c1 = Countdown::sync(None, Some(first)).unwrap();
        let kept = Countdown::sync(Some(c1), Some(first)).unwrap();
        assert_eq!(kept.due, c1.due);

        let second = scheduler.arm(Duration::from_millis(50), Boundary::Word);
        let c2 = Countdown::sync(Some(c1), Some(second)).unwrap();
        assert_eq!(c2.token, second.token);

        assert!(Countdown::sync(Some(c2), None).is_none());
    }
}
