use std::{future::Future, time::Duration};

use tokio::task::AbortHandle;

/// Which phase a timer closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Delay between "game started" and round 0.
    Intro,
    /// Answer window of a round.
    Guess,
    /// Answer display after a round.
    Reveal,
    /// Countdown after a resume.
    Resume,
}

#[derive(Debug)]
struct ArmedTimer {
    kind: TimerKind,
    generation: u64,
    handle: AbortHandle,
}

/// Single cancelable timer slot of a room.
///
/// Arming replaces (and aborts) the previous timer, so at most one phase
/// timer is ever armed. Every arm gets a fresh generation; a callback whose
/// generation is no longer current is stale and must do nothing.
#[derive(Debug, Default)]
pub struct PhaseTimer {
    generation: u64,
    armed: Option<ArmedTimer>,
}

impl PhaseTimer {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer running `on_fire(generation)` after `delay`.
    pub fn arm<F, Fut>(&mut self, kind: TimerKind, delay: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let callback = on_fire(generation);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback.await;
        })
        .abort_handle();

        self.armed = Some(ArmedTimer {
            kind,
            generation,
            handle,
        });
        generation
    }

    /// Claim the timer from its own callback.
    ///
    /// Returns the kind when `generation` is still the armed one and clears
    /// the slot without aborting the (running) task.
    pub fn fire(&mut self, generation: u64) -> Option<TimerKind> {
        match &self.armed {
            Some(armed) if armed.generation == generation => {
                self.armed.take().map(|armed| armed.kind)
            }
            _ => None,
        }
    }

    /// Abort the armed timer, if any.
    pub fn cancel(&mut self) -> Option<TimerKind> {
        self.armed.take().map(|armed| {
            armed.handle.abort();
            armed.kind
        })
    }
}

impl Drop for PhaseTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
