//! Per-session clock driving countdowns and answer windows.
//!
//! The clock never touches session state itself: it only feeds tick and
//! expiry commands back into the owning worker's queue, stamped with a
//! generation number so the worker can discard messages from a clock that
//! was since cancelled or restarted.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};

use crate::services::session_worker::Command;

/// Cancellable one-shot clock with once-per-second ticks.
///
/// At most one clock runs at a time; starting a new one cancels the previous
/// one and bumps the generation.
#[derive(Debug)]
pub struct TimerEngine {
    commands: mpsc::UnboundedSender<Command>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl TimerEngine {
    /// New engine feeding the given worker queue. No clock is running yet.
    pub fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self {
            commands,
            generation: 0,
            task: None,
        }
    }

    /// Start a clock for `duration`, cancelling any previous one. Returns the
    /// generation stamped on this clock's messages.
    pub fn start(&mut self, duration: Duration) -> u64 {
        self.cancel();
        let generation = self.generation;
        let commands = self.commands.clone();
        self.task = Some(tokio::spawn(run_clock(commands, generation, duration)));
        generation
    }

    /// Stop the running clock, if any. Messages from it become stale.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.generation += 1;
    }

    /// Generation any currently live clock is stamped with.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether a message generation belongs to the live clock.
    pub fn is_current(&self, generation: u64) -> bool {
        self.task.is_some() && generation == self.generation
    }
}

impl Drop for TimerEngine {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Tick once per second until the deadline, then report expiry exactly once.
///
/// The deadline is computed once up front and compared monotonically, so a
/// delayed wakeup skips ticks rather than stretching the total duration.
async fn run_clock(commands: mpsc::UnboundedSender<Command>, generation: u64, duration: Duration) {
    let deadline = Instant::now() + duration;

    loop {
        let now = Instant::now();
        if now >= deadline {
            let _ = commands.send(Command::ClockElapsed { generation });
            return;
        }

        let remaining = deadline - now;
        let seconds_remaining = remaining.as_secs_f64().ceil() as u64;
        if commands
            .send(Command::ClockTick {
                generation,
                seconds_remaining,
            })
            .is_err()
        {
            return;
        }

        sleep_until((now + Duration::from_secs(1)).min(deadline)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> (TimerEngine, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (TimerEngine::new(tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_second_then_expires_once() {
        let (mut clock, mut rx) = engine();
        let generation = clock.start(Duration::from_secs(3));

        let mut ticks = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                Command::ClockTick {
                    generation: g,
                    seconds_remaining,
                } => {
                    assert_eq!(g, generation);
                    ticks.push(seconds_remaining);
                }
                Command::ClockElapsed { generation: g } => {
                    assert_eq!(g, generation);
                    break;
                }
                other => panic!("unexpected command: {other:?}"),
            }
        }

        assert_eq!(ticks, vec![3, 2, 1]);
        // Exactly once: the channel stays silent after expiry.
        drop(clock);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_ticks() {
        let (mut clock, mut rx) = engine();
        let generation = clock.start(Duration::from_secs(30));

        // First tick arrives immediately.
        match rx.recv().await.unwrap() {
            Command::ClockTick {
                generation: g,
                seconds_remaining,
            } => {
                assert_eq!(g, generation);
                assert_eq!(seconds_remaining, 30);
            }
            other => panic!("unexpected command: {other:?}"),
        }

        clock.cancel();
        assert!(!clock.is_current(generation));

        drop(clock);
        // Nothing else was queued and nothing will be.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_supersedes_the_previous_clock() {
        let (mut clock, mut rx) = engine();
        let first = clock.start(Duration::from_secs(60));
        let second = clock.start(Duration::from_secs(2));
        assert_ne!(first, second);

        let mut elapsed_generations = Vec::new();
        let mut live_ticks = Vec::new();
        loop {
            match rx.recv().await.unwrap() {
                Command::ClockTick {
                    generation,
                    seconds_remaining,
                } => {
                    if clock.is_current(generation) {
                        live_ticks.push(seconds_remaining);
                    }
                }
                Command::ClockElapsed { generation } => {
                    elapsed_generations.push(generation);
                    break;
                }
                other => panic!("unexpected command: {other:?}"),
            }
        }

        assert_eq!(live_ticks, vec![2, 1]);
        assert_eq!(elapsed_generations, vec![second]);
    }
}
