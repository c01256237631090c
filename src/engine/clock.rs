//! Step clock - periodic ticker approximating the device playhead.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Quarter-note subdivision of the tempo.
pub fn tick_interval(bpm: u16) -> Duration {
    Duration::from_secs_f64(60.0 / f64::from(bpm) / 4.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Tick,
}

/// Single periodic ticker.
///
/// The ticker thread posts into an mpsc channel polled by the engine; it
/// never touches session state itself. A shared generation counter ties
/// each thread to the `start` call that spawned it, so a restart (tempo
/// change) retires the old thread before the new one posts - two ticker
/// instances never coexist.
pub struct StepClock {
    sender: Sender<ClockEvent>,
    receiver: Receiver<ClockEvent>,
    generation: Arc<AtomicU64>,
    ticking: bool,
}

impl StepClock {
    pub fn new() -> Self {
        let (sender, receiver) = channel();

        Self {
            sender,
            receiver,
            generation: Arc::new(AtomicU64::new(0)),
            ticking: false,
        }
    }

    /// Start (or restart) ticking at the given tempo. Any previous ticker
    /// thread is retired first.
    pub fn start(&mut self, bpm: u16) {
        let generation = Arc::clone(&self.generation);
        let born = generation.fetch_add(1, Ordering::SeqCst) + 1;
        let sender = self.sender.clone();
        let interval = tick_interval(bpm);

        thread::spawn(move || {
            let mut last_tick = Instant::now();

            while generation.load(Ordering::SeqCst) == born {
                let now = Instant::now();

                if now.duration_since(last_tick) >= interval {
                    if sender.send(ClockEvent::Tick).is_err() {
                        return;
                    }
                    last_tick = now;
                }

                thread::sleep(Duration::from_millis(1));
            }
        });

        self.ticking = true;
    }

    /// Retire the current ticker thread, if any.
    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.ticking = false;
    }

    pub fn is_ticking(&self) -> bool {
        self.ticking
    }

    pub fn poll_events(&self) -> Vec<ClockEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Default for StepClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StepClock {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_is_a_quarter_note_of_the_tempo() {
        assert_eq!(tick_interval(120), Duration::from_millis(125));
        // 60000 / 140 / 4 ~= 107.14ms
        let interval = tick_interval(140);
        assert!(interval > Duration::from_micros(107_100));
        assert!(interval < Duration::from_micros(107_200));
    }

    #[test]
    fn clock_ticks_while_running_and_stops_cleanly() {
        let mut clock = StepClock::new();
        clock.start(400); // 37.5ms interval
        thread::sleep(Duration::from_millis(300));
        clock.stop();
        assert!(!clock.poll_events().is_empty());

        // give any straggler tick time to land, then confirm silence
        thread::sleep(Duration::from_millis(100));
        clock.poll_events();
        thread::sleep(Duration::from_millis(100));
        assert!(clock.poll_events().is_empty());
    }

    #[test]
    fn restart_replaces_the_ticker() {
        let mut clock = StepClock::new();
        clock.start(120);
        assert!(clock.is_ticking());
        clock.start(240);
        assert!(clock.is_ticking());
        clock.stop();
        assert!(!clock.is_ticking());
    }
}
