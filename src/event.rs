//! Button input. The two push-buttons are pulled up and pressed to ground;
//! a watcher thread polls the lines, debounces falling edges and pushes
//! events into a bounded channel. The lifecycle machine consumes that
//! channel on the main thread, so button handling never races it.

use crate::config::{self, BUTTON_POLL, DEBOUNCE};
use crate::error::Result;
use crate::gpio::{Direction, Line};
use crossbeam_channel::Sender;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SpeedPressed,
    StartStopPressed,
}

/// Suppresses presses that arrive within the refractory window of the last
/// accepted one, absorbing mechanical contact bounce.
pub struct Debouncer {
    refractory: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(refractory: Duration) -> Self {
        Debouncer {
            refractory,
            last: None,
        }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.duration_since(last) < self.refractory => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

/// Falling-edge detector for one button.
struct EdgeState {
    was_low: bool,
    debounce: Debouncer,
}

impl EdgeState {
    fn new() -> Self {
        EdgeState {
            was_low: false,
            debounce: Debouncer::new(DEBOUNCE),
        }
    }

    fn falling(&mut self, low: bool, now: Instant) -> bool {
        let fired = low && !self.was_low && self.debounce.accept(now);
        self.was_low = low;
        fired
    }
}

/// Level access to the two button lines. Pressed reads as low.
pub trait ButtonPins: Send + 'static {
    fn speed_low(&self) -> bool;
    fn start_stop_low(&self) -> bool;
}

pub struct GpioButtons {
    speed: Line,
    start_stop: Line,
}

impl GpioButtons {
    pub fn open() -> Result<Self> {
        Ok(GpioButtons {
            speed: Line::open(config::BUTTON_SPEED, Direction::In)?,
            start_stop: Line::open(config::BUTTON_START_STOP, Direction::In)?,
        })
    }
}

impl ButtonPins for GpioButtons {
    fn speed_low(&self) -> bool {
        // a read error counts as released
        !self.speed.read().unwrap_or(true)
    }

    fn start_stop_low(&self) -> bool {
        !self.start_stop.read().unwrap_or(true)
    }
}

/// Polls the button lines for the lifetime of the process. Events that
/// arrive while the channel is full are dropped.
pub fn spawn_watcher<B: ButtonPins>(pins: B, tx: Sender<Event>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut speed = EdgeState::new();
        let mut start_stop = EdgeState::new();
        loop {
            let now = Instant::now();
            if speed.falling(pins.speed_low(), now) {
                let _ = tx.try_send(Event::SpeedPressed);
            }
            if start_stop.falling(pins.start_stop_low(), now) {
                let _ = tx.try_send(Event::StartStopPressed);
            }
            thread::sleep(BUTTON_POLL);
        }
    })
}
