//! Tri-color status LED. Every component surfaces its phase through here.

use crate::config;
use crate::error::Result;
use crate::gpio::{Direction, Line};
use log::warn;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Named LED statuses and their (red, green, blue) channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Off,
    Waiting,
    Speed,
    Ready,
    Recording,
    Recording2,
    Video,
    Error,
    Shutdown,
    SelfTestWhite,
    SelfTestRed,
    SelfTestGreen,
    SelfTestBlue,
}

impl Status {
    pub fn rgb(self) -> (bool, bool, bool) {
        match self {
            Status::Off => (false, false, false),
            Status::Waiting => (true, true, false),  // yellow
            Status::Speed => (true, true, false),    // yellow
            Status::Ready => (false, true, false),   // green
            Status::Recording => (true, false, false), // red
            Status::Recording2 => (true, true, false), // yellow
            Status::Video => (false, false, true),   // blue
            Status::Error => (true, false, true),    // magenta
            Status::Shutdown => (false, true, true), // cyan
            Status::SelfTestWhite => (true, true, true),
            Status::SelfTestRed => (true, false, false),
            Status::SelfTestGreen => (false, true, false),
            Status::SelfTestBlue => (false, false, true),
        }
    }
}

/// The three output channels driving the LED. Write failures are the
/// implementor's problem to log; status updates never escalate.
pub trait LedPins {
    fn set_rgb(&self, red: bool, green: bool, blue: bool);
    /// Best-effort hardware release on exit paths.
    fn release(&self) {}
}

pub struct GpioLeds {
    red: Line,
    green: Line,
    blue: Line,
}

impl GpioLeds {
    pub fn open() -> Result<Self> {
        Ok(GpioLeds {
            red: Line::open(config::LED_RED, Direction::Out)?,
            green: Line::open(config::LED_GREEN, Direction::Out)?,
            blue: Line::open(config::LED_BLUE, Direction::Out)?,
        })
    }
}

impl LedPins for GpioLeds {
    fn set_rgb(&self, red: bool, green: bool, blue: bool) {
        for (line, value) in &[(&self.red, red), (&self.green, green), (&self.blue, blue)] {
            if let Err(e) = line.write(*value) {
                warn!("LED write failed: {}", e);
            }
        }
    }
}

pub struct Indicator<P: LedPins> {
    pins: Arc<P>,
}

impl<P: LedPins> Clone for Indicator<P> {
    fn clone(&self) -> Self {
        Indicator {
            pins: self.pins.clone(),
        }
    }
}

impl<P: LedPins> Indicator<P> {
    pub fn new(pins: P) -> Self {
        Indicator {
            pins: Arc::new(pins),
        }
    }

    /// Set the LED color by status name.
    pub fn set(&self, status: Status) {
        let (r, g, b) = status.rgb();
        self.pins.set_rgb(r, g, b);
    }

    /// Blink the LED for a given status. Blocks the calling thread, so this
    /// is only used from contexts that are not time-critical.
    pub fn blink(&self, status: Status, times: usize, interval: Duration) {
        for _ in 0..times {
            self.set(status);
            thread::sleep(interval);
            self.set(Status::Off);
            thread::sleep(interval);
        }
    }

    /// Startup hardware sanity check: cycle white, red, green, blue once.
    pub fn self_test(&self) {
        for &status in [
            Status::SelfTestWhite,
            Status::SelfTestRed,
            Status::SelfTestGreen,
            Status::SelfTestBlue,
        ]
        .iter()
        {
            self.set(status);
            thread::sleep(Duration::from_millis(250));
        }
        self.set(Status::Off);
        thread::sleep(Duration::from_millis(100));
    }

    pub fn release(&self) {
        self.pins.release();
    }
}
