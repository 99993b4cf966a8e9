//! Access to GPIO lines through the sysfs interface. Pin numbers are BCM.

use crate::error::{Error, Result};
use log::debug;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

const SYSFS_ROOT: &str = "/sys/class/gpio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// One exported GPIO line.
#[derive(Debug)]
pub struct Line {
    pin: u32,
    value_path: PathBuf,
}

impl Line {
    pub fn open(pin: u32, direction: Direction) -> Result<Self> {
        export(pin).map_err(|source| Error::Gpio { pin, source })?;
        // the value/direction files appear a moment after export
        thread::sleep(Duration::from_millis(100));
        let base = PathBuf::from(format!("{}/gpio{}", SYSFS_ROOT, pin));
        fs::write(base.join("direction"), direction.as_str())
            .map_err(|source| Error::Gpio { pin, source })?;
        Ok(Line {
            pin,
            value_path: base.join("value"),
        })
    }

    pub fn write(&self, high: bool) -> Result<()> {
        fs::write(&self.value_path, if high { "1" } else { "0" }).map_err(|source| Error::Gpio {
            pin: self.pin,
            source,
        })
    }

    pub fn read(&self) -> Result<bool> {
        let raw = fs::read_to_string(&self.value_path).map_err(|source| Error::Gpio {
            pin: self.pin,
            source,
        })?;
        Ok(raw.trim() == "1")
    }
}

fn export(pin: u32) -> io::Result<()> {
    // a previous run that did not clean up leaves the pin exported
    if PathBuf::from(format!("{}/gpio{}", SYSFS_ROOT, pin)).exists() {
        return Ok(());
    }
    fs::write(format!("{}/export", SYSFS_ROOT), pin.to_string())
}

/// Best-effort release of every pin this program uses. Failures are only
/// logged; this runs on exit paths where nothing can be done about them.
pub fn release_all() {
    for &pin in crate::config::ALL_PINS.iter() {
        if let Err(e) = fs::write(format!("{}/unexport", SYSFS_ROOT), pin.to_string()) {
            debug!("could not unexport gpio{}: {}", pin, e);
        }
    }
}
