//! Still-image capture. The camera is driven through an external process
//! per frame; the scheduler only sees the [`FrameSink`] trait.

use crate::error::{Error, Result};
use log::{debug, error};
use std::path::Path;
use std::process::Command;

pub trait FrameSink {
    /// Prepare the still configuration. Called once per recording session.
    fn configure(&mut self) -> Result<()>;
    /// Start the camera pipeline. Called once, after [`configure`].
    fn start(&mut self) -> Result<()>;
    /// Capture one JPEG frame to `path`.
    fn capture_to(&mut self, path: &Path) -> Result<()>;
}

/// Captures through `libcamera-still`, one invocation per frame.
pub struct StillCamera {
    width: u32,
    height: u32,
    quality: u32,
}

impl StillCamera {
    pub fn new() -> Self {
        StillCamera {
            width: 1440,
            height: 1080,
            quality: 90,
        }
    }
}

impl FrameSink for StillCamera {
    fn configure(&mut self) -> Result<()> {
        debug!(
            "still configuration: {}x{} quality {}",
            self.width, self.height, self.quality
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn capture_to(&mut self, path: &Path) -> Result<()> {
        let output = Command::new("libcamera-still")
            .arg("-o")
            .arg(path)
            .arg("--timeout")
            .arg("100")
            .arg("--nopreview")
            .arg("--width")
            .arg(self.width.to_string())
            .arg("--height")
            .arg(self.height.to_string())
            .arg("--quality")
            .arg(self.quality.to_string())
            .output()
            .map_err(|source| Error::CommandSpawn {
                program: "libcamera-still".to_string(),
                source,
            })?;
        if !output.status.success() {
            error!(
                "libcamera-still failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(Error::Capture {
                status: output.status,
            });
        }
        Ok(())
    }
}
