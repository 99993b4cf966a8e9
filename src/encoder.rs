//! Video rendering through an external ffmpeg process.

use crate::error::{Error, Result};
use crate::shell::run_and_log;
use chrono::NaiveDateTime;
use std::path::Path;
use std::process::Command;

pub trait Render {
    /// Encode the `img%05d.jpg` sequence in `frames_dir` into `output`.
    fn encode(&self, frames_dir: &Path, output: &Path) -> Result<()>;
}

pub struct FfmpegRender {
    pub fps: u32,
}

impl Render for FfmpegRender {
    fn encode(&self, frames_dir: &Path, output: &Path) -> Result<()> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-framerate")
            .arg(self.fps.to_string())
            .arg("-i")
            .arg(frames_dir.join("img%05d.jpg"))
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg(output);
        let status = run_and_log(cmd)?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Encode { status })
        }
    }
}

/// Output video name carrying the capture timestamp.
pub fn output_filename(now: NaiveDateTime) -> String {
    format!("timelapse_{}.mp4", now.format("%Y%m%d_%H%M%S"))
}
