//! Recording statistics, logged at stop time. Informational only.

use log::info;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingStats {
    pub recording_duration: Duration,
    pub num_images: usize,
    pub video_duration_secs: f64,
    pub effective_interval_secs: f64,
    pub effective_speed: f64,
}

impl RecordingStats {
    /// All derived quantities are 0 when no images were captured.
    pub fn compute(recording_duration: Duration, num_images: usize, fps: u32) -> Self {
        let (video_duration_secs, effective_interval_secs, effective_speed) = if num_images == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let effective_interval = recording_duration.as_secs_f64() / num_images as f64;
            (
                num_images as f64 / f64::from(fps),
                effective_interval,
                effective_interval * f64::from(fps),
            )
        };
        RecordingStats {
            recording_duration,
            num_images,
            video_duration_secs,
            effective_interval_secs,
            effective_speed,
        }
    }

    pub fn log(&self, fps: u32) {
        info!("");
        info!("--- Recording Summary ---");
        info!(
            "Real recording time: {}",
            format_hms(self.recording_duration)
        );
        info!(
            "Video duration:      {} ({} frames @ {} fps)",
            format_hms(Duration::from_secs_f64(self.video_duration_secs)),
            self.num_images,
            fps
        );
        info!(
            "Playback speed:      {:.1}x (1s video = {:.0}s real time)",
            self.effective_speed, self.effective_speed
        );
        info!(
            "Effective interval:  {:.2}s between frames",
            self.effective_interval_secs
        );
        info!("--------------------------");
        info!("");
    }
}

fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
