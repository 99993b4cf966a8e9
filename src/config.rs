//! All tunables live here: GPIO pin numbers (BCM), speed presets, paths and
//! wait periods. There is no runtime configuration surface.

use std::time::Duration;

// GPIO setup (BCM numbering)
pub const LED_RED: u32 = 4;
pub const LED_GREEN: u32 = 27;
pub const LED_BLUE: u32 = 22;
pub const BUTTON_SPEED: u32 = 5;
pub const BUTTON_START_STOP: u32 = 6;

pub const ALL_PINS: [u32; 5] = [LED_RED, LED_GREEN, LED_BLUE, BUTTON_SPEED, BUTTON_START_STOP];

/// Frame rate of the rendered video.
pub const FPS: u32 = 24;

/// A named capture-interval preset. A preset of `Nx` plays back N times
/// faster than real time at [`FPS`].
#[derive(Debug, Clone, Copy)]
pub struct SpeedPreset {
    pub name: &'static str,
    pub interval_secs: f32,
}

pub const SPEED_PRESETS: [SpeedPreset; 6] = [
    SpeedPreset { name: "10x", interval_secs: 10.0 / FPS as f32 },
    SpeedPreset { name: "30x", interval_secs: 30.0 / FPS as f32 },
    SpeedPreset { name: "50x", interval_secs: 50.0 / FPS as f32 },
    SpeedPreset { name: "100x", interval_secs: 100.0 / FPS as f32 },
    SpeedPreset { name: "200x", interval_secs: 200.0 / FPS as f32 },
    SpeedPreset { name: "500x", interval_secs: 500.0 / FPS as f32 },
];

// The pi user needs write permission on the mount point.
pub const MOUNT_POINT: &str = "/home/pi/usb";
pub const IMG_FOLDER: &str = "/home/pi/usb/timelapse_images";
pub const RENDER_FOLDER: &str = "/home/pi/usb/render";
pub const LOG_DIR: &str = "/tmp";
pub const LOCAL_LOG_PATH: &str = "/tmp/timelapse.log";
pub const DEV_DIR: &str = "/dev";

/// How long the render decision window stays open before encoding starts.
pub const RENDER_WAIT: Duration = Duration::from_secs(5);
/// Poll period while waiting for a USB drive to show up.
pub const STORAGE_POLL: Duration = Duration::from_secs(2);
/// Refractory period between accepted presses of the same button.
pub const DEBOUNCE: Duration = Duration::from_millis(300);
/// Poll period of the button watcher thread.
pub const BUTTON_POLL: Duration = Duration::from_millis(10);
/// Upper bound on one sleep slice of the capture loop; also the worst-case
/// cancellation latency once the current capture has finished.
pub const SLEEP_QUANTUM: Duration = Duration::from_millis(50);
/// Capacity of the button event channel.
pub const EVENT_CAPACITY: usize = 8;
