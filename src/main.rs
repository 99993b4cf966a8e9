// Unattended timelapse rig: two buttons, a tri-color LED, a USB drive and
// a camera. See live log: journalctl -u timelapse -f

mod camera;
mod config;
mod encoder;
mod error;
mod event;
mod gpio;
mod indicator;
mod lifecycle;
mod shell;
mod storage;

use camera::StillCamera;
use encoder::FfmpegRender;
use indicator::{GpioLeds, Indicator, LedPins, Status};
use lifecycle::{Machine, Paths};
use log::{error, info, warn};
use std::process;
use std::time::Duration;
use storage::{StorageManager, SudoHost};

fn main() {
    init_logging();
    log_panics::init();
    info!("Starting up...");

    let leds = match GpioLeds::open() {
        Ok(leds) => leds,
        Err(e) => {
            error!("LED setup failed: {}", e);
            process::exit(1);
        }
    };
    let indicator = Indicator::new(leds);

    let buttons = match event::GpioButtons::open() {
        Ok(buttons) => buttons,
        Err(e) => {
            error!("Button setup failed: {}", e);
            indicator.blink(Status::Error, 10, Duration::from_millis(200));
            gpio::release_all();
            process::exit(1);
        }
    };
    let (tx, rx) = crossbeam_channel::bounded(config::EVENT_CAPACITY);
    let _watcher = event::spawn_watcher(buttons, tx);

    install_signal_handler(indicator.clone());

    let storage = StorageManager::new(
        SudoHost,
        config::DEV_DIR,
        config::MOUNT_POINT,
        config::STORAGE_POLL,
    );
    let mut machine = Machine::new(
        StillCamera::new(),
        indicator.clone(),
        storage,
        FfmpegRender { fps: config::FPS },
        rx,
        Paths::from_config(),
        &config::SPEED_PRESETS,
        config::FPS,
        config::RENDER_WAIT,
    );

    let result = machine.run();
    if let Err(e) = &result {
        error!("Fatal error: {}", e);
    }
    // cleanup runs on every exit path; its own failures are only logged
    indicator.set(Status::Off);
    indicator.release();
    gpio::release_all();
    if result.is_err() {
        process::exit(1);
    }
}

fn init_logging() {
    flexi_logger::Logger::with_str("debug")
        .format(flexi_logger::opt_format)
        .log_to_file()
        .directory(config::LOG_DIR)
        .suppress_timestamp()
        .duplicate_to_stderr(flexi_logger::Duplicate::All)
        .start()
        .expect("logger initialization failed");
}

/// Interrupt and termination signals preempt any state: best-effort
/// indicator-off and GPIO release, then immediate exit. A render in flight
/// is abandoned rather than waited for.
fn install_signal_handler<P: LedPins + Send + Sync + 'static>(indicator: Indicator<P>) {
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Received exit signal, cleaning up...");
        indicator.set(Status::Off);
        gpio::release_all();
        process::exit(0);
    }) {
        error!("Could not install signal handler: {}", e);
    }
}
