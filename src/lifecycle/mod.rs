//! The lifecycle state machine. Owns the current phase, the speed preset
//! index and the recording session; every phase change goes through
//! [`Machine::transition`]. Hardware events arrive as debounced messages on
//! a bounded channel and are applied sequentially on the main thread.

mod scheduler;
mod stats;

pub use scheduler::SchedulerHandle;
pub use stats::RecordingStats;

use crate::camera::FrameSink;
use crate::config::{self, SpeedPreset};
use crate::encoder::{output_filename, Render};
use crate::error::Result;
use crate::event::Event;
use crate::indicator::{Indicator, LedPins, Status};
use crate::storage::{HostOps, StorageManager, StorageMount};
use chrono::Local;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitingForStorage,
    ArmedIdle,
    Recording,
    StopDecision,
    RenderDecisionWindow,
    Rendering,
    RenderOnlyMode,
    ShuttingDown,
    Error,
}

#[derive(Debug, Clone)]
pub struct Paths {
    pub mount_point: PathBuf,
    pub img_folder: PathBuf,
    pub render_folder: PathBuf,
    pub local_log: PathBuf,
}

impl Paths {
    pub fn from_config() -> Self {
        Paths {
            mount_point: PathBuf::from(config::MOUNT_POINT),
            img_folder: PathBuf::from(config::IMG_FOLDER),
            render_folder: PathBuf::from(config::RENDER_FOLDER),
            local_log: PathBuf::from(config::LOCAL_LOG_PATH),
        }
    }
}

struct Session {
    started: Instant,
    handle: SchedulerHandle,
}

pub struct Machine<S, P, H, R>
where
    S: FrameSink + Send + 'static,
    P: LedPins + Send + Sync + 'static,
    H: HostOps,
    R: Render,
{
    phase: Phase,
    speed_index: usize,
    presets: &'static [SpeedPreset],
    camera: Option<S>,
    indicator: Indicator<P>,
    storage: StorageManager<H>,
    encoder: R,
    events: Receiver<Event>,
    paths: Paths,
    session: Option<Session>,
    done: bool,
    fps: u32,
    render_wait: Duration,
}

impl<S, P, H, R> Machine<S, P, H, R>
where
    S: FrameSink + Send + 'static,
    P: LedPins + Send + Sync + 'static,
    H: HostOps,
    R: Render,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera: S,
        indicator: Indicator<P>,
        storage: StorageManager<H>,
        encoder: R,
        events: Receiver<Event>,
        paths: Paths,
        presets: &'static [SpeedPreset],
        fps: u32,
        render_wait: Duration,
    ) -> Self {
        Machine {
            phase: Phase::WaitingForStorage,
            speed_index: 0,
            presets,
            camera: Some(camera),
            indicator,
            storage,
            encoder,
            events,
            paths,
            session: None,
            done: false,
            fps,
            render_wait,
        }
    }

    /// Runs the machine to completion. On a fatal error the error blink
    /// pattern is shown before the error is handed back to the caller.
    pub fn run(&mut self) -> Result<()> {
        match self.drive() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.transition(Phase::Error);
                self.indicator
                    .blink(Status::Error, 10, Duration::from_millis(200));
                self.indicator.set(Status::Error);
                self.transition(Phase::ShuttingDown);
                Err(e)
            }
        }
    }

    fn drive(&mut self) -> Result<()> {
        self.indicator.self_test();
        self.indicator.set(Status::Waiting);
        let indicator = self.indicator.clone();
        let mount = self.storage.wait_until_available(|| {
            indicator.blink(Status::Error, 3, Duration::from_millis(200));
            indicator.set(Status::Waiting);
        });
        self.after_mount(mount)
    }

    fn after_mount(&mut self, mount: StorageMount) -> Result<()> {
        if self.paths.render_folder.is_dir() {
            self.transition(Phase::RenderOnlyMode);
            self.render_deferred();
            return self.shutdown(&mount);
        }

        self.indicator.set(Status::Ready);
        self.prepare_img_folder()?;
        self.transition(Phase::ArmedIdle);
        self.announce_preset();
        info!("Press the speed button to set speed, the start/stop button to record, Ctrl+C to exit.");

        loop {
            let event = match self.events.recv() {
                Ok(event) => event,
                // all button sources are gone; nothing further can happen
                Err(_) => return Ok(()),
            };
            match (self.phase, event) {
                (Phase::ArmedIdle, Event::SpeedPressed) => self.cycle_speed(),
                (Phase::ArmedIdle, Event::StartStopPressed) => self.start_recording(),
                (Phase::Recording, Event::SpeedPressed) => {
                    debug!("speed changes are disabled while recording")
                }
                (Phase::Recording, Event::StartStopPressed) => {
                    return self.stop_recording(&mount)
                }
                _ => {}
            }
        }
    }

    fn transition(&mut self, to: Phase) {
        debug!("phase {:?} -> {:?}", self.phase, to);
        self.phase = to;
    }

    fn cycle_speed(&mut self) {
        self.indicator.set(Status::Off);
        self.speed_index = (self.speed_index + 1) % self.presets.len();
        let preset = &self.presets[self.speed_index];
        info!("Speed set to {}", preset.name);
        self.indicator.blink(
            Status::Speed,
            self.speed_index + 1,
            Duration::from_millis(300),
        );
        self.indicator.set(Status::Ready);
    }

    fn announce_preset(&self) {
        let preset = &self.presets[self.speed_index];
        info!("Speed set to {}", preset.name);
        self.indicator.blink(
            Status::Speed,
            self.speed_index + 1,
            Duration::from_millis(300),
        );
        self.indicator.set(Status::Ready);
    }

    fn start_recording(&mut self) {
        let camera = match self.camera.take() {
            Some(camera) => camera,
            None => {
                error!("no camera available to start a recording");
                return;
            }
        };
        let preset = &self.presets[self.speed_index];
        self.indicator.set(Status::Recording);
        info!(
            "Starting recording at {} ({:.3}s interval)",
            preset.name, preset.interval_secs
        );
        let handle = scheduler::start(
            Duration::from_secs_f32(preset.interval_secs),
            camera,
            self.paths.img_folder.clone(),
            self.indicator.clone(),
        );
        self.session = Some(Session {
            started: Instant::now(),
            handle,
        });
        self.transition(Phase::Recording);
    }

    fn stop_recording(&mut self, mount: &StorageMount) -> Result<()> {
        self.indicator.set(Status::Video);
        info!("Stopping recording");
        self.transition(Phase::StopDecision);
        self.done = true;
        if let Some(session) = self.session.take() {
            // join before anything else: statistics are never computed
            // against a still-running capture thread
            let frames = session.handle.stop();
            debug!("capture thread finished after {} frames", frames);
            thread::sleep(Duration::from_secs(1));
            let stats = RecordingStats::compute(
                session.started.elapsed(),
                count_images(&self.paths.img_folder),
                self.fps,
            );
            stats.log(self.fps);
        }

        self.transition(Phase::RenderDecisionWindow);
        if self.wait_before_render() {
            info!("Skipping render");
            self.defer_frames()?;
        } else {
            self.transition(Phase::Rendering);
            self.render_now();
        }
        self.shutdown(mount)
    }

    /// The render decision window: a fixed wait, ended early by a press on
    /// the speed button repurposed as "skip". Returns true when skipped.
    fn wait_before_render(&mut self) -> bool {
        self.indicator.set(Status::Waiting);
        info!(
            "Waiting {}s before rendering. Press the speed button to skip and keep the images for a later render.",
            self.render_wait.as_secs()
        );
        let deadline = Instant::now() + self.render_wait;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.events.recv_timeout(deadline - now) {
                Ok(Event::SpeedPressed) => return true,
                Ok(Event::StartStopPressed) => {
                    info!("Recording already done, please wait for the USB drive to be unmounted.")
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return false
                }
            }
        }
    }

    /// Preserve the captured frames verbatim for a later explicit render.
    fn defer_frames(&self) -> Result<()> {
        if self.paths.render_folder.is_dir() {
            fs::remove_dir_all(&self.paths.render_folder)?;
        }
        copy_dir(&self.paths.img_folder, &self.paths.render_folder)?;
        info!(
            "Copied images to {} for a later render",
            self.paths.render_folder.display()
        );
        Ok(())
    }

    fn render_now(&mut self) {
        self.indicator.set(Status::Video);
        info!("Creating video...");
        let output = self
            .paths
            .mount_point
            .join(output_filename(Local::now().naive_local()));
        match self.encoder.encode(&self.paths.img_folder, &output) {
            Ok(()) => info!("Video saved to {}", output.display()),
            Err(e) => self.report_encode_failure(e),
        }
    }

    /// Render-only mode: a deferred render folder was found at startup.
    /// Encode it, delete it on success, and never arm capture.
    fn render_deferred(&mut self) {
        self.indicator.set(Status::Video);
        let output = self
            .paths
            .mount_point
            .join(output_filename(Local::now().naive_local()));
        info!(
            "Rendering video from {} to {}...",
            self.paths.render_folder.display(),
            output.display()
        );
        match self.encoder.encode(&self.paths.render_folder, &output) {
            Ok(()) => {
                info!("Video saved to {}", output.display());
                match fs::remove_dir_all(&self.paths.render_folder) {
                    Ok(()) => info!(
                        "Deleted render folder: {}",
                        self.paths.render_folder.display()
                    ),
                    Err(e) => error!("Failed to delete render folder: {}", e),
                }
            }
            Err(e) => self.report_encode_failure(e),
        }
        info!("Render-only mode complete.");
    }

    // encode failures are reported, never retried
    fn report_encode_failure(&self, e: crate::error::Error) {
        error!("Encoding failed: {}", e);
        self.indicator
            .blink(Status::Error, 5, Duration::from_millis(200));
        self.indicator.set(Status::Error);
    }

    fn shutdown(&mut self, mount: &StorageMount) -> Result<()> {
        self.transition(Phase::ShuttingDown);
        self.indicator.set(Status::Shutdown);
        self.drain_events();
        let usb_log = mount.mount_point.join("timelapse.log");
        match fs::copy(&self.paths.local_log, &usb_log) {
            Ok(_) => info!("Copied log to {}", usb_log.display()),
            Err(e) => error!("Could not copy log to {}: {}", usb_log.display(), e),
        }
        info!("Unmounting USB and powering down in 1 second...");
        thread::sleep(Duration::from_secs(1));
        self.storage.unmount();
        self.indicator.set(Status::Off);
        self.storage.poweroff();
        Ok(())
    }

    // a press that arrives once the session is finalized is a no-op
    fn drain_events(&self) {
        while let Ok(event) = self.events.try_recv() {
            if event == Event::StartStopPressed && self.done {
                info!("Recording already done, please wait for the USB drive to be unmounted.");
            }
        }
    }

    fn prepare_img_folder(&self) -> Result<()> {
        if self.paths.img_folder.is_dir() {
            info!("Deleting old recording images");
            let mut removed = 0;
            for entry in fs::read_dir(&self.paths.img_folder)? {
                let path = entry?.path();
                if path.extension().map_or(false, |ext| ext == "jpg") {
                    fs::remove_file(&path)?;
                    removed += 1;
                }
            }
            info!("Deleted {} old images", removed);
        } else {
            info!("Creating image folder");
            fs::create_dir_all(&self.paths.img_folder)?;
        }
        Ok(())
    }

    #[cfg(test)]
    fn phase(&self) -> Phase {
        self.phase
    }
}

fn count_images(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .filter(|e| e.path().extension().map_or(false, |ext| ext == "jpg"))
            .count(),
        Err(_) => 0,
    }
}

fn copy_dir(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::copy(entry.path(), dst.join(entry.file_name()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::tests::RecordingPins;
    use crate::storage::tests::FakeHost;
    use crossbeam_channel::{bounded, Sender};
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    /// Writes an empty file per captured frame.
    struct FileSink;

    impl FrameSink for FileSink {
        fn configure(&mut self) -> Result<()> {
            Ok(())
        }

        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn capture_to(&mut self, path: &Path) -> Result<()> {
            fs::write(path, b"")?;
            Ok(())
        }
    }

    #[derive(Clone)]
    struct FakeRender {
        calls: Arc<Mutex<Vec<(PathBuf, PathBuf)>>>,
    }

    impl FakeRender {
        fn new() -> Self {
            FakeRender {
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl Render for FakeRender {
        fn encode(&self, frames_dir: &Path, output: &Path) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((frames_dir.to_path_buf(), output.to_path_buf()));
            Ok(())
        }
    }

    static TWO_PRESETS: [SpeedPreset; 2] = [
        SpeedPreset {
            name: "10x",
            interval_secs: 10.0 / 24.0,
        },
        SpeedPreset {
            name: "30x",
            interval_secs: 30.0 / 24.0,
        },
    ];

    struct Fixture {
        machine: Machine<FileSink, RecordingPins, FakeHost, FakeRender>,
        tx: Sender<Event>,
        render: FakeRender,
        unmounts: Arc<std::sync::atomic::AtomicUsize>,
        poweroffs: Arc<std::sync::atomic::AtomicUsize>,
        _root: tempfile::TempDir,
        paths: Paths,
    }

    fn fixture(render_wait: Duration) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let paths = Paths {
            mount_point: root.path().to_path_buf(),
            img_folder: root.path().join("timelapse_images"),
            render_folder: root.path().join("render"),
            local_log: root.path().join("timelapse.log"),
        };
        let (tx, rx) = bounded(8);
        let render = FakeRender::new();
        let host = FakeHost::new();
        let unmounts = host.unmounts.clone();
        let poweroffs = host.poweroffs.clone();
        let storage = StorageManager::new(
            host,
            root.path().join("dev"),
            root.path(),
            Duration::from_millis(1),
        );
        let machine = Machine::new(
            FileSink,
            Indicator::new(RecordingPins::new()),
            storage,
            render.clone(),
            rx,
            paths.clone(),
            &TWO_PRESETS,
            24,
            render_wait,
        );
        Fixture {
            machine,
            tx,
            render,
            unmounts,
            poweroffs,
            _root: root,
            paths,
        }
    }

    fn fake_mount(paths: &Paths) -> StorageMount {
        StorageMount {
            device: PathBuf::from("/dev/sda1"),
            mount_point: paths.mount_point.clone(),
        }
    }

    #[test]
    fn speed_presses_cycle_one_zero_one() {
        let mut fx = fixture(Duration::from_millis(50));
        let mut seen = Vec::new();
        for _ in 0..3 {
            fx.machine.cycle_speed();
            seen.push(fx.machine.speed_index);
        }
        assert_eq!(seen, vec![1, 0, 1]);
    }

    #[test]
    fn skip_press_ends_the_window_early() {
        let mut fx = fixture(Duration::from_millis(300));
        let tx = fx.tx.clone();
        let presser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            tx.send(Event::SpeedPressed).unwrap();
        });
        let started = Instant::now();
        let skipped = fx.machine.wait_before_render();
        presser.join().unwrap();
        assert!(skipped);
        assert!(started.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn window_times_out_without_skip() {
        let mut fx = fixture(Duration::from_millis(100));
        let started = Instant::now();
        assert!(!fx.machine.wait_before_render());
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn start_stop_press_during_window_is_a_notice_not_a_skip() {
        let mut fx = fixture(Duration::from_millis(150));
        fx.tx.send(Event::StartStopPressed).unwrap();
        assert!(!fx.machine.wait_before_render());
    }

    #[test]
    fn defer_copies_frames_verbatim() {
        let fx = fixture(Duration::from_millis(50));
        fs::create_dir_all(&fx.paths.img_folder).unwrap();
        fs::write(fx.paths.img_folder.join("img00000.jpg"), b"a").unwrap();
        fs::write(fx.paths.img_folder.join("img00001.jpg"), b"b").unwrap();
        // stale render folder from an earlier skip gets replaced
        fs::create_dir_all(&fx.paths.render_folder).unwrap();
        fs::write(fx.paths.render_folder.join("img09999.jpg"), b"old").unwrap();

        fx.machine.defer_frames().unwrap();

        let mut names: Vec<String> = fs::read_dir(&fx.paths.render_folder)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["img00000.jpg", "img00001.jpg"]);
        assert_eq!(
            fs::read(fx.paths.render_folder.join("img00000.jpg")).unwrap(),
            b"a"
        );
        // the originals stay in place
        assert!(fx.paths.img_folder.join("img00001.jpg").exists());
    }

    #[test]
    fn render_only_mode_encodes_deletes_and_shuts_down() {
        let mut fx = fixture(Duration::from_millis(50));
        fs::create_dir_all(&fx.paths.render_folder).unwrap();
        fs::write(fx.paths.render_folder.join("img00000.jpg"), b"x").unwrap();
        let mount = fake_mount(&fx.paths);

        fx.machine.after_mount(mount).unwrap();

        let calls = fx.render.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, fx.paths.render_folder);
        assert!(calls[0]
            .1
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("timelapse_"));
        assert!(!fx.paths.render_folder.exists());
        assert_eq!(fx.machine.phase(), Phase::ShuttingDown);
        assert_eq!(fx.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.poweroffs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn full_recording_flow_ends_in_shutdown_with_a_video() {
        let mut fx = fixture(Duration::from_millis(50));
        let mount = fake_mount(&fx.paths);
        let tx = fx.tx.clone();
        let driver = thread::spawn(move || {
            tx.send(Event::SpeedPressed).unwrap(); // 10x -> 30x
            tx.send(Event::StartStopPressed).unwrap(); // start
            thread::sleep(Duration::from_millis(300));
            tx.send(Event::StartStopPressed).unwrap(); // stop
        });

        fx.machine.after_mount(mount).unwrap();
        driver.join().unwrap();

        assert_eq!(fx.machine.phase(), Phase::ShuttingDown);
        assert_eq!(fx.machine.speed_index, 1);
        let calls = fx.render.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, fx.paths.img_folder);
        assert!(count_images(&fx.paths.img_folder) > 0);
        assert_eq!(fx.unmounts.load(Ordering::SeqCst), 1);
        assert_eq!(fx.poweroffs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn counting_images_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("img00000.jpg"), b"").unwrap();
        fs::write(dir.path().join("img00001.jpg"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        assert_eq!(count_images(dir.path()), 2);
        assert_eq!(count_images(&dir.path().join("missing")), 0);
    }
}
