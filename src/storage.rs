//! Removable USB storage: discovery, mount, unmount, and the privileged
//! host commands (mount/umount/poweroff run through sudo).

use crate::error::{Error, Result};
use crate::shell::run_and_log;
use log::{debug, error, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

/// The privileged operations this program needs from the host.
pub trait HostOps {
    fn mount(&self, device: &Path, mount_point: &Path) -> Result<()>;
    fn unmount(&self, mount_point: &Path) -> Result<()>;
    fn poweroff(&self) -> Result<()>;
}

pub struct SudoHost;

impl HostOps for SudoHost {
    fn mount(&self, device: &Path, mount_point: &Path) -> Result<()> {
        let mut cmd = Command::new("sudo");
        cmd.arg("mount")
            .arg("-o")
            .arg("uid=pi,gid=pi")
            .arg(device)
            .arg(mount_point);
        let status = run_and_log(cmd)?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Mount {
                device: device.to_path_buf(),
                status,
            })
        }
    }

    fn unmount(&self, mount_point: &Path) -> Result<()> {
        let mut cmd = Command::new("sudo");
        cmd.arg("umount").arg(mount_point);
        let status = run_and_log(cmd)?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Unmount {
                mount_point: mount_point.to_path_buf(),
                status,
            })
        }
    }

    fn poweroff(&self) -> Result<()> {
        let mut cmd = Command::new("sudo");
        cmd.arg("poweroff");
        run_and_log(cmd)?;
        Ok(())
    }
}

/// Exists only while the storage is mounted.
#[derive(Debug)]
pub struct StorageMount {
    pub device: PathBuf,
    pub mount_point: PathBuf,
}

pub struct StorageManager<H: HostOps> {
    host: H,
    dev_dir: PathBuf,
    mount_point: PathBuf,
    poll_period: Duration,
}

impl<H: HostOps> StorageManager<H> {
    pub fn new(
        host: H,
        dev_dir: impl Into<PathBuf>,
        mount_point: impl Into<PathBuf>,
        poll_period: Duration,
    ) -> Self {
        StorageManager {
            host,
            dev_dir: dev_dir.into(),
            mount_point: mount_point.into(),
            poll_period,
        }
    }

    /// Finds a candidate USB block device, preferring partitions over whole
    /// disks. With several candidates present the lexicographically first
    /// one wins and the ambiguity is logged.
    pub fn discover(&self) -> Option<PathBuf> {
        let names: Vec<String> = match fs::read_dir(&self.dev_dir) {
            Ok(entries) => entries
                .flatten()
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect(),
            Err(_) => return None,
        };
        let mut candidates: Vec<&String> =
            names.iter().filter(|n| is_partition(n.as_str())).collect();
        if candidates.is_empty() {
            candidates = names.iter().filter(|n| is_whole_disk(n.as_str())).collect();
        }
        candidates.sort();
        match candidates.len() {
            0 => None,
            1 => {
                debug!("Found one USB device: {}", candidates[0]);
                Some(self.dev_dir.join(candidates[0]))
            }
            _ => {
                debug!(
                    "Multiple USB devices found: {:?}, using the first one.",
                    candidates
                );
                Some(self.dev_dir.join(candidates[0]))
            }
        }
    }

    /// Blocks until a device has been discovered and mounted. Mount failures
    /// are retried indefinitely; `on_retry` runs after each failure so the
    /// caller can pulse the error indicator.
    pub fn wait_until_available<F: FnMut()>(&self, mut on_retry: F) -> StorageMount {
        info!("Waiting for USB drive...");
        loop {
            if let Some(device) = self.discover() {
                info!("USB device detected!");
                match self.mount(&device) {
                    Ok(()) => {
                        info!(
                            "Mounted USB {} at {}",
                            device.display(),
                            self.mount_point.display()
                        );
                        return StorageMount {
                            device,
                            mount_point: self.mount_point.clone(),
                        };
                    }
                    Err(e) => {
                        error!("Failed to mount USB: {}. Retrying...", e);
                        on_retry();
                    }
                }
            }
            thread::sleep(self.poll_period);
        }
    }

    /// Idempotent with respect to the mount point: creates it if absent.
    pub fn mount(&self, device: &Path) -> Result<()> {
        if !self.mount_point.exists() {
            fs::create_dir_all(&self.mount_point)?;
        }
        self.host.mount(device, &self.mount_point)
    }

    /// Best-effort, invoked once during shutdown after all writes complete.
    pub fn unmount(&self) {
        if let Err(e) = self.host.unmount(&self.mount_point) {
            error!("umount failed: {}", e);
        }
    }

    pub fn poweroff(&self) {
        info!("Powering down...");
        if let Err(e) = self.host.poweroff() {
            error!("poweroff failed: {}", e);
        }
    }
}

// sd<letter><digits>, e.g. sda1
fn is_partition(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 4
        && &bytes[..2] == b"sd"
        && bytes[2].is_ascii_lowercase()
        && bytes[3..].iter().all(|b| b.is_ascii_digit())
}

// sd<letter>, e.g. sda
fn is_whole_disk(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 3 && &bytes[..2] == b"sd" && bytes[2].is_ascii_lowercase()
}
