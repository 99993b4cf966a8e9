use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("could not spawn `{program}`: {source}")]
    CommandSpawn { program: String, source: io::Error },

    #[error("mount of {device} failed with {status}")]
    Mount { device: PathBuf, status: ExitStatus },

    #[error("umount of {mount_point} failed with {status}")]
    Unmount { mount_point: PathBuf, status: ExitStatus },

    #[error("encoder exited with {status}")]
    Encode { status: ExitStatus },

    #[error("still capture exited with {status}")]
    Capture { status: ExitStatus },

    #[error("gpio{pin}: {source}")]
    Gpio { pin: u32, source: io::Error },
}
