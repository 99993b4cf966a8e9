use crate::error::{Error, Result};
use log::{error, info};
use std::io::{BufRead, BufReader};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

/// Runs a command to completion, streaming its stdout and stderr line by
/// line into the log. Returns the exit status; a non-zero status is logged
/// here but left for the caller to act on.
pub fn run_and_log(mut cmd: Command) -> Result<ExitStatus> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    info!("> Running: {:?}", cmd);
    let mut child = cmd
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| Error::CommandSpawn { program, source })?;

    // stderr is drained on its own thread so a chatty child (ffmpeg) cannot
    // fill one pipe while we block on the other.
    let stderr_drain = child.stderr.take().map(|err| {
        thread::spawn(move || {
            for line in BufReader::new(err).lines().flatten() {
                info!("{}", line);
            }
        })
    });
    if let Some(out) = child.stdout.take() {
        for line in BufReader::new(out).lines().flatten() {
            info!("{}", line);
        }
    }
    let status = child.wait()?;
    if let Some(drain) = stderr_drain {
        let _ = drain.join();
    }
    if !status.success() {
        error!("!! Command failed with {}", status);
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_exit_status() {
        assert!(run_and_log(Command::new("true")).unwrap().success());
        assert!(!run_and_log(Command::new("false")).unwrap().success());
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = run_and_log(Command::new("definitely-not-a-real-binary")).unwrap_err();
        match err {
            Error::CommandSpawn { program, .. } => {
                assert_eq!(program, "definitely-not-a-real-binary")
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
