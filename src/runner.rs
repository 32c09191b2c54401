//! Runs one external stage and supervises it until it exits.
//!
//! stdout and stderr share one pipe, as a terminal would, so lines reach the
//! sink in the order the stage wrote them. The cancellation flag is polled
//! between lines, so a quiet stage still notices a stop request within one
//! poll interval.
//!
//! Once the stage itself has exited, output is drained for at most
//! `EXIT_DRAIN` more. Background processes the stage left holding the pipe
//! are not waited for and are not killed.
use crate::cancel::CancelToken;
use crate::outcome::StageOutcome;
use crate::plan::{StageDescriptor, StageName};
use crate::sink::{LogSink, PipelineEvent};
use std::io::{BufRead, BufReader, PipeReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const EXIT_DRAIN: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct StageRunner {
    grace: Duration,
    poll_interval: Duration,
}

impl StageRunner {
    /// `grace` bounds the wait between the termination request and the kill.
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn run(
        &self,
        stage: &StageDescriptor,
        sink: &dyn LogSink,
        cancel: &CancelToken,
    ) -> StageOutcome {
        if cancel.is_cancelled() {
            return StageOutcome::Cancelled;
        }
        let (mut child, output) = match spawn(stage) {
            Ok(spawned) => spawned,
            Err(err) => {
                return StageOutcome::LaunchFailed {
                    cause: format!("{}: {err}", stage.command.program.to_string_lossy()),
                }
            }
        };

        let (tx, rx) = mpsc::channel();
        let reader = spawn_line_reader(output, tx);
        let mut exited_at: Option<Instant> = None;
        let mut pipe_closed = false;

        loop {
            if cancel.is_cancelled() && exited_at.is_none() {
                // The reader finishes on its own once the pipe closes.
                drop(rx);
                self.terminate(&mut child, stage.name);
                return StageOutcome::Cancelled;
            }
            match rx.recv_timeout(self.poll_interval) {
                Ok(line) => sink.emit(PipelineEvent::StageOutput {
                    stage: stage.name,
                    line,
                }),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    pipe_closed = true;
                    break;
                }
            }
            match exited_at {
                None => {
                    if matches!(child.try_wait(), Ok(Some(_))) {
                        exited_at = Some(Instant::now());
                    }
                }
                Some(at) if at.elapsed() >= EXIT_DRAIN => {
                    tracing::warn!(
                        stage = %stage.name,
                        "stage exited but its output is still held open; not waiting for it"
                    );
                    break;
                }
                Some(_) => {}
            }
        }
        if pipe_closed {
            let _ = reader.join();
        }

        match child.wait() {
            Ok(status) => classify(status),
            Err(err) => StageOutcome::LaunchFailed {
                cause: format!("wait for {}: {err}", stage.name),
            },
        }
    }

    fn terminate(&self, child: &mut Child, stage: StageName) {
        request_termination(child);
        let deadline = Instant::now() + self.grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!(stage = %stage, status = %status, "stage stopped after termination request");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(self.poll_interval),
                _ => break,
            }
        }
        tracing::warn!(
            stage = %stage,
            grace_ms = self.grace.as_millis(),
            "stage ignored termination request; killing"
        );
        force_kill(child);
        let _ = child.wait();
    }
}

/// Start the stage with stdout and stderr on one pipe; returns its read end.
fn spawn(stage: &StageDescriptor) -> std::io::Result<(Child, PipeReader)> {
    let (output, stdout) = std::io::pipe()?;
    let stderr = stdout.try_clone()?;
    let mut cmd = Command::new(&stage.command.program);
    cmd.args(&stage.command.args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    if let Some(dir) = &stage.command.current_dir {
        cmd.current_dir(dir);
    }
    // Own process group so termination reaches wrappers like `go run` and
    // whatever they start.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let child = cmd.spawn()?;
    // `cmd` holds our copies of the write end; the pipe only reaches EOF once
    // they are gone.
    drop(cmd);
    Ok((child, output))
}

fn spawn_line_reader(output: PipeReader, tx: Sender<String>) -> JoinHandle<()> {
    thread::spawn(move || {
        let reader = BufReader::new(output);
        for chunk in reader.split(b'\n') {
            let Ok(mut bytes) = chunk else {
                break;
            };
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            let line = String::from_utf8_lossy(&bytes).into_owned();
            if tx.send(line).is_err() {
                break;
            }
        }
    })
}

fn classify(status: ExitStatus) -> StageOutcome {
    if status.success() {
        return StageOutcome::Success;
    }
    if let Some(code) = status.code() {
        return StageOutcome::StageFailed { code };
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return StageOutcome::StageFailed { code: 128 + signal };
        }
    }
    StageOutcome::StageFailed { code: -1 }
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: nix::sys::signal::Signal) -> nix::Result<()> {
    let pid = i32::try_from(child.id()).map_err(|_| nix::errno::Errno::ESRCH)?;
    nix::sys::signal::killpg(nix::unistd::Pid::from_raw(pid), signal)
}

#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    if let Err(err) = signal_group(child, Signal::SIGTERM) {
        tracing::debug!(error = %err, "process group SIGTERM failed; signalling the stage only");
        if let Ok(pid) = i32::try_from(child.id()) {
            let _ = kill(nix::unistd::Pid::from_raw(pid), Signal::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn force_kill(child: &mut Child) {
    let _ = signal_group(child, nix::sys::signal::Signal::SIGKILL);
    let _ = child.kill();
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(all(test, unix))]
#[path = "runner_tests.rs"]
mod tests;
