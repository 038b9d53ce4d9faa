use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::controller::{ControlEvent, ControlHandle};
use crate::error::{Error, Result};

/// Background task turning process signals into [`ControlEvent`]s.
///
/// The listener never touches probe state itself; it only posts events. It is cancelled
/// when the forwarder is dropped.
#[derive(Debug)]
pub(crate) struct SignalForwarder {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SignalForwarder {
    pub(crate) fn spawn(control: ControlHandle) -> Result<Self> {
        let mut signals = OsSignals::new().map_err(|err| {
            Error::Opaque(format!("failed to install signal handlers, reason: {}", err).into())
        })?;
        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::task::spawn(async move {
            tokio::select! {
                _ = signals.forward(&control) => {},
                _ = child.cancelled() => {}
            }
        });
        Ok(Self {
            token,
            handle: Some(handle),
        })
    }
}

impl Drop for SignalForwarder {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.token.cancel();
        }
    }
}

/// SIGINT and SIGTERM stop the run, SIGQUIT (Ctrl+\) asks for a snapshot.
#[cfg(unix)]
struct OsSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl OsSignals {
    fn new() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    async fn forward(&mut self, control: &ControlHandle) {
        loop {
            let event = tokio::select! {
                Some(()) = self.interrupt.recv() => ControlEvent::Stop,
                Some(()) = self.terminate.recv() => ControlEvent::Stop,
                Some(()) = self.quit.recv() => ControlEvent::Snapshot,
                else => break,
            };
            log::debug!("signal received, posting {:?}", event);
            if !control.send(event) {
                break;
            }
        }
    }
}

/// Ctrl+C stops the run, Ctrl+Break asks for a snapshot.
#[cfg(windows)]
struct OsSignals {
    ctrl_c: tokio::signal::windows::CtrlC,
    ctrl_break: tokio::signal::windows::CtrlBreak,
}

#[cfg(windows)]
impl OsSignals {
    fn new() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
            ctrl_break: tokio::signal::windows::ctrl_break()?,
        })
    }

    async fn forward(&mut self, control: &ControlHandle) {
        loop {
            let event = tokio::select! {
                Some(()) = self.ctrl_c.recv() => ControlEvent::Stop,
                Some(()) = self.ctrl_break.recv() => ControlEvent::Snapshot,
                else => break,
            };
            log::debug!("signal received, posting {:?}", event);
            if !control.send(event) {
                break;
            }
        }
    }
}
