use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::ProbeConfig;
use crate::echo::EchoPinger;
use crate::error::Result;
use crate::registry::{Registration, TaskRegistry};
use crate::report;
use crate::results::{ResultTable, Snapshot, TaskIdGenerator};
use crate::signals::SignalForwarder;
use crate::task::{ProbeTask, TaskContext};

/// Requests the controller reacts to while probes are running.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ControlEvent {
    /// Let in-flight probes finish, send nothing new, then report.
    Stop,
    /// Print the statistics gathered so far and keep probing.
    Snapshot,
}

/// Cloneable sender side of the controller's event queue.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    events: mpsc::UnboundedSender<ControlEvent>,
}

impl ControlHandle {
    /// Returns `false` once the controller has finished.
    pub fn send(&self, event: ControlEvent) -> bool {
        self.events.send(event).is_ok()
    }

    pub fn request_stop(&self) -> bool {
        self.send(ControlEvent::Stop)
    }

    pub fn request_snapshot(&self) -> bool {
        self.send(ControlEvent::Snapshot)
    }
}

/// Fans destinations out to one probe task each and reports once they are all done.
///
/// # Example
/// ```no_run
/// use pinglog::{config::ProbeConfigBuilder, controller::Controller, icmp::IcmpPinger};
///
/// let config = ProbeConfigBuilder::new().with_count(2).build().unwrap();
/// tokio_test::block_on(async {
///     let controller = Controller::new(config, IcmpPinger::new());
///     let snapshot = controller.run(vec!["127.0.0.1".to_string()]).await;
///     assert_eq!(snapshot.len(), 1);
/// })
/// ```
#[derive(Debug)]
pub struct Controller<P> {
    context: TaskContext<P>,
    ids: TaskIdGenerator,
    handle: ControlHandle,
    events: mpsc::UnboundedReceiver<ControlEvent>,
    signals: Option<SignalForwarder>,
}

impl<P: EchoPinger> Controller<P> {
    pub fn new(config: ProbeConfig, pinger: P) -> Self {
        let (sender, events) = mpsc::unbounded_channel();
        Self {
            context: TaskContext {
                config: Arc::new(config),
                pinger: Arc::new(pinger),
                results: Arc::new(ResultTable::new()),
                registry: Arc::new(TaskRegistry::new()),
                stop: CancellationToken::new(),
            },
            ids: TaskIdGenerator::new(),
            handle: ControlHandle { events: sender },
            events,
            signals: None,
        }
    }

    pub fn control_handle(&self) -> ControlHandle {
        self.handle.clone()
    }

    pub fn results(&self) -> Arc<ResultTable> {
        Arc::clone(&self.context.results)
    }

    pub fn registry(&self) -> Arc<TaskRegistry> {
        Arc::clone(&self.context.registry)
    }

    /// Routes interrupt signals into the event queue for as long as the controller lives.
    ///
    /// # Errors
    /// Returns an error if a signal listener cannot be installed.
    pub fn install_signal_handlers(&mut self) -> Result<()> {
        self.signals = Some(SignalForwarder::spawn(self.control_handle())?);
        Ok(())
    }

    /// Probes every destination, waits for all of them and prints the final summary.
    ///
    /// Destinations that fail to resolve are reported on their own line and never show
    /// up in the returned snapshot. A stop requested before probing starts sends nothing.
    pub async fn run(mut self, destinations: Vec<String>) -> Snapshot {
        self.launch(destinations).await;
        self.supervise().await;

        let snapshot = self.context.results.snapshot().await;
        report::print_summary(&snapshot);
        snapshot
    }

    /// Resolves every destination, then admits and spawns the resolved ones.
    ///
    /// Control events are served while lookups are pending. Once a stop has been seen,
    /// pending lookups are abandoned and nothing is spawned.
    async fn launch(&mut self, destinations: Vec<String>) {
        let created: Vec<_> = destinations
            .into_iter()
            .map(|destination| {
                ProbeTask::new(self.ids.next_id(), destination, self.context.clone())
            })
            .collect();
        let resolutions = created.into_iter().map(|mut task| async move {
            let resolution = task.resolve().await;
            resolution.ok().map(|_| task)
        });
        let mut resolving = std::pin::pin!(futures::future::join_all(resolutions));
        let resolved = loop {
            tokio::select! {
                resolved = &mut resolving => break resolved,
                Some(event) = self.events.recv() => {
                    self.handle_event(event).await;
                    if self.context.stop.is_cancelled() {
                        break Vec::new();
                    }
                }
            }
        };

        // events posted while the last lookups completed
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event).await;
        }
        if self.context.stop.is_cancelled() {
            log::debug!("stop requested before probing started, nothing spawned");
            return;
        }

        let tasks: Vec<_> = resolved.into_iter().flatten().collect();
        let address_width = tasks
            .iter()
            .filter_map(ProbeTask::resolved)
            .map(|found| found.address.to_string().len())
            .max()
            .unwrap_or_default();
        for mut task in tasks {
            task.set_address_width(address_width);
            match task.admit().await {
                Ok(registration) => Self::spawn(task, registration),
                Err(err) => log::error!("task {} not admitted: {}", task.id(), err),
            }
        }
        log::debug!(
            "{} of {} destinations are being probed",
            self.context.registry.len(),
            self.context.results.len().await
        );
    }

    fn spawn(task: ProbeTask<P>, registration: Registration) {
        let id = task.id();
        let destination = task.destination().to_owned();
        tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(task.run(registration)).catch_unwind().await {
                log::error!(
                    "task {} ({}) aborted: {}",
                    id,
                    destination,
                    panic_message(panic.as_ref())
                );
            }
        });
    }

    async fn supervise(&mut self) {
        let registry = Arc::clone(&self.context.registry);
        loop {
            tokio::select! {
                _ = registry.wait_empty() => break,
                Some(event) = self.events.recv() => self.handle_event(event).await,
            }
        }
    }

    async fn handle_event(&self, event: ControlEvent) {
        match event {
            ControlEvent::Stop if self.context.stop.is_cancelled() => {
                log::debug!("stop already requested, still draining");
            }
            ControlEvent::Stop => {
                log::debug!(
                    "stop requested, draining tasks {:?}",
                    self.context.registry.live_ids()
                );
                self.context.stop.cancel();
            }
            // a report of a table that is draining would only precede the final one
            ControlEvent::Snapshot if self.context.stop.is_cancelled() => {}
            ControlEvent::Snapshot => {
                let snapshot = self.context.results.snapshot().await;
                report::print_summary(&snapshot);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_handle_reports_closed_controller() {
        let (sender, events) = mpsc::unbounded_channel();
        let handle = ControlHandle { events: sender };
        assert!(handle.request_snapshot());
        drop(events);
        assert!(!handle.request_stop());
    }
}
