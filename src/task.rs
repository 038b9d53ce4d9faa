use std::{net::IpAddr, sync::Arc};

use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::config::ProbeConfig;
use crate::echo::{EchoPinger, EchoRequest};
use crate::error::{Error, Result};
use crate::registry::{Registration, TaskRegistry};
use crate::report::{self, ProbeLine};
use crate::resolve::{self, Resolved};
use crate::results::{ResultTable, TaskId};
use crate::sink::LogSink;

/// Lifecycle of a [`ProbeTask`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TaskState {
    Created,
    Resolving,
    ResolutionFailed,
    Ready,
    Sending,
    Delaying,
    Finalizing,
    Done,
}

/// What every probe task shares with the controller.
#[derive(Debug)]
pub struct TaskContext<P> {
    pub config: Arc<ProbeConfig>,
    pub pinger: Arc<P>,
    pub results: Arc<ResultTable>,
    pub registry: Arc<TaskRegistry>,
    pub stop: CancellationToken,
}

impl<P> Clone for TaskContext<P> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            pinger: Arc::clone(&self.pinger),
            results: Arc::clone(&self.results),
            registry: Arc::clone(&self.registry),
            stop: self.stop.clone(),
        }
    }
}

/// Probes a single destination until its request budget is spent or a stop is requested.
#[derive(Debug)]
pub struct ProbeTask<P> {
    id: TaskId,
    destination: String,
    context: TaskContext<P>,
    state: TaskState,
    resolved: Option<Resolved>,
    address_width: usize,
}

impl<P: EchoPinger> ProbeTask<P> {
    pub fn new(id: TaskId, destination: impl Into<String>, context: TaskContext<P>) -> Self {
        Self {
            id,
            destination: destination.into(),
            context,
            state: TaskState::Created,
            resolved: None,
            address_width: 0,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn resolved(&self) -> Option<&Resolved> {
        self.resolved.as_ref()
    }

    /// Pads the address on console lines to `width` so concurrent destinations line up.
    pub fn set_address_width(&mut self, width: usize) {
        self.address_width = width;
    }

    fn transition(&mut self, state: TaskState) {
        log::debug!(
            "task {} ({}): {:?} -> {:?}",
            self.id,
            self.destination,
            self.state,
            state
        );
        self.state = state;
    }

    /// Binds the destination to an address and announces it.
    ///
    /// A failure is final for this task: the failure line is printed and the task ends
    /// up [`TaskState::Done`] without ever touching the result table.
    pub async fn resolve(&mut self) -> Result<()> {
        self.transition(TaskState::Resolving);
        match resolve::resolve(&self.destination, self.context.config.protocol).await {
            Ok(resolved) => {
                report::print_line(&format!(
                    "Pinging {} with {} bytes of data:",
                    resolved.label(),
                    self.context.config.payload_size
                ));
                self.resolved = Some(resolved);
                self.transition(TaskState::Ready);
                Ok(())
            }
            Err(err) => {
                report::print_line(&format!(
                    "Pinging {} failed: {}",
                    self.destination,
                    report::cause_chain(&err)
                ));
                self.transition(TaskState::ResolutionFailed);
                self.transition(TaskState::Done);
                Err(err)
            }
        }
    }

    /// Publishes the zeroed result entry and registers the task as live.
    ///
    /// # Errors
    /// [`Error::UnknownTask`] when called before a successful [`ProbeTask::resolve`],
    /// [`Error::DuplicateTask`] when the id is already taken.
    pub async fn admit(&mut self) -> Result<Registration> {
        let address = self.address()?;
        self.context.results.insert(self.id, address).await?;
        self.context
            .registry
            .register(self.id)
            .ok_or(Error::DuplicateTask(self.id))
    }

    fn address(&self) -> Result<IpAddr> {
        match (&self.resolved, self.state) {
            (Some(resolved), TaskState::Ready) => Ok(resolved.address),
            _ => Err(Error::UnknownTask(self.id)),
        }
    }

    /// Runs the send loop. Dropping `registration` at the end is what tells the
    /// controller this destination is finished.
    pub async fn run(mut self, registration: Registration) {
        let address = match self.address() {
            Ok(address) => address,
            Err(err) => {
                log::error!("task {} started before admission: {}", self.id, err);
                return;
            }
        };
        let mut sink = self.open_sink(address).await;
        let config = Arc::clone(&self.context.config);
        let identifier = (std::process::id() as u16).wrapping_add(self.id.value() as u16);
        let mut sequence: u16 = 0;
        let mut sent: u64 = 0;

        while config.wants_more(sent) && !self.context.stop.is_cancelled() {
            self.transition(TaskState::Sending);
            let request = EchoRequest {
                address,
                identifier,
                sequence,
                payload_size: config.payload_size,
                ttl: config.ttl,
                dont_fragment: config.dont_fragment,
                timeout: config.response_timeout,
            };
            if let Err(err) = self.probe_once(request, sink.as_mut()).await {
                log::error!("task {} ({}) stopped: {}", self.id, self.destination, err);
                break;
            }
            sent += 1;
            sequence = sequence.wrapping_add(1);

            if !config.wants_more(sent) {
                break;
            }
            self.transition(TaskState::Delaying);
            tokio::select! {
                _ = tokio::time::sleep(config.interval) => {}
                _ = self.context.stop.cancelled() => break,
            }
        }

        self.transition(TaskState::Finalizing);
        if let Some(sink) = sink {
            match self.context.results.get(self.id).await {
                Ok(result) => {
                    if let Err(err) = sink.finish(&result).await {
                        log::warn!("task {}: {}", self.id, err);
                    }
                }
                Err(err) => log::warn!("task {}: no trailer written: {}", self.id, err),
            }
        }
        self.transition(TaskState::Done);
        drop(registration);
    }

    async fn open_sink(&self, address: IpAddr) -> Option<LogSink> {
        let dir = self.context.config.log_dir.as_ref()?;
        let label = address.to_string();
        match LogSink::open(
            dir,
            &self.destination,
            &label,
            self.context.config.payload_size,
            &Local::now(),
        )
        .await
        {
            Ok(sink) => {
                log::debug!("task {} logging to {}", self.id, sink.path().display());
                Some(sink)
            }
            Err(err) => {
                log::warn!(
                    "logging disabled for {}: {}",
                    self.destination,
                    report::cause_chain(&err)
                );
                None
            }
        }
    }

    /// Sends one echo request and records its outcome with a single counter update.
    ///
    /// Only a failed counter update is returned; console and log output is best effort.
    async fn probe_once(&self, request: EchoRequest, sink: Option<&mut LogSink>) -> Result<()> {
        let now = Local::now();
        let outcome = self.context.pinger.echo(request).await;
        match &outcome {
            Ok(reply) if reply.is_success() => {
                self.context
                    .results
                    .record_success(self.id, reply.rtt_millis())
                    .await?
            }
            _ => self.context.results.record_loss(self.id).await?,
        }

        let line = ProbeLine::new(
            &now,
            request.address,
            &outcome,
            self.context.config.response_timeout,
            self.address_width,
        );
        if !self.context.config.quiet {
            report::print_line(&line.console);
        }
        if let Some(sink) = sink {
            if let Err(err) = sink.append(&line.log).await {
                log::warn!("task {}: {}", self.id, report::cause_chain(&err));
            }
        }
        Ok(())
    }
}
