//! Job scheduler - bounded concurrency and the completion barrier

use crate::core::JobReport;
use crate::error::PipelineError;
use crate::execution::job::{Job, JobHandle};
use std::time::Duration;
use tracing::info;

/// At most this many jobs run alongside the scheduling task
pub const MAX_CONCURRENT_JOBS: usize = 2;

/// Jobs launched during a run
pub struct JobSet {
    max_active: usize,
    poll_interval: Duration,
    handles: Vec<JobHandle>,
}

impl JobSet {
    pub fn new(max_active: usize, poll_interval: Duration) -> Self {
        Self {
            max_active: max_active.max(1),
            poll_interval,
            handles: Vec::new(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Names of jobs that have not finished
    pub fn pending(&self) -> Vec<String> {
        self.handles
            .iter()
            .filter(|h| !h.is_finished())
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Start a job, waiting for a free slot if the limit is reached
    ///
    /// A channel may be handed to only one active job at a time.
    pub async fn launch(&mut self, job: Job) -> Result<(), PipelineError> {
        if let Some(channel) = job.source().shared() {
            if let Some(holder) = self
                .handles
                .iter()
                .find(|h| !h.is_finished() && h.uses_channel(channel))
            {
                return Err(PipelineError::Config(format!(
                    "job '{}' cannot share a channel with active job '{}'",
                    job.name(),
                    holder.name()
                )));
            }
        }

        while self.active_count() >= self.max_active {
            info!(
                "{} jobs active, waiting before starting {}",
                self.max_active,
                job.name()
            );
            if let Some(handle) = self.handles.iter_mut().find(|h| !h.is_finished()) {
                handle.join(self.poll_interval).await;
            }
        }

        self.handles.push(job.start());
        Ok(())
    }

    /// Block until every job is terminal, polling at the configured interval
    ///
    /// `on_wait` is called with the unfinished job names after every poll
    /// that did not see all of them finish.
    pub async fn join_all<F>(&mut self, mut on_wait: F) -> Vec<JobReport>
    where
        F: FnMut(&[String]),
    {
        for index in 0..self.handles.len() {
            while self.handles[index].join(self.poll_interval).await.is_none() {
                let pending = self.pending();
                info!("Waiting for jobs: {}", pending.join(", "));
                on_wait(&pending);
            }
        }

        self.handles.iter().map(JobHandle::report).collect()
    }

    /// Report for a job by name
    pub fn report(&self, name: &str) -> Option<JobReport> {
        self.handles
            .iter()
            .find(|h| h.name() == name)
            .map(JobHandle::report)
    }
}
