//! Job scheduler
//!
//! Every recurring task is a [`Job`] owned by the [`Scheduler`]. Each job
//! runs in its own task: wait for the tick, run the body to completion,
//! wait again. A slow body delays its own next run and never overlaps
//! itself. [`Scheduler::shutdown`] stops every loop between runs and waits
//! for in-flight bodies to finish.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> anyhow::Result<()>;
}

/// A job from a name and an async closure.
pub struct FnJob<F> {
    name: String,
    body: F,
}

impl<F, Fut> FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> anyhow::Result<()> {
        (self.body)().await
    }
}

/// Shorthand for `Arc::new(FnJob::new(name, body))`.
pub fn job<F, Fut>(name: impl Into<String>, body: F) -> Arc<dyn Job>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnJob::new(name, body))
}

async fn run_logged(job: &dyn Job) {
    let started = Instant::now();
    match job.run().await {
        Ok(()) => debug!(
            job = job.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Job finished"
        ),
        Err(e) => error!(job = job.name(), error = %format!("{e:#}"), "Job failed"),
    }
}

pub struct Scheduler {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Run `job` every `period`, first after one full period.
    pub fn every(&mut self, period: Duration, job: Arc<dyn Job>) {
        let name = job.name().to_string();
        let mut shutdown = self.shutdown.subscribe();
        let period = period.max(Duration::from_millis(1));
        debug!(job = %name, period_ms = period.as_millis() as u64, "Scheduling job");

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = interval.tick() => run_logged(job.as_ref()).await,
                }
            }
        });
        self.tasks.push((name, handle));
    }

    /// Run `job` once after `delay`, unless shut down first.
    pub fn once(&mut self, delay: Duration, job: Arc<dyn Job>) {
        let name = job.name().to_string();
        let mut shutdown = self.shutdown.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.recv() => {}
                _ = tokio::time::sleep(delay) => run_logged(job.as_ref()).await,
            }
        });
        self.tasks.push((name, handle));
    }

    /// Spawn a long-running task that watches the shutdown signal itself.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, task: F)
    where
        F: FnOnce(broadcast::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task(self.shutdown.subscribe()));
        self.tasks.push((name.into(), handle));
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Signal every task and wait for them to stop.
    pub async fn shutdown(self) {
        info!(tasks = self.tasks.len(), "Stopping scheduler");
        let _ = self.shutdown.send(());
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                error!(task = %name, error = %e, "Task ended abnormally");
            }
        }
    }
}
