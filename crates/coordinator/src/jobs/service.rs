//! Coordinator lifecycle: starts and stops the election, scheduler and worker loops.

use chrono_tz::Tz;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use domain::models::EnqueueRequest;
use domain::services::JobRegistry;
use persistence::repositories::JobQueueRepository;

use super::cron::CronScheduler;
use super::election::LeaderElector;
use super::worker::Worker;
use crate::error::CoordinatorError;

/// Runtime settings shared by the three loops.
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Identity written into the lease row.
    pub instance_id: String,
    pub renewal_interval: Duration,
    /// Must exceed twice `renewal_interval`.
    pub lease_duration: Duration,
    pub schedule_interval: Duration,
    /// Zone in which cron expressions are evaluated.
    pub time_zone: Tz,
    /// Queue entries firing sooner than this are never rewritten.
    pub safety_margin: Duration,
    pub idle_interval: Duration,
    pub lock_timeout: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            instance_id: format!("instance-{}", Uuid::new_v4().simple()),
            renewal_interval: Duration::from_secs(10),
            lease_duration: Duration::from_secs(30),
            schedule_interval: Duration::from_secs(30),
            time_zone: chrono_tz::UTC,
            safety_margin: Duration::from_secs(300),
            idle_interval: Duration::from_secs(1),
            lock_timeout: Duration::from_secs(5),
        }
    }
}

impl CoordinatorSettings {
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.instance_id.is_empty() {
            return Err(CoordinatorError::Config(
                "instance_id cannot be empty".to_string(),
            ));
        }
        if self.renewal_interval.is_zero()
            || self.schedule_interval.is_zero()
            || self.idle_interval.is_zero()
        {
            return Err(CoordinatorError::Config(
                "loop intervals must be non-zero".to_string(),
            ));
        }
        if self.lease_duration <= self.renewal_interval * 2 {
            return Err(CoordinatorError::Config(format!(
                "lease_duration ({:?}) must exceed twice renewal_interval ({:?})",
                self.lease_duration, self.renewal_interval
            )));
        }
        Ok(())
    }
}

/// Owns the background loops of one instance.
pub struct JobCoordinator {
    settings: CoordinatorSettings,
    registry: JobRegistry,
    queue: JobQueueRepository,
    elector: Arc<LeaderElector>,
    scheduler: Arc<CronScheduler>,
    worker: Arc<Worker>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobCoordinator {
    /// Create a coordinator. Nothing runs until [`start`](Self::start).
    pub fn new(
        pool: PgPool,
        registry: JobRegistry,
        settings: CoordinatorSettings,
    ) -> Result<Self, CoordinatorError> {
        settings.validate()?;

        let elector = Arc::new(LeaderElector::new(
            pool.clone(),
            settings.instance_id.clone(),
            settings.lease_duration,
            settings.lock_timeout,
        ));
        let scheduler = Arc::new(CronScheduler::new(
            pool.clone(),
            registry.clone(),
            Arc::clone(&elector),
            settings.time_zone,
            settings.safety_margin,
            settings.lock_timeout,
        ));
        let worker = Arc::new(Worker::new(
            pool.clone(),
            registry.clone(),
            settings.lock_timeout,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            settings,
            registry,
            queue: JobQueueRepository::new(pool),
            elector,
            scheduler,
            worker,
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        })
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn elector(&self) -> &Arc<LeaderElector> {
        &self.elector
    }

    pub fn scheduler(&self) -> &Arc<CronScheduler> {
        &self.scheduler
    }

    pub fn worker(&self) -> &Arc<Worker> {
        &self.worker
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    /// Spawn the election, scheduler and worker loops.
    pub fn start(&mut self) {
        if self.is_running() {
            warn!("Job coordinator already started");
            return;
        }

        info!(
            instance = %self.settings.instance_id,
            jobs = self.registry.len(),
            "Starting job coordinator"
        );

        let elector = Arc::clone(&self.elector);
        let renewal_interval = self.settings.renewal_interval;
        let shutdown_rx = self.shutdown_rx.clone();
        self.handles.push(tokio::spawn(async move {
            elector.run(renewal_interval, shutdown_rx).await;
        }));

        let scheduler = Arc::clone(&self.scheduler);
        let schedule_interval = self.settings.schedule_interval;
        let shutdown_rx = self.shutdown_rx.clone();
        self.handles.push(tokio::spawn(async move {
            scheduler.run(schedule_interval, shutdown_rx).await;
        }));

        let worker = Arc::clone(&self.worker);
        let idle_interval = self.settings.idle_interval;
        let shutdown_rx = self.shutdown_rx.clone();
        self.handles.push(tokio::spawn(async move {
            worker.run(idle_interval, shutdown_rx).await;
        }));
    }

    /// Enqueue an ad-hoc occurrence. Any instance may call this.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<Uuid, CoordinatorError> {
        request.validate()?;
        if self.registry.get(&request.job_name).is_none() {
            warn!(job = %request.job_name, "Enqueuing job that is not registered here");
        }

        let entry = self.queue.enqueue(&request).await?;
        info!(job = %entry.job_name, id = %entry.id, "Job enqueued");
        Ok(entry.id)
    }

    /// Initiate graceful shutdown of all loops.
    /// Returns immediately after signaling shutdown.
    pub fn shutdown(&self) {
        info!("Initiating job coordinator shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all loops to exit with timeout.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        info!("Waiting for loops to exit (timeout: {:?})", timeout);

        let abort_handles: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();
        let shutdown_future = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        warn!("Coordinator loop panicked: {}", e);
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(()) => info!("All loops exited gracefully"),
            Err(_) => {
                warn!(
                    "Coordinator shutdown timed out after {:?}, aborting remaining loops",
                    timeout
                );
                for handle in abort_handles {
                    handle.abort();
                }
            }
        }
    }

    /// Signal shutdown and wait for the loops to exit.
    pub async fn stop(self, timeout: Duration) {
        self.shutdown();
        self.wait_for_shutdown(timeout).await;
    }
}
