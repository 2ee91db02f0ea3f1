//! Named background task registry.
//!
//! Tasks are registered under a name and an optional tag and can be
//! cancelled by either. Periodic tasks are unique per name. Runs that share a
//! name are serialized, so a second run waits for the first to finish.
//! Cancelling a task drops its running future at the next await point.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::{
    sync::Mutex,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A unit of background work.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> Result<()>;
}

/// What to do when a periodic task with the same name already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingPolicy {
    Keep,
    Replace,
}

struct TaskEntry {
    name: String,
    tag: Option<String>,
    periodic: bool,
    cancel_token: CancellationToken,
}

#[derive(Clone, Default)]
pub struct TaskScheduler {
    tasks: Arc<DashMap<String, TaskEntry>>,
    run_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `job` every `interval`, first run after `initial_delay`.
    ///
    /// Returns false when an existing task was kept.
    pub fn enqueue_unique_periodic(
        &self,
        name: &str,
        tag: Option<&str>,
        interval: Duration,
        initial_delay: Duration,
        policy: ExistingPolicy,
        job: Arc<dyn Job>,
    ) -> bool {
        let existing = self.ids_where(|entry| entry.periodic && entry.name == name);
        if !existing.is_empty() {
            match policy {
                ExistingPolicy::Keep => {
                    log_debug!("keeping existing periodic task {}", name);
                    return false;
                }
                ExistingPolicy::Replace => {
                    self.cancel_ids(existing);
                }
            }
        }

        let (id, token) = self.register(name, tag, true);
        let tasks = Arc::clone(&self.tasks);
        let lock = self.run_lock(name);
        let name = name.to_string();
        let interval = interval.max(MIN_INTERVAL);

        tokio::spawn(async move {
            run_periodic(&name, job, lock, interval, initial_delay, token).await;
            tasks.remove(&id);
        });
        true
    }

    /// Runs `job` once as soon as no other run of `name` is in flight.
    pub fn enqueue_one_shot(&self, name: &str, tag: Option<&str>, job: Arc<dyn Job>) -> String {
        let (id, token) = self.register(name, tag, false);
        let tasks = Arc::clone(&self.tasks);
        let lock = self.run_lock(name);
        let task_name = name.to_string();
        let task_id = id.clone();

        tokio::spawn(async move {
            run_guarded(&task_name, job.as_ref(), &lock, &token).await;
            tasks.remove(&task_id);
        });
        id
    }

    pub fn cancel_by_name(&self, name: &str) -> usize {
        let ids = self.ids_where(|entry| entry.name == name);
        self.cancel_ids(ids)
    }

    pub fn cancel_by_tag(&self, tag: &str) -> usize {
        let ids = self.ids_where(|entry| entry.tag.as_deref() == Some(tag));
        self.cancel_ids(ids)
    }

    pub fn cancel_all(&self) -> usize {
        let ids = self.ids_where(|_| true);
        self.cancel_ids(ids)
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        self.tasks.iter().any(|entry| entry.name == name)
    }

    pub fn scheduled_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.iter().map(|entry| entry.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    fn register(&self, name: &str, tag: Option<&str>, periodic: bool) -> (String, CancellationToken) {
        let id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        self.tasks.insert(
            id.clone(),
            TaskEntry {
                name: name.to_string(),
                tag: tag.map(str::to_string),
                periodic,
                cancel_token: token.clone(),
            },
        );
        (id, token)
    }

    fn run_lock(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.run_locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    fn ids_where<F>(&self, predicate: F) -> Vec<String>
    where
        F: Fn(&TaskEntry) -> bool,
    {
        self.tasks
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }

    fn cancel_ids(&self, ids: Vec<String>) -> usize {
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, entry)) = self.tasks.remove(&id) {
                entry.cancel_token.cancel();
                log_info!("cancelled task {}", entry.name);
                cancelled += 1;
            }
        }
        cancelled
    }
}

async fn run_periodic(
    name: &str,
    job: Arc<dyn Job>,
    lock: Arc<Mutex<()>>,
    interval: Duration,
    initial_delay: Duration,
    cancel_token: CancellationToken,
) {
    if !initial_delay.is_zero() {
        tokio::select! {
            _ = time::sleep(initial_delay) => {}
            _ = cancel_token.cancelled() => return,
        }
    }

    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !run_guarded(name, job.as_ref(), &lock, &cancel_token).await {
                    break;
                }
            }
            _ = cancel_token.cancelled() => break,
        }
    }
    log_debug!("periodic task {} stopped", name);
}

/// Returns false when the run was cancelled.
async fn run_guarded(
    name: &str,
    job: &dyn Job,
    lock: &Mutex<()>,
    cancel_token: &CancellationToken,
) -> bool {
    let run_id = Uuid::new_v4();

    tokio::select! {
        result = async {
            let _guard = lock.lock().await;
            job.run().await
        } => {
            match result {
                Ok(()) => log_debug!("task {} run {} succeeded", name, run_id),
                Err(err) => log_warn!("task {} run {} failed: {err:#}", name, run_id),
            }
            true
        }
        _ = cancel_token.cancelled() => {
            log_info!("task {} run {} cancelled", name, run_id);
            false
        }
    }
}
