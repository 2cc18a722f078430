//! Cron trigger scheduler.
//!
//! Jobs live only in memory (they do not survive a restart — deliberate, see
//! DESIGN.md) and fire on a single timing loop: sleep until the nearest
//! `next_fire`, wake early when the table changes, post the trigger to the
//! agent, recompute. Firings for one job never overlap; different jobs
//! interleave freely because each fire is spawned.

pub mod server;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};

/// Fire HTTP timeout; a missed fire is logged and lost, never retried.
const FIRE_TIMEOUT: Duration = Duration::from_secs(10);
/// Upper bound on one sleep so a wall-clock jump cannot stall the loop.
const MAX_SLEEP: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("bad cron expression: {0}")]
    BadCron(String),
}

struct CronJob {
    user_id: String,
    expression: String,
    text: String,
    session_id: String,
    schedule: cron::Schedule,
    next_fire: Option<DateTime<Local>>,
}

/// One row of the task listing.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub task_id: String,
    pub user_id: String,
    pub cron: String,
    pub text: String,
    pub session_id: String,
    pub next_run: Option<String>,
}

/// The in-memory job table plus the fire client.
pub struct Scheduler {
    jobs: Mutex<HashMap<String, CronJob>>,
    changed: Notify,
    client: reqwest::Client,
    trigger_url: String,
    internal_token: String,
}

/// Parses the conventional five-field `minute hour day month weekday`
/// expression. The underlying parser wants a seconds field, so one is
/// prepended; a five-field expression is required of callers.
fn parse_cron(expression: &str) -> Result<cron::Schedule, ScheduleError> {
    let fields = expression.split_whitespace().count();
    if fields != 5 {
        return Err(ScheduleError::BadCron(format!(
            "expected 5 fields (minute hour day month weekday), got {fields}"
        )));
    }
    cron::Schedule::from_str(&format!("0 {expression}"))
        .map_err(|e| ScheduleError::BadCron(e.to_string()))
}

impl Scheduler {
    pub fn new(trigger_url: impl Into<String>, internal_token: impl Into<String>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            changed: Notify::new(),
            client: reqwest::Client::new(),
            trigger_url: trigger_url.into(),
            internal_token: internal_token.into(),
        }
    }

    /// Adds a job; returns `(task_id, next_run)`.
    pub async fn add(
        &self,
        user_id: &str,
        expression: &str,
        text: &str,
        session_id: &str,
    ) -> Result<(String, Option<String>), ScheduleError> {
        let schedule = parse_cron(expression)?;
        let next_fire = schedule.upcoming(Local).next();
        let next_run = next_fire.map(|t| t.to_rfc3339());
        let task_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

        self.jobs.lock().await.insert(
            task_id.clone(),
            CronJob {
                user_id: user_id.to_string(),
                expression: expression.to_string(),
                text: text.to_string(),
                session_id: session_id.to_string(),
                schedule,
                next_fire,
            },
        );
        self.changed.notify_one();
        tracing::info!(task_id, user_id, expression, "job added");
        Ok((task_id, next_run))
    }

    pub async fn list(&self) -> Vec<TaskInfo> {
        let jobs = self.jobs.lock().await;
        let mut tasks: Vec<TaskInfo> = jobs
            .iter()
            .map(|(id, job)| TaskInfo {
                task_id: id.clone(),
                user_id: job.user_id.clone(),
                cron: job.expression.clone(),
                text: job.text.clone(),
                session_id: job.session_id.clone(),
                next_run: job.next_fire.map(|t| t.to_rfc3339()),
            })
            .collect();
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        tasks
    }

    /// Removes a job; `false` when the id is unknown.
    pub async fn remove(&self, task_id: &str) -> bool {
        let removed = self.jobs.lock().await.remove(task_id).is_some();
        if removed {
            self.changed.notify_one();
            tracing::info!(task_id, "job removed");
        }
        removed
    }

    /// The single process-wide timing loop. Never returns.
    pub async fn run_loop(self: Arc<Self>) {
        loop {
            let now = Local::now();
            let due = self.collect_due(now).await;
            for (task_id, user_id, text, session_id) in due {
                let scheduler = self.clone();
                tokio::spawn(async move {
                    scheduler.fire(&task_id, &user_id, &text, &session_id).await;
                });
            }

            let sleep = self.time_until_next(now).await.unwrap_or(MAX_SLEEP).min(MAX_SLEEP);
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = self.changed.notified() => {}
            }
        }
    }

    /// Pops every job whose fire time has arrived and advances its schedule.
    async fn collect_due(&self, now: DateTime<Local>) -> Vec<(String, String, String, String)> {
        let mut due = Vec::new();
        let mut jobs = self.jobs.lock().await;
        for (task_id, job) in jobs.iter_mut() {
            if let Some(at) = job.next_fire {
                if at <= now {
                    due.push((
                        task_id.clone(),
                        job.user_id.clone(),
                        job.text.clone(),
                        job.session_id.clone(),
                    ));
                    job.next_fire = job.schedule.after(&now).next();
                }
            }
        }
        due
    }

    async fn time_until_next(&self, now: DateTime<Local>) -> Option<Duration> {
        let jobs = self.jobs.lock().await;
        jobs.values()
            .filter_map(|job| job.next_fire)
            .min()
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// POSTs the trigger to the agent. Failures are logged and dropped.
    async fn fire(&self, task_id: &str, user_id: &str, text: &str, session_id: &str) {
        tracing::info!(task_id, user_id, session_id, "firing job");
        let result = self
            .client
            .post(&self.trigger_url)
            .header("X-Internal-Token", &self.internal_token)
            .json(&serde_json::json!({
                "user_id": user_id,
                "text": text,
                "session_id": session_id,
            }))
            .timeout(FIRE_TIMEOUT)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                tracing::warn!(task_id, status = %resp.status(), "agent rejected the trigger")
            }
            Err(e) => tracing::warn!(task_id, "trigger fire failed: {e}"),
        }
    }
}
