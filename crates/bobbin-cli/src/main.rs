use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use bobbin_core::domain::{EngineError, ExecutionContext, JobId, JobInput, Outcome, Priority};
use bobbin_core::impls::InMemoryTenantDirectory;
use bobbin_core::typed::{Handler, Task};
use bobbin_core::{Engine, EngineBuilder, EngineConfig, observability};

#[derive(Debug, Serialize, Deserialize)]
struct SendEmail {
    to: String,
    subject: String,
}

impl Task for SendEmail {
    const TYPE: &'static str = "send-email";
}

/// Fails the first `remaining_failures` sends.
struct Mailer {
    remaining_failures: AtomicU32,
}

#[async_trait]
impl Handler<SendEmail> for Mailer {
    async fn handle(&self, task: SendEmail, ctx: &ExecutionContext) -> Result<Outcome, EngineError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Ok(Outcome::failure(format!("smtp timeout (left={left})")));
        }
        info!(job_id = %ctx.job_id, to = %task.to, subject = %task.subject, "email sent");
        Ok(Outcome::success_with(json!({ "sent": true })))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TenantReport {
    month: String,
}

impl Task for TenantReport {
    const TYPE: &'static str = "tenant-report";
}

struct Reporter;

#[async_trait]
impl Handler<TenantReport> for Reporter {
    async fn handle(&self, task: TenantReport, ctx: &ExecutionContext) -> Result<Outcome, EngineError> {
        let schema = ctx
            .schema_name()
            .ok_or_else(|| EngineError::handler("tenant-report needs a tenant schema"))?;
        info!(job_id = %ctx.job_id, schema, month = %task.month, "report generated");
        Ok(Outcome::success_with(json!({ "schema": schema, "month": task.month })))
    }
}

/// Config from the optional path argument, else demo-friendly short intervals.
fn load_config() -> Result<EngineConfig, EngineError> {
    match std::env::args().nth(1) {
        Some(path) => EngineConfig::from_path(path),
        None => {
            let mut config = EngineConfig {
                poll_interval_ms: 50,
                promote_interval_ms: 250,
                workers: 2,
                ..EngineConfig::default()
            };
            config.retry.initial_delay_ms = 500;
            config.apply_env(|key| std::env::var(key).ok())?;
            Ok(config)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    observability::init();

    let config = load_config()?;
    let directory = InMemoryTenantDirectory::new().with_tenant("acme", "tenant_acme");

    let engine = EngineBuilder::new()
        .with_config(config)
        .with_tenant_directory(Arc::new(directory))
        .register::<SendEmail, _>(Mailer {
            remaining_failures: AtomicU32::new(1),
        })?
        .register::<TenantReport, _>(Reporter)?
        .expect_job_types(&[SendEmail::TYPE, TenantReport::TYPE])
        .build()?;

    let email = json!({ "to": "ops@example.com", "subject": "weekly digest" });
    let report = json!({ "month": "2024-01" });
    let mut ids: Vec<JobId> = vec![
        engine
            .enqueue(
                JobInput::new(SendEmail::TYPE, email)
                    .with_priority(Priority::High)
                    .with_max_retries(1),
            )
            .await?,
        engine
            .enqueue(JobInput::new(TenantReport::TYPE, report.clone()).for_tenant("acme"))
            .await?,
        // unknown tenant: dead-lettered without running the handler
        engine
            .enqueue(JobInput::new(TenantReport::TYPE, report).for_tenant("globex"))
            .await?,
    ];
    ids.push(
        engine
            .schedule_in(
                JobInput::new(
                    SendEmail::TYPE,
                    json!({ "to": "ops@example.com", "subject": "scheduled reminder" }),
                ),
                Duration::from_secs(1),
            )
            .await?,
    );
    info!(jobs = ids.len(), "jobs enqueued");

    let pool = engine.spawn_pool();
    let promoter = engine.spawn_promoter();

    let finished = tokio::select! {
        done = wait_until_terminal(&engine, &ids) => done?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            false
        }
    };

    let report = pool.shutdown_and_join().await;
    promoter.shutdown_and_join().await;
    info!(
        finished = report.finished,
        aborted = report.aborted,
        recovered = report.recovered,
        "shut down"
    );

    for id in &ids {
        let job = engine.get_status(*id).await?;
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            status = %job.status,
            retry_count = job.retry_count,
            result = ?job.result,
            error = ?job.error,
            "final status"
        );
    }
    let stats = engine.stats(None).await?;
    info!(stats = %serde_json::to_string(&stats)?, all_terminal = finished, "stats");
    Ok(())
}

async fn wait_until_terminal(engine: &Engine, ids: &[JobId]) -> Result<bool, EngineError> {
    loop {
        let mut all_terminal = true;
        for id in ids {
            if !engine.get_status(*id).await?.status.is_terminal() {
                all_terminal = false;
                break;
            }
        }
        if all_terminal {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
