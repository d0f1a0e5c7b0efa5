//! Background scheduling: catalog refresh and session reaping, each a
//! `tokio_cron_scheduler::JobScheduler` job rather than a hand-rolled
//! `tokio::time::interval` loop, per §4.5/§4.6 and the teacher's
//! `LifecycleManager`-driven scheduler.

use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::GatewayConfig;
use crate::state::AppState;

/// A 6-field (seconds-first) cron expression firing every `seconds`
/// seconds. `tokio_cron_scheduler`'s underlying `cron` crate accepts a
/// `*/n` step in the seconds field the same way it does for minutes/hours.
fn every_seconds_cron(seconds: u64) -> String {
    format!("*/{seconds} * * * * *")
}

pub async fn build_scheduler(
    state: AppState,
    config: &GatewayConfig,
) -> Result<JobScheduler, String> {
    let scheduler = JobScheduler::new().await.map_err(|e| e.to_string())?;

    let refresh_state = state.clone();
    let refresh_job = Job::new_async(every_seconds_cron(config.catalog_refresh_seconds).as_str(), move |_uuid, _lock| {
        let state = refresh_state.clone();
        Box::pin(async move {
            match state.catalog.reload_all().await {
                Ok(count) => tracing::debug!(reloaded = count, "catalog refresh cycle completed"),
                Err(err) => tracing::warn!(error = %err, "catalog refresh cycle failed, retrying next interval"),
            }
        })
    })
    .map_err(|e| e.to_string())?;
    scheduler.add(refresh_job).await.map_err(|e| e.to_string())?;

    let reap_state = state.clone();
    let reap_job = Job::new_async("*/60 * * * * *", move |_uuid, _lock| {
        let state = reap_state.clone();
        Box::pin(async move {
            let (suspended, closed) = state.sessions.reap(chrono::Utc::now());
            if suspended > 0 || closed > 0 {
                tracing::info!(suspended, closed, "session reaper swept expired sessions");
            }
        })
    })
    .map_err(|e| e.to_string())?;
    scheduler.add(reap_job).await.map_err(|e| e.to_string())?;

    Ok(scheduler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_seconds_cron_uses_a_step_in_the_seconds_field() {
        assert_eq!(every_seconds_cron(60), "*/60 * * * * *");
        assert_eq!(every_seconds_cron(5), "*/5 * * * * *");
    }
}
