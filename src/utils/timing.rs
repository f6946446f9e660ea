use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::utils::logging::TIMING_TARGET;

#[derive(Debug)]
pub struct RequestTimer {
    route: String,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    completed: bool,
}

impl RequestTimer {
    pub fn start(route: &str) -> Self {
        let timer = RequestTimer {
            route: route.to_string(),
            started_at: Utc::now(),
            started_perf: Instant::now(),
            completed: false,
        };
        info!(
            target: TIMING_TARGET,
            "event=request_received route={} received_at={}",
            timer.route,
            timer.started_at.to_rfc3339()
        );
        timer
    }

    pub fn complete(&mut self, status: u16, detail: Option<&str>) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: TIMING_TARGET,
            "event=request_completed route={} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.route,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            status,
            detail.unwrap_or_default()
        );
    }
}

pub async fn log_upstream_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    info!(
        target: TIMING_TARGET,
        "event=upstream_request provider={} model={} operation={} started_at={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339()
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=upstream_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status
    );

    result
}
