use std::time::Instant;

use chrono::Utc;
use tracing::info;

/// Wraps one LLM call and emits start/finish events under the `bot.timing`
/// target, which the logging setup routes to its own files.
pub async fn log_llm_timing<T, E, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    call: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();

    info!(
        target: "bot.timing",
        "event=llm_call_started provider={} model={} operation={} started_at={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339()
    );

    let result = call().await;
    let duration = started_perf.elapsed().as_secs_f64();
    match &result {
        Ok(_) => info!(
            target: "bot.timing",
            "event=llm_call_completed provider={} model={} operation={} duration_s={:.3} status=success",
            provider,
            model,
            operation,
            duration
        ),
        Err(err) => info!(
            target: "bot.timing",
            "event=llm_call_completed provider={} model={} operation={} duration_s={:.3} status=error detail={}",
            provider,
            model,
            operation,
            duration,
            err
        ),
    }

    result
}
