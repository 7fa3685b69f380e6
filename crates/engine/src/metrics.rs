use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref WORKFLOWS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "stagehand_workflows_created_total",
        "Total number of workflow instances created."
    )
    .expect("valid metric");
    pub static ref EVENTS_PROCESSED_TOTAL: IntCounter = IntCounter::new(
        "stagehand_events_processed_total",
        "Total number of events dispatched to workflow instances."
    )
    .expect("valid metric");
    pub static ref TRANSITIONS_TOTAL: IntCounter = IntCounter::new(
        "stagehand_transitions_total",
        "Total number of step and workflow transitions executed."
    )
    .expect("valid metric");
    pub static ref COMMITS_TOTAL: IntCounter = IntCounter::new(
        "stagehand_commits_total",
        "Total number of mutation batches flushed to the store."
    )
    .expect("valid metric");
    pub static ref COMMIT_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "stagehand_commit_failures_total",
        "Total number of mutation batches the store rejected."
    )
    .expect("valid metric");
}

/// Register every engine counter with [`REGISTRY`]. Safe to call more than once.
pub fn register_metrics() -> crate::Result<()> {
    let counters: [&IntCounter; 5] = [
        &WORKFLOWS_CREATED_TOTAL,
        &EVENTS_PROCESSED_TOTAL,
        &TRANSITIONS_TOTAL,
        &COMMITS_TOTAL,
        &COMMIT_FAILURES_TOTAL,
    ];
    for counter in counters {
        match REGISTRY.register(Box::new(counter.clone())) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => {
                return Err(crate::Error::Internal(format!(
                    "Failed to register metric: {}",
                    e
                )))
            }
        }
    }
    Ok(())
}

// Text exposition of everything in REGISTRY
pub fn gather_metrics() -> crate::Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::Error::Internal(format!("Metrics are not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        register_metrics().unwrap();
        register_metrics().unwrap();
        WORKFLOWS_CREATED_TOTAL.inc();
        let text = gather_metrics().unwrap();
        assert!(text.contains("stagehand_workflows_created_total"));
    }
}
