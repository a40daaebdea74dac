//! Prometheus metrics for the bot
//!
//! Metrics live in their own `Registry` (not the process-global one) so the
//! server and the tests can each build an isolated set.

use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    /// Updates handed to the dispatch bridge, by source (webhook/polling)
    pub updates_received: IntCounterVec,
    /// Updates refused, by reason (not_ready/busy/stopped/unauthorized)
    pub updates_rejected: IntCounterVec,
    /// Callback presses, by action
    pub callbacks: IntCounterVec,
    /// Membership lookups, by outcome (subscribed/not_subscribed/error)
    pub membership_checks: IntCounterVec,
    /// Failed outbound Telegram calls
    pub telegram_errors: IntCounter,
    /// Jobs currently waiting in the dispatch queue
    pub queue_depth: IntGauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let updates_received = IntCounterVec::new(
            Opts::new("quizbot_updates_received_total", "Updates accepted for dispatch"),
            &["source"],
        )?;
        let updates_rejected = IntCounterVec::new(
            Opts::new("quizbot_updates_rejected_total", "Updates refused before dispatch"),
            &["reason"],
        )?;
        let callbacks = IntCounterVec::new(
            Opts::new("quizbot_callbacks_total", "Inline button presses by action"),
            &["action"],
        )?;
        let membership_checks = IntCounterVec::new(
            Opts::new("quizbot_membership_checks_total", "Channel membership lookups by outcome"),
            &["outcome"],
        )?;
        let telegram_errors = IntCounter::new("quizbot_telegram_errors_total", "Failed Bot API calls")?;
        let queue_depth = IntGauge::new("quizbot_dispatch_queue_depth", "Dispatched jobs not yet finished")?;

        registry.register(Box::new(updates_received.clone()))?;
        registry.register(Box::new(updates_rejected.clone()))?;
        registry.register(Box::new(callbacks.clone()))?;
        registry.register(Box::new(membership_checks.clone()))?;
        registry.register(Box::new(telegram_errors.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            updates_received,
            updates_rejected,
            callbacks,
            membership_checks,
            telegram_errors,
            queue_depth,
        })
    }

    /// Text exposition of every metric in this registry.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.updates_received.with_label_values(&["webhook"]).inc();
        metrics.queue_depth.set(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("quizbot_updates_received_total{source=\"webhook\"} 1"));
        assert!(text.contains("quizbot_dispatch_queue_depth 3"));
    }

    #[test]
    fn test_registries_are_independent() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.telegram_errors.inc();
        assert_eq!(second.telegram_errors.get(), 0);
    }
}
