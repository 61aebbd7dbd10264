//! Prometheus text-exposition metrics for the `/metrics` admin route -
//! spec.md §6.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub struct GatewayMetrics {
    registry: Registry,
    pub connections_current: IntGauge,
    pub frames_received_total: IntCounter,
    pub frames_sent_total: IntCounter,
    pub router_denied_total: IntCounter,
    pub router_limited_total: IntCounter,
    pub tasks_created_total: IntCounter,
    pub tasks_timed_out_total: IntCounter,
}

impl GatewayMetrics {
    pub fn new() -> std::sync::Arc<Self> {
        let registry = Registry::new();

        let connections_current = IntGauge::new("ringforge_connections_current", "Currently connected agent sockets").unwrap();
        let frames_received_total = IntCounter::new("ringforge_frames_received_total", "Channel frames received").unwrap();
        let frames_sent_total = IntCounter::new("ringforge_frames_sent_total", "Channel frames sent").unwrap();
        let router_denied_total = IntCounter::new("ringforge_router_denied_total", "Router AccessControl denials").unwrap();
        let router_limited_total = IntCounter::new("ringforge_router_limited_total", "Router rate-limit rejections").unwrap();
        let tasks_created_total = IntCounter::new("ringforge_tasks_created_total", "Tasks created").unwrap();
        let tasks_timed_out_total = IntCounter::new("ringforge_tasks_timed_out_total", "Tasks that hit their TTL").unwrap();

        for metric in [
            Box::new(connections_current.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(frames_received_total.clone()),
            Box::new(frames_sent_total.clone()),
            Box::new(router_denied_total.clone()),
            Box::new(router_limited_total.clone()),
            Box::new(tasks_created_total.clone()),
            Box::new(tasks_timed_out_total.clone()),
        ] {
            registry.register(metric).expect("metric names are unique literals");
        }

        std::sync::Arc::new(Self {
            registry,
            connections_current,
            frames_received_total,
            frames_sent_total,
            router_denied_total,
            router_limited_total,
            tasks_created_total,
            tasks_timed_out_total,
        })
    }

    /// Render the Prometheus text-exposition format for `/metrics`.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf).expect("encoding gathered metrics never fails");
        String::from_utf8(buf).expect("prometheus text output is always valid utf-8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_every_registered_metric_name() {
        let metrics = GatewayMetrics::new();
        metrics.connections_current.set(3);
        let text = metrics.render();
        assert!(text.contains("ringforge_connections_current 3"));
    }
}
