/// Names under which samples are reported through the `metrics` facade.
#[derive(Copy, Clone, Debug)]
pub struct MetricLabels {
    pub success: &'static str,
    pub failure: &'static str,
    pub latency: &'static str,
    pub active_users: &'static str,
}

pub const METRIC_LABELS: MetricLabels = MetricLabels {
    success: "rampa_requests_success",
    failure: "rampa_requests_failure",
    latency: "rampa_request_latency",
    active_users: "rampa_active_users",
};
