use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub requests_open: IntGauge,
    pub dispatch_outcomes_total: IntCounterVec,
    pub quote_outcomes_total: IntCounterVec,
    pub penalties_total: IntCounter,
    pub sweep_closed_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let requests_open = IntGauge::new("requests_open", "Requests currently open for matching")
            .expect("valid requests_open metric");

        let dispatch_outcomes_total = IntCounterVec::new(
            Opts::new(
                "dispatch_outcomes_total",
                "Dispatch queue entry outcomes by kind",
            ),
            &["outcome"],
        )
        .expect("valid dispatch_outcomes_total metric");

        let quote_outcomes_total = IntCounterVec::new(
            Opts::new("quote_outcomes_total", "Quote outcomes by kind"),
            &["outcome"],
        )
        .expect("valid quote_outcomes_total metric");

        let penalties_total =
            IntCounter::new("penalties_total", "Penalty records posted for early cancellations")
                .expect("valid penalties_total metric");

        let sweep_closed_total = IntCounterVec::new(
            Opts::new(
                "sweep_closed_total",
                "Stale entries closed by the expiry sweep, by kind",
            ),
            &["kind"],
        )
        .expect("valid sweep_closed_total metric");

        registry
            .register(Box::new(requests_open.clone()))
            .expect("register requests_open");
        registry
            .register(Box::new(dispatch_outcomes_total.clone()))
            .expect("register dispatch_outcomes_total");
        registry
            .register(Box::new(quote_outcomes_total.clone()))
            .expect("register quote_outcomes_total");
        registry
            .register(Box::new(penalties_total.clone()))
            .expect("register penalties_total");
        registry
            .register(Box::new(sweep_closed_total.clone()))
            .expect("register sweep_closed_total");

        Self {
            registry,
            requests_open,
            dispatch_outcomes_total,
            quote_outcomes_total,
            penalties_total,
            sweep_closed_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
