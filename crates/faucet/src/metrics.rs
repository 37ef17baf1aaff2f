//! Prometheus metrics for the faucet service

use drip_common::types::{one_token, Amount};
use num_traits::ToPrimitive;
use prometheus::{opts, Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder};

#[derive(Debug)]
pub struct FaucetMetrics {
    registry: Registry,

    pub claims_total: IntCounter,
    pub rejections_total: IntCounterVec,
    pub rate_limited_total: IntCounter,
    pub paused: IntGauge,
    pub total_supply_tokens: Gauge,
}

impl FaucetMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let claims_total = IntCounter::with_opts(opts!(
            "drip_claims_total",
            "Total number of successful claims"
        ))?;

        let rejections_total = IntCounterVec::new(
            opts!("drip_claim_rejections_total", "Rejected claims by reason"),
            &["reason"],
        )?;

        let rate_limited_total = IntCounter::with_opts(opts!(
            "drip_rate_limited_total",
            "Requests refused by the per-IP rate limiter"
        ))?;

        let paused = IntGauge::with_opts(opts!("drip_faucet_paused", "1 while the faucet is paused"))?;

        let total_supply_tokens = Gauge::with_opts(opts!(
            "drip_total_supply_tokens",
            "Token total supply in whole tokens"
        ))?;

        registry.register(Box::new(claims_total.clone()))?;
        registry.register(Box::new(rejections_total.clone()))?;
        registry.register(Box::new(rate_limited_total.clone()))?;
        registry.register(Box::new(paused.clone()))?;
        registry.register(Box::new(total_supply_tokens.clone()))?;

        Ok(Self {
            registry,
            claims_total,
            rejections_total,
            rate_limited_total,
            paused,
            total_supply_tokens,
        })
    }

    pub fn record_rejection(&self, reason: &str) {
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.set(i64::from(paused));
    }

    pub fn set_total_supply(&self, supply: &Amount) {
        let whole = (supply / one_token()).to_f64().unwrap_or(f64::MAX);
        self.total_supply_tokens.set(whole);
    }

    /// Text exposition of every registered metric.
    pub fn gather(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drip_common::types::tokens;

    #[test]
    fn test_gather_contains_recorded_values() {
        let metrics = FaucetMetrics::new().unwrap();
        metrics.claims_total.inc();
        metrics.record_rejection("COOLDOWN_ACTIVE");
        metrics.set_paused(true);
        metrics.set_total_supply(&tokens(30));

        let text = metrics.gather().unwrap();
        assert!(text.contains("drip_claims_total 1"));
        assert!(text.contains("drip_claim_rejections_total{reason=\"COOLDOWN_ACTIVE\"} 1"));
        assert!(text.contains("drip_faucet_paused 1"));
        assert!(text.contains("drip_total_supply_tokens 30"));
    }
}
