use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use cairn_anchor::engine::AnchorEngine;

/// Node-wide Prometheus metrics.
pub struct NodeMetrics {
    pub local_height: Gauge,
    pub external_height: Gauge,
    pub anchor_reward_pool: Gauge,
    pub pending_anchors: Gauge,
    pub anchors: Gauge,
    pub unrewarded_anchors: Gauge,
    pub blocks_produced: Counter,
    pub rewards_paid: Counter,
    pub registry: Registry,
}

impl NodeMetrics {
    /// Create a new metrics registry with all node metrics registered.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let local_height = Gauge::default();
        let external_height = Gauge::default();
        let anchor_reward_pool = Gauge::default();
        let pending_anchors = Gauge::default();
        let anchors = Gauge::default();
        let unrewarded_anchors = Gauge::default();
        let blocks_produced = Counter::default();
        let rewards_paid = Counter::default();

        registry.register(
            "cairn_local_height",
            "Current local chain height",
            local_height.clone(),
        );
        registry.register(
            "cairn_external_height",
            "Latest known external chain height",
            external_height.clone(),
        );
        registry.register(
            "cairn_anchor_reward_pool",
            "Community anchor reward pool in base units",
            anchor_reward_pool.clone(),
        );
        registry.register(
            "cairn_pending_anchors",
            "Anchor transactions awaiting promotion",
            pending_anchors.clone(),
        );
        registry.register("cairn_anchors", "Promoted anchors", anchors.clone());
        registry.register(
            "cairn_unrewarded_anchors",
            "Active anchors waiting for their reward",
            unrewarded_anchors.clone(),
        );
        registry.register(
            "cairn_blocks_produced",
            "Total blocks produced by this node",
            blocks_produced.clone(),
        );
        registry.register(
            "cairn_rewards_paid",
            "Anchor rewards paid in blocks produced by this node",
            rewards_paid.clone(),
        );

        Self {
            local_height,
            external_height,
            anchor_reward_pool,
            pending_anchors,
            anchors,
            unrewarded_anchors,
            blocks_produced,
            rewards_paid,
            registry,
        }
    }

    /// Refresh the gauges from engine state.
    pub fn observe(&self, engine: &AnchorEngine) {
        self.local_height.set(engine.tip_height() as i64);
        self.external_height.set(engine.external_height() as i64);
        self.anchor_reward_pool
            .set(engine.community_balances().anchor_reward as i64);
        self.pending_anchors
            .set(engine.list_pending_anchors().len() as i64);
        self.anchors.set(engine.list_anchors().len() as i64);
        self.unrewarded_anchors
            .set(engine.list_unrewarded_anchors().len() as i64);
    }

    /// Encode all metrics in Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buf = String::new();
        prometheus_client::encoding::text::encode(&mut buf, &self.registry)?;
        Ok(buf)
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = NodeMetrics::new();
        metrics.local_height.set(42);
        metrics.blocks_produced.inc();
        metrics.blocks_produced.inc();

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("cairn_local_height"));
        assert!(encoded.contains("cairn_anchor_reward_pool"));
        assert!(encoded.contains("cairn_blocks_produced"));
    }

    #[test]
    fn test_observe_engine() {
        let genesis = crate::genesis::build_genesis(&crate::genesis::devnet_genesis()).unwrap();
        let mut engine = AnchorEngine::new(Default::default(), genesis).unwrap();
        engine.set_external_height(7).unwrap();

        let metrics = NodeMetrics::new();
        metrics.observe(&engine);
        assert_eq!(metrics.external_height.get(), 7);
        assert_eq!(metrics.local_height.get(), 0);
        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("cairn_external_height 7"));
    }
}
