//! Pipeline builder
//!
//! Wires the shared collaborators into a [`Pipeline`]. Only the publisher is
//! mandatory; registry and store default to fresh instances built from the
//! configuration, but callers that expose a control surface or dashboard
//! pass in their own `Arc`s so they can keep a handle.

use std::sync::Arc;

use crate::audit::{AuditSink, AuditStore};
use crate::config::PipelineConfig;
use crate::errors::ConfigError;
use crate::registry::ThresholdRegistry;
use crate::router::TopicRouter;
use crate::time::{Clock, SystemClock};
use crate::transport::Publisher;

use super::{Pipeline, PipelineStats};

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    config: PipelineConfig,
    publisher: Option<Arc<dyn Publisher>>,
    registry: Option<Arc<ThresholdRegistry>>,
    store: Option<Arc<AuditStore>>,
    sinks: Vec<Arc<dyn AuditSink>>,
    clock: Arc<dyn Clock>,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            publisher: None,
            registry: None,
            store: None,
            sinks: Vec::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Outbound publish capability
    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Share an existing threshold registry
    ///
    /// The registry's own defaults table and fallback then decide every
    /// threshold; `default_threshold` and `class_defaults` from the config
    /// are only used when the builder creates the registry itself.
    pub fn registry(mut self, registry: Arc<ThresholdRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Share an existing audit store
    pub fn store(mut self, store: Arc<AuditStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Additional sink written after the store, e.g. a durable log
    pub fn sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Clock for enrichment and record timestamps
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the configuration and assemble the pipeline
    pub fn build(self) -> Result<Pipeline, ConfigError> {
        self.config.validate()?;

        let publisher = self
            .publisher
            .ok_or_else(|| ConfigError::Invalid("a publisher is required".into()))?;

        let config = self.config;
        let clock = self.clock;

        let registry = match self.registry {
            Some(registry) => {
                if registry.fallback() != config.default_threshold {
                    log::warn!(
                        "Shared registry fallback {} overrides default_threshold {}; class_defaults come from the registry",
                        registry.fallback(),
                        config.default_threshold
                    );
                }
                registry
            }
            None => Arc::new(ThresholdRegistry::with_clock(
                config.class_defaults.clone(),
                config.default_threshold,
                clock.clone(),
            )),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(AuditStore::new(config.audit_capacity)));

        log::info!(
            "Pipeline ready: subscription={}{}# processed_root={} default_threshold={} qos={:?} audit_capacity={}",
            config.sensor_root,
            crate::router::TOPIC_SEPARATOR,
            config.processed_root,
            config.default_threshold,
            config.outbound_qos,
            store.capacity()
        );

        Ok(Pipeline {
            router: TopicRouter::new(config.sensor_root.clone(), config.processed_root.clone()),
            config,
            registry,
            store,
            sinks: self.sinks,
            publisher,
            clock,
            stats: PipelineStats::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PublishError;
    use crate::transport::QoS;

    struct Discard;

    impl Publisher for Discard {
        fn publish(&self, _topic: &str, _payload: &[u8], _qos: QoS) -> Result<(), PublishError> {
            Ok(())
        }
    }

    #[test]
    fn publisher_required() {
        let result = PipelineBuilder::new(PipelineConfig::default()).build();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_config_rejected() {
        let result = PipelineBuilder::new(PipelineConfig::default().audit_capacity(0))
            .publisher(Arc::new(Discard))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn shares_given_collaborators() {
        let registry = Arc::new(ThresholdRegistry::default());
        let store = Arc::new(AuditStore::new(10));

        let pipeline = Pipeline::builder(PipelineConfig::default())
            .publisher(Arc::new(Discard))
            .registry(registry.clone())
            .store(store.clone())
            .build()
            .unwrap();

        assert!(Arc::ptr_eq(pipeline.registry(), &registry));
        assert!(Arc::ptr_eq(pipeline.store(), &store));
        assert_eq!(pipeline.subscription(), "sensors/#");
    }

    #[test]
    fn shared_registry_decides_unclassified_threshold() {
        let registry = Arc::new(ThresholdRegistry::new(Vec::new(), 50.0));
        let pipeline = Pipeline::builder(PipelineConfig::default().default_threshold(10.0))
            .publisher(Arc::new(Discard))
            .registry(registry)
            .build()
            .unwrap();

        let record = pipeline.handle("sensors/light/1", b"49", 0);
        assert_eq!(record.status, crate::audit::AuditStatus::Filtered);
        let record = pipeline.handle("sensors/temp/1", b"49", 0);
        assert_eq!(record.status, crate::audit::AuditStatus::Filtered);
        assert_eq!(pipeline.registry().snapshot().len(), 0);
    }

    #[test]
    fn huge_audit_capacity_builds() {
        let json = format!(r#"{{"audit_capacity": {}}}"#, usize::MAX);
        let config = PipelineConfig::from_json(&json).unwrap();
        let pipeline = Pipeline::builder(config)
            .publisher(Arc::new(Discard))
            .build()
            .unwrap();

        assert_eq!(pipeline.store().capacity(), usize::MAX);
        pipeline.handle("sensors/temp/1", b"30", 0);
        assert_eq!(pipeline.store().len(), 1);
    }

    #[test]
    fn default_store_uses_configured_capacity() {
        let pipeline = Pipeline::builder(PipelineConfig::default().audit_capacity(7))
            .publisher(Arc::new(Discard))
            .build()
            .unwrap();
        assert_eq!(pipeline.store().capacity(), 7);
    }
}
