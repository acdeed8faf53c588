// Strategy and collector registries. Injected into the writer, query engine,
// and retention job; never ambient global state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::Observation;
use serde_json::Value;

/// Per-strategy semantic aggregation over a set of observations.
pub trait CheckStrategy: Send + Sync {
    /// Folds the observations' result payloads into one summary object.
    /// None when the strategy has nothing to say about this set.
    fn aggregate_result(&self, observations: &[Observation]) -> Option<Value>;
}

/// A sub-metric producer embedded in a check's result payload, aggregated
/// independently of the top-level strategy result.
pub trait Collector: Send + Sync {
    fn aggregate_result(&self, payloads: &[Value]) -> Option<Value>;
}

/// Registry output boundary: only JSON objects pass; anything else is dropped.
pub(crate) fn object_only(value: Option<Value>) -> Option<Value> {
    value.filter(Value::is_object)
}

#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn CheckStrategy>>,
}

impl StrategyRegistry {
    pub fn register(&mut self, strategy_id: impl Into<String>, strategy: Arc<dyn CheckStrategy>) {
        self.strategies.insert(strategy_id.into(), strategy);
    }

    pub fn get(&self, strategy_id: &str) -> Option<Arc<dyn CheckStrategy>> {
        self.strategies.get(strategy_id).cloned()
    }

    /// Strategy aggregation with the output boundary applied.
    pub fn aggregate(&self, strategy_id: &str, observations: &[Observation]) -> Option<Value> {
        let strategy = self.get(strategy_id)?;
        object_only(strategy.aggregate_result(observations))
    }
}

#[derive(Default)]
pub struct CollectorRegistry {
    collectors: HashMap<String, Arc<dyn Collector>>,
    /// correlation id -> collector id
    correlations: HashMap<String, String>,
}

impl CollectorRegistry {
    pub fn register(&mut self, collector_id: impl Into<String>, collector: Arc<dyn Collector>) {
        self.collectors.insert(collector_id.into(), collector);
    }

    /// Binds a correlation id (as it appears in result.metadata.collectors)
    /// to a registered collector.
    pub fn bind_correlation(
        &mut self,
        correlation_id: impl Into<String>,
        collector_id: impl Into<String>,
    ) {
        self.correlations
            .insert(correlation_id.into(), collector_id.into());
    }

    pub fn resolve(&self, correlation_id: &str) -> Option<&str> {
        self.correlations.get(correlation_id).map(String::as_str)
    }

    /// Collector aggregation for one correlation id with the output boundary
    /// applied. None for unknown correlation ids (callers skip silently).
    pub fn aggregate(&self, correlation_id: &str, payloads: &[Value]) -> Option<Value> {
        let collector_id = self.resolve(correlation_id)?;
        let collector = self.collectors.get(collector_id)?;
        object_only(collector.aggregate_result(payloads))
    }
}
