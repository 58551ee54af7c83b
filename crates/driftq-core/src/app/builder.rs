//! QueueBuilder - キューの構築とワイヤリング
//!
//! Assembles the queue, registry, connectivity monitor and dispatcher, then
//! checks that every expected processor is registered before handing out an
//! [`OfflineQueue`].

use std::sync::Arc;

use crate::app::offline::OfflineQueue;
use crate::config::{ConfigError, ExecutionMode, QueueConfig};
use crate::connectivity::ConnectivityMonitor;
use crate::ports::{Clock, EventSink, NoopEventSink, SystemClock};
use crate::queue::EventQueue;
use crate::runtime::{EventHandler, HandlerRegistry};
use crate::worker::{Cooperative, Dedicated, DispatchWorker, Dispatcher, ExecutionStrategy};

/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new()
///     .with_config(QueueConfig::load())
///     .register("metrics_submission", MetricsHandler::new(client))
///     .expect_processors(&["metrics_submission"])
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - expect_processors() で期待される event_type を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
pub struct QueueBuilder {
    config: QueueConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    connectivity: Option<Arc<ConnectivityMonitor>>,
    strategy: Option<Box<dyn ExecutionStrategy>>,
    registry: HandlerRegistry,
    expected_processors: Option<Vec<String>>,
}

/// BuildError はキュー構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Missing processors: {0:?}. These event types were expected but not registered.")]
    MissingProcessors(Vec<String>),

    #[error("cooperative execution needs a tokio runtime; build inside one or use dedicated mode")]
    NoRuntime,
}

impl QueueBuilder {
    pub fn new() -> Self {
        Self {
            config: QueueConfig::default(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(NoopEventSink),
            connectivity: None,
            strategy: None,
            registry: HandlerRegistry::new(),
            expected_processors: None,
        }
    }

    pub fn with_config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share a monitor with other collaborators instead of creating one.
    ///
    /// The queue subscribes to it and unsubscribes when its last handle is
    /// dropped.
    pub fn connectivity(mut self, monitor: Arc<ConnectivityMonitor>) -> Self {
        self.connectivity = Some(monitor);
        self
    }

    /// Override the strategy picked from `config.execution`.
    pub fn strategy(mut self, strategy: Box<dyn ExecutionStrategy>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Handler を登録
    pub fn register<H: EventHandler + 'static>(
        self,
        event_type: impl Into<String>,
        handler: H,
    ) -> Self {
        self.registry.register(event_type, Arc::new(handler));
        self
    }

    /// 期待される event_type のリストを設定
    pub fn expect_processors(mut self, event_types: &[&str]) -> Self {
        self.expected_processors = Some(event_types.iter().map(|t| t.to_string()).collect());
        self
    }

    /// # 検証
    /// - config が妥当か
    /// - expect_processors() の event_type が全て登録されているか
    /// - cooperative モードなら tokio runtime 内か
    pub fn build(self) -> Result<OfflineQueue, BuildError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_processors {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingProcessors(missing));
            }
        }

        let strategy: Box<dyn ExecutionStrategy> = match self.strategy {
            Some(strategy) => strategy,
            None => match self.config.execution {
                ExecutionMode::Cooperative => {
                    Box::new(Cooperative::current().ok_or(BuildError::NoRuntime)?)
                }
                ExecutionMode::Dedicated => Box::new(Dedicated),
            },
        };

        let queue = Arc::new(EventQueue::with_parts(
            self.config.max_queue_size,
            self.config.default_max_retries,
            Arc::clone(&self.clock),
            self.sink,
        ));
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ConnectivityMonitor::with_clock(true, self.clock)));
        let registry = Arc::new(self.registry);

        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&registry),
            Arc::clone(&connectivity),
        )
        .with_retry_policy(self.config.retry.policy())
        .with_network_dependent_types(self.config.network_dependent_types.iter().cloned())
        .with_idle_interval(self.config.poll_interval());
        let worker = DispatchWorker::new(Arc::new(dispatcher), strategy);

        Ok(OfflineQueue::assemble(
            queue,
            registry,
            connectivity,
            worker,
            self.config.auto_start,
        ))
    }
}

impl Default for QueueBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::handler_fn;

    #[test]
    fn test_build_success() {
        let queue = QueueBuilder::new()
            .strategy(Box::new(Dedicated))
            .register("ping", handler_fn(|_| Ok(())))
            .expect_processors(&["ping"])
            .build();
        assert!(queue.is_ok());
    }

    #[test]
    fn test_build_missing_processors() {
        let queue = QueueBuilder::new()
            .strategy(Box::new(Dedicated))
            .register("ping", handler_fn(|_| Ok(())))
            .expect_processors(&["ping", "remote_log"])
            .build();
        assert!(matches!(
            queue,
            Err(BuildError::MissingProcessors(missing)) if missing == vec!["remote_log".to_string()]
        ));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = QueueConfig {
            max_queue_size: 0,
            ..QueueConfig::default()
        };
        let queue = QueueBuilder::new()
            .with_config(config)
            .strategy(Box::new(Dedicated))
            .build();
        assert!(matches!(queue, Err(BuildError::Config(_))));
    }

    #[test]
    fn test_cooperative_needs_runtime() {
        let queue = QueueBuilder::new().build();
        assert!(matches!(queue, Err(BuildError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_cooperative_inside_runtime() {
        let queue = QueueBuilder::new().build().unwrap();
        assert_eq!(queue.strategy_name(), "cooperative");
    }
}
