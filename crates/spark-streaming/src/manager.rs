//! # StreamingManager：按执行上下文托管游标提供者
//!
//! ## 核心意图（Why）
//! - 调用方可能忘记释放游标；上下文结束时必须强制回收它创建的所有提供者，作为泄漏兜底；
//! - 对外隐藏“缓冲 → 基础提供者 → 受管提供者”的装配细节。
//!
//! ## 行为契约（What）
//! - `manage`：以数据源构建完整的受管提供者，并登记到上下文名下；
//! - `complete`：原子摘除上下文的登记，并对其中每个提供者强制 `release_resources`；
//! - `context_guard`：RAII 守卫，析构时执行 `complete`；
//! - `dispose`：完成全部上下文，用于宿主退出。
//!
//! ## 风险提示（Trade-offs）
//! - 登记表使用 `DashMap`，释放动作均在取出条目、放开分片锁之后执行，避免在 guard 内回调外部代码；
//! - 已被提前拆除的提供者会在下一次登记时顺带剔除，不会无限累积。

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use tracing::debug;

use crate::{
    cleanup::CleanupReport,
    config::StreamingConfig,
    error::Result,
    provider::{BufferedCursorProvider, CursorProvider, ManagedCursorProvider},
    source::Source,
    statistics::StreamingStatistics,
};

/// 拥有提供者生命周期的执行上下文标识。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(Arc<str>);

impl ContextId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ContextId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// 上下文到受管提供者的并发登记表。
///
/// # 教案式注释
/// - **意图 (Why)**：把提供者的最终回收与请求级上下文绑定；
/// - **契约 (What)**：同一管理器内所有提供者共享一份 [`StreamingStatistics`]，
///   新建提供者使用构造时校验过的 [`StreamingConfig`]。
pub struct StreamingManager<T> {
    config: StreamingConfig,
    statistics: Arc<StreamingStatistics>,
    contexts: DashMap<ContextId, Vec<Arc<ManagedCursorProvider<T>>>>,
}

impl<T> StreamingManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(config: StreamingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            statistics: Arc::new(StreamingStatistics::new()),
            contexts: DashMap::new(),
        })
    }

    pub fn config(&self) -> &StreamingConfig {
        &self.config
    }

    pub fn statistics(&self) -> &Arc<StreamingStatistics> {
        &self.statistics
    }

    /// 以数据源构建缓冲与受管提供者，并登记到 `context` 名下。
    pub fn manage<S>(
        &self,
        source: S,
        context: impl Into<ContextId>,
    ) -> Result<Arc<ManagedCursorProvider<T>>>
    where
        S: Source<T> + 'static,
    {
        let base = BufferedCursorProvider::from_source(source, &self.config)?;
        Ok(self.manage_provider(Arc::new(base), context))
    }

    /// 为调用方自建的提供者追加托管与上下文登记。
    pub fn manage_provider(
        &self,
        provider: Arc<dyn CursorProvider<T>>,
        context: impl Into<ContextId>,
    ) -> Arc<ManagedCursorProvider<T>> {
        let context = context.into();
        let managed = Arc::new(ManagedCursorProvider::new(
            provider,
            Arc::clone(&self.statistics),
        ));
        debug!(
            provider_id = %managed.id(),
            context = %context,
            "managed cursor provider registered"
        );

        let mut entry = self.contexts.entry(context).or_insert_with(Vec::new);
        entry.retain(|provider| !provider.is_released());
        entry.push(Arc::clone(&managed));
        managed
    }

    /// 上下文结束：强制释放其名下所有提供者。
    ///
    /// 完成不会封存上下文标识：之后以同一 `context` 调用 [`manage`](Self::manage)
    /// 会重新建立登记，新提供者只在该上下文再次完成（或 [`dispose`](Self::dispose)）时被兜底回收。
    pub fn complete(&self, context: &ContextId) -> CleanupReport {
        let Some((_, providers)) = self.contexts.remove(context) else {
            return CleanupReport::skipped();
        };

        let mut report = CleanupReport::skipped();
        for provider in &providers {
            report.merge(provider.release_with_report());
        }
        debug!(
            context = %context,
            providers = providers.len(),
            faults = report.faults().len(),
            "streaming context completed"
        );
        report
    }

    /// 返回一个在析构时完成 `context` 的守卫。
    pub fn context_guard(&self, context: impl Into<ContextId>) -> ContextGuard<'_, T> {
        ContextGuard {
            manager: self,
            context: context.into(),
        }
    }

    /// 完成当前登记的全部上下文。
    pub fn dispose(&self) -> CleanupReport {
        let mut report = CleanupReport::skipped();
        for context in self.tracked_contexts() {
            report.merge(self.complete(&context));
        }
        report
    }

    /// 当前仍有登记的上下文。
    pub fn tracked_contexts(&self) -> Vec<ContextId> {
        self.contexts
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// 某个上下文名下仍登记的提供者数量。
    pub fn providers_in(&self, context: &ContextId) -> usize {
        self.contexts
            .get(context)
            .map(|providers| providers.len())
            .unwrap_or(0)
    }
}

impl<T> fmt::Debug for StreamingManager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingManager")
            .field("config", &self.config)
            .field("statistics", &self.statistics.snapshot())
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

/// 作用域结束即完成上下文的 RAII 守卫。
pub struct ContextGuard<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    manager: &'a StreamingManager<T>,
    context: ContextId,
}

impl<T> ContextGuard<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn context(&self) -> &ContextId {
        &self.context
    }

    /// 在守卫的上下文名下托管一个数据源。
    pub fn manage<S>(&self, source: S) -> Result<Arc<ManagedCursorProvider<T>>>
    where
        S: Source<T> + 'static,
    {
        self.manager.manage(source, self.context.clone())
    }
}

impl<T> Drop for ContextGuard<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let _ = self.manager.complete(&self.context);
    }
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;
    use crate::{error::StreamingError, source::IterSource};

    fn manager() -> StreamingManager<u32> {
        StreamingManager::new(
            StreamingConfig::for_objects()
                .with_initial_buffer_size(2)
                .with_buffer_size_increment(2),
        )
        .expect("合法配置")
    }

    #[test]
    fn complete_force_releases_leaked_cursors() {
        let manager = manager();
        let context = ContextId::from("request-1");
        let provider = manager
            .manage(IterSource::new(0..5u32), context.clone())
            .expect("托管");
        let mut leaked = provider.open_cursor().expect("签发");
        assert_eq!(leaked.next().expect("读取"), 0);
        assert_eq!(manager.statistics().snapshot().open_cursors, 1);

        let report = manager.complete(&context);
        assert!(report.is_performed() && report.is_clean());
        assert!(provider.is_released());
        assert_eq!(manager.statistics().snapshot().open_providers, 0);
        assert_eq!(manager.statistics().snapshot().open_cursors, 0);
        assert!(matches!(leaked.next(), Err(StreamingError::BufferClosed)));
        assert!(manager.tracked_contexts().is_empty());

        assert!(!manager.complete(&context).is_performed(), "重复完成为空操作");
    }

    #[test]
    fn guard_completes_on_drop() {
        let manager = manager();
        let provider = {
            let guard = manager.context_guard("scoped");
            let provider = guard.manage(IterSource::new(0..3u32)).expect("托管");
            assert_eq!(manager.providers_in(guard.context()), 1);
            provider
        };
        assert!(provider.is_released());
        assert!(manager.tracked_contexts().is_empty());
    }

    #[test]
    fn released_providers_are_pruned_on_register() {
        let manager = manager();
        let context = ContextId::from("long-lived");
        let first = manager
            .manage(IterSource::new(0..1u32), context.clone())
            .expect("托管");
        first.close().expect("关闭");
        assert!(first.is_released(), "无游标时关闭即拆除");

        manager
            .manage(IterSource::new(0..1u32), context.clone())
            .expect("托管");
        assert_eq!(manager.providers_in(&context), 1);
    }

    #[test]
    fn managing_after_completion_reopens_the_context() {
        let manager = manager();
        let context = ContextId::from("reused");
        let before = manager
            .manage(IterSource::new(0..2u32), context.clone())
            .expect("托管");
        manager.complete(&context);
        assert!(before.is_released());

        let after = manager
            .manage(IterSource::new(0..2u32), context.clone())
            .expect("完成后仍可托管");
        assert!(!after.is_released());
        assert_eq!(manager.providers_in(&context), 1);
        assert_eq!(manager.tracked_contexts(), vec![context.clone()]);

        assert!(manager.complete(&context).is_performed());
        assert!(after.is_released());
        assert_eq!(manager.statistics().open_providers(), 0);
    }

    #[test]
    fn dispose_completes_every_context() {
        let manager = manager();
        for name in ["a", "b", "c"] {
            manager
                .manage(IterSource::new(0..2u32), name)
                .expect("托管");
        }
        assert_eq!(manager.statistics().open_providers(), 3);
        assert!(manager.dispose().is_performed());
        assert_eq!(manager.statistics().open_providers(), 0);
        assert!(manager.tracked_contexts().is_empty());
    }
}
