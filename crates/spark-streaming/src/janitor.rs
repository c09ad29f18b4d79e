//! # CursorJanitor：双条件、恰好一次的资源拆除
//!
//! ## 核心意图（Why）
//! - 缓冲资源只能在“提供者已关闭”与“打开游标数归零”两个条件同时成立后释放，
//!   而这两个事实可能以任意顺序、在任意线程上先后成立；
//! - Janitor 是唯一被允许完整拆除缓冲资源的组件，并保证拆除恰好执行一次。
//!
//! ## 行为契约（What）
//! - `close`：`closed` 标记 false→true 的 CAS 胜者关闭被装饰提供者、递减“打开提供者”统计，
//!   随后复查游标数，若已归零则触发拆除；失败者为空操作；
//! - `release_resources`：`released` 标记的 CAS 胜者依次尽力关闭、释放被装饰提供者、
//!   按当前游标数递减统计并丢弃对被装饰提供者的引用；
//! - `release_cursor`：递减统计、释放游标、递减游标数；若归零且已关闭则触发拆除。
//!
//! ## 并发说明（How）
//! - 两个条件以两个独立的原子信号表示，均使用 `SeqCst`：关闭路径“先置位再读计数”，
//!   游标路径“先递减再读标记”，因此至少有一方观察到两个条件同时成立；
//! - 观察到条件成立的一方调用 `release_resources`，由 `released` 的 CAS 保证只有一方执行。
//!
//! ## 风险提示（Trade-offs）
//! - 强制拆除与迟到的游标释放交错时，“打开游标”统计可能少算，统计以饱和递减兜底，不会回绕。

use std::sync::Arc;

use tracing::debug;

use crate::{
    cleanup::{CleanupReport, CleanupStage, best_effort},
    cursor::Cursor,
    provider::{CursorProvider, ProviderId},
    statistics::StreamingStatistics,
    sync::{AtomicBool, AtomicUsize, Mutex, Ordering, lock},
};

/// 每个受管提供者一对一持有的清理协调者。
pub struct CursorJanitor<T> {
    provider_id: ProviderId,
    delegate: Mutex<Option<Arc<dyn CursorProvider<T>>>>,
    open_cursors: Arc<AtomicUsize>,
    statistics: Arc<StreamingStatistics>,
    closed: AtomicBool,
    released: AtomicBool,
}

impl<T: 'static> CursorJanitor<T> {
    pub fn new(
        delegate: Arc<dyn CursorProvider<T>>,
        open_cursors: Arc<AtomicUsize>,
        statistics: Arc<StreamingStatistics>,
    ) -> Self {
        Self {
            provider_id: delegate.id(),
            delegate: Mutex::new(Some(delegate)),
            open_cursors,
            statistics,
            closed: AtomicBool::new(false),
            released: AtomicBool::new(false),
        }
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub(crate) fn statistics(&self) -> &StreamingStatistics {
        &self.statistics
    }

    /// 关闭被装饰提供者；若此时已无打开游标，则继续完成拆除。
    pub fn close(&self) -> CleanupReport {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return CleanupReport::skipped();
        }

        let mut report = CleanupReport::performed();
        if let Some(delegate) = self.delegate() {
            best_effort(
                &mut report,
                self.provider_id,
                CleanupStage::CloseProvider,
                || delegate.close(),
            );
        }
        self.statistics.decrement_open_providers();
        debug!(provider_id = %self.provider_id, "managed cursor provider closed");

        if self.open_cursors.load(Ordering::SeqCst) == 0 {
            report.merge(self.release_resources());
        }
        report
    }

    /// 完整拆除：恰好执行一次，任何故障都被记录而不传播。
    pub fn release_resources(&self) -> CleanupReport {
        if self
            .released
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return CleanupReport::skipped();
        }

        let mut report = CleanupReport::performed();
        report.merge(self.close());

        let delegate = lock(&self.delegate).take();
        if let Some(delegate) = delegate.as_ref() {
            best_effort(
                &mut report,
                self.provider_id,
                CleanupStage::ReleaseProvider,
                || delegate.release_resources(),
            );
        }
        let outstanding = self.open_cursors.load(Ordering::SeqCst);
        self.statistics.decrement_open_cursors(outstanding);
        drop(delegate);

        debug!(
            provider_id = %self.provider_id,
            outstanding_cursors = outstanding,
            faults = report.faults().len(),
            "cursor provider resources released"
        );
        report
    }

    /// 释放一个由本提供者签发的游标；若它是最后一个且提供者已关闭，则触发拆除。
    pub fn release_cursor(&self, cursor: &mut dyn Cursor<T>) -> CleanupReport {
        if !self.is_released() {
            self.statistics.decrement_open_cursors(1);
        }

        let mut report = CleanupReport::performed();
        best_effort(
            &mut report,
            self.provider_id,
            CleanupStage::ReleaseCursor,
            || {
                cursor.release();
                Ok(())
            },
        );

        let previous = self
            .open_cursors
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or(0);
        if previous <= 1 && self.closed.load(Ordering::SeqCst) {
            report.merge(self.release_resources());
        }
        report
    }

    fn delegate(&self) -> Option<Arc<dyn CursorProvider<T>>> {
        lock(&self.delegate).clone()
    }
}

impl<T> core::fmt::Debug for CursorJanitor<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CursorJanitor")
            .field("provider_id", &self.provider_id)
            .field("open_cursors", &self.open_cursors.load(Ordering::SeqCst))
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .field("released", &self.released.load(Ordering::SeqCst))
            .finish()
    }
}
