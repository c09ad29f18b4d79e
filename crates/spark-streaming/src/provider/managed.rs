//! 受管提供者与受管游标。
//!
//! # 教案式说明
//! - **意图 (Why)**：基础提供者只负责签发游标，不知道何时可以安全回收缓冲；
//!   受管装饰器在签发与释放两端记账，把“提供者关闭 + 游标归零”的判定交给 [`CursorJanitor`]；
//! - **逻辑 (How)**：
//!   1. `open_cursor` 先向被装饰者申请原始游标，再递增游标计数与统计；
//!   2. 原始游标连同共享的 Janitor 交给 [`CursorHook`]，默认包裹为 [`ManagedCursor`]；
//!   3. 受管游标的 `release` / `close` / `Drop` 恰好一次地回到 Janitor；
//! - **契约 (What)**：`id` 沿用被装饰者的标识，`layer` 返回 [`ProviderLayer::Decorator`]，
//!   因此 [`innermost`](super::innermost) 可以展开到基础提供者。

use std::sync::Arc;

use super::{CursorProvider, ProviderId, ProviderLayer};
use crate::{
    cleanup::CleanupReport,
    cursor::Cursor,
    error::{Result, StreamingError},
    janitor::CursorJanitor,
    statistics::StreamingStatistics,
    sync::{AtomicUsize, Ordering},
};

/// 签发游标前的包装钩子：接收原始游标与共享 Janitor，返回交给调用方的游标。
pub type CursorHook<T> =
    Arc<dyn Fn(Box<dyn Cursor<T>>, Arc<CursorJanitor<T>>) -> Box<dyn Cursor<T>> + Send + Sync>;

/// 包裹任意 [`CursorProvider`] 的受管装饰器。
pub struct ManagedCursorProvider<T> {
    delegate: Arc<dyn CursorProvider<T>>,
    id: ProviderId,
    open_cursors: Arc<AtomicUsize>,
    janitor: Arc<CursorJanitor<T>>,
    hook: CursorHook<T>,
}

impl<T> ManagedCursorProvider<T>
where
    T: Send + 'static,
{
    /// 包裹被装饰者，并把“打开提供者”统计加一；对应的减一由 Janitor 的关闭路径完成。
    pub fn new(delegate: Arc<dyn CursorProvider<T>>, statistics: Arc<StreamingStatistics>) -> Self {
        let open_cursors = Arc::new(AtomicUsize::new(0));
        statistics.increment_open_providers();
        let janitor = Arc::new(CursorJanitor::new(
            Arc::clone(&delegate),
            Arc::clone(&open_cursors),
            statistics,
        ));
        Self {
            id: delegate.id(),
            delegate,
            open_cursors,
            janitor,
            hook: Arc::new(wrap_managed::<T>),
        }
    }

    /// 替换默认的游标包装；钩子返回的游标必须最终调用 [`CursorJanitor::release_cursor`]。
    pub fn with_cursor_hook(mut self, hook: CursorHook<T>) -> Self {
        self.hook = hook;
        self
    }

    pub fn janitor(&self) -> &Arc<CursorJanitor<T>> {
        &self.janitor
    }

    /// 当前由本提供者签发且尚未释放的游标数。
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.janitor.is_released()
    }

    /// 与 [`CursorProvider::close`] 相同，但返回清理报告。
    pub fn close_with_report(&self) -> CleanupReport {
        self.janitor.close()
    }

    /// 与 [`CursorProvider::release_resources`] 相同，但返回清理报告。
    pub fn release_with_report(&self) -> CleanupReport {
        self.janitor.release_resources()
    }
}

impl<T> CursorProvider<T> for ManagedCursorProvider<T>
where
    T: Send + 'static,
{
    fn open_cursor(&self) -> Result<Box<dyn Cursor<T>>> {
        if self.janitor.is_closed() {
            return Err(StreamingError::ProviderClosed { id: self.id });
        }
        let mut cursor = self.delegate.open_cursor()?;
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
        self.janitor.statistics().increment_open_cursors();

        // 与强制拆除交错时，拆除方不会再看到这个游标，由签发方自行撤销。
        if self.janitor.is_released() {
            self.janitor.statistics().decrement_open_cursors(1);
            let _ = self.janitor.release_cursor(&mut *cursor);
            return Err(StreamingError::ProviderClosed { id: self.id });
        }
        Ok((self.hook)(cursor, Arc::clone(&self.janitor)))
    }

    fn close(&self) -> Result<()> {
        self.janitor.close();
        Ok(())
    }

    fn release_resources(&self) -> Result<()> {
        self.janitor.release_resources();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.janitor.is_closed()
    }

    fn id(&self) -> ProviderId {
        self.id
    }

    fn layer(&self) -> ProviderLayer<'_, T> {
        ProviderLayer::Decorator(&*self.delegate)
    }
}

/// 默认钩子：包裹为 [`ManagedCursor`]。
fn wrap_managed<T>(cursor: Box<dyn Cursor<T>>, janitor: Arc<CursorJanitor<T>>) -> Box<dyn Cursor<T>>
where
    T: Send + 'static,
{
    Box::new(ManagedCursor::new(cursor, janitor))
}

impl<T> core::fmt::Debug for ManagedCursorProvider<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManagedCursorProvider")
            .field("id", &self.id)
            .field("janitor", &self.janitor)
            .finish()
    }
}

/// 受管游标：读取委托给内部游标，生命周期事件恰好一次地回报给 Janitor。
///
/// - `release` 之后所有读取返回 [`StreamingError::CursorReleased`]；
/// - `close` 先关闭内部游标再执行 `release`；
/// - 未显式释放即被丢弃时，`Drop` 兜底完成释放。
pub struct ManagedCursor<T>
where
    T: 'static,
{
    inner: Box<dyn Cursor<T>>,
    janitor: Arc<CursorJanitor<T>>,
    released: bool,
}

impl<T> ManagedCursor<T>
where
    T: 'static,
{
    pub fn new(inner: Box<dyn Cursor<T>>, janitor: Arc<CursorJanitor<T>>) -> Self {
        Self {
            inner,
            janitor,
            released: false,
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released {
            return Err(StreamingError::CursorReleased);
        }
        Ok(())
    }

    fn release_once(&mut self) -> CleanupReport {
        if self.released {
            return CleanupReport::skipped();
        }
        self.released = true;
        self.janitor.release_cursor(&mut *self.inner)
    }
}

impl<T> Cursor<T> for ManagedCursor<T>
where
    T: Send + 'static,
{
    fn has_next(&self) -> Result<bool> {
        self.ensure_live()?;
        self.inner.has_next()
    }

    fn next(&mut self) -> Result<T> {
        self.ensure_live()?;
        self.inner.next()
    }

    fn release(&mut self) {
        self.release_once();
    }

    fn close(&mut self) {
        if !self.released {
            self.inner.close();
        }
        self.release_once();
    }

    fn position(&self) -> usize {
        self.inner.position()
    }

    fn seek(&mut self, position: usize) -> Result<()> {
        self.ensure_live()?;
        self.inner.seek(position)
    }

    fn size(&self) -> Option<usize> {
        self.inner.size()
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn provider_id(&self) -> ProviderId {
        self.inner.provider_id()
    }
}

impl<T> Drop for ManagedCursor<T>
where
    T: 'static,
{
    fn drop(&mut self) {
        self.release_once();
    }
}

impl<T> core::fmt::Debug for ManagedCursor<T>
where
    T: 'static,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ManagedCursor")
            .field("provider_id", &self.janitor.provider_id())
            .field("position", &self.inner.position())
            .field("released", &self.released)
            .finish()
    }
}
