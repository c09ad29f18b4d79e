use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::{CursorProvider, ProviderId};
use crate::{
    buffer::StreamBuffer,
    config::StreamingConfig,
    cursor::{BufferedCursor, Cursor},
    error::{Result, StreamingError},
    source::Source,
};

/// `BufferedCursorProvider` 是绑定到单个 [`StreamBuffer`] 的基础游标工厂。
///
/// - **契约 (What)**：所有签发的游标共享同一缓冲；`close` 只阻止签发新游标，
///   `release_resources` 才会关闭缓冲；两者均幂等；
/// - **风险 (Trade-offs)**：本类型不统计游标数量，也不协调“关闭 + 游标归零”的联合条件，
///   生产路径应通过 [`ManagedCursorProvider`](super::ManagedCursorProvider) 使用。
pub struct BufferedCursorProvider<T> {
    buffer: Arc<StreamBuffer<T>>,
    id: ProviderId,
    closed: AtomicBool,
}

impl<T> BufferedCursorProvider<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(buffer: Arc<StreamBuffer<T>>) -> Self {
        Self {
            buffer,
            id: ProviderId::next(),
            closed: AtomicBool::new(false),
        }
    }

    /// 直接以数据源和配置构建缓冲与提供者。
    pub fn from_source<S>(source: S, config: &StreamingConfig) -> Result<Self>
    where
        S: Source<T> + 'static,
    {
        Ok(Self::new(Arc::new(StreamBuffer::new(source, config)?)))
    }

    pub fn buffer(&self) -> &Arc<StreamBuffer<T>> {
        &self.buffer
    }
}

impl<T> CursorProvider<T> for BufferedCursorProvider<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn open_cursor(&self) -> Result<Box<dyn Cursor<T>>> {
        if self.is_closed() {
            return Err(StreamingError::ProviderClosed { id: self.id });
        }
        Ok(Box::new(BufferedCursor::new(Arc::clone(&self.buffer), self.id)))
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(provider_id = %self.id, "cursor provider closed");
        }
        Ok(())
    }

    fn release_resources(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.buffer.close()?;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn id(&self) -> ProviderId {
        self.id
    }
}
