use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{
    bucket::Bucket,
    position::{Position, PositionMapper},
};
use crate::{
    config::{BufferLimit, SourceOwnership, StreamingConfig},
    error::{Result, SourceError, StreamingError},
    source::Source,
};

/// `StreamBuffer` 把单次遍历的数据源物化为可被多个游标重复、乱序读取的分桶存储。
///
/// # 模块角色（Why）
/// - 同一数据源可能被多个消费者同时读取；缓冲保证每个条目只从数据源拉取一次，
///   所有游标观察到与数据源一致的顺序；
/// - 通过 `max_buffer_size` 约束物化总量，避免把无限流全部驻留在内存中。
///
/// # 核心机制（How）
/// - **填充互斥区**：`fill` 持有数据源与当前桶，拉取与追加在同一把锁内完成，
///   确保数据源对每个逻辑条目至多前进一次；使用 `parking_lot::Mutex`，因为拉取可能长时间阻塞；
/// - **读路径零锁**：桶列表由 [`ArcSwap`] 发布，新桶出现时整表替换；
///   游标读取已填充槽位只需加载快照或复用缓存的桶；
/// - **逐条检查上限**：每追加一个条目立即比较 `consumed > max`，超限即失败，
///   之后缓冲进入粘滞失败态，所有读取返回同一个超限错误。
///
/// # 契约说明（What）
/// - **线程安全**：`Send + Sync`，可由任意数量的游标跨线程共享；
/// - **关闭**：[`close`](Self::close) 幂等，丢弃桶列表；仅在 [`SourceOwnership::Owned`] 时关闭数据源；
/// - **数据源错误**：原样向触发拉取的读取者传播，缓冲保持可用，是否重试由数据源决定。
pub struct StreamBuffer<T> {
    mapper: PositionMapper,
    limit: BufferLimit,
    ownership: SourceOwnership,
    buckets: ArcSwap<Vec<Arc<Bucket<T>>>>,
    consumed: AtomicUsize,
    exhausted: AtomicBool,
    failure: OnceLock<Failure>,
    closed: AtomicBool,
    size_hint: Option<usize>,
    fill: Mutex<FillState<T>>,
}

/// 对缓冲致命的粘滞失败，首次写入后不再变化。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Failure {
    SizeExceeded { limit: usize },
    GrowthDisabled { capacity: usize },
}

impl Failure {
    fn to_error(self) -> StreamingError {
        match self {
            Failure::SizeExceeded { limit } => StreamingError::BufferSizeExceeded { limit },
            Failure::GrowthDisabled { capacity } => {
                StreamingError::BufferGrowthDisabled { capacity }
            }
        }
    }
}

struct FillState<T> {
    source: Option<Box<dyn Source<T>>>,
    current: Option<Arc<Bucket<T>>>,
}

impl<T> StreamBuffer<T>
where
    T: Send + Sync + 'static,
{
    /// 以校验后的配置包装数据源。
    pub fn new<S>(source: S, config: &StreamingConfig) -> Result<Self>
    where
        S: Source<T> + 'static,
    {
        config.validate()?;
        let size_hint = source.size_hint();
        Ok(Self {
            mapper: PositionMapper::new(config.initial_buffer_size, config.buffer_size_increment),
            limit: config.max_buffer_size,
            ownership: config.source_ownership,
            buckets: ArcSwap::from_pointee(Vec::new()),
            consumed: AtomicUsize::new(0),
            exhausted: AtomicBool::new(false),
            failure: OnceLock::new(),
            closed: AtomicBool::new(false),
            size_hint,
            fill: Mutex::new(FillState {
                source: Some(Box::new(source)),
                current: None,
            }),
        })
    }

    pub fn mapper(&self) -> PositionMapper {
        self.mapper
    }

    pub fn limit(&self) -> BufferLimit {
        self.limit
    }

    /// 全局偏移到桶地址的映射，参见 [`PositionMapper::to_position`]。
    pub fn to_position(&self, global: usize) -> Option<Position> {
        self.mapper.to_position(global)
    }

    /// 当前发布的桶数量；关闭后为零。
    pub fn bucket_count(&self) -> usize {
        self.buckets.load().len()
    }

    /// 已物化的条目数。
    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::Acquire)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// 已关闭或因超限进入失败态。
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.failure.get().is_some()
    }

    /// 条目总数：数据源耗尽后为物化总数，否则为数据源给出的精确长度。
    pub fn size(&self) -> Option<usize> {
        if self.is_exhausted() {
            Some(self.consumed())
        } else {
            self.size_hint
        }
    }

    /// 读取前的状态检查；粘滞失败优先于关闭错误。
    pub fn ensure_readable(&self) -> Result<()> {
        if let Some(failure) = self.failure.get() {
            return Err(failure.to_error());
        }
        if self.closed.load(Ordering::Acquire) {
            return Err(StreamingError::BufferClosed);
        }
        Ok(())
    }

    /// 判断 `position` 处是否有条目，必要时从数据源拉取。
    pub fn has_next(&self, position: usize) -> Result<bool> {
        self.ensure_readable()?;
        if position < self.consumed() {
            return Ok(true);
        }
        self.fill_to(position)
    }

    /// 返回包含 `position` 的桶；数据源在此之前耗尽时返回 `None`。
    pub fn bucket_for(&self, position: usize) -> Result<Option<Arc<Bucket<T>>>> {
        self.ensure_readable()?;
        if position >= self.consumed() && !self.fill_to(position)? {
            return Ok(None);
        }
        let Some(address) = self.mapper.to_position(position) else {
            return Err(self.fail(Failure::GrowthDisabled {
                capacity: self.mapper.initial(),
            }));
        };
        let snapshot = self.buckets.load();
        match snapshot.get(address.bucket_index) {
            Some(bucket) if bucket.contains(address) => Ok(Some(Arc::clone(bucket))),
            _ => {
                self.ensure_readable()?;
                Err(StreamingError::MissingItem { position })
            }
        }
    }

    /// 关闭缓冲：丢弃桶列表，并按所有权决定是否关闭数据源。
    pub fn close(&self) -> core::result::Result<(), SourceError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // 桶列表必须在填充互斥区内清空，否则正在分配新桶的填充者会把旧列表重新发布回去。
        let source = {
            let mut state = self.fill.lock();
            self.buckets.store(Arc::new(Vec::new()));
            state.current = None;
            state.source.take()
        };
        debug!(
            consumed = self.consumed(),
            ownership = ?self.ownership,
            "stream buffer closed"
        );
        match (source, self.ownership) {
            (Some(mut source), SourceOwnership::Owned) => source.close(),
            _ => Ok(()),
        }
    }

    /// 在填充互斥区内逐条拉取，直到 `position` 被填充或数据源耗尽。
    fn fill_to(&self, position: usize) -> Result<bool> {
        let mut state = self.fill.lock();
        loop {
            self.ensure_readable()?;
            if position < self.consumed() {
                return Ok(true);
            }
            if self.is_exhausted() {
                return Ok(false);
            }
            let Some(source) = state.source.as_mut() else {
                return Err(StreamingError::BufferClosed);
            };
            match source.pull()? {
                Some(item) => self.append(&mut state, item)?,
                None => {
                    self.exhausted.store(true, Ordering::Release);
                    debug!(total = self.consumed(), "stream source exhausted");
                    return Ok(false);
                }
            }
        }
    }

    fn append(&self, state: &mut FillState<T>, item: T) -> Result<()> {
        let reusable = state
            .current
            .as_ref()
            .filter(|bucket| !bucket.is_full())
            .cloned();
        let bucket = match reusable {
            Some(bucket) => bucket,
            None => self.on_bucket_overflow(state)?,
        };
        let position = self.consumed();
        if bucket.push(item).is_err() {
            return Err(StreamingError::MissingItem { position });
        }
        let total = self.consumed.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(limit) = self.limit.get().filter(|limit| total > *limit) {
            warn!(limit, "stream buffer exceeded its maximum size");
            return Err(self.fail(Failure::SizeExceeded { limit }));
        }
        Ok(())
    }

    /// 当前桶已满时分配下一个桶并发布到快照。
    fn on_bucket_overflow(&self, state: &mut FillState<T>) -> Result<Arc<Bucket<T>>> {
        let next_index = state.current.as_ref().map_or(0, |bucket| bucket.index() + 1);
        if next_index > 0 && !self.mapper.grows() {
            warn!(
                capacity = self.mapper.initial(),
                "stream buffer cannot grow past its initial bucket"
            );
            return Err(self.fail(Failure::GrowthDisabled {
                capacity: self.mapper.initial(),
            }));
        }
        let capacity = self.mapper.capacity_of(next_index);
        let bucket = Arc::new(Bucket::new(next_index, capacity));

        let mut published = Vec::clone(&self.buckets.load());
        published.push(Arc::clone(&bucket));
        self.buckets.store(Arc::new(published));

        debug!(bucket_index = next_index, capacity, "stream buffer allocated bucket");
        state.current = Some(Arc::clone(&bucket));
        Ok(bucket)
    }

    /// 记录粘滞失败；并发下以首个失败为准。
    fn fail(&self, failure: Failure) -> StreamingError {
        let _ = self.failure.set(failure);
        self.failure.get().copied().unwrap_or(failure).to_error()
    }
}

impl<T> core::fmt::Debug for StreamBuffer<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("mapper", &self.mapper)
            .field("limit", &self.limit)
            .field("consumed", &self.consumed.load(Ordering::Relaxed))
            .field("exhausted", &self.exhausted.load(Ordering::Relaxed))
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("failure", &self.failure.get())
            .finish()
    }
}
