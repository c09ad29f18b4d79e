//! 游标：面向单个消费者的读取头。
//!
//! # 模块定位（Why）
//! - 每个消费者持有独立的游标，位置、缓存桶、关闭状态互不共享；
//! - 游标本身不要求并发安全（单线程持有是预期用法），但其底层的
//!   [`StreamBuffer`] 可被任意多个游标跨线程共享。

use std::{
    io::{self, Read},
    sync::Arc,
};

use crate::{
    buffer::{Bucket, StreamBuffer},
    error::{Result, StreamingError},
    provider::ProviderId,
};

/// 游标契约。
///
/// # 契约说明（What）
/// - `has_next`：当前位置是否还有条目，可能触发一次数据源拉取；
/// - `next`：返回当前位置的条目并前进一位；调用方应先以 `has_next` 判定结束，
///   越过末尾调用会得到 [`StreamingError::EndOfData`]；
/// - `release`：归还游标占用的资源；受管游标会借此通知所属提供者；
/// - `close`：终结游标，之后的读取均失败；
/// - `seek`：调整读取位置，不触发拉取，实现“可重复读取”；
/// - `size`：数据源总条目数，尚不可知时为 `None`。
pub trait Cursor<T>: Send {
    fn has_next(&self) -> Result<bool>;

    fn next(&mut self) -> Result<T>;

    fn release(&mut self);

    fn close(&mut self);

    fn position(&self) -> usize;

    fn seek(&mut self, position: usize) -> Result<()>;

    fn size(&self) -> Option<usize>;

    fn is_released(&self) -> bool;

    fn is_closed(&self) -> bool;

    /// 所属提供者的标识。
    fn provider_id(&self) -> ProviderId;
}

impl<T, C> Cursor<T> for Box<C>
where
    C: Cursor<T> + ?Sized,
{
    fn has_next(&self) -> Result<bool> {
        (**self).has_next()
    }

    fn next(&mut self) -> Result<T> {
        (**self).next()
    }

    fn release(&mut self) {
        (**self).release()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn position(&self) -> usize {
        (**self).position()
    }

    fn seek(&mut self, position: usize) -> Result<()> {
        (**self).seek(position)
    }

    fn size(&self) -> Option<usize> {
        (**self).size()
    }

    fn is_released(&self) -> bool {
        (**self).is_released()
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }

    fn provider_id(&self) -> ProviderId {
        (**self).provider_id()
    }
}

/// 以迭代器形式消费游标，遇到错误后停止。
pub struct Items<'a, T, C: ?Sized> {
    cursor: &'a mut C,
    failed: bool,
    _item: core::marker::PhantomData<fn() -> T>,
}

impl<'a, T, C> Items<'a, T, C>
where
    C: Cursor<T> + ?Sized,
{
    pub fn new(cursor: &'a mut C) -> Self {
        Self {
            cursor,
            failed: false,
            _item: core::marker::PhantomData,
        }
    }
}

impl<T, C> Iterator for Items<'_, T, C>
where
    C: Cursor<T> + ?Sized,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let step = match self.cursor.has_next() {
            Ok(true) => self.cursor.next(),
            Ok(false) => return None,
            Err(err) => Err(err),
        };
        self.failed = step.is_err();
        Some(step)
    }
}

/// `BufferedCursor` 是直接读取 [`StreamBuffer`] 的基础游标。
///
/// # 教案式说明
/// - **意图 (Why)**：顺序读取时绝大多数访问落在同一个桶，缓存最近命中的桶即可绕过快照加载；
/// - **逻辑 (How)**：
///   1. 计算当前位置的桶地址；
///   2. 若缓存桶 `contains` 该地址则直接读取；
///   3. 否则经 [`StreamBuffer::bucket_for`] 取桶（必要时触发拉取）并刷新缓存；
///   4. 槽位在成功取桶后仍为空视为内部不变量破坏，返回 [`StreamingError::MissingItem`]；
/// - **契约 (What)**：`release` 仅丢弃缓存桶，不触碰提供者；`close` 为终态。
pub struct BufferedCursor<T> {
    buffer: Arc<StreamBuffer<T>>,
    provider_id: ProviderId,
    position: usize,
    cached: Option<Arc<Bucket<T>>>,
    released: bool,
    closed: bool,
}

impl<T> BufferedCursor<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(buffer: Arc<StreamBuffer<T>>, provider_id: ProviderId) -> Self {
        Self {
            buffer,
            provider_id,
            position: 0,
            cached: None,
            released: false,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StreamingError::CursorClosed);
        }
        Ok(())
    }

    fn read_at(&mut self, position: usize) -> Result<T> {
        let address = self.buffer.to_position(position);
        if let (Some(address), Some(bucket)) = (address, self.cached.as_ref()) {
            if bucket.contains(address) {
                return bucket
                    .get(address.item_index)
                    .cloned()
                    .ok_or(StreamingError::MissingItem { position });
            }
        }

        let Some(bucket) = self.buffer.bucket_for(position)? else {
            return Err(StreamingError::EndOfData { position });
        };
        let item = address
            .and_then(|address| bucket.get(address.item_index))
            .cloned()
            .ok_or(StreamingError::MissingItem { position });
        self.cached = Some(bucket);
        item
    }
}

impl<T> Cursor<T> for BufferedCursor<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn has_next(&self) -> Result<bool> {
        self.ensure_open()?;
        self.buffer.has_next(self.position)
    }

    fn next(&mut self) -> Result<T> {
        self.ensure_open()?;
        self.buffer.ensure_readable()?;
        let item = self.read_at(self.position)?;
        self.position += 1;
        Ok(item)
    }

    fn release(&mut self) {
        self.cached = None;
        self.released = true;
    }

    fn close(&mut self) {
        self.cached = None;
        self.closed = true;
    }

    fn position(&self) -> usize {
        self.position
    }

    fn seek(&mut self, position: usize) -> Result<()> {
        self.ensure_open()?;
        self.position = position;
        Ok(())
    }

    fn size(&self) -> Option<usize> {
        self.buffer.size()
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn provider_id(&self) -> ProviderId {
        self.provider_id
    }
}

impl<T> core::fmt::Debug for BufferedCursor<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufferedCursor")
            .field("provider_id", &self.provider_id)
            .field("position", &self.position)
            .field("released", &self.released)
            .field("closed", &self.closed)
            .finish()
    }
}

/// 字节游标的 `Read` 适配，读取错误映射为 `io::Error`。
///
/// 已写入 `buf` 的字节不可丢弃：中途出错时先返回 `Ok(written)`，
/// 错误留给下一次 `read` 重新触发（游标位置停在出错条目上）。
fn read_bytes<C>(cursor: &mut C, buf: &mut [u8]) -> io::Result<usize>
where
    C: Cursor<u8> + ?Sized,
{
    let mut written = 0;
    while written < buf.len() {
        let step = match cursor.has_next() {
            Ok(true) => cursor.next().map(Some),
            Ok(false) => Ok(None),
            Err(err) => Err(err),
        };
        match step {
            Ok(Some(byte)) => {
                buf[written] = byte;
                written += 1;
            }
            Ok(None) => break,
            Err(_) if written > 0 => break,
            Err(err) => return Err(io::Error::other(err)),
        }
    }
    Ok(written)
}

impl Read for BufferedCursor<u8> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_bytes(self, buf)
    }
}

/// 提供者签发的 `Box<dyn Cursor<u8>>` 经由 `Box<R: Read>` 自动获得 `Read`。
impl<'a> Read for dyn Cursor<u8> + 'a {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        read_bytes(self, buf)
    }
}
