//! 单次遍历的数据源契约及两种常用实现。
//!
//! # 模块定位（Why）
//! - 缓冲层只依赖“拉取下一条 / 报告耗尽 / 关闭”三个动作，HTTP 正文、结果集、文件等均可适配；
//! - 契约要求同一个缓冲生命周期内每个条目至多被拉取一次，这一点由
//!   [`StreamBuffer`](crate::buffer::StreamBuffer) 的串行化填充保证，数据源本身无需线程安全的读取。

use std::io::Read;

use bytes::{Buf, BytesMut};

use crate::error::SourceError;

/// 单次遍历的拉取式数据源。
///
/// # 契约说明（What）
/// - `pull`：返回下一条目；`Ok(None)` 表示耗尽，之后不会再被调用；
/// - `close`：释放底层资源，仅当缓冲以 [`SourceOwnership::Owned`](crate::SourceOwnership) 持有时调用；
/// - `size_hint`：若能提前得知条目总数则返回 `Some`，用于游标的 `size()`；
/// - **线程安全**：实现只需 `Send`，缓冲会在互斥区内调用，不会并发拉取。
pub trait Source<T>: Send {
    fn pull(&mut self) -> Result<Option<T>, SourceError>;

    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn size_hint(&self) -> Option<usize> {
        None
    }
}

impl<T, S> Source<T> for Box<S>
where
    S: Source<T> + ?Sized,
{
    fn pull(&mut self) -> Result<Option<T>, SourceError> {
        (**self).pull()
    }

    fn close(&mut self) -> Result<(), SourceError> {
        (**self).close()
    }

    fn size_hint(&self) -> Option<usize> {
        (**self).size_hint()
    }
}

/// 将任意迭代器适配为数据源。
///
/// - 迭代器的 `size_hint` 上下界一致时视为精确长度；
/// - `close` 丢弃尚未消费的迭代器。
pub struct IterSource<I> {
    iter: Option<I>,
}

impl<I> IterSource<I> {
    pub fn new(iter: I) -> Self {
        Self { iter: Some(iter) }
    }
}

impl<I> Source<I::Item> for IterSource<I>
where
    I: Iterator + Send,
{
    fn pull(&mut self) -> Result<Option<I::Item>, SourceError> {
        Ok(self.iter.as_mut().and_then(Iterator::next))
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.iter = None;
        Ok(())
    }

    fn size_hint(&self) -> Option<usize> {
        let (lower, upper) = self.iter.as_ref()?.size_hint();
        (upper == Some(lower)).then_some(lower)
    }
}

const READ_CHUNK: usize = 8 * 1024;

/// 基于 [`std::io::Read`] 的字节数据源，条目粒度为单个字节。
///
/// # 教案式说明
/// - **意图 (Why)**：字节流（HTTP 正文、文件）是最常见的单次数据源，逐字节拉取可以直接复用
///   分桶缓冲的位置计算，而容量参数即为字节数；
/// - **逻辑 (How)**：内部以 `BytesMut` 作为读前缓冲，每次从底层读取至多 8 KiB，
///   再按字节吐出，避免对底层 `Read` 发起逐字节系统调用；
/// - **契约 (What)**：底层返回 `Interrupted` 时自动重读，其余 I/O 错误包装为 [`SourceError::Io`]。
pub struct ReaderSource<R> {
    reader: Option<R>,
    pending: BytesMut,
    scratch: Box<[u8]>,
}

impl<R: Read> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            pending: BytesMut::new(),
            scratch: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }

    fn refill(&mut self) -> Result<bool, SourceError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };
        loop {
            match reader.read(&mut self.scratch) {
                Ok(0) => return Ok(false),
                Ok(read) => {
                    self.pending.extend_from_slice(&self.scratch[..read]);
                    return Ok(true);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(SourceError::Io(err)),
            }
        }
    }
}

impl<R: Read + Send> Source<u8> for ReaderSource<R> {
    fn pull(&mut self) -> Result<Option<u8>, SourceError> {
        if !self.pending.has_remaining() && !self.refill()? {
            return Ok(None);
        }
        Ok(Some(self.pending.get_u8()))
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.reader = None;
        self.pending.clear();
        Ok(())
    }
}
