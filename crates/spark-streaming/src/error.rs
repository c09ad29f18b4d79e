//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义读取路径上可能出现的错误语义：容量超限、游标状态非法、数据源故障、配置非法；
//! - 清理路径上的故障不在此处传播，而是由 [`crate::cleanup`] 收集并记录日志。
//!
//! ## 设计要求（What）
//! - 所有错误类型实现 `thiserror::Error`，可直接与 `?` 以及 `std::error::Error` 生态协作；
//! - 读取路径的错误向调用游标的消费者传播，不做自动重试。

use std::io;

use thiserror::Error;

use crate::provider::ProviderId;

/// 流式缓冲读取路径上的错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“致命且粘滞”的容量超限、正常协议信号（数据结束）与内部不变量破坏，
///   让消费者能据此决定终止请求还是修正调用顺序；
/// - **契约 (What)**：
///   - `BufferSizeExceeded` 一旦出现，缓冲即视为关闭，之后的读取返回同一错误；
///   - `EndOfData` 仅在调用方忽略 `has_next() == false` 继续调用 `next()` 时出现；
///   - `MissingItem` 表示桶已命中却取不到槽位，属于实现缺陷；
/// - **设计权衡 (Trade-offs)**：`Source` 变体保留底层原因链，代价是错误类型不可 `Clone`，
///   因此粘滞错误只缓存上限值并在每次读取时重新构造。
#[derive(Debug, Error)]
pub enum StreamingError {
    /// 物化条目数超过 `max_buffer_size`。
    #[error("streaming buffer exceeded its maximum size of {limit} items")]
    BufferSizeExceeded { limit: usize },

    /// `buffer_size_increment == 0` 时首个桶已满，无法继续增长。
    #[error("streaming buffer cannot grow beyond its initial capacity of {capacity} items")]
    BufferGrowthDisabled { capacity: usize },

    /// 数据源在请求位置之前已经耗尽。
    #[error("no item available at position {position}: end of data")]
    EndOfData { position: usize },

    /// 桶已命中但槽位为空，说明缓冲内部状态不一致。
    #[error("bucket resolved for position {position} but its slot is empty")]
    MissingItem { position: usize },

    #[error("cursor is closed")]
    CursorClosed,

    #[error("cursor has been released")]
    CursorReleased,

    #[error("streaming buffer is closed")]
    BufferClosed,

    #[error("cursor provider `{id}` is closed")]
    ProviderClosed { id: ProviderId },

    #[error("source failure: {0}")]
    Source(#[from] SourceError),

    #[error("invalid streaming configuration: {detail}")]
    InvalidConfig { detail: String },
}

impl StreamingError {
    /// 是否属于对缓冲致命的错误。
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamingError::BufferSizeExceeded { .. }
                | StreamingError::BufferGrowthDisabled { .. }
                | StreamingError::BufferClosed
                | StreamingError::Source(_)
        )
    }

    pub(crate) fn invalid_config(detail: impl Into<String>) -> Self {
        StreamingError::InvalidConfig {
            detail: detail.into(),
        }
    }
}

/// 数据源拉取或关闭时产生的错误。
///
/// - **契约 (What)**：`Io` 对应基于 `std::io::Read` 的字节源；`Failed` 供自定义数据源携带可读描述。
/// - **风险 (Trade-offs)**：重试责任在数据源一侧，本层不会对同一条目再次拉取。
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("{detail}")]
    Failed { detail: String },
}

impl SourceError {
    pub fn failed(detail: impl Into<String>) -> Self {
        SourceError::Failed {
            detail: detail.into(),
        }
    }
}

pub type Result<T, E = StreamingError> = core::result::Result<T, E>;
