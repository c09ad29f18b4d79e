//! `spark-streaming` 为“只能前向读取一次”的数据源提供可重复读取的游标。
//!
//! # 模块定位（Why）
//! - 数据源（网络流、结果集、迭代器）只能被消费一次，而多个下游消费者需要各自、
//!   反复、以不同速率读取同一份数据；
//! - 本 crate 在数据源前放置一层按需物化的分桶缓冲，并以受管游标协调资源回收，
//!   使缓冲恰好在“不再签发新游标”且“所有游标均已释放”之后被拆除一次。
//!
//! # 设计概要（How）
//! - [`buffer`]：位置映射、只追加的桶与 [`StreamBuffer`]，负责惰性拉取与容量上限；
//! - [`cursor`]：游标契约与直接读取缓冲的 [`BufferedCursor`]；
//! - [`provider`]：游标工厂契约、基础实现与受管装饰器 [`ManagedCursorProvider`]；
//! - [`janitor`]：双条件、恰好一次的拆除协调者 [`CursorJanitor`]；
//! - [`manager`]：把提供者绑定到执行上下文的 [`StreamingManager`]，作为泄漏兜底；
//! - [`config`] / [`error`] / [`cleanup`] / [`statistics`]：配置、错误域、尽力清理结果与运行统计。
//!
//! # 并发约定（Consistency）
//! - 缓冲与提供者可跨线程共享；游标为单一持有者使用，满足 `Send` 但不要求 `Sync`；
//! - 启用 `--cfg loom`（或 `--cfg spark_loom`）时，拆除路径的原子量与互斥锁切换为 Loom 实现。

pub mod buffer;
pub mod cleanup;
pub mod config;
pub mod cursor;
pub mod error;
pub mod janitor;
pub mod manager;
pub mod provider;
pub mod source;
pub mod statistics;

mod sync;

pub use buffer::{Bucket, Position, PositionMapper, StreamBuffer};
pub use cleanup::{CleanupFault, CleanupReport, CleanupStage};
pub use config::{BufferLimit, SourceOwnership, StreamingConfig};
pub use cursor::{BufferedCursor, Cursor, Items};
pub use error::{Result, SourceError, StreamingError};
pub use janitor::CursorJanitor;
pub use manager::{ContextGuard, ContextId, StreamingManager};
pub use provider::{
    BufferedCursorProvider, CursorHook, CursorProvider, ManagedCursor, ManagedCursorProvider,
    ProviderId, ProviderLayer, innermost,
};
pub use source::{IterSource, ReaderSource, Source};
pub use statistics::{StatisticsSnapshot, StreamingStatistics};
