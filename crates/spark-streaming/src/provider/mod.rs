//! 游标提供者契约与装饰链。
//!
//! # 模块定位（Why）
//! - 提供者是绑定到单个 [`StreamBuffer`](crate::buffer::StreamBuffer) 的游标工厂；
//! - 受管提供者以装饰器形式包裹基础提供者，追加计数与清理协调；
//!   装饰链的展开通过显式的 [`ProviderLayer`] 标记完成，不依赖运行时类型探测。

use core::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{cursor::Cursor, error::Result};

pub mod buffered;
pub mod managed;

pub use buffered::BufferedCursorProvider;
pub use managed::{CursorHook, ManagedCursor, ManagedCursorProvider};

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的提供者标识。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl ProviderId {
    /// 分配一个新的标识。
    pub fn next() -> Self {
        Self(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cursor-provider-{}", self.0)
    }
}

/// 提供者在装饰链中的位置。
pub enum ProviderLayer<'a, T> {
    /// 不再包裹其它提供者。
    Innermost,
    /// 装饰器，携带其唯一的被装饰者。
    Decorator(&'a dyn CursorProvider<T>),
}

/// 游标提供者契约。
///
/// # 契约说明（What）
/// - `open_cursor`：每次调用返回一个新的游标实例；提供者关闭后返回 [`ProviderClosed`](crate::StreamingError::ProviderClosed)；
/// - `close`：不再签发新游标，已签发的游标仍可继续读取；
/// - `release_resources`：释放底层缓冲（以及按所有权关闭数据源），之后所有游标的读取失败；
/// - `id`：稳定标识，装饰器沿用被装饰者的标识；
/// - `layer`：装饰器返回 [`ProviderLayer::Decorator`]，基础实现保持默认的 `Innermost`。
pub trait CursorProvider<T>: Send + Sync {
    fn open_cursor(&self) -> Result<Box<dyn Cursor<T>>>;

    fn close(&self) -> Result<()>;

    fn release_resources(&self) -> Result<()>;

    fn is_closed(&self) -> bool;

    fn id(&self) -> ProviderId;

    fn layer(&self) -> ProviderLayer<'_, T> {
        ProviderLayer::Innermost
    }
}

/// 沿装饰链向内展开，返回最内层的非装饰提供者。
pub fn innermost<T>(provider: &dyn CursorProvider<T>) -> &dyn CursorProvider<T> {
    let mut current = provider;
    while let ProviderLayer::Decorator(inner) = current.layer() {
        current = inner;
    }
    current
}
