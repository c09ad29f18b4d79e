//! 流式缓冲的配置契约。
//!
//! # 设计总览（Why）
//! - 三个容量参数决定桶的布局与内存上限：`initial_buffer_size`（首个桶容量）、
//!   `buffer_size_increment`（后续每个桶的容量，`0` 表示禁止增长）、`max_buffer_size`（物化条目总数上限）；
//! - 数据源是否随缓冲一起关闭由 [`SourceOwnership`] 显式声明，而不是根据条目类型推断。
//!
//! # 集成说明（How）
//! - 可直接构造，也可通过 [`StreamingConfig::from_toml_str`] 从 TOML 片段解析；
//! - 字段同时接受 `snake_case` 与 `camelCase` 键名，便于沿用既有部署配置。

use core::{fmt, num::NonZeroUsize};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, StreamingError};

const DEFAULT_OBJECT_INITIAL: usize = 100;
const DEFAULT_OBJECT_INCREMENT: usize = 100;
const DEFAULT_BYTE_INITIAL: usize = 256 * 1024;
const DEFAULT_BYTE_INCREMENT: usize = 256 * 1024;
const DEFAULT_BYTE_MAX: usize = 1024 * 1024;

/// 物化条目总数的上限。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BufferLimit {
    #[default]
    Unbounded,
    Limited(NonZeroUsize),
}

impl BufferLimit {
    /// 以正整数构造上限；`0` 视为非法输入。
    pub fn limited(limit: usize) -> Result<Self> {
        NonZeroUsize::new(limit)
            .map(BufferLimit::Limited)
            .ok_or_else(|| StreamingError::invalid_config("max_buffer_size must be positive"))
    }

    /// 返回具体上限；无上限时为 `None`。
    pub fn get(&self) -> Option<usize> {
        match self {
            BufferLimit::Unbounded => None,
            BufferLimit::Limited(limit) => Some(limit.get()),
        }
    }

    /// 判断物化 `count` 个条目后是否越界。
    pub fn is_exceeded_by(&self, count: usize) -> bool {
        matches!(self, BufferLimit::Limited(limit) if count > limit.get())
    }
}

impl fmt::Display for BufferLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferLimit::Unbounded => f.write_str("unbounded"),
            BufferLimit::Limited(limit) => write!(f, "{limit}"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLimit {
    Count(i64),
    Keyword(String),
}

impl<'de> Deserialize<'de> for BufferLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> core::result::Result<Self, D::Error> {
        use serde::de::Error;

        match RawLimit::deserialize(deserializer)? {
            RawLimit::Count(-1) => Ok(BufferLimit::Unbounded),
            RawLimit::Count(count) if count > 0 => usize::try_from(count)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(BufferLimit::Limited)
                .ok_or_else(|| D::Error::custom("max_buffer_size does not fit in usize")),
            RawLimit::Count(count) => Err(D::Error::custom(format!(
                "max_buffer_size must be positive or -1 (unbounded), got {count}"
            ))),
            RawLimit::Keyword(word) if word.eq_ignore_ascii_case("unbounded") => {
                Ok(BufferLimit::Unbounded)
            }
            RawLimit::Keyword(word) => Err(D::Error::custom(format!(
                "unrecognized max_buffer_size `{word}`"
            ))),
        }
    }
}

impl Serialize for BufferLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error> {
        match self {
            BufferLimit::Unbounded => serializer.serialize_str("unbounded"),
            BufferLimit::Limited(limit) => serializer.serialize_u64(limit.get() as u64),
        }
    }
}

/// 数据源的所有权归属。
///
/// - **契约 (What)**：`Owned` 表示缓冲关闭时一并关闭数据源；`Borrowed` 表示数据源由调用方负责处置，
///   缓冲只释放自身持有的桶。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceOwnership {
    #[default]
    Owned,
    Borrowed,
}

/// 流式缓冲配置。
///
/// # 教案式说明
/// - **意图 (Why)**：把“首桶容量、增长步长、上限、数据源归属”收拢为一个可校验的值对象，
///   由 [`StreamingManager`](crate::manager::StreamingManager) 在创建缓冲时统一下发；
/// - **契约 (What)**：
///   - `initial_buffer_size > 0`；
///   - 若设置上限，则上限不得小于首桶容量；
///   - `buffer_size_increment == 0` 时缓冲只有一个桶，溢出即报错；
/// - **执行逻辑 (How)**：[`validate`](Self::validate) 在构建缓冲前执行，失败返回
///   [`StreamingError::InvalidConfig`]。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamingConfig {
    #[serde(alias = "initialBufferSize")]
    pub initial_buffer_size: usize,
    #[serde(alias = "bufferSizeIncrement")]
    pub buffer_size_increment: usize,
    #[serde(alias = "maxBufferSize")]
    pub max_buffer_size: BufferLimit,
    #[serde(alias = "sourceOwnership")]
    pub source_ownership: SourceOwnership,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self::for_objects()
    }
}

impl StreamingConfig {
    /// 面向对象流（结果集、消息列表）的默认配置：小步长增长、不设上限。
    pub fn for_objects() -> Self {
        Self {
            initial_buffer_size: DEFAULT_OBJECT_INITIAL,
            buffer_size_increment: DEFAULT_OBJECT_INCREMENT,
            max_buffer_size: BufferLimit::Unbounded,
            source_ownership: SourceOwnership::Owned,
        }
    }

    /// 面向字节流（HTTP 正文、文件）的默认配置：以字节为条目单位，上限 1 MiB。
    pub fn for_bytes() -> Self {
        Self {
            initial_buffer_size: DEFAULT_BYTE_INITIAL,
            buffer_size_increment: DEFAULT_BYTE_INCREMENT,
            max_buffer_size: BufferLimit::Limited(
                NonZeroUsize::new(DEFAULT_BYTE_MAX).unwrap_or(NonZeroUsize::MIN),
            ),
            source_ownership: SourceOwnership::Owned,
        }
    }

    pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }

    pub fn with_buffer_size_increment(mut self, increment: usize) -> Self {
        self.buffer_size_increment = increment;
        self
    }

    pub fn with_max_buffer_size(mut self, limit: BufferLimit) -> Self {
        self.max_buffer_size = limit;
        self
    }

    pub fn with_source_ownership(mut self, ownership: SourceOwnership) -> Self {
        self.source_ownership = ownership;
        self
    }

    /// 校验配置一致性。
    pub fn validate(&self) -> Result<()> {
        if self.initial_buffer_size == 0 {
            return Err(StreamingError::invalid_config(
                "initial_buffer_size must be positive",
            ));
        }
        if let Some(limit) = self.max_buffer_size.get() {
            if limit < self.initial_buffer_size {
                return Err(StreamingError::invalid_config(format!(
                    "max_buffer_size ({limit}) is lower than initial_buffer_size ({})",
                    self.initial_buffer_size
                )));
            }
        }
        Ok(())
    }

    /// 从 TOML 片段解析并校验配置；缺省字段沿用 [`for_objects`](Self::for_objects) 的取值。
    ///
    /// ```rust
    /// use spark_streaming::{BufferLimit, StreamingConfig};
    ///
    /// let config = StreamingConfig::from_toml_str(
    ///     "initialBufferSize = 2\nbufferSizeIncrement = 3\nmaxBufferSize = 5",
    /// )
    /// .expect("合法配置应解析成功");
    /// assert_eq!(config.initial_buffer_size, 2);
    /// assert_eq!(config.max_buffer_size, BufferLimit::limited(5).unwrap());
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: StreamingConfig =
            toml::from_str(raw).map_err(|err| StreamingError::invalid_config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
