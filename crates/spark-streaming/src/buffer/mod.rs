//! 分桶流式缓冲。
//!
//! - [`position`]：全局偏移与 `(桶, 槽位)` 地址之间的纯函数映射；
//! - [`bucket`]：固定容量、只追加的条目分段；
//! - [`stream_buffer`]：持有桶列表、按需从数据源拉取并约束最大物化量的共享缓冲。

pub mod bucket;
pub mod position;
pub mod stream_buffer;

pub use bucket::Bucket;
pub use position::{Position, PositionMapper};
pub use stream_buffer::StreamBuffer;
