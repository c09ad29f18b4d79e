use serde::Serialize;

use crate::sync::{AtomicUsize, Ordering, saturating_sub};

/// `StreamingStatistics` 记录当前仍处于打开状态的游标提供者与游标数量。
///
/// # 模块角色（Why）
/// - 作为运维监控的只读观测面，帮助值班人员发现“游标未释放”“提供者未关闭”等泄漏征兆；
/// - 由 [`CursorJanitor`](crate::janitor::CursorJanitor) 与
///   [`StreamingManager`](crate::manager::StreamingManager) 共享写入，外部仅能读取快照。
///
/// # 核心机制（How）
/// - 两个计数均为原子整数，递增使用 `fetch_add`，递减使用饱和更新，
///   即便强制回收与迟到的游标释放交错，也不会回绕成超大值。
///
/// # 契约说明（What）
/// - **线程安全**：`Send + Sync`，可放入 `Arc` 在任意线程更新；
/// - **后置条件**：[`snapshot`](Self::snapshot) 返回的两个字段各自一致，但彼此之间不保证原子快照。
#[derive(Debug)]
pub struct StreamingStatistics {
    open_providers: AtomicUsize,
    open_cursors: AtomicUsize,
}

impl Default for StreamingStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingStatistics {
    /// 创建全零的统计实例。
    pub fn new() -> Self {
        Self {
            open_providers: AtomicUsize::new(0),
            open_cursors: AtomicUsize::new(0),
        }
    }

    pub fn open_providers(&self) -> usize {
        self.open_providers.load(Ordering::SeqCst)
    }

    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// 生成可序列化的只读快照。
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            open_providers: self.open_providers(),
            open_cursors: self.open_cursors(),
        }
    }

    pub(crate) fn increment_open_providers(&self) {
        self.open_providers.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decrement_open_providers(&self) {
        saturating_sub(&self.open_providers, 1);
    }

    pub(crate) fn increment_open_cursors(&self) {
        self.open_cursors.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decrement_open_cursors(&self, count: usize) {
        if count > 0 {
            saturating_sub(&self.open_cursors, count);
        }
    }
}

/// 统计快照，供指标导出或调试输出使用。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub open_providers: usize,
    pub open_cursors: usize,
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;

    #[test]
    fn decrement_saturates_at_zero() {
        let stats = StreamingStatistics::new();
        stats.increment_open_cursors();
        stats.decrement_open_cursors(3);
        assert_eq!(stats.open_cursors(), 0, "饱和递减不应回绕");
        stats.decrement_open_providers();
        assert_eq!(stats.open_providers(), 0);
    }

    #[test]
    fn snapshot_reflects_counters() {
        let stats = StreamingStatistics::new();
        stats.increment_open_providers();
        stats.increment_open_cursors();
        stats.increment_open_cursors();
        assert_eq!(
            stats.snapshot(),
            StatisticsSnapshot {
                open_providers: 1,
                open_cursors: 2,
            }
        );
    }
}
