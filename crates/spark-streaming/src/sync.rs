//! 同步原语的条件切换层。
//!
//! 教案级说明：启用 `--cfg loom`（或 `--cfg spark_loom`）时，生命周期相关的原子量与互斥锁
//! 切换到 Loom 提供的实现，使模型检查能够穷举 `close` / `release_cursor` 的调度交错；
//! 常规构建沿用 `core` 原子与 `spin::Mutex`。`Arc` 始终保持标准实现。

#[cfg(not(any(loom, spark_loom)))]
pub(crate) use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
#[cfg(any(loom, spark_loom))]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(not(any(loom, spark_loom)))]
pub(crate) type Mutex<T> = spin::Mutex<T>;
#[cfg(any(loom, spark_loom))]
pub(crate) type Mutex<T> = loom::sync::Mutex<T>;

#[cfg(not(any(loom, spark_loom)))]
pub(crate) type MutexGuard<'a, T> = spin::MutexGuard<'a, T>;
#[cfg(any(loom, spark_loom))]
pub(crate) type MutexGuard<'a, T> = loom::sync::MutexGuard<'a, T>;

/// 统一加锁入口，屏蔽 `spin` 与 `loom` 在返回类型上的差异。
#[cfg(not(any(loom, spark_loom)))]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock()
}

/// Loom 互斥锁不会因 panic 中毒以外的原因失败；中毒时沿用内部值继续清理。
#[cfg(any(loom, spark_loom))]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// 饱和递减，避免统计在竞态下出现回绕。
pub(crate) fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
        Some(current.saturating_sub(value))
    });
}
