use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use super::position::Position;

/// `Bucket` 是固定容量、只追加的条目分段。
///
/// # 结构设计（How）
/// - `slots` 在创建时按容量一次性分配，之后永不调整大小；每个槽位是写一次的 `OnceLock`；
/// - `filled` 以 Release 语义在写入槽位之后推进，读取方以 Acquire 语义观察，
///   因此已填充的槽位可以在不加锁的情况下并发读取；
/// - 写入只发生在 [`StreamBuffer`](super::StreamBuffer) 的填充互斥区内，保证同一时刻只有一个写者。
///
/// # 契约说明（What）
/// - `filled` 单调递增；当 `filled == capacity` 后桶不再变化；
/// - [`get`](Self::get) 从不 panic，“尚未填充”与“越界”统一折叠为 `None`。
pub struct Bucket<T> {
    index: usize,
    slots: Box<[OnceLock<T>]>,
    filled: AtomicUsize,
}

impl<T> Bucket<T> {
    pub(crate) fn new(index: usize, capacity: usize) -> Self {
        let slots = (0..capacity).map(|_| OnceLock::new()).collect();
        Self {
            index,
            slots,
            filled: AtomicUsize::new(0),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn filled(&self) -> usize {
        self.filled.load(Ordering::Acquire)
    }

    pub fn is_full(&self) -> bool {
        self.filled() == self.capacity()
    }

    /// 判断地址是否落在本桶且已被填充。
    pub fn contains(&self, position: Position) -> bool {
        position.bucket_index == self.index && position.item_index < self.filled()
    }

    /// 读取桶内偏移处的条目。
    pub fn get(&self, item_index: usize) -> Option<&T> {
        if item_index >= self.filled() {
            return None;
        }
        self.slots.get(item_index).and_then(OnceLock::get)
    }

    /// 追加一个条目；桶已满时原样退回。
    ///
    /// 调用方必须持有缓冲的填充锁。
    pub(crate) fn push(&self, item: T) -> Result<(), T> {
        let at = self.filled.load(Ordering::Relaxed);
        let Some(slot) = self.slots.get(at) else {
            return Err(item);
        };
        slot.set(item)?;
        self.filled.store(at + 1, Ordering::Release);
        Ok(())
    }
}

impl<T> core::fmt::Debug for Bucket<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Bucket")
            .field("index", &self.index)
            .field("capacity", &self.capacity())
            .field("filled", &self.filled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_until_full_then_rejects() {
        let bucket = Bucket::new(1, 2);
        assert!(bucket.push("a").is_ok());
        assert!(bucket.push("b").is_ok());
        assert!(bucket.is_full());
        assert_eq!(bucket.push("c"), Err("c"), "满桶应退回条目");
        assert_eq!(bucket.get(1), Some(&"b"));
    }

    #[test]
    fn get_folds_unfilled_and_out_of_range_into_none() {
        let bucket = Bucket::new(0, 4);
        bucket.push(7u32).expect("空桶可写入");
        assert_eq!(bucket.get(0), Some(&7));
        assert_eq!(bucket.get(1), None, "尚未填充");
        assert_eq!(bucket.get(99), None, "超出声明容量");
    }

    #[test]
    fn contains_checks_bucket_index_and_fill_level() {
        let bucket = Bucket::new(2, 3);
        bucket.push(1u8).expect("写入");
        assert!(bucket.contains(Position::new(2, 0)));
        assert!(!bucket.contains(Position::new(2, 1)));
        assert!(!bucket.contains(Position::new(1, 0)));
    }
}
