use core::fmt;

/// 全局流偏移映射出的 `(桶序号, 桶内偏移)` 地址。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub bucket_index: usize,
    pub item_index: usize,
}

impl Position {
    pub const fn new(bucket_index: usize, item_index: usize) -> Self {
        Self {
            bucket_index,
            item_index,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.bucket_index, self.item_index)
    }
}

/// `PositionMapper` 是全局偏移到桶地址的纯函数。
///
/// # 设计背景（Why）
/// - 桶按“首桶 `initial`、后续每桶 `increment`”顺序分配，地址完全由配置决定；
///   因此无需为每个条目存储坐标，也不依赖调用顺序或线程。
///
/// # 逻辑解析（How）
/// - `global < initial` → `(0, global)`；
/// - 否则 `offset = global - initial`，`bucket = offset / increment + 1`，
///   `item = global - (initial + (bucket - 1) * increment)`；
/// - `increment == 0` 表示不增长，超出首桶的偏移没有合法地址，返回 `None`。
///
/// # 契约说明（What）
/// - 对任意合法配置，映射是单射且与顺序分桶一致：相邻偏移要么同桶相邻，要么跨入下一个桶的 0 号槽。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PositionMapper {
    initial: usize,
    increment: usize,
}

impl PositionMapper {
    pub const fn new(initial: usize, increment: usize) -> Self {
        Self { initial, increment }
    }

    pub const fn initial(&self) -> usize {
        self.initial
    }

    pub const fn increment(&self) -> usize {
        self.increment
    }

    pub const fn grows(&self) -> bool {
        self.increment > 0
    }

    /// 计算全局偏移对应的桶地址。
    pub fn to_position(&self, global: usize) -> Option<Position> {
        if global < self.initial {
            return Some(Position::new(0, global));
        }
        if self.increment == 0 {
            return None;
        }
        let offset = global - self.initial;
        let bucket_index = offset / self.increment + 1;
        let item_index = global - (self.initial + (bucket_index - 1) * self.increment);
        Some(Position::new(bucket_index, item_index))
    }

    /// 指定桶的容量。
    pub fn capacity_of(&self, bucket_index: usize) -> usize {
        if bucket_index == 0 {
            self.initial
        } else {
            self.increment
        }
    }

    /// 指定桶首个条目的全局偏移。
    pub fn bucket_start(&self, bucket_index: usize) -> usize {
        if bucket_index == 0 {
            0
        } else {
            self.initial + (bucket_index - 1) * self.increment
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn maps_documented_example() {
        let mapper = PositionMapper::new(2, 3);
        let expected = [(0, 0), (0, 1), (1, 0), (1, 1), (1, 2), (2, 0)];
        for (global, (bucket, item)) in expected.into_iter().enumerate() {
            assert_eq!(
                mapper.to_position(global),
                Some(Position::new(bucket, item)),
                "偏移 {global} 的映射不符合顺序分桶"
            );
        }
    }

    #[test]
    fn zero_increment_has_no_overflow_address() {
        let mapper = PositionMapper::new(4, 0);
        assert_eq!(mapper.to_position(3), Some(Position::new(0, 3)));
        assert_eq!(mapper.to_position(4), None);
    }

    proptest! {
        #[test]
        fn prop_mapping_is_sequential_and_injective(
            initial in 1usize..64,
            increment in 1usize..64,
            global in 0usize..10_000,
        ) {
            let mapper = PositionMapper::new(initial, increment);
            let here = mapper.to_position(global).expect("增长配置下任意偏移均有地址");
            let next = mapper.to_position(global + 1).expect("增长配置下任意偏移均有地址");

            prop_assert!(here.item_index < mapper.capacity_of(here.bucket_index));
            prop_assert_eq!(mapper.bucket_start(here.bucket_index) + here.item_index, global);
            if next.bucket_index == here.bucket_index {
                prop_assert_eq!(next.item_index, here.item_index + 1);
            } else {
                prop_assert_eq!(next.bucket_index, here.bucket_index + 1);
                prop_assert_eq!(next.item_index, 0);
                prop_assert_eq!(here.item_index + 1, mapper.capacity_of(here.bucket_index));
            }
        }
    }
}
