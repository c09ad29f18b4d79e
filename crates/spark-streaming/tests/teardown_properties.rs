//! 拆除时机的性质验证
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：对“关闭提供者”与“释放每个游标”这组事件的任意排列，验证拆除恰好发生一次，
//!   并且恰好发生在最后一个事件上，不早也不晚；
//! - **设计手法 (How)**：用 Proptest 生成游标数量与事件的随机排列，按序驱动真实的受管提供者，
//!   每一步之后对照“数据源是否已被关闭”；
//! - **合同 (What)**：
//!   - 输入：`1..=6` 个游标，加一次关闭，随机排列；部分游标以 `Drop` 代替显式释放；
//!   - 断言：最后一个事件之前数据源未被关闭；全部事件之后恰好被关闭一次，统计归零。

#![cfg(not(any(loom, spark_loom)))]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use proptest::prelude::*;
use spark_streaming::{
    BufferedCursorProvider, Cursor, CursorProvider, IterSource, ManagedCursorProvider, Source,
    SourceError, StreamingConfig, StreamingStatistics,
};

/// 事件：关闭提供者，或以某种方式结束第 `n` 个游标。
#[derive(Clone, Copy, Debug)]
enum Event {
    Close,
    Release(usize),
    Drop(usize),
    CloseCursor(usize),
}

struct ClosingProbe {
    inner: IterSource<std::ops::Range<u8>>,
    closes: Arc<AtomicUsize>,
}

impl Source<u8> for ClosingProbe {
    fn pull(&mut self) -> Result<Option<u8>, SourceError> {
        self.inner.pull()
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn event_sequences() -> impl Strategy<Value = (usize, Vec<Event>)> {
    (1usize..=6)
        .prop_flat_map(|cursors| {
            let kinds = prop::collection::vec(0u8..3, cursors);
            (Just(cursors), kinds)
        })
        .prop_flat_map(|(cursors, kinds)| {
            let mut events = vec![Event::Close];
            events.extend(kinds.into_iter().enumerate().map(|(index, kind)| match kind {
                0 => Event::Release(index),
                1 => Event::Drop(index),
                _ => Event::CloseCursor(index),
            }));
            (Just(cursors), Just(events).prop_shuffle())
        })
}

proptest! {
    #[test]
    fn prop_teardown_happens_exactly_on_the_last_event((cursors, events) in event_sequences()) {
        let closes = Arc::new(AtomicUsize::new(0));
        let statistics = Arc::new(StreamingStatistics::new());
        let base = BufferedCursorProvider::from_source(
            ClosingProbe { inner: IterSource::new(0..16), closes: Arc::clone(&closes) },
            &StreamingConfig::default(),
        )
        .expect("默认配置合法");
        let provider = ManagedCursorProvider::new(Arc::new(base), Arc::clone(&statistics));

        let mut open: Vec<Option<Box<dyn Cursor<u8>>>> = (0..cursors)
            .map(|_| Some(provider.open_cursor().expect("签发")))
            .collect();
        prop_assert_eq!(statistics.open_cursors(), cursors);

        let last = events.len() - 1;
        for (step, event) in events.iter().enumerate() {
            prop_assert_eq!(closes.load(Ordering::SeqCst), 0, "第 {} 步之前不应拆除", step);
            match *event {
                Event::Close => provider.close().expect("关闭"),
                Event::Release(index) => {
                    if let Some(cursor) = open[index].as_mut() {
                        cursor.release();
                    }
                }
                Event::Drop(index) => drop(open[index].take()),
                Event::CloseCursor(index) => {
                    if let Some(cursor) = open[index].as_mut() {
                        cursor.close();
                    }
                }
            }
            if step < last {
                prop_assert!(!provider.is_released());
            }
        }

        prop_assert_eq!(closes.load(Ordering::SeqCst), 1);
        prop_assert!(provider.is_released());
        prop_assert_eq!(statistics.open_cursors(), 0);
        prop_assert_eq!(statistics.open_providers(), 0);

        drop(open);
        provider.release_resources().expect("重复释放");
        prop_assert_eq!(closes.load(Ordering::SeqCst), 1, "重复拆除不应再次关闭数据源");
    }
}
