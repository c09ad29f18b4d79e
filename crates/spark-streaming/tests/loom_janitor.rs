#![cfg(any(loom, spark_loom))]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use loom::{model, thread};
use spark_streaming::{
    Cursor, CursorProvider, ManagedCursorProvider, ProviderId, Result, StreamingError,
    StreamingStatistics,
};

/// 只记录拆除次数的探针提供者；签发的游标不读取任何数据。
struct ProbeProvider {
    id: ProviderId,
    releases: AtomicUsize,
}

impl ProbeProvider {
    fn new() -> Self {
        Self {
            id: ProviderId::next(),
            releases: AtomicUsize::new(0),
        }
    }
}

struct IdleCursor {
    provider_id: ProviderId,
    released: bool,
}

impl Cursor<u8> for IdleCursor {
    fn has_next(&self) -> Result<bool> {
        Ok(false)
    }

    fn next(&mut self) -> Result<u8> {
        Err(StreamingError::EndOfData { position: 0 })
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn close(&mut self) {}

    fn position(&self) -> usize {
        0
    }

    fn seek(&mut self, _position: usize) -> Result<()> {
        Ok(())
    }

    fn size(&self) -> Option<usize> {
        Some(0)
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn provider_id(&self) -> ProviderId {
        self.provider_id
    }
}

impl CursorProvider<u8> for ProbeProvider {
    fn open_cursor(&self) -> Result<Box<dyn Cursor<u8>>> {
        Ok(Box::new(IdleCursor {
            provider_id: self.id,
            released: false,
        }))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn release_resources(&self) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }

    fn id(&self) -> ProviderId {
        self.id
    }
}

#[test]
fn close_racing_last_cursor_release_tears_down_once() {
    //
    // 教案级说明：关闭提供者与释放最后一个游标分别发生在两个线程上。
    // - **Why**：两个条件各自只观察到自己那一半时，拆除会被遗漏；都观察到时，拆除可能重复；
    // - **How**：Loom 穷举两线程的调度，`close` 先置位再读计数，`release_cursor` 先递减再读标记；
    // - **What**：任意交错下被装饰者的 `release_resources` 恰好被调用一次。
    model(|| {
        let probe = Arc::new(ProbeProvider::new());
        let statistics = Arc::new(StreamingStatistics::new());
        let provider = Arc::new(ManagedCursorProvider::new(
            Arc::clone(&probe) as Arc<dyn CursorProvider<u8>>,
            statistics,
        ));
        let cursor = provider.open_cursor().expect("签发游标");

        let closer = {
            let provider = Arc::clone(&provider);
            thread::spawn(move || provider.close().expect("关闭"))
        };
        let releaser = thread::spawn(move || drop(cursor));

        closer.join().expect("关闭线程不应 panic");
        releaser.join().expect("释放线程不应 panic");

        assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
        assert!(provider.is_released());
    });
}

#[test]
fn concurrent_close_and_forced_release_have_a_single_effect() {
    model(|| {
        let probe = Arc::new(ProbeProvider::new());
        let provider = Arc::new(ManagedCursorProvider::new(
            Arc::clone(&probe) as Arc<dyn CursorProvider<u8>>,
            Arc::new(StreamingStatistics::new()),
        ));

        let closer = {
            let provider = Arc::clone(&provider);
            thread::spawn(move || provider.close().expect("关闭"))
        };
        let releaser = {
            let provider = Arc::clone(&provider);
            thread::spawn(move || provider.release_resources().expect("释放"))
        };

        closer.join().expect("关闭线程不应 panic");
        releaser.join().expect("释放线程不应 panic");

        assert_eq!(probe.releases.load(Ordering::SeqCst), 1);
    });
}
