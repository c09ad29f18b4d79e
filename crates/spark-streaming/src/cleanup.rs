//! 尽力而为的清理结果。
//!
//! # 教案式说明
//! - **意图 (Why)**：关闭与释放发生在拆除路径上，任何一步失败都不能阻止兄弟游标、
//!   兄弟提供者或缓冲本身的回收；因此清理故障不向上传播，而是记录日志并汇总到 [`CleanupReport`]；
//! - **逻辑 (How)**：[`best_effort`] 同时捕获 `Err` 与 panic，逐条写入 `tracing::warn!`；
//! - **契约 (What)**：调用方可以检查报告以做监控或测试断言，但不需要处理它。

use std::{
    any::Any,
    fmt,
    panic::{self, AssertUnwindSafe},
};

use tracing::warn;

use crate::{error::Result, provider::ProviderId};

/// 清理发生在哪个步骤。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CleanupStage {
    CloseProvider,
    ReleaseProvider,
    ReleaseCursor,
}

impl fmt::Display for CleanupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CleanupStage::CloseProvider => "close_provider",
            CleanupStage::ReleaseProvider => "release_provider",
            CleanupStage::ReleaseCursor => "release_cursor",
        })
    }
}

/// 一次被吞下并记录的清理故障。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CleanupFault {
    pub provider_id: ProviderId,
    pub stage: CleanupStage,
    pub detail: String,
}

/// 清理动作的汇总结果。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    performed: bool,
    faults: Vec<CleanupFault>,
}

impl CleanupReport {
    /// 本次调用未执行清理（已被其它调用方抢先完成）。
    pub fn skipped() -> Self {
        Self::default()
    }

    pub(crate) fn performed() -> Self {
        Self {
            performed: true,
            faults: Vec::new(),
        }
    }

    /// 是否由本次调用实际执行了清理。
    pub fn is_performed(&self) -> bool {
        self.performed
    }

    pub fn faults(&self) -> &[CleanupFault] {
        &self.faults
    }

    /// 没有记录任何故障。
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }

    /// 合并另一份报告，用于批量释放。
    pub fn merge(&mut self, other: CleanupReport) {
        self.performed |= other.performed;
        self.faults.extend(other.faults);
    }

    pub(crate) fn record(&mut self, fault: CleanupFault) {
        warn!(
            provider_id = %fault.provider_id,
            stage = %fault.stage,
            detail = %fault.detail,
            "streaming cleanup fault swallowed"
        );
        self.faults.push(fault);
    }
}

/// 执行一个清理步骤，错误与 panic 均被记录而不传播。
pub(crate) fn best_effort<F>(
    report: &mut CleanupReport,
    provider_id: ProviderId,
    stage: CleanupStage,
    step: F,
) where
    F: FnOnce() -> Result<()>,
{
    let detail = match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(())) => return,
        Ok(Err(err)) => err.to_string(),
        Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
    };
    report.record(CleanupFault {
        provider_id,
        stage,
        detail,
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamingError;

    #[test]
    fn best_effort_records_errors_and_panics() {
        let id = ProviderId::next();
        let mut report = CleanupReport::performed();
        best_effort(&mut report, id, CleanupStage::CloseProvider, || Ok(()));
        best_effort(&mut report, id, CleanupStage::CloseProvider, || {
            Err(StreamingError::BufferClosed)
        });
        best_effort(&mut report, id, CleanupStage::ReleaseProvider, || {
            panic!("source handle vanished")
        });

        assert!(report.is_performed());
        assert_eq!(report.faults().len(), 2);
        assert_eq!(report.faults()[0].stage, CleanupStage::CloseProvider);
        assert!(report.faults()[1].detail.contains("source handle vanished"));
    }

    #[test]
    fn merge_accumulates_faults() {
        let id = ProviderId::next();
        let mut total = CleanupReport::skipped();
        let mut failing = CleanupReport::performed();
        failing.record(CleanupFault {
            provider_id: id,
            stage: CleanupStage::ReleaseCursor,
            detail: "boom".into(),
        });
        total.merge(failing);
        assert!(total.is_performed());
        assert!(!total.is_clean());
    }
}
