// ==========================================
// 表格批量导入服务 - 进度推送
// ==========================================
// 职责: 编排器 → 传输层 的单向事件通道
// 约束:
// - 推送永不阻塞、永不向流程返回错误
// - 调用方断开后推送变为空操作，仅记录一次 warn
// - 事件按产生顺序送达（单一生产者顺序写入）
// ==========================================

use crate::domain::progress::ProgressEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::warn;

pub struct ProgressEmitter {
    tx: UnboundedSender<ProgressEvent>,
    detached: AtomicBool,
}

/// 创建一对推送端 / 接收端
pub fn progress_channel() -> (ProgressEmitter, UnboundedReceiver<ProgressEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ProgressEmitter::new(tx), rx)
}

impl ProgressEmitter {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self {
            tx,
            detached: AtomicBool::new(false),
        }
    }

    /// 推送一个事件（尽力而为）
    pub fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() && !self.detached.swap(true, Ordering::Relaxed) {
            warn!("进度接收端已断开，后续事件将被丢弃");
        }
    }

    /// 调用方是否已断开
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Relaxed) || self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ImportState;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (emitter, mut rx) = progress_channel();
        emitter.emit(ProgressEvent::phase(ImportState::Init, "a"));
        emitter.emit(ProgressEvent::phase(ImportState::CacheReady, "b"));
        drop(emitter);

        let mut phases = Vec::new();
        while let Some(ProgressEvent::PhaseMarker { phase, .. }) = rx.recv().await {
            phases.push(phase);
        }
        assert_eq!(phases, vec![ImportState::Init, ImportState::CacheReady]);
    }

    #[test]
    fn test_disconnected_receiver_is_swallowed() {
        let (emitter, rx) = progress_channel();
        assert!(!emitter.is_detached());
        drop(rx);

        assert!(emitter.is_detached());
        emitter.emit(ProgressEvent::Error {
            message: "x".into(),
        });
        emitter.emit(ProgressEvent::Error {
            message: "y".into(),
        });
        assert!(emitter.detached.load(Ordering::Relaxed));
    }
}
