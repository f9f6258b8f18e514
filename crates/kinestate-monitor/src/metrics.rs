//! 监视器运行指标
//!
//! 零开销的原子计数器，可在任何线程安全读取，不会引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 监视器实时指标
///
/// # 使用示例
///
/// ```rust
/// use kinestate_monitor::MonitorMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = MonitorMetrics::new();
/// metrics.batches_received.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.batches_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct MonitorMetrics {
    /// 收到的关节状态批次总数
    pub batches_received: AtomicU64,

    /// 因形状不一致被拒绝的批次数
    pub batches_rejected: AtomicU64,

    /// 处理完毕的批次数（合并、回调与唤醒都已结束，含被拒绝的批次）
    pub batches_processed: AtomicU64,

    /// 被接受的单变量关节条目数（含未变化的条目）
    pub joint_updates: AtomicU64,

    /// 产生真实数值变化的合并次数（位置批次 + 变换刷新）
    pub value_changes: AtomicU64,

    /// 被接受的多自由度关节变换数
    pub transform_updates: AtomicU64,

    /// 变换查询失败次数
    pub transform_failures: AtomicU64,

    /// 因过期被丢弃的变换数
    pub stale_transforms: AtomicU64,

    /// 回调调用总次数（每个回调计一次）
    pub callbacks_fired: AtomicU64,
}

impl MonitorMetrics {
    /// 创建新的指标实例（所有计数器初始化为 0）
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取指标快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            batches_rejected: self.batches_rejected.load(Ordering::Relaxed),
            batches_processed: self.batches_processed.load(Ordering::Acquire),
            joint_updates: self.joint_updates.load(Ordering::Relaxed),
            value_changes: self.value_changes.load(Ordering::Relaxed),
            transform_updates: self.transform_updates.load(Ordering::Relaxed),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
            stale_transforms: self.stale_transforms.load(Ordering::Relaxed),
            callbacks_fired: self.callbacks_fired.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.batches_received.store(0, Ordering::Relaxed);
        self.batches_rejected.store(0, Ordering::Relaxed);
        self.batches_processed.store(0, Ordering::Relaxed);
        self.joint_updates.store(0, Ordering::Relaxed);
        self.value_changes.store(0, Ordering::Relaxed);
        self.transform_updates.store(0, Ordering::Relaxed);
        self.transform_failures.store(0, Ordering::Relaxed);
        self.stale_transforms.store(0, Ordering::Relaxed);
        self.callbacks_fired.store(0, Ordering::Relaxed);
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// 收到的关节状态批次总数
    pub batches_received: u64,
    /// 被拒绝的批次数
    pub batches_rejected: u64,
    /// 处理完毕的批次数
    pub batches_processed: u64,
    /// 被接受的关节条目数
    pub joint_updates: u64,
    /// 产生真实变化的合并次数
    pub value_changes: u64,
    /// 被接受的变换数
    pub transform_updates: u64,
    /// 变换查询失败次数
    pub transform_failures: u64,
    /// 过期变换数
    pub stale_transforms: u64,
    /// 回调调用总次数
    pub callbacks_fired: u64,
}

impl MetricsSnapshot {
    /// 批次拒绝率（0.0 ~ 1.0）
    pub fn rejection_rate(&self) -> f64 {
        if self.batches_received == 0 {
            0.0
        } else {
            self.batches_rejected as f64 / self.batches_received as f64
        }
    }
}
