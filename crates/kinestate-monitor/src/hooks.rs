//! 状态更新回调
//!
//! 回调在快照真实变化后、唤醒等待者之前被同步调用。
//! 回调列表存放在 `ArcSwap` 中：触发时取一份列表快照并在所有锁之外执行，
//! 所以回调内部可以安全地读取监视器、注册或清空回调。
//!
//! # 使用示例
//!
//! ```rust
//! use kinestate_monitor::{HookManager, JointStateUpdate, StateUpdateCallback};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let hooks = HookManager::new();
//! let count = Arc::new(AtomicUsize::new(0));
//!
//! let counter = count.clone();
//! hooks.add_callback(Arc::new(move |_: &JointStateUpdate| {
//!     counter.fetch_add(1, Ordering::Relaxed);
//! }));
//!
//! hooks.trigger_all(&JointStateUpdate::empty());
//! assert_eq!(count.load(Ordering::Relaxed), 1);
//! ```

use crate::feeds::JointStateUpdate;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// 状态更新回调
///
/// 参数是触发这次变化的批次；变换刷新触发时为空批次。
/// 实现应当快速返回：回调执行期间，等待者尚未被唤醒。
pub trait StateUpdateCallback: Send + Sync {
    /// 快照发生真实变化后调用
    fn on_state_update(&self, update: &JointStateUpdate);
}

impl<F> StateUpdateCallback for F
where
    F: Fn(&JointStateUpdate) + Send + Sync,
{
    fn on_state_update(&self, update: &JointStateUpdate) {
        self(update)
    }
}

/// 回调管理器
pub struct HookManager {
    callbacks: ArcSwap<Vec<Arc<dyn StateUpdateCallback>>>,
}

impl HookManager {
    /// 创建空的回调管理器
    pub fn new() -> Self {
        Self {
            callbacks: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// 注册回调（按注册顺序调用）
    pub fn add_callback(&self, callback: Arc<dyn StateUpdateCallback>) {
        self.callbacks.rcu(|current| {
            let mut next: Vec<_> = current.iter().cloned().collect();
            next.push(callback.clone());
            next
        });
    }

    /// 清空所有回调
    pub fn clear(&self) {
        self.callbacks.store(Arc::new(Vec::new()));
    }

    /// 依次触发所有回调，返回调用数量
    ///
    /// 触发期间注册的回调从下一次触发开始生效。
    pub fn trigger_all(&self, update: &JointStateUpdate) -> usize {
        let callbacks = self.callbacks.load_full();
        for callback in callbacks.iter() {
            callback.on_state_update(update);
        }
        callbacks.len()
    }

    /// 已注册回调数量
    pub fn len(&self) -> usize {
        self.callbacks.load().len()
    }

    /// 是否没有回调
    pub fn is_empty(&self) -> bool {
        self.callbacks.load().is_empty()
    }
}

impl Default for HookManager {
    fn default() -> Self {
        Self::new()
    }
}
