//! 进程内变换缓冲区

use super::{TransformProvider, TransformStamped};
use crate::error::TransformError;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use kinestate_model::Timestamp;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};

/// 每个坐标系对默认保留的历史条数
pub const DEFAULT_HISTORY: usize = 100;

type FramePair = (String, String);

#[derive(Default)]
struct BufferInner {
    /// 动态变换历史（按时间戳升序）
    dynamic: HashMap<FramePair, VecDeque<TransformStamped>>,
    /// 静态变换（时间戳为 `Timestamp::ZERO`，对任意查询时间有效）
    fixed: HashMap<FramePair, TransformStamped>,
}

/// 进程内变换缓冲区
///
/// 按 `(parent, child)` 保存有界历史；查询返回时间不晚于请求时间的最新变换。
/// 静态变换单独保存，优先于动态历史返回。
/// 每次 [`set_transform`](Self::set_transform) 之后向所有订阅者推送一次变化通知。
pub struct TransformBuffer {
    inner: RwLock<BufferInner>,
    listeners: Mutex<Vec<Sender<()>>>,
    history: usize,
}

impl TransformBuffer {
    /// 创建缓冲区
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    /// 创建指定历史长度的缓冲区
    pub fn with_history(history: usize) -> Self {
        Self {
            inner: RwLock::new(BufferInner::default()),
            listeners: Mutex::new(Vec::new()),
            history: history.max(1),
        }
    }

    /// 写入变换并通知订阅者
    pub fn set_transform(&self, transform: TransformStamped) {
        {
            let mut inner = self.inner.write();
            let key = (transform.parent.clone(), transform.child.clone());
            if transform.is_static() {
                inner.fixed.insert(key, transform);
            } else {
                let history = inner.dynamic.entry(key).or_default();
                // 乱序到达时按时间戳插入
                let pos = history.partition_point(|t| t.stamp <= transform.stamp);
                history.insert(pos, transform);
                while history.len() > self.history {
                    history.pop_front();
                }
            }
        }
        self.notify();
    }

    /// 清空所有变换（订阅者保持不变）
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.dynamic.clear();
        inner.fixed.clear();
    }

    /// 已知坐标系对的数量
    pub fn frame_pair_count(&self) -> usize {
        let inner = self.inner.read();
        inner.dynamic.len() + inner.fixed.keys().filter(|k| !inner.dynamic.contains_key(*k)).count()
    }

    fn notify(&self) {
        // 容量为 1 的通道：未消费的通知被合并
        self.listeners
            .lock()
            .retain(|tx| !matches!(tx.try_send(()), Err(TrySendError::Disconnected(_))));
    }
}

impl Default for TransformBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformProvider for TransformBuffer {
    fn lookup_transform(
        &self,
        parent: &str,
        child: &str,
        at: Timestamp,
    ) -> Result<TransformStamped, TransformError> {
        let inner = self.inner.read();
        let key = (parent.to_string(), child.to_string());

        if let Some(fixed) = inner.fixed.get(&key) {
            return Ok(fixed.clone());
        }

        let history = inner.dynamic.get(&key).ok_or_else(|| TransformError::NotFound {
            parent: parent.to_string(),
            child: child.to_string(),
        })?;

        history
            .iter()
            .rev()
            .find(|t| t.stamp <= at)
            .cloned()
            .ok_or_else(|| TransformError::TooEarly {
                parent: parent.to_string(),
                child: child.to_string(),
                at,
                earliest: history.front().map_or(Timestamp::ZERO, |t| t.stamp),
            })
    }

    fn subscribe_changes(&self) -> Receiver<()> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.listeners.lock().push(tx);
        rx
    }
}
