//! 进程内关节状态总线

use super::{JointStateSource, JointStateUpdate};
use crate::config::DROP_LOG_INTERVAL;
use crate::error::MonitorError;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{trace, warn};

/// 进程内关节状态总线
///
/// 按话题扇出批次到所有订阅者。话题名称统一解析为以 `/` 开头的形式，
/// 因此 `"joint_states"` 与 `"/joint_states"` 是同一个话题。
///
/// # 示例
///
/// ```
/// use kinestate_monitor::{JointStateBus, JointStateSource, JointStateUpdate};
/// use kinestate_model::Timestamp;
///
/// let bus = JointStateBus::new();
/// let rx = bus.subscribe("joint_states").unwrap();
/// let delivered = bus.publish("/joint_states", JointStateUpdate::new(Timestamp::ZERO).with_joint("a", 1.0));
/// assert_eq!(delivered, 1);
/// assert_eq!(rx.try_recv().unwrap().positions, vec![1.0]);
/// ```
pub struct JointStateBus {
    topics: Mutex<HashMap<String, Vec<Sender<Arc<JointStateUpdate>>>>>,
    /// 每个订阅者的队列容量（`None` 为无界）
    capacity: Option<usize>,
    /// 因队列满被丢弃的投递次数
    dropped: AtomicU64,
    /// 上一次丢弃警告的时间（日志节流）
    last_drop_log: Mutex<Option<Instant>>,
}

impl JointStateBus {
    /// 创建无界总线
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: None,
            dropped: AtomicU64::new(0),
            last_drop_log: Mutex::new(None),
        }
    }

    /// 创建有界总线（订阅者队列满时丢弃新批次）
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::new()
        }
    }

    /// 发布批次，返回成功投递的订阅者数量
    ///
    /// 已断开的订阅者会被移除。队列满的订阅者错过这一批次，
    /// 警告日志每秒最多一条（附带累计丢弃数）。
    pub fn publish(&self, topic: &str, update: JointStateUpdate) -> usize {
        let topic = resolve(topic);
        let update = Arc::new(update);
        let mut topics = self.topics.lock();
        let Some(subscribers) = topics.get_mut(&topic) else {
            trace!("No subscribers on {}", topic);
            return 0;
        };

        let mut delivered = 0;
        let mut full = 0;
        subscribers.retain(|tx| match tx.try_send(update.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            },
            Err(TrySendError::Full(_)) => {
                full += 1;
                true
            },
            Err(TrySendError::Disconnected(_)) => false,
        });
        drop(topics);

        if full > 0 {
            let total = self.dropped.fetch_add(full, Ordering::Relaxed) + full;
            if self.should_log_drop(Instant::now()) {
                warn!("Subscriber queue full on {}, dropping batch ({} dropped so far)", topic, total);
            } else {
                trace!("Subscriber queue full on {}, batch dropped (log throttled)", topic);
            }
        }
        delivered
    }

    /// 因订阅者队列满而丢弃的投递总数
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn should_log_drop(&self, now: Instant) -> bool {
        let mut last = self.last_drop_log.lock();
        if last.is_none_or(|t| now.duration_since(t) >= DROP_LOG_INTERVAL) {
            *last = Some(now);
            true
        } else {
            false
        }
    }

    /// 话题已登记的订阅者数量（断开的订阅者在下一次发布时移除）
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.lock().get(&resolve(topic)).map_or(0, Vec::len)
    }

    /// 关闭话题（所有订阅者收到 `Disconnected`）
    pub fn close(&self, topic: &str) {
        self.topics.lock().remove(&resolve(topic));
    }
}

impl Default for JointStateBus {
    fn default() -> Self {
        Self::new()
    }
}

impl JointStateSource for JointStateBus {
    fn subscribe(&self, topic: &str) -> Result<Receiver<Arc<JointStateUpdate>>, MonitorError> {
        if topic.trim().is_empty() {
            return Err(MonitorError::EmptyTopic);
        }
        let (tx, rx) = match self.capacity {
            Some(cap) => crossbeam_channel::bounded(cap),
            None => crossbeam_channel::unbounded(),
        };
        self.topics.lock().entry(resolve(topic)).or_default().push(tx);
        Ok(rx)
    }

    fn resolve_topic(&self, topic: &str) -> String {
        resolve(topic)
    }
}

fn resolve(topic: &str) -> String {
    let topic = topic.trim();
    if topic.starts_with('/') {
        topic.to_string()
    } else {
        format!("/{}", topic)
    }
}
