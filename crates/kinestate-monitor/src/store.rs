//! 快照存储
//!
//! 一个互斥锁保护三样东西：当前快照、每关节的新鲜度表、快照时间。
//! 合并在锁内完成，读取在锁内整体复制，因此读者永远看不到半合并的批次。
//! 等待者通过条件变量阻塞，只在合并接受了至少一个条目之后被唤醒。

use crate::state::KinematicState;
use kinestate_model::{JointIndex, RobotModel, Timestamp};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 锁内数据
#[derive(Debug)]
pub(crate) struct StoreInner {
    /// 当前快照
    pub(crate) state: KinematicState,
    /// 关节最后一次被接受的观测时间
    pub(crate) joint_time: HashMap<JointIndex, Timestamp>,
    /// 快照时间（所有被接受观测时间的最大值）
    pub(crate) state_time: Timestamp,
}

impl StoreInner {
    /// 记录关节新鲜度
    ///
    /// 关节时间与快照时间都只前进不后退：乱序到达的旧批次和静态变换
    /// 仍会写入数值，但不会让新鲜度倒退。
    pub(crate) fn record_freshness(&mut self, index: JointIndex, stamp: Timestamp) {
        let seen = self.joint_time.entry(index).or_insert(stamp);
        if stamp > *seen {
            *seen = stamp;
        }
        if stamp > self.state_time {
            self.state_time = stamp;
        }
    }
}

/// 快照存储
pub struct SnapshotStore {
    inner: Mutex<StoreInner>,
    updated: Condvar,
}

impl SnapshotStore {
    /// 创建存储（快照为模型默认值，新鲜度表为空）
    pub fn new(model: Arc<RobotModel>) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                state: KinematicState::new(model),
                joint_time: HashMap::new(),
                state_time: Timestamp::ZERO,
            }),
            updated: Condvar::new(),
        }
    }

    /// 读取快照与快照时间（同一把锁下取得，互相一致）
    pub fn read(&self) -> (KinematicState, Timestamp) {
        let inner = self.inner.lock();
        (inner.state.clone(), inner.state_time)
    }

    /// 读取快照时间
    pub fn state_time(&self) -> Timestamp {
        self.inner.lock().state_time
    }

    /// 关节最后一次被接受的观测时间
    pub fn joint_time(&self, index: JointIndex) -> Option<Timestamp> {
        self.inner.lock().joint_time.get(&index).copied()
    }

    /// 新鲜度表副本（关节名 -> 时间）
    pub fn freshness(&self) -> BTreeMap<String, Timestamp> {
        let inner = self.inner.lock();
        let model = inner.state.model().clone();
        inner
            .joint_time
            .iter()
            .filter_map(|(&index, &t)| model.joint_at(index).map(|j| (j.name.clone(), t)))
            .collect()
    }

    /// 在锁内执行只读操作
    pub(crate) fn with_inner<R>(&self, f: impl FnOnce(&StoreInner) -> R) -> R {
        f(&self.inner.lock())
    }

    /// 获取写锁（仅供合并器使用）
    pub(crate) fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock()
    }

    /// 唤醒所有等待者
    pub(crate) fn notify_all(&self) {
        self.updated.notify_all();
    }

    /// 等待快照时间达到 `target`，最多等待 `timeout`
    ///
    /// 每次被唤醒都会重新计算剩余时间，因此多次无关唤醒不会延长总等待时间。
    pub fn wait_until(&self, target: Timestamp, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut inner = self.inner.lock();
        while inner.state_time < target {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return false;
            }
            // 超时后仍需回到循环条件再检查一次
            let _ = self.updated.wait_for(&mut inner, remaining);
        }
        true
    }
}
