//! 变换反馈合并
//!
//! 多自由度关节（平面、浮动）由坐标变换驱动。每次刷新对所有多自由度关节：
//!
//! 1. 在存储锁之外向提供者查询 `parent -> child` 变换；
//! 2. 在一次加锁内按时间戳过滤过期观测、扣除关节原点偏移、转换为关节变量；
//! 3. 关节空间距离超过 [`TRANSFORM_CHANGE_THRESHOLD`] 才算真实变化。
//!
//! 时间戳为 [`Timestamp::ZERO`] 的静态变换不受过期过滤影响。

use crate::config::TRANSFORM_CHANGE_THRESHOLD;
use crate::error::{MonitorError, TransformError};
use crate::feeds::{JointStateUpdate, TransformStamped};
use crate::monitor::MonitorContext;
use crate::store::StoreInner;
use kinestate_model::{JointDescriptor, JointIndex, Timestamp};
use std::sync::atomic::Ordering;
use tracing::{debug, info, trace, warn};

/// 单次变换刷新的结果
#[derive(Debug, Default)]
pub struct TransformRefresh {
    /// 被接受的关节数
    pub applied: usize,
    /// 因过期被跳过的关节数
    pub stale: usize,
    /// 快照是否真实变化
    pub changed: bool,
    /// 查询失败的关节（其余关节照常合并）
    pub failures: Vec<MonitorError>,
}

impl TransformRefresh {
    /// 是否没有任何失败
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransformOutcome {
    /// 观测时间不晚于已接受的时间
    Stale,
    /// 已写入快照
    Applied { changed: bool },
}

/// 在锁内合并一个关节的变换观测
pub(crate) fn apply_joint_transform(
    inner: &mut StoreInner,
    index: JointIndex,
    joint: &JointDescriptor,
    observed: &TransformStamped,
) -> Result<TransformOutcome, MonitorError> {
    let stamp = observed.stamp;
    if !stamp.is_static()
        && inner
            .joint_time
            .get(&index)
            .is_some_and(|&accepted| stamp <= accepted)
    {
        return Ok(TransformOutcome::Stale);
    }

    let local = if joint.origin_is_identity() {
        observed.transform
    } else {
        joint.origin.inverse() * observed.transform
    };
    let values = joint
        .kind
        .transform_to_variables(&local)
        .ok_or_else(|| MonitorError::NotMultiDof(joint.name.clone()))?;

    inner.record_freshness(index, stamp);
    let changed = joint.kind.distance(&values, inner.state.joint_positions(index))
        > TRANSFORM_CHANGE_THRESHOLD;
    inner.state.set_joint_positions(index, &values);
    Ok(TransformOutcome::Applied { changed })
}

impl MonitorContext {
    /// 对所有多自由度关节执行一次刷新
    pub(crate) fn refresh_transforms(&self) -> TransformRefresh {
        let mut refresh = TransformRefresh::default();
        let at = self.clock.now();

        let mut observed = Vec::new();
        for (index, joint) in self.model.multi_dof_joints() {
            let Some(child) = joint.child_frame.as_deref() else {
                continue;
            };
            match self.lookup(joint, self.model.parent_frame_of(joint), child, at) {
                Ok(tf) => {
                    self.transform_recovered(index, joint);
                    observed.push((index, joint, tf));
                },
                Err(err) => {
                    self.transform_failed(index, &err);
                    refresh.failures.push(err);
                },
            }
        }

        if observed.is_empty() {
            return refresh;
        }

        {
            let mut inner = self.store.lock();
            for (index, joint, tf) in &observed {
                match apply_joint_transform(&mut inner, *index, joint, tf) {
                    Ok(TransformOutcome::Stale) => {
                        trace!("Skipping stale transform for joint '{}' at {}", joint.name, tf.stamp);
                        refresh.stale += 1;
                    },
                    Ok(TransformOutcome::Applied { changed }) => {
                        refresh.applied += 1;
                        refresh.changed |= changed;
                    },
                    Err(err) => refresh.failures.push(err),
                }
            }
        }

        self.metrics
            .transform_updates
            .fetch_add(refresh.applied as u64, Ordering::Relaxed);
        self.metrics
            .stale_transforms
            .fetch_add(refresh.stale as u64, Ordering::Relaxed);

        if refresh.changed {
            self.metrics.value_changes.fetch_add(1, Ordering::Relaxed);
            self.fire_callbacks(&JointStateUpdate::empty());
        }
        if refresh.applied > 0 {
            self.store.notify_all();
        }
        refresh
    }

    /// 查询并合并单个多自由度关节
    pub(crate) fn merge_transform(
        &self,
        joint_name: &str,
        parent: &str,
        child: &str,
        at: Timestamp,
    ) -> Result<bool, MonitorError> {
        let (index, joint) = self.multi_dof_joint(joint_name)?;
        let tf = self
            .lookup(joint, parent, child, at)
            .inspect_err(|err| self.transform_failed(index, err))?;
        self.transform_recovered(index, joint);
        self.merge_observed(index, joint, &tf)
    }

    /// 合并调用方已经取得的变换观测
    pub(crate) fn merge_observed_transform(
        &self,
        joint_name: &str,
        observed: &TransformStamped,
    ) -> Result<bool, MonitorError> {
        let (index, joint) = self.multi_dof_joint(joint_name)?;
        self.merge_observed(index, joint, observed)
    }

    fn merge_observed(
        &self,
        index: JointIndex,
        joint: &JointDescriptor,
        observed: &TransformStamped,
    ) -> Result<bool, MonitorError> {
        let outcome = {
            let mut inner = self.store.lock();
            apply_joint_transform(&mut inner, index, joint, observed)?
        };

        match outcome {
            TransformOutcome::Stale => {
                trace!("Skipping stale transform for joint '{}' at {}", joint.name, observed.stamp);
                self.metrics.stale_transforms.fetch_add(1, Ordering::Relaxed);
                Ok(false)
            },
            TransformOutcome::Applied { changed } => {
                self.metrics.transform_updates.fetch_add(1, Ordering::Relaxed);
                if changed {
                    self.metrics.value_changes.fetch_add(1, Ordering::Relaxed);
                    self.fire_callbacks(&JointStateUpdate::empty());
                }
                self.store.notify_all();
                Ok(changed)
            },
        }
    }

    fn multi_dof_joint(&self, name: &str) -> Result<(JointIndex, &JointDescriptor), MonitorError> {
        let index = self
            .model
            .joint_index(name)
            .ok_or_else(|| MonitorError::UnknownJoint(name.to_string()))?;
        match self.model.joint_at(index) {
            Some(joint) if joint.is_multi_dof() => Ok((index, joint)),
            _ => Err(MonitorError::NotMultiDof(name.to_string())),
        }
    }

    fn lookup(
        &self,
        joint: &JointDescriptor,
        parent: &str,
        child: &str,
        at: Timestamp,
    ) -> Result<TransformStamped, MonitorError> {
        let provider = self
            .transforms
            .as_ref()
            .ok_or_else(|| MonitorError::TransformUnavailable {
                joint: joint.name.clone(),
                source: TransformError::NoProvider,
            })?;
        provider
            .lookup_transform(parent, child, at)
            .map_err(|source| MonitorError::TransformUnavailable {
                joint: joint.name.clone(),
                source,
            })
    }

    fn transform_failed(&self, index: JointIndex, err: &MonitorError) {
        self.metrics.transform_failures.fetch_add(1, Ordering::Relaxed);
        if self.failing_transforms.lock().insert(index) {
            warn!("{}", err);
        } else {
            debug!("{}", err);
        }
    }

    fn transform_recovered(&self, index: JointIndex, joint: &JointDescriptor) {
        if self.failing_transforms.lock().remove(&index) {
            info!("Transform for multi-DOF joint '{}' is available again", joint.name);
        }
    }
}
