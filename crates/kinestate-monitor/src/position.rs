//! 位置反馈合并
//!
//! 只处理单变量关节：未知关节、固定关节与多自由度关节被静默跳过。
//! 接受的条目总是刷新新鲜度；只有数值真实变化时才写入快照并触发回调。

use crate::config::{BOUNDS_EPSILON, MALFORMED_LOG_INTERVAL};
use crate::error::MonitorError;
use crate::feeds::JointStateUpdate;
use crate::monitor::MonitorContext;
use crate::store::StoreInner;
use kinestate_model::RobotModel;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{error, trace};

/// 单个批次的合并结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct PositionMerge {
    /// 被接受的条目数
    pub accepted: usize,
    /// 快照是否真实变化
    pub changed: bool,
}

/// 在锁内合并一个形状正确的批次
pub(crate) fn apply_joint_state(
    inner: &mut StoreInner,
    model: &RobotModel,
    update: &JointStateUpdate,
    copy_dynamics: bool,
) -> PositionMerge {
    let mut merge = PositionMerge::default();
    let with_velocities = copy_dynamics && update.has_velocities();
    let with_efforts = with_velocities && update.has_efforts();

    for (i, name) in update.names.iter().enumerate() {
        let Some(index) = model.joint_index(name) else {
            continue;
        };
        let Some(joint) = model.joint_at(index) else {
            continue;
        };
        if joint.variable_count() != 1 {
            continue;
        }

        inner.record_freshness(index, update.stamp);
        merge.accepted += 1;

        let reported = update.positions[i];
        let value = if joint.kind.is_continuous() {
            reported
        } else {
            joint
                .single_bounds()
                .map_or(reported, |bounds| bounds.snap(reported, BOUNDS_EPSILON))
        };

        let current = inner.state.joint_positions(index)[0];
        if current == value || (current.is_nan() && value.is_nan()) {
            continue;
        }

        inner.state.set_joint_positions(index, &[value]);
        merge.changed = true;

        // 动力学只随位置变化一起写入；力矩仅在速度可用时才写入
        if with_velocities {
            inner.state.set_joint_velocity(index, update.velocities[i]);
            if with_efforts {
                inner.state.set_joint_effort(index, update.efforts[i]);
            }
        }
    }
    merge
}

impl MonitorContext {
    /// 合并一个关节状态批次，返回快照是否真实变化
    pub(crate) fn merge_update(&self, update: &JointStateUpdate) -> Result<bool, MonitorError> {
        let result = self.merge_batch(update);
        self.metrics.batches_processed.fetch_add(1, Ordering::Release);
        result
    }

    fn merge_batch(&self, update: &JointStateUpdate) -> Result<bool, MonitorError> {
        self.metrics.batches_received.fetch_add(1, Ordering::Relaxed);

        if !update.is_well_formed() {
            self.metrics.batches_rejected.fetch_add(1, Ordering::Relaxed);
            self.log_malformed(update);
            return Err(MonitorError::MalformedBatch {
                names: update.names.len(),
                positions: update.positions.len(),
            });
        }

        let merge = {
            let mut inner = self.store.lock();
            apply_joint_state(&mut inner, &self.model, update, self.config.copy_dynamics)
        };

        self.metrics
            .joint_updates
            .fetch_add(merge.accepted as u64, Ordering::Relaxed);

        if merge.changed {
            self.metrics.value_changes.fetch_add(1, Ordering::Relaxed);
            self.fire_callbacks(update);
        }
        if merge.accepted > 0 {
            self.store.notify_all();
        } else {
            trace!("Joint state batch at {} matched no known joint", update.stamp);
        }
        Ok(merge.changed)
    }

    fn log_malformed(&self, update: &JointStateUpdate) {
        let now = Instant::now();
        let mut last = self.last_malformed_log.lock();
        if last.is_none_or(|t| now.duration_since(t) >= MALFORMED_LOG_INTERVAL) {
            *last = Some(now);
            error!(
                "Received invalid joint state: {} joint names but {} positions, batch ignored",
                update.names.len(),
                update.positions.len()
            );
        } else {
            trace!("Invalid joint state batch ignored (log throttled)");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SnapshotStore;
    use kinestate_model::{JointDescriptor, JointKind, Timestamp};
    use std::sync::Arc;

    fn model() -> Arc<RobotModel> {
        Arc::new(
            RobotModel::builder("test")
                .joint(JointDescriptor::new("base", JointKind::Planar).with_frames(None, "base_link"))
                .joint(JointDescriptor::new("a", JointKind::Revolute).with_bounds(0.5, 1.0))
                .joint(JointDescriptor::new("spin", JointKind::Continuous))
                .joint(JointDescriptor::new("mount", JointKind::Fixed))
                .build()
                .unwrap(),
        )
    }

    fn apply(store: &SnapshotStore, update: &JointStateUpdate, copy_dynamics: bool) -> PositionMerge {
        let model = model();
        apply_joint_state(&mut store.lock(), &model, update, copy_dynamics)
    }

    #[test]
    fn test_skips_unknown_fixed_and_multi_dof() {
        let store = SnapshotStore::new(model());
        let update = JointStateUpdate::new(Timestamp::from_micros(10))
            .with_joint("ghost", 1.0)
            .with_joint("mount", 1.0)
            .with_joint("base", 1.0);
        let merge = apply(&store, &update, false);
        assert_eq!(merge, PositionMerge::default());
        assert!(store.freshness().is_empty());
        assert_eq!(store.state_time(), Timestamp::ZERO);
    }

    #[test]
    fn test_snap_within_epsilon() {
        let store = SnapshotStore::new(model());
        let update = JointStateUpdate::new(Timestamp::from_micros(10)).with_joint("a", 0.5 - f64::EPSILON / 2.0);
        let merge = apply(&store, &update, false);
        assert!(merge.changed);
        assert_eq!(store.read().0.position("a"), Some(0.5));
    }

    #[test]
    fn test_out_of_bounds_stored_verbatim() {
        let store = SnapshotStore::new(model());
        let value = 0.5 - 2.0 * f64::EPSILON;
        apply(&store, &JointStateUpdate::new(Timestamp::from_micros(10)).with_joint("a", value), false);
        assert_eq!(store.read().0.position("a"), Some(value));
    }

    #[test]
    fn test_continuous_never_snapped() {
        let store = SnapshotStore::new(model());
        apply(&store, &JointStateUpdate::new(Timestamp::from_micros(10)).with_joint("spin", 42.0), false);
        assert_eq!(store.read().0.position("spin"), Some(42.0));
    }

    #[test]
    fn test_unchanged_value_refreshes_freshness_only() {
        let store = SnapshotStore::new(model());
        let first = JointStateUpdate::new(Timestamp::from_micros(10)).with_joint("a", 0.7);
        assert!(apply(&store, &first, false).changed);

        let second = JointStateUpdate::new(Timestamp::from_micros(20)).with_joint("a", 0.7);
        let merge = apply(&store, &second, false);
        assert_eq!(merge.accepted, 1);
        assert!(!merge.changed);
        assert_eq!(store.freshness()["a"], Timestamp::from_micros(20));
        assert_eq!(store.state_time(), Timestamp::from_micros(20));
    }

    #[test]
    fn test_dynamics_copy_rules() {
        // 只有速度可用时，力矩不写入
        let store = SnapshotStore::new(model());
        let mut update = JointStateUpdate::new(Timestamp::from_micros(10)).with_joint("spin", 1.0);
        update.velocities = vec![0.25];
        apply(&store, &update, true);
        let state = store.read().0;
        assert_eq!(state.velocity("spin"), Some(0.25));
        assert!(state.efforts().is_none());

        // 只有力矩可用时，两者都不写入
        let store = SnapshotStore::new(model());
        let mut update = JointStateUpdate::new(Timestamp::from_micros(10)).with_joint("spin", 1.0);
        update.efforts = vec![3.0];
        apply(&store, &update, true);
        let state = store.read().0;
        assert!(state.velocities().is_none());
        assert!(state.efforts().is_none());

        // copy_dynamics 关闭时忽略动力学
        let store = SnapshotStore::new(model());
        let update = JointStateUpdate::new(Timestamp::from_micros(10)).with_joint_dynamics("spin", 1.0, 0.5, 2.0);
        apply(&store, &update, false);
        assert!(store.read().0.velocities().is_none());
    }
}
