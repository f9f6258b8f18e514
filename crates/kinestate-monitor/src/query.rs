//! 完整性查询与等待

use crate::config::COMPLETE_POLL_INTERVAL;
use crate::monitor::MonitorContext;
use kinestate_model::{JointDescriptor, Timestamp};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

impl MonitorContext {
    /// 扫描需要上报的关节（非 mimic、非被动、有变量）
    ///
    /// `oldest` 为 `Some` 时，早于该时间的观测同样视为缺失。
    /// 每个缺失关节调用一次 `on_missing`，返回是否完整。
    pub(crate) fn scan_missing(
        &self,
        oldest: Option<Timestamp>,
        mut on_missing: impl FnMut(&JointDescriptor),
    ) -> bool {
        let now = self.clock.now();
        self.store.with_inner(|inner| {
            let mut complete = true;
            for (index, joint) in self.model.active_joints() {
                if joint.passive {
                    continue;
                }
                match inner.joint_time.get(&index) {
                    None => {
                        debug!("Joint '{}' has never been updated", joint.name);
                    },
                    Some(&seen) => match oldest {
                        Some(oldest) if seen < oldest => {
                            debug!(
                                "Joint '{}' was last updated {:.3}s ago",
                                joint.name,
                                now.duration_since(seen).as_secs_f64()
                            );
                        },
                        _ => continue,
                    },
                }
                complete = false;
                on_missing(joint);
            }
            complete
        })
    }

    pub(crate) fn is_complete(&self, max_age: Option<Duration>) -> bool {
        let oldest = max_age.map(|age| self.clock.now().saturating_sub(age));
        self.scan_missing(oldest, |_| {})
    }

    pub(crate) fn missing_joints(&self, max_age: Option<Duration>) -> Vec<String> {
        let oldest = max_age.map(|age| self.clock.now().saturating_sub(age));
        let mut missing = Vec::new();
        self.scan_missing(oldest, |joint| missing.push(joint.name.clone()));
        missing
    }

    pub(crate) fn wait_for_state(&self, target: Timestamp, timeout: Duration) -> bool {
        if self.store.wait_until(target, timeout) {
            return true;
        }
        info!(
            "Did not receive a joint state at or after {} within {:.3}s; latest state is from {}. \
             Check clock synchronisation between the feeds and this process",
            target,
            timeout.as_secs_f64(),
            self.store.state_time()
        );
        false
    }

    pub(crate) fn wait_for_complete_state(&self, timeout: Duration) -> bool {
        let step = COMPLETE_POLL_INTERVAL.min(timeout / 10);
        let start = Instant::now();
        while !self.is_complete(None) {
            if start.elapsed() >= timeout {
                return false;
            }
            spin_sleep::sleep(step);
        }
        true
    }

    /// 轮询直到至少 `count` 个批次处理完毕，或超时
    pub(crate) fn wait_for_batches(&self, count: u64, timeout: Duration) -> bool {
        let processed = || self.metrics.batches_processed.load(Ordering::Acquire);
        let step = COMPLETE_POLL_INTERVAL.min(timeout / 10);
        let start = Instant::now();
        while processed() < count {
            if start.elapsed() >= timeout {
                debug!("Processed {} of {} joint state batches before timeout", processed(), count);
                return false;
            }
            spin_sleep::sleep(step);
        }
        true
    }

    /// 先做全局等待；超时后，只要缺失的关节都不在分组内即视为完整
    pub(crate) fn wait_for_group_complete(&self, group: &str, timeout: Duration) -> bool {
        let Some(group) = self.model.group(group) else {
            warn!("Unknown joint group '{}'", group);
            return false;
        };
        if self.wait_for_complete_state(timeout) {
            return true;
        }
        let missing = self.missing_joints(None);
        !missing.iter().any(|joint| group.contains(joint))
    }
}
