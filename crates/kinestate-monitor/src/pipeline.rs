//! 反馈线程主循环
//!
//! 每个反馈一条线程：带超时地阻塞在接收端上，超时后检查运行标志，
//! 因此 `stop()` 最多等待一个轮询周期即可让线程退出。

use crate::error::MonitorError;
use crate::feeds::JointStateUpdate;
use crate::monitor::MonitorContext;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// 关节状态反馈循环
pub(crate) fn joint_state_loop(
    rx: Receiver<Arc<JointStateUpdate>>,
    ctx: Arc<MonitorContext>,
    is_running: Arc<AtomicBool>,
    poll_interval: Duration,
    topic: String,
) {
    debug!("Joint state feed thread started on {}", topic);
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Joint state feed: running flag cleared, exiting");
            break;
        }
        match rx.recv_timeout(poll_interval) {
            Ok(update) => {
                // 畸形批次已在合并器内记录
                let _ = ctx.merge_update(&update);
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("{}", MonitorError::FeedClosed(topic.clone()));
                break;
            },
        }
    }
    debug!("Joint state feed thread on {} exited", topic);
}

/// 变换变化反馈循环：每个通知触发一次全量刷新
pub(crate) fn transform_loop(
    rx: Receiver<()>,
    ctx: Arc<MonitorContext>,
    is_running: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    debug!("Transform feed thread started");
    loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("Transform feed: running flag cleared, exiting");
            break;
        }
        match rx.recv_timeout(poll_interval) {
            Ok(()) => {
                // 单个关节的查询失败已在刷新内记录
                let _ = ctx.refresh_transforms();
            },
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("{}", MonitorError::FeedClosed("transforms".to_string()));
                break;
            },
        }
    }
    debug!("Transform feed thread exited");
}
