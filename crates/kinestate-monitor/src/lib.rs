//! # Kinestate Monitor - 实时运动学状态聚合
//!
//! 把两路异步反馈合并成一份带时间戳、可查询的运动学快照：
//!
//! - **位置反馈**：按名称上报的单变量关节位置批次（[`JointStateUpdate`]）
//! - **变换反馈**：多自由度关节（平面、浮动）的坐标变换（[`TransformProvider`]）
//!
//! 调用方可以读取一致的快照副本、查询完整性与新鲜度、阻塞等待新数据，
//! 并注册在快照真实变化时触发的回调。
//!
//! # 模块
//!
//! - `store` - 快照存储（互斥锁 + 条件变量）
//! - `position` / `transform` - 两个合并器
//! - `query` - 完整性查询与等待
//! - `hooks` - 回调注册表
//! - `feeds` - 反馈源 trait 与进程内实现
//! - `monitor` / `builder` - 对外 API 与生命周期
//!
//! # 示例
//!
//! ```
//! use kinestate_model::{JointDescriptor, JointKind, RobotModel, Timestamp};
//! use kinestate_monitor::{JointStateBus, JointStateUpdate, StateMonitor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let model = RobotModel::builder("arm")
//!     .joint(JointDescriptor::new("shoulder", JointKind::Revolute).with_bounds(-1.5, 1.5))
//!     .joint(JointDescriptor::new("wrist", JointKind::Continuous))
//!     .build()
//!     .unwrap();
//!
//! let bus = Arc::new(JointStateBus::new());
//! let monitor = StateMonitor::new(model);
//! monitor.start(bus.clone(), "joint_states").unwrap();
//!
//! let stamp = Timestamp::from_micros(1_000_000);
//! bus.publish(
//!     "joint_states",
//!     JointStateUpdate::new(stamp).with_joint("shoulder", 0.3).with_joint("wrist", 4.0),
//! );
//!
//! assert!(monitor.wait_for_state(stamp, Duration::from_secs(2)));
//! assert!(monitor.is_complete());
//! monitor.stop();
//! ```

mod builder;
pub mod config;
pub mod error;
pub mod feeds;
pub mod hooks;
pub mod metrics;
mod monitor;
mod pipeline;
mod position;
mod query;
pub mod state;
pub mod store;
mod transform;

pub use builder::StateMonitorBuilder;
pub use config::{
    BOUNDS_EPSILON, COMPLETE_POLL_INTERVAL, MALFORMED_LOG_INTERVAL, MonitorConfig,
    TRANSFORM_CHANGE_THRESHOLD,
};
pub use error::{MonitorError, TransformError};
pub use feeds::{
    JointStateBus, JointStateSource, JointStateUpdate, TransformBuffer, TransformProvider,
    TransformStamped,
};
pub use hooks::{HookManager, StateUpdateCallback};
pub use metrics::{MetricsSnapshot, MonitorMetrics};
pub use monitor::StateMonitor;
pub use state::KinematicState;
pub use store::SnapshotStore;
pub use transform::TransformRefresh;
