//! 反馈源抽象
//!
//! 监视器只依赖两个 trait：
//!
//! - [`JointStateSource`] - 按话题订阅关节状态批次（推送式）
//! - [`TransformProvider`] - 按坐标系对查询变换（拉取式），并推送"变换已变化"通知
//!
//! 本模块同时提供两个进程内实现：[`JointStateBus`] 和 [`TransformBuffer`]，
//! 供测试、回放工具以及嵌入式使用。

mod bus;
mod tf_buffer;

pub use bus::JointStateBus;
pub use tf_buffer::TransformBuffer;

use crate::error::{MonitorError, TransformError};
use crossbeam_channel::Receiver;
use kinestate_model::{Isometry3, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 关节状态批次
///
/// `names[i]` 与 `positions[i]` 一一对应；`velocities` / `efforts`
/// 可以为空，仅当长度与 `names` 一致时才会被使用。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JointStateUpdate {
    /// 观测时间戳
    pub stamp: Timestamp,
    /// 关节名称
    pub names: Vec<String>,
    /// 位置
    pub positions: Vec<f64>,
    /// 速度（可选）
    #[serde(default)]
    pub velocities: Vec<f64>,
    /// 力矩（可选）
    #[serde(default)]
    pub efforts: Vec<f64>,
}

impl JointStateUpdate {
    /// 创建空批次
    pub fn new(stamp: Timestamp) -> Self {
        Self {
            stamp,
            ..Default::default()
        }
    }

    /// 空批次（变换刷新触发回调时使用）
    pub fn empty() -> Self {
        Self::default()
    }

    /// 追加一个关节位置
    pub fn with_joint(mut self, name: impl Into<String>, position: f64) -> Self {
        self.names.push(name.into());
        self.positions.push(position);
        self
    }

    /// 追加一个带速度/力矩的关节
    pub fn with_joint_dynamics(
        mut self,
        name: impl Into<String>,
        position: f64,
        velocity: f64,
        effort: f64,
    ) -> Self {
        self.names.push(name.into());
        self.positions.push(position);
        self.velocities.push(velocity);
        self.efforts.push(effort);
        self
    }

    /// 条目数量
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// 是否为空批次
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 形状是否一致（名称数 == 位置数）
    pub fn is_well_formed(&self) -> bool {
        self.names.len() == self.positions.len()
    }

    /// 速度数组是否可用
    pub fn has_velocities(&self) -> bool {
        !self.names.is_empty() && self.velocities.len() == self.names.len()
    }

    /// 力矩数组是否可用
    pub fn has_efforts(&self) -> bool {
        !self.names.is_empty() && self.efforts.len() == self.names.len()
    }
}

/// 带时间戳的坐标变换（child 在 parent 中的位姿）
#[derive(Debug, Clone, PartialEq)]
pub struct TransformStamped {
    /// 父坐标系
    pub parent: String,
    /// 子坐标系
    pub child: String,
    /// 观测时间（`Timestamp::ZERO` 表示静态变换）
    pub stamp: Timestamp,
    /// 变换
    pub transform: Isometry3<f64>,
}

impl TransformStamped {
    /// 创建变换
    pub fn new(
        parent: impl Into<String>,
        child: impl Into<String>,
        stamp: Timestamp,
        transform: Isometry3<f64>,
    ) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
            stamp,
            transform,
        }
    }

    /// 创建静态变换
    pub fn fixed(parent: impl Into<String>, child: impl Into<String>, transform: Isometry3<f64>) -> Self {
        Self::new(parent, child, Timestamp::ZERO, transform)
    }

    /// 是否为静态变换
    pub fn is_static(&self) -> bool {
        self.stamp.is_static()
    }
}

/// 关节状态源
///
/// 每次 `subscribe` 返回一个独立的接收端；发送端全部断开即表示反馈源结束。
///
/// # 线程安全
///
/// 接收端被移交给监视器的反馈线程。监视器停止时丢弃接收端，
/// 实现应在下一次投递时发现断开并释放对应的发送端。
///
/// # 示例
///
/// ```
/// use crossbeam_channel::{Receiver, unbounded};
/// use kinestate_monitor::{JointStateSource, JointStateUpdate, MonitorError};
/// use std::sync::Arc;
///
/// /// 只有一个订阅者的直连源
/// struct Direct(Receiver<Arc<JointStateUpdate>>);
///
/// impl JointStateSource for Direct {
///     fn subscribe(&self, _topic: &str) -> Result<Receiver<Arc<JointStateUpdate>>, MonitorError> {
///         Ok(self.0.clone())
///     }
/// }
///
/// let (_tx, rx) = unbounded();
/// let source = Direct(rx);
/// assert!(source.subscribe("joint_states").is_ok());
/// assert_eq!(source.resolve_topic("joint_states"), "joint_states");
/// ```
pub trait JointStateSource: Send + Sync {
    /// 订阅话题
    ///
    /// # 错误
    ///
    /// 话题无效或来源不可用时返回错误，`StateMonitor::start` 原样传出。
    fn subscribe(&self, topic: &str) -> Result<Receiver<Arc<JointStateUpdate>>, MonitorError>;

    /// 话题名称解析（`monitored_topic()` 报告的是解析后的名称）
    fn resolve_topic(&self, topic: &str) -> String {
        topic.to_string()
    }
}

/// 变换提供者
///
/// # 线程安全
///
/// `lookup_transform` 在变换反馈线程以及直接调用刷新的线程上执行，
/// 且总在快照锁之外调用，实现可以自由加锁。
pub trait TransformProvider: Send + Sync {
    /// 查询 `child` 在 `parent` 中的变换，返回时间不晚于 `at` 的最新值
    ///
    /// 静态变换（时间戳为 [`Timestamp::ZERO`]）在任何 `at` 下都应返回。
    ///
    /// # 错误
    ///
    /// - `TransformError::NotFound`: 坐标系对未知
    /// - `TransformError::TooEarly`: 最早的观测也晚于 `at`
    fn lookup_transform(
        &self,
        parent: &str,
        child: &str,
        at: Timestamp,
    ) -> Result<TransformStamped, TransformError>;

    /// 订阅变换变化通知（每个通知触发一次刷新；多次通知可以合并）
    fn subscribe_changes(&self) -> Receiver<()>;
}
