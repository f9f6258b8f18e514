//! 监视器配置
//!
//! 可调参数放在 [`MonitorConfig`]（可从 TOML 加载），
//! 语义相关的阈值是固定常量，不对用户开放。

use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 边界吸附容差（机器精度量级，吸收上游舍入噪声）
pub const BOUNDS_EPSILON: f64 = f64::EPSILON;

/// 多自由度关节变化阈值（关节自然单位）
pub const TRANSFORM_CHANGE_THRESHOLD: f64 = 1e-5;

/// 完整性等待的轮询周期上限（实际周期 = min(此值, timeout / 10)）
pub const COMPLETE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 畸形批次错误日志的最小间隔
pub const MALFORMED_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// 总线队列满丢弃批次时警告日志的最小间隔
pub const DROP_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// 监视器配置
///
/// # Example
///
/// ```
/// use kinestate_monitor::MonitorConfig;
///
/// // 使用默认配置（只复制位置）
/// let config = MonitorConfig::default();
/// assert!(!config.copy_dynamics);
///
/// // 从 TOML 加载（缺省字段使用默认值）
/// let config = MonitorConfig::from_toml_str("copy_dynamics = true").unwrap();
/// assert!(config.copy_dynamics);
/// assert_eq!(config.joint_states_topic, "joint_states");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 是否同时合并速度/力矩（默认只合并位置）
    pub copy_dynamics: bool,
    /// 关节状态话题
    pub joint_states_topic: String,
    /// 反馈线程检查运行标志的周期（毫秒）
    pub feed_poll_interval_ms: u64,
    /// `stop()` 等待反馈线程退出的超时（毫秒）
    pub shutdown_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            copy_dynamics: false,
            joint_states_topic: "joint_states".to_string(),
            feed_poll_interval_ms: 10,
            shutdown_timeout_ms: 500,
        }
    }
}

impl MonitorConfig {
    /// 从 TOML 字符串加载
    pub fn from_toml_str(content: &str) -> Result<Self, MonitorError> {
        Ok(toml::from_str(content)?)
    }

    /// 从 TOML 文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, MonitorError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 反馈线程轮询周期（至少 1ms）
    pub fn feed_poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed_poll_interval_ms.max(1))
    }

    /// 停止超时
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
