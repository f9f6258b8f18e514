//! Builder 模式实现
//!
//! 提供链式构造 `StateMonitor` 的方式。

use crate::config::MonitorConfig;
use crate::feeds::TransformProvider;
use crate::monitor::{MonitorContext, StateMonitor};
use kinestate_model::{Clock, RobotModel, SystemClock};
use std::sync::Arc;

/// 监视器构建器
///
/// # Example
///
/// ```
/// use kinestate_model::{JointDescriptor, JointKind, ManualClock, RobotModel, Timestamp};
/// use kinestate_monitor::{StateMonitorBuilder, TransformBuffer};
/// use std::sync::Arc;
///
/// let model = RobotModel::builder("arm")
///     .joint(JointDescriptor::new("shoulder", JointKind::Revolute))
///     .build()
///     .unwrap();
///
/// let monitor = StateMonitorBuilder::new(model)
///     .copy_dynamics(true)
///     .transform_provider(Arc::new(TransformBuffer::new()))
///     .clock(Arc::new(ManualClock::new(Timestamp::from_micros(1_000))))
///     .build();
/// assert!(monitor.config().copy_dynamics);
/// ```
pub struct StateMonitorBuilder {
    model: Arc<RobotModel>,
    config: MonitorConfig,
    transforms: Option<Arc<dyn TransformProvider>>,
    clock: Option<Arc<dyn Clock>>,
}

impl StateMonitorBuilder {
    /// 创建新的构建器
    pub fn new(model: impl Into<Arc<RobotModel>>) -> Self {
        Self {
            model: model.into(),
            config: MonitorConfig::default(),
            transforms: None,
            clock: None,
        }
    }

    /// 设置完整配置（覆盖之前的 `copy_dynamics` 设置）
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// 是否合并速度/力矩
    pub fn copy_dynamics(mut self, copy_dynamics: bool) -> Self {
        self.config.copy_dynamics = copy_dynamics;
        self
    }

    /// 设置变换提供者（多自由度关节需要）
    pub fn transform_provider(mut self, provider: Arc<dyn TransformProvider>) -> Self {
        self.transforms = Some(provider);
        self
    }

    /// 设置时钟（默认系统时钟；测试中可注入 `ManualClock`）
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// 构建监视器
    pub fn build(self) -> StateMonitor {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        StateMonitor::from_context(MonitorContext::new(
            self.model,
            self.config,
            clock,
            self.transforms,
        ))
    }
}
