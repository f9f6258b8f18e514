//! # Kinestate Model - 运动学模型目录
//!
//! 监视器的只读输入：
//!
//! - `joint` - 关节类型、边界、描述（变换转换与距离度量按类型分派）
//! - `model` - 模型目录（关节、变量布局、分组，支持 TOML 加载）
//! - `time` - 时间戳与可注入时钟
//!
//! **依赖原则**: 纯数据，无线程、无日志；由 `kinestate-monitor` 依赖。

pub mod error;
pub mod joint;
pub mod model;
pub mod time;

pub use error::ModelError;
pub use joint::{JointDescriptor, JointKind, JointValues, MAX_JOINT_VARIABLES, VariableBounds};
pub use model::{JointGroup, JointIndex, RobotModel, RobotModelBuilder};
pub use time::{Clock, ManualClock, SystemClock, Timestamp};

// 重新导出变换类型，调用方无需单独依赖 nalgebra
pub use nalgebra::Isometry3;
