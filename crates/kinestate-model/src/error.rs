//! 模型层错误类型定义

use thiserror::Error;

/// 运动学模型错误类型
#[derive(Error, Debug)]
pub enum ModelError {
    /// 关节名称重复
    #[error("Duplicate joint name: {0}")]
    DuplicateJoint(String),

    /// 分组名称重复
    #[error("Duplicate group name: {0}")]
    DuplicateGroup(String),

    /// 边界数量与变量数量不一致
    #[error("Joint '{joint}' declares {actual} bound pairs but has {expected} variables")]
    BoundsMismatch {
        joint: String,
        expected: usize,
        actual: usize,
    },

    /// 边界上下限颠倒（min > max）
    #[error("Joint '{joint}' has inverted bounds [{min}, {max}]")]
    InvertedBounds { joint: String, min: f64, max: f64 },

    /// 多自由度关节缺少子坐标系
    #[error("Multi-DOF joint '{0}' has no child frame")]
    MissingChildFrame(String),

    /// Mimic 关节引用了未知关节
    #[error("Joint '{joint}' mimics unknown joint '{target}'")]
    UnknownMimicTarget { joint: String, target: String },

    /// 分组引用了未知关节
    #[error("Group '{group}' references unknown joint '{joint}'")]
    UnknownGroupJoint { group: String, joint: String },

    /// 模型文件解析失败
    #[error("Failed to parse model: {0}")]
    Parse(#[from] toml::de::Error),

    /// 模型文件读取失败
    #[error("Failed to read model file: {0}")]
    Io(#[from] std::io::Error),
}
