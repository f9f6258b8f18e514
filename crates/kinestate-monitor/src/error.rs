//! 监视器错误类型定义
//!
//! 所有错误都是非致命的：监视器在任何错误之后仍然可用，
//! 反馈源的错误只会让状态退化为"不完整"，而不会向上传播为全局失败。

use kinestate_model::{ModelError, Timestamp};
use thiserror::Error;

/// 变换查询错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// 未配置变换提供者
    #[error("No transform provider configured")]
    NoProvider,

    /// 坐标系对之间从未收到过变换
    #[error("No transform from '{parent}' to '{child}'")]
    NotFound { parent: String, child: String },

    /// 请求时间早于已知的最早变换
    #[error("Transform from '{parent}' to '{child}' unknown at {at} (earliest known {earliest})")]
    TooEarly {
        parent: String,
        child: String,
        at: Timestamp,
        earliest: Timestamp,
    },
}

/// 监视器错误类型
#[derive(Error, Debug)]
pub enum MonitorError {
    /// 关节状态批次形状不一致（名称数 != 位置数），整批拒绝
    #[error("Malformed joint state batch: {names} names but {positions} positions")]
    MalformedBatch { names: usize, positions: usize },

    /// 多自由度关节的变换不可用（仅跳过该关节）
    #[error("Unable to update multi-DOF joint '{joint}': {source}")]
    TransformUnavailable {
        joint: String,
        #[source]
        source: TransformError,
    },

    /// 关节状态话题为空
    #[error("The joint states topic cannot be an empty string")]
    EmptyTopic,

    /// 未知关节（仅在显式按名称操作时报告；批次中的未知关节被静默忽略）
    #[error("Unknown joint: {0}")]
    UnknownJoint(String),

    /// 关节不是多自由度关节
    #[error("Joint '{0}' is not a multi-DOF joint")]
    NotMultiDof(String),

    /// 目标状态与监视器模型的变量布局不一致
    #[error("Model mismatch: expected {expected} variables, got {actual}")]
    ModelMismatch { expected: usize, actual: usize },

    /// 变量数相同，但关节布局来自不同的模型
    #[error("Model layout mismatch: expected joints of '{expected}', got '{actual}'")]
    LayoutMismatch { expected: String, actual: String },

    /// 反馈源已关闭（所有发送端断开）
    #[error("Feed '{0}' closed")]
    FeedClosed(String),

    /// 反馈线程启动失败
    #[error("Failed to spawn feed thread: {0}")]
    FeedThread(String),

    /// 配置解析失败
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// 配置文件读取失败
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 模型错误
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}
