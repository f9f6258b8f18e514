//! 命令定义和实现

pub mod model;
pub mod replay;

pub use model::ModelCommand;
pub use replay::ReplayCommand;
