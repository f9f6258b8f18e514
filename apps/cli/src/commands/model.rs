//! model 命令
//!
//! 加载、校验并打印模型目录

use anyhow::{Context, Result};
use clap::Args;
use kinestate_model::{JointDescriptor, RobotModel, VariableBounds};
use std::path::PathBuf;

/// 模型命令参数
#[derive(Args, Debug)]
pub struct ModelCommand {
    /// 模型文件路径（TOML）
    #[arg(short, long)]
    pub model: PathBuf,
}

impl ModelCommand {
    /// 执行模型校验
    pub fn execute(&self) -> Result<()> {
        let model = RobotModel::load_from_file(&self.model)
            .with_context(|| format!("failed to load model from {}", self.model.display()))?;
        print!("{}", describe_model(&model));
        Ok(())
    }
}

/// 生成模型摘要
pub fn describe_model(model: &RobotModel) -> String {
    let mut out = String::new();
    out.push_str("════════════════════════════════════════\n");
    out.push_str(&format!("Model: {} (frame: {})\n", model.name(), model.model_frame()));
    out.push_str("════════════════════════════════════════\n");
    out.push_str(&format!(
        "{} joints, {} variables\n\n",
        model.joint_count(),
        model.variable_count()
    ));

    for joint in model.joints() {
        out.push_str(&format!(
            "  {:<20} {:<11} vars={} bounds={}{}\n",
            joint.name,
            format!("{:?}", joint.kind).to_lowercase(),
            joint.variable_count(),
            format_bounds(&joint.bounds),
            format_flags(joint),
        ));
    }

    let groups: Vec<_> = model.groups().collect();
    if !groups.is_empty() {
        out.push_str("\nGroups:\n");
        for group in groups {
            out.push_str(&format!("  {:<20} [{}]\n", group.name, group.joints.join(", ")));
        }
    }
    out
}

fn format_bounds(bounds: &[VariableBounds]) -> String {
    if bounds.is_empty() {
        return "-".to_string();
    }
    bounds
        .iter()
        .map(|b| format!("[{}, {}]", b.min, b.max))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_flags(joint: &JointDescriptor) -> String {
    let mut flags = Vec::new();
    if joint.passive {
        flags.push("passive".to_string());
    }
    if let Some(source) = &joint.mimic {
        flags.push(format!("mimic of {}", source));
    }
    if let Some(child) = &joint.child_frame {
        flags.push(format!("child frame {}", child));
    }
    if flags.is_empty() {
        String::new()
    } else {
        format!("  ({})", flags.join(", "))
    }
}
