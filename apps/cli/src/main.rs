//! # Kinestate CLI
//!
//! 运动学模型与关节状态日志的命令行工具。
//!
//! ```bash
//! # 校验模型并列出关节
//! kinestate-cli model --model robot.toml
//!
//! # 回放 JSON-lines 记录，检查状态是否完整
//! kinestate-cli replay --model robot.toml --input states.jsonl --group arm
//! ```
//!
//! 日志级别通过 `RUST_LOG` 控制，默认 `kinestate=info`。

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;

mod commands;

use commands::{ModelCommand, ReplayCommand};

/// Kinestate CLI - 运动学状态工具
#[derive(Parser, Debug)]
#[command(name = "kinestate-cli")]
#[command(about = "Inspect kinematic models and replay joint-state logs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 加载并校验模型目录
    Model {
        #[command(flatten)]
        args: ModelCommand,
    },

    /// 回放关节状态记录并报告完整性
    Replay {
        #[command(flatten)]
        args: ReplayCommand,
    },
}

fn main() -> Result<ExitCode> {
    // 初始化日志（输出到 stderr，不干扰报告）
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kinestate=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Model { args } => {
            args.execute()?;
            Ok(ExitCode::SUCCESS)
        },

        Commands::Replay { args } => {
            if args.execute()? {
                Ok(ExitCode::SUCCESS)
            } else {
                // 请求的完整性未达到
                Ok(ExitCode::from(2))
            }
        },
    }
}
