//! replay 命令
//!
//! 把 JSON-lines 关节状态记录经进程内总线回放给监视器，报告最终的完整性与快照。
//!
//! 每行一个 `JointStateUpdate`：
//!
//! ```json
//! {"stamp": 1500000, "names": ["shoulder", "wrist"], "positions": [0.1, 0.2]}
//! ```
//!
//! 空行与 `#` 开头的行被忽略。

use anyhow::{Context, Result, bail};
use clap::Args;
use kinestate_model::{RobotModel, Timestamp};
use kinestate_monitor::{JointStateBus, JointStateUpdate, MonitorConfig, StateMonitor};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 回放命令参数
#[derive(Args, Debug)]
pub struct ReplayCommand {
    /// 模型文件路径（TOML）
    #[arg(short, long)]
    pub model: PathBuf,

    /// 关节状态记录（JSON-lines）
    #[arg(short, long)]
    pub input: PathBuf,

    /// 监视器配置（TOML，可选）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 只要求该分组完整
    #[arg(short, long)]
    pub group: Option<String>,

    /// 等待超时（毫秒）
    #[arg(long, default_value_t = 1000)]
    pub timeout_ms: u64,

    /// 以 JSON 输出报告
    #[arg(long)]
    pub json: bool,
}

impl ReplayCommand {
    /// 执行回放，返回请求的完整性是否达到
    pub fn execute(&self) -> Result<bool> {
        // === 1. 加载输入 ===

        let model = RobotModel::load_from_file(&self.model)
            .with_context(|| format!("failed to load model from {}", self.model.display()))?;
        if let Some(group) = &self.group
            && model.group(group).is_none()
        {
            bail!("unknown joint group '{}' in model '{}'", group, model.name());
        }

        let config = match &self.config {
            Some(path) => MonitorConfig::load_from_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => MonitorConfig::default(),
        };

        let content = fs::read_to_string(&self.input)
            .with_context(|| format!("failed to read {}", self.input.display()))?;
        let records = parse_records(&content)?;
        info!("Loaded {} joint state records from {}", records.len(), self.input.display());

        // === 2. 回放 ===

        let topic = config.joint_states_topic.clone();
        let bus = Arc::new(JointStateBus::new());
        let monitor = StateMonitor::builder(model).config(config).build();
        monitor.start(bus.clone(), &topic)?;

        for record in records.iter().cloned() {
            bus.publish(&topic, record);
        }
        let latest_stamp = records.iter().map(|r| r.stamp).max().unwrap_or(Timestamp::ZERO);

        // === 3. 等待 ===

        // 记录可能乱序：按处理完的批次数等待，而非按时间戳
        let timeout = Duration::from_millis(self.timeout_ms);
        let reached = monitor.wait_for_batches(records.len() as u64, timeout);
        if !reached {
            warn!(
                "Only {} of {} records were processed within {:?}",
                monitor.metrics().batches_processed,
                records.len(),
                timeout
            );
        }
        let complete = monitor.is_complete();
        let group_complete = self
            .group
            .as_deref()
            .map(|group| monitor.wait_for_group_complete(group, Duration::ZERO));
        monitor.stop();

        // === 4. 报告 ===

        let report = Report {
            records: records.len(),
            latest_stamp,
            reached,
            complete,
            group: self.group.as_deref().zip(group_complete),
            monitor: &monitor,
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&report.to_json())?);
        } else {
            print!("{}", report.to_text());
        }

        Ok(group_complete.unwrap_or(complete))
    }
}

/// 解析 JSON-lines 记录
pub fn parse_records(content: &str) -> Result<Vec<JointStateUpdate>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid record on line {}", i + 1))
        })
        .collect()
}

struct Report<'a> {
    records: usize,
    latest_stamp: Timestamp,
    reached: bool,
    complete: bool,
    group: Option<(&'a str, bool)>,
    monitor: &'a StateMonitor,
}

impl Report<'_> {
    fn processed(&self) -> u64 {
        self.monitor.metrics().batches_processed
    }

    fn to_text(&self) -> String {
        let (state, time) = self.monitor.current_state_and_time();
        let metrics = self.monitor.metrics();
        let mut out = String::new();

        out.push_str("════════════════════════════════════════\n");
        out.push_str("           Replay report\n");
        out.push_str("════════════════════════════════════════\n");
        out.push_str(&format!("Records:        {}\n", self.records));
        out.push_str(&format!("Latest stamp:   {}\n", self.latest_stamp));
        out.push_str(&format!("Processed:      {} (all: {})\n", self.processed(), self.reached));
        out.push_str(&format!("Snapshot time:  {}\n", time));
        out.push_str(&format!("Complete:       {}\n", self.complete));
        if let Some((group, complete)) = self.group {
            out.push_str(&format!("Group '{}':  {}\n", group, complete));
        }

        let missing = self.monitor.missing_joints();
        if !missing.is_empty() {
            out.push_str(&format!("Missing:        {}\n", missing.join(", ")));
        }
        let out_of_bounds = state.out_of_bounds_joints();
        if !out_of_bounds.is_empty() {
            out.push_str(&format!("Out of bounds:  {}\n", out_of_bounds.join(", ")));
        }

        out.push_str("\nValues:\n");
        for (name, value) in state.values() {
            out.push_str(&format!("  {:<24} {:>12.6}\n", name, value));
        }

        out.push_str("\nMetrics:\n");
        out.push_str(&format!(
            "  batches {} (rejected {}), joint updates {}, changes {}, callbacks {}\n",
            metrics.batches_received,
            metrics.batches_rejected,
            metrics.joint_updates,
            metrics.value_changes,
            metrics.callbacks_fired
        ));
        out
    }

    fn to_json(&self) -> serde_json::Value {
        let (state, time) = self.monitor.current_state_and_time();
        let metrics = self.monitor.metrics();
        json!({
            "records": self.records,
            "latest_stamp": self.latest_stamp,
            "processed": self.processed(),
            "reached": self.reached,
            "snapshot_time": time,
            "complete": self.complete,
            "group": self.group.map(|(name, complete)| json!({ "name": name, "complete": complete })),
            "missing": self.monitor.missing_joints(),
            "out_of_bounds": state.out_of_bounds_joints(),
            "values": state.values(),
            "metrics": {
                "batches_received": metrics.batches_received,
                "batches_rejected": metrics.batches_rejected,
                "joint_updates": metrics.joint_updates,
                "value_changes": metrics.value_changes,
            },
        })
    }
}
