//! 运动学状态快照
//!
//! [`KinematicState`] 是扁平变量向量（按模型的变量布局排列），
//! 附带可选的速度、加速度与力矩数组。监视器内部持有一份，
//! 读取时整体复制给调用方，调用方得到的是与后续更新完全隔离的副本。

use crate::error::MonitorError;
use kinestate_model::{JointIndex, RobotModel};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 运动学状态
#[derive(Debug, Clone, PartialEq)]
pub struct KinematicState {
    model: Arc<RobotModel>,
    positions: Vec<f64>,
    velocities: Option<Vec<f64>>,
    accelerations: Option<Vec<f64>>,
    efforts: Option<Vec<f64>>,
}

impl KinematicState {
    /// 创建默认状态（每个关节取其默认值）
    pub fn new(model: Arc<RobotModel>) -> Self {
        let mut positions = Vec::with_capacity(model.variable_count());
        for joint in model.joints() {
            positions.extend_from_slice(&joint.default_positions());
        }
        Self {
            model,
            positions,
            velocities: None,
            accelerations: None,
            efforts: None,
        }
    }

    /// 关联的模型
    pub fn model(&self) -> &Arc<RobotModel> {
        &self.model
    }

    /// 全部位置
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    /// 全部速度（从未写入过时为 `None`）
    pub fn velocities(&self) -> Option<&[f64]> {
        self.velocities.as_deref()
    }

    /// 全部加速度
    pub fn accelerations(&self) -> Option<&[f64]> {
        self.accelerations.as_deref()
    }

    /// 全部力矩
    pub fn efforts(&self) -> Option<&[f64]> {
        self.efforts.as_deref()
    }

    /// 关节位置
    pub fn joint_positions(&self, index: JointIndex) -> &[f64] {
        &self.positions[self.model.variable_range(index)]
    }

    /// 按名称读取关节位置
    pub fn joint_positions_by_name(&self, name: &str) -> Option<&[f64]> {
        self.model.joint_index(name).map(|index| self.joint_positions(index))
    }

    /// 单变量关节的位置
    pub fn position(&self, name: &str) -> Option<f64> {
        match self.joint_positions_by_name(name) {
            Some([value]) => Some(*value),
            _ => None,
        }
    }

    /// 单变量关节的速度
    pub fn velocity(&self, name: &str) -> Option<f64> {
        let index = self.model.joint_index(name)?;
        self.velocities.as_ref().map(|v| v[self.model.variable_offset(index)])
    }

    /// 单变量关节的力矩
    pub fn effort(&self, name: &str) -> Option<f64> {
        let index = self.model.joint_index(name)?;
        self.efforts.as_ref().map(|e| e[self.model.variable_offset(index)])
    }

    /// 写入关节位置（`values` 长度必须等于关节变量数）
    pub fn set_joint_positions(&mut self, index: JointIndex, values: &[f64]) {
        let range = self.model.variable_range(index);
        self.positions[range].copy_from_slice(values);
    }

    /// 写入单变量关节速度（首次写入时分配零数组）
    pub fn set_joint_velocity(&mut self, index: JointIndex, velocity: f64) {
        let offset = self.model.variable_offset(index);
        let len = self.positions.len();
        self.velocities.get_or_insert_with(|| vec![0.0; len])[offset] = velocity;
    }

    /// 写入单变量关节力矩
    pub fn set_joint_effort(&mut self, index: JointIndex, effort: f64) {
        let offset = self.model.variable_offset(index);
        let len = self.positions.len();
        self.efforts.get_or_insert_with(|| vec![0.0; len])[offset] = effort;
    }

    /// 覆盖全部加速度
    pub fn set_accelerations(&mut self, accelerations: Vec<f64>) -> Result<(), MonitorError> {
        self.check_len(accelerations.len())?;
        self.accelerations = Some(accelerations);
        Ok(())
    }

    /// 变量名到位置的映射
    pub fn values(&self) -> BTreeMap<String, f64> {
        self.model
            .variable_names()
            .into_iter()
            .zip(self.positions.iter().copied())
            .collect()
    }

    /// 从另一状态复制
    ///
    /// 位置总是复制；`copy_dynamics` 为真时，源状态中存在的速度、加速度、力矩
    /// 也一并复制（源中不存在的数组保持目标原值）。
    ///
    /// # 错误
    ///
    /// - `MonitorError::ModelMismatch`: 变量数不同
    /// - `MonitorError::LayoutMismatch`: 变量数相同，但关节名称或类型不同
    pub fn copy_from(&mut self, source: &KinematicState, copy_dynamics: bool) -> Result<(), MonitorError> {
        self.check_len(source.positions.len())?;
        if !same_layout(&self.model, &source.model) {
            return Err(MonitorError::LayoutMismatch {
                expected: self.model.name().to_string(),
                actual: source.model.name().to_string(),
            });
        }
        self.positions.copy_from_slice(&source.positions);
        if copy_dynamics {
            if let Some(v) = &source.velocities {
                self.velocities = Some(v.clone());
            }
            if let Some(a) = &source.accelerations {
                self.accelerations = Some(a.clone());
            }
            if let Some(e) = &source.efforts {
                self.efforts = Some(e.clone());
            }
        }
        Ok(())
    }

    /// 关节是否满足边界（连续关节永远满足）
    pub fn satisfies_bounds(&self, index: JointIndex, margin: f64) -> bool {
        let Some(joint) = self.model.joint_at(index) else {
            return false;
        };
        if joint.kind.is_continuous() {
            return true;
        }
        self.joint_positions(index)
            .iter()
            .zip(&joint.bounds)
            .all(|(&v, b)| v >= b.min - margin && v <= b.max + margin)
    }

    /// 超出边界的关节名称
    pub fn out_of_bounds_joints(&self) -> Vec<String> {
        (0..self.model.joint_count())
            .filter(|&i| !self.satisfies_bounds(i, 0.0))
            .filter_map(|i| self.model.joint_at(i).map(|j| j.name.clone()))
            .collect()
    }

    fn check_len(&self, actual: usize) -> Result<(), MonitorError> {
        if actual == self.positions.len() {
            Ok(())
        } else {
            Err(MonitorError::ModelMismatch {
                expected: self.positions.len(),
                actual,
            })
        }
    }
}

/// 两个模型的关节顺序、名称与类型是否一致
fn same_layout(a: &Arc<RobotModel>, b: &Arc<RobotModel>) -> bool {
    Arc::ptr_eq(a, b)
        || (a.joint_count() == b.joint_count()
            && a.joints()
                .iter()
                .zip(b.joints())
                .all(|(x, y)| x.name == y.name && x.kind == y.kind))
}
