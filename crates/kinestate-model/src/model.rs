//! # 运动学模型目录
//!
//! [`RobotModel`] 是监视器唯一的模型输入：关节列表、每个关节在扁平变量向量中的偏移、
//! 名称索引以及关节分组。构造后不可变，可在任意线程无锁读取。
//!
//! # 从 TOML 加载
//!
//! ```toml
//! name = "mobile_arm"
//! model_frame = "odom"
//!
//! [[joints]]
//! name = "base"
//! kind = "planar"
//! child_frame = "base_link"
//!
//! [[joints]]
//! name = "shoulder"
//! kind = "revolute"
//! bounds = [[-3.14, 3.14]]
//!
//! [[groups]]
//! name = "arm"
//! joints = ["shoulder"]
//! ```

use crate::error::ModelError;
use crate::joint::{JointDescriptor, JointKind, VariableBounds};
use nalgebra::{Isometry3, Translation3, UnitQuaternion};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

/// 关节在模型中的索引
pub type JointIndex = usize;

/// 关节分组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JointGroup {
    /// 分组名称
    pub name: String,
    /// 分组内的关节名称
    pub joints: Vec<String>,
}

impl JointGroup {
    /// 创建分组
    pub fn new(name: impl Into<String>, joints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            joints: joints.into_iter().map(Into::into).collect(),
        }
    }

    /// 分组是否包含指定关节
    pub fn contains(&self, joint: &str) -> bool {
        self.joints.iter().any(|j| j == joint)
    }
}

/// 运动学模型（不可变）
#[derive(Debug, Clone, PartialEq)]
pub struct RobotModel {
    name: String,
    model_frame: String,
    joints: Vec<JointDescriptor>,
    /// 每个关节第一个变量在扁平向量中的偏移
    offsets: Vec<usize>,
    variable_count: usize,
    index: HashMap<String, JointIndex>,
    groups: BTreeMap<String, JointGroup>,
}

impl RobotModel {
    /// 创建 Builder
    pub fn builder(name: impl Into<String>) -> RobotModelBuilder {
        RobotModelBuilder::new(name)
    }

    /// 模型名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 模型根坐标系
    pub fn model_frame(&self) -> &str {
        &self.model_frame
    }

    /// 全部关节（按声明顺序）
    pub fn joints(&self) -> &[JointDescriptor] {
        &self.joints
    }

    /// 关节数量
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    /// 按名称查找关节索引
    pub fn joint_index(&self, name: &str) -> Option<JointIndex> {
        self.index.get(name).copied()
    }

    /// 按名称查找关节
    pub fn joint(&self, name: &str) -> Option<&JointDescriptor> {
        self.joint_index(name).map(|i| &self.joints[i])
    }

    /// 按索引获取关节
    pub fn joint_at(&self, index: JointIndex) -> Option<&JointDescriptor> {
        self.joints.get(index)
    }

    /// 活动关节（有变量且非 mimic）
    pub fn active_joints(&self) -> impl Iterator<Item = (JointIndex, &JointDescriptor)> {
        self.joints
            .iter()
            .enumerate()
            .filter(|(_, j)| j.variable_count() > 0 && !j.is_mimic())
    }

    /// 多自由度关节
    pub fn multi_dof_joints(&self) -> impl Iterator<Item = (JointIndex, &JointDescriptor)> {
        self.joints.iter().enumerate().filter(|(_, j)| j.is_multi_dof())
    }

    /// 是否存在多自由度关节
    pub fn has_multi_dof_joints(&self) -> bool {
        self.multi_dof_joints().next().is_some()
    }

    /// 扁平变量总数
    pub fn variable_count(&self) -> usize {
        self.variable_count
    }

    /// 关节变量在扁平向量中的偏移
    pub fn variable_offset(&self, index: JointIndex) -> usize {
        self.offsets[index]
    }

    /// 关节变量在扁平向量中的区间
    pub fn variable_range(&self, index: JointIndex) -> std::ops::Range<usize> {
        let start = self.offsets[index];
        start..start + self.joints[index].variable_count()
    }

    /// 全部变量名称（与扁平向量顺序一致）
    pub fn variable_names(&self) -> Vec<String> {
        self.joints.iter().flat_map(JointDescriptor::variable_names).collect()
    }

    /// 按名称查找分组
    pub fn group(&self, name: &str) -> Option<&JointGroup> {
        self.groups.get(name)
    }

    /// 全部分组
    pub fn groups(&self) -> impl Iterator<Item = &JointGroup> {
        self.groups.values()
    }

    /// 关节的父坐标系（未指定时为模型根坐标系）
    pub fn parent_frame_of<'a>(&'a self, joint: &'a JointDescriptor) -> &'a str {
        joint.parent_frame.as_deref().unwrap_or(&self.model_frame)
    }

    /// 从 TOML 字符串加载
    pub fn from_toml_str(content: &str) -> Result<Self, ModelError> {
        let file: ModelFile = toml::from_str(content)?;
        file.into_model()
    }

    /// 从 TOML 文件加载
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// RobotModel Builder（链式构造）
///
/// # Example
///
/// ```
/// use kinestate_model::{JointDescriptor, JointKind, RobotModel};
///
/// let model = RobotModel::builder("arm")
///     .joint(JointDescriptor::new("shoulder", JointKind::Revolute).with_bounds(-1.0, 1.0))
///     .joint(JointDescriptor::new("wrist", JointKind::Continuous))
///     .group("arm", ["shoulder", "wrist"])
///     .build()
///     .unwrap();
/// assert_eq!(model.variable_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RobotModelBuilder {
    name: String,
    model_frame: String,
    joints: Vec<JointDescriptor>,
    groups: Vec<JointGroup>,
}

impl RobotModelBuilder {
    /// 创建新的 Builder（默认根坐标系为 `"world"`）
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model_frame: "world".to_string(),
            joints: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// 设置模型根坐标系
    pub fn model_frame(mut self, frame: impl Into<String>) -> Self {
        self.model_frame = frame.into();
        self
    }

    /// 添加关节
    pub fn joint(mut self, joint: JointDescriptor) -> Self {
        self.joints.push(joint);
        self
    }

    /// 添加分组
    pub fn group(
        mut self,
        name: impl Into<String>,
        joints: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.groups.push(JointGroup::new(name, joints));
        self
    }

    /// 校验并构建模型
    pub fn build(self) -> Result<RobotModel, ModelError> {
        let mut index = HashMap::with_capacity(self.joints.len());
        let mut offsets = Vec::with_capacity(self.joints.len());
        let mut variable_count = 0;

        for (i, joint) in self.joints.iter().enumerate() {
            if index.insert(joint.name.clone(), i).is_some() {
                return Err(ModelError::DuplicateJoint(joint.name.clone()));
            }
            validate_joint(joint)?;
            offsets.push(variable_count);
            variable_count += joint.variable_count();
        }

        for joint in &self.joints {
            if let Some(target) = &joint.mimic
                && !index.contains_key(target)
            {
                return Err(ModelError::UnknownMimicTarget {
                    joint: joint.name.clone(),
                    target: target.clone(),
                });
            }
        }

        let mut groups = BTreeMap::new();
        for group in self.groups {
            if let Some(unknown) = group.joints.iter().find(|j| !index.contains_key(*j)) {
                return Err(ModelError::UnknownGroupJoint {
                    group: group.name.clone(),
                    joint: unknown.clone(),
                });
            }
            if groups.contains_key(&group.name) {
                return Err(ModelError::DuplicateGroup(group.name));
            }
            groups.insert(group.name.clone(), group);
        }

        Ok(RobotModel {
            name: self.name,
            model_frame: self.model_frame,
            joints: self.joints,
            offsets,
            variable_count,
            index,
            groups,
        })
    }
}

fn validate_joint(joint: &JointDescriptor) -> Result<(), ModelError> {
    if joint.bounds.len() != joint.variable_count() {
        return Err(ModelError::BoundsMismatch {
            joint: joint.name.clone(),
            expected: joint.variable_count(),
            actual: joint.bounds.len(),
        });
    }
    if let Some(b) = joint.bounds.iter().find(|b| b.min > b.max) {
        return Err(ModelError::InvertedBounds {
            joint: joint.name.clone(),
            min: b.min,
            max: b.max,
        });
    }
    if joint.is_multi_dof() && joint.child_frame.is_none() {
        return Err(ModelError::MissingChildFrame(joint.name.clone()));
    }
    Ok(())
}

// ============================================================
// TOML 格式
// ============================================================

/// 原点偏移（URDF 风格：平移 + roll/pitch/yaw）
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct OriginEntry {
    #[serde(default)]
    xyz: [f64; 3],
    #[serde(default)]
    rpy: [f64; 3],
}

impl OriginEntry {
    fn to_isometry(self) -> Isometry3<f64> {
        let [x, y, z] = self.xyz;
        let [roll, pitch, yaw] = self.rpy;
        Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JointEntry {
    name: String,
    kind: JointKind,
    #[serde(default)]
    passive: bool,
    #[serde(default)]
    mimic: Option<String>,
    /// 省略时使用该类型的默认边界
    #[serde(default)]
    bounds: Option<Vec<[f64; 2]>>,
    #[serde(default)]
    parent_frame: Option<String>,
    #[serde(default)]
    child_frame: Option<String>,
    #[serde(default)]
    origin: Option<OriginEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModelFile {
    name: String,
    #[serde(default = "default_model_frame")]
    model_frame: String,
    #[serde(default)]
    joints: Vec<JointEntry>,
    #[serde(default)]
    groups: Vec<JointGroup>,
}

fn default_model_frame() -> String {
    "world".to_string()
}

impl ModelFile {
    fn into_model(self) -> Result<RobotModel, ModelError> {
        let mut builder = RobotModelBuilder::new(self.name).model_frame(self.model_frame);
        for entry in self.joints {
            let mut joint = JointDescriptor::new(entry.name, entry.kind).passive(entry.passive);
            if let Some(bounds) = entry.bounds {
                joint = joint.with_variable_bounds(
                    bounds.into_iter().map(|[min, max]| VariableBounds::new(min, max)).collect(),
                );
            }
            joint.mimic = entry.mimic;
            joint.parent_frame = entry.parent_frame;
            joint.child_frame = entry.child_frame;
            if let Some(origin) = entry.origin {
                joint.origin = origin.to_isometry();
            }
            builder = builder.joint(joint);
        }
        for group in self.groups {
            builder = builder.group(group.name, group.joints);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MOBILE_ARM: &str = r#"
name = "mobile_arm"
model_frame = "odom"

[[joints]]
name = "base"
kind = "planar"
child_frame = "base_link"
origin = { xyz = [0.0, 0.0, 0.1] }

[[joints]]
name = "shoulder"
kind = "revolute"
bounds = [[-1.5, 1.5]]

[[joints]]
name = "wrist"
kind = "continuous"

[[joints]]
name = "caster"
kind = "continuous"
passive = true

[[joints]]
name = "finger_right"
kind = "prismatic"
bounds = [[0.0, 0.04]]
mimic = "finger_left"

[[joints]]
name = "finger_left"
kind = "prismatic"
bounds = [[0.0, 0.04]]

[[joints]]
name = "camera_mount"
kind = "fixed"

[[groups]]
name = "arm"
joints = ["shoulder", "wrist"]
"#;

    fn arm_model() -> RobotModel {
        RobotModel::from_toml_str(MOBILE_ARM).unwrap()
    }

    #[test]
    fn test_load_from_toml() {
        let model = arm_model();
        assert_eq!(model.name(), "mobile_arm");
        assert_eq!(model.model_frame(), "odom");
        assert_eq!(model.joint_count(), 7);
        // 3 (planar) + 1 + 1 + 1 + 1 + 1 + 0
        assert_eq!(model.variable_count(), 8);

        let base = model.joint("base").unwrap();
        assert_eq!(base.kind, JointKind::Planar);
        assert!(!base.origin_is_identity());
        assert_eq!(model.parent_frame_of(base), "odom");

        let shoulder = model.joint("shoulder").unwrap();
        assert_eq!(shoulder.single_bounds(), Some(&VariableBounds::new(-1.5, 1.5)));

        assert!(model.joint("caster").unwrap().passive);
        assert!(model.joint("finger_right").unwrap().is_mimic());
    }

    #[test]
    fn test_variable_layout() {
        let model = arm_model();
        let shoulder = model.joint_index("shoulder").unwrap();
        assert_eq!(model.variable_offset(shoulder), 3);
        assert_eq!(model.variable_range(0), 0..3);

        let names = model.variable_names();
        assert_eq!(names.len(), model.variable_count());
        assert_eq!(&names[..4], &["base/x", "base/y", "base/theta", "shoulder"]);
    }

    #[test]
    fn test_active_and_multi_dof_joints() {
        let model = arm_model();
        let active: Vec<&str> = model.active_joints().map(|(_, j)| j.name.as_str()).collect();
        // 排除 mimic 与 fixed，被动关节仍属于活动关节
        assert_eq!(active, vec!["base", "shoulder", "wrist", "caster", "finger_left"]);

        let multi: Vec<&str> = model.multi_dof_joints().map(|(_, j)| j.name.as_str()).collect();
        assert_eq!(multi, vec!["base"]);
        assert!(model.has_multi_dof_joints());
    }

    #[test]
    fn test_groups() {
        let model = arm_model();
        let arm = model.group("arm").unwrap();
        assert!(arm.contains("shoulder"));
        assert!(!arm.contains("base"));
        assert!(model.group("legs").is_none());
        assert_eq!(model.groups().count(), 1);
    }

    #[test]
    fn test_duplicate_joint_rejected() {
        let result = RobotModel::builder("dup")
            .joint(JointDescriptor::new("a", JointKind::Revolute))
            .joint(JointDescriptor::new("a", JointKind::Prismatic))
            .build();
        assert!(matches!(result, Err(ModelError::DuplicateJoint(name)) if name == "a"));
    }

    #[test]
    fn test_bounds_mismatch_rejected() {
        let joint = JointDescriptor::new("base", JointKind::Planar)
            .with_frames(None, "base_link")
            .with_bounds(-1.0, 1.0);
        let result = RobotModel::builder("m").joint(joint).build();
        assert!(matches!(
            result,
            Err(ModelError::BoundsMismatch { expected: 3, actual: 1, .. })
        ));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let joint = JointDescriptor::new("a", JointKind::Revolute).with_bounds(1.0, -1.0);
        let result = RobotModel::builder("m").joint(joint).build();
        assert!(matches!(result, Err(ModelError::InvertedBounds { .. })));
    }

    #[test]
    fn test_multi_dof_requires_child_frame() {
        let result = RobotModel::builder("m")
            .joint(JointDescriptor::new("base", JointKind::Floating))
            .build();
        assert!(matches!(result, Err(ModelError::MissingChildFrame(_))));
    }

    #[test]
    fn test_unknown_references_rejected() {
        let result = RobotModel::builder("m")
            .joint(JointDescriptor::new("a", JointKind::Revolute).mimic_of("ghost"))
            .build();
        assert!(matches!(result, Err(ModelError::UnknownMimicTarget { .. })));

        let result = RobotModel::builder("m")
            .joint(JointDescriptor::new("a", JointKind::Revolute))
            .group("g", ["a", "b"])
            .build();
        assert!(matches!(
            result,
            Err(ModelError::UnknownGroupJoint { joint, .. }) if joint == "b"
        ));

        let result = RobotModel::builder("m")
            .joint(JointDescriptor::new("a", JointKind::Revolute))
            .group("g", ["a"])
            .group("g", ["a"])
            .build();
        assert!(matches!(result, Err(ModelError::DuplicateGroup(_))));
    }

    #[test]
    fn test_invalid_toml() {
        let result = RobotModel::from_toml_str("name = ");
        assert!(matches!(result, Err(ModelError::Parse(_))));

        let result = RobotModel::from_toml_str("name = \"x\"\n[[joints]]\nname = \"a\"\nkind = \"hinge\"\n");
        assert!(matches!(result, Err(ModelError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MOBILE_ARM.as_bytes()).unwrap();

        let model = RobotModel::load_from_file(file.path()).unwrap();
        assert_eq!(model.joint_count(), 7);

        let missing = RobotModel::load_from_file("/nonexistent/kinestate/model.toml");
        assert!(matches!(missing, Err(ModelError::Io(_))));
    }
}
