//! # 关节描述
//!
//! 关节类型是一个封闭的枚举（[`JointKind`]），每种类型的行为（变量数量、
//! 变换→变量转换、距离度量）都由类型标签数据驱动分派，而不是子类重写。
//!
//! | 类型 | 变量数 | 变量 |
//! |------|--------|------|
//! | Fixed | 0 | - |
//! | Revolute / Continuous / Prismatic | 1 | 关节名本身 |
//! | Planar | 3 | `x`, `y`, `theta` |
//! | Floating | 7 | `trans_x..z`, `rot_x..w`（四元数） |

use nalgebra::{Isometry3, Quaternion, UnitQuaternion};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::f64::consts::{PI, TAU};

/// 单个关节的最大变量数（Floating：3 平移 + 4 四元数）
pub const MAX_JOINT_VARIABLES: usize = 7;

/// 单个关节的变量值（栈上分配）
pub type JointValues = SmallVec<[f64; MAX_JOINT_VARIABLES]>;

const PLANAR_VARIABLES: [&str; 3] = ["x", "y", "theta"];
const FLOATING_VARIABLES: [&str; 7] = [
    "trans_x", "trans_y", "trans_z", "rot_x", "rot_y", "rot_z", "rot_w",
];

/// 角度差（考虑回绕，返回 `[0, PI]`）
fn wrapped_angle_distance(a: f64, b: f64) -> f64 {
    let d = (b - a).rem_euclid(TAU);
    if d > PI { TAU - d } else { d }
}

/// 关节类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JointKind {
    /// 固定关节（无变量）
    Fixed,
    /// 有界旋转关节
    Revolute,
    /// 连续旋转关节（无界，可无限回绕）
    Continuous,
    /// 平移关节
    Prismatic,
    /// 平面关节（多自由度：x, y, theta）
    Planar,
    /// 浮动关节（多自由度：平移 + 四元数）
    Floating,
}

impl JointKind {
    /// 变量数量
    pub const fn variable_count(self) -> usize {
        match self {
            JointKind::Fixed => 0,
            JointKind::Revolute | JointKind::Continuous | JointKind::Prismatic => 1,
            JointKind::Planar => 3,
            JointKind::Floating => 7,
        }
    }

    /// 是否为多自由度关节（由变换反馈驱动）
    pub const fn is_multi_dof(self) -> bool {
        matches!(self, JointKind::Planar | JointKind::Floating)
    }

    /// 是否为连续旋转关节
    pub const fn is_continuous(self) -> bool {
        matches!(self, JointKind::Continuous)
    }

    /// 多自由度关节的变量后缀（单变量关节返回空切片）
    pub fn variable_suffixes(self) -> &'static [&'static str] {
        match self {
            JointKind::Planar => &PLANAR_VARIABLES,
            JointKind::Floating => &FLOATING_VARIABLES,
            _ => &[],
        }
    }

    /// 将空间变换转换为关节变量
    ///
    /// - Planar: `(x, y, yaw)`
    /// - Floating: `(x, y, z, qx, qy, qz, qw)`
    ///
    /// 非多自由度关节返回 `None`。
    pub fn transform_to_variables(self, transform: &Isometry3<f64>) -> Option<JointValues> {
        let t = &transform.translation.vector;
        match self {
            JointKind::Planar => {
                let (_, _, yaw) = transform.rotation.euler_angles();
                Some(SmallVec::from_slice(&[t.x, t.y, yaw]))
            },
            JointKind::Floating => {
                let q = &transform.rotation.quaternion().coords;
                Some(SmallVec::from_slice(&[t.x, t.y, t.z, q.x, q.y, q.z, q.w]))
            },
            _ => None,
        }
    }

    /// 关节空间距离
    ///
    /// - Revolute / Prismatic: `|a - b|`
    /// - Continuous: 回绕后的最短角度差
    /// - Planar: xy 欧氏距离 + 回绕角度差
    /// - Floating: 平移欧氏距离 + 两个姿态之间的旋转角
    /// - Fixed: 0
    ///
    /// 变量数量不足时返回 `f64::INFINITY`（视为完全不同）。
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        let n = self.variable_count();
        if a.len() < n || b.len() < n {
            return f64::INFINITY;
        }
        match self {
            JointKind::Fixed => 0.0,
            JointKind::Revolute | JointKind::Prismatic => (a[0] - b[0]).abs(),
            JointKind::Continuous => wrapped_angle_distance(a[0], b[0]),
            JointKind::Planar => {
                let dx = a[0] - b[0];
                let dy = a[1] - b[1];
                dx.hypot(dy) + wrapped_angle_distance(a[2], b[2])
            },
            JointKind::Floating => {
                let dx = a[0] - b[0];
                let dy = a[1] - b[1];
                let dz = a[2] - b[2];
                let translation = (dx * dx + dy * dy + dz * dz).sqrt();
                let qa = UnitQuaternion::from_quaternion(Quaternion::new(a[6], a[3], a[4], a[5]));
                let qb = UnitQuaternion::from_quaternion(Quaternion::new(b[6], b[3], b[4], b[5]));
                translation + qa.angle_to(&qb)
            },
        }
    }
}

/// 变量边界 `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VariableBounds {
    /// 下限
    pub min: f64,
    /// 上限
    pub max: f64,
}

impl VariableBounds {
    /// 无界
    pub const UNBOUNDED: VariableBounds = VariableBounds {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    /// 创建边界
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// 值是否在边界内（闭区间）
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// 边界吸附
    ///
    /// 若值在边界外但距离最近边界不超过 `epsilon`，返回该边界；
    /// 其余情况（边界内，或超出超过 `epsilon`）原样返回。
    ///
    /// # 示例
    ///
    /// ```
    /// use kinestate_model::VariableBounds;
    ///
    /// let b = VariableBounds::new(0.5, 1.0);
    /// assert_eq!(b.snap(0.5 - f64::EPSILON / 2.0, f64::EPSILON), 0.5);
    /// assert_eq!(b.snap(0.5 - 2.0 * f64::EPSILON, f64::EPSILON), 0.5 - 2.0 * f64::EPSILON);
    /// ```
    pub fn snap(&self, value: f64, epsilon: f64) -> f64 {
        if value < self.min && value >= self.min - epsilon {
            self.min
        } else if value > self.max && value <= self.max + epsilon {
            self.max
        } else {
            value
        }
    }

    /// 默认值：0 在边界内取 0，否则取中点
    pub fn default_value(&self) -> f64 {
        if self.contains(0.0) {
            0.0
        } else if self.min.is_finite() && self.max.is_finite() {
            (self.min + self.max) / 2.0
        } else if self.min.is_finite() {
            self.min
        } else {
            self.max
        }
    }
}

impl Default for VariableBounds {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

/// 关节描述（由模型目录持有，监视器只读引用）
#[derive(Debug, Clone, PartialEq)]
pub struct JointDescriptor {
    /// 关节名称
    pub name: String,
    /// 关节类型
    pub kind: JointKind,
    /// 被动关节（不直接驱动，不计入完整性要求）
    pub passive: bool,
    /// Mimic 源关节名称（值由源关节推导，从不被独立上报）
    pub mimic: Option<String>,
    /// 每个变量一组边界
    pub bounds: Vec<VariableBounds>,
    /// 父坐标系（`None` 表示模型根坐标系）
    pub parent_frame: Option<String>,
    /// 子坐标系（多自由度关节必填）
    pub child_frame: Option<String>,
    /// 关节原点静态偏移
    pub origin: Isometry3<f64>,
}

impl JointDescriptor {
    /// 创建关节描述（默认无界、非被动、非 mimic、原点为单位变换）
    pub fn new(name: impl Into<String>, kind: JointKind) -> Self {
        let bounds = match kind {
            // 四元数分量天然位于 [-1, 1]
            JointKind::Floating => {
                let mut b = vec![VariableBounds::UNBOUNDED; 3];
                b.extend([VariableBounds::new(-1.0, 1.0); 4]);
                b
            },
            _ => vec![VariableBounds::UNBOUNDED; kind.variable_count()],
        };
        Self {
            name: name.into(),
            kind,
            passive: false,
            mimic: None,
            bounds,
            parent_frame: None,
            child_frame: None,
            origin: Isometry3::identity(),
        }
    }

    /// 设置单变量边界
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = vec![VariableBounds::new(min, max)];
        self
    }

    /// 设置全部变量边界
    pub fn with_variable_bounds(mut self, bounds: Vec<VariableBounds>) -> Self {
        self.bounds = bounds;
        self
    }

    /// 标记为被动关节
    pub fn passive(mut self, passive: bool) -> Self {
        self.passive = passive;
        self
    }

    /// 标记为 mimic 关节
    pub fn mimic_of(mut self, source: impl Into<String>) -> Self {
        self.mimic = Some(source.into());
        self
    }

    /// 设置父/子坐标系
    pub fn with_frames(mut self, parent: Option<String>, child: impl Into<String>) -> Self {
        self.parent_frame = parent;
        self.child_frame = Some(child.into());
        self
    }

    /// 设置原点偏移
    pub fn with_origin(mut self, origin: Isometry3<f64>) -> Self {
        self.origin = origin;
        self
    }

    /// 变量数量
    pub fn variable_count(&self) -> usize {
        self.kind.variable_count()
    }

    /// 是否为多自由度关节
    pub fn is_multi_dof(&self) -> bool {
        self.kind.is_multi_dof()
    }

    /// 是否为 mimic 关节
    pub fn is_mimic(&self) -> bool {
        self.mimic.is_some()
    }

    /// 原点偏移是否为单位变换
    pub fn origin_is_identity(&self) -> bool {
        self.origin == Isometry3::identity()
    }

    /// 单变量关节的边界
    pub fn single_bounds(&self) -> Option<&VariableBounds> {
        if self.variable_count() == 1 {
            self.bounds.first()
        } else {
            None
        }
    }

    /// 变量名称
    ///
    /// 单变量关节返回关节名本身，多自由度关节返回 `<joint>/<suffix>`。
    pub fn variable_names(&self) -> Vec<String> {
        match self.variable_count() {
            0 => Vec::new(),
            1 => vec![self.name.clone()],
            _ => self
                .kind
                .variable_suffixes()
                .iter()
                .map(|suffix| format!("{}/{}", self.name, suffix))
                .collect(),
        }
    }

    /// 默认变量值
    ///
    /// 浮动关节的默认姿态为单位四元数（`rot_w = 1`）。
    pub fn default_positions(&self) -> JointValues {
        let mut values: JointValues = self.bounds.iter().map(VariableBounds::default_value).collect();
        values.resize(self.variable_count(), 0.0);
        if self.kind == JointKind::Floating {
            values[3..6].fill(0.0);
            values[6] = 1.0;
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, Vector3};

    #[test]
    fn test_variable_counts() {
        assert_eq!(JointKind::Fixed.variable_count(), 0);
        assert_eq!(JointKind::Revolute.variable_count(), 1);
        assert_eq!(JointKind::Continuous.variable_count(), 1);
        assert_eq!(JointKind::Prismatic.variable_count(), 1);
        assert_eq!(JointKind::Planar.variable_count(), 3);
        assert_eq!(JointKind::Floating.variable_count(), 7);
        assert!(JointKind::Planar.is_multi_dof());
        assert!(!JointKind::Continuous.is_multi_dof());
    }

    #[test]
    fn test_snap_within_epsilon() {
        let b = VariableBounds::new(0.5, 1.0);
        let eps = f64::EPSILON;

        // 边界内：原样
        assert_eq!(b.snap(0.75, eps), 0.75);
        // 下限外 eps/2：吸附到下限
        assert_eq!(b.snap(0.5 - eps / 2.0, eps), 0.5);
        // 下限外 2*eps：原样保留
        assert_eq!(b.snap(0.5 - 2.0 * eps, eps), 0.5 - 2.0 * eps);
        // 上限外 eps/2：吸附到上限
        assert_eq!(b.snap(1.0 + eps / 2.0, 1e-9), 1.0);
        // 明显越界：原样保留
        assert_eq!(b.snap(3.0, eps), 3.0);
    }

    #[test]
    fn test_default_value() {
        assert_eq!(VariableBounds::new(-1.0, 1.0).default_value(), 0.0);
        assert_eq!(VariableBounds::new(0.5, 1.0).default_value(), 0.75);
        assert_eq!(VariableBounds::UNBOUNDED.default_value(), 0.0);
        assert_eq!(VariableBounds::new(2.0, f64::INFINITY).default_value(), 2.0);
    }

    #[test]
    fn test_continuous_distance_wraps() {
        let d = JointKind::Continuous.distance(&[PI - 0.1], &[-PI + 0.1]);
        assert_relative_eq!(d, 0.2, epsilon = 1e-12);

        let d = JointKind::Revolute.distance(&[PI - 0.1], &[-PI + 0.1]);
        assert_relative_eq!(d, TAU - 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_planar_conversion_and_distance() {
        let tf = Isometry3::new(Vector3::new(1.0, 2.0, 0.0), Vector3::new(0.0, 0.0, 0.5));
        let values = JointKind::Planar.transform_to_variables(&tf).unwrap();
        assert_eq!(values.len(), 3);
        assert_relative_eq!(values[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(values[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(values[2], 0.5, epsilon = 1e-12);

        let d = JointKind::Planar.distance(&[0.0, 0.0, PI], &[3.0, 4.0, -PI]);
        assert_relative_eq!(d, 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_floating_conversion_and_distance() {
        let tf = Isometry3::from_parts(
            Translation3::new(0.1, 0.2, 0.3),
            UnitQuaternion::from_euler_angles(0.0, 0.0, 0.3),
        );
        let values = JointKind::Floating.transform_to_variables(&tf).unwrap();
        assert_eq!(values.len(), 7);
        assert_relative_eq!(values[2], 0.3, epsilon = 1e-12);

        // 自身距离为零
        assert_relative_eq!(JointKind::Floating.distance(&values, &values), 0.0, epsilon = 1e-9);

        // 只差旋转
        let identity = [0.1, 0.2, 0.3, 0.0, 0.0, 0.0, 1.0];
        let d = JointKind::Floating.distance(&identity, &values);
        assert_relative_eq!(d, 0.3, epsilon = 1e-9);
    }

    #[test]
    fn test_single_dof_has_no_transform_conversion() {
        let tf = Isometry3::identity();
        assert!(JointKind::Revolute.transform_to_variables(&tf).is_none());
        assert!(JointKind::Fixed.transform_to_variables(&tf).is_none());
    }

    #[test]
    fn test_distance_with_short_input() {
        assert_eq!(JointKind::Planar.distance(&[0.0], &[0.0, 0.0, 0.0]), f64::INFINITY);
        assert_eq!(JointKind::Fixed.distance(&[], &[]), 0.0);
    }

    #[test]
    fn test_variable_names() {
        let j = JointDescriptor::new("elbow", JointKind::Revolute);
        assert_eq!(j.variable_names(), vec!["elbow".to_string()]);

        let base = JointDescriptor::new("base", JointKind::Planar);
        assert_eq!(
            base.variable_names(),
            vec!["base/x".to_string(), "base/y".to_string(), "base/theta".to_string()]
        );

        let fixed = JointDescriptor::new("mount", JointKind::Fixed);
        assert!(fixed.variable_names().is_empty());
    }

    #[test]
    fn test_default_positions() {
        let j = JointDescriptor::new("lift", JointKind::Prismatic).with_bounds(0.5, 1.0);
        assert_eq!(j.default_positions().as_slice(), &[0.75]);

        let f = JointDescriptor::new("world", JointKind::Floating);
        assert_eq!(
            f.default_positions().as_slice(),
            &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]
        );
    }

    #[test]
    fn test_origin_identity() {
        let j = JointDescriptor::new("base", JointKind::Planar);
        assert!(j.origin_is_identity());

        let j = j.with_origin(Isometry3::translation(0.0, 0.0, 0.1));
        assert!(!j.origin_is_identity());
    }
}
