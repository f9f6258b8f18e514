//! 边界吸附与距离度量的属性测试

use kinestate_model::{JointKind, VariableBounds};
use proptest::prelude::*;

proptest! {
    /// 边界内的值永远不被修改
    #[test]
    fn snap_keeps_in_range_values(min in -10.0f64..0.0, span in 0.0f64..10.0, t in 0.0f64..=1.0) {
        let b = VariableBounds::new(min, min + span);
        let value = min + span * t;
        prop_assume!(b.contains(value));
        prop_assert_eq!(b.snap(value, f64::EPSILON), value);
    }

    /// 吸附结果要么是原值，要么恰好是某个边界
    #[test]
    fn snap_result_is_value_or_bound(min in -10.0f64..0.0, span in 0.0f64..10.0, value in -20.0f64..20.0, eps in 0.0f64..1e-3) {
        let b = VariableBounds::new(min, min + span);
        let snapped = b.snap(value, eps);
        prop_assert!(snapped == value || snapped == b.min || snapped == b.max);
        // 吸附只会缩小与区间的距离
        if snapped != value {
            prop_assert!((snapped - value).abs() <= eps + 1e-12);
        }
    }

    /// 吸附是幂等的
    #[test]
    fn snap_is_idempotent(min in -10.0f64..0.0, span in 0.0f64..10.0, value in -20.0f64..20.0, eps in 0.0f64..1e-3) {
        let b = VariableBounds::new(min, min + span);
        let once = b.snap(value, eps);
        prop_assert_eq!(b.snap(once, eps), once);
    }

    /// 连续关节距离对称且不超过 PI
    #[test]
    fn continuous_distance_symmetric(a in -100.0f64..100.0, b in -100.0f64..100.0) {
        let d1 = JointKind::Continuous.distance(&[a], &[b]);
        let d2 = JointKind::Continuous.distance(&[b], &[a]);
        prop_assert!((d1 - d2).abs() < 1e-9);
        prop_assert!((0.0..=std::f64::consts::PI + 1e-12).contains(&d1));
    }

    /// 平面关节到自身的距离为零
    #[test]
    fn planar_distance_to_self_is_zero(x in -5.0f64..5.0, y in -5.0f64..5.0, theta in -10.0f64..10.0) {
        let v = [x, y, theta];
        prop_assert!(JointKind::Planar.distance(&v, &v) < 1e-12);
    }
}
