//! 反馈线程与生命周期测试
//!
//! 通过进程内总线和变换缓冲区驱动监视器，验证端到端的合并、唤醒与停止行为。

use kinestate_model::{Isometry3, JointDescriptor, JointKind, RobotModel, Timestamp};
use kinestate_monitor::{
    JointStateBus, JointStateUpdate, MonitorConfig, MonitorError, StateMonitor, TransformBuffer,
    TransformStamped,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn model() -> RobotModel {
    RobotModel::builder("mobile_arm")
        .model_frame("odom")
        .joint(JointDescriptor::new("base", JointKind::Planar).with_frames(None, "base_link"))
        .joint(JointDescriptor::new("shoulder", JointKind::Revolute).with_bounds(-1.5, 1.5))
        .joint(JointDescriptor::new("wrist", JointKind::Continuous))
        .build()
        .unwrap()
}

fn fast_config() -> MonitorConfig {
    MonitorConfig {
        feed_poll_interval_ms: 2,
        shutdown_timeout_ms: 1_000,
        ..Default::default()
    }
}

/// 轮询直到条件成立（反馈线程异步合并）
fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < WAIT {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

#[test]
fn test_position_feed_end_to_end() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = StateMonitor::builder(model()).config(fast_config()).build();
    monitor.start(bus.clone(), "joint_states").unwrap();
    assert!(monitor.is_active());
    assert_eq!(monitor.monitored_topic().as_deref(), Some("/joint_states"));
    assert!(monitor.monitor_start_time().is_some());

    let stamp = Timestamp::from_micros(1_000_000);
    assert_eq!(
        bus.publish(
            "joint_states",
            JointStateUpdate::new(stamp).with_joint("shoulder", 0.3).with_joint("wrist", 7.0),
        ),
        1
    );

    assert!(monitor.wait_for_state(stamp, WAIT));
    let state = monitor.current_state();
    assert_eq!(state.position("shoulder"), Some(0.3));
    assert_eq!(state.position("wrist"), Some(7.0));
    // 底座由变换驱动，仍然缺失
    assert_eq!(monitor.missing_joints(), vec!["base".to_string()]);

    monitor.stop();
    assert!(!monitor.is_active());
    assert_eq!(monitor.monitored_topic(), None);
}

#[test]
fn test_malformed_batch_from_feed_is_dropped() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = StateMonitor::builder(model()).config(fast_config()).build();
    monitor.start(bus.clone(), "joint_states").unwrap();

    let mut bad = JointStateUpdate::new(Timestamp::from_micros(10)).with_joint("shoulder", 0.3);
    bad.positions.push(0.1);
    bus.publish("joint_states", bad);
    let good = Timestamp::from_micros(20);
    bus.publish("joint_states", JointStateUpdate::new(good).with_joint("wrist", 1.0));

    assert!(monitor.wait_for_state(good, WAIT));
    assert_eq!(monitor.current_state().position("shoulder"), Some(0.0));
    let metrics = monitor.metrics();
    assert_eq!(metrics.batches_received, 2);
    assert_eq!(metrics.batches_rejected, 1);
}

#[test]
fn test_wait_for_batches_drains_out_of_order_feed() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = StateMonitor::builder(model()).config(fast_config()).build();
    monitor.start(bus.clone(), "joint_states").unwrap();

    // 最新的时间戳最先到达，之后的批次更早
    bus.publish(
        "joint_states",
        JointStateUpdate::new(Timestamp::from_micros(9_000_000)).with_joint("shoulder", 0.1),
    );
    for _ in 0..2_000 {
        bus.publish(
            "joint_states",
            JointStateUpdate::new(Timestamp::from_micros(1_000)).with_joint("shoulder", 0.2),
        );
    }
    bus.publish(
        "joint_states",
        JointStateUpdate::new(Timestamp::from_micros(1_000)).with_joint("wrist", -0.4),
    );

    assert!(monitor.wait_for_batches(2_002, WAIT));
    monitor.stop();

    let metrics = monitor.metrics();
    assert_eq!(metrics.batches_processed, 2_002);
    assert_eq!(metrics.batches_received, 2_002);
    let state = monitor.current_state();
    assert_eq!(state.position("shoulder"), Some(0.2));
    assert_eq!(state.position("wrist"), Some(-0.4));
    assert_eq!(monitor.current_state_time(), Timestamp::from_micros(9_000_000));
}

#[test]
fn test_wait_for_batches_times_out() {
    let monitor = StateMonitor::new(model());
    let start = Instant::now();
    assert!(!monitor.wait_for_batches(1, Duration::from_millis(50)));
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(monitor.wait_for_batches(0, Duration::ZERO));
}

#[test]
fn test_transform_feed_end_to_end() {
    let bus = Arc::new(JointStateBus::new());
    let buffer = Arc::new(TransformBuffer::new());
    let monitor = StateMonitor::builder(model())
        .config(fast_config())
        .transform_provider(buffer.clone())
        .build();
    let callbacks = Arc::new(AtomicUsize::new(0));
    {
        let callbacks = callbacks.clone();
        monitor.add_update_callback(Arc::new(move |update: &JointStateUpdate| {
            // 变换触发的回调收到空批次
            assert!(update.is_empty());
            callbacks.fetch_add(1, Ordering::SeqCst);
        }));
    }
    monitor.start(bus.clone(), "joint_states").unwrap();

    let stamp = Timestamp::from_micros(2_000);
    buffer.set_transform(TransformStamped::new(
        "odom",
        "base_link",
        stamp,
        Isometry3::translation(1.0, 2.0, 0.0),
    ));

    assert!(monitor.wait_for_state(stamp, WAIT));
    assert!(eventually(|| callbacks.load(Ordering::SeqCst) == 1));
    let values = monitor.current_state_values();
    assert!((values["base/x"] - 1.0).abs() < 1e-12);
    assert!((values["base/y"] - 2.0).abs() < 1e-12);
    assert_eq!(monitor.joint_update_time("base"), Some(stamp));

    monitor.stop();
}

#[test]
fn test_start_twice_is_noop() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = StateMonitor::builder(model()).config(fast_config()).build();
    monitor.start(bus.clone(), "joint_states").unwrap();
    let started = monitor.monitor_start_time();

    monitor.start(bus.clone(), "other_topic").unwrap();
    assert_eq!(monitor.monitored_topic().as_deref(), Some("/joint_states"));
    assert_eq!(monitor.monitor_start_time(), started);
    assert_eq!(bus.subscriber_count("joint_states"), 1);
    assert_eq!(bus.subscriber_count("other_topic"), 0);
}

#[test]
fn test_empty_topic_rejected() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = StateMonitor::new(model());
    assert!(matches!(monitor.start(bus, ""), Err(MonitorError::EmptyTopic)));
    assert!(!monitor.is_active());
}

#[test]
fn test_stop_is_idempotent_and_safe_before_start() {
    let monitor = StateMonitor::builder(model()).config(fast_config()).build();
    monitor.stop();
    monitor.stop();
    assert!(!monitor.is_active());

    let bus = Arc::new(JointStateBus::new());
    monitor.start(bus.clone(), "joint_states").unwrap();
    monitor.stop();
    monitor.stop();
    assert!(!monitor.is_active());
}

#[test]
fn test_stopped_monitor_stays_queryable() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = StateMonitor::builder(model()).config(fast_config()).build();
    monitor.start(bus.clone(), "joint_states").unwrap();

    let stamp = Timestamp::from_micros(100);
    bus.publish("joint_states", JointStateUpdate::new(stamp).with_joint("shoulder", 0.5));
    assert!(monitor.wait_for_state(stamp, WAIT));
    monitor.stop();

    // 订阅已释放，后续发布不再投递
    assert_eq!(
        bus.publish(
            "joint_states",
            JointStateUpdate::new(Timestamp::from_micros(200)).with_joint("shoulder", 0.9)
        ),
        0
    );
    assert_eq!(monitor.current_state().position("shoulder"), Some(0.5));
    assert_eq!(monitor.current_state_time(), stamp);

    // 仍然可以直接合并
    assert!(monitor
        .merge_update(&JointStateUpdate::new(Timestamp::from_micros(300)).with_joint("shoulder", 0.7))
        .unwrap());
}

#[test]
fn test_restart_after_stop() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = StateMonitor::builder(model()).config(fast_config()).build();
    monitor.start(bus.clone(), "joint_states").unwrap();
    monitor.stop();
    monitor.start(bus.clone(), "arm/joint_states").unwrap();
    assert_eq!(monitor.monitored_topic().as_deref(), Some("/arm/joint_states"));

    let stamp = Timestamp::from_micros(50);
    bus.publish("arm/joint_states", JointStateUpdate::new(stamp).with_joint("wrist", 2.0));
    assert!(monitor.wait_for_state(stamp, WAIT));
}

#[test]
fn test_drop_releases_subscription() {
    let bus = Arc::new(JointStateBus::new());
    {
        let monitor = StateMonitor::builder(model()).config(fast_config()).build();
        monitor.start(bus.clone(), "joint_states").unwrap();
    }
    let delivered = bus.publish(
        "joint_states",
        JointStateUpdate::new(Timestamp::from_micros(1)).with_joint("wrist", 1.0),
    );
    assert_eq!(delivered, 0);
}

#[test]
fn test_stop_from_callback_does_not_hang() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = Arc::new(StateMonitor::builder(model()).config(fast_config()).build());
    let stopped = Arc::new(AtomicUsize::new(0));
    {
        let weak = Arc::downgrade(&monitor);
        let stopped = stopped.clone();
        monitor.add_update_callback(Arc::new(move |_: &JointStateUpdate| {
            if let Some(monitor) = weak.upgrade() {
                monitor.stop();
                stopped.fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    monitor.start(bus.clone(), "joint_states").unwrap();

    let start = Instant::now();
    bus.publish(
        "joint_states",
        JointStateUpdate::new(Timestamp::from_micros(1)).with_joint("wrist", 1.0),
    );
    assert!(eventually(|| stopped.load(Ordering::SeqCst) == 1));
    assert!(!monitor.is_active());
    assert!(start.elapsed() < WAIT);
}

#[test]
fn test_feed_closed_keeps_monitor_usable() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = StateMonitor::builder(model()).config(fast_config()).build();
    monitor.start(bus.clone(), "joint_states").unwrap();
    bus.close("joint_states");

    // 反馈线程退出后 stop 仍然立即返回
    let start = Instant::now();
    monitor.stop();
    assert!(start.elapsed() < WAIT);
    assert!(monitor
        .merge_update(&JointStateUpdate::new(Timestamp::from_micros(5)).with_joint("wrist", 1.0))
        .unwrap());
}

#[test]
fn test_waiter_woken_by_feed_thread() {
    let bus = Arc::new(JointStateBus::new());
    let monitor = Arc::new(StateMonitor::builder(model()).config(fast_config()).build());
    monitor.start(bus.clone(), "joint_states").unwrap();

    let target = Timestamp::from_micros(5_000);
    let waiter = {
        let monitor = monitor.clone();
        thread::spawn(move || monitor.wait_for_state(target, WAIT))
    };

    thread::sleep(Duration::from_millis(20));
    bus.publish("joint_states", JointStateUpdate::new(Timestamp::from_micros(4_000)).with_joint("wrist", 1.0));
    bus.publish("joint_states", JointStateUpdate::new(target).with_joint("wrist", 2.0));

    assert!(waiter.join().unwrap());
    monitor.stop();
}
