//! 状态监视器（对外 API）
//!
//! [`StateMonitor`] 把快照存储、两个合并器、查询等待接口和回调注册表组合在一起，
//! 并管理反馈线程的生命周期。共享部分放在 [`MonitorContext`] 中，
//! 由调用方线程与反馈线程通过 `Arc` 共同持有。

use crate::builder::StateMonitorBuilder;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::feeds::{JointStateSource, JointStateUpdate, TransformProvider, TransformStamped};
use crate::hooks::{HookManager, StateUpdateCallback};
use crate::metrics::{MetricsSnapshot, MonitorMetrics};
use crate::pipeline::{joint_state_loop, transform_loop};
use crate::state::KinematicState;
use crate::store::SnapshotStore;
use crate::transform::TransformRefresh;
use kinestate_model::{Clock, JointIndex, RobotModel, Timestamp};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// 带超时的线程 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();
        // 看门狗线程代为 join，本线程带超时等待结果
        thread::spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// 监视器共享上下文
pub(crate) struct MonitorContext {
    pub(crate) model: Arc<RobotModel>,
    pub(crate) config: MonitorConfig,
    pub(crate) store: SnapshotStore,
    pub(crate) hooks: HookManager,
    pub(crate) metrics: MonitorMetrics,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) transforms: Option<Arc<dyn TransformProvider>>,
    /// 上一次记录畸形批次的时间（日志节流）
    pub(crate) last_malformed_log: Mutex<Option<Instant>>,
    /// 当前查询失败的多自由度关节（每个关节只 warn 一次，直到恢复）
    pub(crate) failing_transforms: Mutex<HashSet<JointIndex>>,
}

impl MonitorContext {
    pub(crate) fn new(
        model: Arc<RobotModel>,
        config: MonitorConfig,
        clock: Arc<dyn Clock>,
        transforms: Option<Arc<dyn TransformProvider>>,
    ) -> Self {
        Self {
            store: SnapshotStore::new(model.clone()),
            model,
            config,
            hooks: HookManager::new(),
            metrics: MonitorMetrics::new(),
            clock,
            transforms,
            last_malformed_log: Mutex::new(None),
            failing_transforms: Mutex::new(HashSet::new()),
        }
    }

    /// 在所有锁之外依次调用回调
    pub(crate) fn fire_callbacks(&self, update: &JointStateUpdate) {
        let fired = self.hooks.trigger_all(update);
        self.metrics
            .callbacks_fired
            .fetch_add(fired as u64, Ordering::Relaxed);
    }
}

/// 运行中的反馈
struct ActiveFeeds {
    topic: String,
    started_at: Timestamp,
    is_running: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

/// 运动学状态监视器
///
/// # 示例
///
/// ```
/// use kinestate_model::{JointDescriptor, JointKind, RobotModel, Timestamp};
/// use kinestate_monitor::{JointStateUpdate, StateMonitor};
///
/// let model = RobotModel::builder("arm")
///     .joint(JointDescriptor::new("shoulder", JointKind::Revolute).with_bounds(-1.0, 1.0))
///     .build()
///     .unwrap();
/// let monitor = StateMonitor::new(model);
/// assert!(!monitor.is_complete());
///
/// let update = JointStateUpdate::new(Timestamp::from_micros(1_000)).with_joint("shoulder", 0.5);
/// assert!(monitor.merge_update(&update).unwrap());
/// assert!(monitor.is_complete());
/// assert_eq!(monitor.current_state().position("shoulder"), Some(0.5));
/// ```
pub struct StateMonitor {
    ctx: Arc<MonitorContext>,
    feeds: Mutex<Option<ActiveFeeds>>,
}

impl StateMonitor {
    /// 以默认配置创建监视器（系统时钟，无变换提供者）
    pub fn new(model: impl Into<Arc<RobotModel>>) -> Self {
        StateMonitorBuilder::new(model).build()
    }

    /// 创建构建器
    pub fn builder(model: impl Into<Arc<RobotModel>>) -> StateMonitorBuilder {
        StateMonitorBuilder::new(model)
    }

    pub(crate) fn from_context(ctx: MonitorContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            feeds: Mutex::new(None),
        }
    }

    /// 模型
    pub fn model(&self) -> &Arc<RobotModel> {
        &self.ctx.model
    }

    /// 配置
    pub fn config(&self) -> &MonitorConfig {
        &self.ctx.config
    }

    // ============================================================
    // 快照读取
    // ============================================================

    /// 当前快照副本
    pub fn current_state(&self) -> KinematicState {
        self.ctx.store.read().0
    }

    /// 快照时间
    pub fn current_state_time(&self) -> Timestamp {
        self.ctx.store.state_time()
    }

    /// 快照与快照时间（原子读取）
    ///
    /// 两者在同一次加锁内复制，快照时间总是覆盖快照中所有条目的新鲜度。
    /// 返回的是独立副本，之后的合并不会影响它。
    pub fn current_state_and_time(&self) -> (KinematicState, Timestamp) {
        self.ctx.store.read()
    }

    /// 变量名到位置的映射
    pub fn current_state_values(&self) -> BTreeMap<String, f64> {
        self.ctx.store.with_inner(|inner| inner.state.values())
    }

    /// 把当前快照复制到调用方的状态中
    ///
    /// 位置总是复制；配置了 `copy_dynamics` 时一并复制已有的速度、加速度与力矩。
    pub fn copy_current_state_into(&self, target: &mut KinematicState) -> Result<(), MonitorError> {
        self.ctx
            .store
            .with_inner(|inner| target.copy_from(&inner.state, self.ctx.config.copy_dynamics))
    }

    /// 关节最后一次被接受的观测时间
    pub fn joint_update_time(&self, joint: &str) -> Option<Timestamp> {
        let index = self.ctx.model.joint_index(joint)?;
        self.ctx.store.joint_time(index)
    }

    /// 新鲜度表副本
    pub fn joint_update_times(&self) -> BTreeMap<String, Timestamp> {
        self.ctx.store.freshness()
    }

    // ============================================================
    // 合并
    // ============================================================

    /// 合并一个关节状态批次，返回快照是否真实变化
    ///
    /// 反馈线程对每个收到的批次调用它；没有启动反馈时也可以直接调用。
    ///
    /// # 参数
    ///
    /// - `update`: 关节状态批次。未知关节与多自由度关节被静默跳过
    ///
    /// # 返回值
    ///
    /// - `Ok(true)`: 至少一个数值变化，回调已全部返回，等待者已被唤醒
    /// - `Ok(false)`: 数值未变（新鲜度仍会刷新）
    ///
    /// # 错误
    ///
    /// - `MonitorError::MalformedBatch`: 名称数与位置数不一致，整批拒绝，快照不变
    pub fn merge_update(&self, update: &JointStateUpdate) -> Result<bool, MonitorError> {
        self.ctx.merge_update(update)
    }

    /// 通过变换提供者查询并合并单个多自由度关节
    pub fn merge_transform(
        &self,
        joint: &str,
        parent: &str,
        child: &str,
        at: Timestamp,
    ) -> Result<bool, MonitorError> {
        self.ctx.merge_transform(joint, parent, child, at)
    }

    /// 合并调用方已经取得的变换观测
    pub fn merge_observed_transform(
        &self,
        joint: &str,
        observed: &TransformStamped,
    ) -> Result<bool, MonitorError> {
        self.ctx.merge_observed_transform(joint, observed)
    }

    /// 对所有多自由度关节执行一次变换刷新
    ///
    /// 查询在锁外完成，结果在一次加锁内写入。单个关节查询失败只跳过该关节，
    /// 失败原因收集在 [`TransformRefresh::failures`] 中。
    /// 任一关节变化时只触发一次空载荷回调，随后唤醒一次等待者。
    pub fn refresh_transforms(&self) -> TransformRefresh {
        self.ctx.refresh_transforms()
    }

    // ============================================================
    // 查询与等待
    // ============================================================

    /// 所有需要上报的关节是否都至少被观测过一次
    pub fn is_complete(&self) -> bool {
        self.ctx.is_complete(None)
    }

    /// 从未被观测过的关节
    pub fn missing_joints(&self) -> Vec<String> {
        self.ctx.missing_joints(None)
    }

    /// 所有需要上报的关节是否都在 `max_age` 内被观测过
    pub fn is_complete_within(&self, max_age: Duration) -> bool {
        self.ctx.is_complete(Some(max_age))
    }

    /// 缺失或超过 `max_age` 未更新的关节
    pub fn missing_joints_within(&self, max_age: Duration) -> Vec<String> {
        self.ctx.missing_joints(Some(max_age))
    }

    /// 阻塞直到快照时间不早于 `target`，或超时
    ///
    /// # 参数
    ///
    /// - `target`: 目标时间（与反馈时间戳同一时钟）
    /// - `timeout`: 最长等待时间；虚假唤醒后按剩余时间继续等待
    ///
    /// # 返回值
    ///
    /// 是否在超时前达到目标时间。超时会以 `info!` 记录，通常提示时钟不同步。
    pub fn wait_for_state(&self, target: Timestamp, timeout: Duration) -> bool {
        self.ctx.wait_for_state(target, timeout)
    }

    /// 轮询直到状态完整，或超时
    ///
    /// 轮询周期为 50ms 与 `timeout / 10` 中的较小者。
    pub fn wait_for_complete_state(&self, timeout: Duration) -> bool {
        self.ctx.wait_for_complete_state(timeout)
    }

    /// 分组范围的完整性等待
    ///
    /// 先做全局等待；超时后，只要缺失的关节都不在分组内就返回 `true`。
    /// 未知分组立即返回 `false` 并记录警告。
    pub fn wait_for_group_complete(&self, group: &str, timeout: Duration) -> bool {
        self.ctx.wait_for_group_complete(group, timeout)
    }

    /// 轮询直到至少 `count` 个关节状态批次处理完毕，或超时
    ///
    /// "处理完毕"指合并、回调与唤醒都已结束（被拒绝的批次同样计数），
    /// 与 [`MetricsSnapshot::batches_processed`] 一致。
    ///
    /// # 返回值
    ///
    /// 超时前是否达到 `count`。
    pub fn wait_for_batches(&self, count: u64, timeout: Duration) -> bool {
        self.ctx.wait_for_batches(count, timeout)
    }

    // ============================================================
    // 回调
    // ============================================================

    /// 注册状态更新回调
    ///
    /// 回调按注册顺序、在快照锁之外调用：位置变化时收到触发的批次，
    /// 变换变化时收到 [`JointStateUpdate::empty`]。回调内可以读取监视器、
    /// 注册新回调，甚至调用 [`stop`](Self::stop)。
    ///
    /// # 线程安全
    ///
    /// 回调在反馈线程（或直接调用合并方法的线程）上执行，应尽快返回；
    /// 回调返回之前，等待者不会被唤醒。
    ///
    /// # 示例
    ///
    /// ```
    /// use kinestate_model::{JointDescriptor, JointKind, RobotModel, Timestamp};
    /// use kinestate_monitor::{JointStateUpdate, StateMonitor};
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    ///
    /// let model = RobotModel::builder("arm")
    ///     .joint(JointDescriptor::new("shoulder", JointKind::Revolute))
    ///     .build()
    ///     .unwrap();
    /// let monitor = StateMonitor::new(model);
    ///
    /// let calls = Arc::new(AtomicUsize::new(0));
    /// let counter = calls.clone();
    /// monitor.add_update_callback(Arc::new(move |_: &JointStateUpdate| {
    ///     counter.fetch_add(1, Ordering::Relaxed);
    /// }));
    ///
    /// let update = JointStateUpdate::new(Timestamp::from_micros(1)).with_joint("shoulder", 0.2);
    /// monitor.merge_update(&update).unwrap();
    /// assert_eq!(calls.load(Ordering::Relaxed), 1);
    /// ```
    pub fn add_update_callback(&self, callback: Arc<dyn StateUpdateCallback>) {
        self.ctx.hooks.add_callback(callback);
    }

    /// 清空所有回调
    pub fn clear_update_callbacks(&self) {
        self.ctx.hooks.clear();
    }

    /// 已注册回调数量
    pub fn update_callback_count(&self) -> usize {
        self.ctx.hooks.len()
    }

    /// 指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    // ============================================================
    // 生命周期
    // ============================================================

    /// 订阅反馈并启动反馈线程
    ///
    /// 关节状态反馈运行在 `kinestate-joint-states` 线程上。配置了变换提供者
    /// 且模型含多自由度关节时，另起 `kinestate-transforms` 线程，每个变化通知
    /// 触发一次 [`refresh_transforms`](Self::refresh_transforms)。
    ///
    /// # 参数
    ///
    /// - `source`: 关节状态来源
    /// - `topic`: 话题名称，由来源解析
    ///
    /// # 错误
    ///
    /// - `MonitorError::EmptyTopic`: 话题为空
    /// - `MonitorError::FeedThread`: 线程创建失败（已启动的线程会被回收）
    /// - 来源订阅失败时返回其错误
    ///
    /// # 注意
    ///
    /// 已经在运行时不做任何事并返回 `Ok(())`。重新启动不会清空新鲜度表。
    pub fn start(&self, source: Arc<dyn JointStateSource>, topic: &str) -> Result<(), MonitorError> {
        let mut feeds = self.feeds.lock();
        if feeds.is_some() {
            debug!("State monitor already active, start ignored");
            return Ok(());
        }
        if topic.trim().is_empty() {
            error!("The joint states topic cannot be an empty string");
            return Err(MonitorError::EmptyTopic);
        }

        let resolved = source.resolve_topic(topic);
        let joint_rx = source.subscribe(topic)?;
        let transform_rx = match &self.ctx.transforms {
            Some(provider) if self.ctx.model.has_multi_dof_joints() => Some(provider.subscribe_changes()),
            _ => None,
        };

        let is_running = Arc::new(AtomicBool::new(true));
        let poll_interval = self.ctx.config.feed_poll_interval();
        let mut threads = Vec::with_capacity(2);

        let spawned = {
            let ctx = self.ctx.clone();
            let is_running = is_running.clone();
            let topic = resolved.clone();
            thread::Builder::new()
                .name("kinestate-joint-states".into())
                .spawn(move || joint_state_loop(joint_rx, ctx, is_running, poll_interval, topic))
        };
        threads.push(spawned.map_err(|e| MonitorError::FeedThread(e.to_string()))?);

        if let Some(rx) = transform_rx {
            let ctx = self.ctx.clone();
            let flag = is_running.clone();
            let spawned = thread::Builder::new()
                .name("kinestate-transforms".into())
                .spawn(move || transform_loop(rx, ctx, flag, poll_interval));
            match spawned {
                Ok(handle) => threads.push(handle),
                Err(e) => {
                    is_running.store(false, Ordering::Release);
                    shutdown_threads(threads, self.ctx.config.shutdown_timeout());
                    return Err(MonitorError::FeedThread(e.to_string()));
                },
            }
        }

        info!("Listening to joint states on topic '{}'", resolved);
        *feeds = Some(ActiveFeeds {
            topic: resolved,
            started_at: self.ctx.clock.now(),
            is_running,
            threads,
        });
        Ok(())
    }

    /// 停止反馈线程
    ///
    /// 清除运行标志，并在 `shutdown_timeout_ms` 内 join 反馈线程；线程退出时
    /// 释放订阅。尚未取出的批次被丢弃，需要完整回放时先用
    /// [`wait_for_batches`](Self::wait_for_batches) 等待。
    ///
    /// # 线程安全
    ///
    /// 幂等，可在任意线程调用，包括回调内部（反馈线程不会 join 自己）。
    /// 停止后快照保持可查询。`Drop` 时自动调用。
    pub fn stop(&self) {
        // 先取出句柄再 join，避免回调中查询生命周期时死锁
        let Some(active) = self.feeds.lock().take() else {
            return;
        };
        active.is_running.store(false, Ordering::Release);
        shutdown_threads(active.threads, self.ctx.config.shutdown_timeout());
        info!("No longer listening for joint states on '{}'", active.topic);
    }

    /// 反馈是否在运行
    pub fn is_active(&self) -> bool {
        self.feeds.lock().is_some()
    }

    /// 正在监听的话题（解析后的名称）
    pub fn monitored_topic(&self) -> Option<String> {
        self.feeds.lock().as_ref().map(|f| f.topic.clone())
    }

    /// 本次启动的时间
    pub fn monitor_start_time(&self) -> Option<Timestamp> {
        self.feeds.lock().as_ref().map(|f| f.started_at)
    }
}

impl Drop for StateMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn shutdown_threads(threads: Vec<JoinHandle<()>>, timeout: Duration) {
    let current = thread::current().id();
    for handle in threads {
        // 在反馈线程自身的回调里 stop 时不能 join 自己
        if handle.thread().id() == current {
            continue;
        }
        let name = handle.thread().name().unwrap_or("feed").to_string();
        if handle.join_timeout(timeout).is_err() {
            warn!("Feed thread '{}' failed to shut down within {:?}", name, timeout);
        }
    }
}
