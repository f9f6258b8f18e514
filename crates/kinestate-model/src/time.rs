//! # 时间戳与时钟
//!
//! 所有反馈（关节状态批次、空间变换）都携带 [`Timestamp`]，单位为微秒（自 UNIX 纪元起）。
//!
//! **静态哨兵**：`Timestamp::ZERO` 表示"静态变换"（固定标定偏移），
//! 这类观测总是被视为最新，不参与过期判断。
//!
//! 时钟通过 [`Clock`] trait 注入，便于在测试和回放中控制"现在"。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 将 `Duration` 转换为微秒（饱和到 `u64::MAX`）
fn duration_to_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// 时间戳（微秒，自 UNIX 纪元起）
///
/// 全序、可复制。与 `Duration` 的加减运算均为饱和运算，不会溢出。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// 静态哨兵（纪元零点）
    pub const ZERO: Timestamp = Timestamp(0);

    /// 从微秒构造
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// 从秒（浮点）构造
    ///
    /// 非有限值或非正值映射为 [`Timestamp::ZERO`]。
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self(
            Duration::try_from_secs_f64(secs)
                .map(duration_to_micros)
                .unwrap_or(u64::MAX),
        )
    }

    /// 当前系统时间
    pub fn now() -> Self {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| Self(duration_to_micros(d)))
            .unwrap_or(Self::ZERO)
    }

    /// 微秒值
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// 秒（浮点）
    pub fn as_secs_f64(self) -> f64 {
        Duration::from_micros(self.0).as_secs_f64()
    }

    /// 是否为静态哨兵
    pub const fn is_static(self) -> bool {
        self.0 == 0
    }

    /// 饱和加法
    pub fn saturating_add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration_to_micros(duration)))
    }

    /// 饱和减法（最小为 [`Timestamp::ZERO`]）
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration_to_micros(duration)))
    }

    /// 距离更早时间戳经过的时长（若 `earlier` 更晚则返回零）
    pub fn duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.0 / 1_000_000, self.0 % 1_000_000)
    }
}

/// 时钟接口
///
/// 监视器用它计算新鲜度（`now - max_age`），必须可以跨线程共享。
pub trait Clock: Send + Sync {
    /// 当前时间
    fn now(&self) -> Timestamp;
}

/// 系统时钟（默认）
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// 手动时钟
///
/// 时间只在显式调用 [`set`](ManualClock::set) / [`advance`](ManualClock::advance) 时变化，
/// 用于测试和离线回放。
#[derive(Debug, Default)]
pub struct ManualClock {
    now_us: AtomicU64,
}

impl ManualClock {
    /// 创建手动时钟
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_us: AtomicU64::new(start.as_micros()),
        }
    }

    /// 设置当前时间
    pub fn set(&self, now: Timestamp) {
        self.now_us.store(now.as_micros(), Ordering::Release);
    }

    /// 前进指定时长，返回前进后的时间
    pub fn advance(&self, duration: Duration) -> Timestamp {
        let delta = duration_to_micros(duration);
        let previous = self
            .now_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |us| {
                Some(us.saturating_add(delta))
            })
            .unwrap_or_else(|us| us);
        Timestamp(previous.saturating_add(delta))
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.now_us.load(Ordering::Acquire))
    }
}
