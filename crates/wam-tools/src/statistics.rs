//! 执行周期统计
//!
//! 实时回路里不能攒样本数组，用计数 / 和 / 平方和三个累加器在线计算
//! 最小、最大、均值和标准差，停机时打一行摘要。

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 周期时长统计累加器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStatistics {
    count: u64,
    sum_us: f64,
    sum_sq_us: f64,
    min_us: f64,
    max_us: f64,
    overruns: u64,
    /// 超限判定阈值（微秒），0 表示不统计超限
    target_us: f64,
}

impl CycleStatistics {
    /// 创建带超限阈值的累加器
    pub fn with_target(target: Duration) -> Self {
        Self {
            target_us: target.as_secs_f64() * 1e6,
            ..Self::default()
        }
    }

    /// 记录一个周期的实际耗时
    pub fn record(&mut self, cycle: Duration) {
        let us = cycle.as_secs_f64() * 1e6;
        if self.count == 0 {
            self.min_us = us;
            self.max_us = us;
        } else {
            self.min_us = self.min_us.min(us);
            self.max_us = self.max_us.max(us);
        }
        self.count += 1;
        self.sum_us += us;
        self.sum_sq_us += us * us;
        if self.target_us > 0.0 && us > self.target_us {
            self.overruns += 1;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// 最小周期（微秒）
    pub fn min_us(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.min_us }
    }

    /// 最大周期（微秒）
    pub fn max_us(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.max_us }
    }

    /// 平均周期（微秒）
    pub fn mean_us(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_us / self.count as f64
    }

    /// 周期标准差（微秒）
    pub fn std_dev_us(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mean = self.mean_us();
        let variance = (self.sum_sq_us / self.count as f64 - mean * mean).max(0.0);
        variance.sqrt()
    }
}

impl fmt::Display for CycleStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycles={} min={:.1}us avg={:.1}us max={:.1}us stdev={:.1}us overruns={}",
            self.count,
            self.min_us(),
            self.mean_us(),
            self.max_us(),
            self.std_dev_us(),
            self.overruns
        )
    }
}
