//! 执行管理器
//!
//! 同一张图的两种驱动方式：
//!
//! - [`ManualExecutionManager`] 独占图，调用一次走一个周期，零加锁
//!   开销，测试和离线回放用
//! - [`RealTimeExecutionManager`] 与其他线程共享 `Arc<Mutex<...>>`，
//!   专用线程按固定周期执行，每个周期从头到尾持有图锁

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{error, info, warn};

use wam_tools::CycleStatistics;

use crate::{SystemError, SystemGraph};

// === 手动执行 ===

/// 独占图的单步执行管理器
pub struct ManualExecutionManager {
    graph: SystemGraph,
}

impl ManualExecutionManager {
    pub fn new(graph: SystemGraph) -> Self {
        Self { graph }
    }

    /// 指定名义周期（Ramp 之类按周期积分的系统需要）
    pub fn with_period(mut graph: SystemGraph, period: Duration) -> Self {
        graph.set_execution_period(period);
        Self { graph }
    }

    pub fn graph(&self) -> &SystemGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SystemGraph {
        &mut self.graph
    }

    /// 走一个执行周期
    pub fn run_execution_cycle(&mut self) -> Result<(), SystemError> {
        self.graph.run_execution_cycle()
    }

    pub fn into_graph(self) -> SystemGraph {
        self.graph
    }
}

// === 实时执行 ===

/// 周期出错时的处置回调；返回 `true` 继续运行，`false` 停机并进入
/// 错误状态
pub type ErrorCallback = Box<dyn FnMut(&SystemError) -> bool + Send>;

struct RtShared {
    running: AtomicBool,
    missed: AtomicU64,
    error: Mutex<Option<SystemError>>,
}

/// 固定周期的实时执行管理器
///
/// `start` 起一个专用线程；每个周期持图锁执行
/// [`SystemGraph::run_execution_cycle`]。错过释放点只计数不致命；
/// 周期内的 `SystemError` 交给错误回调，默认停机并留在错误状态，
/// 直到 `clear_error` 才允许再次启动。
pub struct RealTimeExecutionManager {
    graph: Arc<Mutex<SystemGraph>>,
    period: Duration,
    shared: Arc<RtShared>,
    callback: Arc<Mutex<ErrorCallback>>,
    worker: Option<JoinHandle<CycleStatistics>>,
    stats: Option<CycleStatistics>,
}

impl RealTimeExecutionManager {
    /// 创建管理器；周期必须大于零
    pub fn new(graph: Arc<Mutex<SystemGraph>>, period: Duration) -> Result<Self, SystemError> {
        if period.is_zero() {
            return Err(SystemError::ZeroPeriod);
        }
        Ok(Self {
            graph,
            period,
            shared: Arc::new(RtShared {
                running: AtomicBool::new(false),
                missed: AtomicU64::new(0),
                error: Mutex::new(None),
            }),
            callback: Arc::new(Mutex::new(Box::new(|_| false))),
            worker: None,
            stats: None,
        })
    }

    pub fn graph(&self) -> &Arc<Mutex<SystemGraph>> {
        &self.graph
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// 替换错误回调（默认：停机）
    pub fn set_error_callback(&self, callback: ErrorCallback) {
        *self.callback.lock() = callback;
    }

    /// 启动执行线程
    ///
    /// 处于错误状态时拒绝启动；重复启动也拒绝。
    pub fn start(&mut self) -> Result<(), SystemError> {
        if self.worker.is_some() && self.shared.running.load(Ordering::Acquire) {
            return Err(SystemError::AlreadyRunning);
        }
        if self.shared.error.lock().is_some() {
            return Err(SystemError::ErrorState);
        }
        // 上一次运行已自然停止，把线程收尸
        if let Some(worker) = self.worker.take() {
            if let Ok(stats) = worker.join() {
                self.stats = Some(stats);
            }
        }

        self.graph.lock().set_execution_period(self.period);
        self.shared.running.store(true, Ordering::Release);

        let graph = self.graph.clone();
        let shared = self.shared.clone();
        let callback = self.callback.clone();
        let period = self.period;
        self.worker = Some(std::thread::spawn(move || {
            run_loop(graph, shared, callback, period)
        }));
        info!(period_us = self.period.as_micros() as u64, "execution manager started");
        Ok(())
    }

    /// 停机：收掉当前周期、join 线程、打一行周期统计
    pub fn stop(&mut self) -> Option<CycleStatistics> {
        self.shared.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(stats) => {
                    let missed = self.shared.missed.load(Ordering::Relaxed);
                    if missed > 0 {
                        warn!(missed, "missed release points during run");
                    }
                    info!(%stats, "execution manager stopped");
                    self.stats = Some(stats);
                },
                Err(_) => {
                    error!("execution thread panicked");
                },
            }
        }
        self.stats.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// 累计错过的释放点数
    pub fn missed_release_points(&self) -> u64 {
        self.shared.missed.load(Ordering::Relaxed)
    }

    /// 当前错误状态
    pub fn error(&self) -> Option<SystemError> {
        self.shared.error.lock().clone()
    }

    /// 清除错误状态，允许重新 `start`
    pub fn clear_error(&self) {
        *self.shared.error.lock() = None;
    }

    /// 最近一次运行的周期统计
    pub fn statistics(&self) -> Option<CycleStatistics> {
        self.stats.clone()
    }
}

impl Drop for RealTimeExecutionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(
    graph: Arc<Mutex<SystemGraph>>,
    shared: Arc<RtShared>,
    callback: Arc<Mutex<ErrorCallback>>,
    period: Duration,
) -> CycleStatistics {
    #[cfg(feature = "realtime")]
    if let Err(e) = thread_priority::set_current_thread_priority(thread_priority::ThreadPriority::Max)
    {
        warn!(?e, "failed to elevate execution thread priority");
    }

    let mut stats = CycleStatistics::with_target(period);
    let mut next_release = Instant::now() + period;

    while shared.running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next_release {
            spin_sleep::sleep(next_release - now);
        } else {
            // 错过的释放点只计数，回路继续跑
            let behind = now.duration_since(next_release);
            let skipped = (behind.as_nanos() / period.as_nanos()) as u64 + 1;
            shared.missed.fetch_add(skipped, Ordering::Relaxed);
            next_release = now;
        }
        next_release += period;

        let cycle_start = Instant::now();
        let result = graph.lock().run_execution_cycle();
        stats.record(cycle_start.elapsed());

        if let Err(e) = result {
            error!(error = %e, "execution cycle failed");
            let mut cb = callback.lock();
            let keep_running = (**cb)(&e);
            drop(cb);
            if !keep_running {
                *shared.error.lock() = Some(e);
                shared.running.store(false, Ordering::Release);
            }
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Output, System, SystemId, SystemIo};

    fn counter(graph: &mut SystemGraph) -> (Output<u64>, SystemId) {
        struct Core {
            output: Output<u64>,
            count: u64,
        }
        impl System for Core {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                self.count += 1;
                io.set_output(self.output, self.count);
                Ok(())
            }
        }
        graph.add_system("counter", |b| {
            let output = b.output::<u64>();
            let id = b.system_id();
            (Core { output, count: 0 }, (output, id))
        })
    }

    fn faulting_after(graph: &mut SystemGraph, cycles: u64) -> SystemId {
        struct Core {
            remaining: u64,
        }
        impl System for Core {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                if self.remaining == 0 {
                    return Err(SystemError::fault(io.name(), "deliberate fault"));
                }
                self.remaining -= 1;
                Ok(())
            }
        }
        graph.add_system("fuse", |b| (Core { remaining: cycles }, b.system_id()))
    }

    #[test]
    fn test_manual_manager_steps_once_per_call() {
        let mut graph = SystemGraph::new();
        let (out, id) = counter(&mut graph);
        graph.start_managing(id).unwrap();

        let mut manager = ManualExecutionManager::new(graph);
        manager.run_execution_cycle().unwrap();
        manager.run_execution_cycle().unwrap();
        manager.run_execution_cycle().unwrap();

        assert_eq!(manager.graph().peek(out), Some(&3));
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let graph = Arc::new(Mutex::new(SystemGraph::new()));
        assert!(matches!(
            RealTimeExecutionManager::new(graph, Duration::ZERO),
            Err(SystemError::ZeroPeriod)
        ));
    }

    #[test]
    fn test_realtime_manager_runs_cycles() {
        let mut graph = SystemGraph::new();
        let (out, id) = counter(&mut graph);
        graph.start_managing(id).unwrap();
        let graph = Arc::new(Mutex::new(graph));

        let mut manager =
            RealTimeExecutionManager::new(graph.clone(), Duration::from_millis(2)).unwrap();
        manager.start().unwrap();
        assert!(matches!(manager.start(), Err(SystemError::AlreadyRunning)));

        std::thread::sleep(Duration::from_millis(50));
        let stats = manager.stop().unwrap();

        let count = *graph.lock().peek(out).unwrap();
        assert!(count >= 5, "expected at least 5 cycles, got {count}");
        assert_eq!(stats.count(), count);
        // 周期被图记录下来，供按周期积分的系统使用
        assert_eq!(graph.lock().execution_period(), Duration::from_millis(2));
    }

    #[test]
    fn test_fault_stops_manager_and_requires_clear_error() {
        let mut graph = SystemGraph::new();
        let id = faulting_after(&mut graph, 3);
        graph.start_managing(id).unwrap();
        let graph = Arc::new(Mutex::new(graph));

        let mut manager =
            RealTimeExecutionManager::new(graph, Duration::from_millis(1)).unwrap();
        manager.start().unwrap();

        // 等故障触发、线程自己停下来
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!manager.is_running());
        assert!(matches!(
            manager.error(),
            Some(SystemError::Fault { .. })
        ));

        // 错误状态下拒绝启动
        assert!(matches!(manager.start(), Err(SystemError::ErrorState)));

        manager.clear_error();
        assert!(manager.error().is_none());
    }

    #[test]
    fn test_error_callback_can_keep_the_loop_alive() {
        let mut graph = SystemGraph::new();
        let (out, counter_id) = counter(&mut graph);
        let fuse_id = faulting_after(&mut graph, 2);
        graph.start_managing(counter_id).unwrap();
        graph.start_managing(fuse_id).unwrap();
        let graph = Arc::new(Mutex::new(graph));

        let mut manager =
            RealTimeExecutionManager::new(graph.clone(), Duration::from_millis(1)).unwrap();
        manager.set_error_callback(Box::new(|_| true));
        manager.start().unwrap();

        std::thread::sleep(Duration::from_millis(40));
        assert!(manager.is_running());
        manager.stop();

        assert!(manager.error().is_none());
        assert!(*graph.lock().peek(out).unwrap() > 2);
    }

    #[test]
    fn test_manager_restarts_after_clean_stop() {
        let mut graph = SystemGraph::new();
        let (out, id) = counter(&mut graph);
        graph.start_managing(id).unwrap();
        let graph = Arc::new(Mutex::new(graph));

        let mut manager =
            RealTimeExecutionManager::new(graph.clone(), Duration::from_millis(2)).unwrap();
        manager.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        manager.stop();
        let first = *graph.lock().peek(out).unwrap();

        manager.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        manager.stop();
        assert!(*graph.lock().peek(out).unwrap() > first);
    }
}
