//! 基础系统库
//!
//! 控制回路里最常用的几个积木：常量源、比例增益、带极性的求和器、
//! 斜坡发生器。每个构造函数把系统插入图并返回一个含端口句柄的轻量
//! 结构，连线用这些句柄完成。

use std::sync::Arc;

use parking_lot::Mutex;

use crate::graph::{Input, Output, PortBuilder, System, SystemGraph, SystemId, SystemIo};
use crate::SystemError;

// === 常量源 ===

/// 每个周期输出同一个值
pub struct Constant<T> {
    pub output: Output<T>,
    pub id: SystemId,
}

impl<T: Clone + Send + 'static> Constant<T> {
    pub fn new(graph: &mut SystemGraph, value: T) -> Self {
        struct Core<T> {
            output: Output<T>,
            value: T,
        }
        impl<T: Clone + Send + 'static> System for Core<T> {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                io.set_output(self.output, self.value.clone());
                Ok(())
            }
        }
        graph.add_system("constant", |b: &mut PortBuilder<'_>| {
            let output = b.output::<T>();
            let id = b.system_id();
            (Core { output, value }, Constant { output, id })
        })
    }
}

// === 增益 ===

/// 输出 = 输入 × 增益
pub struct Gain {
    pub input: Input<f64>,
    pub output: Output<f64>,
    pub id: SystemId,
}

impl Gain {
    pub fn new(graph: &mut SystemGraph, gain: f64) -> Self {
        struct Core {
            input: Input<f64>,
            output: Output<f64>,
            gain: f64,
        }
        impl System for Core {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                let x = io.input(self.input).copied().unwrap_or(0.0);
                io.set_output(self.output, x * self.gain);
                Ok(())
            }
        }
        graph.add_system("gain", |b| {
            let input = b.input::<f64>();
            let output = b.output::<f64>();
            let id = b.system_id();
            (Core { input, output, gain }, Gain { input, output, id })
        })
    }
}

// === 求和器 ===

/// N 路带极性求和
///
/// 极性串每个字符对应一路输入，`'+'` 记正、`'-'` 记负，长度必须等于
/// N。严格模式下任一输入未定义则本周期输出作废；宽松模式下未定义的
/// 输入按 0 参与求和。
pub struct Summer<const N: usize> {
    pub inputs: [Input<f64>; N],
    pub output: Output<f64>,
    pub id: SystemId,
}

impl<const N: usize> Summer<N> {
    pub fn new(
        graph: &mut SystemGraph,
        polarity: &str,
        strict: bool,
    ) -> Result<Self, SystemError> {
        if polarity.len() != N || !polarity.chars().all(|c| c == '+' || c == '-') {
            return Err(SystemError::InvalidPolarity {
                polarity: polarity.to_string(),
            });
        }
        let mut signs = [1.0f64; N];
        for (sign, c) in signs.iter_mut().zip(polarity.chars()) {
            if c == '-' {
                *sign = -1.0;
            }
        }

        struct Core<const N: usize> {
            inputs: [Input<f64>; N],
            output: Output<f64>,
            signs: [f64; N],
            strict: bool,
        }
        impl<const N: usize> System for Core<N> {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                let mut sum = 0.0;
                for (input, sign) in self.inputs.iter().zip(&self.signs) {
                    sum += sign * io.input(*input).copied().unwrap_or(0.0);
                }
                io.set_output(self.output, sum);
                Ok(())
            }

            fn inputs_valid(&self, io: &SystemIo<'_>) -> bool {
                !self.strict || io.all_inputs_defined()
            }
        }

        Ok(graph.add_system("summer", |b| {
            let inputs: [Input<f64>; N] = std::array::from_fn(|_| b.input::<f64>());
            let output = b.output::<f64>();
            let id = b.system_id();
            (
                Core { inputs, output, signs, strict },
                Summer { inputs, output, id },
            )
        }))
    }
}

// === 斜坡 ===

struct RampState {
    slope: f64,
    running: bool,
    value: f64,
}

/// 斜坡发生器：运行时按执行周期积分 `slope`，停住时保持当前值
///
/// 句柄和图内系统共享状态，`start`/`stop`/`reset`/`set_slope` 可以
/// 在任意线程调用。
pub struct Ramp {
    pub output: Output<f64>,
    pub id: SystemId,
    state: Arc<Mutex<RampState>>,
}

impl Ramp {
    pub fn new(graph: &mut SystemGraph, slope: f64) -> Self {
        let state = Arc::new(Mutex::new(RampState {
            slope,
            running: false,
            value: 0.0,
        }));

        struct Core {
            output: Output<f64>,
            state: Arc<Mutex<RampState>>,
        }
        impl System for Core {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                let mut state = self.state.lock();
                if state.running {
                    let dt = io.execution_period().as_secs_f64();
                    state.value += state.slope * dt;
                }
                let value = state.value;
                drop(state);
                io.set_output(self.output, value);
                Ok(())
            }
        }

        let core_state = state.clone();
        graph.add_system("ramp", move |b| {
            let output = b.output::<f64>();
            let id = b.system_id();
            (
                Core { output, state: core_state },
                Ramp { output, id, state },
            )
        })
    }

    /// 从当前值开始积分
    pub fn start(&self) {
        self.state.lock().running = true;
    }

    /// 停在当前值
    pub fn stop(&self) {
        self.state.lock().running = false;
    }

    /// 回到零并停住
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.value = 0.0;
    }

    pub fn set_slope(&self, slope: f64) {
        self.state.lock().slope = slope;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ManualExecutionManager;

    #[test]
    fn test_constant_feeds_gain() {
        let mut graph = SystemGraph::new();
        let source = Constant::new(&mut graph, 3.0f64);
        let gain = Gain::new(&mut graph, -2.0);
        graph.connect(source.output, gain.input).unwrap();

        assert_eq!(graph.pull(gain.output).unwrap(), Some(-6.0));
    }

    #[test]
    fn test_summer_applies_polarity() {
        let mut graph = SystemGraph::new();
        let a = Constant::new(&mut graph, 10.0f64);
        let b = Constant::new(&mut graph, 4.0f64);
        let c = Constant::new(&mut graph, 1.0f64);
        let sum = Summer::<3>::new(&mut graph, "+-+", true).unwrap();
        graph.connect(a.output, sum.inputs[0]).unwrap();
        graph.connect(b.output, sum.inputs[1]).unwrap();
        graph.connect(c.output, sum.inputs[2]).unwrap();

        assert_eq!(graph.pull(sum.output).unwrap(), Some(7.0));
    }

    #[test]
    fn test_summer_rejects_bad_polarity() {
        let mut graph = SystemGraph::new();
        assert!(matches!(
            Summer::<3>::new(&mut graph, "+-", true),
            Err(SystemError::InvalidPolarity { .. })
        ));
        assert!(matches!(
            Summer::<2>::new(&mut graph, "+x", true),
            Err(SystemError::InvalidPolarity { .. })
        ));
    }

    #[test]
    fn test_strict_summer_invalidates_on_missing_input() {
        let mut graph = SystemGraph::new();
        let a = Constant::new(&mut graph, 5.0f64);
        let sum = Summer::<2>::new(&mut graph, "++", true).unwrap();
        graph.connect(a.output, sum.inputs[0]).unwrap();
        // 第二路悬空

        assert_eq!(graph.pull(sum.output).unwrap(), None);
    }

    #[test]
    fn test_lenient_summer_treats_missing_input_as_zero() {
        let mut graph = SystemGraph::new();
        let a = Constant::new(&mut graph, 5.0f64);
        let sum = Summer::<2>::new(&mut graph, "+-", false).unwrap();
        graph.connect(a.output, sum.inputs[0]).unwrap();

        assert_eq!(graph.pull(sum.output).unwrap(), Some(5.0));
    }

    #[test]
    fn test_ramp_integrates_slope_over_period() {
        let mut graph = SystemGraph::new();
        let ramp = Ramp::new(&mut graph, 2.0);
        graph.start_managing(ramp.id).unwrap();
        let mut manager =
            ManualExecutionManager::with_period(graph, Duration::from_millis(500));

        // 停住时保持为零
        manager.run_execution_cycle().unwrap();
        assert_eq!(manager.graph().peek(ramp.output), Some(&0.0));

        ramp.start();
        manager.run_execution_cycle().unwrap();
        manager.run_execution_cycle().unwrap();
        assert_eq!(manager.graph().peek(ramp.output), Some(&2.0));

        ramp.stop();
        manager.run_execution_cycle().unwrap();
        assert_eq!(manager.graph().peek(ramp.output), Some(&2.0));

        ramp.reset();
        manager.run_execution_cycle().unwrap();
        assert_eq!(manager.graph().peek(ramp.output), Some(&0.0));
    }
}
