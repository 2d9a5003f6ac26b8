//! 总线侧系统
//!
//! 把 Puck 组和安全模块接进系统图的三块积木。它们都在 `operate` 里
//! 直接做总线往返，整个交换期间持有总线互斥锁，只应在驱动图的那条
//! 线程上运行。

use std::f64::consts::TAU;
use std::sync::Arc;

use tracing::warn;

use wam_puck::{PuckGroup, SafetyModule, SafetyMode};
use wam_protocol::property::Property;
use wam_systems::{Input, Output, System, SystemError, SystemGraph, SystemId, SystemIo};

/// 电机能接受的力矩指令上限（Puck 内部单位）
pub const MAX_PUCK_TORQUE: i32 = 8191;

// === 位置传感 ===

/// 每周期整组读编码器位置，输出弧度
///
/// 一次组寻址 GET 换回全体成员的计数值，按 `counts_per_rev` 折算
/// 成弧度。任何成员没有应答，本周期即告失败。
pub struct GroupPositionSensor<const N: usize> {
    pub output: Output<[f64; N]>,
    pub id: SystemId,
}

impl<const N: usize> GroupPositionSensor<N> {
    pub fn new(
        graph: &mut SystemGraph,
        group: Arc<PuckGroup>,
        counts_per_rev: [f64; N],
    ) -> Result<Self, SystemError> {
        if group.len() != N {
            return Err(SystemError::fault(
                "position sensor",
                format!("group has {} members, expected {N}", group.len()),
            ));
        }

        struct Core<const N: usize> {
            output: Output<[f64; N]>,
            group: Arc<PuckGroup>,
            rad_per_count: [f64; N],
        }
        impl<const N: usize> System for Core<N> {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                let counts = self
                    .group
                    .get_property(Property::P)
                    .map_err(|e| SystemError::fault(io.name(), e))?;
                let mut positions = [0.0; N];
                for (i, &c) in counts.iter().enumerate() {
                    positions[i] = c as f64 * self.rad_per_count[i];
                }
                io.set_output(self.output, positions);
                Ok(())
            }
        }

        let mut rad_per_count = [0.0; N];
        for (out, cpr) in rad_per_count.iter_mut().zip(counts_per_rev) {
            *out = TAU / cpr;
        }
        Ok(graph.add_system("position sensor", |b| {
            let output = b.output::<[f64; N]>();
            let id = b.system_id();
            (Core { output, group, rad_per_count }, GroupPositionSensor { output, id })
        }))
    }
}

// === 力矩输出 ===

/// 把牛·米力矩指令逐节点下发给组成员
///
/// 输入按成员顺序排列，经各关节的 `ipnm`（每牛·米电流计数）换算成
/// Puck 单位，饱和到 [`MAX_PUCK_TORQUE`]。输入缺值的周期不发任何帧。
pub struct GroupTorqueActuator<const N: usize> {
    pub input: Input<[f64; N]>,
    pub id: SystemId,
}

impl<const N: usize> GroupTorqueActuator<N> {
    pub fn new(
        graph: &mut SystemGraph,
        group: Arc<PuckGroup>,
        ipnm: [f64; N],
    ) -> Result<Self, SystemError> {
        if group.len() != N {
            return Err(SystemError::fault(
                "torque actuator",
                format!("group has {} members, expected {N}", group.len()),
            ));
        }

        struct Core<const N: usize> {
            input: Input<[f64; N]>,
            group: Arc<PuckGroup>,
            ipnm: [f64; N],
        }
        impl<const N: usize> System for Core<N> {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                let Some(&torques) = io.input(self.input) else {
                    return Ok(());
                };
                for (i, puck) in self.group.pucks().iter().enumerate() {
                    let raw = (torques[i] * self.ipnm[i]).round();
                    let clamped = raw.clamp(-MAX_PUCK_TORQUE as f64, MAX_PUCK_TORQUE as f64);
                    if raw != clamped {
                        warn!(
                            node = puck.id(),
                            requested = raw,
                            "torque command saturated"
                        );
                    }
                    puck.set_property(Property::T, clamped as i32, false)
                        .map_err(|e| SystemError::fault(io.name(), e))?;
                }
                Ok(())
            }
        }

        Ok(graph.add_system("torque actuator", |b| {
            let input = b.input::<[f64; N]>();
            let id = b.system_id();
            (Core { input, group, ipnm }, GroupTorqueActuator { input, id })
        }))
    }
}

// === 安全监视 ===

/// 每周期读一次安全板模式
///
/// 读到 E-stop 时返回运行期故障，让实时管理器经错误回调停机；其余
/// 模式作为输出供下游观察。
pub struct SafetyMonitor {
    pub output: Output<SafetyMode>,
    pub id: SystemId,
}

impl SafetyMonitor {
    pub fn new(graph: &mut SystemGraph, safety: Arc<SafetyModule>) -> Self {
        struct Core {
            output: Output<SafetyMode>,
            safety: Arc<SafetyModule>,
        }
        impl System for Core {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                let mode = self
                    .safety
                    .mode()
                    .map_err(|e| SystemError::fault(io.name(), e))?;
                if mode == SafetyMode::Estop {
                    return Err(SystemError::fault(io.name(), "safety module reports E-stop"));
                }
                io.set_output(self.output, mode);
                Ok(())
            }
        }
        graph.add_system("safety monitor", |b| {
            let output = b.output::<SafetyMode>();
            let id = b.system_id();
            (Core { output, safety }, SafetyMonitor { output, id })
        })
    }
}
