//! 安全模块句柄
//!
//! 硬件安全板独立于主机监督整条总线：E-stop、力矩/速度越限都由固件
//! 裁决。软件只轮询它的 MODE 状态机，从不替它做状态迁移；`set_mode`
//! 只是向硬件递交请求，硬件有权不理会。

use std::sync::Arc;
use std::time::Duration;

use num_enum::TryFromPrimitive;
use tracing::info;

use wam_protocol::property::{Property, PuckType};

use crate::{Puck, PuckError};

/// 轮询安全板状态机的默认周期（人类操作拨挡，不需要更快）
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(250);

/// 速度故障历史缓冲区长度，写入 IFAULT 可整段忽略
const VELOCITY_FAULT_HISTORY_LEN: i32 = 5;

/// 速度限值的定点比例（counts per unit velocity）
const VELOCITY_SCALE: f64 = 0x1000 as f64;

/// 安全板状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(i32)]
pub enum SafetyMode {
    /// 急停，电机供电被硬件切断
    Estop = 0,
    /// 空闲，供电恢复但力矩不使能
    Idle = 1,
    /// 激活，力矩使能
    Active = 2,
}

impl SafetyMode {
    /// 操作提示用的档位名
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyMode::Estop => "E-stop",
            SafetyMode::Idle => "Shift-idle",
            SafetyMode::Active => "Shift-activate",
        }
    }
}

/// 安全板的只读状态视图与限值配置
pub struct SafetyModule {
    puck: Arc<Puck>,
}

impl SafetyModule {
    /// 包装一个安全板 Puck
    ///
    /// 传入非安全板时返回 `PuckError::NotSafetyPuck`。
    pub fn new(puck: Arc<Puck>) -> Result<Self, PuckError> {
        if puck.puck_type() != PuckType::Safety {
            return Err(PuckError::NotSafetyPuck {
                id: puck.id(),
                puck_type: puck.puck_type(),
            });
        }
        Ok(Self { puck })
    }

    pub fn puck(&self) -> &Arc<Puck> {
        &self.puck
    }

    /// 读取当前安全模式；0/1/2 之外的值是硬件故障征兆，直接上抛
    pub fn mode(&self) -> Result<SafetyMode, PuckError> {
        let value = self.puck.get_property(Property::Mode)?;
        SafetyMode::try_from(value).map_err(|_| PuckError::InvalidSafetyMode {
            id: self.puck.id(),
            value,
        })
    }

    /// 向硬件请求切换模式；硬件可能忽略该请求
    pub fn set_mode(&self, mode: SafetyMode) -> Result<(), PuckError> {
        self.puck.set_property(Property::Mode, mode as i32, false)
    }

    /// 轮询等待安全板进入指定模式
    ///
    /// `advise` 置位时在开始等待前打一条操作提示日志。
    pub fn wait_for_mode(
        &self,
        mode: SafetyMode,
        advise: bool,
        period: Option<Duration>,
    ) -> Result<(), PuckError> {
        if self.mode()? == mode {
            return Ok(());
        }
        if advise {
            info!("please {} the WAM", mode.as_str());
        }
        let period = period.unwrap_or(DEFAULT_POLL_PERIOD);
        loop {
            spin_sleep::sleep(period);
            if self.mode()? == mode {
                return Ok(());
            }
        }
    }

    /// 轮询等待安全板离开当前模式，返回新模式
    pub fn wait_for_mode_change(&self, period: Option<Duration>) -> Result<SafetyMode, PuckError> {
        let original = self.mode()?;
        let period = period.unwrap_or(DEFAULT_POLL_PERIOD);
        loop {
            spin_sleep::sleep(period);
            let current = self.mode()?;
            if current != original {
                return Ok(current);
            }
        }
    }

    /// 忽略接下来一整段速度故障历史（标定时关节会快速越限）
    pub fn ignore_next_velocity_fault(&self) -> Result<(), PuckError> {
        self.puck
            .set_property(Property::Ifault, VELOCITY_FAULT_HISTORY_LEN, false)
    }

    /// 把四个限值恢复为 EEPROM 中的出厂默认
    ///
    /// 之前运行的程序可能改过限值，构造后先调用一次再信任硬件配置。
    pub fn set_default_limits(&self) -> Result<(), PuckError> {
        self.puck.reset_property(Property::Vl1)?;
        self.puck.reset_property(Property::Vl2)?;
        self.puck.reset_property(Property::Tl1)?;
        self.puck.reset_property(Property::Tl2)
    }

    /// 设置力矩告警/故障阈值（N·m，按电机的 IPNM 换算到电流计数）
    ///
    /// `warning` 为负时取故障阈值的 90%。
    pub fn set_torque_limit(
        &self,
        fault_nm: f64,
        warning_nm: f64,
        ipnm: i32,
    ) -> Result<(), PuckError> {
        let warning_nm = if warning_nm < 0.0 { 0.9 * fault_nm } else { warning_nm };
        self.puck
            .set_property(Property::Tl2, (fault_nm * ipnm as f64) as i32, false)?;
        self.puck
            .set_property(Property::Tl1, (warning_nm * ipnm as f64) as i32, false)
    }

    /// 设置速度告警/故障阈值
    ///
    /// `fault` 为 0 表示永不触发速度故障；`warning` 为负时取故障阈值
    /// 的 90%。
    pub fn set_velocity_limit(&self, fault: f64, warning: f64) -> Result<(), PuckError> {
        let warning = if warning < 0.0 { 0.9 * fault } else { warning };
        self.puck
            .set_property(Property::Vl2, (fault * VELOCITY_SCALE) as i32, false)?;
        self.puck
            .set_property(Property::Vl1, (warning * VELOCITY_SCALE) as i32, false)
    }
}
