//! 按配置段装配整机拓扑
//!
//! 标定文件里一段 `[wam]` 描述总线设备、电机节点、安全板和控制周期。
//! [`WamSettings`] 把它解析成强类型参数，再按需落成总线管理器、
//! 电机组、安全模块和执行管理器：
//!
//! ```toml
//! [wam]
//! control_period = 0.002
//!
//! [wam.bus]
//! device = "can0"
//!
//! [wam.pucks]
//! motor_ids = [1, 2, 3, 4]
//! motor_group = 4
//! safety_id = 10
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use wam_bus::{BusError, BusManager, BusTransport};
use wam_protocol::ProtocolError;
use wam_protocol::ids::{GROUP_MASK, NODE_ID_MASK, validate_group_id, validate_node_id};
use wam_puck::{Puck, PuckError, PuckGroup, SafetyModule};
use wam_systems::{RealTimeExecutionManager, SystemError, SystemGraph};
use wam_tools::{Config, ConfigError};

/// 按配置装配时的错误
#[derive(Error, Debug)]
pub enum SetupError {
    /// 配置缺键或类型不对
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 键存在且类型正确，但取值不合法
    #[error("config key '{path}' has invalid value {value}")]
    InvalidValue { path: String, value: String },

    /// 节点号或组号超出协议范围
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 总线设备打不开
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// 节点发现握手失败
    #[error("puck error: {0}")]
    Puck(#[from] PuckError),

    /// 执行管理器拒绝了配置的周期
    #[error("system error: {0}")]
    System(#[from] SystemError),
}

/// 从一个配置段读出的整机参数
///
/// 必填键：`bus.device`、`control_period`（秒）、`pucks.motor_ids`、
/// `pucks.motor_group`。选填键：`bus.receive_timeout_ms`、
/// `pucks.safety_id`。
#[derive(Debug, Clone)]
pub struct WamSettings {
    /// SocketCAN 设备名
    pub bus_device: String,
    /// 总线接收超时；缺省时用 [`BusManager`] 的默认值
    pub receive_timeout: Option<Duration>,
    /// 控制周期
    pub control_period: Duration,
    /// 电机节点 ID，按关节顺序
    pub motor_nodes: Vec<u16>,
    /// 电机组的组寻址地址
    pub motor_group_id: u16,
    /// 安全板节点 ID；没有安全板的台架缺省
    pub safety_node: Option<u16>,
}

impl WamSettings {
    /// 解析 `section` 段（如 `"wam"`）下的拓扑参数
    pub fn from_config(config: &Config, section: &str) -> Result<Self, SetupError> {
        let key = |name: &str| format!("{section}.{name}");

        let bus_device = config.lookup_str(&key("bus.device"))?.to_string();

        let timeout_path = key("bus.receive_timeout_ms");
        let receive_timeout = match config.lookup_i64(&timeout_path) {
            Ok(ms) if ms > 0 => Some(Duration::from_millis(ms as u64)),
            Ok(ms) => {
                return Err(SetupError::InvalidValue {
                    path: timeout_path,
                    value: ms.to_string(),
                });
            },
            Err(ConfigError::MissingKey { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        let period_path = key("control_period");
        let period_secs = config.lookup_f64(&period_path)?;
        let control_period = Duration::try_from_secs_f64(period_secs)
            .ok()
            .filter(|p| !p.is_zero())
            .ok_or_else(|| SetupError::InvalidValue {
                path: period_path,
                value: period_secs.to_string(),
            })?;

        let ids_path = key("pucks.motor_ids");
        let motor_nodes = config
            .lookup_i64_array(&ids_path)?
            .into_iter()
            .map(|raw| node_id(raw, &ids_path))
            .collect::<Result<Vec<_>, _>>()?;

        let group_path = key("pucks.motor_group");
        let group = config.lookup_i64(&group_path)?;
        let motor_group_id = u16::try_from(group)
            .ok()
            .filter(|g| *g & !NODE_ID_MASK == 0)
            .map(|g| GROUP_MASK | g)
            .ok_or_else(|| SetupError::InvalidValue {
                path: group_path,
                value: group.to_string(),
            })?;
        validate_group_id(motor_group_id)?;

        let safety_path = key("pucks.safety_id");
        let safety_node = match config.lookup_i64(&safety_path) {
            Ok(raw) => Some(node_id(raw, &safety_path)?),
            Err(ConfigError::MissingKey { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        debug!(
            device = %bus_device,
            joints = motor_nodes.len(),
            period_us = control_period.as_micros() as u64,
            "loaded topology from config section '{section}'"
        );
        Ok(Self {
            bus_device,
            receive_timeout,
            control_period,
            motor_nodes,
            motor_group_id,
            safety_node,
        })
    }

    /// 用给定传输建总线管理器，套用配置的接收超时
    ///
    /// 回环测试和非 Linux 平台从这里注入传输。
    pub fn bus(&self, transport: Box<dyn BusTransport>) -> Arc<BusManager> {
        let manager = BusManager::new(transport);
        let manager = match self.receive_timeout {
            Some(timeout) => manager.with_receive_timeout(timeout),
            None => manager,
        };
        Arc::new(manager)
    }

    /// 打开配置的 SocketCAN 设备并建总线管理器
    #[cfg(target_os = "linux")]
    pub fn open_bus(&self) -> Result<Arc<BusManager>, SetupError> {
        let transport = wam_bus::SocketCanBus::open(self.bus_device.as_str())?;
        Ok(self.bus(Box::new(transport)))
    }

    /// 按 `motor_ids` 的顺序发现各节点并组成电机组
    pub fn motor_group(&self, bus: &Arc<BusManager>) -> Result<PuckGroup, SetupError> {
        let pucks = self
            .motor_nodes
            .iter()
            .map(|&node| Puck::new(bus.clone(), node).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PuckGroup::new(self.motor_group_id, pucks)?)
    }

    /// 配置了安全板时建出安全模块，否则返回 `None`
    pub fn safety_module(&self, bus: &Arc<BusManager>) -> Result<Option<SafetyModule>, SetupError> {
        let Some(node) = self.safety_node else {
            return Ok(None);
        };
        let puck = Arc::new(Puck::new(bus.clone(), node)?);
        Ok(Some(SafetyModule::new(puck)?))
    }

    /// 把系统图包进配置周期的实时执行管理器
    pub fn realtime_manager(
        &self,
        graph: SystemGraph,
    ) -> Result<RealTimeExecutionManager, SetupError> {
        Ok(RealTimeExecutionManager::new(
            Arc::new(Mutex::new(graph)),
            self.control_period,
        )?)
    }
}

fn node_id(raw: i64, path: &str) -> Result<u16, SetupError> {
    let id = u16::try_from(raw).map_err(|_| SetupError::InvalidValue {
        path: path.to_string(),
        value: raw.to_string(),
    })?;
    validate_node_id(id)?;
    Ok(id)
}
