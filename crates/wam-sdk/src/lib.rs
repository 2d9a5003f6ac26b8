//! WAM 机械臂控制 SDK 门面
//!
//! 把整套栈收进一个依赖：
//!
//! - [`protocol`] 帧格式、总线地址、属性表
//! - [`bus`] 总线管理器与传输适配器
//! - [`puck`] Puck 节点、分组寻址、安全模块
//! - [`systems`] 拉取式数据流框架与执行管理器
//! - [`tools`] 配置、二进制日志、周期统计
//!
//! [`bridge`] 模块提供把 Puck 组接进系统图的现成系统：位置传感、
//! 力矩输出、安全监视。[`settings`] 模块从标定文件的一个配置段
//! 装配总线、电机组和执行管理器。
//!
//! ```no_run
//! use std::sync::Arc;
//! use wam_sdk::bus::{BusManager, SocketCanBus};
//! use wam_sdk::puck::Puck;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! wam_sdk::init_tracing();
//! let bus = Arc::new(BusManager::new(Box::new(SocketCanBus::open("can0")?)));
//! let mut puck = Puck::new(bus, 1)?;
//! puck.wake()?;
//! # Ok(())
//! # }
//! ```

pub use wam_bus as bus;
pub use wam_protocol as protocol;
pub use wam_puck as puck;
pub use wam_systems as systems;
pub use wam_tools as tools;

pub mod bridge;
pub mod settings;

pub use bridge::{GroupPositionSensor, GroupTorqueActuator, SafetyMonitor};
pub use settings::{SetupError, WamSettings};

/// 初始化日志输出
///
/// 过滤级别从 `RUST_LOG` 读取，未设置时默认 `info`。重复调用是
/// 无害的（后续调用不生效）。
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
