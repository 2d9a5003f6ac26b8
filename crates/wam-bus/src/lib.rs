//! WAM CAN 总线通讯层
//!
//! 提供传输抽象（`BusTransport`）和按发送者分流的总线管理器（`BusManager`）。
//!
//! ## 架构
//!
//! ```text
//! BusManager（互斥锁 + 按发送者分流缓冲）
//!     └── Box<dyn BusTransport>
//!             ├── SocketCanBus（Linux SocketCAN，生产环境）
//!             └── LoopbackBus（内存回环，测试与仿真）
//! ```
//!
//! 多个上层对象（Puck、PuckGroup、SafetyModule）共享同一个 `BusManager`。
//! 由于总线上的应答只携带发送者地址，管理器在排空传输层时把每一帧按
//! 总线 ID 存入独立队列，各调用者只取走发给自己的那一份，不会互相吞帧。

use thiserror::Error;

use wam_protocol::{CanFrame, ProtocolError};

mod loopback;
mod manager;
#[cfg(target_os = "linux")]
mod socketcan;

pub use loopback::{LoopbackBus, LoopbackHandle};
pub use manager::{BusGuard, BusManager, DEFAULT_RECEIVE_TIMEOUT};
#[cfg(target_os = "linux")]
pub use socketcan::SocketCanBus;

// === 错误类型 ===

/// 总线通讯错误
#[derive(Error, Debug)]
pub enum BusError {
    /// IO 错误（socket 读写失败等）
    #[error("bus IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 协议层错误（应答格式非法等）
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 在超时时间内没有收到来自期望地址的帧
    #[error("timed out waiting for frame from bus ID 0x{expected:03X}")]
    Timeout { expected: u16 },

    /// 设备层错误（接口不存在、帧构造失败等）
    #[error("bus device error: {0}")]
    Device(String),
}

// === 传输抽象 ===

/// CAN 传输抽象
///
/// 单线程使用、不做内部缓冲的裸传输接口。并发访问和应答分流由
/// `BusManager` 负责，传输实现只管收发一帧。
pub trait BusTransport: Send {
    /// 发送一帧（fire-and-forget）
    fn send(&mut self, frame: CanFrame) -> Result<(), BusError>;

    /// 接收一帧
    ///
    /// - `blocking = false`：立即返回，无帧可收时返回 `Ok(None)`
    /// - `blocking = true`：最多等待一个传输层读超时，超时返回 `Ok(None)`
    fn receive(&mut self, blocking: bool) -> Result<Option<CanFrame>, BusError>;
}
