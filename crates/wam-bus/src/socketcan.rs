//! SocketCAN 传输实现
//!
//! Linux 平台下基于内核 SocketCAN 子系统的 `BusTransport` 实现。
//!
//! ## 限制
//!
//! - 仅限 Linux 平台
//! - 波特率等接口配置由系统工具（`ip link`）完成，不在应用层设置
//! - 只处理标准帧，WAM 总线不使用扩展帧和 RTR 帧

use std::io::ErrorKind;
use std::time::Duration;

use socketcan::{CanSocket, EmbeddedFrame, Frame, Socket, StandardId};
use tracing::{info, trace};

use wam_protocol::CanFrame;

use crate::{BusError, BusTransport};

/// 阻塞读取时的传输层读超时
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// SocketCAN 总线传输
pub struct SocketCanBus {
    socket: CanSocket,
    interface: String,
}

impl SocketCanBus {
    /// 打开 CAN 接口（如 `"can0"` 或 `"vcan0"`）
    ///
    /// 接口必须已存在且处于 UP 状态，否则返回 `BusError::Device`。
    pub fn open(interface: impl Into<String>) -> Result<Self, BusError> {
        let interface = interface.into();
        let socket = CanSocket::open(&interface).map_err(|e| {
            BusError::Device(format!(
                "failed to open CAN interface '{}': {} (is it up? try: sudo ip link set up {})",
                interface, e, interface
            ))
        })?;
        socket
            .set_nonblocking(true)
            .map_err(|e| BusError::Device(format!("failed to set nonblocking mode: {}", e)))?;
        info!(interface = %interface, "SocketCAN bus opened");
        Ok(Self { socket, interface })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn read_one(&mut self) -> Result<Option<CanFrame>, BusError> {
        match self.socket.read_frame() {
            Ok(raw) => {
                if raw.is_error_frame() || raw.is_remote_frame() || raw.is_extended() {
                    // WAM 协议只使用标准数据帧，其余一律忽略
                    trace!(interface = %self.interface, "ignoring non-standard frame");
                    return Ok(None);
                }
                Ok(Some(CanFrame::new(raw.raw_id() as u16, raw.data())))
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(None)
            },
            Err(e) => Err(BusError::Io(e)),
        }
    }
}

impl BusTransport for SocketCanBus {
    fn send(&mut self, frame: CanFrame) -> Result<(), BusError> {
        let id = StandardId::new(frame.id)
            .ok_or_else(|| BusError::Device(format!("invalid standard ID 0x{:X}", frame.id)))?;
        let raw = socketcan::CanFrame::new(id, frame.data_slice()).ok_or_else(|| {
            BusError::Device(format!("failed to build frame with ID 0x{:X}", frame.id))
        })?;
        self.socket
            .write_frame(&raw)
            .map_err(|e| BusError::Io(std::io::Error::other(e)))?;
        trace!(
            interface = %self.interface,
            id = format_args!("0x{:03X}", frame.id),
            len = frame.len,
            "frame sent"
        );
        Ok(())
    }

    fn receive(&mut self, blocking: bool) -> Result<Option<CanFrame>, BusError> {
        if !blocking {
            return self.read_one();
        }
        // 非阻塞 socket 上用有限轮询模拟一个读超时
        let deadline = std::time::Instant::now() + READ_TIMEOUT;
        loop {
            if let Some(frame) = self.read_one()? {
                return Ok(Some(frame));
            }
            if std::time::Instant::now() >= deadline {
                return Ok(None);
            }
            spin_sleep::sleep(Duration::from_micros(100));
        }
    }
}
