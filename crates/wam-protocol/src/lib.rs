//! # WAM Protocol
//!
//! WAM 机械臂 CAN 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 总线地址编码（节点 / 组 / 主机）
//! - `property`: Puck 属性枚举与（角色, 固件版本）→ 属性 ID 映射表
//! - `framing`: 属性 GET/SET 帧构建与应答解析
//!
//! ## 字节序
//!
//! 属性值使用小端字节序，最高字节的符号位做符号扩展（与 Puck 固件一致）。

pub mod framing;
pub mod ids;
pub mod property;

pub use framing::*;
pub use ids::*;
pub use property::*;

use thiserror::Error;

/// CAN 2.0 标准帧的统一抽象
///
/// 协议层和硬件层之间的中间抽象：协议层不依赖底层 CAN 实现，
/// 上层经 `BusTransport` trait 使用统一的帧类型。
///
/// 固定 8 字节数据，避免堆分配；`Copy` 以适应高频收发场景。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CanFrame {
    /// 11-bit 总线 ID（含节点/组寻址位）
    pub id: u16,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,
}

impl CanFrame {
    /// 创建标准帧；数据超过 8 字节时截断
    pub fn new(id: u16, data: &[u8]) -> Self {
        let mut fixed = [0u8; 8];
        let len = data.len().min(8);
        fixed[..len].copy_from_slice(&data[..len]);
        Self {
            id,
            data: fixed,
            len: len as u8,
        }
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

/// 协议层错误类型
///
/// 协议违例对当前操作总是致命的：帧必须完整指认出错的节点与属性，
/// 不做静默重试（重试有状态的请求/应答交换会破坏会话同步）。
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid node ID: {id} (valid range: {min}..={max})", min = ids::MIN_NODE_ID, max = ids::MAX_NODE_ID)]
    InvalidNodeId { id: u16 },

    #[error("Invalid group ID: 0x{id:X} (reserved group range: 0x{lo:X}..=0x{hi:X})", lo = ids::GROUP_MASK, hi = ids::TO_MASK)]
    InvalidGroupId { id: u16 },

    #[error("Invalid reply length from node {node}: expected 4 or 6, got {actual}")]
    InvalidReplyLength { node: u16, actual: usize },

    #[error("Reply from node {node} is a GET request, not a SET reply")]
    NotASetReply { node: u16 },

    #[error("Property mismatch in reply from node {node}: expected {expected}, got {actual}")]
    PropertyMismatch { node: u16, expected: u8, actual: u8 },

    #[error("Nonzero pad byte in reply from node {node}: {value}")]
    NonzeroPadByte { node: u16, value: u8 },

    #[error(
        "Property {property:?} is not defined for {puck_type:?} pucks with firmware version {vers}"
    )]
    UnmappedProperty {
        property: property::Property,
        puck_type: property::PuckType,
        vers: i32,
    },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: i32 },
}
