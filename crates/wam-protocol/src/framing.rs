//! 属性 GET/SET 帧构建与应答解析
//!
//! 属性交换是严格的两阶段请求/应答：
//!
//! - GET 请求：1 字节（属性 ID）
//! - SET 命令：6 字节（属性 ID | SET 位，填充 0，值的 4 个小端字节）
//! - 应答：SET 格式的帧，长度 4 或 6，值从最后一个字节的符号位做符号扩展
//!
//! 字节布局由设备固件定义，与真实硬件互操作时必须逐位保持。

use crate::ids::{PROPERTY_MASK, SET_MASK, node_to_bus_id};
use crate::{CanFrame, ProtocolError};

/// 构建发往单个节点的属性 GET 请求帧
pub fn get_property_request(node_id: u16, prop_id: u8) -> CanFrame {
    CanFrame::new(node_to_bus_id(node_id), &[prop_id & PROPERTY_MASK])
}

/// 构建发往任意总线地址（节点或组）的属性 GET 请求帧
pub fn get_property_request_to(bus_id: u16, prop_id: u8) -> CanFrame {
    CanFrame::new(bus_id, &[prop_id & PROPERTY_MASK])
}

/// 构建发往任意总线地址（节点或组）的属性 SET 命令帧
pub fn set_property_command(bus_id: u16, prop_id: u8, value: i32) -> CanFrame {
    let v = value as u32;
    CanFrame::new(
        bus_id,
        &[
            (prop_id & PROPERTY_MASK) | SET_MASK,
            0,
            (v & 0x0000_00FF) as u8,
            ((v & 0x0000_FF00) >> 8) as u8,
            ((v & 0x00FF_0000) >> 16) as u8,
            ((v & 0xFF00_0000) >> 24) as u8,
        ],
    )
}

/// 解析属性应答帧的数据段
///
/// `node_id` 仅用于错误诊断：协议错误必须指认出错的节点。
pub fn parse_property_reply(node_id: u16, prop_id: u8, data: &[u8]) -> Result<i32, ProtocolError> {
    if data.len() != 4 && data.len() != 6 {
        return Err(ProtocolError::InvalidReplyLength {
            node: node_id,
            actual: data.len(),
        });
    }
    if data[0] & SET_MASK == 0 {
        return Err(ProtocolError::NotASetReply { node: node_id });
    }
    if data[0] & PROPERTY_MASK != prop_id & PROPERTY_MASK {
        return Err(ProtocolError::PropertyMismatch {
            node: node_id,
            expected: prop_id & PROPERTY_MASK,
            actual: data[0] & PROPERTY_MASK,
        });
    }
    if data[1] != 0 {
        return Err(ProtocolError::NonzeroPadByte {
            node: node_id,
            value: data[1],
        });
    }

    // 小端累加，最高字节符号位决定符号扩展
    let mut result: i32 = if data[data.len() - 1] & 0x80 != 0 { -1 } else { 0 };
    for &byte in data[2..].iter().rev() {
        result = (result << 8) | byte as i32;
    }
    Ok(result)
}
