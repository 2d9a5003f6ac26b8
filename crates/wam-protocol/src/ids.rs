//! 总线地址编码
//!
//! 11-bit 总线 ID 的位布局（与现有 Puck 固件逐位一致）：
//!
//! ```text
//! bit 10    9 .. 5    4 .. 0
//! [GROUP]  [FROM]    [TO / group number]
//! ```
//!
//! 主机节点 ID 为 0；节点应答普通属性查询时发往反馈组 `FGRP_OTHER`。

use crate::ProtocolError;

/// 节点 ID 位宽
pub const NODE_ID_WIDTH: u16 = 5;
/// 节点 ID 掩码
pub const NODE_ID_MASK: u16 = 0x1F;
/// 控制主机的节点 ID
pub const HOST_ID: u16 = 0;

/// 最小合法节点 ID（0 保留给主机）
pub const MIN_NODE_ID: u16 = 1;
/// 最大合法节点 ID
pub const MAX_NODE_ID: u16 = 31;

/// 组寻址标志位
pub const GROUP_MASK: u16 = 0x400;
/// 发送方字段掩码
pub const FROM_MASK: u16 = 0x3E0;
/// 接收方字段掩码（含组标志位）
pub const TO_MASK: u16 = 0x41F;

/// SET 命令标志位（属性字节）
pub const SET_MASK: u8 = 0x80;
/// 属性 ID 掩码（属性字节）
pub const PROPERTY_MASK: u8 = 0x7F;

/// 普通属性应答的反馈组
pub const FGRP_OTHER: u16 = GROUP_MASK | 6;
/// 电机编码器位置应答的反馈组
pub const FGRP_MOTOR_POSITION: u16 = GROUP_MASK | 3;

/// 全总线广播组（安全 Puck 除外）
pub const BGRP_WHOLE_BUS: u16 = GROUP_MASK;
/// 整臂广播组（Puck 1-7）
pub const BGRP_WAM: u16 = GROUP_MASK | 4;
/// 下臂力矩组（Puck 1-4）
pub const BGRP_LOWER_WAM: u16 = GROUP_MASK | 1;
/// 上臂力矩组（Puck 5-7）
pub const BGRP_UPPER_WAM: u16 = GROUP_MASK | 2;

/// 主机 → 节点的总线 ID
pub fn node_to_bus_id(node_id: u16) -> u16 {
    (node_id & TO_MASK) | (HOST_ID << NODE_ID_WIDTH)
}

/// 总线 ID → 发送方节点 ID
pub fn bus_to_node_id(bus_id: u16) -> u16 {
    (bus_id & FROM_MASK) >> NODE_ID_WIDTH
}

/// 编码 (from, to) 地址对
pub fn encode_bus_id(from: u16, to: u16) -> u16 {
    (to & TO_MASK) | ((from & NODE_ID_MASK) << NODE_ID_WIDTH)
}

/// 解码总线 ID 为 (from, to)
pub fn decode_bus_id(bus_id: u16) -> (u16, u16) {
    ((bus_id & FROM_MASK) >> NODE_ID_WIDTH, bus_id & TO_MASK)
}

/// 节点应答普通属性查询时使用的总线 ID
pub fn reply_bus_id(node_id: u16) -> u16 {
    encode_bus_id(node_id, FGRP_OTHER)
}

/// 校验单节点 ID 落在合法地址区间内
pub fn validate_node_id(id: u16) -> Result<(), ProtocolError> {
    if (MIN_NODE_ID..=MAX_NODE_ID).contains(&id) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidNodeId { id })
    }
}

/// 校验组 ID 落在保留的组地址区间内
///
/// 组 ID 必须设置组标志位，且不得与广播/单节点地址区间冲突。
pub fn validate_group_id(id: u16) -> Result<(), ProtocolError> {
    if (id & GROUP_MASK) != 0 && (id & !TO_MASK) == 0 {
        Ok(())
    } else {
        Err(ProtocolError::InvalidGroupId { id })
    }
}
