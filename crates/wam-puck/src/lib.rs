//! Puck 节点抽象层
//!
//! 总线上的每个节点都是一块 "Puck" 电机控制板（或安全板）。本层提供：
//!
//! - [`Puck`]：单节点句柄，负责发现握手与属性读写
//! - [`PuckGroup`]：组寻址句柄，一条请求换取 N 份按成员顺序的应答
//! - [`SafetyModule`]：安全板句柄，只读的硬件安全状态机视图
//! - [`sim`]：内存仿真 Puck，配合 `LoopbackBus` 在无硬件环境下测试
//!
//! 所有句柄共享同一个 [`wam_bus::BusManager`]，多步交换（唤醒握手、
//! 请求 + 应答）在持有总线锁的情况下完成。

use thiserror::Error;

use wam_bus::BusError;
use wam_protocol::{Property, ProtocolError, PuckType};

mod group;
mod puck;
mod safety;
pub mod sim;

pub use group::PuckGroup;
pub use puck::Puck;
pub use safety::{SafetyModule, SafetyMode, DEFAULT_POLL_PERIOD};

// === 错误类型 ===

/// Puck 层错误
#[derive(Error, Debug)]
pub enum PuckError {
    /// 总线收发失败
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// 协议编解码失败
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 发现握手时读到了 RESET/READY 之外的状态
    #[error("puck ID={id} reported unexpected status {stat}")]
    UnexpectedStatus { id: u16, stat: i32 },

    /// 唤醒后节点应答了，但状态不是 READY
    #[error("failed to wake puck ID={id}: STAT={stat}")]
    WakeFailed { id: u16, stat: i32 },

    /// 唤醒后节点在预算时间内没有任何应答
    #[error("failed to wake puck ID={id}: no response")]
    WakeTimeout { id: u16 },

    /// 属性在组成员间映射到了不同的线上 ID，不能整组使用
    #[error("property {property:?} does not map uniformly across group members")]
    GroupPropertyMismatch { property: Property },

    /// 组查询中某个成员出错，批量结果作废
    #[error(
        "group 0x{group_id:03X} member {member_index} (puck ID={node_id}) faulted: {source}"
    )]
    GroupMemberFault {
        group_id: u16,
        node_id: u16,
        member_index: usize,
        #[source]
        source: Box<PuckError>,
    },

    /// 构造 SafetyModule 的 Puck 不是安全板
    #[error("puck ID={id} is not a safety module (type {puck_type:?})")]
    NotSafetyPuck { id: u16, puck_type: PuckType },

    /// 安全板报告了 0/1/2 之外的模式值
    #[error("puck ID={id} reported invalid safety mode {value}")]
    InvalidSafetyMode { id: u16, value: i32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_member_fault_names_the_member() {
        let err = PuckError::GroupMemberFault {
            group_id: 0x405,
            node_id: 3,
            member_index: 2,
            source: Box::new(PuckError::Bus(BusError::Timeout { expected: 0x466 })),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x405"));
        assert!(msg.contains("member 2"));
        assert!(msg.contains("ID=3"));
    }
}
