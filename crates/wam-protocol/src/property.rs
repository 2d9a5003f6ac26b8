//! Puck 属性定义与属性 ID 映射表
//!
//! 属性的符号名在整个代码库中稳定不变；线上的属性 ID 则依赖
//! (Puck 角色, 固件版本) 二元组。固件在第 61 版重排了属性表：
//! 61 之前所有角色共用一张平铺表，61 起拆分为公共段 + 角色段。
//!
//! 非法的 (角色, 属性) 组合必须大声失败，而不是静默返回垃圾值。

use num_enum::TryFromPrimitive;

use crate::ProtocolError;

/// 属性表重排所在的固件版本
pub const PROPERTY_SPLIT_VERS: i32 = 61;

/// Puck 状态机取值（STAT 属性）
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(i32)]
pub enum PuckStatus {
    /// 复位态（未编程，等价于 Monitor）
    Reset = 0,
    /// 故障态
    Err = 1,
    /// 就绪态
    Ready = 2,
}

/// Puck 类型（由 ROLE 属性低 5 位解码）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PuckType {
    /// 未编程 / 监控固件
    Monitor,
    /// 安全模块
    Safety,
    /// 电机控制器
    Motor,
    /// 力/力矩传感器
    ForceTorque,
    /// 未识别
    Unknown,
}

/// ROLE 属性中的角色字段掩码
pub const ROLE_MASK: i32 = 0x1F;

/// ROLE 属性中的可选硬件标志位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum RoleOption {
    MagEncOnSerial = 0x0100,
    MagEncOnHall = 0x0200,
    MagEncOnEnc = 0x0400,
    Strain = 0x0800,
    Tact = 0x1000,
    Imu = 0x2000,
    OpticalEncOnEnc = 0x4000,
}

/// 从 ROLE 属性值解码 Puck 类型
pub fn puck_type_from_role(role: i32) -> PuckType {
    // 角色编号沿用固件定义：0=Tater, 1=Gimbals, 2=Safety,
    // 3=Wraptor, 4=Trigger, 5=BHand, 6=Force
    match role & ROLE_MASK {
        2 => PuckType::Safety,
        0 | 3 | 5 => PuckType::Motor,
        6 => PuckType::ForceTorque,
        _ => PuckType::Unknown,
    }
}

/// ROLE 值是否带有某个硬件选项位
pub fn role_has_option(role: i32, option: RoleOption) -> bool {
    role & (option as i32) != 0
}

/// Puck 属性的符号名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    // === 公共段（所有角色） ===
    /// 固件版本
    Vers,
    /// 角色 / 硬件选项
    Role,
    /// 序列号
    Sn,
    /// 节点 ID
    Id,
    /// 最近错误码
    Error,
    /// 状态机状态
    Stat,
    /// 安全模式（安全 Puck）/ 运行模式
    Mode,
    /// 温度
    Temp,
    /// 总线电压
    Vbus,
    /// 组分配 A
    Grpa,
    /// 组分配 B
    Grpb,
    /// 组分配 C
    Grpc,
    /// 立即命令
    Cmd,
    /// 保存属性到 EEPROM
    Save,
    /// 从 EEPROM 加载属性
    Load,
    /// 恢复属性出厂默认
    Def,

    // === 安全段 ===
    /// 关节零位已标定
    Zero,
    /// 力矩告警阈值
    Tl1,
    /// 力矩故障阈值
    Tl2,
    /// 速度告警阈值
    Vl1,
    /// 速度故障阈值
    Vl2,
    /// 忽略接下来的 N 次速度故障
    Ifault,

    // === 电机段 ===
    /// 目标力矩
    T,
    /// 最大力矩
    Mt,
    /// 编码器位置
    P,
    /// 机械绝对位置
    Mech,
    /// 每圈编码器计数
    Cts,
    /// 每牛·米电流
    Ipnm,
    /// 保持位置使能
    Hold,
    /// 停转超时
    Tstop,
    /// 电流环比例增益
    Ikp,
    /// 电流环积分增益
    Iki,
}

/// 公共段属性（按线上 ID 顺序）
const COMMON_PROPS: [Property; 16] = [
    Property::Vers,
    Property::Role,
    Property::Sn,
    Property::Id,
    Property::Error,
    Property::Stat,
    Property::Mode,
    Property::Temp,
    Property::Vbus,
    Property::Grpa,
    Property::Grpb,
    Property::Grpc,
    Property::Cmd,
    Property::Save,
    Property::Load,
    Property::Def,
];

/// 安全段属性（按线上 ID 顺序）
const SAFETY_PROPS: [Property; 6] = [
    Property::Zero,
    Property::Tl1,
    Property::Tl2,
    Property::Vl1,
    Property::Vl2,
    Property::Ifault,
];

/// 电机段属性（按线上 ID 顺序）
const MOTOR_PROPS: [Property; 10] = [
    Property::T,
    Property::Mt,
    Property::P,
    Property::Mech,
    Property::Cts,
    Property::Ipnm,
    Property::Hold,
    Property::Tstop,
    Property::Ikp,
    Property::Iki,
];

/// 61 版起角色段的基址
const SAFETY_BASE: u8 = 32;
const MOTOR_BASE: u8 = 42;

fn position_in(table: &[Property], prop: Property) -> Option<u8> {
    table.iter().position(|&p| p == prop).map(|i| i as u8)
}

/// 查询属性 ID；未映射时返回 `None`
///
/// 61 版之前的固件所有角色共用一张平铺表（公共段 + 安全段 + 电机段
/// 依次排列）；61 版起公共段保持不变，角色段移到各自的基址。
pub fn property_id_opt(prop: Property, puck_type: PuckType, vers: i32) -> Option<u8> {
    if let Some(id) = position_in(&COMMON_PROPS, prop) {
        return Some(id);
    }

    if vers < PROPERTY_SPLIT_VERS {
        // 平铺表：所有角色都能看到安全段与电机段
        let common_len = COMMON_PROPS.len() as u8;
        if let Some(i) = position_in(&SAFETY_PROPS, prop) {
            return Some(common_len + i);
        }
        if let Some(i) = position_in(&MOTOR_PROPS, prop) {
            return Some(common_len + SAFETY_PROPS.len() as u8 + i);
        }
        return None;
    }

    match puck_type {
        PuckType::Safety => position_in(&SAFETY_PROPS, prop).map(|i| SAFETY_BASE + i),
        PuckType::Motor => position_in(&MOTOR_PROPS, prop).map(|i| MOTOR_BASE + i),
        // Monitor / ForceTorque / Unknown 只应答公共段
        _ => None,
    }
}

/// 查询属性 ID；非法的 (角色, 属性) 组合大声失败
pub fn property_id(prop: Property, puck_type: PuckType, vers: i32) -> Result<u8, ProtocolError> {
    property_id_opt(prop, puck_type, vers).ok_or(ProtocolError::UnmappedProperty {
        property: prop,
        puck_type,
        vers,
    })
}
