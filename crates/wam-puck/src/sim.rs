//! 内存仿真 Puck
//!
//! 挂在 [`wam_bus::LoopbackBus`] 的应答器上，按真实固件的帧格式应答
//! GET/SET 请求。用于单元测试和无硬件环境下的整机联调。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use wam_bus::LoopbackHandle;
use wam_protocol::framing::set_property_command;
use wam_protocol::ids::{
    BGRP_WHOLE_BUS, GROUP_MASK, HOST_ID, PROPERTY_MASK, SET_MASK, decode_bus_id, reply_bus_id,
};
use wam_protocol::property::{PROPERTY_SPLIT_VERS, Property, PuckStatus, property_id_opt,
    puck_type_from_role};
use wam_protocol::CanFrame;

/// 仿真 Puck 节点
///
/// 属性按线上 ID 存放。VERS/ROLE/STAT 等公共属性在构造时写入，
/// 其余属性默认读出 0。
pub struct SimulatedPuck {
    pub id: u16,
    /// 所属组地址（组播 SET/GET 会命中这些地址）
    pub groups: Vec<u16>,
    /// 置位后不再应答任何请求，用来模拟掉线节点
    pub silent: bool,
    props: HashMap<u8, i32>,
    vers: i32,
    role: i32,
}

impl SimulatedPuck {
    /// 创建一个已就绪（STAT=READY）的仿真 Puck
    pub fn new(id: u16, vers: i32, role: i32) -> Self {
        let mut puck = Self {
            id,
            groups: Vec::new(),
            silent: false,
            props: HashMap::new(),
            vers,
            role,
        };
        puck.set_common(Property::Vers, vers);
        puck.set_common(Property::Role, role);
        puck.set_common(Property::Stat, PuckStatus::Ready as i32);
        puck.set_common(Property::Id, id as i32);
        puck
    }

    /// 创建一个仍处于复位态（Monitor）的仿真 Puck
    pub fn new_in_reset(id: u16, vers: i32, role: i32) -> Self {
        let mut puck = Self::new(id, vers, role);
        puck.set_common(Property::Stat, PuckStatus::Reset as i32);
        puck
    }

    fn set_common(&mut self, prop: Property, value: i32) {
        // 公共段属性的线上 ID 与角色和版本无关
        if let Some(id) = property_id_opt(prop, puck_type_from_role(self.role), self.vers) {
            self.props.insert(id, value);
        }
    }

    /// 直接写属性（绕过总线），`prop` 按该 Puck 自己的映射表解析
    pub fn write(&mut self, prop: Property, value: i32) {
        let puck_type = puck_type_from_role(self.role);
        if let Some(id) = property_id_opt(prop, puck_type, self.vers) {
            self.props.insert(id, value);
        }
    }

    /// 直接读属性（绕过总线）
    pub fn read(&self, prop: Property) -> Option<i32> {
        let puck_type = puck_type_from_role(self.role);
        property_id_opt(prop, puck_type, self.vers)
            .and_then(|id| self.props.get(&id).copied())
    }

    /// 按线上 ID 直接读属性
    pub fn read_raw(&self, prop_id: u8) -> i32 {
        self.props.get(&prop_id).copied().unwrap_or(0)
    }

    fn addressed_to_me(&self, to: u16) -> bool {
        if to & GROUP_MASK != 0 {
            to == BGRP_WHOLE_BUS || self.groups.contains(&to)
        } else {
            to == self.id
        }
    }

    /// 处理一帧主机发出的请求，GET 返回应答帧，SET 返回 `None`
    fn respond(&mut self, frame: &CanFrame) -> Option<CanFrame> {
        let (from, to) = decode_bus_id(frame.id);
        if from != HOST_ID || !self.addressed_to_me(to) || self.silent {
            return None;
        }

        let data = frame.data_slice();
        let first = *data.first()?;
        let prop_id = first & PROPERTY_MASK;

        if first & SET_MASK != 0 {
            // SET：小端补齐到 4 字节后存储，不应答；缺数据段的残帧直接丢弃
            let payload = data.get(2..).filter(|p| !p.is_empty())?;
            let mut value: i32 = if payload.last().copied().unwrap_or(0) & 0x80 != 0 {
                -1
            } else {
                0
            };
            for &byte in payload.iter().rev() {
                value = (value << 8) | byte as i32;
            }
            self.props.insert(prop_id, value);
            None
        } else {
            // GET：用 SET 格式把属性值答给应答组
            let value = self.read_raw(prop_id);
            Some(set_property_command(reply_bus_id(self.id), prop_id, value))
        }
    }
}

/// `install` 返回的共享节点列表
pub type SharedPucks = Arc<Mutex<Vec<SimulatedPuck>>>;

/// 把一组仿真 Puck 装上回环总线
///
/// 返回共享句柄，测试可以在总线运转期间继续改写节点状态。
pub fn install(handle: &LoopbackHandle, pucks: Vec<SimulatedPuck>) -> SharedPucks {
    let shared = Arc::new(Mutex::new(pucks));
    let responder_pucks = shared.clone();
    handle.set_responder(move |frame| {
        let mut pucks = responder_pucks.lock();
        pucks.iter_mut().filter_map(|p| p.respond(frame)).collect()
    });
    shared
}

/// 常用的仿真固件版本（属性表重排之后）
pub const SIM_VERS: i32 = PROPERTY_SPLIT_VERS + 40;

/// 电机角色（Tater，不带硬件选项）
pub const SIM_MOTOR_ROLE: i32 = 0;

/// 安全板角色
pub const SIM_SAFETY_ROLE: i32 = 2;
