//! 单 Puck 节点句柄
//!
//! 构造时执行发现握手（读 ROLE/VERS/STAT），之后提供阻塞 / 限时 /
//! 两阶段三种属性访问方式。唤醒流程把处于 Monitor 态的节点批量拉起，
//! 期间持有总线锁，防止其他线程在收发器上下线时说话。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use wam_bus::{BusGuard, BusManager};
use wam_protocol::framing::{get_property_request, parse_property_reply, set_property_command};
use wam_protocol::ids::{node_to_bus_id, reply_bus_id, validate_node_id};
use wam_protocol::property::{Property, PuckStatus, PuckType, property_id, puck_type_from_role};

use crate::PuckError;

/// 唤醒命令发出后固件完成自举所需的时间
pub const WAKE_UP_TIME: Duration = Duration::from_secs(1);

/// 收发器下线期间的总线静默时间（逐个唤醒时插在节点之间）
pub const TURN_OFF_TIME: Duration = Duration::from_millis(10);

/// 唤醒后重新轮询 STAT 的应答预算（自举中的节点应答更慢）
const WAKE_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// 限时读取时的轮询间隔
const TRY_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// 总线上的一个 Puck 节点
///
/// 发现到的身份信息（固件版本、角色、类型）缓存在句柄里；
/// [`Puck::update_status`] 和唤醒流程会刷新缓存。
pub struct Puck {
    bus: Arc<BusManager>,
    id: u16,
    vers: i32,
    role: i32,
    puck_type: PuckType,
    effective_type: PuckType,
}

impl Puck {
    /// 连接到节点并执行发现握手
    ///
    /// 节点 ID 必须落在 1..=31。握手读取 ROLE 和 VERS/STAT；
    /// STAT 不是 RESET/READY 时返回 `PuckError::UnexpectedStatus`。
    pub fn new(bus: Arc<BusManager>, id: u16) -> Result<Self, PuckError> {
        validate_node_id(id)?;
        let mut puck = Self {
            bus,
            id,
            vers: 0,
            role: 0,
            // 公共段属性的映射与类型无关，发现期先按 Monitor 处理
            puck_type: PuckType::Monitor,
            effective_type: PuckType::Monitor,
        };
        puck.update_role()?;
        puck.update_status()?;
        info!(
            id = puck.id,
            vers = puck.vers,
            puck_type = ?puck.puck_type,
            effective = ?puck.effective_type,
            "puck discovered"
        );
        Ok(puck)
    }

    // === 身份信息 ===

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn vers(&self) -> i32 {
        self.vers
    }

    pub fn role(&self) -> i32 {
        self.role
    }

    /// ROLE 解码出的本体类型
    pub fn puck_type(&self) -> PuckType {
        self.puck_type
    }

    /// 当前有效类型；复位态（Monitor 固件）下为 `Monitor`
    pub fn effective_type(&self) -> PuckType {
        self.effective_type
    }

    pub fn bus(&self) -> &Arc<BusManager> {
        &self.bus
    }

    /// 重新读取 ROLE 并解码本体类型
    pub fn update_role(&mut self) -> Result<(), PuckError> {
        self.role = self.get_property(Property::Role)?;
        self.puck_type = puck_type_from_role(self.role);
        Ok(())
    }

    /// 重新读取 VERS 和 STAT，刷新有效类型
    pub fn update_status(&mut self) -> Result<(), PuckError> {
        self.vers = self.get_property(Property::Vers)?;
        let stat = self.get_property(Property::Stat)?;
        match PuckStatus::try_from(stat) {
            Ok(PuckStatus::Reset) => {
                debug!(id = self.id, "puck is in reset (monitor) state");
                self.effective_type = PuckType::Monitor;
            },
            Ok(PuckStatus::Ready) => {
                self.effective_type = self.puck_type;
            },
            _ => {
                return Err(PuckError::UnexpectedStatus { id: self.id, stat });
            },
        }
        Ok(())
    }

    // === 属性访问 ===

    /// 当前身份下属性的线上 ID
    pub fn property_id(&self, prop: Property) -> Result<u8, PuckError> {
        Ok(property_id(prop, self.effective_type, self.vers)?)
    }

    /// 阻塞读属性（一次持锁的请求 + 应答交换）
    pub fn get_property(&self, prop: Property) -> Result<i32, PuckError> {
        let prop_id = self.property_id(prop)?;
        let mut guard = self.bus.lock();
        Self::send_request(&mut guard, self.id, prop_id)?;
        Self::receive_reply(&mut guard, self.id, prop_id, true)?
            .ok_or(wam_bus::BusError::Timeout {
                expected: reply_bus_id(self.id),
            })
            .map_err(PuckError::from)
    }

    /// 限时读属性；超时返回 `Ok(None)`，其余错误照常上抛
    pub fn try_get_property(
        &self,
        prop: Property,
        timeout: Duration,
    ) -> Result<Option<i32>, PuckError> {
        let prop_id = self.property_id(prop)?;
        let mut guard = self.bus.lock();
        Self::send_request(&mut guard, self.id, prop_id)?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = Self::receive_reply(&mut guard, self.id, prop_id, false)? {
                return Ok(Some(value));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            spin_sleep::sleep(TRY_POLL_INTERVAL);
        }
    }

    /// 写属性
    ///
    /// `blocking` 置位时紧跟一次 STAT 读取。属性写入不产生应答，
    /// 连续写会塞满 Puck 的接收队列，用一次往返给固件留出消化时间。
    pub fn set_property(&self, prop: Property, value: i32, blocking: bool) -> Result<(), PuckError> {
        let prop_id = self.property_id(prop)?;
        self.bus
            .send(set_property_command(node_to_bus_id(self.id), prop_id, value))?;
        if blocking {
            self.get_property(Property::Stat)?;
        }
        Ok(())
    }

    /// 把属性的当前值保存到 EEPROM
    pub fn save_property(&self, prop: Property) -> Result<(), PuckError> {
        let prop_id = self.property_id(prop)?;
        self.set_property(Property::Save, prop_id as i32, true)
    }

    /// 把属性恢复为出厂默认并重新加载
    pub fn reset_property(&self, prop: Property) -> Result<(), PuckError> {
        let prop_id = self.property_id(prop)?;
        self.set_property(Property::Def, prop_id as i32, false)?;
        self.set_property(Property::Load, prop_id as i32, true)
    }

    // === 两阶段访问（组查询和实时回路使用） ===

    /// 发出属性查询请求，返回线上属性 ID 供配对的应答接收使用
    pub fn send_get_property_request(
        &self,
        guard: &mut BusGuard<'_>,
        prop: Property,
    ) -> Result<u8, PuckError> {
        let prop_id = self.property_id(prop)?;
        Self::send_request(guard, self.id, prop_id)?;
        Ok(prop_id)
    }

    /// 接收配对的属性应答；非阻塞模式下无应答返回 `Ok(None)`
    pub fn receive_get_property_reply(
        &self,
        guard: &mut BusGuard<'_>,
        prop_id: u8,
        blocking: bool,
    ) -> Result<Option<i32>, PuckError> {
        Self::receive_reply(guard, self.id, prop_id, blocking)
    }

    fn send_request(guard: &mut BusGuard<'_>, id: u16, prop_id: u8) -> Result<(), PuckError> {
        guard.send(get_property_request(id, prop_id))?;
        Ok(())
    }

    fn receive_reply(
        guard: &mut BusGuard<'_>,
        id: u16,
        prop_id: u8,
        blocking: bool,
    ) -> Result<Option<i32>, PuckError> {
        let frame = if blocking {
            Some(guard.receive(reply_bus_id(id))?)
        } else {
            guard.try_receive(reply_bus_id(id))?
        };
        match frame {
            Some(frame) => Ok(Some(parse_property_reply(id, prop_id, frame.data_slice())?)),
            None => Ok(None),
        }
    }

    // === 唤醒 ===

    /// 唤醒单个节点
    pub fn wake(&mut self) -> Result<(), PuckError> {
        Self::wake_all([self])
    }

    /// 批量唤醒处于 Monitor 态的节点
    ///
    /// 全部节点必须共享同一条总线。分两步：先持总线锁向每个节点发
    /// STAT=READY（节点之间留出收发器下线的静默时间），等固件自举；
    /// 然后逐个重新轮询 STAT。轮询失败的节点会被指名道姓地上报。
    pub fn wake_all<'a>(pucks: impl IntoIterator<Item = &'a mut Puck>) -> Result<(), PuckError> {
        let mut asleep: Vec<&mut Puck> = pucks
            .into_iter()
            .filter(|p| p.effective_type == PuckType::Monitor)
            .collect();
        if asleep.is_empty() {
            return Ok(());
        }

        info!(count = asleep.len(), "waking pucks");

        // 收发器上下线期间总线上不能有别的流量，否则主机可能 bus-off
        {
            let bus = asleep[0].bus.clone();
            let mut guard = bus.lock();
            for puck in asleep.iter() {
                let stat_id = puck.property_id(Property::Stat)?;
                guard.send(set_property_command(
                    node_to_bus_id(puck.id),
                    stat_id,
                    PuckStatus::Ready as i32,
                ))?;
                spin_sleep::sleep(TURN_OFF_TIME);
            }
            spin_sleep::sleep(WAKE_UP_TIME);
        }

        for puck in asleep.iter_mut() {
            match puck.try_get_property(Property::Stat, WAKE_POLL_TIMEOUT)? {
                Some(stat) if stat == PuckStatus::Ready as i32 => {
                    puck.update_status()?;
                },
                Some(stat) => {
                    warn!(id = puck.id, stat, "puck answered wake poll with bad status");
                    return Err(PuckError::WakeFailed { id: puck.id, stat });
                },
                None => {
                    warn!(id = puck.id, "puck did not answer wake poll");
                    return Err(PuckError::WakeTimeout { id: puck.id });
                },
            }
        }
        Ok(())
    }
}
