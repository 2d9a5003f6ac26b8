//! Puck 组寻址
//!
//! 一条组寻址的 GET 换取全体成员的应答，把 N 次往返压缩成一次广播加
//! N 次接收，是实时回路逐周期读位置的基础。应答按成员顺序接收；任何
//! 成员出错都指名道姓地让整批作废，调用方拿不到部分结果。

use std::sync::Arc;

use tracing::debug;

use wam_bus::BusManager;
use wam_protocol::framing::{get_property_request_to, set_property_command};
use wam_protocol::ids::validate_group_id;
use wam_protocol::property::Property;

use crate::{Puck, PuckError};

/// 共享同一条总线的一组 Puck
pub struct PuckGroup {
    id: u16,
    pucks: Vec<Arc<Puck>>,
    bus: Arc<BusManager>,
}

impl PuckGroup {
    /// 创建组句柄
    ///
    /// 组 ID 必须落在保留的组地址区间；成员顺序决定批量结果的顺序。
    pub fn new(id: u16, pucks: Vec<Arc<Puck>>) -> Result<Self, PuckError> {
        validate_group_id(id)?;
        let bus = pucks
            .first()
            .map(|p| p.bus().clone())
            .ok_or(wam_bus::BusError::Device("puck group needs at least one member".into()))?;
        debug!(group = format_args!("0x{:03X}", id), members = pucks.len(), "puck group created");
        Ok(Self { id, pucks, bus })
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.pucks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pucks.is_empty()
    }

    pub fn pucks(&self) -> &[Arc<Puck>] {
        &self.pucks
    }

    /// 属性整组可用时返回统一的线上 ID
    ///
    /// 成员的固件版本或角色不同时，同一属性可能映射到不同的线上 ID，
    /// 这种属性不能整组使用。
    pub fn verify_property(&self, prop: Property) -> Result<u8, PuckError> {
        let mut ids = self.pucks.iter().map(|p| p.property_id(prop));
        let first = ids
            .next()
            .ok_or(PuckError::GroupPropertyMismatch { property: prop })??;
        for id in ids {
            if id? != first {
                return Err(PuckError::GroupPropertyMismatch { property: prop });
            }
        }
        Ok(first)
    }

    /// 组寻址批量读属性，结果按成员顺序排列
    ///
    /// 持总线锁发出一条组 GET，然后依次接收每个成员的应答。
    pub fn get_property(&self, prop: Property) -> Result<Vec<i32>, PuckError> {
        let prop_id = self.verify_property(prop)?;

        let mut guard = self.bus.lock();
        guard.send(get_property_request_to(self.id, prop_id))?;

        let mut values = Vec::with_capacity(self.pucks.len());
        for (member_index, puck) in self.pucks.iter().enumerate() {
            let value = puck
                .receive_get_property_reply(&mut guard, prop_id, true)
                .and_then(|v| {
                    v.ok_or(PuckError::Bus(wam_bus::BusError::Timeout {
                        expected: wam_protocol::ids::reply_bus_id(puck.id()),
                    }))
                })
                .map_err(|source| PuckError::GroupMemberFault {
                    group_id: self.id,
                    node_id: puck.id(),
                    member_index,
                    source: Box::new(source),
                })?;
            values.push(value);
        }
        Ok(values)
    }

    /// 组寻址写属性（一条广播，无应答）
    pub fn set_property(&self, prop: Property, value: i32) -> Result<(), PuckError> {
        let prop_id = self.verify_property(prop)?;
        self.bus.send(set_property_command(self.id, prop_id, value))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{self, SIM_MOTOR_ROLE, SIM_VERS, SimulatedPuck};
    use std::time::Duration;
    use wam_bus::LoopbackBus;
    use wam_protocol::ids::GROUP_MASK;
    use wam_protocol::property::PROPERTY_SPLIT_VERS;

    const GRP: u16 = GROUP_MASK | 1;

    fn group_of(ids: &[u16]) -> (PuckGroup, wam_bus::LoopbackHandle, sim::SharedPucks) {
        let (bus, handle) = LoopbackBus::new();
        let sims = ids
            .iter()
            .map(|&id| {
                let mut p = SimulatedPuck::new(id, SIM_VERS, SIM_MOTOR_ROLE);
                p.groups.push(GRP);
                p
            })
            .collect();
        let shared = sim::install(&handle, sims);
        let bus = Arc::new(
            BusManager::new(Box::new(bus)).with_receive_timeout(Duration::from_millis(20)),
        );
        let pucks = ids
            .iter()
            .map(|&id| Arc::new(Puck::new(bus.clone(), id).unwrap()))
            .collect();
        (PuckGroup::new(GRP, pucks).unwrap(), handle, shared)
    }

    #[test]
    fn test_group_id_validation() {
        let (group, _handle, _sims) = group_of(&[1]);
        let pucks = group.pucks().to_vec();
        // 单节点地址不是组地址
        assert!(PuckGroup::new(3, pucks).is_err());
    }

    #[test]
    fn test_batch_get_in_member_order() {
        let (group, _handle, sims) = group_of(&[1, 2, 3, 4]);
        {
            let mut sims = sims.lock();
            for (i, p) in sims.iter_mut().enumerate() {
                p.write(Property::P, (i as i32 + 1) * 1000);
            }
        }

        assert_eq!(group.get_property(Property::P).unwrap(), vec![1000, 2000, 3000, 4000]);
    }

    #[test]
    fn test_batch_is_one_request() {
        let (group, handle, _sims) = group_of(&[1, 2, 3]);
        handle.clear_sent();

        group.get_property(Property::P).unwrap();
        assert_eq!(handle.sent_frames().len(), 1);
        assert_eq!(handle.sent_frames()[0].id, GRP);
    }

    #[test]
    fn test_member_fault_voids_the_batch() {
        let (group, _handle, sims) = group_of(&[1, 2, 3]);
        sims.lock()[1].silent = true;

        match group.get_property(Property::P) {
            Err(PuckError::GroupMemberFault {
                group_id,
                node_id,
                member_index,
                ..
            }) => {
                assert_eq!(group_id, GRP);
                assert_eq!(node_id, 2);
                assert_eq!(member_index, 1);
            },
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_group_set_is_one_broadcast() {
        let (group, handle, sims) = group_of(&[1, 2]);
        handle.clear_sent();

        group.set_property(Property::T, 120).unwrap();
        assert_eq!(handle.sent_frames().len(), 1);
        assert_eq!(sims.lock()[0].read(Property::T), Some(120));
        assert_eq!(sims.lock()[1].read(Property::T), Some(120));
    }

    #[test]
    fn test_verify_property_rejects_mixed_generations() {
        let (bus, handle) = LoopbackBus::new();
        let mut old = SimulatedPuck::new(1, PROPERTY_SPLIT_VERS - 1, SIM_MOTOR_ROLE);
        let mut new = SimulatedPuck::new(2, SIM_VERS, SIM_MOTOR_ROLE);
        old.groups.push(GRP);
        new.groups.push(GRP);
        sim::install(&handle, vec![old, new]);
        let bus = Arc::new(
            BusManager::new(Box::new(bus)).with_receive_timeout(Duration::from_millis(20)),
        );

        let pucks = vec![
            Arc::new(Puck::new(bus.clone(), 1).unwrap()),
            Arc::new(Puck::new(bus, 2).unwrap()),
        ];
        let group = PuckGroup::new(GRP, pucks).unwrap();

        // 电机段属性在新旧固件上线上 ID 不同
        match group.verify_property(Property::P) {
            Err(PuckError::GroupPropertyMismatch { property }) => {
                assert_eq!(property, Property::P);
            },
            other => panic!("unexpected result: {other:?}"),
        }
        // 公共段属性跨代稳定，仍然整组可用
        assert!(group.verify_property(Property::Stat).is_ok());
    }
}
