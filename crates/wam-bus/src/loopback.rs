//! 内存回环传输
//!
//! 测试与仿真用的 `BusTransport` 实现。发送的帧被记录下来，接收队列由
//! 测试代码或注册的应答器填充。应答器在 `send` 时同步产生应答帧，可以
//! 用来模拟一节点或整条总线上的 Puck。

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use wam_protocol::CanFrame;

use crate::{BusError, BusTransport};

type Responder = Box<dyn FnMut(&CanFrame) -> Vec<CanFrame> + Send>;

#[derive(Default)]
struct LoopbackState {
    sent: Vec<CanFrame>,
    rx_queue: VecDeque<CanFrame>,
    responder: Option<Responder>,
}

/// 回环传输端
pub struct LoopbackBus {
    state: Arc<Mutex<LoopbackState>>,
}

/// 测试侧句柄，可以在传输端被 `BusManager` 占有之后继续注入和观察帧
#[derive(Clone)]
pub struct LoopbackHandle {
    state: Arc<Mutex<LoopbackState>>,
}

impl LoopbackBus {
    pub fn new() -> (Self, LoopbackHandle) {
        let state = Arc::new(Mutex::new(LoopbackState::default()));
        (
            Self {
                state: state.clone(),
            },
            LoopbackHandle { state },
        )
    }
}

impl BusTransport for LoopbackBus {
    fn send(&mut self, frame: CanFrame) -> Result<(), BusError> {
        let mut state = self.state.lock();
        state.sent.push(frame);
        if let Some(mut responder) = state.responder.take() {
            let replies = responder(&frame);
            state.rx_queue.extend(replies);
            state.responder = Some(responder);
        }
        Ok(())
    }

    fn receive(&mut self, _blocking: bool) -> Result<Option<CanFrame>, BusError> {
        // 回环没有等待的意义，阻塞与否表现一致
        Ok(self.state.lock().rx_queue.pop_front())
    }
}

impl LoopbackHandle {
    /// 向接收队列注入一帧
    pub fn push_frame(&self, frame: CanFrame) {
        self.state.lock().rx_queue.push_back(frame);
    }

    /// 已发送帧的快照
    pub fn sent_frames(&self) -> Vec<CanFrame> {
        self.state.lock().sent.clone()
    }

    /// 清空已发送帧记录
    pub fn clear_sent(&self) {
        self.state.lock().sent.clear();
    }

    /// 注册应答器，每次 `send` 时同步调用并把返回的帧排入接收队列
    pub fn set_responder(&self, responder: impl FnMut(&CanFrame) -> Vec<CanFrame> + Send + 'static) {
        self.state.lock().responder = Some(Box::new(responder));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_receive() {
        let (mut bus, handle) = LoopbackBus::new();
        handle.push_frame(CanFrame::new(0x123, &[1, 2, 3]));

        let frame = bus.receive(false).unwrap().unwrap();
        assert_eq!(frame.id, 0x123);
        assert_eq!(frame.data_slice(), &[1, 2, 3]);
        assert!(bus.receive(true).unwrap().is_none());
    }

    #[test]
    fn test_responder_answers_on_send() {
        let (mut bus, handle) = LoopbackBus::new();
        handle.set_responder(|frame| vec![CanFrame::new(frame.id + 1, &[0xAA])]);

        bus.send(CanFrame::new(0x010, &[0x05])).unwrap();

        let reply = bus.receive(false).unwrap().unwrap();
        assert_eq!(reply.id, 0x011);
        assert_eq!(handle.sent_frames().len(), 1);
    }
}
