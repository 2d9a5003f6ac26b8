//! 总线管理器
//!
//! 把一个裸传输包装成可多方共享的总线：内部互斥锁串行化访问，按发送者
//! 分流的缓冲保证每个调用者只消费发给自己的应答帧。

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{trace, warn};

use wam_protocol::CanFrame;

use crate::{BusError, BusTransport};

/// 等待应答的默认超时
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(100);

/// 排空传输层后再次轮询前的休眠间隔
const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// 每个发送者的缓冲上限，超出后丢弃最旧的帧
const BUFFER_DEPTH: usize = 10;

/// 按发送者分流的共享总线管理器
///
/// 所有收发都在内部互斥锁保护下进行。需要把"请求 + 应答"作为一个
/// 原子交换（比如唤醒握手、属性读取）时，用 [`BusManager::lock`] 持锁
/// 完成整个交换，中途不会被其他调用者的帧插队。
pub struct BusManager {
    inner: Mutex<BusInner>,
    receive_timeout: Duration,
}

struct BusInner {
    transport: Box<dyn BusTransport>,
    /// 总线 ID -> 尚未被消费的帧
    buffers: HashMap<u16, VecDeque<CanFrame>>,
}

impl BusManager {
    pub fn new(transport: Box<dyn BusTransport>) -> Self {
        Self {
            inner: Mutex::new(BusInner {
                transport,
                buffers: HashMap::new(),
            }),
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn receive_timeout(&self) -> Duration {
        self.receive_timeout
    }

    /// 独占总线，返回可连续收发的句柄
    pub fn lock(&self) -> BusGuard<'_> {
        BusGuard {
            inner: self.inner.lock(),
            receive_timeout: self.receive_timeout,
        }
    }

    /// 发送一帧
    pub fn send(&self, frame: CanFrame) -> Result<(), BusError> {
        self.lock().send(frame)
    }

    /// 阻塞等待来自 `expected` 地址的帧，超时返回 `BusError::Timeout`
    pub fn receive(&self, expected: u16) -> Result<CanFrame, BusError> {
        self.lock().receive(expected)
    }

    /// 非阻塞版本，无帧可取时返回 `Ok(None)`
    pub fn try_receive(&self, expected: u16) -> Result<Option<CanFrame>, BusError> {
        self.lock().try_receive(expected)
    }
}

/// 持有总线锁的收发句柄
///
/// 生命周期内其他线程无法访问总线，保证多步交换不被打断。
pub struct BusGuard<'a> {
    inner: MutexGuard<'a, BusInner>,
    receive_timeout: Duration,
}

impl BusGuard<'_> {
    pub fn send(&mut self, frame: CanFrame) -> Result<(), BusError> {
        trace!(id = format_args!("0x{:03X}", frame.id), len = frame.len, "bus send");
        self.inner.transport.send(frame)
    }

    pub fn receive(&mut self, expected: u16) -> Result<CanFrame, BusError> {
        let deadline = Instant::now() + self.receive_timeout;
        loop {
            if let Some(frame) = self.inner.poll(expected)? {
                return Ok(frame);
            }
            if Instant::now() >= deadline {
                warn!(
                    expected = format_args!("0x{:03X}", expected),
                    timeout_ms = self.receive_timeout.as_millis() as u64,
                    "bus receive timed out"
                );
                return Err(BusError::Timeout { expected });
            }
            spin_sleep::sleep(POLL_INTERVAL);
        }
    }

    pub fn try_receive(&mut self, expected: u16) -> Result<Option<CanFrame>, BusError> {
        self.inner.poll(expected)
    }
}

impl BusInner {
    /// 排空传输层并尝试取出一帧来自 `expected` 的帧
    fn poll(&mut self, expected: u16) -> Result<Option<CanFrame>, BusError> {
        if let Some(frame) = self.retrieve(expected) {
            return Ok(Some(frame));
        }
        self.update_buffers()?;
        Ok(self.retrieve(expected))
    }

    /// 把传输层里积压的所有帧搬进分流缓冲
    fn update_buffers(&mut self) -> Result<(), BusError> {
        while let Some(frame) = self.transport.receive(false)? {
            self.store(frame);
        }
        Ok(())
    }

    fn store(&mut self, frame: CanFrame) {
        let queue = self.buffers.entry(frame.id).or_default();
        if queue.len() >= BUFFER_DEPTH {
            warn!(
                id = format_args!("0x{:03X}", frame.id),
                "bus buffer full, dropping oldest frame"
            );
            queue.pop_front();
        }
        trace!(
            id = format_args!("0x{:03X}", frame.id),
            depth = queue.len() + 1,
            "bus frame buffered"
        );
        queue.push_back(frame);
    }

    fn retrieve(&mut self, expected: u16) -> Option<CanFrame> {
        self.buffers.get_mut(&expected)?.pop_front()
    }
}
