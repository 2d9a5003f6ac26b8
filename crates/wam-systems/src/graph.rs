//! 系统图：端口、连线、委托与按周期去重的更新引擎

use std::any::Any;
use std::marker::PhantomData;
use std::time::Duration;

use tracing::{debug, trace};

use crate::SystemError;

type BoxedValue = Box<dyn Any + Send>;

/// 图内系统的不透明句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ValueId(usize);

/// 类型化的输出端口句柄
///
/// 句柄只是索引，`Copy` 且可以随意传递；类型参数在 `connect` 时
/// 保证两端一致。
pub struct Output<T> {
    value: ValueId,
    owner: SystemId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Output<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Output<T> {}

/// 类型化的输入端口句柄
pub struct Input<T> {
    system: SystemId,
    index: usize,
    _marker: PhantomData<fn(T)>,
}

impl<T> Clone for Input<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Input<T> {}

// === System trait ===

/// 数据流图中的一个系统
///
/// `operate` 在所有输入来源更新完后被调用；默认只有全部输入都有值
/// 时才会执行，否则输出被置为未定义（见 [`System::inputs_valid`]）。
pub trait System: Send {
    /// 计算一个周期的输出
    fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError>;

    /// 输入是否满足执行条件；不满足时跳过 `operate` 并作废输出
    fn inputs_valid(&self, io: &SystemIo<'_>) -> bool {
        io.all_inputs_defined()
    }
}

// === 内部存储 ===

struct ValueSlot {
    owner: SystemId,
    data: Option<BoxedValue>,
    /// 委托目标：读取会沿链解析到末端的真值
    delegate: Option<ValueId>,
    /// 反向登记：哪些值委托到这里，系统移除时据此清理
    delegators: Vec<ValueId>,
}

struct SystemSlot {
    /// `operate` 期间被临时取出，防止重入
    system: Option<Box<dyn System>>,
    name: String,
    inputs: Vec<Option<ValueId>>,
    outputs: Vec<ValueId>,
    last_token: u64,
    managed: bool,
    alive: bool,
}

// === 图 ===

/// 系统、端口与连线的属主
///
/// 所有修改图结构和驱动求值的操作都在这里；执行管理器决定怎样
/// 共享与加锁。
pub struct SystemGraph {
    systems: Vec<SystemSlot>,
    values: Vec<ValueSlot>,
    token: u64,
    period: Duration,
}

impl Default for SystemGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemGraph {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            values: Vec::new(),
            token: 0,
            period: Duration::ZERO,
        }
    }

    /// 当前执行周期；未被周期性管理器驱动时为零
    pub fn execution_period(&self) -> Duration {
        self.period
    }

    pub fn set_execution_period(&mut self, period: Duration) {
        self.period = period;
    }

    /// 插入一个系统
    ///
    /// 构造闭包通过 [`PortBuilder`] 申领端口，返回 (系统实现, 对外
    /// 句柄)。句柄通常是一个含 `Input`/`Output` 的轻量结构。
    pub fn add_system<S, R>(
        &mut self,
        name: impl Into<String>,
        build: impl FnOnce(&mut PortBuilder<'_>) -> (S, R),
    ) -> R
    where
        S: System + 'static,
    {
        let id = SystemId(self.systems.len());
        self.systems.push(SystemSlot {
            system: None,
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            last_token: 0,
            managed: false,
            alive: true,
        });
        let mut builder = PortBuilder { graph: self, system: id };
        let (system, handle) = build(&mut builder);
        self.systems[id.0].system = Some(Box::new(system));
        debug!(system = %self.systems[id.0].name, id = id.0, "system added");
        handle
    }

    pub fn system_name(&self, id: SystemId) -> &str {
        &self.systems[id.0].name
    }

    fn check_alive(&self, id: SystemId) -> Result<(), SystemError> {
        if self.systems[id.0].alive {
            Ok(())
        } else {
            Err(SystemError::Removed {
                system: self.systems[id.0].name.clone(),
            })
        }
    }

    // === 连线 ===

    /// 连接输出到输入；输入已有连接时失败
    pub fn connect<T>(&mut self, output: Output<T>, input: Input<T>) -> Result<(), SystemError> {
        self.check_alive(input.system)?;
        self.check_alive(output.owner)?;
        if self.systems[input.system.0].inputs[input.index].is_some() {
            return Err(SystemError::AlreadyConnected {
                system: self.systems[input.system.0].name.clone(),
                index: input.index,
            });
        }
        self.systems[input.system.0].inputs[input.index] = Some(output.value);
        Ok(())
    }

    /// 换一个来源；输入尚未连接时失败
    pub fn reconnect<T>(&mut self, output: Output<T>, input: Input<T>) -> Result<(), SystemError> {
        self.check_alive(input.system)?;
        self.check_alive(output.owner)?;
        if self.systems[input.system.0].inputs[input.index].is_none() {
            return Err(SystemError::NotConnected {
                system: self.systems[input.system.0].name.clone(),
                index: input.index,
            });
        }
        self.systems[input.system.0].inputs[input.index] = Some(output.value);
        Ok(())
    }

    /// 无条件连接，连没连过都成功
    pub fn force_connect<T>(
        &mut self,
        output: Output<T>,
        input: Input<T>,
    ) -> Result<(), SystemError> {
        self.check_alive(input.system)?;
        self.check_alive(output.owner)?;
        self.systems[input.system.0].inputs[input.index] = Some(output.value);
        Ok(())
    }

    /// 断开输入；本来就没连时失败
    pub fn disconnect<T>(&mut self, input: Input<T>) -> Result<(), SystemError> {
        self.check_alive(input.system)?;
        if self.systems[input.system.0].inputs[input.index].take().is_none() {
            return Err(SystemError::NotConnected {
                system: self.systems[input.system.0].name.clone(),
                index: input.index,
            });
        }
        Ok(())
    }

    // === 委托 ===

    /// 把一个输出委托给另一个输出，读取沿链取末端真值
    ///
    /// 已有委托时改指新目标。构成环时失败。
    pub fn delegate_to<T>(
        &mut self,
        output: Output<T>,
        target: Output<T>,
    ) -> Result<(), SystemError> {
        self.check_alive(output.owner)?;
        self.check_alive(target.owner)?;
        let mut cursor = target.value;
        loop {
            if cursor == output.value {
                return Err(SystemError::DelegationCycle {
                    system: self.systems[output.owner.0].name.clone(),
                });
            }
            match self.values[cursor.0].delegate {
                Some(next) => cursor = next,
                None => break,
            }
        }
        self.undelegate_value(output.value);
        self.values[output.value.0].delegate = Some(target.value);
        self.values[target.value.0].delegators.push(output.value);
        Ok(())
    }

    /// 撤销委托；没有委托时静默
    pub fn undelegate<T>(&mut self, output: Output<T>) {
        self.undelegate_value(output.value);
    }

    fn undelegate_value(&mut self, vid: ValueId) {
        if let Some(target) = self.values[vid.0].delegate.take() {
            self.values[target.0].delegators.retain(|&d| d != vid);
        }
    }

    fn resolve(&self, mut vid: ValueId) -> ValueId {
        while let Some(next) = self.values[vid.0].delegate {
            vid = next;
        }
        vid
    }

    // === 系统移除 ===

    /// 移除系统：先断开它的全部进出连线，清掉指向它的委托，然后作废
    pub fn remove_system(&mut self, id: SystemId) -> Result<(), SystemError> {
        self.check_alive(id)?;
        let outputs = self.systems[id.0].outputs.clone();

        // 下游的输入断开
        for slot in &mut self.systems {
            for input in &mut slot.inputs {
                if let Some(vid) = input
                    && outputs.contains(vid)
                {
                    *input = None;
                }
            }
        }

        // 委托登记清理：委托到这里的输出退回自持，未定义
        for &vid in &outputs {
            let delegators = std::mem::take(&mut self.values[vid.0].delegators);
            for d in delegators {
                self.values[d.0].delegate = None;
            }
            self.undelegate_value(vid);
            self.values[vid.0].data = None;
        }

        let slot = &mut self.systems[id.0];
        slot.inputs.iter_mut().for_each(|i| *i = None);
        slot.system = None;
        slot.managed = false;
        slot.alive = false;
        debug!(system = %slot.name, "system removed");
        Ok(())
    }

    // === 管理登记 ===

    /// 把系统登记为每周期的执行根（典型的是写执行器的汇点）
    ///
    /// 重复登记是幂等的。
    pub fn start_managing(&mut self, id: SystemId) -> Result<(), SystemError> {
        self.check_alive(id)?;
        self.systems[id.0].managed = true;
        Ok(())
    }

    /// 取消登记；之后只有被下游拉取时才会执行
    pub fn stop_managing(&mut self, id: SystemId) -> Result<(), SystemError> {
        self.check_alive(id)?;
        self.systems[id.0].managed = false;
        Ok(())
    }

    // === 求值 ===

    /// 跑一个执行周期：更新所有登记为执行根的系统及其上游
    pub fn run_execution_cycle(&mut self) -> Result<(), SystemError> {
        self.token += 1;
        let token = self.token;
        trace!(token, "execution cycle");
        let roots: Vec<usize> = self
            .systems
            .iter()
            .enumerate()
            .filter(|(_, s)| s.alive && s.managed)
            .map(|(i, _)| i)
            .collect();
        for i in roots {
            self.update_system(SystemId(i), token)?;
        }
        Ok(())
    }

    /// 单独把一个输出拉到最新并克隆出值（新开一个周期）
    ///
    /// 输出未定义时返回 `Ok(None)`。
    pub fn pull<T: Clone + 'static>(
        &mut self,
        output: Output<T>,
    ) -> Result<Option<T>, SystemError> {
        self.token += 1;
        let owner = self.values[self.resolve(output.value).0].owner;
        self.update_system(owner, self.token)?;
        Ok(self.peek(output).cloned())
    }

    /// 不触发求值，直接看输出的当前值（沿委托链解析）
    pub fn peek<T: 'static>(&self, output: Output<T>) -> Option<&T> {
        let vid = self.resolve(output.value);
        self.values[vid.0]
            .data
            .as_deref()
            .and_then(|d| d.downcast_ref::<T>())
    }

    fn update_system(&mut self, id: SystemId, token: u64) -> Result<(), SystemError> {
        let slot = &mut self.systems[id.0];
        if !slot.alive || slot.last_token == token {
            return Ok(());
        }
        // 先打标记，菱形扇出和意外的环都只会经过一次
        slot.last_token = token;

        // 递归先更新所有输入来源（以及它们的委托末端）
        let sources: Vec<ValueId> = self.systems[id.0].inputs.iter().flatten().copied().collect();
        for src in sources {
            let owner = self.values[self.resolve(src).0].owner;
            self.update_system(owner, token)?;
        }

        let Some(mut system) = self.systems[id.0].system.take() else {
            return Ok(());
        };
        let result = {
            let mut io = SystemIo { graph: self, system: id };
            if system.inputs_valid(&io) {
                system.operate(&mut io)
            } else {
                trace!(system = %io.graph.systems[id.0].name, "inputs undefined, outputs invalidated");
                io.invalidate_outputs();
                Ok(())
            }
        };
        self.systems[id.0].system = Some(system);
        result
    }
}

// === 端口申领 ===

/// 系统插入时的端口申领器
pub struct PortBuilder<'a> {
    graph: &'a mut SystemGraph,
    system: SystemId,
}

impl PortBuilder<'_> {
    pub fn input<T>(&mut self) -> Input<T> {
        let slot = &mut self.graph.systems[self.system.0];
        let index = slot.inputs.len();
        slot.inputs.push(None);
        Input {
            system: self.system,
            index,
            _marker: PhantomData,
        }
    }

    pub fn output<T>(&mut self) -> Output<T> {
        let vid = ValueId(self.graph.values.len());
        self.graph.values.push(ValueSlot {
            owner: self.system,
            data: None,
            delegate: None,
            delegators: Vec::new(),
        });
        self.graph.systems[self.system.0].outputs.push(vid);
        Output {
            value: vid,
            owner: self.system,
            _marker: PhantomData,
        }
    }

    pub fn system_id(&self) -> SystemId {
        self.system
    }
}

// === operate 期间的端口访问 ===

/// `operate` 期间系统读输入、写输出的视图
pub struct SystemIo<'a> {
    graph: &'a mut SystemGraph,
    system: SystemId,
}

impl SystemIo<'_> {
    /// 读输入的当前值；未连接或来源未定义时为 `None`
    pub fn input<T: 'static>(&self, input: Input<T>) -> Option<&T> {
        let vid = (*self.graph.systems[input.system.0].inputs.get(input.index)?)?;
        let vid = self.graph.resolve(vid);
        self.graph.values[vid.0]
            .data
            .as_deref()
            .and_then(|d| d.downcast_ref::<T>())
    }

    /// 输入是否有定义的值
    pub fn input_defined<T: 'static>(&self, input: Input<T>) -> bool {
        self.input(input).is_some()
    }

    /// 本系统的全部输入是否都连接且有值
    pub fn all_inputs_defined(&self) -> bool {
        self.graph.systems[self.system.0]
            .inputs
            .iter()
            .all(|slot| match slot {
                Some(vid) => {
                    let vid = self.graph.resolve(*vid);
                    self.graph.values[vid.0].data.is_some()
                },
                None => false,
            })
    }

    /// 写输出
    pub fn set_output<T: Send + 'static>(&mut self, output: Output<T>, value: T) {
        let slot = &mut self.graph.values[output.value.0];
        // 同类型时复用已有分配
        match slot.data.as_deref_mut().and_then(|d| d.downcast_mut::<T>()) {
            Some(old) => *old = value,
            None => slot.data = Some(Box::new(value)),
        }
    }

    /// 把单个输出置为未定义
    pub fn clear_output<T>(&mut self, output: Output<T>) {
        self.graph.values[output.value.0].data = None;
    }

    /// 把本系统的全部输出置为未定义
    pub fn invalidate_outputs(&mut self) {
        let SystemGraph { systems, values, .. } = &mut *self.graph;
        for &vid in &systems[self.system.0].outputs {
            values[vid.0].data = None;
        }
    }

    /// 当前执行周期（见 [`SystemGraph::execution_period`]）
    pub fn execution_period(&self) -> Duration {
        self.graph.period
    }

    /// 本系统的名字（错误信息用）
    pub fn name(&self) -> &str {
        &self.graph.systems[self.system.0].name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// 记录 operate 次数的直通系统
    struct Probe {
        input: Input<f64>,
        output: Output<f64>,
        calls: Arc<AtomicU32>,
    }

    impl System for Probe {
        fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let value = io.input(self.input).copied().unwrap_or(0.0);
            io.set_output(self.output, value);
            Ok(())
        }
    }

    struct ProbeHandle {
        input: Input<f64>,
        output: Output<f64>,
        id: SystemId,
        calls: Arc<AtomicU32>,
    }

    fn probe(graph: &mut SystemGraph, name: &str) -> ProbeHandle {
        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        graph.add_system(name, move |b| {
            let input = b.input::<f64>();
            let output = b.output::<f64>();
            let id = b.system_id();
            (
                Probe { input, output, calls: calls2.clone() },
                ProbeHandle { input, output, id, calls: calls2 },
            )
        })
    }

    fn constant(graph: &mut SystemGraph, value: f64) -> Output<f64> {
        struct Core {
            output: Output<f64>,
            value: f64,
        }
        impl System for Core {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                io.set_output(self.output, self.value);
                Ok(())
            }
        }
        graph.add_system("Constant", |b| {
            let output = b.output::<f64>();
            (Core { output, value }, output)
        })
    }

    #[test]
    fn test_connect_and_pull() {
        let mut graph = SystemGraph::new();
        let src = constant(&mut graph, 4.0);
        let p = probe(&mut graph, "probe");

        graph.connect(src, p.input).unwrap();
        assert_eq!(graph.pull(p.output).unwrap(), Some(4.0));
    }

    #[test]
    fn test_connect_twice_fails_loudly() {
        let mut graph = SystemGraph::new();
        let a = constant(&mut graph, 1.0);
        let b = constant(&mut graph, 2.0);
        let p = probe(&mut graph, "probe");

        graph.connect(a, p.input).unwrap();
        match graph.connect(b, p.input) {
            Err(SystemError::AlreadyConnected { system, index }) => {
                assert_eq!(system, "probe");
                assert_eq!(index, 0);
            },
            other => panic!("unexpected result: {other:?}"),
        }

        // reconnect 才能换源
        graph.reconnect(b, p.input).unwrap();
        assert_eq!(graph.pull(p.output).unwrap(), Some(2.0));
    }

    #[test]
    fn test_reconnect_requires_existing_connection() {
        let mut graph = SystemGraph::new();
        let a = constant(&mut graph, 1.0);
        let p = probe(&mut graph, "probe");

        assert!(matches!(
            graph.reconnect(a, p.input),
            Err(SystemError::NotConnected { .. })
        ));
        graph.force_connect(a, p.input).unwrap();
        assert_eq!(graph.pull(p.output).unwrap(), Some(1.0));
    }

    #[test]
    fn test_disconnect() {
        let mut graph = SystemGraph::new();
        let a = constant(&mut graph, 1.0);
        let p = probe(&mut graph, "probe");

        graph.connect(a, p.input).unwrap();
        graph.disconnect(p.input).unwrap();
        assert!(matches!(
            graph.disconnect(p.input),
            Err(SystemError::NotConnected { .. })
        ));

        // 输入断开后 inputs_valid 不满足，输出未定义
        assert_eq!(graph.pull(p.output).unwrap(), None);
    }

    struct SumHandle {
        a: Input<f64>,
        b: Input<f64>,
        output: Output<f64>,
        id: SystemId,
    }

    fn two_input_sum(graph: &mut SystemGraph, name: &str) -> SumHandle {
        struct Core {
            a: Input<f64>,
            b: Input<f64>,
            output: Output<f64>,
        }
        impl System for Core {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                let sum = io.input(self.a).copied().unwrap_or(0.0)
                    + io.input(self.b).copied().unwrap_or(0.0);
                io.set_output(self.output, sum);
                Ok(())
            }
        }
        graph.add_system(name, |builder| {
            let a = builder.input::<f64>();
            let b = builder.input::<f64>();
            let output = builder.output::<f64>();
            let id = builder.system_id();
            (Core { a, b, output }, SumHandle { a, b, output, id })
        })
    }

    #[test]
    fn test_diamond_evaluates_each_system_once() {
        // seed -> src -> left  -> sink
        //             \-> right /
        let mut graph = SystemGraph::new();
        let seed = constant(&mut graph, 1.0);
        let src = probe(&mut graph, "src");
        let left = probe(&mut graph, "left");
        let right = probe(&mut graph, "right");
        let sink = two_input_sum(&mut graph, "sink");

        graph.connect(seed, src.input).unwrap();
        graph.connect(src.output, left.input).unwrap();
        graph.connect(src.output, right.input).unwrap();
        graph.connect(left.output, sink.a).unwrap();
        graph.connect(right.output, sink.b).unwrap();

        graph.start_managing(sink.id).unwrap();
        graph.run_execution_cycle().unwrap();

        // 两条路径都经过 src，但 src 只执行一次
        assert_eq!(src.calls.load(Ordering::Relaxed), 1);
        assert_eq!(left.calls.load(Ordering::Relaxed), 1);
        assert_eq!(right.calls.load(Ordering::Relaxed), 1);
        assert_eq!(graph.peek(sink.output), Some(&2.0));

        graph.run_execution_cycle().unwrap();
        assert_eq!(src.calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_unmanaged_systems_do_not_run() {
        let mut graph = SystemGraph::new();
        let seed = constant(&mut graph, 1.0);
        let p = probe(&mut graph, "probe");
        graph.connect(seed, p.input).unwrap();

        graph.run_execution_cycle().unwrap();
        assert_eq!(p.calls.load(Ordering::Relaxed), 0);

        graph.start_managing(p.id).unwrap();
        graph.run_execution_cycle().unwrap();
        assert_eq!(p.calls.load(Ordering::Relaxed), 1);

        graph.stop_managing(p.id).unwrap();
        graph.run_execution_cycle().unwrap();
        assert_eq!(p.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_delegation_resolves_to_terminal_value() {
        let mut graph = SystemGraph::new();
        let real = constant(&mut graph, 7.0);
        let facade = probe(&mut graph, "facade");
        let reader = probe(&mut graph, "reader");

        // facade 的输出委托给真正的来源
        graph.delegate_to(facade.output, real).unwrap();
        graph.connect(facade.output, reader.input).unwrap();

        assert_eq!(graph.pull(reader.output).unwrap(), Some(7.0));
        // facade 自己从未执行（值来自委托末端）
        assert_eq!(facade.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_delegation_cycle_is_rejected() {
        let mut graph = SystemGraph::new();
        let a = probe(&mut graph, "a");
        let b = probe(&mut graph, "b");

        graph.delegate_to(a.output, b.output).unwrap();
        match graph.delegate_to(b.output, a.output) {
            Err(SystemError::DelegationCycle { system }) => assert_eq!(system, "b"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_undelegate_restores_own_value() {
        let mut graph = SystemGraph::new();
        let real = constant(&mut graph, 7.0);
        let facade = probe(&mut graph, "facade");
        let seed = constant(&mut graph, 3.0);
        graph.connect(seed, facade.input).unwrap();

        graph.delegate_to(facade.output, real).unwrap();
        assert_eq!(graph.pull(facade.output).unwrap(), Some(7.0));

        graph.undelegate(facade.output);
        assert_eq!(graph.pull(facade.output).unwrap(), Some(3.0));
    }

    #[test]
    fn test_remove_system_severs_connections_and_delegations() {
        let mut graph = SystemGraph::new();
        let src = constant(&mut graph, 5.0);
        let middle = probe(&mut graph, "middle");
        let facade = probe(&mut graph, "facade");
        let reader = probe(&mut graph, "reader");

        graph.connect(src, middle.input).unwrap();
        graph.connect(middle.output, reader.input).unwrap();
        graph.delegate_to(facade.output, middle.output).unwrap();

        graph.remove_system(middle.id).unwrap();

        // 下游输入被断开，读到未定义
        assert_eq!(graph.pull(reader.output).unwrap(), None);
        // 委托被清掉，facade 退回自持（未定义，因为它自己没跑过）
        assert_eq!(graph.peek(facade.output), None);
        // 句柄失效
        assert!(matches!(
            graph.start_managing(middle.id),
            Err(SystemError::Removed { .. })
        ));
        assert!(matches!(
            graph.connect(src, middle.input),
            Err(SystemError::Removed { .. })
        ));
    }

    #[test]
    fn test_undefined_input_invalidates_outputs() {
        let mut graph = SystemGraph::new();
        let seed = constant(&mut graph, 1.0);
        let upstream = probe(&mut graph, "upstream");
        let downstream = probe(&mut graph, "downstream");

        graph.connect(seed, upstream.input).unwrap();
        graph.connect(upstream.output, downstream.input).unwrap();
        assert_eq!(graph.pull(downstream.output).unwrap(), Some(1.0));

        // 断开上游输入使其输出作废，作废沿链传播
        graph.disconnect(upstream.input).unwrap();
        assert_eq!(graph.pull(downstream.output).unwrap(), None);
    }

    #[test]
    fn test_operate_error_propagates() {
        struct Faulty;
        impl System for Faulty {
            fn operate(&mut self, io: &mut SystemIo<'_>) -> Result<(), SystemError> {
                Err(SystemError::fault(io.name(), "sensor offline"))
            }
        }

        let mut graph = SystemGraph::new();
        let id = graph.add_system("faulty", |b| {
            let _output = b.output::<f64>();
            (Faulty, b.system_id())
        });
        graph.start_managing(id).unwrap();

        match graph.run_execution_cycle() {
            Err(SystemError::Fault { system, message }) => {
                assert_eq!(system, "faulty");
                assert_eq!(message, "sensor offline");
            },
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_typed_handles_are_copy() {
        let mut graph = SystemGraph::new();
        let p = probe(&mut graph, "probe");
        let copy_in = p.input;
        let copy_out = p.output;
        let seed = constant(&mut graph, 9.0);
        graph.connect(seed, copy_in).unwrap();
        assert_eq!(graph.pull(copy_out).unwrap(), Some(9.0));
    }
}
