//! 拉取式数据流框架
//!
//! 控制回路被表达为一张系统图：每个系统声明若干输入和输出端口，
//! 输出连到下游的输入。求值是惰性拉取的：每个执行周期从被管理的
//! 系统出发，递归先更新上游来源，同一周期内每个系统至多运行一次
//! （菱形扇出不会重复求值）。
//!
//! ## 执行管理
//!
//! - [`ManualExecutionManager`]：直接持有图，单步执行，测试用
//! - [`RealTimeExecutionManager`]：共享 `Arc<Mutex<SystemGraph>>`，
//!   独立线程按固定周期执行，整个周期持图锁
//!
//! ## 端口类型安全
//!
//! [`Input`] / [`Output`] 是带类型参数的 `Copy` 句柄，连线时编译期
//! 校验两端类型一致；值在图里以 `Box<dyn Any + Send>` 存放。

use thiserror::Error;

pub mod builtins;
mod graph;
mod manager;

pub use builtins::{Constant, Gain, Ramp, Summer};
pub use graph::{Input, Output, PortBuilder, System, SystemGraph, SystemId, SystemIo};
pub use manager::{ErrorCallback, ManualExecutionManager, RealTimeExecutionManager};

// === 错误类型 ===

/// 数据流框架错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SystemError {
    /// 输入端口已有连接；换源要用 `reconnect` 显式表达意图
    #[error("input {index} of system '{system}' is already connected")]
    AlreadyConnected { system: String, index: usize },

    /// 输入端口没有连接
    #[error("input {index} of system '{system}' is not connected")]
    NotConnected { system: String, index: usize },

    /// 委托会构成环
    #[error("delegating an output of system '{system}' would form a delegation cycle")]
    DelegationCycle { system: String },

    /// 系统已从图里移除，句柄失效
    #[error("system '{system}' has been removed from the graph")]
    Removed { system: String },

    /// 求和器极性描述非法
    #[error("invalid summer polarity '{polarity}' (expected only '+' and '-')")]
    InvalidPolarity { polarity: String },

    /// 执行周期必须大于零
    #[error("execution period must be greater than zero")]
    ZeroPeriod,

    /// 执行管理器已经在运行
    #[error("execution manager is already running")]
    AlreadyRunning,

    /// 执行管理器处于错误状态，须先 `clear_error()`
    #[error("execution manager is in an error state (call clear_error() first)")]
    ErrorState,

    /// 系统在 `operate` 中报告的运行期故障
    #[error("system '{system}' fault: {message}")]
    Fault { system: String, message: String },
}

impl SystemError {
    /// 便捷构造系统运行期故障
    pub fn fault(system: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Fault {
            system: system.into(),
            message: message.to_string(),
        }
    }
}
