//! WAM 支撑工具
//!
//! - [`statistics`]: 执行周期统计（最小/最大/均值/标准差/超限计数）
//! - [`log`]: 定长记录的二进制日志，实时回路里记录轨迹用
//! - [`config`]: TOML 配置的点分路径查询

pub mod config;
pub mod log;
pub mod statistics;

pub use config::{Config, ConfigError};
pub use log::{LogReader, LogWriter, Record};
pub use statistics::CycleStatistics;

use thiserror::Error;

/// 日志读写错误
#[derive(Error, Debug)]
pub enum ToolsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 读到了最后一条记录之后；永远不会吐出旧数据
    #[error("log exhausted: no records remain")]
    Exhausted,

    /// 文件末尾有半条记录，多半是写入端中途被杀
    #[error("truncated record at byte offset {offset}")]
    TruncatedRecord { offset: u64 },
}
