//! flash 协议层
//!
//! - [`Transport`] - 片选与字节收发，由外部提供
//! - [`command`] - S25FL1xxK 命令集
//! - [`Status1`] / [`Status2`] - 状态寄存器位
//! - [`FlashDriver`] - 写使能、命令、busy 轮询的顺序约束
//! - [`FlashSectors`] - 缓存层使用的扇区级接口

pub mod command;
mod driver;
mod status;
mod transport;

#[cfg(test)]
pub(crate) mod sim;

pub use driver::{FlashCounters, FlashDriver, FlashSectors, Mutation, ProtocolState};
pub use status::{Status1, Status2};
pub use transport::Transport;
