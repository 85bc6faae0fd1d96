//! 写回缓存模块
//!
//! 把小于 flash 扇区的写入和对同一扇区的重复写入吸收在内存缓存行中，
//! 直到驱逐或显式同步才写回 flash。flash 的擦除-编程代价很高，
//! 合并写入可以同时减少延迟和磨损。
//!
//! # 主要组件
//!
//! - [`CacheLine`] / [`LineState`] - 缓存行及其显式状态机
//! - [`CacheDirectory`] - 固定容量的行表，负责查找、分配和驱逐
//! - [`CacheController`] - 读写路径，按 tag 拆分请求
//! - [`CacheStats`] - 命中 / 未命中统计
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use spiflash_core::cache::CacheController;
//!
//! let mut cache = CacheController::new(&config)?;
//!
//! // 只修改缓存行，不访问 flash
//! cache.write(&mut driver, &sector, 10, 1)?;
//!
//! // 同步到某个时间点之前的脏行
//! let stamp = cache.current_stamp();
//! cache.sync(&mut driver, stamp)?;
//! ```
//!
//! # 内存分配要求
//!
//! 缓存行在构造时一次性分配，运行期不再分配内存。
//! 本模块依赖 `alloc` crate，需要用户提供全局分配器。

mod controller;
mod directory;
mod line;
mod stats;

pub use controller::CacheController;
pub use directory::CacheDirectory;
pub use line::{CacheLine, LineState};
pub use stats::CacheStats;
