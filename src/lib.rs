//! spiflash_core: write-back cached NOR flash block disk
//!
//! 把 SPI NOR flash 包装成固定扇区大小的块设备，供 FAT 等文件系统使用：
//! - **写回缓存**：小于 flash 扇区的写入和重复写入先在内存缓存行中合并
//! - **协议驱动**：强制"写使能 → 命令 → busy 轮询"的顺序和先擦后写
//! - **有界轮询**：busy 轮询有上限，超时单独报告
//! - **生命周期**：通过外部存储管理器挂载 / 卸载，失败时完整回滚
//!
//! # 示例
//!
//! ```rust,ignore
//! use spiflash_core::{DiskConfig, DiskRegistry, Transport, Result};
//!
//! // 实现 Transport trait（片选 + 字节收发）
//! struct Spi {
//!     // ...
//! }
//!
//! impl Transport for Spi {
//!     // 实现必要的方法
//!     // ...
//! }
//!
//! fn main() -> Result<()> {
//!     let mut registry = DiskRegistry::new(fat_manager, DiskConfig::default());
//!     let disk = registry.init_disk("/flash", false, Spi::new())?;
//!
//!     // 读写逻辑扇区
//!     let mut buf = vec![0u8; 512];
//!     disk.read_sectors(&mut buf, 0, 1)?;
//!
//!     // 同步较早修改的缓存行
//!     disk.sync_cache(disk.current_stamp())?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # 模块结构
//!
//! - [`error`] - 错误类型定义
//! - [`consts`] - 常量定义
//! - [`types`] - 公共类型与磁盘配置
//! - [`flash`] - 传输层接口与 flash 协议驱动
//! - [`cache`] - 写回缓存
//! - [`block`] - 块 I/O 适配层
//! - [`disk`] - 磁盘实例与生命周期

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

// ===== 核心模块 =====

/// 错误处理
pub mod error;

/// 常量定义
pub mod consts;

/// 公共类型与配置
pub mod types;

/// flash 协议层
pub mod flash;

/// 写回缓存
pub mod cache;

/// 块 I/O 适配层
pub mod block;

/// 磁盘实例与生命周期
pub mod disk;

/// CRC32 校验和计算
pub(crate) mod crc;

// ===== 公共导出 =====

// 错误处理
pub use error::{Error, ErrorKind, Result};

// 配置
pub use types::{CacheStamp, DiskConfig, LineIndex, PollPolicy};

// flash
pub use flash::{FlashCounters, FlashDriver, FlashSectors, Transport};

// 缓存
pub use cache::{CacheController, CacheDirectory, CacheLine, CacheStats, LineState};

// 块 I/O
pub use block::BlockIo;

// 磁盘
pub use disk::{DiskRegistry, FlashDisk, IoManagerParams, PartitionParams, StorageManager};
