//! 磁盘实例与生命周期
//!
//! - [`FlashDisk`] - 一个 flash 磁盘：驱动 + 缓存 + 总线锁
//! - [`StorageManager`] - 外部存储管理器（分区、格式化、挂载、发布）
//! - [`DiskRegistry`] - 按名字初始化 / 销毁磁盘，失败时完整回滚

mod flash_disk;
mod manager;
mod registry;

pub(crate) use flash_disk::DiskInner;
pub use flash_disk::FlashDisk;
pub use manager::{IoManagerParams, PartitionParams, StorageManager};
pub use registry::DiskRegistry;

#[cfg(test)]
pub(crate) use flash_disk::tests::test_config;
