//! 存储管理器协作接口
//!
//! 分区、格式化、挂载和命名空间发布都由外部的文件系统层完成，
//! 这里只描述磁盘生命周期需要它提供的操作。每个方法都以磁盘名标识对象。

use alloc::sync::Arc;

use crate::block::BlockIo;
use crate::error::Result;
use crate::types::DiskConfig;

/// IO manager 创建参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoManagerParams {
    /// IO manager 自身缓存大小（字节）
    pub cache_size: u32,
    /// 逻辑扇区大小
    pub sector_size: u32,
    /// 逻辑扇区总数
    pub sector_count: u32,
}

impl IoManagerParams {
    /// 从磁盘配置构造
    pub fn from_config(config: &DiskConfig) -> Self {
        Self {
            cache_size: config.iomanager_cache_size,
            sector_size: config.logical_sector_size,
            sector_count: config.logical_sector_count(),
        }
    }
}

/// 分区参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionParams {
    /// 分区前的隐藏扇区数
    pub hidden_sectors: u32,
    /// 主分区数量
    pub primary_partitions: u8,
    /// 磁盘逻辑扇区总数
    pub sector_count: u32,
}

impl PartitionParams {
    /// 从磁盘配置构造
    pub fn from_config(config: &DiskConfig) -> Self {
        Self {
            hidden_sectors: config.hidden_sectors,
            primary_partitions: config.primary_partitions,
            sector_count: config.logical_sector_count(),
        }
    }
}

/// 外部存储管理器
///
/// 失败时返回的错误可以携带管理器自己的错误码
/// （[`Error::with_code`](crate::Error::with_code)），生命周期层会原样保留。
pub trait StorageManager {
    /// 创建 IO manager，注册块 I/O 入口
    fn create_io_manager(
        &mut self,
        name: &str,
        params: &IoManagerParams,
        device: Arc<dyn BlockIo + Send + Sync>,
    ) -> Result<()>;

    /// 删除 IO manager，释放它持有的块 I/O 入口
    fn delete_io_manager(&mut self, name: &str) -> Result<()>;

    /// 写分区表
    fn partition(&mut self, name: &str, params: &PartitionParams) -> Result<()>;

    /// 格式化分区
    fn format(&mut self, name: &str, partition: u8) -> Result<()>;

    /// 挂载分区
    fn mount(&mut self, name: &str, partition: u8) -> Result<()>;

    /// 卸载
    fn unmount(&mut self, name: &str) -> Result<()>;

    /// 在命名空间中发布（挂载路径可见）
    fn publish(&mut self, name: &str) -> Result<()>;

    /// 从命名空间中移除
    fn withdraw(&mut self, name: &str) -> Result<()>;
}
