//! 公共类型与磁盘配置
//!
//! 配置在构造磁盘时固定，运行期不可修改。

use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};

/// 缓存行的最近使用时间戳（单调递增计数器）
pub type CacheStamp = u64;

/// 缓存行下标
pub type LineIndex = usize;

/// busy 轮询策略
///
/// 每次 program/erase 之后最多读取 `max_polls` 次状态寄存器，
/// 两次读取之间调用 [`Transport::delay_us`](crate::flash::Transport::delay_us) 退避。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// 最大状态读取次数
    pub max_polls: u32,
    /// 退避时间（微秒）
    pub backoff_us: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_polls: DEFAULT_MAX_POLLS,
            backoff_us: DEFAULT_POLL_BACKOFF_US,
        }
    }
}

/// 磁盘配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskConfig {
    /// flash 扇区大小（擦除粒度）
    pub flash_sector_size: u32,
    /// flash 页大小（编程粒度）
    pub flash_page_size: u32,
    /// flash 扇区数量
    pub flash_sector_count: u32,
    /// 文件系统逻辑扇区大小
    pub logical_sector_size: u32,
    /// 缓存行数量，0 表示写穿模式（无缓存）
    pub cache_lines: usize,
    /// 保留给元数据的缓存行数量（缓存目录的前缀）
    pub reserved_lines: usize,
    /// 缓存行大小，必须是 flash 扇区大小的整数倍
    pub line_size: u32,
    /// 元数据区域（从地址 0 开始的 flash 扇区数），0 表示关闭
    pub metadata_sectors: u32,
    /// busy 轮询策略
    pub poll: PollPolicy,
    /// 编程后回读校验
    pub verify_writes: bool,
    /// 初始化时置位 SR2.QE
    pub quad_enable: bool,
    /// IO manager 自身缓存大小（字节）
    pub iomanager_cache_size: u32,
    /// 分区隐藏扇区数
    pub hidden_sectors: u32,
    /// 挂载的分区号
    pub partition_number: u8,
    /// 主分区数量
    pub primary_partitions: u8,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            flash_sector_size: FLASH_SECTOR_SIZE,
            flash_page_size: FLASH_PAGE_SIZE,
            flash_sector_count: FLASH_SECTOR_COUNT,
            logical_sector_size: LOGICAL_SECTOR_SIZE,
            cache_lines: CACHE_LINE_COUNT,
            reserved_lines: CACHE_RESERVED_LINES,
            line_size: CACHE_LINE_SIZE,
            metadata_sectors: METADATA_REGION_SECTORS,
            poll: PollPolicy::default(),
            verify_writes: false,
            quad_enable: true,
            iomanager_cache_size: IOMANAGER_CACHE_SIZE,
            hidden_sectors: HIDDEN_SECTOR_COUNT,
            partition_number: PARTITION_NUMBER,
            primary_partitions: PRIMARY_PARTITIONS,
        }
    }
}

impl DiskConfig {
    /// flash 总容量（字节）
    pub fn capacity(&self) -> u64 {
        self.flash_sector_count as u64 * self.flash_sector_size as u64
    }

    /// 逻辑扇区总数
    pub fn logical_sector_count(&self) -> u32 {
        (self.capacity() / self.logical_sector_size as u64) as u32
    }

    /// 是否启用写回缓存
    pub fn is_write_back(&self) -> bool {
        self.cache_lines > 0
    }

    /// 每个缓存行包含的 flash 扇区数
    pub fn sectors_per_line(&self) -> u32 {
        self.line_size / self.flash_sector_size
    }

    /// 元数据区域的结束地址（不含）
    pub fn metadata_limit(&self) -> u32 {
        self.metadata_sectors.saturating_mul(self.flash_sector_size)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.flash_sector_size == 0 || self.flash_page_size == 0 || self.logical_sector_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "sizes must be non-zero"));
        }
        if self.flash_sector_size % self.flash_page_size != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "flash sector size must be a multiple of page size",
            ));
        }
        if self.line_size < self.flash_sector_size || self.line_size % self.flash_sector_size != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "cache line size must be a multiple of flash sector size",
            ));
        }
        if self.flash_sector_size % self.logical_sector_size != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "flash sector size must be a multiple of logical sector size",
            ));
        }
        let capacity = self.capacity();
        if capacity == 0 || capacity > FLASH_ADDRESS_LIMIT {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "capacity must be non-zero and fit 24-bit addressing",
            ));
        }
        if capacity % self.line_size as u64 != 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "capacity must be a whole number of cache lines",
            ));
        }
        if self.cache_lines == 1 {
            return Err(Error::new(ErrorKind::InvalidInput, "cache needs at least 2 lines"));
        }
        if self.cache_lines > 0 && self.reserved_lines >= self.cache_lines {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "reserved lines must be fewer than cache lines",
            ));
        }
        if self.poll.max_polls == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "poll bound must be non-zero"));
        }
        Ok(())
    }
}
