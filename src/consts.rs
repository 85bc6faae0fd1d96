//! 常量定义
//!
//! 这个模块包含了 flash 磁盘的所有常量定义，包括：
//! - 默认器件几何参数（S25FL164K）
//! - 缓存默认配置
//! - 分区与 IO manager 参数
//! - 错误码

//=============================================================================
// 器件几何参数
//=============================================================================

/// flash 扇区大小（最小擦除单位，4 KiB）
pub const FLASH_SECTOR_SIZE: u32 = 4096;

/// flash 页大小（单次 page program 的最大长度）
pub const FLASH_PAGE_SIZE: u32 = 256;

/// flash 扇区数量（8 MiB）
pub const FLASH_SECTOR_COUNT: u32 = 2048;

/// 3 字节地址可寻址的最大容量（16 MiB）
pub const FLASH_ADDRESS_LIMIT: u64 = 1 << 24;

/// 擦除后的字节值
pub const FLASH_ERASED_BYTE: u8 = 0xFF;

/// 文件系统逻辑扇区大小
pub const LOGICAL_SECTOR_SIZE: u32 = 512;

//=============================================================================
// 缓存
//=============================================================================

/// 缓存行数量
pub const CACHE_LINE_COUNT: usize = 2;

/// 为元数据（FAT 表）保留的缓存行数量
pub const CACHE_RESERVED_LINES: usize = 1;

/// 缓存行大小（一个 flash 扇区）
pub const CACHE_LINE_SIZE: u32 = FLASH_SECTOR_SIZE;

/// 元数据区域大小（flash 扇区数），落在此区域的行使用保留缓存行
///
/// 默认为 0：不区分元数据，所有驱逐都在非保留行中按 LRU 进行。
/// 单分区 FAT16 的隐藏扇区、引导扇区和两份 FAT 表都位于前 64 KiB 内，
/// 需要时可设为 16。
pub const METADATA_REGION_SECTORS: u32 = 0;

/// 脏行比例告警阈值（百分比）
pub const DIRTY_WARN_PERCENT: usize = 80;

//=============================================================================
// busy 轮询
//=============================================================================

/// 单次 busy 轮询的最大状态读取次数
///
/// 配合默认退避时间，总上限约 1 秒，高于 4 KiB 扇区擦除的最大时间。
pub const DEFAULT_MAX_POLLS: u32 = 100_000;

/// 两次状态读取之间的退避时间（微秒）
pub const DEFAULT_POLL_BACKOFF_US: u32 = 10;

//=============================================================================
// 磁盘与 IO manager
//=============================================================================

/// 磁盘签名，读写入口用它校验句柄
pub const DISK_SIGNATURE: u32 = 0xABBA_1234;

/// IO manager 自身缓存大小（字节）
pub const IOMANAGER_CACHE_SIZE: u32 = 20 * LOGICAL_SECTOR_SIZE;

/// 分区号
pub const PARTITION_NUMBER: u8 = 0;

/// 隐藏扇区数
pub const HIDDEN_SECTOR_COUNT: u32 = 8;

/// 主分区数量
pub const PRIMARY_PARTITIONS: u8 = 1;

//=============================================================================
// 错误码（与 POSIX errno 兼容）
//=============================================================================

/// 成功
pub const EOK: i32 = 0;

/// 没有此文件或目录
pub const ENOENT: i32 = 2;

/// I/O 错误
pub const EIO: i32 = 5;

/// 内存不足
pub const ENOMEM: i32 = 12;

/// 设备忙
pub const EBUSY: i32 = 16;

/// 已存在
pub const EEXIST: i32 = 17;

/// 没有此设备
pub const ENODEV: i32 = 19;

/// 无效参数
pub const EINVAL: i32 = 22;

/// 结果超出范围
pub const ERANGE: i32 = 34;

/// 超时
pub const ETIMEDOUT: i32 = 110;
