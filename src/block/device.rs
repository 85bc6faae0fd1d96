//! 块 I/O 契约

use crate::consts::EOK;
use crate::error::Result;

/// 存储管理器调用的块 I/O 接口
///
/// 扇区号和扇区数以文件系统逻辑扇区为单位，与 flash 物理扇区无关，
/// 大小换算由实现者负责。
///
/// 返回值约定：成功返回 0，失败返回负错误码，从不报告部分成功。
///
/// # 示例
///
/// ```rust,ignore
/// use spiflash_core::BlockIo;
///
/// let io: Arc<dyn BlockIo + Send + Sync> = disk.clone();
/// let mut sector = [0u8; 512];
/// if io.read_blocks(&mut sector, 0, 1) < 0 {
///     // 处理错误
/// }
/// ```
pub trait BlockIo {
    /// 逻辑扇区大小（通常 512）
    fn logical_sector_size(&self) -> u32;

    /// 逻辑扇区总数
    fn sector_count(&self) -> u32;

    /// 读取扇区
    ///
    /// # 参数
    ///
    /// * `dst` - 目标缓冲区（长度为 `sector_count * logical_sector_size`）
    /// * `start_sector` - 起始扇区号
    /// * `sector_count` - 扇区数量
    ///
    /// # 返回
    ///
    /// 成功返回 0，失败返回负错误码
    fn read_blocks(&self, dst: &mut [u8], start_sector: u32, sector_count: u32) -> i32;

    /// 写入扇区
    ///
    /// # 参数
    ///
    /// * `src` - 源缓冲区（长度为 `sector_count * logical_sector_size`）
    /// * `start_sector` - 起始扇区号
    /// * `sector_count` - 扇区数量
    ///
    /// # 返回
    ///
    /// 成功返回 0，失败返回负错误码
    fn write_blocks(&self, src: &[u8], start_sector: u32, sector_count: u32) -> i32;

    /// 刷新缓存
    fn flush(&self) -> i32 {
        EOK
    }
}

/// 把 `Result` 折叠成块 I/O 返回码
pub fn status_code<T>(result: Result<T>) -> i32 {
    match result {
        Ok(_) => EOK,
        Err(e) => e.errno(),
    }
}
