//! 块 I/O 适配层
//!
//! 存储管理器的读写入口：校验句柄签名和扇区范围，然后交给缓存控制器。
//! 越界请求在加锁之前就被拒绝，不会改变缓存或 flash 的任何状态。

use super::device::{status_code, BlockIo};
use crate::disk::{DiskInner, FlashDisk};
use crate::error::{Error, ErrorKind, Result};
use crate::flash::Transport;

impl<T: Transport> FlashDisk<T> {
    fn check_range(&self, start_sector: u32, sector_count: u32) -> Result<()> {
        let end = start_sector
            .checked_add(sector_count)
            .ok_or(Error::new(ErrorKind::OutOfBounds, "sector range overflows"))?;
        if end > self.sector_count() {
            log::warn!(
                "[DISK] {}: request {}+{} beyond {} sectors",
                self.name(),
                start_sector,
                sector_count,
                self.sector_count()
            );
            return Err(Error::new(ErrorKind::OutOfBounds, "sector range beyond disk"));
        }
        Ok(())
    }

    /// 读取逻辑扇区
    ///
    /// # 参数
    ///
    /// * `dst` - 目标缓冲区，长度必须为 `sector_count * logical_sector_size`
    /// * `start_sector` - 起始扇区号
    /// * `sector_count` - 扇区数量
    ///
    /// # 错误
    ///
    /// - `InvalidState` - 句柄已注销
    /// - `OutOfBounds` - 超出磁盘范围
    /// - `InvalidInput` - 缓冲区长度不匹配
    /// - `Busy` - 整片擦除进行中
    /// - `Io` / `Timeout` - flash 访问失败
    pub fn read_sectors(&self, dst: &mut [u8], start_sector: u32, sector_count: u32) -> Result<()> {
        self.check_signature()?;
        self.check_range(start_sector, sector_count)?;
        let mut inner = self.lock_idle()?;
        let DiskInner { driver, cache } = &mut *inner;
        cache.read(driver, dst, start_sector, sector_count).map_err(|e| {
            log::error!("[DISK] {}: read {}+{} failed: {}", self.name(), start_sector, sector_count, e);
            e
        })
    }

    /// 写入逻辑扇区
    ///
    /// 写回模式下数据只进入缓存，调用 [`FlashDisk::flush`] 或
    /// [`FlashDisk::sync_cache`] 才会写到 flash。
    pub fn write_sectors(&self, src: &[u8], start_sector: u32, sector_count: u32) -> Result<()> {
        self.check_signature()?;
        self.check_range(start_sector, sector_count)?;
        let mut inner = self.lock_idle()?;
        let DiskInner { driver, cache } = &mut *inner;
        cache.write(driver, src, start_sector, sector_count).map_err(|e| {
            log::error!("[DISK] {}: write {}+{} failed: {}", self.name(), start_sector, sector_count, e);
            e
        })
    }
}

impl<T: Transport> BlockIo for FlashDisk<T> {
    fn logical_sector_size(&self) -> u32 {
        self.config().logical_sector_size
    }

    fn sector_count(&self) -> u32 {
        FlashDisk::sector_count(self)
    }

    fn read_blocks(&self, dst: &mut [u8], start_sector: u32, sector_count: u32) -> i32 {
        status_code(self.read_sectors(dst, start_sector, sector_count))
    }

    fn write_blocks(&self, src: &[u8], start_sector: u32, sector_count: u32) -> i32 {
        status_code(self.write_sectors(src, start_sector, sector_count))
    }

    fn flush(&self) -> i32 {
        status_code(FlashDisk::flush(self))
    }
}
