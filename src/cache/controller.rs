//! 缓存控制器
//!
//! 把逻辑扇区读写翻译成按行（tag）的查找、按需填充、行内修改，
//! 写入只落到缓存行，直到驱逐或显式同步才写回 flash。
//!
//! 请求按 tag 升序拆分，每个 tag 独立查找 / 分配 / touch，
//! 任何一次 flash 操作都不会跨越两个 tag。
//!
//! `cache_lines == 0` 时工作在写穿模式：读直接访问 flash，
//! 写入先读出扇区、合并，内容不变时跳过，扇区已空白时跳过擦除。

use alloc::vec::Vec;

use super::directory::CacheDirectory;
use super::stats::CacheStats;
use crate::consts::FLASH_ERASED_BYTE;
use crate::error::{Error, ErrorKind, Result};
use crate::flash::FlashSectors;
use crate::types::{CacheStamp, DiskConfig, LineIndex};

/// 缓存控制器
#[derive(Debug)]
pub struct CacheController {
    directory: Option<CacheDirectory>,
    line_size: usize,
    logical_sector_size: usize,
    capacity: u64,
    stats: CacheStats,
    scratch: Vec<u8>,
}

/// 分配一行并从 flash 填充
fn fill_line<F: FlashSectors + ?Sized>(
    dir: &mut CacheDirectory,
    tag: u32,
    flash: &mut F,
) -> Result<LineIndex> {
    let index = dir.allocate(tag, flash)?;
    let sector_size = flash.sector_size();
    let buf = dir.line_mut(index).fill_buffer()?;
    for (i, chunk) in buf.chunks_mut(sector_size).enumerate() {
        flash.read_sector(tag + (i * sector_size) as u32, chunk)?;
    }
    dir.line_mut(index).mark_filled()?;
    log::debug!("[CACHE] filled line {} from {:#08x}", index, tag);
    Ok(index)
}

impl CacheController {
    /// 按磁盘配置创建控制器
    pub fn new(config: &DiskConfig) -> Result<Self> {
        let directory = if config.is_write_back() {
            Some(CacheDirectory::from_config(config)?)
        } else {
            log::info!("[CACHE] write-through mode (no cache lines)");
            None
        };

        let sector_size = config.flash_sector_size as usize;
        let mut scratch = Vec::new();
        if directory.is_none() {
            scratch
                .try_reserve_exact(sector_size)
                .map_err(|_| Error::new(ErrorKind::NoMemory, "scratch sector allocation failed"))?;
            scratch.resize(sector_size, 0);
        }

        Ok(Self {
            directory,
            line_size: if config.is_write_back() {
                config.line_size as usize
            } else {
                sector_size
            },
            logical_sector_size: config.logical_sector_size as usize,
            capacity: config.capacity(),
            stats: CacheStats::default(),
            scratch,
        })
    }

    /// 是否工作在写回模式
    pub fn is_write_back(&self) -> bool {
        self.directory.is_some()
    }

    /// 缓存目录（写穿模式下为 `None`）
    pub fn directory(&self) -> Option<&CacheDirectory> {
        self.directory.as_ref()
    }

    /// 统计信息快照
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats;
        if let Some(dir) = &self.directory {
            stats.writebacks += dir.writebacks();
            stats.dirty_lines = dir.dirty_count();
        }
        stats
    }

    /// 当前时间戳，用于构造同步阈值
    pub fn current_stamp(&self) -> CacheStamp {
        self.directory.as_ref().map_or(0, |dir| dir.current_stamp())
    }

    fn check_span(&self, addr: u64, len: usize) -> Result<()> {
        let end = addr
            .checked_add(len as u64)
            .ok_or(Error::new(ErrorKind::OutOfBounds, "byte range overflows"))?;
        if end > self.capacity {
            return Err(Error::new(ErrorKind::OutOfBounds, "byte range beyond capacity"));
        }
        Ok(())
    }

    fn sector_span(&self, start_sector: u32, sector_count: u32, buf_len: usize) -> Result<u64> {
        let len = sector_count as u64 * self.logical_sector_size as u64;
        if buf_len as u64 != len {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer length does not match sector count",
            ));
        }
        Ok(start_sector as u64 * self.logical_sector_size as u64)
    }

    /// 读取逻辑扇区
    ///
    /// # 参数
    ///
    /// * `flash` - flash 扇区接口
    /// * `dst` - 目标缓冲区，长度必须为 `sector_count * logical_sector_size`
    /// * `start_sector` - 起始逻辑扇区号
    /// * `sector_count` - 扇区数量
    pub fn read<F: FlashSectors + ?Sized>(
        &mut self,
        flash: &mut F,
        dst: &mut [u8],
        start_sector: u32,
        sector_count: u32,
    ) -> Result<()> {
        let addr = self.sector_span(start_sector, sector_count, dst.len())?;
        self.read_bytes(flash, addr, dst)
    }

    /// 写入逻辑扇区（只修改缓存行）
    pub fn write<F: FlashSectors + ?Sized>(
        &mut self,
        flash: &mut F,
        src: &[u8],
        start_sector: u32,
        sector_count: u32,
    ) -> Result<()> {
        let addr = self.sector_span(start_sector, sector_count, src.len())?;
        self.write_bytes(flash, addr, src)
    }

    /// 按字节地址读取
    pub fn read_bytes<F: FlashSectors + ?Sized>(
        &mut self,
        flash: &mut F,
        addr: u64,
        dst: &mut [u8],
    ) -> Result<()> {
        self.check_span(addr, dst.len())?;
        let line_size = self.line_size;
        let mut pos = 0;

        while pos < dst.len() {
            let cur = addr + pos as u64;
            let tag = (cur - cur % line_size as u64) as u32;
            let offset = (cur - tag as u64) as usize;
            let n = (line_size - offset).min(dst.len() - pos);
            let out = &mut dst[pos..pos + n];

            match self.directory.as_mut() {
                Some(dir) => {
                    let index = match dir.lookup(tag) {
                        Some(index) => {
                            log::trace!("[CACHE] read hit tag={:#08x} line={}", tag, index);
                            self.stats.read_hits += 1;
                            index
                        }
                        None => {
                            log::debug!("[CACHE] read miss tag={:#08x}", tag);
                            self.stats.read_misses += 1;
                            let index = fill_line(dir, tag, flash)?;
                            self.stats.fills += 1;
                            index
                        }
                    };
                    dir.touch(index);
                    dir.line_mut(index).load(offset, out)?;
                }
                None => {
                    self.stats.read_misses += 1;
                    if n == line_size {
                        flash.read_sector(tag, out)?;
                    } else {
                        flash.read_sector(tag, &mut self.scratch)?;
                        out.copy_from_slice(&self.scratch[offset..offset + n]);
                    }
                }
            }
            pos += n;
        }
        Ok(())
    }

    /// 按字节地址写入
    ///
    /// 写回模式下不直接访问 flash（除非驱逐脏行或未命中需要填充）。
    pub fn write_bytes<F: FlashSectors + ?Sized>(
        &mut self,
        flash: &mut F,
        addr: u64,
        src: &[u8],
    ) -> Result<()> {
        self.check_span(addr, src.len())?;
        let line_size = self.line_size;
        let mut pos = 0;

        while pos < src.len() {
            let cur = addr + pos as u64;
            let tag = (cur - cur % line_size as u64) as u32;
            let offset = (cur - tag as u64) as usize;
            let n = (line_size - offset).min(src.len() - pos);
            let data = &src[pos..pos + n];

            match self.directory.as_mut() {
                Some(dir) => {
                    let index = match dir.lookup(tag) {
                        Some(index) => {
                            log::trace!("[CACHE] write hit tag={:#08x} line={}", tag, index);
                            self.stats.write_hits += 1;
                            index
                        }
                        None if n == line_size => {
                            log::debug!("[CACHE] write miss tag={:#08x} (full line)", tag);
                            self.stats.write_misses += 1;
                            dir.allocate(tag, flash)?
                        }
                        None => {
                            log::debug!("[CACHE] write miss tag={:#08x}", tag);
                            self.stats.write_misses += 1;
                            let index = fill_line(dir, tag, flash)?;
                            self.stats.fills += 1;
                            index
                        }
                    };
                    dir.touch(index);
                    dir.line_mut(index).store(offset, data)?;
                }
                None => {
                    self.stats.write_misses += 1;
                    if Self::write_through(flash, &mut self.scratch, tag, offset, data)? {
                        self.stats.writebacks += 1;
                    }
                }
            }
            pos += n;
        }
        Ok(())
    }

    /// 写穿一个 flash 扇区，返回是否真正写了 flash
    fn write_through<F: FlashSectors + ?Sized>(
        flash: &mut F,
        scratch: &mut [u8],
        addr: u32,
        offset: usize,
        data: &[u8],
    ) -> Result<bool> {
        flash.read_sector(addr, scratch)?;
        if &scratch[offset..offset + data.len()] == data {
            log::trace!("[CACHE] write-through {:#08x} unchanged", addr);
            return Ok(false);
        }

        let blank = scratch.iter().all(|&b| b == FLASH_ERASED_BYTE);
        scratch[offset..offset + data.len()].copy_from_slice(data);
        if !blank {
            flash.erase_sector(addr)?;
        }
        flash.program_sector(addr, scratch)?;
        Ok(true)
    }

    /// 写回时间戳不大于 `older_than` 的脏行
    pub fn sync<F: FlashSectors + ?Sized>(&mut self, flash: &mut F, older_than: CacheStamp) -> Result<usize> {
        match self.directory.as_mut() {
            Some(dir) => dir.flush_older_than(older_than, flash),
            None => Ok(0),
        }
    }

    /// 写回所有脏行
    pub fn flush_all<F: FlashSectors + ?Sized>(&mut self, flash: &mut F) -> Result<usize> {
        match self.directory.as_mut() {
            Some(dir) => dir.flush_all(flash),
            None => Ok(0),
        }
    }

    /// 丢弃所有缓存内容（不写回），仅用于重新初始化
    pub fn reset(&mut self) {
        if let Some(dir) = self.directory.as_mut() {
            dir.reset();
        }
    }
}
