//! 缓存目录
//!
//! 固定容量的缓存行表：tag 到行下标的映射、行状态、最近使用时间戳，
//! 以及驱逐对象的选择。
//!
//! # 驱逐策略
//!
//! 1. 已绑定同一 tag 的 `Incompatible` 行（保证 tag 唯一）
//! 2. 第一个 `Invalid` 行
//! 3. 第一个 `Incompatible` 行
//! 4. 候选行中时间戳最小者，相同时取下标最小者
//!
//! 候选是非保留行。配置了元数据区域时，落在区域内的 tag 改为以保留行为候选，
//! 让频繁改写的 FAT 表在自己的池中换入换出。候选集合为空时退化为全部行。
//!
//! 被选中的行如果是 `Modified`，先写回 flash 再重新绑定，
//! 所以 [`CacheDirectory::allocate`] 可能产生 flash 写操作。

use alloc::vec::Vec;
use core::ops::Range;

use super::line::{CacheLine, LineState};
use crate::consts::DIRTY_WARN_PERCENT;
use crate::error::{Error, ErrorKind, Result};
use crate::flash::FlashSectors;
use crate::types::{CacheStamp, DiskConfig, LineIndex};

/// 缓存目录
pub struct CacheDirectory {
    lines: Vec<CacheLine>,
    reserved: usize,
    line_size: usize,
    metadata_limit: u32,
    clock: CacheStamp,
    writebacks: u64,
    dirty_high: bool,
}

impl CacheDirectory {
    /// 创建缓存目录
    ///
    /// # 参数
    ///
    /// * `count` - 行数（至少 2）
    /// * `reserved` - 保留行数（小于 `count`）
    /// * `line_size` - 行大小（字节）
    /// * `metadata_limit` - 元数据区域结束地址，低于它的 tag 使用保留行
    ///
    /// # 错误
    ///
    /// 行缓冲区分配失败时返回 `NoMemory`
    pub fn new(count: usize, reserved: usize, line_size: usize, metadata_limit: u32) -> Result<Self> {
        if count < 2 || reserved >= count || line_size == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "invalid cache geometry"));
        }

        let mut lines = Vec::new();
        lines
            .try_reserve_exact(count)
            .map_err(|_| Error::new(ErrorKind::NoMemory, "cache directory allocation failed"))?;
        for _ in 0..count {
            let mut data = Vec::new();
            data.try_reserve_exact(line_size)
                .map_err(|_| Error::new(ErrorKind::NoMemory, "cache line allocation failed"))?;
            data.resize(line_size, 0);
            lines.push(CacheLine::new(data));
        }

        log::debug!(
            "[CACHE] directory created: {} lines ({} reserved) x {} bytes",
            count,
            reserved,
            line_size
        );

        Ok(Self {
            lines,
            reserved,
            line_size,
            metadata_limit,
            clock: 0,
            writebacks: 0,
            dirty_high: false,
        })
    }

    /// 按磁盘配置创建
    pub fn from_config(config: &DiskConfig) -> Result<Self> {
        Self::new(
            config.cache_lines,
            config.reserved_lines,
            config.line_size as usize,
            config.metadata_limit(),
        )
    }

    /// 行数
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// 目录是否为空（构造保证至少 2 行）
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 保留行数
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// 行大小（字节）
    pub fn line_size(&self) -> usize {
        self.line_size
    }

    /// 只读访问所有行
    pub fn lines(&self) -> &[CacheLine] {
        &self.lines
    }

    /// 只读访问单行
    pub fn line(&self, index: LineIndex) -> Option<&CacheLine> {
        self.lines.get(index)
    }

    pub(crate) fn line_mut(&mut self, index: LineIndex) -> &mut CacheLine {
        &mut self.lines[index]
    }

    /// 当前时间戳（最近一次 touch 分配的值）
    pub fn current_stamp(&self) -> CacheStamp {
        self.clock
    }

    /// 脏行数量
    pub fn dirty_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|line| line.state() == LineState::Modified)
            .count()
    }

    /// 累计写回行数
    pub fn writebacks(&self) -> u64 {
        self.writebacks
    }

    /// 查找持有 `tag` 的行
    pub fn lookup(&self, tag: u32) -> Option<LineIndex> {
        self.lines.iter().position(|line| line.holds(tag))
    }

    /// 更新行的最近使用时间戳
    pub fn touch(&mut self, index: LineIndex) {
        self.clock += 1;
        self.lines[index].set_last_used(self.clock);
    }

    fn is_metadata(&self, tag: u32) -> bool {
        tag < self.metadata_limit
    }

    fn candidates(&self, tag: u32) -> Range<usize> {
        let range = if self.is_metadata(tag) {
            0..self.reserved
        } else {
            self.reserved..self.lines.len()
        };
        if range.is_empty() {
            0..self.lines.len()
        } else {
            range
        }
    }

    fn select_victim(&self, tag: u32) -> LineIndex {
        let bound = self
            .lines
            .iter()
            .position(|line| line.tag() == Some(tag) && line.state() == LineState::Incompatible);
        if let Some(index) = bound {
            return index;
        }
        if let Some(index) = self.lines.iter().position(|l| l.state() == LineState::Invalid) {
            return index;
        }
        if let Some(index) = self.lines.iter().position(|l| l.state().is_free()) {
            return index;
        }
        self.candidates(tag)
            .min_by_key(|&i| (self.lines[i].last_used(), i))
            .unwrap_or(self.reserved)
    }

    /// 脏行比例超过阈值时告警，持续超过阈值期间只告警一次
    ///
    /// # 返回
    ///
    /// 本次是否发出了告警
    fn check_dirty_ratio(&mut self) -> bool {
        let dirty = self.dirty_count();
        let high = dirty * 100 / self.lines.len() > DIRTY_WARN_PERCENT;
        let crossed = high && !self.dirty_high;
        if crossed {
            log::warn!(
                "[CACHE] High dirty ratio: {}/{}. Consider calling sync",
                dirty,
                self.lines.len()
            );
        }
        self.dirty_high = high;
        crossed
    }

    /// 为未命中的 `tag` 分配一行
    ///
    /// 返回的行处于 `Incompatible` 状态，调用者负责填充或整行覆盖。
    /// 如果被驱逐的行是脏行，会先写回；写回失败时该行保持原样并返回错误。
    pub fn allocate<F: FlashSectors + ?Sized>(&mut self, tag: u32, flash: &mut F) -> Result<LineIndex> {
        if let Some(index) = self.lookup(tag) {
            return Ok(index);
        }

        self.check_dirty_ratio();

        let victim = self.select_victim(tag);
        let line = &self.lines[victim];
        if line.state().is_resident() {
            log::debug!(
                "[CACHE] evict line {} tag={:#x?} state={:?} for tag {:#08x}",
                victim,
                line.tag(),
                line.state(),
                tag
            );
        }
        if line.state() == LineState::Modified {
            self.flush(victim, flash)?;
        }
        self.lines[victim].bind(tag)?;
        Ok(victim)
    }

    /// 写回单行
    ///
    /// `Modified` 行先擦除再编程其覆盖的每个 flash 扇区，然后变为 `Valid`；
    /// `Valid` 行不做任何事。
    ///
    /// # 返回
    ///
    /// 是否发生了写回
    pub fn flush<F: FlashSectors + ?Sized>(&mut self, index: LineIndex, flash: &mut F) -> Result<bool> {
        let line = &self.lines[index];
        match line.state() {
            LineState::Valid => return Ok(false),
            LineState::Modified => {}
            LineState::Invalid | LineState::Incompatible => {
                return Err(Error::new(ErrorKind::InvalidState, "flush on line without data"));
            }
        }
        let tag = line
            .tag()
            .ok_or(Error::new(ErrorKind::InvalidState, "modified line without tag"))?;

        log::debug!("[CACHE] flush line {} tag={:#08x}", index, tag);
        let sector_size = flash.sector_size();
        for (i, chunk) in line.data().chunks(sector_size).enumerate() {
            let addr = tag + (i * sector_size) as u32;
            flash.erase_sector(addr)?;
            flash.program_sector(addr, chunk)?;
        }

        self.lines[index].mark_flushed()?;
        self.writebacks += 1;
        Ok(true)
    }

    /// 写回所有时间戳不大于 `stamp` 的脏行
    ///
    /// 最近使用的行可能仍在变化，保留在缓存中。遇到第一个错误即返回。
    pub fn flush_older_than<F: FlashSectors + ?Sized>(
        &mut self,
        stamp: CacheStamp,
        flash: &mut F,
    ) -> Result<usize> {
        let mut flushed = 0;
        for index in 0..self.lines.len() {
            let line = &self.lines[index];
            if line.state() == LineState::Modified && line.last_used() <= stamp {
                self.flush(index, flash)?;
                flushed += 1;
            }
        }
        if flushed > 0 {
            log::debug!("[CACHE] synced {} lines older than stamp {}", flushed, stamp);
        }
        Ok(flushed)
    }

    /// 写回所有脏行
    pub fn flush_all<F: FlashSectors + ?Sized>(&mut self, flash: &mut F) -> Result<usize> {
        self.flush_older_than(CacheStamp::MAX, flash)
    }

    /// 所有行复位为 `Invalid`（不写回）
    ///
    /// 仅在重新初始化时使用。时间戳不回退，之前取得的同步阈值仍然有效。
    pub fn reset(&mut self) {
        let dropped = self.dirty_count();
        if dropped > 0 {
            log::warn!("[CACHE] reset discards {} modified lines", dropped);
        }
        for line in self.lines.iter_mut() {
            line.reset();
        }
    }
}

impl core::fmt::Debug for CacheDirectory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheDirectory")
            .field("lines", &self.lines)
            .field("reserved", &self.reserved)
            .field("line_size", &self.line_size)
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec;

    /// 内存 flash：擦除置 0xFF，编程只清位
    pub(crate) struct MemFlash {
        pub sector_size: usize,
        pub mem: Vec<u8>,
        pub erases: usize,
        pub programs: usize,
        pub reads: usize,
        pub fail: bool,
    }

    impl MemFlash {
        pub(crate) fn new(sector_size: usize, sectors: usize) -> Self {
            Self {
                sector_size,
                mem: vec![0xFF; sector_size * sectors],
                erases: 0,
                programs: 0,
                reads: 0,
                fail: false,
            }
        }

        fn check(&self) -> Result<()> {
            if self.fail {
                return Err(Error::new(ErrorKind::Io, "mem flash failure"));
            }
            Ok(())
        }
    }

    impl FlashSectors for MemFlash {
        fn sector_size(&self) -> usize {
            self.sector_size
        }

        fn read_sector(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
            self.check()?;
            let a = addr as usize;
            buf.copy_from_slice(&self.mem[a..a + buf.len()]);
            self.reads += 1;
            Ok(())
        }

        fn erase_sector(&mut self, addr: u32) -> Result<()> {
            self.check()?;
            let a = addr as usize;
            self.mem[a..a + self.sector_size].fill(0xFF);
            self.erases += 1;
            Ok(())
        }

        fn program_sector(&mut self, addr: u32, data: &[u8]) -> Result<()> {
            self.check()?;
            let a = addr as usize;
            for (dst, &src) in self.mem[a..a + data.len()].iter_mut().zip(data) {
                *dst &= src;
            }
            self.programs += 1;
            Ok(())
        }
    }

    const SECTOR: usize = 256;

    fn dir(count: usize, reserved: usize) -> CacheDirectory {
        CacheDirectory::new(count, reserved, SECTOR, 0).unwrap()
    }

    /// 分配并整行写入，模拟写路径
    fn put(dir: &mut CacheDirectory, flash: &mut MemFlash, tag: u32, byte: u8) -> LineIndex {
        let index = dir.allocate(tag, flash).unwrap();
        dir.line_mut(index).store(0, &[byte; SECTOR]).unwrap();
        dir.touch(index);
        index
    }

    #[test]
    fn test_directory_creation() {
        let dir = dir(4, 1);
        assert_eq!(dir.len(), 4);
        assert_eq!(dir.reserved(), 1);
        assert_eq!(dir.current_stamp(), 0);
        assert!(dir.lines().iter().all(|l| l.state() == LineState::Invalid));
        assert!(CacheDirectory::new(1, 0, SECTOR, 0).is_err());
        assert!(CacheDirectory::new(2, 2, SECTOR, 0).is_err());
    }

    #[test]
    fn test_lookup() {
        let mut dir = dir(2, 1);
        let mut flash = MemFlash::new(SECTOR, 8);
        assert_eq!(dir.lookup(0), None);

        let index = put(&mut dir, &mut flash, 512, 1);
        assert_eq!(dir.lookup(512), Some(index));
        assert_eq!(dir.lookup(256), None);
    }

    #[test]
    fn test_invalid_lines_used_first() {
        let mut dir = dir(3, 1);
        let mut flash = MemFlash::new(SECTOR, 8);
        assert_eq!(put(&mut dir, &mut flash, 0, 1), 0);
        assert_eq!(put(&mut dir, &mut flash, 256, 2), 1);
        assert_eq!(put(&mut dir, &mut flash, 512, 3), 2);
        assert_eq!(flash.programs, 0);
    }

    #[test]
    fn test_deterministic_lru_eviction() {
        let mut dir = dir(4, 1);
        let mut flash = MemFlash::new(SECTOR, 16);
        for i in 0..4 {
            put(&mut dir, &mut flash, i * SECTOR as u32, i as u8);
        }
        // 行 0 是保留行且最旧，也不会被普通 tag 驱逐
        dir.touch(2);
        dir.touch(1);

        // 行 3 时间戳最小（非保留行中）
        let victim = dir.allocate(10 * SECTOR as u32, &mut flash).unwrap();
        assert_eq!(victim, 3);
        // 脏行先写回
        assert_eq!(flash.programs, 1);
        assert_eq!(&flash.mem[3 * SECTOR..4 * SECTOR], &[3u8; SECTOR][..]);
        assert_eq!(dir.line(0).unwrap().tag(), Some(0));
    }

    #[test]
    fn test_eviction_tie_breaks_on_lowest_index() {
        let mut dir = dir(4, 1);
        let mut flash = MemFlash::new(SECTOR, 16);
        for i in 0..4u32 {
            let index = dir.allocate(i * SECTOR as u32, &mut flash).unwrap();
            dir.line_mut(index).store(0, &[0u8; SECTOR]).unwrap();
        }
        // 都没有 touch，时间戳全为 0
        assert_eq!(dir.allocate(9 * SECTOR as u32, &mut flash).unwrap(), 1);
    }

    #[test]
    fn test_metadata_tags_use_reserved_pool() {
        let mut dir = CacheDirectory::new(3, 1, SECTOR, 2 * SECTOR as u32).unwrap();
        let mut flash = MemFlash::new(SECTOR, 16);
        put(&mut dir, &mut flash, 0, 0xA0);
        put(&mut dir, &mut flash, 4 * SECTOR as u32, 0xB0);
        put(&mut dir, &mut flash, 5 * SECTOR as u32, 0xC0);

        // 元数据 tag 只驱逐保留行
        let index = dir.allocate(SECTOR as u32, &mut flash).unwrap();
        assert_eq!(index, 0);
        assert_eq!(dir.lookup(4 * SECTOR as u32), Some(1));
        assert_eq!(dir.lookup(5 * SECTOR as u32), Some(2));
    }

    #[test]
    fn test_metadata_without_reserved_lines_falls_back() {
        let mut dir = CacheDirectory::new(2, 0, SECTOR, 4 * SECTOR as u32).unwrap();
        let mut flash = MemFlash::new(SECTOR, 16);
        put(&mut dir, &mut flash, 0, 1);
        put(&mut dir, &mut flash, SECTOR as u32, 2);
        assert_eq!(dir.allocate(2 * SECTOR as u32, &mut flash).unwrap(), 0);
    }

    #[test]
    fn test_failed_victim_flush_keeps_line() {
        let mut dir = dir(2, 1);
        let mut flash = MemFlash::new(SECTOR, 16);
        put(&mut dir, &mut flash, 0, 1);
        put(&mut dir, &mut flash, SECTOR as u32, 2);

        flash.fail = true;
        let err = dir.allocate(2 * SECTOR as u32, &mut flash).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);

        let line = dir.line(1).unwrap();
        assert_eq!(line.tag(), Some(SECTOR as u32));
        assert_eq!(line.state(), LineState::Modified);

        // 恢复后重试成功
        flash.fail = false;
        assert_eq!(dir.allocate(2 * SECTOR as u32, &mut flash).unwrap(), 1);
        assert_eq!(&flash.mem[SECTOR..2 * SECTOR], &[2u8; SECTOR][..]);
    }

    #[test]
    fn test_unfilled_line_reused_for_same_tag() {
        let mut dir = dir(3, 1);
        let mut flash = MemFlash::new(SECTOR, 16);
        let first = dir.allocate(768, &mut flash).unwrap();
        // 模拟填充失败：行仍为 Incompatible
        assert_eq!(dir.lookup(768), None);
        let again = dir.allocate(768, &mut flash).unwrap();
        assert_eq!(first, again);
        let holders = dir.lines().iter().filter(|l| l.tag() == Some(768)).count();
        assert_eq!(holders, 1);
    }

    #[test]
    fn test_flush_states() {
        let mut dir = dir(2, 1);
        let mut flash = MemFlash::new(SECTOR, 16);
        assert_eq!(dir.flush(0, &mut flash).unwrap_err().kind(), ErrorKind::InvalidState);

        let index = put(&mut dir, &mut flash, 256, 0x42);
        assert!(dir.flush(index, &mut flash).unwrap());
        assert_eq!(dir.line(index).unwrap().state(), LineState::Valid);
        assert_eq!(&flash.mem[256..512], &[0x42u8; SECTOR][..]);
        assert_eq!(flash.erases, 1);

        // 已经干净，不再写
        assert!(!dir.flush(index, &mut flash).unwrap());
        assert_eq!(flash.programs, 1);
        assert_eq!(dir.writebacks(), 1);
    }

    #[test]
    fn test_flush_older_than() {
        let mut dir = dir(4, 0);
        let mut flash = MemFlash::new(SECTOR, 16);
        put(&mut dir, &mut flash, 0, 1); // stamp 1
        put(&mut dir, &mut flash, 256, 2); // stamp 2
        put(&mut dir, &mut flash, 512, 3); // stamp 3
        let threshold = dir.current_stamp() - 1;
        put(&mut dir, &mut flash, 768, 4); // stamp 4

        assert_eq!(dir.flush_older_than(threshold, &mut flash).unwrap(), 2);
        let states: Vec<_> = dir.lines().iter().map(|l| l.state()).collect();
        assert_eq!(
            states,
            [LineState::Valid, LineState::Valid, LineState::Modified, LineState::Modified]
        );
        assert_eq!(dir.flush_all(&mut flash).unwrap(), 2);
        assert_eq!(dir.dirty_count(), 0);
    }

    #[test]
    fn test_multi_sector_line_flush() {
        let mut dir = CacheDirectory::new(2, 0, 2 * SECTOR, 0).unwrap();
        let mut flash = MemFlash::new(SECTOR, 8);
        let index = dir.allocate(2 * SECTOR as u32, &mut flash).unwrap();
        dir.line_mut(index).store(0, &[0x33; 2 * SECTOR]).unwrap();
        dir.flush(index, &mut flash).unwrap();
        assert_eq!(flash.erases, 2);
        assert_eq!(flash.programs, 2);
        assert!(flash.mem[2 * SECTOR..4 * SECTOR].iter().all(|&b| b == 0x33));
    }

    #[test]
    fn test_reset() {
        let mut dir = dir(2, 1);
        let mut flash = MemFlash::new(SECTOR, 8);
        put(&mut dir, &mut flash, 0, 1);
        put(&mut dir, &mut flash, 256, 2);
        dir.reset();
        assert_eq!(dir.lookup(0), None);
        assert_eq!(dir.current_stamp(), 2);
        assert_eq!(flash.programs, 0);

        put(&mut dir, &mut flash, 0, 3);
        assert_eq!(dir.current_stamp(), 3);
        assert_eq!(dir.flush_older_than(2, &mut flash).unwrap(), 0);
    }

    #[test]
    fn test_dirty_ratio_warns_once_per_crossing() {
        let mut dir = dir(2, 0);
        let mut flash = MemFlash::new(SECTOR, 8);
        put(&mut dir, &mut flash, 0, 1);
        put(&mut dir, &mut flash, 256, 2);

        // 两行都脏时告警一次，之后保持沉默
        assert!(dir.check_dirty_ratio());
        put(&mut dir, &mut flash, 512, 3);
        assert!(!dir.check_dirty_ratio());

        // 回落到阈值以下后，再次越过阈值会重新告警
        dir.flush_all(&mut flash).unwrap();
        put(&mut dir, &mut flash, 0, 4);
        assert!(!dir.check_dirty_ratio());
        put(&mut dir, &mut flash, 256, 5);
        assert!(dir.check_dirty_ratio());
    }
}
