//! flash 协议驱动
//!
//! 负责写使能 / 命令 / busy 轮询的顺序约束：每个编程和擦除命令之前必须
//! 写使能，之后必须轮询到 BUSY 清零才能报告完成或接受下一条命令。
//! 整片擦除是唯一的例外，发出后立即返回，完成情况通过
//! [`FlashDriver::is_chip_erase_in_progress`] 查询。

use alloc::vec;
use alloc::vec::Vec;

use super::command::{self, address_frame};
use super::status::{Status1, Status2};
use super::transport::{transaction, Transport};
use crate::crc;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{DiskConfig, PollPolicy};

/// 扇区级 flash 访问接口
///
/// 缓存层只通过这个接口访问 flash，测试中可以替换为内存实现。
pub trait FlashSectors {
    /// 扇区大小（字节）
    fn sector_size(&self) -> usize;

    /// 读取整个扇区
    fn read_sector(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// 擦除扇区
    fn erase_sector(&mut self, addr: u32) -> Result<()>;

    /// 编程整个扇区（目标扇区须已擦除）
    fn program_sector(&mut self, addr: u32, data: &[u8]) -> Result<()>;
}

/// 正在进行的修改命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// 页编程
    Program,
    /// 扇区擦除
    SectorErase,
    /// 整片擦除
    ChipErase,
    /// 写状态寄存器
    WriteStatus,
}

/// 协议状态（瞬态，不持久化）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolState {
    /// 写使能锁存已置位
    pub write_enabled: bool,
    /// 已发出但尚未确认完成的修改命令
    pub pending: Option<Mutation>,
}

/// 驱动统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashCounters {
    /// 扇区读取次数
    pub sector_reads: u64,
    /// 页编程次数
    pub page_programs: u64,
    /// 扇区擦除次数
    pub sector_erases: u64,
    /// 整片擦除次数
    pub chip_erases: u64,
    /// 状态寄存器读取次数
    pub status_polls: u64,
}

/// flash 协议驱动
pub struct FlashDriver<T> {
    bus: T,
    sector_size: u32,
    page_size: u32,
    capacity: u64,
    poll: PollPolicy,
    verify: bool,
    scratch: Vec<u8>,
    state: ProtocolState,
    counters: FlashCounters,
}

impl<T: Transport> FlashDriver<T> {
    /// 创建驱动（不访问器件）
    pub fn new(bus: T, config: &DiskConfig) -> Self {
        Self {
            bus,
            sector_size: config.flash_sector_size,
            page_size: config.flash_page_size,
            capacity: config.capacity(),
            poll: config.poll,
            verify: config.verify_writes,
            scratch: vec![0u8; config.flash_page_size as usize],
            state: ProtocolState::default(),
            counters: FlashCounters::default(),
        }
    }

    /// 器件初始化：等待上一次操作完成，按需打开四线模式
    pub fn init(&mut self, quad_enable: bool) -> Result<()> {
        self.wait_ready()?;
        if quad_enable {
            self.quad_enable()?;
        }
        Ok(())
    }

    /// 获取传输层引用
    pub fn bus(&self) -> &T {
        &self.bus
    }

    /// 获取传输层可变引用
    pub fn bus_mut(&mut self) -> &mut T {
        &mut self.bus
    }

    /// 取回传输层
    pub fn into_bus(self) -> T {
        self.bus
    }

    /// 当前协议状态
    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// 统计信息
    pub fn counters(&self) -> FlashCounters {
        self.counters
    }

    // ===== 寄存器访问 =====

    /// 读状态寄存器 1
    pub fn read_status1(&mut self) -> Result<Status1> {
        self.counters.status_polls += 1;
        let raw = transaction(&mut self.bus, |bus| {
            bus.transfer(command::READ_STATUS_REGISTER_1)?;
            bus.transfer(0xFF)
        })?;
        Ok(Status1::from_bits_truncate(raw))
    }

    /// 读状态寄存器 2
    pub fn read_status2(&mut self) -> Result<Status2> {
        let raw = transaction(&mut self.bus, |bus| {
            bus.transfer(command::READ_STATUS_REGISTER_2)?;
            bus.transfer(0xFF)
        })?;
        Ok(Status2::from_bits_truncate(raw))
    }

    /// 写使能
    pub fn write_enable(&mut self) -> Result<()> {
        transaction(&mut self.bus, |bus| bus.write(&[command::WRITE_ENABLE]))?;
        self.state.write_enabled = true;
        Ok(())
    }

    /// 写禁止
    pub fn write_disable(&mut self) -> Result<()> {
        transaction(&mut self.bus, |bus| bus.write(&[command::WRITE_DISABLE]))?;
        self.state.write_enabled = false;
        Ok(())
    }

    /// 器件当前是否忙
    pub fn is_busy(&mut self) -> Result<bool> {
        Ok(self.read_status1()?.is_busy())
    }

    /// 轮询直到 BUSY 清零
    ///
    /// 最多读取 `max_polls` 次状态寄存器，超过则返回 `Timeout`，
    /// 此时未完成的修改命令仍记录在协议状态中。
    pub fn wait_ready(&mut self) -> Result<()> {
        for attempt in 0..self.poll.max_polls {
            if !self.read_status1()?.is_busy() {
                if attempt > 0 {
                    log::trace!("[FLASH] ready after {} polls", attempt + 1);
                }
                self.state.pending = None;
                self.state.write_enabled = false;
                return Ok(());
            }
            self.bus.delay_us(self.poll.backoff_us);
        }
        log::error!(
            "[FLASH] busy poll exceeded {} reads (pending={:?})",
            self.poll.max_polls,
            self.state.pending
        );
        Err(Error::new(ErrorKind::Timeout, "flash busy poll timed out"))
    }

    /// 确认器件可以接受新命令
    ///
    /// 整片擦除进行中返回 `Busy`；之前超时的修改命令会重新轮询。
    fn ensure_idle(&mut self) -> Result<()> {
        match self.state.pending {
            None => Ok(()),
            Some(Mutation::ChipErase) => {
                if self.read_status1()?.is_busy() {
                    return Err(Error::new(ErrorKind::Busy, "chip erase in progress"));
                }
                log::info!("[FLASH] chip erase completed");
                self.state.pending = None;
                self.state.write_enabled = false;
                Ok(())
            }
            Some(_) => self.wait_ready(),
        }
    }

    /// 发出一条修改命令：写使能 + 命令帧
    fn issue_mutation(&mut self, kind: Mutation, header: &[u8], payload: &[u8]) -> Result<()> {
        self.write_enable()?;
        // 命令可能已被器件锁存，失败时也要在下一条命令前轮询
        self.state.pending = Some(kind);
        transaction(&mut self.bus, |bus| {
            bus.write(header)?;
            bus.write(payload)
        })?;
        self.state.write_enabled = false;
        Ok(())
    }

    fn check_sector(&self, addr: u32, len: usize) -> Result<()> {
        if addr % self.sector_size != 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "address not sector aligned"));
        }
        if addr as u64 + self.sector_size as u64 > self.capacity {
            return Err(Error::new(ErrorKind::OutOfBounds, "sector beyond flash capacity"));
        }
        if len != self.sector_size as usize {
            return Err(Error::new(ErrorKind::InvalidInput, "buffer must be one flash sector"));
        }
        Ok(())
    }

    // ===== 扇区操作 =====

    /// 读取一个扇区（无需写使能和轮询）
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.check_sector(addr, buf.len())?;
        self.ensure_idle()?;
        let header = address_frame(command::READ_DATA, addr);
        transaction(&mut self.bus, |bus| {
            bus.write(&header)?;
            bus.read(buf)
        })?;
        self.counters.sector_reads += 1;
        Ok(())
    }

    /// 擦除一个扇区：写使能、SE、轮询
    pub fn erase(&mut self, addr: u32) -> Result<()> {
        self.check_sector(addr, self.sector_size as usize)?;
        self.ensure_idle()?;
        log::debug!("[FLASH] erase sector {:#08x}", addr);
        let header = address_frame(command::SECTOR_ERASE, addr);
        self.issue_mutation(Mutation::SectorErase, &header, &[])?;
        self.wait_ready()?;
        self.counters.sector_erases += 1;
        Ok(())
    }

    /// 编程一个扇区：按页拆分，每页写使能、PP、轮询
    pub fn program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.check_sector(addr, data.len())?;
        self.ensure_idle()?;
        log::debug!("[FLASH] program sector {:#08x}", addr);
        let page_size = self.page_size as usize;
        for (i, page) in data.chunks(page_size).enumerate() {
            let page_addr = addr + (i * page_size) as u32;
            let header = address_frame(command::PAGE_PROGRAM, page_addr);
            self.issue_mutation(Mutation::Program, &header, page)?;
            self.wait_ready()?;
            self.counters.page_programs += 1;
        }
        if self.verify {
            self.verify_sector(addr, data)?;
        }
        Ok(())
    }

    /// 回读校验
    fn verify_sector(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let expected = crc::checksum(data);
        let mut actual = 0;
        let page_size = self.page_size as usize;
        for offset in (0..data.len()).step_by(page_size) {
            let header = address_frame(command::READ_DATA, addr + offset as u32);
            let scratch = &mut self.scratch;
            transaction(&mut self.bus, |bus| {
                bus.write(&header)?;
                bus.read(scratch)
            })?;
            actual = crc::checksum_append(actual, &self.scratch);
        }
        if actual != expected {
            log::error!(
                "[FLASH] verify failed at {:#08x}: crc {:#010x} != {:#010x}",
                addr,
                actual,
                expected
            );
            return Err(Error::new(ErrorKind::Io, "program verify mismatch"));
        }
        Ok(())
    }

    /// 整片擦除：写使能、CE，不等待完成
    pub fn chip_erase(&mut self) -> Result<()> {
        self.ensure_idle()?;
        log::info!("[FLASH] chip erase issued");
        self.issue_mutation(Mutation::ChipErase, &[command::CHIP_ERASE], &[])?;
        self.counters.chip_erases += 1;
        Ok(())
    }

    /// 整片擦除是否仍在进行
    ///
    /// 只读取一次状态寄存器；器件空闲时清除挂起标记。
    pub fn is_chip_erase_in_progress(&mut self) -> Result<bool> {
        let busy = self.read_status1()?.is_busy();
        if !busy && self.state.pending == Some(Mutation::ChipErase) {
            log::info!("[FLASH] chip erase completed");
            self.state.pending = None;
            self.state.write_enabled = false;
        }
        Ok(busy)
    }

    /// 置位 SR2.QE（已置位时不写）
    pub fn quad_enable(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let sr1 = self.read_status1()?;
        let sr2 = self.read_status2()?;
        if sr2.contains(Status2::QE) {
            return Ok(());
        }
        log::debug!("[FLASH] enabling quad mode (sr1={:#04x} sr2={:#04x})", sr1.bits(), sr2.bits());
        let frame = [
            command::WRITE_STATUS_REGISTERS,
            sr1.bits() & !(Status1::BUSY | Status1::WEL).bits(),
            (sr2 | Status2::QE).bits(),
        ];
        self.issue_mutation(Mutation::WriteStatus, &frame, &[])?;
        self.wait_ready()
    }
}

impl<T: Transport> FlashSectors for FlashDriver<T> {
    fn sector_size(&self) -> usize {
        self.sector_size as usize
    }

    fn read_sector(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.read(addr, buf)
    }

    fn erase_sector(&mut self, addr: u32) -> Result<()> {
        self.erase(addr)
    }

    fn program_sector(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.program(addr, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::sim::{Op, SimFlash};

    fn small_config() -> DiskConfig {
        DiskConfig {
            flash_sector_size: 1024,
            flash_page_size: 256,
            flash_sector_count: 8,
            logical_sector_size: 512,
            line_size: 1024,
            metadata_sectors: 0,
            ..DiskConfig::default()
        }
    }

    fn driver() -> (FlashDriver<SimFlash>, SimFlash) {
        let config = small_config();
        let sim = SimFlash::for_config(&config);
        (FlashDriver::new(sim.clone(), &config), sim)
    }

    #[test]
    fn test_program_then_read_back() {
        let (mut drv, sim) = driver();
        let data: Vec<u8> = (0..1024).map(|i| i as u8).collect();

        drv.erase(2048).unwrap();
        drv.program(2048, &data).unwrap();

        let mut out = vec![0u8; 1024];
        drv.read(2048, &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(drv.counters().page_programs, 4);
        assert_eq!(drv.counters().sector_erases, 1);
        assert!(sim.state().violations.is_empty());
    }

    #[test]
    fn test_every_mutation_wrapped_by_wren_and_poll() {
        let (mut drv, sim) = driver();
        drv.erase(0).unwrap();
        drv.program(0, &[0x5A; 1024]).unwrap();

        let st = sim.state();
        for (i, op) in st.log.iter().enumerate() {
            if op.is_mutation() {
                assert_eq!(st.log[i - 1], Op::WriteEnable, "op {} not preceded by WREN", i);
                assert_eq!(st.log.get(i + 1), Some(&Op::ReadStatus1), "op {} not followed by poll", i);
            }
        }
        // 每次修改之后的最后一次状态读取必须报告空闲
        assert_eq!(st.busy_reads, 0);
        assert!(st.violations.is_empty());
    }

    #[test]
    fn test_program_only_clears_bits() {
        let (mut drv, _sim) = driver();
        drv.program(0, &[0x0F; 1024]).unwrap();
        drv.program(0, &[0xF0; 1024]).unwrap();

        let mut out = vec![0u8; 1024];
        drv.read(0, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0x00));
    }

    #[test]
    fn test_busy_poll_timeout() {
        let (mut drv, sim) = driver();
        drv.poll.max_polls = 5;
        sim.state().stuck = true;

        let err = drv.erase(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(drv.state().pending, Some(Mutation::SectorErase));

        // 器件恢复后，下一条命令先确认上一次修改已完成
        sim.state().stuck = false;
        let mut out = vec![0u8; 1024];
        drv.read(0, &mut out).unwrap();
        assert_eq!(drv.state().pending, None);
    }

    #[test]
    fn test_transport_failure() {
        let (mut drv, sim) = driver();
        sim.state().fail_opcode = Some(command::READ_DATA);

        let mut out = vec![0u8; 1024];
        let err = drv.read(0, &mut out).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_failed_mutation_polls_before_next_command() {
        let (mut drv, sim) = driver();
        sim.state().fail_opcode = Some(command::SECTOR_ERASE);

        let err = drv.erase(0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(drv.state().pending, Some(Mutation::SectorErase));

        sim.state().fail_opcode = None;
        sim.state().log.clear();
        let mut out = vec![0u8; 1024];
        drv.read(0, &mut out).unwrap();
        assert_eq!(sim.state().log, [Op::ReadStatus1, Op::Read(0, 1024)]);
        assert_eq!(drv.state().pending, None);
    }

    #[test]
    fn test_chip_erase_is_fire_and_forget() {
        let (mut drv, sim) = driver();
        drv.chip_erase().unwrap();

        // 发出后不轮询
        assert_eq!(sim.state().log.last(), Some(&Op::ChipErase));
        assert!(drv.is_chip_erase_in_progress().unwrap());

        // 擦除期间拒绝普通命令
        let mut out = vec![0u8; 1024];
        assert_eq!(drv.read(0, &mut out).unwrap_err().kind(), ErrorKind::Busy);

        let mut polls = 0;
        while drv.is_chip_erase_in_progress().unwrap() {
            polls += 1;
            assert!(polls < 10);
        }
        assert_eq!(drv.state().pending, None);
        drv.read(0, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xFF));
        assert!(sim.state().violations.is_empty());
    }

    #[test]
    fn test_quad_enable_sets_qe_once() {
        let (mut drv, sim) = driver();
        drv.init(true).unwrap();
        assert!(sim.state().sr2.contains(Status2::QE));
        assert_eq!(sim.state().count(|op| *op == Op::WriteStatus), 1);

        drv.init(true).unwrap();
        assert_eq!(sim.state().count(|op| *op == Op::WriteStatus), 1);
    }

    #[test]
    fn test_verify_detects_bad_program() {
        let config = DiskConfig {
            verify_writes: true,
            ..small_config()
        };
        let sim = SimFlash::for_config(&config);
        let mut drv = FlashDriver::new(sim.clone(), &config);

        drv.program(1024, &[0x11; 1024]).unwrap();

        drv.erase(1024).unwrap();
        sim.state().corrupt_program = true;
        let err = drv.program(1024, &[0x22; 1024]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_reject_unaligned_and_out_of_range() {
        let (mut drv, _sim) = driver();
        assert_eq!(drv.erase(100).unwrap_err().kind(), ErrorKind::InvalidInput);
        assert_eq!(drv.erase(8 * 1024).unwrap_err().kind(), ErrorKind::OutOfBounds);
        let mut short = vec![0u8; 10];
        assert_eq!(drv.read(0, &mut short).unwrap_err().kind(), ErrorKind::InvalidInput);
    }
}
