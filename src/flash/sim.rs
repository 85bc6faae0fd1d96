//! 测试用 NOR flash 模拟器
//!
//! 在字节流层面解析命令帧，模拟器件的关键物理约束：
//! - 编程只能把位从 1 清为 0
//! - 擦除把整个扇区置为 0xFF
//! - 写使能锁存在一次修改命令后自动清除
//! - busy 期间只响应状态读取，按状态读取次数计时
//!
//! 同时记录命令日志和协议违规，供协议顺序测试断言。

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::{Mutex, MutexGuard};

use super::command::{self, frame_address};
use super::status::{Status1, Status2};
use super::transport::Transport;
use crate::error::{Error, ErrorKind, Result};
use crate::types::DiskConfig;

/// 模拟器观察到的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    WriteEnable,
    WriteDisable,
    ReadStatus1,
    ReadStatus2,
    WriteStatus,
    Program(u32, usize),
    SectorErase(u32),
    ChipErase,
    Read(u32, usize),
    Other(u8),
}

impl Op {
    pub(crate) fn is_mutation(&self) -> bool {
        matches!(self, Op::Program(..) | Op::SectorErase(_) | Op::ChipErase | Op::WriteStatus)
    }
}

pub(crate) struct SimState {
    pub mem: Vec<u8>,
    pub page_size: usize,
    pub sector_size: usize,
    pub sr2: Status2,
    pub wel: bool,
    /// 剩余报告 BUSY 的状态读取次数
    pub busy_reads: u32,
    /// 永远 busy（超时测试）
    pub stuck: bool,
    pub program_busy: u32,
    pub erase_busy: u32,
    pub chip_busy: u32,
    /// 以此操作码开头的帧在传输时失败
    pub fail_opcode: Option<u8>,
    /// 编程时翻转首字节的最低位（校验测试）
    pub corrupt_program: bool,
    pub log: Vec<Op>,
    pub violations: Vec<&'static str>,
    frame: Vec<u8>,
    selected: bool,
}

impl SimState {
    fn busy(&self) -> bool {
        self.stuck || self.busy_reads > 0
    }

    fn status1(&mut self) -> u8 {
        let mut sr = Status1::empty();
        if self.busy() {
            sr |= Status1::BUSY;
            if !self.stuck {
                self.busy_reads -= 1;
            }
        }
        if self.wel {
            sr |= Status1::WEL;
        }
        sr.bits()
    }

    /// 清除日志中的状态读取，便于断言修改命令序列
    pub fn commands(&self) -> Vec<Op> {
        self.log
            .iter()
            .filter(|op| !matches!(op, Op::ReadStatus1 | Op::ReadStatus2))
            .cloned()
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Op) -> bool) -> usize {
        self.log.iter().filter(|op| pred(op)).count()
    }

    fn execute(&mut self, frame: &[u8]) {
        let Some(&opcode) = frame.first() else {
            return;
        };
        if self.busy() && !matches!(opcode, command::READ_STATUS_REGISTER_1 | command::READ_STATUS_REGISTER_2) {
            self.violations.push("command issued while busy");
            self.log.push(Op::Other(opcode));
            return;
        }
        if command::is_mutating(opcode) && !self.wel {
            self.violations.push("mutation without write enable");
            self.log.push(Op::Other(opcode));
            return;
        }
        match opcode {
            command::WRITE_ENABLE => {
                self.wel = true;
                self.log.push(Op::WriteEnable);
            }
            command::WRITE_DISABLE => {
                self.wel = false;
                self.log.push(Op::WriteDisable);
            }
            command::READ_STATUS_REGISTER_1 => self.log.push(Op::ReadStatus1),
            command::READ_STATUS_REGISTER_2 => self.log.push(Op::ReadStatus2),
            command::WRITE_STATUS_REGISTERS => {
                if let Some(&sr2) = frame.get(2) {
                    self.sr2 = Status2::from_bits_truncate(sr2);
                }
                self.wel = false;
                self.busy_reads = self.program_busy;
                self.log.push(Op::WriteStatus);
            }
            command::PAGE_PROGRAM => {
                let addr = frame_address(frame).unwrap_or(0) as usize;
                let data = frame.get(4..).unwrap_or(&[]);
                let page_base = addr - addr % self.page_size;
                for (i, &b) in data.iter().enumerate() {
                    let a = page_base + (addr - page_base + i) % self.page_size;
                    let b = if self.corrupt_program && i == 0 { b ^ 0x01 } else { b };
                    self.mem[a] &= b;
                }
                self.wel = false;
                self.busy_reads = self.program_busy;
                self.log.push(Op::Program(addr as u32, data.len()));
            }
            command::SECTOR_ERASE => {
                let addr = frame_address(frame).unwrap_or(0) as usize;
                let base = addr - addr % self.sector_size;
                self.mem[base..base + self.sector_size].fill(0xFF);
                self.wel = false;
                self.busy_reads = self.erase_busy;
                self.log.push(Op::SectorErase(base as u32));
            }
            command::CHIP_ERASE => {
                self.mem.fill(0xFF);
                self.wel = false;
                self.busy_reads = self.chip_busy;
                self.log.push(Op::ChipErase);
            }
            command::READ_DATA => {
                let addr = frame_address(frame).unwrap_or(0);
                self.log.push(Op::Read(addr, frame.len().saturating_sub(4)));
            }
            other => self.log.push(Op::Other(other)),
        }
    }
}

/// 模拟 flash 的句柄，可克隆；克隆共享同一器件状态
#[derive(Clone)]
pub(crate) struct SimFlash {
    state: Arc<Mutex<SimState>>,
}

impl core::fmt::Debug for SimFlash {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = self.state.lock();
        f.debug_struct("SimFlash")
            .field("size", &st.mem.len())
            .field("ops", &st.log.len())
            .field("violations", &st.violations)
            .finish()
    }
}

impl SimFlash {
    pub fn new(sector_size: usize, page_size: usize, sectors: usize) -> Self {
        let state = SimState {
            mem: vec![0xFF; sector_size * sectors],
            page_size,
            sector_size,
            sr2: Status2::empty(),
            wel: false,
            busy_reads: 0,
            stuck: false,
            program_busy: 1,
            erase_busy: 3,
            chip_busy: 5,
            fail_opcode: None,
            corrupt_program: false,
            log: Vec::new(),
            violations: Vec::new(),
            frame: Vec::new(),
            selected: false,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn for_config(config: &DiskConfig) -> Self {
        Self::new(
            config.flash_sector_size as usize,
            config.flash_page_size as usize,
            config.flash_sector_count as usize,
        )
    }

    pub fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock()
    }
}

impl Transport for SimFlash {
    fn select(&mut self) -> Result<()> {
        let mut st = self.state.lock();
        if st.selected {
            st.violations.push("nested select");
        }
        st.selected = true;
        st.frame.clear();
        Ok(())
    }

    fn deselect(&mut self) -> Result<()> {
        let mut st = self.state.lock();
        st.selected = false;
        let frame = core::mem::take(&mut st.frame);
        st.execute(&frame);
        Ok(())
    }

    fn transfer(&mut self, byte: u8) -> Result<u8> {
        let mut st = self.state.lock();
        if !st.selected {
            st.violations.push("transfer without select");
            return Err(Error::new(ErrorKind::Io, "bus not selected"));
        }
        let opcode = st.frame.first().copied().unwrap_or(byte);
        if st.fail_opcode == Some(opcode) {
            st.frame.clear();
            return Err(Error::new(ErrorKind::Io, "injected transport failure"));
        }
        st.frame.push(byte);
        let len = st.frame.len();
        let reply = match opcode {
            command::READ_STATUS_REGISTER_1 if len >= 2 => st.status1(),
            command::READ_STATUS_REGISTER_2 if len >= 2 => st.sr2.bits(),
            command::READ_DATA if len > 4 => {
                let base = frame_address(&st.frame).unwrap_or(0) as usize;
                let mem_len = st.mem.len();
                st.mem[(base + len - 5) % mem_len]
            }
            _ => 0xFF,
        };
        Ok(reply)
    }
}
