//! S25FL1xxK 串行 flash 命令集

use byteorder::{BigEndian, ByteOrder};

//=============================================================================
// 配置、状态、擦除、编程命令
//=============================================================================

/// 读状态寄存器 1
pub const READ_STATUS_REGISTER_1: u8 = 0x05;
/// 读状态寄存器 2
pub const READ_STATUS_REGISTER_2: u8 = 0x35;
/// 读状态寄存器 3
pub const READ_STATUS_REGISTER_3: u8 = 0x33;
/// 写使能
pub const WRITE_ENABLE: u8 = 0x06;
/// 易失性状态寄存器写使能
pub const WRITE_ENABLE_VOLATILE_SR: u8 = 0x50;
/// 写禁止
pub const WRITE_DISABLE: u8 = 0x04;
/// 写状态寄存器
pub const WRITE_STATUS_REGISTERS: u8 = 0x01;
/// 设置 burst wrap
pub const SET_BURST_WITH_WRAP: u8 = 0x77;
/// 设置块指针保护（S25FL132K / S25FL164K）
pub const SET_BLOCK_POINTER_PROTECTION: u8 = 0x39;
/// 页编程
pub const PAGE_PROGRAM: u8 = 0x02;
/// 扇区擦除（4 KiB）
pub const SECTOR_ERASE: u8 = 0x20;
/// 块擦除（64 KiB）
pub const BLOCK_ERASE: u8 = 0xD8;
/// 整片擦除（也可用 0x60）
pub const CHIP_ERASE: u8 = 0xC7;
/// 擦除/编程挂起
pub const ERASE_PROGRAM_SUSPEND: u8 = 0x75;
/// 擦除/编程恢复
pub const ERASE_PROGRAM_RESUME: u8 = 0x7A;

//=============================================================================
// 读命令
//=============================================================================

/// 读数据
pub const READ_DATA: u8 = 0x03;
/// 快速读
pub const FAST_READ: u8 = 0x0B;
/// 双线输出快速读
pub const FAST_READ_DUAL_OUTPUT: u8 = 0x3B;
/// 四线输出快速读
pub const FAST_READ_QUAD_OUTPUT: u8 = 0x6B;
/// 双线 IO 快速读
pub const FAST_READ_DUAL_IO: u8 = 0xBB;
/// 四线 IO 快速读
pub const FAST_READ_QUAD_IO: u8 = 0xEB;
/// 连续读模式复位
pub const CONTINUOUS_READ_MODE_RESET: u8 = 0xFF;

//=============================================================================
// 复位命令
//=============================================================================

/// 软件复位使能
pub const SOFTWARE_RESET_ENABLE: u8 = 0x66;
/// 软件复位
pub const SOFTWARE_RESET: u8 = 0x99;

/// 命令头：操作码 + 24 位大端地址
pub fn address_frame(opcode: u8, addr: u32) -> [u8; 4] {
    let mut raw = [0u8; 4];
    BigEndian::write_u32(&mut raw, addr);
    [opcode, raw[1], raw[2], raw[3]]
}

/// 解析命令头中的 24 位地址
pub fn frame_address(frame: &[u8]) -> Option<u32> {
    if frame.len() < 4 {
        return None;
    }
    Some(BigEndian::read_u24(&frame[1..4]))
}

/// 操作码是否会修改 flash 内容或状态寄存器（需要先写使能）
pub fn is_mutating(opcode: u8) -> bool {
    matches!(
        opcode,
        PAGE_PROGRAM | SECTOR_ERASE | BLOCK_ERASE | CHIP_ERASE | WRITE_STATUS_REGISTERS
    )
}
