//! 状态寄存器位定义

use bitflags::bitflags;

bitflags! {
    /// 状态寄存器 1（命令 0x05）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status1: u8 {
        /// 擦除/编程/写状态寄存器进行中
        const BUSY = 0x01;
        /// 写使能锁存
        const WEL  = 0x02;
        /// 块保护位 0
        const BP0  = 0x04;
        /// 块保护位 1
        const BP1  = 0x08;
        /// 块保护位 2
        const BP2  = 0x10;
        /// 顶部/底部保护
        const TB   = 0x20;
        /// 扇区/块保护
        const SEC  = 0x40;
        /// 状态寄存器保护 0
        const SRP0 = 0x80;
    }
}

bitflags! {
    /// 状态寄存器 2（命令 0x35）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status2: u8 {
        /// 状态寄存器保护 1
        const SRP1 = 0x01;
        /// 四线使能
        const QE   = 0x02;
        /// 安全寄存器锁定位 1
        const LB1  = 0x08;
        /// 安全寄存器锁定位 2
        const LB2  = 0x10;
        /// 安全寄存器锁定位 3
        const LB3  = 0x20;
        /// 保护补码
        const CMP  = 0x40;
        /// 擦除/编程挂起
        const SUS  = 0x80;
    }
}

impl Status1 {
    /// 器件是否忙
    pub fn is_busy(self) -> bool {
        self.contains(Status1::BUSY)
    }

    /// 写使能锁存是否置位
    pub fn write_enabled(self) -> bool {
        self.contains(Status1::WEL)
    }
}
