//! 传输层接口
//!
//! 只描述"片选 / 收发一个字节"这一层，物理线路协议（SPI 外设、bit-banging）
//! 由实现者负责。

use crate::error::Result;

/// 串行传输接口
///
/// 实现此 trait 以提供底层字节收发。一次命令帧总是以 `select()` 开始、
/// `deselect()` 结束，flash 器件在片选拉高时执行命令。
///
/// # 示例
///
/// ```rust,ignore
/// use spiflash_core::{Transport, Result};
///
/// struct BitBang { /* GPIO 句柄 */ }
///
/// impl Transport for BitBang {
///     fn select(&mut self) -> Result<()> {
///         // CS 拉低
///         Ok(())
///     }
///
///     fn deselect(&mut self) -> Result<()> {
///         // CS 拉高
///         Ok(())
///     }
///
///     fn transfer(&mut self, byte: u8) -> Result<u8> {
///         // 同时移出 byte、移入一个字节
///         Ok(0xFF)
///     }
/// }
/// ```
pub trait Transport {
    /// 片选有效（开始命令帧）
    fn select(&mut self) -> Result<()>;

    /// 片选无效（结束命令帧）
    fn deselect(&mut self) -> Result<()>;

    /// 发送一个字节并返回同时收到的字节
    fn transfer(&mut self, byte: u8) -> Result<u8>;

    /// 发送一串字节，丢弃收到的内容
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        for &b in bytes {
            self.transfer(b)?;
        }
        Ok(())
    }

    /// 读取字节到缓冲区（发送 0xFF 作为填充）
    fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        for b in buf.iter_mut() {
            *b = self.transfer(0xFF)?;
        }
        Ok(())
    }

    /// busy 轮询之间的退避
    ///
    /// 在协作式调度器上应让出 CPU。默认实现只做自旋提示。
    fn delay_us(&mut self, _us: u32) {
        core::hint::spin_loop();
    }
}

/// 在一个命令帧内执行 `f`
///
/// 无论 `f` 是否成功都会结束片选；`f` 的错误优先返回。
pub(crate) fn transaction<T, R>(bus: &mut T, f: impl FnOnce(&mut T) -> Result<R>) -> Result<R>
where
    T: Transport + ?Sized,
{
    bus.select()?;
    let result = f(bus);
    let released = bus.deselect();
    let value = result?;
    released?;
    Ok(value)
}
