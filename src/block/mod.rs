//! 块 I/O 适配层
//!
//! block/device.rs 定义存储管理器调用的块 I/O 契约 [`BlockIo`]（0 表示成功，负数为错误码）。
//!
//! block/io.rs 在 [`FlashDisk`](crate::FlashDisk) 上实现该契约：校验句柄签名和扇区范围，
//! 逻辑扇区到 flash 地址的换算交给缓存控制器。

mod device;
mod io;

pub use device::{status_code, BlockIo};
