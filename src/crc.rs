//! CRC32 校验和计算
//!
//! 用于编程后回读校验：比较写入数据与回读数据的校验和。

use crc32fast::Hasher;

/// 计算 CRC32 校验和（一次性计算）
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// 计算 CRC32 校验和（追加模式）
///
/// 以 0 为初值开始，依次追加各段数据，结果与一次性计算整段数据相同。
#[inline]
pub fn checksum_append(crc: u32, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new_with_initial(crc);
    hasher.update(data);
    hasher.finalize()
}
