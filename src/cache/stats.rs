//! 缓存统计信息
//!
//! 仅用于观测，不参与任何决策。

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// 读命中次数
    pub read_hits: u64,
    /// 读未命中次数
    pub read_misses: u64,
    /// 写命中次数
    pub write_hits: u64,
    /// 写未命中次数
    pub write_misses: u64,
    /// 从 flash 填充的行数
    pub fills: u64,
    /// 写回 flash 的行数
    pub writebacks: u64,
    /// 当前脏行数量
    pub dirty_lines: usize,
}

impl CacheStats {
    /// 总命中次数（读 + 写）
    pub fn hits(&self) -> u64 {
        self.read_hits + self.write_hits
    }

    /// 总未命中次数（读 + 写）
    pub fn misses(&self) -> u64 {
        self.read_misses + self.write_misses
    }

    /// 计算命中率
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}
