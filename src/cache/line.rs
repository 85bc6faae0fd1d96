//! 缓存行结构
//!
//! 行状态是一个显式状态机，非法转换返回 `InvalidState`：
//!
//! ```text
//! Invalid ──bind──▶ Incompatible ──fill──▶ Valid ──write──▶ Modified
//!                        │                   ▲                 │
//!                        └──full overwrite───┼────────────────▶│
//!                                            └──────flush──────┘
//! ```
//!
//! `Incompatible` 表示行已绑定 tag，但数据与 flash 不一致（尚未填充或填充失败）。

use alloc::vec::Vec;

use crate::error::{Error, ErrorKind, Result};
use crate::types::CacheStamp;

/// 缓存行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineState {
    /// 未使用
    #[default]
    Invalid,
    /// 与 flash 一致
    Valid,
    /// 已修改，尚未写回
    Modified,
    /// 已绑定 tag，数据不可用
    Incompatible,
}

impl LineState {
    /// 数据可直接命中
    pub fn is_resident(self) -> bool {
        matches!(self, LineState::Valid | LineState::Modified)
    }

    /// 可以直接复用，无需驱逐
    pub fn is_free(self) -> bool {
        matches!(self, LineState::Invalid | LineState::Incompatible)
    }
}

/// 缓存行
pub struct CacheLine {
    tag: Option<u32>,
    state: LineState,
    last_used: CacheStamp,
    data: Vec<u8>,
}

impl core::fmt::Debug for CacheLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CacheLine")
            .field("tag", &self.tag)
            .field("state", &self.state)
            .field("last_used", &self.last_used)
            .field("data_len", &self.data.len())
            .finish()
    }
}

impl CacheLine {
    /// 创建空行，数据缓冲区在此一次性分配
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self {
            tag: None,
            state: LineState::Invalid,
            last_used: 0,
            data,
        }
    }

    /// 当前 tag
    pub fn tag(&self) -> Option<u32> {
        self.tag
    }

    /// 当前状态
    pub fn state(&self) -> LineState {
        self.state
    }

    /// 最近使用时间戳
    pub fn last_used(&self) -> CacheStamp {
        self.last_used
    }

    /// 行数据
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// 是否持有 `tag` 的有效数据
    pub fn holds(&self, tag: u32) -> bool {
        self.tag == Some(tag) && self.state.is_resident()
    }

    pub(crate) fn set_last_used(&mut self, stamp: CacheStamp) {
        self.last_used = stamp;
    }

    /// 绑定新 tag，数据待填充
    ///
    /// 已修改的行必须先写回。
    pub(crate) fn bind(&mut self, tag: u32) -> Result<()> {
        if self.state == LineState::Modified {
            return Err(Error::new(ErrorKind::InvalidState, "rebinding a modified line"));
        }
        self.tag = Some(tag);
        self.state = LineState::Incompatible;
        Ok(())
    }

    /// 供填充使用的数据缓冲区
    pub(crate) fn fill_buffer(&mut self) -> Result<&mut [u8]> {
        if self.state != LineState::Incompatible {
            return Err(Error::new(ErrorKind::InvalidState, "fill on unbound line"));
        }
        Ok(&mut self.data)
    }

    /// 填充成功
    pub(crate) fn mark_filled(&mut self) -> Result<()> {
        if self.state != LineState::Incompatible {
            return Err(Error::new(ErrorKind::InvalidState, "fill completed on unbound line"));
        }
        self.state = LineState::Valid;
        Ok(())
    }

    /// 写回成功
    pub(crate) fn mark_flushed(&mut self) -> Result<()> {
        if self.state != LineState::Modified {
            return Err(Error::new(ErrorKind::InvalidState, "flush completed on clean line"));
        }
        self.state = LineState::Valid;
        Ok(())
    }

    /// 把 `src` 写入行内 `offset` 处并标记为已修改
    ///
    /// 覆盖整行时允许从 `Incompatible` 直接进入 `Modified`（无需先填充）。
    pub(crate) fn store(&mut self, offset: usize, src: &[u8]) -> Result<()> {
        let full = offset == 0 && src.len() == self.data.len();
        let allowed = match self.state {
            LineState::Valid | LineState::Modified => true,
            LineState::Incompatible => full,
            LineState::Invalid => false,
        };
        if !allowed {
            return Err(Error::new(ErrorKind::InvalidState, "write to line without data"));
        }
        self.data[offset..offset + src.len()].copy_from_slice(src);
        self.state = LineState::Modified;
        Ok(())
    }

    /// 从行内 `offset` 处读出到 `dst`
    pub(crate) fn load(&self, offset: usize, dst: &mut [u8]) -> Result<()> {
        if !self.state.is_resident() {
            return Err(Error::new(ErrorKind::InvalidState, "read from line without data"));
        }
        dst.copy_from_slice(&self.data[offset..offset + dst.len()]);
        Ok(())
    }

    /// 复位为空行（不写回）
    pub(crate) fn reset(&mut self) {
        self.tag = None;
        self.state = LineState::Invalid;
        self.last_used = 0;
    }
}
