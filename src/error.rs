//! 错误类型定义
//!
//! 提供 flash 磁盘各层（传输、协议驱动、缓存、适配层、生命周期）共用的错误类型。

use core::fmt;

use crate::consts::{EBUSY, EEXIST, EINVAL, EIO, ENODEV, ENOENT, ENOMEM, ERANGE, ETIMEDOUT};

/// flash 磁盘操作错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
    /// 外部协作者（存储管理器）给出的错误码，负数
    code: Option<i32>,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 传输层或 flash 命令失败
    Io,
    /// busy 轮询超过上限
    Timeout,
    /// 扇区请求越界
    OutOfBounds,
    /// 无效参数（配置、缓冲区长度、地址对齐）
    InvalidInput,
    /// 无效状态（非法的缓存行状态转换、已注销的磁盘句柄）
    InvalidState,
    /// 设备忙（整片擦除进行中、锁被占用）
    Busy,
    /// 内存分配失败
    NoMemory,
    /// 存储管理器（IO manager）创建失败
    ManagerCreation,
    /// 挂载失败
    Mount,
    /// 分区或格式化失败
    Format,
    /// 磁盘不存在
    NotFound,
    /// 磁盘已存在
    AlreadyExists,
}

impl Error {
    /// 创建新错误
    pub const fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message,
            code: None,
        }
    }

    /// 创建携带外部错误码的错误
    ///
    /// `code` 按约定为负数；传入正数时会被取反。
    pub const fn with_code(kind: ErrorKind, message: &'static str, code: i32) -> Self {
        let code = if code > 0 { -code } else { code };
        Self {
            kind,
            message,
            code: Some(code),
        }
    }

    /// 以新的类别和消息包装当前错误
    ///
    /// 用于把协作者返回的错误归类为 `Mount`、`Format` 等生命周期错误。
    /// 协作者给出的错误码原样保留；没有错误码时按新的类别映射。
    pub fn context(self, kind: ErrorKind, message: &'static str) -> Self {
        Self {
            kind,
            message,
            code: self.code,
        }
    }

    /// 获取错误类型
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// 获取错误消息
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// 转换为块 I/O 约定的负错误码
    pub fn errno(&self) -> i32 {
        if let Some(code) = self.code {
            return code;
        }
        let positive = match self.kind {
            ErrorKind::Io => EIO,
            ErrorKind::Timeout => ETIMEDOUT,
            ErrorKind::OutOfBounds => ERANGE,
            ErrorKind::InvalidInput | ErrorKind::InvalidState => EINVAL,
            ErrorKind::Busy => EBUSY,
            ErrorKind::NoMemory => ENOMEM,
            ErrorKind::ManagerCreation | ErrorKind::Mount | ErrorKind::Format => ENODEV,
            ErrorKind::NotFound => ENOENT,
            ErrorKind::AlreadyExists => EEXIST,
        };
        -positive
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{:?}: {} (code {})", self.kind, self.message, code),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;
