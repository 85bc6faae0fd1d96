//! flash 磁盘实例
//!
//! 一个 [`FlashDisk`] 拥有一个协议驱动和一份缓存，二者放在同一把
//! `spin::Mutex` 之后：持有锁即拥有总线。每个入口只加锁一次，
//! 内部函数都接收 `&mut`，不存在重入。
//!
//! 整片擦除发出后立即返回。擦除期间普通读写和同步返回 `Busy`，
//! [`FlashDisk::is_chip_erase_in_progress`] 不阻塞，可以在其它线程持锁时调用。

use alloc::string::String;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use spin::{Mutex, MutexGuard};

use crate::cache::{CacheController, CacheStats};
use crate::consts::DISK_SIGNATURE;
use crate::error::{Error, ErrorKind, Result};
use crate::flash::{FlashCounters, FlashDriver, Transport};
use crate::types::{CacheStamp, DiskConfig};

/// 锁保护的磁盘状态
pub(crate) struct DiskInner<T> {
    pub(crate) driver: FlashDriver<T>,
    pub(crate) cache: CacheController,
}

/// flash 磁盘
pub struct FlashDisk<T> {
    name: String,
    config: DiskConfig,
    signature: AtomicU32,
    chip_erase_pending: AtomicBool,
    inner: Mutex<DiskInner<T>>,
}

impl<T: Transport> FlashDisk<T> {
    /// 创建磁盘：校验配置、分配缓存、初始化器件
    ///
    /// # 参数
    ///
    /// * `name` - 磁盘名（挂载路径）
    /// * `config` - 磁盘配置
    /// * `transport` - 传输层
    ///
    /// # 错误
    ///
    /// - `InvalidInput` - 配置无效
    /// - `NoMemory` - 缓存分配失败
    /// - `Io` / `Timeout` - 器件初始化失败
    pub fn new(name: &str, config: DiskConfig, transport: T) -> Result<Self> {
        config.validate()?;
        let cache = CacheController::new(&config)?;
        let mut driver = FlashDriver::new(transport, &config);
        driver.init(config.quad_enable)?;

        log::info!(
            "[DISK] {}: {} sectors x {} bytes, {} cache lines ({} reserved)",
            name,
            config.logical_sector_count(),
            config.logical_sector_size,
            config.cache_lines,
            config.reserved_lines
        );

        Ok(Self {
            name: String::from(name),
            config,
            signature: AtomicU32::new(DISK_SIGNATURE),
            chip_erase_pending: AtomicBool::new(false),
            inner: Mutex::new(DiskInner { driver, cache }),
        })
    }

    /// 磁盘名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 磁盘配置
    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    /// 逻辑扇区总数
    pub fn sector_count(&self) -> u32 {
        self.config.logical_sector_count()
    }

    /// 句柄是否有效（未被注销）
    pub fn is_valid(&self) -> bool {
        self.signature.load(Ordering::Acquire) == DISK_SIGNATURE
    }

    pub(crate) fn check_signature(&self) -> Result<()> {
        if !self.is_valid() {
            log::error!("[DISK] {}: bad disk signature", self.name);
            return Err(Error::new(ErrorKind::InvalidState, "disk handle retired"));
        }
        Ok(())
    }

    /// 注销句柄，之后的读写都会失败
    pub(crate) fn retire(&self) {
        self.signature.store(0, Ordering::Release);
    }

    /// 获取锁并确认没有未完成的整片擦除
    pub(crate) fn lock_idle(&self) -> Result<MutexGuard<'_, DiskInner<T>>> {
        let mut inner = self.inner.lock();
        self.settle_chip_erase(&mut inner)?;
        Ok(inner)
    }

    fn settle_chip_erase(&self, inner: &mut DiskInner<T>) -> Result<()> {
        if !self.chip_erase_pending.load(Ordering::Acquire) {
            return Ok(());
        }
        if inner.driver.is_chip_erase_in_progress()? {
            return Err(Error::new(ErrorKind::Busy, "chip erase in progress"));
        }
        self.chip_erase_pending.store(false, Ordering::Release);
        Ok(())
    }

    /// 写回时间戳不大于 `older_than` 的脏行
    ///
    /// 不等待锁：其它线程正在访问磁盘时返回 `Busy`。
    ///
    /// # 返回
    ///
    /// 写回的行数
    pub fn sync_cache(&self, older_than: CacheStamp) -> Result<usize> {
        self.check_signature()?;
        let mut inner = self
            .inner
            .try_lock()
            .ok_or(Error::new(ErrorKind::Busy, "disk lock contended"))?;
        self.settle_chip_erase(&mut inner)?;
        let DiskInner { driver, cache } = &mut *inner;
        cache.sync(driver, older_than)
    }

    /// 写回所有脏行
    pub fn flush(&self) -> Result<usize> {
        self.check_signature()?;
        let mut inner = self.lock_idle()?;
        let DiskInner { driver, cache } = &mut *inner;
        cache.flush_all(driver)
    }

    /// 整片擦除（不等待完成）
    ///
    /// 擦除后 flash 内容全部为 0xFF，缓存内容随之作废（不写回）。
    pub fn chip_erase(&self) -> Result<()> {
        self.check_signature()?;
        let mut inner = self.lock_idle()?;
        inner.driver.chip_erase()?;
        inner.cache.reset();
        self.chip_erase_pending.store(true, Ordering::Release);
        log::info!("[DISK] {}: chip erase started", self.name);
        Ok(())
    }

    /// 整片擦除是否仍在进行
    ///
    /// 没有发出过擦除时直接返回 `false`；锁被占用或状态读取失败时
    /// 保守地返回 `true`。
    pub fn is_chip_erase_in_progress(&self) -> bool {
        if !self.chip_erase_pending.load(Ordering::Acquire) {
            return false;
        }
        let Some(mut inner) = self.inner.try_lock() else {
            return true;
        };
        match inner.driver.is_chip_erase_in_progress() {
            Ok(true) => true,
            Ok(false) => {
                self.chip_erase_pending.store(false, Ordering::Release);
                log::info!("[DISK] {}: chip erase finished", self.name);
                false
            }
            Err(e) => {
                log::warn!("[DISK] {}: status read failed during chip erase: {}", self.name, e);
                true
            }
        }
    }

    /// 缓存统计信息
    pub fn cache_stats(&self) -> CacheStats {
        self.inner.lock().cache.stats()
    }

    /// 当前缓存时间戳
    pub fn current_stamp(&self) -> CacheStamp {
        self.inner.lock().cache.current_stamp()
    }

    /// 驱动统计信息
    pub fn flash_counters(&self) -> FlashCounters {
        self.inner.lock().driver.counters()
    }

    /// 销毁磁盘并取回传输层（不写回缓存）
    pub fn into_transport(self) -> T {
        self.inner.into_inner().driver.into_bus()
    }
}

impl<T> core::fmt::Debug for FlashDisk<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlashDisk")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("chip_erase_pending", &self.chip_erase_pending)
            .finish()
    }
}
