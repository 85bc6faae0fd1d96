//! 磁盘生命周期
//!
//! [`DiskRegistry`] 按名字管理磁盘实例，负责与存储管理器之间的
//! 创建、挂载、发布和反向的销毁流程。
//!
//! 初始化中任何一步失败都会回滚已经完成的步骤（卸载、删除 IO manager、
//! 注销句柄），不会留下半注册的磁盘。

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::Arc;

use super::flash_disk::FlashDisk;
use super::manager::{IoManagerParams, PartitionParams, StorageManager};
use crate::block::BlockIo;
use crate::error::{Error, ErrorKind, Result};
use crate::flash::Transport;
use crate::types::DiskConfig;

/// 注册表中的磁盘及其在存储管理器中的进度
struct DiskEntry<T> {
    disk: Arc<FlashDisk<T>>,
    io_manager: bool,
    mounted: bool,
    published: bool,
}

/// 磁盘注册表
pub struct DiskRegistry<M, T> {
    manager: M,
    config: DiskConfig,
    disks: BTreeMap<String, DiskEntry<T>>,
}

impl<M: StorageManager, T: Transport + Send + 'static> DiskRegistry<M, T> {
    /// 创建注册表，之后创建的磁盘都使用 `config`
    pub fn new(manager: M, config: DiskConfig) -> Self {
        Self {
            manager,
            config,
            disks: BTreeMap::new(),
        }
    }

    /// 存储管理器
    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// 存储管理器（可变）
    pub fn manager_mut(&mut self) -> &mut M {
        &mut self.manager
    }

    /// 磁盘配置
    pub fn config(&self) -> &DiskConfig {
        &self.config
    }

    /// 按名字查找磁盘
    pub fn get(&self, name: &str) -> Option<Arc<FlashDisk<T>>> {
        self.disks.get(name).map(|entry| Arc::clone(&entry.disk))
    }

    /// 已注册的磁盘数量
    pub fn len(&self) -> usize {
        self.disks.len()
    }

    /// 是否没有磁盘
    pub fn is_empty(&self) -> bool {
        self.disks.is_empty()
    }

    /// 初始化磁盘
    ///
    /// 创建缓存和驱动，向存储管理器注册块 I/O 入口，
    /// 按需分区并格式化，然后挂载并以 `name` 发布。
    ///
    /// # 参数
    ///
    /// * `name` - 磁盘名（挂载路径）
    /// * `need_format` - 是否先分区并格式化
    /// * `transport` - 传输层；失败时随磁盘一起释放
    ///
    /// # 错误
    ///
    /// - `AlreadyExists` - 同名磁盘已存在
    /// - `ManagerCreation` - IO manager 创建失败
    /// - `Format` / `Mount` - 分区、格式化或挂载失败（保留管理器的错误码）
    pub fn init_disk(&mut self, name: &str, need_format: bool, transport: T) -> Result<Arc<FlashDisk<T>>> {
        if self.disks.contains_key(name) {
            return Err(Error::new(ErrorKind::AlreadyExists, "disk name already registered"));
        }

        let disk = FlashDisk::new(name, self.config, transport).map_err(|e| {
            log::error!("[REGISTRY] {}: disk creation failed: {}", name, e);
            e
        })?;
        let disk = Arc::new(disk);

        let params = IoManagerParams::from_config(&self.config);
        let io: Arc<dyn BlockIo + Send + Sync> = disk.clone();
        if let Err(e) = self.manager.create_io_manager(name, &params, io) {
            log::error!("[REGISTRY] {}: IO manager creation failed: {}", name, e);
            disk.retire();
            return Err(e.context(ErrorKind::ManagerCreation, "IO manager creation failed"));
        }

        let mut mounted = false;
        if let Err(e) = self.bring_up(name, need_format, &mut mounted) {
            log::error!("[REGISTRY] {}: init failed, rolling back: {}", name, e);
            self.roll_back(name, &disk, mounted);
            return Err(e);
        }

        self.disks.insert(
            String::from(name),
            DiskEntry {
                disk: Arc::clone(&disk),
                io_manager: true,
                mounted: true,
                published: true,
            },
        );
        log::info!("[REGISTRY] {}: mounted (format={})", name, need_format);
        Ok(disk)
    }

    fn bring_up(&mut self, name: &str, need_format: bool, mounted: &mut bool) -> Result<()> {
        let partition = self.config.partition_number;
        if need_format {
            let params = PartitionParams::from_config(&self.config);
            self.manager
                .partition(name, &params)
                .map_err(|e| e.context(ErrorKind::Format, "partition failed"))?;
            self.manager
                .format(name, partition)
                .map_err(|e| e.context(ErrorKind::Format, "format failed"))?;
        }
        self.manager
            .mount(name, partition)
            .map_err(|e| e.context(ErrorKind::Mount, "mount failed"))?;
        *mounted = true;
        self.manager.publish(name)
    }

    fn roll_back(&mut self, name: &str, disk: &FlashDisk<T>, mounted: bool) {
        if mounted {
            if let Err(e) = self.manager.unmount(name) {
                log::warn!("[REGISTRY] {}: rollback unmount failed: {}", name, e);
            }
        }
        if let Err(e) = self.manager.delete_io_manager(name) {
            log::warn!("[REGISTRY] {}: rollback IO manager deletion failed: {}", name, e);
        }
        disk.retire();
    }

    /// 销毁磁盘并取回传输层
    ///
    /// 依次卸载、写回缓存、撤销发布、删除 IO manager、注销句柄。
    /// 中途失败时磁盘保留在注册表中，已完成的步骤不会重复执行，可以重试。
    ///
    /// # 错误
    ///
    /// - `NotFound` - 磁盘不存在
    /// - `Busy` - 调用者仍持有磁盘的引用（此时磁盘已注销，传输层无法取回）
    pub fn destroy_disk(&mut self, name: &str) -> Result<T> {
        let entry = self
            .disks
            .get_mut(name)
            .ok_or(Error::new(ErrorKind::NotFound, "no such disk"))?;

        if entry.mounted {
            self.manager
                .unmount(name)
                .map_err(|e| e.context(ErrorKind::Mount, "unmount failed"))?;
            entry.mounted = false;
        }

        let written = entry.disk.flush()?;
        log::debug!("[REGISTRY] {}: flushed {} lines before release", name, written);

        if entry.published {
            self.manager.withdraw(name)?;
            entry.published = false;
        }
        if entry.io_manager {
            self.manager.delete_io_manager(name)?;
            entry.io_manager = false;
        }
        entry.disk.retire();

        let entry = self
            .disks
            .remove(name)
            .ok_or(Error::new(ErrorKind::NotFound, "no such disk"))?;
        match Arc::try_unwrap(entry.disk) {
            Ok(disk) => {
                log::info!("[REGISTRY] {}: destroyed", name);
                Ok(disk.into_transport())
            }
            Err(_) => {
                log::error!("[REGISTRY] {}: disk still referenced after destroy", name);
                Err(Error::new(ErrorKind::Busy, "disk still referenced"))
            }
        }
    }

    /// 重新分区并格式化
    ///
    /// 先销毁磁盘，再以格式化模式重新初始化。
    pub fn partition_and_format(&mut self, name: &str) -> Result<Arc<FlashDisk<T>>> {
        log::info!("[REGISTRY] {}: partition and format", name);
        let transport = self.destroy_disk(name)?;
        self.init_disk(name, true, transport)
    }
}
