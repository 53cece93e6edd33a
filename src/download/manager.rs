//! 下载管理器
//!
//! 进程内唯一入口：持有注册表与全局资源（准入信号量、分片工作池、
//! 传输通道、持久化适配器），按请求值去重，启动时从持久化记录恢复。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::download::chunk::{FixedCountSplitter, Splitter};
use crate::download::download::Download;
use crate::download::listener::{Listeners, ManagerListener};
use crate::download::retry::{RetryPolicy, SimpleRetryPolicy};
use crate::download::status::DownloadStatus;
use crate::download::EngineCtx;
use crate::persist::{DownloadRecord, JsonFileAdapter, PersistAdapter};
use crate::request::Request;
use crate::transport::{HttpTransport, Transport};

/// 默认最大并发下载数
const DEFAULT_MAX_CONCURRENT: usize = 5;
/// 默认分片工作池大小（跨下载共享）
const DEFAULT_CHUNK_POOL: usize = 6;
/// 默认重试预算
const DEFAULT_RETRY_BUDGET: u32 = 0;
/// 默认持久化记录子目录
const RECORD_DIR: &str = ".records";

/// `DownloadManager` 构建器
pub struct DownloadManagerBuilder {
    default_dir: PathBuf,
    transport: Option<Arc<dyn Transport>>,
    persist: Option<Arc<dyn PersistAdapter>>,
    splitter: Arc<dyn Splitter>,
    retry: Arc<dyn RetryPolicy>,
    max_concurrent_downloads: usize,
    chunk_pool_size: usize,
}

impl DownloadManagerBuilder {
    /// `default_dir` 为未指定目标目录的下载的落盘目录
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_dir: default_dir.into(),
            transport: None,
            persist: None,
            splitter: Arc::new(FixedCountSplitter::default()),
            retry: Arc::new(SimpleRetryPolicy::new(DEFAULT_RETRY_BUDGET)),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT,
            chunk_pool_size: DEFAULT_CHUNK_POOL,
        }
    }

    /// 按配置文件构建
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.download.download_dir.clone())
            .splitter(Arc::new(FixedCountSplitter::new(config.download.split_count)))
            .retry_policy(Arc::new(SimpleRetryPolicy::new(config.download.max_retries)))
            .max_concurrent_downloads(config.download.max_concurrent_downloads)
            .chunk_pool_size(config.download.chunk_pool_size)
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn persist(mut self, persist: Arc<dyn PersistAdapter>) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn splitter(mut self, splitter: Arc<dyn Splitter>) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn retry_policy(mut self, retry: Arc<dyn RetryPolicy>) -> Self {
        self.retry = retry;
        self
    }

    /// 同时处于活跃状态的下载上限，配置传 0 时按 1 处理
    pub fn max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max.max(1);
        self
    }

    /// 同时传输的分片上限（所有下载共享），配置传 0 时按 1 处理
    pub fn chunk_pool_size(mut self, size: usize) -> Self {
        self.chunk_pool_size = size.max(1);
        self
    }

    /// 构建管理器并从持久化记录恢复
    ///
    /// 恢复时中间态归位为空闲；暂停前正在进行的下载（按持久化里的
    /// 归一化前状态判断）自动重新启动。必须在 tokio 运行时内调用。
    pub fn build(self) -> Result<DownloadManager> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpTransport::new()?),
        };
        let persist: Arc<dyn PersistAdapter> = match self.persist {
            Some(p) => p,
            None => Arc::new(JsonFileAdapter::new(self.default_dir.join(RECORD_DIR))),
        };

        let ctx = Arc::new(EngineCtx {
            transport,
            persist,
            splitter: self.splitter,
            retry: self.retry,
            admission: Arc::new(Semaphore::new(self.max_concurrent_downloads)),
            chunk_pool: Arc::new(Semaphore::new(self.chunk_pool_size)),
            default_dir: self.default_dir,
        });

        let manager = DownloadManager {
            ctx,
            registry: Mutex::new(Vec::new()),
            listeners: Listeners::default(),
        };
        manager.restore()?;
        Ok(manager)
    }
}

/// 下载管理器
///
/// 注册表按请求值去重，同一请求始终对应同一个下载；列表保持
/// 登记顺序。
pub struct DownloadManager {
    ctx: Arc<EngineCtx>,
    registry: Mutex<Vec<Download>>,
    listeners: Listeners<dyn ManagerListener>,
}

impl DownloadManager {
    pub fn builder(default_dir: impl Into<PathBuf>) -> DownloadManagerBuilder {
        DownloadManagerBuilder::new(default_dir)
    }

    /// 登记请求并启动
    ///
    /// 请求已存在时是空操作，直接返回现有下载：重复入队不会惊扰
    /// 已被暂停或处于错误态的下载。
    pub fn download(&self, request: Request) -> Download {
        let (download, created) = self.register(request);
        if created {
            download.start();
        }
        download
    }

    /// 登记请求但不启动，已存在时直接复用
    pub fn add(&self, request: Request) -> Download {
        self.register(request).0
    }

    fn register(&self, request: Request) -> (Download, bool) {
        let mut registry = self.registry.lock();
        if let Some(existing) = registry.iter().find(|d| *d.request() == request) {
            return (existing.clone(), false);
        }
        debug!("登记新下载: {}", request.url());
        let download = Download::new(request, Arc::clone(&self.ctx));
        registry.push(download.clone());
        drop(registry);

        // 先落一条初始记录，崩溃后也能在注册表里看到它
        let record = DownloadRecord::new(download.request().clone());
        if let Err(e) = self.ctx.persist.save(&record) {
            warn!("持久化初始记录失败 {}: {:#}", download.request().url(), e);
        }
        self.listeners
            .notify(|l| l.on_download_created(download.request()));
        (download, true)
    }

    pub fn add_listener(&self, listener: Arc<dyn ManagerListener>) {
        self.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ManagerListener>) {
        self.listeners.remove(listener);
    }

    /// 按请求查找已登记的下载
    pub fn get(&self, request: &Request) -> Option<Download> {
        self.registry
            .lock()
            .iter()
            .find(|d| d.request() == request)
            .cloned()
    }

    /// 全部下载（登记顺序）
    pub fn downloads(&self) -> Vec<Download> {
        self.registry.lock().clone()
    }

    /// 启动指定下载
    pub fn start(&self, request: &Request) {
        if let Some(download) = self.get(request) {
            download.start();
        }
    }

    /// 暂停指定下载
    pub fn pause(&self, request: &Request) {
        if let Some(download) = self.get(request) {
            download.pause();
        }
    }

    /// 暂停全部下载
    pub fn pause_all(&self) {
        for download in self.downloads() {
            download.pause();
        }
    }

    /// 启动全部未完成下载
    pub fn start_all(&self) {
        for download in self.downloads() {
            download.start();
        }
    }

    /// 删除下载：出注册表、删持久化记录、删分片与合并临时文件
    ///
    /// 已合并完成的目标文件不动。
    pub fn delete(&self, request: &Request) {
        let removed = {
            let mut registry = self.registry.lock();
            match registry.iter().position(|d| d.request() == request) {
                Some(pos) => Some(registry.remove(pos)),
                None => None,
            }
        };
        let Some(download) = removed else { return };

        download.pause();
        let key = download.request().storage_key();
        if let Err(e) = self.ctx.persist.remove(&key) {
            warn!("删除持久化记录失败 {}: {:#}", request.url(), e);
        }
        self.ctx.retry.reset(&key);
        download.remove_local_files();
        self.listeners
            .notify(|l| l.on_download_destroyed(request));
        info!("已删除下载: {}", request.url());
    }

    /// 暂停全部下载并等待它们静止
    pub async fn shutdown(&self) {
        self.pause_all();
        for download in self.downloads() {
            while !download.status().is_quiescent() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
        info!("下载管理器已停机");
    }

    /// 从持久化记录重建注册表
    fn restore(&self) -> Result<()> {
        let records = self.ctx.persist.load_all()?;
        if records.is_empty() {
            return Ok(());
        }
        info!("从持久化记录恢复 {} 个下载", records.len());

        let mut registry = self.registry.lock();
        let mut to_start = Vec::new();
        for record in records {
            // 归一化前的状态决定是否自动续传：上次退出时仍在推进的
            // 下载恢复后继续跑，主动暂停或已完成的保持原样
            let auto_resume = !matches!(
                record.status,
                DownloadStatus::Idle | DownloadStatus::Complete
            );
            let download = Download::from_record(record, Arc::clone(&self.ctx));
            registry.push(download.clone());
            if auto_resume {
                to_start.push(download);
            }
        }
        drop(registry);

        for download in to_start {
            debug!("自动恢复下载: {}", download.request().url());
            download.start();
        }
        Ok(())
    }
}
