//! 下载状态机
//!
//! 模块划分：
//! - `status` / `info` / `chunk`：状态与数据模型
//! - `chunk_download`：单分片传输
//! - `download`：单下载状态机（串行动作队列）
//! - `manager`：注册表、准入与全局资源
//! - `retry` / `listener`：重试策略与事件监听

pub mod chunk;
pub mod chunk_download;
pub mod download;
pub mod info;
pub mod listener;
pub mod manager;
pub mod retry;
pub mod status;

use crate::download::chunk::Splitter;
use crate::download::retry::RetryPolicy;
use crate::persist::PersistAdapter;
use crate::transport::Transport;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// 全局共享的引擎资源
///
/// 由管理器构建，所有下载通过 `Arc` 共享：
/// - `admission` 限制同时活跃的下载数
/// - `chunk_pool` 限制同时传输的分片数（跨下载共享）
pub(crate) struct EngineCtx {
    pub transport: Arc<dyn Transport>,
    pub persist: Arc<dyn PersistAdapter>,
    pub splitter: Arc<dyn Splitter>,
    pub retry: Arc<dyn RetryPolicy>,
    pub admission: Arc<Semaphore>,
    pub chunk_pool: Arc<Semaphore>,
    pub default_dir: PathBuf,
}
