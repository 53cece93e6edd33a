//! 下载记录持久化
//!
//! 每次状态或进度落库都是整条记录全量覆盖。持久化失败只记日志，
//! 不回滚内存状态。

use crate::download::chunk::Chunk;
use crate::download::info::DownloadInfo;
use crate::download::status::{ChunkDownloadStatus, DownloadStatus};
use crate::request::Request;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod json;

pub use json::JsonFileAdapter;

/// 单个分片的持久化记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub status: ChunkDownloadStatus,
}

/// 一个下载的完整持久化记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub request: Request,
    pub status: DownloadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<DownloadInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<PathBuf>,
    #[serde(default)]
    pub chunks: Vec<ChunkRecord>,
}

impl DownloadRecord {
    /// 新登记的下载，只有请求本身
    pub fn new(request: Request) -> Self {
        Self {
            request,
            status: DownloadStatus::Idle,
            info: None,
            target_path: None,
            chunks: Vec::new(),
        }
    }
}

/// 持久化适配器
///
/// 读写都以 `Request::storage_key` 为记录键。实现必须可跨线程共享，
/// 调用方保证同一条记录的写入是串行的。
pub trait PersistAdapter: Send + Sync {
    /// 覆盖写入一条记录
    fn save(&self, record: &DownloadRecord) -> Result<()>;

    /// 删除一条记录（不存在视为成功）
    fn remove(&self, key: &str) -> Result<()>;

    /// 启动时加载全部记录
    fn load_all(&self) -> Result<Vec<DownloadRecord>>;
}
