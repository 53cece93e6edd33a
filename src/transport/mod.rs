//! 传输层抽象
//!
//! 引擎通过 `Transport` 与服务端交互：一次元数据探测加若干次字节流
//! 拉取。生产实现基于 `reqwest`，测试里可以替换为内存实现。

use crate::download::info::{InitInfo, RangeInfo};
use crate::error::DownloadError;
use crate::request::Request;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

mod http;

pub use http::HttpTransport;

/// 服务端元数据探测结果
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub init_info: InitInfo,
    pub range_info: RangeInfo,
}

/// 一次字节流拉取的请求区间
///
/// `start`/`end` 为闭区间；均为 `None` 表示全量拉取。恢复时
/// `start` 已跳过本地已有字节，`end` 仍为分片原始终点。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn full() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn from_to(start: u64, end: u64) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }
}

/// 下载传输通道
#[async_trait]
pub trait Transport: Send + Sync {
    /// 探测文件元数据与 Range 支持情况
    async fn probe(&self, request: &Request) -> Result<ProbeResult, DownloadError>;

    /// 打开一条字节流
    async fn open_stream(
        &self,
        request: &Request,
        range: ByteRange,
    ) -> Result<BoxStream<'static, Result<Bytes, DownloadError>>, DownloadError>;
}
