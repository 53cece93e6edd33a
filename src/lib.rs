//! 可断点续传的分片下载引擎
//!
//! 把一个 HTTP 下载拆成多个字节区间分片并发传输，支持暂停/恢复、
//! 失败自动重试、跨进程重启续传。核心入口是 [`DownloadManager`]：
//!
//! ```no_run
//! use resumable_downloader::{DownloadManager, Request};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let manager = DownloadManager::builder("downloads").build()?;
//! let download = manager.download(
//!     Request::builder("https://example.com/big.bin").build(),
//! );
//! download.pause();
//! download.start();
//! # Ok(())
//! # }
//! ```
//!
//! 并发模型：
//! - 每个下载的状态变更在自己的串行动作队列里执行
//! - 全局准入信号量限制同时活跃的下载数
//! - 全局分片工作池限制同时传输的分片数

pub mod config;
pub mod download;
pub mod error;
pub mod logging;
pub mod persist;
pub mod request;
pub mod transport;
pub mod util;

pub use config::{DownloadConfig, EngineConfig, LogConfig};
pub use download::chunk::{Chunk, FixedCountSplitter, Splitter};
pub use download::download::Download;
pub use download::info::{DownloadInfo, InitInfo, RangeInfo};
pub use download::listener::{ChunkDownloadListener, DownloadListener, ManagerListener};
pub use download::manager::{DownloadManager, DownloadManagerBuilder};
pub use download::retry::{RetryPolicy, SimpleRetryPolicy};
pub use download::status::{ChunkDownloadStatus, DownloadStatus};
pub use error::DownloadError;
pub use logging::{init_logging, LogGuard};
pub use persist::{DownloadRecord, JsonFileAdapter, PersistAdapter};
pub use request::Request;
pub use transport::{ByteRange, HttpTransport, ProbeResult, Transport};
