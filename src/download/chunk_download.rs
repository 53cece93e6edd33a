//! 分片传输执行
//!
//! 一个 `ChunkDownload` 负责把单个分片的字节流落到分片文件。启动前
//! 先检查分片文件现状决定续传计划，传输中通过取消令牌响应暂停，
//! 暂停后分片文件长度即已落盘字节数，不会再写入任何字节。

use crate::download::chunk::Chunk;
use crate::error::DownloadError;
use crate::request::Request;
use crate::transport::{ByteRange, Transport};
use futures::StreamExt;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 进度批量上报阈值（字节）
const PROGRESS_THRESHOLD: u64 = 24 * 1024;

/// 续传计划
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePlan {
    /// 分片文件已完整，无需网络请求
    AlreadyComplete { credit: u64 },
    /// 需要从 `start` 拉取，`credit` 为本地已有可保留字节数
    Fetch {
        start: Option<u64>,
        credit: u64,
        append: bool,
    },
}

/// 一次传输的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// 分片全部落盘
    Finished,
    /// 被暂停中断，已落盘字节保留
    Paused,
}

/// 单个分片的传输执行器
pub struct ChunkDownload {
    request: Request,
    chunk: Chunk,
    transport: Arc<dyn Transport>,
}

impl ChunkDownload {
    pub fn new(request: Request, chunk: Chunk, transport: Arc<dyn Transport>) -> Self {
        Self {
            request,
            chunk,
            transport,
        }
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    /// 根据分片文件现状决定续传计划
    ///
    /// 有区间分片按文件长度跳过已有字节；文件比区间还长说明是陈旧
    /// 残留，删掉重来。无区间分片无法定位断点，总是从头覆盖。
    pub fn plan_resume(&self) -> Result<ResumePlan, DownloadError> {
        let part_len = match std::fs::metadata(&self.chunk.part_path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(DownloadError::filesystem(format!(
                    "读取分片文件信息失败 {:?}: {}",
                    self.chunk.part_path, e
                )))
            }
        };

        match self.chunk.size() {
            Some(size) if part_len == size => Ok(ResumePlan::AlreadyComplete { credit: size }),
            Some(size) if part_len > size => {
                warn!(
                    "分片文件超出区间长度({} > {}), 视为陈旧残留重新下载: {:?}",
                    part_len, size, self.chunk.part_path
                );
                std::fs::remove_file(&self.chunk.part_path).map_err(|e| {
                    DownloadError::filesystem(format!(
                        "删除陈旧分片文件失败 {:?}: {}",
                        self.chunk.part_path, e
                    ))
                })?;
                Ok(ResumePlan::Fetch {
                    start: self.chunk.start,
                    credit: 0,
                    append: false,
                })
            }
            Some(_) => Ok(ResumePlan::Fetch {
                start: self.chunk.start.map(|s| s + part_len),
                credit: part_len,
                append: part_len > 0,
            }),
            None => Ok(ResumePlan::Fetch {
                start: None,
                credit: 0,
                append: false,
            }),
        }
    }

    /// 执行传输直到分片完成或被暂停
    ///
    /// `progress` 收到的是该分片当前累计落盘字节数，按阈值批量
    /// 上报，结束时总会补报一次最终值。
    pub async fn run(
        &self,
        pause: &CancellationToken,
        progress: &(dyn Fn(u64) + Send + Sync),
    ) -> Result<TransferOutcome, DownloadError> {
        let (start, credit, append) = match self.plan_resume()? {
            ResumePlan::AlreadyComplete { credit } => {
                debug!("分片{}已完整, 跳过传输: {:?}", self.chunk.index, self.chunk.part_path);
                progress(credit);
                return Ok(TransferOutcome::Finished);
            }
            ResumePlan::Fetch {
                start,
                credit,
                append,
            } => (start, credit, append),
        };

        if pause.is_cancelled() {
            return Ok(TransferOutcome::Paused);
        }

        let range = match (start, self.chunk.end) {
            (Some(start), Some(end)) => ByteRange::from_to(start, end),
            _ => ByteRange::full(),
        };
        let mut stream = self.transport.open_stream(&self.request, range).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(append)
            .write(true)
            .truncate(!append)
            .open(&self.chunk.part_path)
            .await
            .map_err(|e| {
                DownloadError::filesystem(format!(
                    "打开分片文件失败 {:?}: {}",
                    self.chunk.part_path, e
                ))
            })?;

        let mut downloaded = credit;
        let mut unreported = 0u64;
        if credit > 0 {
            progress(self.clamped(credit));
        }

        let outcome = loop {
            // 暂停优先于读取，保证暂停后不再落任何字节
            let item = tokio::select! {
                biased;
                _ = pause.cancelled() => break TransferOutcome::Paused,
                item = stream.next() => item,
            };
            match item {
                None => break TransferOutcome::Finished,
                Some(Ok(bytes)) => {
                    file.write_all(&bytes).await.map_err(|e| {
                        DownloadError::filesystem(format!(
                            "写入分片文件失败 {:?}: {}",
                            self.chunk.part_path, e
                        ))
                    })?;
                    downloaded += bytes.len() as u64;
                    unreported += bytes.len() as u64;
                    if unreported >= PROGRESS_THRESHOLD {
                        progress(self.clamped(downloaded));
                        unreported = 0;
                    }
                }
                Some(Err(e)) => {
                    file.flush().await.ok();
                    return Err(e);
                }
            }
        };

        file.flush().await.map_err(|e| {
            DownloadError::filesystem(format!(
                "刷写分片文件失败 {:?}: {}",
                self.chunk.part_path, e
            ))
        })?;
        progress(self.clamped(downloaded));

        debug!(
            "分片{}传输结束: outcome={:?}, downloaded={}",
            self.chunk.index, outcome, downloaded
        );
        Ok(outcome)
    }

    /// 有区间分片的进度上报不超过区间长度
    fn clamped(&self, downloaded: u64) -> u64 {
        match self.chunk.size() {
            Some(size) => downloaded.min(size),
            None => downloaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::chunk::part_path;
    use std::path::Path;
    use tempfile::TempDir;

    struct NoTransport;

    #[async_trait::async_trait]
    impl Transport for NoTransport {
        async fn probe(
            &self,
            _request: &Request,
        ) -> Result<crate::transport::ProbeResult, DownloadError> {
            unreachable!()
        }

        async fn open_stream(
            &self,
            _request: &Request,
            _range: ByteRange,
        ) -> Result<
            futures::stream::BoxStream<'static, Result<bytes::Bytes, DownloadError>>,
            DownloadError,
        > {
            unreachable!()
        }
    }

    fn chunk_under(dir: &Path, start: u64, end: u64) -> Chunk {
        Chunk {
            index: 0,
            start: Some(start),
            end: Some(end),
            part_path: part_path(&dir.join("a.bin"), 0),
        }
    }

    fn downloader(chunk: Chunk) -> ChunkDownload {
        ChunkDownload::new(
            Request::builder("https://example.com/a.bin").build(),
            chunk,
            Arc::new(NoTransport),
        )
    }

    #[test]
    fn test_plan_resume_missing_part_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let dl = downloader(chunk_under(dir.path(), 100, 199));
        assert_eq!(
            dl.plan_resume().unwrap(),
            ResumePlan::Fetch {
                start: Some(100),
                credit: 0,
                append: false,
            }
        );
    }

    #[test]
    fn test_plan_resume_partial_part_appends() {
        let dir = TempDir::new().unwrap();
        let chunk = chunk_under(dir.path(), 100, 199);
        std::fs::write(&chunk.part_path, vec![0u8; 40]).unwrap();
        let dl = downloader(chunk);
        assert_eq!(
            dl.plan_resume().unwrap(),
            ResumePlan::Fetch {
                start: Some(140),
                credit: 40,
                append: true,
            }
        );
    }

    #[test]
    fn test_plan_resume_complete_part_skips_network() {
        let dir = TempDir::new().unwrap();
        let chunk = chunk_under(dir.path(), 100, 199);
        std::fs::write(&chunk.part_path, vec![0u8; 100]).unwrap();
        let dl = downloader(chunk);
        assert_eq!(
            dl.plan_resume().unwrap(),
            ResumePlan::AlreadyComplete { credit: 100 }
        );
    }

    #[test]
    fn test_plan_resume_oversized_part_restarts() {
        let dir = TempDir::new().unwrap();
        let chunk = chunk_under(dir.path(), 100, 199);
        std::fs::write(&chunk.part_path, vec![0u8; 150]).unwrap();
        let dl = downloader(chunk.clone());
        assert_eq!(
            dl.plan_resume().unwrap(),
            ResumePlan::Fetch {
                start: Some(100),
                credit: 0,
                append: false,
            }
        );
        assert!(!chunk.part_path.exists());
    }

    #[test]
    fn test_plan_resume_unranged_always_restarts() {
        let dir = TempDir::new().unwrap();
        let chunk = Chunk {
            index: 0,
            start: None,
            end: None,
            part_path: part_path(&dir.path().join("a.bin"), 0),
        };
        std::fs::write(&chunk.part_path, vec![0u8; 40]).unwrap();
        let dl = downloader(chunk);
        assert_eq!(
            dl.plan_resume().unwrap(),
            ResumePlan::Fetch {
                start: None,
                credit: 0,
                append: false,
            }
        );
    }
}
