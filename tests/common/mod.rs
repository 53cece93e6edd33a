//! 集成测试公共设施：内存传输通道、事件录制器与等待辅助

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use resumable_downloader::{
    ByteRange, DownloadError, DownloadInfo, DownloadListener, DownloadStatus, InitInfo,
    ProbeResult, RangeInfo, Request, Transport,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 内存传输通道
///
/// 按字节区间切片固定的内存内容，可注入流中途失败与无限挂起，
/// 用于确定性地构造错误与暂停场景。
pub struct MockTransport {
    body: Vec<u8>,
    file_name: String,
    last_modified: Mutex<Option<String>>,
    range_supportable: bool,
    announce_length: bool,
    /// 单个流元素的字节数
    item_size: usize,
    /// 接下来 N 个流在吐出一半数据后报传输错误
    fail_next_streams: AtomicUsize,
    /// 每个流最多吐出这么多字节，之后永远挂起（直到被暂停打断）
    stall_after: Mutex<Option<u64>>,
    probe_calls: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            file_name: "file.bin".to_string(),
            last_modified: Mutex::new(Some("Mon, 01 Jan 2024 00:00:00 GMT".to_string())),
            range_supportable: true,
            announce_length: true,
            item_size: 1024,
            fail_next_streams: AtomicUsize::new(0),
            stall_after: Mutex::new(None),
            probe_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    /// 可预测的测试内容
    pub fn patterned_body(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    pub fn without_range_support(mut self) -> Self {
        self.range_supportable = false;
        self
    }

    pub fn without_content_length(mut self) -> Self {
        self.announce_length = false;
        self
    }

    pub fn without_last_modified(self) -> Self {
        *self.last_modified.lock() = None;
        self
    }

    pub fn set_last_modified(&self, value: &str) {
        *self.last_modified.lock() = Some(value.to_string());
    }

    pub fn fail_streams(&self, count: usize) {
        self.fail_next_streams.store(count, Ordering::SeqCst);
    }

    pub fn stall_after(&self, bytes: Option<u64>) {
        *self.stall_after.lock() = bytes;
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn probe(&self, _request: &Request) -> Result<ProbeResult, DownloadError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ProbeResult {
            init_info: InitInfo {
                file_name: self.file_name.clone(),
                last_modified: self.last_modified.lock().clone(),
                content_length: if self.announce_length {
                    self.body.len() as i64
                } else {
                    -1
                },
                mime_type: Some("application/octet-stream".to_string()),
            },
            range_info: RangeInfo {
                range_supportable: self.range_supportable,
                chunked: !self.announce_length,
            },
        })
    }

    async fn open_stream(
        &self,
        _request: &Request,
        range: ByteRange,
    ) -> Result<BoxStream<'static, Result<Bytes, DownloadError>>, DownloadError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);

        let slice: &[u8] = match (range.start, range.end) {
            (Some(start), Some(end)) => {
                let start = start as usize;
                let end = (end as usize + 1).min(self.body.len());
                if start > end {
                    return Err(DownloadError::transfer("请求区间越界"));
                }
                &self.body[start..end]
            }
            (Some(start), None) => &self.body[(start as usize).min(self.body.len())..],
            _ => &self.body[..],
        };

        let fail = self
            .fail_next_streams
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let stall = *self.stall_after.lock();

        let emit_len = match stall {
            Some(limit) => (limit as usize).min(slice.len()),
            None => slice.len(),
        };
        let emit_len = if fail { emit_len / 2 } else { emit_len };

        let mut items: Vec<Result<Bytes, DownloadError>> = slice[..emit_len]
            .chunks(self.item_size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if fail {
            items.push(Err(DownloadError::transfer("连接被注入中断")));
        }

        let base = futures::stream::iter(items);
        if stall.is_some() && !fail {
            Ok(base.chain(futures::stream::pending()).boxed())
        } else {
            Ok(base.boxed())
        }
    }
}

/// 按顺序录制整体状态变更与最终进度
#[derive(Default)]
pub struct EventRecorder {
    statuses: Mutex<Vec<DownloadStatus>>,
    infos: Mutex<Vec<DownloadInfo>>,
    retries: Mutex<Vec<DownloadError>>,
    progress: Mutex<Vec<(u64, Option<u64>)>>,
}

impl EventRecorder {
    pub fn statuses(&self) -> Vec<DownloadStatus> {
        self.statuses.lock().clone()
    }

    pub fn infos(&self) -> Vec<DownloadInfo> {
        self.infos.lock().clone()
    }

    pub fn retries(&self) -> Vec<DownloadError> {
        self.retries.lock().clone()
    }

    pub fn last_progress(&self) -> Option<(u64, Option<u64>)> {
        self.progress.lock().last().copied()
    }

    pub fn progress_log(&self) -> Vec<(u64, Option<u64>)> {
        self.progress.lock().clone()
    }
}

impl DownloadListener for EventRecorder {
    fn on_status_changed(&self, _request: &Request, status: &DownloadStatus) {
        self.statuses.lock().push(status.clone());
    }

    fn on_info_ready(&self, _request: &Request, info: &DownloadInfo) {
        self.infos.lock().push(info.clone());
    }

    fn on_retry(&self, _request: &Request, error: &DownloadError) {
        self.retries.lock().push(error.clone());
    }

    fn on_progress(&self, _request: &Request, downloaded: u64, total: Option<u64>) {
        self.progress.lock().push((downloaded, total));
    }
}

/// 轮询等待下载达到满足条件的状态，超时即失败
pub async fn wait_for<F>(download: &resumable_downloader::Download, what: &str, pred: F)
where
    F: Fn(&DownloadStatus) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = download.status();
        if pred(&status) {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("等待 {} 超时, 当前状态: {:?}", what, status);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_for_status(download: &resumable_downloader::Download, expect: DownloadStatus) {
    let what = format!("{:?}", expect);
    wait_for(download, &what, |s| s.same_kind(&expect)).await;
}
