//! 事件监听
//!
//! 监听器集合在通知前先拷贝快照，通知过程中不持锁，回调内可以
//! 安全地增删监听器或操作下载本身。

use crate::download::chunk::Chunk;
use crate::download::info::DownloadInfo;
use crate::download::status::{ChunkDownloadStatus, DownloadStatus};
use crate::error::DownloadError;
use crate::request::Request;
use parking_lot::RwLock;
use std::sync::Arc;

/// 下载级事件监听器
#[allow(unused_variables)]
pub trait DownloadListener: Send + Sync {
    /// 整体状态变更
    fn on_status_changed(&self, request: &Request, status: &DownloadStatus) {}

    /// 元数据探测完成
    fn on_info_ready(&self, request: &Request, info: &DownloadInfo) {}

    /// 分片集已建立（首次拆分或服务端文件变更后重建）
    fn on_chunks_created(&self, request: &Request, chunks: &[Chunk]) {}

    /// 分片集已废弃，对应分片文件已删除
    fn on_chunks_destroyed(&self, request: &Request) {}

    /// 失败被重试策略拦截，即将自动重启（对外不暴露错误态）
    fn on_retry(&self, request: &Request, error: &DownloadError) {}

    /// 已下载字节数推进（按阈值批量上报）
    fn on_progress(&self, request: &Request, downloaded: u64, total: Option<u64>) {}
}

/// 管理器级事件监听器
#[allow(unused_variables)]
pub trait ManagerListener: Send + Sync {
    /// 下载已登记进注册表
    fn on_download_created(&self, request: &Request) {}

    /// 下载已从注册表删除
    fn on_download_destroyed(&self, request: &Request) {}
}

/// 分片级事件监听器
#[allow(unused_variables)]
pub trait ChunkDownloadListener: Send + Sync {
    /// 分片状态变更
    fn on_chunk_status_changed(
        &self,
        request: &Request,
        chunk_index: usize,
        status: &ChunkDownloadStatus,
    ) {
    }

    /// 分片已下载字节数推进
    fn on_chunk_progress(&self, request: &Request, chunk_index: usize, downloaded: u64) {}
}

/// 线程安全的监听器集合
///
/// 注册顺序即通知顺序，按 `Arc` 同一性去重与移除。
pub struct Listeners<L: ?Sized> {
    inner: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Vec::new()),
        }
    }
}

impl<L: ?Sized> Listeners<L> {
    pub fn add(&self, listener: Arc<L>) {
        let mut inner = self.inner.write();
        if !inner.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            inner.push(listener);
        }
    }

    pub fn remove(&self, listener: &Arc<L>) {
        self.inner.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// 对当前快照逐个执行回调
    pub fn notify(&self, mut f: impl FnMut(&L)) {
        let snapshot: Vec<Arc<L>> = self.inner.read().clone();
        for listener in &snapshot {
            f(listener);
        }
    }

    /// 取当前快照，供稍后在集合可能已变化时通知
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);
    impl DownloadListener for Counter {
        fn on_progress(&self, _request: &Request, _downloaded: u64, _total: Option<u64>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_is_idempotent_by_identity() {
        let listeners: Listeners<dyn DownloadListener> = Listeners::default();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        listeners.add(counter.clone());
        listeners.add(counter.clone());
        let req = Request::builder("https://example.com/a").build();
        listeners.notify(|l| l.on_progress(&req, 1, None));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_by_identity() {
        let listeners: Listeners<dyn DownloadListener> = Listeners::default();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        listeners.add(a.clone());
        listeners.add(b.clone());
        let a_dyn: Arc<dyn DownloadListener> = a.clone();
        listeners.remove(&a_dyn);
        let req = Request::builder("https://example.com/a").build();
        listeners.notify(|l| l.on_progress(&req, 1, None));
        assert_eq!(a.0.load(Ordering::SeqCst), 0);
        assert_eq!(b.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mutation_inside_callback_does_not_deadlock() {
        let listeners: Arc<Listeners<dyn DownloadListener>> = Arc::new(Listeners::default());

        struct SelfRemover {
            listeners: Arc<Listeners<dyn DownloadListener>>,
            me: parking_lot::Mutex<Option<Arc<dyn DownloadListener>>>,
        }
        impl DownloadListener for SelfRemover {
            fn on_progress(&self, _request: &Request, _downloaded: u64, _total: Option<u64>) {
                if let Some(me) = self.me.lock().take() {
                    self.listeners.remove(&me);
                }
            }
        }

        let remover = Arc::new(SelfRemover {
            listeners: listeners.clone(),
            me: parking_lot::Mutex::new(None),
        });
        let as_dyn: Arc<dyn DownloadListener> = remover.clone();
        *remover.me.lock() = Some(as_dyn.clone());
        listeners.add(as_dyn);

        let req = Request::builder("https://example.com/a").build();
        listeners.notify(|l| l.on_progress(&req, 1, None));
        assert!(listeners.snapshot().is_empty());
    }
}
