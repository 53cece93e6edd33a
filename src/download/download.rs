//! 单下载状态机
//!
//! 每个下载的状态变更全部在自己的串行动作队列里执行，队列按需创建、
//! 静止后关闭。`pause` 不走队列：它只置位暂停标记并取消当前令牌，
//! 正在阻塞等待准入或正在传输的协程据此尽快让出。
//!
//! 整体状态由分片状态聚合推导，优先级从高到低：
//! 有分片在传 > 有分片排队 > 有分片空闲 > 有分片出错 > 全部完成(进入合并)。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::download::chunk::{part_path, Chunk};
use crate::download::chunk_download::{ChunkDownload, TransferOutcome};
use crate::download::info::DownloadInfo;
use crate::download::listener::{ChunkDownloadListener, DownloadListener, Listeners};
use crate::download::status::{ChunkDownloadStatus, DownloadStatus};
use crate::download::EngineCtx;
use crate::error::DownloadError;
use crate::persist::{ChunkRecord, DownloadRecord};
use crate::request::Request;
use crate::transport::ProbeResult;
use crate::util::format_size;

/// 串行队列里的动作
#[derive(Debug)]
pub(crate) enum Action {
    /// 请求启动（需要获取接纳许可）
    Start,
    /// 重试策略触发的重启（原有接纳许可仍然持有）
    Restart,
    /// 某个分片的状态上报
    ChunkStatus {
        index: usize,
        status: ChunkDownloadStatus,
    },
}

/// 可变状态，统一由 `Shared::state` 互斥锁保护
///
/// 锁只在短临界区内持有，绝不跨 `await`。
struct State {
    status: DownloadStatus,
    /// 暂停意图：初始为暂停，`start` 清除、`pause` 置位
    pause_flag: bool,
    /// 当前一轮运行的暂停令牌，每次 `start` 换新
    pause: CancellationToken,
    info: Option<DownloadInfo>,
    target_path: Option<PathBuf>,
    chunks: Vec<Chunk>,
    chunk_statuses: Vec<ChunkDownloadStatus>,
    chunk_progress: Vec<u64>,
    /// 接纳许可，静止时释放
    permit: Option<OwnedSemaphorePermit>,
    /// 动作队列发送端，队列按需创建、静止后关闭
    actions: Option<mpsc::UnboundedSender<Action>>,
}

pub(crate) struct Shared {
    request: Request,
    storage_key: String,
    ctx: Arc<EngineCtx>,
    state: Mutex<State>,
    listeners: Listeners<dyn DownloadListener>,
    chunk_listeners: Listeners<dyn ChunkDownloadListener>,
}

/// 一个下载的句柄
///
/// 克隆句柄共享同一个状态机。
#[derive(Clone)]
pub struct Download {
    shared: Arc<Shared>,
}

impl Download {
    pub(crate) fn new(request: Request, ctx: Arc<EngineCtx>) -> Self {
        let storage_key = request.storage_key();
        Self {
            shared: Arc::new(Shared {
                request,
                storage_key,
                ctx,
                state: Mutex::new(State {
                    status: DownloadStatus::Idle,
                    pause_flag: true,
                    pause: cancelled_token(),
                    info: None,
                    target_path: None,
                    chunks: Vec::new(),
                    chunk_statuses: Vec::new(),
                    chunk_progress: Vec::new(),
                    permit: None,
                    actions: None,
                }),
                listeners: Listeners::default(),
                chunk_listeners: Listeners::default(),
            }),
        }
    }

    /// 从持久化记录恢复
    ///
    /// 中间态在进程重启后没有意义，整体与分片状态都归一化；
    /// 是否随恢复自动启动由调用方根据归一化前的状态决定。
    pub(crate) fn from_record(record: DownloadRecord, ctx: Arc<EngineCtx>) -> Self {
        let storage_key = record.request.storage_key();
        let n = record.chunks.len();
        Self {
            shared: Arc::new(Shared {
                request: record.request,
                storage_key,
                ctx,
                state: Mutex::new(State {
                    status: record.status.normalized_for_restore(),
                    pause_flag: true,
                    pause: cancelled_token(),
                    info: record.info,
                    target_path: record.target_path,
                    chunks: record.chunks.iter().map(|c| c.chunk.clone()).collect(),
                    chunk_statuses: record
                        .chunks
                        .into_iter()
                        .map(|c| c.status.normalized_for_restore())
                        .collect(),
                    chunk_progress: vec![0; n],
                    permit: None,
                    actions: None,
                }),
                listeners: Listeners::default(),
                chunk_listeners: Listeners::default(),
            }),
        }
    }

    pub fn request(&self) -> &Request {
        &self.shared.request
    }

    /// 当前整体状态
    pub fn status(&self) -> DownloadStatus {
        self.shared.state.lock().status.clone()
    }

    /// 探测到的元数据（初始化完成后可用）
    pub fn info(&self) -> Option<DownloadInfo> {
        self.shared.state.lock().info.clone()
    }

    /// 当前分片状态快照（按分片序号排列）
    pub fn chunk_statuses(&self) -> Vec<ChunkDownloadStatus> {
        self.shared.state.lock().chunk_statuses.clone()
    }

    /// 已下载字节数与总大小（总大小未知时为 `None`）
    pub fn progress(&self) -> (u64, Option<u64>) {
        let s = self.shared.state.lock();
        let downloaded = s.chunk_progress.iter().sum();
        (downloaded, s.info.as_ref().and_then(total_size))
    }

    /// 请求启动（或恢复）
    ///
    /// 幂等：运行中再次调用无效果。实际推进在串行队列里异步进行，
    /// 本方法立即返回。
    pub fn start(&self) {
        let mut s = self.shared.state.lock();
        s.pause_flag = false;
        if s.pause.is_cancelled() {
            s.pause = CancellationToken::new();
        }
        self.shared.dispatch_locked(&mut s, Action::Start);
    }

    /// 请求暂停
    ///
    /// 立即生效的只有暂停意图；各分片在下一次写入边界前让出，
    /// 已落盘字节全部保留。
    pub fn pause(&self) {
        let mut s = self.shared.state.lock();
        s.pause_flag = true;
        s.pause.cancel();
    }

    pub fn add_listener(&self, listener: Arc<dyn DownloadListener>) {
        self.shared.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn DownloadListener>) {
        self.shared.listeners.remove(listener);
    }

    pub fn add_chunk_listener(&self, listener: Arc<dyn ChunkDownloadListener>) {
        self.shared.chunk_listeners.add(listener);
    }

    pub fn remove_chunk_listener(&self, listener: &Arc<dyn ChunkDownloadListener>) {
        self.shared.chunk_listeners.remove(listener);
    }

    /// 删除该下载的所有落盘产物（分片文件与合并临时文件）
    ///
    /// 只应在暂停之后调用；与仍在让出途中的分片写入存在窗口竞争，
    /// 残留文件会在下一次同名请求启动时被当作陈旧分片清掉。
    pub(crate) fn remove_local_files(&self) {
        let (chunks, target) = {
            let s = self.shared.state.lock();
            (s.chunks.clone(), s.target_path.clone())
        };
        remove_part_files(&chunks);
        if let Some(target) = target {
            let merging = merging_path(&target);
            if let Err(e) = std::fs::remove_file(&merging) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("删除合并临时文件失败 {:?}: {}", merging, e);
                }
            }
        }
    }
}

// ============================================================================
// 串行动作队列
// ============================================================================

impl Shared {
    /// 投递一个动作，必要时创建队列与执行协程
    fn dispatch(self: &Arc<Self>, action: Action) {
        let mut s = self.state.lock();
        self.dispatch_locked(&mut s, action);
    }

    fn dispatch_locked(self: &Arc<Self>, s: &mut State, action: Action) {
        if s.actions.is_none() {
            let (tx, rx) = mpsc::unbounded_channel();
            s.actions = Some(tx);
            let shared = Arc::clone(self);
            tokio::spawn(run_actions(shared, rx));
        }
        if let Some(tx) = &s.actions {
            // 接收端只在队列空且静止时关闭，此处发送不会失败
            tx.send(action).ok();
        }
    }

    async fn handle(self: &Arc<Self>, action: Action) {
        match action {
            Action::Start => self.handle_start().await,
            Action::Restart => self.handle_restart().await,
            Action::ChunkStatus { index, status } => self.handle_chunk_status(index, status).await,
        }
    }

    // ------------------------------------------------------------------
    // 启动流程：准入 -> 初始化 -> 准备 -> 分发分片
    // ------------------------------------------------------------------

    async fn handle_start(self: &Arc<Self>) {
        let pause = {
            let s = self.state.lock();
            if s.pause_flag {
                return;
            }
            match s.status {
                DownloadStatus::Idle
                | DownloadStatus::Error(_)
                | DownloadStatus::MergeError(_) => {}
                DownloadStatus::Complete => {
                    debug!("下载已完成, 忽略启动: {}", self.request.url());
                    return;
                }
                _ => return, // 已在运行
            }
            s.pause.clone()
        };

        self.apply_status(DownloadStatus::Pending);

        // 等待接纳许可，阻塞期间可被暂停打断
        let permit = tokio::select! {
            biased;
            _ = pause.cancelled() => {
                debug!("等待接纳时被暂停: {}", self.request.url());
                self.apply_status(DownloadStatus::Idle);
                return;
            }
            permit = self.ctx.admission.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => {
                    self.apply_status(DownloadStatus::Idle);
                    return;
                }
            },
        };
        self.state.lock().permit = Some(permit);

        self.run_cycle(&pause).await;
    }

    /// 重试重启：跳过准入（原许可仍持有），直接进入新一轮初始化
    async fn handle_restart(self: &Arc<Self>) {
        let pause = {
            let s = self.state.lock();
            if s.pause_flag {
                None
            } else {
                Some(s.pause.clone())
            }
        };
        match pause {
            Some(pause) => self.run_cycle(&pause).await,
            // 重试排队期间被暂停，收尾并释放许可
            None => self.apply_status(DownloadStatus::Idle),
        }
    }

    /// 持有接纳许可后的一轮推进：初始化 -> 准备 -> 分发分片
    async fn run_cycle(self: &Arc<Self>, pause: &CancellationToken) {
        self.apply_status(DownloadStatus::Initializing);
        if let Err(e) = self.initialize().await {
            self.apply_failure(e);
            return;
        }
        if pause.is_cancelled() {
            self.apply_status(DownloadStatus::Idle);
            return;
        }

        if let Err(e) = self.prepare() {
            self.apply_failure(e);
            return;
        }

        let spawned = self.spawn_chunks(pause);
        if spawned == 0 {
            // 分片早已全部完成（恢复场景），直接合并
            self.merge().await;
        } else {
            self.apply_status(DownloadStatus::ChunkPending);
        }
    }

    /// 探测元数据并检测服务端文件变更
    async fn initialize(&self) -> Result<(), DownloadError> {
        let existing = self.state.lock().info.clone();
        let probe = self.ctx.transport.probe(&self.request).await?;

        match existing {
            None => {
                let info = DownloadInfo::new(probe.init_info, probe.range_info);
                self.replace_info(info);
            }
            Some(old) => {
                if server_file_changed(&old, &probe) {
                    warn!(
                        "服务端文件已变更, 丢弃已下载分片重新开始: {}",
                        self.request.url()
                    );
                    let chunks = {
                        let mut s = self.state.lock();
                        let chunks = std::mem::take(&mut s.chunks);
                        s.chunk_statuses.clear();
                        s.chunk_progress.clear();
                        chunks
                    };
                    remove_part_files(&chunks);
                    self.listeners.notify(|l| l.on_chunks_destroyed(&self.request));
                    let info = old.replaced(probe.init_info, probe.range_info);
                    self.replace_info(info);
                }
            }
        }
        Ok(())
    }

    fn replace_info(&self, info: DownloadInfo) {
        self.state.lock().info = Some(info.clone());
        self.persist();
        self.listeners
            .notify(|l| l.on_info_ready(&self.request, &info));
    }

    /// 确定目标路径、检查文件冲突、按需拆分分片
    fn prepare(&self) -> Result<(), DownloadError> {
        let (info, existing_target, have_chunks) = {
            let s = self.state.lock();
            let info = s
                .info
                .clone()
                .ok_or_else(|| DownloadError::probe("元数据缺失"))?;
            (info, s.target_path.clone(), !s.chunks.is_empty())
        };

        let target = match existing_target {
            Some(target) => target,
            None => {
                let dir = self
                    .request
                    .destination()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.ctx.default_dir.clone());
                std::fs::create_dir_all(&dir).map_err(|e| {
                    DownloadError::filesystem(format!("创建目标目录失败 {:?}: {}", dir, e))
                })?;
                let file_name = self
                    .request
                    .file_name()
                    .unwrap_or(info.init_info.file_name.as_str());
                dir.join(file_name)
            }
        };

        if target.exists() {
            return Err(DownloadError::FileConflict(format!(
                "目标文件已存在: {:?}",
                target
            )));
        }

        if !have_chunks {
            let len = info.init_info.content_length;
            let chunks = if info.range_info.range_supportable && len > 0 {
                self.ctx.splitter.split(len as u64, &target)
            } else {
                // 不支持 Range 或大小未知：退化为单个无区间分片
                vec![Chunk {
                    index: 0,
                    start: None,
                    end: None,
                    part_path: part_path(&target, 0),
                }]
            };
            let mut s = self.state.lock();
            s.chunk_statuses = vec![ChunkDownloadStatus::Idle; chunks.len()];
            s.chunk_progress = vec![0; chunks.len()];
            s.chunks = chunks.clone();
            s.target_path = Some(target);
            drop(s);
            self.persist();
            self.listeners
                .notify(|l| l.on_chunks_created(&self.request, &chunks));
        } else {
            self.state.lock().target_path = Some(target);
        }
        Ok(())
    }

    /// 把所有未完成分片提交到共享工作池，返回提交数量
    fn spawn_chunks(self: &Arc<Self>, pause: &CancellationToken) -> usize {
        let jobs: Vec<Chunk> = {
            let mut guard = self.state.lock();
            let s = &mut *guard;
            let mut jobs = Vec::new();
            for (i, status) in s.chunk_statuses.iter_mut().enumerate() {
                if !matches!(status, ChunkDownloadStatus::Complete) {
                    *status = ChunkDownloadStatus::Pending;
                    jobs.push(s.chunks[i].clone());
                }
            }
            jobs
        };
        if jobs.is_empty() {
            return 0;
        }

        self.persist();
        for chunk in &jobs {
            self.chunk_listeners.notify(|l| {
                l.on_chunk_status_changed(&self.request, chunk.index, &ChunkDownloadStatus::Pending)
            });
        }

        let count = jobs.len();
        for chunk in jobs {
            let shared = Arc::clone(self);
            let pause = pause.clone();
            tokio::spawn(async move {
                let index = chunk.index;
                let status = shared.run_chunk(chunk, pause).await;
                shared.dispatch(Action::ChunkStatus { index, status });
            });
        }
        count
    }

    /// 单个分片的完整生命周期：排队 -> 传输 -> 上报终态
    async fn run_chunk(
        self: &Arc<Self>,
        chunk: Chunk,
        pause: CancellationToken,
    ) -> ChunkDownloadStatus {
        let permit = tokio::select! {
            biased;
            _ = pause.cancelled() => return ChunkDownloadStatus::Idle,
            permit = self.ctx.chunk_pool.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => return ChunkDownloadStatus::Idle,
            },
        };

        let index = chunk.index;
        self.dispatch(Action::ChunkStatus {
            index,
            status: ChunkDownloadStatus::Downloading,
        });

        let downloader =
            ChunkDownload::new(self.request.clone(), chunk, Arc::clone(&self.ctx.transport));
        let reporter = Arc::clone(self);
        let progress = move |bytes: u64| reporter.report_chunk_progress(index, bytes);
        let result = downloader.run(&pause, &progress).await;
        drop(permit);

        match result {
            Ok(TransferOutcome::Finished) => ChunkDownloadStatus::Complete,
            Ok(TransferOutcome::Paused) => ChunkDownloadStatus::Idle,
            Err(e) => {
                warn!("分片{}传输失败: {}", index, e);
                ChunkDownloadStatus::Error(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // 分片状态聚合
    // ------------------------------------------------------------------

    async fn handle_chunk_status(self: &Arc<Self>, index: usize, status: ChunkDownloadStatus) {
        let changed = {
            let mut s = self.state.lock();
            if index >= s.chunk_statuses.len() {
                // 分片集已被重建（服务端文件变更），丢弃迟到的上报
                return;
            }
            let changed = !s.chunk_statuses[index].same_kind(&status);
            s.chunk_statuses[index] = status.clone();
            changed
        };
        if changed {
            self.persist();
            self.chunk_listeners
                .notify(|l| l.on_chunk_status_changed(&self.request, index, &status));
        }

        let (next, resume_wanted) = {
            let s = self.state.lock();
            let next = aggregate(&s.chunk_statuses);
            let resume_wanted =
                matches!(next, Some(DownloadStatus::Idle)) && !s.pause_flag;
            (next, resume_wanted)
        };
        match next {
            None => self.merge().await,
            Some(DownloadStatus::Error(e)) => self.apply_failure(e),
            Some(next) => {
                self.apply_status(next);
                if resume_wanted {
                    // 暂停尚未收尾时又收到启动请求，收尾后立即重启
                    self.dispatch(Action::Start);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // 合并
    // ------------------------------------------------------------------

    async fn merge(self: &Arc<Self>) {
        self.apply_status(DownloadStatus::Merging);
        let (chunks, target) = {
            let s = self.state.lock();
            (s.chunks.clone(), s.target_path.clone())
        };
        let Some(target) = target else {
            self.apply_merge_failure(DownloadError::merge("目标路径缺失"));
            return;
        };

        match self.do_merge(&chunks, &target).await {
            Ok(true) => {
                remove_part_files(&chunks);
                self.ctx.retry.reset(&self.storage_key);
                let merged = self.state.lock().chunk_progress.iter().sum::<u64>();
                info!("下载完成: {:?} ({})", target, format_size(merged));
                self.apply_status(DownloadStatus::Complete);
            }
            Ok(false) => {
                debug!("合并被暂停, 分片文件保留: {:?}", target);
                self.apply_status(DownloadStatus::Idle);
            }
            Err(e) => self.apply_merge_failure(e),
        }
    }

    /// 按序拼接分片到临时文件后原子重命名
    ///
    /// 每片之间检查暂停意图；返回 `Ok(false)` 表示被暂停，分片文件
    /// 原样保留。
    async fn do_merge(&self, chunks: &[Chunk], target: &Path) -> Result<bool, DownloadError> {
        let merging = merging_path(target);
        let mut out = tokio::fs::File::create(&merging)
            .await
            .map_err(|e| DownloadError::merge(format!("创建合并临时文件失败 {:?}: {}", merging, e)))?;

        for chunk in chunks {
            if self.state.lock().pause_flag {
                drop(out);
                tokio::fs::remove_file(&merging).await.ok();
                return Ok(false);
            }
            let mut part = tokio::fs::File::open(&chunk.part_path)
                .await
                .map_err(|e| {
                    DownloadError::merge(format!(
                        "打开分片文件失败 {:?}: {}",
                        chunk.part_path, e
                    ))
                })?;
            tokio::io::copy(&mut part, &mut out).await.map_err(|e| {
                DownloadError::merge(format!("拼接分片{}失败: {}", chunk.index, e))
            })?;
        }

        out.sync_all()
            .await
            .map_err(|e| DownloadError::merge(format!("落盘合并文件失败: {}", e)))?;
        drop(out);

        if target.exists() {
            tokio::fs::remove_file(&merging).await.ok();
            return Err(DownloadError::FileConflict(format!(
                "目标文件已存在: {:?}",
                target
            )));
        }
        tokio::fs::rename(&merging, target)
            .await
            .map_err(|e| DownloadError::merge(format!("重命名合并文件失败 {:?}: {}", target, e)))?;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // 状态落地与失败处理
    // ------------------------------------------------------------------

    /// 更新整体状态；变更判定只看状态码
    ///
    /// 新状态为静止态时释放接纳许可。
    fn apply_status(&self, next: DownloadStatus) {
        let changed = {
            let mut s = self.state.lock();
            let changed = !s.status.same_kind(&next);
            s.status = next.clone();
            if next.is_quiescent() {
                s.permit = None;
            }
            changed
        };
        if changed {
            debug!("下载状态变更 {} -> {:?}", self.request.url(), next);
            self.persist();
            self.listeners
                .notify(|l| l.on_status_changed(&self.request, &next));
        }
    }

    /// 失败处理：重试策略放行时不对外暴露错误态，改为通知重试事件
    /// 并原地重启（接纳许可不释放、不重新获取）
    fn apply_failure(self: &Arc<Self>, error: DownloadError) {
        warn!("下载失败 {}: {}", self.request.url(), error);
        if self.consult_retry(&error) {
            return;
        }
        self.apply_status(DownloadStatus::Error(error));
    }

    fn apply_merge_failure(self: &Arc<Self>, error: DownloadError) {
        warn!("合并失败 {}: {}", self.request.url(), error);
        if self.consult_retry(&error) {
            return;
        }
        self.apply_status(DownloadStatus::MergeError(error));
    }

    fn consult_retry(self: &Arc<Self>, error: &DownloadError) -> bool {
        if error.is_conflict() || !self.ctx.retry.should_retry(&self.storage_key, error) {
            return false;
        }
        info!("按重试策略自动重启: {}", self.request.url());
        self.listeners.notify(|l| l.on_retry(&self.request, error));
        self.dispatch(Action::Restart);
        true
    }

    /// 分片进度上报（分片内部已按阈值批量）
    fn report_chunk_progress(&self, index: usize, bytes: u64) {
        let (downloaded, total) = {
            let mut s = self.state.lock();
            if index >= s.chunk_progress.len() {
                return;
            }
            s.chunk_progress[index] = bytes;
            (
                s.chunk_progress.iter().sum::<u64>(),
                s.info.as_ref().and_then(total_size),
            )
        };
        self.chunk_listeners
            .notify(|l| l.on_chunk_progress(&self.request, index, bytes));
        self.listeners
            .notify(|l| l.on_progress(&self.request, downloaded, total));
    }

    /// 全量覆盖写持久化记录；失败只告警，不回滚内存状态
    fn persist(&self) {
        let record = {
            let s = self.state.lock();
            DownloadRecord {
                request: self.request.clone(),
                status: s.status.clone(),
                info: s.info.clone(),
                target_path: s.target_path.clone(),
                chunks: s
                    .chunks
                    .iter()
                    .cloned()
                    .zip(s.chunk_statuses.iter().cloned())
                    .map(|(chunk, status)| ChunkRecord { chunk, status })
                    .collect(),
            }
        };
        if let Err(e) = self.ctx.persist.save(&record) {
            warn!("持久化下载记录失败 {}: {:#}", self.request.url(), e);
        }
    }
}

/// 串行动作执行协程
///
/// 队列空且状态静止时在锁内关闭发送端退出；与 `dispatch` 使用同一把
/// 锁，不会丢动作（关闭后的投递会重新创建队列）。
async fn run_actions(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Action>) {
    loop {
        let action = loop {
            match rx.try_recv() {
                Ok(a) => break a,
                Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => {
                    {
                        let mut s = shared.state.lock();
                        match rx.try_recv() {
                            Ok(a) => break a,
                            Err(_) => {
                                if s.status.is_quiescent() {
                                    s.actions = None;
                                    return;
                                }
                            }
                        }
                    }
                    match rx.recv().await {
                        Some(a) => break a,
                        None => return,
                    }
                }
            }
        };
        shared.handle(action).await;
    }
}

/// 分片状态聚合为整体状态
///
/// 返回 `None` 表示全部分片已完成，应进入合并。
pub(crate) fn aggregate(chunks: &[ChunkDownloadStatus]) -> Option<DownloadStatus> {
    if chunks.is_empty() {
        return Some(DownloadStatus::Idle);
    }
    let mut pending = false;
    let mut idle = false;
    let mut first_error: Option<&DownloadError> = None;
    for status in chunks {
        match status {
            ChunkDownloadStatus::Downloading => return Some(DownloadStatus::Downloading),
            ChunkDownloadStatus::Pending => pending = true,
            ChunkDownloadStatus::Idle => idle = true,
            ChunkDownloadStatus::Error(e) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            ChunkDownloadStatus::Complete => {}
        }
    }
    if pending {
        Some(DownloadStatus::ChunkPending)
    } else if idle {
        Some(DownloadStatus::Idle)
    } else if let Some(e) = first_error {
        Some(DownloadStatus::Error(e.clone()))
    } else {
        None
    }
}

/// 服务端文件变更判定
///
/// 只比较 Last-Modified 凭据；任意一侧缺失时无法判定，按未变更处理。
fn server_file_changed(old: &DownloadInfo, probe: &ProbeResult) -> bool {
    match (&old.init_info.last_modified, &probe.init_info.last_modified) {
        (Some(a), Some(b)) => a != b,
        _ => false,
    }
}

fn total_size(info: &DownloadInfo) -> Option<u64> {
    (info.init_info.content_length >= 0).then_some(info.init_info.content_length as u64)
}

/// 合并临时文件路径：`<目标文件>.merging`
fn merging_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".merging");
    target.with_file_name(name)
}

fn remove_part_files(chunks: &[Chunk]) {
    for chunk in chunks {
        if let Err(e) = std::fs::remove_file(&chunk.part_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("删除分片文件失败 {:?}: {}", chunk.part_path, e);
            }
        }
    }
}

fn cancelled_token() -> CancellationToken {
    let token = CancellationToken::new();
    token.cancel();
    token
}
