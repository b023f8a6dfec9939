//! 单个 NCM 文件在批量解码过程中的状态记录。
//!
//! [`TrackRecord`] 只由执行其解码任务的工作线程修改；
//! 外部轮询方通过只读访问器或 [`TrackSnapshot`] 观察它。

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        atomic::{AtomicU8, Ordering},
    },
};

use serde::Serialize;

use crate::{
    model::{
        format::{AudioFormat, ImageFormat},
        metadata::NcmMetadata,
    },
    ncm::ContainerLayout,
};

/// 解码完成之前进度能达到的最大值。只有 `Done` 状态的记录进度才是 100。
const MAX_PENDING_PROGRESS: u8 = 99;

/// 记录的生命周期状态。`Done` 和 `Failed` 是终态，不可逆。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", content = "reason")]
pub enum TrackState {
    /// 已接受，等待工作线程
    #[default]
    Pending,
    /// 正在解密元数据与密钥
    Parsing,
    /// 正在解密音频负载
    Decoding,
    /// 成功完成
    Done,
    /// 失败，附带简短原因
    Failed(String),
}

impl TrackState {
    /// 是否为终态。
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// 是否正占用一个工作线程。
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Parsing | Self::Decoding)
    }
}

#[derive(Debug, Default)]
struct TrackDetails {
    output_path: Option<PathBuf>,
    format: Option<AudioFormat>,
    /// 元数据解析之前为 `None`
    metadata: Option<NcmMetadata>,
}

/// 单个文件的解码记录。
#[derive(Debug)]
pub struct TrackRecord {
    id: usize,
    source_path: PathBuf,
    layout: ContainerLayout,
    cover: Option<Arc<[u8]>>,
    progress: AtomicU8,
    state: RwLock<TrackState>,
    details: RwLock<TrackDetails>,
}

/// 记录在某一时刻的只读副本，可安全地跨线程传递给展示层。
#[derive(Debug, Clone, Serialize)]
pub struct TrackSnapshot {
    /// 在批次中的序号
    pub id: usize,
    /// 源文件的绝对路径
    pub source_path: PathBuf,
    /// 输出文件路径，格式识别之前为 `None`
    pub output_path: Option<PathBuf>,
    /// 歌曲标题
    pub title: Option<String>,
    /// 艺术家列表，元数据解析之前为 `None`
    pub artist_names: Option<Vec<String>>,
    /// 专辑名
    pub album: Option<String>,
    /// 识别出的音频格式
    pub format: Option<AudioFormat>,
    /// 封面图片的原始字节
    #[serde(skip)]
    pub cover: Option<Arc<[u8]>>,
    /// 封面的 MIME 类型
    pub cover_mime: Option<&'static str>,
    /// 进度百分比
    pub progress: u8,
    /// 生命周期状态
    pub state: TrackState,
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl TrackRecord {
    pub(crate) fn new(
        id: usize,
        source_path: PathBuf,
        layout: ContainerLayout,
        cover: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id,
            source_path,
            layout,
            cover: cover.filter(|c| !c.is_empty()).map(Arc::from),
            progress: AtomicU8::new(0),
            state: RwLock::new(TrackState::Pending),
            details: RwLock::new(TrackDetails::default()),
        }
    }

    /// 在批次中的序号。
    pub fn id(&self) -> usize {
        self.id
    }

    /// 源文件的绝对路径。
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// 解析得到的容器布局。
    pub fn layout(&self) -> &ContainerLayout {
        &self.layout
    }

    /// 封面图片的原始字节。
    pub fn cover(&self) -> Option<&[u8]> {
        self.cover.as_deref()
    }

    /// 当前进度百分比，不加锁。
    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::Acquire)
    }

    /// 当前状态。
    pub fn state(&self) -> TrackState {
        read_lock(&self.state).clone()
    }

    /// 是否已处于终态。
    pub fn is_terminal(&self) -> bool {
        read_lock(&self.state).is_terminal()
    }

    /// 输出文件路径。
    pub fn output_path(&self) -> Option<PathBuf> {
        read_lock(&self.details).output_path.clone()
    }

    /// 歌曲标题。
    pub fn title(&self) -> Option<String> {
        read_lock(&self.details)
            .metadata
            .as_ref()
            .and_then(|m| m.title.clone())
    }

    /// 艺术家列表；元数据尚未解析时为 `None`。
    pub fn artist_names(&self) -> Option<Vec<String>> {
        read_lock(&self.details)
            .metadata
            .as_ref()
            .map(|m| m.artists.clone())
    }

    /// 完整的元数据；尚未解析时为 `None`。
    pub fn metadata(&self) -> Option<NcmMetadata> {
        read_lock(&self.details).metadata.clone()
    }

    /// 生成一份一致的快照。
    pub fn snapshot(&self) -> TrackSnapshot {
        // 持有状态读锁期间读取进度，保证 `Done` 与 100 同时被观察到
        let state = read_lock(&self.state);
        let progress = self.progress();
        let details = read_lock(&self.details);
        let metadata = details.metadata.as_ref();

        TrackSnapshot {
            id: self.id,
            source_path: self.source_path.clone(),
            output_path: details.output_path.clone(),
            title: metadata.and_then(|m| m.title.clone()),
            artist_names: metadata.map(|m| m.artists.clone()),
            album: metadata.and_then(|m| m.album.clone()),
            format: details.format,
            cover: self.cover.clone(),
            cover_mime: self
                .cover
                .as_deref()
                .map(|c| ImageFormat::detect(c).mime_type()),
            progress,
            state: state.clone(),
        }
    }

    // ---------------------------------------------------------------
    //  以下方法只允许执行该记录解码任务的工作线程调用
    // ---------------------------------------------------------------

    /// 切换到非终态。已处于终态时忽略。
    pub(crate) fn set_state(&self, next: TrackState) {
        let mut state = write_lock(&self.state);
        if !state.is_terminal() {
            *state = next;
        }
    }

    /// 推进进度。进度只增不减，并且在 `Done` 之前不会超过 99。
    pub(crate) fn advance(&self, progress: u8) {
        self.progress
            .fetch_max(progress.min(MAX_PENDING_PROGRESS), Ordering::AcqRel);
    }

    pub(crate) fn set_metadata(&self, metadata: NcmMetadata) {
        write_lock(&self.details).metadata = Some(metadata);
    }

    pub(crate) fn set_output(&self, output_path: PathBuf, format: AudioFormat) {
        let mut details = write_lock(&self.details);
        details.output_path = Some(output_path);
        details.format = Some(format);
    }

    pub(crate) fn mark_done(&self) {
        let mut state = write_lock(&self.state);
        if state.is_terminal() {
            return;
        }
        self.progress.store(100, Ordering::Release);
        *state = TrackState::Done;
    }

    pub(crate) fn mark_failed(&self, reason: impl Into<String>) {
        let mut state = write_lock(&self.state);
        if !state.is_terminal() {
            *state = TrackState::Failed(reason.into());
        }
    }
}
