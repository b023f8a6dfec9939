//! 批量解码调度器。
//!
//! [`BatchDecoder`] 接收候选路径，同步解析每个容器并为合法文件建立 [`TrackRecord`]，
//! 然后把解码任务提交给大小受限的 `rayon` 线程池。
//! 展示层通过 [`BatchDecoder::snapshots`]、[`BatchDecoder::summary`] 等只读接口轮询进度，
//! 通过 [`BatchDecoder::drain_failures`] 获取失败报告。

mod job;

use std::{
    fs::File,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        mpsc::{self, Receiver, Sender},
    },
    time::Duration,
};

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use self::job::OutputClaims;
use crate::{
    config::DumpConfig,
    error::{DecodeError, Result},
    model::track::{TrackRecord, TrackSnapshot, TrackState},
    ncm::{ContainerLayout, parse_container, read_region},
};

/// NCM 文件的扩展名（不区分大小写）
pub const NCM_FILE_EXTENSION: &str = "ncm";

/// 单个文件的失败报告。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureReport {
    /// 出错的源文件
    pub source_path: PathBuf,
    /// 简短的失败原因
    pub reason: String,
}

/// 批次的聚合状态。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// 已提交的记录总数
    pub total: usize,
    /// 等待执行
    pub pending: usize,
    /// 正在解析或解码
    pub active: usize,
    /// 成功
    pub done: usize,
    /// 失败
    pub failed: usize,
}

impl BatchSummary {
    /// 所有记录是否都已进入终态。
    pub fn is_complete(&self) -> bool {
        self.done + self.failed == self.total
    }

    /// 是否有记录失败，即批次部分失败。
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// 已结束任务的计数，供 [`BatchDecoder::wait`] 阻塞等待。
#[derive(Default)]
struct Completion {
    finished: Mutex<usize>,
    signal: Condvar,
}

impl Completion {
    fn finish_one(&self) {
        let mut finished = self.finished.lock().unwrap_or_else(PoisonError::into_inner);
        *finished += 1;
        self.signal.notify_all();
    }
}

/// 判断一个路径是否是候选的 NCM 文件：不是目录，且扩展名为 `ncm`（不区分大小写）。
pub fn is_candidate(path: &Path) -> bool {
    !path.is_dir()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(NCM_FILE_EXTENSION))
}

/// 打开并解析容器，同时读出封面。文件句柄在返回前关闭。
fn open_container(path: &Path) -> std::result::Result<(ContainerLayout, Vec<u8>), DecodeError> {
    let mut file = File::open(path)?;
    let layout = parse_container(&mut file)?;
    let cover = read_region(&mut file, layout.cover)?;
    Ok((layout, cover))
}

/// 批量解码调度器。
pub struct BatchDecoder {
    config: Arc<DumpConfig>,
    pool: ThreadPool,
    records: Vec<Arc<TrackRecord>>,
    completion: Arc<Completion>,
    claims: Arc<OutputClaims>,
    failures_tx: Sender<FailureReport>,
    failures_rx: Receiver<FailureReport>,
}

impl BatchDecoder {
    /// 使用给定配置创建调度器，线程池大小为 [`DumpConfig::worker_count`]。
    pub fn new(config: DumpConfig) -> Result<Self> {
        config.validate()?;
        let workers = config.worker_count();
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ncm-dump-{i}"))
            .build()?;
        info!("已创建 {workers} 个解码线程。");

        let (failures_tx, failures_rx) = mpsc::channel();
        Ok(Self {
            config: Arc::new(config),
            pool,
            records: Vec::new(),
            completion: Arc::new(Completion::default()),
            claims: Arc::new(OutputClaims::default()),
            failures_tx,
            failures_rx,
        })
    }

    /// 当前使用的配置。
    pub fn config(&self) -> &DumpConfig {
        &self.config
    }

    /// 接受一个候选路径并同步解析。
    ///
    /// - 目录或扩展名不符的路径被静默跳过，返回 `None`。
    /// - 解析失败时记录警告并写入失败报告，不创建记录，返回 `None`。
    fn accept(&mut self, path: impl AsRef<Path>) -> Option<Arc<TrackRecord>> {
        let path = path.as_ref();
        if !is_candidate(path) {
            debug!("跳过非 NCM 路径: {}", path.display());
            return None;
        }

        let source_path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        match open_container(&source_path) {
            Ok((layout, cover)) => {
                let record = Arc::new(TrackRecord::new(
                    self.records.len(),
                    source_path,
                    layout,
                    Some(cover),
                ));
                self.records.push(Arc::clone(&record));
                Some(record)
            }
            Err(e) => {
                warn!("无法解析 {}: {e}", source_path.display());
                self.report(source_path, e.to_string());
                None
            }
        }
    }

    /// 接受一个路径，解析成功后立即提交其解码任务。返回是否提交成功。
    ///
    /// 记录在提交前已经完整解析，任务开始时不会再看到半成品状态。
    pub fn submit(&mut self, path: impl AsRef<Path>) -> bool {
        match self.accept(path) {
            Some(record) => {
                self.spawn(record);
                true
            }
            None => false,
        }
    }

    /// 依次提交多个路径，返回成功提交的数量。
    pub fn submit_all<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths
            .into_iter()
            .map(|path| self.submit(path))
            .filter(|&submitted| submitted)
            .count()
    }

    fn spawn(&self, record: Arc<TrackRecord>) {
        let config = Arc::clone(&self.config);
        let completion = Arc::clone(&self.completion);
        let claims = Arc::clone(&self.claims);
        let failures = self.failures_tx.clone();

        self.pool.spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                job::run_decode_job(&record, &config, &claims)
            }));

            let failure = match outcome {
                Ok(Ok(_)) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some("解码任务意外中止".to_string()),
            };

            if let Some(reason) = failure {
                error!("解码 {} 失败: {reason}", record.source_path().display());
                // 先发送报告再进入终态，观察到批次完成的轮询方一定能取到这份报告。
                // 接收端随调度器一起销毁时，报告没有人读，直接丢弃
                let _ = failures.send(FailureReport {
                    source_path: record.source_path().to_path_buf(),
                    reason: reason.clone(),
                });
                record.mark_failed(reason);
            }

            completion.finish_one();
        });
    }

    fn report(&self, source_path: PathBuf, reason: String) {
        let _ = self.failures_tx.send(FailureReport {
            source_path,
            reason,
        });
    }

    /// 所有记录。记录的公开接口都是只读的，可以安全地在轮询中读取。
    pub fn records(&self) -> &[Arc<TrackRecord>] {
        &self.records
    }

    /// 所有记录的快照。
    pub fn snapshots(&self) -> Vec<TrackSnapshot> {
        self.records.iter().map(|r| r.snapshot()).collect()
    }

    /// 按状态统计记录数量。
    pub fn summary(&self) -> BatchSummary {
        self.records
            .iter()
            .fold(BatchSummary::default(), |mut summary, record| {
                summary.total += 1;
                match record.state() {
                    TrackState::Pending => summary.pending += 1,
                    TrackState::Parsing | TrackState::Decoding => summary.active += 1,
                    TrackState::Done => summary.done += 1,
                    TrackState::Failed(_) => summary.failed += 1,
                }
                summary
            })
    }

    /// 所有已提交的任务是否都已结束。即时计算，不阻塞。
    pub fn is_complete(&self) -> bool {
        self.records.iter().all(|r| r.is_terminal())
    }

    /// 阻塞直到所有已提交的任务结束。
    pub fn wait(&self) {
        let total = self.records.len();
        let finished = self
            .completion
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _finished = self
            .completion
            .signal
            .wait_while(finished, |n| *n < total)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// 最多等待 `timeout`，返回届时是否全部结束。
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let total = self.records.len();
        let finished = self
            .completion
            .finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (finished, _) = self
            .completion
            .signal
            .wait_timeout_while(finished, timeout, |n| *n < total)
            .unwrap_or_else(PoisonError::into_inner);
        *finished >= total
    }

    /// 取出目前为止积累的失败报告，不阻塞。每个失败的文件只会被报告一次。
    pub fn drain_failures(&self) -> Vec<FailureReport> {
        self.failures_rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_candidate() {
        assert!(is_candidate(Path::new("/nonexistent/a.ncm")));
        assert!(is_candidate(Path::new("/nonexistent/B.NCM")));
        assert!(!is_candidate(Path::new("/nonexistent/a.mp3")));
        assert!(!is_candidate(Path::new("/nonexistent/ncm")));

        let dir = tempfile::Builder::new().suffix(".ncm").tempdir().unwrap();
        assert!(!is_candidate(dir.path()));
    }

    #[test]
    fn test_summary_of_empty_batch() {
        let decoder = BatchDecoder::new(DumpConfig {
            workers: Some(1),
            ..Default::default()
        })
        .unwrap();
        let summary = decoder.summary();
        assert_eq!(summary, BatchSummary::default());
        assert!(summary.is_complete());
        assert!(decoder.is_complete());
        assert!(decoder.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let mut decoder = BatchDecoder::new(DumpConfig::default()).unwrap();
        assert!(!decoder.submit("/nonexistent/missing.ncm"));
        let failures = decoder.drain_failures();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].source_path.ends_with("missing.ncm"));
        assert!(decoder.drain_failures().is_empty());
    }
}
