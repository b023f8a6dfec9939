//! `ncm-dump` 命令行工具：批量解密 NCM 文件并显示每个文件的进度。
//!
//! 日志级别可以通过 `RUST_LOG` 环境变量调整，默认 `info`。

use std::{
    io::{self, Write},
    path::PathBuf,
    time::Duration,
};

use anyhow::bail;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use ncm_dump_rs::{BatchDecoder, TrackSnapshot, TrackState, config::load_dump_config};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// 批量解密网易云音乐 NCM 文件
#[derive(Parser, Debug)]
#[command(name = "ncm-dump", version, about, long_about = None)]
struct Cli {
    /// 输出目录，默认写到源文件旁边
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// 解码线程数，默认使用 CPU 核心数
    #[arg(short, long, value_name = "N")]
    jobs: Option<usize>,

    /// 不覆盖已经存在的输出文件
    #[arg(long)]
    no_overwrite: bool,

    /// 要解密的 NCM 文件
    #[arg(required = true, value_name = "FILE")]
    inputs: Vec<PathBuf>,
}

/// 日志输出时暂停进度条的重绘，避免两者在终端上交错。
#[derive(Clone)]
struct ProgressWriter(MultiProgress);

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

fn track_label(snapshot: &TrackSnapshot) -> String {
    let name = snapshot.title.clone().unwrap_or_else(|| {
        snapshot
            .source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    let artists = snapshot
        .artist_names
        .as_ref()
        .filter(|a| !a.is_empty())
        .map(|a| a.join("/"))
        .unwrap_or_else(|| "未知艺术家".to_string());
    format!("{name} - {artists}")
}

fn state_label(state: &TrackState) -> &'static str {
    match state {
        TrackState::Pending => "等待中",
        TrackState::Parsing => "解析中",
        TrackState::Decoding => "解码中",
        TrackState::Done => "完成",
        TrackState::Failed(_) => "失败",
    }
}

/// 根据快照刷新进度条。返回该记录是否已进入终态。
fn update_bar(bar: &ProgressBar, snapshot: &TrackSnapshot) -> bool {
    bar.set_position(u64::from(snapshot.progress));
    let label = track_label(snapshot);
    match &snapshot.state {
        TrackState::Done => {
            bar.finish_with_message(format!("{label} {}", state_label(&snapshot.state)));
        }
        TrackState::Failed(reason) => {
            bar.abandon_with_message(format!("{label} 失败: {reason}"));
        }
        state => bar.set_message(format!("{label} {}", state_label(state))),
    }
    snapshot.state.is_terminal()
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let progress = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
    let writer = ProgressWriter(progress.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(move || writer.clone())
        .init();

    let mut config = load_dump_config().unwrap_or_else(|e| {
        warn!("加载配置失败，将使用默认配置: {e}");
        Default::default()
    });
    if cli.output.is_some() {
        config.output_dir = cli.output;
    }
    if cli.jobs.is_some() {
        config.workers = cli.jobs;
    }
    if cli.no_overwrite {
        config.overwrite = false;
    }

    let mut decoder = BatchDecoder::new(config)?;
    let submitted = decoder.submit_all(&cli.inputs);
    info!("共提交 {submitted} 个文件。");

    let style = ProgressStyle::with_template("{bar:30.cyan/blue} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    let bars: Vec<ProgressBar> = decoder
        .records()
        .iter()
        .map(|_| {
            let bar = progress.add(ProgressBar::new(100));
            bar.set_style(style.clone());
            bar
        })
        .collect();
    let mut finished = vec![false; bars.len()];

    let mut failures = 0usize;
    loop {
        let complete = decoder.is_complete();

        for snapshot in decoder.snapshots() {
            if !finished[snapshot.id] {
                finished[snapshot.id] = update_bar(&bars[snapshot.id], &snapshot);
            }
        }

        for failure in decoder.drain_failures() {
            failures += 1;
            error!("{}: {}", failure.source_path.display(), failure.reason);
        }

        if complete {
            break;
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    let summary = decoder.summary();
    // 解析阶段被拒绝的文件不会生成记录，只出现在失败报告里
    let rejected = failures.saturating_sub(summary.failed);
    info!(
        "全部完成: 成功 {}，失败 {}，无法解析 {rejected}。",
        summary.done, summary.failed
    );
    if failures > 0 || summary.has_failures() {
        bail!("{} 个文件处理失败", failures.max(summary.failed));
    }
    Ok(())
}
