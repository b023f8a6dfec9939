//! 单个文件的解码任务。

use std::{
    collections::HashSet,
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use tracing::{debug, info, instrument, warn};

use crate::{
    config::DumpConfig,
    error::DecodeError,
    model::{
        format::AudioFormat,
        metadata::NcmMetadata,
        track::{TrackRecord, TrackState},
    },
    ncm::{AudioDecryptor, KeyStream, decrypt_metadata, derive_key, read_region},
};

/// 批次内已经被占用的输出路径。
///
/// 每个输出路径在一个批次中只能分配给一个任务，先到先得，直到批次结束都不会释放。
#[derive(Debug, Default)]
pub(crate) struct OutputClaims {
    claimed: Mutex<HashSet<PathBuf>>,
}

impl OutputClaims {
    /// 尝试占用 `path`，已被占用时返回 `false`。
    pub(crate) fn claim(&self, path: &Path) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(claim_key(path))
    }
}

/// 大小写不敏感的文件系统上，只有大小写不同的路径指向同一个文件。
#[cfg(any(windows, target_os = "macos"))]
fn claim_key(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

#[cfg(not(any(windows, target_os = "macos")))]
fn claim_key(path: &Path) -> PathBuf {
    path.to_path_buf()
}

/// 正在写入的输出文件。未调用 [`PartialOutput::commit`] 就被丢弃时会删除文件。
struct PartialOutput {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl PartialOutput {
    fn create(path: &Path, overwrite: bool) -> Result<Self, DecodeError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = if overwrite {
            File::create(path)?
        } else {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .map_err(|e| match e.kind() {
                    io::ErrorKind::AlreadyExists => DecodeError::OutputExists(path.to_path_buf()),
                    _ => DecodeError::Io(e),
                })?
        };

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.write_all(data),
            None => Err(io::Error::other("输出文件已关闭")),
        }
    }

    fn commit(mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        }
        Ok(())
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        // `commit` 会先取走 writer；走到这里说明任务中途失败
        if let Some(writer) = self.writer.take() {
            drop(writer);
            if let Err(e) = fs::remove_file(&self.path) {
                debug!("删除不完整的输出文件 {} 失败: {e}", self.path.display());
            }
        }
    }
}

/// 执行一个记录的完整解码流程，返回输出文件路径。
///
/// 源文件与输出文件的句柄都只在本函数内存活，任何退出路径上都会被关闭。
/// 元数据解析失败只记录警告，不影响音频解码。
#[instrument(skip_all, fields(id = record.id(), path = %record.source_path().display()))]
pub(crate) fn run_decode_job(
    record: &TrackRecord,
    config: &DumpConfig,
    claims: &OutputClaims,
) -> Result<PathBuf, DecodeError> {
    record.set_state(TrackState::Parsing);
    let layout = record.layout();
    let mut source = File::open(record.source_path())?;

    let meta_box = read_region(&mut source, layout.meta_box)?;
    let metadata = match decrypt_metadata(&meta_box) {
        Ok(metadata) => metadata.unwrap_or_default(),
        Err(e) => {
            warn!("元数据解析失败，将以空元数据继续: {e}");
            NcmMetadata::default()
        }
    };
    let format_hint = metadata.format.clone();
    debug!(
        "元数据: 标题 {:?}，艺术家 {:?}",
        metadata.title, metadata.artists
    );
    record.set_metadata(metadata);

    let key_box = read_region(&mut source, layout.key_box)?;
    let keystream = KeyStream::new(&derive_key(&key_box)?)?;

    source.seek(SeekFrom::Start(layout.audio.offset))?;
    let mut decryptor = AudioDecryptor::new(
        source.take(layout.audio.len),
        keystream,
        layout.audio.len,
        config.block_size,
    );
    record.set_state(TrackState::Decoding);

    let first_block = decryptor.next().transpose()?;
    let format = AudioFormat::resolve(
        decryptor.detected_format(),
        format_hint.as_deref(),
        config.default_extension,
    );
    let output_path = config.output_path_for(record.source_path(), format);
    if !claims.claim(&output_path) {
        return Err(DecodeError::OutputClaimed(output_path));
    }
    let mut output = PartialOutput::create(&output_path, config.overwrite)?;
    record.set_output(output_path.clone(), format);
    debug!("识别格式为 {format}，输出到 {}", output_path.display());

    for block in first_block.into_iter().map(Ok).chain(decryptor) {
        let block = block?;
        output.write_all(&block.data)?;
        record.advance(block.progress);
    }

    output.commit()?;
    record.mark_done();
    info!("解码完成: {}", output_path.display());
    Ok(output_path)
}
