//! 音频负载的流式解密。

use std::io::{self, Read};

use crate::{error::DecodeError, model::format::AudioFormat, ncm::keystream::KeyStream};

/// 默认的读取块大小
pub const DEFAULT_BLOCK_SIZE: usize = 0x8000;

/// 解密后的一个数据块。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBlock {
    /// 该块在音频负载中的绝对偏移
    pub offset: u64,
    /// 解密后的字节
    pub data: Vec<u8>,
    /// 处理完该块后的进度百分比 `round(consumed / total * 100)`
    pub progress: u8,
}

/// 按固定大小分块解密音频负载的迭代器。
///
/// 迭代器是有限的，且不能重新开始：它会推进内部的密钥流位置。
/// 出现 I/O 错误后会产出一次 `Err`，之后不再产出任何元素。
pub struct AudioDecryptor<R> {
    reader: R,
    keystream: KeyStream,
    block_size: usize,
    position: u64,
    total: u64,
    detected: Option<AudioFormat>,
    finished: bool,
}

impl<R: Read> AudioDecryptor<R> {
    /// 创建解密器。
    ///
    /// `reader` 应当正好定位在音频负载的起始处；`total` 是负载的总字节数，用于计算进度。
    /// 读取不会超过 `total` 个字节。
    pub fn new(reader: R, keystream: KeyStream, total: u64, block_size: usize) -> Self {
        Self {
            reader,
            keystream,
            block_size: block_size.max(1),
            position: 0,
            total,
            detected: None,
            finished: false,
        }
    }

    /// 第一个块解密后根据魔数识别出的格式。
    pub fn detected_format(&self) -> Option<AudioFormat> {
        self.detected
    }

    /// 已经消耗的字节数。
    pub fn consumed(&self) -> u64 {
        self.position
    }

    /// 当前进度百分比。
    pub fn progress(&self) -> u8 {
        percent(self.position, self.total)
    }

    fn read_block(&mut self) -> io::Result<Vec<u8>> {
        let want = (self.total - self.position).min(self.block_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }
}

impl<R: Read> Iterator for AudioDecryptor<R> {
    type Item = Result<DecodedBlock, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.position >= self.total {
            self.finished = true;
            return None;
        }

        let mut data = match self.read_block() {
            Ok(data) => data,
            Err(e) => {
                self.finished = true;
                return Some(Err(e.into()));
            }
        };

        if data.is_empty() {
            self.finished = true;
            return Some(Err(DecodeError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "音频负载在 {} / {} 字节处提前结束",
                    self.position, self.total
                ),
            ))));
        }

        let offset = self.position;
        self.keystream.apply_at(offset, &mut data);
        if offset == 0 {
            self.detected = AudioFormat::detect(&data);
        }
        self.position += data.len() as u64;

        Some(Ok(DecodedBlock {
            offset,
            data,
            progress: self.progress(),
        }))
    }
}

/// 四舍五入的百分比；`total` 为 0 时视为已完成。
pub(crate) fn percent(consumed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let consumed = u128::from(consumed.min(total));
    let total = u128::from(total);
    ((consumed * 100 + total / 2) / total) as u8
}
