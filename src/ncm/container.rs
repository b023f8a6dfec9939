//! NCM 容器的二进制布局解析。
//!
//! 布局（所有长度均为小端 `u32`）：
//!
//! ```text
//! "CTENFDAM" | 2 字节间隙 | key_len | key_box | meta_len | meta_box
//!   | CRC32 (4 字节) | 图片标志 (1 字节) | frame_len | image_len | image | 填充 | 音频负载 ...
//! ```
//!
//! 解析只记录各区块的偏移和长度，不读取负载本身。

use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{DecodeError, FormatError};

/// 文件头魔数
pub const NCM_MAGIC: &[u8; 8] = b"CTENFDAM";
/// 魔数之后的保留间隙
const MAGIC_GAP: u64 = 2;
/// 元数据区块之后的 CRC32 区域
const CRC_LEN: u64 = 4;

/// 文件中的一段连续字节。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    /// 起始偏移
    pub offset: u64,
    /// 字节数
    pub len: u64,
}

impl Region {
    /// 区块是否为空。
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 区块结束位置（不含）。
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

/// 一个 NCM 容器的区块描述。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    /// 加密的密钥区块
    pub key_box: Region,
    /// 加密的元数据区块，可能为空
    pub meta_box: Region,
    /// 图片标志字节（图片版本号）
    pub image_flag: u8,
    /// 封面图片，无封面时为空
    pub cover: Region,
    /// 加密的音频负载，一直延续到文件末尾
    pub audio: Region,
}

/// 在读取时跟踪当前位置和文件总长度的辅助结构。
struct LayoutReader<'a, R> {
    reader: &'a mut R,
    position: u64,
    file_len: u64,
}

impl<R: Read + Seek> LayoutReader<'_, R> {
    fn remaining(&self) -> u64 {
        self.file_len.saturating_sub(self.position)
    }

    fn ensure(&self, len: u64, what: &'static str) -> Result<(), FormatError> {
        if len > self.remaining() {
            Err(FormatError::Truncated(what))
        } else {
            Ok(())
        }
    }

    fn read_array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], DecodeError> {
        self.ensure(N as u64, what)?;
        let mut buf = [0u8; N];
        self.reader.read_exact(&mut buf)?;
        self.position += N as u64;
        Ok(buf)
    }

    fn read_u32(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        self.read_array::<4>(what).map(u32::from_le_bytes)
    }

    fn skip(&mut self, len: u64, what: &'static str) -> Result<(), DecodeError> {
        self.ensure(len, what)?;
        self.position += len;
        self.reader.seek(SeekFrom::Start(self.position))?;
        Ok(())
    }

    /// 记录一段长度为 `len` 的区块并跳过它。
    fn take_region(&mut self, len: u64, what: &'static str) -> Result<Region, DecodeError> {
        let region = Region {
            offset: self.position,
            len,
        };
        self.skip(len, what)?;
        Ok(region)
    }
}

/// 解析容器布局。
///
/// # 错误
///
/// * `FormatError::BadMagic` - 文件头不是 `CTENFDAM`（包括文件短于魔数的情况）。
/// * `FormatError::Truncated` - 任何声明的长度超过剩余字节数。
/// * `DecodeError::Io` - 底层读取失败。
pub fn parse_container<R: Read + Seek>(reader: &mut R) -> Result<ContainerLayout, DecodeError> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let mut cursor = LayoutReader {
        reader,
        position: 0,
        file_len,
    };

    if file_len < NCM_MAGIC.len() as u64 {
        return Err(FormatError::BadMagic.into());
    }
    let magic = cursor.read_array::<8>("文件头")?;
    if &magic != NCM_MAGIC {
        return Err(FormatError::BadMagic.into());
    }
    cursor.skip(MAGIC_GAP, "文件头间隙")?;

    let key_len = cursor.read_u32("密钥区块长度")?;
    let key_box = cursor.take_region(u64::from(key_len), "密钥区块")?;

    let meta_len = cursor.read_u32("元数据区块长度")?;
    let meta_box = cursor.take_region(u64::from(meta_len), "元数据区块")?;

    cursor.skip(CRC_LEN, "CRC 校验区")?;
    let [image_flag] = cursor.read_array::<1>("图片标志")?;
    let frame_len = u64::from(cursor.read_u32("封面帧长度")?);
    let image_len = u64::from(cursor.read_u32("封面长度")?);

    let cover = cursor.take_region(image_len, "封面图片")?;
    // 帧长度包含图片本身和其后的填充；旧版本的帧长度可能小于图片长度
    cursor.skip(frame_len.saturating_sub(image_len), "封面填充")?;

    let audio = Region {
        offset: cursor.position,
        len: cursor.remaining(),
    };

    Ok(ContainerLayout {
        key_box,
        meta_box,
        image_flag,
        cover,
        audio,
    })
}

/// 读取某个区块的全部字节。
pub fn read_region<R: Read + Seek>(reader: &mut R, region: Region) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; region.len as usize];
    if !region.is_empty() {
        reader.seek(SeekFrom::Start(region.offset))?;
        reader.read_exact(&mut buf)?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn build(key: &[u8], meta: &[u8], frame_len: u32, image: &[u8], audio: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(NCM_MAGIC);
        out.extend_from_slice(&[0x01, 0x70]);
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(key);
        out.extend_from_slice(&(meta.len() as u32).to_le_bytes());
        out.extend_from_slice(meta);
        out.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        out.push(0x01);
        out.extend_from_slice(&frame_len.to_le_bytes());
        out.extend_from_slice(&(image.len() as u32).to_le_bytes());
        out.extend_from_slice(image);
        out.resize(out.len() + (frame_len as usize).saturating_sub(image.len()), 0);
        out.extend_from_slice(audio);
        out
    }

    #[test]
    fn test_parse_regions() {
        let data = build(&[1; 16], &[2; 10], 8, &[3; 5], &[4; 100]);
        let layout = parse_container(&mut Cursor::new(&data)).unwrap();

        assert_eq!(layout.key_box, Region { offset: 14, len: 16 });
        assert_eq!(layout.meta_box, Region { offset: 34, len: 10 });
        assert_eq!(layout.image_flag, 0x01);
        assert_eq!(layout.cover, Region { offset: 57, len: 5 });
        assert_eq!(layout.audio, Region { offset: 65, len: 100 });
        assert_eq!(layout.audio.end(), data.len() as u64);

        let cover = read_region(&mut Cursor::new(&data), layout.cover).unwrap();
        assert_eq!(cover, vec![3; 5]);
    }

    #[test]
    fn test_no_cover() {
        let data = build(&[1; 16], &[], 0, &[], &[9; 3]);
        let layout = parse_container(&mut Cursor::new(&data)).unwrap();
        assert!(layout.meta_box.is_empty());
        assert!(layout.cover.is_empty());
        assert_eq!(layout.audio.len, 3);
    }

    #[test]
    fn test_bad_magic() {
        let mut data = build(&[1; 16], &[], 0, &[], &[9; 3]);
        data[..4].copy_from_slice(b"RIFF");
        let err = parse_container(&mut Cursor::new(&data)).unwrap_err();
        assert!(matches!(err, DecodeError::Format(FormatError::BadMagic)));

        let err = parse_container(&mut Cursor::new(b"CTEN".to_vec())).unwrap_err();
        assert!(matches!(err, DecodeError::Format(FormatError::BadMagic)));
    }

    #[test]
    fn test_truncated_key_box() {
        let mut data = Vec::new();
        data.extend_from_slice(NCM_MAGIC);
        data.extend_from_slice(&[0, 0]);
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(&[0; 20]);
        let err = parse_container(&mut Cursor::new(&data)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Format(FormatError::Truncated("密钥区块"))
        ));
    }

    #[test]
    fn test_truncated_cover() {
        let mut data = build(&[1; 16], &[2; 4], 0, &[3; 64], &[]);
        data.truncate(data.len() - 10);
        let err = parse_container(&mut Cursor::new(&data)).unwrap_err();
        assert!(matches!(err, DecodeError::Format(FormatError::Truncated(_))));
    }
}
