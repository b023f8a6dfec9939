#![warn(missing_docs)]

//! # NCM Dump RS
//!
//! 一个用于批量解密网易云音乐 NCM 容器的 Rust 库，还原可播放的音频流、内嵌封面和歌曲元数据。
//!
//! ## 主要功能
//!
//! - **容器解析**: 校验 `CTENFDAM` 文件头，划分密钥、元数据、封面与音频区块。
//! - **解密**:
//!   - 通过固定的异或 + AES-128-ECB 还原密钥流密钥。
//!   - 以 256 字节为周期的 RC4 变体密钥流分块解密音频，并根据魔数识别输出格式。
//!   - 解密并解析元数据 JSON，得到标题、艺术家、专辑等信息。
//! - **批量调度**: 在大小受限的线程池中并发解码多个文件，提供逐文件的进度与失败报告。
//!
//! ## 批量解码
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use ncm_dump_rs::{BatchDecoder, DumpConfig};
//!
//! let mut decoder = BatchDecoder::new(DumpConfig::default()).unwrap();
//! decoder.submit_all(["/music/a.ncm", "/music/b.ncm"]);
//!
//! while !decoder.is_complete() {
//!     for track in decoder.snapshots() {
//!         println!("{}: {}%", track.source_path.display(), track.progress);
//!     }
//!     std::thread::sleep(Duration::from_millis(200));
//! }
//!
//! for failure in decoder.drain_failures() {
//!     eprintln!("{}: {}", failure.source_path.display(), failure.reason);
//! }
//! ```
//!
//! ## 单文件解密
//!
//! ```rust,no_run
//! use std::{fs::File, io::{Read, Seek, SeekFrom}};
//!
//! use ncm_dump_rs::ncm::{AudioDecryptor, KeyStream, derive_key, parse_container, read_region};
//!
//! let mut file = File::open("song.ncm").unwrap();
//! let layout = parse_container(&mut file).unwrap();
//! let key = derive_key(&read_region(&mut file, layout.key_box).unwrap()).unwrap();
//!
//! file.seek(SeekFrom::Start(layout.audio.offset)).unwrap();
//! let decryptor = AudioDecryptor::new(
//!     file.take(layout.audio.len),
//!     KeyStream::new(&key).unwrap(),
//!     layout.audio.len,
//!     ncm_dump_rs::ncm::DEFAULT_BLOCK_SIZE,
//! );
//! for block in decryptor {
//!     let block = block.unwrap();
//!     println!("{} 字节，进度 {}%", block.data.len(), block.progress);
//! }
//! ```
pub mod batch;
pub mod config;
pub mod error;
pub mod model;
pub mod ncm;

pub use crate::{
    batch::{BatchDecoder, BatchSummary, FailureReport},
    config::DumpConfig,
    error::{DecodeError, FormatError, MetadataError, NcmDumpError, Result},
    model::{
        format::{AudioFormat, ImageFormat},
        metadata::NcmMetadata,
        track::{TrackRecord, TrackSnapshot, TrackState},
    },
};
