//! 集成测试共用的 NCM 容器构造工具。

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use ncm_dump_rs::ncm::{
    KeyStream, NCM_MAGIC, key::encode_key_box, metadata::encode_metadata_box,
};

/// 测试用的 16 字节密钥流密钥
pub const TEST_KEY: &[u8; 16] = b"3214176488851E7f";

pub const SAMPLE_JSON: &str = r#"{"musicId":1824020871,"musicName":"灯火通明","artist":[["小蓝背心",12180364]],"albumId":129254497,"album":"灯火通明","albumPicDocId":109951166361218466,"bitrate":320000,"duration":215000,"format":"mp3"}"#;

/// 构造一个 NCM 容器。
pub struct NcmBuilder {
    key: Vec<u8>,
    key_box: Option<Vec<u8>>,
    meta_box: Vec<u8>,
    cover: Vec<u8>,
    audio: Vec<u8>,
}

impl NcmBuilder {
    pub fn new(audio: Vec<u8>) -> Self {
        Self {
            key: TEST_KEY.to_vec(),
            key_box: None,
            meta_box: Vec::new(),
            cover: Vec::new(),
            audio,
        }
    }

    pub fn metadata_json(mut self, json: &str) -> Self {
        self.meta_box = encode_metadata_box(json).expect("封装元数据失败");
        self
    }

    pub fn raw_meta_box(mut self, meta_box: Vec<u8>) -> Self {
        self.meta_box = meta_box;
        self
    }

    pub fn raw_key_box(mut self, key_box: Vec<u8>) -> Self {
        self.key_box = Some(key_box);
        self
    }

    pub fn cover(mut self, cover: Vec<u8>) -> Self {
        self.cover = cover;
        self
    }

    /// 加密后的音频负载，用于和原始文件比对。
    pub fn encrypted_audio(&self) -> Vec<u8> {
        let mut data = self.audio.clone();
        KeyStream::new(&self.key)
            .expect("密钥为空")
            .apply_at(0, &mut data);
        data
    }

    pub fn build(&self) -> Vec<u8> {
        let key_box = match &self.key_box {
            Some(key_box) => key_box.clone(),
            None => encode_key_box(&self.key).expect("封装密钥失败"),
        };

        let mut out = Vec::new();
        out.extend_from_slice(NCM_MAGIC);
        out.extend_from_slice(&[0x01, 0x70]);
        out.extend_from_slice(&(key_box.len() as u32).to_le_bytes());
        out.extend_from_slice(&key_box);
        out.extend_from_slice(&(self.meta_box.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.meta_box);
        out.extend_from_slice(&[0x00; 4]);
        out.push(0x02);
        out.extend_from_slice(&(self.cover.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.cover.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.cover);
        out.extend_from_slice(&self.encrypted_audio());
        out
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build()).expect("写入测试文件失败");
        path
    }
}

/// 以 MP3 帧同步字开头的测试音频。
pub fn mp3_payload(len: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xFB, 0x90, 0x64];
    data.extend((4..len).map(|i| (i * 31 % 256) as u8));
    data.truncate(len);
    data
}

/// 以 `fLaC` 开头的测试音频。
pub fn flac_payload(len: usize) -> Vec<u8> {
    let mut data = b"fLaC".to_vec();
    data.extend((4..len).map(|i| (i * 17 % 256) as u8));
    data.truncate(len);
    data
}
