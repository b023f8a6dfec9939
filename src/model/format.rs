//! 音频与封面图片的格式识别。

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};

/// 解密后音频流的封装格式，同时决定输出文件的扩展名。
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG Layer III，带 ID3 标签或直接以帧同步字开头。
    #[default]
    Mp3,
    /// Free Lossless Audio Codec。
    Flac,
    /// Ogg 容器。
    Ogg,
    /// RIFF/WAVE。
    Wav,
    /// ISO BMFF (`ftyp`)，通常为 AAC。
    M4a,
}

impl AudioFormat {
    /// 返回不带点号的文件扩展名。
    pub fn extension(self) -> &'static str {
        self.into()
    }

    /// 根据解密后音频流开头的魔数推断格式。
    ///
    /// 无法识别时返回 `None`，由调用方决定回退策略。
    pub fn detect(header: &[u8]) -> Option<Self> {
        match header {
            [b'I', b'D', b'3', ..] => Some(Self::Mp3),
            [b'f', b'L', b'a', b'C', ..] => Some(Self::Flac),
            [b'O', b'g', b'g', b'S', ..] => Some(Self::Ogg),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'A', b'V', b'E', ..] => Some(Self::Wav),
            [_, _, _, _, b'f', b't', b'y', b'p', ..] => Some(Self::M4a),
            // MPEG 帧同步字：11 个 1，且 layer 字段非 0（排除 ADTS）
            [0xFF, b1, ..] if (b1 & 0xE0) == 0xE0 && (b1 & 0x06) != 0 => Some(Self::Mp3),
            _ => None,
        }
    }

    /// 依次尝试魔数检测结果、元数据中的 `format` 字段和默认格式。
    pub fn resolve(detected: Option<Self>, hint: Option<&str>, fallback: Self) -> Self {
        detected
            .or_else(|| hint.and_then(|h| h.trim().parse().ok()))
            .unwrap_or(fallback)
    }
}

/// 封面图片格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    /// PNG
    Png,
    /// JPEG，也是无法识别时的默认值
    Jpeg,
}

impl ImageFormat {
    const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    /// 通过文件签名判断封面格式。
    pub fn detect(image: &[u8]) -> Self {
        if image.starts_with(&Self::PNG_SIGNATURE) {
            Self::Png
        } else {
            Self::Jpeg
        }
    }

    /// 对应的 MIME 类型。
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}
