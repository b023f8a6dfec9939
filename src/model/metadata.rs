//! 从 NCM 元数据区块中解析出的歌曲信息。

use serde::{Deserialize, Serialize};

/// 一首歌的元数据。
///
/// 所有字段都可能缺失；"未知" 之类的占位文字由展示层决定，这里不存储。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcmMetadata {
    /// 歌曲标题 (`musicName`)
    pub title: Option<String>,
    /// 艺术家名字列表，保持原始顺序
    pub artists: Vec<String>,
    /// 专辑名
    pub album: Option<String>,
    /// 专辑 ID
    pub album_id: Option<String>,
    /// 封面图片 ID (`albumPicDocId`)
    pub cover_id: Option<String>,
    /// 封面图片 URL (`albumPic`)
    pub cover_url: Option<String>,
    /// 歌曲 ID
    pub music_id: Option<String>,
    /// 比特率 (bps)
    pub bitrate: Option<u64>,
    /// 时长（毫秒）
    pub duration_ms: Option<u64>,
    /// 元数据声明的音频格式，例如 `"flac"`
    pub format: Option<String>,
}

impl NcmMetadata {
    /// 以 `/` 连接的艺术家名字，没有艺术家时返回 `None`。
    pub fn joined_artists(&self) -> Option<String> {
        (!self.artists.is_empty()).then(|| self.artists.join("/"))
    }
}
