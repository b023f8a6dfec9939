//! 元数据区块的解密与解析。

use base64::{Engine as _, prelude::BASE64_STANDARD};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::{
    error::MetadataError,
    model::metadata::NcmMetadata,
    ncm::crypto::{META_BOX_XOR, META_KEY, META_PREFIX, aes_ecb_decrypt, aes_ecb_encrypt, xor_bytes},
};

/// 普通歌曲的 JSON 前缀
const MUSIC_PREFIX: &[u8] = b"music:";
/// 电台节目的 JSON 前缀，真正的歌曲信息位于 `mainMusic` 字段
const DJ_PREFIX: &[u8] = b"dj:";

/// 解密后的 JSON 结构。
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMusicMeta {
    music_id: Option<Value>,
    music_name: Option<String>,
    /// `[[name, id], ...]`
    #[serde(deserialize_with = "null_as_default")]
    artist: Vec<Vec<Value>>,
    album: Option<String>,
    album_id: Option<Value>,
    album_pic_doc_id: Option<Value>,
    album_pic: Option<String>,
    bitrate: Option<u64>,
    duration: Option<u64>,
    format: Option<String>,
    main_music: Option<Box<RawMusicMeta>>,
}

/// 部分文件把缺失的列表写成 `null`。
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// ID 字段在不同版本中可能是数字也可能是字符串。
fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl From<RawMusicMeta> for NcmMetadata {
    fn from(raw: RawMusicMeta) -> Self {
        let artists = raw
            .artist
            .iter()
            .filter_map(|pair| pair.first().and_then(Value::as_str))
            .map(str::to_owned)
            .collect();

        Self {
            title: raw.music_name,
            artists,
            album: raw.album,
            album_id: raw.album_id.as_ref().and_then(value_to_id),
            cover_id: raw.album_pic_doc_id.as_ref().and_then(value_to_id),
            cover_url: raw.album_pic,
            music_id: raw.music_id.as_ref().and_then(value_to_id),
            bitrate: raw.bitrate,
            duration_ms: raw.duration,
            format: raw.format,
        }
    }
}

/// 解密并解析元数据区块。
///
/// 空区块是合法的，返回 `Ok(None)`。
///
/// # 错误
///
/// 前缀缺失、Base64 无效、AES 解密失败或 JSON 无法解析时返回 [`MetadataError`]，
/// 调用方应将其视为非致命错误。
pub fn decrypt_metadata(meta_box: &[u8]) -> Result<Option<NcmMetadata>, MetadataError> {
    if meta_box.is_empty() {
        return Ok(None);
    }

    let deobfuscated = xor_bytes(meta_box, META_BOX_XOR);
    let encoded = deobfuscated
        .strip_prefix(META_PREFIX)
        .ok_or(MetadataError::MissingPrefix)?;

    let encrypted = BASE64_STANDARD.decode(encoded)?;
    let decrypted = aes_ecb_decrypt(&encrypted, &META_KEY).map_err(MetadataError::Decryption)?;

    let (json, is_dj) = if let Some(rest) = decrypted.strip_prefix(MUSIC_PREFIX) {
        (rest, false)
    } else if let Some(rest) = decrypted.strip_prefix(DJ_PREFIX) {
        (rest, true)
    } else {
        (decrypted.as_slice(), false)
    };

    let mut raw: RawMusicMeta = serde_json::from_slice(json)?;
    if is_dj && let Some(main_music) = raw.main_music.take() {
        raw = *main_music;
    }

    Ok(Some(raw.into()))
}

/// [`decrypt_metadata`] 的逆操作：把 `music:` + JSON 封装成元数据区块。
pub fn encode_metadata_box(json: &str) -> Result<Vec<u8>, MetadataError> {
    let mut plaintext = Vec::with_capacity(MUSIC_PREFIX.len() + json.len());
    plaintext.extend_from_slice(MUSIC_PREFIX);
    plaintext.extend_from_slice(json.as_bytes());

    let encrypted = aes_ecb_encrypt(&plaintext, &META_KEY).map_err(MetadataError::Decryption)?;

    let mut boxed = META_PREFIX.to_vec();
    boxed.extend_from_slice(BASE64_STANDARD.encode(encrypted).as_bytes());
    Ok(xor_bytes(&boxed, META_BOX_XOR))
}
