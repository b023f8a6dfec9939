//! 负责处理应用的持久化配置。

use std::{
    ffi::OsString,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    thread,
};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    error::{NcmDumpError, Result},
    model::format::AudioFormat,
    ncm::DEFAULT_BLOCK_SIZE,
};

/// 配置文件名
const CONFIG_FILE_NAME: &str = "config.json";

/// 批量解码的配置项。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct DumpConfig {
    /// 每次读取并解密的块大小（字节）。
    pub block_size: usize,
    /// 工作线程数，`None` 表示使用 CPU 核心数。
    pub workers: Option<usize>,
    /// 输出目录，`None` 表示写到源文件旁边。
    pub output_dir: Option<PathBuf>,
    /// 魔数与元数据都无法确定格式时使用的扩展名。
    pub default_extension: AudioFormat,
    /// 是否覆盖已经存在的输出文件。
    pub overwrite: bool,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            workers: None,
            output_dir: None,
            default_extension: AudioFormat::Mp3,
            overwrite: true,
        }
    }
}

impl DumpConfig {
    /// 实际使用的工作线程数。
    pub fn worker_count(&self) -> usize {
        self.workers.filter(|&n| n > 0).unwrap_or_else(|| {
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)
        })
    }

    /// 根据源文件路径和识别出的格式计算输出路径：保留文件名主干，替换扩展名。
    pub fn output_path_for(&self, source: &Path, format: AudioFormat) -> PathBuf {
        // 不能用 `with_extension`，文件名主干本身可能含有点号
        let mut file_name = source
            .file_stem()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("output"));
        file_name.push(".");
        file_name.push(format.extension());

        match (&self.output_dir, source.parent()) {
            (Some(dir), _) => dir.join(file_name),
            (None, Some(parent)) => parent.join(file_name),
            (None, None) => PathBuf::from(file_name),
        }
    }

    /// 检查配置是否可用。
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(NcmDumpError::Config("block_size 不能为 0".into()));
        }
        if let Some(dir) = &self.output_dir
            && dir.exists()
            && !dir.is_dir()
        {
            return Err(NcmDumpError::Config(format!(
                "输出路径 {} 不是目录",
                dir.display()
            )));
        }
        Ok(())
    }
}

/// 获取应用配置目录下指定文件的完整路径。
///
/// # 参数
/// * `filename` - 目标配置文件的名称，例如 "config.json"。
pub(crate) fn get_config_file_path(filename: &str) -> std::result::Result<PathBuf, std::io::Error> {
    if let Some(mut config_dir) = dirs::config_dir() {
        config_dir.push("ncm-dump");
        fs::create_dir_all(&config_dir)?;
        config_dir.push(filename);
        Ok(config_dir)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "无法找到用户配置目录",
        ))
    }
}

/// 从指定文件加载配置，文件不存在时返回默认配置。
pub fn load_dump_config_from(path: &Path) -> Result<DumpConfig> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let config: DumpConfig = serde_json::from_str(&content)?;
            config.validate()?;
            info!("已从 {} 加载配置。", path.display());
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("配置文件不存在，将使用默认配置。");
            Ok(DumpConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// 将配置序列化为 JSON 并保存到指定文件。
pub fn save_dump_config_to(config: &DumpConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content)?;
    info!("配置已保存到 {}。", path.display());
    Ok(())
}

/// 从用户配置目录加载配置。
pub fn load_dump_config() -> Result<DumpConfig> {
    match get_config_file_path(CONFIG_FILE_NAME) {
        Ok(path) => load_dump_config_from(&path),
        Err(e) => {
            warn!("无法定位配置目录 ({e})，将使用默认配置。");
            Ok(DumpConfig::default())
        }
    }
}

/// 将配置保存到用户配置目录。
pub fn save_dump_config(config: &DumpConfig) -> Result<()> {
    let path = get_config_file_path(CONFIG_FILE_NAME)?;
    save_dump_config_to(config, &path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_beside_source() {
        let config = DumpConfig::default();
        assert_eq!(
            config.output_path_for(Path::new("/music/歌.曲.ncm"), AudioFormat::Flac),
            PathBuf::from("/music/歌.曲.flac")
        );
    }

    #[test]
    fn test_output_path_in_output_dir() {
        let config = DumpConfig {
            output_dir: Some(PathBuf::from("/out")),
            ..Default::default()
        };
        assert_eq!(
            config.output_path_for(Path::new("/music/a.NCM"), AudioFormat::Mp3),
            PathBuf::from("/out/a.mp3")
        );
    }

    #[test]
    fn test_worker_count() {
        let config = DumpConfig {
            workers: Some(3),
            ..Default::default()
        };
        assert_eq!(config.worker_count(), 3);
        let config = DumpConfig {
            workers: Some(0),
            ..Default::default()
        };
        assert!(config.worker_count() >= 1);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: DumpConfig =
            serde_json::from_str(r#"{"default_extension":"flac","overwrite":false}"#).unwrap();
        assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(config.default_extension, AudioFormat::Flac);
        assert!(!config.overwrite);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        assert_eq!(load_dump_config_from(&path).unwrap(), DumpConfig::default());

        let config = DumpConfig {
            block_size: 4096,
            workers: Some(2),
            ..Default::default()
        };
        save_dump_config_to(&config, &path).unwrap();
        assert_eq!(load_dump_config_from(&path).unwrap(), config);
    }

    #[test]
    fn test_zero_block_size_is_invalid() {
        let config = DumpConfig {
            block_size: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(NcmDumpError::Config(_))));
    }
}
