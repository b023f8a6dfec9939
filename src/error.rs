//! 定义了整个 `ncm-dump` 库的错误类型。
//!
//! 错误按影响范围分层：
//! - [`FormatError`]：容器本身不合法，只影响单个文件。
//! - [`DecodeError`]：单个解码任务失败，其他任务不受影响。
//! - [`MetadataError`]：元数据无法解析，不致命，任务会以空元数据继续。

use std::{io, path::PathBuf};
use thiserror::Error;

/// NCM 容器格式错误。
#[derive(Error, Debug)]
pub enum FormatError {
    /// 文件头的魔数与 `CTENFDAM` 不匹配
    #[error("文件头魔数不匹配，不是有效的 NCM 文件")]
    BadMagic,

    /// 某个区块声明的长度超过了文件剩余的字节数
    #[error("文件已被截断: {0} 超出了文件末尾")]
    Truncated(&'static str),

    /// 无法从密钥区块还原出密钥流密钥
    #[error("密钥推导失败: {0}")]
    KeyDerivationFailed(String),
}

/// 单个解码任务的错误。
#[derive(Error, Debug)]
pub enum DecodeError {
    /// 容器格式错误
    #[error(transparent)]
    Format(#[from] FormatError),

    /// 读取源文件或写入输出文件时发生的 I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),

    /// 配置为不覆盖时，目标文件已经存在
    #[error("输出文件已存在: {}", .0.display())]
    OutputExists(PathBuf),

    /// 同一批次中已有另一个文件输出到相同路径
    #[error("输出路径已被同一批次中的其他文件占用: {}", .0.display())]
    OutputClaimed(PathBuf),
}

/// 元数据解密或解析失败。
#[derive(Error, Debug)]
pub enum MetadataError {
    /// 元数据区块缺少 `163 key(Don't modify):` 前缀
    #[error("元数据缺少格式标记前缀")]
    MissingPrefix,

    /// Base64 解码失败 (源自 `base64::DecodeError`)
    #[error("Base64 解码失败: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// AES 解密失败
    #[error("元数据解密失败: {0}")]
    Decryption(String),

    /// JSON 解析失败 (源自 `serde_json::Error`)
    #[error("JSON 解析失败: {0}")]
    JsonParse(#[from] serde_json::Error),
}

/// `ncm-dump` 库的通用错误枚举。
#[derive(Error, Debug)]
pub enum NcmDumpError {
    /// 解码错误
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// 元数据错误
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// JSON 解析失败 (源自 `serde_json::Error`)
    #[error("JSON 解析失败: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// I/O 错误 (源自 `io::Error`)
    #[error("I/O 错误: {0}")]
    Io(#[from] io::Error),

    /// 工作线程池创建失败
    #[error("线程池创建失败: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// 配置无效
    #[error("配置错误: {0}")]
    Config(String),
}

/// `NcmDumpError` 的 `Result` 类型别名，方便在函数签名中使用。
pub type Result<T> = std::result::Result<T, NcmDumpError>;

impl From<FormatError> for NcmDumpError {
    fn from(err: FormatError) -> Self {
        Self::Decode(DecodeError::Format(err))
    }
}
