//! NCM 容器格式的解析与解密。
//!
//! 各子模块对应解码流程中的一个环节：
//!
//! - [`container`]: 校验文件头并划分各个区块。
//! - [`key`]: 从密钥区块还原密钥流密钥。
//! - [`keystream`]: 基于 RC4 调度的 256 字节周期密钥流。
//! - [`audio`]: 分块解密音频负载并识别格式。
//! - [`metadata`]: 解密元数据区块并解析 JSON。
//!
//! 参考了 <https://github.com/anonymous5l/ncmdump> 对 NCM 格式的分析。

pub mod audio;
pub mod container;
pub mod crypto;
pub mod key;
pub mod keystream;
pub mod metadata;

pub use audio::{AudioDecryptor, DEFAULT_BLOCK_SIZE, DecodedBlock};
pub use container::{ContainerLayout, NCM_MAGIC, Region, parse_container, read_region};
pub use key::derive_key;
pub use keystream::KeyStream;
pub use metadata::decrypt_metadata;
