//! 定义了整个库通用的核心数据模型。

pub mod format;
pub mod metadata;
pub mod track;
