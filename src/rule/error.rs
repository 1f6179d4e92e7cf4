//! # 规则存储错误
//!
//! 区分致命错误（路径缺失、类型不支持、写入失败）与可恢复错误
//! （atom 解析无结果或有歧义），调用方据此决定如何提示用户。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// 规则存储与编辑过程中可能出现的错误
#[derive(Debug, Error)]
pub enum RuleError {
    /// 读取或打开时目标路径不存在
    #[error("\"{}\" does not exist", .0.display())]
    NotFound(PathBuf),

    /// 不是可识别的规则类型
    #[error("unsupported rule type \"{0}\"")]
    UnsupportedType(String),

    /// 路径存在，但既不是普通文件也不是目录
    #[error("\"{}\" is not a file or directory", .0.display())]
    UnsupportedLayout(PathBuf),

    /// atom 解析得到多个候选
    #[error("found several matches for \"{package}\": {}", .candidates.join(", "))]
    AmbiguousAtom {
        package: String,
        candidates: Vec<String>,
    },

    /// 没有匹配（atom 解析或删除时）
    #[error("no match for \"{atom}\" found in {location}")]
    NoMatch { atom: String, location: String },

    /// 规则尚未读取就执行了需要已加载规则的操作
    #[error("rules of \"{}\" must be read before converting or saving", .0.display())]
    NotLoaded(PathBuf),

    /// 目录风格下 atom 缺少 category，无法决定写入哪个文件
    #[error("atom \"{0}\" has no category, cannot save it in directory style")]
    MissingCategory(String),

    /// category 名会被目录读取跳过（隐藏文件或 `~` 结尾），写入后无法读回
    #[error("atom \"{atom}\" has category \"{category}\", which cannot be stored as a category file")]
    InvalidCategory { atom: String, category: String },

    /// 底层文件系统错误
    #[error("I/O error on \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RuleError {
    /// 可恢复错误：操作已干净地中止且没有修改任何状态
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RuleError::AmbiguousAtom { .. } | RuleError::NoMatch { .. })
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        RuleError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type RuleResult<T> = std::result::Result<T, RuleError>;
