//! # 运行配置
//!
//! 由命令行参数和环境变量（`EFLAG_ROOT`、`EFLAG_REPO`）共同决定。

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::rule::RuleType;

/// 默认的 Portage 配置目录
pub const DEFAULT_ROOT: &str = "/etc/portage";

/// 默认的 ebuild 仓库目录
pub const DEFAULT_REPO: &str = "/var/db/repos/gentoo";

/// 运行配置
#[derive(Debug, Clone)]
pub struct Settings {
    /// package.* 文件所在目录
    pub root: PathBuf,
    /// 用于解析包名的 ebuild 仓库
    pub repo: PathBuf,
    /// 规则文件不存在时是否创建空文件
    pub create_missing: bool,
    /// diff 是否着色
    pub color: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            repo: PathBuf::from(DEFAULT_REPO),
            create_missing: true,
            color: true,
        }
    }
}

impl Settings {
    /// 规则类型对应的路径，如 `/etc/portage/package.use`
    pub fn rule_path(&self, rule_type: RuleType) -> PathBuf {
        self.root.join(rule_type.file_name())
    }

    /// 返回规则路径；允许时为不存在的路径创建空文件
    pub fn prepare(&self, rule_type: RuleType) -> Result<PathBuf> {
        let path = self.rule_path(rule_type);
        if self.create_missing && fs::symlink_metadata(&path).is_err() {
            fs::write(&path, "")
                .with_context(|| format!("Failed to create rule file: {}", path.display()))?;
            info!(path = %path.display(), "created empty rule file");
        }
        Ok(path)
    }
}
