//! # atom 解析
//!
//! 在编辑之前把用户输入的包名规范化为 atom。
//!
//! ## 实现
//! - [`LiteralResolver`]: 原样使用输入（`--force` 以及测试用）
//! - [`RepoTreeResolver`]: 在 ebuild 仓库目录 `<repo>/<category>/<package>/` 中
//!   查找裸包名所属的 category

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::rule::error::{RuleError, RuleResult};
use crate::rule::formatter::OPERATOR_CHARS;

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// 唯一的规范 atom
    Atom(String),
    /// 没有匹配
    NoMatch,
    /// 多个候选
    Ambiguous(Vec<String>),
}

/// atom 解析器
pub trait AtomResolver {
    /// 解析用户输入的包名
    fn resolve(&self, package: &str) -> RuleResult<Resolution>;

    /// 出错提示中使用的查找位置描述
    fn describe(&self) -> String {
        "the package database".to_string()
    }
}

// ========================================
// 原样解析
// ========================================

/// 把任何输入都当作 atom
pub struct LiteralResolver;

impl AtomResolver for LiteralResolver {
    fn resolve(&self, package: &str) -> RuleResult<Resolution> {
        Ok(Resolution::Atom(package.to_string()))
    }
}

// ========================================
// 仓库目录解析
// ========================================

/// 基于 ebuild 仓库目录结构的解析器
pub struct RepoTreeResolver {
    repo: PathBuf,
}

impl RepoTreeResolver {
    pub fn new<P: AsRef<Path>>(repo: P) -> Self {
        Self {
            repo: repo.as_ref().to_path_buf(),
        }
    }

    /// 仓库中所有 category 目录名，已排序
    fn categories(&self) -> RuleResult<Vec<String>> {
        let mut categories = Vec::new();
        let entries = fs::read_dir(&self.repo).map_err(|e| RuleError::io(&self.repo, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| RuleError::io(&self.repo, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            // category 形如 `dev-lang`、`virtual`；跳过 `.git`、`metadata` 等
            if name.starts_with('.') || !entry.path().is_dir() {
                continue;
            }
            if matches!(name.as_str(), "metadata" | "profiles" | "eclass" | "licenses" | "scripts") {
                continue;
            }
            categories.push(name);
        }
        categories.sort();
        Ok(categories)
    }

    /// 在各 category 中查找名为 `name` 的包目录
    fn find_package(&self, name: &str) -> RuleResult<Vec<String>> {
        Ok(self
            .categories()?
            .into_iter()
            .filter(|category| self.repo.join(category).join(name).is_dir())
            .collect())
    }
}

impl AtomResolver for RepoTreeResolver {
    fn resolve(&self, package: &str) -> RuleResult<Resolution> {
        // 已带 category 的输入视为完整 atom
        if package.contains('/') {
            return Ok(Resolution::Atom(package.to_string()));
        }

        let name = package.trim_start_matches(OPERATOR_CHARS);
        if name.is_empty() {
            return Ok(Resolution::NoMatch);
        }
        let operator = &package[..package.len() - name.len()];

        let mut categories = self.find_package(name)?;
        // 带版本的输入（如 `=python-3.11`）按包名再试一次
        if categories.is_empty() {
            if let Some(base) = strip_version(name) {
                categories = self.find_package(base)?;
            }
        }
        debug!(package, candidates = categories.len(), "looked up package in repository");

        let mut atoms: Vec<String> = categories
            .into_iter()
            .map(|category| format!("{}{}/{}", operator, category, name))
            .collect();

        Ok(match atoms.len() {
            0 => Resolution::NoMatch,
            1 => Resolution::Atom(atoms.remove(0)),
            _ => Resolution::Ambiguous(atoms),
        })
    }

    fn describe(&self) -> String {
        format!("repository \"{}\"", self.repo.display())
    }
}

/// 去掉 `-<数字开头的版本>` 后缀，返回包名
fn strip_version(name: &str) -> Option<&str> {
    name.match_indices('-').find_map(|(idx, _)| {
        let rest = &name[idx + 1..];
        rest.starts_with(|c: char| c.is_ascii_digit())
            .then(|| &name[..idx])
    })
}
