//! # 规则编辑器
//!
//! 在已打开的 [`RuleStore`] 上执行添加、修改、删除和列出操作。
//!
//! ## flags 语法
//! - `foo`: 添加 flag，已存在时给出警告并保持不变
//! - `%foo`: 删除 flag，同时匹配 `foo` 以及去掉首字符后等于 `foo` 的 flag
//!   （如 `-foo`、`+foo`、`~foo`），不存在时什么也不做

use tracing::debug;

use super::error::{RuleError, RuleResult};
use super::formatter::{format_rule_line, FlagSet, Rule};
use super::store::RuleStore;
use crate::resolver::{AtomResolver, Resolution};

/// 删除指令前缀
pub const REMOVAL_PREFIX: char = '%';

/// 一次编辑的结果，供调用方展示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// mask / unmask：atom 已记录
    Applied { atom: String },
    /// 没有给出 flags，只展示现有规则
    Shown { line: String },
    /// 没有给出 flags，且不存在该 atom 的规则
    NoRule { atom: String },
    /// 新建了规则
    Created { line: String },
    /// 修改了已有规则
    Modified {
        atom: String,
        before: String,
        after: String,
        /// 已存在而被忽略的 flags
        duplicates: Vec<String>,
    },
}

/// 规则编辑器
pub struct RuleEditor {
    store: RuleStore,
    resolver: Box<dyn AtomResolver>,
}

impl RuleEditor {
    pub fn new(store: RuleStore, resolver: Box<dyn AtomResolver>) -> Self {
        Self { store, resolver }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RuleStore {
        &mut self.store
    }

    /// 把用户输入的包名解析为 atom；`force` 时直接使用原始输入
    pub fn resolve_atom(&self, package: &str, force: bool) -> RuleResult<String> {
        if force {
            return Ok(package.to_string());
        }

        match self.resolver.resolve(package)? {
            Resolution::Atom(atom) => {
                debug!(package, %atom, "resolved package");
                Ok(atom)
            }
            Resolution::NoMatch => Err(RuleError::NoMatch {
                atom: package.to_string(),
                location: self.resolver.describe(),
            }),
            Resolution::Ambiguous(candidates) => Err(RuleError::AmbiguousAtom {
                package: package.to_string(),
                candidates,
            }),
        }
    }

    /// 解析包名后添加或修改规则
    pub fn modify(&mut self, package: &str, flags: &[String], force: bool) -> RuleResult<EditOutcome> {
        let atom = self.resolve_atom(package, force)?;
        self.set_flags(&atom, flags)
    }

    /// 解析包名后删除规则，返回被删除的 atom
    pub fn delete(&mut self, package: &str, force: bool) -> RuleResult<String> {
        let atom = self.resolve_atom(package, force)?;
        self.delete_rule(&atom)?;
        Ok(atom)
    }

    /// 添加或修改 atom 的 flags
    pub fn set_flags(&mut self, atom: &str, flag_args: &[String]) -> RuleResult<EditOutcome> {
        let rule_type = self.store.rule_type();
        let rules = self.store.ensure_loaded()?;

        if flag_args.is_empty() {
            if rule_type.is_presence_only() {
                rules.insert(atom.to_string(), FlagSet::new());
                self.store.save()?;
                return Ok(EditOutcome::Applied {
                    atom: atom.to_string(),
                });
            }

            return Ok(match rules.get(atom) {
                Some(flags) => EditOutcome::Shown {
                    line: format_rule_line(atom, flags),
                },
                None => EditOutcome::NoRule {
                    atom: atom.to_string(),
                },
            });
        }

        let outcome = match rules.get_mut(atom) {
            Some(flags) => {
                let before = format_rule_line(atom, flags.iter());
                let duplicates = apply_flag_args(flags, flag_args);
                EditOutcome::Modified {
                    atom: atom.to_string(),
                    before,
                    after: format_rule_line(atom, flags.iter()),
                    duplicates,
                }
            }
            None => {
                // 新规则：删除指令无事可做
                let flags: FlagSet = flag_args
                    .iter()
                    .filter(|flag| !flag.starts_with(REMOVAL_PREFIX))
                    .cloned()
                    .collect();
                let line = format_rule_line(atom, &flags);
                rules.insert(atom.to_string(), flags);
                EditOutcome::Created { line }
            }
        };

        self.store.save()?;
        Ok(outcome)
    }

    /// 删除 atom 的整条规则
    pub fn delete_rule(&mut self, atom: &str) -> RuleResult<()> {
        let rules = self.store.ensure_loaded()?;
        if rules.remove(atom).is_none() {
            return Err(RuleError::NoMatch {
                atom: atom.to_string(),
                location: format!("\"{}\"", self.store.path().display()),
            });
        }
        self.store.save()
    }

    /// 按规范顺序列出所有规则行
    pub fn list_rules(&mut self) -> RuleResult<Vec<String>> {
        self.store.ensure_loaded()?;
        self.store.lines()
    }

    /// 列出所有规则（结构化，顺序与 [`list_rules`](Self::list_rules) 一致）
    pub fn list_entries(&mut self) -> RuleResult<Vec<Rule>> {
        let rules = self.store.ensure_loaded()?;
        let mut entries: Vec<Rule> = rules
            .iter()
            .map(|(atom, flags)| Rule::from_entry(atom, flags))
            .collect();
        entries.sort_by_key(Rule::line);
        Ok(entries)
    }
}

/// 依次应用 flag 参数，返回因重复而被忽略的 flags
fn apply_flag_args(flags: &mut FlagSet, flag_args: &[String]) -> Vec<String> {
    let mut duplicates = Vec::new();

    for arg in flag_args {
        if let Some(name) = arg.strip_prefix(REMOVAL_PREFIX) {
            flags.retain(|flag| !matches_removal(flag, name));
        } else if flags.contains(arg) {
            debug!(flag = %arg, "flag already exists");
            duplicates.push(arg.clone());
        } else {
            flags.insert(arg.clone());
        }
    }

    duplicates
}

/// `%name` 匹配 `name` 本身，或去掉首字符后等于 `name` 的 flag
fn matches_removal(flag: &str, name: &str) -> bool {
    if flag == name {
        return true;
    }
    let mut chars = flag.chars();
    chars.next().is_some() && chars.as_str() == name
}
