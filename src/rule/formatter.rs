//! # 规则格式化器
//!
//! 定义规则数据结构，以及规则行的解析与格式化。
//! 文件风格与目录风格共用这里的逐行规则，保证两种布局行为一致。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use serde::Serialize;

use super::error::RuleError;

/// 单个 atom 的 flags：去重、保留插入顺序（顺序本身没有语义）
pub type FlagSet = IndexSet<String>;

/// atom -> flags 的映射
pub type RuleSet = BTreeMap<String, FlagSet>;

/// atom 前缀中可能出现的版本比较运算符
pub const OPERATOR_CHARS: &[char] = &['!', '~', '<', '>', '='];

// ========================================
// 规则类型
// ========================================

/// Portage 的 package.* 文件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum RuleType {
    #[value(name = "accept_keywords")]
    AcceptKeywords,
    Env,
    Keywords,
    License,
    Mask,
    Properties,
    Unmask,
    Use,
}

impl RuleType {
    pub const ALL: [RuleType; 8] = [
        RuleType::AcceptKeywords,
        RuleType::Env,
        RuleType::Keywords,
        RuleType::License,
        RuleType::Mask,
        RuleType::Properties,
        RuleType::Unmask,
        RuleType::Use,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::AcceptKeywords => "accept_keywords",
            RuleType::Env => "env",
            RuleType::Keywords => "keywords",
            RuleType::License => "license",
            RuleType::Mask => "mask",
            RuleType::Properties => "properties",
            RuleType::Unmask => "unmask",
            RuleType::Use => "use",
        }
    }

    /// 配置目录下对应的文件名，如 `package.use`
    pub fn file_name(&self) -> String {
        format!("package.{}", self.as_str())
    }

    /// mask / unmask 只看 atom 是否存在，不携带 flags
    pub fn is_presence_only(&self) -> bool {
        matches!(self, RuleType::Mask | RuleType::Unmask)
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RuleError::UnsupportedType(s.to_string()))
    }
}

// ========================================
// 存储布局
// ========================================

/// 规则在磁盘上的布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// 单个普通文件
    File,
    /// 目录，每个 category 一个文件
    Directory,
}

impl Style {
    pub fn flipped(self) -> Self {
        match self {
            Style::File => Style::Directory,
            Style::Directory => Style::File,
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Style::File => write!(f, "file"),
            Style::Directory => write!(f, "directory"),
        }
    }
}

// ========================================
// 单条规则（用于 --json 输出）
// ========================================

/// 单条规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    pub atom: String,
    pub flags: Vec<String>,
}

impl Rule {
    pub fn from_entry(atom: &str, flags: &FlagSet) -> Self {
        Self {
            atom: atom.to_string(),
            flags: flags.iter().cloned().collect(),
        }
    }

    pub fn line(&self) -> String {
        format_rule_line(&self.atom, &self.flags)
    }
}

// ========================================
// 行解析与格式化
// ========================================

/// 从 atom 推导 category：取第一个 `/` 之前的部分并去掉比较运算符
///
/// 没有 `/` 的 atom 没有 category，返回 `None`。
pub fn category_of(atom: &str) -> Option<String> {
    let (head, _) = atom.split_once('/')?;
    Some(head.chars().filter(|c| !OPERATOR_CHARS.contains(c)).collect())
}

/// 解析一行规则
///
/// 空行和注释行返回 `None`；否则第一个 token 为 atom，其余为 flags（已去重）。
pub fn parse_rule_line(line: &str) -> Option<(String, FlagSet)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }

    let mut tokens = trimmed.split_whitespace();
    let atom = tokens.next()?.to_string();
    let flags = tokens.map(str::to_string).collect();
    Some((atom, flags))
}

/// 把所有解析出的规则合并进 `rules`，同一 atom 后出现的覆盖先出现的
pub fn parse_rules_into(content: &str, rules: &mut RuleSet) {
    for (atom, flags) in content.lines().filter_map(parse_rule_line) {
        rules.insert(atom, flags);
    }
}

/// 格式化单条规则行：`<atom> <flag1> <flag2> ...`，无 flags 时只有 atom
pub fn format_rule_line<I, S>(atom: &str, flags: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = atom.to_string();
    for flag in flags {
        line.push(' ');
        line.push_str(flag.as_ref());
    }
    line
}

/// 生成按整行字典序排序的规则行，这是磁盘上的规范顺序
pub fn render_lines(rules: &RuleSet) -> Vec<String> {
    let mut lines: Vec<String> = rules
        .iter()
        .map(|(atom, flags)| format_rule_line(atom, flags))
        .collect();
    lines.sort();
    lines
}
