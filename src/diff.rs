//! # 规则 diff 渲染
//!
//! 对修改前后的两条规则行做按词比较，用于展示修改结果。
//! 纯展示逻辑，不参与持久化。

use crossterm::style::{Color, Stylize};

/// 单个词的变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordChange<'a> {
    Same(&'a str),
    Added(&'a str),
    Removed(&'a str),
}

/// 基于最长公共子序列的按词 diff
pub fn diff_words<'a>(old: &'a str, new: &'a str) -> Vec<WordChange<'a>> {
    let old: Vec<&str> = old.split_whitespace().collect();
    let new: Vec<&str> = new.split_whitespace().collect();

    // lcs[i][j] = old[i..] 与 new[j..] 的 LCS 长度
    let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut changes = Vec::with_capacity(old.len().max(new.len()));
    let (mut i, mut j) = (0, 0);
    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            changes.push(WordChange::Same(old[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            changes.push(WordChange::Removed(old[i]));
            i += 1;
        } else {
            changes.push(WordChange::Added(new[j]));
            j += 1;
        }
    }
    changes.extend(old[i..].iter().copied().map(WordChange::Removed));
    changes.extend(new[j..].iter().copied().map(WordChange::Added));
    changes
}

/// 渲染两条规则行的差异
///
/// 新增的词为蓝色，删除的词为红色；关闭颜色时改用 `+`/`-` 前缀。
pub fn render_rule_diff(old: &str, new: &str, color: bool) -> String {
    let words: Vec<String> = diff_words(old, new)
        .into_iter()
        .map(|change| match (change, color) {
            (WordChange::Same(w), _) => w.to_string(),
            (WordChange::Added(w), true) => w.with(Color::Blue).to_string(),
            (WordChange::Removed(w), true) => w.with(Color::Red).to_string(),
            (WordChange::Added(w), false) => format!("+{}", w),
            (WordChange::Removed(w), false) => format!("-{}", w),
        })
        .collect();
    words.join(" ")
}
