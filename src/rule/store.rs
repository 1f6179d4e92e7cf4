//! # 规则存储
//!
//! 负责 package.* 规则的读取、保存与布局转换。
//!
//! ## 两种布局
//! - 文件风格：`/etc/portage/package.use` 是一个普通文件
//! - 目录风格：`/etc/portage/package.use/` 是目录，每个 category 一个文件
//!
//! ## 注意
//! - 保存总是重新生成整个目标，注释和空行不会保留
//! - 目录风格保存时不会删除已不再被引用的 category 文件；
//!   若某条规则原本位于非 category 命名的文件（如 `zz-local`），修改后会写入
//!   对应的 category 文件，而旧文件仍在，按文件名顺序重新读取时旧规则会覆盖新规则
//! - 没有任何文件锁，假设一次命令独占目标路径

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::error::{RuleError, RuleResult};
use super::formatter::{category_of, parse_rules_into, render_lines, RuleSet, RuleType, Style};

/// 规则存储：绑定一个路径和一种规则类型
#[derive(Debug)]
pub struct RuleStore {
    path: PathBuf,
    rule_type: RuleType,
    style: Style,
    /// `None` 表示尚未读取，`Some(空)` 表示已读取但没有规则
    rules: Option<RuleSet>,
}

impl RuleStore {
    /// 打开规则存储，根据路径上现有的内容判断布局
    pub fn open<P: AsRef<Path>>(path: P, rule_type: RuleType) -> RuleResult<Self> {
        let path = path.as_ref().to_path_buf();
        let style = detect_style(&path)?;
        debug!(path = %path.display(), %style, %rule_type, "opened rule store");

        Ok(Self {
            path,
            rule_type,
            style,
            rules: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rule_type(&self) -> RuleType {
        self.rule_type
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn is_loaded(&self) -> bool {
        self.rules.is_some()
    }

    /// 已加载的规则；未读取时为 `None`
    #[cfg(test)]
    pub fn rules(&self) -> Option<&RuleSet> {
        self.rules.as_ref()
    }

    /// 可变访问已加载的规则
    pub fn rules_mut(&mut self) -> RuleResult<&mut RuleSet> {
        match self.rules.as_mut() {
            Some(rules) => Ok(rules),
            None => Err(RuleError::NotLoaded(self.path.clone())),
        }
    }

    /// 确保规则已加载，必要时读取
    pub fn ensure_loaded(&mut self) -> RuleResult<&mut RuleSet> {
        if self.rules.is_none() {
            self.read()?;
        }
        self.rules_mut()
    }

    /// 从磁盘读取规则，替换内存中已有的内容
    pub fn read(&mut self) -> RuleResult<&RuleSet> {
        if !self.path.exists() {
            return Err(RuleError::NotFound(self.path.clone()));
        }

        let mut rules = RuleSet::new();
        match self.style {
            Style::File => {
                let content =
                    fs::read_to_string(&self.path).map_err(|e| RuleError::io(&self.path, e))?;
                parse_rules_into(&content, &mut rules);
            }
            Style::Directory => {
                for entry in category_files(&self.path)? {
                    let content =
                        fs::read_to_string(&entry).map_err(|e| RuleError::io(&entry, e))?;
                    parse_rules_into(&content, &mut rules);
                }
            }
        }

        debug!(path = %self.path.display(), count = rules.len(), "read rules");
        Ok(&*self.rules.insert(rules))
    }

    /// 规范顺序的规则行（整行字典序）
    pub fn lines(&self) -> RuleResult<Vec<String>> {
        match self.rules.as_ref() {
            Some(rules) => Ok(render_lines(rules)),
            None => Err(RuleError::NotLoaded(self.path.clone())),
        }
    }

    /// 把内存中的规则完整写回磁盘
    pub fn save(&self) -> RuleResult<()> {
        let lines = self.lines()?;

        match self.style {
            Style::File => {
                let content: String = lines.iter().map(|line| format!("{}\n", line)).collect();
                fs::write(&self.path, content).map_err(|e| RuleError::io(&self.path, e))?;
            }
            Style::Directory => {
                let categories = group_by_category(&lines)?;
                fs::create_dir_all(&self.path).map_err(|e| RuleError::io(&self.path, e))?;
                for (category, content) in &categories {
                    let category_file = self.path.join(category);
                    fs::write(&category_file, content)
                        .map_err(|e| RuleError::io(&category_file, e))?;
                }
            }
        }

        debug!(path = %self.path.display(), count = lines.len(), style = %self.style, "saved rules");
        Ok(())
    }

    /// 在文件风格与目录风格之间转换
    ///
    /// 旧布局被整体重命名为 `<path>.bkp.<n>`，新布局完全由内存中的规则重建。
    /// 返回备份路径。
    pub fn convert(&mut self) -> RuleResult<PathBuf> {
        if self.rules.is_none() {
            return Err(RuleError::NotLoaded(self.path.clone()));
        }

        // 目标为目录风格时，先确认每条规则都能落到可读回的 category 文件，
        // 失败时旧布局保持原样
        if self.style == Style::File {
            group_by_category(&self.lines()?)?;
        }

        let backup = backup_path(&self.path);
        info!(from = %self.path.display(), to = %backup.display(), "backing up rules");
        fs::rename(&self.path, &backup).map_err(|e| RuleError::io(&self.path, e))?;

        self.style = self.style.flipped();
        info!(style = %self.style, "converting rule store");
        self.save()?;

        Ok(backup)
    }
}

// ========================================
// 辅助函数
// ========================================

/// 根据路径上现有内容判断布局（跟随符号链接）
fn detect_style(path: &Path) -> RuleResult<Style> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(RuleError::NotFound(path.to_path_buf()))
        }
        Err(e) => return Err(RuleError::io(path, e)),
    };

    if metadata.is_dir() {
        Ok(Style::Directory)
    } else if metadata.is_file() {
        Ok(Style::File)
    } else {
        Err(RuleError::UnsupportedLayout(path.to_path_buf()))
    }
}

/// 目录读取时会被跳过的条目名
fn is_skipped_entry(name: &str) -> bool {
    name.starts_with('.') || name.ends_with('~')
}

/// 按 category 分组规则行，返回 category -> 文件内容
///
/// 缺少 category，或 category 名会被读取跳过时，在写入任何文件之前失败。
fn group_by_category(lines: &[String]) -> RuleResult<BTreeMap<String, String>> {
    let mut categories: BTreeMap<String, String> = BTreeMap::new();
    for line in lines {
        let atom = line.split_once(' ').map_or(line.as_str(), |(atom, _)| atom);
        let category =
            category_of(atom).ok_or_else(|| RuleError::MissingCategory(atom.to_string()))?;
        if category.is_empty() || is_skipped_entry(&category) {
            return Err(RuleError::InvalidCategory {
                atom: atom.to_string(),
                category,
            });
        }
        let content = categories.entry(category).or_default();
        content.push_str(line);
        content.push('\n');
    }
    Ok(categories)
}

/// 列出目录中的 category 文件，按文件名排序
///
/// 跳过隐藏文件、以 `~` 结尾的编辑器备份和子目录，与 Portage 自身的行为一致。
fn category_files(dir: &Path) -> RuleResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| RuleError::io(dir, e))? {
        let entry = entry.map_err(|e| RuleError::io(dir, e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_skipped_entry(&name) {
            debug!(entry = %name, "skipping hidden or backup entry");
            continue;
        }

        let path = entry.path();
        if path.is_dir() {
            warn!(entry = %path.display(), "skipping sub-directory in rule directory");
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// 第一个未被占用的 `<path>.bkp.<n>`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut n = 0u32;
    loop {
        let mut name = path.as_os_str().to_os_string();
        name.push(format!(".bkp.{}", n));
        let candidate = PathBuf::from(name);
        // symlink_metadata 避免悬空链接被误认为空闲
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        n += 1;
    }
}

// ========================================
// 测试模块
// ========================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::formatter::FlagSet;

    fn flags(items: &[&str]) -> FlagSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sample_rules() -> RuleSet {
        let mut rules = RuleSet::new();
        rules.insert("dev-lang/python".to_string(), flags(&["~amd64"]));
        rules.insert("sys-apps/foo".to_string(), FlagSet::new());
        rules.insert(">=sys-apps/bar-2".to_string(), flags(&["x", "-y"]));
        rules
    }

    fn file_store(dir: &Path, content: &str) -> RuleStore {
        let path = dir.join("package.use");
        fs::write(&path, content).unwrap();
        RuleStore::open(&path, RuleType::Use).unwrap()
    }

    #[test]
    fn test_read_file_style_skips_comments_and_blanks() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = file_store(
            tmp.path(),
            "dev-lang/python ~amd64\n# comment\n\nsys-apps/foo",
        );
        assert_eq!(store.style(), Style::File);
        assert!(!store.is_loaded());

        let rules = store.read().unwrap();
        let mut expected = RuleSet::new();
        expected.insert("dev-lang/python".to_string(), flags(&["~amd64"]));
        expected.insert("sys-apps/foo".to_string(), FlagSet::new());
        assert_eq!(rules, &expected);

        store.save().unwrap();
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "dev-lang/python ~amd64\nsys-apps/foo\n"
        );
    }

    #[test]
    fn test_loaded_but_empty_is_not_unloaded() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = file_store(tmp.path(), "# nothing here\n");
        assert!(store.rules().is_none());
        store.read().unwrap();
        assert_eq!(store.rules(), Some(&RuleSet::new()));
        store.convert().unwrap();
    }

    #[test]
    fn test_read_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = file_store(tmp.path(), "a/b x y x\nc/d\n");
        let first = store.read().unwrap().clone();
        let second = store.read().unwrap().clone();
        assert_eq!(first, second);
        assert_eq!(first["a/b"].len(), 2);
    }

    #[test]
    fn test_open_missing_path() {
        let tmp = tempfile::tempdir().unwrap();
        let err = RuleStore::open(tmp.path().join("package.use"), RuleType::Use).unwrap_err();
        assert!(matches!(err, RuleError::NotFound(_)));
    }

    #[test]
    fn test_read_after_path_removed() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = file_store(tmp.path(), "a/b\n");
        fs::remove_file(store.path()).unwrap();
        assert!(matches!(store.read(), Err(RuleError::NotFound(_))));
    }

    #[test]
    fn test_save_before_read_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = file_store(tmp.path(), "a/b\n");
        assert!(matches!(store.save(), Err(RuleError::NotLoaded(_))));
    }

    #[test]
    fn test_file_round_trip_and_idempotent_save() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = file_store(tmp.path(), "");
        store.read().unwrap();
        *store.rules_mut().unwrap() = sample_rules();

        store.save().unwrap();
        let first = fs::read(store.path()).unwrap();
        store.save().unwrap();
        let second = fs::read(store.path()).unwrap();
        assert_eq!(first, second);

        let mut reopened = RuleStore::open(store.path(), RuleType::Use).unwrap();
        assert_eq!(reopened.read().unwrap(), &sample_rules());
    }

    #[test]
    fn test_directory_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("package.use");
        fs::create_dir(&dir).unwrap();

        let mut store = RuleStore::open(&dir, RuleType::Use).unwrap();
        assert_eq!(store.style(), Style::Directory);
        store.read().unwrap();
        *store.rules_mut().unwrap() = sample_rules();
        store.save().unwrap();

        assert_eq!(
            fs::read_to_string(dir.join("sys-apps")).unwrap(),
            ">=sys-apps/bar-2 x -y\nsys-apps/foo\n"
        );
        assert_eq!(
            fs::read_to_string(dir.join("dev-lang")).unwrap(),
            "dev-lang/python ~amd64\n"
        );

        let mut reopened = RuleStore::open(&dir, RuleType::Use).unwrap();
        assert_eq!(reopened.read().unwrap(), &sample_rules());
    }

    #[test]
    fn test_directory_read_merges_and_skips() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("package.accept_keywords");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("dev-lang"), "dev-lang/python ~amd64\n").unwrap();
        fs::write(dir.join("zz-local"), "# mine\ndev-lang/python ~arm64\n").unwrap();
        fs::write(dir.join(".hidden"), "x/hidden\n").unwrap();
        fs::write(dir.join("old~"), "x/backup\n").unwrap();
        fs::create_dir(dir.join("nested")).unwrap();

        let mut store = RuleStore::open(&dir, RuleType::AcceptKeywords).unwrap();
        let rules = store.read().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules["dev-lang/python"], flags(&["~arm64"]));
    }

    #[test]
    fn test_directory_save_keeps_stale_category_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("package.use");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("app-misc"), "app-misc/gone x\n").unwrap();
        fs::write(dir.join("sys-apps"), "sys-apps/foo y\n").unwrap();

        let mut store = RuleStore::open(&dir, RuleType::Use).unwrap();
        store.read().unwrap();
        store.rules_mut().unwrap().remove("app-misc/gone");
        store.save().unwrap();

        assert_eq!(
            fs::read_to_string(dir.join("app-misc")).unwrap(),
            "app-misc/gone x\n"
        );
        assert_eq!(fs::read_to_string(dir.join("sys-apps")).unwrap(), "sys-apps/foo y\n");
    }

    #[test]
    fn test_directory_save_rejects_atom_without_category() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("package.use");
        fs::create_dir(&dir).unwrap();

        let mut store = RuleStore::open(&dir, RuleType::Use).unwrap();
        store.read().unwrap();
        let rules = store.rules_mut().unwrap();
        rules.insert("a/b".to_string(), FlagSet::new());
        rules.insert("nocategory".to_string(), FlagSet::new());

        assert!(matches!(store.save(), Err(RuleError::MissingCategory(a)) if a == "nocategory"));
        assert!(!dir.join("a").exists());
    }

    #[test]
    fn test_directory_save_rejects_unreadable_category() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("package.use");
        fs::create_dir(&dir).unwrap();

        let mut store = RuleStore::open(&dir, RuleType::Use).unwrap();
        store.read().unwrap();
        store
            .rules_mut()
            .unwrap()
            .insert(".hidden/pkg".to_string(), flags(&["x"]));

        assert!(matches!(
            store.save(),
            Err(RuleError::InvalidCategory { ref category, .. }) if category == ".hidden"
        ));
        assert!(!dir.join(".hidden").exists());
    }

    #[test]
    fn test_convert_without_category_keeps_original_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = file_store(tmp.path(), "dev-lang/python x\nnocategory y\n");
        store.read().unwrap();

        assert!(matches!(
            store.convert(),
            Err(RuleError::MissingCategory(a)) if a == "nocategory"
        ));
        assert!(store.path().is_file());
        assert_eq!(store.style(), Style::File);
        assert!(!tmp.path().join("package.use.bkp.0").exists());
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "dev-lang/python x\nnocategory y\n"
        );
    }

    #[test]
    fn test_convert_requires_read() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = file_store(tmp.path(), "a/b\n");
        assert!(matches!(store.convert(), Err(RuleError::NotLoaded(_))));
        assert_eq!(store.style(), Style::File);
        assert!(store.path().is_file());
    }

    #[test]
    fn test_convert_file_to_directory_and_back() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = file_store(
            tmp.path(),
            "# header\ndev-lang/python ~amd64\n\n>=sys-apps/bar-2 x -y\nsys-apps/foo\n",
        );
        let original = store.read().unwrap().clone();

        let backup = store.convert().unwrap();
        assert_eq!(backup, tmp.path().join("package.use.bkp.0"));
        assert!(backup.is_file());
        assert_eq!(store.style(), Style::Directory);
        assert!(store.path().is_dir());

        let mut as_dir = RuleStore::open(store.path(), RuleType::Use).unwrap();
        assert_eq!(as_dir.read().unwrap(), &original);

        let backup = as_dir.convert().unwrap();
        assert_eq!(backup, tmp.path().join("package.use.bkp.1"));
        assert!(backup.is_dir());
        assert_eq!(as_dir.style(), Style::File);

        let mut as_file = RuleStore::open(as_dir.path(), RuleType::Use).unwrap();
        assert_eq!(as_file.read().unwrap(), &original);
        assert!(!fs::read_to_string(as_file.path()).unwrap().contains("# header"));
    }

    #[test]
    fn test_backup_path_probes_unused_name() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("package.mask");
        assert_eq!(backup_path(&path), tmp.path().join("package.mask.bkp.0"));

        fs::write(tmp.path().join("package.mask.bkp.0"), "").unwrap();
        fs::create_dir(tmp.path().join("package.mask.bkp.1")).unwrap();
        assert_eq!(backup_path(&path), tmp.path().join("package.mask.bkp.2"));
    }

    #[test]
    fn test_convert_never_overwrites_backup() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("package.use.bkp.0"), "keep me\n").unwrap();

        let mut store = file_store(tmp.path(), "a/b c\n");
        store.read().unwrap();
        let backup = store.convert().unwrap();

        assert_eq!(backup, tmp.path().join("package.use.bkp.1"));
        assert_eq!(
            fs::read_to_string(tmp.path().join("package.use.bkp.0")).unwrap(),
            "keep me\n"
        );
        assert_eq!(fs::read_to_string(&backup).unwrap(), "a/b c\n");
    }
}
