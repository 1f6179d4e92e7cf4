//! # eflag
//!
//! 管理 Portage `/etc/portage/package.*` 文件中规则的 CLI 工具。
//!
//! ## 功能
//! - 为 atom 添加 / 删除 flags（`%flag` 表示删除）
//! - mask / unmask 只需要 atom
//! - 删除整条规则、列出所有规则
//! - 在文件风格与目录风格之间转换（自动备份）
//!
//! ## 使用
//! ```bash
//! # 为 python 启用 sqlite，关闭 tk
//! eflag dev-lang/python sqlite -tk
//!
//! # 删除已有的 flag
//! eflag dev-lang/python %sqlite
//!
//! # 接受测试关键字
//! eflag -t accept_keywords '>=dev-lang/rust-1.80' '~amd64'
//!
//! # 列出规则 / 转换布局
//! eflag -t use --show
//! eflag -t use --convert
//! ```

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

mod config;
mod diff;
mod resolver;
mod rule;

use config::{Settings, DEFAULT_REPO, DEFAULT_ROOT};
use resolver::{AtomResolver, LiteralResolver, RepoTreeResolver};
use rule::{EditOutcome, RuleEditor, RuleError, RuleStore, RuleType};

// ========================================
// CLI 参数定义
// ========================================

/// Portage package.* 规则编辑工具
#[derive(Parser, Debug)]
#[command(name = "eflag")]
#[command(version)]
#[command(about = "Ease your /etc/portage/package.* file edition")]
struct Cli {
    /// 要操作的 atom 或包名
    atom: Option<String>,

    /// 为 atom 启用的 flags，以 % 开头的 flag 会被删除
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    flags: Vec<String>,

    /// package 文件类型
    #[arg(short = 't', long = "type", value_enum, default_value_t = RuleType::Use)]
    rule_type: RuleType,

    /// 删除指定 atom 的规则
    #[arg(short, long)]
    delete: bool,

    /// 显示 package 文件中的所有规则
    #[arg(short, long)]
    show: bool,

    /// 以 JSON 格式输出 --show 的结果
    #[arg(long, requires = "show")]
    json: bool,

    /// 在文件风格与目录风格之间转换
    #[arg(short, long)]
    convert: bool,

    /// 不查询仓库，直接使用给出的 atom
    #[arg(short, long)]
    force: bool,

    /// package.* 文件所在目录
    #[arg(long, env = "EFLAG_ROOT", value_name = "DIR", default_value = DEFAULT_ROOT)]
    root: PathBuf,

    /// 用于解析包名的 ebuild 仓库
    #[arg(long, env = "EFLAG_REPO", value_name = "DIR", default_value = DEFAULT_REPO)]
    repo: PathBuf,

    /// 规则文件不存在时不要创建
    #[arg(long)]
    no_create: bool,

    /// 关闭 diff 着色
    #[arg(long)]
    no_color: bool,

    /// 输出更多日志（可重复）
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            root: self.root.clone(),
            repo: self.repo.clone(),
            create_missing: !self.no_create,
            color: !self.no_color && std::io::stdout().is_terminal(),
        }
    }
}

// ========================================
// 主函数
// ========================================

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        match e.downcast_ref::<RuleError>() {
            // 可恢复错误：没有任何修改，只提示原因
            Some(rule_err) if rule_err.is_recoverable() => eprintln!("{}", rule_err),
            _ => eprintln!("Error: {:#}", e),
        }
        process::exit(1);
    }
}

/// 初始化日志，RUST_LOG 优先于 -v
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let settings = cli.settings();
    let path = settings.prepare(cli.rule_type)?;
    let store = RuleStore::open(&path, cli.rule_type)
        .with_context(|| format!("Failed to open {}", cli.rule_type.file_name()))?;

    let resolver: Box<dyn AtomResolver> = if cli.force {
        Box::new(LiteralResolver)
    } else {
        Box::new(RepoTreeResolver::new(&settings.repo))
    };
    let mut editor = RuleEditor::new(store, resolver);

    if cli.show {
        run_show(&mut editor, cli.json)?;
    }
    if cli.convert {
        run_convert(&mut editor)?;
    }
    if let Some(package) = cli.atom.as_deref() {
        if cli.delete {
            let atom = editor.delete(package, cli.force)?;
            println!("Removed \"{}\" from \"{}\"!", atom, path.display());
        } else {
            let outcome = editor.modify(package, &cli.flags, cli.force)?;
            print_outcome(&outcome, &editor, settings.color);
        }
    }

    Ok(())
}

// ========================================
// 子操作
// ========================================

/// 列出所有规则
fn run_show(editor: &mut RuleEditor, json_output: bool) -> Result<()> {
    if json_output {
        let entries = editor.list_entries()?;
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for line in editor.list_rules()? {
            println!("{}", line);
        }
    }
    Ok(())
}

/// 转换布局
fn run_convert(editor: &mut RuleEditor) -> Result<()> {
    let store = editor.store_mut();
    if !store.is_loaded() {
        store.read()?;
    }

    let from = store.style();
    let backup = store.convert()?;
    println!(
        "Backed up \"{}\" to \"{}\".",
        store.path().display(),
        backup.display()
    );
    println!("Converted from {} to {} style.", from, store.style());
    Ok(())
}

/// 打印一次编辑的结果
fn print_outcome(outcome: &EditOutcome, editor: &RuleEditor, color: bool) {
    let path = editor.store().path().display();
    match outcome {
        EditOutcome::Applied { atom } => {
            println!("\"{}\" has been {}ed.", atom, editor.store().rule_type());
        }
        EditOutcome::Shown { line } => println!("{}", line),
        EditOutcome::NoRule { atom } => {
            println!("No rule found for \"{}\" in \"{}\"!", atom, path);
        }
        EditOutcome::Created { line } => println!("Added \"{}\" to \"{}\"!", line, path),
        EditOutcome::Modified {
            atom,
            before,
            after,
            duplicates,
        } => {
            for flag in duplicates {
                eprintln!("Warning: flag \"{}\" already exists!", flag);
            }
            println!("Modified \"{}\":", atom);
            println!("{}", diff::render_rule_diff(before, after, color));
        }
    }
}
