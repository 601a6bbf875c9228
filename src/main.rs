//! beeline 命令行入口
//!
//! 用法：`beeline [--config <file.toml>] <site.toml> <goal...>`
//! 加载配置、初始化日志，用回放站点作为 Transport 运行 Agent，并把 JSON 报告打印到 stdout。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use beeline::{agent::create_agent, config::load_config, observability, transport::ReplayTransport};

struct CliArgs {
    config: Option<PathBuf>,
    site: PathBuf,
    goal: String,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut args = std::env::args().skip(1).peekable();
    let mut config = None;
    if args.peek().map(String::as_str) == Some("--config") {
        args.next();
        config = Some(PathBuf::from(args.next().context("--config requires a path")?));
    }
    let Some(site) = args.next() else {
        bail!("usage: beeline [--config <file.toml>] <site.toml> <goal...>");
    };
    let goal = args.collect::<Vec<_>>().join(" ");
    if goal.trim().is_empty() {
        bail!("missing goal");
    }
    Ok(CliArgs {
        config,
        site: PathBuf::from(site),
        goal,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = parse_args()?;

    let cfg = load_config(cli.config).context("Failed to load config")?;
    let transport = ReplayTransport::from_file(&cli.site)
        .with_context(|| format!("Failed to load site {}", cli.site.display()))?;
    let agent = create_agent(&cfg, Arc::new(transport)).context("Failed to create agent")?;

    let cancel = agent.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling run");
            cancel.cancel();
        }
    });

    let report = agent.run(&cli.goal).await.context("Agent run failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.succeeded() {
        std::process::exit(2);
    }
    Ok(())
}
