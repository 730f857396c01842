//! 规则排序命令行入口

use std::path::PathBuf;

use clap::Parser;
use ranker_shared::config::AppConfig;
use ranker_shared::observability;
use rule_ranker::cli::{Cli, CommandRunner, Commands};

const SERVICE_NAME: &str = "rule-ranker";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let env = cli
        .env
        .clone()
        .or_else(|| std::env::var("RANKER_ENV").ok())
        .unwrap_or_else(|| "development".to_string());
    let config_dir = cli
        .config_dir
        .clone()
        .or_else(|| std::env::var("CONFIG_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config"));

    let config = AppConfig::load_from(SERVICE_NAME, &env, &config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    // 命令行日志级别优先于配置文件，RUST_LOG 优先于两者
    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name)
        .with_log_level(cli.log_level.as_deref());
    observability::init(&obs_config)?;

    let runner = CommandRunner::new(config);

    match cli.command {
        Commands::Rank {
            rules,
            input,
            limit,
            reject_invalid,
        } => {
            runner.run_rank(&rules, &input, limit, reject_invalid).await?;
        }
        Commands::Validate { rules, input } => {
            runner.run_validate(&rules, input.as_deref()).await?;
        }
        Commands::Rules {
            rules,
            target,
            offset,
            limit,
        } => {
            runner.run_rules(&rules, target, offset, limit).await?;
        }
        Commands::Targets { rules, max_rules } => {
            runner.run_targets(&rules, max_rules).await?;
        }
    }

    Ok(())
}
