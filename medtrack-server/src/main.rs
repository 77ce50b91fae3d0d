//! Medtrack命令行程序

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use medtrack_admin::{ConfigManager, MedtrackConfig};
use medtrack_database::{DatabasePool, DatabaseQueries};
use medtrack_doses::{decode_dose_id, encode_dose_id, DoseEngine, DoseQuery};
use std::sync::Arc;
use tracing::info;

/// Medtrack命令行参数
#[derive(Parser, Debug)]
#[command(name = "medtrack")]
#[command(about = "Medtrack 剂量计算与服药记录工具")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// 日志级别（覆盖配置文件）
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 创建数据库表和索引
    InitDb,

    /// 列出被照护人在时间窗口内的剂量
    Upcoming {
        /// 调用用户ID
        #[arg(long)]
        user: String,
        /// 被照护人ID
        #[arg(long)]
        recipient: String,
        /// 窗口起点（RFC 3339），默认当前时间
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// 窗口终点（RFC 3339，不含），默认起点后 default_window_days 天
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// 包含已停用药品（仍截止到停用时间）
        #[arg(long)]
        include_inactive: bool,
    },

    /// 标记剂量已服用
    MarkTaken {
        #[arg(long)]
        user: String,
        dose_id: String,
    },

    /// 取消已服用标记
    UnmarkTaken {
        #[arg(long)]
        user: String,
        dose_id: String,
    },

    /// 查看单个剂量
    Show {
        #[arg(long)]
        user: String,
        dose_id: String,
    },

    /// 生成剂量标识
    EncodeDoseId {
        schedule_id: String,
        /// 剂量时刻（RFC 3339）
        scheduled_for: DateTime<Utc>,
    },

    /// 解析剂量标识
    DecodeDoseId { dose_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 日志级别来自配置，因此先加载配置，加载失败时由错误返回值报告
    let config_manager = ConfigManager::new(args.config.as_deref())?;
    let config = config_manager.get_config();

    // 初始化日志，输出到stderr以免干扰JSON结果
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(log_level.as_str())
        .with_writer(std::io::stderr)
        .init();

    match config_manager.config_path() {
        Some(path) => info!("Configuration loaded from: {}", path),
        None => info!("Configuration loaded from defaults and environment"),
    }

    match args.command {
        Command::EncodeDoseId {
            schedule_id,
            scheduled_for,
        } => {
            println!("{}", encode_dose_id(&schedule_id, scheduled_for));
        }
        Command::DecodeDoseId { dose_id } => {
            let (schedule_id, scheduled_for) = decode_dose_id(&dose_id)?;
            println!(
                "{}",
                serde_json::json!({
                    "schedule_id": schedule_id,
                    "scheduled_for": scheduled_for.to_rfc3339(),
                })
            );
        }
        Command::InitDb => {
            let queries = connect(config).await?;
            queries.create_tables().await?;
            info!("Database initialized");
        }
        Command::Upcoming {
            user,
            recipient,
            from,
            to,
            include_inactive,
        } => {
            let engine = build_engine(config).await?;
            let query = DoseQuery {
                from,
                to,
                include_inactive,
            };
            let doses = engine.list_upcoming_doses(&user, &recipient, query).await?;
            println!("{}", serde_json::to_string_pretty(&doses)?);
        }
        Command::MarkTaken { user, dose_id } => {
            let engine = build_engine(config).await?;
            let dose = engine.mark_taken(&user, &dose_id).await?;
            println!("{}", serde_json::to_string_pretty(&dose)?);
        }
        Command::UnmarkTaken { user, dose_id } => {
            let engine = build_engine(config).await?;
            let removed = engine.unmark_taken(&user, &dose_id).await?;
            println!("{}", serde_json::json!({ "removed": removed }));
        }
        Command::Show { user, dose_id } => {
            let engine = build_engine(config).await?;
            let dose = engine.get_dose(&user, &dose_id).await?;
            println!("{}", serde_json::to_string_pretty(&dose)?);
        }
    }

    Ok(())
}

async fn connect(config: &MedtrackConfig) -> Result<DatabaseQueries> {
    let pool = DatabasePool::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.connect_timeout(),
    )
    .await
    .context("Failed to connect to database")?;

    Ok(DatabaseQueries::new(pool))
}

async fn build_engine(config: &MedtrackConfig) -> Result<DoseEngine> {
    let queries = Arc::new(connect(config).await?);
    let engine = DoseEngine::new(queries.clone(), queries.clone(), queries)
        .with_config(config.engine_config()?);

    info!(
        "Dose engine ready (default timezone {}, window {} days)",
        config.doses.default_timezone, config.doses.default_window_days
    );
    Ok(engine)
}
