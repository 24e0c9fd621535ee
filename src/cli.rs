use std::path::PathBuf;

use clap::{Parser, Subcommand};
use proxyrec::config::{ConfigLoader, ProxyConfig};
use proxyrec::history::{self, RawParts};
use proxyrec::proxy::ProxyServer;
use proxyrec::utils::DumpFormat;

pub type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// 配置文件路径（默认查找 proxyrec.toml）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 覆盖记录目录
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 启动代理（默认命令）
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// 把每次交换打印到 stdout: off | compact | verbose（不带值时为 verbose）
        #[arg(long, num_args = 0..=1, default_missing_value = "verbose", value_parser = parse_dump_format)]
        debug_dump: Option<DumpFormat>,
        /// 同时保存原始请求
        #[arg(long)]
        record_raw: bool,
    },
    /// 显示最近一条记录
    Latest {
        /// 输出原始请求而不是表格
        #[arg(long)]
        raw: bool,
        /// 与 --raw 一起使用: none | head | body | all
        #[arg(long, default_value = "all", value_parser = parse_raw_parts)]
        parts: RawParts,
    },
}

fn parse_dump_format(s: &str) -> std::result::Result<DumpFormat, String> {
    s.parse().map_err(|e: proxyrec::ProxyError| e.to_string())
}

fn parse_raw_parts(s: &str) -> std::result::Result<RawParts, String> {
    s.parse().map_err(|e: proxyrec::ProxyError| e.to_string())
}

impl Cli {
    /// 配置文件 + 环境变量 + 命令行，后者优先
    fn load_config(&self) -> Result<ProxyConfig> {
        let mut config = ConfigLoader::load(self.config.as_deref())?;

        if let Some(dir) = &self.storage_dir {
            config.storage.dir = dir.clone();
        }

        if let Some(Commands::Serve {
            host,
            port,
            debug_dump,
            record_raw,
        }) = &self.command
        {
            if let Some(host) = host {
                config.server.host = host.clone();
            }
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(format) = debug_dump {
                config.server.debug_dump = *format;
            }
            config.storage.record_raw |= *record_raw;
        }

        Ok(config)
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = cli.load_config()?;

    match cli.command {
        Some(Commands::Latest { raw, parts }) => show_latest(&config, raw, parts),
        Some(Commands::Serve { .. }) | None => serve(config).await,
    }
}

async fn serve(config: ProxyConfig) -> Result<()> {
    let repository = history::create(&config.storage, config.encoding)?;
    let server = ProxyServer::bind(&config, repository).await?;

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

fn show_latest(config: &ProxyConfig, raw: bool, parts: RawParts) -> Result<()> {
    let repository = history::create(&config.storage, config.encoding)?;
    let record = repository.latest()?;

    if raw {
        let bytes = repository.raw_request(&record, parts)?;
        println!("{}", config.encoding.decode(&bytes));
    } else {
        history::printer::print_record(&record, config.encoding);
    }

    Ok(())
}
