//! 命令列入口：讀取一次呼叫的參數 JSON，處理後把回應 JSON 寫到 stdout。

use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::Parser;
use racme_webhook::{
    config::Config,
    handler::{Handler, InvocationParams, Response},
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 呼叫參數 JSON 檔；未指定時從 stdin 讀取
    #[arg(short, long)]
    params: Option<PathBuf>,

    /// 設定檔 (JSON)
    #[arg(short, long, env = "RACME_CONFIG")]
    config: Option<PathBuf>,

    /// CIS 實例 CRN，覆寫設定檔與 RACME_CIS_CRN 的值
    #[arg(long)]
    cis_crn: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RACME_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// 以 JSON 格式輸出日誌
    #[arg(long, env = "RACME_LOG_JSON")]
    log_json: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let raw = read_params(args.params.as_ref())?;
    let response = match load_config(&args) {
        Ok(config) => run(config, &raw),
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            Response::failure(500, format!("Invalid configuration: {}", e))
        }
    };

    println!(
        "{}",
        serde_json::to_string(&response).context("Failed to serialize response")?
    );

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_params(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read params file {}", path.display())),
        None => {
            let mut raw = String::new();
            io::stdin()
                .read_to_string(&mut raw)
                .context("Failed to read params from stdin")?;
            Ok(raw)
        }
    }
}

/// 設定檔、`RACME_*` 環境變數、命令列參數依序覆寫。
fn load_config(args: &Args) -> Result<Config, racme_webhook::config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    config.apply_env()?;
    if let Some(crn) = args.cis_crn.as_ref().filter(|c| !c.trim().is_empty()) {
        config.cis_crn = crn.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run(config: Config, raw: &str) -> Response {
    let params: InvocationParams = match serde_json::from_str(raw) {
        Ok(params) => params,
        Err(e) => {
            error!(error = %e, "Invalid invocation parameters");
            return Response::failure(500, format!("Invalid invocation parameters: {}", e));
        }
    };

    let handler = match Handler::new(config) {
        Ok(handler) => handler,
        Err(e) => {
            error!(error = %e, "Couldn't build handler");
            return Response::failure(500, format!("Invalid configuration: {}", e));
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Handling notification");
    handler.handle(&params)
}
