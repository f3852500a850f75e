use std::process::ExitCode;

use club_edge::{infrastructure::logger::Logger, server, Config};
use tracing::{error, Level};

#[tokio::main]
async fn main() -> ExitCode {
    Logger::init(Level::INFO);

    // 配置缺失时在绑定端口之前退出
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match server::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
