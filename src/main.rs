use std::path::PathBuf;

use anyhow::Result;
use quiz_forge::utils::logging;
use quiz_forge::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 用法: quiz_forge [config.toml]
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    // 加载配置
    let config = Config::load(config_path.as_deref())?;

    // 初始化日志
    logging::init(config.verbose_logging);

    // 初始化并运行应用
    let _stats = App::initialize(config).await?.run().await?;

    Ok(())
}
