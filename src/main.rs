use anyhow::{Context, Result};
use clap::Parser;
use station_lib::{run, StationOptions};

// 应用程序主入口函数
#[tokio::main]
async fn main() -> Result<()> {
    let options = StationOptions::parse();
    let passed = run(options).await.context("测试站运行失败")?;
    if !passed {
        std::process::exit(1);
    }
    Ok(())
}
