use env_logger::Env;
use scaleread::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    log::info!(
        "watching for scale {:?}, uploading to {}",
        config.device_name,
        config.ingest_url
    );

    scaleread::scheduler::run(config).await
}
