use parley_core::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    parley_core::init_logging(&config.log_filter);

    parley_host::run(config).await
}
