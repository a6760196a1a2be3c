use mock_service::{run, tps_measure_task, MockConfig};
use std::net::SocketAddr;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter("mock_service=info,tower_http=info")
        .init();

    tokio::spawn(tps_measure_task());

    let addr: SocketAddr = "0.0.0.0:9999".parse()?;
    run(addr, MockConfig::default()).await
}
