//! Shared setup for the integration tests.
use mock_service::MockConfig;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        FmtSubscriber::builder()
            .with_env_filter("rampa=debug,mock_service=debug,axum::rejection=trace")
            .with_test_writer()
            .init();
    });
}

/// Starts a fresh mock banking service and returns its base URL.
pub async fn start_mock_service(config: MockConfig) -> String {
    let addr: SocketAddr = mock_service::spawn(config)
        .await
        .expect("mock service failed to start");
    format!("http://{addr}")
}

/// An address nothing listens on.
pub async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
