use mock_service::MockConfig;
use rampa::prelude::*;
use rampa::rinha::{RinhaWorkload, TRANSACTIONS};
use rampa_tests::*;
use std::num::NonZeroU32;
use std::time::Duration;

const TRANSACOES: &str = "method=POST,name=transacoes";
const EXTRATO: &str = "method=GET,name=extrato";

#[tokio::test]
async fn staged_run_against_mock_service() {
    init();
    let url = start_mock_service(MockConfig::default()).await;

    let stats = LoadTest::new(RinhaWorkload::http(url).unwrap())
        .stage(Duration::from_secs(1), 5)
        .stage(Duration::from_secs(1), 5)
        .stage(Duration::from_millis(500), 0)
        .tick(Duration::from_millis(250))
        .pause(Duration::from_millis(100))
        .seed(1)
        .await
        .unwrap();

    assert!(stats.elapsed >= Duration::from_millis(2_500));
    assert!(stats.elapsed < Duration::from_secs(5));
    assert!(stats.peak_users > 0 && stats.peak_users <= 5);
    assert!(stats.iterations > 0);

    let total = &stats.stats.total;
    assert_eq!(total.count, stats.iterations);
    assert_eq!(total.failure, 0);
    assert_eq!(total.success, total.count);

    let posts = stats.stats.get(TRANSACOES).unwrap();
    let gets = stats.stats.get(EXTRATO).unwrap();
    assert_eq!(posts.count + gets.count, total.count);
    assert!(posts.count > gets.count);
    assert!(total.min_latency() <= total.latency_p50);
    assert!(total.latency_p99 <= total.max_latency());
}

#[tokio::test]
async fn failing_statements_do_not_stop_the_run() {
    init();
    let url = start_mock_service(MockConfig {
        fail_statements: true,
        ..Default::default()
    })
    .await;

    let stats = LoadTest::new(RinhaWorkload::http(url).unwrap())
        .stage(Duration::from_secs(1), 3)
        .stage(Duration::from_millis(500), 3)
        .tick(Duration::from_millis(250))
        .pause(Duration::from_millis(50))
        .seed(2)
        .await
        .unwrap();

    assert!(stats.elapsed >= Duration::from_millis(1_500));

    let gets = stats.stats.get(EXTRATO).unwrap();
    assert!(gets.count > 0);
    assert_eq!(gets.success, 0);
    assert_eq!(gets.failure, gets.count);
    assert_eq!(gets.error_rate(), 1.);

    let posts = stats.stats.get(TRANSACOES).unwrap();
    assert_eq!(posts.failure, 0);
}

#[tokio::test]
async fn refused_connections_are_failures() {
    init();
    let url = refused_url().await;

    let stats = LoadTest::new(RinhaWorkload::http(url).unwrap())
        .stage(Duration::from_secs(1), 2)
        .tick(Duration::from_millis(250))
        .pause(Duration::from_millis(50))
        .await
        .unwrap();

    assert!(stats.elapsed >= Duration::from_secs(1));
    assert!(stats.stats.total.count > 0);
    assert_eq!(stats.stats.total.success, 0);
    assert_eq!(stats.stats.total.failure, stats.stats.total.count);
}

#[tokio::test]
async fn stop_handle_ends_a_long_run() {
    init();
    let url = start_mock_service(MockConfig::default()).await;

    let test = LoadTest::new(RinhaWorkload::http(url).unwrap())
        .stage(Duration::from_secs(3_600), 4)
        .tick(Duration::from_millis(100));
    let stop = test.stop_handle();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(750)).await;
        stop.stop();
    });

    let stats = test.await.unwrap();
    assert!(stats.elapsed >= Duration::from_millis(750));
    assert!(stats.elapsed < Duration::from_secs(5));
    assert!(stats.stats.total.count > 0);
}

#[tokio::test]
async fn slow_requests_are_abandoned_after_grace_period() {
    init();
    let url = start_mock_service(MockConfig {
        delay: Duration::from_secs(30),
        ..Default::default()
    })
    .await;

    let stats = LoadTest::new(RinhaWorkload::http(url).unwrap())
        .stage(Duration::from_millis(300), 3)
        .tick(Duration::from_millis(100))
        .grace_period(Duration::from_millis(200))
        .await
        .unwrap();

    assert!(stats.elapsed < Duration::from_secs(5));
    let total = &stats.stats.total;
    assert!(total.count > 0);
    assert_eq!(total.success, 0);
    assert_eq!(total.failure, total.count);
}

#[tokio::test]
async fn rate_cap_bounds_requests() {
    init();
    let url = start_mock_service(MockConfig::default()).await;

    let stats = LoadTest::new(RinhaWorkload::http(url).unwrap())
        .stage(Duration::from_secs(2), 10)
        .tick(Duration::from_millis(250))
        .pause(Duration::ZERO)
        .rps(NonZeroU32::new(20).unwrap())
        .await
        .unwrap();

    assert!(stats.stats.total.count > 0);
    assert!(stats.stats.total.count <= 60, "{}", stats.stats.total.count);
}

#[tokio::test]
async fn misconfigured_runs_never_start() {
    init();

    let res = LoadTest::new(RinhaWorkload::http(refused_url().await).unwrap()).await;
    assert!(res.is_err());

    let config = RunConfig::from_json(r#"{ "stages": [{ "duration": "10s", "target": -1 }] }"#);
    assert!(config.is_err());

    let config = RunConfig::from_json(r#"{ "stages": [{ "duration": "0s", "target": 5 }] }"#)
        .unwrap();
    let res = LoadTest::from_config(RinhaWorkload::http(refused_url().await).unwrap(), config)
        .await;
    assert_eq!(res.unwrap_err().to_string(), "Stage 0 has a zero duration");
}

#[tokio::test]
async fn salary_credit_shows_on_statement() -> anyhow::Result<()> {
    init();
    let url = start_mock_service(MockConfig::default()).await;
    let transport = HttpTransport::new(&url)?;
    let mut ctx = Context::detached(1, 0);

    let sample = ctx
        .transaction(labels! { "name" => "transacoes" }, async {
            let request = Request::post_json("/clientes/1/transacoes", &TRANSACTIONS[0])?;
            transport.send(request).await
        })
        .await;
    assert_eq!(sample.outcome, Outcome::Success);

    let response = transport.send(Request::get("/clientes/1/extrato")).await?;
    assert_eq!(response.status, 200);

    let extrato: serde_json::Value = serde_json::from_slice(&response.body)?;
    assert_eq!(extrato["saldo"]["total"], 1000);
    assert_eq!(extrato["saldo"]["limite"], 100_000);
    assert_eq!(extrato["ultimas_transacoes"][0]["descricao"], "salario");
    assert_eq!(extrato["ultimas_transacoes"][0]["tipo"], "c");

    let missing = transport.send(Request::get("/clientes/6/extrato")).await?;
    assert_eq!(missing.status, 404);

    Ok(())
}
