mod common;

use hyper::StatusCode;
use url::Url;

use common::Reply;
use trafgen::config::ReceiveMode;
use trafgen::pool::WorkerPool;

const BODY_READ_FAILED: &str = "response body read failed";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_http_run_accounts_for_every_request() {
    let addr = common::spawn_http_server().await;
    let target = Url::parse(&format!("http://{addr}/")).unwrap();

    let mut config = common::local_config(300, 10);
    config.generation.fixed_headers = false;
    let (ctx, cache) = common::prepare(config, target);

    let elapsed = WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.requests_sent, 300);
    assert_eq!(s.requests_sent, s.successes + s.non_success + s.failed);
    assert_eq!(s.successes, 300);
    assert_eq!(s.http, 300);
    assert_eq!(s.websocket + s.grpc + s.http3, 0);
    assert_eq!(s.tls_connections, 0);
    assert!(s.bytes_received > 0);
    assert_eq!(s.latencies.len(), 300);
    assert!(elapsed.as_nanos() > 0);
}

#[tokio::test]
async fn test_unreachable_target_counts_failures() {
    // Bind then drop so the port is very likely closed.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let target = Url::parse(&format!("http://{addr}/")).unwrap();

    let (ctx, cache) = common::prepare(common::local_config(20, 4), target);
    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.requests_sent, 20);
    assert_eq!(s.failed, 20);
    assert_eq!(s.successes, 0);
    assert_eq!(s.errors.values().sum::<u64>(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_truncated_body_is_tallied_next_to_the_status() {
    let addr = common::spawn_truncating_server().await;
    let target = Url::parse(&format!("http://{addr}/")).unwrap();

    let mut config = common::local_config(4, 2);
    config.generation.random_method = false;
    let (ctx, cache) = common::prepare(config, target);
    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.requests_sent, 4);
    assert_eq!(s.successes, 4);
    assert_eq!(s.failed, 0);
    assert_eq!(s.errors.get(BODY_READ_FAILED), Some(&4));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_error_status_is_non_success() {
    let addr = common::spawn_http_server_with(Reply {
        status: StatusCode::NOT_FOUND,
        ..Reply::default()
    })
    .await;
    let target = Url::parse(&format!("http://{addr}/")).unwrap();

    let (ctx, cache) = common::prepare(common::local_config(10, 2), target);
    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.requests_sent, 10);
    assert_eq!(s.non_success, 10);
    assert_eq!(s.successes + s.failed, 0);
    assert_eq!(s.errors.get("HTTP_404"), Some(&10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_one_byte_mode_reads_a_single_byte() {
    let addr = common::spawn_http_server().await;
    let target = Url::parse(&format!("http://{addr}/")).unwrap();

    let mut config = common::local_config(8, 4);
    config.run.receive_mode = ReceiveMode::OneByte;
    config.generation.random_method = false;
    let (ctx, cache) = common::prepare(config, target);
    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.requests_sent, 8);
    assert_eq!(s.one_byte, 8);
    assert_eq!(s.bytes_received, 8);
    assert!(s.errors.is_empty(), "{:?}", s.errors);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_receive_drains_short_bodies() {
    let addr = common::spawn_http_server_with(Reply {
        body: b"ok",
        ..Reply::default()
    })
    .await;
    let target = Url::parse(&format!("http://{addr}/")).unwrap();

    let mut config = common::local_config(4, 4);
    config.run.receive_mode = ReceiveMode::SlowReceive;
    config.generation.random_method = false;
    let (ctx, cache) = common::prepare(config, target);
    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.slow_receive, 4);
    assert_eq!(s.bytes_received, 8);
    assert_eq!(s.timeouts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_receive_past_the_deadline_counts_a_timeout() {
    let addr = common::spawn_http_server().await;
    let target = Url::parse(&format!("http://{addr}/")).unwrap();

    // 40 bytes at 200ms or more apiece cannot finish inside one second.
    let mut config = common::local_config(2, 2);
    config.run.receive_mode = ReceiveMode::SlowReceive;
    config.generation.random_method = false;
    config.http.response_header_timeout_secs = 1;
    config.http.request_timeout_secs = 1;
    let (ctx, cache) = common::prepare(config, target);
    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.slow_receive, 2);
    assert_eq!(s.timeouts, 2);
    assert_eq!(s.errors.get(BODY_READ_FAILED), Some(&2));
    assert!(s.bytes_received < 2 * common::DEFAULT_BODY.len() as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rate_limited_normal_mode_completes() {
    let addr = common::spawn_http_server().await;
    let target = Url::parse(&format!("http://{addr}/")).unwrap();

    let mut config = common::local_config(20, 4);
    config.rate_limit.enabled = true;
    config.rate_limit.window_secs = 5;
    config.rate_limit.speed_kbps = 64;
    config.generation.random_method = false;
    let (ctx, cache) = common::prepare(config, target);
    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.successes, 20);
    assert_eq!(s.bytes_received, 20 * common::DEFAULT_BODY.len() as u64);
    assert!(s.errors.is_empty(), "{:?}", s.errors);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_set_cookie_bumps_cookie_updates() {
    let addr = common::spawn_http_server_with(Reply {
        set_cookie: Some("session=abc123; Path=/; HttpOnly"),
        ..Reply::default()
    })
    .await;
    let target = Url::parse(&format!("http://{addr}/")).unwrap();

    let mut config = common::local_config(6, 2);
    config.generation.fixed_headers = true;
    let (ctx, cache) = common::prepare(config, target);
    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.successes, 6);
    assert_eq!(s.cookie_updates, 6);
    assert_eq!(ctx.session.cookie_count(), 1);
}
