mod common;

use url::Url;

use trafgen::pool::WorkerPool;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_websocket_band_covers_whole_range() {
    let addr = common::spawn_websocket_server().await;
    let target = Url::parse(&format!("http://{addr}/socket")).unwrap();

    let mut config = common::local_config(12, 3);
    config.protocols.websocket = true;
    config.protocols.websocket_cutoff = 100;
    let (ctx, cache) = common::prepare(config, target);

    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.websocket, 12);
    assert_eq!(s.http, 0);
    assert_eq!(s.successes, 12);
    assert_eq!(s.requests_sent, s.successes + s.non_success + s.failed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rejected_upgrade_is_non_success() {
    let addr = common::spawn_http_server_with(common::Reply {
        status: hyper::StatusCode::FORBIDDEN,
        ..common::Reply::default()
    })
    .await;
    let target = Url::parse(&format!("http://{addr}/socket")).unwrap();

    let mut config = common::local_config(6, 2);
    config.protocols.websocket = true;
    config.protocols.websocket_cutoff = 100;
    let (ctx, cache) = common::prepare(config, target);

    WorkerPool::new(ctx.clone(), cache).run().await;
    let s = ctx.stats.snapshot();

    assert_eq!(s.websocket, 6);
    assert_eq!(s.non_success, 6);
    assert_eq!(s.successes + s.failed, 0);
    assert_eq!(s.errors.get("WebSocket_HTTP_403"), Some(&6));
}
