use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep, sleep};

/// Longest single pause the throttle will insert.
const MAX_PAUSE: Duration = Duration::from_secs(5);

/// Wall-clock throttle: while inside `window`, each read waits until the
/// bytes already delivered fit under `elapsed * rate`.
///
/// This is leaky, not a token bucket. The first chunk goes out immediately,
/// so short bursts above the nominal rate are expected right after start.
#[derive(Debug)]
pub struct RateLimitedReader<R> {
    inner: R,
    window: Duration,
    bytes_per_sec: f64,
    started: Option<Instant>,
    delivered: u64,
    pause: Option<Pin<Box<Sleep>>>,
}

impl<R> RateLimitedReader<R> {
    pub fn new(inner: R, window: Duration, kb_per_sec: u64) -> Self {
        Self {
            inner,
            window,
            bytes_per_sec: kb_per_sec as f64 * 1024.0,
            started: None,
            delivered: 0,
            pause: None,
        }
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    fn deficit(&mut self) -> Option<Duration> {
        let started = *self.started.get_or_insert_with(Instant::now);
        let elapsed = started.elapsed();
        if elapsed >= self.window || self.bytes_per_sec <= 0.0 {
            return None;
        }

        let allowed = elapsed.as_secs_f64() * self.bytes_per_sec;
        let excess = self.delivered as f64 - allowed;
        if excess <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(excess / self.bytes_per_sec).min(MAX_PAUSE))
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for RateLimitedReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.pause.is_none() {
            if let Some(wait) = this.deficit() {
                this.pause = Some(Box::pin(sleep(wait)));
            }
        }
        if let Some(pause) = this.pause.as_mut() {
            ready!(pause.as_mut().poll(cx));
            this.pause = None;
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        this.delivered += (buf.filled().len() - before) as u64;
        Poll::Ready(Ok(()))
    }
}
