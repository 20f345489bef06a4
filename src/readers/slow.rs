use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::{Instant, Sleep, sleep_until};

/// Slow-loris style consumer: at most one byte per read, with a fixed
/// per-instance gap between reads.
#[derive(Debug)]
pub struct SlowReader<R> {
    inner: R,
    delay: Duration,
    last_read: Option<Instant>,
    pause: Option<Pin<Box<Sleep>>>,
}

impl<R> SlowReader<R> {
    /// Picks a gap between 200 and 1199 ms for this reader.
    pub fn new(inner: R) -> Self {
        Self::with_delay(inner, Duration::from_millis(rand::random_range(200..1200)))
    }

    pub fn with_delay(inner: R, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            last_read: None,
            pause: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for SlowReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.pause.is_none() {
            if let Some(last) = this.last_read {
                let due = last + this.delay;
                if due > Instant::now() {
                    this.pause = Some(Box::pin(sleep_until(due)));
                }
            }
        }
        if let Some(pause) = this.pause.as_mut() {
            ready!(pause.as_mut().poll(cx));
            this.pause = None;
        }

        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let mut byte = [0u8; 1];
        let mut one = ReadBuf::new(&mut byte);
        ready!(Pin::new(&mut this.inner).poll_read(cx, &mut one))?;
        buf.put_slice(one.filled());
        this.last_read = Some(Instant::now());
        Poll::Ready(Ok(()))
    }
}
