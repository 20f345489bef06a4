use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use tokio::io::{AsyncRead, ReadBuf};

/// Hands out a single byte, then reports end-of-data no matter what the
/// underlying source still holds.
#[derive(Debug)]
pub struct OneByteReader<R> {
    inner: R,
    done: bool,
}

impl<R> OneByteReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for OneByteReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.done || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let mut byte = [0u8; 1];
        let mut one = ReadBuf::new(&mut byte);
        ready!(Pin::new(&mut this.inner).poll_read(cx, &mut one))?;

        let filled = one.filled();
        if !filled.is_empty() {
            buf.put_slice(filled);
            this.done = true;
        }
        Poll::Ready(Ok(()))
    }
}
