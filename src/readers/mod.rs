mod one_byte;
mod rate_limited;
mod slow;

pub use one_byte::OneByteReader;
pub use rate_limited::RateLimitedReader;
pub use slow::SlowReader;

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::{Instant, timeout_at};

/// Reads `reader` to the end or until `deadline`, returning the bytes seen
/// and whatever stopped it early.
pub async fn drain_until<R: AsyncRead + Unpin>(
    reader: &mut R,
    deadline: Instant,
) -> (u64, Option<io::Error>) {
    let mut buf = vec![0u8; 8 * 1024];
    let mut total = 0u64;
    loop {
        match timeout_at(deadline, reader.read(&mut buf)).await {
            Ok(Ok(0)) => return (total, None),
            Ok(Ok(n)) => total += n as u64,
            Ok(Err(e)) => return (total, Some(e)),
            Err(_) => {
                return (
                    total,
                    Some(io::Error::new(io::ErrorKind::TimedOut, "body read deadline passed")),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    #[tokio::test]
    async fn test_drain_counts_all_chunks() {
        let mut mock = tokio_test::io::Builder::new()
            .read(b"hello ")
            .read(b"world")
            .build();
        let (n, err) = drain_until(&mut mock, far()).await;
        assert_eq!(n, 11);
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn test_drain_reports_partial_on_error() {
        let mut mock = tokio_test::io::Builder::new()
            .read(b"abc")
            .read_error(io::Error::other("reset"))
            .build();
        let (n, err) = drain_until(&mut mock, far()).await;
        assert_eq!(n, 3);
        assert!(err.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_stops_at_deadline() {
        let mut slow = SlowReader::with_delay(&b"abcdefgh"[..], Duration::from_secs(1));
        let deadline = Instant::now() + Duration::from_millis(2_500);
        let (n, err) = drain_until(&mut slow, deadline).await;

        assert_eq!(n, 3);
        assert_eq!(err.unwrap().kind(), io::ErrorKind::TimedOut);
    }
}
