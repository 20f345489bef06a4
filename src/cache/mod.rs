pub mod generator;

pub use generator::{RequestDescriptor, RequestGenerator};

use http::header::COOKIE;
use parking_lot::RwLock;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use crate::context::SessionJar;
use crate::error::{Error, Result};

const MIN_FILL_CHUNK: usize = 100;
const REFRESH_PROBABILITY: f64 = 0.01;

pub struct RequestCache {
    slots: Arc<[RwLock<RequestDescriptor>]>,
    index: AtomicUsize,
    generator: Arc<RequestGenerator>,
    session: Arc<SessionJar>,
}

impl RequestCache {
    /// Fills `size` slots using every available core. Returns once all slots
    /// hold a descriptor.
    pub fn initialize(
        size: usize,
        generator: Arc<RequestGenerator>,
        session: Arc<SessionJar>,
    ) -> Result<Self> {
        if size == 0 {
            return Err(Error::Config("request cache size must be greater than 0".into()));
        }

        let threads = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        let chunk = (size / threads).max(MIN_FILL_CHUNK);

        let descriptors = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..size)
                .step_by(chunk)
                .map(|start| {
                    let end = (start + chunk).min(size);
                    let generator = &generator;
                    scope.spawn(move || {
                        (start..end)
                            .map(|_| generator.generate())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            let mut descriptors = Vec::with_capacity(size);
            for worker in workers {
                match worker.join() {
                    Ok(part) => descriptors.extend(part),
                    Err(_) => {
                        return Err(Error::Config("request cache fill thread panicked".into()));
                    }
                }
            }
            Ok(descriptors)
        })?;

        info!("request cache filled with {} descriptors", descriptors.len());

        let slots: Vec<_> = descriptors.into_iter().map(RwLock::new).collect();
        Ok(Self {
            slots: slots.into(),
            index: AtomicUsize::new(0),
            generator,
            session,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self) -> RequestDescriptor {
        let slot = self.next_slot();
        let mut descriptor = self.slots[slot].read().clone();

        if let Some(cookie) = self.session.cookie_header() {
            descriptor.headers.insert(COOKIE, cookie);
        }
        if rand::random_bool(REFRESH_PROBABILITY) {
            self.refresh(slot);
        }
        descriptor
    }

    fn next_slot(&self) -> usize {
        self.index.fetch_add(1, Ordering::Relaxed) % self.slots.len()
    }

    /// Regenerates `slot` on a detached task. Skipped outside a runtime.
    fn refresh(&self, slot: usize) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let slots = self.slots.clone();
        let generator = self.generator.clone();
        handle.spawn(async move {
            let fresh = generator.generate();
            *slots[slot].write() = fresh;
            debug!(slot, "request cache slot refreshed");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use url::Url;

    fn cache(size: usize) -> RequestCache {
        let session = Arc::new(SessionJar::new(true));
        let targets: Arc<[Url]> = vec![Url::parse("http://a.example/").unwrap()].into();
        let generator = Arc::new(
            RequestGenerator::new(targets, GenerationConfig::default(), true, session.clone())
                .unwrap(),
        );
        RequestCache::initialize(size, generator, session).unwrap()
    }

    #[test]
    fn test_zero_size_rejected() {
        let session = Arc::new(SessionJar::new(false));
        let generator = Arc::new(
            RequestGenerator::new(
                vec![Url::parse("http://a.example/").unwrap()].into(),
                GenerationConfig::default(),
                true,
                session.clone(),
            )
            .unwrap(),
        );
        assert!(RequestCache::initialize(0, generator, session).is_err());
    }

    #[test]
    fn test_fill_is_complete_across_chunks() {
        for size in [1, 99, 100, 101, 1_234] {
            assert_eq!(cache(size).len(), size);
        }
    }

    #[test]
    fn test_sequential_reads_cycle_every_slot() {
        let size = 37;
        let cache = cache(size);
        for _ in 0..3 {
            let mut seen: Vec<usize> = (0..size).map(|_| cache.next_slot()).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..size).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_concurrent_reads_stay_in_range() {
        let cache = Arc::new(cache(7));
        let threads = 8;
        let per_thread = 5_000;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..per_thread {
                        let d = cache.get();
                        assert_eq!(d.url.host_str(), Some("a.example"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.index.load(Ordering::Relaxed), threads * per_thread);
    }

    #[test]
    fn test_get_merges_session_cookies() {
        let cache = cache(3);
        let mut headers = http::HeaderMap::new();
        headers.insert(http::header::SET_COOKIE, "sid=42".parse().unwrap());
        cache.session.harvest(&headers);

        assert_eq!(cache.get().headers[COOKIE], "sid=42");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_refreshes_race_with_reads() {
        let cache = Arc::new(cache(4));
        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for i in 0..2_000 {
                        cache.refresh(i % 4);
                        let d = cache.get();
                        assert_eq!(d.url.host_str(), Some("a.example"));
                        if i % 100 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(cache.len(), 4);
    }
}
