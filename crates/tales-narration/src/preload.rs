use std::collections::VecDeque;

use crate::payload::ContentKey;
use crate::resource::AudioResource;

/// Bounded FIFO of warmed resources waiting to be played
#[derive(Debug)]
pub(crate) struct PreloadQueue {
    depth: usize,
    entries: VecDeque<AudioResource>,
}

impl PreloadQueue {
    pub(crate) fn new(depth: usize) -> Self {
        let depth = depth.max(1);

        Self {
            depth,
            entries: VecDeque::with_capacity(depth + 1),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, key: &ContentKey) -> bool {
        self.entries.iter().any(|entry| &entry.key == key)
    }

    /// Append a resource, returning whatever fell off the front
    ///
    /// The caller owns the evicted resources and must release them.
    pub(crate) fn push(&mut self, resource: AudioResource) -> Vec<AudioResource> {
        self.entries.push_back(resource);

        let overflow = self.entries.len().saturating_sub(self.depth);
        self.entries.drain(..overflow).collect()
    }

    /// Remove the resource for `key` so it can be promoted to playback
    pub(crate) fn take(&mut self, key: &ContentKey) -> Option<AudioResource> {
        let index = self.entries.iter().position(|entry| &entry.key == key)?;
        self.entries.remove(index)
    }

    /// Empty the queue, handing every resource back for release
    pub(crate) fn drain(&mut self) -> Vec<AudioResource> {
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;
    use crate::backend::MediaBackend;

    async fn resource(backend: &MockBackend, audio: &'static [u8]) -> AudioResource {
        let handle = backend.load(bytes::Bytes::from_static(audio)).await.unwrap();
        AudioResource::loading(ContentKey::of(audio), handle)
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_depth() {
        let backend = MockBackend::new();
        let mut queue = PreloadQueue::new(2);

        assert!(queue.push(resource(&backend, b"one").await).is_empty());
        assert!(queue.push(resource(&backend, b"two").await).is_empty());

        let evicted = queue.push(resource(&backend, b"three").await);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].key, ContentKey::of(b"one"));

        assert_eq!(queue.len(), 2);
        assert!(queue.contains(&ContentKey::of(b"two")));
        assert!(queue.contains(&ContentKey::of(b"three")));
    }

    #[tokio::test]
    async fn take_removes_entry() {
        let backend = MockBackend::new();
        let mut queue = PreloadQueue::new(2);
        queue.push(resource(&backend, b"one").await);
        queue.push(resource(&backend, b"two").await);

        let taken = queue.take(&ContentKey::of(b"one")).unwrap();
        assert_eq!(taken.key, ContentKey::of(b"one"));
        assert!(!queue.contains(&ContentKey::of(b"one")));
        assert!(queue.take(&ContentKey::of(b"missing")).is_none());
    }

    #[test]
    fn zero_depth_is_clamped() {
        let queue = PreloadQueue::new(0);
        assert_eq!(queue.depth, 1);
    }
}
