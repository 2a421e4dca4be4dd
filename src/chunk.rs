//! The producer-facing pull buffer.
//!
//! A [`ChunkSource`] is the decoder's only view of the outside world: a
//! sequence of byte chunks handed over one at a time, plus a `cancel` hook
//! the decoder calls when it stops pulling before the source is exhausted.
//! [`PullBuffer`] sits on top of a source and turns that chunk-at-a-time feed
//! into the exact-size and best-effort reads the header and payload decoders
//! need, without ever copying a chunk it doesn't have to.

use std::collections::VecDeque;
use std::io;

use bytes::{Bytes, BytesMut};

use crate::error::{DecodeError, Result};

/// A pull-based source of archive bytes.
///
/// Chunks are handed to the decoder in the order the underlying transport
/// produced them. A chunk must never be empty. `next_chunk` returning `None`
/// signals that the source is exhausted; it must keep returning `None` on
/// every subsequent call.
///
/// `cancel` is called at most once, and only when the decoder stops pulling
/// before the source reports exhaustion on its own. Implementations that
/// wrap a resource needing early cleanup (an open file, a socket) should do
/// that cleanup here; the default does nothing.
pub trait ChunkSource {
    /// Produce the next chunk, or `None` if the source is exhausted.
    fn next_chunk(&mut self) -> Option<io::Result<Bytes>>;

    /// Called once if the decoder abandons the source before exhaustion.
    fn cancel(&mut self) {}
}

/// Adapts any `Iterator<Item = io::Result<Bytes>>` into a [`ChunkSource`].
///
/// Cancellation is expressed by dropping the wrapped iterator: a producer
/// built around a type whose `Drop` impl performs cleanup only when it is
/// dropped before reaching its own end will see that distinction naturally,
/// the same way a Python generator only sees `GeneratorExit` when closed
/// before running to completion.
pub struct IterChunkSource<I> {
    iter: Option<I>,
}

impl<I> IterChunkSource<I>
where
    I: Iterator<Item = io::Result<Bytes>>,
{
    pub fn new(iter: I) -> Self {
        Self { iter: Some(iter) }
    }
}

impl<I> ChunkSource for IterChunkSource<I>
where
    I: Iterator<Item = io::Result<Bytes>>,
{
    fn next_chunk(&mut self) -> Option<io::Result<Bytes>> {
        self.iter.as_mut().and_then(Iterator::next)
    }

    fn cancel(&mut self) {
        self.iter = None;
    }
}

/// Buffers chunks pulled from a [`ChunkSource`] and serves exact-size or
/// best-effort reads out of them, splitting and recombining chunks as
/// needed without copying a chunk that already satisfies a request.
pub(crate) struct PullBuffer<S> {
    source: S,
    queue: VecDeque<Bytes>,
    exhausted: bool,
}

impl<S: ChunkSource> PullBuffer<S> {
    pub(crate) fn new(source: S) -> Self {
        Self {
            source,
            queue: VecDeque::new(),
            exhausted: false,
        }
    }

    pub(crate) fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn available(&self) -> usize {
        self.queue.iter().map(Bytes::len).sum()
    }

    /// Pulls one more chunk from the source, if any remain. Returns `true`
    /// if a chunk was queued, `false` if the source is exhausted.
    fn pull_more(&mut self) -> Result<bool> {
        if self.exhausted {
            return Ok(false);
        }
        match self.source.next_chunk() {
            Some(Ok(chunk)) => {
                if !chunk.is_empty() {
                    self.queue.push_back(chunk);
                }
                Ok(true)
            }
            Some(Err(err)) => {
                self.exhausted = true;
                Err(DecodeError::from(err))
            }
            None => {
                self.exhausted = true;
                Ok(false)
            }
        }
    }

    /// Removes and returns exactly `n` bytes from the front of the queue.
    /// Callers must have already ensured at least `n` bytes are available.
    fn drain_bytes(&mut self, n: usize) -> Bytes {
        if n == 0 {
            return Bytes::new();
        }
        if let Some(front) = self.queue.front_mut() {
            if front.len() >= n {
                let taken = front.split_to(n);
                if front.is_empty() {
                    self.queue.pop_front();
                }
                return taken;
            }
        }
        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let front = self
                .queue
                .front_mut()
                .expect("caller guaranteed enough bytes were queued");
            let take = front.len().min(remaining);
            let piece = front.split_to(take);
            out.extend_from_slice(&piece);
            remaining -= take;
            if front.is_empty() {
                self.queue.pop_front();
            }
        }
        out.freeze()
    }

    /// Reads exactly `n` bytes, pulling from the source as needed.
    /// Fails with [`DecodeError::TruncatedStream`] if the source is
    /// exhausted before `n` bytes arrive.
    pub(crate) fn take_exact(&mut self, n: usize) -> Result<Bytes> {
        if n == 0 {
            return Ok(Bytes::new());
        }
        while self.available() < n {
            if !self.pull_more()? {
                return Err(DecodeError::TruncatedStream);
            }
        }
        Ok(self.drain_bytes(n))
    }

    /// Like [`Self::take_exact`], but returns `Ok(None)` instead of an error
    /// when the source ends cleanly with nothing buffered and nothing left
    /// to pull. Used to distinguish a clean end of stream from a stream that
    /// ends partway through a required field.
    pub(crate) fn try_take_exact(&mut self, n: usize) -> Result<Option<Bytes>> {
        if n == 0 {
            return Ok(Some(Bytes::new()));
        }
        if self.available() == 0 && !self.pull_more()? {
            return Ok(None);
        }
        while self.available() < n {
            if !self.pull_more()? {
                return Err(DecodeError::TruncatedStream);
            }
        }
        Ok(Some(self.drain_bytes(n)))
    }

    /// Reads up to `n` bytes from the next available chunk, without
    /// straddling chunk boundaries. Returns fewer than `n` bytes if the
    /// next chunk the source hands over is smaller. Fails with
    /// [`DecodeError::TruncatedStream`] if the source is exhausted with
    /// nothing left to read.
    pub(crate) fn take_up_to(&mut self, n: usize) -> Result<Bytes> {
        if n == 0 {
            return Ok(Bytes::new());
        }
        loop {
            if self.queue.front().is_some() {
                let take = self.queue.front().unwrap().len().min(n);
                return Ok(self.drain_bytes(take));
            }
            if !self.pull_more()? {
                return Err(DecodeError::TruncatedStream);
            }
        }
    }

    /// Pushes bytes back onto the front of the queue, as if they had never
    /// been taken. Used when a decoder reads further than it needed to and
    /// must give the remainder back for the next read.
    pub(crate) fn return_unused(&mut self, bytes: Bytes) {
        if !bytes.is_empty() {
            self.queue.push_front(bytes);
        }
    }

    /// Discards any buffered bytes and pulls the source to exhaustion,
    /// without inspecting the bytes. Used when the decoder has decided the
    /// session is over but wants the source to reach its own natural end
    /// (so a file-backed source can close normally) rather than being
    /// abandoned mid-stream.
    pub(crate) fn drain_source_to_exhaustion(&mut self) -> Result<()> {
        self.queue.clear();
        while self.pull_more()? {
            self.queue.clear();
        }
        Ok(())
    }
}
