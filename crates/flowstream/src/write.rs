//! Write path: one application buffer served to transport write requests.
//!
//! The transport asks for bytes in its own increments. The application hands
//! over whole buffers. [`WritePath`] keeps at most one active buffer with a
//! cursor into it and reports, via the callbacks it hands back, when that
//! buffer is done.
//!
//! ## Superseding and flushes
//!
//! A new submission while a buffer is active never discards unsent bytes. The
//! old buffer's remainder is written out, a flush is requested, and the old
//! drain callback is parked until the transport confirms the flush. A
//! non-empty submission that arrives while any flush is outstanding is queued
//! and only becomes active once every outstanding flush is confirmed. Write
//! requests in that window see no active buffer.
//!
//! Callbacks are never invoked here. Every method returns the callbacks that
//! became due, after all state changes are committed; the stream invokes them.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::stream::DrainCallback;
use crate::transport::Transport;

/// The active output buffer.
struct PendingBuffer {
    data: Bytes,
    cursor: usize,
    on_drained: Option<DrainCallback>,
}

/// A submission waiting for outstanding flushes.
struct Queued {
    data: Bytes,
    on_drained: Option<DrainCallback>,
}

#[derive(Default)]
pub(crate) struct WritePath {
    pending: Option<PendingBuffer>,
    /// One entry per outstanding flush, oldest first.
    flushes: VecDeque<Vec<DrainCallback>>,
    queued: Option<Queued>,
}

impl WritePath {
    /// Submit a buffer, or pause with `None`/empty data.
    pub(crate) fn submit(
        &mut self,
        data: Option<Bytes>,
        on_drained: Option<DrainCallback>,
        transport: &mut dyn Transport,
    ) -> Vec<DrainCallback> {
        let mut due = Vec::new();

        if let Some(old) = self.pending.take() {
            tracing::debug!(
                len = old.data.len(),
                cursor = old.cursor,
                "superseding pending buffer, flushing remainder"
            );
            self.flush_out(&old.data[old.cursor..], old.on_drained, transport);
        }

        match data.filter(|d| !d.is_empty()) {
            Some(data) => {
                if self.flushes.is_empty() {
                    due.extend(self.activate(data, on_drained, transport));
                } else {
                    tracing::debug!(
                        len = data.len(),
                        outstanding = self.flushes.len(),
                        "flush outstanding, queueing buffer"
                    );
                    if let Some(prev) = self.queued.replace(Queued { data, on_drained }) {
                        self.flush_out(&prev.data, prev.on_drained, transport);
                    }
                }
            }
            None => {
                if let Some(prev) = self.queued.take() {
                    self.flush_out(&prev.data, prev.on_drained, transport);
                }
                tracing::debug!("no data, corking");
                transport.cork(true);
                if let Some(callback) = on_drained {
                    match self.flushes.back_mut() {
                        Some(waiting) => waiting.push(callback),
                        None => due.push(callback),
                    }
                }
            }
        }

        due
    }

    /// Handle a write request of `requested` bytes. Returns the drain callback
    /// if the request exhausted the active buffer.
    pub(crate) fn on_write_request(
        &mut self,
        requested: usize,
        transport: &mut dyn Transport,
    ) -> Option<DrainCallback> {
        let serviced = self.service_request(requested, transport);
        if serviced < requested {
            self.drain()
        } else {
            None
        }
    }

    /// Hand up to `requested` bytes of the active buffer to the transport.
    ///
    /// Returns `requested` when there is no active buffer: nothing to send is
    /// not a shortfall.
    pub(crate) fn service_request(&mut self, requested: usize, transport: &mut dyn Transport) -> usize {
        let Some(pending) = self.pending.as_mut() else {
            return requested;
        };

        let available = pending.data.len() - pending.cursor;
        if available == 0 {
            return 0;
        }

        let chunk = requested.min(available);
        tracing::trace!(requested, cursor = pending.cursor, chunk, "write");

        let start = pending.cursor;
        if let Err(e) = transport.write_chunk(&pending.data[start..start + chunk]) {
            tracing::warn!(error = %e, "transport rejected write, retrying on next request");
            return requested;
        }
        pending.cursor += chunk;
        chunk
    }

    /// Release the active buffer and hand back its drain callback.
    pub(crate) fn drain(&mut self) -> Option<DrainCallback> {
        let pending = self.pending.take()?;
        tracing::debug!(len = pending.data.len(), "drained");
        pending.on_drained
    }

    /// Handle a flush confirmation. Returns the callbacks parked on it, plus
    /// the drain callback of a queued buffer if activating it drained it
    /// straight away.
    pub(crate) fn on_flush_complete(&mut self, transport: &mut dyn Transport) -> Vec<DrainCallback> {
        let Some(mut due) = self.flushes.pop_front() else {
            tracing::warn!("flush confirmation without outstanding flush");
            return Vec::new();
        };
        tracing::debug!(callbacks = due.len(), outstanding = self.flushes.len(), "flush complete");

        if self.flushes.is_empty()
            && let Some(queued) = self.queued.take()
        {
            due.extend(self.activate(queued.data, queued.on_drained, transport));
        }
        due
    }

    /// Forget all buffers and callbacks without firing anything.
    pub(crate) fn abandon(&mut self) {
        self.pending = None;
        self.flushes.clear();
        self.queued = None;
    }

    /// Length and cursor of the active buffer.
    pub(crate) fn pending(&self) -> Option<(usize, usize)> {
        self.pending.as_ref().map(|p| (p.data.len(), p.cursor))
    }

    /// Number of flushes awaiting confirmation.
    pub(crate) fn outstanding_flushes(&self) -> usize {
        self.flushes.len()
    }

    /// Whether a submission waits behind outstanding flushes.
    pub(crate) fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    fn activate(
        &mut self,
        data: Bytes,
        on_drained: Option<DrainCallback>,
        transport: &mut dyn Transport,
    ) -> Option<DrainCallback> {
        tracing::debug!(len = data.len(), "write");
        self.pending = Some(PendingBuffer {
            data,
            cursor: 0,
            on_drained,
        });

        if transport.is_corked() {
            transport.cork(false);
        }

        // The transport may have asked for data before this buffer existed.
        let writable = transport.writable_size();
        if writable > 0 {
            self.on_write_request(writable, transport)
        } else {
            None
        }
    }

    fn flush_out(&mut self, remainder: &[u8], on_drained: Option<DrainCallback>, transport: &mut dyn Transport) {
        if !remainder.is_empty()
            && let Err(e) = transport.write_chunk(remainder)
        {
            tracing::warn!(error = %e, len = remainder.len(), "transport rejected flushed remainder");
        }
        transport.flush();
        self.flushes.push_back(on_drained.into_iter().collect());
    }
}
