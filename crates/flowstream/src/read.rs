//! Read gate: decides whether captured chunks reach the application.

use bytes::Bytes;

use crate::stream::ChunkCallback;
use crate::transport::Transport;

/// A chunk ready for delivery, with the callback taken out of its slot.
pub(crate) struct Delivery {
    pub(crate) callback: ChunkCallback,
    pub(crate) chunk: Bytes,
    pub(crate) epoch: u64,
}

#[derive(Default)]
pub(crate) struct ReadGate {
    callback: Option<ChunkCallback>,
    /// Bumped on every arm/disarm so a callback taken out for delivery is only
    /// put back if nobody re-registered in the meantime.
    epoch: u64,
}

impl ReadGate {
    pub(crate) fn arm(&mut self, callback: ChunkCallback, transport: &mut dyn Transport) {
        transport.drop_chunk();
        self.callback = Some(callback);
        self.epoch += 1;
        transport.cork(false);
        tracing::debug!("read gate armed");
    }

    pub(crate) fn disarm(&mut self, transport: &mut dyn Transport) {
        transport.cork(true);
        transport.drop_chunk();
        self.clear();
        tracing::debug!("read gate disarmed");
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.callback.is_some()
    }

    /// Consume a read notification.
    ///
    /// The chunk is acknowledged to the transport before anything is handed
    /// back, armed or not.
    pub(crate) fn on_read_ready(&mut self, size: usize, transport: &mut dyn Transport) -> Option<Delivery> {
        if size == 0 {
            return None;
        }

        let chunk = transport.peek();
        transport.drop_chunk();

        let chunk = chunk.filter(|c| !c.is_empty())?;
        let Some(callback) = self.callback.take() else {
            tracing::trace!(len = chunk.len(), "read gate closed, discarding chunk");
            return None;
        };
        tracing::trace!(len = chunk.len(), "read chunk");

        Some(Delivery {
            callback,
            chunk,
            epoch: self.epoch,
        })
    }

    /// Put a callback back after delivery unless the gate changed meanwhile.
    pub(crate) fn restore(&mut self, callback: ChunkCallback, epoch: u64) {
        if self.epoch == epoch && self.callback.is_none() {
            self.callback = Some(callback);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.callback = None;
        self.epoch += 1;
    }
}
