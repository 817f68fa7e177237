//! Fixed-size pool of server connections.
//!
//! The server accepts and drops sockets constantly; the pool keeps
//! everything behind them. Each slot of the arena owns one
//! [`ServerConnection`] (lifecycle state, session, send queue, sequence
//! counter) and its [`RecvBuffers`] (read chunk and de-framing buffer).
//! `acquire` lends both out, `release` resets both and puts the slot back
//! on the free list. Nothing is allocated per accepted socket except the
//! socket's own I/O tasks.
//!
//! Slots are addressed by a [`SlotKey`] carrying a generation. Releasing
//! bumps the generation, so a key kept past its connection's lifetime is
//! rejected instead of freeing someone else's slot.

use std::sync::Arc;

use keelnet_protocol::FrameCodec;
use keelnet_transport::{ConnectionState, LinkSettings, RecvBuffers, ServerConnection};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// Only a `Disconnected` connection may give its slot back.
    #[error("slot {0:?} released while connection is {1:?}")]
    StillOpen(SlotKey, ConnectionState),

    #[error("slot {0:?} is not currently acquired")]
    StaleKey(SlotKey),
}

/// Handle to an acquired slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: usize,
    generation: u32,
}

impl SlotKey {
    pub fn index(&self) -> usize {
        self.index
    }
}

/// What [`ConnectionPool::acquire`] lends out.
#[derive(Debug)]
pub struct Lease {
    pub key: SlotKey,
    /// `Disconnected`, unassigned and empty.
    pub conn: Arc<ServerConnection>,
    pub buffers: RecvBuffers,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    conn: Arc<ServerConnection>,
    /// `None` while the slot is out on loan.
    buffers: Option<RecvBuffers>,
}

#[derive(Debug)]
pub struct ConnectionPool {
    slots: Vec<Slot>,
    free: Vec<usize>,
}

impl ConnectionPool {
    /// Creates `capacity` idle connections sharing `codec`, with buffers
    /// sized by `settings`. Everything is allocated up front.
    pub fn new(capacity: usize, codec: &FrameCodec, settings: LinkSettings) -> Self {
        let slots = (0..capacity)
            .map(|_| Slot {
                generation: 0,
                conn: ServerConnection::idle(codec.clone()),
                buffers: Some(RecvBuffers::new(settings)),
            })
            .collect();
        // Reversed so slot 0 is handed out first.
        let free = (0..capacity).rev().collect();
        Self { slots, free }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn in_use(&self) -> usize {
        self.capacity() - self.available()
    }

    /// Takes a free slot, or `None` when every slot is in use.
    pub fn acquire(&mut self) -> Option<Lease> {
        let index = self.free.pop()?;
        let slot = &mut self.slots[index];
        let buffers = slot.buffers.take()?;
        let lease = Lease {
            key: SlotKey {
                index,
                generation: slot.generation,
            },
            conn: Arc::clone(&slot.conn),
            buffers,
        };
        tracing::trace!(slot = index, in_use = self.in_use(), "pool slot acquired");
        Some(lease)
    }

    /// Returns a slot. The connection and the buffers are reset before the
    /// slot goes back on the free list.
    ///
    /// # Errors
    /// [`PoolError::StaleKey`] for a key that was already released, and
    /// [`PoolError::StillOpen`] unless the slot's connection is
    /// `Disconnected`. `buffers` is dropped in both cases and the slot is
    /// left as it was.
    pub fn release(&mut self, key: SlotKey, mut buffers: RecvBuffers) -> Result<(), PoolError> {
        let slot = self
            .slots
            .get_mut(key.index)
            .filter(|s| s.generation == key.generation && s.buffers.is_none())
            .ok_or(PoolError::StaleKey(key))?;
        slot.conn
            .reset()
            .map_err(|state| PoolError::StillOpen(key, state))?;

        buffers.reset();
        slot.buffers = Some(buffers);
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        tracing::trace!(slot = key.index, in_use = self.in_use(), "pool slot released");
        Ok(())
    }
}
