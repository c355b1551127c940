//! Serial execution gates
//!
//! One FIFO queue per serial handler type, created on first use and kept for
//! the life of the table. A call takes its place in the queue with
//! [`SerialGateTable::enqueue`], synchronously, on the connection reader;
//! waiting for its turn happens later inside the handler task. Arrival order
//! is therefore execution order no matter how the runtime schedules tasks.

use std::any::{type_name, TypeId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;
use crate::Result;

/// Identity of a serial handler type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GateKey {
    id: TypeId,
    name: &'static str,
}

impl GateKey {
    pub fn of<H: 'static>() -> Self {
        Self {
            id: TypeId::of::<H>(),
            name: type_name::<H>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[derive(Default)]
struct Turns {
    next_ticket: u64,
    now_serving: u64,
    // Tickets dropped before their turn came up
    abandoned: BTreeSet<u64>,
}

struct Gate {
    turns: Mutex<Turns>,
    serving: watch::Sender<u64>,
}

impl Gate {
    fn new() -> Self {
        let (serving, _) = watch::channel(0);
        Self {
            turns: Mutex::new(Turns::default()),
            serving,
        }
    }

    fn take_ticket(&self) -> u64 {
        let mut turns = self.turns.lock();
        let ticket = turns.next_ticket;
        turns.next_ticket += 1;
        ticket
    }

    /// Give up `ticket`'s turn, whether it ran or never will
    fn pass(&self, ticket: u64) {
        let mut turns = self.turns.lock();
        if ticket != turns.now_serving {
            turns.abandoned.insert(ticket);
            return;
        }

        turns.now_serving += 1;
        loop {
            let next = turns.now_serving;
            if !turns.abandoned.remove(&next) {
                break;
            }
            turns.now_serving += 1;
        }
        self.serving.send_replace(turns.now_serving);
    }
}

/// A place in one gate's queue. Dropping it without waiting gives the place up.
#[must_use = "a ticket holds up its gate until it is waited on or dropped"]
pub struct Ticket {
    key: GateKey,
    gate: Arc<Gate>,
    number: u64,
    pending: bool,
}

impl Ticket {
    pub fn key(&self) -> GateKey {
        self.key
    }

    /// Wait until every earlier ticket for this gate has finished. Fails
    /// with `Cancelled` if `cancel` fires first.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<Lease> {
        let number = self.number;
        let mut serving = self.gate.serving.subscribe();
        let turn = async move { serving.wait_for(|now| *now == number).await.map(|_| ()) };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChannelError::Cancelled),
            ready = turn => {
                ready.map_err(|_| ChannelError::Closed)?;
                self.pending = false;
                tracing::trace!(gate = self.key.name(), ticket = number, "Acquired serial gate");
                Ok(Lease {
                    key: self.key,
                    gate: Arc::clone(&self.gate),
                    number,
                })
            }
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.pending {
            self.gate.pass(self.number);
        }
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket")
            .field("gate", &self.key.name())
            .field("number", &self.number)
            .finish()
    }
}

/// Held for the duration of one serial invocation; dropping it releases the gate.
pub struct Lease {
    key: GateKey,
    gate: Arc<Gate>,
    number: u64,
}

impl Lease {
    pub fn key(&self) -> GateKey {
        self.key
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.gate.pass(self.number);
    }
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("gate", &self.key.name())
            .field("number", &self.number)
            .finish()
    }
}

#[derive(Default)]
pub struct SerialGateTable {
    gates: Mutex<HashMap<GateKey, Arc<Gate>>>,
}

impl SerialGateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next place in `key`'s queue without waiting
    pub fn enqueue(&self, key: GateKey) -> Ticket {
        let gate = {
            let mut gates = self.gates.lock();
            Arc::clone(gates.entry(key).or_insert_with(|| Arc::new(Gate::new())))
        };
        let number = gate.take_ticket();
        Ticket {
            key,
            gate,
            number,
            pending: true,
        }
    }

    /// Join the queue and wait for a turn in one step
    pub async fn acquire(&self, key: GateKey, cancel: &CancellationToken) -> Result<Lease> {
        self.enqueue(key).wait(cancel).await
    }

    pub fn release(&self, lease: Lease) {
        tracing::trace!(gate = lease.key.name(), ticket = lease.number, "Released serial gate");
        drop(lease);
    }

    /// Number of distinct gates created so far
    pub fn len(&self) -> usize {
        self.gates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.lock().is_empty()
    }
}
