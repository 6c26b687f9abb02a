// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded packet carriers between wants.
//!
//! Every graph edge is one bounded FIFO with a single producer (the
//! upstream want) and a single consumer (the downstream want). Fan-out is
//! an explicit broadcast over a want's outbound edges; fan-in is a
//! select-any over its inbound edges with a rotating start index so no
//! upstream is starved over long runs.

use std::time::Duration;

use futures_util::future::select_all;
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::packet::Packet;

/// Default per-edge capacity when a node does not override it.
pub const DEFAULT_CAPACITY: usize = 16;

/// Bound on a single outbound send. A full downstream edge surfaces as a
/// timeout instead of suspending the progress step indefinitely.
pub const SEND_WAIT: Duration = Duration::from_millis(100);

/// Create one bounded edge.
pub fn edge(capacity: usize) -> (mpsc::Sender<Packet>, mpsc::Receiver<Packet>) {
    mpsc::channel(capacity.max(1))
}

/// A broadcast that timed out mid-delivery, with per-edge progress so
/// resuming it never duplicates a packet.
struct PendingBroadcast {
    packet: Packet,
    served: Vec<bool>,
}

/// Outbound side of a want: broadcast to every downstream edge.
///
/// Sends are bounded by [`SEND_WAIT`]. `provide` either accepts a packet
/// entirely (delivering the remainder on later calls if an edge was full)
/// or rejects it with a timeout error while an earlier broadcast is still
/// undelivered, so at most one accepted packet is ever in flight.
#[derive(Default)]
pub struct OutPorts {
    senders: Vec<mpsc::Sender<Packet>>,
    done: Vec<bool>,
    pending: Option<PendingBroadcast>,
}

impl OutPorts {
    pub fn attach(&mut self, tx: mpsc::Sender<Packet>) {
        self.senders.push(tx);
        self.done.push(false);
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Push the in-flight broadcast to the edges that have not taken it
    /// yet. A dropped consumer counts as served; its want left the graph.
    async fn flush_pending(&mut self) -> Result<(), EngineError> {
        let Some(mut p) = self.pending.take() else {
            return Ok(());
        };
        for i in 0..self.senders.len() {
            if p.served[i] {
                continue;
            }
            match tokio::time::timeout(SEND_WAIT, self.senders[i].send(p.packet.clone())).await {
                Ok(Ok(())) => p.served[i] = true,
                Ok(Err(_)) => p.served[i] = true,
                Err(_) => {
                    self.pending = Some(p);
                    return Err(EngineError::timeout(format!(
                        "outbound edge {i} still full after {}ms",
                        SEND_WAIT.as_millis(),
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fan the packet out to every outbound edge with a bounded wait per
    /// edge. `Ok` means the packet is accepted: a partially delivered
    /// broadcast finishes on the next call. `Err` means it was rejected
    /// because the previous broadcast is still stuck; the caller keeps
    /// the packet and stops producing until the next step.
    pub async fn provide(&mut self, packet: Packet) -> Result<(), EngineError> {
        self.flush_pending().await?;
        self.pending =
            Some(PendingBroadcast { packet, served: vec![false; self.senders.len()] });
        // A timeout here is not an error for the caller: the packet is
        // accepted and the rest flushes on the next call.
        let _ = self.flush_pending().await;
        Ok(())
    }

    /// Broadcast one end-of-stream sentinel per outbound edge, at most
    /// once per edge. Safe to retry after a timeout: edges that already
    /// took their sentinel are skipped, and any in-flight data broadcast
    /// flushes first so the sentinel stays last.
    pub async fn provide_done(&mut self) -> Result<(), EngineError> {
        self.flush_pending().await?;
        let mut outcome = Ok(());
        for i in 0..self.senders.len() {
            if self.done[i] {
                continue;
            }
            match tokio::time::timeout(SEND_WAIT, self.senders[i].send(Packet::Done)).await {
                Ok(Ok(())) => self.done[i] = true,
                Ok(Err(_)) => self.done[i] = true,
                Err(_) => {
                    outcome = Err(EngineError::timeout(format!(
                        "sentinel pending on full edge {i}",
                    )));
                }
            }
        }
        outcome
    }

    pub fn done_sent(&self) -> bool {
        self.done.iter().all(|d| *d)
    }

    /// Whether every edge has taken its sentinel and no data broadcast is
    /// still in flight.
    pub fn settled(&self) -> bool {
        self.pending.is_none() && self.done_sent()
    }
}

/// Inbound side of a want: select-any across upstream edges.
///
/// Edge indices are stable: they match the position of the upstream node
/// in the consumer's `uses` list and never shift when an edge closes.
#[derive(Default)]
pub struct InPorts {
    receivers: Vec<mpsc::Receiver<Packet>>,
    closed: Vec<bool>,
    next_start: usize,
}

impl InPorts {
    pub fn attach(&mut self, rx: mpsc::Receiver<Packet>) {
        self.receivers.push(rx);
        self.closed.push(false);
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }

    /// Whether every inbound edge has closed.
    pub fn all_closed(&self) -> bool {
        self.closed.iter().all(|c| *c)
    }

    /// Block until any inbound edge delivers, or return `None` once every
    /// edge has closed.
    pub async fn use_forever(&mut self) -> Option<(usize, Packet)> {
        loop {
            let n = self.receivers.len();
            if n == 0 {
                return None;
            }
            let start = self.next_start % n;
            let closed = &self.closed;
            let mut futs: Vec<_> = self
                .receivers
                .iter_mut()
                .enumerate()
                .filter(|(i, _)| !closed[*i])
                .map(|(i, rx)| Box::pin(async move { (i, rx.recv().await) }))
                .collect();
            if futs.is_empty() {
                return None;
            }
            // Rotate so the edge after the last delivery is polled first.
            let len = futs.len();
            futs.rotate_left(start % len);

            let ((idx, packet), _, _) = select_all(futs).await;
            match packet {
                Some(p) => {
                    self.next_start = idx + 1;
                    return Some((idx, p));
                }
                None => {
                    // That producer dropped its sender; retry the rest.
                    self.closed[idx] = true;
                }
            }
        }
    }

    /// Select across inbound edges with a bounded wait. `None` on timeout
    /// without consuming, or when every edge has closed.
    pub async fn use_any(&mut self, wait: Duration) -> Option<(usize, Packet)> {
        match tokio::time::timeout(wait, self.use_forever()).await {
            Ok(delivered) => delivered,
            Err(_) => None,
        }
    }
}

#[cfg(test)]
#[path = "channel_tests.rs"]
mod tests;
