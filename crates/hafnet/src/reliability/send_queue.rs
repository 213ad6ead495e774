//! Outbound reliable stream: the pending queue and retransmission timing.

use crate::protocol::RMessage;
use crate::seq::seq_diff;
use bytes::Bytes;
use std::collections::VecDeque;
use tokio::time::{Duration, Instant};

// Retransmission backoff tiers, keyed on the transmission count.
const RETX_TIER1: Duration = Duration::from_millis(80);
const RETX_TIER2: Duration = Duration::from_millis(200);
const RETX_TIER3: Duration = Duration::from_millis(620);
const RETX_TIER4: Duration = Duration::from_millis(2000);

fn backoff(retx: u32) -> Duration {
    if retx <= 1 {
        RETX_TIER1
    } else if retx <= 4 {
        RETX_TIER2
    } else if retx <= 9 {
        RETX_TIER3
    } else {
        RETX_TIER4
    }
}

#[derive(Debug)]
struct Pending {
    msg: RMessage,
    /// Time of the last transmission; `None` until the first one.
    last: Option<Instant>,
    /// Transmission count.
    retx: u32,
}

impl Pending {
    fn deadline(&self) -> Option<Instant> {
        self.last.map(|last| last + backoff(self.retx))
    }

    fn due(&self, now: Instant) -> bool {
        match self.deadline() {
            None => true,
            Some(deadline) => now >= deadline,
        }
    }
}

/// The outbound reliable stream. Sequence assignment and queue order are
/// kept consistent by the owning connection's lock; the queue holds seqs
/// consecutive from the oldest unacknowledged message.
#[derive(Debug, Default)]
pub struct SendQueue {
    queue: VecDeque<Pending>,
    tseq: u16,
}

impl SendQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message, assigning the next sequence number.
    pub fn enqueue(&mut self, mtype: u8, payload: Bytes) -> u16 {
        let seq = self.tseq;
        self.tseq = self.tseq.wrapping_add(1);
        self.queue.push_back(Pending {
            msg: RMessage::new(seq, mtype, payload),
            last: None,
            retx: 0,
        });
        seq
    }

    /// Retires every pending message at or before the acknowledged
    /// sequence number. Returns how many were removed.
    pub fn ack(&mut self, ackseq: u16) -> usize {
        let mut retired = 0;
        while let Some(head) = self.queue.front() {
            if seq_diff(head.msg.seq, ackseq) > 0 {
                break;
            }
            self.queue.pop_front();
            retired += 1;
        }
        retired
    }

    /// Collects every message due for (re)transmission, stamping the
    /// transmission on each.
    pub fn collect_due(&mut self, now: Instant) -> Vec<RMessage> {
        let mut due = Vec::new();
        for pending in self.queue.iter_mut() {
            if pending.due(now) {
                pending.last = Some(now);
                pending.retx += 1;
                due.push(pending.msg.clone());
            }
        }
        due
    }

    /// Earliest retransmission deadline over the pending queue. A message
    /// that has never been sent is due immediately.
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        self.queue
            .iter()
            .map(|pending| pending.deadline().unwrap_or(now))
            .min()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
