//! Ack tracker: outbound sequence counter plus inbound receive
//! bitmap, producing and consuming piggybacked acks.
//!
//! Modeled on the reliability endpoint pattern used elsewhere in this
//! space (e.g. `gbnet::ReliableEndpoint`): a local/remote sequence pair, a
//! sliding receive bitmap, and rolling counters for the metrics logger.

use std::collections::HashSet;

use crate::seq::{diff16, newer16};

/// `bit i` of `receive_bits` means "packet `remote_seq - 1 - i` was
/// received".
#[derive(Debug, Clone)]
pub struct AckTracker {
    local_seq: u16,
    remote_seq: u16,
    receive_bits: u32,
    has_received_any: bool,

    /// Locally-sent sequences not yet confirmed by the peer, with the tick
    /// (caller-supplied monotonic counter) they were sent at, so
    /// `inferred_lost` can report each exactly once.
    unacked: std::collections::BTreeMap<u16, bool>,

    pub total_sent: u64,
    pub total_acked: u64,
    pub total_lost: u64,
}

impl Default for AckTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl AckTracker {
    pub fn new() -> Self {
        Self {
            local_seq: 0,
            remote_seq: 0,
            receive_bits: 0,
            has_received_any: false,
            unacked: std::collections::BTreeMap::new(),
            total_sent: 0,
            total_acked: 0,
            total_lost: 0,
        }
    }

    /// Returns the current outbound sequence and increments it (mod 2^16).
    pub fn next_outbound(&mut self) -> u16 {
        let seq = self.local_seq;
        self.unacked.insert(seq, false);
        self.total_sent += 1;
        self.local_seq = self.local_seq.wrapping_add(1);
        seq
    }

    /// Current (ack, ack_bits) to piggyback on the next outgoing header.
    pub fn outgoing_ack(&self) -> (u16, u32) {
        (self.remote_seq, self.receive_bits)
    }

    /// Processes an inbound sequence number.
    pub fn on_receive(&mut self, seq: u16) {
        if !self.has_received_any {
            self.has_received_any = true;
            self.remote_seq = seq;
            self.receive_bits = 0;
            return;
        }

        if newer16(seq, self.remote_seq) {
            let shift = diff16(seq, self.remote_seq) as u32;
            if shift >= 32 {
                self.receive_bits = 0;
            } else {
                // Old remote_seq becomes bit (shift - 1) after the shift.
                self.receive_bits = (self.receive_bits << shift) | (1 << (shift - 1));
            }
            self.remote_seq = seq;
        } else if seq != self.remote_seq {
            let back = diff16(self.remote_seq, seq) as u32;
            if back >= 1 && back <= 32 {
                self.receive_bits |= 1 << (back - 1);
            }
            // else: duplicate or ancient beyond the window — drop.
        }
        // seq == remote_seq: exact duplicate of the newest packet, drop.
    }

    /// Given a peer's piggybacked (ack, ack_bits), returns the set of our
    /// locally-sent sequences newly confirmed as delivered, and updates
    /// the rolling counters.
    pub fn acked_by_peer(&mut self, ack: u16, ack_bits: u32) -> HashSet<u16> {
        let mut confirmed = HashSet::new();
        self.confirm_one(ack, &mut confirmed);
        for bit in 0..32u16 {
            if ack_bits & (1 << bit) != 0 {
                let seq = ack.wrapping_sub(bit + 1);
                self.confirm_one(seq, &mut confirmed);
            }
        }
        confirmed
    }

    fn confirm_one(&mut self, seq: u16, confirmed: &mut HashSet<u16>) {
        if let Some(already_reported_lost) = self.unacked.remove(&seq) {
            let _ = already_reported_lost;
            self.total_acked += 1;
            confirmed.insert(seq);
        }
    }

    /// Sequences that have fallen off the 32-packet window without being
    /// acked, reported exactly once each.
    pub fn inferred_lost(&mut self) -> Vec<u16> {
        let mut lost = Vec::new();
        let retain_from = self.local_seq.wrapping_sub(32);
        let stale: Vec<u16> = self
            .unacked
            .keys()
            .copied()
            .filter(|&s| !newer16(s, retain_from.wrapping_sub(1)))
            .collect();
        for seq in stale {
            self.unacked.remove(&seq);
            self.total_lost += 1;
            lost.push(seq);
        }
        lost
    }

    pub fn packets_in_flight(&self) -> usize {
        self.unacked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_bitmap_identifies_recent_window() {
        let mut t = AckTracker::new();
        t.on_receive(0);
        t.on_receive(2); // skip 1
        let (ack, bits) = t.outgoing_ack();
        assert_eq!(ack, 2);
        // bit 0 = seq 1 (missing), bit 1 = seq 0 (received).
        assert_eq!(bits & 0b01, 0);
        assert_ne!(bits & 0b10, 0);
    }

    #[test]
    fn out_of_order_receive_sets_back_bit() {
        let mut t = AckTracker::new();
        t.on_receive(5);
        t.on_receive(3); // arrives late, within window
        let (ack, bits) = t.outgoing_ack();
        assert_eq!(ack, 5); // high-water mark unaffected
        assert_ne!(bits & (1 << 1), 0); // seq 3 is remote_seq-2
    }

    #[test]
    fn acked_by_peer_confirms_direct_and_bitfield_entries() {
        let mut t = AckTracker::new();
        let s10 = t.next_outbound();
        let s11 = t.next_outbound();
        assert_eq!((s10, s11), (0, 1));

        let confirmed = t.acked_by_peer(1, 0b1); // ack=1 directly, bit0=ack-1=0
        assert!(confirmed.contains(&0));
        assert!(confirmed.contains(&1));
        assert_eq!(t.total_acked, 2);
    }

    #[test]
    fn inferred_lost_reports_once() {
        let mut t = AckTracker::new();
        for _ in 0..40 {
            t.next_outbound();
        }
        let lost_first = t.inferred_lost();
        assert!(!lost_first.is_empty());
        let lost_second = t.inferred_lost();
        assert!(lost_second.is_empty(), "already-reported sequences must not repeat");
    }

    #[test]
    fn delivered_packets_within_window_are_never_marked_lost() {
        let mut t = AckTracker::new();
        let mut sent = Vec::new();
        for _ in 0..33 {
            sent.push(t.next_outbound());
        }
        // Peer acks the latest with a full bitfield covering everything sent.
        let ack = *sent.last().unwrap();
        t.acked_by_peer(ack, u32::MAX);
        assert_eq!(t.inferred_lost().len(), 0);
    }
}
