//! In-process transport: one endpoint per thread, crossbeam mailboxes.
//!
//! [`LocalGroup::new`] wires `size` endpoints together. Each endpoint
//! owns an unbounded inbox and a sender into every other inbox (its own
//! included), so `isend` completes immediately and `wait_all` only has
//! to drain matching messages. Messages that arrive for a `(source,
//! tag)` nobody is waiting on yet are parked in a stash and matched in
//! arrival order later.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use corral_core::{CommError, Rank};

use crate::transport::{RecvRequest, SendRequest, Tag, Transport};

/// Tuning for a [`LocalGroup`].
#[derive(Clone, Debug)]
pub struct LocalGroupConfig {
    /// How long `wait_all` blocks on one receive before failing with
    /// [`CommError::Timeout`]. A peer that never joins a collective
    /// turns into a timeout instead of a hang.
    pub recv_timeout: Duration,
}

impl Default for LocalGroupConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct Envelope {
    source: Rank,
    tag: Tag,
    payload: Vec<u8>,
}

/// Factory for a fully-connected in-process process group.
pub struct LocalGroup;

impl LocalGroup {
    /// Create `size` connected endpoints with default settings.
    /// Endpoint `i` has rank `i`.
    pub fn new(size: usize) -> Vec<LocalTransport> {
        Self::with_config(size, LocalGroupConfig::default())
    }

    /// Create `size` connected endpoints.
    pub fn with_config(size: usize, config: LocalGroupConfig) -> Vec<LocalTransport> {
        let (senders, receivers): (Vec<Sender<Envelope>>, Vec<Receiver<Envelope>>) =
            (0..size).map(|_| crossbeam_channel::unbounded()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| LocalTransport {
                rank: Rank(rank),
                outboxes: senders.clone(),
                inbox,
                stash: Mutex::new(VecDeque::new()),
                config: config.clone(),
                messages_sent: AtomicU64::new(0),
                bytes_sent: AtomicU64::new(0),
            })
            .collect()
    }
}

/// One process's endpoint in a [`LocalGroup`].
pub struct LocalTransport {
    rank: Rank,
    outboxes: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    stash: Mutex<VecDeque<Envelope>>,
    config: LocalGroupConfig,
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
}

impl LocalTransport {
    /// Messages sent by this endpoint since creation.
    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    /// Payload bytes sent by this endpoint since creation.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    fn take_stashed(&self, source: Rank, tag: Tag) -> Option<Vec<u8>> {
        let mut stash = self.stash.lock();
        let pos = stash
            .iter()
            .position(|e| e.source == source && e.tag == tag)?;
        stash.remove(pos).map(|e| e.payload)
    }

    fn receive(&self, source: Rank, tag: Tag) -> Result<Vec<u8>, CommError> {
        if let Some(payload) = self.take_stashed(source, tag) {
            return Ok(payload);
        }
        let deadline = Instant::now() + self.config.recv_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inbox.recv_timeout(remaining) {
                Ok(env) if env.source == source && env.tag == tag => return Ok(env.payload),
                Ok(env) => self.stash.lock().push_back(env),
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!(
                        rank = self.rank.index(),
                        peer = source.index(),
                        tag,
                        "receive timed out"
                    );
                    return Err(CommError::Timeout { peer: source, tag });
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(CommError::Disconnected { peer: source });
                }
            }
        }
    }
}

impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.outboxes.len()
    }

    fn isend(&self, dest: Rank, tag: Tag, payload: Vec<u8>) -> Result<SendRequest, CommError> {
        self.check_rank(dest)?;
        let bytes = payload.len();
        self.outboxes[dest.index()]
            .send(Envelope {
                source: self.rank,
                tag,
                payload,
            })
            .map_err(|_| CommError::Disconnected { peer: dest })?;
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        Ok(SendRequest::new(dest, tag, bytes))
    }

    fn irecv(&self, source: Rank, tag: Tag) -> Result<RecvRequest, CommError> {
        self.check_rank(source)?;
        Ok(RecvRequest::new(source, tag))
    }

    fn wait_all(
        &self,
        sends: Vec<SendRequest>,
        recvs: Vec<RecvRequest>,
    ) -> Result<Vec<Vec<u8>>, CommError> {
        // Sends were handed to the peer's inbox in isend.
        drop(sends);
        recvs
            .into_iter()
            .map(|r| self.receive(r.source(), r.tag()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::tags;
    use std::thread;

    fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(LocalTransport) -> R + Send + Sync + Copy + 'static,
        R: Send + 'static,
    {
        let handles: Vec<_> = LocalGroup::new(size)
            .into_iter()
            .map(|t| thread::spawn(move || f(t)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn point_to_point_round_trip() {
        let out = run(2, |t| {
            let peer = Rank(1 - t.rank().index());
            let recv = t.irecv(peer, 7).unwrap();
            let send = t.isend(peer, 7, vec![t.rank().index() as u8; 3]).unwrap();
            t.wait_all(vec![send], vec![recv]).unwrap()
        });
        assert_eq!(out[0], vec![vec![1, 1, 1]]);
        assert_eq!(out[1], vec![vec![0, 0, 0]]);
    }

    #[test]
    fn unmatched_tags_are_stashed_until_requested() {
        let mut group = LocalGroup::new(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();
        let s1 = a.isend(Rank(1), 1, vec![1]).unwrap();
        let s2 = a.isend(Rank(1), 2, vec![2]).unwrap();
        a.wait_all(vec![s1, s2], vec![]).unwrap();

        let r2 = b.irecv(Rank(0), 2).unwrap();
        assert_eq!(b.wait_all(vec![], vec![r2]).unwrap(), vec![vec![2]]);
        let r1 = b.irecv(Rank(0), 1).unwrap();
        assert_eq!(b.wait_all(vec![], vec![r1]).unwrap(), vec![vec![1]]);
    }

    #[test]
    fn same_tag_messages_keep_send_order() {
        let mut group = LocalGroup::new(2);
        let b = group.pop().unwrap();
        let a = group.pop().unwrap();
        for i in 0..4u8 {
            let s = a.isend(Rank(1), 9, vec![i]).unwrap();
            a.wait_all(vec![s], vec![]).unwrap();
        }
        let recvs = (0..4).map(|_| b.irecv(Rank(0), 9).unwrap()).collect();
        let got = b.wait_all(vec![], recvs).unwrap();
        assert_eq!(got, vec![vec![0], vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn missing_peer_times_out() {
        let group = LocalGroup::with_config(
            2,
            LocalGroupConfig {
                recv_timeout: Duration::from_millis(20),
            },
        );
        let r = group[0].irecv(Rank(1), tags::MIGRATE_COUNTS).unwrap();
        let err = group[0].wait_all(vec![], vec![r]).unwrap_err();
        assert_eq!(
            err,
            CommError::Timeout {
                peer: Rank(1),
                tag: tags::MIGRATE_COUNTS
            }
        );
    }

    #[test]
    fn out_of_range_rank_is_rejected() {
        let group = LocalGroup::new(2);
        assert!(matches!(
            group[0].isend(Rank(5), 0, vec![]),
            Err(CommError::RankOutOfRange { rank: Rank(5), size: 2 })
        ));
        assert!(group[1].irecv(Rank(2), 0).is_err());
    }

    #[test]
    fn all_reduce_sums_every_rank() {
        let out = run(4, |t| t.all_reduce_sum(t.rank().index() as u64 + 1).unwrap());
        assert_eq!(out, vec![10, 10, 10, 10]);
    }

    #[test]
    fn barrier_completes_on_all_ranks() {
        let out = run(3, |t| t.barrier().is_ok());
        assert!(out.into_iter().all(|ok| ok));
    }

    #[test]
    fn exchange_counts_pairs_by_peer() {
        let out = run(3, |t| {
            let me = t.rank().index() as u64;
            let peers = [Rank(0), Rank(1), Rank(2)];
            let send: Vec<u64> = peers.iter().map(|p| me * 10 + p.index() as u64).collect();
            t.exchange_counts(&peers, &send, tags::MIGRATE_COUNTS).unwrap()
        });
        // recv[i] on rank r is what rank i sent to r: i * 10 + r.
        for (r, recv) in out.iter().enumerate() {
            let expected: Vec<u64> = (0..3).map(|i| i * 10 + r as u64).collect();
            assert_eq!(recv, &expected);
        }
    }

    #[test]
    fn send_statistics_accumulate() {
        let group = LocalGroup::new(2);
        let s = group[0].isend(Rank(1), 0, vec![0; 16]).unwrap();
        group[0].wait_all(vec![s], vec![]).unwrap();
        assert_eq!(group[0].messages_sent(), 1);
        assert_eq!(group[0].bytes_sent(), 16);
        assert_eq!(group[1].messages_sent(), 0);
    }
}
