//! Distributed reorganization across the process group.
//!
//! Every rank calls [`ParticleStore::migrate`] together. Leaving
//! particles are counted per peer, the counts are exchanged, records are
//! packed and exchanged with one send and one receive per non-empty
//! peer pair, and each rank finishes with a single local placement of
//! stayers plus arrivals.
//!
//! Input validation runs on every rank and its outcome is summed over
//! the group before any particle moves. A rank with bad input returns
//! its own error and every other rank returns
//! [`ContainerError::PeerRejected`]. No container is modified and no
//! rank is left blocked, but every migrate error is still reported as
//! collective-fatal.

use std::time::{Duration, Instant};

use corral_comm::{tags, Distributor, Transport};
use corral_core::{CommError, ContainerError, Rank, Timings};

use crate::batch::ParticleBatch;
use crate::layout::Layout;
use crate::record;
use crate::space::MemorySpace;
use crate::store::ParticleStore;

const OP: &str = "migrate";

impl<L: Layout, S: MemorySpace> ParticleStore<L, S> {
    /// Move every active particle to element `new_element[slot]` on
    /// rank `new_process[slot]`. Collective over the transport's group.
    ///
    /// For a particle leaving this rank, `new_element` indexes this
    /// rank's element table; the element travels as its global id and
    /// is resolved on the receiver. `None` removes the particle.
    ///
    /// With a `distributor`, only its peers are contacted and every
    /// destination must be one of them. Without one, all ranks are
    /// peers.
    pub fn migrate<T: Transport + ?Sized>(
        &mut self,
        new_element: &[Option<usize>],
        new_process: &[Rank],
        distributor: Option<&Distributor>,
        transport: &T,
        timings: &mut Timings,
    ) -> Result<(), ContainerError> {
        let me = self.config.rank;
        let comm = |source: CommError| ContainerError::Communication {
            op: OP,
            rank: me,
            source,
        };
        if transport.rank() != me {
            return Err(comm(CommError::WrongEndpoint {
                expected: me,
                found: transport.rank(),
            }));
        }

        let prebarrier = self.prebarrier(OP, transport)?;
        let start = Instant::now();
        let world;
        let dist = match distributor {
            Some(d) => d,
            None => {
                world = Distributor::world(me, transport.size()).map_err(comm)?;
                &world
            }
        };
        let peers = dist.peers();

        // Every rank learns whether any rank rejected its input, so a
        // local failure never leaves peers waiting on the count exchange.
        let local = self.classify_leavers(new_element, new_process, dist, transport.size());
        let failed = transport
            .all_reduce_sum(u64::from(local.is_err()))
            .map_err(comm)?;
        let (send_counts, leavers) = match local {
            Err(e) => return Err(e),
            Ok(_) if failed > 0 => {
                return Err(ContainerError::PeerRejected {
                    op: OP,
                    rank: me,
                    failed_ranks: failed as usize,
                })
            }
            Ok(plan) => plan,
        };
        let w = self.config.block_width;

        let recv_counts = transport
            .exchange_counts(peers, &send_counts, tags::MIGRATE_COUNTS)
            .map_err(comm)?;

        let width = record::record_width(&self.schema);
        let mut buffers: Vec<Vec<u8>> = send_counts
            .iter()
            .map(|&c| Vec::with_capacity(c as usize * width))
            .collect();
        for &(slot, e, p) in &leavers {
            let gid = self.element_gids[e];
            record::encode(&mut buffers[p], gid, &self.chunks[slot / w], slot % w, &self.schema);
        }

        let mut sends = Vec::new();
        let mut recvs = Vec::new();
        let mut sources = Vec::new();
        for (p, &peer) in peers.iter().enumerate() {
            if peer == me {
                continue;
            }
            if recv_counts[p] > 0 {
                recvs.push(transport.irecv(peer, tags::MIGRATE_PAYLOAD).map_err(comm)?);
                sources.push(p);
            }
            if send_counts[p] > 0 {
                let payload = std::mem::take(&mut buffers[p]);
                sends.push(transport.isend(peer, tags::MIGRATE_PAYLOAD, payload).map_err(comm)?);
            }
        }
        let payloads = transport.wait_all(sends, recvs).map_err(comm)?;

        // Resolve every arrival before storage is modified.
        let incoming: usize = sources.iter().map(|&p| recv_counts[p] as usize).sum();
        let mut arrivals = ParticleBatch::with_capacity(self.schema.clone(), incoming);
        for (&p, bytes) in sources.iter().zip(&payloads) {
            let expected = recv_counts[p] as usize * width;
            if bytes.len() != expected {
                return Err(comm(CommError::Truncated {
                    peer: peers[p],
                    expected,
                    found: bytes.len(),
                }));
            }
            for rec in bytes.chunks_exact(width) {
                let gid = record::gid(rec);
                let element = self
                    .element_of_gid(gid)
                    .ok_or(ContainerError::UnknownElementGid { op: OP, rank: me, gid })?;
                arrivals.push_encoded(element, record::tuple(rec));
            }
        }

        let stay: Vec<Option<usize>> = new_element
            .iter()
            .zip(new_process)
            .map(|(&e, &dest)| e.filter(|_| dest == me))
            .collect();
        self.place(OP, &stay, &arrivals, None)?;
        self.generation += 1;

        tracing::debug!(
            name = %self.config.name,
            rank = me.index(),
            peers = peers.len(),
            sent = leavers.len(),
            received = arrivals.len(),
            num_ptcls = self.num_ptcls,
            "migration complete"
        );
        timings.record(OP, start.elapsed(), prebarrier);
        Ok(())
    }

    /// Check the mappings and bucket leaving slots by destination peer.
    ///
    /// Runs before any message is sent; a failure here leaves the
    /// container untouched.
    fn classify_leavers(
        &self,
        new_element: &[Option<usize>],
        new_process: &[Rank],
        dist: &Distributor,
        group_size: usize,
    ) -> Result<(Vec<u64>, Vec<(usize, usize, usize)>), ContainerError> {
        let me = self.config.rank;
        self.check_mapping(OP, new_element)?;
        if new_process.len() != self.capacity() {
            return Err(self.usage(format!(
                "process mapping has {} entries but capacity is {}",
                new_process.len(),
                self.capacity()
            )));
        }
        if dist.me() != me {
            return Err(self.usage(format!("distributor belongs to rank {}", dist.me())));
        }
        dist.validate_against(group_size)
            .map_err(|e| self.usage(e.to_string()))?;

        let mut send_counts = vec![0u64; dist.peers().len()];
        let mut leavers = Vec::new();
        for slot in 0..self.capacity() {
            let Some(e) = new_element[slot].filter(|_| self.is_active(slot)) else {
                continue;
            };
            let dest = new_process[slot];
            if dest == me {
                continue;
            }
            let Some(p) = dist.slot_of(dest) else {
                return Err(ContainerError::InvalidTarget {
                    op: OP,
                    rank: me,
                    slot,
                    reason: format!("destination rank {dest} is not a peer"),
                });
            };
            send_counts[p] += 1;
            leavers.push((slot, e, p));
        }
        Ok((send_counts, leavers))
    }

    /// Join the optional pre-operation barrier and return the wait.
    pub(crate) fn prebarrier<T: Transport + ?Sized>(
        &self,
        op: &'static str,
        transport: &T,
    ) -> Result<Duration, ContainerError> {
        if !self.config.prebarrier {
            return Ok(Duration::ZERO);
        }
        let start = Instant::now();
        transport
            .barrier()
            .map_err(|source| ContainerError::Communication {
                op,
                rank: self.config.rank,
                source,
            })?;
        Ok(start.elapsed())
    }

    fn usage(&self, reason: String) -> ContainerError {
        ContainerError::Usage {
            op: OP,
            rank: self.config.rank,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use corral_comm::{Distributor, LocalGroup};
    use corral_core::{CommError, ContainerError, Rank, Timings};

    use crate::container::BlockContainer;
    use crate::testing::{sample_snapshot, small_config};

    #[test]
    fn single_rank_migrate_acts_as_rebuild() {
        let group = LocalGroup::new(1);
        let mut s = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let total = s.num_ptcls();
        let map: Vec<Option<usize>> = (0..s.capacity()).map(|_| Some(0)).collect();
        let procs = vec![Rank(0); s.capacity()];
        s.migrate(&map, &procs, None, &group[0], &mut Timings::new())
            .unwrap();
        assert_eq!(s.num_ptcls(), total);
        assert_eq!(s.particles_per_element()[0], total);
        s.validate().unwrap();
    }

    #[test]
    fn destination_outside_group_is_rejected() {
        let group = LocalGroup::new(1);
        let mut s = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let map: Vec<Option<usize>> = (0..s.capacity()).map(|slot| s.element_at(slot)).collect();
        let procs = vec![Rank(3); s.capacity()];
        let err = s
            .migrate(&map, &procs, None, &group[0], &mut Timings::new())
            .unwrap_err();
        assert!(matches!(err, ContainerError::InvalidTarget { op: "migrate", .. }));
    }

    #[test]
    fn transport_must_match_rank() {
        let group = LocalGroup::new(2);
        let mut s = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let map = vec![None; s.capacity()];
        let procs = vec![Rank(0); s.capacity()];
        let err = s
            .migrate(&map, &procs, None, &group[1], &mut Timings::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ContainerError::Communication {
                source: CommError::WrongEndpoint { .. },
                ..
            }
        ));
        assert!(err.is_collective_fatal());
    }

    #[test]
    fn foreign_distributor_is_rejected() {
        let group = LocalGroup::new(1);
        let mut s = <BlockContainer>::from_snapshot(small_config(), sample_snapshot()).unwrap();
        let d = Distributor::new(Rank(1), [Rank(0), Rank(1)]).unwrap();
        let map = vec![None; s.capacity()];
        let procs = vec![Rank(0); s.capacity()];
        let err = s
            .migrate(&map, &procs, Some(&d), &group[0], &mut Timings::new())
            .unwrap_err();
        assert!(matches!(err, ContainerError::Usage { .. }));
    }
}
