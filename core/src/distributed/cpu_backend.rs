use super::backend::CollectiveBackend;
use crate::error::{Error, Result};
use crate::tensor::{Cpu, Tensor, TensorElem};
use crossbeam::channel::{Receiver, Sender, unbounded};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// One tensor in flight between two ranks.
///
/// Values travel as `f64`, which represents every `f32` and `f64` exactly, so a chunk
/// arrives bit-identical to what was sent.
#[derive(Debug)]
pub struct Chunk {
    seq: u64,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Chunk {
    fn encode<T: TensorElem>(seq: u64, tensor: &Tensor<T, 2, Cpu>) -> Result<Self> {
        let [rows, cols] = *tensor.shape();
        let data = tensor
            .data()
            .iter()
            .map(|v| v.to_f64())
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| Error::Collective("element is not representable as f64".into()))?;
        Ok(Self {
            seq,
            rows,
            cols,
            data,
        })
    }

    fn decode<T: TensorElem>(self) -> Result<Tensor<T, 2, Cpu>> {
        let data = self
            .data
            .into_iter()
            .map(T::from_f64)
            .collect::<Option<Vec<T>>>()
            .ok_or_else(|| Error::Collective("received value does not fit element type".into()))?;
        Ok(Tensor::new(data, [self.rows, self.cols])?)
    }
}

/// A CPU collective backend built on `crossbeam` channels.
///
/// Ranks are threads (or anything else that can hold a channel end). Every ordered pair
/// of ranks has its own unbounded channel, so an all-to-all can post all of its outgoing
/// chunks before waiting on any incoming one.
pub struct CpuBackend {
    rank: usize,
    world_size: usize,
    to_peer: Vec<Sender<Chunk>>,     // to_peer[j]: this rank -> rank j
    from_peer: Vec<Receiver<Chunk>>, // from_peer[j]: rank j -> this rank
    seq: AtomicU64,
}

impl CpuBackend {
    /// Creates a backend from pre-wired channel ends.
    ///
    /// `to_peer` and `from_peer` must both hold `world_size` entries, indexed by peer rank.
    pub fn new(
        rank: usize,
        world_size: usize,
        to_peer: Vec<Sender<Chunk>>,
        from_peer: Vec<Receiver<Chunk>>,
    ) -> Result<Self> {
        if rank >= world_size {
            return Err(Error::InvalidRank { rank, world_size });
        }
        if to_peer.len() != world_size || from_peer.len() != world_size {
            return Err(Error::InvalidConfig(format!(
                "expected {} channel ends per direction, got {} and {}",
                world_size,
                to_peer.len(),
                from_peer.len()
            )));
        }
        Ok(Self {
            rank,
            world_size,
            to_peer,
            from_peer,
            seq: AtomicU64::new(0),
        })
    }

    /// Wires a fully connected group and returns one backend per rank, in rank order.
    pub fn mesh(world_size: usize) -> Vec<CpuBackend> {
        let mut senders: Vec<Vec<Sender<Chunk>>> = (0..world_size).map(|_| Vec::new()).collect();
        let mut receivers: Vec<Vec<Receiver<Chunk>>> =
            (0..world_size).map(|_| Vec::new()).collect();

        for src in 0..world_size {
            for dst in 0..world_size {
                let (tx, rx) = unbounded();
                senders[src].push(tx);
                receivers[dst].push(rx);
            }
        }

        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (to_peer, from_peer))| Self {
                rank,
                world_size,
                to_peer,
                from_peer,
                seq: AtomicU64::new(0),
            })
            .collect()
    }
}

impl CollectiveBackend for CpuBackend {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn all_to_all<T: TensorElem>(
        &self,
        chunks: Vec<Tensor<T, 2, Cpu>>,
    ) -> Result<Vec<Tensor<T, 2, Cpu>>> {
        if chunks.len() != self.world_size {
            return Err(Error::Collective(format!(
                "all_to_all expects {} chunks, got {}",
                self.world_size,
                chunks.len()
            )));
        }
        let seq = self.seq.load(Ordering::SeqCst);
        trace!(rank = self.rank, seq, "all_to_all");

        // Encode every outgoing chunk before sending any, so a bad value leaves no peer
        // holding half of this collective.
        let mut own = None;
        let mut outgoing = Vec::with_capacity(self.world_size.saturating_sub(1));
        for (dst, chunk) in chunks.into_iter().enumerate() {
            if dst == self.rank {
                own = Some(chunk);
            } else {
                outgoing.push((dst, Chunk::encode(seq, &chunk)?));
            }
        }
        self.seq.store(seq + 1, Ordering::SeqCst);

        // Channels are unbounded, so posting never blocks.
        for (dst, encoded) in outgoing {
            self.to_peer[dst]
                .send(encoded)
                .map_err(|_| Error::Collective(format!("rank {} hung up", dst)))?;
        }

        let mut received = Vec::with_capacity(self.world_size);
        for src in 0..self.world_size {
            if src == self.rank {
                let chunk = own
                    .take()
                    .ok_or_else(|| Error::Collective("local chunk missing".into()))?;
                received.push(chunk);
                continue;
            }
            let chunk = self.from_peer[src]
                .recv()
                .map_err(|_| Error::Collective(format!("rank {} hung up", src)))?;
            if chunk.seq != seq {
                return Err(Error::Collective(format!(
                    "rank {} is in collective #{} but rank {} is in #{}",
                    src, chunk.seq, self.rank, seq
                )));
            }
            received.push(chunk.decode()?);
        }

        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cpu_backend_properties() {
        let backends = CpuBackend::mesh(4);
        assert_eq!(backends.len(), 4);
        assert_eq!(backends[2].rank(), 2);
        assert_eq!(backends[2].world_size(), 4);
        assert_eq!(backends[3].topology().unwrap().rank, 3);
    }

    #[test]
    fn test_single_rank_all_to_all_is_identity() {
        let backend = CpuBackend::mesh(1).pop().unwrap();
        let t = Tensor::<f32, 2>::new(vec![1.0, 2.0], [1, 2]).unwrap();
        let out = backend.all_to_all(vec![t]).unwrap();
        assert_eq!(out[0].data(), &[1.0, 2.0]);
    }

    #[test]
    fn test_wrong_chunk_count() {
        let backend = CpuBackend::mesh(1).pop().unwrap();
        let err = backend.all_to_all::<f32>(vec![]);
        assert!(matches!(err, Err(Error::Collective(_))));
    }

    #[test]
    fn test_all_to_all_routes_by_rank() {
        let handles: Vec<_> = CpuBackend::mesh(3)
            .into_iter()
            .map(|backend| {
                thread::spawn(move || {
                    let rank = backend.rank();
                    // Chunk for rank j carries the value 10 * rank + j.
                    let chunks = (0..3)
                        .map(|j| Tensor::<f32, 2>::new(vec![(10 * rank + j) as f32], [1, 1]))
                        .collect::<crate::tensor::Result<Vec<_>>>()
                        .unwrap();
                    let got = backend.all_to_all(chunks).unwrap();
                    for (src, t) in got.iter().enumerate() {
                        assert_eq!(t.data(), &[(10 * src + rank) as f32]);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_hung_up_peer() {
        let mut backends = CpuBackend::mesh(2);
        let rank1 = backends.pop().unwrap();
        let rank0 = backends.pop().unwrap();
        drop(rank1);

        let t = Tensor::<f32, 2>::zeros([1, 1]);
        let err = rank0.all_to_all(vec![t.clone(), t]);
        assert!(matches!(err, Err(Error::Collective(_))));
    }

    /// An `f32` that refuses to convert when it holds NaN.
    #[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
    struct Opaque(f32);

    macro_rules! opaque_ops {
        ($($op:ident $method:ident $assign:ident $assign_method:ident),*) => {$(
            impl std::ops::$op for Opaque {
                type Output = Self;
                fn $method(self, rhs: Self) -> Self {
                    Opaque(std::ops::$op::$method(self.0, rhs.0))
                }
            }
            impl std::ops::$assign for Opaque {
                fn $assign_method(&mut self, rhs: Self) {
                    std::ops::$assign::$assign_method(&mut self.0, rhs.0);
                }
            }
        )*};
    }
    opaque_ops!(
        Add add AddAssign add_assign,
        Sub sub SubAssign sub_assign,
        Mul mul MulAssign mul_assign,
        Div div DivAssign div_assign,
        Rem rem RemAssign rem_assign
    );

    impl num_traits::Zero for Opaque {
        fn zero() -> Self {
            Opaque(0.0)
        }
        fn is_zero(&self) -> bool {
            self.0 == 0.0
        }
    }

    impl num_traits::One for Opaque {
        fn one() -> Self {
            Opaque(1.0)
        }
    }

    impl num_traits::Num for Opaque {
        type FromStrRadixErr = <f32 as num_traits::Num>::FromStrRadixErr;
        fn from_str_radix(
            s: &str,
            radix: u32,
        ) -> std::result::Result<Self, Self::FromStrRadixErr> {
            <f32 as num_traits::Num>::from_str_radix(s, radix).map(Opaque)
        }
    }

    impl num_traits::FromPrimitive for Opaque {
        fn from_i64(n: i64) -> Option<Self> {
            Some(Opaque(n as f32))
        }
        fn from_u64(n: u64) -> Option<Self> {
            Some(Opaque(n as f32))
        }
        fn from_f64(n: f64) -> Option<Self> {
            Some(Opaque(n as f32))
        }
    }

    impl num_traits::ToPrimitive for Opaque {
        fn to_i64(&self) -> Option<i64> {
            self.to_f64().map(|v| v as i64)
        }
        fn to_u64(&self) -> Option<u64> {
            self.to_f64().map(|v| v as u64)
        }
        fn to_f64(&self) -> Option<f64> {
            (!self.0.is_nan()).then_some(self.0 as f64)
        }
    }

    #[test]
    fn test_failed_encode_sends_nothing() {
        let backends = CpuBackend::mesh(3);
        let good = Tensor::new(vec![Opaque(1.0)], [1, 1]).unwrap();
        let bad = Tensor::new(vec![Opaque(f32::NAN)], [1, 1]).unwrap();

        let err = backends[0].all_to_all(vec![good.clone(), good.clone(), bad]);
        assert!(matches!(err, Err(Error::Collective(_))));
        // Rank 1 comes before the bad chunk and must not have been sent its piece.
        assert!(backends[1].from_peer[0].try_recv().is_err());
        assert!(backends[2].from_peer[0].try_recv().is_err());
        assert_eq!(backends[0].seq.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_new_validates_channel_count() {
        let (tx, rx) = unbounded();
        let err = CpuBackend::new(0, 2, vec![tx], vec![rx]);
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }
}
