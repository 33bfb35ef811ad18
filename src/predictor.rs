use crate::{
    components::{Component, Context, Node},
    error::{ProgramKind, Result},
    model::Model,
    tables::tables,
    u16,
    vm::{ExecMode, Vm},
};

/// The component network of a block together with its context program.
/// Callers alternate [`predict`](Self::predict) and [`update`](Self::update),
/// one pair per coded bit, most significant bit first.
pub struct Predictor {
    nodes: Vec<Node>,
    /// Stretched predictions from the last `predict`, one per node
    p: Vec<i32>,
    /// Contexts the context program left after the last byte
    h: Vec<u32>,
    c8: u32,
    hmap4: u32,
    vm: Vm,
    predicted: bool,
}

impl Predictor {
    pub fn new(model: &Model, mode: ExecMode) -> Result<Self> {
        let nodes = model.components.iter().map(Node::new).collect::<Result<Vec<_>>>()?;
        let vm = Vm::new(ProgramKind::Context, &model.hcomp, model.hh, model.hm, mode)?;
        let n = nodes.len();
        let mut predictor = Self { nodes, p: vec![0; n], h: vec![0; n], c8: 1, hmap4: 1, vm, predicted: false };
        predictor.select();
        Ok(predictor)
    }

    pub fn is_modeled(&self) -> bool { !self.nodes.is_empty() }

    pub fn vm(&self) -> &Vm { &self.vm }

    pub fn node(&self, i: usize) -> Option<&Node> { self.nodes.get(i) }

    /// Probability that the next bit is 1, 15 bits
    pub fn predict(&mut self) -> u16 {
        debug_assert!(!self.predicted, "predict called twice for one bit");
        for i in 0..self.nodes.len() {
            let (done, rest) = self.p.split_at_mut(i);
            let cx = Context { h: self.h[i], c8: self.c8, hmap4: self.hmap4, p: done };
            rest[0] = self.nodes[i].predict(&cx);
        }
        self.predicted = true;
        u16!(tables().squash(self.p.last().copied().unwrap_or(0)))
    }

    /// Trains every component on `bit`. After the 8th bit of a byte the
    /// context program runs on it and computes the contexts for the next.
    pub fn update(&mut self, bit: u32) -> Result<()> {
        debug_assert!(self.predicted, "update without predict");
        self.predicted = false;
        for i in 0..self.nodes.len() {
            let cx = Context { h: self.h[i], c8: self.c8, hmap4: self.hmap4, p: &self.p[..i] };
            self.nodes[i].update(&cx, self.p[i], bit);
        }

        self.c8 = self.c8 * 2 + bit;
        if self.c8 >= 256 {
            self.vm.run(self.c8 - 256)?;
            self.c8 = 1;
            self.hmap4 = 1;
            for (i, h) in self.h.iter_mut().enumerate() {
                *h = self.vm.h(i);
            }
        } else if (16..32).contains(&self.c8) {
            self.hmap4 = (self.hmap4 & 15) << 5 | bit << 4 | 1;
        } else {
            self.hmap4 = (self.hmap4 & 0x1f0) | (((self.hmap4 & 15) * 2 + bit) & 15);
        }
        self.select();
        Ok(())
    }

    fn select(&mut self) {
        for (node, &h) in self.nodes.iter_mut().zip(&self.h) {
            node.select(&Context { h, c8: self.c8, hmap4: self.hmap4, p: &[] });
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::model::Level;

    /// const 200 feeding a one-input mixer with a fixed context
    fn mixer_model() -> Model {
        let body = [0, 0, 0, 0, 2, 1, 200, 7, 0, 0, 1, 24, 0, 0, 56, 0];
        let mut header = vec![body.len() as u8, 0];
        header.extend(body);
        Model::from_header(&header).unwrap()
    }

    fn window_means(predictor: &mut Predictor, bits: impl Iterator<Item = u32>) -> Vec<f64> {
        let ps: Vec<f64> = bits
            .map(|bit| {
                let p = f64::from(predictor.predict()) / 32768.0;
                predictor.update(bit).unwrap();
                p
            })
            .collect();
        ps.chunks(1000).map(|w| w.iter().sum::<f64>() / w.len() as f64).collect()
    }

    #[test]
    fn mixer_converges_to_the_source_rate() {
        let mut predictor = Predictor::new(&mixer_model(), ExecMode::Translate).unwrap();
        let means = window_means(&mut predictor, (0..12000).map(|i| u32::from(i % 10 != 9)));
        let (first, last) = (means[0], means[means.len() - 1]);
        assert!((last - 0.9).abs() < 0.01, "{means:?}");
        assert!((first - 0.9).abs() >= (last - 0.9).abs(), "{means:?}");

        let Some(Node::Mix(mix)) = predictor.node(1) else { panic!("expected a mixer") };
        assert_ne!(mix.weights(), [65536]);
    }

    #[test]
    fn mixer_tracks_random_bits() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut predictor = Predictor::new(&mixer_model(), ExecMode::Translate).unwrap();
        let means = window_means(&mut predictor, (0..12000).map(|_| u32::from(rng.gen_bool(0.9))));
        for mean in &means[2..] {
            assert!((mean - 0.9).abs() < 0.03, "{means:?}");
        }
    }

    #[test]
    fn learns_a_repeated_byte() {
        let mut predictor = Predictor::new(&Level::Fast.model(), ExecMode::Translate).unwrap();
        let mut cost = Vec::new();
        for _ in 0..64 {
            let mut bits = 0.0;
            for i in (0..8).rev() {
                let bit = u32::from(b'A' >> i) & 1;
                let p1 = f64::from(predictor.predict()) / 32768.0;
                bits -= if bit == 1 { p1 } else { 1.0 - p1 }.log2();
                predictor.update(bit).unwrap();
            }
            cost.push(bits);
        }
        assert!(cost[0] > 4.0, "{cost:?}");
        assert!(cost[63] < 0.5, "{cost:?}");
    }

    #[test]
    fn context_program_runs_per_byte() {
        let mut predictor = Predictor::new(&Level::Fast.model(), ExecMode::Interpret).unwrap();
        for bit in [0, 1, 0, 0, 0, 0, 0, 1] {
            predictor.predict();
            predictor.update(bit).unwrap();
        }
        // byte 'A' stored at M[0], then the order 2 and order 4 hashes
        assert_eq!(predictor.vm().machine().m[0], b'A');
        assert_ne!(predictor.h[0], 0);
        assert_eq!((predictor.c8, predictor.hmap4), (1, 1));
    }

    #[test]
    fn fast_contexts_are_orders_two_and_four() {
        let contexts = |bytes: &[u8]| {
            let mut predictor = Predictor::new(&Level::Fast.model(), ExecMode::Interpret).unwrap();
            for &byte in bytes {
                for i in (0..8).rev() {
                    predictor.predict();
                    predictor.update(u32::from(byte >> i) & 1).unwrap();
                }
            }
            (predictor.h[0], predictor.h[1])
        };
        let (xy, zw, xz) = (contexts(b"xyab"), contexts(b"zwab"), contexts(b"xzab"));
        assert_eq!(xy.0, zw.0);
        assert_ne!(xy.1, zw.1);
        assert_ne!(xy.1, xz.1);
        assert_ne!(contexts(b"xyab").0, contexts(b"xyba").0);
    }

    #[test]
    fn context_program_output_is_dropped() {
        let model = crate::config::compile("comp 0 0 0 0 1 0 icm 4 hcomp out halt post 0 end").unwrap();
        let mut predictor = Predictor::new(&model, ExecMode::Translate).unwrap();
        for byte in 0..10_000u32 {
            for i in (0..8).rev() {
                predictor.predict();
                predictor.update((byte >> i) & 1).unwrap();
            }
        }
        assert!(predictor.vm().machine().output().is_empty());
    }
}
