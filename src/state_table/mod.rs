use std::sync::OnceLock;


/// Count pairs are enumerated up to this total
const N: usize = 50;
/// Max n0 allowed for a given n1 (and by symmetry n1 for n0)
const BOUND: [i32; 6] = [20, 48, 15, 8, 6, 5];

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct StateEntry {
    pub next: [u8; 2],
    pub n0: u8,
    pub n1: u8,
}

/// Bit history states. Each state approximates a pair of bounded counts
/// (n0, n1) of zeros and ones seen in a context.
pub struct StateTable {
    table: [StateEntry; 256],
    states: usize,
}

impl StateTable {
    pub fn get() -> &'static Self {
        static TABLE: OnceLock<StateTable> = OnceLock::new();
        TABLE.get_or_init(Self::generate)
    }

    #[inline(always)]
    pub fn next(&self, state: u8, bit: u32) -> u8 {
        self.table[usize::from(state)].next[(bit & 1) as usize]
    }

    #[inline(always)]
    pub fn entry(&self, state: u8) -> StateEntry { self.table[usize::from(state)] }

    /// Number of states actually reachable from state 0
    pub fn len(&self) -> usize { self.states }

    /// Initial probability (scaled by 2^23) of a one for a state
    pub fn cminit(&self, state: u8) -> u32 {
        let StateEntry { n0, n1, .. } = self.entry(state);
        ((u32::from(n1) * 2 + 1) << 22) / (u32::from(n0) + u32::from(n1) + 1)
    }

    fn generate() -> Self {
        // first state index of every count pair, by increasing total
        let mut first = [[0usize; N]; N];
        let mut states = 0;
        for total in 0..N {
            for n1 in 0..=total {
                let n0 = total - n1;
                first[n0][n1] = states;
                states += num_states(n0 as i32, n1 as i32);
            }
        }
        debug_assert!(states <= 256);

        let mut table = [StateEntry::default(); 256];
        for n0 in 0..N {
            for n1 in 0..N {
                for k in 0..num_states(n0 as i32, n1 as i32) {
                    let (a0, b0) = next_counts(n0 as i32, n1 as i32, 0);
                    let (a1, b1) = next_counts(n0 as i32, n1 as i32, 1);
                    let last1 = num_states(a1, b1) - 1;
                    table[first[n0][n1] + k] = StateEntry {
                        next: [
                            first[a0 as usize][b0 as usize] as u8,
                            (first[a1 as usize][b1 as usize] + last1) as u8,
                        ],
                        n0: n0 as u8,
                        n1: n1 as u8,
                    };
                }
            }
        }

        Self { table, states }
    }
}

/// 0, 1 or 2 states represent a count pair
fn num_states(n0: i32, n1: i32) -> usize {
    let (n0, n1) = if n0 < n1 { (n1, n0) } else { (n0, n1) };
    if n1 < 0 || n1 as usize >= BOUND.len() || n0 > BOUND[n1 as usize] {
        return 0;
    }
    1 + usize::from(n1 > 0 && n0 + n1 <= 17)
}

/// Reduced count of the opposite bit after an observation
fn discount(n: i32) -> i32 {
    [1, 2, 3, 4, 5, 7, 8].into_iter().filter(|&t| n >= t).count() as i32
}

fn next_counts(n0: i32, n1: i32, bit: u8) -> (i32, i32) {
    if n0 < n1 {
        let (b, a) = next_counts(n1, n0, 1 - bit);
        return (a, b);
    }

    let (mut n0, mut n1) = match bit {
        0 => (n0 + 1, discount(n1)),
        _ => (discount(n0), n1 + 1),
    };

    // project onto the nearest allocated pair
    while num_states(n0, n1) == 0 {
        if n1 < 2 {
            n0 -= 1;
        } else {
            n0 = (n0 * (n1 - 1) + n1 / 2) / n1;
            n1 -= 1;
        }
    }
    (n0, n1)
}
