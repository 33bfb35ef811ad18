use std::sync::OnceLock;

/// Lookup tables shared by every predictor. Built once, read-only afterwards.
pub struct Tables {
    squash: Vec<u16>,  // 4096
    stretch: Vec<i16>, // 32768
    /// Reciprocal adaptation rates by counter count
    pub dt: [i32; 1024],
    /// Match model confidence by match length
    pub dt2k: [i32; 256],
}

pub fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let squash = (0..4096)
            .map(|i| {
                let x = f64::from(i - 2048) * (-1.0 / 64.0);
                (32768.0 / (1.0 + x.exp())).min(32767.0) as u16
            })
            .collect();
        let stretch = (0..32768)
            .map(|i| {
                let x = ((f64::from(i) + 0.5) / (32767.5 - f64::from(i))).ln();
                let v = (x * 64.0 + 0.5 + 100_000.0) as i32 - 100_000;
                v.clamp(-2047, 2047) as i16
            })
            .collect();

        let mut dt = [0; 1024];
        for (i, d) in (0..).zip(dt.iter_mut()) {
            *d = (1 << 17) / (i * 2 + 3) * 2;
        }
        let mut dt2k = [0; 256];
        for (i, d) in (0..).zip(dt2k.iter_mut()).skip(1) {
            *d = 2048 / i;
        }

        Tables { squash, stretch, dt, dt2k }
    })
}

impl Tables {
    /// Logistic: stretched domain [-2048, 2047] -> probability scaled by 2^15
    #[inline(always)]
    pub fn squash(&self, x: i32) -> i32 {
        i32::from(self.squash[(x.clamp(-2048, 2047) + 2048) as usize])
    }

    /// Inverse of `squash`, ln(p / (1 - p))
    #[inline(always)]
    pub fn stretch(&self, p: u32) -> i32 {
        i32::from(self.stretch[(p & 0x7fff) as usize])
    }
}

#[inline(always)]
pub fn clamp2k(x: i32) -> i32 { x.clamp(-2048, 2047) }

#[inline(always)]
pub fn clamp512k(x: i32) -> i32 { x.clamp(-(1 << 19), (1 << 19) - 1) }
