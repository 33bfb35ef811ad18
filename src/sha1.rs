use std::{fmt, io};

use crate::io::ByteWrite;

const H0: [u32; 5] = [0x6745_2301, 0xefcd_ab89, 0x98ba_dcfe, 0x1032_5476, 0xc3d2_e1f0];

/// 20-byte SHA-1 digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest(pub [u8; 20]);

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}

/// Streaming SHA-1. Resets itself after every `finish`.
#[derive(Clone)]
pub struct Sha1 {
    state: [u32; 5],
    block: [u8; 64],
    fill: usize,
    len: u64, // bytes
}

impl Default for Sha1 {
    fn default() -> Self { Self::new() }
}

impl Sha1 {
    pub fn new() -> Self { Self { state: H0, block: [0; 64], fill: 0, len: 0 } }

    /// Bytes hashed since the last digest
    pub fn len(&self) -> u64 { self.len }
    pub fn is_empty(&self) -> bool { self.len == 0 }

    pub fn update(&mut self, mut data: &[u8]) {
        self.len += data.len() as u64;
        while !data.is_empty() {
            let take = (64 - self.fill).min(data.len());
            self.block[self.fill..self.fill + take].copy_from_slice(&data[..take]);
            self.fill += take;
            data = &data[take..];
            if self.fill == 64 {
                self.compress();
                self.fill = 0;
            }
        }
    }

    pub fn finish(&mut self) -> Digest {
        let bits = self.len.wrapping_mul(8);
        let fill = self.fill;
        self.block[fill] = 0x80;
        self.block[fill + 1..].fill(0);
        if fill >= 56 {
            self.compress();
            self.block.fill(0);
        }
        self.block[56..].copy_from_slice(&bits.to_be_bytes());
        self.compress();

        let mut digest = [0; 20];
        for (chunk, word) in digest.chunks_exact_mut(4).zip(self.state) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        *self = Self::new();
        Digest(digest)
    }

    pub fn digest(data: &[u8]) -> Digest {
        let mut hasher = Self::new();
        hasher.update(data);
        hasher.finish()
    }

    fn compress(&mut self) {
        let mut w = [0u32; 80];
        for (word, chunk) in w.iter_mut().zip(self.block.chunks_exact(4)) {
            *word = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        for i in 16..80 {
            w[i] = (w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16]).rotate_left(1);
        }

        let [mut a, mut b, mut c, mut d, mut e] = self.state;
        for (i, &wi) in w.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | (!b & d), 0x5a82_7999),
                20..=39 => (b ^ c ^ d, 0x6ed9_eba1),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8f1b_bcdc),
                _ => (b ^ c ^ d, 0xca62_c1d6),
            };
            let t = a.rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(k)
                .wrapping_add(wi);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = t;
        }

        for (s, v) in self.state.iter_mut().zip([a, b, c, d, e]) {
            *s = s.wrapping_add(v);
        }
    }
}

impl ByteWrite for Sha1 {
    fn put(&mut self, byte: u8) -> io::Result<()> {
        self.update(&[byte]);
        Ok(())
    }

    fn put_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.update(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::Sha1;

    #[rstest]
    #[case(b"", "da39a3ee5e6b4b0d3255bfef95601890afd80709")]
    #[case(b"a", "86f7e437faa5a7fce15d1ddcb9eaeaea377667b8")]
    #[case(b"abc", "a9993e364706816aba3e25717850c26c9cd0d89d")]
    #[case(
        b"abcdbcdecdefdefgefghfghighijhijkijkljklmklmnlmnomnopnopq",
        "84983e441c3bd26ebaae4aa1f95129e5e54670f1"
    )]
    #[case(
        b"The quick brown fox jumps over the lazy dog",
        "2fd4e1c67a2d28fced849ee1bb76e7391b93eb12"
    )]
    fn reference_digests(#[case] input: &[u8], #[case] expected: &str) {
        assert_eq!(Sha1::digest(input).to_string(), expected);
    }

    #[test]
    fn multi_block_input() {
        let input: Vec<u8> = (0..100).collect();
        assert_eq!(
            Sha1::digest(&input).to_string(),
            "1e6634bfaebc0348298105923d0f26e47aa33ff5"
        );
    }

    #[test]
    fn streaming_matches_one_shot_and_resets() {
        let input: Vec<u8> = (0..1000u32).map(|i| (i * 31 % 251) as u8).collect();
        let mut hasher = Sha1::new();
        for chunk in input.chunks(7) {
            hasher.update(chunk);
        }
        assert_eq!(hasher.len(), 1000);
        assert_eq!(hasher.finish(), Sha1::digest(&input));
        assert!(hasher.is_empty());
        assert_eq!(hasher.finish(), Sha1::digest(b""));
    }
}
