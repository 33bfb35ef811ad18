/// Runs `$x` once per bit of `$byte`, most significant bit first, binding the
/// bit to `$b`.
#[macro_export]
macro_rules! unroll_for {
    ($b:ident in $byte:expr, $x:block) => {
        let byte = $byte;
        $crate::unroll_for!(@bits $b, byte, $x, 7 6 5 4 3 2 1 0);
    };
    (@bits $b:ident, $byte:ident, $x:block, $($shift:literal)+) => {
        $(
            let $b = ($byte >> $shift) & 1;
            $x;
        )+
    };
}

/// Narrowing conversion of a value that is bounded by construction
/// (masked, clamped or validated at load time).
///
/// Checked in debug builds, unless `unsafe_conversions` is enabled.
#[macro_export]
macro_rules! narrow {
    ($t:ty, $a:expr) => {{
        let value = $a;
        if !cfg!(feature = "unsafe_conversions") {
            debug_assert!(<$t>::try_from(value).is_ok(), "{} does not fit", value);
        }
        value as $t
    }};
}

#[macro_export]
macro_rules! u8 {
    ($a:expr) => {
        $crate::narrow!(u8, $a)
    };
}

#[macro_export]
macro_rules! u16 {
    ($a:expr) => {
        $crate::narrow!(u16, $a)
    };
}

#[macro_export]
macro_rules! u32 {
    ($a:expr) => {
        $crate::narrow!(u32, $a)
    };
}

#[cfg(test)]
mod tests {
    #[test]
    fn unroll_for_visits_msb_first() {
        let mut bits = Vec::new();
        unroll_for!(bit in 0b1011_0010u8, {
            bits.push(bit);
        });
        assert_eq!(bits, [1, 0, 1, 1, 0, 0, 1, 0]);
    }

    #[test]
    fn narrow_keeps_bounded_values() {
        assert_eq!(u8!(255u32), 255);
        assert_eq!(u16!(0x1234usize), 0x1234);
        assert_eq!(u32!(7u64), 7);
    }
}
