use crate::headers::DataSegment;

/// Cyclic sequence-number arithmetic for a window of `window_size` segments.
///
/// The sequence space has `2 * window_size` labels so that, relative to the last
///  acknowledged number, every label is unambiguously either "already delivered" (the
///  window behind the pivot) or "new" (the window ahead of it). All comparisons are
///  modular - a plain `<` is wrong as soon as the space wraps.
///
/// Pure arithmetic, no state beyond the window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    window_size: u8,
}

impl SeqSpace {
    pub fn new(window_size: u8) -> SeqSpace {
        debug_assert!(
            window_size >= 1 && window_size <= DataSegment::MAX_WINDOW_SIZE,
            "window size must be 1..=128"
        );
        SeqSpace { window_size }
    }

    pub fn window_size(&self) -> u8 {
        self.window_size
    }

    /// number of labels in the space: `2 * window_size`
    pub fn modulus(&self) -> u16 {
        2 * self.window_size as u16
    }

    pub fn next(&self, seq: u8) -> u8 {
        ((seq as u16 + 1) % self.modulus()) as u8
    }

    /// Cyclic ordering test: does `a` precede `b` when both are interpreted relative to
    ///  `pivot` (the last acknowledged number)?
    ///
    /// The case split follows from where the "cut point" of the circular space sits:
    ///  with the pivot in the low half the window ahead of it cannot wrap and a linear
    ///  compare suffices; with the pivot in the high half the window wraps through 0 and
    ///  three orderings put `a` before `b`.
    pub fn is_before(&self, a: u8, b: u8, pivot: u8) -> bool {
        let w = self.window_size;
        if pivot < w {
            pivot < a && a < b
        } else {
            (pivot < a && a < b) || (b < pivot && pivot < a) || (a < b && b < pivot)
        }
    }

    /// Does `seq` fall in the already-acknowledged region relative to `last_acked`?
    ///
    /// The region is `(last_acked - W, last_acked]` together with everything at least `W`
    ///  ahead of `last_acked`, both taken modulo `2W` - which collapses to: the cyclic
    ///  distance from `last_acked` to `seq` is 0 or at least `W`. Such segments are
    ///  dropped silently by the receiver, and such acks are ignored by the sender.
    pub fn is_stale_or_duplicate(&self, seq: u8, last_acked: u8) -> bool {
        let m = self.modulus();
        let d = (seq as u16 + m - last_acked as u16) % m;
        d == 0 || d >= self.window_size as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// cyclic distance from `pivot` to `x` in a space of `2 * w` labels
    fn rank(x: u8, pivot: u8, w: u8) -> u16 {
        let m = 2 * w as u16;
        (x as u16 + m - pivot as u16) % m
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    #[case(5)]
    fn test_next_wraps(#[case] w: u8) {
        let space = SeqSpace::new(w);
        let m = space.modulus();
        for seq in 0..m {
            assert_eq!(space.next(seq as u8) as u16, (seq + 1) % m);
        }
        assert_eq!(space.next((m - 1) as u8), 0);
    }

    /// For every pivot, the `w - 1` labels strictly between the pivot and `pivot + w`
    ///  are the admissible fresh region; within it, `is_before` must agree with the
    ///  cyclic distance from the pivot.
    #[rstest]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    #[case(5)]
    fn test_is_before_matches_cyclic_distance_exhaustively(#[case] w: u8) {
        let space = SeqSpace::new(w);
        let m = space.modulus();

        for pivot in 0..m as u8 {
            let fresh: Vec<u8> = (1..w as u16)
                .map(|k| ((pivot as u16 + k) % m) as u8)
                .collect();

            for &a in &fresh {
                for &b in &fresh {
                    if a == b {
                        continue;
                    }
                    let expected = rank(a, pivot, w) < rank(b, pivot, w);
                    assert_eq!(
                        space.is_before(a, b, pivot),
                        expected,
                        "w={} pivot={} a={} b={}",
                        w,
                        pivot,
                        a,
                        b
                    );
                    // antisymmetry within the fresh region
                    assert_ne!(
                        space.is_before(a, b, pivot),
                        space.is_before(b, a, pivot),
                        "w={} pivot={} a={} b={}",
                        w,
                        pivot,
                        a,
                        b
                    );
                }
            }
        }
    }

    #[rstest]
    // pivot in the low half: linear compare
    #[case::low_linear(4, 1, 2, 3, true)]
    #[case::low_linear_reversed(4, 1, 3, 2, false)]
    // pivot in the high half: wrap through 0
    #[case::high_no_wrap(4, 5, 6, 7, true)]
    #[case::high_b_wrapped(4, 5, 6, 0, true)]
    #[case::high_both_wrapped(4, 6, 0, 1, true)]
    #[case::high_both_wrapped_reversed(4, 6, 1, 0, false)]
    fn test_is_before_cases(
        #[case] w: u8,
        #[case] pivot: u8,
        #[case] a: u8,
        #[case] b: u8,
        #[case] expected: bool,
    ) {
        assert_eq!(SeqSpace::new(w).is_before(a, b, pivot), expected);
    }

    /// The fresh region relative to `last_acked` is exactly the `w - 1` labels strictly
    ///  between it and `last_acked + w`; everything else is stale or duplicate.
    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    #[case(5)]
    fn test_is_stale_or_duplicate_exhaustively(#[case] w: u8) {
        let space = SeqSpace::new(w);
        let m = space.modulus();

        for last_acked in 0..m as u8 {
            for seq in 0..m as u8 {
                let d = rank(seq, last_acked, w);
                let expected_fresh = d >= 1 && d < w as u16;
                assert_eq!(
                    space.is_stale_or_duplicate(seq, last_acked),
                    !expected_fresh,
                    "w={} last_acked={} seq={}",
                    w,
                    last_acked,
                    seq
                );
            }
        }
    }

    #[rstest]
    #[case::duplicate_of_last(4, 6, 6, true)]
    #[case::just_behind(4, 6, 5, true)]
    #[case::window_behind_wrapped(4, 1, 7, true)]
    // the label a full window ahead coincides with the one a full window behind
    #[case::ambiguous_full_window_ahead(4, 6, 2, true)]
    #[case::fresh_next(4, 6, 7, false)]
    #[case::fresh_wrapped(4, 6, 0, false)]
    #[case::fresh_wrapped_further(4, 6, 1, false)]
    fn test_is_stale_or_duplicate_cases(
        #[case] w: u8,
        #[case] last_acked: u8,
        #[case] seq: u8,
        #[case] expected: bool,
    ) {
        assert_eq!(
            SeqSpace::new(w).is_stale_or_duplicate(seq, last_acked),
            expected
        );
    }
}
