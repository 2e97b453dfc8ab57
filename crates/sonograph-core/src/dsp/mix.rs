//! Channel up-mixing and down-mixing.
//!
//! Speaker layouts (mono, stereo, quad, 5.1) convert with the standard
//! speaker rules; any other pair of counts, and every discrete input, copies
//! channels by index and zero-fills or drops the rest.
//!
//! | from → to | rule |
//! |-----------|------|
//! | 1 → 2, 4 | mono copied to L and R |
//! | 1 → 6 | mono to C |
//! | 2 → 1 | `0.5 * (L + R)` |
//! | 4 → 1 | `0.25 * (L + R + SL + SR)` |
//! | 6 → 1 | `√½ (L + R) + C + ½ (SL + SR)` |
//! | 4 → 2 | `L = ½ (L + SL)`, `R = ½ (R + SR)` |
//! | 6 → 2 | `L = L + √½ (C + SL)`, `R = R + √½ (C + SR)` |
//! | 6 → 4 | `L = L + √½ C`, `R = R + √½ C`, surrounds copied |

use std::f32::consts::FRAC_1_SQRT_2;

use crate::node::ChannelInterpretation;

/// Adds `src` into `dst`, converting the channel layout.
///
/// All channels of both sides must have the same length.
pub fn accumulate(src: &[&[f32]], dst: &mut [Vec<f32>], interpretation: ChannelInterpretation) {
    let (from, to) = (src.len(), dst.len());
    if from == to || interpretation == ChannelInterpretation::Discrete || !speaker_pair(from, to) {
        for (s, d) in src.iter().zip(dst.iter_mut()) {
            add(d, s, 1.0);
        }
        return;
    }

    match (from, to) {
        (1, 2 | 4) => {
            add(&mut dst[0], src[0], 1.0);
            add(&mut dst[1], src[0], 1.0);
        }
        (1, 6) => add(&mut dst[2], src[0], 1.0),
        (2, 4 | 6) => {
            add(&mut dst[0], src[0], 1.0);
            add(&mut dst[1], src[1], 1.0);
        }
        (4, 6) => {
            add(&mut dst[0], src[0], 1.0);
            add(&mut dst[1], src[1], 1.0);
            add(&mut dst[4], src[2], 1.0);
            add(&mut dst[5], src[3], 1.0);
        }
        (2, 1) => {
            add(&mut dst[0], src[0], 0.5);
            add(&mut dst[0], src[1], 0.5);
        }
        (4, 1) => {
            for s in src {
                add(&mut dst[0], s, 0.25);
            }
        }
        (6, 1) => {
            add(&mut dst[0], src[0], FRAC_1_SQRT_2);
            add(&mut dst[0], src[1], FRAC_1_SQRT_2);
            add(&mut dst[0], src[2], 1.0);
            add(&mut dst[0], src[4], 0.5);
            add(&mut dst[0], src[5], 0.5);
        }
        (4, 2) => {
            add(&mut dst[0], src[0], 0.5);
            add(&mut dst[0], src[2], 0.5);
            add(&mut dst[1], src[1], 0.5);
            add(&mut dst[1], src[3], 0.5);
        }
        (6, 2) => {
            add(&mut dst[0], src[0], 1.0);
            add(&mut dst[0], src[2], FRAC_1_SQRT_2);
            add(&mut dst[0], src[4], FRAC_1_SQRT_2);
            add(&mut dst[1], src[1], 1.0);
            add(&mut dst[1], src[2], FRAC_1_SQRT_2);
            add(&mut dst[1], src[5], FRAC_1_SQRT_2);
        }
        (6, 4) => {
            add(&mut dst[0], src[0], 1.0);
            add(&mut dst[0], src[2], FRAC_1_SQRT_2);
            add(&mut dst[1], src[1], 1.0);
            add(&mut dst[1], src[2], FRAC_1_SQRT_2);
            add(&mut dst[2], src[4], 1.0);
            add(&mut dst[3], src[5], 1.0);
        }
        _ => unreachable!("speaker_pair admits only the pairs above"),
    }
}

fn speaker_pair(from: usize, to: usize) -> bool {
    const LAYOUTS: [usize; 4] = [1, 2, 4, 6];
    LAYOUTS.contains(&from) && LAYOUTS.contains(&to)
}

#[inline]
fn add(dst: &mut [f32], src: &[f32], gain: f32) {
    for (d, s) in dst.iter_mut().zip(src) {
        *d += s * gain;
    }
}
