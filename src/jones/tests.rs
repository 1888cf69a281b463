// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use approx::assert_abs_diff_eq;
use marlu::{c64, Jones, LmnRime, UVW};

use super::*;

fn counting_matrix_set(num_stations: usize, num_sources: usize) -> JonesSet {
    let mut set =
        JonesSet::new(MemType::Matrix64, MemLocation::Host, num_stations, num_sources).unwrap();
    for (i, j) in set.mem_mut().as_matrix64_mut().unwrap().iter_mut().enumerate() {
        let base = i as f64;
        *j = Jones::from([
            c64::new(base + 1.0, 0.5),
            c64::new(base + 2.0, -0.5),
            c64::new(base + 3.0, 0.25),
            c64::new(base + 4.0, -0.25),
        ]);
    }
    set
}

#[test]
fn test_real_type_is_rejected() {
    assert!(matches!(
        JonesSet::new(MemType::Real64, MemLocation::Host, 2, 2),
        Err(JonesError::NotComplex(MemType::Real64))
    ));
}

#[test]
fn test_identity_join_is_a_no_op() {
    let mut a = counting_matrix_set(3, 4);
    let before = a.mem().as_matrix64().unwrap().to_vec();
    let identity = JonesSet::identity(MemType::Matrix64, MemLocation::Host, 3, 4).unwrap();
    a.join_from_right(&identity).unwrap();
    for (x, y) in a.mem().as_matrix64().unwrap().iter().zip(&before) {
        assert_abs_diff_eq!(*x, *y);
    }
}

#[test]
fn test_join_matches_per_element_multiplication() {
    let a = counting_matrix_set(2, 3);
    let mut b = counting_matrix_set(2, 3);
    // Make b distinct from a.
    for j in b.mem_mut().as_matrix64_mut().unwrap() {
        *j = *j * c64::new(0.0, 1.0);
    }

    let mut out = JonesSet::new(MemType::Matrix64, MemLocation::Host, 2, 3).unwrap();
    JonesSet::join(&mut out, &a, &b).unwrap();

    let mut inline = a.clone();
    inline.join_from_right(&b).unwrap();

    for ((o, i), (x, y)) in out
        .mem()
        .as_matrix64()
        .unwrap()
        .iter()
        .zip(inline.mem().as_matrix64().unwrap())
        .zip(a.mem().as_matrix64().unwrap().iter().zip(b.mem().as_matrix64().unwrap()))
    {
        assert_abs_diff_eq!(*o, *i);
        assert_abs_diff_eq!(*o, *x * *y);
    }
}

#[test]
fn test_join_matrix_with_scalar() {
    let mut a = counting_matrix_set(2, 2);
    let before = a.mem().as_matrix64().unwrap().to_vec();
    let mut s = JonesSet::new(MemType::Complex64, MemLocation::Host, 2, 2).unwrap();
    s.mem_mut().as_complex64_mut().unwrap().fill(c64::new(0.0, 2.0));
    a.join_from_right(&s).unwrap();
    for (x, y) in a.mem().as_matrix64().unwrap().iter().zip(&before) {
        assert_abs_diff_eq!(*x, *y * c64::new(0.0, 2.0));
    }
}

#[test]
fn test_join_scalar_with_matrix_inline_is_rejected() {
    let mut s = JonesSet::identity(MemType::Complex64, MemLocation::Host, 2, 2).unwrap();
    let m = JonesSet::identity(MemType::Matrix64, MemLocation::Host, 2, 2).unwrap();
    // A scalar set cannot store a matrix product.
    assert!(matches!(
        s.join_from_right(&m),
        Err(JonesError::IncompatibleTypes { .. })
    ));
}

#[test]
fn test_join_mixed_precision_is_rejected() {
    let mut a = JonesSet::identity(MemType::Matrix64, MemLocation::Host, 2, 2).unwrap();
    let b = JonesSet::identity(MemType::Matrix32, MemLocation::Host, 2, 2).unwrap();
    assert!(matches!(
        a.join_from_right(&b),
        Err(JonesError::IncompatibleTypes { .. })
    ));
}

#[test]
fn test_join_extent_mismatch_is_rejected() {
    let mut a = JonesSet::identity(MemType::Matrix64, MemLocation::Host, 2, 3).unwrap();
    let b = JonesSet::identity(MemType::Matrix64, MemLocation::Host, 3, 2).unwrap();
    assert!(matches!(
        a.join_from_right(&b),
        Err(JonesError::DimensionMismatch { .. })
    ));
}

#[test]
fn test_single_and_double_precision_joins_agree() {
    let a64 = counting_matrix_set(3, 3);
    let mut b64 = counting_matrix_set(3, 3);
    for j in b64.mem_mut().as_matrix64_mut().unwrap() {
        *j = *j * c64::new(0.1, -0.3);
    }

    let mut a32 = JonesSet::new(MemType::Matrix32, MemLocation::Host, 3, 3).unwrap();
    let mut b32 = JonesSet::new(MemType::Matrix32, MemLocation::Host, 3, 3).unwrap();
    for (dst, src) in a32
        .mem_mut()
        .as_matrix32_mut()
        .unwrap()
        .iter_mut()
        .zip(a64.mem().as_matrix64().unwrap())
    {
        *dst = Jones::from(*src);
    }
    for (dst, src) in b32
        .mem_mut()
        .as_matrix32_mut()
        .unwrap()
        .iter_mut()
        .zip(b64.mem().as_matrix64().unwrap())
    {
        *dst = Jones::from(*src);
    }

    let mut j64 = a64.clone();
    j64.join_from_right(&b64).unwrap();
    a32.join_from_right(&b32).unwrap();

    for (s, d) in a32
        .mem()
        .as_matrix32()
        .unwrap()
        .iter()
        .zip(j64.mem().as_matrix64().unwrap())
    {
        for pol in 0..4 {
            let single = s[pol];
            let double = d[pol];
            let scale = double.norm().max(1.0);
            assert_abs_diff_eq!(single.re as f64, double.re, epsilon = 5e-5 * scale);
            assert_abs_diff_eq!(single.im as f64, double.im, epsilon = 5e-5 * scale);
        }
    }
}

#[test]
fn test_phase_terms_at_phase_centre_are_unity() {
    let uvws = [
        UVW { u: 10.0, v: -20.0, w: 5.0 },
        UVW { u: -3.0, v: 7.0, w: 1.0 },
    ];
    // A source at the phase centre has l = m = 0, n - 1 = 0.
    let lmns = [LmnRime { l: 0.0, m: 0.0, n: 0.0 }];
    let mut k = JonesSet::new(MemType::Complex64, MemLocation::Host, 2, 1).unwrap();
    k.set_phase_terms(&uvws, &lmns, 1.0 / 2.0).unwrap();
    for p in k.mem().as_complex64().unwrap() {
        assert_abs_diff_eq!(p.re, 1.0);
        assert_abs_diff_eq!(p.im, 0.0);
    }
}

#[test]
fn test_phase_terms_magnitude_and_conjugate_symmetry() {
    let uvws = [UVW { u: 100.0, v: 50.0, w: -25.0 }];
    let lmns = [LmnRime { l: 0.01, m: 0.02, n: -0.0002 }];
    let mut k = JonesSet::new(MemType::Complex64, MemLocation::Host, 1, 1).unwrap();
    k.set_phase_terms(&uvws, &lmns, 1.0 / 0.21).unwrap();
    let p = k.mem().as_complex64().unwrap()[0];
    assert_abs_diff_eq!(p.norm(), 1.0, epsilon = 1e-12);

    // Negating the baseline negates the phase.
    let neg_uvws = [UVW { u: -100.0, v: -50.0, w: 25.0 }];
    let mut k2 = JonesSet::new(MemType::Complex64, MemLocation::Host, 1, 1).unwrap();
    k2.set_phase_terms(&neg_uvws, &lmns, 1.0 / 0.21).unwrap();
    let q = k2.mem().as_complex64().unwrap()[0];
    assert_abs_diff_eq!(p.re, q.re, epsilon = 1e-12);
    assert_abs_diff_eq!(p.im, -q.im, epsilon = 1e-12);
}

#[test]
fn test_phase_terms_on_a_matrix_set_are_diagonal() {
    let uvws = [UVW { u: 15.0, v: 0.0, w: 0.0 }];
    let lmns = [LmnRime { l: 0.05, m: 0.0, n: 0.0 }];
    let mut k = JonesSet::new(MemType::Matrix64, MemLocation::Host, 1, 1).unwrap();
    k.set_phase_terms(&uvws, &lmns, 1.0).unwrap();
    let j = k.mem().as_matrix64().unwrap()[0];
    assert_abs_diff_eq!(j[0].re, j[3].re);
    assert_abs_diff_eq!(j[0].im, j[3].im);
    assert_abs_diff_eq!(j[1].norm(), 0.0);
    assert_abs_diff_eq!(j[2].norm(), 0.0);
    assert_abs_diff_eq!(j[0].norm(), 1.0, epsilon = 1e-12);
}

#[test]
fn test_phase_term_array_length_mismatch() {
    let uvws = [UVW::default()];
    let lmns = [LmnRime { l: 0.0, m: 0.0, n: 0.0 }];
    let mut k = JonesSet::new(MemType::Complex64, MemLocation::Host, 2, 1).unwrap();
    assert!(matches!(
        k.set_phase_terms(&uvws, &lmns, 1.0),
        Err(JonesError::ArrayLength { what: "station UVWs", .. })
    ));
}
