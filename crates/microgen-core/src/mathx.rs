//! Small self-contained numerics module: gamma, log-gamma, regularized
//! incomplete beta, and erf/erfc (§4.2 treats these as "an external
//! mathematical library the core consumes"; at four functions, a
//! self-contained module is the idiomatic choice over a heavyweight
//! special-functions dependency).

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function, via the Lanczos approximation.
/// Valid for `x > 0`.
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula: Γ(x)Γ(1-x) = π / sin(πx).
        (std::f64::consts::PI / (std::f64::consts::PI * x).sin()).ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut a = LANCZOS_COEFFICIENTS[0];
        let t = x + LANCZOS_G + 0.5;
        for (i, coeff) in LANCZOS_COEFFICIENTS.iter().enumerate().skip(1) {
            a += coeff / (x + i as f64);
        }
        0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
    }
}

/// The gamma function `Γ(x)`, for `x > 0`.
pub fn gamma(x: f64) -> f64 {
    ln_gamma(x).exp()
}

/// Complementary error function, via Abramowitz & Stegun 7.1.26 (max
/// absolute error ~1.5e-7), sufficient for the p-value clamping this crate
/// needs it for.
pub fn erfc(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736
                + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    let y = poly * (-x * x).exp();
    if sign > 0.0 { y } else { 2.0 - y }
}

/// Error function, `1 - erfc(x)`.
pub fn erf(x: f64) -> f64 {
    1.0 - erfc(x)
}

/// Continued-fraction evaluation of the incomplete beta function, per
/// Numerical Recipes `betacf`.
fn incomplete_beta_cf(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: i32 = 200;
    const EPS: f64 = 3.0e-12;
    const FP_MIN: f64 = 1.0e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < FP_MIN {
        d = FP_MIN;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m_f = m as f64;
        let m2 = 2.0 * m_f;

        let aa = m_f * (b - m_f) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < FP_MIN {
            d = FP_MIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FP_MIN {
            c = FP_MIN;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + m_f) * (qab + m_f) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < FP_MIN {
            d = FP_MIN;
        }
        c = 1.0 + aa / c;
        if c.abs() < FP_MIN {
            c = FP_MIN;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;

        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function `I_x(a, b)`, for `a, b > 0` and
/// `x in [0, 1]`. Used to convert a Welch t-statistic into a two-sided
/// p-value (§4.3 C7).
pub fn incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if !(0.0..=1.0).contains(&x) || a <= 0.0 || b <= 0.0 {
        return 0.5;
    }
    if x == 0.0 || x == 1.0 {
        return x;
    }

    let ln_beta_fn = ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b);
    let front = (a * x.ln() + b * (1.0 - x).ln() - ln_beta_fn).exp();

    if x < (a + 1.0) / (a + b + 2.0) {
        front * incomplete_beta_cf(a, b, x) / a
    } else {
        1.0 - front * incomplete_beta_cf(b, a, 1.0 - x) / b
    }
}

/// Two-sided p-value for a Welch t-statistic with `dof` degrees of freedom,
/// via the Student-t / incomplete-beta identity
/// `P(|T| > |t|) = I_{dof / (dof + t^2)}(dof/2, 1/2)`.
///
/// Guards the degenerate cases named in §7 (`NumericError`): zero or
/// non-finite degrees of freedom return `1.0` (p = 0.5 contributes nothing
/// to the caller's `1 - 2p` error term).
pub fn student_t_two_sided_p(t: f64, dof: f64) -> f64 {
    if !t.is_finite() || !dof.is_finite() || dof <= 0.0 {
        return 1.0;
    }
    let x = dof / (dof + t * t);
    incomplete_beta(dof / 2.0, 0.5, x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_of_small_integers_matches_factorials() {
        assert!((gamma(1.0) - 1.0).abs() < 1e-9);
        assert!((gamma(2.0) - 1.0).abs() < 1e-9);
        assert!((gamma(3.0) - 2.0).abs() < 1e-9);
        assert!((gamma(5.0) - 24.0).abs() < 1e-7);
    }

    #[test]
    fn gamma_half_matches_sqrt_pi() {
        assert!((gamma(0.5) - std::f64::consts::PI.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn erf_is_odd_and_bounded() {
        assert!((erf(0.0)).abs() < 1e-12);
        assert!((erf(10.0) - 1.0).abs() < 1e-9);
        assert!((erf(-10.0) + 1.0).abs() < 1e-9);
        assert!((erf(1.0) + erf(-1.0)).abs() < 1e-9);
    }

    #[test]
    fn incomplete_beta_boundary_values() {
        assert_eq!(incomplete_beta(2.0, 3.0, 0.0), 0.0);
        assert_eq!(incomplete_beta(2.0, 3.0, 1.0), 1.0);
    }

    #[test]
    fn incomplete_beta_symmetric_case_at_half() {
        // I_0.5(a, a) == 0.5 for any a, by symmetry of the beta distribution.
        let v = incomplete_beta(3.0, 3.0, 0.5);
        assert!((v - 0.5).abs() < 1e-9);
    }

    #[test]
    fn student_t_p_value_of_zero_statistic_is_one() {
        let p = student_t_two_sided_p(0.0, 10.0);
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn student_t_p_value_shrinks_as_statistic_grows() {
        let p_small = student_t_two_sided_p(0.5, 20.0);
        let p_large = student_t_two_sided_p(5.0, 20.0);
        assert!(p_large < p_small);
    }

    #[test]
    fn student_t_guards_degenerate_degrees_of_freedom() {
        assert_eq!(student_t_two_sided_p(1.0, 0.0), 1.0);
        assert_eq!(student_t_two_sided_p(f64::NAN, 5.0), 1.0);
    }
}
