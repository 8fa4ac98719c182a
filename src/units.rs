//! Pure unit conversions and derived scientific quantities.
//!
//! All functions are total: malformed floating point input (NaN, inf) is
//! simply carried through `f64` arithmetic rather than rejected, matching
//! the original implementation's "coerce or yield 0.0" behaviour at the
//! call site in `record::process_samples`, not here.

/// Round to 2 decimal places, matching the original's `round(x, 2)`.
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

pub fn f_to_c(f: f64, noconvert: bool) -> f64 {
    if noconvert {
        return f;
    }
    round2((f - 32.0) * 5.0 / 9.0)
}

pub fn ft_to_m(ft: f64, noconvert: bool) -> f64 {
    if noconvert {
        return ft;
    }
    round2(ft * 0.3048)
}

pub fn in_hg_to_mbar(in_hg: f64, noconvert: bool) -> f64 {
    if noconvert {
        return in_hg;
    }
    round2(in_hg * 33.8639)
}

pub fn kpa_to_mbar(kpa: f64, noconvert: bool) -> f64 {
    if noconvert {
        return kpa;
    }
    round2(kpa * 10.0)
}

/// Dewpoint in degrees Celsius via the Magnus formula.
/// <https://cals.arizona.edu/azmet/dewpoint.html>
pub fn dewpoint_magnus(humidity_pct: f64, temperature_c: f64) -> f64 {
    let ln_rh = (humidity_pct / 100.0).ln();
    let gamma = (ln_rh + (17.27 * temperature_c) / (237.3 + temperature_c)) / 17.27;
    round2((237.3 * gamma) / (1.0 - gamma))
}

/// Absolute humidity (g/m3), simplified formula, no pressure term.
/// <https://carnotcycle.wordpress.com/2012/08/04/how-to-convert-relative-humidity-to-absolute-humidity/>
pub fn abs_humidity_simple(humidity_pct: f64, temperature_c: f64) -> f64 {
    let t = temperature_c;
    round2(
        (6.112 * std::f64::consts::E.powf((17.67 * t) / (t + 243.5)) * humidity_pct * 2.1674)
            / (273.15 + t),
    )
}

/// Absolute humidity (g/m3), pressure-aware formula.
/// <https://www.loxwiki.eu/display/LOX/Absolute+Luftfeuchtigkeit+berechnen>
pub fn abs_humidity_pressure_aware(humidity_pct: f64, temperature_c: f64, pressure_mbar: f64) -> f64 {
    let t = temperature_c;
    let tk = t + 273.15;
    let tk2 = tk * tk;

    let sat_vap = 1.01325
        * 10f64.powf(
            5.426651 - 2005.1 / tk + 0.00013869 * (tk2 - 293700.0) / tk
                * (10f64.powf(0.000000000011965 * (tk2 - 293700.0) * (tk2 - 293700.0)) - 1.0)
                - 0.0044 * 10f64.powf(-0.0057148 * (374.11 - t).powf(1.25)),
        )
        + ((tk / 647.3) - 0.422)
            * (0.577 - (tk / 647.3))
            * (0.000000000011965 * (tk2 - 293700.0) * (tk2 - 293700.0)).exp()
            * 0.00980665;

    let numerator = 0.622 * humidity_pct / 100.0 * sat_vap;
    let denominator = pressure_mbar / 1000.0 - humidity_pct / 100.0 * sat_vap;

    round2(numerator / denominator * pressure_mbar / 1000.0 * 100_000_000.0 / (tk * 287.1))
}

/// Vapor Pressure Deficit in mBar, derived from saturation vapor pressure
/// when the vendor does not report it directly.
/// <https://pulsegrow.com/blogs/learn/vpd>
pub fn vpd_from_rh_temp(humidity_pct: f64, temperature_c: f64, noconvert: bool) -> f64 {
    let t = temperature_c;
    let sat_vap_kpa =
        (610.78 * std::f64::consts::E.powf(t / (t + 238.3) * 17.2694)) / 1000.0;
    let vpd_kpa = sat_vap_kpa * (1.0 - humidity_pct / 100.0);
    kpa_to_mbar(vpd_kpa, noconvert)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f_to_c_boundaries() {
        assert_eq!(f_to_c(32.0, false), 0.0);
        assert_eq!(f_to_c(212.0, false), 100.0);
    }

    #[test]
    fn f_to_c_noconvert_is_identity() {
        assert_eq!(f_to_c(77.0, true), 77.0);
    }

    #[test]
    fn ft_to_m_scenario() {
        assert_eq!(ft_to_m(100.0, false), 30.48);
    }

    #[test]
    fn in_hg_to_mbar_scenario() {
        let got = in_hg_to_mbar(29.92, false);
        assert!((got - 1013.21).abs() < 0.01);
    }

    #[test]
    fn kpa_to_mbar_scenario() {
        assert_eq!(kpa_to_mbar(101.325, false), 1013.25);
    }

    #[test]
    fn dewpoint_matches_fixture() {
        let dp = dewpoint_magnus(50.0, 25.0);
        assert!((dp - 13.86).abs() < 0.1, "got {dp}");
    }

    #[test]
    fn vpd_matches_fixture() {
        let vpd = vpd_from_rh_temp(50.0, 25.0, false);
        assert!((vpd - 15.74).abs() < 0.1, "got {vpd}");
    }

    #[test]
    fn abs_humidity_simple_matches_fixture() {
        let ah = abs_humidity_simple(50.0, 25.0);
        assert!((ah - 11.52).abs() < 0.1, "got {ah}");
    }
}
