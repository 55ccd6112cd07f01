//! Body fat estimation from weight and bio-impedance.
//!
//! The formula is the one the vendor app applies to this scale family,
//! recovered by observation. It is deterministic and has no failure modes;
//! inputs are trusted numerics.

use crate::config::{Sex, UserProfile};

/// Values above this are considered out of range by the formula
const FAT_PCT_CEILING: f64 = 63.0;
/// ...and are reported as this saturation value instead, for compatibility
/// with the vendor app. There is no lower bound.
const FAT_PCT_SATURATED: f64 = 75.0;

/// Estimate body fat percentage for the given user, weight (kg) and
/// impedance (ohms).
pub fn fat_percentage(profile: &UserProfile, weight_kg: f64, impedance: u16) -> f64 {
    let lbm = lean_body_mass(profile, weight_kg, impedance);

    let baseline = match profile.sex {
        Sex::Female if profile.age <= 49 => 9.25,
        Sex::Female => 4.95,
        Sex::Male => 0.8,
    };

    // First match wins
    let coefficient = if profile.sex == Sex::Male && weight_kg < 61.0 {
        0.98
    } else if profile.sex == Sex::Female && weight_kg > 60.0 {
        if profile.height_cm > 160.0 { 0.96 * 1.03 } else { 0.96 }
    } else if profile.sex == Sex::Female && weight_kg < 50.0 {
        if profile.height_cm > 160.0 { 1.02 * 1.03 } else { 1.02 }
    } else {
        1.0
    };

    let fat = (1.0 - ((lbm - baseline) * coefficient) / weight_kg) * 100.0;

    if fat > FAT_PCT_CEILING {
        FAT_PCT_SATURATED
    } else {
        fat
    }
}

/// Lean body mass coefficient, the impedance-bearing intermediate of the
/// fat percentage formula.
fn lean_body_mass(profile: &UserProfile, weight_kg: f64, impedance: u16) -> f64 {
    (profile.height_cm / 100.0).powi(2) * 9.058 + weight_kg * 0.32 + 12.226
        - f64::from(impedance) * 0.0068
        - f64::from(profile.age) * 0.0542
}

#[cfg(test)]
fn profile(sex: Sex, age: u32, height_cm: f64) -> UserProfile {
    UserProfile { sex, age, height_cm }
}

#[test]
fn test_fat_percentage_male() {
    // LBM = 3.24*9.058 + 35.30*0.32 + 12.226 - 468*0.0068 - 20*0.0542 = 48.60352
    // coefficient 0.98 (male, < 61kg), baseline 0.8
    let fat = fat_percentage(&profile(Sex::Male, 20, 180.0), 35.30, 468);
    assert!((fat - -32.7123).abs() < 1e-3, "got {fat}");
}

#[test]
fn test_fat_percentage_deterministic() {
    let p = profile(Sex::Female, 35, 165.0);
    let a = fat_percentage(&p, 58.2, 512);
    let b = fat_percentage(&p, 58.2, 512);
    assert_eq!(a, b);
}

#[test]
fn test_fat_percentage_saturates_above_ceiling() {
    // LBM = 2.25*9.058 + 45*0.32 + 12.226 - 3000*0.0068 - 30*0.0542 = 24.9805
    // baseline 9.25, coefficient 1.02 -> raw 64.34%, over the 63 ceiling
    let fat = fat_percentage(&profile(Sex::Female, 30, 150.0), 45.0, 3000);
    assert_eq!(fat, 75.0);
}

#[test]
fn test_no_lower_clamp() {
    let fat = fat_percentage(&profile(Sex::Male, 20, 180.0), 35.30, 468);
    assert!(fat < 0.0);
}

#[test]
fn test_baseline_switches_at_female_age_49() {
    let younger = fat_percentage(&profile(Sex::Female, 49, 155.0), 55.0, 500);
    let older = fat_percentage(&profile(Sex::Female, 50, 155.0), 55.0, 500);
    // Same inputs otherwise; the baseline drops from 9.25 to 4.95, so the
    // estimate for the older profile must be strictly lower.
    assert!(older < younger);
}

#[test]
fn test_tall_female_coefficient_bump() {
    let short = fat_percentage(&profile(Sex::Female, 30, 160.0), 65.0, 500);
    let tall = fat_percentage(&profile(Sex::Female, 30, 161.0), 65.0, 500);
    assert_ne!(short, tall);
}
