/// One decoded history measurement from the scale
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    /// When the measurement was taken, device-local clock,
    /// formatted as `YYYY-MM-DD HH:MM:SS`
    pub datetime: String,
    /// The measured weight in kg, rounded to 2 decimal places
    pub weight_kg: f64,
    /// The bio-impedance reading in ohms
    pub impedance: u16,
    /// The derived body fat percentage
    pub fat_percentage: f64,
}
