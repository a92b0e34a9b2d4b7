/// Derived state computed from stored readings.
///
/// Submodules:
/// - `rainfall` — trailing 24h/72h rainfall sums written onto the latest reading
/// - `risk`     — rule-based flood risk scoring and assessment persistence

pub mod rainfall;
pub mod risk;
