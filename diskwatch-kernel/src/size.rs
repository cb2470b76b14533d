//! Conversions de tailles pour l'affichage des indicateurs (unités décimales).

const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];
const STEP: f64 = 1000.0;

/// Gigaoctets décimaux → octets
pub fn gb_to_bytes(gb: f64) -> u64 {
    if !gb.is_finite() || gb <= 0.0 {
        return 0;
    }
    (gb * 1e9).round() as u64
}

/// Taille lisible : `512 B`, `2.0 GB`, `1.5 TB`
pub fn human_size(bytes: u64) -> String {
    if bytes < 1000 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= STEP && unit < UNITS.len() - 1 {
        value /= STEP;
        unit += 1;
    }
    // 999.96 s'afficherait "1000.0"
    if value >= 999.95 && unit < UNITS.len() - 1 {
        value /= STEP;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
