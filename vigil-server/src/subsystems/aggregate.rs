//! Emotion aggregation — per-key arithmetic means over telemetry entries
//!
//! Pure reduction, no I/O. Each emotion key is averaged over the entries
//! that actually report a numeric value for it, so a key missing from some
//! entries keeps its own denominator instead of being diluted by zeros.

use std::collections::BTreeMap;

use vigil_core::models::EmotionSample;

/// Average every emotion key present in `entries`.
///
/// Keys absent from all entries are omitted, never reported as zero.
/// Non-numeric values under a key are skipped the same as absent keys.
pub fn average_emotions(entries: &[EmotionSample]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();

    for entry in entries {
        let Some(map) = entry.emotions.as_object() else {
            continue;
        };
        for (key, value) in map {
            if let Some(score) = value.as_f64() {
                let slot = sums.entry(key.clone()).or_insert((0.0, 0));
                slot.0 += score;
                slot.1 += 1;
            }
        }
    }

    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect()
}

/// Render an averaged emotion map as the JSONB value stored on reports.
pub fn emotions_to_json(emotions: &BTreeMap<String, f64>) -> serde_json::Value {
    serde_json::Value::Object(
        emotions
            .iter()
            .map(|(key, value)| (key.clone(), serde_json::Value::from(*value)))
            .collect(),
    )
}

// ============================================================================
// TESTS
// ============================================================================
