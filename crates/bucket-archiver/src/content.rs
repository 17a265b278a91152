//! Synthetic CSV payload generation.
//!
//! Payload content is pseudo-random but structurally deterministic: file `k`
//! is named `k.csv` and holds `rows_per_file` rows, where row `i` is the
//! file's random seed scaled by `i + 1`. Downstream correctness never depends
//! on the numeric values, only on the bytes surviving the round trip.

use bytes::Bytes;

/// Content type used for every generated payload.
pub const CONTENT_TYPE_CSV: &str = "text/csv";

/// A named, immutable byte payload destined for the object store.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Object key (`1.csv`, `2.csv`, ...).
    pub name: String,
    /// CSV bytes.
    pub data: Bytes,
}

/// Generate `count` payloads of `rows_per_file` CSV rows each.
///
/// Pure function of its inputs apart from the per-file random seed; no
/// failure modes.
pub fn generate_payloads(count: usize, rows_per_file: usize) -> Vec<Payload> {
    (1..=count)
        .map(|i| Payload {
            name: format!("{}.csv", i),
            data: Bytes::from(generate_csv_rows(rows_per_file)),
        })
        .collect()
}

/// Render `rows` CSV rows from a single random seed.
fn generate_csv_rows(rows: usize) -> String {
    let seed: f64 = rand::random();
    (0..rows)
        .map(|i| (seed * (i as f64 + 1.0)).to_string())
        .collect::<Vec<_>>()
        .join(",\n")
}
