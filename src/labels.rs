//! Standardized electrode labels
//!
//! Recorders write the same electrode in many ways (`EEG Fp1-REF`, `FP1-A2`,
//! `Fp1`). Channels carry both the raw label and the 10-20 name it maps to,
//! plus a stable number for that name (0 when the label is not a known
//! electrode).

/// 10-20 system electrodes, numbered from 1 in this order
const STANDARD_LABELS: [&str; 21] = [
    "Fp1", "Fp2", "F7", "F3", "Fz", "F4", "F8", "T3", "C3", "Cz", "C4", "T4", "T5", "P3", "Pz",
    "P4", "T6", "O1", "O2", "A1", "A2",
];

/// Newer 10-10 names for the same positions
const ALIASES: [(&str, &str); 4] = [("T7", "T3"), ("T8", "T4"), ("P7", "T5"), ("P8", "T6")];

const PREFIXES: [&str; 2] = ["EEG ", "EEG-"];

const REFERENCE_SUFFIXES: [&str; 8] = ["-REF", "-LE", "-AVG", "-A1", "-A2", "-M1", "-M2", "-REF1"];

/// Returns `(standard_label, standard_index)` for a raw channel label
///
/// ```rust
/// use edfstream::labels::standardize;
///
/// assert_eq!(standardize("EEG Fp1-REF"), ("Fp1".to_string(), 1));
/// assert_eq!(standardize("T7"), ("T3".to_string(), 8));
/// assert_eq!(standardize("ECG"), ("ECG".to_string(), 0));
/// ```
pub fn standardize(label: &str) -> (String, usize) {
    let trimmed = label.trim();
    let mut name = trimmed;

    for prefix in PREFIXES {
        if let Some(rest) = name
            .get(..prefix.len())
            .filter(|head| head.eq_ignore_ascii_case(prefix))
            .and_then(|_| name.get(prefix.len()..))
        {
            name = rest.trim_start();
            break;
        }
    }

    for suffix in REFERENCE_SUFFIXES {
        let upper = name.to_ascii_uppercase();
        if upper.ends_with(suffix) && name.len() > suffix.len() {
            name = &name[..name.len() - suffix.len()];
            break;
        }
    }

    let canonical = ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map(|(_, target)| *target)
        .unwrap_or(name);

    match STANDARD_LABELS
        .iter()
        .position(|standard| standard.eq_ignore_ascii_case(canonical))
    {
        Some(position) => (STANDARD_LABELS[position].to_string(), position + 1),
        None => (trimmed.to_string(), 0),
    }
}
