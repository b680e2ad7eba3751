// Internal utilities for documentation tests
// Fixture recordings shared by doctests and integration tests

use crate::builder::{EdfBuilder, SignalSpec};
use crate::resource::LocalResource;
use crate::Result;

/// Labels used by [`sine_recording`], in channel order
pub const FIXTURE_LABELS: [&str; 4] = ["EEG Fp1-REF", "EEG Fp2-REF", "EEG C3-REF", "EEG O2-REF"];

/// `signals` channels of 10 Hz sine at 256 samples/s, `records` one-second records
pub fn sine_recording(signals: usize, records: usize) -> Result<Vec<u8>> {
    let mut builder = EdfBuilder::new()
        .patient("DOC001 M 01-JAN-1990 Test_Patient")
        .reserved("EDF+C");

    for i in 0..signals {
        let label = FIXTURE_LABELS.get(i).map(|l| l.to_string()).unwrap_or_else(|| format!("CH{}", i + 1));
        builder = builder.signal(
            SignalSpec::new(label, 256)
                .with_physical(-200.0, 200.0)
                .with_digital(-32768, 32767)
                .with_prefilter("HP:0.1Hz LP:70Hz"),
        );
    }

    builder
        .records_with(records, |signal, n| {
            let t = n as f64 / 256.0;
            let phase = signal as f64 * std::f64::consts::FRAC_PI_4;
            (30000.0 * (2.0 * std::f64::consts::PI * 10.0 * t + phase).sin()) as i16
        })
        .build()
}

/// [`sine_recording`] wrapped in an in-memory resource
pub fn sine_resource(signals: usize, records: usize) -> Result<LocalResource> {
    Ok(LocalResource::from_bytes("sine.edf", sine_recording(signals, records)?))
}
