//! In-memory EDF encoder
//!
//! Produces the exact byte layout [`EdfHeader::parse`](crate::EdfHeader::parse)
//! and [`EdfReader`](crate::EdfReader) read: a 256 byte static header, one
//! 256 byte block per signal stored field by field, then data records of
//! interleaved little-endian `i16` samples.

use chrono::NaiveDateTime;

use crate::error::{EdfError, Result};
use crate::utils::write_field;
use crate::{MAX_SIGNALS, SAMPLE_SIZE, SIGNAL_HEADER_SIZE, STATIC_HEADER_SIZE};

/// One signal to be written
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub label: String,
    pub transducer_type: String,
    pub physical_dimension: String,
    pub physical_minimum: f64,
    pub physical_maximum: f64,
    pub digital_minimum: i32,
    pub digital_maximum: i32,
    pub pre_filtering: String,
    pub samples_per_record: usize,
}

impl SignalSpec {
    /// A signal whose physical range equals the full `i16` range, so that
    /// physical values equal the stored integers
    pub fn new(label: impl Into<String>, samples_per_record: usize) -> Self {
        SignalSpec {
            label: label.into(),
            transducer_type: String::new(),
            physical_dimension: "uV".to_string(),
            physical_minimum: i16::MIN as f64,
            physical_maximum: i16::MAX as f64,
            digital_minimum: i16::MIN as i32,
            digital_maximum: i16::MAX as i32,
            pre_filtering: String::new(),
            samples_per_record,
        }
    }

    pub fn with_physical(mut self, minimum: f64, maximum: f64) -> Self {
        self.physical_minimum = minimum;
        self.physical_maximum = maximum;
        self
    }

    pub fn with_digital(mut self, minimum: i32, maximum: i32) -> Self {
        self.digital_minimum = minimum;
        self.digital_maximum = maximum;
        self
    }

    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.physical_dimension = dimension.into();
        self
    }

    pub fn with_transducer(mut self, transducer: impl Into<String>) -> Self {
        self.transducer_type = transducer.into();
        self
    }

    pub fn with_prefilter(mut self, prefilter: impl Into<String>) -> Self {
        self.pre_filtering = prefilter.into();
        self
    }

    /// 物理值转数字值，超出范围时截断
    pub fn to_digital(&self, physical: f64) -> i16 {
        let scale = (self.physical_maximum - self.physical_minimum + 1.0)
            / (self.digital_maximum - self.digital_minimum + 1) as f64;
        let digital = (physical - self.physical_minimum) / scale + self.digital_minimum as f64;
        digital
            .round()
            .min(self.digital_maximum as f64)
            .max(self.digital_minimum as f64)
            .clamp(i16::MIN as f64, i16::MAX as f64) as i16
    }
}

/// Builds a complete EDF file in memory
///
/// ```rust
/// use edfstream::{EdfBuilder, EdfHeader, SignalSpec};
///
/// let bytes = EdfBuilder::new()
///     .patient("X F 01-JAN-1990 Anon")
///     .record_duration(0.5)
///     .signal(SignalSpec::new("EEG C3-A2", 128).with_physical(-500.0, 500.0).with_digital(-2048, 2047))
///     .records_with(4, |_, i| (i % 2048) as i16)
///     .build()?;
///
/// let header = EdfHeader::parse(&bytes)?;
/// assert_eq!(header.channels[0].standard_label, "C3");
/// assert_eq!(header.duration_ms(), 2000.0);
/// assert_eq!(bytes.len(), 512 + 4 * 128 * 2);
/// # Ok::<(), edfstream::EdfError>(())
/// ```
#[derive(Debug, Clone)]
pub struct EdfBuilder {
    patient: String,
    recording: String,
    start_date: String,
    start_time: String,
    reserved: String,
    record_duration: f64,
    declared_records: Option<i64>,
    signals: Vec<SignalSpec>,
    /// 每个记录按信号分组的数字样本
    records: Vec<Vec<Vec<i16>>>,
}

impl Default for EdfBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EdfBuilder {
    pub fn new() -> Self {
        EdfBuilder {
            patient: "X X X X".to_string(),
            recording: "Startdate X X X X".to_string(),
            start_date: "01.01.20".to_string(),
            start_time: "00.00.00".to_string(),
            reserved: String::new(),
            record_duration: 1.0,
            declared_records: None,
            signals: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn patient(mut self, patient: impl Into<String>) -> Self {
        self.patient = patient.into();
        self
    }

    pub fn recording(mut self, recording: impl Into<String>) -> Self {
        self.recording = recording.into();
        self
    }

    /// 写入 "dd.mm.yy" / "hh.mm.ss"
    pub fn start(mut self, start: NaiveDateTime) -> Self {
        self.start_date = start.format("%d.%m.%y").to_string();
        self.start_time = start.format("%H.%M.%S").to_string();
        self
    }

    /// Raw start fields, written as given
    pub fn start_fields(mut self, date: impl Into<String>, time: impl Into<String>) -> Self {
        self.start_date = date.into();
        self.start_time = time.into();
        self
    }

    /// `EDF+C`, `EDF+D` or empty for plain EDF
    pub fn reserved(mut self, reserved: impl Into<String>) -> Self {
        self.reserved = reserved.into();
        self
    }

    /// Seconds per data record
    pub fn record_duration(mut self, seconds: f64) -> Self {
        self.record_duration = seconds;
        self
    }

    /// Overrides the record count written to the header
    pub fn declared_records(mut self, records: i64) -> Self {
        self.declared_records = Some(records);
        self
    }

    pub fn signal(mut self, signal: SignalSpec) -> Self {
        self.signals.push(signal);
        self
    }

    /// Appends one data record; `samples[i]` belongs to signal `i`
    pub fn record(mut self, samples: Vec<Vec<i16>>) -> Self {
        self.records.push(samples);
        self
    }

    /// Appends one data record of physical values, converted per signal
    pub fn physical_record(self, samples: &[Vec<f64>]) -> Self {
        let digital = samples
            .iter()
            .zip(&self.signals)
            .map(|(values, signal)| values.iter().map(|v| signal.to_digital(*v)).collect())
            .collect();
        self.record(digital)
    }

    /// Appends `count` records filled by `sample(signal, n)`, where `n` counts
    /// the samples of that signal from the start of the file
    pub fn records_with<F>(mut self, count: usize, mut sample: F) -> Self
    where
        F: FnMut(usize, usize) -> i16,
    {
        let first = self.records.len();
        for record in first..first + count {
            let samples = self
                .signals
                .iter()
                .enumerate()
                .map(|(signal, spec)| {
                    let base = record * spec.samples_per_record;
                    (base..base + spec.samples_per_record).map(|n| sample(signal, n)).collect()
                })
                .collect();
            self.records.push(samples);
        }
        self
    }

    pub fn header_size(&self) -> usize {
        STATIC_HEADER_SIZE + self.signals.len() * SIGNAL_HEADER_SIZE
    }

    /// Encodes header and records
    pub fn build(&self) -> Result<Vec<u8>> {
        if self.signals.is_empty() || self.signals.len() > MAX_SIGNALS {
            return Err(EdfError::format(format!("Cannot write {} signals", self.signals.len())));
        }
        if let Some(signal) = self.signals.iter().find(|s| s.samples_per_record == 0) {
            return Err(EdfError::format(format!("Signal {} has no samples per record", signal.label)));
        }

        let record_size: usize = self.signals.iter().map(|s| s.samples_per_record).sum();
        let mut out = Vec::with_capacity(self.header_size() + self.records.len() * record_size * SAMPLE_SIZE);

        self.write_header(&mut out);
        self.write_signal_headers(&mut out);

        for (index, record) in self.records.iter().enumerate() {
            if record.len() != self.signals.len() {
                return Err(EdfError::format(format!(
                    "Record {} has {} signals, expected {}",
                    index,
                    record.len(),
                    self.signals.len()
                )));
            }
            for (samples, signal) in record.iter().zip(&self.signals) {
                if samples.len() != signal.samples_per_record {
                    return Err(EdfError::format(format!(
                        "Record {} has {} samples for {}, expected {}",
                        index,
                        samples.len(),
                        signal.label,
                        signal.samples_per_record
                    )));
                }
                for sample in samples {
                    out.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }

        Ok(out)
    }

    fn write_header(&self, out: &mut Vec<u8>) {
        // 主头部 (256字节)
        let mut header = [b' '; STATIC_HEADER_SIZE];
        let records = self.declared_records.unwrap_or(self.records.len() as i64);

        write_field(&mut header[0..8], "0");
        write_field(&mut header[8..88], &self.patient);
        write_field(&mut header[88..168], &self.recording);
        write_field(&mut header[168..176], &self.start_date);
        write_field(&mut header[176..184], &self.start_time);
        write_field(&mut header[184..192], &self.header_size().to_string());
        write_field(&mut header[192..236], &self.reserved);
        write_field(&mut header[236..244], &records.to_string());
        write_field(&mut header[244..252], &format_number(self.record_duration));
        write_field(&mut header[252..256], &self.signals.len().to_string());

        out.extend_from_slice(&header);
    }

    /// 按字段写入，每个字段所有信号一起写
    fn write_signal_headers(&self, out: &mut Vec<u8>) {
        let mut put = |width: usize, value: &str| {
            let mut field = vec![b' '; width];
            write_field(&mut field, value);
            out.extend_from_slice(&field);
        };

        for s in &self.signals {
            put(16, &s.label);
        }
        for s in &self.signals {
            put(80, &s.transducer_type);
        }
        for s in &self.signals {
            put(8, &s.physical_dimension);
        }
        for s in &self.signals {
            put(8, &format_number(s.physical_minimum));
        }
        for s in &self.signals {
            put(8, &format_number(s.physical_maximum));
        }
        for s in &self.signals {
            put(8, &s.digital_minimum.to_string());
        }
        for s in &self.signals {
            put(8, &s.digital_maximum.to_string());
        }
        for s in &self.signals {
            put(80, &s.pre_filtering);
        }
        for s in &self.signals {
            put(8, &s.samples_per_record.to_string());
        }
        // 保留字段 (32字节 × 信号数)
        for _ in &self.signals {
            put(32, "");
        }
    }
}

/// 8字节数值字段：整数不带小数点，小数截断到8个字符
fn format_number(value: f64) -> String {
    let mut text = format!("{}", value);
    if text.len() > 8 {
        text.truncate(8);
        if text.ends_with('.') {
            text.pop();
        }
    }
    text
}
