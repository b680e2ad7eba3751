use chrono::NaiveDateTime;
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};

use crate::{SAMPLE_SIZE, SIGNAL_HEADER_SIZE, STATIC_HEADER_SIZE};

/// One signal stream of an EDF file together with its record geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub index: usize,
    pub label: String,
    pub standard_label: String,
    pub standard_index: usize,     // 0 表示未知电极
    pub transducer_type: String,
    pub physical_dimension: String,
    pub physical_minimum: f64,
    pub physical_maximum: f64,
    pub digital_minimum: i32,
    pub digital_maximum: i32,
    pub pre_filtering: String,
    pub number_of_samples: usize,  // 每个数据记录中的样本数
    pub record_index: usize,       // 记录内的样本偏移
}

impl Channel {
    /// 物理值/数字值比例
    pub fn scale(&self) -> f64 {
        (self.physical_maximum - self.physical_minimum + 1.0)
            / (self.digital_maximum - self.digital_minimum + 1) as f64
    }

    /// Converts a raw 16-bit sample into the channel's physical unit
    ///
    /// ```rust
    /// # use edfstream::Channel;
    /// let channel = Channel {
    ///     index: 0,
    ///     label: "EEG Fp1".to_string(),
    ///     standard_label: "Fp1".to_string(),
    ///     standard_index: 1,
    ///     transducer_type: String::new(),
    ///     physical_dimension: "uV".to_string(),
    ///     physical_minimum: -100.0,
    ///     physical_maximum: 99.0,
    ///     digital_minimum: -100,
    ///     digital_maximum: 99,
    ///     pre_filtering: String::new(),
    ///     number_of_samples: 256,
    ///     record_index: 0,
    /// };
    /// assert_eq!(channel.to_physical(-100), -100.0);
    /// assert_eq!(channel.to_physical(42), 42.0);
    /// ```
    pub fn to_physical(&self, raw: i16) -> f64 {
        (raw as f64 - self.digital_minimum as f64) * self.scale() + self.physical_minimum
    }

    pub fn samples_per_second(&self, record_duration_time: f64) -> f64 {
        self.number_of_samples as f64 / record_duration_time
    }

    /// Time between two consecutive samples in milliseconds
    pub fn sample_interval_ms(&self, record_duration_time: f64) -> f64 {
        1000.0 * record_duration_time / self.number_of_samples as f64
    }
}

/// Parsed EDF header, immutable once read
#[derive(Debug, Clone, PartialEq)]
pub struct EdfHeader {
    pub version: i32,
    pub patient_identification: String,
    pub record_identification: String,
    pub start_date: String,           // 原始 "dd.mm.yy"
    pub start_time: String,           // 原始 "hh.mm.ss"
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub record_header_byte_size: usize,
    pub reserved: String,             // "EDF+C" / "EDF+D" / 空
    pub number_of_data_records: i64,
    pub record_duration_time: f64,    // 秒
    pub number_of_signals: usize,
    pub channels: Vec<Channel>,
    pub record_size: usize,           // 每个记录的样本总数
}

impl EdfHeader {
    /// Size of static plus dynamic header in bytes, as laid out on disk
    pub fn header_size(&self) -> u64 {
        (STATIC_HEADER_SIZE + self.number_of_signals * SIGNAL_HEADER_SIZE) as u64
    }

    /// Bytes of one data record on disk
    pub fn record_byte_size(&self) -> usize {
        self.record_size * SAMPLE_SIZE
    }

    /// `record_size / 2`, the figure EDF info panels list as the record sample size
    pub fn record_sample_size(&self) -> f64 {
        self.record_size as f64 / SAMPLE_SIZE as f64
    }

    pub fn record_duration_ms(&self) -> f64 {
        self.record_duration_time * 1000.0
    }

    /// Length of the recording in milliseconds
    pub fn duration_ms(&self) -> f64 {
        self.number_of_data_records as f64 * self.record_duration_ms()
    }

    /// Recording start as milliseconds since the Unix epoch
    pub fn start_ms(&self) -> f64 {
        self.start.and_utc().timestamp_millis() as f64
    }

    pub fn end_ms(&self) -> f64 {
        self.start_ms() + self.duration_ms()
    }

    pub fn channel(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }
}

/// One render-ready sample: `(time, value, [min, max] | [])`
///
/// `range` is `None` when the point was not produced by decimation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub time: f64,
    pub value: f64,
    pub range: Option<(f64, f64)>,
}

impl DataPoint {
    pub fn raw(time: f64, value: f64) -> Self {
        DataPoint { time, value, range: None }
    }

    pub fn bucket(time: f64, average: f64, min: f64, max: f64) -> Self {
        DataPoint { time, value: average, range: Some((min, max)) }
    }

    pub fn is_decimated(&self) -> bool {
        self.range.is_some()
    }
}

impl Serialize for DataPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(3)?;
        tuple.serialize_element(&self.time)?;
        tuple.serialize_element(&self.value)?;
        match self.range {
            Some((min, max)) => tuple.serialize_element(&[min, max])?,
            None => tuple.serialize_element::<[f64; 0]>(&[])?,
        }
        tuple.end()
    }
}

/// Options of [`EdfReader::get_data`](crate::EdfReader::get_data)
///
/// `from` and `till` are milliseconds relative to the recording start,
/// `frequency` is the wanted number of points per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DataRequest {
    pub from: f64,
    pub till: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
}

impl DataRequest {
    pub fn new(from: f64, till: f64) -> Self {
        DataRequest { from, till, frequency: None }
    }

    pub fn with_frequency(mut self, frequency: f64) -> Self {
        self.frequency = Some(frequency);
        self
    }
}

/// Absolute time span `[left, right]` in milliseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeRange {
    pub left: f64,
    pub right: f64,
}

impl TimeRange {
    pub fn new(left: f64, right: f64) -> Self {
        TimeRange { left, right }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn is_empty(&self) -> bool {
        self.right <= self.left
    }

    pub fn covers(&self, other: &TimeRange) -> bool {
        self.left <= other.left && self.right >= other.right
    }
}

/// Time span held in memory by a window buffer
pub type BufferRange = TimeRange;

/// Time span a consumer wants visible
pub type ViewWindow = TimeRange;
