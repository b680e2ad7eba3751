use std::time::Instant;

use log::{debug, trace, warn};
use tokio::sync::OnceCell;

use crate::decimate::{decimate, decimation_factor};
use crate::error::{EdfError, Result};
use crate::labels::standardize;
use crate::resource::{ByteRange, ByteRangeResource, Resource};
use crate::types::{Channel, DataPoint, DataRequest, EdfHeader, TimeRange};
use crate::utils::{ascii_field, atoi_nonlocalized, parse_float_field, parse_int_field, parse_start};
use crate::{MAX_SIGNALS, SAMPLE_SIZE, SIGNAL_HEADER_SIZE, STATIC_HEADER_SIZE};

/// EDF reader over any [`ByteRangeResource`]
///
/// The header is fetched once, on the first call that needs it. Sample data
/// is fetched per request as one contiguous run of data records, so a reader
/// over a remote resource never downloads more than the asked time span
/// (rounded out to whole records).
///
/// # Examples
///
/// ```rust
/// use edfstream::{DataRequest, EdfBuilder, EdfReader, SignalSpec};
/// use edfstream::resource::LocalResource;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> edfstream::Result<()> {
/// let bytes = EdfBuilder::new()
///     .signal(SignalSpec::new("EEG Fp1-REF", 10))
///     .signal(SignalSpec::new("EEG Cz-REF", 10))
///     .records_with(10, |_, i| (i % 50) as i16)
///     .build()?;
///
/// let reader = EdfReader::new(LocalResource::from_bytes("demo.edf", bytes));
/// let header = reader.read_header().await?;
/// assert_eq!(header.number_of_signals, 2);
/// assert_eq!(header.channels[1].standard_label, "Cz");
///
/// // 1 Hz 视图：每通道 1 个原始点 + 9 个聚合点
/// let data = reader.get_data(DataRequest::new(0.0, 10_000.0).with_frequency(1.0)).await?;
/// assert_eq!(data.len(), 2);
/// assert_eq!(data[0].len(), 10);
/// # Ok(())
/// # }
/// ```
pub struct EdfReader<R = Resource> {
    resource: R,
    header: OnceCell<EdfHeader>,
}

impl<R: ByteRangeResource> EdfReader<R> {
    pub fn new(resource: R) -> Self {
        EdfReader {
            resource,
            header: OnceCell::new(),
        }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    /// The header, if it has been read already
    pub fn header(&self) -> Option<&EdfHeader> {
        self.header.get()
    }

    /// Reads and parses the header; later calls return the cached value
    pub async fn read_header(&self) -> Result<&EdfHeader> {
        self.header.get_or_try_init(|| self.fetch_header()).await
    }

    async fn fetch_header(&self) -> Result<EdfHeader> {
        let started = Instant::now();

        // 静态头部（256字节）
        let head = self.resource.read_bytes(ByteRange::new(0, STATIC_HEADER_SIZE as u64)).await?;
        if head.len() < STATIC_HEADER_SIZE {
            return Err(EdfError::format(format!(
                "{} is too short for an EDF header: {} bytes",
                self.resource.name(),
                head.len()
            )));
        }

        // 动态头部：每个信号256字节
        let signals = parse_signal_count(&head)?;
        let header_size = STATIC_HEADER_SIZE + signals * SIGNAL_HEADER_SIZE;
        let dynamic = self
            .resource
            .read_bytes(ByteRange::new(STATIC_HEADER_SIZE as u64, header_size as u64))
            .await?;

        let mut bytes = Vec::with_capacity(header_size);
        bytes.extend_from_slice(&head[..STATIC_HEADER_SIZE]);
        bytes.extend_from_slice(&dynamic);

        let header = EdfHeader::parse(&bytes)?;
        debug!(
            "read header of {}: {} signals, {} records of {} s in {:?}",
            self.resource.name(),
            header.number_of_signals,
            header.number_of_data_records,
            header.record_duration_time,
            started.elapsed()
        );
        Ok(header)
    }

    /// Samples of every channel between `from` and `till` ms after the recording start
    ///
    /// The interval is clamped to the recording and widened to whole data
    /// records (see [`EdfHeader::block_span`]). With a `frequency`, each
    /// channel is reduced to roughly that many points per second.
    pub async fn get_data(&self, request: DataRequest) -> Result<Vec<Vec<DataPoint>>> {
        if !(request.till > request.from) {
            return Err(EdfError::BadInterval { from: request.from, till: request.till });
        }

        let header = self.read_header().await?;
        let started = Instant::now();

        let (from, till) = header.clamp_interval(request.from, request.till)?;
        let (from_block, till_block) = header.blocks(from, till);
        let range = header.byte_range(from_block, till_block);

        let bytes = self.resource.read_bytes(range).await?;
        let fetched = started.elapsed();

        let wanted = till_block - from_block;
        let records = (bytes.len() / header.record_byte_size()).min(wanted);
        if records < wanted {
            warn!(
                "{} returned {} of {} records for [{}, {}) ms",
                self.resource.name(),
                records,
                wanted,
                from,
                till
            );
        }

        let block_start = header.start_ms() + from_block as f64 * header.record_duration_ms();
        let data: Vec<Vec<DataPoint>> = header
            .channels
            .iter()
            .map(|channel| {
                let interval = channel.sample_interval_ms(header.record_duration_time);
                let factor = decimation_factor(
                    channel.samples_per_second(header.record_duration_time),
                    request.frequency,
                );
                let samples = (0..records * channel.number_of_samples).map(|index| {
                    let record = index / channel.number_of_samples;
                    let offset = (record * header.record_size
                        + channel.record_index
                        + index % channel.number_of_samples)
                        * SAMPLE_SIZE;
                    let raw = i16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
                    (block_start + index as f64 * interval, channel.to_physical(raw))
                });
                decimate(samples, factor)
            })
            .collect();

        debug!(
            "get_data [{}, {}) ms: {} records, fetched in {:?}, decoded in {:?}",
            from,
            till,
            records,
            fetched,
            started.elapsed() - fetched
        );
        Ok(data)
    }

    /// Relative span `get_data` covers for `[from, till)`, after clamping and
    /// rounding out to whole data records
    pub async fn block_span(&self, from: f64, till: f64) -> Result<TimeRange> {
        self.read_header().await?.block_span(from, till)
    }
}

fn parse_signal_count(head: &[u8]) -> Result<usize> {
    let signals = parse_int_field("number_of_signals", &ascii_field(head, 252, 4))?;
    if signals < 1 || signals as usize > MAX_SIGNALS {
        return Err(EdfError::format(format!("Invalid number of signals: {}", signals)));
    }
    Ok(signals as usize)
}

/// Field blocks of the dynamic header: (offset of the block per signal, width)
const LABEL: (usize, usize) = (0, 16);
const TRANSDUCER: (usize, usize) = (16, 80);
const DIMENSION: (usize, usize) = (96, 8);
const PHYSICAL_MIN: (usize, usize) = (104, 8);
const PHYSICAL_MAX: (usize, usize) = (112, 8);
const DIGITAL_MIN: (usize, usize) = (120, 8);
const DIGITAL_MAX: (usize, usize) = (128, 8);
const PREFILTER: (usize, usize) = (136, 80);
const SAMPLES: (usize, usize) = (216, 8);

impl EdfHeader {
    /// Parses a complete header (static part plus one block per signal)
    ///
    /// Bytes past the header are ignored, so the start of a whole file works too.
    pub fn parse(bytes: &[u8]) -> Result<EdfHeader> {
        if bytes.len() < STATIC_HEADER_SIZE {
            return Err(EdfError::format(format!(
                "Header needs {} bytes, got {}",
                STATIC_HEADER_SIZE,
                bytes.len()
            )));
        }

        let number_of_signals = parse_signal_count(bytes)?;
        let header_size = STATIC_HEADER_SIZE + number_of_signals * SIGNAL_HEADER_SIZE;
        if bytes.len() < header_size {
            return Err(EdfError::format(format!(
                "Header of {} signals needs {} bytes, got {}",
                number_of_signals,
                header_size,
                bytes.len()
            )));
        }

        let start_date = ascii_field(bytes, 168, 8);
        let start_time = ascii_field(bytes, 176, 8);
        let start = parse_start(&start_date, &start_time)?;

        let record_header_byte_size = atoi_nonlocalized(&ascii_field(bytes, 184, 8));
        if record_header_byte_size as usize != header_size {
            warn!(
                "header declares {} bytes, layout of {} signals needs {}",
                record_header_byte_size, number_of_signals, header_size
            );
        }

        let number_of_data_records =
            parse_int_field("number_of_data_records", &ascii_field(bytes, 236, 8))?;
        if number_of_data_records < 0 {
            return Err(EdfError::format(format!(
                "Unknown number of data records: {}",
                number_of_data_records
            )));
        }

        let record_duration_time =
            parse_float_field("record_duration_time", &ascii_field(bytes, 244, 8))?;
        if record_duration_time <= 0.0 {
            return Err(EdfError::format(format!(
                "Record duration must be positive: {}",
                record_duration_time
            )));
        }

        let channels = parse_channels(bytes, number_of_signals)?;
        let record_size = channels.iter().map(|c| c.number_of_samples).sum();

        let duration_ms = number_of_data_records as f64 * record_duration_time * 1000.0;
        let end = start + chrono::Duration::milliseconds(duration_ms.round() as i64);

        let header = EdfHeader {
            version: atoi_nonlocalized(&ascii_field(bytes, 0, 8)),
            patient_identification: ascii_field(bytes, 8, 80),
            record_identification: ascii_field(bytes, 88, 80),
            start_date,
            start_time,
            start,
            end,
            record_header_byte_size: record_header_byte_size.max(0) as usize,
            reserved: ascii_field(bytes, 192, 44),
            number_of_data_records,
            record_duration_time,
            number_of_signals,
            channels,
            record_size,
        };
        trace!("parsed header {:?}", header);
        Ok(header)
    }

    /// Clamps a relative interval into the recording
    pub fn clamp_interval(&self, from: f64, till: f64) -> Result<(f64, f64)> {
        let length = self.duration_ms();
        let from = from.max(0.0).min(length);
        let till = till.max(0.0).min(length);
        if !(till > from) {
            return Err(EdfError::BadInterval { from, till });
        }
        Ok((from, till))
    }

    /// Data records `[from_block, till_block)` covering a clamped relative interval
    pub fn blocks(&self, from: f64, till: f64) -> (usize, usize) {
        let duration = self.record_duration_ms();
        let records = self.number_of_data_records.max(0) as usize;
        let from_block = ((from / duration).floor().max(0.0) as usize).min(records);
        let till_block = ((till / duration).ceil().max(0.0) as usize).min(records);
        (from_block, till_block.max(from_block))
    }

    /// File bytes holding records `[from_block, till_block)`
    pub fn byte_range(&self, from_block: usize, till_block: usize) -> ByteRange {
        let header_size = self.header_size();
        let record_bytes = self.record_byte_size() as u64;
        ByteRange::new(
            header_size + record_bytes * from_block as u64,
            header_size + record_bytes * till_block as u64,
        )
    }

    /// Relative, record-aligned span that a read of `[from, till)` covers
    pub fn block_span(&self, from: f64, till: f64) -> Result<TimeRange> {
        let (from, till) = self.clamp_interval(from, till)?;
        let (from_block, till_block) = self.blocks(from, till);
        let duration = self.record_duration_ms();
        Ok(TimeRange::new(from_block as f64 * duration, till_block as f64 * duration))
    }
}

/// 解析信号参数：9个字段块，每块依次存放所有信号的同一字段
fn parse_channels(bytes: &[u8], count: usize) -> Result<Vec<Channel>> {
    let field = |(block, width): (usize, usize), i: usize| {
        ascii_field(bytes, STATIC_HEADER_SIZE + count * block + i * width, width)
    };

    let mut channels = Vec::with_capacity(count);
    let mut record_index = 0;

    for i in 0..count {
        let label = field(LABEL, i);
        let (standard_label, standard_index) = standardize(&label);

        let physical_minimum = parse_float_field("physical_minimum", &field(PHYSICAL_MIN, i))?;
        let physical_maximum = parse_float_field("physical_maximum", &field(PHYSICAL_MAX, i))?;
        let digital_minimum = parse_int_field("digital_minimum", &field(DIGITAL_MIN, i))? as i32;
        let digital_maximum = parse_int_field("digital_maximum", &field(DIGITAL_MAX, i))? as i32;
        if digital_maximum < digital_minimum {
            return Err(EdfError::format(format!(
                "Signal {} ({}) has digital maximum {} below minimum {}",
                i, label, digital_maximum, digital_minimum
            )));
        }

        let number_of_samples = parse_int_field("number_of_samples", &field(SAMPLES, i))?;
        if number_of_samples < 1 {
            return Err(EdfError::format(format!(
                "Signal {} ({}) has {} samples per record",
                i, label, number_of_samples
            )));
        }
        let number_of_samples = number_of_samples as usize;

        channels.push(Channel {
            index: i,
            label,
            standard_label,
            standard_index,
            transducer_type: field(TRANSDUCER, i),
            physical_dimension: field(DIMENSION, i),
            physical_minimum,
            physical_maximum,
            digital_minimum,
            digital_maximum,
            pre_filtering: field(PREFILTER, i),
            number_of_samples,
            record_index,
        });

        // 记录内偏移 = 之前所有信号的样本数之和
        record_index += number_of_samples;
    }

    Ok(channels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{EdfBuilder, SignalSpec};
    use crate::resource::LocalResource;

    fn two_channel_file(records: usize) -> Vec<u8> {
        EdfBuilder::new()
            .signal(SignalSpec::new("EEG Fp1-REF", 4))
            .signal(SignalSpec::new("ECG", 2).with_dimension("mV"))
            .records_with(records, |signal, i| (signal * 1000 + i) as i16)
            .build()
            .unwrap()
    }

    #[test]
    fn test_parse_geometry() {
        let header = EdfHeader::parse(&two_channel_file(3)).unwrap();
        assert_eq!(header.number_of_signals, 2);
        assert_eq!(header.channels.len(), 2);
        assert_eq!(header.record_size, 6);
        assert_eq!(header.record_byte_size(), 12);
        assert_eq!(header.record_sample_size(), 3.0);
        assert_eq!(header.channels[0].record_index, 0);
        assert_eq!(header.channels[1].record_index, 4);
        assert_eq!(header.channels[1].physical_dimension, "mV");
        assert_eq!(header.header_size(), 768);
        assert_eq!(header.duration_ms(), 3000.0);
        assert_eq!(header.end_ms() - header.start_ms(), 3000.0);
    }

    #[test]
    fn test_parse_wide_montage() {
        let mut builder = EdfBuilder::new();
        for i in 0..5000 {
            builder = builder.signal(SignalSpec::new(format!("S{}", i), 1));
        }
        let bytes = builder.records_with(1, |signal, _| signal as i16).build().unwrap();

        let header = EdfHeader::parse(&bytes).unwrap();
        assert_eq!(header.number_of_signals, 5000);
        assert_eq!(header.channels[4999].label, "S4999");
        assert_eq!(header.channels[4999].record_index, 4999);
    }

    #[test]
    fn test_parse_rejects_short_input() {
        let bytes = two_channel_file(1);
        assert!(matches!(EdfHeader::parse(&bytes[..200]), Err(EdfError::FormatError(_))));
        assert!(matches!(EdfHeader::parse(&bytes[..600]), Err(EdfError::FormatError(_))));
    }

    #[test]
    fn test_blocks_round_outward() {
        let header = EdfHeader::parse(&two_channel_file(10)).unwrap();
        assert_eq!(header.blocks(0.0, 10_000.0), (0, 10));
        assert_eq!(header.blocks(1500.0, 2500.0), (1, 3));
        assert_eq!(header.blocks(2000.0, 3000.0), (2, 3));

        let span = header.block_span(1500.0, 2500.0).unwrap();
        assert_eq!(span, TimeRange::new(1000.0, 3000.0));
        assert_eq!(header.byte_range(1, 3), ByteRange::new(768 + 12, 768 + 36));
    }

    #[test]
    fn test_clamp_interval() {
        let header = EdfHeader::parse(&two_channel_file(10)).unwrap();
        assert_eq!(header.clamp_interval(-500.0, 99_000.0).unwrap(), (0.0, 10_000.0));
        assert!(matches!(
            header.clamp_interval(20_000.0, 30_000.0),
            Err(EdfError::BadInterval { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_data_interleaving() {
        let reader = EdfReader::new(LocalResource::from_bytes("t.edf", two_channel_file(2)));
        let data = reader.get_data(DataRequest::new(0.0, 2000.0)).await.unwrap();

        // 默认物理范围与数字范围一致，物理值等于原始值
        let fp1: Vec<f64> = data[0].iter().map(|p| p.value).collect();
        let ecg: Vec<f64> = data[1].iter().map(|p| p.value).collect();
        assert_eq!(fp1, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(ecg, vec![1000.0, 1001.0, 1002.0, 1003.0]);

        let start = reader.header().unwrap().start_ms();
        assert_eq!(data[0][1].time - start, 250.0);
        assert_eq!(data[1][2].time - start, 1000.0);
    }

    #[tokio::test]
    async fn test_get_data_truncated_resource() {
        let mut bytes = two_channel_file(4);
        bytes.truncate(768 + 12 * 2 + 5);
        let reader = EdfReader::new(LocalResource::from_bytes("t.edf", bytes));
        let data = reader.get_data(DataRequest::new(0.0, 4000.0)).await.unwrap();
        assert_eq!(data[0].len(), 8);
        assert_eq!(data[1].len(), 4);
    }
}
