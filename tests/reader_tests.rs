use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Datelike, Timelike};
use edfstream::resource::LocalResource;
use edfstream::{
    ByteRange, ByteRangeResource, DataRequest, EdfBuilder, EdfError, EdfHeader, EdfReader, SignalSpec,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// 测试样本：每个信号错开，便于区分交织顺序
fn sample_value(signal: usize, n: usize) -> i16 {
    ((n * 7) % 23) as i16 + signal as i16 * 100
}

// 1秒记录，2个通道 × 每记录10个样本，共10个记录
fn scenario_file() -> Vec<u8> {
    EdfBuilder::new()
        .patient("P001 M 01-JAN-1990 Test_Patient")
        .recording("Startdate 24-DEC-1985 R01 Tech Device")
        .start_fields("24.12.85", "23.59.58")
        .reserved("EDF+C")
        .signal(
            SignalSpec::new("EEG Fp1-REF", 10)
                .with_transducer("AgAgCl electrodes")
                .with_prefilter("HP:0.1Hz LP:70Hz"),
        )
        .signal(SignalSpec::new("ECG Lead II", 10).with_dimension("mV"))
        .records_with(10, sample_value)
        .build()
        .unwrap()
}

fn reader_for(bytes: Vec<u8>) -> EdfReader<LocalResource> {
    EdfReader::new(LocalResource::from_bytes("scenario.edf", bytes))
}

/// A resource whose every read fails
struct Unreachable;

#[async_trait]
impl ByteRangeResource for Unreachable {
    async fn read_bytes(&self, _range: ByteRange) -> edfstream::Result<Bytes> {
        Err(EdfError::TransportError("unreachable".to_string()))
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}

#[tokio::test]
async fn test_header_round_trip() {
    init_logger();
    let reader = reader_for(scenario_file());
    let header = reader.read_header().await.unwrap();

    assert_eq!(header.version, 0);
    assert_eq!(header.patient_identification, "P001 M 01-JAN-1990 Test_Patient");
    assert_eq!(header.record_identification, "Startdate 24-DEC-1985 R01 Tech Device");
    assert_eq!(header.reserved, "EDF+C");
    assert_eq!(header.number_of_signals, 2);
    assert_eq!(header.channels.len(), 2);
    assert_eq!(header.number_of_data_records, 10);
    assert_eq!(header.record_duration_time, 1.0);
    assert_eq!(header.record_header_byte_size, 768);
    assert_eq!(header.record_size, 20);
    assert_eq!(header.record_byte_size(), 40);

    assert_eq!(header.start.year(), 1985);
    assert_eq!(header.start.month(), 12);
    assert_eq!(header.start.hour(), 23);
    assert_eq!((header.end - header.start).num_seconds(), 10);

    let fp1 = &header.channels[0];
    assert_eq!(fp1.label, "EEG Fp1-REF");
    assert_eq!(fp1.standard_label, "Fp1");
    assert_eq!(fp1.standard_index, 1);
    assert_eq!(fp1.transducer_type, "AgAgCl electrodes");
    assert_eq!(fp1.pre_filtering, "HP:0.1Hz LP:70Hz");
    assert_eq!(fp1.digital_minimum, -32768);
    assert_eq!(fp1.physical_maximum, 32767.0);

    let ecg = &header.channels[1];
    assert_eq!(ecg.standard_label, "ECG Lead II");
    assert_eq!(ecg.standard_index, 0);
    assert_eq!(ecg.physical_dimension, "mV");
    assert_eq!(ecg.record_index, 10);
}

#[tokio::test]
async fn test_read_header_is_cached() {
    let reader = reader_for(scenario_file());
    assert!(reader.header().is_none());

    let first = reader.read_header().await.unwrap() as *const EdfHeader;
    let second = reader.read_header().await.unwrap() as *const EdfHeader;
    assert_eq!(first, second);
    assert!(reader.header().is_some());
}

#[tokio::test]
async fn test_get_data_returns_one_array_per_signal() {
    let reader = reader_for(scenario_file());

    let intervals = [(0.0, 10_000.0), (0.0, 1.0), (999.0, 1001.0), (2500.0, 7300.0), (9999.0, 10_000.0)];
    for (from, till) in intervals {
        let data = reader.get_data(DataRequest::new(from, till)).await.unwrap();
        assert_eq!(data.len(), 2, "interval [{}, {})", from, till);
        assert!(data.iter().all(|points| !points.is_empty()));
    }
}

#[tokio::test]
async fn test_get_data_covers_whole_records() {
    let reader = reader_for(scenario_file());
    let data = reader.get_data(DataRequest::new(2500.0, 4200.0)).await.unwrap();
    let start = reader.header().unwrap().start_ms();

    // 记录 2..5，每通道30个样本
    assert_eq!(data[0].len(), 30);
    assert_eq!(data[0][0].time - start, 2000.0);
    assert_eq!(data[0][29].time - start, 4900.0);
    assert_eq!(data[0][0].value, sample_value(0, 20) as f64);
    assert_eq!(data[1][0].value, sample_value(1, 20) as f64);
    assert!(data[0].iter().all(|p| !p.is_decimated()));
}

#[tokio::test]
async fn test_get_data_clamps_to_recording() {
    let reader = reader_for(scenario_file());
    let data = reader.get_data(DataRequest::new(-5000.0, 50_000.0)).await.unwrap();
    assert_eq!(data[0].len(), 100);
    assert_eq!(data[1].len(), 100);
}

#[tokio::test]
async fn test_decimation_scenario() {
    init_logger();
    let reader = reader_for(scenario_file());
    let data = reader
        .get_data(DataRequest::new(0.0, 10_000.0).with_frequency(1.0))
        .await
        .unwrap();
    let start = reader.header().unwrap().start_ms();

    for (signal, points) in data.iter().enumerate() {
        // 1个原始点 + 9个完整的10样本桶
        assert_eq!(points.len(), 10);
        assert_eq!(points[0].range, None);
        assert_eq!(points[0].value, sample_value(signal, 0) as f64);

        for (k, point) in points.iter().enumerate().skip(1) {
            let samples: Vec<f64> = ((k - 1) * 10 + 1..=k * 10)
                .map(|n| sample_value(signal, n) as f64)
                .collect();
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

            assert!((point.value - mean).abs() < 1e-9);
            assert_eq!(point.range, Some((min, max)));
            assert!(samples.iter().all(|v| *v >= min && *v <= max));
            assert_eq!(point.time - start, k as f64 * 1000.0);
        }
    }
}

#[tokio::test]
async fn test_data_points_serialize_as_tuples() {
    let reader = reader_for(scenario_file());
    let data = reader
        .get_data(DataRequest::new(0.0, 2000.0).with_frequency(1.0))
        .await
        .unwrap();

    let json = serde_json::to_value(&data[0]).unwrap();
    let first = &json[0];
    assert_eq!(first.as_array().unwrap().len(), 3);
    assert_eq!(first[2], serde_json::json!([]));
    assert_eq!(json[1][2].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_interval_is_rejected_before_io() {
    let reader = EdfReader::new(Unreachable);
    match reader.get_data(DataRequest::new(5.0, 5.0)).await {
        Err(EdfError::BadInterval { from, till }) => {
            assert_eq!(from, 5.0);
            assert_eq!(till, 5.0);
        }
        other => panic!("expected BadInterval, got {:?}", other.map(|d| d.len())),
    }

    let reader = reader_for(scenario_file());
    assert!(matches!(
        reader.get_data(DataRequest::new(3000.0, 1000.0)).await,
        Err(EdfError::BadInterval { .. })
    ));
}

#[tokio::test]
async fn test_transport_errors_bubble_up() {
    let reader = EdfReader::new(Unreachable);
    let err = reader.read_header().await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_format_errors() {
    // 文件比静态头部还短
    let reader = reader_for(scenario_file()[..100].to_vec());
    assert!(matches!(reader.read_header().await, Err(EdfError::FormatError(_))));

    // 动态头部被截断
    let reader = reader_for(scenario_file()[..600].to_vec());
    assert!(matches!(reader.read_header().await, Err(EdfError::FormatError(_))));

    // 信号数为0
    let mut bytes = scenario_file();
    bytes[252..256].copy_from_slice(b"0   ");
    assert!(matches!(EdfHeader::parse(&bytes), Err(EdfError::FormatError(_))));

    // 信号数不是数字
    bytes[252..256].copy_from_slice(b"two ");
    assert!(matches!(EdfHeader::parse(&bytes), Err(EdfError::FormatError(_))));

    // 日期无法解析
    let bytes = EdfBuilder::new()
        .start_fields("31.02.20", "10.00.00")
        .signal(SignalSpec::new("A", 1))
        .build()
        .unwrap();
    assert!(matches!(EdfHeader::parse(&bytes), Err(EdfError::FormatError(_))));

    // 记录数未知
    let bytes = EdfBuilder::new()
        .declared_records(-1)
        .signal(SignalSpec::new("A", 1))
        .build()
        .unwrap();
    assert!(matches!(EdfHeader::parse(&bytes), Err(EdfError::FormatError(_))));
}

#[tokio::test]
async fn test_scaled_physical_values() {
    let bytes = EdfBuilder::new()
        .signal(SignalSpec::new("EEG", 4).with_physical(-200.0, 200.0).with_digital(-2048, 2047))
        .record(vec![vec![-2048, 0, 2047, 1024]])
        .build()
        .unwrap();
    let reader = reader_for(bytes);
    let data = reader.get_data(DataRequest::new(0.0, 1000.0)).await.unwrap();

    let scale = 401.0 / 4096.0;
    let expected = [-200.0, 2048.0 * scale - 200.0, 4095.0 * scale - 200.0, 3072.0 * scale - 200.0];
    for (point, expected) in data[0].iter().zip(expected) {
        assert!((point.value - expected).abs() < 1e-9);
    }
}
