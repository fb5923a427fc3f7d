//! Benchmarks for frame decoding and record formatting.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use radalert_listener::{
    CodecConfig, ConsoleFormatter, DeviceRecord, FrameCodec, InfluxDbFormatter, Mode,
    OutputFormatter, WindowReport, WindowStats,
};
use std::time::{Duration, SystemTime};

/// BLE status frame: 18 counts, 1.070 mR/h displayed, device CPM 1070,
/// 75% battery with the alarm set.
const BLE_STATUS: [u8; 16] = [
    0x12, 0x00, 0x00, 0x00, 0x2e, 0x04, 0x00, 0x00, 0x17, 0x00, 0x2e, 0x04, 0x00, 0x00, 0x13,
    0x2a,
];

/// HID status report: 3 counts, 180 CPM displayed.
const HID_STATUS: [u8; 15] = [
    0x03, 0x00, 0x00, 0x00, 0x09, 0xb4, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

fn codec() -> FrameCodec {
    FrameCodec::new(CodecConfig::default().with_factor(Mode::MilliRoentgen, 1070.0))
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));
    let codec = codec();

    group.bench_function("ble_status", |b| {
        b.iter(|| black_box(codec.decode(black_box(&BLE_STATUS))))
    });

    group.bench_function("hid_status", |b| {
        b.iter(|| black_box(codec.decode(black_box(&HID_STATUS))))
    });

    group.bench_function("unrecognized", |b| {
        b.iter(|| black_box(codec.decode(black_box(&BLE_STATUS[..7]))))
    });

    group.finish();
}

fn record() -> DeviceRecord {
    let measurement = codec()
        .decode(&BLE_STATUS)
        .map(|m| {
            m.observed(
                SystemTime::UNIX_EPOCH + Duration::from_secs(1_709_294_400),
                Some(1020.0),
            )
        })
        .unwrap();
    let windows = [300, 43_200, 7_776_000]
        .into_iter()
        .map(|secs| WindowReport {
            duration: Duration::from_secs(secs),
            samples: 100,
            stats: Some(WindowStats {
                avg: 998.4,
                min: 840.0,
                max: 1260.0,
            }),
        })
        .collect();
    DeviceRecord::new(&measurement, windows, Some(1070))
}

fn bench_format(c: &mut Criterion) {
    let mut group = c.benchmark_group("format");
    group.throughput(Throughput::Elements(1));
    let record = record();

    let console = ConsoleFormatter::new(record.windows.iter().map(|w| w.duration).collect());
    group.bench_function("console", |b| {
        b.iter(|| black_box(console.format(black_box(&record))))
    });

    let influxdb = InfluxDbFormatter::new("radalert".to_string(), Some("D4:9C:DD:01:02:A3".into()));
    group.bench_function("influxdb", |b| {
        b.iter(|| black_box(influxdb.format(black_box(&record))))
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_format);
criterion_main!(benches);
