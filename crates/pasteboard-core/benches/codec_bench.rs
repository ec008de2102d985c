//! Criterion benchmarks for the PasteData codec and the transfer layer.
//!
//! Measures how long it takes to encode and decode payloads of typical
//! shapes, and what the shared-region path costs compared to inline.
//!
//! Run with:
//! ```bash
//! cargo bench --package pasteboard-core --bench codec_bench
//! ```

use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pasteboard_core::model::{
    decode_paste_data, encode_paste_data, PasteData, PasteRecord, PixelMap, Want,
};
use pasteboard_core::protocol::messages::{CallerInfo, PasteMessage, SetPasteDataRequest};
use pasteboard_core::protocol::{decode_message, encode_message};
use pasteboard_core::transfer::{prepare_transfer, receive_transfer};

// ── Payload fixtures ──────────────────────────────────────────────────────────

fn make_short_text() -> PasteData {
    PasteData::with_text("Hello, clipboard!")
}

fn make_rich_copy() -> PasteData {
    let mut data = PasteData::new();
    let mut html = PasteRecord::html("<p>Quarterly <b>report</b> attached</p>".repeat(20));
    html.add_entry(pasteboard_core::PasteDataEntry::text("Quarterly report attached"));
    data.add_record(html).unwrap();
    data.add_record(PasteRecord::uri("file:///home/user/report.pdf")).unwrap();
    let mut params = BTreeMap::new();
    params.insert("bundle".to_string(), "com.example.docs".to_string());
    data.add_record(PasteRecord::want(Want {
        action: "view".to_string(),
        params,
    }))
    .unwrap();
    data
}

fn make_many_records() -> PasteData {
    let mut data = PasteData::new();
    for i in 0..200 {
        data.add_record(PasteRecord::plain_text(format!("line {i}"))).unwrap();
    }
    data
}

fn make_pixel_map(side: u32) -> PasteData {
    let mut data = PasteData::new();
    data.add_record(PasteRecord::pixel_map(PixelMap {
        width: side,
        height: side,
        pixels: vec![0x7F; (side * side * 4) as usize],
    }))
    .unwrap();
    data
}

fn fixtures() -> Vec<(&'static str, PasteData)> {
    vec![
        ("ShortText", make_short_text()),
        ("RichCopy", make_rich_copy()),
        ("ManyRecords(200)", make_many_records()),
        ("PixelMap(64)", make_pixel_map(64)),
        ("PixelMap(512)", make_pixel_map(512)),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_paste_data");
    for (name, data) in fixtures() {
        group.bench_with_input(BenchmarkId::new("payload", name), &data, |b, data| {
            b.iter(|| encode_paste_data(black_box(data)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_paste_data");
    for (name, data) in fixtures() {
        let bytes = encode_paste_data(&data);
        group.bench_with_input(BenchmarkId::new("payload", name), &bytes, |b, bytes| {
            b.iter(|| decode_paste_data(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// Inline vs shared-region transfer of the same payload sizes.
fn bench_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_roundtrip");
    for (name, data) in [("Inline", make_rich_copy()), ("Shared", make_pixel_map(256))] {
        group.bench_with_input(BenchmarkId::new("path", name), &data, |b, data| {
            b.iter(|| {
                let payload = prepare_transfer(black_box(data), None).unwrap();
                receive_transfer(payload).unwrap()
            })
        });
    }
    group.finish();
}

/// Full IPC frame for a small set request.
fn bench_frame(c: &mut Criterion) {
    let inline = encode_paste_data(&make_short_text());
    let msg = PasteMessage::SetPasteData(SetPasteDataRequest {
        caller: CallerInfo {
            token_id: 1,
            pid: 2,
        },
        declared_size: inline.len() as i64,
        inline,
    });
    c.bench_function("set_request_frame_roundtrip", |b| {
        b.iter(|| {
            let bytes = encode_message(black_box(&msg), black_box(1), black_box(0)).unwrap();
            decode_message(black_box(&bytes)).unwrap()
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_transfer, bench_frame);
criterion_main!(benches);
