use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::StdRng;

use brinewire::{
    CommandFrame, ConnectionCounter, EngineConfig, MockClock, Password, SoftenerEngine,
    Transport, TransportError,
    auth::{ChallengeDraws, build_auth_packet},
    crc::CsCrc8,
    history::HistoryContinuation,
    packets::{
        ClockTime, Dispatch, Meridiem, StatisticsTotals, StatusFlags, StatusRealtime,
        dispatch_next,
    },
    peripheral,
    ring_buffer::RingBuffer,
};
use std::sync::Arc;
use std::time::Instant;

struct Discard;

impl Transport for Discard {
    fn write(&mut self, _frame: &CommandFrame) -> Result<(), TransportError> {
        Ok(())
    }
}

fn create_status() -> StatusRealtime {
    StatusRealtime {
        time: ClockTime {
            hour: 8,
            minute: 15,
            meridiem: Meridiem::Am,
        },
        battery_code: 1,
        current_flow_raw: 250,
        soft_water_remaining: 900,
        usage_today: 80,
        peak_flow_raw: 400,
        hardness_gpg: 20,
        regen_hour: 2,
        regen_meridiem: Meridiem::Am,
        flags: StatusFlags::default(),
    }
}

// Concatenated poll response with a full usage history.
fn create_poll_stream() -> Vec<u8> {
    let mut stream = peripheral::status_realtime(&create_status()).to_vec();
    stream.extend_from_slice(&peripheral::statistics_totals(&StatisticsTotals {
        current_flow_raw: 250,
        total_gallons: 500_000,
        total_gallons_resettable: 1_000,
        total_regens: 90,
        total_regens_resettable: 3,
    }));
    let history: [u16; 62] = std::array::from_fn(|i| (i as u16 % 60) * 10);
    for packet in peripheral::usage_history(&history) {
        stream.extend_from_slice(&packet);
    }
    stream
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let stream = create_poll_stream();
    group.throughput(Throughput::Bytes(stream.len() as u64));

    group.bench_function("poll_stream", |b| {
        b.iter(|| {
            let mut buf: RingBuffer<256> = RingBuffer::new();
            let mut continuation = HistoryContinuation::Idle;
            buf.append(black_box(&stream));
            let mut packets = 0;
            while let Dispatch::Packet(_) = dispatch_next(&mut buf, &mut continuation) {
                packets += 1;
            }
            black_box(packets)
        })
    });

    let garbage: Vec<u8> = (0..200u8).map(|i| i.wrapping_mul(37)).collect();
    group.bench_function("resync_garbage", |b| {
        b.iter(|| {
            let mut buf: RingBuffer<256> = RingBuffer::new();
            let mut continuation = HistoryContinuation::Idle;
            buf.append(black_box(&garbage));
            while dispatch_next(&mut buf, &mut continuation) != Dispatch::NeedMoreData {}
            black_box(buf.len())
        })
    });
    group.finish();
}

fn bench_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let stream = create_poll_stream();
    let clock = Arc::new(MockClock::new(Instant::now()));
    let mut engine = SoftenerEngine::with_rng(
        EngineConfig::default(),
        clock,
        Box::new(StdRng::seed_from_u64(1)),
    )
    .expect("default config is valid");
    let mut link = Discard;

    for chunk in [1usize, 5, 20] {
        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::new("notification_chunk", chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut count = 0;
                for piece in stream.chunks(chunk) {
                    count += engine.handle_notification(black_box(piece), &mut link).len();
                }
                black_box(count)
            })
        });
    }
    group.finish();
}

fn bench_auth(c: &mut Criterion) {
    let mut group = c.benchmark_group("auth");
    let draws = ChallengeDraws {
        polynomial: 0x1D,
        seed: 0x5A,
        second: 0x33,
        filler: [1; 9],
    };
    let password = Password::default();
    group.bench_function("build_auth_packet", |b| {
        b.iter(|| build_auth_packet(black_box(password), ConnectionCounter::new(7), &draws))
    });
    group.bench_function("crc8_legacy_256", |b| {
        b.iter(|| {
            let mut crc = CsCrc8::with_options(0x1D, 0x5A);
            let mut acc = 0u8;
            for v in 0..=255u8 {
                acc ^= crc.compute_legacy(black_box(v));
            }
            acc
        })
    });
    group.finish();
}

criterion_group!(benches, bench_dispatch, bench_engine, bench_auth);
criterion_main!(benches);
