use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringshm_rs::{
    Channel, ChannelId, Config, Endpoint, Mode, MultiChannel, RingBuffer, CURSORS_SIZE,
};
use std::thread;

const TOTAL_BYTES: usize = 64 * 1024 * 1024; // 64 MiB per run
const CAPACITY: usize = 1024 * 1024;

fn bench_ring_in_process(c: &mut Criterion) {
    let mut group = c.benchmark_group("ring");

    for chunk in [64usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(TOTAL_BYTES as u64));
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            let mut region = vec![0u8; CAPACITY + CURSORS_SIZE];
            let ring = RingBuffer::new(&mut region);
            let payload = vec![0xA5u8; chunk];

            b.iter(|| {
                let mut sent = 0;
                while sent < TOTAL_BYTES {
                    if ring.write(&payload).is_err() {
                        black_box(ring.try_read().unwrap());
                        continue;
                    }
                    sent += chunk;
                }
                black_box(ring.try_read().unwrap());
            });
        });
    }

    group.finish();
}

fn bench_channel_cross_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel");
    group.throughput(Throughput::Bytes(TOTAL_BYTES as u64));

    group.bench_function("spsc_4k_chunks", |b| {
        b.iter(|| {
            let id = ChannelId::random();
            let config = Config::new(CAPACITY);
            let mut rx = Channel::with_config(id, Mode::Receive, config);
            let mut tx = Channel::with_config(id, Mode::Send, config);
            rx.open().unwrap();
            tx.open().unwrap();

            let producer = thread::spawn(move || {
                let payload = vec![0x5Au8; 4096];
                let mut sent = 0;
                while sent < TOTAL_BYTES {
                    if tx.write(&payload).is_ok() {
                        sent += payload.len();
                    } else {
                        std::hint::spin_loop();
                    }
                }
            });

            let mut received = 0;
            while received < TOTAL_BYTES {
                match rx.try_read().unwrap() {
                    Some(data) => received += data.len(),
                    None => std::hint::spin_loop(),
                }
            }
            producer.join().unwrap();
        });
    });

    group.finish();
}

fn bench_multi_channel(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_channel");

    for senders in [2usize, 4] {
        group.throughput(Throughput::Bytes((TOTAL_BYTES * senders) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}S_1R", senders)),
            &senders,
            |b, &n| {
                b.iter(|| {
                    let id = ChannelId::random();
                    let config = Config::new(CAPACITY);
                    let mut rx = MultiChannel::with_config(id, Mode::Receive, n, config);
                    rx.open().unwrap();

                    let handles: Vec<_> = (0..n)
                        .map(|_| {
                            let mut tx = MultiChannel::with_config(id, Mode::Send, n, config);
                            tx.open().unwrap();
                            thread::spawn(move || {
                                let payload = vec![0x3Cu8; 4096];
                                let mut sent = 0;
                                while sent < TOTAL_BYTES {
                                    if tx.write(&payload).is_ok() {
                                        sent += payload.len();
                                    } else {
                                        std::hint::spin_loop();
                                    }
                                }
                            })
                        })
                        .collect();

                    let mut received = 0;
                    while received < TOTAL_BYTES * n {
                        match rx.try_read().unwrap() {
                            Some((_, data)) => received += data.len(),
                            None => std::hint::spin_loop(),
                        }
                    }
                    for h in handles {
                        h.join().unwrap();
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_ring_in_process,
    bench_channel_cross_thread,
    bench_multi_channel
);
criterion_main!(benches);
