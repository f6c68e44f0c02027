//! Mailbox and state table hot paths
//!
//! Run with: cargo bench --bench mailbox

use cadence_core::communication::{Mailbox, MailboxEntry, QueuedFn};
use cadence_core::state::StateTable;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::any::Any;
use std::sync::Arc;

const BATCH_SIZES: &[usize] = &[1, 16, 64];

fn increment() -> QueuedFn {
    Arc::new(|target: &mut dyn Any, _: Option<&dyn Any>| {
        if let Some(counter) = target.downcast_mut::<u64>() {
            *counter += 1;
        }
        None
    })
}

/// Enqueue a batch from the producer side, then drain it as the owning task would
fn bench_put_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("mailbox_put_drain");
    let call = increment();
    let name: Arc<str> = Arc::from("Increment");

    for &batch in BATCH_SIZES {
        group.bench_with_input(BenchmarkId::from_parameter(batch), &batch, |b, &batch| {
            let mut mailbox = Mailbox::new("bench", 64);
            let sender = mailbox.sender();
            let mut counter = 0u64;
            b.iter(|| {
                for _ in 0..batch {
                    let entry = MailboxEntry::new(name.clone(), call.clone(), None, None);
                    if sender.put(entry).is_err() {
                        break;
                    }
                }
                black_box(mailbox.execute_all(&mut counter));
            });
        });
    }

    group.finish();
}

/// One writer cycle of a table with a handful of slots
fn bench_state_advance(c: &mut Criterion) {
    let mut table = StateTable::new("bench", 256).unwrap();
    let ids: Vec<_> = (0..8)
        .map(|i| table.add_data(&format!("joint{}", i), 0.0f64).unwrap())
        .collect();
    table.finalize();
    let reader = table.accessor(ids[0]).unwrap();

    c.bench_function("state_table_advance", |b| {
        let mut value = 0.0;
        b.iter(|| {
            value += 1.0;
            table.start();
            for id in &ids {
                table.write(*id, value).unwrap();
            }
            black_box(table.advance());
        });
    });

    c.bench_function("state_table_read_latest", |b| {
        b.iter(|| black_box(reader.get_latest().unwrap()));
    });
}

criterion_group!(benches, bench_put_drain, bench_state_advance);
criterion_main!(benches);
