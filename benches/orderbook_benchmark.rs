//! Benchmarks for order book and feature operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use market_features::features::{FeatureConfig, FeatureEngine};
use market_features::market::{millis_to_datetime, Bar, Quote};
use market_features::orderbook::{OrderBook, OrderBookStore};
use rust_decimal::Decimal;

const T0: i64 = 1_672_531_200_000;

/// Quote `i` adds a bid and an ask one cent further from the top
fn create_quote(i: usize, ts: i64) -> Quote {
    let offset = Decimal::new(i as i64, 2);
    Quote::from_lots(
        millis_to_datetime(ts).unwrap(),
        Decimal::from(100) - offset,
        Decimal::from(3 + (i % 5) as i64),
        Decimal::new(10_001, 2) + offset,
        Decimal::from(2 + (i % 7) as i64),
    )
    .unwrap()
}

fn create_book(levels: usize) -> OrderBook {
    let quotes: Vec<Quote> = (0..levels).map(|i| create_quote(i, T0)).collect();
    OrderBook::from_quotes("SPY", &quotes, levels)
}

fn create_bars(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.3).sin();
            Bar {
                time: millis_to_datetime(T0 + i as i64 * 60_000).unwrap(),
                open: close - 0.05,
                high: close + 0.2,
                low: close - 0.2,
                close,
                volume: 5_000.0 + (i % 13) as f64 * 250.0,
                vwap: close,
                trades: 50,
            }
        })
        .collect()
}

fn benchmark_build_book(c: &mut Criterion) {
    let quotes: Vec<Quote> = (0..50).map(|i| create_quote(i, T0)).collect();

    c.bench_function("build_book_50_levels", |b| {
        b.iter(|| OrderBook::from_quotes("SPY", black_box(&quotes), 50))
    });
}

fn benchmark_apply_quote(c: &mut Criterion) {
    let mut store = OrderBookStore::with_depth(50);
    for i in 0..50 {
        store.apply_quote("SPY", &create_quote(i, T0));
    }
    let update = create_quote(3, T0 + 1);

    c.bench_function("apply_quote", |b| {
        b.iter(|| {
            store.apply_quote("SPY", black_box(&update));
        })
    });
}

fn benchmark_snapshot(c: &mut Criterion) {
    let book = create_book(50);

    c.bench_function("book_features", |b| {
        b.iter(|| {
            black_box(book.features());
        })
    });

    c.bench_function("get_state", |b| {
        b.iter(|| {
            black_box(book.state());
        })
    });
}

fn benchmark_features(c: &mut Criterion) {
    let bars = create_bars(390);
    let quotes: Vec<Quote> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| create_quote(i % 10, bar.time.timestamp_millis() - 5_000))
        .collect();
    let engine = FeatureEngine::new(FeatureConfig::default());
    let book = create_book(10).features();

    c.bench_function("compute_batch_390_bars", |b| {
        b.iter(|| engine.compute_batch(black_box(&bars), black_box(&quotes)))
    });

    c.bench_function("compute_live_390_bars", |b| {
        b.iter(|| engine.compute_live(black_box(&bars), black_box(&book)))
    });
}

criterion_group!(
    benches,
    benchmark_build_book,
    benchmark_apply_quote,
    benchmark_snapshot,
    benchmark_features
);
criterion_main!(benches);
