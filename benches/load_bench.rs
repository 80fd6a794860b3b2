//! Parse throughput on a synthesized callgrind dump.

use std::fmt::Write as _;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use callview::logger::Logger;
use callview::{Config, ProfileData};

struct NullLogger;
impl Logger for NullLogger {}

/// Build a dump with `functions` functions of `lines` cost lines each,
/// calling their successor.
fn synthetic_dump(functions: usize, lines: usize) -> String {
    let mut out = String::from("version: 1\npid: 1\nevents: Ir Dr Dw\nfl=(1) synth.c\n");
    for f in 0..functions {
        writeln!(out, "fn=({}) fn_{f}", f + 1).unwrap();
        for l in 0..lines {
            writeln!(out, "{} {} {} {}", 10 + l, 100 + l, 10 + l, l).unwrap();
        }
        if f + 1 < functions {
            writeln!(out, "cfn=({}) fn_{}", f + 2, f + 1).unwrap();
            writeln!(out, "calls=3").unwrap();
            writeln!(out, "{} {} {} {}", 10, 500, 50, 5).unwrap();
        }
    }
    out
}

fn bench_load(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("callgrind.out.1");
    std::fs::write(&path, synthetic_dump(200, 50)).expect("write dump");

    c.bench_function("load_200fn_50lines", |b| {
        b.iter(|| {
            let mut data = ProfileData::new(Config::default());
            let mut logger = NullLogger;
            let parts =
                callview::loader::load_trace(&mut data, &mut logger, black_box(&path));
            assert_eq!(parts, 1);
            data
        })
    });

    c.bench_function("load_and_rank", |b| {
        b.iter(|| {
            let mut data = ProfileData::new(Config::default());
            let mut logger = NullLogger;
            callview::loader::load_trace(&mut data, &mut logger, black_box(&path));
            let et = callview::EventTypeId::Real(0);
            callview::query::top_functions(
                &mut data,
                callview::query::RankKey::Inclusive(et),
                50,
            )
        })
    });
}

criterion_group!(benches, bench_load);
criterion_main!(benches);
