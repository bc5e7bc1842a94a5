// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Benchmarks rORAM `Access` by range class against an `L=1` Path-ORAM baseline, the same
//! comparison the CLI's `compare` subcommand prints.

extern crate criterion;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use roram::{NoOpCrypto, Op, Params, RoramCoordinator};

const N: u64 = 4096;
const L: u64 = 256;

fn benchmark_roram_by_range_class(c: &mut Criterion) {
    let params = Params::new(N, L, 4, 256).unwrap();
    let mut group = c.benchmark_group("roram_access");
    for exp in 0..=params.ell {
        let r = 1u64 << exp;
        if r > N {
            break;
        }
        let mut ram = RoramCoordinator::new_in_memory(params, NoOpCrypto::new(0));
        group.bench_with_input(BenchmarkId::from_parameter(r), &r, |b, &r| {
            b.iter(|| ram.access(black_box(0), black_box(r), Op::Read, None).unwrap());
        });
    }
}

fn benchmark_path_oram_baseline(c: &mut Criterion) {
    let params = Params::new(N, 1, 4, 256).unwrap();
    let mut group = c.benchmark_group("path_oram_baseline");
    for exp in 0..=8u32 {
        let r = 1u64 << exp;
        if r > N {
            break;
        }
        let mut ram = RoramCoordinator::new_in_memory(params, NoOpCrypto::new(0));
        group.bench_with_input(BenchmarkId::from_parameter(r), &r, |b, &r| {
            b.iter(|| {
                for off in 0..r {
                    ram.access(black_box(off), 1, Op::Read, None).unwrap();
                }
            });
        });
    }
}

criterion_group!(
    benches,
    benchmark_roram_by_range_class,
    benchmark_path_oram_baseline
);
criterion_main!(benches);
