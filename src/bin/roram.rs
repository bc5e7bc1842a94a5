// Copyright (c) Meta Platforms, Inc. and affiliates.
//
// This source code is dual-licensed under either the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree or the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree. You may select, at your option, one of the above-listed licenses.

//! Command-line driver: parameter inspection, single-range read/write, and benchmarking of
//! rORAM against an `L=1` Path-ORAM baseline.

use clap::{Parser, Subcommand};
use roram::{NoOpCrypto, Op, Params, RoramCoordinator};
use std::fs::File;
use std::io::Write as _;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "roram", about = "A range-aware Oblivious RAM storage engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Derives and prints the parameters for an (N, L, Z, B) configuration.
    Init {
        n: u64,
        l: u64,
        #[arg(default_value_t = 4)]
        z: u64,
        #[arg(default_value_t = 4096)]
        b: usize,
    },
    /// Reads range [a, a+r).
    Read { n: u64, l: u64, a: u64, r: u64 },
    /// Writes range [a, a+r) with zero-filled payloads.
    Write { n: u64, l: u64, a: u64, r: u64 },
    /// Benchmarks every range class 2^0..=2^ell.
    Bench {
        n: u64,
        l: u64,
        #[arg(default_value_t = 5)]
        trials: usize,
    },
    /// Compares rORAM against an L=1 baseline across range classes.
    Compare {
        #[arg(long, default_value_t = 65536)]
        n: u64,
        #[arg(long, default_value_t = 8192)]
        l: u64,
        #[arg(long, default_value_t = 5)]
        trials: usize,
        #[arg(long)]
        csv: Option<String>,
        #[arg(long)]
        file: Option<String>,
        #[arg(long, default_value_t = 0)]
        seek_penalty_us: u64,
    },
}

fn init_logging() {
    let _ = simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
}

fn mean_std_ci(samples: &[f64]) -> (f64, f64, f64, f64) {
    let n = samples.len();
    if n == 0 {
        return (0.0, 0.0, 0.0, 0.0);
    }
    let mean = samples.iter().sum::<f64>() / n as f64;
    let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
        / if n > 1 { (n - 1) as f64 } else { 1.0 };
    let std_dev = if n > 1 { var.sqrt() } else { 0.0 };
    let ci_half = 1.96 * std_dev / (n as f64).sqrt();
    (mean, std_dev, mean - ci_half, mean + ci_half)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Init { n, l, z, b } => {
            let p = Params::new(n, l, z, b)?;
            println!(
                "Params: N={} L={} Z={} B={} ell={} h={}",
                p.n, p.l, p.z, p.b, p.ell, p.h
            );
        }
        Command::Read { n, l, a, r } => {
            let p = Params::new(n, l, 4, 4096)?;
            let mut ram = RoramCoordinator::new_in_memory(p, NoOpCrypto::default());
            let data = ram.access(a, r, Op::Read, None)?;
            println!("Read {} blocks", data.len());
        }
        Command::Write { n, l, a, r } => {
            let p = Params::new(n, l, 4, 4096)?;
            let mut ram = RoramCoordinator::new_in_memory(p, NoOpCrypto::default());
            let data = vec![vec![0u8; p.b]; r as usize];
            ram.access(a, r, Op::Write, Some(&data))?;
            println!("Wrote {r} blocks");
        }
        Command::Bench { n, l, trials } => {
            let p = Params::new(n, l, 4, 4096)?;
            let mut ram = RoramCoordinator::new_in_memory(p, NoOpCrypto::default());
            println!("Benchmark N={n} L={l} trials={trials}");
            for exp in 0..=p.ell {
                let r = 1u64 << exp;
                if r > n {
                    break;
                }
                let mut total_ms = 0.0;
                for t in 0..trials {
                    let a = if n > r { (t as u64 * 17) % (n - r) } else { 0 };
                    let start = Instant::now();
                    ram.access(a, r, Op::Read, None)?;
                    total_ms += start.elapsed().as_secs_f64() * 1000.0;
                }
                println!(
                    "  range 2^{exp} ({r} blocks): {:.2} ms avg",
                    total_ms / trials as f64
                );
            }
        }
        Command::Compare {
            n,
            l,
            trials,
            csv,
            file,
            seek_penalty_us,
        } => run_compare(n, l, trials, csv, file, seek_penalty_us)?,
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_compare(
    n: u64,
    l: u64,
    trials: usize,
    csv_path: Option<String>,
    file_path: Option<String>,
    seek_penalty_us: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let params_roram = Params::new(n, l, 4, 4096)?;
    let params_path = Params::new(n, 1, 4, 4096)?;

    let mut ram_roram = match &file_path {
        Some(prefix) => RoramCoordinator::new_file_backed(
            params_roram,
            NoOpCrypto::default(),
            &format!("{prefix}_roram"),
        )?,
        None => RoramCoordinator::new_in_memory(params_roram, NoOpCrypto::default()),
    };
    let mut ram_path = match &file_path {
        Some(prefix) => RoramCoordinator::new_file_backed(
            params_path,
            NoOpCrypto::default(),
            &format!("{prefix}_path"),
        )?,
        None => RoramCoordinator::new_in_memory(params_path, NoOpCrypto::default()),
    };

    let max_exp = params_roram.ell.min(14);
    println!("Compare rORAM vs Path ORAM  N={n} L={l} trials={trials}");
    println!("{}", "-".repeat(120));
    println!(
        "{:>12}{:>12}{:>16}{:>20}{:>14}{:>12}{:>12}",
        "range_size", "scheme", "total_ms", "time_per_block_ms", "mean_seeks", "ci_low", "ci_high"
    );
    println!("{}", "-".repeat(120));

    let mut csv_file = csv_path
        .as_ref()
        .map(File::create)
        .transpose()?;
    if let Some(f) = csv_file.as_mut() {
        writeln!(
            f,
            "scheme,range_exp,range_size,mean_ms,std_ms,time_per_block_ms,mean_seeks,ci_low,ci_high"
        )?;
    }

    for exp in 0..=max_exp {
        let r_size = 1u64 << exp;
        if r_size > n {
            break;
        }
        let max_start = if n > r_size { n - r_size } else { 0 };

        let mut times_roram = Vec::with_capacity(trials);
        let mut times_path = Vec::with_capacity(trials);
        let mut seeks_roram = Vec::with_capacity(trials);
        let mut seeks_path = Vec::with_capacity(trials);

        for t in 0..trials {
            let a = if max_start > 0 {
                (t as u64 * 17 + exp as u64 * 31) % max_start
            } else {
                0
            };

            let seek_before_r = ram_roram.seek_count();
            let start = Instant::now();
            ram_roram.access(a, r_size, Op::Read, None)?;
            let elapsed_r = start.elapsed().as_secs_f64() * 1000.0;
            let seek_after_r = ram_roram.seek_count();
            let reported_r = elapsed_r
                + if seek_penalty_us > 0 {
                    (seek_after_r - seek_before_r) as f64 * (seek_penalty_us as f64 / 1000.0)
                } else {
                    0.0
                };
            times_roram.push(reported_r);
            seeks_roram.push(seek_after_r - seek_before_r);

            let seek_before_p = ram_path.seek_count();
            let start = Instant::now();
            for off in 0..r_size {
                ram_path.access(a + off, 1, Op::Read, None)?;
            }
            let elapsed_p = start.elapsed().as_secs_f64() * 1000.0;
            let seek_after_p = ram_path.seek_count();
            let reported_p = elapsed_p
                + if seek_penalty_us > 0 {
                    (seek_after_p - seek_before_p) as f64 * (seek_penalty_us as f64 / 1000.0)
                } else {
                    0.0
                };
            times_path.push(reported_p);
            seeks_path.push(seek_after_p - seek_before_p);
        }

        let (mean_r, std_r, ci_lo_r, ci_hi_r) = mean_std_ci(&times_roram);
        let (mean_p, std_p, ci_lo_p, ci_hi_p) = mean_std_ci(&times_path);
        let per_block_r = if r_size > 0 { mean_r / r_size as f64 } else { 0.0 };
        let per_block_p = if r_size > 0 { mean_p / r_size as f64 } else { 0.0 };
        let mean_seeks_r = seeks_roram.iter().sum::<u64>() / trials.max(1) as u64;
        let mean_seeks_p = seeks_path.iter().sum::<u64>() / trials.max(1) as u64;

        println!(
            "{:>12}{:>12}{:>16.3}{:>20.3}{:>14}{:>12.3}{:>12.3}",
            r_size, "rORAM", mean_r, per_block_r, mean_seeks_r, ci_lo_r, ci_hi_r
        );
        println!(
            "{:>12}{:>12}{:>16.3}{:>20.3}{:>14}{:>12.3}{:>12.3}",
            r_size, "PathORAM", mean_p, per_block_p, mean_seeks_p, ci_lo_p, ci_hi_p
        );

        if let Some(f) = csv_file.as_mut() {
            writeln!(
                f,
                "rORAM,{exp},{r_size},{mean_r},{std_r},{per_block_r},{mean_seeks_r},{ci_lo_r},{ci_hi_r}"
            )?;
            writeln!(
                f,
                "PathORAM,{exp},{r_size},{mean_p},{std_p},{per_block_p},{mean_seeks_p},{ci_lo_p},{ci_hi_p}"
            )?;
        }
    }

    if let Some(path) = csv_path {
        println!("Wrote {path}");
    }
    Ok(())
}
