//! VM benchmark binary.
//!
//! Measures create + load + execution time for representative programs.
//! Run with: `cargo run --release --bin bench`

use std::time::{Duration, Instant};

use obpl::virtual_machine::builder::ProgramBuilder;
use obpl::virtual_machine::config::VmConfig;
use obpl::virtual_machine::output::NullOutput;
use obpl::virtual_machine::vm::VM;

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    name: String,
    iterations: u64,
    total: Duration,
    /// Instructions executed by the last run.
    instructions: u64,
}

impl BenchResult {
    fn avg(&self) -> Duration {
        self.total / self.iterations as u32
    }

    fn print(&self) {
        let ns_per_op = self.avg().as_nanos();
        let ns_per_instr = if self.instructions > 0 {
            format!("{:>8.2}", ns_per_op as f64 / self.instructions as f64)
        } else {
            "       -".to_string()
        };
        println!(
            "  {:<30} {:>7} iters {:>10.3} us/iter {:>12} instrs  {} ns/instr",
            self.name,
            self.iterations,
            ns_per_op as f64 / 1000.0,
            self.instructions,
            ns_per_instr,
        );
    }
}

/// Runs `f` for at least `min_duration`, returning aggregated results.
fn bench<F>(name: impl Into<String>, min_duration: Duration, mut f: F) -> BenchResult
where
    F: FnMut() -> u64,
{
    // Warmup
    for _ in 0..5 {
        f();
    }

    let mut iterations = 0u64;
    let mut instructions = 0u64;
    let start = Instant::now();
    while start.elapsed() < min_duration {
        instructions = f();
        iterations += 1;
    }
    let total = start.elapsed();

    BenchResult {
        name: name.into(),
        iterations,
        total,
        instructions,
    }
}

/// Runs `code` on a fresh default-sized VM, returning the instruction count.
fn run(code: &[u8]) -> u64 {
    let mut vm = VM::create(VmConfig::default()).expect("vm create failed");
    vm.load(code).expect("load failed");
    vm.execute_with(&mut NullOutput).expect("run failed");
    vm.instructions_executed()
}

// ---------------------------------------------------------------------------
// Benchmark programs
// ---------------------------------------------------------------------------

/// Counter lives at memory[0]; scratch words start at 8.
const COUNTER: u64 = 0;
const SCRATCH: u64 = 8;

/// Emits a countdown loop running `body` `iterations` times.
///
/// `body` must leave the stack as it found it.
fn counted_loop(
    b: &mut ProgramBuilder,
    iterations: u64,
    body: impl FnOnce(&mut ProgramBuilder),
) {
    b.push(iterations).store(COUNTER).label("__loop");
    body(b);
    b.load(COUNTER)
        .push(1)
        .sub()
        .store(COUNTER)
        .load(COUNTER)
        .jmp_if("__loop");
}

fn factorial(n: u64) -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    b.push(1).store(SCRATCH);
    counted_loop(&mut b, n, |b| {
        b.load(SCRATCH).load(COUNTER).mul().store(SCRATCH);
    });
    b.load(SCRATCH).end();
    b.finish().expect("build")
}

fn tight_loop() -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    counted_loop(&mut b, 100_000, |_| {});
    b.end();
    b.finish().expect("build")
}

fn arithmetic_mix() -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    counted_loop(&mut b, 10_000, |b| {
        b.push(7)
            .push(3)
            .add()
            .push(5)
            .mul()
            .push(2)
            .sub()
            .push(4)
            .div()
            .push(9)
            .lt()
            .pop();
    });
    b.end();
    b.finish().expect("build")
}

fn branch_heavy() -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    counted_loop(&mut b, 50_000, |b| {
        b.load(COUNTER)
            .push(25_000)
            .gt()
            .jmp_if("__upper")
            .load(SCRATCH)
            .push(1)
            .add()
            .store(SCRATCH)
            .label("__upper");
    });
    b.end();
    b.finish().expect("build")
}

fn call_overhead() -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    counted_loop(&mut b, 10_000, |b| {
        b.call("noop");
    });
    b.end().label("noop").ret();
    b.finish().expect("build")
}

fn memory_traffic() -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    counted_loop(&mut b, 5_000, |b| {
        b.push(42).store(SCRATCH).load(SCRATCH).pop();
    });
    b.end();
    b.finish().expect("build")
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let min = Duration::from_secs(2);

    println!("VM Benchmarks (each runs for >= 2s)\n");
    println!(
        "  {:<30} {:>7}       {:>14} {:>12}        {:>10}",
        "benchmark", "iters", "avg time", "instrs/run", "ns/instr"
    );
    println!("  {}", "-".repeat(88));

    // Programs are built up front so emission cost is excluded.
    for n in [10u64, 100, 1000] {
        let code = factorial(n);
        bench(format!("factorial({n})"), min, || run(&code)).print();
    }

    let suite = [
        ("tight_loop(100K)", tight_loop()),
        ("arithmetic_mix(10K)", arithmetic_mix()),
        ("branch_heavy(50K)", branch_heavy()),
        ("call_overhead(10K)", call_overhead()),
        ("memory_load_store(5K)", memory_traffic()),
    ];
    for (name, code) in &suite {
        bench(*name, min, || run(code)).print();
    }

    println!();
}
