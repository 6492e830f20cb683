//! VM benchmark binary.
//!
//! Measures execution time for representative programs.
//! Run with: `cargo run --release --bin bench`

use std::time::{Duration, Instant};

use regvm::virtual_machine::errors::VMError;
use regvm::virtual_machine::program::{Op, Program, ProgramBuilder};
use regvm::virtual_machine::vm::{NUM_REGISTERS, VM, VmConfig};

// ---------------------------------------------------------------------------
// Benchmark harness
// ---------------------------------------------------------------------------

struct BenchResult {
    name: &'static str,
    iterations: u64,
    total: Duration,
    /// Estimated number of instructions executed per run (None to omit column).
    est_instructions: Option<u64>,
}

impl BenchResult {
    fn avg(&self) -> Duration {
        self.total / self.iterations as u32
    }

    fn print(&self) {
        let avg = self.avg();
        let ns_per_op = avg.as_nanos();
        let ns_per_instr = self
            .est_instructions
            .filter(|&n| n > 0)
            .map(|n| format!("{:>8.1}", ns_per_op as f64 / n as f64))
            .unwrap_or_else(|| "       -".to_string());
        println!(
            "  {:<30} {:>7} iters {:>10.3} us/iter  {} ns/instr",
            self.name,
            self.iterations,
            ns_per_op as f64 / 1000.0,
            ns_per_instr,
        );
    }
}

/// Runs `f` for at least `min_duration`, returning aggregated results.
fn bench<F>(
    name: &'static str,
    min_duration: Duration,
    est_instructions: Option<u64>,
    mut f: F,
) -> BenchResult
where
    F: FnMut(),
{
    // Warmup
    for _ in 0..5 {
        f();
    }

    let mut iterations = 0u64;
    let start = Instant::now();
    while start.elapsed() < min_duration {
        f();
        iterations += 1;
    }
    let total = start.elapsed();

    BenchResult {
        name,
        iterations,
        total,
        est_instructions,
    }
}

fn run(program: &Program, config: impl FnOnce() -> VmConfig) {
    let mut vm = VM::new(program.clone(), config());
    vm.run().expect("run failed");
}

fn li(dst: u8, value: i64) -> Op {
    Op::LoadImmediate { dst, value }
}

// ---------------------------------------------------------------------------
// Benchmark definitions
// ---------------------------------------------------------------------------

/// r1 = n ; loop: r2 += r3 ; r1 -= r3 ; JNZ r1, loop
fn tight_loop(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    b.emit_all([li(1, n), li(3, 1)]);
    let top = b.offset();
    b.emit_all([
        Op::Add {
            dst: 2,
            src1: 2,
            src2: 3,
        },
        Op::Sub {
            dst: 1,
            src1: 1,
            src2: 3,
        },
        Op::JmpImmediateIfNotZero {
            check: 1,
            addr: top,
        },
        Op::Halt {},
    ]);
    b.into_program()
}

/// Loop of mixed ALU work closed by a CMP/JGT pair.
fn arithmetic_mix(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    b.emit_all([li(1, n), li(2, 1), li(3, 2), li(4, 3), li(10, 1), li(11, 0)]);
    let top = b.offset();
    b.emit_all([
        Op::Add {
            dst: 5,
            src1: 2,
            src2: 3,
        },
        Op::Mul {
            dst: 6,
            src1: 5,
            src2: 4,
        },
        Op::Sub {
            dst: 7,
            src1: 6,
            src2: 2,
        },
        Op::Div {
            dst: 8,
            src1: 7,
            src2: 3,
        },
        Op::Mod {
            dst: 9,
            src1: 8,
            src2: 4,
        },
        Op::ShiftLeft {
            dst: 2,
            src: 9,
            amount: 10,
        },
        Op::ShiftRight {
            dst: 3,
            src: 6,
            amount: 10,
        },
        Op::Or {
            dst: 3,
            src1: 3,
            src2: 10,
        },
        Op::Or {
            dst: 4,
            src1: 7,
            src2: 10,
        },
        Op::Sub {
            dst: 1,
            src1: 1,
            src2: 10,
        },
        Op::Cmp { src1: 1, src2: 11 },
        Op::JmpImmediateIfGreater { addr: top },
        Op::Halt {},
    ]);
    b.into_program()
}

/// Calls an empty subroutine `n` times.
fn call_overhead(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    b.emit_all([li(1, n), li(3, 1)]);
    let top = b.offset();
    b.emit_all([
        Op::CallImmediate { addr: 0 },
        Op::Sub {
            dst: 1,
            src1: 1,
            src2: 3,
        },
        Op::JmpImmediateIfNotZero {
            check: 1,
            addr: top,
        },
        Op::Halt {},
    ]);
    let noop = b.offset();
    b.emit(Op::Return {});
    let patched = b.patch_target(top, noop);
    assert!(patched, "call target patch failed");
    b.into_program()
}

/// Stores then reloads `n` heap cells, counting down.
fn memory(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    b.emit_all([li(1, n), li(2, 42), li(3, 1)]);
    let top = b.offset();
    b.emit_all([
        Op::Sub {
            dst: 1,
            src1: 1,
            src2: 3,
        },
        Op::StoreMemory { src: 2, addr: 1 },
        Op::LoadMemory { dst: 4, addr: 1 },
        Op::JmpImmediateIfNotZero {
            check: 1,
            addr: top,
        },
        Op::Halt {},
    ]);
    b.into_program()
}

/// Calls the host `n` times.
fn host_calls(n: i64) -> Program {
    let mut b = ProgramBuilder::new();
    b.emit_all([li(1, n), li(3, 1)]);
    let top = b.offset();
    b.emit_all([
        Op::HostCall {
            func: 0,
            arg: 4,
            argc: 1,
        },
        Op::Sub {
            dst: 1,
            src1: 1,
            src2: 3,
        },
        Op::JmpImmediateIfNotZero {
            check: 1,
            addr: top,
        },
        Op::Halt {},
    ]);
    b.into_program()
}

fn increment(_: i64, arg: u8, _: u8, regs: &[i64; NUM_REGISTERS]) -> Result<i64, VMError> {
    Ok(regs[arg as usize].wrapping_add(1))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() {
    let min = Duration::from_secs(2);

    println!("VM Benchmarks (each runs for >= 2s)\n");
    println!(
        "  {:<30} {:>7}       {:>14}  {:>10}",
        "benchmark", "iters", "avg time", "ns/instr"
    );
    println!("  {}", "-".repeat(70));

    // 1. Tight loop (100K iterations): 2 LI + 100K*(ADD+SUB+JNZ) + HALT
    let prog = tight_loop(100_000);
    bench("tight_loop(100K)", min, Some(3 + 100_000 * 3), || {
        run(&prog, VmConfig::default)
    })
    .print();

    // 2. Arithmetic mix (10K iterations): 6 LI + 10K*12 + HALT
    let prog = arithmetic_mix(10_000);
    bench("arithmetic_mix(10K)", min, Some(7 + 10_000 * 12), || {
        run(&prog, VmConfig::default)
    })
    .print();

    // 3. CALL overhead (10K calls): 2 LI + 10K*(CALL+RET+SUB+JNZ) + HALT
    let prog = call_overhead(10_000);
    bench("call_overhead(10K)", min, Some(3 + 10_000 * 4), || {
        run(&prog, VmConfig::default)
    })
    .print();

    // 4. Heap store/load (5K iterations): 3 LI + 5K*4 + HALT
    let prog = memory(5_000);
    bench("mem_load_store(5K)", min, Some(4 + 5_000 * 4), || {
        run(&prog, VmConfig::default)
    })
    .print();

    // 5. Host calls (10K calls): 2 LI + 10K*3 + HALT
    let prog = host_calls(10_000);
    bench("host_calls(10K)", min, Some(3 + 10_000 * 3), || {
        run(&prog, || VmConfig::new().with_host_fn(increment))
    })
    .print();

    // 6. Construction only: allocating the stack and heap
    let prog = Program::new(Vec::new());
    bench("vm_new(empty)", min, None, || {
        run(&prog, VmConfig::default)
    })
    .print();

    println!();
}
