//! VM execution tracing.
//!
//! [`VM::execute_traced`](crate::VM::execute_traced) is generic over a
//! [`VmTracer`]. Every hook has an empty default body, so with [`NoopTracer`]
//! the hooks monomorphize away and [`VM::execute`](crate::VM::execute) pays
//! nothing for them.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | No-op, used by `execute` |
//! | [`StderrTracer`] | Human-readable execution log to stderr |
//! | [`ProfilingTracer`] | Opcode frequency and call counters |
//! | [`CoverageTracer`] | Which tape offsets executed |
//! | [`RecordingTracer`] | Full event recording for post-mortem |
//!
//! ```ignore
//! let mut tracer = ProfilingTracer::new();
//! vm.execute_traced(&code, &mut tracer)?;
//! println!("{}", tracer.report());
//! ```

use std::collections::HashMap;

use crate::{
    bytecode::{Opcode, RuntimeError},
    object::Object,
};

/// Trace event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// An opcode was dispatched.
    Instruction {
        /// Byte offset of the opcode in the tape.
        ip: usize,
        opcode: Opcode,
        /// Operand stack depth before the instruction ran.
        stack_depth: usize,
    },
    /// A built-in function was called.
    Call { name: String, argc: usize },
    /// A `CHK_QTY` instruction asked the quantity check.
    QuantityCheck {
        item: Object,
        qty: u8,
        /// Whether the check passed.
        held: bool,
    },
    /// Execution failed.
    Error { ip: usize, message: String },
}

/// Hooks invoked by the VM during execution.
pub trait VmTracer: std::fmt::Debug {
    /// Called before each opcode dispatch. This is the hottest hook.
    #[inline(always)]
    fn on_instruction(&mut self, _ip: usize, _opcode: Opcode, _stack_depth: usize) {}

    /// Called before a built-in function runs.
    #[inline(always)]
    fn on_call(&mut self, _name: &str, _argc: usize) {}

    /// Called after a quantity check answered.
    #[inline(always)]
    fn on_quantity_check(&mut self, _item: Object, _qty: u8, _held: bool) {}

    /// Called once when execution fails, with the offset of the failing opcode.
    /// Panics in host functions bypass this hook.
    #[inline(always)]
    fn on_error(&mut self, _ip: usize, _error: &RuntimeError) {}
}

// ============================================================================
// NoopTracer
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

// ============================================================================
// StderrTracer
// ============================================================================

/// Prints every instruction and call to stderr.
///
/// ```text
/// [    0] PUSH_CONST stack=0
/// [    3] CHK_QTY    stack=1
///   ??? QTY Object(ptr TOKEN@3) >= 1 -> true
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Stop after this many instructions. None = unlimited.
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracer that goes quiet after `limit` instructions.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }
}

impl VmTracer for StderrTracer {
    #[inline]
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize) {
        if self.stopped {
            return;
        }
        eprintln!("[{ip:>5}] {:<10} stack={stack_depth}", opcode.mnemonic());
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} instructions) ---");
            self.stopped = true;
        }
    }

    fn on_call(&mut self, name: &str, argc: usize) {
        if self.stopped {
            return;
        }
        eprintln!("  >>> CALL {name:<20} argc={argc}");
    }

    fn on_quantity_check(&mut self, item: Object, qty: u8, held: bool) {
        if self.stopped {
            return;
        }
        eprintln!("  ??? QTY {item:?} >= {qty} -> {held}");
    }

    fn on_error(&mut self, ip: usize, error: &RuntimeError) {
        eprintln!("  !!! ERROR at {ip}: {error}");
    }
}

// ============================================================================
// ProfilingTracer
// ============================================================================

/// Counts opcodes and calls. Read the result with [`ProfilingTracer::report`].
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    opcode_counts: HashMap<Opcode, u64>,
    call_counts: HashMap<String, u64>,
    total_instructions: u64,
    total_quantity_checks: u64,
    max_stack_depth: usize,
}

/// Summary of a profiling trace.
#[derive(Debug)]
pub struct ProfilingReport {
    /// Per-opcode execution counts, most frequent first.
    pub opcode_counts: Vec<(Opcode, u64)>,
    /// Per-function call counts, most frequent first.
    pub call_counts: Vec<(String, u64)>,
    pub total_instructions: u64,
    pub total_quantity_checks: u64,
    pub max_stack_depth: usize,
}

impl ProfilingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut opcode_counts: Vec<_> = self.opcode_counts.iter().map(|(&k, &v)| (k, v)).collect();
        opcode_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| (a.0 as u8).cmp(&(b.0 as u8))));
        let mut call_counts: Vec<_> = self.call_counts.iter().map(|(k, &v)| (k.clone(), v)).collect();
        call_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ProfilingReport {
            opcode_counts,
            call_counts,
            total_instructions: self.total_instructions,
            total_quantity_checks: self.total_quantity_checks,
            max_stack_depth: self.max_stack_depth,
        }
    }
}

impl VmTracer for ProfilingTracer {
    #[inline]
    fn on_instruction(&mut self, _ip: usize, opcode: Opcode, stack_depth: usize) {
        *self.opcode_counts.entry(opcode).or_insert(0) += 1;
        self.total_instructions += 1;
        self.max_stack_depth = self.max_stack_depth.max(stack_depth);
    }

    fn on_call(&mut self, name: &str, _argc: usize) {
        *self.call_counts.entry(name.to_owned()).or_insert(0) += 1;
    }

    fn on_quantity_check(&mut self, _item: Object, _qty: u8, _held: bool) {
        self.total_quantity_checks += 1;
    }
}

impl std::fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== VM Profiling Report ===")?;
        writeln!(f, "Total instructions: {}", self.total_instructions)?;
        writeln!(f, "Quantity checks:    {}", self.total_quantity_checks)?;
        writeln!(f, "Max stack depth:    {}", self.max_stack_depth)?;
        writeln!(f)?;
        writeln!(f, "--- Opcode Frequency ---")?;
        for (opcode, count) in &self.opcode_counts {
            let pct = (*count as f64 / self.total_instructions as f64) * 100.0;
            writeln!(f, "  {:<12} {count:>10}  ({pct:>5.1}%)", opcode.mnemonic())?;
        }
        if !self.call_counts.is_empty() {
            writeln!(f)?;
            writeln!(f, "--- Calls ---")?;
            for (name, count) in &self.call_counts {
                writeln!(f, "  {name:<24} {count:>10}")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// CoverageTracer
// ============================================================================

/// Records which tape offsets were executed.
#[derive(Debug, Default)]
pub struct CoverageTracer {
    ips: ahash::AHashSet<usize>,
}

impl CoverageTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn covered_ips(&self) -> &ahash::AHashSet<usize> {
        &self.ips
    }

    #[must_use]
    pub fn coverage_count(&self) -> usize {
        self.ips.len()
    }
}

impl VmTracer for CoverageTracer {
    #[inline]
    fn on_instruction(&mut self, ip: usize, _opcode: Opcode, _stack_depth: usize) {
        self.ips.insert(ip);
    }
}

// ============================================================================
// RecordingTracer
// ============================================================================

/// Records every event, optionally up to a limit.
///
/// Allocates per event; meant for debugging single evaluations.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
    limit: Option<usize>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    fn record(&mut self, event: TraceEvent) {
        if self.limit.is_some_and(|l| self.events.len() >= l) {
            return;
        }
        self.events.push(event);
    }
}

impl VmTracer for RecordingTracer {
    #[inline]
    fn on_instruction(&mut self, ip: usize, opcode: Opcode, stack_depth: usize) {
        self.record(TraceEvent::Instruction {
            ip,
            opcode,
            stack_depth,
        });
    }

    fn on_call(&mut self, name: &str, argc: usize) {
        self.record(TraceEvent::Call {
            name: name.to_owned(),
            argc,
        });
    }

    fn on_quantity_check(&mut self, item: Object, qty: u8, held: bool) {
        self.record(TraceEvent::QuantityCheck { item, qty, held });
    }

    fn on_error(&mut self, ip: usize, error: &RuntimeError) {
        self.record(TraceEvent::Error {
            ip,
            message: error.to_string(),
        });
    }
}
