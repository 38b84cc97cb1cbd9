use std::cmp::Ordering;
use std::collections::{hash_map::Entry, HashMap};
use std::time::Instant;

use crate::compiler::Op;

pub trait Profiler {
    fn on_instruction_start(&mut self, op: Op);
    fn on_instruction_end(&mut self, op: Op);
    fn report(&self) -> Option<String> {
        None
    }
}

/// Average wall time per opcode
pub struct TimeProfiler {
    ops: HashMap<Op, (usize, u64)>,
    next: Option<Op>,
    start: Instant,
}

impl TimeProfiler {
    pub fn new() -> TimeProfiler {
        TimeProfiler {
            ops: HashMap::new(),
            next: None,
            start: Instant::now(),
        }
    }
}

impl Default for TimeProfiler {
    fn default() -> TimeProfiler {
        TimeProfiler::new()
    }
}

impl Profiler for TimeProfiler {
    fn on_instruction_start(&mut self, op: Op) {
        self.next = Some(op);
        self.start = Instant::now();
    }

    fn on_instruction_end(&mut self, op: Op) {
        // A mismatch means the instruction errored out; drop the sample
        if self.next.take() != Some(op) {
            return;
        }

        let elapsed = self.start.elapsed();
        let nanos = elapsed.as_secs() * 1_000_000_000 + u64::from(elapsed.subsec_nanos());
        match self.ops.entry(op) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().0 += 1;
                entry.get_mut().1 += nanos;
            }
            Entry::Vacant(vacant) => {
                vacant.insert((1, nanos));
            }
        }
    }

    fn report(&self) -> Option<String> {
        let (total_time, total_ops) = self
            .ops
            .values()
            .fold((0, 0), |(time, ops), &(count, nanos)| (time + nanos, ops + count));
        if total_ops == 0 {
            return None;
        }

        let mut lines = self
            .ops
            .iter()
            .map(|(op, &(count, nanos))| {
                let average = (nanos as f64) / (count as f64);
                let line = format!(
                    "{:18}: {:6.0} ns on avg,  {:2.0}% of total time,  {:2.0}% of total ins.\n",
                    op.to_string(),
                    average,
                    100.0 * (nanos as f64) / (total_time.max(1) as f64),
                    100.0 * (count as f64) / (total_ops as f64)
                );
                (average, line)
            })
            .collect::<Vec<_>>();

        lines.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(Ordering::Equal));

        Some(lines.into_iter().map(|(_, line)| line).collect())
    }
}

pub struct NoopProfiler;

impl Profiler for NoopProfiler {
    fn on_instruction_start(&mut self, _: Op) {}
    fn on_instruction_end(&mut self, _: Op) {}
}
