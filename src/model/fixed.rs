//! Immutable per-line records as read from a dump file.
//!
//! These are plain copies of the input, allocated once during parsing and
//! never mutated. Aggregation replays them on demand. Each record links
//! to the next one of its owner (head insertion, so the lists run in
//! reverse encounter order; summation does not care).

use crate::pool::CostRef;
use crate::subcost::{Addr, SubCost};

use super::{FixCostId, FixJumpId, FixCallCostId, FunctionId, PartId, SourceId};

/// Decoded position of a cost line: line and/or address, optionally a
/// range on either axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PositionSpec {
    pub from_line: u32,
    pub to_line: u32,
    pub from_addr: Addr,
    pub to_addr: Addr,
}

impl PositionSpec {
    pub fn is_line_region(&self) -> bool {
        self.from_line != self.to_line
    }

    pub fn is_addr_region(&self) -> bool {
        self.from_addr != self.to_addr
    }
}

/// A self-cost record: counters for one position of one part function.
#[derive(Clone, Copy, Debug)]
pub struct FixCost {
    pub part: PartId,
    pub source: SourceId,
    pub pos: PositionSpec,
    /// Counters in file column order, routed through the part mapping.
    pub cost: CostRef,
    pub next: Option<FixCostId>,
}

/// A call-cost record. The pool slice holds one extra slot: the call
/// count sits behind the counters.
#[derive(Clone, Copy, Debug)]
pub struct FixCallCost {
    pub part: PartId,
    pub source: SourceId,
    pub line: u32,
    pub addr: Addr,
    pub cost: CostRef,
    pub next: Option<FixCallCostId>,
}

impl FixCallCost {
    pub fn counter_len(&self) -> usize {
        self.cost.len().saturating_sub(1)
    }
}

/// A jump record between two positions, possibly across functions.
#[derive(Clone, Copy, Debug)]
pub struct FixJump {
    pub part: PartId,
    pub line: u32,
    pub addr: Addr,
    pub source: SourceId,
    pub target_line: u32,
    pub target_addr: Addr,
    pub target_function: FunctionId,
    pub target_source: SourceId,
    pub is_cond: bool,
    pub executed: SubCost,
    pub followed: SubCost,
    pub next: Option<FixJumpId>,
}
