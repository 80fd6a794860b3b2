//! One loaded dump file and its per-entity mirrors.

use crate::cost::CostArray;
use crate::event::SubMapping;
use crate::subcost::SubCost;

use super::{CallId, FixCostId, FixCallCostId, FixJumpId, FunctionId, PartCallId, PartId};

/// One profile part: a single dump file's contribution.
#[derive(Debug)]
pub struct Part {
    pub file_name: String,
    pub part_number: u32,
    pub thread_id: u32,
    pub process_id: u32,
    pub trigger: String,
    pub timeframe: String,
    pub descriptions: Vec<String>,
    pub version: String,
    /// Column order of this file's cost lines.
    pub sub_mapping: Option<SubMapping>,
    /// Sum of this part's own costs, fixed after loading.
    pub totals: CostArray,
    pub active: bool,
}

impl Part {
    pub fn new(file_name: String) -> Part {
        Part {
            file_name,
            part_number: 0,
            thread_id: 0,
            process_id: 0,
            trigger: String::new(),
            timeframe: String::new(),
            descriptions: Vec::new(),
            version: String::new(),
            sub_mapping: None,
            totals: CostArray::ZERO,
            active: true,
        }
    }

    /// Short display name: base file name plus part/thread discriminators.
    pub fn pretty_name(&self) -> String {
        let base = self
            .file_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.file_name);
        let mut name = base.to_string();
        if self.thread_id > 0 {
            name.push_str(&format!(" (thread {})", self.thread_id));
        }
        name
    }

    /// Sort key for the part list: by process, then part number, then
    /// thread.
    pub fn order_key(&self) -> (u32, u32, u32) {
        (self.process_id, self.part_number, self.thread_id)
    }
}

/// The slice of one function observed in one part. Holds the heads of the
/// fixed-record lists and the per-part aggregates derived from them.
#[derive(Debug)]
pub struct PartFunction {
    pub function: FunctionId,
    pub part: PartId,
    pub self_cost: CostArray,
    pub inclusive: CostArray,
    pub called_count: SubCost,
    pub calling_count: SubCost,
    pub called_contexts: u32,
    pub calling_contexts: u32,
    pub part_callers: Vec<PartCallId>,
    pub part_callings: Vec<PartCallId>,
    pub first_fix_cost: Option<FixCostId>,
    pub first_fix_jump: Option<FixJumpId>,
    pub dirty: bool,
}

impl PartFunction {
    pub fn new(function: FunctionId, part: PartId) -> PartFunction {
        PartFunction {
            function,
            part,
            self_cost: CostArray::ZERO,
            inclusive: CostArray::ZERO,
            called_count: SubCost::ZERO,
            calling_count: SubCost::ZERO,
            called_contexts: 0,
            calling_contexts: 0,
            part_callers: Vec::new(),
            part_callings: Vec::new(),
            first_fix_cost: None,
            first_fix_jump: None,
            dirty: true,
        }
    }
}

/// The slice of one call edge observed in one part.
#[derive(Debug)]
pub struct PartCall {
    pub call: CallId,
    pub part: PartId,
    pub cost: CostArray,
    pub call_count: SubCost,
    pub first_fix_call: Option<FixCallCostId>,
    pub dirty: bool,
}

impl PartCall {
    pub fn new(call: CallId, part: PartId) -> PartCall {
        PartCall {
            call,
            part,
            cost: CostArray::ZERO,
            call_count: SubCost::ZERO,
            first_fix_call: None,
            dirty: true,
        }
    }
}
