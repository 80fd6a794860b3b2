//! The named entities of the cost graph.

use crate::cost::CostArray;
use crate::subcost::SubCost;

use super::{CallId, ClassId, CycleId, FileId, FunctionId, ObjectId, PartCallId,
            PartFunctionId, SourceId};

/// An ELF object (shared library or executable).
#[derive(Debug)]
pub struct Object {
    pub name: String,
    pub functions: Vec<FunctionId>,
    pub self_cost: CostArray,
    pub inclusive: CostArray,
    pub dirty: bool,
}

impl Object {
    pub fn new(name: String) -> Object {
        Object {
            name,
            functions: Vec::new(),
            self_cost: CostArray::ZERO,
            inclusive: CostArray::ZERO,
            dirty: true,
        }
    }

    /// Base name, used as part of function keys.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn pretty_name(&self) -> String {
        if self.name.is_empty() {
            "(unknown)".into()
        } else {
            self.name.clone()
        }
    }
}

/// A source file.
#[derive(Debug)]
pub struct File {
    pub name: String,
    pub functions: Vec<FunctionId>,
    pub sources: Vec<SourceId>,
    pub self_cost: CostArray,
    pub inclusive: CostArray,
    pub dirty: bool,
}

impl File {
    pub fn new(name: String) -> File {
        File {
            name,
            functions: Vec::new(),
            sources: Vec::new(),
            self_cost: CostArray::ZERO,
            inclusive: CostArray::ZERO,
            dirty: true,
        }
    }

    pub fn pretty_name(&self) -> String {
        if self.name.is_empty() {
            "(unknown)".into()
        } else {
            self.name.clone()
        }
    }
}

/// A class/namespace, derived from the function name prefix.
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub functions: Vec<FunctionId>,
    pub self_cost: CostArray,
    pub inclusive: CostArray,
    pub dirty: bool,
}

impl Class {
    pub fn new(name: String) -> Class {
        Class {
            name,
            functions: Vec::new(),
            self_cost: CostArray::ZERO,
            inclusive: CostArray::ZERO,
            dirty: true,
        }
    }

    pub fn pretty_name(&self) -> String {
        if self.name.is_empty() {
            "(global)".into()
        } else {
            self.name.clone()
        }
    }
}

/// A function. The key is name plus object short name; the file is NOT
/// part of the key, since inlined code makes one function span files.
#[derive(Debug)]
pub struct Function {
    pub name: String,
    pub object: ObjectId,
    pub file: FileId,
    pub class: ClassId,
    pub callers: Vec<CallId>,
    pub callings: Vec<CallId>,
    pub sources: Vec<SourceId>,
    pub part_functions: Vec<PartFunctionId>,
    pub self_cost: CostArray,
    pub inclusive: CostArray,
    pub called_count: SubCost,
    pub calling_count: SubCost,
    pub called_contexts: u32,
    pub calling_contexts: u32,
    pub cycle: Option<CycleId>,
    pub dirty: bool,
}

impl Function {
    pub fn new(name: String, object: ObjectId, file: FileId, class: ClassId) -> Function {
        Function {
            name,
            object,
            file,
            class,
            callers: Vec::new(),
            callings: Vec::new(),
            sources: Vec::new(),
            part_functions: Vec::new(),
            self_cost: CostArray::ZERO,
            inclusive: CostArray::ZERO,
            called_count: SubCost::ZERO,
            calling_count: SubCost::ZERO,
            called_contexts: 0,
            calling_contexts: 0,
            cycle: None,
            dirty: true,
        }
    }
}

/// The part of a function living in one source file.
#[derive(Debug)]
pub struct FunctionSource {
    pub function: FunctionId,
    pub file: FileId,
}

impl FunctionSource {
    pub fn new(function: FunctionId, file: FileId) -> FunctionSource {
        FunctionSource { function, file }
    }
}

/// A call edge between two functions, aggregated over its part calls.
#[derive(Debug)]
pub struct Call {
    pub caller: FunctionId,
    pub called: FunctionId,
    pub cost: CostArray,
    pub call_count: SubCost,
    pub part_calls: Vec<PartCallId>,
    pub dirty: bool,
}

impl Call {
    pub fn new(caller: FunctionId, called: FunctionId) -> Call {
        Call {
            caller,
            called,
            cost: CostArray::ZERO,
            call_count: SubCost::ZERO,
            part_calls: Vec::new(),
            dirty: true,
        }
    }

    /// Simple recursion: a function calling itself outside of any cycle.
    pub fn is_recursion(&self) -> bool {
        self.caller == self.called
    }
}

/// A collapsed strongly connected component of the call graph, taking
/// part in aggregation as a synthetic function.
#[derive(Debug)]
pub struct FunctionCycle {
    pub base: FunctionId,
    pub cycle_no: u32,
    pub members: Vec<FunctionId>,
    /// Calls from outside the cycle into any member.
    pub callers: Vec<CallId>,
    pub self_cost: CostArray,
    pub inclusive: CostArray,
    pub called_count: SubCost,
    pub dirty: bool,
}

impl FunctionCycle {
    pub fn new(base: FunctionId, cycle_no: u32) -> FunctionCycle {
        FunctionCycle {
            base,
            cycle_no,
            members: Vec::new(),
            callers: Vec::new(),
            self_cost: CostArray::ZERO,
            inclusive: CostArray::ZERO,
            called_count: SubCost::ZERO,
            dirty: true,
        }
    }

    pub fn name(&self) -> String {
        format!("<cycle {}>", self.cycle_no)
    }
}
