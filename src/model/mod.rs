//! The in-memory cost graph.
//!
//! All entities live in arenas owned by [`ProfileData`] and reference each
//! other through plain index ids. Aggregated costs are computed lazily:
//! loading and part activation mark entities dirty, the first read
//! recomputes from the fixed records upward.

pub mod detail;
pub mod entity;
pub mod fixed;
pub mod part;

use std::collections::HashMap;

use crate::config::Config;
use crate::cost::CostArray;
use crate::event::{EventTypeId, EventTypeSet};
use crate::pool::CostPool;
use crate::scan::Scan;
use crate::subcost::{Addr, SubCost};

pub use detail::{Instr, InstrMap, Line, LineMap};
pub use entity::{Call, Class, File, Function, FunctionCycle, FunctionSource, Object};
pub use fixed::{FixCallCost, FixCost, FixJump, PositionSpec};
pub use part::{Part, PartCall, PartFunction};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ObjectId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FileId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ClassId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FunctionId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SourceId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CallId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PartId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PartFunctionId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PartCallId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FixCostId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FixCallCostId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct FixJumpId(pub u32);
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CycleId(pub u32);

/// Instruction set hints found in dump headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    Arm,
}

/// Everything loaded from one trace (one or more parts).
pub struct ProfileData {
    pub config: Config,

    pub objects: Vec<Object>,
    pub files: Vec<File>,
    pub classes: Vec<Class>,
    pub functions: Vec<Function>,
    pub sources: Vec<FunctionSource>,
    pub calls: Vec<Call>,
    pub parts: Vec<Part>,
    pub part_functions: Vec<PartFunction>,
    pub part_calls: Vec<PartCall>,
    pub fix_costs: Vec<FixCost>,
    pub fix_call_costs: Vec<FixCallCost>,
    pub fix_jumps: Vec<FixJump>,
    pub cycles: Vec<FunctionCycle>,

    object_map: HashMap<String, ObjectId>,
    file_map: HashMap<String, FileId>,
    class_map: HashMap<String, ClassId>,
    /// Key: function name + object short name (NOT the file).
    function_map: HashMap<String, FunctionId>,

    pub(crate) line_maps: HashMap<SourceId, LineMap>,
    pub(crate) instr_maps: HashMap<FunctionId, InstrMap>,

    pub pool: CostPool,
    pub event_types: EventTypeSet,

    pub trace_name: String,
    pub command: String,
    pub arch: Option<Arch>,

    /// Component-wise maximum over all call costs seen.
    pub call_max: CostArray,
    pub max_call_count: SubCost,
    pub max_part_number: u32,
    pub max_thread_id: u32,

    totals_all: CostArray,
    totals_active: CostArray,
    totals_dirty: bool,
}

impl ProfileData {
    pub fn new(config: Config) -> ProfileData {
        let event_types = EventTypeSet::with_known_types(crate::config::KNOWN_EVENT_TYPES);
        ProfileData {
            config,
            objects: Vec::new(),
            files: Vec::new(),
            classes: Vec::new(),
            functions: Vec::new(),
            sources: Vec::new(),
            calls: Vec::new(),
            parts: Vec::new(),
            part_functions: Vec::new(),
            part_calls: Vec::new(),
            fix_costs: Vec::new(),
            fix_call_costs: Vec::new(),
            fix_jumps: Vec::new(),
            cycles: Vec::new(),
            object_map: HashMap::new(),
            file_map: HashMap::new(),
            class_map: HashMap::new(),
            function_map: HashMap::new(),
            line_maps: HashMap::new(),
            instr_maps: HashMap::new(),
            pool: CostPool::new(),
            event_types,
            trace_name: String::new(),
            command: String::new(),
            arch: None,
            call_max: CostArray::ZERO,
            max_call_count: SubCost::ZERO,
            max_part_number: 0,
            max_thread_id: 0,
            totals_all: CostArray::ZERO,
            totals_active: CostArray::ZERO,
            totals_dirty: true,
        }
    }

    // --- Entity factories (find or create) ---

    pub fn object(&mut self, name: &str) -> ObjectId {
        if let Some(&id) = self.object_map.get(name) {
            return id;
        }
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(Object::new(name.to_string()));
        self.object_map.insert(name.to_string(), id);
        id
    }

    pub fn file(&mut self, name: &str) -> FileId {
        if let Some(&id) = self.file_map.get(name) {
            return id;
        }
        let id = FileId(self.files.len() as u32);
        self.files.push(File::new(name.to_string()));
        self.file_map.insert(name.to_string(), id);
        id
    }

    fn class(&mut self, name: &str) -> ClassId {
        if let Some(&id) = self.class_map.get(name) {
            return id;
        }
        let id = ClassId(self.classes.len() as u32);
        self.classes.push(Class::new(name.to_string()));
        self.class_map.insert(name.to_string(), id);
        id
    }

    /// Class prefix of a function name: everything before the last `::`,
    /// ignoring any `::` behind the first `(`.
    pub fn class_of(name: &str) -> (&str, &str) {
        let paren = name.find('(').unwrap_or(name.len());
        let mut last = 0;
        let mut search = 0;
        while let Some(i) = name[search..].find("::") {
            let at = search + i;
            if at >= paren {
                break;
            }
            last = at + 2;
            search = at + 2;
        }
        if last < 3 {
            ("", name)
        } else {
            (&name[..last - 2], &name[last..])
        }
    }

    pub fn function(&mut self, name: &str, file: FileId, object: ObjectId) -> FunctionId {
        let key = format!("{}{}", name, self.objects[object.0 as usize].short_name());
        if let Some(&id) = self.function_map.get(&key) {
            return id;
        }

        let (class_name, _short) = Self::class_of(name);
        let class_name = class_name.to_string();
        let class = self.class(&class_name);

        let id = FunctionId(self.functions.len() as u32);
        self.functions
            .push(Function::new(name.to_string(), object, file, class));
        self.function_map.insert(key, id);
        self.classes[class.0 as usize].functions.push(id);
        self.objects[object.0 as usize].functions.push(id);
        self.files[file.0 as usize].functions.push(id);
        id
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FunctionId(i as u32))
    }

    /// Find or create the (function, file) source pairing.
    pub fn function_source(&mut self, function: FunctionId, file: FileId) -> SourceId {
        let existing = self.functions[function.0 as usize]
            .sources
            .iter()
            .find(|&&s| self.sources[s.0 as usize].file == file);
        if let Some(&s) = existing {
            return s;
        }
        let id = SourceId(self.sources.len() as u32);
        self.sources.push(FunctionSource::new(function, file));
        self.functions[function.0 as usize].sources.push(id);
        self.files[file.0 as usize].sources.push(id);
        id
    }

    /// Find or create the call edge caller → called.
    pub fn call(&mut self, caller: FunctionId, called: FunctionId) -> CallId {
        let existing = self.functions[caller.0 as usize]
            .callings
            .iter()
            .find(|&&c| self.calls[c.0 as usize].called == called);
        if let Some(&c) = existing {
            return c;
        }
        let id = CallId(self.calls.len() as u32);
        self.calls.push(Call::new(caller, called));
        self.functions[caller.0 as usize].callings.push(id);
        self.functions[called.0 as usize].callers.push(id);
        id
    }

    pub fn part_function(&mut self, function: FunctionId, part: PartId) -> PartFunctionId {
        let existing = self.functions[function.0 as usize]
            .part_functions
            .iter()
            .find(|&&p| self.part_functions[p.0 as usize].part == part);
        if let Some(&p) = existing {
            return p;
        }
        let id = PartFunctionId(self.part_functions.len() as u32);
        self.part_functions.push(PartFunction::new(function, part));
        self.functions[function.0 as usize].part_functions.push(id);
        id
    }

    pub fn part_call(
        &mut self,
        call: CallId,
        part: PartId,
        caller_pf: PartFunctionId,
        called_pf: PartFunctionId,
    ) -> PartCallId {
        let existing = self.calls[call.0 as usize]
            .part_calls
            .iter()
            .find(|&&p| self.part_calls[p.0 as usize].part == part);
        if let Some(&p) = existing {
            return p;
        }
        let id = PartCallId(self.part_calls.len() as u32);
        self.part_calls.push(PartCall::new(call, part));
        self.calls[call.0 as usize].part_calls.push(id);
        self.part_functions[caller_pf.0 as usize]
            .part_callings
            .push(id);
        self.part_functions[called_pf.0 as usize]
            .part_callers
            .push(id);
        id
    }

    // --- Fixed-record constructors ---

    /// Store a self-cost record: strip up to the part's column count of
    /// counters from the line, commit only what was present, and link the
    /// record at the head of the part function's list.
    pub fn new_fix_cost(
        &mut self,
        part: PartId,
        source: SourceId,
        pos: PositionSpec,
        part_function: PartFunctionId,
        s: &mut Scan,
    ) {
        let max = match &self.parts[part.0 as usize].sub_mapping {
            Some(m) => m.count(),
            None => return,
        };
        s.strip_spaces();
        let cost = self
            .pool
            .alloc_with(max, |buf| {
                let mut i = 0;
                while i < max {
                    match SubCost::strip(s) {
                        Some(v) => buf[i] = v,
                        None => break,
                    }
                    i += 1;
                }
                i
            })
            .expect("cost line exceeds pool chunk");

        let id = FixCostId(self.fix_costs.len() as u32);
        let pf = &mut self.part_functions[part_function.0 as usize];
        let next = pf.first_fix_cost.replace(id);
        pf.dirty = true;
        self.fix_costs.push(FixCost {
            part,
            source,
            pos,
            cost,
            next,
        });
    }

    /// Store a call-cost record; the call count rides in the slot behind
    /// the counters. Updates the global call-cost maxima.
    pub fn new_fix_call_cost(
        &mut self,
        part: PartId,
        source: SourceId,
        line: u32,
        addr: Addr,
        part_call: PartCallId,
        call_count: SubCost,
        s: &mut Scan,
    ) {
        let mapping = match &self.parts[part.0 as usize].sub_mapping {
            Some(m) => m.clone(),
            None => return,
        };
        let max = mapping.count();
        s.strip_spaces();
        let mut used = 0;
        let cost = self
            .pool
            .alloc_with(max + 1, |buf| {
                let mut i = 0;
                while i < max {
                    match SubCost::strip(s) {
                        Some(v) => buf[i] = v,
                        None => break,
                    }
                    i += 1;
                }
                buf[i] = call_count;
                used = i;
                i + 1
            })
            .expect("call cost line exceeds pool chunk");

        let id = FixCallCostId(self.fix_call_costs.len() as u32);
        let pc = &mut self.part_calls[part_call.0 as usize];
        let next = pc.first_fix_call.replace(id);
        pc.dirty = true;
        self.fix_call_costs.push(FixCallCost {
            part,
            source,
            line,
            addr,
            cost,
            next,
        });

        // track maxima for the loaded data
        let slice = self.pool.get(cost);
        let mut max_cost = CostArray::ZERO;
        for (i, v) in slice[..used].iter().enumerate() {
            max_cost.add_at(mapping.real_index(i), *v);
        }
        self.call_max.max(&max_cost);
        if call_count > self.max_call_count {
            self.max_call_count = call_count;
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new_fix_jump(
        &mut self,
        part: PartId,
        line: u32,
        addr: Addr,
        part_function: PartFunctionId,
        source: SourceId,
        target_line: u32,
        target_addr: Addr,
        target_function: FunctionId,
        target_source: SourceId,
        is_cond: bool,
        executed: SubCost,
        followed: SubCost,
    ) {
        let id = FixJumpId(self.fix_jumps.len() as u32);
        let pf = &mut self.part_functions[part_function.0 as usize];
        let next = pf.first_fix_jump.replace(id);
        self.fix_jumps.push(FixJump {
            part,
            line,
            addr,
            source,
            target_line,
            target_addr,
            target_function,
            target_source,
            is_cond,
            executed,
            followed,
            next,
        });
    }

    // --- Part management ---

    /// Register a part being parsed. Records reference the id while the
    /// loader fills it in; `finalize_part` or `discard_last_part` ends it.
    pub fn begin_part(&mut self, part: Part) -> PartId {
        let id = PartId(self.parts.len() as u32);
        self.parts.push(part);
        id
    }

    /// Close a fully parsed part: fix its totals from its own records.
    pub fn finalize_part(&mut self, id: PartId) {
        self.parts[id.0 as usize].totals = self.compute_part_totals(id);
        self.totals_dirty = true;
    }

    /// Throw away a half-built part (a file that failed its format
    /// check). Only the most recent part can be discarded. Its mirrors
    /// are unlinked too; cost records cannot exist yet, since a part is
    /// only rejected before its `events:` line.
    pub fn discard_last_part(&mut self, id: PartId) {
        if id.0 as usize + 1 != self.parts.len() {
            return;
        }
        loop {
            let (part, function) = match self.part_functions.last() {
                Some(pf) => (pf.part, pf.function),
                None => break,
            };
            if part != id {
                break;
            }
            let pf_id = PartFunctionId((self.part_functions.len() - 1) as u32);
            self.part_functions.pop();
            self.functions[function.0 as usize]
                .part_functions
                .retain(|&p| p != pf_id);
        }
        self.parts.pop();
    }

    /// A part's totals: the sum of its own self-cost records. The
    /// `summary:` line is advisory; the per-record sums are authoritative.
    fn compute_part_totals(&self, part: PartId) -> CostArray {
        let mut totals = CostArray::ZERO;
        for pf in &self.part_functions {
            if pf.part != part {
                continue;
            }
            totals.add(&self.part_function_self(pf));
        }
        totals
    }

    fn part_function_self(&self, pf: &PartFunction) -> CostArray {
        let mut cost = CostArray::ZERO;
        let Some(mapping) = self.parts[pf.part.0 as usize].sub_mapping.clone() else {
            return cost;
        };
        let mut cur = pf.first_fix_cost;
        while let Some(id) = cur {
            let fc = &self.fix_costs[id.0 as usize];
            for (i, v) in self.pool.get(fc.cost).iter().enumerate() {
                cost.add_at(mapping.real_index(i), *v);
            }
            cur = fc.next;
        }
        cost
    }

    /// Sort parts the way they are presented: by process, part number,
    /// thread. Ids are renumbered, so this must happen before any query
    /// hands out part ids — i.e. at the end of a load.
    pub fn sort_parts(&mut self) {
        // lazily built views may predate the records just loaded
        self.line_maps.clear();
        self.instr_maps.clear();

        let mut order: Vec<usize> = (0..self.parts.len()).collect();
        order.sort_by_key(|&i| self.parts[i].order_key());
        if order.iter().enumerate().all(|(a, &b)| a == b) {
            return;
        }

        let mut remap = vec![0u32; self.parts.len()];
        for (new, &old) in order.iter().enumerate() {
            remap[old] = new as u32;
        }

        let mut parts = std::mem::take(&mut self.parts);
        let mut reordered: Vec<Option<Part>> = parts.drain(..).map(Some).collect();
        self.parts = order
            .iter()
            .map(|&old| reordered[old].take().expect("part reordered once"))
            .collect();

        for pf in &mut self.part_functions {
            pf.part = PartId(remap[pf.part.0 as usize]);
        }
        for pc in &mut self.part_calls {
            pc.part = PartId(remap[pc.part.0 as usize]);
        }
        for fc in &mut self.fix_costs {
            fc.part = PartId(remap[fc.part.0 as usize]);
        }
        for fcc in &mut self.fix_call_costs {
            fcc.part = PartId(remap[fcc.part.0 as usize]);
        }
        for fj in &mut self.fix_jumps {
            fj.part = PartId(remap[fj.part.0 as usize]);
        }
    }

    pub fn active_mask(&self) -> Vec<bool> {
        self.parts.iter().map(|p| p.active).collect()
    }

    /// Flip part activation. When anything changed, all dynamic costs are
    /// dropped and cycle detection runs again.
    pub fn activate_parts(&mut self, active: &[bool]) -> bool {
        let mut changed = false;
        for (part, &on) in self.parts.iter_mut().zip(active) {
            if part.active != on {
                part.active = on;
                changed = true;
            }
        }
        if changed {
            self.invalidate_dynamic_cost();
            crate::cycle::detect_cycles(self);
        }
        changed
    }

    /// Active part numbers, formatted as `a-b;c` ranges over list
    /// positions (1-based).
    pub fn active_part_range(&self) -> String {
        let mut res = String::new();
        let mut range: Option<(usize, usize)> = None;
        let mut flush = |res: &mut String, r: (usize, usize)| {
            if !res.is_empty() {
                res.push(';');
            }
            if r.0 == r.1 {
                res.push_str(&r.0.to_string());
            } else {
                res.push_str(&format!("{}-{}", r.0, r.1));
            }
        };
        for (i, part) in self.parts.iter().enumerate() {
            let count = i + 1;
            if !part.active {
                continue;
            }
            range = match range {
                None => Some((count, count)),
                Some((a, b)) if b == count - 1 => Some((a, count)),
                Some(r) => {
                    flush(&mut res, r);
                    Some((count, count))
                }
            };
        }
        if let Some(r) = range {
            flush(&mut res, r);
        }
        res
    }

    // --- Invalidation ---

    /// Drop every aggregate that depends on which parts are active.
    pub fn invalidate_dynamic_cost(&mut self) {
        for o in &mut self.objects {
            o.dirty = true;
        }
        for f in &mut self.files {
            f.dirty = true;
        }
        for c in &mut self.classes {
            c.dirty = true;
        }
        for f in &mut self.functions {
            f.dirty = true;
        }
        for c in &mut self.calls {
            c.dirty = true;
        }
        for pf in &mut self.part_functions {
            pf.dirty = true;
        }
        for pc in &mut self.part_calls {
            pc.dirty = true;
        }
        for c in &mut self.cycles {
            c.dirty = true;
        }
        self.totals_dirty = true;
    }

    // --- Lazy updates ---

    fn update_part_call(&mut self, id: PartCallId) {
        if !self.part_calls[id.0 as usize].dirty {
            return;
        }
        let pc = &self.part_calls[id.0 as usize];
        let Some(mapping) = self.parts[pc.part.0 as usize].sub_mapping.clone() else {
            return;
        };
        let mut cost = CostArray::ZERO;
        let mut count = SubCost::ZERO;
        let mut cur = pc.first_fix_call;
        while let Some(fid) = cur {
            let fcc = &self.fix_call_costs[fid.0 as usize];
            let slice = self.pool.get(fcc.cost);
            for (i, v) in slice[..fcc.counter_len()].iter().enumerate() {
                cost.add_at(mapping.real_index(i), *v);
            }
            count += slice.last().copied().unwrap_or(SubCost::ZERO);
            cur = fcc.next;
        }
        let pc = &mut self.part_calls[id.0 as usize];
        pc.cost = cost;
        pc.call_count = count;
        pc.dirty = false;
    }

    fn update_part_function(&mut self, id: PartFunctionId) {
        if !self.part_functions[id.0 as usize].dirty {
            return;
        }

        let callers = self.part_functions[id.0 as usize].part_callers.clone();
        let callings = self.part_functions[id.0 as usize].part_callings.clone();
        for &pc in callers.iter().chain(callings.iter()) {
            self.update_part_call(pc);
        }

        let mut called_count = SubCost::ZERO;
        let mut calling_count = SubCost::ZERO;
        let mut called_contexts = 0;
        let mut calling_contexts = 0;
        for &pc in &callers {
            let pc = &self.part_calls[pc.0 as usize];
            if pc.cost.get(0).0 > 0 {
                called_contexts += 1;
            }
            called_count += pc.call_count;
        }
        for &pc in &callings {
            let pc = &self.part_calls[pc.0 as usize];
            if pc.cost.get(0).0 > 0 {
                calling_contexts += 1;
            }
            calling_count += pc.call_count;
        }

        let self_cost = self.part_function_self(&self.part_functions[id.0 as usize]);

        // Two derivations for inclusive cost: caller sums when callers
        // exist, otherwise calling sums plus self cost. The former breaks
        // on spontaneously entered functions, the latter on skipped-PLT
        // attribution, so pick by the presence of callers.
        let mut inclusive = CostArray::ZERO;
        if called_count.0 > 0 {
            for &pc in &callers {
                let pc = &self.part_calls[pc.0 as usize];
                if self.calls[pc.call.0 as usize].is_recursion() {
                    continue;
                }
                inclusive.add(&pc.cost);
            }
        } else {
            for &pc in &callings {
                let pc = &self.part_calls[pc.0 as usize];
                if self.calls[pc.call.0 as usize].is_recursion() {
                    continue;
                }
                inclusive.add(&pc.cost);
            }
            inclusive.add(&self_cost);
        }

        let pf = &mut self.part_functions[id.0 as usize];
        pf.called_count = called_count;
        pf.calling_count = calling_count;
        pf.called_contexts = called_contexts;
        pf.calling_contexts = calling_contexts;
        pf.self_cost = self_cost;
        pf.inclusive = inclusive;
        pf.dirty = false;
    }

    pub fn update_call(&mut self, id: CallId) {
        if !self.calls[id.0 as usize].dirty {
            return;
        }
        let part_calls = self.calls[id.0 as usize].part_calls.clone();
        let mut cost = CostArray::ZERO;
        let mut count = SubCost::ZERO;
        for &pc_id in &part_calls {
            self.update_part_call(pc_id);
            let pc = &self.part_calls[pc_id.0 as usize];
            if !self.parts[pc.part.0 as usize].active {
                continue;
            }
            cost.add(&pc.cost);
            count += pc.call_count;
        }
        let call = &mut self.calls[id.0 as usize];
        call.cost = cost;
        call.call_count = count;
        call.dirty = false;
    }

    pub fn update_function(&mut self, id: FunctionId) {
        if !self.functions[id.0 as usize].dirty {
            return;
        }
        // clear first: edges reach back here while we recompute
        self.functions[id.0 as usize].dirty = false;

        let callers = self.functions[id.0 as usize].callers.clone();
        let callings = self.functions[id.0 as usize].callings.clone();
        for &c in callers.iter().chain(callings.iter()) {
            self.update_call(c);
        }

        let mut called_count = SubCost::ZERO;
        let mut calling_count = SubCost::ZERO;
        let mut called_contexts = 0;
        let mut calling_contexts = 0;
        for &c in &callers {
            let call = &self.calls[c.0 as usize];
            if call.cost.get(0).0 > 0 {
                called_contexts += 1;
            }
            called_count += call.call_count;
        }
        for &c in &callings {
            let call = &self.calls[c.0 as usize];
            if call.cost.get(0).0 > 0 {
                calling_contexts += 1;
            }
            calling_count += call.call_count;
        }

        let part_functions = self.functions[id.0 as usize].part_functions.clone();
        for &pf in &part_functions {
            self.update_part_function(pf);
        }

        let cycle = self.functions[id.0 as usize].cycle;
        let mut self_cost = CostArray::ZERO;
        let mut inclusive = CostArray::ZERO;

        for &pf_id in &part_functions {
            let pf = &self.part_functions[pf_id.0 as usize];
            if !self.parts[pf.part.0 as usize].active {
                continue;
            }
            self_cost.add(&pf.self_cost);
            if cycle.is_none() {
                inclusive.add(&pf.inclusive);
            }
        }

        if cycle.is_some() {
            // cycle member: inclusive is self plus the calls that leave
            // the cycle; inner-cycle calls are skipped
            for &c in &callings {
                let call = &self.calls[c.0 as usize];
                if self.functions[call.called.0 as usize].cycle == cycle {
                    continue;
                }
                inclusive.add(&call.cost);
            }
            inclusive.add(&self_cost);
        }

        let f = &mut self.functions[id.0 as usize];
        f.called_count = called_count;
        f.calling_count = calling_count;
        f.called_contexts = called_contexts;
        f.calling_contexts = calling_contexts;
        f.self_cost = self_cost;
        f.inclusive = inclusive;
    }

    pub fn update_cycle(&mut self, id: CycleId) {
        if !self.cycles[id.0 as usize].dirty {
            return;
        }
        self.cycles[id.0 as usize].dirty = false;

        let members = self.cycles[id.0 as usize].members.clone();
        let callers = self.cycles[id.0 as usize].callers.clone();

        // self cost: sum of member self costs
        // inclusive: sum over the synthetic member calls, each carrying
        // the member's inclusive cost
        let mut self_cost = CostArray::ZERO;
        let mut inclusive = CostArray::ZERO;
        for &m in &members {
            self.update_function(m);
            let f = &self.functions[m.0 as usize];
            self_cost.add(&f.self_cost);
            inclusive.add(&f.inclusive);
        }

        let mut called_count = SubCost::ZERO;
        for &c in &callers {
            self.update_call(c);
            called_count += self.calls[c.0 as usize].call_count;
        }

        let cy = &mut self.cycles[id.0 as usize];
        cy.self_cost = self_cost;
        cy.inclusive = inclusive;
        cy.called_count = called_count;
    }

    fn update_object(&mut self, id: ObjectId) {
        if !self.objects[id.0 as usize].dirty {
            return;
        }
        let functions = self.objects[id.0 as usize].functions.clone();
        let (self_cost, inclusive) = self.sum_over_functions(&functions);
        let o = &mut self.objects[id.0 as usize];
        o.self_cost = self_cost;
        o.inclusive = inclusive;
        o.dirty = false;
    }

    fn update_file(&mut self, id: FileId) {
        if !self.files[id.0 as usize].dirty {
            return;
        }
        let functions = self.files[id.0 as usize].functions.clone();
        let (self_cost, inclusive) = self.sum_over_functions(&functions);
        let f = &mut self.files[id.0 as usize];
        f.self_cost = self_cost;
        f.inclusive = inclusive;
        f.dirty = false;
    }

    fn update_class(&mut self, id: ClassId) {
        if !self.classes[id.0 as usize].dirty {
            return;
        }
        let functions = self.classes[id.0 as usize].functions.clone();
        let (self_cost, inclusive) = self.sum_over_functions(&functions);
        let c = &mut self.classes[id.0 as usize];
        c.self_cost = self_cost;
        c.inclusive = inclusive;
        c.dirty = false;
    }

    fn sum_over_functions(&mut self, functions: &[FunctionId]) -> (CostArray, CostArray) {
        let mut self_cost = CostArray::ZERO;
        let mut inclusive = CostArray::ZERO;
        for &f in functions {
            let pfs = self.functions[f.0 as usize].part_functions.clone();
            for pf_id in pfs {
                self.update_part_function(pf_id);
                let pf = &self.part_functions[pf_id.0 as usize];
                if !self.parts[pf.part.0 as usize].active {
                    continue;
                }
                self_cost.add(&pf.self_cost);
                inclusive.add(&pf.inclusive);
            }
        }
        (self_cost, inclusive)
    }

    fn update_totals(&mut self) {
        if !self.totals_dirty {
            return;
        }
        self.totals_all.clear();
        self.totals_active.clear();
        for part in &self.parts {
            self.totals_all.add(&part.totals);
            if part.active {
                self.totals_active.add(&part.totals);
            }
        }
        self.totals_dirty = false;
    }

    // --- Cost accessors (recompute on demand) ---

    pub fn totals(&mut self) -> &CostArray {
        self.update_totals();
        &self.totals_active
    }

    pub fn totals_all_parts(&mut self) -> &CostArray {
        self.update_totals();
        &self.totals_all
    }

    pub fn function_self_cost(&mut self, id: FunctionId) -> &CostArray {
        self.update_function(id);
        &self.functions[id.0 as usize].self_cost
    }

    pub fn function_inclusive(&mut self, id: FunctionId) -> &CostArray {
        self.update_function(id);
        &self.functions[id.0 as usize].inclusive
    }

    pub fn function_called_count(&mut self, id: FunctionId) -> SubCost {
        self.update_function(id);
        self.functions[id.0 as usize].called_count
    }

    pub fn call_cost(&mut self, id: CallId) -> (&CostArray, SubCost) {
        self.update_call(id);
        let call = &self.calls[id.0 as usize];
        (&call.cost, call.call_count)
    }

    pub fn object_self_cost(&mut self, id: ObjectId) -> &CostArray {
        self.update_object(id);
        &self.objects[id.0 as usize].self_cost
    }

    pub fn file_self_cost(&mut self, id: FileId) -> &CostArray {
        self.update_file(id);
        &self.files[id.0 as usize].self_cost
    }

    pub fn class_self_cost(&mut self, id: ClassId) -> &CostArray {
        self.update_class(id);
        &self.classes[id.0 as usize].self_cost
    }

    pub fn cycle_self_cost(&mut self, id: CycleId) -> &CostArray {
        self.update_cycle(id);
        &self.cycles[id.0 as usize].self_cost
    }

    pub fn cycle_inclusive(&mut self, id: CycleId) -> &CostArray {
        self.update_cycle(id);
        &self.cycles[id.0 as usize].inclusive
    }

    pub fn sub_cost(&mut self, et: EventTypeId) -> SubCost {
        self.update_totals();
        self.event_types.sub_cost(et, &self.totals_active)
    }

    /// Source-file self cost: the sum over the source's lines.
    pub fn source_self_cost(&mut self, id: SourceId) -> CostArray {
        let active = self.active_mask();
        let mut cost = CostArray::ZERO;
        for line in self.line_map(id).values() {
            cost.add(&line.cost(&active));
        }
        cost
    }

    // --- Naming ---

    pub fn function_name(&self, id: FunctionId) -> &str {
        let f = &self.functions[id.0 as usize];
        if f.name.is_empty() {
            "(unknown)"
        } else {
            &f.name
        }
    }

    /// Display name; members of a collapsed cycle carry the cycle suffix.
    pub fn function_pretty_name(&self, id: FunctionId) -> String {
        let f = &self.functions[id.0 as usize];
        let name = if f.name.is_empty() {
            "(unknown)"
        } else {
            &f.name
        };
        match f.cycle {
            Some(c) => format!("{} {}", name, self.cycles[c.0 as usize].name()),
            None => name.to_string(),
        }
    }
}
