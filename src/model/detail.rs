//! Line- and instruction-level detail, built lazily from fixed records.
//!
//! The parser only stores fixed records; the per-line and per-instruction
//! views are materialized on first request by replaying those records.
//! Per-part contributions are kept inline so that toggling active parts
//! needs no refill.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::cost::{CostArray, JumpCost};
use crate::subcost::{Addr, SubCost};

use super::{CallId, FunctionId, PartId, ProfileData, SourceId};

/// Cost observed on one source line.
#[derive(Debug, Default)]
pub struct Line {
    pub parts: Vec<(PartId, CostArray)>,
    pub calls: Vec<LineCall>,
    pub jumps: Vec<LineJump>,
}

/// Calls leaving one source line through one call edge.
#[derive(Debug)]
pub struct LineCall {
    pub call: CallId,
    pub parts: Vec<(PartId, CostArray, SubCost)>,
}

/// A jump leaving one source line.
#[derive(Debug)]
pub struct LineJump {
    pub to_source: SourceId,
    pub to_line: u32,
    pub is_cond: bool,
    pub parts: Vec<(PartId, JumpCost)>,
}

pub type LineMap = BTreeMap<u32, Line>;

/// Cost observed at one instruction address.
#[derive(Debug, Default)]
pub struct Instr {
    pub line: u32,
    pub parts: Vec<(PartId, CostArray)>,
    pub calls: Vec<InstrCall>,
    pub jumps: Vec<InstrJump>,
}

/// Calls leaving one instruction through one call edge.
#[derive(Debug)]
pub struct InstrCall {
    pub call: CallId,
    pub parts: Vec<(PartId, CostArray, SubCost)>,
}

/// A jump leaving one instruction.
#[derive(Debug)]
pub struct InstrJump {
    pub to_function: FunctionId,
    pub to_addr: Addr,
    pub is_cond: bool,
    pub parts: Vec<(PartId, JumpCost)>,
}

pub type InstrMap = BTreeMap<Addr, Instr>;

impl Line {
    /// Summed cost over the given active parts.
    pub fn cost(&self, active: &[bool]) -> CostArray {
        let mut c = CostArray::ZERO;
        for (part, cost) in &self.parts {
            if active[part.0 as usize] {
                c.add(cost);
            }
        }
        c
    }
}

impl Instr {
    pub fn cost(&self, active: &[bool]) -> CostArray {
        let mut c = CostArray::ZERO;
        for (part, cost) in &self.parts {
            if active[part.0 as usize] {
                c.add(cost);
            }
        }
        c
    }
}

fn add_part_cost(parts: &mut Vec<(PartId, CostArray)>, part: PartId, cost: &CostArray) {
    match parts.iter_mut().find(|(p, _)| *p == part) {
        Some((_, c)) => c.add(cost),
        None => parts.push((part, cost.clone())),
    }
}

fn add_part_call(
    parts: &mut Vec<(PartId, CostArray, SubCost)>,
    part: PartId,
    cost: &CostArray,
    count: SubCost,
) {
    match parts.iter_mut().find(|(p, _, _)| *p == part) {
        Some((_, c, n)) => {
            c.add(cost);
            *n += count;
        }
        None => parts.push((part, cost.clone(), count)),
    }
}

fn add_part_jump(parts: &mut Vec<(PartId, JumpCost)>, part: PartId, jump: JumpCost) {
    match parts.iter_mut().find(|(p, _)| *p == part) {
        Some((_, j)) => j.add(&jump),
        None => parts.push((part, jump)),
    }
}

impl ProfileData {
    /// The per-line view of one function source, filling it on first use.
    pub fn line_map(&mut self, source: SourceId) -> &LineMap {
        if !self.line_maps.contains_key(&source) {
            let map = self.fill_line_map(source);
            self.line_maps.insert(source, map);
        }
        &self.line_maps[&source]
    }

    fn fill_line_map(&self, source: SourceId) -> LineMap {
        let mut map = LineMap::new();
        let function = self.sources[source.0 as usize].function;

        for &pf_id in &self.functions[function.0 as usize].part_functions {
            let pf = &self.part_functions[pf_id.0 as usize];
            let mapping = match &self.parts[pf.part.0 as usize].sub_mapping {
                Some(m) => m.clone(),
                None => continue,
            };

            let mut cur = pf.first_fix_cost;
            while let Some(id) = cur {
                let fc = &self.fix_costs[id.0 as usize];
                cur = fc.next;
                if fc.source != source || fc.pos.from_line == 0 {
                    continue;
                }
                let mut cost = CostArray::ZERO;
                for (i, v) in self.pool.get(fc.cost).iter().enumerate() {
                    cost.add_at(mapping.real_index(i), *v);
                }
                let line = map.entry(fc.pos.from_line).or_default();
                add_part_cost(&mut line.parts, fc.part, &cost);
            }

            let mut cur = pf.first_fix_jump;
            while let Some(id) = cur {
                let fj = &self.fix_jumps[id.0 as usize];
                cur = fj.next;
                if fj.source != source || fj.line == 0 {
                    continue;
                }
                // jumps to the same or the following line carry no flow
                // information worth keeping
                if fj.line == fj.target_line || fj.line + 1 == fj.target_line {
                    continue;
                }
                let line = map.entry(fj.line).or_default();
                let at = line
                    .jumps
                    .iter()
                    .position(|j| {
                        j.to_source == fj.target_source && j.to_line == fj.target_line
                    })
                    .unwrap_or_else(|| {
                        line.jumps.push(LineJump {
                            to_source: fj.target_source,
                            to_line: fj.target_line,
                            is_cond: fj.is_cond,
                            parts: Vec::new(),
                        });
                        line.jumps.len() - 1
                    });
                add_part_jump(
                    &mut line.jumps[at].parts,
                    fj.part,
                    JumpCost {
                        executed: fj.executed,
                        followed: fj.followed,
                    },
                );
            }

            for &pc_id in &pf.part_callings {
                let pc = &self.part_calls[pc_id.0 as usize];
                let mut cur = pc.first_fix_call;
                while let Some(id) = cur {
                    let fcc = &self.fix_call_costs[id.0 as usize];
                    cur = fcc.next;
                    if fcc.source != source || fcc.line == 0 {
                        continue;
                    }
                    let slice = self.pool.get(fcc.cost);
                    let mut cost = CostArray::ZERO;
                    for (i, v) in slice[..fcc.counter_len()].iter().enumerate() {
                        cost.add_at(mapping.real_index(i), *v);
                    }
                    let count = slice.last().copied().unwrap_or(SubCost::ZERO);
                    let line = map.entry(fcc.line).or_default();
                    let at = line
                        .calls
                        .iter()
                        .position(|c| c.call == pc.call)
                        .unwrap_or_else(|| {
                            line.calls.push(LineCall {
                                call: pc.call,
                                parts: Vec::new(),
                            });
                            line.calls.len() - 1
                        });
                    add_part_call(&mut line.calls[at].parts, fcc.part, &cost, count);
                }
            }
        }

        map
    }

    /// The per-instruction view of one function, filling it on first use.
    pub fn instr_map(&mut self, function: FunctionId) -> &InstrMap {
        if !self.instr_maps.contains_key(&function) {
            let map = self.fill_instr_map(function);
            self.instr_maps.insert(function, map);
        }
        &self.instr_maps[&function]
    }

    fn fill_instr_map(&self, function: FunctionId) -> InstrMap {
        let mut map = InstrMap::new();

        for &pf_id in &self.functions[function.0 as usize].part_functions {
            let pf = &self.part_functions[pf_id.0 as usize];
            let mapping = match &self.parts[pf.part.0 as usize].sub_mapping {
                Some(m) => m.clone(),
                None => continue,
            };

            let mut cur = pf.first_fix_cost;
            while let Some(id) = cur {
                let fc = &self.fix_costs[id.0 as usize];
                cur = fc.next;
                if fc.pos.from_addr.0 == 0 {
                    continue;
                }
                let mut cost = CostArray::ZERO;
                for (i, v) in self.pool.get(fc.cost).iter().enumerate() {
                    cost.add_at(mapping.real_index(i), *v);
                }
                let instr = map.entry(fc.pos.from_addr).or_default();
                instr.line = fc.pos.from_line;
                add_part_cost(&mut instr.parts, fc.part, &cost);
            }

            let mut cur = pf.first_fix_jump;
            while let Some(id) = cur {
                let fj = &self.fix_jumps[id.0 as usize];
                cur = fj.next;
                if fj.addr.0 == 0 {
                    continue;
                }
                let instr = map.entry(fj.addr).or_default();
                if instr.line == 0 {
                    instr.line = fj.line;
                }
                let at = instr
                    .jumps
                    .iter()
                    .position(|j| {
                        j.to_function == fj.target_function && j.to_addr == fj.target_addr
                    })
                    .unwrap_or_else(|| {
                        instr.jumps.push(InstrJump {
                            to_function: fj.target_function,
                            to_addr: fj.target_addr,
                            is_cond: fj.is_cond,
                            parts: Vec::new(),
                        });
                        instr.jumps.len() - 1
                    });
                add_part_jump(
                    &mut instr.jumps[at].parts,
                    fj.part,
                    JumpCost {
                        executed: fj.executed,
                        followed: fj.followed,
                    },
                );
            }

            for &pc_id in &pf.part_callings {
                let pc = &self.part_calls[pc_id.0 as usize];
                let mut cur = pc.first_fix_call;
                while let Some(id) = cur {
                    let fcc = &self.fix_call_costs[id.0 as usize];
                    cur = fcc.next;
                    if fcc.addr.0 == 0 {
                        continue;
                    }
                    let slice = self.pool.get(fcc.cost);
                    let mut cost = CostArray::ZERO;
                    for (i, v) in slice[..fcc.counter_len()].iter().enumerate() {
                        cost.add_at(mapping.real_index(i), *v);
                    }
                    let count = slice.last().copied().unwrap_or(SubCost::ZERO);
                    let instr = map.entry(fcc.addr).or_default();
                    if instr.line == 0 {
                        instr.line = fcc.line;
                    }
                    let at = instr
                        .calls
                        .iter()
                        .position(|c| c.call == pc.call)
                        .unwrap_or_else(|| {
                            instr.calls.push(InstrCall {
                                call: pc.call,
                                parts: Vec::new(),
                            });
                            instr.calls.len() - 1
                        });
                    add_part_call(&mut instr.calls[at].parts, fcc.part, &cost, count);
                }
            }
        }

        map
    }

    /// Whether a line shows anything for the given real event column:
    /// own cost, an outgoing call, or an executed jump.
    pub fn line_has_cost(&mut self, source: SourceId, lineno: u32, real_index: usize) -> bool {
        let active = self.active_mask();
        let Some(line) = self.line_map(source).get(&lineno) else {
            return false;
        };
        if line.cost(&active).get(real_index).0 > 0 {
            return true;
        }
        for call in &line.calls {
            for (part, cost, _) in &call.parts {
                if active[part.0 as usize] && cost.get(real_index).0 > 0 {
                    return true;
                }
            }
        }
        for jump in &line.jumps {
            for (part, jc) in &jump.parts {
                if active[part.0 as usize] && jc.executed.0 > 0 {
                    return true;
                }
            }
        }
        false
    }

    pub fn instr_has_cost(&mut self, function: FunctionId, addr: Addr, real_index: usize) -> bool {
        let active = self.active_mask();
        let Some(instr) = self.instr_map(function).get(&addr) else {
            return false;
        };
        if instr.cost(&active).get(real_index).0 > 0 {
            return true;
        }
        for call in &instr.calls {
            for (part, cost, _) in &call.parts {
                if active[part.0 as usize] && cost.get(real_index).0 > 0 {
                    return true;
                }
            }
        }
        for jump in &instr.jumps {
            for (part, jc) in &jump.parts {
                if active[part.0 as usize] && jc.executed.0 > 0 {
                    return true;
                }
            }
        }
        false
    }
}

/// Order jumps by their smaller endpoint; at the same position, a jump
/// arriving there sorts before one leaving there. This keeps nested jump
/// arcs reproducibly ordered for annotation output.
pub fn line_jump_order(a: &(u32, u32), b: &(u32, u32)) -> Ordering {
    let (a_low, a_high) = (a.0.min(a.1), a.0.max(a.1));
    let (b_low, b_high) = (b.0.min(b.1), b.0.max(b.1));
    if a_low != b_low {
        return a_low.cmp(&b_low);
    }
    if a_low == a.1 {
        return Ordering::Less;
    }
    if b_low == b.1 {
        return Ordering::Greater;
    }
    a_high.cmp(&b_high)
}

/// Address-axis variant of [`line_jump_order`].
pub fn instr_jump_order(a: &(Addr, Addr), b: &(Addr, Addr)) -> Ordering {
    let (a_low, a_high) = (a.0.min(a.1), a.0.max(a.1));
    let (b_low, b_high) = (b.0.min(b.1), b.0.max(b.1));
    if a_low != b_low {
        return a_low.cmp(&b_low);
    }
    if a_low == a.1 {
        return Ordering::Less;
    }
    if b_low == b.1 {
        return Ordering::Greater;
    }
    a_high.cmp(&b_high)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_jump_order() {
        // (from, to) pairs
        let mut jumps = vec![(20, 5), (5, 10), (8, 3)];
        jumps.sort_by(line_jump_order);
        // lows: 5, 5, 3 -> (8,3) first; then the jump ENDING at 5 before
        // the one starting at 5
        assert_eq!(jumps, vec![(8, 3), (20, 5), (5, 10)]);
    }

    #[test]
    fn test_instr_jump_order() {
        let mut jumps = vec![
            (Addr(0x30), Addr(0x10)),
            (Addr(0x10), Addr(0x20)),
        ];
        jumps.sort_by(instr_jump_order);
        assert_eq!(jumps[0], (Addr(0x30), Addr(0x10)));
    }
}
