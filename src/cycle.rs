//! Detection of mutual recursion in the call graph.
//!
//! Non-trivial strongly connected components are collapsed into
//! `FunctionCycle` nodes so that inclusive costs stay meaningful in the
//! presence of mutual recursion. Expensive-enough call edges form the
//! graph; cheap ones are cut away by a configurable heuristic.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::model::entity::FunctionCycle;
use crate::model::{CycleId, FunctionId, ProfileData};
use crate::subcost::SubCost;

/// Rebuild all cycle nodes from scratch. Runs after every load and after
/// every change to the active part set; with `show_cycles` off it only
/// clears the previous state.
pub fn detect_cycles(data: &mut ProfileData) {
    for f in &mut data.functions {
        f.cycle = None;
    }
    data.cycles.clear();
    data.invalidate_dynamic_cost();

    if !data.config.show_cycles {
        return;
    }

    let n = data.functions.len();
    let mut graph = DiGraph::<FunctionId, ()>::with_capacity(n, data.calls.len());
    let nodes: Vec<NodeIndex> = (0..n)
        .map(|i| graph.add_node(FunctionId(i as u32)))
        .collect();

    // Cut heuristic, per calling function: calls below a fraction of the
    // function's base cost cannot open a cycle. The base is the most
    // expensive incoming call, or the function's own inclusive cost when
    // nothing calls it. Column 0 is the primary event.
    for i in 0..n {
        let callers = data.functions[i].callers.clone();
        let mut base = SubCost::ZERO;
        if callers.is_empty() {
            base = data.function_inclusive(FunctionId(i as u32)).get(0);
        } else {
            for c in callers {
                let (cost, _) = data.call_cost(c);
                let v = cost.get(0);
                if v > base {
                    base = v;
                }
            }
        }
        let cut = (base.0 as f64 * data.config.cycle_cut + 0.5) as u64;

        let callings = data.functions[i].callings.clone();
        for c in callings {
            let (cost, _) = data.call_cost(c);
            if cost.get(0).0 < cut {
                continue;
            }
            let called = data.calls[c.0 as usize].called;
            graph.add_edge(nodes[i], nodes[called.0 as usize], ());
        }
    }

    // Simple self-recursion (a component of one) is never collapsed.
    let mut cycle_no = 0;
    for scc in tarjan_scc(&graph) {
        if scc.len() < 2 {
            continue;
        }
        cycle_no += 1;

        let mut members: Vec<FunctionId> = scc.iter().map(|&ni| graph[ni]).collect();
        members.sort();
        let base = members[0];

        let id = CycleId(data.cycles.len() as u32);
        let mut cycle = FunctionCycle::new(base, cycle_no);

        // the cycle takes over all callers from outside; the calls of
        // its members stay where they are
        for &m in &members {
            for &c in &data.functions[m.0 as usize].callers {
                let caller = data.calls[c.0 as usize].caller;
                if !members.contains(&caller) {
                    cycle.callers.push(c);
                }
            }
        }
        cycle.members = members;

        for &m in &cycle.members {
            data.functions[m.0 as usize].cycle = Some(id);
        }
        data.cycles.push(cycle);
    }

    // collapsed cycles change every inclusive cost
    data.invalidate_dynamic_cost();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::Part;

    /// Wire a small graph by hand: call edges with fixed costs, plus
    /// per-function self costs.
    fn build(
        edges: &[(&str, &str, u64, u64)],
        selfs: &[(&str, u64)],
        config: Config,
    ) -> (ProfileData, Vec<FunctionId>) {
        let mut data = ProfileData::new(config);
        let part_id = data.begin_part(Part::new("test".into()));
        let mapping = data.event_types.sub_mapping("Ir", true).unwrap();
        data.parts[part_id.0 as usize].sub_mapping = Some(mapping);

        let obj = data.object("prog");
        let file = data.file("a.c");

        let mut ids = Vec::new();
        for &(from, to, cost, count) in edges {
            let f = data.function(from, file, obj);
            let t = data.function(to, file, obj);
            if !ids.contains(&f) {
                ids.push(f);
            }
            if !ids.contains(&t) {
                ids.push(t);
            }
            let f_pf = data.part_function(f, part_id);
            let t_pf = data.part_function(t, part_id);
            let call = data.call(f, t);
            let pc = data.part_call(call, part_id, f_pf, t_pf);
            let source = data.function_source(f, file);
            let mut line = crate::scan::Scan::new(format!("{cost}").leak().as_bytes());
            data.new_fix_call_cost(
                part_id,
                source,
                1,
                crate::subcost::Addr(0),
                pc,
                SubCost(count),
                &mut line,
            );
        }
        for &(name, self_cost) in selfs {
            let f = data.function(name, file, obj);
            let pf = data.part_function(f, part_id);
            let source = data.function_source(f, file);
            let pos = crate::model::PositionSpec {
                from_line: 1,
                to_line: 1,
                ..Default::default()
            };
            let mut line = crate::scan::Scan::new(format!("{self_cost}").leak().as_bytes());
            data.new_fix_cost(part_id, source, pos, pf, &mut line);
        }
        data.finalize_part(part_id);
        (data, ids)
    }

    #[test]
    fn test_triangle_collapses() {
        // A -> B -> C -> A with an outside caller D and an outside
        // callee E, so member inclusive costs differ from self costs
        let (mut data, _) = build(
            &[
                ("A", "B", 100, 1),
                ("B", "C", 90, 1),
                ("C", "A", 80, 1),
                ("D", "A", 100, 1),
                ("C", "E", 40, 1),
            ],
            &[("A", 10), ("B", 20), ("C", 30), ("D", 5)],
            Config::default(),
        );
        detect_cycles(&mut data);

        assert_eq!(data.cycles.len(), 1);
        assert_eq!(data.cycles[0].members.len(), 3);
        assert_eq!(data.cycles[0].cycle_no, 1);

        let a = data.function_by_name("A").unwrap();
        let b = data.function_by_name("B").unwrap();
        let c = data.function_by_name("C").unwrap();
        let d = data.function_by_name("D").unwrap();
        let e = data.function_by_name("E").unwrap();
        assert_eq!(data.functions[a.0 as usize].cycle, Some(CycleId(0)));
        assert_eq!(data.functions[b.0 as usize].cycle, Some(CycleId(0)));
        assert_eq!(data.functions[c.0 as usize].cycle, Some(CycleId(0)));
        assert_eq!(data.functions[d.0 as usize].cycle, None);
        assert_eq!(data.functions[e.0 as usize].cycle, None);

        // only the outside edge D -> A is taken over as cycle caller
        assert_eq!(data.cycles[0].callers.len(), 1);
        let caller_edge = &data.calls[data.cycles[0].callers[0].0 as usize];
        assert_eq!(caller_edge.caller, d);

        // member inclusive: in-cycle calls are skipped, calls leaving
        // the cycle count, self is added
        assert_eq!(data.function_inclusive(a).get(0), SubCost(10));
        assert_eq!(data.function_inclusive(b).get(0), SubCost(20));
        assert_eq!(data.function_inclusive(c).get(0), SubCost(30 + 40));

        // cycle self: sum of member self costs (10 + 20 + 30);
        // cycle inclusive: sum over the synthetic member calls, i.e.
        // the member inclusives (10 + 20 + 70)
        assert_eq!(data.cycle_self_cost(CycleId(0)).get(0), SubCost(60));
        assert_eq!(data.cycle_inclusive(CycleId(0)).get(0), SubCost(100));
        data.update_cycle(CycleId(0));
        assert_eq!(data.cycles[0].called_count, SubCost(1));
    }

    #[test]
    fn test_self_recursion_is_no_cycle() {
        let (mut data, _) = build(&[("A", "A", 100, 5), ("A", "B", 50, 1)], &[], Config::default());
        detect_cycles(&mut data);
        assert!(data.cycles.is_empty());
        let a = data.function_by_name("A").unwrap();
        assert_eq!(data.functions[a.0 as usize].cycle, None);
    }

    #[test]
    fn test_show_cycles_off() {
        let config = Config {
            show_cycles: false,
            ..Config::default()
        };
        let (mut data, _) = build(&[("A", "B", 10, 1), ("B", "A", 10, 1)], &[], config);
        detect_cycles(&mut data);
        assert!(data.cycles.is_empty());
    }

    #[test]
    fn test_cost_cut_prunes_cheap_backlink() {
        // B -> A is far below the cut fraction of B's cost, so no cycle
        let config = Config {
            cycle_cut: 0.5,
            ..Config::default()
        };
        let (mut data, _) = build(&[("A", "B", 1000, 1), ("B", "A", 1, 1)], &[], config);
        detect_cycles(&mut data);
        assert!(data.cycles.is_empty());
    }

    #[test]
    fn test_detection_idempotent() {
        let (mut data, _) = build(
            &[("A", "B", 100, 1), ("B", "A", 90, 1), ("C", "A", 10, 1)],
            &[],
            Config::default(),
        );
        detect_cycles(&mut data);
        let first: Vec<(u32, Vec<FunctionId>)> = data
            .cycles
            .iter()
            .map(|c| (c.cycle_no, c.members.clone()))
            .collect();
        detect_cycles(&mut data);
        let second: Vec<(u32, Vec<FunctionId>)> = data
            .cycles
            .iter()
            .map(|c| (c.cycle_no, c.members.clone()))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_two_separate_cycles_numbered() {
        let (mut data, _) = build(
            &[
                ("A", "B", 100, 1),
                ("B", "A", 90, 1),
                ("X", "Y", 100, 1),
                ("Y", "X", 90, 1),
            ],
            &[],
            Config::default(),
        );
        detect_cycles(&mut data);
        assert_eq!(data.cycles.len(), 2);
        let nos: Vec<u32> = data.cycles.iter().map(|c| c.cycle_no).collect();
        assert_eq!(nos, vec![1, 2]);
    }
}
