//! End-to-end tests: write a dump file, load it, query the graph.

use std::fs;
use std::path::PathBuf;

use callview::event::EventTypeId;
use callview::logger::CollectingLogger;
use callview::model::ProfileData;
use callview::query::{search, Found, SearchKind};
use callview::subcost::SubCost;
use callview::Config;

/// Write `content` under a callgrind-ish name and load it.
fn load_dump(content: &str) -> (ProfileData, CollectingLogger) {
    load_dump_with(content, Config::default())
}

fn load_dump_with(content: &str, config: Config) -> (ProfileData, CollectingLogger) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("callgrind.out.7");
    fs::write(&path, content).expect("write dump");

    let mut logger = CollectingLogger::default();
    let data = callview::load(&[path], config, &mut logger);
    (data, logger)
}

fn ir(data: &ProfileData) -> EventTypeId {
    data.event_types.type_by_name("Ir").expect("Ir type")
}

// ── Scenario: minimal single function ──

#[test]
fn test_minimal_single_function() {
    let (mut data, logger) = load_dump(
        "positions: line\n\
         events: Ir\n\
         fl=a.c\n\
         fn=main\n\
         10 100\n",
    );

    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);
    assert_eq!(data.parts.len(), 1);
    assert_eq!(data.files.iter().filter(|f| f.name == "a.c").count(), 1);

    let main = data.function_by_name("main").expect("main exists");
    assert_eq!(data.function_self_cost(main).get(0), SubCost(100));
    assert_eq!(data.function_inclusive(main).get(0), SubCost(100));
    assert!(data.functions[main.0 as usize].callers.is_empty());
    assert_eq!(data.functions[main.0 as usize].cycle, None);
    assert_eq!(data.totals().get(0), SubCost(100));
}

// ── Scenario: position deltas ──

#[test]
fn test_position_deltas() {
    let (mut data, logger) = load_dump(
        "positions: line\n\
         events: Ir Dr\n\
         fl=a.c\n\
         fn=main\n\
         10 100 10\n\
         +1 50 5\n\
         -1 0 1\n",
    );

    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);
    let main = data.function_by_name("main").unwrap();
    let source = data.functions[main.0 as usize].sources[0];
    let active = data.active_mask();
    let map = data.line_map(source);

    let line10 = map.get(&10).expect("line 10").cost(&active);
    assert_eq!(line10.get(0), SubCost(100));
    assert_eq!(line10.get(1), SubCost(11));

    let line11 = map.get(&11).expect("line 11").cost(&active);
    assert_eq!(line11.get(0), SubCost(50));
    assert_eq!(line11.get(1), SubCost(5));

    let totals = data.totals();
    assert_eq!(totals.get(0), SubCost(150));
    assert_eq!(totals.get(1), SubCost(16));
}

// ── Scenario: compressed strings and a call ──

#[test]
fn test_compressed_strings_and_call() {
    let (mut data, logger) = load_dump(
        "events: Ir\n\
         ob=(1) prog\n\
         fl=(1) a.c\n\
         fn=(1) caller\n\
         10 10\n\
         cfn=(2) callee\n\
         calls=3 20\n\
         10 30\n\
         fn=(1)\n\
         11 5\n",
    );

    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);

    let caller = data.function_by_name("caller").expect("caller");
    let callee = data.function_by_name("callee").expect("callee");

    let call_id = data.functions[caller.0 as usize].callings[0];
    let (cost, count) = data.call_cost(call_id);
    assert_eq!(cost.get(0), SubCost(30));
    assert_eq!(count, SubCost(3));

    // back-reference "(1)" resolved to the same function: cost added up
    assert_eq!(data.function_self_cost(caller).get(0), SubCost(15));
    // no callers: inclusive is callings plus self
    assert_eq!(data.function_inclusive(caller).get(0), SubCost(45));
    assert!(data.function_inclusive(callee).get(0) >= SubCost(30));
    assert_eq!(data.function_called_count(callee), SubCost(3));
}

// ── Scenario: derived event type ──

#[test]
fn test_derived_event_formula() {
    let (mut data, logger) = load_dump(
        "event: L1m = I1mr + D1mr + D1mw\n\
         events: Ir I1mr D1mr D1mw\n\
         fl=a.c\n\
         fn=main\n\
         1 1 2 3 4\n",
    );

    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);
    let l1m = data.event_types.type_by_name("L1m").expect("L1m derived");
    assert_eq!(data.sub_cost(l1m), SubCost(9));
    let ir = ir(&data);
    assert_eq!(data.sub_cost(ir), SubCost(1));
}

// ── Scenario: two parts, threads, activation ──

#[test]
fn test_two_file_merge_with_threads() {
    let dir = tempfile::tempdir().expect("temp dir");
    let base = dir.path().join("prog.1");
    fs::write(
        dir.path().join("prog.1-2"),
        "events: Ir\nfl=a.c\nfn=main\n10 100\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("prog.1-3"),
        "events: Ir\nfl=a.c\nfn=main\n10 50\n",
    )
    .unwrap();

    let mut logger = CollectingLogger::default();
    let mut data = callview::load(&[base], Config::default(), &mut logger);

    assert_eq!(data.parts.len(), 2);
    let mut threads: Vec<u32> = data.parts.iter().map(|p| p.thread_id).collect();
    threads.sort();
    assert_eq!(threads, vec![2, 3]);
    assert!(data.parts.iter().all(|p| p.process_id == 1));
    assert_eq!(data.active_part_range(), "1-2");

    let sum: u64 = data.parts.iter().map(|p| p.totals.get(0).0).sum();
    assert_eq!(sum, 150);
    assert_eq!(data.totals().get(0), SubCost(150));

    let main = data.function_by_name("main").unwrap();
    assert_eq!(data.function_self_cost(main).get(0), SubCost(150));
}

// ── Scenario: cycle detection ──

fn cycle_dump() -> &'static str {
    "events: Ir\n\
     fl=a.c\n\
     fn=A\n\
     1 10\n\
     cfn=B\n\
     calls=1\n\
     1 100\n\
     fn=B\n\
     1 10\n\
     cfn=C\n\
     calls=1\n\
     1 90\n\
     fn=C\n\
     1 10\n\
     cfn=A\n\
     calls=1\n\
     1 80\n\
     fn=D\n\
     1 5\n\
     cfn=A\n\
     calls=1\n\
     1 100\n"
}

#[test]
fn test_cycle_detection() {
    let (mut data, logger) = load_dump(cycle_dump());
    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);

    assert_eq!(data.cycles.len(), 1);
    let a = data.function_by_name("A").unwrap();
    let b = data.function_by_name("B").unwrap();
    let c = data.function_by_name("C").unwrap();
    let d = data.function_by_name("D").unwrap();

    let cycle = data.functions[a.0 as usize].cycle.expect("A in cycle");
    assert_eq!(data.functions[b.0 as usize].cycle, Some(cycle));
    assert_eq!(data.functions[c.0 as usize].cycle, Some(cycle));
    assert_eq!(data.functions[d.0 as usize].cycle, None);

    // only D -> A crosses into the cycle
    let callers = data.cycles[cycle.0 as usize].callers.clone();
    assert_eq!(callers.len(), 1);
    assert_eq!(data.calls[callers[0].0 as usize].caller, d);

    // cost aggregation: the cycle's self cost is the sum of the member
    // self costs (10 each); with no calls leaving the cycle, each
    // member's inclusive collapses to its self cost, and the cycle's
    // inclusive is their sum
    assert_eq!(data.function_inclusive(a).get(0), SubCost(10));
    assert_eq!(data.cycle_self_cost(cycle).get(0), SubCost(30));
    assert_eq!(data.cycle_inclusive(cycle).get(0), SubCost(30));

    // every member carries the cycle suffix in its display name
    assert!(data.function_pretty_name(a).contains("<cycle 1>"));

    // P10: both ends of an intra-cycle edge are members
    for call in data.calls.iter() {
        let cu = data.functions[call.caller.0 as usize].cycle;
        let cv = data.functions[call.called.0 as usize].cycle;
        if cu.is_some() && cu == cv {
            let members = &data.cycles[cu.unwrap().0 as usize].members;
            assert!(members.contains(&call.caller));
            assert!(members.contains(&call.called));
        }
    }
}

#[test]
fn test_cycle_detection_disabled() {
    let config = Config {
        show_cycles: false,
        ..Config::default()
    };
    let (mut data, _) = load_dump_with(cycle_dump(), config);

    assert!(data.cycles.is_empty());
    let a = data.function_by_name("A").unwrap();
    assert_eq!(data.functions[a.0 as usize].cycle, None);
    // inclusive still computes; recursion may inflate it
    assert!(data.function_inclusive(a).get(0) >= SubCost(10));
}

// ── Properties ──

#[test]
fn test_totals_match_function_self_sums() {
    // P1, with a reordered events line in the second part
    let (mut data, logger) = load_dump(
        "events: Ir Dr\n\
         fl=a.c\n\
         fn=f\n\
         1 10 20\n\
         events: Dr Ir\n\
         fl=a.c\n\
         fn=g\n\
         1 7 5\n",
    );
    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);
    assert_eq!(data.parts.len(), 2);

    let mut by_parts = callview::cost::CostArray::ZERO;
    for p in &data.parts {
        by_parts.add(&p.totals);
    }
    // canonical order is Ir Dr: the second part swaps its columns
    assert_eq!(by_parts.get(0), SubCost(15));
    assert_eq!(by_parts.get(1), SubCost(27));

    let mut by_functions = callview::cost::CostArray::ZERO;
    for i in 0..data.functions.len() {
        let c = data
            .function_self_cost(callview::model::FunctionId(i as u32))
            .clone();
        by_functions.add(&c);
    }
    assert_eq!(by_functions, by_parts);
}

#[test]
fn test_inclusive_at_least_self() {
    // P2 across a call chain
    let (mut data, _) = load_dump(
        "events: Ir\n\
         fl=a.c\n\
         fn=main\n\
         1 10\n\
         cfn=leaf\n\
         calls=2\n\
         1 40\n\
         fn=leaf\n\
         2 40\n",
    );
    for i in 0..data.functions.len() {
        let id = callview::model::FunctionId(i as u32);
        let self_cost = data.function_self_cost(id).get(0);
        let inclusive = data.function_inclusive(id).get(0);
        assert!(inclusive >= self_cost, "function {i}");
    }
}

#[test]
fn test_deactivation_monotonic() {
    // P4: switching a part off never increases costs
    let (mut data, _) = load_dump(
        "events: Ir\n\
         fl=a.c\n\
         fn=f\n\
         1 100\n\
         part: 2\n\
         events: Ir\n\
         fl=a.c\n\
         fn=f\n\
         1 50\n",
    );
    assert_eq!(data.parts.len(), 2);
    let f = data.function_by_name("f").unwrap();
    let before = data.function_self_cost(f).get(0);
    assert_eq!(before, SubCost(150));

    let changed = data.activate_parts(&[true, false]);
    assert!(changed);
    let after = data.function_self_cost(f).get(0);
    assert!(after <= before);
    assert_eq!(after, SubCost(100));
    assert_eq!(data.totals().get(0), SubCost(100));
    assert_eq!(data.active_part_range(), "1");

    // and P3-ish: call counts follow the active set
    assert!(!data.activate_parts(&[true, false]));
}

#[test]
fn test_compressed_id_stability() {
    // P8: a defined id keeps resolving to its name
    let (mut data, logger) = load_dump(
        "events: Ir\n\
         fl=(5) deep/path/x.c\n\
         fn=(9) worker\n\
         1 10\n\
         fl=(5)\n\
         fn=(9)\n\
         2 20\n",
    );
    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);
    let worker = data.function_by_name("worker").unwrap();
    assert_eq!(data.function_self_cost(worker).get(0), SubCost(30));
    assert_eq!(
        data.files.iter().filter(|f| f.name == "deep/path/x.c").count(),
        1
    );
}

// ── Parser robustness ──

#[test]
fn test_unknown_compressed_id_is_soft_error() {
    let (mut data, logger) = load_dump(
        "events: Ir\n\
         fl=a.c\n\
         fn=(3)\n\
         1 10\n",
    );
    assert!(!logger.errors.is_empty());
    // the cost still lands on the unknown sentinel
    let unknown = data.function_by_name("").expect("sentinel");
    assert_eq!(data.function_self_cost(unknown).get(0), SubCost(10));
}

#[test]
fn test_question_marks_collapse_to_unknown() {
    let (data, logger) = load_dump(
        "events: Ir\n\
         fl=???\n\
         fn=???\n\
         1 10\n",
    );
    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);
    assert!(data.function_by_name("").is_some());
    assert!(data.function_by_name("???").is_none());
}

#[test]
fn test_cost_before_events_rejects_file() {
    let (data, logger) = load_dump(
        "creator: test\n\
         fl=a.c\n\
         fn=main\n\
         10 100\n",
    );
    assert_eq!(data.parts.len(), 0);
    assert!(logger
        .errors
        .iter()
        .any(|(_, m)| m.contains("before 'events'")));
}

#[test]
fn test_garbage_after_cost_line() {
    let (mut data, logger) = load_dump(
        "events: Ir\n\
         fl=a.c\n\
         fn=main\n\
         10 100 999 zzz\n",
    );
    assert!(logger.errors.iter().any(|(_, m)| m.contains("Garbage")));
    // the valid prefix still counts
    let main = data.function_by_name("main").unwrap();
    assert_eq!(data.function_self_cost(main).get(0), SubCost(100));
}

#[test]
fn test_rcalls_deprecated_warning() {
    let (mut data, logger) = load_dump(
        "events: Ir\n\
         fl=a.c\n\
         fn=main\n\
         cfn=old\n\
         rcalls=2\n\
         1 30\n\
         fn=old\n\
         1 30\n",
    );
    assert!(logger.warnings.iter().any(|(_, m)| m.contains("rcalls")));
    let old = data.function_by_name("old").unwrap();
    assert_eq!(data.function_called_count(old), SubCost(2));
}

#[test]
fn test_missing_file_reports_open_error() {
    let mut logger = CollectingLogger::default();
    let data = callview::load(
        &[PathBuf::from("/nonexistent/callgrind.out.1")],
        Config::default(),
        &mut logger,
    );
    assert_eq!(data.parts.len(), 0);
    assert!(logger.finished_error.is_some());
}

#[test]
fn test_empty_file_is_skipped_silently() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("callgrind.out.1");
    fs::write(&path, "").unwrap();
    let mut logger = CollectingLogger::default();
    let data = callview::load(&[path], Config::default(), &mut logger);
    assert_eq!(data.parts.len(), 0);
    assert!(logger.finished_error.is_none());
    assert!(logger.errors.is_empty());
}

// ── Jumps ──

#[test]
fn test_conditional_jump_records() {
    let (mut data, logger) = load_dump(
        "positions: line\n\
         events: Ir\n\
         fl=a.c\n\
         fn=main\n\
         10 100\n\
         jcnd=3/10 +10\n\
         10\n\
         25 7\n",
    );
    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);

    let main = data.function_by_name("main").unwrap();
    let source = data.functions[main.0 as usize].sources[0];
    let map = data.line_map(source);

    let line10 = map.get(&10).expect("line 10");
    assert_eq!(line10.jumps.len(), 1);
    let jump = &line10.jumps[0];
    assert_eq!(jump.to_line, 20);
    assert!(jump.is_cond);
    let (_, jc) = jump.parts[0];
    assert_eq!(jc.executed, SubCost(10));
    assert_eq!(jc.followed, SubCost(3));
}

// ── Instruction positions ──

#[test]
fn test_instr_positions() {
    let (mut data, logger) = load_dump(
        "positions: instr line\n\
         events: Ir\n\
         fl=a.c\n\
         fn=main\n\
         0x1000 10 100\n\
         +8 +1 50\n",
    );
    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);

    let main = data.function_by_name("main").unwrap();
    let active = data.active_mask();
    let map = data.instr_map(main);
    assert_eq!(map.len(), 2);

    let first = map.get(&callview::Addr(0x1000)).expect("first instr");
    assert_eq!(first.cost(&active).get(0), SubCost(100));
    assert_eq!(first.line, 10);

    let second = map.get(&callview::Addr(0x1008)).expect("second instr");
    assert_eq!(second.cost(&active).get(0), SubCost(50));
    assert_eq!(second.line, 11);
}

// ── Search ──

#[test]
fn test_search_by_name() {
    let (mut data, _) = load_dump(
        "events: Ir\n\
         fl=a.c\n\
         fn=main\n\
         1 10\n\
         cfn=worker\n\
         calls=1\n\
         1 90\n\
         fn=worker\n\
         2 90\n",
    );

    let et = ir(&data);
    let found = search(&mut data, SearchKind::Function, "worker", Some(et), None);
    let worker = data.function_by_name("worker").unwrap();
    assert_eq!(found, Some(Found::Function(worker)));

    let found = search(&mut data, SearchKind::File, "a.c", Some(et), None);
    assert!(matches!(found, Some(Found::File(_))));

    assert_eq!(
        search(&mut data, SearchKind::Function, "absent", Some(et), None),
        None
    );
}

// ── Header handling ──

#[test]
fn test_header_only_file_adds_no_part() {
    let (data, logger) = load_dump(
        "# callgrind format\n\
         version: 1\n\
         creator: callgrind-3.13.0\n\
         pid: 42\n",
    );
    assert_eq!(data.parts.len(), 0);
    assert!(logger.errors.iter().any(|(_, m)| m.contains("No data")));
}

#[test]
fn test_cmd_and_desc_lines() {
    let (data, logger) = load_dump(
        "version: 1\n\
         creator: callgrind-3.13.0\n\
         pid: 1234\n\
         cmd: ./prog --fast\n\
         desc: Trigger: Program termination\n\
         events: Ir\n\
         fl=a.c\n\
         fn=main\n\
         1 10\n",
    );
    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);
    assert_eq!(data.command, "./prog --fast");
    assert_eq!(data.parts[0].trigger, "Program termination");
    assert_eq!(data.parts[0].process_id, 1234);
}

#[test]
fn test_active_part_range_formatting() {
    let mut dump = String::new();
    for i in 1..=5 {
        dump.push_str(&format!(
            "part: {i}\nevents: Ir\nfl=a.c\nfn=f\n1 {i}\n"
        ));
    }
    let (mut data, _) = load_dump(&dump);
    assert_eq!(data.parts.len(), 5);

    insta::assert_snapshot!(data.active_part_range(), @"1-5");
    data.activate_parts(&[true, false, true, true, true]);
    insta::assert_snapshot!(data.active_part_range(), @"1;3-5");
    data.activate_parts(&[false, true, false, true, false]);
    insta::assert_snapshot!(data.active_part_range(), @"2;4");
}

#[test]
fn test_pretty_counter_formatting() {
    insta::assert_snapshot!(SubCost(1234567).pretty(), @"1 234 567");
    insta::assert_snapshot!(SubCost(0).pretty(), @"0");
    let c = callview::cost::CostArray::from_slice(&[1500, 16]);
    insta::assert_snapshot!(c.pretty(), @"1 500, 16");
}

#[test]
fn test_summary_is_overridden_by_actual_costs() {
    let (mut data, logger) = load_dump(
        "events: Ir\n\
         summary: 999999\n\
         fl=a.c\n\
         fn=main\n\
         1 10\n",
    );
    assert!(logger.errors.is_empty(), "errors: {:?}", logger.errors);
    // per-record sums win over the advisory summary line
    assert_eq!(data.totals().get(0), SubCost(10));
}
