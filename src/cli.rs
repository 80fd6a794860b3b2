//! The `callview` command line front-end.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::diagnostic::{render_diagnostics, Diagnostic};
use crate::event::EventTypeId;
use crate::logger::Logger;
use crate::model::ProfileData;
use crate::query::{top_functions, ListEntry, RankKey};

#[derive(Parser)]
#[command(
    name = "callview",
    version,
    about = "Show profiles from callgrind files",
    disable_help_flag = true
)]
pub struct Cli {
    /// Show this help text
    #[arg(short = 'h', long = "help")]
    pub help: bool,
    /// Sort list according to exclusive cost
    #[arg(short = 'e')]
    pub exclusive: bool,
    /// Sort and show counters for event EV
    #[arg(short = 's', value_name = "EV")]
    pub show_event: Option<String>,
    /// Sort by call count
    #[arg(short = 'c')]
    pub by_count: bool,
    /// Show butterfly (callers and callees)
    #[arg(short = 'b')]
    pub butterfly: bool,
    /// Do not detect recursive cycles
    #[arg(short = 'n')]
    pub no_cycles: bool,
    /// Dump files, or a directory with callgrind output
    pub files: Vec<PathBuf>,
}

/// Logger for the terminal: progress to stderr as it happens, per-line
/// problems collected for an ariadne rendering after the load.
#[derive(Default)]
struct CliLogger {
    current: String,
    collected: Vec<(String, Diagnostic)>,
}

impl Logger for CliLogger {
    fn load_start(&mut self, filename: &str) {
        self.current = filename.to_string();
        eprintln!("Loading {filename}");
    }

    fn load_warning(&mut self, line: u64, msg: &str) {
        self.collected
            .push((self.current.clone(), Diagnostic::warning(line, msg.into())));
    }

    fn load_error(&mut self, line: u64, msg: &str) {
        self.collected
            .push((self.current.clone(), Diagnostic::error(line, msg.into())));
    }

    fn load_finished(&mut self, error: Option<&str>) {
        if let Some(msg) = error {
            eprintln!("Error loading file {}: {msg}", self.current);
        }
    }
}

pub fn run(cli: Cli) -> i32 {
    if cli.help || cli.files.is_empty() {
        print_help(cli.help);
        return 1;
    }

    let config = Config {
        show_cycles: !cli.no_cycles,
        ..Config::default()
    };

    let mut logger = CliLogger::default();
    let mut data = crate::load(&cli.files, config, &mut logger);

    render_collected(&logger);

    if data.event_types.real_count() == 0 {
        println!("Error: No event types found.");
        return 1;
    }

    print_totals(&mut data);

    let event = match &cli.show_event {
        None => EventTypeId::Real(0),
        Some(name) => match data.event_types.type_by_name(name) {
            Some(et) => et,
            None => {
                println!("Error: event '{name}' not found.");
                return 1;
            }
        },
    };

    let long_name = data
        .event_types
        .get(event)
        .map(|t| t.long_name.clone())
        .unwrap_or_default();
    let short_name = data
        .event_types
        .get(event)
        .map(|t| t.name.clone())
        .unwrap_or_default();
    println!(
        "Sorted by: {}{long_name} ({short_name})",
        if cli.by_count {
            "Call Count "
        } else if cli.exclusive {
            "Exclusive "
        } else {
            "Inclusive "
        }
    );

    let key = if cli.by_count {
        RankKey::CallCount
    } else if cli.exclusive {
        RankKey::SelfCost(event)
    } else {
        RankKey::Inclusive(event)
    };
    let list_len = data.config.max_list_count;
    let list = top_functions(&mut data, key, list_len);

    println!("\n     Inclusive     Exclusive       Called  Function name (DSO)");
    println!(" ==================================================================");

    let entries: Vec<ListEntry> = list.iter().map(|(e, _)| *e).collect();
    for (i, entry) in entries.iter().enumerate() {
        if cli.butterfly && i > 0 {
            println!();
        }
        match *entry {
            ListEntry::Function(f) => print_function_row(&mut data, f, event, cli.butterfly),
            ListEntry::Cycle(c) => print_cycle_row(&mut data, c, event, cli.butterfly),
        }
    }

    0
}

fn print_help(full: bool) {
    println!("Show profiles from callgrind files.");
    if !full {
        println!("Type 'callview -h' for help.");
        return;
    }
    println!(
        "Usage: callview [options] <file> ...\n\n\
         Options:\n\
         \x20-h        Show this help text\n\
         \x20-e        Sort list according to exclusive cost\n\
         \x20-s <ev>   Sort and show counters for event <ev>\n\
         \x20-c        Sort by call count\n\
         \x20-b        Show butterfly (callers and callees)\n\
         \x20-n        Do not detect recursive cycles"
    );
}

fn render_collected(logger: &CliLogger) {
    let mut last_file = String::new();
    let mut source = String::new();
    for (file, diag) in &logger.collected {
        if *file != last_file {
            last_file = file.clone();
            source = std::fs::read_to_string(file).unwrap_or_default();
        }
        render_diagnostics(std::slice::from_ref(diag), file, &source);
    }
}

fn print_totals(data: &mut ProfileData) {
    println!("\nTotals for event types:");
    for i in 0..data.event_types.real_count() {
        let sc = data.sub_cost(EventTypeId::Real(i));
        let t = data.event_types.real_type(i).expect("real type");
        println!("{:>14}   {} ({})", sc.pretty(), t.long_name, t.name);
    }
    for i in 0..data.event_types.derived_count() {
        let sc = data.sub_cost(EventTypeId::Derived(i));
        let t = data.event_types.derived_type(i).expect("derived type");
        println!(
            "{:>14}   {} ({} = {})",
            sc.pretty(),
            t.long_name,
            t.name,
            t.formula
        );
    }
    println!();
}

fn print_function_row(
    data: &mut ProfileData,
    f: crate::model::FunctionId,
    event: EventTypeId,
    butterfly: bool,
) {
    if butterfly {
        let callers = data.functions[f.0 as usize].callers.clone();
        for c in callers {
            let (cost, count) = {
                let (cost, count) = data.call_cost(c);
                (cost.clone(), count)
            };
            let sc = data.event_types.sub_cost(event, &cost);
            let caller = data.calls[c.0 as usize].caller;
            println!(
                "  {:>14}            {:>13}    < {}",
                sc.pretty(),
                count.pretty(),
                data.function_pretty_name(caller)
            );
        }
    }

    let incl = data.function_inclusive(f).clone();
    let incl = data.event_types.sub_cost(event, &incl);
    let selfc = data.function_self_cost(f).clone();
    let selfc = data.event_types.sub_cost(event, &selfc);
    let called = data.function_called_count(f);
    let object = data.functions[f.0 as usize].object;
    println!(
        "{:>14}{:>14}{:>13}  {} ({})",
        incl.pretty(),
        selfc.pretty(),
        called.pretty(),
        data.function_name(f),
        data.objects[object.0 as usize].name
    );

    if butterfly {
        let callings = data.functions[f.0 as usize].callings.clone();
        for c in callings {
            let (cost, count) = {
                let (cost, count) = data.call_cost(c);
                (cost.clone(), count)
            };
            let sc = data.event_types.sub_cost(event, &cost);
            let called_fn = data.calls[c.0 as usize].called;
            println!(
                "  {:>14}            {:>13}    > {}",
                sc.pretty(),
                count.pretty(),
                data.function_pretty_name(called_fn)
            );
        }
    }
}

fn print_cycle_row(
    data: &mut ProfileData,
    c: crate::model::CycleId,
    event: EventTypeId,
    butterfly: bool,
) {
    if butterfly {
        let callers = data.cycles[c.0 as usize].callers.clone();
        for call in callers {
            let (cost, count) = {
                let (cost, count) = data.call_cost(call);
                (cost.clone(), count)
            };
            let sc = data.event_types.sub_cost(event, &cost);
            let caller = data.calls[call.0 as usize].caller;
            println!(
                "  {:>14}            {:>13}    < {}",
                sc.pretty(),
                count.pretty(),
                data.function_pretty_name(caller)
            );
        }
    }

    let incl = data.cycle_inclusive(c).clone();
    let incl = data.event_types.sub_cost(event, &incl);
    let selfc = data.cycle_self_cost(c).clone();
    let selfc = data.event_types.sub_cost(event, &selfc);
    let called = data.cycles[c.0 as usize].called_count;
    let base = data.cycles[c.0 as usize].base;
    let object = data.functions[base.0 as usize].object;
    println!(
        "{:>14}{:>14}{:>13}  {} ({})",
        incl.pretty(),
        selfc.pretty(),
        called.pretty(),
        data.cycles[c.0 as usize].name(),
        data.objects[object.0 as usize].name
    );

    if butterfly {
        // the synthetic calls into the cycle: one per member, carrying
        // the member's inclusive cost
        let members = data.cycles[c.0 as usize].members.clone();
        for m in members {
            let incl = data.function_inclusive(m).clone();
            let sc = data.event_types.sub_cost(event, &incl);
            println!(
                "  {:>14}                             > {}",
                sc.pretty(),
                data.function_pretty_name(m)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flag_parsing() {
        let cli = Cli::parse_from(["callview", "-e", "-b", "-s", "Ir", "out.1"]);
        assert!(cli.exclusive);
        assert!(cli.butterfly);
        assert!(!cli.by_count);
        assert_eq!(cli.show_event.as_deref(), Some("Ir"));
        assert_eq!(cli.files.len(), 1);
    }

    #[test]
    fn test_no_files_exits_with_one() {
        let cli = Cli::parse_from(["callview"]);
        assert_eq!(run(cli), 1);
    }
}
