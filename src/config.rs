//! Global behavior knobs and the seed table of known event types.

/// `(name, long name, formula)` — an empty formula marks a real type.
///
/// These are the counters the Valgrind tools emit, plus the derived sums
/// traditionally shown by profile viewers. `L2m` covers Valgrind < 3.6,
/// `LLm` the last-level naming used since.
pub const KNOWN_EVENT_TYPES: &[(&str, &str, &str)] = &[
    ("Ir", "Instruction Fetch", ""),
    ("Dr", "Data Read Access", ""),
    ("Dw", "Data Write Access", ""),
    ("I1mr", "L1 Instr. Fetch Miss", ""),
    ("D1mr", "L1 Data Read Miss", ""),
    ("D1mw", "L1 Data Write Miss", ""),
    ("L1m", "L1 Miss Sum", "I1mr + D1mr + D1mw"),
    ("I2mr", "L2 Instr. Fetch Miss", ""),
    ("D2mr", "L2 Data Read Miss", ""),
    ("D2mw", "L2 Data Write Miss", ""),
    ("L2m", "L2 Miss Sum", "I2mr + D2mr + D2mw"),
    ("ILmr", "LL Instr. Fetch Miss", ""),
    ("DLmr", "LL Data Read Miss", ""),
    ("DLmw", "LL Data Write Miss", ""),
    ("LLm", "Last-level Miss Sum", "ILmr + DLmr + DLmw"),
    ("Bi", "Indirect Branch", ""),
    ("Bim", "Mispredicted Ind. Branch", ""),
    ("Bc", "Conditional Branch", ""),
    ("Bcm", "Mispredicted Cond. Branch", ""),
    ("Bm", "Mispredicted Branch", "Bim + Bcm"),
    ("Ge", "Global Bus Event", ""),
    ("Smp", "Samples", ""),
    ("Sys", "System Time", ""),
    ("User", "User Time", ""),
    (
        "CEst",
        "Cycle Estimation",
        "Ir + 10 Bm + 10 L1m + 20 Ge + 100 L2m + 100 LLm",
    ),
];

/// Behavior configuration, owned by each `ProfileData`.
#[derive(Clone, Debug)]
pub struct Config {
    /// Collapse mutually recursive functions into cycle nodes.
    pub show_cycles: bool,
    /// Calls below this fraction of a function's base cost are ignored
    /// when searching for cycles.
    pub cycle_cut: f64,
    /// Default length of ranked result lists.
    pub max_list_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            show_cycles: true,
            cycle_cut: 0.0,
            max_list_count: 50,
        }
    }
}
