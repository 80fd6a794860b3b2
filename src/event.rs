//! Event types and their algebra.
//!
//! Real event types occupy a fixed column of every `CostArray`; derived
//! event types are linear formulas over other event types and have no
//! column of their own. An `EventTypeSet` binds names to real indexes as
//! they are discovered in the `events:` lines of one profile, and carries
//! a registry of known types (seeded from a constant table, extended by
//! `event:` declarations) from which parseable derived types are adopted.

use std::fmt;

use crate::cost::{CostArray, MAX_REAL};
use crate::scan::Scan;
use crate::subcost::SubCost;

/// Reference to an event type inside one `EventTypeSet`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventTypeId {
    Real(usize),
    Derived(usize),
}

/// One event type of a set.
#[derive(Clone, Debug)]
pub struct EventType {
    pub name: String,
    pub long_name: String,
    /// Empty for real types.
    pub formula: String,
    /// Column index for real types.
    pub real_index: Option<usize>,
    /// Resolved formula coefficients per real index, for derived types.
    coeffs: [i64; MAX_REAL],
}

impl EventType {
    pub fn is_real(&self) -> bool {
        self.real_index.is_some()
    }
}

/// A type declared via the seed table or an `event:` line, not (yet) part
/// of the set.
#[derive(Clone, Debug)]
struct KnownType {
    name: String,
    long_name: String,
    formula: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormulaError {
    Unknown(String),
    Cyclic(String),
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::Unknown(n) => write!(f, "unknown event type '{n}' in formula"),
            FormulaError::Cyclic(n) => write!(f, "cyclic formula involving '{n}'"),
        }
    }
}

/// The event types of one profile: real columns plus derived formulas.
#[derive(Clone, Debug, Default)]
pub struct EventTypeSet {
    real: Vec<EventType>,
    derived: Vec<EventType>,
    known: Vec<KnownType>,
}

impl EventTypeSet {
    pub fn new() -> EventTypeSet {
        EventTypeSet::default()
    }

    /// Seed the known-type registry from `(name, long name, formula)`
    /// rows; an empty formula marks a real type.
    pub fn with_known_types(table: &[(&str, &str, &str)]) -> EventTypeSet {
        let mut set = EventTypeSet::new();
        for &(name, long_name, formula) in table {
            set.add_known(name, long_name, formula);
        }
        set
    }

    /// Register or overwrite a known type (an `event:` line).
    pub fn add_known(&mut self, name: &str, long_name: &str, formula: &str) {
        if let Some(k) = self.known.iter_mut().find(|k| k.name == name) {
            if !long_name.is_empty() && long_name != name {
                k.long_name = long_name.to_string();
            }
            if !formula.is_empty() {
                k.formula = formula.to_string();
            }
            return;
        }
        self.known.push(KnownType {
            name: name.to_string(),
            long_name: if long_name.is_empty() {
                name.to_string()
            } else {
                long_name.to_string()
            },
            formula: formula.to_string(),
        });
    }

    pub fn real_count(&self) -> usize {
        self.real.len()
    }

    pub fn derived_count(&self) -> usize {
        self.derived.len()
    }

    pub fn real_type(&self, i: usize) -> Option<&EventType> {
        self.real.get(i)
    }

    pub fn derived_type(&self, i: usize) -> Option<&EventType> {
        self.derived.get(i)
    }

    pub fn get(&self, id: EventTypeId) -> Option<&EventType> {
        match id {
            EventTypeId::Real(i) => self.real.get(i),
            EventTypeId::Derived(i) => self.derived.get(i),
        }
    }

    pub fn real_index(&self, name: &str) -> Option<usize> {
        self.real.iter().position(|t| t.name == name)
    }

    pub fn type_by_name(&self, name: &str) -> Option<EventTypeId> {
        if let Some(i) = self.real_index(name) {
            return Some(EventTypeId::Real(i));
        }
        self.derived
            .iter()
            .position(|t| t.name == name)
            .map(EventTypeId::Derived)
    }

    /// Find or create the real type for `name`. Returns `None` when the
    /// set already holds `MAX_REAL` real types.
    pub fn add_real(&mut self, name: &str) -> Option<usize> {
        if let Some(i) = self.real_index(name) {
            return Some(i);
        }
        if self.real.len() >= MAX_REAL {
            return None;
        }
        let long_name = self
            .known
            .iter()
            .find(|k| k.name == name && k.formula.is_empty())
            .map(|k| k.long_name.clone())
            .unwrap_or_else(|| name.to_string());
        self.real.push(EventType {
            name: name.to_string(),
            long_name,
            formula: String::new(),
            real_index: Some(self.real.len()),
            coeffs: [0; MAX_REAL],
        });
        Some(self.real.len() - 1)
    }

    /// Adopt every known derived type whose formula resolves against the
    /// current set, repeating until a fixed point so that derived types
    /// referencing other derived types come in as well.
    pub fn add_known_derived_types(&mut self) -> usize {
        let mut added = 0;
        loop {
            let mut round = 0;
            for i in 0..self.known.len() {
                let k = &self.known[i];
                if k.formula.is_empty() || self.type_by_name(&k.name).is_some() {
                    continue;
                }
                let mut stack = Vec::new();
                let name = k.name.clone();
                let long_name = k.long_name.clone();
                let formula = k.formula.clone();
                if let Ok(coeffs) = self.resolve_formula(&formula, &mut stack) {
                    self.derived.push(EventType {
                        name,
                        long_name,
                        formula,
                        real_index: None,
                        coeffs,
                    });
                    round += 1;
                }
            }
            if round == 0 {
                break;
            }
            added += round;
        }
        added
    }

    /// Resolve a linear formula to per-real-index coefficients.
    ///
    /// Tokens are `[+-]? digits? '*'? name`, matched the same way the
    /// original formula syntax defines them. The stack guards against
    /// derived types referencing each other in a loop.
    fn resolve_formula(
        &self,
        formula: &str,
        stack: &mut Vec<String>,
    ) -> Result<[i64; MAX_REAL], FormulaError> {
        let mut coeffs = [0i64; MAX_REAL];
        let mut s = Scan::new(formula.as_bytes());

        loop {
            skip_formula_filler(&mut s);
            if s.is_empty() {
                break;
            }

            let mut factor: i64 = 1;
            match s.first() {
                Some(b'+') => {
                    s.strip_first();
                }
                Some(b'-') => {
                    factor = -1;
                    s.strip_first();
                }
                _ => {}
            }
            skip_formula_filler(&mut s);
            if let Some(n) = s.strip_u64(false) {
                factor *= n as i64;
            }
            skip_formula_filler(&mut s);
            if s.first() == Some(b'*') {
                s.strip_first();
                skip_formula_filler(&mut s);
            }

            let name = match s.strip_name() {
                Some(n) => n.to_text(),
                None => break,
            };

            if let Some(i) = self.real_index(&name) {
                coeffs[i] += factor;
                continue;
            }
            if let Some(EventTypeId::Derived(i)) = self.type_by_name(&name) {
                for (k, c) in self.derived[i].coeffs.iter().enumerate() {
                    coeffs[k] += factor * c;
                }
                continue;
            }
            // not in the set yet: maybe a known derived type
            if let Some(k) = self
                .known
                .iter()
                .find(|k| k.name == name && !k.formula.is_empty())
            {
                if stack.iter().any(|n| n == &name) {
                    return Err(FormulaError::Cyclic(name));
                }
                stack.push(name);
                let inner = self.resolve_formula(&k.formula.clone(), stack)?;
                stack.pop();
                for (k, c) in inner.iter().enumerate() {
                    coeffs[k] += factor * c;
                }
                continue;
            }
            return Err(FormulaError::Unknown(name));
        }

        Ok(coeffs)
    }

    /// Evaluate an event type against a cost array.
    pub fn sub_cost(&self, id: EventTypeId, cost: &CostArray) -> SubCost {
        match id {
            EventTypeId::Real(i) => cost.get(i),
            EventTypeId::Derived(i) => {
                let Some(t) = self.derived.get(i) else {
                    return SubCost::ZERO;
                };
                let mut sum: i128 = 0;
                for (k, &c) in t.coeffs.iter().enumerate() {
                    if c != 0 {
                        sum += c as i128 * cost.get(k).0 as i128;
                    }
                }
                SubCost(sum.clamp(0, u64::MAX as i128) as u64)
            }
        }
    }

    /// Build the sub-mapping for a space-separated `events:` list.
    ///
    /// With `create = false`, any unknown name yields `None`. Creating
    /// more real types than fit, or a list naming the same column twice,
    /// yields `None` as well.
    pub fn sub_mapping(&mut self, types: &str, create: bool) -> Option<SubMapping> {
        let names: Vec<&str> = types.split_whitespace().collect();

        // check capacity up front, so a rejected list leaves the set alone
        let new_count = names
            .iter()
            .filter(|n| self.real_index(n).is_none())
            .count();
        if !create && new_count > 0 {
            return None;
        }
        if self.real.len() + new_count > MAX_REAL {
            return None;
        }

        let mut sm = SubMapping::empty();
        for name in names {
            let index = self.add_real(name)?;
            if !sm.append(index) {
                return None;
            }
        }
        Some(sm)
    }
}

fn skip_formula_filler(s: &mut Scan) {
    while let Some(c) = s.first() {
        if c == b' ' || c == b'\t' {
            s.strip_first();
        } else {
            break;
        }
    }
}

/// How the counter columns of one file section map onto the canonical
/// real indexes of an `EventTypeSet`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubMapping {
    indexes: [usize; MAX_REAL],
    count: usize,
    is_identity: bool,
}

impl SubMapping {
    pub fn empty() -> SubMapping {
        SubMapping {
            indexes: [usize::MAX; MAX_REAL],
            count: 0,
            is_identity: true,
        }
    }

    /// Append the real index for the next source column. Rejects overflow
    /// and duplicate targets (no two source columns may share a column).
    pub fn append(&mut self, index: usize) -> bool {
        if self.count >= MAX_REAL || index >= MAX_REAL {
            return false;
        }
        if self.indexes[..self.count].contains(&index) {
            return false;
        }
        if self.count != index {
            self.is_identity = false;
        }
        self.indexes[self.count] = index;
        self.count += 1;
        true
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_identity(&self) -> bool {
        self.is_identity
    }

    /// Canonical real index for source column `i`.
    pub fn real_index(&self, i: usize) -> usize {
        if i < self.count {
            self.indexes[i]
        } else {
            usize::MAX
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> EventTypeSet {
        EventTypeSet::with_known_types(crate::config::KNOWN_EVENT_TYPES)
    }

    #[test]
    fn test_sub_mapping_identity() {
        let mut set = EventTypeSet::new();
        let sm = set.sub_mapping("Ir Dr Dw", true).unwrap();
        assert!(sm.is_identity());
        assert_eq!(sm.count(), 3);
        assert_eq!(sm.real_index(0), 0);
        assert_eq!(sm.real_index(2), 2);
        assert_eq!(set.real_count(), 3);
    }

    #[test]
    fn test_sub_mapping_reuses_indexes() {
        // the documented shape: "Event1 Cost1 Cost2" then "Event2 Cost3 Event1"
        let mut set = EventTypeSet::new();
        let sm1 = set.sub_mapping("Event1 Cost1 Cost2", true).unwrap();
        let sm2 = set.sub_mapping("Event2 Cost3 Event1", true).unwrap();
        assert_eq!(
            (sm1.real_index(0), sm1.real_index(1), sm1.real_index(2)),
            (0, 1, 2)
        );
        assert_eq!(
            (sm2.real_index(0), sm2.real_index(1), sm2.real_index(2)),
            (3, 4, 0)
        );
        assert!(!sm2.is_identity());
        assert_eq!(set.real_count(), 5);
    }

    #[test]
    fn test_sub_mapping_no_create() {
        let mut set = EventTypeSet::new();
        set.sub_mapping("Ir Dr", true).unwrap();
        assert!(set.sub_mapping("Ir Dw", false).is_none());
        assert!(set.sub_mapping("Dr Ir", false).is_some());
    }

    #[test]
    fn test_sub_mapping_rejects_duplicate_column() {
        let mut set = EventTypeSet::new();
        assert!(set.sub_mapping("Ir Dr Ir", true).is_none());
    }

    #[test]
    fn test_sub_mapping_overflow() {
        let mut set = EventTypeSet::new();
        let many: Vec<String> = (0..MAX_REAL + 1).map(|i| format!("E{i}")).collect();
        assert!(set.sub_mapping(&many.join(" "), true).is_none());
    }

    #[test]
    fn test_known_derived_adoption() {
        let mut set = seeded();
        set.sub_mapping("Ir I1mr D1mr D1mw", true).unwrap();
        set.add_known_derived_types();
        assert!(set.type_by_name("L1m").is_some());
        // L2m needs I2mr etc., which are absent
        assert!(set.type_by_name("L2m").is_none());
    }

    #[test]
    fn test_derived_formula_evaluation() {
        let mut set = seeded();
        set.sub_mapping("Ir I1mr D1mr D1mw", true).unwrap();
        set.add_known_derived_types();
        let l1m = set.type_by_name("L1m").unwrap();
        let c = CostArray::from_slice(&[1, 2, 3, 4]);
        assert_eq!(set.sub_cost(l1m, &c), SubCost(9));
        let ir = set.type_by_name("Ir").unwrap();
        assert_eq!(set.sub_cost(ir, &c), SubCost(1));
    }

    #[test]
    fn test_formula_with_coefficients() {
        let mut set = seeded();
        set.add_known("W", "Weighted", "2 Ir + 3 * Dr");
        set.sub_mapping("Ir Dr", true).unwrap();
        set.add_known_derived_types();
        let w = set.type_by_name("W").unwrap();
        let c = CostArray::from_slice(&[10, 100]);
        assert_eq!(set.sub_cost(w, &c), SubCost(320));
    }

    #[test]
    fn test_derived_over_derived() {
        // CEst references Bm, L1m, L2m, LLm, which are themselves derived
        let mut set = seeded();
        set.sub_mapping(
            "Ir I1mr D1mr D1mw I2mr D2mr D2mw ILmr DLmr DLmw Bim Bcm Ge",
            true,
        )
        .unwrap();
        set.add_known_derived_types();
        assert!(set.type_by_name("Bm").is_some());
        assert!(set.type_by_name("CEst").is_some());

        let cest = set.type_by_name("CEst").unwrap();
        let c = CostArray::from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13]);
        // L1m=9, L2m=18, LLm=27, Bm=23
        // Ir + 10*23 + 10*9 + 20*13 + 100*18 + 100*27 = 5081
        assert_eq!(set.sub_cost(cest, &c), SubCost(5081));
    }

    #[test]
    fn test_derived_needing_missing_reals_not_adopted() {
        let mut set = seeded();
        set.sub_mapping("Ir I1mr D1mr D1mw Bim Bcm Ge", true).unwrap();
        set.add_known_derived_types();
        assert!(set.type_by_name("L1m").is_some());
        assert!(set.type_by_name("Bm").is_some());
        // missing I2mr/ILmr families keep L2m, LLm and CEst out
        assert!(set.type_by_name("L2m").is_none());
        assert!(set.type_by_name("CEst").is_none());
    }

    #[test]
    fn test_cyclic_formula_rejected() {
        let mut set = EventTypeSet::new();
        set.add_known("A", "", "B + Ir");
        set.add_known("B", "", "A");
        set.sub_mapping("Ir", true).unwrap();
        set.add_known_derived_types();
        assert!(set.type_by_name("A").is_none());
        assert!(set.type_by_name("B").is_none());
    }

    #[test]
    fn test_unknown_name_rejected() {
        let mut set = EventTypeSet::new();
        set.add_known("X", "", "Ir + Nothing");
        set.sub_mapping("Ir", true).unwrap();
        set.add_known_derived_types();
        assert!(set.type_by_name("X").is_none());
    }

    #[test]
    fn test_event_line_overwrites_known() {
        let mut set = seeded();
        set.add_known("Ir", "Instructions Executed", "");
        set.sub_mapping("Ir", true).unwrap();
        assert_eq!(set.real_type(0).unwrap().long_name, "Instructions Executed");
    }
}
