//! Ranked queries over the loaded graph.

use crate::event::EventTypeId;
use crate::model::{ClassId, CycleId, FileId, FunctionId, ObjectId, ProfileData, SourceId};
use crate::subcost::{Addr, SubCost};

/// Keeps the `max_size` items with the highest cost, in order. Insertion
/// shifts; everything below the cut falls off the end.
pub struct TopCostList<T> {
    max_size: usize,
    count: usize,
    items: Vec<T>,
    costs: Vec<SubCost>,
}

impl<T: Copy> TopCostList<T> {
    pub fn new(max_size: usize) -> TopCostList<T> {
        TopCostList {
            max_size,
            count: 0,
            items: Vec::with_capacity(max_size),
            costs: Vec::with_capacity(max_size),
        }
    }

    pub fn clear(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.count = 0;
        self.items.clear();
        self.costs.clear();
    }

    /// Number of items offered so far (not the number kept).
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of items actually kept.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// More items were offered than fit the list.
    pub fn has_more(&self) -> bool {
        self.count > self.max_size
    }

    pub fn add(&mut self, item: T, cost: SubCost) {
        if self.max_size == 0 {
            return;
        }
        self.count += 1;

        if self.items.len() == self.max_size {
            if self.costs[self.max_size - 1] >= cost {
                return;
            }
            self.items.pop();
            self.costs.pop();
        }

        let mut i = self.items.len();
        while i > 0 && self.costs[i - 1] < cost {
            i -= 1;
        }
        self.items.insert(i, item);
        self.costs.insert(i, cost);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, SubCost)> {
        self.items.iter().zip(self.costs.iter().copied())
    }
}

/// What kind of entity a search looks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchKind {
    Function,
    File,
    Class,
    Object,
    Line,
    Instr,
}

/// Restricts a search to children of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parent {
    Class(ClassId),
    File(FileId),
    Object(ObjectId),
    Function(FunctionId),
    Source(SourceId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Found {
    Function(FunctionId),
    File(FileId),
    Class(ClassId),
    Object(ObjectId),
    Line(SourceId, u32),
    Instr(FunctionId, Addr),
}

/// Linear search by exact name, ranked by cost when an event type is
/// given: inclusive cost for functions, self cost for the rest.
pub fn search(
    data: &mut ProfileData,
    kind: SearchKind,
    name: &str,
    event: Option<EventTypeId>,
    parent: Option<Parent>,
) -> Option<Found> {
    match kind {
        SearchKind::Function => search_function(data, name, event, parent),
        SearchKind::File => {
            let mut best = None;
            let mut top = SubCost::ZERO;
            for i in 0..data.files.len() {
                let id = FileId(i as u32);
                if data.files[i].name != name {
                    continue;
                }
                if let Some(et) = event {
                    let cost = data.file_self_cost(id).clone();
                    let sc = data.event_types.sub_cost(et, &cost);
                    if sc <= top {
                        continue;
                    }
                    top = sc;
                }
                best = Some(Found::File(id));
            }
            best
        }
        SearchKind::Class => {
            let mut best = None;
            let mut top = SubCost::ZERO;
            for i in 0..data.classes.len() {
                let id = ClassId(i as u32);
                if data.classes[i].name != name {
                    continue;
                }
                if let Some(et) = event {
                    let cost = data.class_self_cost(id).clone();
                    let sc = data.event_types.sub_cost(et, &cost);
                    if sc <= top {
                        continue;
                    }
                    top = sc;
                }
                best = Some(Found::Class(id));
            }
            best
        }
        SearchKind::Object => {
            let mut best = None;
            let mut top = SubCost::ZERO;
            for i in 0..data.objects.len() {
                let id = ObjectId(i as u32);
                if data.objects[i].name != name {
                    continue;
                }
                if let Some(et) = event {
                    let cost = data.object_self_cost(id).clone();
                    let sc = data.event_types.sub_cost(et, &cost);
                    if sc <= top {
                        continue;
                    }
                    top = sc;
                }
                best = Some(Found::Object(id));
            }
            best
        }
        SearchKind::Line => {
            let sources: Vec<SourceId> = match parent {
                Some(Parent::Function(f)) => data.functions[f.0 as usize].sources.clone(),
                Some(Parent::Source(s)) => vec![s],
                _ => return None,
            };
            let wanted: u32 = name.parse().ok()?;
            for source in sources {
                if data.line_map(source).contains_key(&wanted) {
                    return Some(Found::Line(source, wanted));
                }
            }
            None
        }
        SearchKind::Instr => {
            let function = match parent {
                Some(Parent::Function(f)) => f,
                _ => return None,
            };
            let plain = name.strip_prefix("0x").unwrap_or(name);
            let wanted = Addr(u64::from_str_radix(plain, 16).ok()?);
            if data.instr_map(function).contains_key(&wanted) {
                return Some(Found::Instr(function, wanted));
            }
            None
        }
    }
}

fn search_function(
    data: &mut ProfileData,
    name: &str,
    event: Option<EventTypeId>,
    parent: Option<Parent>,
) -> Option<Found> {
    let mut best = None;
    let mut top = SubCost::ZERO;
    for i in 0..data.functions.len() {
        let id = FunctionId(i as u32);
        if data.functions[i].name != name {
            continue;
        }
        let keep = match parent {
            Some(Parent::Class(c)) => data.functions[i].class == c,
            Some(Parent::File(f)) => data.functions[i].file == f,
            Some(Parent::Object(o)) => data.functions[i].object == o,
            _ => true,
        };
        if !keep {
            continue;
        }
        if let Some(et) = event {
            let cost = data.function_inclusive(id).clone();
            let sc = data.event_types.sub_cost(et, &cost);
            if sc <= top {
                continue;
            }
            top = sc;
        }
        best = Some(Found::Function(id));
    }
    best
}

/// Sort key for the ranked function list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RankKey {
    Inclusive(EventTypeId),
    SelfCost(EventTypeId),
    CallCount,
}

/// An entry of the ranked list: a plain function or a collapsed cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListEntry {
    Function(FunctionId),
    Cycle(CycleId),
}

/// The `k` most expensive functions (and cycles) by the given key.
pub fn top_functions(data: &mut ProfileData, key: RankKey, k: usize) -> TopCostList<ListEntry> {
    let mut list = TopCostList::new(k);

    for i in 0..data.functions.len() {
        let id = FunctionId(i as u32);
        let cost = match key {
            RankKey::Inclusive(et) => {
                let c = data.function_inclusive(id).clone();
                data.event_types.sub_cost(et, &c)
            }
            RankKey::SelfCost(et) => {
                let c = data.function_self_cost(id).clone();
                data.event_types.sub_cost(et, &c)
            }
            RankKey::CallCount => data.function_called_count(id),
        };
        list.add(ListEntry::Function(id), cost);
    }

    for i in 0..data.cycles.len() {
        let id = CycleId(i as u32);
        let cost = match key {
            RankKey::Inclusive(et) => {
                let c = data.cycle_inclusive(id).clone();
                data.event_types.sub_cost(et, &c)
            }
            RankKey::SelfCost(et) => {
                let c = data.cycle_self_cost(id).clone();
                data.event_types.sub_cost(et, &c)
            }
            RankKey::CallCount => {
                data.update_cycle(id);
                data.cycles[i].called_count
            }
        };
        list.add(ListEntry::Cycle(id), cost);
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_cost_list_keeps_highest() {
        let mut list = TopCostList::new(3);
        for (name, cost) in [("a", 5), ("b", 9), ("c", 1), ("d", 7), ("e", 3)] {
            list.add(name, SubCost(cost));
        }
        let kept: Vec<(&str, u64)> = list.iter().map(|(n, c)| (*n, c.0)).collect();
        assert_eq!(kept, vec![("b", 9), ("d", 7), ("a", 5)]);
        assert_eq!(list.count(), 5);
        assert!(list.has_more());
    }

    #[test]
    fn test_top_cost_list_stable_for_ties() {
        let mut list = TopCostList::new(4);
        list.add("first", SubCost(5));
        list.add("second", SubCost(5));
        list.add("third", SubCost(5));
        let kept: Vec<&str> = list.iter().map(|(n, _)| *n).collect();
        assert_eq!(kept, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_top_cost_list_zero_size() {
        let mut list = TopCostList::new(0);
        list.add("x", SubCost(1));
        assert!(list.is_empty());
    }
}
