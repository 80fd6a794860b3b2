//! The Callgrind/Cachegrind dump parser.
//!
//! A line-oriented state machine over one file: header lines configure the
//! part being built, `fl=`/`fn=`/`ob=` lines move the current position in
//! the graph, and cost lines append fixed records. Errors are per-line and
//! non-fatal; sentinels keep later lines attached somewhere sensible.

use std::path::{Path, PathBuf};

use crate::dumpfile::{matches_format, DumpFile, LineCursor};
use crate::event::SubMapping;
use crate::logger::Logger;
use crate::model::fixed::PositionSpec;
use crate::model::{
    Arch, FileId, FunctionId, ObjectId, Part, PartFunctionId, PartId, ProfileData, SourceId,
};
use crate::scan::Scan;
use crate::subcost::{Addr, SubCost};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LineKind {
    SelfCost,
    CallCost,
    BoringJump,
    CondJump,
}

/// Dictionary sizes for the compressed-string format; doubled on demand.
const OBJECT_DICT_LEN: usize = 100;
const FILE_DICT_LEN: usize = 1000;
const FUNCTION_DICT_LEN: usize = 10000;

struct Parser<'d, 'l> {
    data: &'d mut ProfileData,
    logger: &'l mut dyn Logger,
    filename: String,
    line_no: u64,

    part: PartId,
    parts_added: u32,
    /// The active `events:` column order, if one was seen.
    mapping: Option<SubMapping>,
    /// Set when the file has to be given up on entirely.
    failed: bool,

    next_line_kind: LineKind,
    has_line_info: bool,
    has_addr_info: bool,
    current_pos: PositionSpec,

    current_object: Option<ObjectId>,
    current_file: Option<FileId>,
    current_function_file: Option<FileId>,
    current_function: Option<FunctionId>,
    current_part_function: Option<PartFunctionId>,
    current_source: Option<SourceId>,

    current_called_object: Option<ObjectId>,
    current_called_file: Option<FileId>,
    current_called_function: Option<FunctionId>,
    current_call_count: SubCost,

    current_jump_to_file: Option<FileId>,
    current_jump_to_function: Option<FunctionId>,
    target_pos: PositionSpec,
    jumps_executed: SubCost,
    jumps_followed: SubCost,

    object_dict: Vec<Option<ObjectId>>,
    file_dict: Vec<Option<FileId>>,
    function_dict: Vec<Option<FunctionId>>,

    status_progress: u32,
}

impl<'d, 'l> Parser<'d, 'l> {
    fn new(data: &'d mut ProfileData, logger: &'l mut dyn Logger, filename: String) -> Self {
        let part = data.begin_part(Part::new(filename.clone()));
        Parser {
            data,
            logger,
            filename,
            line_no: 0,
            part,
            parts_added: 0,
            mapping: None,
            failed: false,
            next_line_kind: LineKind::SelfCost,
            has_line_info: true,
            has_addr_info: false,
            current_pos: PositionSpec::default(),
            current_object: None,
            current_file: None,
            current_function_file: None,
            current_function: None,
            current_part_function: None,
            current_source: None,
            current_called_object: None,
            current_called_file: None,
            current_called_function: None,
            current_call_count: SubCost::ZERO,
            current_jump_to_file: None,
            current_jump_to_function: None,
            target_pos: PositionSpec::default(),
            jumps_executed: SubCost::ZERO,
            jumps_followed: SubCost::ZERO,
            object_dict: vec![None; OBJECT_DICT_LEN],
            file_dict: vec![None; FILE_DICT_LEN],
            function_dict: vec![None; FUNCTION_DICT_LEN],
            status_progress: 0,
        }
    }

    fn error(&mut self, msg: String) {
        self.logger.load_error(self.line_no, &msg);
    }

    fn warning(&mut self, msg: String) {
        self.logger.load_warning(self.line_no, &msg);
    }

    // --- Compressed strings ---

    fn clear_compression(&mut self) {
        self.object_dict.clear();
        self.object_dict.resize(OBJECT_DICT_LEN, None);
        self.file_dict.clear();
        self.file_dict.resize(FILE_DICT_LEN, None);
        self.function_dict.clear();
        self.function_dict.resize(FUNCTION_DICT_LEN, None);
    }

    /// "???" names collapse into the shared unknown sentinel.
    fn check_unknown(name: &str) -> &str {
        if name == "???" {
            ""
        } else {
            name
        }
    }

    /// A token of the compressed-string format starts with `(` and a
    /// digit; everything else is a plain name.
    fn is_compressed(s: &Scan) -> bool {
        let bytes = s.as_bytes();
        bytes.first() == Some(&b'(') && bytes.get(1).is_some_and(|c| c.is_ascii_digit())
    }

    /// Split a compressed token into `(index)` and the optional name
    /// behind it. `None` means the token is malformed.
    fn compressed_parts<'a>(s: &Scan<'a>) -> Option<(usize, Scan<'a>)> {
        let mut rest = *s;
        rest.strip_first();
        let index = rest.strip_u64(false)? as usize;
        if !rest.strip_prefix(")") {
            return None;
        }
        rest.strip_spaces();
        Some((index, rest))
    }

    fn compressed_object(&mut self, s: Scan) -> Option<ObjectId> {
        if !Self::is_compressed(&s) {
            let name = s.to_text();
            return Some(self.data.object(Self::check_unknown(&name)));
        }
        let Some((index, rest)) = Self::compressed_parts(&s) else {
            self.error(format!("Invalid compressed ELF object ('{}')", s.to_text()));
            return None;
        };
        if !rest.is_empty() {
            if self.object_dict.len() <= index {
                self.object_dict.resize(index * 2, None);
            }
            let name = rest.to_text();
            let real_name = Self::check_unknown(&name).to_string();
            if let Some(old) = self.object_dict[index] {
                if self.data.objects[old.0 as usize].name != real_name {
                    self.warning(format!(
                        "Redefinition of compressed ELF object index {index} (was '{}') to '{real_name}'",
                        self.data.objects[old.0 as usize].name
                    ));
                }
            }
            let id = self.data.object(&real_name);
            self.object_dict[index] = Some(id);
            Some(id)
        } else {
            match self.object_dict.get(index).copied().flatten() {
                Some(id) => Some(id),
                None => {
                    self.error(format!("Undefined compressed ELF object index {index}"));
                    None
                }
            }
        }
    }

    // Callgrind sometimes hands out distinct IDs for one file, when the
    // same source is referenced from different ELF objects.
    fn compressed_file(&mut self, s: Scan) -> Option<FileId> {
        if !Self::is_compressed(&s) {
            let name = s.to_text();
            return Some(self.data.file(Self::check_unknown(&name)));
        }
        let Some((index, rest)) = Self::compressed_parts(&s) else {
            self.error(format!("Invalid compressed file ('{}')", s.to_text()));
            return None;
        };
        if !rest.is_empty() {
            if self.file_dict.len() <= index {
                self.file_dict.resize(index * 2, None);
            }
            let name = rest.to_text();
            let real_name = Self::check_unknown(&name).to_string();
            if let Some(old) = self.file_dict[index] {
                if self.data.files[old.0 as usize].name != real_name {
                    self.warning(format!(
                        "Redefinition of compressed file index {index} (was '{}') to '{real_name}'",
                        self.data.files[old.0 as usize].name
                    ));
                }
            }
            let id = self.data.file(&real_name);
            self.file_dict[index] = Some(id);
            Some(id)
        } else {
            match self.file_dict.get(index).copied().flatten() {
                Some(id) => Some(id),
                None => {
                    self.error(format!("Undefined compressed file index {index}"));
                    None
                }
            }
        }
    }

    // Multiple IDs may resolve to the same function when its inlined
    // parts live in different source files; that is no error.
    fn compressed_function(
        &mut self,
        s: Scan,
        file: FileId,
        object: ObjectId,
    ) -> Option<FunctionId> {
        if !Self::is_compressed(&s) {
            let name = s.to_text();
            return Some(self.data.function(Self::check_unknown(&name), file, object));
        }
        let Some((index, rest)) = Self::compressed_parts(&s) else {
            self.error(format!("Invalid compressed function ('{}')", s.to_text()));
            return None;
        };
        if !rest.is_empty() {
            if self.function_dict.len() <= index {
                self.function_dict.resize(index * 2, None);
            }
            let name = rest.to_text();
            let real_name = Self::check_unknown(&name).to_string();
            if let Some(old) = self.function_dict[index] {
                if self.data.functions[old.0 as usize].name != real_name {
                    self.warning(format!(
                        "Redefinition of compressed function index {index} (was '{}') to '{real_name}'",
                        self.data.functions[old.0 as usize].name
                    ));
                }
            }
            let id = self.data.function(&real_name, file, object);
            self.function_dict[index] = Some(id);
            Some(id)
        } else {
            match self.function_dict.get(index).copied().flatten() {
                Some(id) => Some(id),
                None => {
                    self.error(format!("Undefined compressed function index {index}"));
                    None
                }
            }
        }
    }

    // --- Current-position setters ---

    fn ensure_object(&mut self) -> ObjectId {
        match self.current_object {
            Some(o) => o,
            None => {
                let o = self.data.object("");
                self.current_object = Some(o);
                o
            }
        }
    }

    fn ensure_file(&mut self) -> FileId {
        match self.current_file {
            Some(f) => f,
            None => {
                let f = self.data.file("");
                self.current_file = Some(f);
                f
            }
        }
    }

    fn ensure_function(&mut self) -> FunctionId {
        if let Some(f) = self.current_function {
            return f;
        }
        self.warning("Function not specified, using unknown".into());
        let file = self.ensure_file();
        let object = self.ensure_object();
        let f = self.data.function("", file, object);
        self.current_function = Some(f);
        self.current_part_function = Some(self.data.part_function(f, self.part));
        f
    }

    fn set_object(&mut self, s: Scan) {
        self.current_object = match self.compressed_object(s) {
            Some(o) => Some(o),
            None => {
                self.error("Invalid ELF object specification, setting to unknown".into());
                Some(self.data.object(""))
            }
        };
        self.current_function = None;
        self.current_part_function = None;
    }

    fn set_called_object(&mut self, s: Scan) {
        self.current_called_object = match self.compressed_object(s) {
            Some(o) => Some(o),
            None => {
                self.error("Invalid specification of called ELF object, setting to unknown".into());
                Some(self.data.object(""))
            }
        };
    }

    fn set_file(&mut self, s: Scan) {
        self.current_file = match self.compressed_file(s) {
            Some(f) => Some(f),
            None => {
                self.error("Invalid file specification, setting to unknown".into());
                Some(self.data.file(""))
            }
        };
    }

    fn set_called_file(&mut self, s: Scan) {
        self.current_called_file = match self.compressed_file(s) {
            Some(f) => Some(f),
            None => {
                self.error("Invalid specification of called file, setting to unknown".into());
                Some(self.data.file(""))
            }
        };
    }

    fn set_function(&mut self, s: Scan) {
        let file = self.ensure_file();
        let object = self.ensure_object();
        let f = match self.compressed_function(s, file, object) {
            Some(f) => f,
            None => {
                self.error("Invalid function specification, setting to unknown".into());
                self.data.function("", file, object)
            }
        };
        self.current_function = Some(f);
        self.current_part_function = Some(self.data.part_function(f, self.part));
        self.current_source = None;
    }

    fn set_called_function(&mut self, s: Scan) {
        // called object/file default to the current ones
        if self.current_called_object.is_none() {
            self.current_called_object = self.current_object;
        }
        if self.current_called_file.is_none() {
            self.current_called_file = self.current_file;
        }
        let file = match self.current_called_file {
            Some(f) => f,
            None => self.data.file(""),
        };
        let object = match self.current_called_object {
            Some(o) => o,
            None => self.data.object(""),
        };
        self.current_called_file = Some(file);
        self.current_called_object = Some(object);

        self.current_called_function = match self.compressed_function(s, file, object) {
            Some(f) => Some(f),
            None => {
                self.error("Invalid called function, setting to unknown".into());
                Some(self.data.function("", file, object))
            }
        };
    }

    fn clear_position(&mut self) {
        self.current_pos = PositionSpec::default();
        self.current_object = None;
        self.current_file = None;
        self.current_function_file = None;
        self.current_function = None;
        self.current_part_function = None;
        self.current_source = None;
        self.current_called_object = None;
        self.current_called_file = None;
        self.current_called_function = None;
        self.current_call_count = SubCost::ZERO;
        self.current_jump_to_file = None;
        self.current_jump_to_function = None;
        self.target_pos = PositionSpec::default();
        self.jumps_executed = SubCost::ZERO;
        self.jumps_followed = SubCost::ZERO;
        self.mapping = None;
    }

    /// Finalize the part under construction and start the next one.
    /// Header lines that may only open a part (`events:`, `part:`,
    /// `pid:`, `thread:`, `positions:`) call this; nothing happens while
    /// the current part has no cost data yet.
    fn prepare_new_part(&mut self) {
        if self.mapping.is_none() {
            return;
        }
        self.data.finalize_part(self.part);
        self.parts_added += 1;

        self.clear_compression();
        self.clear_position();
        self.part = self.data.begin_part(Part::new(self.filename.clone()));
    }

    // --- Position parsing ---

    /// Decode the leading position tokens of a cost line. With both axes
    /// active, the address comes first. Relative specs are deltas from
    /// `current_pos`.
    fn parse_position(&mut self, s: &mut Scan) -> Option<PositionSpec> {
        let mut new_pos = PositionSpec::default();

        if self.has_addr_info {
            let c = s.first()?;
            match c {
                b'*' => {
                    s.strip_first();
                    new_pos.from_addr = self.current_pos.from_addr;
                    new_pos.to_addr = self.current_pos.to_addr;
                }
                b'+' => {
                    s.strip_first();
                    let diff = s.strip_u64(false)?;
                    new_pos.from_addr = self.current_pos.from_addr.offset(diff as i64);
                    new_pos.to_addr = new_pos.from_addr;
                }
                b'-' => {
                    s.strip_first();
                    let diff = s.strip_u64(false)?;
                    new_pos.from_addr = self.current_pos.from_addr.offset(-(diff as i64));
                    new_pos.to_addr = new_pos.from_addr;
                }
                c if c.is_ascii_hexdigit() => {
                    new_pos.from_addr = Addr::strip(s)?;
                    new_pos.to_addr = new_pos.from_addr;
                }
                _ => return None,
            }

            // range suffix
            match s.first() {
                Some(b'+') => {
                    s.strip_first();
                    let diff = s.strip_u64(true)?;
                    new_pos.to_addr = new_pos.from_addr.offset(diff as i64);
                }
                Some(b'-') | Some(b':') => {
                    s.strip_first();
                    new_pos.to_addr = Addr::strip(s)?;
                }
                _ => {}
            }
            s.strip_spaces();
        }

        if self.has_line_info {
            let c = s.first()?;
            if c > b'9' {
                return None;
            }
            match c {
                b'*' => {
                    s.strip_first();
                    new_pos.from_line = self.current_pos.from_line;
                    new_pos.to_line = self.current_pos.to_line;
                }
                b'+' => {
                    s.strip_first();
                    let diff = s.strip_u32(false)?;
                    new_pos.from_line = self.current_pos.from_line.wrapping_add(diff);
                    new_pos.to_line = new_pos.from_line;
                }
                b'-' => {
                    s.strip_first();
                    let mut diff = s.strip_u32(false)?;
                    if self.current_pos.from_line < diff {
                        self.warning(format!(
                            "Negative line number {}, clipped to zero",
                            self.current_pos.from_line as i64 - diff as i64
                        ));
                        diff = self.current_pos.from_line;
                    }
                    new_pos.from_line = self.current_pos.from_line - diff;
                    new_pos.to_line = new_pos.from_line;
                }
                _ => {
                    new_pos.from_line = s.strip_u32(false)?;
                    new_pos.to_line = new_pos.from_line;
                }
            }

            // range suffix
            match s.first() {
                Some(b'+') => {
                    s.strip_first();
                    let diff = s.strip_u32(true)?;
                    new_pos.to_line = new_pos.from_line.wrapping_add(diff);
                }
                Some(b'-') | Some(b':') => {
                    s.strip_first();
                    new_pos.to_line = s.strip_u32(true)?;
                }
                _ => {}
            }
            s.strip_spaces();
        }

        Some(new_pos)
    }

    // --- The main loop ---

    fn run(&mut self, mut lines: LineCursor) -> u32 {
        while let Some(line) = lines.next_line() {
            self.line_no += 1;
            let mut s = line;
            let Some(c) = s.first() else {
                continue;
            };

            if c <= b'9' {
                if c == b'#' {
                    continue;
                }
                match self.parse_position(&mut s) {
                    Some(pos) => self.current_pos = pos,
                    None => {
                        self.error(format!("Invalid position specification '{}'", s.to_text()));
                        continue;
                    }
                }
                if !self.cost_line(&mut s) {
                    return 0;
                }
                continue;
            }

            s.strip_first();
            if self.header_line(c, s, &lines) {
                if self.failed {
                    return 0;
                }
                continue;
            }
            self.error(format!("Invalid line '{}{}'", c as char, s.to_text()));
        }

        self.logger.load_finished(None);

        if self.mapping.is_some() {
            self.data.finalize_part(self.part);
            self.parts_added += 1;
        } else {
            self.error("No data found. Skipping file".into());
            self.data.discard_last_part(self.part);
        }

        self.parts_added
    }

    /// Dispatch a non-cost line; `c` is its already-stripped first byte.
    /// Returns false if the line matched nothing.
    fn header_line(&mut self, c: u8, mut s: Scan, lines: &LineCursor) -> bool {
        match c {
            b'f' => {
                if s.strip_prefix("l=") {
                    self.set_file(s);
                    // the default file for functions seen from here on
                    self.current_function_file = self.current_file;
                    return true;
                }
                if s.strip_prefix("i=") || s.strip_prefix("e=") {
                    self.set_file(s);
                    return true;
                }
                if s.strip_prefix("n=") {
                    if self.current_file != self.current_function_file {
                        self.current_file = self.current_function_file;
                    }
                    self.set_function(s);

                    // a new function is a natural progress checkpoint
                    let len = lines.len().max(1);
                    let progress = ((100 * lines.offset() + len / 2) / len) as u32;
                    if progress != self.status_progress {
                        self.status_progress = progress;
                        self.logger.load_progress(progress);
                    }
                    return true;
                }
            }
            b'c' => {
                if s.strip_prefix("ob=") {
                    self.set_called_object(s);
                    return true;
                }
                if s.strip_prefix("fl=") || s.strip_prefix("fi=") {
                    self.set_called_file(s);
                    return true;
                }
                if s.strip_prefix("fn=") {
                    self.set_called_function(s);
                    return true;
                }
                if s.strip_prefix("alls=") {
                    self.current_call_count = SubCost::strip(&mut s).unwrap_or(SubCost::ZERO);
                    self.next_line_kind = LineKind::CallCost;
                    return true;
                }
                if s.strip_prefix("md:") {
                    let mut t = s;
                    t.strip_surrounding_spaces();
                    let command = t.to_text();
                    if !self.data.command.is_empty() && self.data.command != command {
                        self.error(format!("Redefined command, was '{}'", self.data.command));
                    } else {
                        self.data.command = command;
                    }
                    return true;
                }
                if s.strip_prefix("reator:") {
                    return true;
                }
            }
            b'j' => {
                if s.strip_prefix("cnd=") {
                    let mut valid = false;
                    if let Some(followed) = SubCost::strip(&mut s) {
                        self.jumps_followed = followed;
                        if s.strip_prefix("/") {
                            if let Some(executed) = SubCost::strip(&mut s) {
                                self.jumps_executed = executed;
                                if let Some(pos) = self.parse_position(&mut s) {
                                    self.target_pos = pos;
                                    valid = true;
                                }
                            }
                        }
                    }
                    if valid {
                        self.next_line_kind = LineKind::CondJump;
                    } else {
                        self.error("Invalid line after 'jcnd'".into());
                    }
                    return true;
                }
                if s.strip_prefix("ump=") {
                    let valid = match SubCost::strip(&mut s) {
                        Some(v) => {
                            self.jumps_executed = v;
                            match self.parse_position(&mut s) {
                                Some(pos) => {
                                    self.target_pos = pos;
                                    true
                                }
                                None => false,
                            }
                        }
                        None => false,
                    };
                    if valid {
                        self.next_line_kind = LineKind::BoringJump;
                    } else {
                        self.error("Invalid line after 'jump'".into());
                    }
                    return true;
                }
                if s.strip_prefix("fi=") {
                    self.current_jump_to_file = self.compressed_file(s);
                    return true;
                }
                if s.strip_prefix("fn=") {
                    let file = match self.current_jump_to_file.or(self.current_file) {
                        Some(f) => f,
                        None => self.data.file(""),
                    };
                    let object = self.ensure_object();
                    self.current_jump_to_function = self.compressed_function(s, file, object);
                    return true;
                }
            }
            b'o' => {
                if s.strip_prefix("b=") {
                    self.set_object(s);
                    return true;
                }
            }
            b'a' => {
                if s.strip_prefix("rch: arm") {
                    if self.data.arch.is_some() && self.data.arch != Some(Arch::Arm) {
                        self.error("Redefined architecture".into());
                    }
                    self.data.arch = Some(Arch::Arm);
                    return true;
                }
            }
            b't' => {
                if s.strip_prefix("otals:") {
                    return true;
                }
                if s.strip_prefix("hread:") {
                    self.prepare_new_part();
                    let mut t = s;
                    t.strip_spaces();
                    self.data.parts[self.part.0 as usize].thread_id =
                        t.strip_u64(false).unwrap_or(0) as u32;
                    return true;
                }
                if s.strip_prefix("imeframe (BB):") {
                    let mut t = s;
                    t.strip_surrounding_spaces();
                    self.data.parts[self.part.0 as usize].timeframe = t.to_text();
                    return true;
                }
            }
            b'd' => {
                if s.strip_prefix("esc:") {
                    s.strip_surrounding_spaces();
                    if s.strip_prefix("Trigger:") {
                        let mut t = s;
                        t.strip_surrounding_spaces();
                        self.data.parts[self.part.0 as usize].trigger = t.to_text();
                    } else if !s.is_empty() {
                        let text = s.to_text();
                        self.data.parts[self.part.0 as usize].descriptions.push(text);
                    }
                    return true;
                }
            }
            b'e' => {
                if s.strip_prefix("vents:") {
                    self.prepare_new_part();
                    let list = s.to_text();
                    match self.data.event_types.sub_mapping(&list, true) {
                        Some(m) => {
                            self.data.event_types.add_known_derived_types();
                            self.data.parts[self.part.0 as usize].sub_mapping = Some(m.clone());
                            self.mapping = Some(m);
                        }
                        None => {
                            self.error(format!("Invalid event specification '{list}'"));
                        }
                    }
                    return true;
                }
                if s.strip_prefix("vent:") {
                    s.strip_surrounding_spaces();
                    let Some(name) = s.strip_name() else {
                        self.error("Invalid event".into());
                        return true;
                    };
                    let name = name.to_text();
                    s.strip_spaces();
                    let mut formula = String::new();
                    match s.strip_first() {
                        Some(b'=') => {
                            let mut f = s.strip_until(b':');
                            f.strip_surrounding_spaces();
                            formula = f.to_text();
                        }
                        Some(_) => {}
                        None => {
                            self.data.event_types.add_known(&name, "", "");
                            return true;
                        }
                    }
                    s.strip_spaces();
                    let long_name = if s.is_empty() { name.clone() } else { s.to_text() };
                    self.data
                        .event_types
                        .add_known(&name, &long_name, &formula);
                    return true;
                }
            }
            b'p' => {
                if s.strip_prefix("art:") {
                    self.prepare_new_part();
                    let mut t = s;
                    t.strip_spaces();
                    self.data.parts[self.part.0 as usize].part_number =
                        t.strip_u64(false).unwrap_or(0) as u32;
                    return true;
                }
                if s.strip_prefix("id:") {
                    self.prepare_new_part();
                    let mut t = s;
                    t.strip_spaces();
                    self.data.parts[self.part.0 as usize].process_id =
                        t.strip_u64(false).unwrap_or(0) as u32;
                    return true;
                }
                if s.strip_prefix("ositions:") {
                    self.prepare_new_part();
                    let positions = s.to_text();
                    self.has_line_info = positions.contains("line");
                    self.has_addr_info = positions.contains("instr");
                    return true;
                }
            }
            b'v' => {
                if s.strip_prefix("ersion:") {
                    let mut t = s;
                    t.strip_surrounding_spaces();
                    self.data.parts[self.part.0 as usize].version = t.to_text();
                    return true;
                }
            }
            b's' => {
                if s.strip_prefix("ummary:") {
                    match self.mapping.clone() {
                        Some(mapping) => {
                            let mut totals = crate::cost::CostArray::ZERO;
                            totals.set_from_scan(&mapping, &mut s);
                            self.data.parts[self.part.0 as usize].totals = totals;
                        }
                        None => {
                            self.error(
                                "Invalid format: summary before data. Skipping file".into(),
                            );
                            self.data.discard_last_part(self.part);
                            self.failed = true;
                        }
                    }
                    return true;
                }
            }
            b'r' => {
                if s.strip_prefix("calls=") {
                    // handled like calls=; recursive cost is discarded by
                    // cycle detection anyway
                    self.current_call_count = SubCost::strip(&mut s).unwrap_or(SubCost::ZERO);
                    self.next_line_kind = LineKind::CallCost;
                    self.warning("Old file format using deprecated 'rcalls'".into());
                    return true;
                }
            }
            _ => {}
        }
        false
    }

    /// Process the cost columns after a position. Returns false when the
    /// file has to be given up on (cost data before any `events:` line).
    fn cost_line(&mut self, s: &mut Scan) -> bool {
        if self.mapping.is_none() {
            self.error("Invalid format: data found before 'events' line. Skipping file".into());
            self.data.discard_last_part(self.part);
            return false;
        }

        let function = self.ensure_function();
        let part_function = match self.current_part_function {
            Some(p) => p,
            None => {
                let p = self.data.part_function(function, self.part);
                self.current_part_function = Some(p);
                p
            }
        };

        let file = self.ensure_file();
        let source = match self.current_source {
            Some(src) if self.data.sources[src.0 as usize].file == file => src,
            _ => {
                let src = self.data.function_source(function, file);
                self.current_source = Some(src);
                src
            }
        };

        match self.next_line_kind {
            LineKind::SelfCost => {
                self.data
                    .new_fix_cost(self.part, source, self.current_pos, part_function, s);
                if !s.is_empty() {
                    self.error(format!("Garbage at end of cost line ('{}')", s.to_text()));
                }
            }
            LineKind::CallCost => {
                self.next_line_kind = LineKind::SelfCost;

                let Some(called) = self.current_called_function else {
                    self.error("Call cost line without preceding 'cfn='".into());
                    self.current_called_file = None;
                    self.current_called_object = None;
                    self.current_call_count = SubCost::ZERO;
                    return true;
                };
                let called_pf = self.data.part_function(called, self.part);
                let call = self.data.call(function, called);
                let part_call = self
                    .data
                    .part_call(call, self.part, part_function, called_pf);
                self.data.new_fix_call_cost(
                    self.part,
                    source,
                    if self.has_line_info {
                        self.current_pos.from_line
                    } else {
                        0
                    },
                    if self.has_addr_info {
                        self.current_pos.from_addr
                    } else {
                        Addr(0)
                    },
                    part_call,
                    self.current_call_count,
                    s,
                );

                // the called function itself is kept: a following bare
                // `calls=` line reuses it
                self.current_called_file = None;
                self.current_called_object = None;
                self.current_call_count = SubCost::ZERO;

                if !s.is_empty() {
                    self.error(format!(
                        "Garbage at end of call cost line ('{}')",
                        s.to_text()
                    ));
                }
            }
            LineKind::BoringJump | LineKind::CondJump => {
                let is_cond = self.next_line_kind == LineKind::CondJump;
                let target_function = self.current_jump_to_function.unwrap_or(function);
                let target_source = match self.current_jump_to_file {
                    Some(f) => self.data.function_source(target_function, f),
                    None => source,
                };

                self.data.new_fix_jump(
                    self.part,
                    if self.has_line_info {
                        self.current_pos.from_line
                    } else {
                        0
                    },
                    if self.has_addr_info {
                        self.current_pos.from_addr
                    } else {
                        Addr(0)
                    },
                    part_function,
                    source,
                    if self.has_line_info {
                        self.target_pos.from_line
                    } else {
                        0
                    },
                    if self.has_addr_info {
                        self.target_pos.from_addr
                    } else {
                        Addr(0)
                    },
                    target_function,
                    target_source,
                    is_cond,
                    self.jumps_executed,
                    self.jumps_followed,
                );

                self.next_line_kind = LineKind::SelfCost;
                self.current_jump_to_function = None;
                self.current_jump_to_file = None;
                self.jumps_executed = SubCost::ZERO;
                self.jumps_followed = SubCost::ZERO;

                if !s.is_empty() {
                    self.error(format!(
                        "Garbage at end of jump cost line ('{}')",
                        s.to_text()
                    ));
                }
            }
        }
        true
    }
}

/// Parse one already-opened dump file into `data`. Returns the number of
/// parts added.
pub fn load_file(data: &mut ProfileData, logger: &mut dyn Logger, path: &Path) -> u32 {
    let file = match DumpFile::open(path) {
        Ok(f) => f,
        Err(msg) => {
            logger.load_start(&path.display().to_string());
            logger.load_finished(Some(&msg));
            return 0;
        }
    };

    // an empty file carries no data but is no error either
    if file.is_empty() {
        return 0;
    }

    if !matches_format(file.bytes()) {
        logger.load_start(&path.display().to_string());
        logger.load_finished(Some("Unknown file format"));
        return 0;
    }

    let filename = path.display().to_string();
    logger.load_start(&filename);

    let mut parser = Parser::new(data, logger, filename);
    parser.run(file.lines())
}

/// Load a trace: a single dump file, or a directory/base file with its
/// companion parts (`base.N`, `base.N-T`, `base-T`).
pub fn load_trace(data: &mut ProfileData, logger: &mut dyn Logger, path: &Path) -> u32 {
    let (dir, base) = match resolve_base(path) {
        Some(pair) => pair,
        None => {
            logger.load_start(&path.display().to_string());
            logger.load_finished(Some("File does not exist"));
            return 0;
        }
    };

    data.trace_name = dir.join(&base).display().to_string();

    let mut names = companion_files(&dir, &base);
    if dir.join(&base).is_file() {
        names.push(base.clone());
    }
    if names.is_empty() {
        logger.load_start(&path.display().to_string());
        logger.load_finished(Some("File does not exist"));
        return 0;
    }

    // pid guess from trailing digits of the base name
    let pid: u32 = base
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>()
        .chars()
        .rev()
        .collect::<String>()
        .parse()
        .unwrap_or(0);

    let mut max_number = 0;
    let mut parts_loaded = 0;
    for name in names {
        let first_new = data.parts.len();
        let added = load_file(data, logger, &dir.join(&name));
        if added == 0 {
            continue;
        }
        parts_loaded += added;

        // part/thread numbers guessed from the file name suffix,
        // explicit header lines win
        let suffix = &name[base.len().min(name.len())..];
        let (file_number, file_thread) = parse_suffix(suffix);

        for part in &mut data.parts[first_new..] {
            let mut n = file_number;
            if part.part_number > 0 {
                n = part.part_number;
            }
            if n > max_number {
                max_number = n;
            }
            if n == 0 {
                max_number += 1;
                n = max_number;
            }
            part.part_number = n;

            if part.thread_id == 0 {
                part.thread_id = file_thread;
            }
            if part.process_id == 0 {
                part.process_id = pid;
            }
        }
    }

    if parts_loaded == 0 {
        return 0;
    }

    let (max_part, max_thread) = data.parts.iter().fold((0, 0), |(p, t), part| {
        (p.max(part.part_number), t.max(part.thread_id))
    });
    data.max_part_number = data.max_part_number.max(max_part);
    data.max_thread_id = data.max_thread_id.max(max_thread);

    data.sort_parts();
    data.invalidate_dynamic_cost();
    crate::cycle::detect_cycles(data);

    parts_loaded
}

/// `base.N[-T]` or `base-T` → (part number, thread id).
fn parse_suffix(suffix: &str) -> (u32, u32) {
    let mut chars = suffix.chars().peekable();
    let mut number = 0u32;
    let mut thread = 0u32;

    if chars.peek() == Some(&'.') {
        chars.next();
        while let Some(c) = chars.peek() {
            match c.to_digit(10) {
                Some(d) => {
                    number = number * 10 + d;
                    chars.next();
                }
                None => break,
            }
        }
    }
    if chars.peek() == Some(&'-') {
        chars.next();
        while let Some(c) = chars.peek() {
            match c.to_digit(10) {
                Some(d) => {
                    thread = thread * 10 + d;
                    chars.next();
                }
                None => break,
            }
        }
    }
    (number, thread)
}

/// Resolve the load path to (directory, base file name). For a directory,
/// the first `callgrind.out*` (then `cachegrind.out*`) file decides, with
/// the `.pid` digits kept in the base.
fn resolve_base(path: &Path) -> Option<(PathBuf, String)> {
    if path.is_dir() {
        for prefix in ["callgrind.out", "cachegrind.out"] {
            let mut entries: Vec<String> = std::fs::read_dir(path)
                .ok()?
                .flatten()
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|n| n.starts_with(prefix) && n.len() > prefix.len() && n.as_bytes()[prefix.len()] == b'.')
                .collect();
            entries.sort();
            if let Some(first) = entries.first() {
                // keep "<prefix>.<digits>" as the base
                let mut end = prefix.len() + 1;
                let bytes = first.as_bytes();
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                return Some((path.to_path_buf(), first[..end].to_string()));
            }
            if path.join(prefix).is_file() {
                return Some((path.to_path_buf(), prefix.to_string()));
            }
        }
        return None;
    }

    // the base file itself may be absent when only companion parts
    // (base.N, base-T) exist
    let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let base = path.file_name()?.to_string_lossy().into_owned();
    Some((dir, base))
}

/// Companion part files of a base: `base.*` and `base-*`.
fn companion_files(dir: &Path, base: &str) -> Vec<String> {
    let mut names: Vec<String> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .flatten()
            .filter_map(|e| e.file_name().into_string().ok())
            .filter(|n| {
                n.len() > base.len()
                    && n.starts_with(base)
                    && matches!(n.as_bytes()[base.len()], b'.' | b'-')
            })
            .collect(),
        Err(_) => Vec::new(),
    };
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_suffix() {
        assert_eq!(parse_suffix(""), (0, 0));
        assert_eq!(parse_suffix(".2"), (2, 0));
        assert_eq!(parse_suffix(".2-3"), (2, 3));
        assert_eq!(parse_suffix("-7"), (0, 7));
        assert_eq!(parse_suffix(".12-34"), (12, 34));
    }
}
