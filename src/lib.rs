//! Backend for viewing Callgrind/Cachegrind profile data.
//!
//! The crate parses profile dump files into an in-memory cost graph and
//! answers aggregation, cycle-detection and ranked-listing queries over
//! it. There is no GUI here; front-ends consume [`model::ProfileData`].

pub mod cli;
pub mod config;
pub mod cost;
pub mod cycle;
pub mod diagnostic;
pub mod dumpfile;
pub mod event;
pub mod loader;
pub mod logger;
pub mod model;
pub mod pool;
pub mod query;
pub mod scan;
pub mod subcost;

pub use config::Config;
pub use event::{EventTypeId, EventTypeSet};
pub use logger::Logger;
pub use model::ProfileData;
pub use subcost::{Addr, SubCost};

use std::path::Path;

/// Load one or more traces into a fresh data graph. Each path may be a
/// dump file or a directory holding callgrind output; companion part
/// files are discovered automatically.
pub fn load<P: AsRef<Path>>(
    paths: &[P],
    config: Config,
    logger: &mut dyn Logger,
) -> ProfileData {
    let mut data = ProfileData::new(config);
    for path in paths {
        loader::load_trace(&mut data, logger, path.as_ref());
    }
    data
}
