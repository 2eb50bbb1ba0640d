//! Entry replay: instructions, named accessors, the per-frame engine and
//! the plan built from saved extractions.

pub mod accessor;
pub mod action;
pub mod executor;
pub mod plan;

pub use accessor::{call_name, AccessorRegistry, ElementAccessor, SelectorAlias};
pub use action::{Action, ActionType, DataGroup, ReplayResult};
pub use executor::{ActionOutcome, ReplayEngine};
pub use plan::{build_entry_plan, page_host};
