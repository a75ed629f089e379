//! Drill orchestration: overedge scene assembly and the drill state machine.

mod assembler;
mod engine;

pub use assembler::{dedup_by_region, SceneAssembler, SceneGroup, MAX_EXPECTED_SCENES};
pub use engine::{DrillEngine, DrillOptions, DrillState};
