#![allow(dead_code)]

use dynsoa::prelude::*;
use dynsoa::{ArchetypeId, ViewId};

pub const ENTITIES_SMALL: usize = 100_000;
pub const ENTITIES_MED: usize = 1_000_000;

/// Runtime with the six-float-plus-flags particle schema.
pub fn particle_runtime(config: Config) -> (Runtime, ArchetypeId) {
    let mut rt = Runtime::new(config);
    rt.define_component(Component::new(
        "Position",
        vec![
            Field::new("x", ScalarType::F32),
            Field::new("y", ScalarType::F32),
            Field::new("z", ScalarType::F32),
        ],
    ));
    rt.define_component(Component::new(
        "Velocity",
        vec![
            Field::new("vx", ScalarType::F32),
            Field::new("vy", ScalarType::F32),
            Field::new("vz", ScalarType::F32),
        ],
    ));
    rt.define_component(Component::new(
        "Flags",
        vec![Field::new("bits", ScalarType::U32)],
    ));
    let arch = rt.define_archetype("Particle", &["Position", "Velocity", "Flags"]);
    (rt, arch)
}

/// Spawns and initializes a population on a fresh runtime.
pub fn populated(config: Config, entities: usize) -> (Runtime, ViewId) {
    let (mut rt, arch) = particle_runtime(config);
    let v = rt
        .spawn_with(arch, entities, |i, row| {
            row.set_f32("Position.x", i as f32 * 0.001);
            row.set_f32("Velocity.vx", 1.0 + ((i % 7) as f32 - 3.0) * 0.05);
        })
        .expect("spawn");
    (rt, v)
}
