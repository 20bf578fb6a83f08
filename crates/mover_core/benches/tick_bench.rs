//! Tick loop benchmarks
//!
//! - Plain ticks with a handful of layered moves and a stance modifier
//! - Resimulation cost for different rollback depths
//! - Sync state encode/decode

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use mover_core::component::KinematicBody;
use mover_core::config::{CommonMovementSettings, MoverSettings};
use mover_core::data::{CharacterDefaultInputs, MoveInputType, MoverInputCmd};
use mover_core::layered_moves::{LaunchMove, LinearVelocityMove};
use mover_core::modifiers::{Stance, StanceModifier};
use mover_core::replication::ReplicationRegistry;
use mover_core::simulation::MoverSimulation;
use mover_core::types::MoveMixMode;
use nalgebra::Vector3;

const STEP_MS: f32 = 1000.0 / 60.0;

fn steering_input(frame: u32) -> MoverInputCmd {
    let mut cmd = MoverInputCmd::default();
    let angle = frame as f32 * 0.05;
    cmd.collection
        .find_or_add::<CharacterDefaultInputs>()
        .unwrap()
        .set_move_input(MoveInputType::Velocity, Vector3::new(angle.cos(), angle.sin(), 0.0) * 400.0);
    cmd
}

fn busy_sim() -> MoverSimulation {
    let body = KinematicBody::new(Vector3::new(0.0, 0.0, 500.0)).with_floor(0.0);
    let sim = MoverSimulation::new(MoverSettings::default(), CommonMovementSettings::default(), body)
        .expect("default settings are valid")
        .with_kinematic_modes("Falling");

    let sm = sim.state_machine();
    sm.queue_layered_move(Box::new(LaunchMove::new(Vector3::new(0.0, 0.0, 400.0), 200.0)));
    sm.queue_layered_move(Box::new(LinearVelocityMove::new(Vector3::x() * 50.0, MoveMixMode::AdditiveVelocity, -1.0)));
    sm.queue_movement_modifier(Box::new(StanceModifier::new(Stance::Crouch)));
    sim
}

fn bench_tick(c: &mut Criterion) {
    c.bench_function("tick_60hz", |b| {
        let mut sim = busy_sim();
        let mut frame = 0u32;
        b.iter(|| {
            frame = frame.wrapping_add(1);
            black_box(sim.tick(STEP_MS, steering_input(frame)));
        });
    });
}

fn bench_resimulate(c: &mut Criterion) {
    let mut group = c.benchmark_group("resimulate");

    for depth in [4u32, 16, 60] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let mut sim = busy_sim();
            for frame in 0..64 {
                sim.tick(STEP_MS, steering_input(frame));
            }
            b.iter(|| {
                let target = sim.frame() - depth;
                black_box(sim.resimulate_from(target).ok());
            });
        });
    }

    group.finish();
}

fn bench_replication(c: &mut Criterion) {
    let registry = ReplicationRegistry::with_defaults();
    let mut sim = busy_sim();
    for frame in 0..8 {
        sim.tick(STEP_MS, steering_input(frame));
    }
    let bytes = registry.sync_state_to_bytes(sim.sync_state()).expect("bundled types encode");

    c.bench_function("sync_state_encode", |b| {
        b.iter(|| black_box(registry.sync_state_to_bytes(black_box(sim.sync_state())).ok()));
    });
    c.bench_function("sync_state_decode", |b| {
        b.iter(|| black_box(registry.sync_state_from_bytes(black_box(&bytes)).ok()));
    });
}

criterion_group!(benches, bench_tick, bench_resimulate, bench_replication);
criterion_main!(benches);
