//! Verifies that the effects' real-time paths don't allocate memory.

#![cfg(feature = "assert-allocs")]

use std::f32::consts::TAU;

use assert_no_alloc::{assert_no_alloc, AllocDisabler};

use drift::{
    effects::{DriftDelayEffect, GranularEffect},
    Effect, EffectHost, FloatParameter, ParameterValueUpdate, Transport,
};

// -------------------------------------------------------------------------------------------------

#[global_allocator]
static A: AllocDisabler = AllocDisabler;

const SAMPLE_RATE: u32 = 48000;
const BLOCK_SIZE: usize = 256;

fn fill_block(buffer: &mut [f32], block: usize) {
    for (index, frame) in buffer.chunks_exact_mut(2).enumerate() {
        let time = (block * BLOCK_SIZE + index) as f32 / SAMPLE_RATE as f32;
        frame[0] = 0.5 * (TAU * 220.0 * time).sin();
        frame[1] = 0.5 * (TAU * 330.0 * time).sin();
    }
}

fn assert_no_violations() {
    #[cfg(debug_assertions)]
    assert_eq!(assert_no_alloc::violation_count(), 0);
}

// -------------------------------------------------------------------------------------------------

#[test]
fn granular_processing_does_not_allocate() {
    let mut effect = GranularEffect::with_seed(1234);
    let handle = effect.parameter_handle();
    handle.set(GranularEffect::DENSITY_ID, 32.0).unwrap();
    handle.set(GranularEffect::SHIMMER_ID, 0.5).unwrap();
    handle.set(GranularEffect::BLUR_ID, 0.3).unwrap();
    effect.initialize(SAMPLE_RATE, 2, BLOCK_SIZE).unwrap();

    let mut buffer = vec![0.0; BLOCK_SIZE * 2];
    let freeze = ParameterValueUpdate::Raw(Box::new(true));
    for block in 0..200 {
        fill_block(&mut buffer, block);
        let time = drift::EffectTime::new((block * BLOCK_SIZE) as u64, Some(120.0));
        assert_no_alloc(|| {
            if block == 100 {
                effect
                    .process_parameter_update(GranularEffect::FREEZE_ID, &freeze)
                    .unwrap();
            }
            effect.process(&mut buffer, &time);
        });
    }
    assert_no_violations();
}

#[test]
fn drift_delay_processing_does_not_allocate() {
    let mut host = EffectHost::new(Box::new(DriftDelayEffect::new()));
    let handle = host.parameter_handle();
    handle.set(DriftDelayEffect::SYNC_ID, 1.0).unwrap();
    handle.set(DriftDelayEffect::TAPS_ID, 4.0).unwrap();
    handle.set(DriftDelayEffect::DIFFUSE_ID, 0.7).unwrap();
    handle.set(DriftDelayEffect::DUCK_ID, 0.5).unwrap();
    host.prepare(SAMPLE_RATE, BLOCK_SIZE).unwrap();

    let mix = FloatParameter::new(DriftDelayEffect::MIX_ID, "Mix", 0.0..=1.0, 0.35);
    let (mix_id, mix_update) = mix.value_update(0.8);

    let mut left = vec![0.0; BLOCK_SIZE * 3];
    let mut right = vec![0.0; BLOCK_SIZE * 3];
    for block in 0..100 {
        let transport = Transport::new(Some(132.0), (block * BLOCK_SIZE * 3) as u64);
        left.fill(0.25);
        right.fill(-0.25);
        assert_no_alloc(|| {
            if block == 50 {
                host.effect_mut()
                    .process_parameter_update(mix_id, &mix_update)
                    .unwrap();
            }
            host.process_planar(&mut left, &mut right, &transport);
        });
    }
    assert_no_violations();
}
