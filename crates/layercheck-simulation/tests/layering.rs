//! Layer bucketing and the fetch protocol

mod common;

use common::ScriptedScene;
use layercheck_core::Vec3;
use layercheck_gcode::CommandStream;
use layercheck_settings::Config;
use layercheck_simulation::{Fetch, LayerAssembler, LayerState};
use proptest::prelude::*;

fn layered_toolpath(layers: usize, beads_per_layer: usize) -> String {
    let mut gcode = String::from("G28\nG90\n");
    for layer in 0..layers {
        gcode.push_str(&format!("G0 X0 Y0 Z{:.2}\n", 0.12 * (layer + 1) as f32));
        for bead in 0..beads_per_layer {
            gcode.push_str(&format!("G1 X{} E1\n", (bead + 1) * 5));
        }
    }
    gcode
}

fn assembler(gcode: &str) -> LayerAssembler {
    LayerAssembler::from_config(&Config::default(), CommandStream::parse(gcode).unwrap())
}

fn fetch(assembler: &mut LayerAssembler, id: usize, scene: &mut ScriptedScene) -> Fetch {
    loop {
        match assembler.fetch_layer(id, scene).unwrap() {
            Fetch::Pending => continue,
            other => return other,
        }
    }
}

/// Fetch every layer in order the way a build would, retiring as it goes
fn fetch_all(assembler: &mut LayerAssembler, scene: &mut ScriptedScene) -> Vec<(usize, usize)> {
    let mut seen = Vec::new();
    for id in 0.. {
        match fetch(assembler, id, scene) {
            Fetch::Ready(ready) => {
                assert!(assembler.held_layers() <= 3);
                seen.push((ready, assembler.layer(ready).unwrap().len()));
                if ready > 0 {
                    assembler.retire(ready - 1, scene);
                }
            }
            Fetch::EndOfModel => break,
            Fetch::Pending => unreachable!(),
        }
    }
    seen
}

#[test]
fn test_flat_toolpath_is_a_single_layer() {
    let mut assembler = assembler("G90\nG1 X10 Y0 Z0 E1\nG1 X20 Y0 Z0 E1");
    let mut scene = ScriptedScene::new();

    assert_eq!(fetch(&mut assembler, 0, &mut scene), Fetch::Ready(0));
    let layer = assembler.layer(0).unwrap();
    let ends: Vec<_> = layer
        .segments()
        .iter()
        .map(|placed| (placed.segment.start, placed.segment.end))
        .collect();
    assert_eq!(
        ends,
        vec![
            (Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)),
            (Vec3::new(10.0, 0.0, 0.0), Vec3::new(20.0, 0.0, 0.0)),
        ]
    );

    assert_eq!(fetch(&mut assembler, 1, &mut scene), Fetch::EndOfModel);
}

#[test]
fn test_three_layers_get_consecutive_ids() {
    let mut assembler = assembler(&layered_toolpath(3, 2));
    let mut scene = ScriptedScene::new();

    let seen = fetch_all(&mut assembler, &mut scene);
    assert_eq!(seen, vec![(0, 2), (1, 2), (2, 2)]);
}

#[test]
fn test_fetch_past_last_layer_ends_model() {
    let mut assembler = assembler(&layered_toolpath(3, 2));
    let mut scene = ScriptedScene::new();

    let mut pending = 0;
    let answer = loop {
        match assembler.fetch_layer(5, &mut scene).unwrap() {
            Fetch::Pending => pending += 1,
            other => break other,
        }
    };
    assert_eq!(answer, Fetch::EndOfModel);
    assert!(pending > 0);
    assert_eq!(assembler.max_layer_id(), Some(2));
    assert!(assembler
        .layers()
        .all(|layer| layer.state() == LayerState::Sealed));
}

#[test]
fn test_retired_layers_release_their_bodies() {
    let mut assembler = assembler(&layered_toolpath(5, 3));
    let mut scene = ScriptedScene::new();

    fetch_all(&mut assembler, &mut scene);
    // Layers 0 to 2 go as soon as a layer two above them exists; 3 stays
    // behind because the toolpath ends before layer 5 appears
    assert_eq!(scene.released, 9);
    assert_eq!(scene.live_bodies(), 6);
}

#[test]
fn test_empty_toolpath_has_no_layers() {
    let mut assembler = assembler("G28\n; nothing to print\n");
    let mut scene = ScriptedScene::new();
    assert_eq!(fetch(&mut assembler, 0, &mut scene), Fetch::EndOfModel);
    assert_eq!(assembler.held_layers(), 0);
}

#[test]
fn test_layers_within_tolerance_merge() {
    let gcode = "G0 Z0.12\nG1 X5 E1\nG0 Z0.125\nG1 X10 E1\nG0 Z0.24\nG1 X5 E1\n";
    let mut assembler = assembler(gcode);
    let mut scene = ScriptedScene::new();

    let seen = fetch_all(&mut assembler, &mut scene);
    assert_eq!(seen, vec![(0, 2), (1, 1)]);
}

proptest! {
    #[test]
    fn every_layer_is_found_in_order(layers in 1usize..6, beads in 1usize..4) {
        let mut assembler = assembler(&layered_toolpath(layers, beads));
        let mut scene = ScriptedScene::new();

        let seen = fetch_all(&mut assembler, &mut scene);
        let expected: Vec<_> = (0..layers).map(|id| (id, beads)).collect();
        prop_assert_eq!(seen, expected);
    }
}
