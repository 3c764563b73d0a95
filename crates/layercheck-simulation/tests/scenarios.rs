//! End-to-end builds on the headless scene

use layercheck_settings::Config;
use layercheck_simulation::{BuildSimulation, HeadlessScene, StabilityOutcome};

const OFFSET_BEAD: &str = "G90\n\
    G0 X10 Y10 Z0.12\n\
    G1 X20 Y10 E1\n\
    G0 X10 Y10.15 Z0.24\n\
    G1 X20 Y10.15 E1\n";

fn run(config: &Config, toolpath: &str) -> BuildSimulation {
    let mut sim = BuildSimulation::from_config(config, toolpath).unwrap();
    let mut scene = HeadlessScene::from_config(config);
    sim.run(config.stability.fixed_timestep, &mut scene, true)
        .unwrap();
    sim
}

#[test]
fn test_offset_bead_hangs_off_its_attachment() {
    let sim = run(&Config::default(), OFFSET_BEAD);

    let reports = sim.reports();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].segments, 1);
    assert_eq!(reports[1].attachments, 1);
    assert!(reports[1].outcome.is_stable());
}

#[test]
fn test_weak_attachment_breaks() {
    let mut config = Config::default();
    config.stability.joint_break_force = 1.0e-9;
    config.stability.joint_break_torque = 1.0e-9;
    let sim = run(&config, OFFSET_BEAD);

    let reports = sim.reports();
    let StabilityOutcome::Failed { segments } = &reports[1].outcome else {
        panic!("expected layer 1 to fail");
    };
    assert_eq!(segments.len(), 1);
}

#[test]
fn test_bridge_between_two_pillars_is_stable() {
    let toolpath = "G90\n\
        G0 X10 Y10 Z0.12\nG1 X12 Y10 E1\n\
        G0 X18 Y10\nG1 X20 Y10 E1\n\
        G0 X10 Y10 Z0.24\nG1 X20 Y10 E1\n";
    let sim = run(&Config::default(), toolpath);

    let reports = sim.reports();
    assert_eq!(reports.len(), 2);
    // Supported over the first pillar, bridge, supported over the second
    assert_eq!(reports[1].segments, 3);
    assert!(reports[1].outcome.is_stable());
}

#[test]
fn test_cantilever_fails() {
    let toolpath = "G90\n\
        G0 X10 Y10 Z0.12\nG1 X12 Y10 E1\n\
        G0 X10 Y10 Z0.24\nG1 X20 Y10 E1\n";
    let sim = run(&Config::default(), toolpath);

    let reports = sim.reports();
    assert_eq!(reports[1].segments, 2);
    assert!(!reports[1].outcome.is_stable());
    assert!(sim.is_finished());
}
