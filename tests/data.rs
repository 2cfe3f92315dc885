#![cfg(feature = "serde")]

use testsched::{Config, Instance, InstanceData, PricerKind};

const INSTANCE: &str = r#"{
    "tests": [
        {"id": 1, "release": 0, "deadline": 4, "prep": 0, "turnaround": 2, "analysis": 1},
        {"id": 2, "release": 3, "deadline": 9, "prep": 1, "turnaround": 2, "analysis": 0, "processing": 5}
    ],
    "vehicle_releases": {"0": 1, "2": 2},
    "compatible": [[1, 2]],
    "horizon": {"start": 0, "end": 14},
    "vehicle_cost": 12.5
}"#;

#[test]
fn instance_from_json() {
    let data: InstanceData = serde_json::from_str(INSTANCE).unwrap();
    let instance = Instance::try_from(data).unwrap();

    assert_eq!(instance.num_tests(), 2);
    assert_eq!(instance.test(2).map(|t| t.duration()), Some(5));
    assert_eq!(instance.vehicles(2), 2);
    assert!(instance.may_precede(1, 2));
    assert!(!instance.may_precede(2, 1));
    assert_eq!(instance.facility().capacity(0), None);
    assert_eq!(instance.vehicle_cost(), 12.5);
}

#[test]
fn partial_config() {
    let config: Config = serde_json::from_str(r#"{"pricer": "Hybrid", "max_nodes": 10}"#).unwrap();
    assert_eq!(config.pricer, PricerKind::Hybrid);
    assert_eq!(config.max_nodes, 10);
    assert_eq!(config.max_sequence_len, Config::default().max_sequence_len);
}
