mod common;

use clickgate::{ClickGate, ConfigError, GateConfig, InMemoryRecordStore, ManualClock, PolicyError};
use common::T0;
use std::collections::HashMap;
use std::time::Duration;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[tokio::test]
async fn environment_driven_gate_uses_overridden_thresholds() {
    let vars = env(&[
        ("CLICKGATE_FLOOD_0_LIMIT", "2"),
        ("CLICKGATE_FLOOD_1_LIMIT", "4"),
        ("CLICKGATE_FLOOD_1_TIMEOUT", "90"),
        ("CLICKGATE_UTC_OFFSET_MINUTES", "60"),
    ]);
    let config = GateConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
    let gate = ClickGate::from_config(InMemoryRecordStore::new(), &config)
        .unwrap()
        .with_clock(ManualClock::starting_at(T0));

    let mut last = None;
    for _ in 0..5 {
        last = Some(gate.evaluate_click("u1").await.unwrap());
    }
    let blocked = last.unwrap();
    assert_eq!(blocked.tier(), Some(1));

    let rendered = gate.render(&blocked);
    // 22:14:50 UTC shown at UTC+1
    assert_eq!(rendered.message, "90s/23:14:50");
}

#[tokio::test]
async fn json_config_round_trips_into_a_gate() {
    let config = GateConfig::from_json_str(
        r#"{
            "cycle_secs": 5,
            "flood_intensity": 2,
            "store_timeout_ms": 500,
            "conflict_retries": 5,
            "release_delay_ms": 1000
        }"#,
    )
    .unwrap();
    assert_eq!(config.store_timeout(), Duration::from_millis(500));

    let gate = ClickGate::from_config(InMemoryRecordStore::new(), &config).unwrap();
    assert_eq!(gate.policy().cycle(), Duration::from_secs(5));
    assert_eq!(serde_json::to_value(&config).unwrap()["conflict_retries"], 5);
}

#[test]
fn misconfigured_policy_is_rejected_before_a_gate_exists() {
    let config = GateConfig { cooldown_secs: [60, 0, 600, 900, 1800], ..GateConfig::default() };
    let err = ClickGate::from_config(InMemoryRecordStore::new(), &config).unwrap_err();
    assert!(matches!(err, ConfigError::Policy(PolicyError::ZeroCooldown { level: 2 })));
    assert_eq!(err.to_string(), "cool-down for block tier 2 must be > 0");
}
