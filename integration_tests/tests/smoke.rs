mod common;

use drift_core::{load_run_config_from_env, ConfigSource};

#[test]
fn env_config_is_picked_up() {
    common::ensure_test_config();
    let (config, source) = load_run_config_from_env();
    assert_eq!(
        source,
        ConfigSource::File(common::fixture_path("test_run_config.json"))
    );
    assert_eq!(config.run.length_hours, 6);

    let landers = config.lander_grid().expect("fixture config is valid");
    assert_eq!(landers.grid().dimensions(), (3, 3));
}

#[test]
fn fixtures_load() {
    assert_eq!(common::load_readings().unwrap().len(), 8);
    assert_eq!(common::load_samples().unwrap().len(), 9);
}
