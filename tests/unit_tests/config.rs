use hofem::config::{Backend, Config, ExecutionPolicy, Runtime};
use hofem::launch::DEFAULT_BLOCK_SIZE;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.backend, Backend::Sequential);
    assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
    assert_eq!(config.device_memory_limit, None);
    assert_eq!(config.check_residency, cfg!(debug_assertions));
    assert!(config.validate().is_ok());
}

#[test]
fn config_from_json_fills_in_defaults() {
    let config: Config = serde_json::from_str(r#"{ "backend": "device", "block_size": 128 }"#).unwrap();
    assert_eq!(config.backend, Backend::Device);
    assert_eq!(config.block_size, 128);
    assert_eq!(config.device_memory_limit, None);

    let config: Config = serde_json::from_str(r#"{ "device_memory_limit": 4096 }"#).unwrap();
    assert_eq!(config.backend, Backend::Sequential);
    assert_eq!(config.block_size, DEFAULT_BLOCK_SIZE);
    assert_eq!(config.device_memory_limit, Some(4096));
}

#[test]
fn config_json_round_trip() {
    let config = Config::with_backend(Backend::Parallel)
        .block_size(64)
        .device_memory_limit(1 << 20)
        .check_residency(true);
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains(r#""backend":"parallel""#));
    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn unknown_backend_is_rejected_by_parser() {
    let result: Result<Config, _> = serde_json::from_str(r#"{ "backend": "opencl" }"#);
    assert!(result.is_err());
}

#[test]
fn invalid_block_sizes_are_configuration_errors() {
    assert!(Config::default().block_size(0).validate().is_err());
    assert!(Config::default().block_size(1025).validate().is_err());
    assert!(Config::default().block_size(1).validate().is_ok());
    assert!(Config::default().block_size(1024).validate().is_ok());
    assert!(Runtime::try_new(Config::with_backend(Backend::Device).block_size(2048)).is_err());
}

#[test]
fn zero_device_memory_is_a_configuration_error() {
    let config = Config::with_backend(Backend::Device).device_memory_limit(0);
    let err = Runtime::try_new(config).unwrap_err();
    assert!(format!("{:#}", err).contains("non-zero device memory limit"));

    // The limit is irrelevant for host backends
    assert!(Runtime::try_new(Config::with_backend(Backend::Parallel).device_memory_limit(0)).is_ok());
}

#[test]
#[should_panic(expected = "Runtime::new")]
fn runtime_new_is_fatal_on_invalid_config() {
    Runtime::new(Config::default().block_size(0));
}

#[test]
fn runtime_owns_device_only_for_device_backend() {
    for backend in [Backend::Sequential, Backend::Parallel] {
        let runtime = Runtime::new(Config::with_backend(backend));
        assert!(runtime.device().is_none());
        assert_eq!(runtime.backend(), backend);
    }

    let runtime = Runtime::new(Config::with_backend(Backend::Device).device_memory_limit(1024));
    let device = runtime.device().expect("device backend must create a device");
    assert_eq!(device.memory_limit(), Some(1024));
    assert_eq!(device.allocated_bytes(), 0);
    assert!(device.stream().is_idle());
}

#[test]
fn runtime_policy_reflects_config() {
    let runtime = Runtime::new(Config::with_backend(Backend::Device).block_size(32));
    assert_eq!(
        runtime.policy(),
        ExecutionPolicy {
            backend: Backend::Device,
            block_size: 32
        }
    );
    assert_eq!(runtime.config().block_size, 32);
}

#[test]
fn backend_display_matches_serialized_name() {
    for backend in [Backend::Sequential, Backend::Parallel, Backend::Device] {
        let json = serde_json::to_string(&backend).unwrap();
        assert_eq!(json, format!("\"{}\"", backend));
    }
}
