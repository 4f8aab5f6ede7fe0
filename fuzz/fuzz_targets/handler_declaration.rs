#![no_main]

use std::path::Path;

use cmdhost_args::SchemaStore;
use cmdhost_commands::{parse_handler_config, EntryPoint, HandlerConfig};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);

    if let Ok(config) = serde_json::from_str::<HandlerConfig>(&raw) {
        let named = config.arguments.iter().all(|entry| entry.is_named());
        let mut store = SchemaStore::default();
        let added = store.add_schema(config.arguments);
        assert_eq!(added.is_ok(), named);
        if added.is_err() {
            assert!(store.is_empty());
        }
    }

    if let Ok(config) = parse_handler_config(&raw, Path::new("command.json")) {
        assert!(config.arguments.iter().all(|entry| entry.is_named()));
        let mut seen = std::collections::HashSet::new();
        assert!(config.inject_modules.iter().all(|name| seen.insert(name)));
    }

    let _ = serde_json::from_str::<EntryPoint>(&raw);
});
