//! End-to-end scenarios: the externalize plugin driven by the devext dev server.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use devext_core::dev::{load_config, DevServer, OptimizeOutcome, IMPORT_ANALYSIS_PLUGIN};
use devext_core::{DevConfig, SharedPlugin};
use devext_externalize::{
    externalize, ExternalizeOptions, ExternalizePlugin, PLUGIN_NAME, PREFIX_PLUGIN_NAME,
    STAND_IN_MODULE,
};
use tempfile::TempDir;

const MAIN: &str = "import { log } from 'custom-logger';\nlog('Message from logger.');\n";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// A page importing `custom-logger`, which is not installed.
fn project(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "src/main.js", MAIN);
    write(dir.path(), "devext.config.json", config);
    dir
}

/// Build a server the way an embedder would: config file first, then plugins.
fn server_from_config(root: &Path) -> DevServer {
    let (_, config) = load_config(root, None).unwrap().unwrap();
    let mut plugins: Vec<SharedPlugin> = Vec::new();
    if let Some(options) = ExternalizeOptions::from_config_file(&config).unwrap() {
        plugins.push(externalize(options));
    }
    DevServer::new(config.to_dev_config(root), plugins).unwrap()
}

#[test]
fn test_serves_bare_import_when_enabled() {
    init_tracing();
    let dir = project(r#"{ "plugins": { "externalize": { "externals": ["custom-logger"] } } }"#);
    let mut server = server_from_config(dir.path());

    server.optimize_deps(&["src/main.js"]).unwrap();
    let main = server.transform_request("/src/main.js").unwrap();

    assert_eq!(main.code, MAIN);

    let stand_in = server.transform_request("/@id/custom-logger").unwrap();
    assert_eq!(stand_in.code, STAND_IN_MODULE);
}

#[test]
fn test_serves_stand_in_for_dotted_external() {
    let dir = project(r#"{ "plugins": { "externalize": { "externals": ["lodash.debounce"] } } }"#);
    write(
        dir.path(),
        "src/main.js",
        "import debounce from 'lodash.debounce';\ndebounce();\n",
    );
    let server = server_from_config(dir.path());

    let main = server.transform_request("/src/main.js").unwrap();
    assert_eq!(main.code, "import debounce from 'lodash.debounce';\ndebounce();\n");

    let stand_in = server.transform_request("/@id/lodash.debounce").unwrap();
    assert_eq!(stand_in.code, STAND_IN_MODULE);
    assert_eq!(stand_in.file_path, "lodash.debounce");
}

#[test]
fn test_fails_to_resolve_when_disabled() {
    let dir = project("{}");
    let mut server = server_from_config(dir.path());

    server.optimize_deps(&["src/main.js"]).unwrap();
    let err = server.transform_request("/src/main.js").unwrap_err();

    assert!(err
        .to_string()
        .contains("Failed to resolve import \"custom-logger\""));
}

#[test]
fn test_strips_prefix_under_custom_base() {
    let dir = project(
        r#"{ "base": "/app/", "plugins": { "externalize": { "externals": [{ "pattern": "^custom-" }] } } }"#,
    );
    let server = server_from_config(dir.path());

    let main = server.transform_request("/app/src/main.js").unwrap();

    assert_eq!(main.code, MAIN);
    assert_eq!(server.config().base, "/app/");
}

#[test]
fn test_strip_plugin_runs_after_import_analysis() {
    let dir = project("{}");
    let server = DevServer::new(
        DevConfig::new(dir.path()),
        vec![externalize(ExternalizeOptions::with_names(["custom-logger"]))],
    )
    .unwrap();

    assert_eq!(
        server.plugins().plugin_names(),
        vec![PLUGIN_NAME, IMPORT_ANALYSIS_PLUGIN, PREFIX_PLUGIN_NAME]
    );
}

#[test]
fn test_included_entry_point_is_optimized_as_empty_module() {
    init_tracing();
    let dir = project(
        r#"{
  "optimizeDeps": { "include": ["custom-logger"] },
  "plugins": { "externalize": { "externals": ["custom-logger"] } }
}"#,
    );
    let mut server = server_from_config(dir.path());

    let outcome = server.optimize_deps(&["src/main.js"]).unwrap();

    assert_eq!(
        outcome,
        OptimizeOutcome::Optimized(vec!["custom-logger".to_string()])
    );
    assert_eq!(server.prebundler().get("custom-logger").unwrap().code, "");
}

#[test]
fn test_uninstalled_include_is_skipped_without_plugin() {
    let dir = project(r#"{ "optimizeDeps": { "include": ["custom-logger"] } }"#);
    let mut server = server_from_config(dir.path());

    // Not installed and not externalized: skipped with a warning.
    let outcome = server.optimize_deps(&["src/main.js"]).unwrap();

    assert_eq!(outcome, OptimizeOutcome::Optimized(Vec::new()));
    assert!(!server.prebundler().has("custom-logger"));
}

#[test]
fn test_warm_cache_still_externalizes() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "src/main.js",
        "import React from 'react';\nimport { log } from 'custom-logger';\nlog(React);\n",
    );
    write(
        root,
        "node_modules/react/index.js",
        "import { log } from 'custom-logger';\nexport default {};\n",
    );

    let start = || {
        let plugin = Arc::new(ExternalizePlugin::new(ExternalizeOptions::with_names([
            "custom-logger",
        ])));
        let server = DevServer::new(DevConfig::new(root), vec![plugin.clone() as SharedPlugin])
            .unwrap();
        (plugin, server)
    };

    let (cold_plugin, mut cold) = start();
    let outcome = cold.optimize_deps(&["src/main.js"]).unwrap();
    assert_eq!(outcome, OptimizeOutcome::Optimized(vec!["react".to_string()]));
    assert!(cold_plugin.registry().contains("custom-logger"));
    assert_eq!(
        cold.prebundler().get("react").unwrap().externals,
        vec!["custom-logger"]
    );

    let (warm_plugin, mut warm) = start();
    let outcome = warm.optimize_deps(&["src/main.js"]).unwrap();
    assert_eq!(outcome, OptimizeOutcome::Cached(vec!["react".to_string()]));
    assert!(warm_plugin.registry().is_empty());

    let main = warm.transform_request("/src/main.js").unwrap();

    assert_eq!(
        main.code,
        "import React from '/@modules/react';\nimport { log } from 'custom-logger';\nlog(React);\n"
    );
    assert!(warm_plugin.registry().contains("custom-logger"));
}
