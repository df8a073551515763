use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use plsp_contracts::PLSP_ARTIFACT_SCHEMA_VERSION;
use plsp_rt::routine::{CallContext, FnRoutine};
use plsp_rt::PlResult;
use plsp_server::{
    builtins, ArtifactScope, DescriptorLoader, LookupError, Registry, RegistryConfig, SymbolTable,
};
use plsp_wire::HostValue;
use plspc::ArtifactDescriptor;

fn symbols() -> Arc<SymbolTable> {
    let mut table = SymbolTable::new();
    table.register(
        "one",
        Arc::new(FnRoutine(
            |_: &mut dyn CallContext, _: &mut [HostValue]| -> PlResult<HostValue> {
                Ok(HostValue::I32(1))
            },
        )),
    );
    table.register(
        "two",
        Arc::new(FnRoutine(
            |_: &mut dyn CallContext, _: &mut [HostValue]| -> PlResult<HostValue> {
                Ok(HostValue::I32(2))
            },
        )),
    );
    builtins::register_symbols(&mut table);
    Arc::new(table)
}

fn descriptor(name: &str, routine: &str, entry: &str) -> String {
    let desc = ArtifactDescriptor {
        schema_version: PLSP_ARTIFACT_SCHEMA_VERSION.to_string(),
        name: name.to_string(),
        routine: routine.to_string(),
        params: vec!["i32?".to_string()],
        returns: Some("i32?".to_string()),
        entry: entry.to_string(),
        decl: String::new(),
        digest: String::new(),
    };
    serde_json::to_string_pretty(&desc).unwrap()
}

fn write_descriptor(dir: &Path, file: &str, body: &str) {
    fs::write(dir.join(format!("{file}.artifact.json")), body).unwrap();
}

/// Moves the directory's mtime forward so the change is seen even on
/// filesystems with coarse timestamps.
fn touch_dir(dir: &Path, secs: u64) {
    fs::File::open(dir)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(secs))
        .unwrap();
}

fn open(dynamic: Option<&Path>, static_dir: Option<&Path>, reload_lock: bool) -> Registry {
    Registry::open(
        &RegistryConfig {
            dynamic_dir: dynamic.map(Path::to_path_buf),
            static_dir: static_dir.map(Path::to_path_buf),
            reload_lock,
        },
        Arc::new(DescriptorLoader::new(symbols())),
        builtins::scope().unwrap(),
    )
    .unwrap()
}

#[test]
fn unchanged_directory_is_loaded_once() {
    let tmp = tempfile::tempdir().unwrap();
    write_descriptor(tmp.path(), "a", &descriptor("pkg", "F", "one"));
    let registry = open(Some(tmp.path()), None, false);

    for _ in 0..5 {
        let a = registry.lookup("'pkg'.F(i32?)").unwrap();
        assert_eq!(a.entry, "one");
    }
    let stats = registry.stats();
    assert_eq!(stats.rebuilds, 1);
    assert_eq!(stats.lookups, 5);
    assert_eq!(stats.dynamic_artifacts, 1);
    assert_eq!(stats.dynamic_digest.len(), 64);
}

#[test]
fn directory_change_swaps_the_scope() {
    let tmp = tempfile::tempdir().unwrap();
    write_descriptor(tmp.path(), "a", &descriptor("pkg", "F", "one"));
    let registry = open(Some(tmp.path()), None, false);
    let before = registry.lookup("'pkg'.F(i32?)").unwrap();
    assert_eq!(before.entry, "one");

    write_descriptor(tmp.path(), "a", &descriptor("pkg", "F", "two"));
    write_descriptor(tmp.path(), "b", &descriptor("pkg", "G", "one"));
    touch_dir(tmp.path(), 10);

    let after = registry.lookup("'pkg'.F(i32?)").unwrap();
    assert_eq!(after.entry, "two");
    assert!(registry.lookup("'pkg'.G(i32?)").is_ok());
    // A routine resolved before the swap stays usable.
    assert_eq!(before.entry, "one");
    assert_eq!(registry.stats().rebuilds, 2);
    assert_eq!(registry.stats().generation, 2);

    fs::remove_file(tmp.path().join("b.artifact.json")).unwrap();
    touch_dir(tmp.path(), 20);
    let err = registry.lookup("'pkg'.G(i32?)").unwrap_err();
    assert!(matches!(err, LookupError::NotFound(_)), "{err:?}");
}

#[test]
fn static_scope_is_never_reloaded() {
    let dynamic = tempfile::tempdir().unwrap();
    let fixed = tempfile::tempdir().unwrap();
    write_descriptor(fixed.path(), "s", &descriptor("lib", "S", "one"));
    let registry = open(Some(dynamic.path()), Some(fixed.path()), false);

    assert_eq!(registry.lookup("'lib'.S(i32?)").unwrap().entry, "one");
    write_descriptor(fixed.path(), "s", &descriptor("lib", "S", "two"));
    touch_dir(fixed.path(), 10);
    assert_eq!(registry.lookup("'lib'.S(i32?)").unwrap().entry, "one");
    assert_eq!(registry.stats().static_artifacts, 1);
}

#[test]
fn dynamic_scope_shadows_static_and_builtin() {
    let dynamic = tempfile::tempdir().unwrap();
    let fixed = tempfile::tempdir().unwrap();
    write_descriptor(fixed.path(), "s", &descriptor("lib", "S", "one"));
    write_descriptor(dynamic.path(), "s", &descriptor("lib", "S", "two"));
    let registry = open(Some(dynamic.path()), Some(fixed.path()), false);

    assert_eq!(registry.lookup("'lib'.S(i32?)").unwrap().entry, "two");
    assert_eq!(
        registry.lookup("'plsp'.echo(string)").unwrap().entry,
        "plsp_echo"
    );
}

#[test]
fn descriptors_inside_zip_bundles_are_loaded() {
    let tmp = tempfile::tempdir().unwrap();
    let file = fs::File::create(tmp.path().join("bundle.zip")).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    zip.start_file("routines/z.artifact.json", options).unwrap();
    zip.write_all(descriptor("zipped", "Z", "two").as_bytes())
        .unwrap();
    zip.start_file("README.txt", options).unwrap();
    zip.write_all(b"not a descriptor").unwrap();
    zip.finish().unwrap();

    let registry = open(Some(tmp.path()), None, false);
    assert_eq!(registry.lookup("'zipped'.Z(i32?)").unwrap().entry, "two");
    assert_eq!(registry.stats().dynamic_artifacts, 1);
}

#[test]
fn broken_scope_fails_lookups_until_fixed() {
    let tmp = tempfile::tempdir().unwrap();
    write_descriptor(tmp.path(), "a", &descriptor("pkg", "F", "missing_symbol"));
    let registry = open(Some(tmp.path()), None, false);

    let err = registry.lookup("'pkg'.F(i32?)").unwrap_err();
    let LookupError::Load { message, .. } = &err else {
        panic!("expected load error, got {err:?}");
    };
    assert!(message.contains("missing_symbol"), "{message}");

    write_descriptor(tmp.path(), "a", &descriptor("pkg", "F", "one"));
    touch_dir(tmp.path(), 10);
    assert_eq!(registry.lookup("'pkg'.F(i32?)").unwrap().entry, "one");
}

#[test]
fn missing_dynamic_directory_is_an_empty_scope() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = open(Some(&tmp.path().join("not-yet")), None, false);
    assert!(matches!(
        registry.lookup("'pkg'.F(i32?)"),
        Err(LookupError::NotFound(_))
    ));
    assert!(registry.lookup("'plsp'.version()").is_ok());
}

#[test]
fn invalidate_forces_a_rebuild() {
    let tmp = tempfile::tempdir().unwrap();
    write_descriptor(tmp.path(), "a", &descriptor("pkg", "F", "one"));
    let registry = open(Some(tmp.path()), None, false);
    registry.lookup("'pkg'.F(i32?)").unwrap();
    registry.invalidate();
    registry.lookup("'pkg'.F(i32?)").unwrap();
    assert_eq!(registry.stats().rebuilds, 2);
}

#[test]
fn malformed_signature_is_rejected_before_any_scope() {
    let registry = open(None, None, false);
    let err = registry.lookup("'pkg'.F(i32").unwrap_err();
    assert!(matches!(err, LookupError::Signature(_)), "{err:?}");
    assert_eq!(registry.stats().rebuilds, 0);
}

#[test]
fn parallel_lookups_with_reload_lock_rebuild_once() {
    let tmp = tempfile::tempdir().unwrap();
    write_descriptor(tmp.path(), "a", &descriptor("pkg", "F", "one"));
    let registry = Arc::new(open(Some(tmp.path()), None, true));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..20 {
                    assert_eq!(registry.lookup("'pkg'.F(i32?)").unwrap().entry, "one");
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(registry.stats().rebuilds, 1);
    assert_eq!(registry.stats().lookups, 160);
}

#[test]
fn empty_builtin_scope_resolves_nothing() {
    let registry = Registry::open(
        &RegistryConfig::default(),
        Arc::new(DescriptorLoader::new(symbols())),
        ArtifactScope::new(0),
    )
    .unwrap();
    assert!(matches!(
        registry.lookup("'plsp'.echo(string)"),
        Err(LookupError::NotFound(_))
    ));
}

#[test]
fn broken_dynamic_scope_does_not_hide_static_or_builtins() {
    let dynamic = tempfile::tempdir().unwrap();
    let fixed = tempfile::tempdir().unwrap();
    write_descriptor(fixed.path(), "s", &descriptor("lib", "S", "one"));
    write_descriptor(dynamic.path(), "a", &descriptor("pkg", "F", "missing_symbol"));
    let registry = open(Some(dynamic.path()), Some(fixed.path()), false);

    assert_eq!(registry.lookup("'lib'.S(i32?)").unwrap().entry, "one");
    assert!(registry.lookup("'plsp'.version()").is_ok());
    assert!(matches!(
        registry.lookup("'pkg'.F(i32?)"),
        Err(LookupError::Load { .. })
    ));
}

#[test]
fn host_registry_binds_embedded_symbols_next_to_builtins() {
    let tmp = tempfile::tempdir().unwrap();
    write_descriptor(tmp.path(), "h", &descriptor("host", "H", "host_fn"));
    let config = plsp_server::ServerConfig {
        dynamic_dir: Some(tmp.path().to_path_buf()),
        ..plsp_server::ServerConfig::default()
    };
    let mut table = SymbolTable::new();
    table.register(
        "host_fn",
        Arc::new(FnRoutine(
            |_: &mut dyn CallContext, _: &mut [HostValue]| -> PlResult<HostValue> {
                Ok(HostValue::I32(42))
            },
        )),
    );

    let registry = plsp_server::cli::open_registry(&config, table).unwrap();
    assert_eq!(registry.lookup("'host'.H(i32?)").unwrap().entry, "host_fn");
    assert_eq!(
        registry.lookup("'plsp'.echo(string)").unwrap().entry,
        "plsp_echo"
    );
}
