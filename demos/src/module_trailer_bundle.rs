//! Builds a fake host executable with a trailer-appended module bundle, then
//! loads it back — demonstrating `runtime::modules::bundle::{append_trailer,
//! load_from_executable}`.

use runtime::modules::bundle;
use runtime::modules::ModuleRegistry;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut exe = b"fake-elf-header".to_vec();
    bundle::append_trailer(
        &mut exe,
        &[
            ("@app/main", b"main-bytecode" as &[u8]),
            ("@app/util", b"util-bytecode" as &[u8]),
        ],
    );

    let path = std::env::temp_dir().join(format!("tjsr-demo-bundle-{}", std::process::id()));
    std::fs::write(&path, &exe)?;

    let mut registry = ModuleRegistry::new();
    let loaded = bundle::load_from_executable(&path, &mut registry);
    tracing::info!(loaded, "modules recovered from trailer");
    for name in ["@app/main", "@app/util"] {
        let bytecode = registry.lookup(name).expect("module present in registry");
        tracing::info!(name, bytes = bytecode.len(), "resolved module");
    }

    std::fs::remove_file(&path)?;
    Ok(())
}
