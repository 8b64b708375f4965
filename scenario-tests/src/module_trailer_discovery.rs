//! Scenario 5: module trailer discovery (spec.md §8, "Module trailer
//! discovery").
//!
//! A host executable with a trailer-appended bundle containing one module
//! `"@test/hello"` whose bytecode evaluates to `"world"`; after runtime
//! init, `import("@test/hello").then(m => m.default)` must resolve to
//! `"world"`.

use rquickjs::{Module, WriteOptions};
use runtime::modules::{bundle, ModuleRegistry};
use runtime::options::RuntimeOptions;
use runtime::Runtime;

#[tokio::main]
async fn main() {
    // Compile real bytecode for the module, the way an AOT compiler would
    // produce the trailer's contents (no such compiler is in scope here, so
    // this scenario is its own producer).
    let compile_rt = rquickjs::Runtime::new().expect("compiler runtime");
    let compile_ctx = rquickjs::Context::full(&compile_rt).expect("compiler context");
    let bytecode: Vec<u8> = compile_ctx
        .with(|ctx| {
            let module = Module::declare(ctx.clone(), "hello.js", "export default 'world';")?;
            module.write(WriteOptions::default())
        })
        .expect("compile module to bytecode");

    let mut exe = b"fake-elf-header".to_vec();
    bundle::append_trailer(&mut exe, &[("@test/hello", &bytecode)]);
    let path = std::env::temp_dir().join(format!(
        "tjsr-scenario-trailer-{}",
        std::process::id()
    ));
    std::fs::write(&path, &exe).expect("write fixture executable");

    let mut registry = ModuleRegistry::new();
    let loaded = bundle::load_from_executable(&path, &mut registry);
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded, 1, "exactly one trailer module must be recovered");

    let runtime = Runtime::new(RuntimeOptions::default(), registry)
        .await
        .expect("runtime construction");

    runtime
        .eval(
            "main.js",
            r#"
            globalThis.__result = "pending";
            import("@test/hello").then(m => { globalThis.__result = m.default; });
            "#,
        )
        .await
        .expect("eval must succeed");

    runtime.run().await;

    let result: String = runtime
        .with(|ctx| ctx.globals().get("__result"))
        .await
        .expect("read result global");
    assert_eq!(result, "world");
    println!("scenario-module-trailer-discovery: PASS");
}
