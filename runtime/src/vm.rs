//! # Runtime Shell
//!
//! Owns one `rquickjs::AsyncRuntime` + `AsyncContext` pair and the tokio
//! reactor driving it (spec.md §3 invariant: exactly one runtime per OS
//! thread). The prepare/check/stop-async handles of the original design are
//! expressed here as plain control flow rather than literal reactor
//! handles, since tokio has no handle-registration API to mirror: a
//! zero-duration yield stands in for "prepare", job-queue draining for
//! "check", and an `AtomicBool` + `tokio::sync::Notify` for "stop-async".

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use rquickjs::{AsyncContext, AsyncRuntime, CatchResultExt, Ctx};
use tokio::sync::Notify;

use crate::modules::{CoreLoader, CoreResolver, ModuleRegistry};
use crate::options::{RuntimeOptions, UnhandledRejection};
use crate::streams::core::LiveHandles;

/// Owns the engine + reactor pairing for one OS thread.
pub struct Runtime {
    js_runtime: AsyncRuntime,
    ctx: AsyncContext,
    options: RuntimeOptions,
    exit_code: Arc<AtomicI32>,
    stop_requested: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    live_handles: Arc<LiveHandles>,
}

impl Runtime {
    /// Constructs a fresh engine + reactor pairing. Failure to allocate the
    /// engine is fatal per spec.md §4.1, surfaced as `Err` rather than a
    /// panic since this is library code.
    pub async fn new(options: RuntimeOptions, registry: ModuleRegistry) -> rquickjs::Result<Self> {
        let js_runtime = AsyncRuntime::new()?;
        js_runtime.set_memory_limit(options.memory_limit).await;
        js_runtime.set_max_stack_size(options.stack_size).await;
        js_runtime
            .set_loader(CoreResolver::new(Arc::new(std::sync::Mutex::new(false))), CoreLoader::new(registry))
            .await;

        let ctx = AsyncContext::full(&js_runtime).await?;

        let runtime = Self {
            js_runtime,
            ctx,
            options,
            exit_code: Arc::new(AtomicI32::new(0)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
            live_handles: Arc::new(LiveHandles::new()),
        };
        runtime.install_rejection_hook().await;
        Ok(runtime)
    }

    /// Live-handle counter shared with every stream/timer this runtime owns.
    pub fn live_handles(&self) -> Arc<LiveHandles> {
        Arc::clone(&self.live_handles)
    }

    /// Runs a closure with access to the engine context, the single entry
    /// point for evaluating scripts or calling into JS.
    pub async fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R + Send,
        R: Send,
    {
        self.ctx.with(f).await
    }

    async fn install_rejection_hook(&self) {
        let exit_code = Arc::clone(&self.exit_code);
        let stop_requested = Arc::clone(&self.stop_requested);
        let stop_notify = Arc::clone(&self.stop_notify);
        let policy = self.options.unhandled_rejection;

        self.js_runtime
            .set_host_promise_rejection_tracker(Some(Box::new(move |_ctx, _promise, reason, is_handled| {
                if is_handled {
                    return;
                }
                let reason_str = reason
                    .try_into_string()
                    .map(|s| s.to_string().unwrap_or_default())
                    .unwrap_or_else(|_| "<unhandled rejection>".to_string());
                tracing::warn!(reason = %reason_str, "unhandled promise rejection");
                if policy == UnhandledRejection::Reject {
                    exit_code.store(1, Ordering::SeqCst);
                    stop_requested.store(true, Ordering::SeqCst);
                    stop_notify.notify_waiters();
                }
            })))
            .await;
    }

    /// `runtime.setExitCode(n)`.
    pub fn set_exit_code(&self, code: i32) {
        self.exit_code.store(code, Ordering::SeqCst);
    }

    /// `stop()`: wakes `run()` from any thread.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
    }

    /// Drains pending engine jobs to exhaustion (the "check" equivalent). A
    /// job that throws is logged and draining continues, per spec.md §4.1.
    async fn drain_jobs(&self) {
        loop {
            match self.js_runtime.execute_pending_job().await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(ex) => {
                    tracing::error!(error = %ex, "unhandled exception while draining engine jobs");
                }
            }
        }
    }

    /// Runs `{yield-if-pending; one reactor turn; drain jobs}` until no
    /// pending jobs remain and no tracked handle is still ref'd. Returns the
    /// process exit code.
    pub async fn run(&self) -> i32 {
        loop {
            if self.js_runtime.is_job_pending().await {
                tokio::task::yield_now().await;
            }

            self.drain_jobs().await;

            if self.stop_requested.load(Ordering::SeqCst) {
                break;
            }

            let pending = self.js_runtime.is_job_pending().await;
            let live = self.live_handles.count() > 0;
            if !pending && !live {
                break;
            }

            tokio::select! {
                _ = self.stop_notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(1)) => {}
            }
        }
        self.exit_code.load(Ordering::SeqCst)
    }

    /// Evaluates `source` as a module or script named `name`, per spec.md
    /// §4.2's `evalFile` contract (shebang handling is the caller's concern,
    /// since it operates on the raw bytes before this point).
    pub async fn eval(&self, name: &str, source: &str) -> rquickjs::Result<()> {
        let name = name.to_string();
        let source = source.to_string();
        self.with(move |ctx| {
            let loaded = name.clone();
            rquickjs::Module::declare(ctx.clone(), name, source)
                .and_then(|m| m.eval())
                .catch(&ctx)
                .map(|_| ())
                .map_err(|e| rquickjs::Error::new_loading_message(loaded, e.to_string()))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_exits_immediately_with_no_pending_work() {
        let runtime = Runtime::new(RuntimeOptions::default(), ModuleRegistry::new())
            .await
            .unwrap();
        let code = runtime.run().await;
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn set_exit_code_is_observed_by_run() {
        let runtime = Runtime::new(RuntimeOptions::default(), ModuleRegistry::new())
            .await
            .unwrap();
        runtime.set_exit_code(7);
        let code = runtime.run().await;
        assert_eq!(code, 7);
    }

    #[tokio::test]
    async fn eval_runs_a_trivial_module() {
        let runtime = Runtime::new(RuntimeOptions::default(), ModuleRegistry::new())
            .await
            .unwrap();
        runtime.eval("main.js", "globalThis.ran = true;").await.unwrap();
        let ran: bool = runtime
            .with(|ctx| ctx.globals().get("ran"))
            .await
            .unwrap();
        assert!(ran);
    }
}
