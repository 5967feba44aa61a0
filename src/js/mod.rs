//! Embedded JavaScript sandbox.
//!
//! A single dedicated OS thread owns the QuickJS runtime and context; every
//! evaluation and call executes there, in submission order, regardless of
//! which task submitted it. Results travel back over one-shot channels to
//! the caller's executor. `shutdown` raises the engine's interrupt flag so
//! an in-flight evaluation aborts at the next interruptible point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rquickjs::convert::Coerced;
use rquickjs::{Context, Ctx, Function, Runtime};
use tracing::{debug, error};

/// The AST solver parses multi-megabyte player scripts recursively.
const STACK_SIZE: usize = 8 * 1024 * 1024;
const JS_STACK_SIZE: usize = 4 * 1024 * 1024;
const MEMORY_LIMIT: usize = 256 * 1024 * 1024;

pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// The source failed to compile.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The evaluation threw or was interrupted.
    #[error("operation canceled: {0}")]
    OperationCanceled(String),
    #[error("sandbox is shut down")]
    Closed,
}

enum JobKind {
    Eval(String),
    EvalToString(String),
    Call(String, Vec<String>),
    Shutdown,
}

struct Job {
    kind: JobKind,
    reply: Option<tokio::sync::oneshot::Sender<SandboxResult<String>>>,
}

pub struct JsSandbox {
    jobs: flume::Sender<Job>,
    interrupt: Arc<AtomicBool>,
}

impl JsSandbox {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded::<Job>();
        let interrupt = Arc::new(AtomicBool::new(false));

        let flag = interrupt.clone();
        std::thread::Builder::new()
            .name("js-sandbox".into())
            .stack_size(STACK_SIZE)
            .spawn(move || worker_loop(rx, flag))
            .expect("failed to spawn sandbox worker thread");

        Self {
            jobs: tx,
            interrupt,
        }
    }

    /// Evaluate source for its side effects.
    pub async fn eval(&self, source: impl Into<String>) -> SandboxResult<()> {
        self.submit(JobKind::Eval(source.into())).await.map(|_| ())
    }

    /// Evaluate source and coerce the completion value to a string
    /// (JavaScript `String(...)` semantics).
    pub async fn eval_to_string(&self, source: impl Into<String>) -> SandboxResult<String> {
        self.submit(JobKind::EvalToString(source.into())).await
    }

    /// Call a named global function with string arguments.
    pub async fn call(&self, name: &str, args: Vec<String>) -> SandboxResult<String> {
        self.submit(JobKind::Call(name.to_string(), args)).await
    }

    /// Stop the worker unconditionally. Any in-flight evaluation is
    /// interrupted; queued and future submissions fail with [`SandboxError::Closed`].
    pub fn shutdown(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
        let _ = self.jobs.send(Job {
            kind: JobKind::Shutdown,
            reply: None,
        });
    }

    async fn submit(&self, kind: JobKind) -> SandboxResult<String> {
        if self.interrupt.load(Ordering::SeqCst) {
            return Err(SandboxError::Closed);
        }
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.jobs
            .send(Job {
                kind,
                reply: Some(reply_tx),
            })
            .map_err(|_| SandboxError::Closed)?;
        reply_rx.await.unwrap_or(Err(SandboxError::Closed))
    }
}

impl Default for JsSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JsSandbox {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: flume::Receiver<Job>, interrupt: Arc<AtomicBool>) {
    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to create JS runtime: {e}");
            for job in rx.iter() {
                if let Some(reply) = job.reply {
                    let _ = reply.send(Err(SandboxError::Closed));
                }
            }
            return;
        }
    };
    runtime.set_memory_limit(MEMORY_LIMIT);
    runtime.set_max_stack_size(JS_STACK_SIZE);
    {
        let flag = interrupt.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || flag.load(Ordering::SeqCst))));
    }

    let context = match Context::full(&runtime) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("failed to create JS context: {e}");
            for job in rx.iter() {
                if let Some(reply) = job.reply {
                    let _ = reply.send(Err(SandboxError::Closed));
                }
            }
            return;
        }
    };

    for job in rx.iter() {
        if interrupt.load(Ordering::SeqCst) || matches!(job.kind, JobKind::Shutdown) {
            if let Some(reply) = job.reply {
                let _ = reply.send(Err(SandboxError::Closed));
            }
            break;
        }

        let result = context.with(|ctx| run_job(&ctx, &job.kind));
        if let Some(reply) = job.reply {
            let _ = reply.send(result);
        }
    }

    // Refuse whatever is still queued.
    for job in rx.drain() {
        if let Some(reply) = job.reply {
            let _ = reply.send(Err(SandboxError::Closed));
        }
    }
    debug!("JS sandbox worker stopped");
}

fn run_job(ctx: &Ctx<'_>, kind: &JobKind) -> SandboxResult<String> {
    match kind {
        JobKind::Eval(source) => ctx
            .eval::<rquickjs::Value, _>(source.clone().into_bytes())
            .map(|_| String::new())
            .map_err(|e| map_error(ctx, e)),
        JobKind::EvalToString(source) => ctx
            .eval::<Coerced<String>, _>(source.clone().into_bytes())
            .map(|v| v.0)
            .map_err(|e| map_error(ctx, e)),
        JobKind::Call(name, args) => {
            let globals = ctx.globals();
            let function: Function = globals
                .get(name.as_str())
                .map_err(|_| SandboxError::OperationCanceled(format!("{name} is not a function")))?;
            let called = match args.len() {
                0 => function.call::<_, Coerced<String>>(()),
                1 => function.call::<_, Coerced<String>>((args[0].clone(),)),
                2 => function.call::<_, Coerced<String>>((args[0].clone(), args[1].clone())),
                _ => function.call::<_, Coerced<String>>((
                    args[0].clone(),
                    args[1].clone(),
                    args[2].clone(),
                )),
            };
            called.map(|v| v.0).map_err(|e| map_error(ctx, e))
        }
        JobKind::Shutdown => Err(SandboxError::Closed),
    }
}

/// Preserve the stringified JS exception; syntax errors are reported as
/// invalid arguments, everything else (including interrupts) as canceled.
fn map_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> SandboxError {
    let caught = ctx.catch();
    let (name, message) = match caught.as_exception() {
        Some(exception) => (
            exception.get::<_, String>("name").unwrap_or_default(),
            exception.message().unwrap_or_else(|| err.to_string()),
        ),
        None => (String::new(), err.to_string()),
    };

    if name == "SyntaxError" {
        SandboxError::InvalidArgument(message)
    } else {
        SandboxError::OperationCanceled(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn evaluates_and_coerces() {
        let sandbox = JsSandbox::new();
        assert_eq!(sandbox.eval_to_string("1 + 1").await.unwrap(), "2");
        assert_eq!(
            sandbox.eval_to_string("'a' + 'b'").await.unwrap(),
            "ab"
        );
    }

    #[tokio::test]
    async fn calls_named_functions() {
        let sandbox = JsSandbox::new();
        sandbox
            .eval("function dup(x) { return x + x; }")
            .await
            .unwrap();
        assert_eq!(
            sandbox.call("dup", vec!["ab".into()]).await.unwrap(),
            "abab"
        );
    }

    #[tokio::test]
    async fn jobs_run_in_submission_order() {
        let sandbox = JsSandbox::new();
        sandbox.eval("var acc = '';").await.unwrap();
        for i in 0..10 {
            sandbox.eval(format!("acc += '{i}';")).await.unwrap();
        }
        assert_eq!(sandbox.eval_to_string("acc").await.unwrap(), "0123456789");
    }

    #[tokio::test]
    async fn syntax_error_is_invalid_argument() {
        let sandbox = JsSandbox::new();
        match sandbox.eval("function {").await {
            Err(SandboxError::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn thrown_error_is_canceled() {
        let sandbox = JsSandbox::new();
        match sandbox.eval("throw new Error('boom')").await {
            Err(SandboxError::OperationCanceled(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected OperationCanceled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_interrupts_infinite_loop() {
        let sandbox = Arc::new(JsSandbox::new());
        let looping = {
            let sandbox = sandbox.clone();
            tokio::spawn(async move { sandbox.eval("while (true) {}").await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        sandbox.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(5), looping)
            .await
            .expect("interrupt did not fire")
            .unwrap();
        assert!(result.is_err());
        assert!(matches!(
            sandbox.eval("1").await,
            Err(SandboxError::Closed)
        ));
    }
}
