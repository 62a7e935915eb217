//! Built-in demo functions served by `courier run`.
//!
//! | Interface | Arguments | Yields |
//! |-----------|-----------|--------|
//! | `echo` | any | the arguments as one object |
//! | `add-one` | `x: int` | `x + 1` |
//! | `count` | `n: int` | `1..=n`, one yield each |
//! | `sleep` | `ms: int` | nothing, after `ms` milliseconds |
//! | `fail` | optional `message: str` | nothing, ends with `ERROR` |

use courier_runtime::{FunctionError, FunctionRegistry};
use serde_json::{json, Map, Value};
use std::time::Duration;

/// Upper bound for `count`, keeps a typo from flooding the terminal.
const MAX_COUNT: i64 = 10_000;

fn int_arg(args: &Map<String, Value>, name: &str) -> Result<i64, FunctionError> {
    args.get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| FunctionError::Recoverable(format!("argument '{name}' must be an integer")))
}

/// Registry with every demo function.
#[must_use]
pub fn registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry
        .register("echo", |args, ctx| async move {
            ctx.yield_returns(vec![Value::Object(args)]);
            Ok(())
        })
        .register("add-one", |args, ctx| async move {
            let x = int_arg(&args, "x")?;
            ctx.log(format!("adding one to {x}"));
            ctx.yield_returns(vec![json!(x + 1)]);
            Ok(())
        })
        .register("count", |args, ctx| async move {
            let n = int_arg(&args, "n")?;
            if !(0..=MAX_COUNT).contains(&n) {
                return Err(FunctionError::Recoverable(format!(
                    "argument 'n' must be within 0..={MAX_COUNT}"
                )));
            }
            for i in 1..=n {
                let percent = u8::try_from(i * 100 / n.max(1)).unwrap_or(100);
                ctx.progress(percent, None);
                ctx.yield_returns(vec![json!(i)]);
                tokio::task::yield_now().await;
            }
            Ok(())
        })
        .register("sleep", |args, ctx| async move {
            let ms = int_arg(&args, "ms")?;
            let ms = u64::try_from(ms)
                .map_err(|_| FunctionError::Recoverable("argument 'ms' must not be negative".into()))?;
            ctx.log(format!("sleeping {ms}ms"));
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(())
        })
        .register("fail", |args, _ctx| async move {
            let message = args
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("requested failure")
                .to_string();
            Err(FunctionError::Recoverable(message))
        });
    registry
}
