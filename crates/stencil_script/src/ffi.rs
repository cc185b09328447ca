//! FFI layer between Rust and scripts
//!
//! Everything that crosses the host/runtime boundary goes through here:
//! request text in, result text out, script exceptions rendered for
//! diagnostics, and the host functions scripts can call back into.

use rquickjs::convert::Coerced;
use rquickjs::function::Rest;
use rquickjs::{CaughtError, Ctx, Function, Object, Value};
use stencil_core::{BridgeError, Result};

/// Tracing target for output produced by scripts.
pub const SCRIPT_TARGET: &str = "stencil::script";

/// Copy host text into a runtime string.
pub(crate) fn encode_text<'js>(ctx: &Ctx<'js>, text: &str) -> Result<rquickjs::String<'js>> {
    rquickjs::String::from_str(ctx.clone(), text)
        .map_err(|e| BridgeError::Encode(describe_error(ctx, e)))
}

/// Copy a runtime string out into an owned host string.
///
/// The returned `String` owns its bytes; `value` may be collected as soon as
/// it is dropped.
pub(crate) fn decode_text(entry_point: &str, value: Value<'_>) -> Result<String> {
    if value.is_undefined() || value.is_null() {
        return Err(BridgeError::NoResult {
            entry_point: entry_point.to_string(),
        });
    }

    let Some(text) = value.as_string() else {
        return Err(BridgeError::Decode {
            entry_point: entry_point.to_string(),
            reason: format!("expected a string, got {:?}", value.type_of()),
        });
    };

    text.to_string().map_err(|e| BridgeError::Decode {
        entry_point: entry_point.to_string(),
        reason: e.to_string(),
    })
}

/// Render an error (pulling the pending exception out of `ctx` if there is
/// one) as a single diagnostic string.
pub(crate) fn describe_error(ctx: &Ctx<'_>, error: rquickjs::Error) -> String {
    CaughtError::from_error(ctx, error).to_string()
}

/// Expose `console.{log,info,debug,warn,error}` to scripts, forwarding to
/// tracing.
pub(crate) fn install_console(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    let console = Object::new(ctx.clone())?;

    console.set(
        "log",
        Function::new(ctx.clone(), |args: Rest<Coerced<String>>| {
            tracing::info!(target: SCRIPT_TARGET, "{}", join_args(args));
        })?,
    )?;
    console.set(
        "info",
        Function::new(ctx.clone(), |args: Rest<Coerced<String>>| {
            tracing::info!(target: SCRIPT_TARGET, "{}", join_args(args));
        })?,
    )?;
    console.set(
        "debug",
        Function::new(ctx.clone(), |args: Rest<Coerced<String>>| {
            tracing::debug!(target: SCRIPT_TARGET, "{}", join_args(args));
        })?,
    )?;
    console.set(
        "warn",
        Function::new(ctx.clone(), |args: Rest<Coerced<String>>| {
            tracing::warn!(target: SCRIPT_TARGET, "{}", join_args(args));
        })?,
    )?;
    console.set(
        "error",
        Function::new(ctx.clone(), |args: Rest<Coerced<String>>| {
            tracing::error!(target: SCRIPT_TARGET, "{}", join_args(args));
        })?,
    )?;

    ctx.globals().set("console", console)?;
    Ok(())
}

fn join_args(args: Rest<Coerced<String>>) -> String {
    args.0
        .into_iter()
        .map(|arg| arg.0)
        .collect::<Vec<_>>()
        .join(" ")
}
