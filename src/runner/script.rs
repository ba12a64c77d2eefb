use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{
    Context, JsError, JsNativeError, JsObject, JsResult, JsValue, NativeFunction, Source,
    js_string,
};
use std::cell::RefCell;

use crate::models::OutputKind;

/// Console lines and the thrown error (if any) of one in-process run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptReport {
    pub lines: Vec<(OutputKind, String)>,
    pub error: Option<String>,
}

thread_local! {
    // Each run owns its blocking thread until it returns.
    static LINES: RefCell<Vec<(OutputKind, String)>> = const { RefCell::new(Vec::new()) };
}

/// Evaluates `code` in a fresh engine. Blocking; callers run it off the
/// async executor.
///
/// `console` is backed by native functions, so nothing the script does to
/// its own globals can hide the lines it already printed or the error it
/// threw.
pub fn run_script(code: &str) -> ScriptReport {
    LINES.with_borrow_mut(Vec::clear);
    let mut context = Context::default();
    let error = match install_console(&mut context) {
        Ok(()) => context
            .eval(Source::from_bytes(code.as_bytes()))
            .err()
            .map(|e| thrown_message(&e, &mut context)),
        Err(e) => Some(format!("internal error: {e}")),
    };
    let lines = LINES.with_borrow_mut(std::mem::take);
    ScriptReport { lines, error }
}

fn install_console(context: &mut Context) -> JsResult<()> {
    // Captured before any user code runs; reassigning `JSON.stringify`
    // later does not reach it.
    let json = context.intrinsics().objects().json();
    let stringify = json.get(js_string!("stringify"), context)?;
    let Some(stringify) = stringify.as_callable().cloned() else {
        return Err(JsNativeError::typ()
            .with_message("JSON.stringify is not callable")
            .into());
    };
    let method =
        |f: ConsoleFn| NativeFunction::from_copy_closure_with_captures(f, stringify.clone());
    let console = ObjectInitializer::new(context)
        .function(method(console_log), js_string!("log"), 0)
        .function(method(console_error), js_string!("error"), 0)
        .function(method(console_warn), js_string!("warn"), 0)
        .function(method(console_info), js_string!("info"), 0)
        .build();
    context.register_global_property(js_string!("console"), console, Attribute::all())
}

type ConsoleFn = fn(&JsValue, &[JsValue], &JsObject, &mut Context) -> JsResult<JsValue>;

fn console_log(
    _: &JsValue,
    args: &[JsValue],
    stringify: &JsObject,
    context: &mut Context,
) -> JsResult<JsValue> {
    record(OutputKind::Log, args, Some(stringify), context)
}

fn console_error(
    _: &JsValue,
    args: &[JsValue],
    _: &JsObject,
    context: &mut Context,
) -> JsResult<JsValue> {
    record(OutputKind::Error, args, None, context)
}

fn console_warn(
    _: &JsValue,
    args: &[JsValue],
    _: &JsObject,
    context: &mut Context,
) -> JsResult<JsValue> {
    record(OutputKind::Warn, args, None, context)
}

fn console_info(
    _: &JsValue,
    args: &[JsValue],
    _: &JsObject,
    context: &mut Context,
) -> JsResult<JsValue> {
    record(OutputKind::Info, args, None, context)
}

/// With `stringify`, objects print as two-space indented JSON.
fn record(
    kind: OutputKind,
    args: &[JsValue],
    stringify: Option<&JsObject>,
    context: &mut Context,
) -> JsResult<JsValue> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        let part = match stringify {
            Some(stringify) if arg.is_object() && !arg.is_callable() => {
                let json = stringify.call(
                    &JsValue::undefined(),
                    &[arg.clone(), JsValue::null(), JsValue::from(2)],
                    context,
                )?;
                plain(&json, context)?
            }
            _ => plain(arg, context)?,
        };
        parts.push(part);
    }
    // Formatting may call back into script code, so the buffer is only
    // borrowed once the line is complete.
    let line = parts.join(" ");
    LINES.with_borrow_mut(|lines| lines.push((kind, line)));
    Ok(JsValue::undefined())
}

fn plain(value: &JsValue, context: &mut Context) -> JsResult<String> {
    if let Some(symbol) = value.as_symbol() {
        return Ok(symbol.descriptive_string().to_std_string_escaped());
    }
    Ok(value.to_string(context)?.to_std_string_escaped())
}

/// `Error` objects report their message, anything else its string form.
fn thrown_message(err: &JsError, context: &mut Context) -> String {
    if let Ok(native) = err.try_native(context) {
        return native.message().to_string();
    }
    err.as_opaque()
        .and_then(|value| value.to_string(context).ok())
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_console_methods() {
        let report = run_script(
            "console.log('a', 1); console.warn('careful'); console.info('fyi'); console.error('bad', 2);",
        );
        assert_eq!(report.error, None);
        assert_eq!(
            report.lines,
            vec![
                (OutputKind::Log, "a 1".to_string()),
                (OutputKind::Warn, "careful".to_string()),
                (OutputKind::Info, "fyi".to_string()),
                (OutputKind::Error, "bad 2".to_string()),
            ]
        );
    }

    #[test]
    fn objects_are_pretty_printed() {
        let report = run_script("console.log({a: 1})");
        assert_eq!(report.lines, vec![(OutputKind::Log, "{\n  \"a\": 1\n}".to_string())]);
    }

    #[test]
    fn thrown_error_message_is_reported() {
        let report = run_script("console.log('before'); throw new Error('x');");
        assert_eq!(report.error.as_deref(), Some("x"));
        assert_eq!(report.lines.len(), 1);
    }

    #[test]
    fn thrown_non_error_is_stringified() {
        let report = run_script("throw 42");
        assert_eq!(report.error.as_deref(), Some("42"));
    }

    #[test]
    fn syntax_error_is_reported() {
        let report = run_script("let = ;");
        assert!(report.error.is_some());
    }

    #[test]
    fn replaced_builtins_do_not_hide_output() {
        let report = run_script(
            "JSON.stringify = () => 'nope'; String = null; Array.prototype.push = null; \
             Array.prototype.join = null; console.log('hi', {a: [1, 2]});",
        );
        assert_eq!(report.error, None);
        assert_eq!(
            report.lines,
            vec![(OutputKind::Log, "hi {\n  \"a\": [\n    1,\n    2\n  ]\n}".to_string())]
        );
    }

    #[test]
    fn error_after_replacing_builtins_is_still_reported() {
        let report = run_script(
            "console.error('first'); JSON.stringify = undefined; throw new TypeError('late');",
        );
        assert_eq!(report.lines, vec![(OutputKind::Error, "first".to_string())]);
        assert_eq!(report.error.as_deref(), Some("late"));
    }

    #[test]
    fn undefined_and_cycles_follow_json_rules() {
        let report = run_script(
            "console.log({a: undefined, b: [undefined]}); const o = {}; o.self = o; console.log(o);",
        );
        assert_eq!(
            report.lines,
            vec![(OutputKind::Log, "{\n  \"b\": [\n    null\n  ]\n}".to_string())]
        );
        assert!(report.error.is_some());
    }

    #[test]
    fn console_methods_are_functions() {
        let report = run_script("console.log(typeof console.log, [].length)");
        assert_eq!(report.lines, vec![(OutputKind::Log, "function 0".to_string())]);
    }

    #[test]
    fn quotes_and_newlines_survive() {
        let report = run_script("const s = \"it's\\n\" + `ok`;\nconsole.log(s)");
        assert_eq!(report.error, None);
        assert_eq!(report.lines, vec![(OutputKind::Log, "it's\nok".to_string())]);
    }
}
