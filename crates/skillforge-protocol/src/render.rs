//! The `{{arg_name}}` instruction-interpolation renderer. Lives in C7, not
//! C5: a skill's `instructions` stay the raw manifest body in the catalog,
//! and rendering happens per-call against the caller-supplied `arguments`
//! table on every `tools/call`/`prompts/get` dispatch.

use serde_json::{Map, Value};

/// Replaces every `{{name}}` placeholder in `instructions` with the
/// corresponding entry in `arguments`. A string argument is substituted
/// verbatim; any other JSON value is substituted as its compact JSON
/// rendering. A placeholder whose name has no matching argument is left in
/// the output unchanged, braces and all, rather than replaced with an empty
/// string — a caller passing only some of a skill's expected arguments
/// should see exactly which ones did not resolve.
pub fn render_instructions(instructions: &str, arguments: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(instructions.len());
    let mut rest = instructions;
    loop {
        let Some(start) = rest.find("{{") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str("{{");
            out.push_str(after_open);
            break;
        };
        let name = after_open[..end].trim();
        match arguments.get(name) {
            Some(Value::String(s)) => out.push_str(s),
            Some(other) => out.push_str(&other.to_string()),
            None => {
                out.push_str("{{");
                out.push_str(&after_open[..end]);
                out.push_str("}}");
            }
        }
        rest = &after_open[end + 2..];
    }
    out
}
