// SPDX-License-Identifier: Apache-2.0

//! Small shape helpers for the JavaScript-carrying plugins: name casing,
//! naive brace balancing, and wrapper extraction. Balancing is textual and
//! does not understand string literals, the same trade the original file
//! formats were designed around.

/// "Build Action" / "func_build_action" -> "buildAction".
#[must_use]
pub fn to_camel_case(name: &str) -> String {
    let words = split_words(name);
    if words.is_empty() {
        return "unnamed".to_string();
    }
    let mut out = words[0].to_lowercase();
    for word in &words[1..] {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out
}

/// "Build Action" -> "build_action".
#[must_use]
pub fn to_snake_case(name: &str) -> String {
    let words = split_words(name);
    if words.is_empty() {
        return "unnamed".to_string();
    }
    words
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

fn split_words(name: &str) -> Vec<&str> {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Index of the `}` matching the `{` at byte offset `open`.
#[must_use]
pub fn matching_brace(code: &str, open: usize) -> Option<usize> {
    let bytes = code.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0_usize;
    for (offset, byte) in bytes[open..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Strip the common leading indentation from every non-empty line.
#[must_use]
pub fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);
    if indent == 0 {
        return text.to_string();
    }
    text.lines()
        .map(|line| line.get(indent..).unwrap_or_else(|| line.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn trim_one_newline(body: &str) -> &str {
    let body = body.strip_prefix('\n').unwrap_or(body);
    body.strip_suffix('\n').unwrap_or(body)
}

/// Byte offset of the `{` opening a `const <name> = {` declaration.
#[must_use]
pub fn find_object_decl(code: &str, name: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = code[from..].find("const ") {
        let after = from + rel + "const ".len();
        let rest = code[after..].trim_start();
        if let Some(tail) = rest.strip_prefix(name) {
            let tail = tail.trim_start();
            if let Some(tail) = tail.strip_prefix('=') {
                let tail = tail.trim_start();
                if tail.starts_with('{') {
                    let consumed = code.len() - tail.len();
                    return Some(consumed);
                }
            }
        }
        from = after;
    }
    None
}

/// Parameters and opening-brace offset of a `const <name> = (params) => {`
/// arrow declaration.
#[must_use]
pub fn find_arrow_decl(code: &str, name: &str) -> Option<(String, usize)> {
    let mut from = 0;
    while let Some(rel) = code[from..].find("const ") {
        let after = from + rel + "const ".len();
        let rest = code[after..].trim_start();
        let Some(tail) = rest.strip_prefix(name) else {
            from = after;
            continue;
        };
        let tail = tail.trim_start();
        let Some(tail) = tail.strip_prefix('=') else {
            from = after;
            continue;
        };
        let tail = tail.trim_start();
        if !tail.starts_with('(') {
            from = after;
            continue;
        }
        let params_open = code.len() - tail.len();
        let params_close = code[params_open..].find(')')? + params_open;
        let params = code[params_open + 1..params_close].to_string();
        let arrow_tail = code[params_close + 1..].trim_start();
        let Some(arrow_tail) = arrow_tail.strip_prefix("=>") else {
            from = after;
            continue;
        };
        let arrow_tail = arrow_tail.trim_start();
        if arrow_tail.starts_with('{') {
            return Some((params, code.len() - arrow_tail.len()));
        }
        from = after;
    }
    None
}

/// Name bound by a `<registry>.<name> = <target>` registration statement.
#[must_use]
pub fn find_registration(code: &str, registry: &str, target: &str) -> Option<String> {
    let needle = format!("{registry}.");
    let mut from = 0;
    while let Some(rel) = code[from..].find(&needle) {
        let start = from + rel + needle.len();
        let ident: String = code[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if !ident.is_empty() {
            let rest = code[start + ident.len()..].trim_start();
            if let Some(rest) = rest.strip_prefix('=') {
                if rest.trim_start().starts_with(target) {
                    return Some(ident);
                }
            }
        }
        from = start;
    }
    None
}

/// Body of an `export [default] function name(params) { ... }` wrapper:
/// the text between the outer braces, with one bounding newline removed on
/// each side and common indentation stripped.
#[must_use]
pub fn extract_exported_body(code: &str) -> Option<String> {
    let export = code.find("export ")?;
    let params_open = code[export..].find('(')? + export;
    let params_close = code[params_open..].find(')')? + params_open;
    let brace_rel = code[params_close..].find('{')?;
    let open = params_close + brace_rel;
    let close = matching_brace(code, open)?;
    Some(dedent(trim_one_newline(&code[open + 1..close])))
}

/// Name, parameters, and body of an `export function name(params) {...}`.
#[must_use]
pub fn extract_exported_function(code: &str) -> Option<(String, String, String)> {
    let marker = "export function ";
    let start = code.find(marker)? + marker.len();
    let params_open = code[start..].find('(')? + start;
    let name = code[start..params_open].trim().to_string();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let params_close = code[params_open..].find(')')? + params_open;
    let params = code[params_open + 1..params_close].to_string();
    let brace_rel = code[params_close..].find('{')?;
    let open = params_close + brace_rel;
    let close = matching_brace(code, open)?;
    let body = dedent(trim_one_newline(&code[open + 1..close]));
    Some((name, params, body))
}
