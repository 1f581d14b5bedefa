/// Parser for LLDB `frame variable` / `target variable` listings
///
/// Raw CLI commands print one variable per line as `(type) name = value`.
/// Aggregates open a `{` at the end of the line and list their members on
/// the following lines until a closing `}`. Lines that don't look like an
/// entry continue the value of the previous one.

use crate::types::VariableInfo;

/// Variables of a `fr v` listing
pub fn parse_variables<S: AsRef<str>>(lines: &[S]) -> Vec<VariableInfo> {
    let mut lines = lines.iter().map(AsRef::as_ref);
    parse_block(&mut lines, false)
}

/// Variables of a `ta v` listing, which starts with a header line
pub fn parse_global_variables<S: AsRef<str>>(lines: &[S]) -> Vec<VariableInfo> {
    match lines.split_first() {
        Some((_, rest)) => parse_variables(rest),
        None => Vec::new(),
    }
}

fn parse_block<'a, I>(lines: &mut I, nested: bool) -> Vec<VariableInfo>
where
    I: Iterator<Item = &'a str>,
{
    let mut variables: Vec<VariableInfo> = Vec::new();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed == "}" || trimmed == "}," {
            if nested {
                break;
            }
            continue;
        }

        match parse_entry(trimmed) {
            Some((mut variable, opens_block)) => {
                if opens_block {
                    variable.children = parse_block(lines, true);
                }
                variables.push(variable);
            }
            None => match variables.last_mut() {
                Some(previous) => {
                    let value = previous.value.get_or_insert_with(String::new);
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(trimmed);
                }
                None => log::debug!("Skipping raw output line: {}", trimmed),
            },
        }
    }

    variables
}

/// Index of the paren closing the one at the start of `text`
fn closing_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;

    for (index, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse one entry line; the flag tells whether it opens a member block
fn parse_entry(line: &str) -> Option<(VariableInfo, bool)> {
    let (var_type, rest) = if line.starts_with('(') {
        let end = closing_paren(line)?;
        (Some(line[1..end].trim().to_string()), line[end + 1..].trim_start())
    } else {
        (None, line)
    };

    let (name, value) = match rest.split_once(" = ") {
        Some(parts) => parts,
        None => (rest.strip_suffix(" =")?, ""),
    };

    let name = name.trim();
    if name.is_empty() || (var_type.is_none() && name.contains(char::is_whitespace)) {
        return None;
    }

    let value = value.trim();
    let (value, opens_block) = match value.strip_suffix('{') {
        Some(summary) => (summary.trim(), true),
        None => (value, false),
    };

    let variable = VariableInfo {
        name: name.to_string(),
        value: (!value.is_empty()).then(|| value.to_string()),
        var_type,
        children: Vec::new(),
    };

    Some((variable, opens_block))
}
