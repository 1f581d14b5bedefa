/// MI output parser
///
/// This module turns one line of debugger output into a `Record`. Result
/// lists are folded into a `Tuple`; a key that occurs more than once within
/// the same list collapses into a `Value::List` holding every occurrence in
/// arrival order.

use std::collections::HashSet;

use crate::types::*;
use once_cell::sync::Lazy;
use regex::Regex;

static RECORD_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)?([\^*+=])([A-Za-z][\w-]*)(?:,(.*))?$").expect("record prefix regex")
});

static PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\(gdb\)\s*").expect("prompt regex"));

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}: {line}")]
pub struct ParseError {
    pub message: String,
    pub line: String,
}

impl ParseError {
    fn new(message: impl Into<String>, line: &str) -> Self {
        Self {
            message: message.into(),
            line: line.to_string(),
        }
    }
}

/// True for the `(gdb)` marker that closes a batch of output
pub fn is_prompt(line: &str) -> bool {
    PROMPT.is_match(line)
}

/// Parse a line of MI output
pub fn parse_record(line: &str) -> Result<Record, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);

    if line.trim().is_empty() || is_prompt(line) {
        return Err(ParseError::new("Empty or prompt line", line));
    }

    // Check for stream records first (single character prefix)
    if let Some(stream) = parse_stream_record(line) {
        return Ok(Record::Stream(stream));
    }

    let caps = RECORD_PREFIX
        .captures(line)
        .ok_or_else(|| ParseError::new("Unknown MI output format", line))?;

    let token = match caps.get(1) {
        Some(m) => Some(
            m.as_str()
                .parse::<u32>()
                .map_err(|_| ParseError::new("Token out of range", line))?,
        ),
        None => None,
    };

    let results = match caps.get(4) {
        Some(m) => parse_results(m.as_str()).map_err(|e| ParseError::new(e, line))?,
        None => Tuple::new(),
    };

    let class = &caps[3];
    let kind = match &caps[2] {
        "^" => {
            let class = match class {
                "done" => ResultClass::Done,
                "running" => ResultClass::Running,
                "connected" => ResultClass::Connected,
                "error" => ResultClass::Error,
                "exit" => ResultClass::Exit,
                other => {
                    return Err(ParseError::new(
                        format!("Unknown result class '{}'", other),
                        line,
                    ))
                }
            };
            return Ok(Record::Result(ResultRecord {
                token,
                class,
                results,
            }));
        }
        "*" => AsyncKind::Exec,
        "+" => AsyncKind::Status,
        _ => AsyncKind::Notify,
    };

    Ok(Record::Async(AsyncRecord {
        token,
        kind,
        class: AsyncClass::from_name(class),
        results,
    }))
}

/// Parse a stream record (console, target, or log output)
fn parse_stream_record(line: &str) -> Option<StreamRecord> {
    let stream_type = match line.chars().next()? {
        '~' => StreamType::Console,
        '@' => StreamType::Target,
        '&' => StreamType::Log,
        _ => return None,
    };
    let content = &line[1..];

    // Fall back to the raw text when the payload isn't a well-formed C string
    let content = parse_c_string(content).unwrap_or_else(|| content.to_string());

    Some(StreamRecord {
        stream_type,
        content,
    })
}

/// Parse a comma separated list of `key=value` results
fn parse_results(input: &str) -> Result<Tuple, String> {
    let mut chars = input.chars().peekable();
    parse_result_list(&mut chars, None)
}

/// Parse results up to `terminator` (consumed), or to the end of input
fn parse_result_list(chars: &mut Chars, terminator: Option<char>) -> Result<Tuple, String> {
    let mut results = Tuple::new();
    let mut repeated = HashSet::new();
    let mut last_key: Option<String> = None;

    loop {
        skip_whitespace(chars);

        match chars.peek() {
            None if terminator.is_some() => return Err("Unterminated result list".into()),
            None => break,
            Some(&ch) if Some(ch) == terminator => {
                chars.next();
                break;
            }
            // GDB lists extra breakpoint locations as unnamed tuples after `bkpt`
            Some('{') if last_key.is_some() => {
                let value = parse_value(chars)?;
                if let Some(key) = &last_key {
                    insert_result(&mut results, &mut repeated, key.clone(), value);
                }
                skip_whitespace(chars);
                if chars.peek() == Some(&',') {
                    chars.next();
                }
                continue;
            }
            _ => {}
        }

        let key = parse_identifier(chars)?;

        if chars.next() != Some('=') {
            return Err(format!("Expected '=' after '{}'", key));
        }

        let value = parse_value(chars)?;
        insert_result(&mut results, &mut repeated, key.clone(), value);
        last_key = Some(key);

        skip_whitespace(chars);
        if chars.peek() == Some(&',') {
            chars.next();
        }
    }

    Ok(results)
}

/// Insert a result, collapsing repeated keys into a list.
/// `repeated` holds the keys whose entry is already that collapsed list,
/// so a list-valued first occurrence is wrapped rather than extended.
fn insert_result(results: &mut Tuple, repeated: &mut HashSet<String>, key: String, value: Value) {
    match results.remove(&key) {
        None => {
            results.insert(key, value);
        }
        Some(Value::List(mut list)) if repeated.contains(&key) => {
            list.push(value);
            results.insert(key, Value::List(list));
        }
        Some(previous) => {
            repeated.insert(key.clone());
            results.insert(key, Value::List(vec![previous, value]));
        }
    }
}

fn skip_whitespace(chars: &mut Chars) {
    while matches!(chars.peek(), Some(ch) if ch.is_whitespace()) {
        chars.next();
    }
}

/// Parse an identifier (key name)
fn parse_identifier(chars: &mut Chars) -> Result<String, String> {
    let mut identifier = String::new();

    while let Some(&ch) = chars.peek() {
        if ch.is_alphanumeric() || ch == '_' || ch == '-' || ch == '.' {
            identifier.push(ch);
            chars.next();
        } else {
            break;
        }
    }

    if identifier.is_empty() {
        return Err("Empty identifier".into());
    }

    Ok(identifier)
}

/// Parse a value (string, list, or tuple)
fn parse_value(chars: &mut Chars) -> Result<Value, String> {
    match chars.peek() {
        Some('"') => parse_quoted(chars).map(Value::String),
        Some('[') => {
            chars.next();
            skip_whitespace(chars);

            match chars.peek() {
                Some(']') => {
                    chars.next();
                    Ok(Value::List(Vec::new()))
                }
                Some('"') | Some('{') | Some('[') => parse_value_list(chars).map(Value::List),
                // A list of results reads like a tuple
                Some(_) => parse_result_list(chars, Some(']')).map(Value::Tuple),
                None => Err("Expected closing bracket".into()),
            }
        }
        Some('{') => {
            chars.next();
            parse_result_list(chars, Some('}')).map(Value::Tuple)
        }
        _ => {
            // Try to parse as unquoted string until comma, space, or end
            let mut string_val = String::new();

            while let Some(&ch) = chars.peek() {
                if ch == ',' || ch == ']' || ch == '}' || ch == ' ' {
                    break;
                }
                string_val.push(ch);
                chars.next();
            }

            if string_val.is_empty() {
                return Err("Empty value".into());
            }

            Ok(Value::String(string_val))
        }
    }
}

/// Parse the values of a list, the opening bracket already consumed
fn parse_value_list(chars: &mut Chars) -> Result<Vec<Value>, String> {
    let mut list = Vec::new();

    loop {
        list.push(parse_value(chars)?);
        skip_whitespace(chars);

        match chars.next() {
            Some(',') => skip_whitespace(chars),
            Some(']') => return Ok(list),
            _ => return Err("Expected closing bracket".into()),
        }
    }
}

/// Parse a quoted C string starting at the opening quote
fn parse_quoted(chars: &mut Chars) -> Result<String, String> {
    if chars.next() != Some('"') {
        return Err("Expected opening quote".into());
    }

    let mut bytes = Vec::new();
    let mut buf = [0u8; 4];

    while let Some(ch) = chars.next() {
        match ch {
            '"' => return Ok(String::from_utf8_lossy(&bytes).into_owned()),
            '\\' => match chars.next() {
                Some('n') => bytes.push(b'\n'),
                Some('t') => bytes.push(b'\t'),
                Some('r') => bytes.push(b'\r'),
                Some('\\') => bytes.push(b'\\'),
                Some('"') => bytes.push(b'"'),
                Some(digit @ '0'..='7') => {
                    // Up to three octal digits encode one raw byte
                    let mut code = digit.to_digit(8).unwrap_or(0);
                    for _ in 0..2 {
                        match chars.peek().and_then(|c| c.to_digit(8)) {
                            Some(d) => {
                                code = code * 8 + d;
                                chars.next();
                            }
                            None => break,
                        }
                    }
                    bytes.push(code as u8);
                }
                Some(other) => {
                    bytes.push(b'\\');
                    bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
                }
                None => bytes.push(b'\\'),
            },
            other => bytes.extend_from_slice(other.encode_utf8(&mut buf).as_bytes()),
        }
    }

    Err("Unterminated string".into())
}

/// Parse a C-style string (removes quotes and handles escape sequences)
fn parse_c_string(input: &str) -> Option<String> {
    if input.len() < 2 || !input.starts_with('"') || !input.ends_with('"') {
        return None;
    }

    let mut chars = input.chars().peekable();
    let parsed = parse_quoted(&mut chars).ok()?;

    // The closing quote must be the last character
    if chars.peek().is_some() {
        return None;
    }

    Some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_async(line: &str) -> AsyncRecord {
        match parse_record(line).unwrap() {
            Record::Async(record) => record,
            other => panic!("Expected async record, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_c_string() {
        assert_eq!(parse_c_string("\"Hello\""), Some("Hello".to_string()));
        assert_eq!(parse_c_string("\"Hello\\nWorld\""), Some("Hello\nWorld".to_string()));
        assert_eq!(parse_c_string("\"Hello\\\\World\""), Some("Hello\\World".to_string()));
        assert_eq!(parse_c_string("\"Hello\\\"World\""), Some("Hello\"World".to_string()));
        assert_eq!(parse_c_string("Hello"), None);
    }

    #[test]
    fn test_parse_c_string_octal_escapes() {
        assert_eq!(
            parse_c_string("\"it\\342\\200\\231s\""),
            Some("it\u{2019}s".to_string())
        );
    }

    #[test]
    fn test_parse_simple_results() {
        let results = parse_results("msg=\"test message\"").unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results.get("msg").unwrap().as_string(), Some("test message"));
    }

    #[test]
    fn test_parse_multiple_results() {
        let results = parse_results("reason=\"breakpoint-hit\",thread-id=\"1\"").unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.get("reason").unwrap().as_string(), Some("breakpoint-hit"));
        assert_eq!(results.get("thread-id").unwrap().as_string(), Some("1"));
    }

    #[test]
    fn test_parse_tuple_value() {
        let results = parse_results("bkpt={number=\"1\",type=\"breakpoint\"}").unwrap();

        let bkpt = results.get("bkpt").unwrap().as_tuple().unwrap();
        assert_eq!(bkpt.get("number").unwrap().as_string(), Some("1"));
        assert_eq!(bkpt.get("type").unwrap().as_string(), Some("breakpoint"));
    }

    #[test]
    fn test_parse_list_value() {
        let results = parse_results("thread-groups=[\"i1\"]").unwrap();

        let groups = results.get("thread-groups").unwrap().as_list().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].as_string(), Some("i1"));
    }

    #[test]
    fn test_repeated_keys_collapse_into_list() {
        let results =
            parse_results("bkpt={number=\"1\"},bkpt={number=\"1.1\"},bkpt={number=\"1.2\"}")
                .unwrap();

        let bkpts = results.get("bkpt").unwrap().as_list().unwrap();
        assert_eq!(bkpts.len(), 3);
        let numbers: Vec<_> = bkpts
            .iter()
            .map(|b| b.as_tuple().unwrap().get("number").unwrap().as_string().unwrap())
            .collect();
        assert_eq!(numbers, vec!["1", "1.1", "1.2"]);
    }

    #[test]
    fn test_repeated_list_values_stay_separate() {
        let results = parse_results(r#"x=["a"],x=["b"]"#).unwrap();

        let xs = results["x"].as_list().unwrap();
        assert_eq!(xs.len(), 2);
        assert_eq!(xs[0], Value::List(vec![Value::String("a".into())]));
        assert_eq!(xs[1], Value::List(vec![Value::String("b".into())]));

        let results = parse_results(r#"x=["a"],x=["b"],x=[]"#).unwrap();
        let xs = results["x"].as_list().unwrap();
        assert_eq!(xs.len(), 3);
        assert_eq!(xs[2], Value::List(Vec::new()));
    }

    #[test]
    fn test_list_of_results_reads_as_tuple() {
        let results =
            parse_results("stack=[frame={level=\"0\"},frame={level=\"1\"}]").unwrap();

        let stack = results.get("stack").unwrap().as_tuple().unwrap();
        assert_eq!(stack.get("frame").unwrap().items().len(), 2);

        let single = parse_results("stack=[frame={level=\"0\"}]").unwrap();
        let frame = single.get("stack").unwrap().as_tuple().unwrap().get("frame").unwrap();
        assert!(frame.as_tuple().is_some());
        assert_eq!(frame.items().len(), 1);
    }

    #[test]
    fn test_empty_list() {
        let results = parse_results("children=[]").unwrap();
        assert_eq!(results.get("children"), Some(&Value::List(Vec::new())));
    }

    #[test]
    fn test_list_of_tuples() {
        let results = parse_results(
            "asm_insns=[{address=\"0x1\",inst=\"nop\"},{address=\"0x2\",inst=\"ret\"}]",
        )
        .unwrap();
        assert_eq!(results.get("asm_insns").unwrap().tuples().len(), 2);
    }

    #[test]
    fn test_unterminated_tuple_is_an_error() {
        assert!(parse_record("^done,bkpt={number=\"1\"").is_err());
    }

    #[test]
    fn test_unnamed_tuples_extend_previous_result() {
        let results = parse_results(
            r#"bkpt={number="1",addr="<MULTIPLE>"},{number="1.1",addr="0x1"},{number="1.2",addr="0x2"}"#,
        )
        .unwrap();

        let bkpts = results["bkpt"].tuples();
        assert_eq!(bkpts.len(), 3);
        assert_eq!(bkpts[2]["number"].as_string(), Some("1.2"));
    }

    #[test]
    fn test_parse_done_result() {
        match parse_record("^done").unwrap() {
            Record::Result(result) => {
                assert_eq!(result.class, ResultClass::Done);
                assert!(result.results.is_empty());
                assert_eq!(result.token, None);
            }
            _ => panic!("Expected result record"),
        }
    }

    #[test]
    fn test_parse_result_with_token() {
        match parse_record("123^done,bkpt={number=\"1\",type=\"breakpoint\"}").unwrap() {
            Record::Result(result) => {
                assert_eq!(result.class, ResultClass::Done);
                assert_eq!(result.token, Some(123));
                assert!(!result.results.is_empty());
            }
            _ => panic!("Expected result record"),
        }
    }

    #[test]
    fn test_parse_error_result() {
        let record = parse_record("^error,msg=\"No symbol table is loaded.\"").unwrap();
        assert_eq!(record.kind(), RecordKind::Error);
    }

    #[test]
    fn test_unknown_result_class() {
        assert!(parse_record("^bogus").is_err());
    }

    #[test]
    fn test_parse_async_running() {
        let record = parse_async("*running,thread-id=\"all\"");
        assert_eq!(record.kind, AsyncKind::Exec);
        assert_eq!(record.class, AsyncClass::Running);
        assert_eq!(record.results.get("thread-id").unwrap().as_string(), Some("all"));
    }

    #[test]
    fn test_parse_async_with_token() {
        let record = parse_async("7*stopped,reason=\"end-stepping-range\"");
        assert_eq!(record.token, Some(7));
        assert_eq!(record.class, AsyncClass::Stopped);
    }

    #[test]
    fn test_parse_status_and_unknown_notify() {
        let status = parse_async("+download,section=\".text\"");
        assert_eq!(status.kind, AsyncKind::Status);

        let notify = parse_async("=tsv-created,name=\"trace\"");
        assert_eq!(notify.kind, AsyncKind::Notify);
        assert_eq!(notify.class, AsyncClass::Other("tsv-created".into()));
        assert_eq!(notify.class.name(), "tsv-created");
    }

    #[test]
    fn test_parse_streams() {
        let cases = [
            ("~\"Hello, World!\\n\"", StreamType::Console, "Hello, World!\n"),
            ("@\"target output\"", StreamType::Target, "target output"),
            ("&\"debug message\"", StreamType::Log, "debug message"),
        ];

        for (line, stream_type, content) in cases {
            match parse_record(line).unwrap() {
                Record::Stream(stream) => {
                    assert_eq!(stream.stream_type, stream_type);
                    assert_eq!(stream.content, content);
                }
                _ => panic!("Expected stream record for {}", line),
            }
        }
    }

    #[test]
    fn test_prompt_and_garbage() {
        assert!(is_prompt("(gdb)"));
        assert!(is_prompt("(gdb) "));
        assert!(!is_prompt("^done"));
        assert!(parse_record("(gdb)").is_err());
        assert!(parse_record("Hello from the inferior").is_err());
    }
}
