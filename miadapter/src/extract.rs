/// Conversion of command results into typed value objects
///
/// The debugger is loose about shapes: a plural field holds a bare item when
/// there is one element and a list otherwise, and a list of named results
/// (`[frame={..},frame={..}]`) arrives as a tuple whose repeated key has been
/// collapsed into a list. Everything here goes through `Value::items` and
/// `nested_tuples` so both forms are read the same way.

use std::collections::BTreeMap;
use std::str::FromStr;

use crate::commands::MalformedResponseError;
use crate::types::*;

type Result<T> = std::result::Result<T, MalformedResponseError>;

pub(crate) fn string_field(data: &Tuple, key: &str) -> Option<String> {
    data.get(key).and_then(Value::as_string).map(str::to_string)
}

/// Numeric field; absent or unparsable text reads as `None`
pub(crate) fn number_field<T: FromStr>(data: &Tuple, key: &str) -> Option<T> {
    data.get(key)
        .and_then(Value::as_string)
        .and_then(|s| s.trim().parse().ok())
}

/// Boolean field compared against its truthy spelling; `None` when absent
pub(crate) fn flag_field(data: &Tuple, key: &str, truthy: &str) -> Option<bool> {
    data.get(key).and_then(Value::as_string).map(|s| s == truthy)
}

pub(crate) fn required<'a>(data: &'a Tuple, key: &str) -> Result<&'a Value> {
    data.get(key)
        .ok_or_else(|| MalformedResponseError::new(format!("Expected to find \"{}\".", key), data))
}

pub(crate) fn required_string(data: &Tuple, key: &str) -> Result<String> {
    required(data, key)?
        .as_string()
        .map(str::to_string)
        .ok_or_else(|| MalformedResponseError::new(format!("Expected \"{}\" to be a string.", key), data))
}

pub(crate) fn required_number<T: FromStr>(data: &Tuple, key: &str) -> Result<T> {
    number_field(data, key)
        .ok_or_else(|| MalformedResponseError::new(format!("Expected \"{}\" to be a number.", key), data))
}

/// Tuples of a `[key={..},key={..}]` style field, whichever shape it arrived in
pub(crate) fn nested_tuples<'a>(value: &'a Value, key: &str) -> Vec<&'a Tuple> {
    match value {
        Value::Tuple(tuple) => tuple.get(key).map(Value::tuples).unwrap_or_default(),
        Value::List(items) => items
            .iter()
            .filter_map(Value::as_tuple)
            .flat_map(|item| match item.get(key) {
                Some(inner) => inner.tuples(),
                None => vec![item],
            })
            .collect(),
        Value::String(_) => Vec::new(),
    }
}

fn extract_breakpoint_location(data: &Tuple) -> BreakpointLocationInfo {
    BreakpointLocationInfo {
        id: string_field(data, "number").unwrap_or_default(),
        is_enabled: flag_field(data, "enabled", "y"),
        address: string_field(data, "addr"),
        func: string_field(data, "func"),
        // LLDB sends `filename` where GDB sends `file`
        filename: string_field(data, "file").or_else(|| string_field(data, "filename")),
        fullname: string_field(data, "fullname"),
        line: number_field(data, "line"),
        at: string_field(data, "at"),
    }
}

fn is_placeholder_address(data: &Tuple) -> bool {
    matches!(
        data.get("addr").and_then(Value::as_string),
        Some("<PENDING>") | Some("<MULTIPLE>")
    )
}

/// Build a breakpoint from its main tuple and any trailing location tuples
fn breakpoint_from_tuples(main: &Tuple, extra: &[&Tuple]) -> Result<BreakpointInfo> {
    let locations = if !extra.is_empty() {
        extra.iter().map(|loc| extract_breakpoint_location(loc)).collect()
    } else if let Some(locations) = main.get("locations") {
        locations
            .tuples()
            .into_iter()
            .map(extract_breakpoint_location)
            .collect()
    } else if is_placeholder_address(main) {
        Vec::new()
    } else {
        vec![extract_breakpoint_location(main)]
    };

    Ok(BreakpointInfo {
        id: required_number(main, "number")?,
        breakpoint_type: string_field(main, "type"),
        catchpoint_type: string_field(main, "catch-type"),
        is_temp: flag_field(main, "disp", "del"),
        is_enabled: flag_field(main, "enabled", "y"),
        locations,
        pending: string_field(main, "pending"),
        evaluated_by: string_field(main, "evaluated-by"),
        thread_id: number_field(main, "thread"),
        condition: string_field(main, "cond"),
        ignore_count: number_field(main, "ignore"),
        enable_count: number_field(main, "enable"),
        mask: string_field(main, "mask"),
        pass_count: number_field(main, "pass"),
        original_location: string_field(main, "original-location"),
        hit_count: number_field(main, "times"),
        is_installed: flag_field(main, "installed", "y"),
        what: string_field(main, "what"),
    })
}

/// Breakpoint from the `bkpt` field of break-insert, break-after and
/// breakpoint-modified output
pub fn extract_breakpoint_info(data: &Tuple) -> Result<BreakpointInfo> {
    let items = required(data, "bkpt")?.tuples();

    match items.split_first() {
        Some((main, extra)) => breakpoint_from_tuples(main, extra),
        None => Err(MalformedResponseError::new(
            "Expected \"bkpt\" to hold a breakpoint.",
            data,
        )),
    }
}

/// Breakpoints from the `BreakpointTable` of break-list
pub fn extract_breakpoint_table(data: &Tuple) -> Result<Vec<BreakpointInfo>> {
    let table = required(data, "BreakpointTable")?
        .as_tuple()
        .ok_or_else(|| MalformedResponseError::new("Expected \"BreakpointTable\" to be a tuple.", data))?;

    let rows = match table.get("body") {
        Some(body) => nested_tuples(body, "bkpt"),
        None => Vec::new(),
    };

    // Rows numbered `N.M` are locations of the preceding breakpoint `N`
    let mut groups: Vec<(&Tuple, Vec<&Tuple>)> = Vec::new();
    for row in rows {
        let is_location = row
            .get("number")
            .and_then(Value::as_string)
            .map_or(false, |n| n.contains('.'));

        match groups.last_mut() {
            Some((_, locations)) if is_location => locations.push(row),
            _ => groups.push((row, Vec::new())),
        }
    }

    groups
        .into_iter()
        .map(|(main, locations)| breakpoint_from_tuples(main, &locations))
        .collect()
}

fn variable_from_tuple(data: &Tuple) -> VariableInfo {
    VariableInfo {
        name: string_field(data, "name").unwrap_or_default(),
        value: string_field(data, "value"),
        var_type: string_field(data, "type"),
        children: Vec::new(),
    }
}

/// Variables of an `args`, `locals` or `variables` field
pub fn extract_variables(value: &Value) -> Vec<VariableInfo> {
    match value {
        Value::List(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::Tuple(_) | Value::List(_) => extract_variables(item),
                Value::String(name) => vec![VariableInfo {
                    name: name.clone(),
                    ..Default::default()
                }],
            })
            .collect(),
        // `[name="a",name="b"]` collapses into a tuple holding a list of names
        Value::Tuple(tuple) => match tuple.get("name") {
            Some(Value::List(names)) => names
                .iter()
                .filter_map(Value::as_string)
                .map(|name| VariableInfo {
                    name: name.to_string(),
                    ..Default::default()
                })
                .collect(),
            _ => vec![variable_from_tuple(tuple)],
        },
        Value::String(_) => Vec::new(),
    }
}

/// Frame attached to a stopped event
pub fn extract_frame_info(data: &Tuple) -> FrameInfo {
    FrameInfo {
        func: string_field(data, "func"),
        args: data.get("args").map(extract_variables).unwrap_or_default(),
        address: string_field(data, "addr"),
        filename: string_field(data, "file"),
        fullname: string_field(data, "fullname"),
        line: number_field(data, "line"),
    }
}

pub fn extract_stack_frame_info(data: &Tuple) -> Result<StackFrameInfo> {
    Ok(StackFrameInfo {
        level: required_number(data, "level")?,
        func: string_field(data, "func"),
        address: string_field(data, "addr"),
        filename: string_field(data, "file"),
        fullname: string_field(data, "fullname"),
        line: number_field(data, "line"),
        from: string_field(data, "from"),
    })
}

/// Frames of stack-list-frames
pub fn extract_stack_frames(data: &Tuple) -> Result<Vec<StackFrameInfo>> {
    nested_tuples(required(data, "stack")?, "frame")
        .into_iter()
        .map(extract_stack_frame_info)
        .collect()
}

/// Per-frame arguments of stack-list-arguments
pub fn extract_stack_frame_args(data: &Tuple) -> Result<Vec<StackFrameArgsInfo>> {
    nested_tuples(required(data, "stack-args")?, "frame")
        .into_iter()
        .map(|frame| {
            Ok(StackFrameArgsInfo {
                level: required_number(frame, "level")?,
                args: frame.get("args").map(extract_variables).unwrap_or_default(),
            })
        })
        .collect()
}

/// Variables of stack-list-variables, split on the `arg` marker
pub fn extract_stack_frame_variables(data: &Tuple) -> Result<StackFrameVariablesInfo> {
    let mut info = StackFrameVariablesInfo::default();

    for variable in required(data, "variables")?.tuples() {
        if flag_field(variable, "arg", "1").unwrap_or(false) {
            info.args.push(variable_from_tuple(variable));
        } else {
            info.locals.push(variable_from_tuple(variable));
        }
    }

    Ok(info)
}

/// Watch created by var-create
pub fn extract_watch_info(data: &Tuple) -> Result<WatchInfo> {
    Ok(WatchInfo {
        id: required_string(data, "name")?,
        child_count: number_field(data, "numchild"),
        value: string_field(data, "value"),
        expression_type: string_field(data, "type"),
        thread_id: number_field(data, "thread-id"),
        // Only an explicit "0" rules out more children here
        has_more_children: data
            .get("has_more")
            .and_then(Value::as_string)
            .map_or(true, |s| s != "0"),
        is_dynamic: flag_field(data, "dynamic", "1").unwrap_or(false),
        display_hint: string_field(data, "displayhint"),
    })
}

fn extract_watch_child(data: &Tuple) -> Result<WatchChildInfo> {
    Ok(WatchChildInfo {
        watch: extract_watch_info(data)?,
        expression: string_field(data, "exp"),
        is_frozen: flag_field(data, "frozen", "1").unwrap_or(false),
    })
}

/// Children of var-list-children; a watch without children may omit the field
pub fn extract_watch_children(data: &Tuple) -> Result<Vec<WatchChildInfo>> {
    match data.get("children") {
        Some(children) => nested_tuples(children, "child")
            .into_iter()
            .map(extract_watch_child)
            .collect(),
        None => Ok(Vec::new()),
    }
}

/// Change list of var-update
pub fn extract_watch_updates(data: &Tuple) -> Result<Vec<WatchUpdateInfo>> {
    required(data, "changelist")?
        .tuples()
        .into_iter()
        .map(|change| {
            let in_scope = change.get("in_scope").and_then(Value::as_string);
            let new_children = match change.get("new_children") {
                Some(children) => nested_tuples(children, "child")
                    .into_iter()
                    .map(extract_watch_child)
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };

            Ok(WatchUpdateInfo {
                id: required_string(change, "name")?,
                child_count: number_field(change, "new_num_children"),
                value: string_field(change, "value"),
                expression_type: string_field(change, "new_type"),
                is_in_scope: in_scope == Some("true"),
                is_obsolete: in_scope == Some("invalid"),
                has_type_changed: flag_field(change, "type_changed", "true").unwrap_or(false),
                is_dynamic: flag_field(change, "dynamic", "1").unwrap_or(false),
                display_hint: string_field(change, "displayhint"),
                has_more_children: flag_field(change, "has_more", "1").unwrap_or(false),
                new_children,
            })
        })
        .collect()
}

/// New value after var-set-format; GDB reports `value`, LLDB a change list
pub fn extract_formatted_value(data: &Tuple) -> Result<String> {
    if let Some(value) = string_field(data, "value") {
        return Ok(value);
    }

    data.get("changelist")
        .and_then(|list| list.tuples().first().and_then(|c| string_field(c, "value")))
        .ok_or_else(|| MalformedResponseError::new("Expected to find \"value\" or \"changelist\".", data))
}

/// Attributes of var-show-attributes; LLDB reports `status`, GDB `attr`
pub fn extract_watch_attributes(data: &Tuple) -> Result<Vec<WatchAttribute>> {
    let field = data
        .get("status")
        .or_else(|| data.get("attr"))
        .ok_or_else(|| MalformedResponseError::new("Expected to find \"status\" or \"attr\".", data))?;

    field
        .items()
        .into_iter()
        .map(|item| {
            item.as_string()
                .and_then(WatchAttribute::from_mi)
                .ok_or_else(|| MalformedResponseError::new("Unknown watch attribute.", item))
        })
        .collect()
}

/// Memory blocks of data-read-memory-bytes
pub fn extract_memory_blocks(data: &Tuple) -> Result<Vec<MemoryBlock>> {
    required(data, "memory")?
        .tuples()
        .into_iter()
        .map(|block| {
            Ok(MemoryBlock {
                begin: required_string(block, "begin")?,
                end: required_string(block, "end")?,
                offset: string_field(block, "offset"),
                contents: required_string(block, "contents")?,
            })
        })
        .collect()
}

pub fn extract_register_names(data: &Tuple) -> Result<Vec<String>> {
    Ok(required(data, "register-names")?
        .items()
        .into_iter()
        .filter_map(Value::as_string)
        .map(str::to_string)
        .collect())
}

/// Register values keyed by register number
pub fn extract_register_values(data: &Tuple) -> Result<BTreeMap<u32, String>> {
    required(data, "register-values")?
        .tuples()
        .into_iter()
        .map(|register| {
            Ok((
                required_number(register, "number")?,
                required_string(register, "value")?,
            ))
        })
        .collect()
}

fn extract_asm_instruction(data: &Tuple) -> Result<AsmInstruction> {
    Ok(AsmInstruction {
        address: required_string(data, "address")?,
        func: string_field(data, "func-name"),
        offset: number_field(data, "offset"),
        inst: required_string(data, "inst")?,
        opcodes: string_field(data, "opcodes"),
        size: number_field(data, "size"),
    })
}

/// Instructions of data-disassemble in modes 0 and 2
pub fn extract_asm_instructions(data: &Tuple) -> Result<Vec<AsmInstruction>> {
    required(data, "asm_insns")?
        .tuples()
        .into_iter()
        .map(extract_asm_instruction)
        .collect()
}

/// Instructions of data-disassemble in modes 1 and 3, grouped by source line
pub fn extract_asm_by_source_line(data: &Tuple) -> Result<Vec<SourceLineAsm>> {
    nested_tuples(required(data, "asm_insns")?, "src_and_asm_line")
        .into_iter()
        .map(|line| {
            let instructions = match line.get("line_asm_insn") {
                Some(insns) => insns
                    .tuples()
                    .into_iter()
                    .map(extract_asm_instruction)
                    .collect::<Result<Vec<_>>>()?,
                None => Vec::new(),
            };

            Ok(SourceLineAsm {
                file: string_field(line, "file"),
                fullname: string_field(line, "fullname"),
                line: number_field(line, "line"),
                instructions,
            })
        })
        .collect()
}

fn extract_thread_frame_info(data: &Tuple) -> ThreadFrameInfo {
    ThreadFrameInfo {
        level: number_field(data, "level"),
        func: string_field(data, "func"),
        args: data.get("args").map(extract_variables).unwrap_or_default(),
        address: string_field(data, "addr"),
        filename: string_field(data, "file"),
        fullname: string_field(data, "fullname"),
        line: number_field(data, "line"),
    }
}

pub fn extract_thread_info(data: &Tuple) -> Result<ThreadInfo> {
    let is_stopped = match data.get("state").and_then(Value::as_string) {
        Some("stopped") => Some(true),
        Some("running") => Some(false),
        _ => None,
    };

    Ok(ThreadInfo {
        id: required_number(data, "id")?,
        target_id: string_field(data, "target-id"),
        name: string_field(data, "name"),
        frame: data
            .get("frame")
            .and_then(Value::as_tuple)
            .map(extract_thread_frame_info),
        is_stopped,
        processor_core: string_field(data, "core"),
        details: string_field(data, "details"),
    })
}

/// The single thread reported by `thread-info ID`
pub fn extract_single_thread(data: &Tuple) -> Result<ThreadInfo> {
    let threads = required(data, "threads")?.tuples();

    match threads.as_slice() {
        [thread] => extract_thread_info(thread),
        _ => Err(MalformedResponseError::new(
            "Expected to find \"threads\" list with a single element.",
            data,
        )),
    }
}

/// Every thread reported by `thread-info`, plus the current one
pub fn extract_threads(data: &Tuple) -> Result<MultiThreadInfo> {
    let all = match data.get("threads") {
        Some(threads) => threads
            .tuples()
            .into_iter()
            .map(extract_thread_info)
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let current_id: Option<u32> = number_field(data, "current-thread-id");
    let current = current_id.and_then(|id| all.iter().find(|t| t.id == id).cloned());

    Ok(MultiThreadInfo { all, current })
}

/// Thread ids of a `stopped-threads` field; `"all"` decodes to an empty list
pub fn decode_stopped_threads(value: Option<&Value>) -> Vec<u32> {
    match value {
        Some(Value::String(s)) if s == "all" => Vec::new(),
        Some(value) => value
            .items()
            .into_iter()
            .filter_map(Value::as_string)
            .filter_map(|id| id.parse().ok())
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_record;

    fn results(line: &str) -> Tuple {
        match parse_record(line).unwrap() {
            Record::Result(record) => record.results,
            other => panic!("Expected a result record, got {:?}", other),
        }
    }

    #[test]
    fn test_single_location_breakpoint() {
        let data = results(
            r#"^done,bkpt={number="1",type="breakpoint",disp="keep",enabled="y",addr="0x0000000100000f40",func="main",file="main.c",fullname="/src/main.c",line="5",times="0",original-location="main.c:5"}"#,
        );

        let bp = extract_breakpoint_info(&data).unwrap();
        assert_eq!(bp.id, 1);
        assert_eq!(bp.is_temp, Some(false));
        assert_eq!(bp.is_enabled, Some(true));
        assert_eq!(bp.hit_count, Some(0));
        assert_eq!(bp.thread_id, None);
        assert_eq!(bp.locations.len(), 1);
        assert_eq!(bp.locations[0].line, Some(5));
        assert_eq!(bp.locations[0].filename.as_deref(), Some("main.c"));
    }

    #[test]
    fn test_pending_breakpoint_has_no_locations() {
        let data = results(r#"^done,bkpt={number="2",disp="del",addr="<PENDING>",pending="foo.c:3"}"#);

        let bp = extract_breakpoint_info(&data).unwrap();
        assert_eq!(bp.is_temp, Some(true));
        assert!(bp.locations.is_empty());
        assert_eq!(bp.pending.as_deref(), Some("foo.c:3"));
    }

    #[test]
    fn test_multiple_location_breakpoint() {
        let data = results(
            r#"^done,bkpt={number="1",addr="<MULTIPLE>",enabled="y"},{number="1.1",enabled="y",addr="0x1",line="3"},{number="1.2",enabled="n",addr="0x2",filename="b.c"}"#,
        );

        let bp = extract_breakpoint_info(&data).unwrap();
        assert_eq!(bp.locations.len(), 2);
        assert_eq!(bp.locations[0].id, "1.1");
        assert_eq!(bp.locations[1].is_enabled, Some(false));
        assert_eq!(bp.locations[1].filename.as_deref(), Some("b.c"));
    }

    #[test]
    fn test_breakpoint_list_of_one_matches_single() {
        let single = results(r#"^done,bkpt={number="3",addr="0x10",line="7"}"#);
        let listed = results(r#"^done,bkpt=[{number="3",addr="0x10",line="7"}]"#);

        assert_eq!(
            extract_breakpoint_info(&single).unwrap(),
            extract_breakpoint_info(&listed).unwrap()
        );
    }

    #[test]
    fn test_missing_bkpt_is_malformed() {
        let data = results(r#"^done,foo="bar""#);
        let err = extract_breakpoint_info(&data).unwrap_err();
        assert!(err.message.contains("bkpt"));
        assert!(err.response.contains("foo"));
    }

    #[test]
    fn test_breakpoint_table() {
        let data = results(
            r#"^done,BreakpointTable={nr_rows="2",nr_cols="6",hdr=[{width="3",alignment="-1",col_name="number",colhdr="Num"}],body=[bkpt={number="1",addr="<MULTIPLE>"},bkpt={number="1.1",addr="0x1"},bkpt={number="2",addr="0x2",line="9"}]}"#,
        );

        let bps = extract_breakpoint_table(&data).unwrap();
        assert_eq!(bps.len(), 2);
        assert_eq!(bps[0].locations.len(), 1);
        assert_eq!(bps[0].locations[0].id, "1.1");
        assert_eq!(bps[1].locations[0].line, Some(9));

        let empty = results(r#"^done,BreakpointTable={nr_rows="0",nr_cols="6",hdr=[],body=[]}"#);
        assert!(extract_breakpoint_table(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_stack_frame_requires_level() {
        let data = results(r#"^done,frame={addr="0x1"}"#);
        let frame = data["frame"].as_tuple().unwrap();
        assert!(extract_stack_frame_info(frame).is_err());
    }

    #[test]
    fn test_stack_frame_args() {
        let data = results(
            r#"^done,stack-args=[frame={level="0",args=[{name="argc",value="1"},{name="argv",value="0x7ff"}]},frame={level="1",args=[name="x"]}]"#,
        );

        let frames = extract_stack_frame_args(&data).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].args.len(), 2);
        assert_eq!(frames[0].args[1].value.as_deref(), Some("0x7ff"));
        assert_eq!(frames[1].args[0].name, "x");
    }

    #[test]
    fn test_stack_frame_variables_split() {
        let data = results(
            r#"^done,variables=[{name="argc",arg="1",value="1"},{name="i",type="int",value="0"}]"#,
        );

        let vars = extract_stack_frame_variables(&data).unwrap();
        assert_eq!(vars.args.len(), 1);
        assert_eq!(vars.args[0].name, "argc");
        assert_eq!(vars.locals.len(), 1);
        assert_eq!(vars.locals[0].var_type.as_deref(), Some("int"));
    }

    #[test]
    fn test_watch_info_flags() {
        let data = results(r#"^done,name="var1",numchild="0",value="5",type="int",thread-id="1",has_more="0""#);

        let watch = extract_watch_info(&data).unwrap();
        assert_eq!(watch.id, "var1");
        assert_eq!(watch.child_count, Some(0));
        assert_eq!(watch.thread_id, Some(1));
        assert!(!watch.has_more_children);
        assert!(!watch.is_dynamic);
    }

    #[test]
    fn test_has_more_vocabulary_per_command() {
        // var-create and var-list-children: anything but "0" means more
        let created = results(r#"^done,name="var1",numchild="2",type="Point""#);
        assert!(extract_watch_info(&created).unwrap().has_more_children);

        let listed = results(r#"^done,numchild="1",children=[child={name="var1.x",exp="x",numchild="0"}]"#);
        assert!(extract_watch_children(&listed).unwrap()[0].watch.has_more_children);

        // var-update: only "1" means more
        let updated = results(r#"^done,changelist=[{name="var1",in_scope="true",type_changed="false"}]"#);
        assert!(!extract_watch_updates(&updated).unwrap()[0].has_more_children);
    }

    #[test]
    fn test_stack_frames_single_and_many() {
        let one = results(r#"^done,stack=[frame={level="0",addr="0x1",func="main",file="a.c",line="3"}]"#);
        let many = results(
            r#"^done,stack=[frame={level="0",addr="0x1",func="main",file="a.c",line="3"},frame={level="1",addr="0x2",func="start",from="/lib/libc.so"}]"#,
        );

        let one = extract_stack_frames(&one).unwrap();
        let many = extract_stack_frames(&many).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(many.len(), 2);
        assert_eq!(one[0], many[0]);
        assert_eq!(one[0].line, Some(3));
        assert_eq!(many[1].level, 1);
        assert_eq!(many[1].line, None);
        assert_eq!(many[1].from.as_deref(), Some("/lib/libc.so"));
    }

    #[test]
    fn test_watch_children_single_and_many() {
        let one = results(r#"^done,numchild="1",children=[child={name="var1.x",exp="x",numchild="0",value="1",type="int"}]"#);
        let many = results(
            r#"^done,numchild="2",children=[child={name="var1.x",exp="x",numchild="0",value="1",type="int"},child={name="var1.y",exp="y",numchild="0",value="2",type="int"}]"#,
        );

        let one = extract_watch_children(&one).unwrap();
        let many = extract_watch_children(&many).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(many.len(), 2);
        assert_eq!(one[0], many[0]);
        assert_eq!(many[1].watch.id, "var1.y");
    }

    #[test]
    fn test_disassembly_single_and_many() {
        let one = results(
            r#"^done,asm_insns=[src_and_asm_line={line="5",file="a.c",line_asm_insn=[{address="0x1",inst="nop"}]}]"#,
        );
        let many = results(
            r#"^done,asm_insns=[src_and_asm_line={line="5",file="a.c",line_asm_insn=[{address="0x1",inst="nop"}]},src_and_asm_line={line="6",file="a.c",line_asm_insn=[{address="0x2",inst="ret"}]}]"#,
        );

        let one = extract_asm_by_source_line(&one).unwrap();
        let many = extract_asm_by_source_line(&many).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(many.len(), 2);
        assert_eq!(one[0], many[0]);
        assert_eq!(many[1].instructions[0].inst, "ret");

        let one = results(r#"^done,asm_insns=[{address="0x1",inst="nop"}]"#);
        let many = results(r#"^done,asm_insns=[{address="0x1",inst="nop"},{address="0x2",inst="ret"}]"#);

        let one = extract_asm_instructions(&one).unwrap();
        let many = extract_asm_instructions(&many).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(many.len(), 2);
        assert_eq!(one[0], many[0]);
    }

    #[test]
    fn test_watch_children_shapes() {
        let one = results(r#"^done,numchild="1",children=[child={name="var1.a",exp="a",numchild="0",type="int"}]"#);
        let children = extract_watch_children(&one).unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].expression.as_deref(), Some("a"));

        let two = results(
            r#"^done,numchild="2",children=[child={name="var1.a",exp="a",numchild="0"},child={name="var1.b",exp="b",numchild="0",frozen="1"}]"#,
        );
        let children = extract_watch_children(&two).unwrap();
        assert_eq!(children.len(), 2);
        assert!(children[1].is_frozen);

        let none = results(r#"^done,numchild="0""#);
        assert!(extract_watch_children(&none).unwrap().is_empty());
    }

    #[test]
    fn test_watch_updates() {
        let data = results(
            r#"^done,changelist=[{name="var1",value="6",in_scope="true",type_changed="false",has_more="0"},{name="var2",in_scope="invalid",type_changed="true",new_type="long",new_num_children="3"}]"#,
        );

        let updates = extract_watch_updates(&data).unwrap();
        assert_eq!(updates.len(), 2);
        assert!(updates[0].is_in_scope);
        assert!(!updates[0].has_type_changed);
        assert!(updates[1].is_obsolete);
        assert!(!updates[1].is_in_scope);
        assert!(updates[1].has_type_changed);
        assert_eq!(updates[1].child_count, Some(3));
        assert_eq!(updates[1].expression_type.as_deref(), Some("long"));

        let empty = results(r#"^done,changelist=[]"#);
        assert!(extract_watch_updates(&empty).unwrap().is_empty());
    }

    #[test]
    fn test_formatted_value_from_either_debugger() {
        let gdb = results(r#"^done,format="hexadecimal",value="0x5""#);
        assert_eq!(extract_formatted_value(&gdb).unwrap(), "0x5");

        let lldb = results(r#"^done,changelist=[{name="var1",value="0x5",in_scope="true"}]"#);
        assert_eq!(extract_formatted_value(&lldb).unwrap(), "0x5");
    }

    #[test]
    fn test_watch_attributes() {
        let lldb = results(r#"^done,status="editable""#);
        assert_eq!(extract_watch_attributes(&lldb).unwrap(), vec![WatchAttribute::Editable]);

        let gdb = results(r#"^done,attr="noneditable""#);
        assert_eq!(extract_watch_attributes(&gdb).unwrap(), vec![WatchAttribute::NonEditable]);

        let missing = results(r#"^done"#);
        assert!(extract_watch_attributes(&missing).is_err());
    }

    #[test]
    fn test_memory_blocks() {
        let data = results(r#"^done,memory=[{begin="0x1000",offset="0x0",end="0x1004",contents="01020304"}]"#);

        let blocks = extract_memory_blocks(&data).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].contents, "01020304");
        assert_eq!(blocks[0].offset.as_deref(), Some("0x0"));
    }

    #[test]
    fn test_registers() {
        let names = results(r#"^done,register-names=["rax","rbx",""]"#);
        assert_eq!(extract_register_names(&names).unwrap(), vec!["rax", "rbx", ""]);

        let values = results(r#"^done,register-values=[{number="0",value="0x1"},{number="7",value="0x2"}]"#);
        let map = extract_register_values(&values).unwrap();
        assert_eq!(map.get(&7).map(String::as_str), Some("0x2"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_asm_instructions() {
        let data = results(
            r#"^done,asm_insns=[{address="0x1",func-name="main",offset="4",inst="mov eax, 0",opcodes="b8 00"},{address="0x2",inst="ret"}]"#,
        );

        let insns = extract_asm_instructions(&data).unwrap();
        assert_eq!(insns.len(), 2);
        assert_eq!(insns[0].offset, Some(4));
        assert_eq!(insns[0].func.as_deref(), Some("main"));
        assert_eq!(insns[1].func, None);
    }

    #[test]
    fn test_asm_by_source_line() {
        let data = results(
            r#"^done,asm_insns=[src_and_asm_line={line="5",file="a.c",line_asm_insn=[{address="0x1",inst="nop"}]},src_and_asm_line={line="6",file="a.c",line_asm_insn=[]}]"#,
        );

        let lines = extract_asm_by_source_line(&data).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, Some(5));
        assert_eq!(lines[0].instructions.len(), 1);
        assert!(lines[1].instructions.is_empty());
    }

    #[test]
    fn test_threads() {
        let data = results(
            r#"^done,threads=[{id="1",target-id="Thread 0x1",state="stopped",frame={level="0",addr="0x1",func="main",args=[]}},{id="2",target-id="Thread 0x2",state="running",core="3"}],current-thread-id="2""#,
        );

        let threads = extract_threads(&data).unwrap();
        assert_eq!(threads.all.len(), 2);
        assert_eq!(threads.all[0].is_stopped, Some(true));
        assert_eq!(threads.all[0].frame.as_ref().and_then(|f| f.level), Some(0));
        assert_eq!(threads.current.as_ref().map(|t| t.id), Some(2));
        assert_eq!(threads.current.as_ref().and_then(|t| t.processor_core.clone()).as_deref(), Some("3"));

        assert!(extract_single_thread(&data).is_err());
    }

    #[test]
    fn test_single_thread() {
        let data = results(r#"^done,threads=[{id="4",state="stopped"}]"#);
        assert_eq!(extract_single_thread(&data).unwrap().id, 4);

        let empty = results(r#"^done,threads=[]"#);
        assert!(extract_single_thread(&empty).is_err());
    }

    #[test]
    fn test_decode_stopped_threads() {
        assert!(decode_stopped_threads(Some(&Value::String("all".into()))).is_empty());
        assert_eq!(decode_stopped_threads(Some(&Value::String("3".into()))), vec![3]);
        assert_eq!(
            decode_stopped_threads(Some(&Value::List(vec![
                Value::String("1".into()),
                Value::String("2".into())
            ]))),
            vec![1, 2]
        );
        assert!(decode_stopped_threads(None).is_empty());
    }

    #[test]
    fn test_absent_numbers_are_none() {
        let data = results(r#"^done,line="",level="x""#);
        assert_eq!(number_field::<u32>(&data, "line"), None);
        assert_eq!(number_field::<u32>(&data, "level"), None);
        assert_eq!(number_field::<u32>(&data, "missing"), None);
    }
}
