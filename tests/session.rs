use std::io::Write;

use slisp::{Config, LispError, Machine};

fn machine() -> Machine {
    Machine::new(Config::default()).expect("default runtime should initialize")
}

#[test]
fn run_reports_each_top_level_result() {
    let mut m = machine();
    let mut printed = Vec::new();
    m.run(
        "; squares\n(def sq (.\\ (x) (* x x)))\n(sq 4)\n'(a . b)\n",
        |m, v| printed.push(m.print(v)),
    )
    .unwrap();
    assert_eq!(printed, vec!["nil", "16", "(a . b)"]);
}

#[test]
fn run_stops_at_the_first_error() {
    let mut m = machine();
    let mut printed = Vec::new();
    let result = m.run("(+ 1 2) (missing) (+ 3 4)", |m, v| printed.push(m.print(v)));
    assert_eq!(result, Err(LispError::UnboundVariable("missing".into())));
    assert_eq!(printed, vec!["3"]);
}

#[test]
fn syntax_errors_end_the_session() {
    let mut m = machine();
    let mut printed = Vec::new();
    let result = m.run("(+ 1 2) (+ 3", |m, v| printed.push(m.print(v)));
    assert!(matches!(result, Err(LispError::Syntax(_))));
    assert_eq!(printed, vec!["3"]);
}

#[test]
fn strings_read_as_quoted_byte_lists() {
    let mut m = machine();
    let v = m.eval_str("\"AB\"").unwrap();
    assert_eq!(m.print(v), "(65 66)");
}

#[test]
fn input_file_is_bound_as_byte_list() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"Hi\n").unwrap();

    let mut m = machine();
    m.bind_input_file(file.path()).unwrap();
    let v = m.eval_str("input").unwrap();
    assert_eq!(m.print(v), "(72 105 10)");
    let v = m.eval_str("(head input)").unwrap();
    assert_eq!(m.print(v), "72");
}

#[test]
fn empty_input_file_binds_nil() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut m = machine();
    m.bind_input_file(file.path()).unwrap();
    let v = m.eval_str("(nil? input)").unwrap();
    assert_eq!(m.print(v), "1");
}

#[test]
fn input_cannot_be_bound_twice() {
    let mut m = machine();
    m.bind_input(b"a").unwrap();
    assert_eq!(m.bind_input(b"b"), Err(LispError::Redefinition("input".into())));
}

#[test]
fn missing_input_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut m = machine();
    let err = m.bind_input_file(dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, LispError::Io(_)));
}

#[test]
fn dump_lists_slots_and_symbols() {
    let mut m = machine();
    m.eval_str("(def answer 42)").unwrap();
    let dump = m.dump();
    assert!(dump.starts_with("-===- DUMP BEGIN -===-\n"));
    assert!(dump.ends_with("-===- DUMP END -===-\n"));
    assert!(dump.contains("`answer`"));
    assert!(dump.contains("`42`"));
}

#[test]
fn invalid_configuration_is_rejected() {
    let config = Config { max_usage_percent: 0, ..Config::default() };
    assert!(matches!(Machine::new(config), Err(LispError::InvalidConfig(_))));
}

#[test]
fn builtin_registry_is_bounded() {
    let config = Config { max_natives: 5, ..Config::default() };
    assert_eq!(Machine::new(config).err(), Some(LispError::TooManyNatives { max: 5 }));
}

#[test]
fn symbol_table_is_bounded() {
    let config = Config { max_symbols: 40, ..Config::default() };
    let mut m = Machine::new(config).unwrap();
    let free = 40 - m.symbols.count();
    for i in 0..free {
        m.intern(&format!("s{}", i)).unwrap();
    }
    assert_eq!(m.intern("extra"), Err(LispError::OutOfSymbols { capacity: 40 }));
    assert!(m.intern("s0").is_ok());
}

#[test]
fn long_symbol_names_are_rejected() {
    let mut m = machine();
    let err = m.eval_str("(quote abcdefghijklmnopq)").unwrap_err();
    assert!(matches!(err, LispError::NameTooLong { max: 15, .. }));
}

#[test]
fn runaway_recursion_under_default_limits_is_reported() {
    let mut m = machine();
    m.eval_str("(def loop (.\\ (n) (loop (+ n 1))))").unwrap();
    assert_eq!(m.eval_str("(loop 0)"), Err(LispError::RecursionLimit { max: 2000 }));
    assert!(m.roots.is_empty());
}

#[test]
fn runaway_recursion_hits_the_depth_limit() {
    let config = Config { max_eval_depth: 200, ..Config::default() };
    let mut m = Machine::new(config).unwrap();
    m.eval_str("(def loop (.\\ (n) (loop (+ n 1))))").unwrap();
    assert_eq!(m.eval_str("(loop 0)"), Err(LispError::RecursionLimit { max: 200 }));
    assert_eq!(m.roots.len(), 0);
}
