use lyralang::runtime_io::BufferIo;
use lyralang::vm::machine::VmErrorKind;
use lyralang::vm::serialize;
use lyralang::{Module, Vm};
use std::fs;
use std::path::PathBuf;

/// E2E tests: every .lyra file under tests/programs/ runs through the full
/// pipeline (parse, analyze, compile, execute) with captured output.

fn get_test_programs() -> Vec<PathBuf> {
    let test_dir = PathBuf::from("tests/programs");
    let mut programs = vec![];
    if let Ok(entries) = fs::read_dir(&test_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("lyra") {
                programs.push(path);
            }
        }
    }
    programs.sort();
    programs
}

fn compile_source(path: &str, source: &str) -> Result<Module, String> {
    let program = lyralang::parse_source(path, source)
        .map_err(|_| format!("parse error in {}", path))?;
    if !lyralang::analyze(&program, path, source) {
        return Err(format!("semantic error in {}", path));
    }
    Ok(lyralang::compile_to_module(&program, source))
}

fn run_module(module: &Module) -> Result<String, String> {
    let mut vm = Vm::new();
    let mut io = BufferIo::new();
    vm.run_with_io(module, &mut io)
        .map_err(|e| format!("vm error: {}", e))?;
    Ok(io.take_output())
}

fn run_test_program(path: &PathBuf) -> Result<String, String> {
    let source = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let module = compile_source(&path.to_string_lossy(), &source)?;
    run_module(&module)
}

#[test]
fn test_e2e_all_programs() {
    let programs = get_test_programs();
    assert!(!programs.is_empty(), "no test programs in tests/programs/");

    let mut failures = vec![];
    for path in programs {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        if let Err(err) = run_test_program(&path) {
            failures.push(format!("{}: {}", name, err));
        }
    }
    assert!(failures.is_empty(), "failed programs:\n{}", failures.join("\n"));
}

/// Bytecode written to the container format and read back must execute
/// identically to the in-memory module.
#[test]
fn test_e2e_serialized_modules_run_identically() {
    for path in get_test_programs() {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        let source = fs::read_to_string(&path).unwrap();
        let module = compile_source(&path.to_string_lossy(), &source)
            .unwrap_or_else(|e| panic!("{}: {}", name, e));

        let bytes = serialize::to_bytes(&module);
        let loaded = serialize::from_bytes(&bytes).unwrap_or_else(|e| panic!("{}: {}", name, e));

        let direct = run_module(&module).unwrap_or_else(|e| panic!("{}: {}", name, e));
        let roundtripped = run_module(&loaded).unwrap_or_else(|e| panic!("{}: {}", name, e));
        assert_eq!(direct, roundtripped, "{}: output diverged after roundtrip", name);
    }
}

macro_rules! test_program {
    ($test_name:ident, $filename:literal, expect = $expected:literal) => {
        #[test]
        fn $test_name() {
            let _ = include_str!(concat!("programs/", $filename));

            let path = PathBuf::from(concat!("tests/programs/", $filename));
            match run_test_program(&path) {
                Ok(output) => assert_eq!(output, $expected, "{} output mismatch", $filename),
                Err(err) => panic!("{} should execute successfully: {}", $filename, err),
            }
        }
    };
}

test_program!(
    test_arith,
    "arith.lyra",
    expect = "3\n10\n2.5\n-3\n-3\n"
);
test_program!(
    test_functions,
    "functions.lyra",
    expect = "5\n120\n55\n"
);
test_program!(test_loops, "loops.lyra", expect = "3\n10\n4\n");
test_program!(test_forin, "forin.lyra", expect = "60\nada\nbrin\n");
test_program!(test_tables, "tables.lyra", expect = "3\n2\nnil\n");
test_program!(
    test_arrays,
    "arrays.lyra",
    expect = "13\n3\nnil\n[10, 2, 3]\n"
);
test_program!(
    test_logic,
    "logic.lyra",
    expect = "false\ntrue\nfalse\ntrue\n1\n0\n"
);
test_program!(
    test_strings,
    "strings.lyra",
    expect = "hello world\n11\nvalue: 42\n3.5!\n42\n"
);
test_program!(test_indirect, "indirect.lyra", expect = "42\n42\n36\n");
test_program!(
    test_branch,
    "branch.lyra",
    expect = "negative\nzero\nsmall\nbig\n"
);
test_program!(test_globals, "globals.lyra", expect = "2\nfunction\nnumber\n");

#[test]
fn test_division_by_zero_terminates_without_output() {
    let module = compile_source("div.lyra", "print(1 / 0)\n").unwrap();
    let mut vm = Vm::new();
    let mut io = BufferIo::new();
    let err = vm.run_with_io(&module, &mut io).unwrap_err();
    assert_eq!(err.kind, VmErrorKind::DivisionByZero);
    assert_eq!(err.line, 1);
    assert_eq!(io.take_output(), "");
}

#[test]
fn test_runtime_error_reports_offending_line() {
    let source = "let x = 1\nlet y = 0\nprint(x / y)\n";
    let module = compile_source("line.lyra", source).unwrap();
    let mut vm = Vm::new();
    let mut io = BufferIo::new();
    let err = vm.run_with_io(&module, &mut io).unwrap_err();
    assert_eq!(err.kind, VmErrorKind::DivisionByZero);
    assert_eq!(err.line, 3);
}

#[test]
fn test_containers_have_reference_semantics() {
    let source = "\
let a = [1, 2]
let b = a
b[0] = 9
print(a[0])
let t = { x: 1 }
let u = t
u[\"x\"] = 5
print(t[\"x\"])
";
    let module = compile_source("refs.lyra", source).unwrap();
    assert_eq!(run_module(&module).unwrap(), "9\n5\n");
}

#[test]
fn test_vm_state_resets_between_runs() {
    let module = compile_source("reset.lyra", "x = 1\nprint(x)\n").unwrap();
    let mut vm = Vm::new();
    for _ in 0..3 {
        let mut io = BufferIo::new();
        vm.run_with_io(&module, &mut io).unwrap();
        assert_eq!(io.take_output(), "1\n");
    }
}

#[test]
fn test_deep_recursion_grows_stack() {
    let source = "\
func down(n)
  if n == 0 then
    return 0
  end
  return down(n - 1)
end
print(down(5000))
";
    let module = compile_source("deep.lyra", source).unwrap();
    assert_eq!(run_module(&module).unwrap(), "0\n");
}
