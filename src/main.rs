use lyralang as lib;
use std::env;

fn main() {
    // Subcommands: build/run/exec/disasm/dism
    // build <file.lyra> [-o out.lybc]: compile to a bytecode file
    // run <file.lyra|file.lybc>: compile-and-execute or execute bytecode
    // exec <file.lybc>: execute a bytecode file
    // disasm <file.lybc>: disassemble a bytecode file
    // dism <file.lyra>: compile a source file and print the disassembly
    let mut args = env::args().skip(1).collect::<Vec<String>>();
    if args.is_empty() {
        print_help();
        return;
    }

    let subcmd = args.remove(0);
    if !["build", "run", "exec", "disasm", "dism"].contains(&subcmd.as_str()) {
        eprintln!("Unknown subcommand: {}", subcmd);
        print_help();
        return;
    }

    let mut input_path: Option<String> = None;
    let mut out_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-o" => {
                if i + 1 < args.len() {
                    out_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            p => {
                input_path = Some(p.to_string());
            }
        }
        i += 1;
    }

    let Some(path) = input_path else {
        eprintln!("Nope, do it like this: lyralang {} <file>", subcmd);
        return;
    };

    match subcmd.as_str() {
        "build" => {
            let Some(module) = compile_file(&path) else {
                return;
            };
            let default_out = format!("{}.lybc", path.trim_end_matches(".lyra"));
            let out = out_path.as_deref().unwrap_or(&default_out);
            match lib::save_module(&module, out) {
                Ok(()) => println!("Successfully built '{}' -> '{}'", path, out),
                Err(err) => eprintln!("Error writing bytecode file: {}", err),
            }
        }
        "run" => {
            if path.ends_with(".lyra") {
                if let Some(module) = compile_file(&path) {
                    lib::exec_module(&module);
                }
            } else {
                match lib::load_module(&path) {
                    Ok(module) => lib::exec_module(&module),
                    Err(err) => eprintln!("Error loading bytecode: {}", err),
                }
            }
        }
        "exec" => match lib::load_module(&path) {
            Ok(module) => lib::exec_module(&module),
            Err(err) => eprintln!("Error loading bytecode: {}", err),
        },
        "disasm" => match lib::load_module(&path) {
            Ok(module) => print!("{}", lib::vm::disasm::disassemble_module_to_string(&module)),
            Err(err) => eprintln!("Error loading bytecode: {}", err),
        },
        "dism" => {
            if let Some(module) = compile_file(&path) {
                print!("{}", lib::vm::disasm::disassemble_module_to_string(&module));
            }
        }
        _ => unreachable!(),
    }
}

/// Reads, parses, analyzes, and compiles a source file, reporting errors to
/// stderr along the way.
fn compile_file(path: &str) -> Option<lib::Module> {
    let src = match std::fs::read_to_string(path) {
        Ok(src) => src,
        Err(err) => {
            eprintln!("Error reading source file: {}", err);
            return None;
        }
    };
    // add newline if not present at the end of file
    let src = if src.ends_with('\n') {
        src
    } else {
        format!("{}\n", src)
    };

    let program = lib::parse_source(path, &src).ok()?;
    if !lib::analyze(&program, path, &src) {
        return None;
    }
    Some(lib::compile_to_module(&program, &src))
}

fn print_help() {
    println!("lyralang is a lightweight scripting language; portable and simple");
    println!("  lyralang build <file.lyra> [-o out.lybc]   Build bytecode from source");
    println!("  lyralang run <file.lyra|file.lybc>         Run source or bytecode");
    println!("  lyralang exec <file.lybc>                  Run a bytecode file");
    println!("  lyralang disasm <file.lybc>                Disassemble a bytecode file");
    println!("  lyralang dism <file.lyra>                  Compile and disassemble");
}
