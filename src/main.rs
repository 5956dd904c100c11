use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Result, bail};

use pl0::codegen::CompilerOptions;
use pl0::diagnostics::DiagnosticSink;
use pl0::driver::{
    DumpOptions, compile_file, load_pcode_file, print_diagnostics, run_instructions,
    save_pcode_file,
};
use pl0::pcode;
use pl0::vm::RunnerOptions;

fn print_usage() {
    eprintln!(
        "Usage:\n  \
         pl0 compile <input.pl0> [-o out.pcode] [--dump-tokens --dump-ast --dump-sym --dump-pcode --bounds-check]\n  \
         pl0 run <input.pcode> [--trace-vm]\n  \
         pl0 disasm <input.pcode>\n  \
         pl0 <input.pl0> [--trace-vm --bounds-check] [--dump-tokens --dump-ast --dump-sym --dump-pcode]"
    );
}

fn default_output(input: &Path) -> PathBuf {
    input.with_extension("pcode")
}

fn report_and_fail(diagnostics: &DiagnosticSink) -> Result<ExitCode> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    print_diagnostics(diagnostics, &mut out)?;
    Ok(ExitCode::FAILURE)
}

fn handle_compile(args: &[String]) -> Result<ExitCode> {
    let mut options = CompilerOptions::default();
    let mut dumps = DumpOptions::default();
    let mut output_path: Option<PathBuf> = None;
    let mut input_path: Option<PathBuf> = None;

    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-o" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("missing output path after -o"))?;
                output_path = Some(PathBuf::from(path));
            }
            "--dump-tokens" => dumps.tokens = true,
            "--dump-ast" => dumps.ast = true,
            "--dump-sym" => dumps.symbols = true,
            "--dump-pcode" => dumps.pcode = true,
            "--bounds-check" => options.enable_bounds_check = true,
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => {
                if input_path.is_some() {
                    bail!("unexpected argument: {other}");
                }
                input_path = Some(PathBuf::from(other));
            }
        }
    }

    let Some(input_path) = input_path else {
        print_usage();
        return Ok(ExitCode::FAILURE);
    };
    let output_path = output_path.unwrap_or_else(|| default_output(&input_path));

    let mut diagnostics = DiagnosticSink::new();
    let stdout = io::stdout();
    let mut dump_stream = stdout.lock();
    let result = compile_file(&input_path, options, dumps, &mut diagnostics, &mut dump_stream)?;
    dump_stream.flush()?;

    if diagnostics.has_errors() {
        return report_and_fail(&diagnostics);
    }

    save_pcode_file(&output_path, &result.code)?;
    Ok(ExitCode::SUCCESS)
}

fn handle_run(args: &[String]) -> Result<ExitCode> {
    let mut options = RunnerOptions::default();
    let mut input_path: Option<PathBuf> = None;

    for arg in args {
        match arg.as_str() {
            "--trace-vm" => options.trace_vm = true,
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => {
                if input_path.is_some() {
                    bail!("unexpected argument: {other}");
                }
                input_path = Some(PathBuf::from(other));
            }
        }
    }

    let Some(input_path) = input_path else {
        print_usage();
        return Ok(ExitCode::FAILURE);
    };

    let code = load_pcode_file(&input_path)?;
    let mut diagnostics = DiagnosticSink::new();
    let result = run_instructions(&code, &mut diagnostics, &options);
    if diagnostics.has_errors() {
        return report_and_fail(&diagnostics);
    }
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn handle_disasm(args: &[String]) -> Result<ExitCode> {
    let [input_path] = args else {
        print_usage();
        return Ok(ExitCode::FAILURE);
    };
    let code = load_pcode_file(Path::new(input_path))?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    pcode::serialize_instructions(&code, &mut out)?;
    Ok(ExitCode::SUCCESS)
}

/// Bare `pl0 <input.pl0>` runs the full compile-then-execute pipeline.
fn handle_default_pipeline(args: &[String]) -> Result<ExitCode> {
    let mut compiler_options = CompilerOptions::default();
    let mut runner_options = RunnerOptions::default();
    let mut dumps = DumpOptions::default();
    let mut input_path: Option<PathBuf> = None;

    for arg in args {
        match arg.as_str() {
            "--dump-tokens" => dumps.tokens = true,
            "--dump-ast" => dumps.ast = true,
            "--dump-sym" => dumps.symbols = true,
            "--dump-pcode" => dumps.pcode = true,
            "--trace-vm" => runner_options.trace_vm = true,
            "--bounds-check" => compiler_options.enable_bounds_check = true,
            other if other.starts_with('-') => bail!("unknown option: {other}"),
            other => {
                if input_path.is_some() {
                    bail!("unexpected argument: {other}");
                }
                input_path = Some(PathBuf::from(other));
            }
        }
    }

    let Some(input_path) = input_path else {
        print_usage();
        return Ok(ExitCode::FAILURE);
    };

    let mut diagnostics = DiagnosticSink::new();
    let result = {
        let stdout = io::stdout();
        let mut dump_stream = stdout.lock();
        let result = compile_file(
            &input_path,
            compiler_options,
            dumps,
            &mut diagnostics,
            &mut dump_stream,
        )?;
        dump_stream.flush()?;
        result
    };

    if diagnostics.has_errors() {
        return report_and_fail(&diagnostics);
    }

    let run_result = run_instructions(&result.code, &mut diagnostics, &runner_options);
    if diagnostics.has_errors() {
        return report_and_fail(&diagnostics);
    }
    Ok(if run_result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return ExitCode::FAILURE;
    }

    let outcome = match args[0].as_str() {
        "compile" => handle_compile(&args[1..]),
        "run" => handle_run(&args[1..]),
        "disasm" => handle_disasm(&args[1..]),
        _ => handle_default_pipeline(&args),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
