use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::str::FromStr;

use colored::Colorize;
use structopt::StructOpt;

use grackle::{compiler, lower::Program, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutType {
    Ir,
    Ast,
    Asm,
    Obj,
}

impl FromStr for OutType {
    type Err = String;

    fn from_str(s: &str) -> Result<OutType, String> {
        match s {
            "ir" => Ok(OutType::Ir),
            "ast" => Ok(OutType::Ast),
            "asm" => Ok(OutType::Asm),
            "obj" => Ok(OutType::Obj),
            other => Err(format!(
                "unknown output type `{}` (expected ir, ast, asm, or obj)",
                other
            )),
        }
    }
}

#[derive(StructOpt, Debug)]
#[structopt(name = "grackle", about = "The grackle compiler")]
struct Opt {
    /// Specify the type of output (ir, ast, asm, obj)
    #[structopt(short = "t", long = "type", default_value = "obj")]
    out_type: OutType,

    /// Specify the output path (`-` means stdout)
    #[structopt(short, long, default_value = "a.out")]
    output: String,

    /// Specify the target triple
    #[structopt(short, long, default_value = "native")]
    arch: String,

    /// Enable optimization (1-3)
    #[structopt(short = "O", long)]
    optimize: Option<u8>,

    /// The input source path
    #[structopt(parse(from_os_str))]
    input: PathBuf,
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();
    std::process::exit(match run(&opt) {
        Ok(()) => 0,
        Err(message) => {
            eprintln!("{}", message);
            1
        }
    });
}

fn run(opt: &Opt) -> Result<(), String> {
    if let Some(level) = opt.optimize {
        if !(1..=3).contains(&level) {
            return Err(banner("the optimization level must be between 1 and 3"));
        }
    }

    let source = Source::path(&opt.input)
        .map_err(|_| banner(&format!("failed to open \"{}\"", opt.input.display())))?;

    let ast = compiler::parse(source).map_err(|e| e.to_string())?;

    if opt.out_type == OutType::Ast {
        return emit(&opt.output, &format!("{}\n", ast));
    }

    let name = opt
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "a".to_string());
    let mut program = Program::create(&ast, &name).map_err(|e| e.to_string())?;

    let triple = resolve_triple(&opt.arch);
    program.set_target_triple(&triple);

    if let Some(level) = opt.optimize {
        program.optimize(level, level);
    }

    let ir_text = program.irgen();
    if opt.out_type == OutType::Ir {
        return emit(&opt.output, &ir_text);
    }

    // asm and obj go through llc over the printed IR
    let ir_path = temp_path("ll");
    fs::write(&ir_path, &ir_text)
        .map_err(|_| banner("failed to write the intermediate IR file"))?;

    let asm_path = if opt.out_type == OutType::Asm {
        PathBuf::from(resolve_output(&opt.output))
    } else {
        temp_path("s")
    };

    let llc = Command::new("llc")
        .arg(format!("-mtriple={}", triple))
        .arg("-filetype=asm")
        .arg(&ir_path)
        .arg(format!("-o={}", asm_path.display()))
        .status();
    match llc {
        Ok(status) if status.success() => {}
        _ => return Err(banner("llc failed to assemble the generated IR")),
    }
    if opt.out_type == OutType::Asm {
        return Ok(());
    }

    let mut link = Command::new("cc");
    link.arg(&asm_path);
    link.arg("-lgc");
    for lib in program.link_libraries() {
        if lib != "gc" {
            link.arg(format!("-l{}", lib));
        }
    }
    link.arg("-o").arg(resolve_output(&opt.output));
    match link.status() {
        Ok(status) if status.success() => Ok(()),
        _ => Err(banner("cc failed to link the output")),
    }
}

fn banner(message: &str) -> String {
    format!("{} {}", "[ERROR]".on_red().white(), message)
}

fn emit(output: &str, text: &str) -> Result<(), String> {
    if output == "-" {
        print!("{}", text);
        Ok(())
    } else {
        fs::write(output, text)
            .map_err(|_| banner(&format!("failed to write \"{}\"", output)))
    }
}

fn resolve_output(output: &str) -> String {
    if output == "-" {
        "/dev/stdout".to_string()
    } else {
        output.to_string()
    }
}

/// Best-effort host triple when the user doesn't name one.
fn resolve_triple(arch: &str) -> String {
    if arch != "native" {
        return arch.to_string();
    }
    let os = match std::env::consts::OS {
        "macos" => "apple-darwin".to_string(),
        "windows" => "pc-windows-gnu".to_string(),
        os => format!("unknown-{}-gnu", os),
    };
    format!("{}-{}", std::env::consts::ARCH, os)
}

fn temp_path(extension: &str) -> PathBuf {
    let stamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("grackle-{}-{}.{}", std::process::id(), stamp, extension))
}
