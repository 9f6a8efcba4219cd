use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use ccback::driver::Driver;
use ccback::error::CodegenResult;
use ccback::symtab::SymFile;
use ccback::target::for_cpu;

#[derive(Parser)]
#[command(
    name = "ccback",
    version,
    about = "Record-stream code generator: front-end records in, assembly out"
)]
struct Cli {
    /// Symbol-table file written by the front end
    symfile: PathBuf,
    /// Target CPU selector
    #[arg(long, default_value_t = 6809)]
    cpu: u32,
    /// Optimization level, accepted for driver compatibility
    #[arg(short = 'O', default_value_t = 0)]
    opt: u8,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("ccback: {}", e);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> CodegenResult<()> {
    let be = for_cpu(cli.cpu)?;
    if cli.opt > 0 {
        log::debug!("optimization level {} requested; none implemented", cli.opt);
    }
    let names = SymFile::open(&cli.symfile)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut driver = Driver::new(stdin.lock(), stdout.lock(), be, Box::new(names));
    driver.run()
}
