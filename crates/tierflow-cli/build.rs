use clap::{Command, CommandFactory};
use clap_complete::{Shell, generate_to};
use clap_mangen::Man;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

mod cli {
    include!(concat!(env!("CARGO_MANIFEST_DIR"), "/src/cli.rs"));
}

/// Man pages and completion scripts land in `$OUT_DIR/man` and
/// `$OUT_DIR/completions` for packaging.
fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = PathBuf::from(std::env::var_os("OUT_DIR").ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "OUT_DIR is not set")
    })?);
    let mut cmd = cli::Cli::command();

    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;
    render_man_pages(&cmd, "tierflow", &man_dir)?;

    let completions_dir = out_dir.join("completions");
    fs::create_dir_all(&completions_dir)?;
    for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
        generate_to(shell, &mut cmd, "tierflow", &completions_dir)?;
    }
    Ok(())
}

/// One page per command, nested subcommands included (`tierflow-memory-sweep.1`).
fn render_man_pages(cmd: &Command, page: &str, dir: &Path) -> io::Result<()> {
    let mut buffer = Vec::new();
    Man::new(cmd.clone()).render(&mut buffer)?;
    fs::write(dir.join(format!("{page}.1")), buffer)?;

    for subcommand in cmd.get_subcommands() {
        if subcommand.get_name() == "help" {
            continue;
        }
        render_man_pages(subcommand, &format!("{page}-{}", subcommand.get_name()), dir)?;
    }
    Ok(())
}
