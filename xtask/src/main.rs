use clap::{Parser, Subcommand};
use std::process::Command;

/// gantry 빌드 태스크
#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// fmt, clippy, test를 순서대로 실행
    Ci,
    /// 퍼즈 타깃 실행 (nightly + cargo-fuzz 필요)
    Fuzz {
        /// 타깃 이름 (node_decode, route_config, netlink_unpack)
        target: String,
        /// 실행 시간 제한 (초)
        #[arg(long, default_value_t = 60)]
        max_total_time: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ci => ci(),
        Commands::Fuzz {
            target,
            max_total_time,
        } => fuzz(&target, max_total_time),
    }
}

fn run(name: &str, cmd: &mut Command) {
    let status = cmd.status().unwrap_or_else(|err| {
        eprintln!("failed to run {name}: {err}");
        std::process::exit(1);
    });
    if !status.success() {
        eprintln!("{name} failed");
        std::process::exit(1);
    }
}

fn ci() {
    run(
        "cargo fmt",
        Command::new("cargo").args(["fmt", "--all", "--check"]),
    );
    run(
        "cargo clippy",
        Command::new("cargo").args([
            "clippy",
            "--workspace",
            "--all-targets",
            "--",
            "-D",
            "warnings",
        ]),
    );
    run(
        "cargo test",
        Command::new("cargo").args(["test", "--workspace"]),
    );
    println!("ci passed");
}

fn fuzz(target: &str, max_total_time: u64) {
    run(
        "cargo fuzz",
        Command::new("cargo").args([
            "+nightly",
            "fuzz",
            "run",
            target,
            "--",
            &format!("-max_total_time={max_total_time}"),
        ]),
    );
}
