// tilerctl — command-line harness for the tiler crate.
// Drives one in-process TilerManager over a SimChannel; every subcommand
// is a self-contained exercise since there is no daemon to hold state
// between invocations.

use clap::{Parser, Subcommand};
use serde_json::json;
use std::process::ExitCode;
use tiler::transport::SimChannel;
use tiler::{MemBlock, PixelFormat, TilerConfig, TilerManager};

mod scenarios;
mod stress;

#[derive(Parser)]
#[command(
    name = "tilerctl",
    version,
    about = "tilerctl — exercises the tiler allocator/mapper against a simulated kernel channel"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit JSON instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Path to a TOML config file (defaults to the built-in stride table).
    #[arg(long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Allocate a single PAGE-mode buffer, report it, then free it.
    Alloc1d {
        #[arg(long, default_value_t = 4096)]
        length: u64,
    },
    /// Allocate a single tiled buffer, report it, then free it.
    Alloc2d {
        #[arg(long, value_enum)]
        format: CliPixelFormat,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
    /// Allocate an NV12-style luma+chroma composite, report it, then free it.
    AllocNv12 {
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
    },
    /// Map a synthetic page list into a PAGE-mode view, report it, then unmap it.
    Map {
        #[arg(long, default_value_t = 4096)]
        length: u64,
    },
    /// Run the end-to-end scenario battery and exit nonzero on the first failure.
    SelfTest,
    /// Run a randomized allocate/free/map stress run over a small slot pool.
    Stress {
        #[arg(long, default_value_t = 1000)]
        ops: usize,
        #[arg(long, default_value_t = 10)]
        slots: usize,
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum CliPixelFormat {
    P8,
    P16,
    P32,
}

impl From<CliPixelFormat> for PixelFormat {
    fn from(f: CliPixelFormat) -> PixelFormat {
        match f {
            CliPixelFormat::P8 => PixelFormat::P8,
            CliPixelFormat::P16 => PixelFormat::P16,
            CliPixelFormat::P32 => PixelFormat::P32,
        }
    }
}

fn load_config(path: Option<&str>) -> TilerConfig {
    match path {
        Some(p) => TilerConfig::from_toml(p).unwrap_or_else(|e| {
            eprintln!("[tilerctl] failed to load config {p}: {e}, falling back to defaults");
            TilerConfig::default()
        }),
        None => TilerConfig::default(),
    }
}

fn manager(cfg: TilerConfig) -> TilerManager {
    TilerManager::init(cfg, Box::new(SimChannel::new(cfg)))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Alloc1d { length } => {
            let m = manager(cfg);
            let mut blocks = [MemBlock::page(length)];
            match m.alloc(&mut blocks, 0) {
                Ok(ptr) => {
                    report(cli.json, "alloc_1d", &[("ptr", ptr.to_string()), ("stride", blocks[0].stride.to_string())]);
                    m.free(ptr).expect("just-allocated buffer frees cleanly");
                    ExitCode::SUCCESS
                }
                Err(e) => fail(cli.json, &e.to_string()),
            }
        }
        Commands::Alloc2d { format, width, height } => {
            let m = manager(cfg);
            let mut blocks = [MemBlock::tiled(format.into(), width, height)];
            match m.alloc(&mut blocks, 0) {
                Ok(ptr) => {
                    report(cli.json, "alloc_2d", &[("ptr", ptr.to_string()), ("stride", blocks[0].stride.to_string())]);
                    m.free(ptr).expect("just-allocated buffer frees cleanly");
                    ExitCode::SUCCESS
                }
                Err(e) => fail(cli.json, &e.to_string()),
            }
        }
        Commands::AllocNv12 { width, height } => {
            let m = manager(cfg);
            let mut blocks = [
                MemBlock::tiled(PixelFormat::P8, width, height),
                MemBlock::tiled(PixelFormat::P16, width / 2, height / 2),
            ];
            match m.alloc(&mut blocks, 0) {
                Ok(head) => {
                    report(
                        cli.json,
                        "alloc_nv12",
                        &[
                            ("head", head.to_string()),
                            ("luma_stride", blocks[0].stride.to_string()),
                            ("chroma_stride", blocks[1].stride.to_string()),
                        ],
                    );
                    m.free(head).expect("just-allocated buffer frees cleanly");
                    ExitCode::SUCCESS
                }
                Err(e) => fail(cli.json, &e.to_string()),
            }
        }
        Commands::Map { length } => {
            let m = manager(cfg);
            let page_count = (length / cfg.page_size as u64).max(1);
            let source = tiler::page::VecPageSource((0..page_count).map(|i| (i + 1) * cfg.page_size as u64).collect());
            let mut block = MemBlock::page(length);
            block.ptr = Some(tiler::SsPtr::from_addr(cfg.page_size as usize));
            match m.map(&mut block, &source) {
                Ok(ptr) => {
                    report(cli.json, "map", &[("ptr", ptr.to_string()), ("stride", block.stride.to_string())]);
                    m.unmap(ptr).expect("just-mapped buffer unmaps cleanly");
                    ExitCode::SUCCESS
                }
                Err(e) => fail(cli.json, &e.to_string()),
            }
        }
        Commands::SelfTest => match scenarios::run(cfg) {
            Ok(report_lines) => {
                for line in &report_lines {
                    println!("[self-test] ok: {line}");
                }
                ExitCode::SUCCESS
            }
            Err(e) => fail(cli.json, &e),
        },
        Commands::Stress { ops, slots, seed } => {
            let outcome = stress::run(cfg, ops, slots, seed);
            if cli.json {
                println!("{}", json!({"ops": ops, "slots": slots, "seed": seed, "leaked": outcome.leaked}));
            } else {
                println!(
                    "[stress] {ops} ops over {slots} slots, seed {seed}: {} buffers leaked",
                    outcome.leaked
                );
            }
            if outcome.leaked == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn report(json: bool, op: &str, fields: &[(&str, String)]) {
    if json {
        let mut obj = serde_json::Map::new();
        obj.insert("op".into(), json!(op));
        for (k, v) in fields {
            obj.insert((*k).into(), json!(v));
        }
        println!("{}", serde_json::Value::Object(obj));
    } else {
        let rendered: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
        println!("[{op}] {}", rendered.join(" "));
    }
}

fn fail(json: bool, message: &str) -> ExitCode {
    if json {
        println!("{}", json!({"error": message}));
    } else {
        eprintln!("[tilerctl] error: {message}");
    }
    ExitCode::FAILURE
}
