use clap::Parser;
use fsimage_dump::{dump, DumpOptions};
use serde_json::Value;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fsimage-dump",
    version,
    about = "Dump an HDFS NameNode fsimage as one JSON record per inode"
)]
struct Cli {
    /// Path to the fsimage file
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// JSON object whose fields are merged into every output record
    #[arg(long, value_name = "JSON")]
    extra_fields: Option<String>,

    /// Attach snapshot roots under a virtual "(snapshot)" top-level
    /// directory instead of inline ".snapshot" paths
    #[arg(long)]
    snap_replace: bool,

    /// Emit a single current-state path per file and drop snapshot-only
    /// directory paths
    #[arg(long)]
    snap_cleanup: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("fsimage-dump: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let extra_fields = match &cli.extra_fields {
        Some(raw) => match serde_json::from_str::<Value>(raw)? {
            Value::Object(map) => map,
            _ => return Err("--extra-fields must be a JSON object".into()),
        },
        None => serde_json::Map::new(),
    };

    let options = DumpOptions {
        snap_replace: cli.snap_replace,
        snap_cleanup: cli.snap_cleanup,
        extra_fields,
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let records = dump(&cli.input, &options, &mut out)?;
    out.flush()?;
    log::info!("{records} records from {}", cli.input.display());
    Ok(())
}
