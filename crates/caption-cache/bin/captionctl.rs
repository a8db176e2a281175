//! Diagnostics for caption archives and the caption pipeline.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use caption_cache::{
    CaptionConfig, CaptionError, CaptionHints, CaptionSystem, FileBlockReader, MonospaceMeasurer,
};
use caption_formats::archive::decode_caption;
use caption_formats::{ArchiveIndex, DirectoryEntry, caption_hash};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "captionctl",
    about = "Inspect closed caption archives and run the caption pipeline headless",
    version
)]
struct Cli {
    /// Default log level, overridden by RUST_LOG
    #[arg(short, long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Output format
    #[arg(short = 'o', long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    /// Plain text output
    Text,
    /// Pretty-printed JSON
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header and directory summary of an archive
    Info {
        /// Archive file
        archive: PathBuf,
    },

    /// Look a key up and print its directory entry and string
    Lookup {
        /// Archive file
        archive: PathBuf,
        /// Caption key
        key: String,
    },

    /// Resolve captions through the tick pipeline and print the result
    Play {
        /// Archive file
        archive: PathBuf,
        /// Caption keys
        #[arg(required = true)]
        keys: Vec<String>,
        /// Join the keys into one sentence instead of separate captions
        #[arg(long)]
        sentence: bool,
        /// Layout width in pixels
        #[arg(long, default_value_t = 640)]
        width: u32,
        /// Visible height in pixels
        #[arg(long, default_value_t = 120)]
        height: u32,
        /// Ticks to run
        #[arg(long, default_value_t = 2)]
        ticks: u32,
        /// Seconds per tick
        #[arg(long, default_value_t = 1.0 / 60.0)]
        dt: f32,
        /// Advance of every character in pixels
        #[arg(long, default_value_t = 8)]
        advance: u32,
        /// Line height in pixels
        #[arg(long, default_value_t = 16)]
        line_height: u32,
        /// Treat the captions as spoken by the tracked speaker
        #[arg(long)]
        from_speaker: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_directive())),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Info { archive } => info(&archive, cli.format),
        Commands::Lookup { archive, key } => lookup(&archive, &key, cli.format),
        Commands::Play {
            archive,
            keys,
            sentence,
            width,
            height,
            ticks,
            dt,
            advance,
            line_height,
            from_speaker,
        } => {
            let config = CaptionConfig::new().with_viewport(width, height);
            let mut hints = CaptionHints::default().warn_if_missing();
            hints.from_speaker = from_speaker;
            let run = PlayRun {
                keys,
                sentence,
                ticks,
                dt,
                hints,
            };
            play(
                &archive,
                config,
                MonospaceMeasurer::new(advance, line_height),
                &run,
                cli.format,
            )
        }
    }
}

fn read_index(path: &Path) -> anyhow::Result<ArchiveIndex> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    ArchiveIndex::read(&mut BufReader::new(file))
        .with_context(|| format!("reading {}", path.display()))
}

fn info(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let index = read_index(path)?;
    let header = &index.header;
    let used: u64 = index.entries.iter().map(|e| e.length.max(0) as u64).sum();

    if format == OutputFormat::Json {
        let value = json!({
            "path": path.display().to_string(),
            "version": header.version,
            "num_blocks": header.num_blocks,
            "block_size": header.block_size,
            "directory_size": header.directory_size,
            "data_offset": header.data_offset,
            "file_len": header.file_len(),
            "string_bytes": used,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Archive:        {}", path.display());
    println!("Version:        {}", header.version);
    println!("Blocks:         {} x {} bytes", header.num_blocks, header.block_size);
    println!("Entries:        {}", header.directory_size);
    println!("Data offset:    {}", header.data_offset);
    println!("File length:    {}", header.file_len());
    if header.data_len() > 0 {
        println!(
            "Block fill:     {:.1}%",
            used as f64 * 100.0 / header.data_len() as f64
        );
    }
    Ok(())
}

fn read_entry(path: &Path, index: &ArchiveIndex, entry: &DirectoryEntry) -> anyhow::Result<String> {
    let range = entry.file_range(&index.header);
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(range.start))?;
    let mut buffer = vec![0u8; (range.end - range.start) as usize];
    file.read_exact(&mut buffer)?;
    Ok(decode_caption(&buffer)?)
}

fn lookup(path: &Path, key: &str, format: OutputFormat) -> anyhow::Result<()> {
    let index = read_index(path)?;
    let entry = *index
        .find_key(key)
        .ok_or_else(|| CaptionError::KeyNotFound(key.to_string()))?;
    let text = read_entry(path, &index, &entry)?;

    if format == OutputFormat::Json {
        let value = json!({
            "key": key,
            "hash": format!("{:08x}", entry.hash),
            "block": entry.block,
            "offset": entry.offset,
            "length": entry.length,
            "text": text,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Key:     {key}");
    println!("Hash:    {:08x}", caption_hash(key));
    println!(
        "Entry:   block {} offset {} length {}",
        entry.block, entry.offset, entry.length
    );
    println!("Text:    {text}");
    Ok(())
}

struct PlayRun {
    keys: Vec<String>,
    sentence: bool,
    ticks: u32,
    dt: f32,
    hints: CaptionHints,
}

fn play(
    path: &Path,
    config: CaptionConfig,
    measurer: MonospaceMeasurer,
    run: &PlayRun,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let mut system = CaptionSystem::new(config, FileBlockReader::new(), measurer)?;
    let archive = system.load_archive(path)?;

    let keys: Vec<&str> = run.keys.iter().map(String::as_str).collect();
    let accepted = if run.sentence {
        usize::from(system.request_sentence(&keys, run.hints).is_some())
    } else {
        keys.iter()
            .filter(|key| system.request_caption(key, run.hints).is_some())
            .count()
    };
    if accepted == 0 {
        bail!("no caption could be resolved");
    }

    for _ in 0..run.ticks {
        system.tick(run.dt);
    }

    let states = system.block_states(archive).unwrap_or_default();
    let diagnostics = system.diagnostics();
    let visible = system.visible_items();

    if format == OutputFormat::Json {
        let items: Vec<_> = visible
            .iter()
            .map(|v| {
                json!({
                    "text": v.item.text(),
                    "y": v.y,
                    "opacity": v.opacity,
                    "pan_offset": v.pan_offset,
                    "ttl": v.item.ttl_remaining(),
                    "units": v.item.units().iter().map(|u| json!({
                        "text": u.text,
                        "font": u.font,
                        "color": u.color,
                        "x": u.x,
                        "y": u.y,
                        "width": u.width,
                        "height": u.height,
                    })).collect::<Vec<_>>(),
                })
            })
            .collect();
        let value = json!({
            "items": items,
            "blocks": states,
            "diagnostics": diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for (i, v) in visible.iter().enumerate() {
        println!(
            "Item {} at y={} opacity={:.2} pan={} ttl={:.2}s",
            i,
            v.y,
            v.opacity,
            v.pan_offset,
            v.item.ttl_remaining()
        );
        for unit in v.item.units() {
            println!(
                "  ({:>4},{:>4}) {:>4}x{:<3} {:?} rgb({},{},{}) {:?}",
                unit.x,
                unit.y,
                unit.width,
                unit.height,
                unit.font,
                unit.color.r,
                unit.color.g,
                unit.color.b,
                unit.text
            );
        }
    }
    if visible.is_empty() {
        println!("No caption visible after {} ticks", run.ticks);
    }

    let summary: String = states
        .iter()
        .map(|state| match state {
            caption_cache::BlockState::Absent => '.',
            caption_cache::BlockState::Pending => 'p',
            caption_cache::BlockState::Resident => 'R',
        })
        .collect();
    println!("Blocks:  [{summary}]");
    println!(
        "Cache:   {} / {} bytes, {} reads, {} evictions, {} missing keys",
        diagnostics.resident_bytes,
        diagnostics.budget_bytes,
        diagnostics.reads_issued,
        diagnostics.evictions,
        diagnostics.missing_keys
    );
    Ok(())
}
