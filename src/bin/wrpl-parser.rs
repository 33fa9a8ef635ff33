//! War Thunder replay (.wrpl) parser CLI
//!
//! A command-line interface for inspecting, validating and rewriting
//! replay files.
//!
//! ## Commands
//!
//! - `info` - Display replay metadata and identity
//! - `packets` - List packets with type/kind filters
//! - `chat` - Dump chat messages
//! - `players` - Dump the player roster
//! - `validate` - Validate a replay (exit codes for scripting)
//! - `rewrite` - Losslessly rewrite a replay to a new file

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;

use wrpl_parser::binary::to_hex;
use wrpl_parser::{read_parted_replay, read_replay, write_replay, DecodeSections, Replay};

/// War Thunder replay (.wrpl) parser
#[derive(Parser)]
#[command(name = "wrpl-parser")]
#[command(about = "War Thunder replay (.wrpl) parser", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display replay information
    Info {
        /// Path to the replay file, or a directory of fragments with --parted
        path: PathBuf,
        /// Treat the path as a directory of replay fragments
        #[arg(long)]
        parted: bool,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List packets
    Packets {
        /// Path to the replay file
        file: PathBuf,
        /// Only show packets of this type (by name, e.g. "chat", "mpi")
        #[arg(short = 't', long = "type")]
        type_filter: Option<String>,
        /// Only show packets whose parsed kind matches (e.g. "kill")
        #[arg(short, long)]
        kind: Option<String>,
        /// Stop after this many packets
        #[arg(short, long)]
        limit: Option<usize>,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Dump chat messages
    Chat {
        /// Path to the replay file
        file: PathBuf,
    },
    /// Dump the player roster
    Players {
        /// Path to the replay file
        file: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Validate replay format
    Validate {
        /// Path to the replay file
        file: PathBuf,
        /// Verbose error reporting
        #[arg(short, long)]
        verbose: bool,
    },
    /// Losslessly rewrite a replay
    Rewrite {
        /// Path to the replay file
        file: PathBuf,
        /// Output path
        output: PathBuf,
    },
}

// ============================================================================
// Serializable Output Structures
// ============================================================================

#[derive(Serialize)]
struct InfoOutput {
    identity: String,
    level: String,
    battle_type: String,
    environment: String,
    session_id: String,
    part_number: u8,
    server_side: bool,
    start_time: u32,
    time_limit: u32,
    score_limit: u32,
    packet_count: usize,
    parse_errors: usize,
    players: usize,
    templates: usize,
    packets_by_type: BTreeMap<String, usize>,
    has_settings: bool,
    has_results: bool,
}

#[derive(Serialize)]
struct PacketInfo {
    index: usize,
    time: u32,
    packet_type: String,
    kind: String,
    payload_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct PlayerInfo {
    slot: u8,
    user_id: u32,
    name: String,
    clan_tag: String,
    title: String,
}

fn info_output(replay: &Replay) -> InfoOutput {
    let mut packets_by_type: BTreeMap<String, usize> = BTreeMap::new();
    for p in replay.packets() {
        *packets_by_type
            .entry(p.packet_type.name().to_string())
            .or_default() += 1;
    }
    InfoOutput {
        identity: replay.identity(),
        level: replay.header.level(),
        battle_type: replay.header.battle_type(),
        environment: replay.header.environment(),
        session_id: format!("{:016x}", replay.header.session_id),
        part_number: replay.header.replay_part_number,
        server_side: replay.header.is_server(),
        start_time: replay.header.start_time,
        time_limit: replay.header.time_limit,
        score_limit: replay.header.score_limit,
        packet_count: replay.packets.len(),
        parse_errors: replay.parse_error_count(),
        players: replay.players.occupied_count(),
        templates: replay.registry.template_count(),
        packets_by_type,
        has_settings: replay.settings.is_some(),
        has_results: replay.results.is_some(),
    }
}

// ============================================================================
// Commands
// ============================================================================

fn load(path: &Path) -> Result<Replay, String> {
    let data = std::fs::read(path).map_err(|e| format!("reading {}: {e}", path.display()))?;
    read_replay(&data, DecodeSections::all()).map_err(|e| format!("parsing {}: {e}", path.display()))
}

fn load_parted(dir: &Path) -> Result<Replay, String> {
    let mut parts = Vec::new();
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("reading {}: {e}", dir.display()))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "wrpl"))
        .collect();
    paths.sort();
    for path in paths {
        parts.push(std::fs::read(&path).map_err(|e| format!("reading {}: {e}", path.display()))?);
    }
    read_parted_replay(&parts).map_err(|e| format!("stitching {}: {e}", dir.display()))
}

fn cmd_info(path: &Path, parted: bool, json: bool) -> Result<(), String> {
    let replay = if parted { load_parted(path)? } else { load(path)? };
    let out = info_output(&replay);
    if json {
        println!("{}", serde_json::to_string_pretty(&out).unwrap());
    } else {
        println!("identity:    {}", out.identity);
        println!("level:       {}", out.level);
        println!("battle type: {}", out.battle_type);
        println!("environment: {}", out.environment);
        println!("session:     {} (part {}, {})", out.session_id, out.part_number,
            if out.server_side { "server" } else { "client" });
        println!("start time:  {}", out.start_time);
        println!("limits:      time {} score {}", out.time_limit, out.score_limit);
        println!("settings:    {}", if out.has_settings { "yes" } else { "no" });
        println!("results:     {}", if out.has_results { "yes" } else { "no" });
        println!("players:     {}", out.players);
        println!("templates:   {}", out.templates);
        println!("packets:     {} ({} parse errors)", out.packet_count, out.parse_errors);
        for (name, count) in &out.packets_by_type {
            println!("  {name:<20} {count}");
        }
    }
    Ok(())
}

fn cmd_packets(
    file: &Path,
    type_filter: Option<&str>,
    kind_filter: Option<&str>,
    limit: Option<usize>,
    json: bool,
) -> Result<(), String> {
    let replay = load(file)?;
    let mut rows = Vec::new();
    for (index, p) in replay.packets().enumerate() {
        let kind = p.parsed.as_ref().map_or("-", |parsed| parsed.kind());
        if let Some(t) = type_filter {
            if p.packet_type.name() != t {
                continue;
            }
        }
        if let Some(k) = kind_filter {
            if kind != k {
                continue;
            }
        }
        rows.push(PacketInfo {
            index,
            time: p.current_time,
            packet_type: p.packet_type.name().to_string(),
            kind: kind.to_string(),
            payload_len: p.payload.len(),
            error: p.parse_error.as_ref().map(std::string::ToString::to_string),
        });
        if limit.is_some_and(|l| rows.len() >= l) {
            break;
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&rows).unwrap());
    } else {
        for r in &rows {
            let err = r.error.as_deref().unwrap_or("");
            println!(
                "{:>6}  t={:>10}  {:<20} {:<16} {:>6}b  {err}",
                r.index, r.time, r.packet_type, r.kind, r.payload_len
            );
        }
        println!("{} packets", rows.len());
    }
    Ok(())
}

fn cmd_chat(file: &Path) -> Result<(), String> {
    let replay = load(file)?;
    for packet in replay.packets() {
        if let Some(chat) = packet.parsed.as_ref().and_then(|p| p.as_chat()) {
            let side = if chat.is_enemy != 0 { "enemy" } else { "ally" };
            println!(
                "t={:>10} [ch {}] ({side}) {}: {}",
                packet.current_time, chat.channel, chat.sender, chat.content
            );
        }
    }
    Ok(())
}

fn cmd_players(file: &Path, json: bool) -> Result<(), String> {
    let replay = load(file)?;
    let rows: Vec<PlayerInfo> = replay
        .players()
        .map(|(slot, p)| PlayerInfo {
            slot,
            user_id: p.user_id,
            name: p.name.clone(),
            clan_tag: p.clan_tag.clone(),
            title: p.title.clone(),
        })
        .collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&rows).unwrap());
    } else {
        for r in &rows {
            let clan = if r.clan_tag.is_empty() {
                String::new()
            } else {
                format!(" [{}]", r.clan_tag)
            };
            println!("slot {:>3}  uid {:>10} {}{clan}  {}", r.slot, r.user_id, r.name, r.title);
        }
    }
    Ok(())
}

fn cmd_validate(file: &Path, verbose: bool) -> ExitCode {
    let data = match std::fs::read(file) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("error: reading {}: {e}", file.display());
            return ExitCode::from(2);
        }
    };
    match read_replay(&data, DecodeSections::all()) {
        Ok(replay) => {
            let errors = replay.parse_error_count();
            println!(
                "{}: ok, {} packets, {} parse errors",
                file.display(),
                replay.packets.len(),
                errors
            );
            if verbose {
                for (packet, err) in replay.parse_errors() {
                    eprintln!(
                        "  t={} type={} {err} (payload {})",
                        packet.current_time,
                        packet.packet_type.name(),
                        to_hex(&packet.payload[..packet.payload.len().min(16)])
                    );
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: invalid: {e}", file.display());
            ExitCode::FAILURE
        }
    }
}

fn cmd_rewrite(file: &Path, output: &Path) -> Result<(), String> {
    let data = std::fs::read(file).map_err(|e| format!("reading {}: {e}", file.display()))?;
    let replay = read_replay(&data, DecodeSections::all())
        .map_err(|e| format!("parsing {}: {e}", file.display()))?;
    let rewritten =
        write_replay(&replay).map_err(|e| format!("rewriting {}: {e}", file.display()))?;
    let identical = rewritten == data;
    std::fs::write(output, &rewritten)
        .map_err(|e| format!("writing {}: {e}", output.display()))?;
    println!(
        "wrote {} ({} bytes, {})",
        output.display(),
        rewritten.len(),
        if identical { "byte-identical" } else { "differs from input" }
    );
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::Info { path, parted, json } => cmd_info(path, *parted, *json),
        Commands::Packets {
            file,
            type_filter,
            kind,
            limit,
            json,
        } => cmd_packets(file, type_filter.as_deref(), kind.as_deref(), *limit, *json),
        Commands::Chat { file } => cmd_chat(file),
        Commands::Players { file, json } => cmd_players(file, *json),
        Commands::Validate { file, verbose } => return cmd_validate(file, *verbose),
        Commands::Rewrite { file, output } => cmd_rewrite(file, output),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
