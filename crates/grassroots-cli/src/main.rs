//! Grassroots Mesh Command-Line Interface
//!
//! This CLI provides tools for:
//! - Composing and inspecting raw mesh frames
//! - Simulating flood propagation over line, star and full topologies
//! - Monitoring a captured basestation serial stream
//! - Printing protocol constants

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use grassroots_core::mesh::flood::{Disposition, FloodEngine};
use grassroots_core::mesh::simulation::{MeshSimulator, SimConfig, SimEvent, SimStats, Topology};
use grassroots_core::mesh::{AppMessage, Frame, Header, MessageType, Role, HEADER_LEN, MAX_FRAME};
use grassroots_core::serial::{is_done_marker, SerialCodec};
use grassroots_core::NodeConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio_util::codec::FramedRead;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "grassroots")]
#[command(author, version, about = "LoRa flood mesh protocol tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Node configuration file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the system id
    #[arg(long, global = true)]
    system: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a frame from flags and print it as hex
    Compose {
        /// Originating node
        #[arg(long, default_value = "3")]
        source: u8,

        /// Destination node
        #[arg(long, default_value = "1")]
        dest: u8,

        /// Sequence id
        #[arg(long, default_value = "1")]
        seq: u16,

        /// Message type (pixel, request, response, text, reset, or a number)
        #[arg(short, long, default_value = "text")]
        kind: String,

        /// Type-specific id (camera or apparatus)
        #[arg(long, default_value = "0")]
        type_id: u8,

        /// Hop budget (defaults to the configured initial ttl)
        #[arg(long)]
        ttl: Option<u8>,

        /// Text payload
        #[arg(short, long)]
        text: Option<String>,

        /// Value for request / response messages
        #[arg(long)]
        value: Option<u32>,

        /// Raw payload as hex
        #[arg(long)]
        payload_hex: Option<String>,

        /// Print the serial-link encoding (byte 0 = last index)
        #[arg(long)]
        serial: bool,
    },

    /// Parse a hex frame and show what a node would do with it
    Inspect {
        /// Frame bytes as hex
        hex: String,

        /// Role of the receiving node
        #[arg(long, value_enum, default_value = "relay")]
        role: RoleArg,

        /// Address of the receiving node
        #[arg(long, default_value = "0")]
        node: u8,
    },

    /// Simulate flood propagation
    Simulate {
        /// Topology
        #[arg(long, value_enum, default_value = "line")]
        topology: TopologyArg,

        /// Number of relays
        #[arg(long, default_value = "3")]
        relays: usize,

        /// Number of endpoints (endpoint 1 is the basestation)
        #[arg(long, default_value = "4")]
        endpoints: usize,

        /// Messages to originate
        #[arg(short, long, default_value = "10")]
        messages: usize,

        /// Destination of every message
        #[arg(long, default_value = "1")]
        dest: u8,

        /// Initial ttl (defaults to the configured one)
        #[arg(long)]
        ttl: Option<u8>,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode a captured basestation serial stream
    Monitor {
        /// Captured serial bytes
        #[arg(short, long)]
        input: PathBuf,

        /// Print one JSON object per frame
        #[arg(long)]
        json: bool,
    },

    /// Show protocol constants and the active configuration
    Info,
}

#[derive(Clone, Copy, ValueEnum)]
enum RoleArg {
    Endpoint,
    Relay,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Endpoint => Role::Endpoint,
            RoleArg::Relay => Role::Relay,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TopologyArg {
    Line,
    Star,
    Full,
}

impl From<TopologyArg> for Topology {
    fn from(topology: TopologyArg) -> Self {
        match topology {
            TopologyArg::Line => Topology::Line,
            TopologyArg::Star => Topology::Star,
            TopologyArg::Full => Topology::Full,
        }
    }
}

fn load_config(path: Option<&Path>, system: Option<u8>) -> Result<NodeConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => NodeConfig::default(),
    };
    if let Some(system) = system {
        config = config.with_system_id(system);
    }
    config.protocol.validate().context("Invalid protocol constants")?;
    Ok(config)
}

fn parse_hex(hex: &str) -> Result<Vec<u8>> {
    let hex: String = hex
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if hex.len() % 2 != 0 {
        anyhow::bail!("Odd number of hex digits: {}", hex.len());
    }
    hex.as_bytes()
        .chunks(2)
        .map(|chunk| {
            let s = std::str::from_utf8(chunk).context("Invalid hex character")?;
            u8::from_str_radix(s, 16).with_context(|| format!("Invalid hex value '{}'", s))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_message_type(kind: &str) -> Result<MessageType> {
    Ok(match kind.to_lowercase().as_str() {
        "pixel" | "pixel-segment" => MessageType::PixelSegment,
        "request" => MessageType::Request,
        "response" => MessageType::Response,
        "text" => MessageType::Text,
        "reset" => MessageType::Reset,
        other => MessageType::from(
            other
                .parse::<u8>()
                .with_context(|| format!("Unknown message type '{}'", kind))?,
        ),
    })
}

fn describe(message: &AppMessage) -> String {
    match message {
        AppMessage::PixelSegment { camera, segment } => format!(
            "pixels camera={} row={} col={} count={} depth={}",
            camera,
            segment.row,
            segment.column,
            segment.count(),
            segment.depth
        ),
        AppMessage::Request { apparatus, value } => {
            format!("request apparatus={} value={}", apparatus, value)
        }
        AppMessage::Response { apparatus, value } => {
            format!("response apparatus={} value={}", apparatus, value)
        }
        AppMessage::Text(text) => format!("text \"{}\"", text),
        AppMessage::Reset => "sequence reset".to_string(),
        AppMessage::Opaque { payload, .. } => format!("opaque [{}]", to_hex(payload)),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_compose(
    config: &NodeConfig,
    source: u8,
    dest: u8,
    seq: u16,
    kind: String,
    type_id: u8,
    ttl: Option<u8>,
    text: Option<String>,
    value: Option<u32>,
    payload_hex: Option<String>,
    serial: bool,
) -> Result<()> {
    let message_type = parse_message_type(&kind)?;

    let payload = match (payload_hex, text, value) {
        (Some(hex), _, _) => parse_hex(&hex)?,
        (None, Some(text), _) => text.into_bytes(),
        (None, None, Some(value)) => AppMessage::Request {
            apparatus: type_id,
            value,
        }
        .encode_payload(),
        (None, None, None) => Vec::new(),
    };

    let header = Header {
        length: 0,
        system_id: config.protocol.system_id,
        source,
        destination: dest,
        sequence_id: seq,
        message_type,
        type_id,
        ttl: ttl.unwrap_or(config.protocol.initial_ttl),
    };
    let frame = Frame::new(&header, &payload, config.protocol.max_frame)
        .context("Failed to build frame")?;

    info!(header = %frame.header(), len = frame.len(), "composed frame");

    if serial {
        use bytes::BytesMut;
        use tokio_util::codec::Encoder;

        let mut buf = BytesMut::new();
        SerialCodec::new(config.protocol.max_frame)
            .encode(&frame, &mut buf)
            .context("Failed to encode for serial link")?;
        println!("{}", to_hex(&buf));
    } else {
        println!("{}", to_hex(frame.as_bytes()));
    }

    Ok(())
}

fn cmd_inspect(config: &NodeConfig, hex: String, role: RoleArg, node: u8) -> Result<()> {
    let bytes = parse_hex(&hex)?;

    println!("=== Frame Inspection ===");
    println!();
    println!("Length:      {} bytes", bytes.len());

    match Header::parse(&bytes, MAX_FRAME) {
        Ok(header) => {
            println!("Length byte: {}", header.length);
            println!("System:      {}", header.system_id);
            println!("Source:      {}", header.source);
            println!("Destination: {}", header.destination);
            println!("Sequence:    {}", header.sequence_id);
            println!("Type:        {:?} ({})", header.message_type, u8::from(header.message_type));
            println!("Type id:     {}", header.type_id);
            println!("TTL:         {}", header.ttl);
            println!(
                "Message:     {}",
                describe(&AppMessage::decode(&header, &bytes[HEADER_LEN..]))
            );
        }
        Err(err) => println!("Header:      unreadable ({})", err),
    }
    println!();

    let role = Role::from(role);
    let node_config = NodeConfig {
        node_id: node,
        role,
        ..config.clone()
    };
    let mut engine = FloodEngine::new(&node_config);

    print!("Decision for {:?} {} (system {}): ", role, node, node_config.protocol.system_id);
    match engine.on_receive(bytes) {
        Ok(Disposition::Deliver(_)) => println!("deliver locally"),
        Ok(Disposition::Forward(frame)) => {
            println!("rebroadcast with ttl {}", frame.ttl());
            println!("Forwarded:   {}", to_hex(frame.as_bytes()));
        }
        Err(reason) => println!("drop ({})", reason),
    }

    Ok(())
}

#[derive(Serialize)]
struct SimulationReport<'a> {
    topology: Topology,
    relays: usize,
    endpoints: usize,
    seed: u64,
    failed_sends: usize,
    stats: &'a SimStats,
}

#[allow(clippy::too_many_arguments)]
fn cmd_simulate(
    config: &NodeConfig,
    topology: TopologyArg,
    relays: usize,
    endpoints: usize,
    messages: usize,
    dest: u8,
    ttl: Option<u8>,
    seed: u64,
    json: bool,
    verbose: bool,
) -> Result<()> {
    let mut protocol = config.protocol;
    if let Some(ttl) = ttl {
        protocol.initial_ttl = ttl;
    }

    let sim_config = SimConfig {
        topology: topology.into(),
        relays,
        endpoints,
        protocol,
        channel: config.channel,
    };
    let mut sim = MeshSimulator::new(sim_config).context("Failed to build simulation")?;

    let sources: Vec<usize> = (1..=endpoints as u8)
        .filter(|id| *id != dest)
        .filter_map(|id| sim.endpoint_index(id))
        .collect();
    if sources.is_empty() {
        anyhow::bail!("No endpoint other than the destination can originate traffic");
    }

    if !json {
        println!("=== Flood Mesh Simulation ===");
        println!();
        println!("Topology:  {:?}", Topology::from(topology));
        println!("Relays:    {}", relays);
        println!("Endpoints: {}", endpoints);
        println!("Messages:  {}", messages);
        println!("TTL:       {}", protocol.initial_ttl);
        println!();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut failed_sends = 0;

    for msg_idx in 0..messages {
        let src_idx = sources[rng.gen_range(0..sources.len())];
        let text = format!("Message {}", msg_idx);

        if let Err(err) = sim.send_text(src_idx, dest, &text) {
            warn!(node_idx = src_idx, error = %err, "send failed");
            failed_sends += 1;
            continue;
        }
        sim.run(10_000);
    }

    let stats = sim.stats();

    if json {
        let report = SimulationReport {
            topology: topology.into(),
            relays,
            endpoints,
            seed,
            failed_sends,
            stats: &stats,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if verbose {
        println!("Events:");
        for event in sim.events() {
            match event {
                SimEvent::Sent { node_idx, header } => println!("  [{}] sent      {}", node_idx, header),
                SimEvent::Delivered { node_idx, header } => {
                    println!("  [{}] delivered {}", node_idx, header)
                }
                SimEvent::Forwarded { node_idx, header } => {
                    println!("  [{}] forwarded {}", node_idx, header)
                }
                SimEvent::ForwardAbandoned { node_idx, header } => {
                    println!("  [{}] abandoned {}", node_idx, header)
                }
                SimEvent::Rejected { node_idx, reason } => println!("  [{}] dropped   {}", node_idx, reason),
                SimEvent::SendFailed { node_idx, error } => println!("  [{}] failed    {}", node_idx, error),
            }
        }
        println!();
    }

    println!("=== Simulation Results ===");
    println!();
    println!("Messages sent:      {}", stats.messages_sent);
    println!("Failed sends:       {}", failed_sends);
    println!("Deliveries:         {}", stats.deliveries);
    println!("Forwards:           {}", stats.forwards);
    println!("Transmissions:      {}", stats.transmissions);
    println!("Delivery rate:      {:.1}%", stats.delivery_rate() * 100.0);
    println!();
    println!("Drops:");
    println!("  wrong system:     {}", stats.rejected.wrong_system);
    println!("  not addressed:    {}", stats.rejected.not_addressed_to_me);
    println!("  unknown source:   {}", stats.rejected.unknown_source);
    println!("  no budget:        {}", stats.rejected.no_budget_remaining);
    println!("  stale/duplicate:  {}", stats.rejected.stale_or_duplicate);
    println!();

    println!("Per-Node Statistics:");
    println!(
        "{:<6} {:<10} {:<6} {:<8} {:<8} {:<8} {:<8}",
        "Index", "Role", "Addr", "TX", "RX", "Fwd", "Drops"
    );
    println!("{}", "-".repeat(58));
    for node in &stats.per_node {
        println!(
            "{:<6} {:<10} {:<6} {:<8} {:<8} {:<8} {:<8}",
            node.node_idx,
            format!("{:?}", node.role),
            node.node_id,
            node.stats.packets_tx,
            node.stats.packets_rx,
            node.stats.forwarded,
            node.stats.rejected.total()
        );
    }

    Ok(())
}

#[derive(Serialize)]
struct MonitorRecord {
    header: Header,
    message: AppMessage,
}

fn cmd_monitor(config: &NodeConfig, input: PathBuf, json: bool) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;
    runtime.block_on(monitor_stream(config.protocol.max_frame, input, json))
}

async fn monitor_stream(max_frame: usize, input: PathBuf, json: bool) -> Result<()> {
    let file = tokio::fs::File::open(&input)
        .await
        .with_context(|| format!("Failed to open {}", input.display()))?;
    // Line noise is skipped by the codec; only I/O failures end the capture
    let mut frames = FramedRead::new(file, SerialCodec::new(max_frame).with_resync(true));

    let mut count = 0usize;
    while let Some(frame) = frames.next().await {
        let frame = frame.context("Failed to read serial stream")?;
        if is_done_marker(&frame) {
            info!(frames = count, "capture complete");
            break;
        }
        count += 1;

        let header = frame.header();
        let message = AppMessage::decode(&header, frame.payload());
        if json {
            println!("{}", serde_json::to_string(&MonitorRecord { header, message })?);
        } else {
            println!("{}  {}", header, describe(&message));
        }
    }

    let skipped = frames.decoder().skipped();
    if skipped > 0 {
        warn!(skipped, "dropped malformed bytes on serial stream");
    }
    if !json {
        println!();
        println!("{} frames", count);
        if skipped > 0 {
            println!("{} bytes skipped", skipped);
        }
    }
    Ok(())
}

fn cmd_info(config: &NodeConfig) -> Result<()> {
    println!("=== Grassroots Mesh Protocol ===");
    println!();
    println!("Header:        {} bytes", HEADER_LEN);
    println!("Frame ceiling: {} bytes", MAX_FRAME);
    println!();
    println!("Header layout:");
    println!("  0    length");
    println!("  1    system id");
    println!("  2    source");
    println!("  3    destination");
    println!("  4-5  sequence id (big-endian)");
    println!("  6    message type");
    println!("  7    type id");
    println!("  8    ttl");
    println!();
    println!("Message types:");
    println!("  0  pixel segment   (type id = camera)");
    println!("  1  request         (type id = apparatus)");
    println!("  2  response        (type id = apparatus)");
    println!("  3  text");
    println!("  9  sequence reset");
    println!();
    println!("Active configuration:");
    println!("{}", serde_json::to_string_pretty(config)?);
    println!();
    println!("Examples:");
    println!("  grassroots compose --source 3 --dest 1 --text \"level=42\"");
    println!("  grassroots inspect \"0e 6f 03 01 00 01 03 00 05 68 65 6c 6c 6f\"");
    println!("  grassroots simulate --topology line --relays 6 --ttl 5");
    println!("  grassroots monitor --input capture.bin");

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref(), cli.system)?;

    match cli.command {
        Commands::Compose {
            source,
            dest,
            seq,
            kind,
            type_id,
            ttl,
            text,
            value,
            payload_hex,
            serial,
        } => cmd_compose(
            &config,
            source,
            dest,
            seq,
            kind,
            type_id,
            ttl,
            text,
            value,
            payload_hex,
            serial,
        ),
        Commands::Inspect { hex, role, node } => cmd_inspect(&config, hex, role, node),
        Commands::Simulate {
            topology,
            relays,
            endpoints,
            messages,
            dest,
            ttl,
            seed,
            json,
        } => cmd_simulate(
            &config,
            topology,
            relays,
            endpoints,
            messages,
            dest,
            ttl,
            seed,
            json,
            cli.verbose > 0,
        ),
        Commands::Monitor { input, json } => cmd_monitor(&config, input, json),
        Commands::Info => cmd_info(&config),
    }
}
