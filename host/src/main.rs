use anyhow::{Context, Result};
use tracing::{info, warn, error};
use probe_rs::probe::list::Lister;
use probe_rs::Permissions;
use probe_rs::rtt::{Rtt, ScanRegion};
use std::sync::{Arc, Mutex};
use std::time::Duration;
// ergot stack and helpers
use defmt_decoder::{Table, DecodeError, StreamDecoder};
use std::fs;
use ergot::Address;
use ergot::interface_manager::utils::std::new_std_queue;
use ergot::interface_manager::profiles::direct_edge::process_frame as ergot_edge_process_frame;
use ergot::interface_manager::utils::cobs_stream::Sink as ErgotSink;
use ergot::interface_manager::utils::std::StdQueue as ErgotStdQueue;
use ergot::net_stack::ArcNetStack;
use mutex::raw_impls::cs::CriticalSectionRawMutex;
use ergot::interface_manager::{InterfaceState, Interface};
use oxihall_commutation::Transition;
use oxihall_protocol::{CommutationEndpoint, CommutationEvent, InfoEndpoint, StatusEndpoint};
use core::pin::pin;

mod config;
use config::HostConfig;

mod frames;
use frames::FrameSplitter;

mod monitor;
use monitor::{Observation, SequenceMonitor};

// Device sits at network 1, node 2 behind the DirectEdge controller
const DEVICE_ADDR: Address = Address { network_id: 1, node_id: 2, port_id: 0 };

fn init_tracing() {
    // Default INFO; allow override via RUST_LOG
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .compact()
        .try_init();
}

fn log_observation(event: &CommutationEvent, observation: Observation) {
    match observation {
        Observation::First => info!("Hall index {} (seq {})", event.index, event.seq),
        Observation::Step(Transition::Forward | Transition::Reverse | Transition::Hold) => {
            tracing::debug!("Hall index {} pattern {:#08b} (seq {})", event.index, event.pattern, event.seq)
        }
        Observation::Step(Transition::Skip) => warn!("Hall skip to {} (seq {})", event.index, event.seq),
        Observation::Step(Transition::Fault) => warn!("Hall fault at index {} (seq {})", event.index, event.seq),
        Observation::Step(Transition::Recover) => info!("Hall recovered at index {} (seq {})", event.index, event.seq),
        Observation::Corrupt => error!("Corrupt commutation event: {:?}", event),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Load config file
    let cfg = HostConfig::load_default().unwrap_or_default();
    let probe_sel = cfg.probe.clone();
    let chip = cfg.chip.clone();
    let elf_from_cfg = cfg.elf.clone();

    info!("Oxihall Host - RTT (chip={:?}, probe={:?})", chip, probe_sel);

    // Get list of available probes
    let lister = Lister::new();
    let probes = lister.list_all();

    if probes.is_empty() {
        error!("No debug probes found! Make sure the probe is connected.");
        return Err(anyhow::anyhow!("No probes found"));
    }

    info!("Found {} probe(s)", probes.len());

    // Open specific probe if configured, otherwise first
    let probe = if let Some(sel) = probe_sel {
        let mut parts = sel.split(':');
        let vid = parts.next();
        let pid = parts.next();
        let serial = parts.next();
        let chosen = probes.iter().find(|p| {
            let ok_vid = vid.and_then(|v| u16::from_str_radix(v, 16).ok())
                .map(|v| p.vendor_id == v).unwrap_or(true);
            let ok_pid = pid.and_then(|v| u16::from_str_radix(v, 16).ok())
                .map(|v| p.product_id == v).unwrap_or(true);
            let ok_ser = serial.map(|s| p.serial_number.as_deref() == Some(s)).unwrap_or(true);
            ok_vid && ok_pid && ok_ser
        }).ok_or_else(|| anyhow::anyhow!("Configured probe not found: {}", sel))?;
        chosen.open().context("Failed to open selected probe")?
    } else {
        probes[0].open().context("Failed to open probe")?
    };

    // Attach to the target (auto-detect by default, or explicit chip)
    let ts = match chip {
        Some(name) => probe_rs::config::TargetSelector::from(name),
        None => probe_rs::config::TargetSelector::Auto,
    };
    let mut session = probe
        .attach(ts, Permissions::default())
        .context("Failed to attach to target")?;

    info!("Attached to target");

    let mut core = session.core(0)?;

    // Set up RTT - scan entire RAM
    let mut rtt = Rtt::attach_region(&mut core, &ScanRegion::Ram)
        .context("Failed to attach RTT")?;

    info!("RTT attached");
    for (idx, channel) in rtt.up_channels().iter().enumerate() {
        info!("  up{}: {}", idx, channel.name().unwrap_or("unnamed"));
    }
    for (idx, channel) in rtt.down_channels().iter().enumerate() {
        info!("  down{}: {}", idx, channel.name().unwrap_or("unnamed"));
    }

    // Find well-known channels by name
    let find_up = |rtt: &mut Rtt, name: &str| -> Option<usize> {
        rtt.up_channels()
            .iter()
            .position(|ch| ch.name().map(|n| n == name).unwrap_or(false))
    };
    let ergot_up_idx = if cfg.stream_ergot() { find_up(&mut rtt, "ergot").or(Some(1)) } else { None };
    let defmt_up_idx = if cfg.stream_defmt() { find_up(&mut rtt, "defmt").or(Some(0)) } else { None };
    let down_idx = rtt
        .down_channels()
        .iter()
        .position(|ch| ch.name().map(|n| n == "ergot-down").unwrap_or(false))
        .or(Some(0));
    info!("Using channels: ergot={:?}, defmt={:?}, down={:?}", ergot_up_idx, defmt_up_idx, down_idx);

    // ergot DirectEdge stack in controller mode (directly connected to one device)
    use ergot::interface_manager::profiles::direct_edge::DirectEdge;
    struct RttInterface;
    impl Interface for RttInterface { type Sink = ErgotSink<ErgotStdQueue>; }
    type EdgeProfile = DirectEdge<RttInterface>;
    type EdgeStack = ArcNetStack<CriticalSectionRawMutex, EdgeProfile>;
    const ERGOT_MTU: u16 = 1024;
    let queue = new_std_queue(4096);

    // Controller is network 1, node 1
    let stack: EdgeStack = ArcNetStack::new_with_profile(
        DirectEdge::new_controller(
            ErgotSink::new_from_handle(queue.clone(), ERGOT_MTU),
            InterfaceState::Active { net_id: 1, node_id: 1 }
        )
    );

    let monitor = Arc::new(Mutex::new(SequenceMonitor::new()));

    // Commutation events pushed by the device
    tokio::spawn({
        let stack = stack.clone();
        let monitor = monitor.clone();
        async move {
            let server = stack.endpoints().bounded_server::<CommutationEndpoint, 32>(Some("commutation"));
            let server = pin!(server);
            let mut h = server.attach();
            loop {
                let _ = h.serve(|event: &CommutationEvent| {
                    let event = *event;
                    let observation = match monitor.lock() {
                        Ok(mut m) => m.observe(&event),
                        Err(poisoned) => poisoned.into_inner().observe(&event),
                    };
                    async move { log_observation(&event, observation) }
                }).await;
            }
        }
    });

    // Handshake task: retry querying device info until it succeeds
    tokio::spawn({
        let stack = stack.clone();
        async move {
            let mut backoff = Duration::from_millis(100);
            for attempt in 1..=10u32 {
                let fut = stack
                    .endpoints()
                    .request::<InfoEndpoint>(DEVICE_ADDR, &(), Some("device_info"));
                match tokio::time::timeout(Duration::from_millis(800), fut).await {
                    Ok(Ok(info)) => {
                        info!("Device connected: hw='{}' sw='{}'", info.hw.as_str(), info.sw.as_str());
                        return;
                    }
                    Ok(Err(e)) => warn!("DeviceInfo attempt {} failed: {:?}", attempt, e),
                    Err(_) => warn!("DeviceInfo attempt {} timed out", attempt),
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(2));
            }
            warn!("Device info not received after retries; continuing without it");
        }
    });

    // Periodic status poll, compared against what the stream delivered
    if let Some(interval) = cfg.status_interval() {
        tokio::spawn({
            let stack = stack.clone();
            let monitor = monitor.clone();
            async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    let fut = stack
                        .endpoints()
                        .request::<StatusEndpoint>(DEVICE_ADDR, &(), Some("commutation_status"));
                    match tokio::time::timeout(Duration::from_millis(800), fut).await {
                        Ok(Ok(status)) => {
                            let stats = match monitor.lock() {
                                Ok(m) => (m.stats(), m.direction()),
                                Err(poisoned) => {
                                    let m = poisoned.into_inner();
                                    (m.stats(), m.direction())
                                }
                            };
                            info!(
                                "Status: index={:?} dispatches={} invalid={} dropped={} | seen={} missed={} skips={} faults={} recoveries={} direction={:?}",
                                status.index,
                                status.dispatches,
                                status.invalid_readings,
                                status.dropped_events,
                                stats.0.events,
                                stats.0.missed,
                                stats.0.skips,
                                stats.0.faults,
                                stats.0.recoveries,
                                stats.1,
                            );
                        }
                        Ok(Err(e)) => warn!("Status request failed: {:?}", e),
                        Err(_) => tracing::debug!("Status request timed out"),
                    }
                }
            }
        });
    }

    // Prepare defmt decoder (ELF path)
    let default_elf = {
        let p = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../device/target/thumbv7em-none-eabihf/release/oxihall");
        p.to_string_lossy().into_owned()
    };
    let defmt_table: Option<Table> = if defmt_up_idx.is_some() {
        let elf_path = elf_from_cfg.unwrap_or(default_elf);
        let elf_bytes = fs::read(&elf_path)
            .with_context(|| format!("Failed to read ELF at {}", elf_path))?;
        Some(
            Table::parse(&elf_bytes)
                .context("Parsing defmt table from ELF failed")?
                .ok_or_else(|| anyhow::anyhow!("No .defmt section in ELF; build device with defmt"))?,
        )
    } else { None };
    let mut defmt_stream: Option<Box<dyn StreamDecoder + '_>> = defmt_table
        .as_ref()
        .map(|t| t.new_stream_decoder());

    // Main loop - read from channels (drives RTT <-> ergot)
    let mut buf = vec![0u8; 4096];
    let mut defbuf = vec![0u8; 2048];
    // Accumulator for COBS-framed ergot data across RTT reads
    let mut splitter = FrameSplitter::new(1024 * 4);
    // Controller always has net_id=1
    let mut net_id = Some(1u16);
    let tx_consumer = queue.stream_consumer();
    loop {
        // Read ERGOT channel (COBS-framed)
        if let Some(up_idx) = ergot_up_idx
            && let Some(channel) = rtt.up_channels().get_mut(up_idx)
        {
            let count = channel.read(&mut core, &mut buf)?;
            if count > 0 {
                // Process each frame using DirectEdge (controller mode)
                let errors = splitter.feed(&mut buf[..count], |frame| {
                    ergot_edge_process_frame(&mut net_id, frame, &stack, ());
                });
                if errors > 0 {
                    warn!("ergot link: {} overflowed or malformed frame(s)", errors);
                }
            }
        }
        // Read DEFMT channel and decode
        if let (Some(up_idx), Some(stream)) = (defmt_up_idx, defmt_stream.as_mut())
            && let Some(channel) = rtt.up_channels().get_mut(up_idx)
        {
            let count = channel.read(&mut core, &mut defbuf)?;
            if count > 0 {
                stream.received(&defbuf[..count]);
                loop {
                    match stream.decode() {
                        Ok(frame) => println!("{}", frame.display(true)),
                        Err(DecodeError::UnexpectedEof) => break,
                        Err(DecodeError::Malformed) => { error!("Malformed defmt frame"); break; }
                    }
                }
            }
        }
        // Flush pending outbound ergot frames from queue to RTT down channel
        if let Some(di) = down_idx
            && let Some(channel) = rtt.down_channels().get_mut(di)
        {
            for _ in 0..8 {
                match tokio::time::timeout(Duration::from_millis(1), tx_consumer.wait_read()).await {
                    Ok(frame) => {
                        let len = frame.len();
                        if len == 0 { break; }
                        let _ = channel.write(&mut core, &frame[..len]);
                        frame.release(len);
                    }
                    Err(_) => break,
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
