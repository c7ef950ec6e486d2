#![no_std]
#![no_main]

use core::pin::pin;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_executor::{InterruptExecutor, Spawner};
use embassy_futures::poll_once;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_time::{Duration, Timer, with_timeout};
use ergot::{
    Address,
    exports::bbq2::traits::coordination::cas::AtomicCoord,
    toolkits::embedded_io_async_v0_6::{self as kit, tx_worker},
};
use mutex::raw_impls::cs::CriticalSectionRawMutex;
use oxihall_commutation::{PositionIndex, Transition};
use oxihall_protocol::{CommutationEndpoint, DeviceInfo, InfoEndpoint, StatusEndpoint};
use rtt_target::{ChannelMode::*, rtt_init};
use static_cell::StaticCell;

mod rtt_io;
use rtt_io::RttUplink;

mod motor;
use motor::BoardCommutator;
use motor::hall::HallEdges;

// Use panic-probe for panics
use panic_probe as _;

const OUT_QUEUE_SIZE: usize = 2048;
const MAX_PACKET_SIZE: usize = 512;

// Type aliases for our application
type Queue = kit::Queue<OUT_QUEUE_SIZE, AtomicCoord>;
type Stack = kit::Stack<&'static Queue, CriticalSectionRawMutex>;
type RxWorker = kit::RxWorker<&'static Queue, CriticalSectionRawMutex, rtt_io::RttDownlink>;

/// Statically store our outgoing packet buffer
static OUTQ: Queue = kit::Queue::new();

/// Statically store our netstack
static STACK: Stack = kit::new_target_stack(OUTQ.stream_producer(), MAX_PACKET_SIZE as u16);

/// Buffers for RX worker
static RECV_BUF: StaticCell<[u8; MAX_PACKET_SIZE]> = StaticCell::new();
static SCRATCH_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// Link status: set true after we observe an inbound host request
static LINK_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Runs the Hall edge handler above everything on the thread executor
static EXECUTOR_HIGH: InterruptExecutor = InterruptExecutor::new();

#[interrupt]
unsafe fn UART4() {
    unsafe { EXECUTOR_HIGH.on_interrupt() }
}

#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum DeviceState {
    Boot = 0,
    WaitingLink = 1,
    Linked = 2,
    SensorFault = 3,
}

static DEVICE_STATE: AtomicU8 = AtomicU8::new(DeviceState::Boot as u8);

fn set_device_state(s: DeviceState) {
    DEVICE_STATE.store(s as u8, Ordering::Relaxed);
}

fn get_device_state() -> DeviceState {
    match DEVICE_STATE.load(Ordering::Relaxed) {
        0 => DeviceState::Boot,
        1 => DeviceState::WaitingLink,
        2 => DeviceState::Linked,
        _ => DeviceState::SensorFault,
    }
}

/// Link state, overridden while the last Hall reading is 0 or 7
fn indicated_state() -> DeviceState {
    let faulted = motor::SNAPSHOT
        .read()
        .last
        .is_some_and(|c| !c.index.is_valid());
    if faulted { DeviceState::SensorFault } else { get_device_state() }
}

/// RTT channel storage
static RTT_UP_CHANNEL: StaticCell<rtt_target::UpChannel> = StaticCell::new();
static RTT_DOWN_CHANNEL: StaticCell<rtt_target::DownChannel> = StaticCell::new();

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // Initialize RTT with defmt on channel 0 and ergot on channel 1
    let channels = rtt_init! {
        up: {
            0: { size: 1024, mode: NoBlockSkip, name: "defmt" } // defmt logs
            1: { size: 2048, mode: NoBlockSkip, name: "ergot" } // Ergot data channel
        }
        down: {
            0: { size: 1024, name: "ergot-down" } // host->device
        }
    };

    // Configure rtt-target as the defmt global logger on up channel 0
    rtt_target::set_defmt_channel(channels.up.0);

    // Get RTT channels for ergot (up: device->host, down: host->device)
    let rtt_up = RTT_UP_CHANNEL.init_with(|| channels.up.1);
    let rtt_down = RTT_DOWN_CHANNEL.init_with(|| channels.down.0);
    let (rtt_rx, rtt_tx) = rtt_io::split(rtt_up, rtt_down);

    // Initialize STM32 with HSE=8MHz feeding PLL to 170MHz SYSCLK
    let p = {
        let mut config = embassy_stm32::Config::default();
        {
            use embassy_stm32::rcc::*;
            use embassy_stm32::time::Hertz;
            config.rcc.hse = Some(Hse {
                freq: Hertz(8_000_000),
                mode: HseMode::Oscillator,
            });
            // VCO in: 8MHz / 2 = 4MHz; VCO: 4MHz * 85 = 340MHz; SYSCLK: 340MHz / 2 = 170MHz
            config.rcc.pll = Some(Pll {
                source: PllSource::HSE,
                prediv: PllPreDiv::DIV2,
                mul: PllMul::MUL85,
                divp: None,
                divq: None,
                divr: Some(PllRDiv::DIV2),
            });
            config.rcc.sys = Sysclk::PLL1_R;
            // Above 150MHz, enable Range1 boost mode per RM0440 guidance
            config.rcc.boost = true;
        }
        embassy_stm32::init(config)
    };

    defmt::info!("Oxihall starting - ergot over RTT");

    // Gate outputs come up in the all-off state before the Hall inputs are touched
    let (edges, commutator) = motor::init(
        p.PB0, p.PB1, p.PB2, p.PB3, p.PB4, p.PB5, // AH AL BH BL CH CL
        p.PB6, p.PB7, p.PB8, // Hall A B C
        p.EXTI6, p.EXTI7, p.EXTI8,
    );

    // Edge handler on a high-priority interrupt executor
    interrupt::UART4.set_priority(Priority::P1);
    let high_spawner = EXECUTOR_HIGH.start(interrupt::UART4);
    high_spawner.spawn(commutation_task(edges, commutator)).unwrap();

    // Create RX worker for incoming ergot messages
    let rx_worker = RxWorker::new_target(&STACK, rtt_rx, ());

    // LED on PC6
    let mut led = Output::new(p.PC6, Level::Low, Speed::Low);

    // Spawn I/O workers
    spawner
        .spawn(run_rx(
            rx_worker,
            RECV_BUF.init_with(|| [0u8; MAX_PACKET_SIZE]),
            SCRATCH_BUF.init_with(|| [0u8; 64]),
        ))
        .unwrap();
    spawner.spawn(run_tx(rtt_tx)).unwrap();

    spawner.spawn(telemetry_forwarder()).unwrap();
    spawner.spawn(info_server()).unwrap();
    spawner.spawn(status_server()).unwrap();

    // Transition to "waiting for link" once tasks are up
    set_device_state(DeviceState::WaitingLink);

    defmt::info!("All tasks spawned, entering LED status loop");

    // LED status loop - shows device state via blink patterns
    loop {
        match indicated_state() {
            DeviceState::Boot => {
                // Quick double blink
                for _ in 0..2 {
                    led.set_high();
                    Timer::after(Duration::from_millis(100)).await;
                    led.set_low();
                    Timer::after(Duration::from_millis(100)).await;
                }
                Timer::after(Duration::from_millis(600)).await;
            }
            DeviceState::WaitingLink => {
                // Slow blink (1 Hz, 10% duty)
                led.set_high();
                Timer::after(Duration::from_millis(100)).await;
                led.set_low();
                Timer::after(Duration::from_millis(900)).await;
            }
            DeviceState::Linked => {
                // Solid ON with periodic short delay to allow state changes
                led.set_high();
                Timer::after(Duration::from_millis(500)).await;
            }
            DeviceState::SensorFault => {
                // Triple blink pattern
                for _ in 0..3 {
                    led.set_high();
                    Timer::after(Duration::from_millis(120)).await;
                    led.set_low();
                    Timer::after(Duration::from_millis(120)).await;
                }
                Timer::after(Duration::from_millis(800)).await;
            }
        }
    }
}

/// Hall edge handler: sample → lookup → commit on every sensor edge
#[embassy_executor::task]
async fn commutation_task(mut edges: HallEdges<'static>, mut commutator: BoardCommutator) {
    loop {
        let mut edge = pin!(edges.any_edge());
        // Arm the EXTI lines before sampling, so an edge during the commit still
        // wakes the next wait instead of being lost
        let armed = poll_once(edge.as_mut());
        commutator.dispatch();
        if armed.is_pending() {
            edge.await;
        }
    }
}

/// Worker task for incoming ergot data via RTT
#[embassy_executor::task]
async fn run_rx(mut rcvr: RxWorker, recv_buf: &'static mut [u8], scratch_buf: &'static mut [u8]) {
    loop {
        let _ = rcvr.run(recv_buf, scratch_buf).await;
    }
}

/// Worker task for outgoing ergot data via RTT
#[embassy_executor::task]
async fn run_tx(mut tx: RttUplink) {
    loop {
        let _ = tx_worker(&mut tx, OUTQ.stream_consumer()).await;
    }
}

/// Drain the commutation queue: log anomalies and forward events to the host
#[embassy_executor::task]
async fn telemetry_forwarder() {
    defmt::info!("Telemetry forwarder started");

    // Host router at network 1, node 1
    let host_addr = Address {
        network_id: 1,
        node_id: 1,
        port_id: 0,
    };
    let client = STACK
        .endpoints()
        .client::<CommutationEndpoint>(host_addr, Some("commutation"));

    let mut last: Option<PositionIndex> = None;
    loop {
        let event = motor::EVENTS.receive().await;
        let index = event.index();

        match (last, index) {
            (Some(prev), Some(next)) => match Transition::between(prev, next) {
                Transition::Fault => {
                    defmt::warn!("Hall fault: index {} (seq {})", next.get(), event.seq);
                }
                Transition::Recover => {
                    defmt::info!("Hall recovered: index {} (seq {})", next.get(), event.seq);
                }
                Transition::Skip => {
                    defmt::warn!("Hall skip: {} -> {} (seq {})", prev.get(), next.get(), event.seq);
                }
                t => defmt::trace!("Hall {} -> {}: {}", prev.get(), next.get(), t),
            },
            (None, Some(first)) => defmt::info!("First Hall reading: index {}", first.get()),
            _ => {}
        }
        last = index;

        if LINK_ACTIVE.load(Ordering::Relaxed) {
            let _ = with_timeout(Duration::from_millis(50), client.request(&event)).await;
        }
    }
}

/// Respond to info requests from host
#[embassy_executor::task]
async fn info_server() {
    let server = STACK
        .endpoints()
        .bounded_server::<InfoEndpoint, 2>(Some("device_info"));
    let server = pin!(server);
    let mut h = server.attach();
    loop {
        let _ = h
            .serve(|_req: &()| async move {
                // Mark link as active on first inbound request
                LINK_ACTIVE.store(true, Ordering::Relaxed);
                set_device_state(DeviceState::Linked);
                let mut hw: heapless::String<32> = heapless::String::new();
                let mut sw: heapless::String<32> = heapless::String::new();
                let _ = hw.push_str("STM32G431 + HIP4086");
                let _ = sw.push_str("oxihall-0.1.0");
                DeviceInfo { hw, sw }
            })
            .await;
    }
}

/// Respond to commutation status requests from host
#[embassy_executor::task]
async fn status_server() {
    defmt::info!("Status server started");

    let server = STACK
        .endpoints()
        .bounded_server::<StatusEndpoint, 2>(Some("commutation_status"));
    let server = pin!(server);
    let mut h = server.attach();
    loop {
        let _ = h.serve(|_req: &()| async move { motor::get_commutation_status() }).await;
    }
}
