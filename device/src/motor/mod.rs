//! Hall-commutated six-step drive for a BLDC motor on a HIP4086 gate driver
//!
//! Pin table (all on GPIOB):
//!
//! | Pin | Signal  | Direction | Polarity                         |
//! |-----|---------|-----------|----------------------------------|
//! | PB0 | AH      | out       | active-low (HIP4086 inverting)   |
//! | PB1 | AL      | out       | active-high                      |
//! | PB2 | BH      | out       | active-low                       |
//! | PB3 | BL      | out       | active-high                      |
//! | PB4 | CH      | out       | active-low                       |
//! | PB5 | CL      | out       | active-high                      |
//! | PB6 | Hall A  | in, pull-up | index bit 0                    |
//! | PB7 | Hall B  | in, pull-up | index bit 1                    |
//! | PB8 | Hall C  | in, pull-up | index bit 2                    |
//!
//! All-off on PB0..=PB5 is `0b01_0101`.

pub mod gate;
pub mod hall;

use core::sync::atomic::{AtomicU32, Ordering};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use oxihall_commutation::{
    Commutation, CommutationObserver, Commutator, GateDriver, PortLayout, PortSampler,
    SensorLayout, SharedSnapshot,
};
use oxihall_protocol::{CommutationEvent, CommutationStatus};

use self::gate::GatePort;
use self::hall::{HallEdges, HallPort};

/// Gate-driver header wiring
pub const GATE_LAYOUT: PortLayout = PortLayout::HIP4086;

/// Hall sensor wiring
pub const SENSOR_LAYOUT: SensorLayout = SensorLayout::PB6_PB8;

/// Depth of the edge handler → telemetry queue
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// Last commutation, written by the edge handler only
pub static SNAPSHOT: SharedSnapshot = SharedSnapshot::new();

/// Commutation events waiting to be forwarded to the host
pub static EVENTS: Channel<CriticalSectionRawMutex, CommutationEvent, EVENT_QUEUE_DEPTH> =
    Channel::new();

static DROPPED_EVENTS: AtomicU32 = AtomicU32::new(0);

/// Queues each commutation for the telemetry task without waiting
pub struct EventForwarder {
    seq: u32,
}

impl CommutationObserver for EventForwarder {
    #[inline]
    fn observe(&mut self, commutation: Commutation) {
        self.seq = self.seq.wrapping_add(1);
        if EVENTS
            .try_send(CommutationEvent::new(self.seq, commutation))
            .is_err()
        {
            DROPPED_EVENTS.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// The edge handler as wired on this board
pub type BoardCommutator = Commutator<
    PortSampler<HallPort>,
    GatePort<'static>,
    (&'static SharedSnapshot, EventForwarder),
>;

/// Get the events lost to a full queue
pub fn dropped_events() -> u32 {
    DROPPED_EVENTS.load(Ordering::Relaxed)
}

/// Get current commutation status
pub fn get_commutation_status() -> CommutationStatus {
    CommutationStatus::new(&SNAPSHOT.read(), dropped_events())
}

/// Configure the gate port (safe state first), then the Hall inputs
pub fn init(
    pb0: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::PB0>>,
    pb1: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::PB1>>,
    pb2: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::PB2>>,
    pb3: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::PB3>>,
    pb4: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::PB4>>,
    pb5: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::PB5>>,
    pb6: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::PB6>>,
    pb7: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::PB7>>,
    pb8: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::PB8>>,
    exti6: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::EXTI6>>,
    exti7: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::EXTI7>>,
    exti8: impl Into<embassy_stm32::Peri<'static, embassy_stm32::peripherals::EXTI8>>,
) -> (HallEdges<'static>, BoardCommutator) {
    let port = GatePort::new(pb0, pb1, pb2, pb3, pb4, pb5, &GATE_LAYOUT);
    let driver = GateDriver::new(port, GATE_LAYOUT);

    let (edges, hall_port) = HallEdges::new(pb6, pb7, pb8, exti6, exti7, exti8);
    let sampler = PortSampler::new(hall_port, SENSOR_LAYOUT);

    let commutator = Commutator::new(sampler, driver)
        .with_observer((&SNAPSHOT, EventForwarder { seq: 0 }));

    defmt::info!("Commutator ready, gate outputs in safe state");
    (edges, commutator)
}
