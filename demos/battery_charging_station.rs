//! Battery charging station walkthrough.
//!
//! A predefined-event adder seeds a car arrival every 2 steps; a station
//! with 2 bays charges each car for 5 steps and queues the overflow.
//! Run with `RUST_LOG=lockstep=debug` to watch the engine's queue and
//! dispatch logs.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lockstep::{
    Engine, Event, EventPayload, NotificationResponse, PredefinedEventAdder, Process,
    ProcessContext, Step,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum StationEvent {
    CarArrives { t: Step, car_id: u32 },
    CarStartsCharging { t: Step, car_id: u32 },
    CarLeaves { t: Step, car_id: u32 },
}

impl EventPayload for StationEvent {
    fn t(&self) -> Step {
        match self {
            StationEvent::CarArrives { t, .. }
            | StationEvent::CarStartsCharging { t, .. }
            | StationEvent::CarLeaves { t, .. } => *t,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            StationEvent::CarArrives { .. } => "CarArrives",
            StationEvent::CarStartsCharging { .. } => "CarStartsCharging",
            StationEvent::CarLeaves { .. } => "CarLeaves",
        }
    }
}

#[derive(Default)]
struct Bays {
    charging: HashSet<u32>,
    waiting: VecDeque<u32>,
}

struct BatteryChargingStation {
    capacity: usize,
    charging_duration: Step,
    bays: Mutex<Bays>,
}

impl BatteryChargingStation {
    fn new(capacity: usize, charging_duration: Step) -> Self {
        Self {
            capacity,
            charging_duration,
            bays: Mutex::new(Bays::default()),
        }
    }
}

#[async_trait]
impl Process<StationEvent> for BatteryChargingStation {
    fn process_name(&self) -> &'static str {
        "BatteryChargingStation"
    }

    async fn notify(
        &self,
        event: &Event<StationEvent>,
        ctx: &ProcessContext<StationEvent>,
    ) -> anyhow::Result<NotificationResponse> {
        match event {
            Event::Domain(StationEvent::CarArrives { t, car_id }) => {
                println!("Car {car_id} arriving at {t}");
                let mut bays = self.bays.lock().unwrap();
                if bays.charging.len() < self.capacity {
                    bays.charging.insert(*car_id);
                    ctx.emit(StationEvent::CarStartsCharging {
                        t: *t,
                        car_id: *car_id,
                    })?;
                } else {
                    bays.waiting.push_back(*car_id);
                }
                Ok(NotificationResponse::Ack)
            }
            Event::Domain(StationEvent::CarStartsCharging { t, car_id }) => {
                println!("Car {car_id} starting to charge at {t}");
                ctx.emit(StationEvent::CarLeaves {
                    t: t + self.charging_duration,
                    car_id: *car_id,
                })?;
                Ok(NotificationResponse::Ack)
            }
            Event::Domain(StationEvent::CarLeaves { t, car_id }) => {
                println!("Car {car_id} leaving the station at {t}");
                let mut bays = self.bays.lock().unwrap();
                bays.charging.remove(car_id);
                if let Some(next_car) = bays.waiting.pop_front() {
                    bays.charging.insert(next_car);
                    ctx.emit(StationEvent::CarStartsCharging {
                        t: *t,
                        car_id: next_car,
                    })?;
                }
                Ok(NotificationResponse::Ack)
            }
            _ => Ok(NotificationResponse::NoAck),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut engine = Engine::default();
    let station: Arc<dyn Process<StationEvent>> =
        Arc::new(BatteryChargingStation::new(2, 5));
    engine.register_process(station)?;

    let arrivals = (0..4).map(|car_id| StationEvent::CarArrives {
        t: 2 * car_id as Step,
        car_id,
    });
    let adder: Arc<dyn Process<StationEvent>> =
        Arc::new(PredefinedEventAdder::new(arrivals, "car arrivals"));
    engine.register_process(adder)?;

    engine.run(None).await?;
    Ok(())
}
