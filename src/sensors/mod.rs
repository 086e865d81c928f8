//! Sensor aggregation
//!
//! [`SensorSuite`] samples every configured source exactly once per call and
//! assembles a fresh [`SensorSnapshot`]. Sources are independent: a failed
//! (or panicking) read is logged and leaves its fields at
//! [`SENSOR_UNSET`](crate::core::types::SENSOR_UNSET) while the other
//! sources are still sampled.

use crate::config::SamplingMode;
use crate::core::types::{INFRARED_COUNT, InertialSample, SensorSnapshot};
use crate::drivers::{
    CoreUtilization, Inertial6Dof, InfraredPosition, InfraredProximity, MagneticBearing,
    UltrasonicPosition, UltrasonicRange,
};
use crate::error::Error;
use std::thread::{self, ScopedJoinHandle};

/// Result of one aggregation pass
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    pub snapshot: SensorSnapshot,
    /// Sources whose read failed this cycle
    pub failed: Vec<&'static str>,
}

/// Raw per-source results before they are folded into a snapshot
#[derive(Debug, Default)]
struct Readings {
    ultrasonic: [Option<f32>; 2],
    infrared: [Option<f32>; INFRARED_COUNT],
    bearing: Option<f32>,
    inertial: Option<InertialSample>,
    cores: Option<Vec<f32>>,
    failed: Vec<&'static str>,
}

impl Readings {
    fn into_report(self) -> SampleReport {
        let mut snapshot = SensorSnapshot::unset();

        if let Some(front) = self.ultrasonic[0] {
            snapshot.ultrasonic_front = front;
        }
        if let Some(rear) = self.ultrasonic[1] {
            snapshot.ultrasonic_rear = rear;
        }
        for (slot, value) in snapshot.infrared.iter_mut().zip(self.infrared) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        if let Some(bearing) = self.bearing {
            snapshot.bearing = bearing;
        }
        if let Some(sample) = &self.inertial {
            snapshot.set_inertial(sample);
        }
        if let Some(cores) = &self.cores {
            snapshot.set_cores(cores);
        }

        SampleReport {
            snapshot,
            failed: self.failed,
        }
    }
}

fn report_failure(source: &'static str, err: &Error, failed: &mut Vec<&'static str>) {
    log::warn!("Sensor read failed ({}): {}", source, err);
    failed.push(source);
}

fn read_ultrasonic(dev: &mut dyn UltrasonicRange) -> ([Option<f32>; 2], Vec<&'static str>) {
    let mut values = [None; 2];
    let mut failed = Vec::new();
    for (slot, position) in values.iter_mut().zip(UltrasonicPosition::ALL) {
        match dev.read_range(position) {
            Ok(v) => *slot = Some(v),
            Err(e) => report_failure(position.name(), &e, &mut failed),
        }
    }
    (values, failed)
}

fn read_infrared(
    dev: &mut dyn InfraredProximity,
) -> ([Option<f32>; INFRARED_COUNT], Vec<&'static str>) {
    let mut values = [None; INFRARED_COUNT];
    let mut failed = Vec::new();
    for position in InfraredPosition::ALL {
        match dev.read_proximity(position) {
            Ok(v) => values[position.index()] = Some(v),
            Err(e) => report_failure(position.name(), &e, &mut failed),
        }
    }
    (values, failed)
}

fn read_single<T>(
    source: &'static str,
    result: crate::error::Result<T>,
) -> (Option<T>, Vec<&'static str>) {
    let mut failed = Vec::new();
    match result {
        Ok(v) => (Some(v), failed),
        Err(e) => {
            report_failure(source, &e, &mut failed);
            (None, failed)
        }
    }
}

/// Join a scoped read; a panicking source counts as a failed read
fn join_read<T: Default>(
    handle: Option<ScopedJoinHandle<'_, (T, Vec<&'static str>)>>,
    source: &'static str,
    failed: &mut Vec<&'static str>,
) -> T {
    let Some(handle) = handle else {
        return T::default();
    };
    match handle.join() {
        Ok((value, source_failures)) => {
            failed.extend(source_failures);
            value
        }
        Err(_) => {
            log::warn!("Sensor read failed ({}): reader panicked", source);
            failed.push(source);
            T::default()
        }
    }
}

/// The set of sensor sources a deployment provides
#[derive(Default)]
pub struct SensorSuite {
    ultrasonic: Option<Box<dyn UltrasonicRange>>,
    infrared: Option<Box<dyn InfraredProximity>>,
    bearing: Option<Box<dyn MagneticBearing>>,
    inertial: Option<Box<dyn Inertial6Dof>>,
    cores: Option<Box<dyn CoreUtilization>>,
    sampling: SamplingMode,
}

impl SensorSuite {
    /// Empty suite; every field of its snapshots stays unset
    pub fn new(sampling: SamplingMode) -> Self {
        Self {
            sampling,
            ..Self::default()
        }
    }

    /// Suite where one source type provides every capability
    pub fn with_all<S>(source: S, sampling: SamplingMode) -> Self
    where
        S: UltrasonicRange
            + InfraredProximity
            + MagneticBearing
            + Inertial6Dof
            + CoreUtilization
            + Clone
            + 'static,
    {
        Self::new(sampling)
            .with_ultrasonic(source.clone())
            .with_infrared(source.clone())
            .with_bearing(source.clone())
            .with_inertial(source.clone())
            .with_cores(source)
    }

    pub fn with_ultrasonic(mut self, source: impl UltrasonicRange + 'static) -> Self {
        self.ultrasonic = Some(Box::new(source));
        self
    }

    pub fn with_infrared(mut self, source: impl InfraredProximity + 'static) -> Self {
        self.infrared = Some(Box::new(source));
        self
    }

    pub fn with_bearing(mut self, source: impl MagneticBearing + 'static) -> Self {
        self.bearing = Some(Box::new(source));
        self
    }

    pub fn with_inertial(mut self, source: impl Inertial6Dof + 'static) -> Self {
        self.inertial = Some(Box::new(source));
        self
    }

    pub fn with_cores(mut self, source: impl CoreUtilization + 'static) -> Self {
        self.cores = Some(Box::new(source));
        self
    }

    pub fn sampling(&self) -> SamplingMode {
        self.sampling
    }

    /// Number of configured capabilities
    pub fn source_count(&self) -> usize {
        [
            self.ultrasonic.is_some(),
            self.infrared.is_some(),
            self.bearing.is_some(),
            self.inertial.is_some(),
            self.cores.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }

    /// Build this cycle's snapshot
    pub fn aggregate(&mut self) -> SensorSnapshot {
        self.sample().snapshot
    }

    /// Build this cycle's snapshot and report which sources failed
    pub fn sample(&mut self) -> SampleReport {
        let readings = match self.sampling {
            SamplingMode::Sequential => self.read_sequential(),
            SamplingMode::Parallel => self.read_parallel(),
        };
        readings.into_report()
    }

    fn read_sequential(&mut self) -> Readings {
        let mut r = Readings::default();

        if let Some(dev) = self.ultrasonic.as_deref_mut() {
            let (values, failed) = read_ultrasonic(dev);
            r.ultrasonic = values;
            r.failed.extend(failed);
        }
        if let Some(dev) = self.infrared.as_deref_mut() {
            let (values, failed) = read_infrared(dev);
            r.infrared = values;
            r.failed.extend(failed);
        }
        if let Some(dev) = self.bearing.as_deref_mut() {
            let (value, failed) = read_single("bearing", dev.read_bearing());
            r.bearing = value;
            r.failed.extend(failed);
        }
        if let Some(dev) = self.inertial.as_deref_mut() {
            let (value, failed) = read_single("inertial", dev.read_inertial());
            r.inertial = value;
            r.failed.extend(failed);
        }
        if let Some(dev) = self.cores.as_deref_mut() {
            let (value, failed) = read_single("cores", dev.read_utilization());
            r.cores = value;
            r.failed.extend(failed);
        }

        r
    }

    /// One scoped thread per source; each thread holds the only `&mut` to
    /// its driver and all are joined before the snapshot is built.
    fn read_parallel(&mut self) -> Readings {
        let Self {
            ultrasonic,
            infrared,
            bearing,
            inertial,
            cores,
            ..
        } = self;

        thread::scope(|s| {
            let ultrasonic = ultrasonic
                .as_deref_mut()
                .map(|dev| s.spawn(move || read_ultrasonic(dev)));
            let infrared = infrared
                .as_deref_mut()
                .map(|dev| s.spawn(move || read_infrared(dev)));
            let bearing = bearing
                .as_deref_mut()
                .map(|dev| s.spawn(move || read_single("bearing", dev.read_bearing())));
            let inertial = inertial
                .as_deref_mut()
                .map(|dev| s.spawn(move || read_single("inertial", dev.read_inertial())));
            let cores = cores
                .as_deref_mut()
                .map(|dev| s.spawn(move || read_single("cores", dev.read_utilization())));

            let mut failed = Vec::new();
            Readings {
                ultrasonic: join_read(ultrasonic, "ultrasonic", &mut failed),
                infrared: join_read(infrared, "infrared", &mut failed),
                bearing: join_read(bearing, "bearing", &mut failed),
                inertial: join_read(inertial, "inertial", &mut failed),
                cores: join_read(cores, "cores", &mut failed),
                failed,
            }
        })
    }
}
