use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::{ChannelDescriptor, HapticError, Result};

/// A single haptic pulse as handed to the actuator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    pub duration_secs: f64,
    pub frequency_hz: f64,
    pub volume: f32,
}

impl Pulse {
    /// Builds a pulse, enforcing `duration > 0`, `frequency > 0` and
    /// `volume` within `[0, 1]`.
    pub fn new(duration_secs: f64, frequency_hz: f64, volume: f32) -> Result<Self> {
        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Err(HapticError::InvalidPulse("duration must be positive"));
        }
        if !(frequency_hz.is_finite() && frequency_hz > 0.0) {
            return Err(HapticError::InvalidPulse("frequency must be positive"));
        }
        if !(0.0..=1.0).contains(&volume) {
            return Err(HapticError::InvalidPulse("volume must lie within [0, 1]"));
        }
        Ok(Self {
            duration_secs,
            frequency_hz,
            volume,
        })
    }
}

/// Output side of the player. Implementations must tolerate `trigger` and
/// `refresh` being called concurrently from different threads.
pub trait ActuatorBackend: Send + Sync {
    /// Channels available for the whole run, in ascending id order.
    fn channels(&self) -> Vec<ChannelDescriptor>;

    /// Fires a pulse and returns immediately; never waits for the pulse to end.
    fn trigger(&self, channel: &ChannelDescriptor, pulse: Pulse) -> Result<()>;

    /// Periodic housekeeping some hardware requires to keep outputs alive.
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// Message written by [`LineProtocolActuator`], one JSON object per line.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum LineMessage<'a> {
    Pulse {
        channel: usize,
        handle: u64,
        path: &'a str,
        duration_secs: f64,
        frequency_hz: f64,
        volume: f32,
    },
    Refresh,
}

/// Writes pulses as JSON lines for an external hardware bridge to consume.
pub struct LineProtocolActuator<W> {
    channels: Vec<ChannelDescriptor>,
    sink: Mutex<W>,
}

impl<W: Write + Send> LineProtocolActuator<W> {
    /// Announces one channel per path; ids and handles follow path order.
    pub fn new(paths: &[String], sink: W) -> Result<Self> {
        if paths.is_empty() {
            return Err(HapticError::NoChannels);
        }
        let channels = paths
            .iter()
            .enumerate()
            .map(|(id, path)| ChannelDescriptor::new(id, id as u64, path.clone()))
            .collect();
        Ok(Self {
            channels,
            sink: Mutex::new(sink),
        })
    }

    /// Consumes the actuator and returns the sink.
    pub fn into_inner(self) -> Result<W> {
        self.sink
            .into_inner()
            .map_err(|_| HapticError::msg("actuator sink has been poisoned"))
    }

    fn write(&self, message: &LineMessage<'_>) -> Result<()> {
        let mut sink = self.lock_sink()?;
        serde_json::to_writer(&mut *sink, message)?;
        sink.write_all(b"\n")?;
        sink.flush()?;
        Ok(())
    }

    fn lock_sink(&self) -> Result<MutexGuard<'_, W>> {
        self.sink
            .lock()
            .map_err(|_| HapticError::msg("actuator sink has been poisoned"))
    }
}

impl<W: Write + Send> ActuatorBackend for LineProtocolActuator<W> {
    fn channels(&self) -> Vec<ChannelDescriptor> {
        self.channels.clone()
    }

    fn trigger(&self, channel: &ChannelDescriptor, pulse: Pulse) -> Result<()> {
        if !self.channels.iter().any(|known| known.id == channel.id) {
            return Err(HapticError::actuator(channel.id, "channel not found"));
        }
        self.write(&LineMessage::Pulse {
            channel: channel.id,
            handle: channel.handle,
            path: &channel.path,
            duration_secs: pulse.duration_secs,
            frequency_hz: pulse.frequency_hz,
            volume: pulse.volume,
        })
        .map_err(|err| HapticError::actuator(channel.id, err.to_string()))
    }

    fn refresh(&self) -> Result<()> {
        self.write(&LineMessage::Refresh)
    }
}

impl<W> std::fmt::Debug for LineProtocolActuator<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineProtocolActuator")
            .field("channels", &self.channels)
            .finish()
    }
}

/// Debug stand-in for hardware: logs each pulse on a set of virtual channels.
#[derive(Debug)]
pub struct LogActuator {
    channels: Vec<ChannelDescriptor>,
}

impl LogActuator {
    pub fn new(count: usize) -> Self {
        let channels = (0..count)
            .map(|id| ChannelDescriptor::new(id, id as u64, format!("/virtual/{id}")))
            .collect();
        Self { channels }
    }
}

impl ActuatorBackend for LogActuator {
    fn channels(&self) -> Vec<ChannelDescriptor> {
        self.channels.clone()
    }

    fn trigger(&self, channel: &ChannelDescriptor, pulse: Pulse) -> Result<()> {
        tracing::info!(
            channel = channel.id,
            path = %channel.path,
            frequency_hz = pulse.frequency_hz,
            duration_ms = pulse.duration_secs * 1000.0,
            volume = pulse.volume,
            "pulse"
        );
        Ok(())
    }
}

/// Background thread calling [`ActuatorBackend::refresh`] on a fixed period.
/// Stops and joins when dropped.
#[derive(Debug)]
pub struct RefreshTask {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshTask {
    /// Refreshes once synchronously, then keeps refreshing every `interval`.
    pub fn start(backend: Arc<dyn ActuatorBackend>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(HapticError::InvalidInput("refresh interval must be non-zero"));
        }
        if let Err(err) = backend.refresh() {
            tracing::warn!(%err, "initial actuator refresh failed");
        }

        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name("actuator-refresh".to_string())
            .spawn(move || {
                while !flag.load(Ordering::Acquire) {
                    thread::park_timeout(interval);
                    if flag.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(err) = backend.refresh() {
                        tracing::warn!(%err, "actuator refresh failed");
                    }
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::warn!("actuator refresh thread panicked");
            }
        }
    }
}

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.stop();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingActuator;
    use super::*;

    #[test]
    fn validates_pulse_contract() {
        assert!(Pulse::new(0.5, 440.0, 0.25).is_ok());
        assert!(Pulse::new(0.0, 440.0, 0.25).is_err());
        assert!(Pulse::new(0.5, -1.0, 0.25).is_err());
        assert!(Pulse::new(0.5, 440.0, 1.5).is_err());
    }

    #[test]
    fn line_protocol_writes_one_json_object_per_pulse() {
        let actuator =
            LineProtocolActuator::new(&["/devices/left".to_string()], Vec::new()).unwrap();
        let channel = actuator.channels().remove(0);

        actuator
            .trigger(&channel, Pulse::new(0.5, 440.0, 0.25).unwrap())
            .unwrap();
        actuator.refresh().unwrap();

        let output = String::from_utf8(actuator.into_inner().unwrap()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "pulse");
        assert_eq!(lines[0]["path"], "/devices/left");
        assert_eq!(lines[0]["frequency_hz"], 440.0);
        assert_eq!(lines[1]["type"], "refresh");
    }

    #[test]
    fn line_protocol_requires_channels() {
        let err = LineProtocolActuator::new(&[], Vec::new()).unwrap_err();
        assert!(matches!(err, HapticError::NoChannels));
    }

    #[test]
    fn line_protocol_rejects_unknown_channel() {
        let actuator =
            LineProtocolActuator::new(&["/devices/left".to_string()], Vec::new()).unwrap();
        let stray = ChannelDescriptor::new(7, 7, "/devices/ghost");
        let err = actuator
            .trigger(&stray, Pulse::new(0.1, 220.0, 0.5).unwrap())
            .unwrap_err();
        assert!(format!("{err}").contains("channel 7"));
    }

    #[test]
    fn log_actuator_exposes_virtual_channels() {
        let actuator = LogActuator::new(2);
        let ids: Vec<_> = actuator.channels().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn refresh_task_runs_until_dropped() {
        let backend = Arc::new(RecordingActuator::new(1));
        let task = RefreshTask::start(backend.clone(), Duration::from_millis(5)).unwrap();
        thread::sleep(Duration::from_millis(40));
        drop(task);

        let count = backend.refreshes.load(Ordering::SeqCst);
        assert!(count >= 2, "expected periodic refreshes, saw {count}");

        thread::sleep(Duration::from_millis(20));
        assert_eq!(backend.refreshes.load(Ordering::SeqCst), count);
    }
}
