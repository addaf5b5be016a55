//! Mock implementations for testing without hardware.
//!
//! All mocks are cheap `Clone` handles over shared state: hand one clone to
//! the code under test and keep another to inspect or steer it.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockSpi`] | `SpiDevice` | Register-level simulated MAX31856 |
//! | [`MockPin`] | `OutputPin` | Tracks pin level |
//! | [`MockActuator`] | [`Actuator`] | Tracks energize calls, can fail |
//! | [`MockClock`] | [`Clock`] | Controllable time source |
//! | [`MockDelay`] | `DelayNs` | Advances a [`MockClock`] instead of sleeping |
//! | [`MockPlot`] | [`PlotSink`] | Captures plot snapshots |
//!
//! # Example
//!
//! ```rust
//! use cryotherm::hal::{MockDelay, MockSpi};
//! use cryotherm::sensor::{Max31856, PollBudget, ThermocoupleType};
//!
//! let spi = MockSpi::new().with_conversion_polls(3);
//! spi.queue_temperature_raw(25 * 4096);
//!
//! let mut tc = Max31856::new(spi.clone());
//! tc.init(ThermocoupleType::K).unwrap();
//! tc.start_conversion().unwrap();
//!
//! let mut delay = MockDelay::new();
//! tc.wait_ready(&mut delay, PollBudget::default()).unwrap();
//! assert_eq!(tc.read_temperature().unwrap(), 25.0);
//! assert_eq!(delay.total_ms(), 30);
//! ```
//!
//! [`Actuator`]: crate::traits::Actuator
//! [`Clock`]: crate::traits::Clock
//! [`PlotSink`]: crate::traits::PlotSink

use std::collections::{BTreeMap, VecDeque};
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{self, ErrorKind, Operation, SpiDevice};

use crate::bus::{READ_MASK, WRITE_FLAG};
use crate::sensor::registers as reg;
use crate::traits::{Actuator, Clock, PlotSink};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// SPI Mock
// ============================================================================

/// Error returned by [`MockSpi`] for injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockSpiError;

impl spi::Error for MockSpiError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

type SampleSource = Box<dyn FnMut() -> i32 + Send>;

struct SpiState {
    registers: [u8; 16],
    writes: Vec<(u8, u8)>,
    read_addresses: Vec<u8>,
    fail_remaining: u32,
    conversion_polls: u32,
    remaining_polls: u32,
    pending: bool,
    stuck: bool,
    cr0_polls: u32,
    samples: VecDeque<i32>,
    source: Option<SampleSource>,
}

impl SpiState {
    fn next_sample(&mut self) -> Option<i32> {
        self.samples
            .pop_front()
            .or_else(|| self.source.as_mut().map(|f| f()))
    }

    fn latch(&mut self, raw: i32) {
        let [_, hi, mid, lo] = raw.to_be_bytes();
        self.registers[reg::LTCBH as usize] = hi;
        self.registers[reg::LTCBM as usize] = mid;
        self.registers[reg::LTCBL as usize] = lo;
    }

    fn complete_conversion(&mut self) {
        self.pending = false;
        self.registers[reg::CR0 as usize] &= !reg::CR0_1SHOT;
        if let Some(raw) = self.next_sample() {
            self.latch(raw);
        }
    }

    fn write_register(&mut self, address: u8, value: u8) {
        let address = address & 0x0F;
        self.writes.push((address | WRITE_FLAG, value));
        self.registers[address as usize] = value;
        if address == reg::CR0 && value & reg::CR0_1SHOT != 0 {
            self.pending = true;
            self.remaining_polls = self.conversion_polls;
        }
    }

    fn begin_read(&mut self, address: u8) {
        self.read_addresses.push(address);
        if address == reg::CR0 && self.pending {
            self.cr0_polls += 1;
            if !self.stuck {
                if self.remaining_polls == 0 {
                    self.complete_conversion();
                } else {
                    self.remaining_polls -= 1;
                }
            }
        }
        let continuous = self.registers[reg::CR0 as usize] & reg::CR0_AUTOCONVERT != 0;
        if continuous && address == reg::LTCBH {
            if let Some(raw) = self.next_sample() {
                self.latch(raw);
            }
        }
    }
}

/// Simulated MAX31856 behind one chip select.
///
/// Models the sixteen registers with address auto-increment, the one-shot
/// bit (clears after a configurable number of CR0 polls), a queue of raw
/// thermocouple samples latched on each completed conversion, and
/// injectable transaction failures. A failed transaction changes nothing.
///
/// Only `Write` and `Read` operations are understood; anything else fails
/// the transaction.
#[derive(Clone)]
pub struct MockSpi {
    state: Arc<Mutex<SpiState>>,
}

impl MockSpi {
    /// Creates a chip with all registers zero. Conversions finish on the
    /// second poll.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SpiState {
                registers: [0; 16],
                writes: Vec::new(),
                read_addresses: Vec::new(),
                fail_remaining: 0,
                conversion_polls: 1,
                remaining_polls: 0,
                pending: false,
                stuck: false,
                cr0_polls: 0,
                samples: VecDeque::new(),
                source: None,
            })),
        }
    }

    /// Number of not-ready polls before a conversion completes.
    pub fn with_conversion_polls(self, polls: u32) -> Self {
        lock(&self.state).conversion_polls = polls;
        self
    }

    /// Supplies raw samples once the queue is empty.
    pub fn with_source(self, source: impl FnMut() -> i32 + Send + 'static) -> Self {
        lock(&self.state).source = Some(Box::new(source));
        self
    }

    /// Queue a raw 24-bit thermocouple value for the next conversion
    pub fn queue_temperature_raw(&self, raw: i32) {
        lock(&self.state).samples.push_back(raw);
    }

    /// Set the cold-junction registers
    pub fn set_reference_raw(&self, raw: i16) {
        let [hi, lo] = raw.to_be_bytes();
        let mut s = lock(&self.state);
        s.registers[reg::CJTH as usize] = hi;
        s.registers[reg::CJTL as usize] = lo;
    }

    /// Set the fault status register
    pub fn set_status(&self, bits: u8) {
        lock(&self.state).registers[reg::SR as usize] = bits;
    }

    /// Keep the one-shot bit set no matter how often it is polled
    pub fn stick_conversion(&self, stuck: bool) {
        lock(&self.state).stuck = stuck;
    }

    /// Fail the next `count` transactions
    pub fn fail_next(&self, count: u32) {
        lock(&self.state).fail_remaining = count;
    }

    /// Overwrite a register without recording a write
    pub fn set_register(&self, address: u8, value: u8) {
        lock(&self.state).registers[(address & 0x0F) as usize] = value;
    }

    /// Current register value.
    pub fn register(&self, address: u8) -> u8 {
        lock(&self.state).registers[(address & 0x0F) as usize]
    }

    /// Snapshot of the whole register file.
    pub fn registers(&self) -> [u8; 16] {
        lock(&self.state).registers
    }

    /// Every write as `(address byte on the wire, value)`.
    pub fn writes(&self) -> Vec<(u8, u8)> {
        lock(&self.state).writes.clone()
    }

    /// Start address of every read, as sent on the wire.
    pub fn read_addresses(&self) -> Vec<u8> {
        lock(&self.state).read_addresses.clone()
    }

    /// CR0 reads made while a conversion was pending.
    pub fn cr0_polls(&self) -> u32 {
        lock(&self.state).cr0_polls
    }
}

impl Default for MockSpi {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockSpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = lock(&self.state);
        f.debug_struct("MockSpi")
            .field("registers", &s.registers)
            .field("pending", &s.pending)
            .field("queued", &s.samples.len())
            .finish()
    }
}

impl spi::ErrorType for MockSpi {
    type Error = MockSpiError;
}

impl SpiDevice for MockSpi {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), MockSpiError> {
        let mut s = lock(&self.state);
        if s.fail_remaining > 0 {
            s.fail_remaining -= 1;
            return Err(MockSpiError);
        }
        if operations
            .iter()
            .any(|op| !matches!(op, Operation::Write(_) | Operation::Read(_)))
        {
            return Err(MockSpiError);
        }

        let mut address: Option<(u8, bool)> = None;
        let mut offset = 0u8;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    for &byte in bytes.iter() {
                        match address {
                            None => {
                                let write = byte & WRITE_FLAG != 0;
                                address = Some((byte & READ_MASK, write));
                                if !write {
                                    s.begin_read(byte & READ_MASK);
                                }
                            }
                            Some((base, true)) => {
                                s.write_register(base.wrapping_add(offset), byte);
                                offset = offset.wrapping_add(1);
                            }
                            Some((_, false)) => {}
                        }
                    }
                }
                Operation::Read(buf) => {
                    let base = address.map(|(a, _)| a).unwrap_or(0);
                    for byte in buf.iter_mut() {
                        *byte = s.registers[(base.wrapping_add(offset) & 0x0F) as usize];
                        offset = offset.wrapping_add(1);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ============================================================================
// Pin / Actuator Mocks
// ============================================================================

/// Mock output pin.
///
/// # Example
///
/// ```rust
/// use cryotherm::hal::MockPin;
/// use embedded_hal::digital::OutputPin;
///
/// let pin = MockPin::new();
/// let mut out = pin.clone();
/// out.set_high().unwrap();
/// assert!(pin.is_high());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockPin {
    high: Arc<AtomicBool>,
}

impl MockPin {
    /// Creates a pin driven low.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current level.
    pub fn is_high(&self) -> bool {
        self.high.load(Ordering::SeqCst)
    }
}

impl embedded_hal::digital::ErrorType for MockPin {
    type Error = Infallible;
}

impl embedded_hal::digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.high.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.high.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ActuatorState {
    energized: bool,
    history: Vec<bool>,
    de_energize_count: usize,
    fail: bool,
}

/// Mock heater/valve output.
///
/// Records every `set_energized` call and counts `de_energize` calls
/// separately so tests can check the safe state ran exactly once.
#[derive(Debug, Clone, Default)]
pub struct MockActuator {
    state: Arc<Mutex<ActuatorState>>,
}

impl MockActuator {
    /// Creates a de-energized output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following call fail
    pub fn set_failing(&self, fail: bool) {
        lock(&self.state).fail = fail;
    }

    /// Current state.
    pub fn energized(&self) -> bool {
        lock(&self.state).energized
    }

    /// Values passed to `set_energized`, in order.
    pub fn history(&self) -> Vec<bool> {
        lock(&self.state).history.clone()
    }

    /// Number of `de_energize` calls.
    pub fn de_energize_count(&self) -> usize {
        lock(&self.state).de_energize_count
    }
}

impl Actuator for MockActuator {
    type Error = ();

    fn set_energized(&mut self, on: bool) -> Result<(), ()> {
        let mut s = lock(&self.state);
        if s.fail {
            return Err(());
        }
        s.energized = on;
        s.history.push(on);
        Ok(())
    }

    fn is_energized(&self) -> bool {
        self.energized()
    }

    fn de_energize(&mut self) -> Result<(), ()> {
        let mut s = lock(&self.state);
        s.de_energize_count += 1;
        if s.fail {
            return Err(());
        }
        s.energized = false;
        Ok(())
    }
}

// ============================================================================
// Time Mocks
// ============================================================================

/// Mock clock for testing.
///
/// Clones share the same time. Wall-clock time starts at
/// 2024-01-01 00:00:00 and moves with `now_ms`.
///
/// # Example
///
/// ```rust
/// use cryotherm::hal::MockClock;
/// use cryotherm::traits::Clock;
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now_ms(), 0);
///
/// clock.set(1000);
/// clock.advance(500);
/// assert_eq!(clock.now_ms(), 1500);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    current_ms: Arc<AtomicU64>,
}

impl MockClock {
    /// Creates a new mock clock starting at 0ms.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the current time in milliseconds.
    pub fn set(&self, ms: u64) {
        self.current_ms.store(ms, Ordering::SeqCst);
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, ms: u64) {
        self.current_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    fn wall_time(&self) -> NaiveDateTime {
        let epoch = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        epoch + TimeDelta::milliseconds(self.now_ms() as i64)
    }
}

type DelayHook = Box<dyn FnMut(u64) + Send>;

/// Delay that advances a [`MockClock`] instead of sleeping.
///
/// An optional hook runs after every delay with the accumulated
/// milliseconds, which lets a test act "while" the code under test waits.
pub struct MockDelay {
    clock: MockClock,
    total_ns: u64,
    hook: Option<DelayHook>,
}

impl MockDelay {
    /// Creates a delay with its own clock.
    pub fn new() -> Self {
        Self::with_clock(MockClock::new())
    }

    /// Creates a delay that advances `clock`.
    pub fn with_clock(clock: MockClock) -> Self {
        Self {
            clock,
            total_ns: 0,
            hook: None,
        }
    }

    /// Run `hook(total_ms)` after every delay
    pub fn with_hook(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// Total time waited.
    pub fn total_ms(&self) -> u64 {
        self.total_ns / 1_000_000
    }

    /// The clock being advanced.
    pub fn clock(&self) -> &MockClock {
        &self.clock
    }
}

impl Default for MockDelay {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MockDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDelay")
            .field("total_ns", &self.total_ns)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        let before = self.total_ms();
        self.total_ns += u64::from(ns);
        self.clock.advance(self.total_ms() - before);
        let total = self.total_ms();
        if let Some(hook) = self.hook.as_mut() {
            hook(total);
        }
    }

    fn delay_ms(&mut self, ms: u32) {
        self.total_ns += u64::from(ms) * 1_000_000;
        self.clock.advance(u64::from(ms));
        let total = self.total_ms();
        if let Some(hook) = self.hook.as_mut() {
            hook(total);
        }
    }
}

// ============================================================================
// Plot Mock
// ============================================================================

/// Plot snapshot: timestamps and named series.
pub type PlotSnapshot = (Vec<String>, BTreeMap<String, Vec<f64>>);

/// Mock plot consumer; keeps every snapshot.
#[derive(Debug, Clone, Default)]
pub struct MockPlot {
    snapshots: Arc<Mutex<Vec<PlotSnapshot>>>,
}

impl MockPlot {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `plot` calls.
    pub fn count(&self) -> usize {
        lock(&self.snapshots).len()
    }

    /// Most recent snapshot.
    pub fn last(&self) -> Option<PlotSnapshot> {
        lock(&self.snapshots).last().cloned()
    }
}

impl PlotSink for MockPlot {
    fn plot(&mut self, timestamps: &[String], series: &BTreeMap<String, Vec<f64>>) {
        lock(&self.snapshots).push((timestamps.to_vec(), series.clone()));
    }
}

// ============================================================================
// Tests
// ============================================================================
