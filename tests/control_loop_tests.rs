//! Integration tests for the acquisition and control loop

use cryotherm::{
    hal::{MockActuator, MockClock, MockDelay, MockPlot, MockSpi},
    logger::ERROR_LOG_NAME,
    ActuationMode, AxisConfig, Clock, ChannelConfig, Config, ControlError, ControlLoop, Hardware,
    LogConfig, LoopConfig, SensorError, Shutdown,
};

type MockLoop = ControlLoop<MockSpi, MockActuator, MockClock, MockDelay>;

struct Rig {
    spis: Vec<MockSpi>,
    heaters: Vec<MockActuator>,
    clock: MockClock,
}

fn rig(config: &Config) -> (MockLoop, Rig) {
    rig_with_delay(config, |clock| MockDelay::with_clock(clock))
}

fn rig_with_delay(config: &Config, delay: impl FnOnce(MockClock) -> MockDelay) -> (MockLoop, Rig) {
    let spis: Vec<MockSpi> = config.channels.iter().map(|_| MockSpi::new()).collect();
    let heaters: Vec<MockActuator> = config.axes.iter().map(|_| MockActuator::new()).collect();
    let clock = MockClock::new();
    let control = ControlLoop::new(
        config,
        Hardware {
            channels: spis.clone(),
            actuators: heaters.clone(),
            clock: clock.clone(),
            delay: delay(clock.clone()),
        },
    )
    .unwrap();
    (
        control,
        Rig {
            spis,
            heaters,
            clock,
        },
    )
}

fn single(setpoint: f64) -> Config {
    Config::default()
        .with_channels(vec![ChannelConfig::new("tip", 5)])
        .with_axes(vec![AxisConfig::new("probe", "tip", 17).with_setpoint(setpoint)])
}

fn raw(celsius: f64) -> i32 {
    (celsius * 4096.0) as i32
}

// ============================================================================
// Cycle Behavior
// ============================================================================

#[test]
fn default_rig_drives_each_heater_from_its_own_channel() {
    let config = Config::default();
    let (mut control, rig) = rig(&config);
    for spi in &rig.spis {
        spi.queue_temperature_raw(raw(-120.0));
    }

    let report = control.run_cycle().unwrap();
    let temps: Vec<f64> = report.record.temperatures.iter().map(|t| t.unwrap()).collect();

    // cold head uncalibrated, chamber offset by 7.6
    assert!((temps[0] - -120.0).abs() < 1e-9);
    assert!((temps[3] - -112.4).abs() < 1e-9);
    // front reads warmer than -115 after calibration, back colder than -94.5
    assert!(temps[1] > -115.0);
    assert!(temps[2] < -94.5);
    assert_eq!(report.record.energized, vec![false, true]);
    assert_eq!(rig.heaters[0].history(), vec![false]);
    assert_eq!(rig.heaters[1].history(), vec![true]);
}

#[test]
fn averaged_row_over_window() {
    let config = Config::default()
        .with_channels(vec![ChannelConfig::new("tip", 5).with_averaging(4)])
        .with_axes(vec![AxisConfig::new("probe", "tip", 17)])
        .with_control(LoopConfig::default().with_average_window(3));
    let (mut control, rig) = rig(&config);
    for value in [100, 200, 300] {
        rig.spis[0].queue_temperature_raw(value);
    }

    assert!(control.run_cycle().unwrap().averaged.is_none());
    assert!(control.run_cycle().unwrap().averaged.is_none());
    let averaged = control.run_cycle().unwrap().averaged.unwrap();
    assert!((averaged.temperatures[0].unwrap() - 200.0 / 4096.0).abs() < 1e-12);
    // 1/64 °C above a 0 °C setpoint: heater stays off
    assert_eq!(averaged.duty, vec![0.0]);
}

#[test]
fn stuck_conversion_is_a_gap_not_a_failure() {
    let config = Config::default()
        .with_channels(vec![ChannelConfig::new("a", 5), ChannelConfig::new("b", 6)])
        .with_axes(vec![
            AxisConfig::new("x", "a", 17).with_setpoint(50.0),
            AxisConfig::new("y", "b", 18).with_setpoint(50.0),
        ]);
    let (mut control, rig) = rig(&config);
    rig.spis[0].stick_conversion(true);
    rig.spis[1].queue_temperature_raw(raw(20.0));

    let report = control.run_cycle().unwrap();
    assert_eq!(report.record.temperatures, vec![None, Some(20.0)]);
    assert_eq!(report.record.energized, vec![false, true]);
    assert_eq!(report.gaps.len(), 1);
    assert_eq!(report.gaps[0].channel, "a");
    assert!(matches!(
        report.gaps[0].error,
        SensorError::ConversionTimeout { polls: 100 }
    ));
}

#[test]
fn channel_recovers_after_timeout() {
    let (mut control, rig) = rig(&single(0.0));
    rig.spis[0].stick_conversion(true);
    assert_eq!(control.run_cycle().unwrap().record.temperatures, vec![None]);

    rig.spis[0].stick_conversion(false);
    rig.spis[0].queue_temperature_raw(raw(-3.0));
    assert_eq!(
        control.run_cycle().unwrap().record.temperatures,
        vec![Some(-3.0)]
    );
}

#[test]
fn forced_modes_ignore_pid_output() {
    let config = Config::default()
        .with_channels(vec![ChannelConfig::new("a", 5), ChannelConfig::new("b", 6)])
        .with_axes(vec![
            AxisConfig::new("on", "a", 17)
                .with_setpoint(-100.0)
                .with_actuation(ActuationMode::ForceOn),
            AxisConfig::new("off", "b", 18)
                .with_setpoint(100.0)
                .with_actuation(ActuationMode::ForceOff),
        ]);
    let (mut control, rig) = rig(&config);

    let report = control.run_cycle().unwrap();
    assert!(report.record.outputs[0].unwrap() < 0.0);
    assert!(report.record.outputs[1].unwrap() > 0.0);
    assert_eq!(report.record.energized, vec![true, false]);
    assert!(rig.heaters[0].energized());
    assert!(!rig.heaters[1].energized());
}

#[test]
fn continuous_channel_in_loop() {
    let config = Config::default()
        .with_channels(vec![ChannelConfig::new("tip", 5)
            .with_conversion(cryotherm::ConversionMode::Continuous)])
        .with_axes(vec![AxisConfig::new("probe", "tip", 17)]);
    let (mut control, rig) = rig(&config);
    rig.spis[0].queue_temperature_raw(raw(1.0));
    rig.spis[0].queue_temperature_raw(raw(2.0));

    assert_eq!(control.run_cycle().unwrap().record.temperatures, vec![Some(1.0)]);
    assert_eq!(control.run_cycle().unwrap().record.temperatures, vec![Some(2.0)]);
    assert_eq!(rig.spis[0].cr0_polls(), 0);
}

#[test]
fn plot_receives_every_cycle() {
    let plot = MockPlot::new();
    let (control, rig) = rig(&single(0.0));
    let mut control = control.with_plot(Box::new(plot.clone()));
    rig.spis[0].queue_temperature_raw(raw(4.0));
    rig.spis[0].stick_conversion(false);

    control.run_cycle().unwrap();
    rig.spis[0].stick_conversion(true);
    control.run_cycle().unwrap();

    assert_eq!(plot.count(), 2);
    let (timestamps, series) = plot.last().unwrap();
    assert_eq!(timestamps.len(), 2);
    let tip = &series["tip"];
    assert_eq!(tip[0], 4.0);
    assert!(tip[1].is_nan());
}

// ============================================================================
// Timing and Shutdown
// ============================================================================

#[test]
fn shutdown_is_seen_during_sleep() {
    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    let (mut control, rig) = rig_with_delay(&single(0.0), |clock| {
        MockDelay::with_clock(clock).with_hook(move |total_ms| {
            if total_ms >= 600 {
                trigger.request();
            }
        })
    });

    let cycles = control.run(&shutdown).unwrap();
    assert_eq!(cycles, 3);
    // third cycle ends at 510 ms; the 50 ms slice ending at 610 ms sees the request
    assert_eq!(rig.clock.now_ms(), 610);
    assert_eq!(rig.heaters[0].de_energize_count(), 2);
    assert!(!rig.heaters[0].energized());
}

#[test]
fn run_can_be_restarted_and_reapplies_safe_state() {
    let (mut control, rig) = rig(&single(100.0));
    control.run_for(&Shutdown::new(), Some(2)).unwrap();
    control.run_for(&Shutdown::new(), Some(2)).unwrap();
    assert_eq!(control.cycles(), 4);
    assert_eq!(rig.heaters[0].de_energize_count(), 3);
    assert!(!rig.heaters[0].energized());
}

// ============================================================================
// Fatal Conditions
// ============================================================================

#[test]
fn persistent_bus_fault_stops_loop_safely() {
    let config =
        single(100.0).with_control(LoopConfig::default().with_max_consecutive_bus_faults(3));
    let (mut control, rig) = rig(&config);
    rig.spis[0].fail_next(u32::MAX);

    let err = control.run(&Shutdown::new()).unwrap_err();
    assert!(matches!(
        err,
        ControlError::PersistentBusFault { ref channel, consecutive: 3 } if channel == "tip"
    ));
    assert_eq!(control.cycles(), 2);
    assert_eq!(rig.heaters[0].history(), vec![false, false]);
    assert_eq!(rig.heaters[0].de_energize_count(), 2);
}

#[test]
fn actuator_failure_stops_loop_and_still_attempts_safe_state() {
    let (mut control, rig) = rig(&single(100.0));
    rig.heaters[0].set_failing(true);

    let err = control.run(&Shutdown::new()).unwrap_err();
    assert!(matches!(err, ControlError::Actuator { ref axis, .. } if axis == "probe"));
    assert_eq!(rig.heaters[0].de_energize_count(), 2);
    assert!(control.is_safe());
}

#[test]
fn setup_failure_is_reported_per_channel() {
    let spi = MockSpi::new();
    spi.fail_next(1);
    let heater = MockActuator::new();
    let err = ControlLoop::new(
        &single(0.0),
        Hardware {
            channels: vec![spi],
            actuators: vec![heater.clone()],
            clock: MockClock::new(),
            delay: MockDelay::new(),
        },
    )
    .err()
    .unwrap();
    assert!(matches!(err, ControlError::Sensor { ref channel, .. } if channel == "tip"));
    // actuators were forced off before the sensors were touched
    assert_eq!(heater.de_energize_count(), 2);
}

// ============================================================================
// Data Log
// ============================================================================

#[test]
fn log_rows_follow_window_and_rotate() {
    let dir = tempfile::tempdir().unwrap();
    let logs = dir.path().join("Logs");
    let log = LogConfig::default()
        .with_directory(logs.to_str().unwrap())
        .with_prefix("run")
        .with_rotate_bytes(120);
    let config = single(0.0)
        .with_control(LoopConfig::default().with_average_window(1))
        .with_log(log.clone());

    let (control, _rig) = rig(&config);
    let mut control = control.open_log(&log).unwrap();
    control.run_for(&Shutdown::new(), Some(10)).unwrap();
    drop(control);

    let mut files: Vec<_> = std::fs::read_dir(&logs)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    files.sort();
    assert!(files.len() > 1);

    let mut rows = 0;
    for file in &files {
        let name = file.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("run_20240101_0000"));
        assert!(name.ends_with(".csv"));

        let text = std::fs::read_to_string(file).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("timestamp,tip,probe_output,probe_duty"));
        for line in lines {
            assert_eq!(line.split(',').count(), 4);
            rows += 1;
        }
    }
    assert_eq!(rows, 10);
}

#[test]
fn log_gap_is_an_empty_field() {
    let dir = tempfile::tempdir().unwrap();
    let log = LogConfig::default().with_directory(dir.path().to_str().unwrap());
    let config = single(0.0).with_control(LoopConfig::default().with_average_window(1));

    let (control, rig) = rig(&config);
    let mut control = control.open_log(&log).unwrap();
    rig.spis[0].stick_conversion(true);
    control.run_cycle().unwrap();
    let path = control.log().unwrap().path().to_path_buf();
    drop(control);

    let text = std::fs::read_to_string(path).unwrap();
    let row = text.lines().nth(1).unwrap();
    assert_eq!(row, "2024-01-01 00:00:00,,,0");
}

#[test]
fn fatal_error_lands_in_error_log_beside_data() {
    let dir = tempfile::tempdir().unwrap();
    let log = LogConfig::default().with_directory(dir.path().join("Logs"));
    let config = single(100.0)
        .with_control(LoopConfig::default().with_max_consecutive_bus_faults(2))
        .with_log(log.clone());

    let (control, rig) = rig(&config);
    let mut control = control.open_log(&log).unwrap();
    rig.spis[0].fail_next(u32::MAX);
    let err = control.run(&Shutdown::new()).unwrap_err();
    let path = control.error_log().unwrap().path().to_path_buf();
    drop(control);

    assert_eq!(path, dir.path().join("Logs").join(ERROR_LOG_NAME));
    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("----"));
    assert!(lines[1].starts_with("2024-01-01 00:00:"));
    assert_eq!(lines[2], err.to_string());
    assert!(lines[2].contains("`tip`"));
}
