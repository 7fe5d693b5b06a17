//! Stack lifecycle tests

use netcore::device::{MockDriver, NetDevice};
use netcore::driver::{dummy, loopback};
use netcore::{ConfigError, ErrorKind, NetStack, RecordingInput, StackConfig, StackError};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

const WAIT: Duration = Duration::from_secs(5);

#[test]
fn test_config_from_file_drives_drivers() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[loopback]\nmtu = 1500\nqueue_limit = 4\n\n[dummy]\nmtu = 576").unwrap();

    let config = StackConfig::from_file(file.path()).unwrap();
    let mut stack = NetStack::new(config).unwrap();
    let lo = loopback::init(&mut stack).unwrap();
    let dummy = dummy::init(&mut stack);

    assert_eq!(lo.mtu(), 1500);
    assert_eq!(dummy.mtu(), 576);

    lo.open().unwrap();
    for _ in 0..4 {
        lo.output(0x0800, &[0], None).unwrap();
    }
    let err = lo.output(0x0800, &[0], None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
}

#[test]
fn test_invalid_config_file_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[loopback]\nqueue_limit = 0").unwrap();

    let err = StackConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));
    assert_eq!(StackError::from(err).kind(), ErrorKind::Config);
}

#[test]
fn test_full_lifecycle() {
    let input = RecordingInput::new();
    let mut stack = NetStack::with_input(StackConfig::default(), input.clone()).unwrap();
    let driver = MockDriver::new();
    let eth = stack.register_device(NetDevice::builder(driver.clone()).with_mtu(1500));
    let lo = loopback::init(&mut stack).unwrap();
    assert_eq!(stack.devices().len(), 2);
    assert!(!eth.is_up() && !lo.is_up());

    let running = scopeguard::guard(stack.run().unwrap(), |running| running.shutdown());
    assert!(eth.is_up() && lo.is_up());
    assert_eq!(running.device(lo.name()).map(|d| d.index()), Some(lo.index()));

    running.output(&eth, 0x0800, &[1, 2], None).unwrap();
    running.output(&lo, 0x0800, &[3, 4], None).unwrap();
    assert!(input.wait_for(1, WAIT));
    assert_eq!(driver.transmit_count(), 1);
    assert_eq!(input.frames()[0].data, vec![3, 4]);

    let running = scopeguard::ScopeGuard::into_inner(running);
    running.shutdown();
    assert!(!eth.is_up() && !lo.is_up());
    assert_eq!(driver.close_count(), 1);
}

#[test]
fn test_run_continues_past_failed_open() {
    let mut stack = NetStack::new(StackConfig::default()).unwrap();
    let broken = MockDriver::new();
    broken.fail_open(true);
    let bad = stack.register_device(NetDevice::builder(broken));
    let good = stack.register_device(NetDevice::builder(MockDriver::new()));

    let running = stack.run().unwrap();
    assert!(!bad.is_up());
    assert!(good.is_up());
    running.shutdown();
}

#[test]
fn test_raise_after_shutdown_fails() {
    let stack = NetStack::new(StackConfig::default()).unwrap();
    let raiser = stack.irq_raiser();
    let running = stack.run().unwrap();
    assert!(running.irq_raiser().is_some());
    running.raise(netcore::intr::IRQ_BASE).unwrap();
    running.shutdown();

    let err = raiser.raise(netcore::intr::IRQ_BASE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Startup);
}
