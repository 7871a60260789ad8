//! Power-on, power-off and reconciliation against stand-in processes.

mod common;

use brickworks::brick::BrickState;
use brickworks::errors::BrickError;
use brickworks::graph::PlugTarget;
use common::{recording_factory, RecordingLauncher};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixListener;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_poweron_starts_linked_switches_first() {
    let dir = tempfile::tempdir().unwrap();
    let (mut factory, launched) = recording_factory(dir.path(), RecordingLauncher::sleeping());
    let sw1 = factory.new_brick("switch", "sw1").unwrap();
    let sw2 = factory.new_brick("switch", "sw2").unwrap();
    let wire = factory.new_brick("wire", "w1").unwrap();
    assert!(factory.connect_to(wire, "sw1_port").unwrap());
    assert!(factory.connect_to(wire, "sw2_port").unwrap());

    factory.poweron(wire).unwrap();

    let programs: Vec<String> = launched.borrow().iter().map(|argv| argv[0].clone()).collect();
    assert_eq!(
        programs,
        vec!["/opt/vde/vde_switch", "/opt/vde/vde_switch", "/opt/vde/dpipe"]
    );
    for id in [sw1, sw2, wire] {
        assert_eq!(factory.get_state(id), Some(BrickState::Running));
    }
    assert_eq!(factory.running_count(), 3);

    // Already running: nothing new is spawned
    factory.poweron(sw1).unwrap();
    assert_eq!(launched.borrow().len(), 3);

    factory.quit();
    assert_eq!(factory.running_count(), 0);
    assert_eq!(factory.get_state(wire), Some(BrickState::Off));
}

#[test]
fn test_unplugged_wire_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let (mut factory, launched) = recording_factory(dir.path(), RecordingLauncher::sleeping());
    factory.new_brick("switch", "sw1").unwrap();
    let wire = factory.new_brick("wire", "w1").unwrap();
    factory.connect_to(wire, "sw1_port").unwrap();

    let err = factory.poweron(wire).unwrap_err();
    assert!(matches!(err, BrickError::BadConfig(name) if name == "w1"));
    assert!(launched.borrow().is_empty());
    assert_eq!(factory.get_state(wire), Some(BrickState::Disconnected));
}

#[test]
fn test_self_loop_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let (mut factory, launched) = recording_factory(dir.path(), RecordingLauncher::sleeping());
    let vm = factory.new_brick("vm", "vm1").unwrap();
    let own = factory.add_sock(vm, None).unwrap();
    factory.add_plug(vm, PlugTarget::Sock(own), None).unwrap();

    let err = factory.poweron(vm).unwrap_err();
    assert!(matches!(err, BrickError::Linkloop(_)), "got {:?}", err);
    assert!(launched.borrow().is_empty());
    assert!(!factory.brick(vm).unwrap().is_running());

    factory.settings.error_on_loop = true;
    let err = factory.poweron(vm).unwrap_err();
    assert!(matches!(err, BrickError::NotConnected(_)), "got {:?}", err);
    assert!(launched.borrow().is_empty());
}

#[test]
fn test_disk_lock_is_exclusive_until_poweroff() {
    let dir = tempfile::tempdir().unwrap();
    let (mut factory, launched) = recording_factory(dir.path(), RecordingLauncher::sleeping());
    let image = dir.path().join("debian.img");
    std::fs::write(&image, b"disk").unwrap();
    factory.new_image("debian", &image).unwrap();

    let vm1 = factory.new_brick("vm", "vm1").unwrap();
    let vm2 = factory.new_brick("vm", "vm2").unwrap();
    factory.configure_brick(vm1, &["basehda=debian", "privatehda="]).unwrap();
    factory.configure_brick(vm2, &["basehda=debian", "privatehda="]).unwrap();

    factory.poweron(vm1).unwrap();
    // A second power-on of the holder is harmless
    factory.poweron(vm1).unwrap();
    assert_eq!(factory.images.held_by(vm1).len(), 1);
    let argv = launched.borrow()[0].clone();
    assert!(argv.windows(2).any(|w| w[0] == "-hda" && w[1] == image.display().to_string()));

    let err = factory.poweron(vm2).unwrap_err();
    assert!(matches!(err, BrickError::DiskLocked(ref p) if *p == image), "got {:?}", err);
    assert!(!factory.brick(vm2).unwrap().is_running());
    assert_eq!(launched.borrow().len(), 1);

    factory.poweroff(vm1).unwrap();
    assert!(factory.images.held_by(vm1).is_empty());

    factory.poweron(vm2).unwrap();
    assert_eq!(factory.images.held_by(vm2).len(), 1);
    factory.quit();
}

#[test]
fn test_reap_clears_exited_bricks() {
    let dir = tempfile::tempdir().unwrap();
    let (mut factory, _launched) =
        recording_factory(dir.path(), RecordingLauncher::with_stand_in(&["true"]));
    let sw = factory.new_brick("switch", "sw1").unwrap();
    factory.poweron(sw).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut reaped = Vec::new();
    while reaped.is_empty() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
        reaped = factory.reap();
    }
    assert_eq!(reaped, vec![sw]);
    assert_eq!(factory.running_count(), 0);
    assert_eq!(factory.get_state(sw), Some(BrickState::Off));
}

#[test]
fn test_poweron_hook_arms_event() {
    let dir = tempfile::tempdir().unwrap();
    let (mut factory, _launched) = recording_factory(dir.path(), RecordingLauncher::sleeping());
    factory.execute("new event stop_sw").unwrap();
    factory.execute("stop_sw config delay=2").unwrap();
    factory.execute("stop_sw config add sw1 off").unwrap();
    factory.execute("new switch sw1").unwrap();
    factory.execute("sw1 config pon_vbevent=stop_sw").unwrap();

    factory.execute("sw1 on").unwrap();
    assert_eq!(factory.running_count(), 1);
    assert_eq!(factory.armed_events(), 1);

    // Not due yet
    assert_eq!(factory.fire_due_events(Instant::now()), 0);
    assert_eq!(
        factory.fire_due_events(Instant::now() + Duration::from_secs(3)),
        1
    );
    assert_eq!(factory.running_count(), 0);
    assert_eq!(factory.armed_events(), 0);
}

#[test]
fn test_tap_runs_through_privilege_escalation() {
    let dir = tempfile::tempdir().unwrap();
    let (mut factory, launched) = recording_factory(dir.path(), RecordingLauncher::sleeping());
    factory.settings.sudo = "/usr/bin/sudo".to_string();
    factory.new_brick("switch", "sw1").unwrap();
    let tap = factory.new_brick("tap", "tap0").unwrap();
    factory.connect_to(tap, "sw1_port").unwrap();

    factory.poweron(tap).unwrap();
    let argv = launched.borrow().last().cloned().unwrap();
    let ws = dir.path().display();
    assert_eq!(
        argv,
        vec![
            "/usr/bin/sudo".to_string(),
            format!("/opt/vde/vde_plug2tap -s {}/sw1.ctl tap0 -P {}/tap0.pid", ws, ws),
        ]
    );
    assert!(factory.brick(tap).unwrap().process.as_ref().unwrap().privileged);

    // The stand-in records its own pid, as the real program does with -P;
    // `env` plays the escalation program so the signal reaches it
    let pid = factory.brick(tap).unwrap().pid().unwrap();
    std::fs::write(dir.path().join("tap0.pid"), format!("{}\n", pid)).unwrap();
    factory.settings.sudo = "env".to_string();

    factory.poweroff(tap).unwrap();
    assert_eq!(factory.get_state(tap), Some(BrickState::Off));
    factory.quit();
}

#[test]
fn test_privileged_poweroff_needs_pidfile() {
    let dir = tempfile::tempdir().unwrap();
    let (mut factory, _launched) = recording_factory(dir.path(), RecordingLauncher::sleeping());
    factory.settings.sudo = "env".to_string();
    factory.new_brick("switch", "sw1").unwrap();
    let tap = factory.new_brick("tap", "tap0").unwrap();
    factory.connect_to(tap, "sw1_port").unwrap();
    factory.poweron(tap).unwrap();
    let pid = factory.brick(tap).unwrap().pid().unwrap();

    // Without a recorded pid the real process cannot be reached
    let err = factory.poweroff(tap).unwrap_err();
    assert!(matches!(err, BrickError::Io(_)));
    assert_eq!(factory.get_state(tap), Some(BrickState::Running));
    assert_eq!(factory.brick(tap).unwrap().pid(), Some(pid));

    std::fs::write(dir.path().join("tap0.pid"), "garbage").unwrap();
    assert!(factory.poweroff(tap).is_err());
    assert_eq!(factory.get_state(tap), Some(BrickState::Running));

    std::fs::write(dir.path().join("tap0.pid"), pid.to_string()).unwrap();
    factory.poweroff(tap).unwrap();
    assert_eq!(factory.get_state(tap), Some(BrickState::Off));
    assert_eq!(factory.running_count(), 0);
}

#[test]
fn test_reconfigure_running_switch() {
    let dir = tempfile::tempdir().unwrap();
    let (mut factory, _launched) = recording_factory(dir.path(), RecordingLauncher::sleeping());
    let sw1 = factory.new_brick("switch", "sw1").unwrap();
    let sw2 = factory.new_brick("switch", "sw2").unwrap();

    // Console of sw1: collect the commands, acknowledge each one
    let listener = UnixListener::bind(dir.path().join("sw1.mgmt")).unwrap();
    let console = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut received = Vec::new();
        for line in BufReader::new(stream).lines() {
            let line = line.unwrap();
            writer.write_all(b"1000 Success\n").unwrap();
            received.push(line);
        }
        received
    });

    factory.poweron(sw1).unwrap();
    factory.poweron(sw2).unwrap();

    // A live-settable key is pushed to the console
    factory.configure_brick(sw1, &["numports=16"]).unwrap();
    let brick = factory.brick(sw1).unwrap();
    assert_eq!(brick.cfg.get_string("numports"), "16");
    assert!(!brick.need_restart_to_apply_changes);

    // Any other key waits for a restart
    factory.configure_brick(sw1, &["priority=5"]).unwrap();
    assert!(factory.brick(sw1).unwrap().need_restart_to_apply_changes);

    // A live key that cannot be delivered also waits for a restart
    factory.configure_brick(sw2, &["hub=*"]).unwrap();
    assert!(factory.brick(sw2).unwrap().need_restart_to_apply_changes);

    factory.quit();
    assert!(!factory.brick(sw1).unwrap().need_restart_to_apply_changes);
    assert_eq!(console.join().unwrap(), vec!["port/setnumports 16"]);
}
