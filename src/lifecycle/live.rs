//! Live parameter changes for running bricks.
//!
//! Some parameters can be pushed to a running process over its management
//! console instead of waiting for a restart. This maps a changed key to the
//! console command that applies it.

use crate::brick::BrickKind;
use crate::config_bag::is_truthy;

/// Wirefilter parameters accepted on the management console
const WIREFILTER_LIVE: &[&str] = &[
    "loss",
    "speed",
    "noise",
    "bandwidth",
    "delay",
    "dup",
    "mtu",
    "lostburst",
    "chanbufsize",
];

/// Console command applying `key=value` to a running brick, if one exists
pub fn live_command(kind: BrickKind, key: &str, value: &str) -> Option<String> {
    match kind {
        BrickKind::Switch => switch_command(key, value),
        BrickKind::Wirefilter => wirefilter_command(key, value),
        _ => None,
    }
}

fn switch_command(key: &str, value: &str) -> Option<String> {
    let flag = if is_truthy(value) { 1 } else { 0 };
    match key {
        "fstp" => Some(format!("fstp/setfstp {}\n", flag)),
        "hub" => Some(format!("port/sethub {}\n", flag)),
        "numports" if !value.is_empty() => Some(format!("port/setnumports {}\n", value)),
        _ => None,
    }
}

fn wirefilter_command(key: &str, value: &str) -> Option<String> {
    if value.is_empty() {
        return None;
    }
    let (base, direction) = match key.strip_suffix("LR") {
        Some(base) => (base, Some("LR")),
        None => match key.strip_suffix("RL") {
            Some(base) => (base, Some("RL")),
            None => (key, None),
        },
    };
    // Older projects call the channel buffer "capacity"
    let base = match base {
        "capacity" => "chanbufsize",
        other => other,
    };
    if !WIREFILTER_LIVE.contains(&base) {
        return None;
    }

    Some(match direction {
        Some(dir) => format!("{} {} {}\n", base, dir, value),
        None => format!("{} {}\n", base, value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_switch_callbacks() {
        assert_eq!(
            live_command(BrickKind::Switch, "fstp", "*").as_deref(),
            Some("fstp/setfstp 1\n")
        );
        assert_eq!(
            live_command(BrickKind::Switch, "hub", "").as_deref(),
            Some("port/sethub 0\n")
        );
        assert_eq!(
            live_command(BrickKind::Switch, "numports", "16").as_deref(),
            Some("port/setnumports 16\n")
        );
        assert_eq!(live_command(BrickKind::Switch, "macaddr", "x"), None);
    }

    #[test]
    fn test_wirefilter_callbacks() {
        assert_eq!(
            live_command(BrickKind::Wirefilter, "lossLR", "10").as_deref(),
            Some("loss LR 10\n")
        );
        assert_eq!(
            live_command(BrickKind::Wirefilter, "delay", "5").as_deref(),
            Some("delay 5\n")
        );
        assert_eq!(
            live_command(BrickKind::Wirefilter, "capacityRL", "100").as_deref(),
            Some("chanbufsize RL 100\n")
        );
        assert_eq!(live_command(BrickKind::Wirefilter, "sock0", "/x"), None);
        assert_eq!(live_command(BrickKind::Wirefilter, "lossLR", ""), None);
    }

    #[test]
    fn test_other_kinds_have_no_callbacks() {
        assert_eq!(live_command(BrickKind::VirtualMachine, "ram", "128"), None);
        assert_eq!(live_command(BrickKind::Tap, "ip", "10.0.0.2"), None);
    }
}
