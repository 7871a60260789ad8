//! Wirefilter argument vector.

use super::build_cmd_line;
use crate::brick::Brick;
use crate::settings::Settings;

/// Shaping parameters with a per-direction form, in emission order
const DIRECTIONAL: &[(&str, &str)] = &[
    ("delay", "-d"),
    ("loss", "-l"),
    ("dup", "-D"),
    ("speed", "-s"),
    ("bandwidth", "-b"),
    ("chanbufsize", "-c"),
    ("noise", "-n"),
    ("mtu", "-m"),
    ("lostburst", "-L"),
];

/// Parameters whose value carries a unit and a distribution suffix
const WITH_UNIT: &[&str] = &["speed", "bandwidth"];

pub fn args(brick: &Brick, settings: &Settings, prog: String) -> Vec<String> {
    let cfg = &brick.cfg;
    let mut res = vec![
        prog,
        "-v".to_string(),
        format!("{}:{}", cfg.get_string("sock0"), cfg.get_string("sock1")),
    ];

    for (param, switch) in DIRECTIONAL {
        for dir in ["LR", "RL"] {
            let key = format!("{}{}", param, dir);
            let value = cfg.get_string(&key);
            if value.is_empty() {
                continue;
            }
            let mut arg = format!("{}{}", dir, value);
            if WITH_UNIT.contains(param) {
                arg.push_str(&cfg.get_string(&format!("{}unit", key)));
                arg.push_str(&cfg.get_string(&format!("{}distribution", key)));
            }
            res.push(switch.to_string());
            res.push(arg);
        }
    }

    res.extend(build_cmd_line(brick, settings));
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brick::{BrickId, BrickKind};

    #[test]
    fn test_directional_then_base_switches() {
        let settings = Settings::with_workspace("/ws");
        let mut brick = Brick::new(BrickId(1), "wf", BrickKind::Wirefilter);
        brick.cfg.set_text("sock0", "/ws/a.ctl");
        brick.cfg.set_text("sock1", "/ws/b.ctl");
        brick.cfg.set_text("delayLR", "10");
        brick.cfg.set_text("speedRL", "100");
        brick.cfg.set_text("speedRLunit", "K");
        brick.cfg.set_text("loss", "5");

        assert_eq!(
            args(&brick, &settings, "/usr/bin/wirefilter".to_string()),
            vec![
                "/usr/bin/wirefilter",
                "-v",
                "/ws/a.ctl:/ws/b.ctl",
                "-d",
                "LR10",
                "-s",
                "RL100K",
                "-l",
                "5",
                "-M",
                "/ws/wf.mgmt",
            ]
        );
    }
}
