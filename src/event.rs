//! Timed events.
//!
//! An event holds a delay and an ordered list of actions. Powering it on arms
//! a deadline; the factory fires due events from its control loop, running
//! topology actions through its command dispatcher and shell actions through
//! `sh -c`.

use crate::config_bag::ConfigBag;
use crate::errors::{BrickError, Result};
use log::info;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Keyword introducing a topology action
pub const INTERNAL_KEYWORD: &str = "add";
/// Keyword introducing a host shell action
pub const EXTERNAL_KEYWORD: &str = "addsh";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    /// Command for the engine itself (`new switch sw`, `vm1 on`, ...)
    Internal,
    /// Command line run by the host shell
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub kind: ActionKind,
    pub text: String,
}

impl Action {
    pub fn internal(text: &str) -> Self {
        Self {
            kind: ActionKind::Internal,
            text: text.to_string(),
        }
    }

    pub fn external(text: &str) -> Self {
        Self {
            kind: ActionKind::External,
            text: text.to_string(),
        }
    }

    fn keyword(&self) -> &'static str {
        match self.kind {
            ActionKind::Internal => INTERNAL_KEYWORD,
            ActionKind::External => EXTERNAL_KEYWORD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventState {
    Running,
    Unconfigured,
    Off,
}

#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub cfg: ConfigBag,
    pub actions: Vec<Action>,
    pub active: bool,
    armed_at: Option<Instant>,
    pub dirty: bool,
}

impl Event {
    pub fn new(name: &str) -> Self {
        let mut cfg = ConfigBag::new();
        cfg.set_text("delay", "0");
        Self {
            name: name.to_string(),
            cfg,
            actions: Vec::new(),
            active: false,
            armed_at: None,
            dirty: true,
        }
    }

    /// Delay between power-on and firing; an unparsable value counts as zero
    pub fn delay(&self) -> Duration {
        parse_delay(&self.cfg.get_string("delay")).unwrap_or(Duration::ZERO)
    }

    pub fn configured(&self) -> bool {
        !self.actions.is_empty() && !self.delay().is_zero()
    }

    pub fn state(&self) -> EventState {
        if self.active {
            EventState::Running
        } else if !self.configured() {
            EventState::Unconfigured
        } else {
            EventState::Off
        }
    }

    /// Apply configuration tokens.
    ///
    /// Tokens are either `key=value` assignments, or action groups each
    /// introduced by an `add` (topology) or `addsh` (shell) token. Both
    /// action keywords in one call is an `InvalidAction` error and leaves the
    /// event untouched.
    pub fn configure<S: AsRef<str>>(&mut self, tokens: &[S]) -> Result<()> {
        let tokens: Vec<&str> = tokens.iter().map(AsRef::as_ref).collect();
        let has_internal = tokens.contains(&INTERNAL_KEYWORD);
        let has_external = tokens.contains(&EXTERNAL_KEYWORD);

        if has_internal && has_external {
            return Err(BrickError::InvalidAction(
                "config line must contain add OR addsh".to_string(),
            ));
        }

        if has_internal || has_external {
            let mut current: Option<(ActionKind, Vec<&str>)> = None;
            let mut parsed = Vec::new();
            for token in tokens {
                let kind = match token {
                    INTERNAL_KEYWORD => Some(ActionKind::Internal),
                    EXTERNAL_KEYWORD => Some(ActionKind::External),
                    _ => None,
                };
                match (kind, current.as_mut()) {
                    (Some(kind), _) => {
                        if let Some(done) = current.take() {
                            parsed.push(done);
                        }
                        current = Some((kind, Vec::new()));
                    }
                    (None, Some((_, words))) => words.push(token),
                    // Words before the first keyword carry no action
                    (None, None) => {}
                }
            }
            parsed.extend(current);

            for (kind, words) in parsed {
                let text = words.join(" ");
                if text.is_empty() {
                    continue;
                }
                match kind {
                    ActionKind::Internal => info!("Event {}: added vb-shell command '{}'", self.name, text),
                    ActionKind::External => info!("Event {}: added host-shell command '{}'", self.name, text),
                }
                self.actions.push(Action { kind, text });
            }
        } else {
            for token in tokens {
                self.cfg.set(token);
            }
        }

        self.dirty = true;
        Ok(())
    }

    /// Human-readable parameters
    pub fn describe(&self) -> String {
        let mut text = format!("Delay: {}", self.delay().as_secs_f64());
        if !self.actions.is_empty() {
            let list: Vec<String> = self
                .actions
                .iter()
                .map(|a| match a.kind {
                    ActionKind::External => format!("\"*{}\"", a.text),
                    ActionKind::Internal => format!("\"{}\"", a.text),
                })
                .collect();
            text.push_str("; Actions: ");
            text.push_str(&list.join(", "));
        }
        text
    }

    /// Arm the event; an already armed event restarts its countdown
    pub fn poweron(&mut self, now: Instant) -> Result<()> {
        if !self.configured() {
            return Err(BrickError::BadConfig(self.name.clone()));
        }
        if self.active {
            info!("Event {} re-armed", self.name);
        }
        self.armed_at = Some(now);
        self.active = true;
        self.dirty = true;
        Ok(())
    }

    pub fn poweroff(&mut self) {
        if !self.active {
            return;
        }
        self.armed_at = None;
        self.active = false;
        self.dirty = true;
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.armed_at {
            Some(armed) => self.active && now.duration_since(armed) >= self.delay(),
            None => false,
        }
    }

    /// Disarm and hand out the actions to run
    pub(crate) fn take_due_actions(&mut self) -> Vec<Action> {
        self.armed_at = None;
        self.active = false;
        self.dirty = true;
        self.actions.clone()
    }

    /// Actions in their persisted form: `['add new switch sw', 'addsh touch /tmp/x']`
    pub fn actions_to_string(&self) -> String {
        let items: Vec<String> = self
            .actions
            .iter()
            .map(|a| {
                let text = format!("{} {}", a.keyword(), a.text);
                format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
            })
            .collect();
        format!("[{}]", items.join(", "))
    }
}

/// Parse the persisted action list back into per-action token lists.
///
/// Returns `None` when the text is not a bracketed list of quoted strings.
pub fn parse_action_list(text: &str) -> Option<Vec<String>> {
    let inner = text.trim().strip_prefix('[')?.strip_suffix(']')?;
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let quote = match chars.next() {
            None => break,
            Some(q @ ('\'' | '"')) => q,
            Some(_) => return None,
        };
        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => item.push(chars.next()?),
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);
    }
    Some(items)
}

/// Parse a delay: plain (possibly fractional) seconds such as `5` or `0.5`,
/// or a duration with units such as `2m` or `1h 30m`.
///
/// Negative, non-finite and out-of-range values are invalid.
pub fn parse_delay(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.parse::<f64>() {
        Ok(secs) => Duration::try_from_secs_f64(secs).ok(),
        Err(_) => humantime::parse_duration(text).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_delay_and_actions() {
        let mut event = Event::new("ev");
        assert!(!event.configured());
        event.configure(&["delay=5"]).unwrap();
        event
            .configure(&["add", "new", "switch", "sw", "add", "sw", "on"])
            .unwrap();
        assert_eq!(event.delay(), Duration::from_secs(5));
        assert_eq!(
            event.actions,
            vec![Action::internal("new switch sw"), Action::internal("sw on")]
        );
        assert!(event.configured());
    }

    #[test]
    fn test_mixed_actions_rejected() {
        let mut event = Event::new("ev");
        let err = event
            .configure(&["add", "sw", "on", "addsh", "touch", "/tmp/x"])
            .unwrap_err();
        assert!(matches!(err, BrickError::InvalidAction(_)));
        assert!(event.actions.is_empty());
    }

    #[test]
    fn test_shell_action_keeps_words_containing_keyword() {
        let mut event = Event::new("ev");
        event
            .configure(&["addsh", "useradd", "bob", "addsh", "touch", "/tmp/address"])
            .unwrap();
        assert_eq!(
            event.actions,
            vec![
                Action::external("useradd bob"),
                Action::external("touch /tmp/address")
            ]
        );
    }

    #[test]
    fn test_action_list_round_trip() {
        let mut event = Event::new("ev");
        event.actions.push(Action::internal("new switch sw"));
        event.actions.push(Action::external("echo 'hi' > /tmp/o"));
        let text = event.actions_to_string();
        assert_eq!(text, r"['add new switch sw', 'addsh echo \'hi\' > /tmp/o']");

        let items = parse_action_list(&text).unwrap();
        assert_eq!(items, vec!["add new switch sw", "addsh echo 'hi' > /tmp/o"]);
        assert_eq!(parse_action_list("[]"), Some(vec![]));
        assert_eq!(parse_action_list("not a list"), None);
    }

    #[test]
    fn test_parse_delay() {
        assert_eq!(parse_delay("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_delay("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_delay("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_delay("abc"), None);
        assert_eq!(parse_delay("5x"), None);
        assert_eq!(parse_delay("0.5"), Some(Duration::from_millis(500)));
        assert_eq!(parse_delay("1h 30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_delay("-3"), None);
        assert_eq!(parse_delay("inf"), None);
    }

    #[test]
    fn test_out_of_range_delay_is_invalid() {
        assert_eq!(parse_delay("99999999999999999h"), None);
        assert_eq!(parse_delay("1e300"), None);

        let mut event = Event::new("ev");
        event.configure(&["delay=99999999999999999h"]).unwrap();
        event.configure(&["addsh", "true"]).unwrap();
        assert_eq!(event.delay(), Duration::ZERO);
        assert!(!event.configured());
        assert_eq!(event.state(), EventState::Unconfigured);
        assert!(event.describe().starts_with("Delay: 0"));
        assert!(!event.is_due(Instant::now()));
    }

    #[test]
    fn test_fractional_delay_configures_event() {
        let mut event = Event::new("ev");
        event.configure(&["delay=0.5"]).unwrap();
        event.configure(&["addsh", "true"]).unwrap();
        assert!(event.configured());
        assert_eq!(event.delay(), Duration::from_millis(500));
        assert!(event.describe().starts_with("Delay: 0.5"));
    }

    #[test]
    fn test_arming_and_due() {
        let mut event = Event::new("ev");
        let now = Instant::now();
        assert!(matches!(event.poweron(now), Err(BrickError::BadConfig(_))));

        event.configure(&["delay=2"]).unwrap();
        event.configure(&["addsh", "true"]).unwrap();
        event.poweron(now).unwrap();
        assert_eq!(event.state(), EventState::Running);
        assert!(!event.is_due(now + Duration::from_secs(1)));
        assert!(event.is_due(now + Duration::from_secs(2)));

        let actions = event.take_due_actions();
        assert_eq!(actions.len(), 1);
        assert_eq!(event.state(), EventState::Off);
    }
}
