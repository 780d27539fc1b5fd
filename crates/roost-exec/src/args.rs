//! Command line of a spawned process.

use std::borrow::Cow;

use roost_model::{
    ARG_ASSIGNED_PORT, ARG_MACHINE_IP, ARG_MASTER_IP, ARG_MASTER_PORT, ARG_SPAWN_CODE,
    ARG_SPAWN_ID, OPT_EXECUTABLE, Properties, RESERVED_ARGS, SpawnTaskId,
};
use tracing::debug;

/// Where the process must report and what it is.
#[derive(Debug, Clone)]
pub struct LaunchIdentity<'a> {
    pub master_ip: &'a str,
    pub master_port: u16,
    pub assigned_port: u16,
    pub machine_ip: &'a str,
    pub spawn_id: SpawnTaskId,
    pub unique_code: &'a str,
}

/// Ordered `--key value` arguments: identity first, then caller options, then extras.
#[derive(Debug, Clone, Default)]
pub struct LaunchArgs {
    args: Vec<String>,
}

impl LaunchArgs {
    pub fn new(id: &LaunchIdentity<'_>) -> Self {
        let mut out = Self::default();
        out.push(ARG_MASTER_IP, id.master_ip);
        out.push(ARG_MASTER_PORT, &id.master_port.to_string());
        out.push(ARG_ASSIGNED_PORT, &id.assigned_port.to_string());
        out.push(ARG_MACHINE_IP, id.machine_ip);
        out.push(ARG_SPAWN_ID, &id.spawn_id.to_string());
        out.push(ARG_SPAWN_CODE, id.unique_code);
        out
    }

    /// Append every option as `--<key> <value>`.
    ///
    /// Reserved keys and the `executable` option are skipped.
    pub fn with_options(mut self, options: &Properties) -> Self {
        for (key, value) in options.iter() {
            let key = key.trim_start_matches('-');
            if key.is_empty() || key == OPT_EXECUTABLE {
                continue;
            }
            let flag = format!("--{key}");
            if RESERVED_ARGS.contains(&flag.as_str()) {
                debug!(target: "roost.exec", flag = %flag, "reserved option ignored");
                continue;
            }
            self.args.push(flag);
            self.args.push(value.to_string());
        }
        self
    }

    pub fn with_extra(mut self, extra: &[String]) -> Self {
        self.args.extend(extra.iter().cloned());
        self
    }

    fn push(&mut self, key: &str, value: &str) {
        self.args.push(key.to_string());
        self.args.push(value.to_string());
    }

    pub fn as_slice(&self) -> &[String] {
        &self.args
    }

    /// The arguments as one string, each one quoted for a POSIX shell.
    pub fn display(&self) -> String {
        self.args
            .iter()
            .map(|a| shell_quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ',' | '+' | '%')
}

/// Quote `s` for a POSIX shell; safe strings are returned unchanged.
pub fn shell_quote(s: &str) -> Cow<'_, str> {
    if !s.is_empty() && s.chars().all(is_shell_safe) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(format!("'{}'", s.replace('\'', r"'\''")))
}
