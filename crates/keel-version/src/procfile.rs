//! Procfile parsing.
//!
//! One `name: command` pair per line. Each command is kept as a single
//! argument; the container runtime wraps it in a shell.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static PROCFILE_LINE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_-]+):\s*(.+)$").ok());

/// Parse a Procfile into `process name -> argv`.
///
/// Lines that do not match, or whose name or command is empty, are
/// skipped. A later line for the same name replaces the earlier one.
pub fn parse(content: &str) -> BTreeMap<String, Vec<String>> {
    let mut processes = BTreeMap::new();
    let Some(re) = PROCFILE_LINE.as_ref() else {
        return processes;
    };
    for line in content.split('\n') {
        let line = line.trim_end_matches('\r').trim_end();
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let name = caps.get(1).map_or("", |m| m.as_str());
        let command = caps.get(2).map_or("", |m| m.as_str().trim());
        if name.is_empty() || command.is_empty() {
            continue;
        }
        processes.insert(name.to_string(), vec![command.to_string()]);
    }
    processes
}

/// Render `processes` back into Procfile text, one line per process.
pub fn render(processes: &BTreeMap<String, Vec<String>>) -> String {
    let mut out = String::new();
    for (name, argv) in processes {
        let command = argv.join(" ");
        if command.trim().is_empty() {
            continue;
        }
        out.push_str(name);
        out.push_str(": ");
        out.push_str(&command);
        out.push('\n');
    }
    out
}
