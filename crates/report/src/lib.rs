use edge_core::{ConfigDocument, Device};
use serde_json::Value;
use std::io::{self, Write};

/// Where command output goes. Workflows take a sink instead of printing.
pub trait OutputSink {
    fn print_table(&mut self, title: &str, headers: &[&str], rows: &[Vec<String>]);
    fn print_panel(&mut self, title: &str, fields: &[(&str, String)]);
    fn print_message(&mut self, message: &str);
}

pub struct TerminalSink<W: Write> {
    out: W,
}

impl TerminalSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, text: &str) {
        if let Err(err) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            log::warn!("cannot write output: {err}");
        }
    }
}

impl<W: Write> OutputSink for TerminalSink<W> {
    fn print_table(&mut self, title: &str, headers: &[&str], rows: &[Vec<String>]) {
        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in rows {
            for (idx, cell) in row.iter().enumerate().take(widths.len()) {
                widths[idx] = widths[idx].max(cell.chars().count());
            }
        }
        let rule: String = widths
            .iter()
            .map(|w| format!("+{}", "-".repeat(w + 2)))
            .collect::<String>()
            + "+\n";
        let line = |cells: Vec<&str>| -> String {
            let mut out = String::new();
            for (idx, width) in widths.iter().enumerate() {
                let cell = cells.get(idx).copied().unwrap_or("");
                let pad = width - cell.chars().count().min(*width);
                out.push_str(&format!("| {}{} ", cell, " ".repeat(pad)));
            }
            out.push_str("|\n");
            out
        };

        let mut text = String::new();
        if !title.is_empty() {
            text.push_str(title);
            text.push('\n');
        }
        text.push_str(&rule);
        text.push_str(&line(headers.to_vec()));
        text.push_str(&rule);
        for row in rows {
            text.push_str(&line(row.iter().map(String::as_str).collect()));
        }
        if !rows.is_empty() {
            text.push_str(&rule);
        }
        self.emit(&text);
    }

    fn print_panel(&mut self, title: &str, fields: &[(&str, String)]) {
        let key_width = fields.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
        let mut text = format!("== {title} ==\n");
        for (key, value) in fields {
            text.push_str(&format!("  {key:<key_width$}  {value}\n"));
        }
        self.emit(&text);
    }

    fn print_message(&mut self, message: &str) {
        self.emit(&format!("{message}\n"));
    }
}

pub fn render_device(sink: &mut dyn OutputSink, device: &Device) {
    let projects = device.authorized_projects();
    let fields = [
        ("uuid", device.id.to_string()),
        ("name", device.name.clone()),
        (
            "machine",
            device.property_str("machine_name").unwrap_or("-").to_string(),
        ),
        (
            "contact",
            device.property_str("contact_email").unwrap_or("-").to_string(),
        ),
        (
            "authorized projects",
            if projects.is_empty() {
                "all".to_string()
            } else {
                projects.join(", ")
            },
        ),
        (
            "restriction reason",
            device
                .property_str("authorized_projects_reason")
                .unwrap_or("-")
                .to_string(),
        ),
        (
            "created",
            device.created_at.clone().unwrap_or_else(|| "-".to_string()),
        ),
    ];
    sink.print_panel(&format!("Device {}", device.name), &fields);

    let rows: Vec<Vec<String>> = device
        .workers
        .iter()
        .map(|worker| {
            vec![
                worker.worker_type.clone(),
                worker.state.to_string(),
                summarize_details(&worker.state_details),
            ]
        })
        .collect();
    sink.print_table("Workers", &["type", "state", "details"], &rows);
}

pub fn render_device_list(sink: &mut dyn OutputSink, devices: &[Device]) {
    let rows: Vec<Vec<String>> = devices
        .iter()
        .map(|device| {
            vec![
                device.name.clone(),
                device.id.to_string(),
                device.property_str("machine_name").unwrap_or("-").to_string(),
                device.property_str("contact_email").unwrap_or("-").to_string(),
            ]
        })
        .collect();
    sink.print_table("Devices", &["name", "uuid", "machine", "contact"], &rows);
}

pub fn render_config(sink: &mut dyn OutputSink, title: &str, config: &ConfigDocument) {
    let fields: Vec<(&str, String)> = config
        .iter()
        .map(|(key, value)| (key.as_str(), display_value(key, value)))
        .collect();
    sink.print_panel(title, &fields);
}

fn summarize_details(details: &serde_json::Map<String, Value>) -> String {
    details
        .iter()
        .map(|(key, value)| format!("{key}={}", display_value(key, value)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn display_value(key: &str, value: &Value) -> String {
    let lowered = key.to_ascii_lowercase();
    if lowered.contains("key") || lowered.contains("secret") {
        return "********".to_string();
    }
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
