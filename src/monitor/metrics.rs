//! Prometheus exposition text parsing.

use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

use super::{normalize_url, MonitorEntry, MonitorSnapshot};

/// Parse a `/metrics` body into a monitor snapshot.
///
/// Only labelled series are considered. Series are grouped per monitor by
/// normalized URL, else lowercased name, else monitor id (or ordinal).
/// Only `monitor_status` contributes a value.
pub fn parse_metrics(text: &str) -> MonitorSnapshot {
    static LINE: OnceLock<Regex> = OnceLock::new();
    let line_re = LINE.get_or_init(|| {
        Regex::new(r"^(?P<metric>[a-zA-Z_:0-9]+)\{(?P<labels>[^}]*)\}\s+(?P<value>[-+0-9.eE]+)")
            .unwrap()
    });

    let mut entries: Vec<MonitorEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for line in text.lines() {
        let Some(caps) = line_re.captures(line) else {
            continue;
        };
        let Ok(value) = caps["value"].parse::<f64>() else {
            continue;
        };
        let labels = parse_labels(&caps["labels"]);

        let name = labels.get("monitor_name").cloned();
        let raw_url = labels.get("monitor_url").cloned();
        let normalized_url = raw_url.as_deref().and_then(normalize_url);
        let monitor_id = labels
            .get("monitor_id")
            .filter(|id| !id.is_empty())
            .cloned()
            .unwrap_or_else(|| entries.len().to_string());

        let group_key = match (&normalized_url, &name) {
            (Some(url), _) => format!("url:{}", url),
            (None, Some(name)) => format!("name:{}", name.to_lowercase()),
            (None, None) => format!("id:{}", monitor_id),
        };

        let slot = *index.entry(group_key).or_insert_with(|| {
            entries.push(MonitorEntry {
                name,
                raw_url,
                normalized_url,
                monitor_id,
                status_code: None,
            });
            entries.len() - 1
        });

        if &caps["metric"] == "monitor_status" {
            entries[slot].status_code = Some(value.trunc() as i64);
        }
    }

    MonitorSnapshot::from_entries(entries)
}

fn parse_labels(s: &str) -> HashMap<String, String> {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    let label_re = LABEL.get_or_init(|| Regex::new(r#"(\w+)="([^"\\]*)""#).unwrap());

    label_re
        .captures_iter(s)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}
