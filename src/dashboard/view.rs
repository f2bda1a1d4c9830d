//! Listing payload types.

use serde::Serialize;

use crate::monitor::{status_label, MonitorEntry};
use crate::probe::ServiceStatus;
use crate::registry::ServiceDescriptor;

/// Keys the listing sets itself; registry fields with these names are dropped.
const RESERVED_KEYS: [&str; 4] = ["status", "uptime", "display", "kuma_only"];

/// Monitor status as shown on a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UptimeSummary {
    pub code: i64,
    pub label: &'static str,
}

impl UptimeSummary {
    pub fn from_entry(entry: &MonitorEntry) -> Option<Self> {
        entry.status_code.map(|code| Self {
            code,
            label: status_label(code),
        })
    }
}

/// Badge text and colour for a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayStatus {
    pub label: &'static str,
    pub color: &'static str,
}

impl DisplayStatus {
    /// The monitor's verdict wins over the local status when present.
    pub fn derive(status: ServiceStatus, uptime: Option<&UptimeSummary>) -> Self {
        if let Some(uptime) = uptime {
            let color = match uptime.code {
                1 => "green",
                0 => "red",
                2 => "orange",
                3 => "blue",
                _ => "grey",
            };
            return Self {
                label: uptime.label,
                color,
            };
        }

        let (label, color) = match status {
            ServiceStatus::Running => ("RUNNING", "green"),
            ServiceStatus::Stopped => ("STOPPED", "red"),
            ServiceStatus::Missing => ("MISSING", "grey"),
            ServiceStatus::Unknown => ("UNKNOWN", "grey"),
        };
        Self { label, color }
    }
}

/// One card of the service listing: the registry record plus derived fields.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceView {
    #[serde(flatten)]
    pub service: ServiceDescriptor,
    pub status: ServiceStatus,
    pub uptime: Option<UptimeSummary>,
    pub display: DisplayStatus,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub kuma_only: bool,
}

impl ServiceView {
    pub fn new(mut service: ServiceDescriptor, status: ServiceStatus, uptime: Option<UptimeSummary>) -> Self {
        for key in RESERVED_KEYS {
            service.extra.remove(key);
        }
        let display = DisplayStatus::derive(status, uptime.as_ref());
        Self {
            service,
            status,
            uptime,
            display,
            kuma_only: false,
        }
    }

    /// Card for a monitor that no registry entry matched.
    pub fn monitor_only(entry: &MonitorEntry) -> Self {
        let service = ServiceDescriptor {
            name: Some(
                entry
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("kuma-{}", entry.monitor_id)),
            ),
            url: entry.raw_url.clone(),
            ..Default::default()
        };
        let mut view = Self::new(service, ServiceStatus::Unknown, UptimeSummary::from_entry(entry));
        view.kuma_only = true;
        view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uptime_overrides_local_status() {
        let up = UptimeSummary { code: 3, label: "MAINTENANCE" };
        assert_eq!(
            DisplayStatus::derive(ServiceStatus::Running, Some(&up)),
            DisplayStatus { label: "MAINTENANCE", color: "blue" }
        );
        assert_eq!(
            DisplayStatus::derive(ServiceStatus::Stopped, None),
            DisplayStatus { label: "STOPPED", color: "red" }
        );
        assert_eq!(DisplayStatus::derive(ServiceStatus::Missing, None).color, "grey");
    }

    #[test]
    fn test_view_serializes_flat() {
        let mut svc = ServiceDescriptor {
            name: Some("wiki".to_string()),
            url: Some("http://wiki.local".to_string()),
            compose: Some("wiki/docker-compose.yml".to_string()),
            ..Default::default()
        };
        svc.extra.insert("category".to_string(), json!("docs"));
        svc.extra.insert("status".to_string(), json!("bogus"));

        let value = serde_json::to_value(ServiceView::new(svc, ServiceStatus::Missing, None)).unwrap();
        assert_eq!(value["name"], "wiki");
        assert_eq!(value["category"], "docs");
        assert_eq!(value["status"], "missing");
        assert_eq!(value["uptime"], serde_json::Value::Null);
        assert_eq!(value["display"]["label"], "MISSING");
        assert!(value.get("kuma_only").is_none());
    }

    #[test]
    fn test_monitor_only_card() {
        let entry = MonitorEntry {
            name: None,
            raw_url: Some("http://nas.local/".to_string()),
            normalized_url: Some("http://nas.local".to_string()),
            monitor_id: "7".to_string(),
            status_code: Some(0),
        };
        let value = serde_json::to_value(ServiceView::monitor_only(&entry)).unwrap();
        assert_eq!(value["name"], "kuma-7");
        assert_eq!(value["url"], "http://nas.local/");
        assert_eq!(value["status"], "unknown");
        assert_eq!(value["uptime"], json!({"code": 0, "label": "DOWN"}));
        assert_eq!(value["kuma_only"], true);
        assert_eq!(value["icon"], serde_json::Value::Null);
    }
}
