//! Parsers for `systemctl` and `uptime` output
//!
//! All functions here are pure and total: text that does not match leaves the
//! corresponding fields at their zero values. The patterns follow the current
//! systemd and procps output formats and will need updating if those change.

use crate::pipeline::StepError;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static UPTIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"up (.+?),\s+([0-9]+) users?").expect("uptime pattern is valid"));

static ACTIVE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Active: (\S+) \(([^)]+)\) since ([^;]+);").expect("active pattern is valid")
});

static PID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Main PID: (\d+)").expect("pid pattern is valid"));

static MEMORY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Memory: (.+)").expect("memory pattern is valid"));

static CPU_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"CPU: (.+)").expect("cpu pattern is valid"));

/// Layout of the `since` timestamp without its zone suffix
const SINCE_FORMAT: &str = "%a %Y-%m-%d %H:%M:%S";

/// Host uptime as reported by `uptime`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UptimeInfo {
    /// Uptime text, e.g. `5 days,  3:04`
    pub uptime: String,
    /// Logged-in users
    pub users: u32,
    /// 1, 5 and 15 minute load averages
    pub load_averages: [String; 3],
}

/// Parsed state of a systemd unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct ServiceStatus {
    /// Active state, e.g. `active` or `failed`
    pub status: String,
    /// Sub-state, e.g. `running` or `dead`
    pub sub_state: String,
    /// When the unit entered its current state
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub running_since: Option<DateTime<Utc>>,
    /// Human-readable time since `running_since`
    pub uptime: String,
    /// Main process id
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub pid: Option<u32>,
    /// Memory usage text
    pub memory: String,
    /// CPU time text
    pub cpu: String,
    /// Enabled at boot
    pub is_enabled: bool,
    /// Active state is `active`
    pub is_active: bool,
    /// Active state is `failed`
    pub is_failed: bool,
    /// Value of `NRestarts`
    pub restart_count: u32,
}

/// Parses the output of `uptime`
///
/// ```rust
/// use buildstep::executor::parse_uptime;
///
/// let info = parse_uptime(" 10:00:00 up 5 days,  3:04,  2 users,  load average: 0.00, 0.01, 0.05");
/// assert_eq!(info.users, 2);
/// assert_eq!(info.load_averages[2], "0.05");
/// ```
#[must_use]
pub fn parse_uptime(text: &str) -> UptimeInfo {
    let mut info = UptimeInfo::default();

    if let Some(caps) = UPTIME_PATTERN.captures(text) {
        info.uptime = caps[1].trim().to_string();
        info.users = caps[2].parse().unwrap_or_default();
    }

    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() >= 11 {
        for (slot, field) in info.load_averages.iter_mut().zip(&fields[fields.len() - 3..]) {
            *slot = field.trim_end_matches(',').to_string();
        }
    }

    info
}

/// Parses `systemctl status` output relative to the current time
#[must_use]
pub fn parse_systemd_status(text: &str) -> ServiceStatus {
    parse_systemd_status_at(text, Utc::now())
}

/// Parses `systemctl status` output, computing uptime relative to `now`
#[must_use]
pub fn parse_systemd_status_at(text: &str, now: DateTime<Utc>) -> ServiceStatus {
    let mut status = ServiceStatus::default();

    if let Some(caps) = ACTIVE_PATTERN.captures(text) {
        status.status = caps[1].to_string();
        status.sub_state = caps[2].to_string();
        status.is_active = status.status == "active";
        status.is_failed = status.status == "failed";
        status.running_since = parse_since(&caps[3]);
        if let Some(since) = status.running_since {
            status.uptime = humanize_since(since, now);
        }
    }
    if let Some(caps) = PID_PATTERN.captures(text) {
        status.pid = caps[1].parse().ok();
    }
    if let Some(caps) = MEMORY_PATTERN.captures(text) {
        status.memory = caps[1].trim().to_string();
    }
    if let Some(caps) = CPU_PATTERN.captures(text) {
        status.cpu = caps[1].trim().to_string();
    }

    status
}

/// Parses `systemctl show -p NRestarts <unit>` output
///
/// # Errors
///
/// Returns [`StepError::MalformedOutput`] unless the text is exactly one
/// `key=value` pair with an unsigned integer value.
pub fn parse_restart_count(text: &str) -> Result<u32, StepError> {
    let parts: Vec<&str> = text.trim().split('=').collect();
    let [_, value] = parts.as_slice() else {
        return Err(StepError::MalformedOutput(format!(
            "expected key=value, got '{}'",
            text.trim()
        )));
    };
    value
        .trim()
        .parse()
        .map_err(|_| StepError::MalformedOutput(format!("restart count '{value}' is not a number")))
}

/// Reads `systemctl is-enabled` output
#[must_use]
pub fn parse_is_enabled(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case("enabled")
}

/// Formats the distance between two instants, e.g. `3 hours ago`
#[must_use]
pub fn humanize_since(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now.signed_duration_since(then);
    let (future, delta) = if delta < ChronoDuration::zero() {
        (true, -delta)
    } else {
        (false, delta)
    };

    let (count, unit) = if delta < ChronoDuration::minutes(1) {
        return "just now".to_string();
    } else if delta < ChronoDuration::hours(1) {
        (delta.num_minutes(), "minute")
    } else if delta < ChronoDuration::days(1) {
        (delta.num_hours(), "hour")
    } else if delta < ChronoDuration::weeks(1) {
        (delta.num_days(), "day")
    } else if delta < ChronoDuration::days(30) {
        (delta.num_weeks(), "week")
    } else if delta < ChronoDuration::days(365) {
        (delta.num_days() / 30, "month")
    } else {
        (delta.num_days() / 365, "year")
    };

    let plural = if count == 1 { "" } else { "s" };
    if future {
        format!("in {count} {unit}{plural}")
    } else {
        format!("{count} {unit}{plural} ago")
    }
}

/// Parses `Mon 2024-01-01 00:00:00 UTC` into a UTC instant
fn parse_since(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let (stamp, zone) = raw.rsplit_once(' ')?;
    let naive = NaiveDateTime::parse_from_str(stamp, SINCE_FORMAT).ok()?;
    let offset = FixedOffset::east_opt(zone_offset_seconds(zone))?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Offset of a zone abbreviation or numeric suffix; unknown zones read as UTC
fn zone_offset_seconds(zone: &str) -> i32 {
    const HOUR: i32 = 3600;
    if let Some(offset) = numeric_offset(zone) {
        return offset;
    }
    match zone.to_ascii_uppercase().as_str() {
        "BST" | "CET" | "WAT" | "WEST" => HOUR,
        "CEST" | "EET" | "SAST" => 2 * HOUR,
        "EEST" | "MSK" | "EAT" => 3 * HOUR,
        "IST" => 5 * HOUR + 30 * 60,
        "HKT" | "SGT" | "AWST" => 8 * HOUR,
        "JST" | "KST" => 9 * HOUR,
        "ACST" => 9 * HOUR + 30 * 60,
        "AEST" => 10 * HOUR,
        "ACDT" => 10 * HOUR + 30 * 60,
        "AEDT" => 11 * HOUR,
        "NZST" => 12 * HOUR,
        "NZDT" => 13 * HOUR,
        "ADT" => -3 * HOUR,
        "AST" | "EDT" => -4 * HOUR,
        "EST" | "CDT" => -5 * HOUR,
        "CST" | "MDT" => -6 * HOUR,
        "MST" | "PDT" => -7 * HOUR,
        "PST" | "AKDT" => -8 * HOUR,
        "AKST" => -9 * HOUR,
        "HST" => -10 * HOUR,
        _ => 0,
    }
}

/// Reads `+03`, `-0530` or `+05:30`
fn numeric_offset(zone: &str) -> Option<i32> {
    let sign = match zone.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits: String = zone[1..].chars().filter(|c| *c != ':').collect();
    if digits.is_empty() || digits.len() > 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = if digits.len() > 2 {
        digits.split_at(2)
    } else {
        (digits.as_str(), "0")
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    Some(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NGINX_STATUS: &str = "\
● nginx.service - A high performance web server
     Loaded: loaded (/lib/systemd/system/nginx.service; enabled; vendor preset: enabled)
     Active: active (running) since Mon 2024-01-01 00:00:00 UTC; 2h ago
       Docs: man:nginx(8)
   Main PID: 1234 (nginx)
      Tasks: 3 (limit: 4915)
     Memory: 5.2M
        CPU: 120ms
     CGroup: /system.slice/nginx.service";

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_active_service() {
        let status = parse_systemd_status_at(NGINX_STATUS, utc(2024, 1, 1, 2, 0, 0));
        assert_eq!(status.status, "active");
        assert_eq!(status.sub_state, "running");
        assert!(status.is_active);
        assert!(!status.is_failed);
        assert_eq!(status.running_since, Some(utc(2024, 1, 1, 0, 0, 0)));
        assert_eq!(status.uptime, "2 hours ago");
        assert_eq!(status.pid, Some(1234));
        assert_eq!(status.memory, "5.2M");
        assert_eq!(status.cpu, "120ms");
    }

    #[test]
    fn test_parse_failed_service() {
        let text = "   Active: failed (Result: exit-code) since Tue 2024-01-02 10:00:00 CET; 1min ago";
        let status = parse_systemd_status_at(text, utc(2024, 1, 2, 9, 1, 0));
        assert!(status.is_failed);
        assert!(!status.is_active);
        assert_eq!(status.sub_state, "Result: exit-code");
        assert_eq!(status.running_since, Some(utc(2024, 1, 2, 9, 0, 0)));
        assert_eq!(status.uptime, "1 minute ago");
        assert_eq!(status.pid, None);
    }

    #[test]
    fn test_unknown_zone_reads_as_utc() {
        let text = "Active: active (running) since Mon 2024-01-01 00:00:00 XYZT; 1h ago";
        let status = parse_systemd_status_at(text, utc(2024, 1, 1, 1, 0, 0));
        assert_eq!(status.running_since, Some(utc(2024, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_numeric_zone_suffix() {
        let text = "Active: active (running) since Mon 2024-01-01 03:00:00 +03; 1h ago";
        let status = parse_systemd_status_at(text, utc(2024, 1, 1, 1, 0, 0));
        assert_eq!(status.running_since, Some(utc(2024, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_unparsable_timestamp_keeps_state() {
        let text = "Active: active (running) since yesterday-ish; 1h ago";
        let status = parse_systemd_status(text);
        assert!(status.is_active);
        assert_eq!(status.running_since, None);
        assert_eq!(status.uptime, "");
    }

    #[test]
    fn test_inactive_service_has_no_since() {
        let text = "   Active: inactive (dead)\n   Memory: 0B";
        let status = parse_systemd_status(text);
        assert_eq!(status.status, "");
        assert_eq!(status.memory, "0B");
    }

    #[test]
    fn test_empty_status_text() {
        assert_eq!(parse_systemd_status(""), ServiceStatus::default());
    }

    #[test]
    fn test_restart_count() {
        assert_eq!(parse_restart_count("NRestarts=3\n").unwrap(), 3);
    }

    #[test]
    fn test_restart_count_malformed() {
        assert!(matches!(
            parse_restart_count("garbage"),
            Err(StepError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_restart_count("a=b=c"),
            Err(StepError::MalformedOutput(_))
        ));
        assert!(matches!(
            parse_restart_count("NRestarts=many"),
            Err(StepError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_is_enabled() {
        assert!(parse_is_enabled(" Enabled\n"));
        assert!(!parse_is_enabled("disabled"));
        assert!(!parse_is_enabled("enabled-runtime"));
    }

    #[test]
    fn test_parse_uptime_days() {
        let info = parse_uptime(
            " 10:00:00 up 5 days,  3:04,  2 users,  load average: 0.00, 0.01, 0.05\n",
        );
        assert_eq!(info.uptime, "5 days,  3:04");
        assert_eq!(info.users, 2);
        assert_eq!(info.load_averages, ["0.00", "0.01", "0.05"].map(String::from));
    }

    #[test]
    fn test_parse_uptime_single_user() {
        let info = parse_uptime("10:00:00 up 3 min, 1 user, load average: 0.10, 0.20, 0.30");
        assert_eq!(info.uptime, "3 min");
        assert_eq!(info.users, 1);
        assert_eq!(info.load_averages[0], "0.10");
    }

    #[test]
    fn test_parse_uptime_garbage() {
        assert_eq!(parse_uptime("not uptime"), UptimeInfo::default());
    }

    #[test]
    fn test_humanize_since() {
        let now = utc(2024, 6, 1, 12, 0, 0);
        assert_eq!(humanize_since(now, now), "just now");
        assert_eq!(humanize_since(utc(2024, 6, 1, 11, 55, 0), now), "5 minutes ago");
        assert_eq!(humanize_since(utc(2024, 6, 1, 11, 0, 0), now), "1 hour ago");
        assert_eq!(humanize_since(utc(2024, 5, 29, 12, 0, 0), now), "3 days ago");
        assert_eq!(humanize_since(utc(2024, 5, 18, 12, 0, 0), now), "2 weeks ago");
        assert_eq!(humanize_since(utc(2024, 2, 1, 12, 0, 0), now), "4 months ago");
        assert_eq!(humanize_since(utc(2022, 6, 1, 12, 0, 0), now), "2 years ago");
        assert_eq!(humanize_since(utc(2024, 6, 1, 14, 0, 0), now), "in 2 hours");
    }

    #[test]
    fn test_status_json_field_names() {
        let status = parse_systemd_status_at(NGINX_STATUS, utc(2024, 1, 1, 2, 0, 0));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["isActive"], true);
        assert_eq!(json["restartCount"], 0);
        assert_eq!(json["subState"], "running");
    }
}
