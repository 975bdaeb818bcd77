//! Alert payload, mail transport interface and the dispatcher that owns the
//! mail session.

mod dispatcher;
mod session;
mod transport;

pub use dispatcher::{AlertDispatcher, DispatchOutcome, NoopMonitor, ResourceMonitor};
pub use session::{AlertSession, SessionState};
pub use transport::{AlertTransport, FailureReason, LoginStatus, TransportError, TransportResult};

use chrono::{DateTime, Utc};

use crate::geo::GeoCoordinate;

pub const ALERT_SUBJECT: &str = "Change in coordinates";
pub const DEFAULT_SENDER_NAME: &str = "ESP Vehicle";
pub const ALERT_CHARSET: &str = "us-ascii";

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";
const MAPS_DIRECTIONS_URL: &str = "https://www.google.com/maps/dir/?api=1&destination=";

/// Nine decimal places, the precision published to the store and used in links.
pub fn format_coordinate(value: f64) -> String {
    format!("{:.9}", value)
}

/// Search link that drops a pin on the position.
pub fn maps_link(position: &GeoCoordinate) -> String {
    format!(
        "{}{},{}",
        MAPS_SEARCH_URL,
        format_coordinate(position.latitude),
        format_coordinate(position.longitude)
    )
}

/// Directions link that routes to the position.
pub fn directions_link(position: &GeoCoordinate) -> String {
    format!(
        "{}{},{}",
        MAPS_DIRECTIONS_URL,
        format_coordinate(position.latitude),
        format_coordinate(position.longitude)
    )
}

/// Fixed sender and recipient of drift alerts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertAddressing {
    pub sender_name: String,
    pub sender_email: String,
    pub recipient_email: String,
}

impl AlertAddressing {
    pub fn new(sender_email: impl Into<String>, recipient_email: impl Into<String>) -> Self {
        Self {
            sender_name: DEFAULT_SENDER_NAME.to_string(),
            sender_email: sender_email.into(),
            recipient_email: recipient_email.into(),
        }
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = name.into();
        self
    }
}

/// Everything a drift alert reports.
#[derive(Debug, Clone)]
pub struct DriftReport<'a> {
    pub current: &'a GeoCoordinate,
    pub last_published: &'a GeoCoordinate,
    pub distance_meters: f64,
    pub maps_link: &'a str,
    pub directions_link: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub sender_name: String,
    pub sender_email: String,
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    pub fn drift(addressing: &AlertAddressing, report: &DriftReport<'_>) -> Self {
        let body = format!(
            "Current coordinates: {}, {}\n\
             Last published coordinates: {}, {}\n\
             Difference: {:.2} meters\n\
             Maps: {}\n\
             Directions: {}",
            format_coordinate(report.current.latitude),
            format_coordinate(report.current.longitude),
            format_coordinate(report.last_published.latitude),
            format_coordinate(report.last_published.longitude),
            report.distance_meters,
            report.maps_link,
            report.directions_link,
        );

        Self {
            sender_name: addressing.sender_name.clone(),
            sender_email: addressing.sender_email.clone(),
            recipient_email: addressing.recipient_email.clone(),
            subject: ALERT_SUBJECT.to_string(),
            body,
        }
    }

    /// Renders a plain-text RFC 5322 message restricted to 7-bit ASCII.
    pub fn to_rfc5322(&self, date: &DateTime<Utc>) -> String {
        let body = ascii_only(&self.body)
            .replace("\r\n", "\n")
            .replace('\n', "\r\n");

        format!(
            "From: \"{}\" <{}>\r\n\
             To: <{}>\r\n\
             Subject: {}\r\n\
             Date: {}\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: text/plain; charset=\"{}\"\r\n\
             Content-Transfer-Encoding: 7bit\r\n\
             \r\n\
             {}\r\n",
            header_value(&self.sender_name).replace('"', "'"),
            header_value(&self.sender_email),
            header_value(&self.recipient_email),
            header_value(&self.subject),
            date.to_rfc2822(),
            ALERT_CHARSET,
            body,
        )
    }
}

fn ascii_only(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii() { c } else { '?' })
        .collect()
}

fn header_value(value: &str) -> String {
    ascii_only(value)
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_links_use_nine_decimals() {
        let position = GeoCoordinate::new(40.0001, -74.0001);
        assert_eq!(
            maps_link(&position),
            "https://www.google.com/maps/search/?api=1&query=40.000100000,-74.000100000"
        );
        assert_eq!(
            directions_link(&position),
            "https://www.google.com/maps/dir/?api=1&destination=40.000100000,-74.000100000"
        );
    }

    #[test]
    fn test_drift_body_lists_both_positions() {
        let current = GeoCoordinate::new(40.0001, -74.0001);
        let last = GeoCoordinate::new(40.0, -74.0);
        let pin = maps_link(&current);
        let directions = directions_link(&current);
        let addressing = AlertAddressing::new("tracker@example.com", "owner@example.com");

        let message = AlertMessage::drift(
            &addressing,
            &DriftReport {
                current: &current,
                last_published: &last,
                distance_meters: 13.9,
                maps_link: &pin,
                directions_link: &directions,
            },
        );

        assert_eq!(message.subject, "Change in coordinates");
        assert_eq!(message.sender_name, "ESP Vehicle");
        assert!(message.body.contains("Current coordinates: 40.000100000, -74.000100000"));
        assert!(message.body.contains("Last published coordinates: 40.000000000, -74.000000000"));
        assert!(message.body.contains("Difference: 13.90 meters"));
        assert!(message.body.contains(&pin));
        assert!(message.body.contains(&directions));
    }

    #[test]
    fn test_rfc5322_is_seven_bit() {
        let message = AlertMessage {
            sender_name: "Fahrzeug \u{00fc}".to_string(),
            sender_email: "tracker@example.com".to_string(),
            recipient_email: "owner@example.com\r\nBcc: x@example.com".to_string(),
            subject: ALERT_SUBJECT.to_string(),
            body: "line one\nline two \u{2013} done".to_string(),
        };
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();

        let rendered = message.to_rfc5322(&date);

        assert!(rendered.is_ascii());
        assert!(rendered.contains("From: \"Fahrzeug ?\" <tracker@example.com>\r\n"));
        assert!(rendered.contains("To: <owner@example.comBcc: x@example.com>\r\n"));
        assert!(rendered.contains("charset=\"us-ascii\""));
        assert!(rendered.ends_with("line one\r\nline two ? done\r\n"));
        assert!(!rendered.contains("\r\nBcc:"));
    }
}
