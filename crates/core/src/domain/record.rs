// Call Detail Record (CDR) parsing

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Expected CSV header of a CDR file
pub const CSV_HEADER: &str = "caller_id,recipient,call_date,end_time,duration,cost,reference,currency";

const FIELD_COUNT: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordParseError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("invalid {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("empty record")]
    Empty,
}

/// One parsed call detail record
///
/// `reference` is the unique per-call key (32-char hex in the source data)
/// and is what makes record persistence idempotent on replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Empty caller ids occur in real exports; kept as None
    pub caller_id: Option<String>,
    pub recipient: String,
    pub call_date: NaiveDate,
    pub end_time: NaiveTime,
    pub duration_secs: i64,
    pub cost: f64,
    pub reference: String,
    pub currency: String,
}

/// Detect the CSV header line (files and every chunk carry one)
pub fn is_header(line: &str) -> bool {
    line.trim().eq_ignore_ascii_case(CSV_HEADER)
}

impl CallRecord {
    /// Parse one CSV line. A record either parses whole or is rejected;
    /// there is no partial record.
    pub fn parse_line(line: &str) -> Result<CallRecord, RecordParseError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Err(RecordParseError::Empty);
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != FIELD_COUNT {
            return Err(RecordParseError::FieldCount {
                expected: FIELD_COUNT,
                found: fields.len(),
            });
        }

        let caller_id = if fields[0].is_empty() {
            None
        } else {
            Some(fields[0].to_string())
        };

        let recipient = fields[1];
        if recipient.is_empty() {
            return Err(RecordParseError::InvalidField {
                field: "recipient",
                value: recipient.to_string(),
            });
        }

        let call_date = NaiveDate::parse_from_str(fields[2], "%d/%m/%Y").map_err(|_| {
            RecordParseError::InvalidField {
                field: "call_date",
                value: fields[2].to_string(),
            }
        })?;

        let end_time = NaiveTime::parse_from_str(fields[3], "%H:%M:%S").map_err(|_| {
            RecordParseError::InvalidField {
                field: "end_time",
                value: fields[3].to_string(),
            }
        })?;

        let duration_secs: i64 = fields[4]
            .parse()
            .ok()
            .filter(|d| *d >= 0)
            .ok_or_else(|| RecordParseError::InvalidField {
                field: "duration",
                value: fields[4].to_string(),
            })?;

        let cost: f64 = fields[5]
            .parse()
            .ok()
            .filter(|c: &f64| c.is_finite() && *c >= 0.0)
            .ok_or_else(|| RecordParseError::InvalidField {
                field: "cost",
                value: fields[5].to_string(),
            })?;

        let reference = fields[6];
        if reference.is_empty() || !reference.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RecordParseError::InvalidField {
                field: "reference",
                value: reference.to_string(),
            });
        }

        let currency = fields[7];
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(RecordParseError::InvalidField {
                field: "currency",
                value: currency.to_string(),
            });
        }

        Ok(CallRecord {
            caller_id,
            recipient: recipient.to_string(),
            call_date,
            end_time,
            duration_secs,
            cost,
            reference: reference.to_string(),
            currency: currency.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "441215598896,448000096481,16/08/2016,14:21:33,43,0,C5DA9724701EEBBA95CA2CC5617BA93E,GBP";

    #[test]
    fn test_parse_valid_record() {
        let record = CallRecord::parse_line(VALID).unwrap();
        assert_eq!(record.caller_id.as_deref(), Some("441215598896"));
        assert_eq!(record.recipient, "448000096481");
        assert_eq!(record.call_date, NaiveDate::from_ymd_opt(2016, 8, 16).unwrap());
        assert_eq!(record.end_time, NaiveTime::from_hms_opt(14, 21, 33).unwrap());
        assert_eq!(record.duration_secs, 43);
        assert_eq!(record.cost, 0.0);
        assert_eq!(record.currency, "GBP");
    }

    #[test]
    fn test_empty_caller_id_is_allowed() {
        let line = ",448000096481,16/08/2016,14:21:33,43,0.125,C5DA9724701EEBBA95CA2CC5617BA93E,EUR";
        let record = CallRecord::parse_line(line).unwrap();
        assert_eq!(record.caller_id, None);
        assert_eq!(record.cost, 0.125);
    }

    #[test]
    fn test_field_count_mismatch() {
        let err = CallRecord::parse_line("a,b,c").unwrap_err();
        assert_eq!(
            err,
            RecordParseError::FieldCount {
                expected: 8,
                found: 3
            }
        );
    }

    #[test]
    fn test_invalid_date_rejected() {
        let line = "441215598896,448000096481,2016-08-16,14:21:33,43,0,C5DA9724701EEBBA95CA2CC5617BA93E,GBP";
        let err = CallRecord::parse_line(line).unwrap_err();
        assert!(matches!(
            err,
            RecordParseError::InvalidField {
                field: "call_date",
                ..
            }
        ));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let line = "441215598896,448000096481,16/08/2016,14:21:33,-5,0,C5DA9724701EEBBA95CA2CC5617BA93E,GBP";
        assert!(CallRecord::parse_line(line).is_err());
    }

    #[test]
    fn test_header_detection() {
        assert!(is_header(CSV_HEADER));
        assert!(is_header("CALLER_ID,RECIPIENT,CALL_DATE,END_TIME,DURATION,COST,REFERENCE,CURRENCY\r\n"));
        assert!(!is_header(VALID));
    }

    #[test]
    fn test_blank_line_rejected() {
        assert_eq!(CallRecord::parse_line("   "), Err(RecordParseError::Empty));
    }
}
