// src/db/models.rs

//! Records held by the local state store

use crate::error::{Error, Result};
use serde::Serialize;

/// Format of the install date column
pub const INSTALL_DATE_FORMAT: &str = "%Y-%m-%d_%H:%M:%S";

/// One line of the installed-package database: `name version installDate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledRecord {
    pub name: String,
    pub version: String,
    pub install_date: String,
}

impl InstalledRecord {
    pub fn new(name: String, version: String, install_date: String) -> Self {
        Self {
            name,
            version,
            install_date,
        }
    }

    /// A record stamped with the current local time
    pub fn now(name: &str, version: &str) -> Self {
        Self::new(
            name.to_string(),
            version.to_string(),
            chrono::Local::now().format(INSTALL_DATE_FORMAT).to_string(),
        )
    }

    /// Parse a database line; blank lines yield `None`
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let mut fields = line.split_whitespace();
        let Some(name) = fields.next() else {
            return Ok(None);
        };

        match (fields.next(), fields.next()) {
            (Some(version), Some(date)) => Ok(Some(Self::new(
                name.to_string(),
                version.to_string(),
                date.to_string(),
            ))),
            _ => Err(Error::Parse(format!("Malformed database line: {}", line))),
        }
    }

    pub fn to_line(&self) -> String {
        format!("{} {} {}\n", self.name, self.version, self.install_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        let record = InstalledRecord::parse_line("foo 1.0 2024-01-01_12:00:00")
            .unwrap()
            .unwrap();
        assert_eq!(record.name, "foo");
        assert_eq!(record.version, "1.0");
        assert_eq!(record.install_date, "2024-01-01_12:00:00");
        assert_eq!(record.to_line(), "foo 1.0 2024-01-01_12:00:00\n");
    }

    #[test]
    fn test_parse_blank_and_malformed_lines() {
        assert!(InstalledRecord::parse_line("   ").unwrap().is_none());
        assert!(matches!(
            InstalledRecord::parse_line("foo 1.0"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_now_uses_date_format() {
        let record = InstalledRecord::now("foo", "1.0");
        assert!(chrono::NaiveDateTime::parse_from_str(&record.install_date, INSTALL_DATE_FORMAT).is_ok());
        assert!(!record.install_date.contains(' '));
    }
}
