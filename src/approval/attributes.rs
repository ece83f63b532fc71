// SPDX-License-Identifier: MIT

//! Event attribute snapshot used as condition input

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Builtin attribute names every snapshot carries
pub const BUILTIN_FIELDS: [&str; 5] = [
    "expected_attendance",
    "location",
    "visibility",
    "has_external_link",
    "organization_id",
];

/// Who may see the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Restricted,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Restricted => "restricted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            "restricted" => Some(Visibility::Restricted),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of an attribute, decides which operators apply to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Text,
    Boolean,
    Visibility,
    /// Calendar date, written `YYYY-MM-DD`
    Date,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Integer => write!(f, "integer"),
            FieldKind::Text => write!(f, "text"),
            FieldKind::Boolean => write!(f, "boolean"),
            FieldKind::Visibility => write!(f, "visibility"),
            FieldKind::Date => write!(f, "date"),
        }
    }
}

/// Value of a custom attribute
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Boolean(bool),
    Integer(i64),
    Date(NaiveDate),
    Text(String),
}

impl AttributeValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            AttributeValue::Boolean(_) => FieldKind::Boolean,
            AttributeValue::Integer(_) => FieldKind::Integer,
            AttributeValue::Date(_) => FieldKind::Date,
            AttributeValue::Text(_) => FieldKind::Text,
        }
    }

    /// This value as the declared `kind`, if it can be read that way.
    ///
    /// A date-shaped string declared as text stays text, and text declared
    /// as a date is parsed.
    pub fn coerce(&self, kind: FieldKind) -> Option<AttributeValue> {
        match (self, kind) {
            (value, kind) if value.kind() == kind => Some(value.clone()),
            (AttributeValue::Date(d), FieldKind::Text) => Some(AttributeValue::Text(d.to_string())),
            (AttributeValue::Text(s), FieldKind::Date) => parse_date(s).map(AttributeValue::Date),
            _ => None,
        }
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// A resolved field: its type plus its value in this snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<'a> {
    Integer(i64),
    Text(&'a str),
    Boolean(bool),
    Visibility(Visibility),
    Date(NaiveDate),
}

impl FieldValue<'_> {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Integer(_) => FieldKind::Integer,
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Boolean(_) => FieldKind::Boolean,
            FieldValue::Visibility(_) => FieldKind::Visibility,
            FieldValue::Date(_) => FieldKind::Date,
        }
    }
}

/// Immutable snapshot of an event, captured at submission time
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EventAttributes {
    pub organization_id: String,
    pub expected_attendance: u64,
    pub location: String,
    pub visibility: Visibility,
    #[serde(default)]
    pub has_external_link: bool,
    /// Organization-declared attributes
    #[serde(default)]
    pub custom: BTreeMap<String, AttributeValue>,
}

impl EventAttributes {
    pub fn new(
        organization_id: impl Into<String>,
        expected_attendance: u64,
        location: impl Into<String>,
        visibility: Visibility,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            expected_attendance,
            location: location.into(),
            visibility,
            has_external_link: false,
            custom: BTreeMap::new(),
        }
    }

    pub fn with_external_link(mut self, has_external_link: bool) -> Self {
        self.has_external_link = has_external_link;
        self
    }

    pub fn with_custom(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.custom.insert(name.into(), value);
        self
    }

    /// Look up a builtin or custom field by name
    pub fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            // Attendance beyond i64 range is not a campus event.
            "expected_attendance" => Some(FieldValue::Integer(
                i64::try_from(self.expected_attendance).unwrap_or(i64::MAX),
            )),
            "location" => Some(FieldValue::Text(&self.location)),
            "visibility" => Some(FieldValue::Visibility(self.visibility)),
            "has_external_link" => Some(FieldValue::Boolean(self.has_external_link)),
            "organization_id" => Some(FieldValue::Text(&self.organization_id)),
            other => self.custom.get(other).map(|value| match value {
                AttributeValue::Boolean(b) => FieldValue::Boolean(*b),
                AttributeValue::Integer(n) => FieldValue::Integer(*n),
                AttributeValue::Date(d) => FieldValue::Date(*d),
                AttributeValue::Text(s) => FieldValue::Text(s),
            }),
        }
    }
}

/// Type of a builtin field, `None` for anything else
pub fn builtin_kind(name: &str) -> Option<FieldKind> {
    match name {
        "expected_attendance" => Some(FieldKind::Integer),
        "location" | "organization_id" => Some(FieldKind::Text),
        "visibility" => Some(FieldKind::Visibility),
        "has_external_link" => Some(FieldKind::Boolean),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_fields_resolve() {
        let attrs = EventAttributes::new("union", 120, "EMPAC", Visibility::Public)
            .with_external_link(true);

        assert_eq!(
            attrs.field("expected_attendance"),
            Some(FieldValue::Integer(120))
        );
        assert_eq!(attrs.field("location"), Some(FieldValue::Text("EMPAC")));
        assert_eq!(
            attrs.field("visibility"),
            Some(FieldValue::Visibility(Visibility::Public))
        );
        assert_eq!(
            attrs.field("has_external_link"),
            Some(FieldValue::Boolean(true))
        );
        assert_eq!(attrs.field("organization_id"), Some(FieldValue::Text("union")));
    }

    #[test]
    fn test_every_builtin_has_a_kind() {
        let attrs = EventAttributes::new("union", 1, "DCC", Visibility::Private);
        for name in BUILTIN_FIELDS {
            let kind = builtin_kind(name).unwrap();
            assert_eq!(attrs.field(name).unwrap().kind(), kind);
        }
    }

    #[test]
    fn test_custom_fields() {
        let attrs = EventAttributes::new("union", 10, "DCC", Visibility::Private)
            .with_custom("catering", AttributeValue::Boolean(true))
            .with_custom("budget", AttributeValue::Integer(500));

        assert_eq!(attrs.field("catering"), Some(FieldValue::Boolean(true)));
        assert_eq!(attrs.field("budget"), Some(FieldValue::Integer(500)));
        assert_eq!(attrs.field("missing"), None);
        assert_eq!(builtin_kind("catering"), None);
    }

    #[test]
    fn test_deserialize_snapshot() {
        let yaml = r#"
            organization_id: union
            expected_attendance: 250
            location: "Alumni House"
            visibility: restricted
            custom:
              catering: true
              sponsor: "ACM"
        "#;
        let attrs: EventAttributes = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(attrs.visibility, Visibility::Restricted);
        assert!(!attrs.has_external_link);
        assert_eq!(
            attrs.custom.get("sponsor"),
            Some(&AttributeValue::Text("ACM".to_string()))
        );
        assert_eq!(
            attrs.custom.get("catering"),
            Some(&AttributeValue::Boolean(true))
        );
    }

    #[test]
    fn test_date_values() {
        let yaml = r#"
            organization_id: union
            expected_attendance: 20
            location: DCC
            visibility: public
            custom:
              starts_on: 2026-11-14
              room_code: "2026-01"
        "#;
        let attrs: EventAttributes = serde_yaml::from_str(yaml).unwrap();
        let starts_on = NaiveDate::from_ymd_opt(2026, 11, 14).unwrap();
        assert_eq!(attrs.field("starts_on"), Some(FieldValue::Date(starts_on)));
        assert_eq!(attrs.field("room_code"), Some(FieldValue::Text("2026-01")));
    }

    #[test]
    fn test_coerce_to_declared_kind() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert_eq!(
            AttributeValue::Date(date).coerce(FieldKind::Text),
            Some(AttributeValue::Text("2026-03-01".to_string()))
        );
        assert_eq!(
            AttributeValue::Text("2026-03-01".to_string()).coerce(FieldKind::Date),
            Some(AttributeValue::Date(date))
        );
        assert_eq!(
            AttributeValue::Integer(7).coerce(FieldKind::Integer),
            Some(AttributeValue::Integer(7))
        );
        assert_eq!(
            AttributeValue::Text("7500".to_string()).coerce(FieldKind::Integer),
            None
        );
        assert_eq!(AttributeValue::Boolean(true).coerce(FieldKind::Date), None);
    }

    #[test]
    fn test_visibility_parse() {
        assert_eq!(Visibility::parse("public"), Some(Visibility::Public));
        assert_eq!(Visibility::parse("campus"), None);
        assert_eq!(Visibility::Restricted.to_string(), "restricted");
    }
}
