//! Core record types for the Campus Insight dataset layer
//!
//! This module defines the flat record model the query engine runs over:
//! - `Section`: one offering of a course in a given year
//! - `Room`: one bookable campus room
//! - `Record`: a record of either kind
//! - `FieldLookup`: the single capability the query engine depends on
//! - `Value` / `FieldRef`: owned and borrowed typed field values
//! - `DatasetKind` and `Schema`: which fields a kind exposes

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::storage::error::StorageError;

/// Separator between a dataset id and a field name in a query key
pub const KEY_SEPARATOR: char = '_';

/// Numeric fields exposed by section records
pub const SECTION_MEASURES: &[&str] = &["avg", "pass", "fail", "audit", "year"];
/// String fields exposed by section records
pub const SECTION_STRINGS: &[&str] = &["dept", "id", "instructor", "title", "uuid"];
/// Numeric fields exposed by room records
pub const ROOM_MEASURES: &[&str] = &["lat", "lon", "seats"];
/// String fields exposed by room records
pub const ROOM_STRINGS: &[&str] = &[
    "fullname",
    "shortname",
    "number",
    "name",
    "address",
    "type",
    "furniture",
    "href",
];

/// Look up a typed field value by name.
///
/// Both record kinds implement this; the filter evaluator, the
/// transformation engine and projection only ever go through it.
pub trait FieldLookup {
    /// Returns the value of `name`, or `None` if the record has no such field
    fn field(&self, name: &str) -> Option<FieldRef<'_>>;
}

/// A borrowed field value
///
/// Equality and hashing are structural: numbers compare by bit pattern
/// (with `-0.0` folded into `0.0`) and never equal a string, so a tuple of
/// these is a collision-free composite key.
#[derive(Debug, Clone, Copy)]
pub enum FieldRef<'a> {
    /// Measure field
    Number(f64),
    /// String field
    Text(&'a str),
}

impl<'a> FieldRef<'a> {
    /// Numeric value, if this is a measure
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldRef::Number(n) => Some(*n),
            FieldRef::Text(_) => None,
        }
    }

    /// String value, if this is a string field
    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            FieldRef::Number(_) => None,
            FieldRef::Text(s) => Some(s),
        }
    }

    /// Copy into an owned value
    pub fn to_value(&self) -> Value {
        match self {
            FieldRef::Number(n) => Value::Number(*n),
            FieldRef::Text(s) => Value::Text((*s).to_string()),
        }
    }

    fn number_bits(n: f64) -> u64 {
        if n == 0.0 {
            0
        } else {
            n.to_bits()
        }
    }
}

impl PartialEq for FieldRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldRef::Number(a), FieldRef::Number(b)) => {
                Self::number_bits(*a) == Self::number_bits(*b)
            }
            (FieldRef::Text(a), FieldRef::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for FieldRef<'_> {}

impl Hash for FieldRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            FieldRef::Number(n) => {
                0u8.hash(state);
                Self::number_bits(*n).hash(state);
            }
            FieldRef::Text(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

/// Largest magnitude below which every whole f64 is an exact integer
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// An owned result value, serialized as a bare JSON number or string.
///
/// Whole numbers serialize as JSON integers (`2015`, not `2015.0`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Numeric value
    Number(f64),
    /// String value
    Text(String),
}

impl Value {
    /// Numeric value, if any
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }

    /// String value, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Number(_) => None,
            Value::Text(s) => Some(s),
        }
    }

    /// Ordering used by ORDER: numbers numerically, strings by byte-wise
    /// lexicographic order. Numbers sort before strings; never happens
    /// within one column.
    pub fn order_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Number(_), Value::Text(_)) => Ordering::Less,
            (Value::Text(_), Value::Number(_)) => Ordering::Greater,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.abs() < MAX_EXACT_INTEGER => {
                serializer.serialize_i64(*n as i64)
            }
            Value::Number(n) => serializer.serialize_f64(*n),
            Value::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A course section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Section {
    /// Section identifier
    pub uuid: String,
    /// Course number, e.g. "310"
    pub id: String,
    /// Course title
    pub title: String,
    /// Instructor name(s)
    pub instructor: String,
    /// Department code, e.g. "cpsc"
    pub dept: String,
    /// Year the section ran
    pub year: f64,
    /// Average grade
    pub avg: f64,
    /// Number of students who passed
    pub pass: f64,
    /// Number of students who failed
    pub fail: f64,
    /// Number of auditors
    pub audit: f64,
}

impl FieldLookup for Section {
    fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        Some(match name {
            "uuid" => FieldRef::Text(&self.uuid),
            "id" => FieldRef::Text(&self.id),
            "title" => FieldRef::Text(&self.title),
            "instructor" => FieldRef::Text(&self.instructor),
            "dept" => FieldRef::Text(&self.dept),
            "year" => FieldRef::Number(self.year),
            "avg" => FieldRef::Number(self.avg),
            "pass" => FieldRef::Number(self.pass),
            "fail" => FieldRef::Number(self.fail),
            "audit" => FieldRef::Number(self.audit),
            _ => return None,
        })
    }
}

/// A campus room
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    /// Building full name
    pub fullname: String,
    /// Building short name, e.g. "DMP"
    pub shortname: String,
    /// Room number within the building
    pub number: String,
    /// `shortname` and `number` joined with an underscore
    pub name: String,
    /// Building address
    pub address: String,
    /// Building latitude
    pub lat: f64,
    /// Building longitude
    pub lon: f64,
    /// Seat count
    pub seats: f64,
    /// Room type, e.g. "Small Group"
    #[serde(rename = "type")]
    pub room_type: String,
    /// Furniture description
    pub furniture: String,
    /// Link to the room page
    pub href: String,
}

impl FieldLookup for Room {
    fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        Some(match name {
            "fullname" => FieldRef::Text(&self.fullname),
            "shortname" => FieldRef::Text(&self.shortname),
            "number" => FieldRef::Text(&self.number),
            "name" => FieldRef::Text(&self.name),
            "address" => FieldRef::Text(&self.address),
            "type" => FieldRef::Text(&self.room_type),
            "furniture" => FieldRef::Text(&self.furniture),
            "href" => FieldRef::Text(&self.href),
            "lat" => FieldRef::Number(self.lat),
            "lon" => FieldRef::Number(self.lon),
            "seats" => FieldRef::Number(self.seats),
            _ => return None,
        })
    }
}

/// A record of either kind
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Section(Section),
    Room(Room),
}

impl Record {
    /// Kind of this record
    pub fn kind(&self) -> DatasetKind {
        match self {
            Record::Section(_) => DatasetKind::Sections,
            Record::Room(_) => DatasetKind::Rooms,
        }
    }
}

impl FieldLookup for Record {
    fn field(&self, name: &str) -> Option<FieldRef<'_>> {
        match self {
            Record::Section(s) => s.field(name),
            Record::Room(r) => r.field(name),
        }
    }
}

/// Kind of records a dataset holds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    /// Course sections
    Sections,
    /// Campus rooms
    Rooms,
}

impl DatasetKind {
    /// Field schema for this kind
    pub fn schema(&self) -> Schema {
        match self {
            DatasetKind::Sections => Schema::new(SECTION_MEASURES, SECTION_STRINGS),
            DatasetKind::Rooms => Schema::new(ROOM_MEASURES, ROOM_STRINGS),
        }
    }
}

impl std::fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetKind::Sections => write!(f, "sections"),
            DatasetKind::Rooms => write!(f, "rooms"),
        }
    }
}

impl FromStr for DatasetKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sections" => Ok(DatasetKind::Sections),
            "rooms" => Ok(DatasetKind::Rooms),
            _ => Err(StorageError::InvalidKind(s.to_string())),
        }
    }
}

/// Kind of a field in a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Numeric, usable with LT/GT/EQ and every aggregate
    Measure,
    /// Textual, usable with IS and COUNT
    Text,
}

/// Field names a dataset kind exposes, split by kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    measures: Vec<&'static str>,
    strings: Vec<&'static str>,
}

impl Schema {
    pub fn new(measures: &[&'static str], strings: &[&'static str]) -> Self {
        Self {
            measures: measures.to_vec(),
            strings: strings.to_vec(),
        }
    }

    /// Union of every kind's fields, for queries against unknown datasets
    pub fn any() -> Self {
        let mut measures = SECTION_MEASURES.to_vec();
        measures.extend_from_slice(ROOM_MEASURES);
        let mut strings = SECTION_STRINGS.to_vec();
        strings.extend_from_slice(ROOM_STRINGS);
        Self { measures, strings }
    }

    /// Kind of `field`, if the schema knows it
    pub fn field_kind(&self, field: &str) -> Option<FieldKind> {
        if self.measures.contains(&field) {
            Some(FieldKind::Measure)
        } else if self.strings.contains(&field) {
            Some(FieldKind::Text)
        } else {
            None
        }
    }

    pub fn measures(&self) -> &[&'static str] {
        &self.measures
    }

    pub fn strings(&self) -> &[&'static str] {
        &self.strings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn section(dept: &str, avg: f64) -> Section {
        Section {
            uuid: "1".to_string(),
            id: "310".to_string(),
            title: "sftwr eng".to_string(),
            instructor: "holmes, reid".to_string(),
            dept: dept.to_string(),
            year: 2015.0,
            avg,
            pass: 100.0,
            fail: 2.0,
            audit: 0.0,
        }
    }

    #[test]
    fn test_section_lookup() {
        let s = section("cpsc", 97.5);
        assert_eq!(s.field("dept"), Some(FieldRef::Text("cpsc")));
        assert_eq!(s.field("avg"), Some(FieldRef::Number(97.5)));
        assert_eq!(s.field("seats"), None);
    }

    #[test]
    fn test_room_type_field_renamed() {
        let json = r#"{"fullname":"Hugh Dempster Pavilion","shortname":"DMP","number":"110",
            "name":"DMP_110","address":"6245 Agronomy Road V6T 1Z4","lat":49.26125,
            "lon":-123.24807,"seats":120,"type":"Tiered Large Group",
            "furniture":"Classroom-Fixed Tablets","href":"http://example.com/DMP-110"}"#;
        let room: Room = serde_json::from_str(json).unwrap();
        assert_eq!(room.field("type"), Some(FieldRef::Text("Tiered Large Group")));
        assert_eq!(room.field("seats").and_then(|v| v.as_number()), Some(120.0));
    }

    #[test]
    fn test_field_ref_structural_key() {
        // "1|2" as one string must not collide with the tuple ("1", "2")
        let a = vec![FieldRef::Text("1|2")];
        let b = vec![FieldRef::Text("1"), FieldRef::Text("2")];
        assert_ne!(a, b);

        // A number never equals its string rendering
        assert_ne!(FieldRef::Number(1.0), FieldRef::Text("1"));

        let mut set = HashSet::new();
        set.insert(FieldRef::Number(0.0));
        assert!(set.contains(&FieldRef::Number(-0.0)));
    }

    #[test]
    fn test_dataset_kind_parse() {
        assert_eq!("sections".parse::<DatasetKind>().unwrap(), DatasetKind::Sections);
        assert_eq!("Rooms".parse::<DatasetKind>().unwrap(), DatasetKind::Rooms);
        assert!("courses".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn test_schema_kinds() {
        let schema = DatasetKind::Rooms.schema();
        assert_eq!(schema.field_kind("seats"), Some(FieldKind::Measure));
        assert_eq!(schema.field_kind("furniture"), Some(FieldKind::Text));
        assert_eq!(schema.field_kind("avg"), None);

        let any = Schema::any();
        assert_eq!(any.field_kind("avg"), Some(FieldKind::Measure));
        assert_eq!(any.field_kind("href"), Some(FieldKind::Text));
    }

    #[test]
    fn test_value_serializes_bare() {
        let v = serde_json::to_string(&Value::Number(97.5)).unwrap();
        assert_eq!(v, "97.5");
        let v = serde_json::to_string(&Value::from("cpsc")).unwrap();
        assert_eq!(v, "\"cpsc\"");
    }

    #[test]
    fn test_whole_numbers_serialize_as_integers() {
        assert_eq!(serde_json::to_string(&Value::Number(2015.0)).unwrap(), "2015");
        assert_eq!(serde_json::to_string(&Value::Number(4.0)).unwrap(), "4");
        assert_eq!(serde_json::to_string(&Value::Number(-0.0)).unwrap(), "0");
        assert_eq!(serde_json::to_string(&Value::Number(72.25)).unwrap(), "72.25");

        // Still reads back as a number
        let v: Value = serde_json::from_str("2015").unwrap();
        assert_eq!(v, Value::Number(2015.0));
    }
}
