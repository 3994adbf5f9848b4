use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The two kinds of dataset the engine knows how to store and query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Sections,
    Rooms,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Sections => "sections",
            DatasetKind::Rooms => "rooms",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sections" => Ok(DatasetKind::Sections),
            "rooms" => Ok(DatasetKind::Rooms),
            other => Err(format!("Unknown dataset kind: {}", other)),
        }
    }
}

/// Statistics for a single offering of a course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Section identifier
    pub uuid: String,
    /// Course number within the department
    pub id: String,
    pub title: String,
    pub instructor: String,
    /// Offering department, e.g. "cpsc"
    pub dept: String,
    /// Year the section ran; 1900 for "overall" rows
    pub year: f64,
    /// Average grade
    pub avg: f64,
    pub pass: f64,
    pub fail: f64,
    pub audit: f64,
}

/// A bookable room together with its building details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Full building name
    pub fullname: String,
    /// Building code
    pub shortname: String,
    /// Room number; not always numeric
    pub number: String,
    /// `shortname` + "_" + `number`
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    pub seats: f64,
    #[serde(rename = "type")]
    pub room_type: String,
    pub furniture: String,
    pub href: String,
}

/// One flat record of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Section(Section),
    Room(Room),
}

impl Record {
    pub fn kind(&self) -> DatasetKind {
        match self {
            Record::Section(_) => DatasetKind::Sections,
            Record::Room(_) => DatasetKind::Rooms,
        }
    }

    /// Reads a field. Returns `None` when the field belongs to the other record kind.
    pub fn get(&self, field: Field) -> Option<FieldValue<'_>> {
        match (self, field) {
            (Record::Section(section), Field::Section(f)) => Some(section.get(f)),
            (Record::Room(room), Field::Room(f)) => Some(room.get(f)),
            _ => None,
        }
    }
}

impl Section {
    pub fn get(&self, field: SectionField) -> FieldValue<'_> {
        match field {
            SectionField::Uuid => FieldValue::Text(&self.uuid),
            SectionField::Id => FieldValue::Text(&self.id),
            SectionField::Title => FieldValue::Text(&self.title),
            SectionField::Instructor => FieldValue::Text(&self.instructor),
            SectionField::Dept => FieldValue::Text(&self.dept),
            SectionField::Year => FieldValue::Number(self.year),
            SectionField::Avg => FieldValue::Number(self.avg),
            SectionField::Pass => FieldValue::Number(self.pass),
            SectionField::Fail => FieldValue::Number(self.fail),
            SectionField::Audit => FieldValue::Number(self.audit),
        }
    }
}

impl Room {
    pub fn get(&self, field: RoomField) -> FieldValue<'_> {
        match field {
            RoomField::Fullname => FieldValue::Text(&self.fullname),
            RoomField::Shortname => FieldValue::Text(&self.shortname),
            RoomField::Number => FieldValue::Text(&self.number),
            RoomField::Name => FieldValue::Text(&self.name),
            RoomField::Address => FieldValue::Text(&self.address),
            RoomField::Lat => FieldValue::Number(self.lat),
            RoomField::Lon => FieldValue::Number(self.lon),
            RoomField::Seats => FieldValue::Number(self.seats),
            RoomField::Type => FieldValue::Text(&self.room_type),
            RoomField::Furniture => FieldValue::Text(&self.furniture),
            RoomField::Href => FieldValue::Text(&self.href),
        }
    }
}

/// A borrowed, typed field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Number(f64),
    Text(&'a str),
}

impl FieldValue<'_> {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }

    /// Converts to JSON, emitting integral numbers as integers.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Number(n) => number_to_json(*n),
            FieldValue::Text(s) => serde_json::Value::String((*s).to_string()),
        }
    }
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

pub fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Numeric,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionField {
    Uuid,
    Id,
    Title,
    Instructor,
    Dept,
    Year,
    Avg,
    Pass,
    Fail,
    Audit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomField {
    Fullname,
    Shortname,
    Number,
    Name,
    Address,
    Lat,
    Lon,
    Seats,
    Type,
    Furniture,
    Href,
}

/// A column of either record kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Section(SectionField),
    Room(RoomField),
}

impl Field {
    /// Resolves a bare field name (the part after the underscore in a field reference).
    pub fn parse(name: &str) -> Option<Field> {
        let field = match name {
            "uuid" => Field::Section(SectionField::Uuid),
            "id" => Field::Section(SectionField::Id),
            "title" => Field::Section(SectionField::Title),
            "instructor" => Field::Section(SectionField::Instructor),
            "dept" => Field::Section(SectionField::Dept),
            "year" => Field::Section(SectionField::Year),
            "avg" => Field::Section(SectionField::Avg),
            "pass" => Field::Section(SectionField::Pass),
            "fail" => Field::Section(SectionField::Fail),
            "audit" => Field::Section(SectionField::Audit),
            "fullname" => Field::Room(RoomField::Fullname),
            "shortname" => Field::Room(RoomField::Shortname),
            "number" => Field::Room(RoomField::Number),
            "name" => Field::Room(RoomField::Name),
            "address" => Field::Room(RoomField::Address),
            "lat" => Field::Room(RoomField::Lat),
            "lon" => Field::Room(RoomField::Lon),
            "seats" => Field::Room(RoomField::Seats),
            "type" => Field::Room(RoomField::Type),
            "furniture" => Field::Room(RoomField::Furniture),
            "href" => Field::Room(RoomField::Href),
            _ => return None,
        };
        Some(field)
    }

    pub fn kind(&self) -> DatasetKind {
        match self {
            Field::Section(_) => DatasetKind::Sections,
            Field::Room(_) => DatasetKind::Rooms,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Section(
                SectionField::Year
                | SectionField::Avg
                | SectionField::Pass
                | SectionField::Fail
                | SectionField::Audit,
            )
            | Field::Room(RoomField::Lat | RoomField::Lon | RoomField::Seats) => FieldType::Numeric,
            _ => FieldType::Text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(dept: &str, avg: f64) -> Record {
        Record::Section(Section {
            uuid: "1".to_string(),
            id: "310".to_string(),
            title: "software eng".to_string(),
            instructor: "smith, jane".to_string(),
            dept: dept.to_string(),
            year: 2015.0,
            avg,
            pass: 100.0,
            fail: 3.0,
            audit: 0.0,
        })
    }

    #[test]
    fn test_field_parsing() {
        assert_eq!(Field::parse("avg"), Some(Field::Section(SectionField::Avg)));
        assert_eq!(Field::parse("type"), Some(Field::Room(RoomField::Type)));
        assert_eq!(Field::parse("Avg"), None);
        assert_eq!(Field::parse(""), None);

        assert_eq!(Field::parse("seats").unwrap().kind(), DatasetKind::Rooms);
        assert_eq!(Field::parse("lat").unwrap().field_type(), FieldType::Numeric);
        assert_eq!(Field::parse("dept").unwrap().field_type(), FieldType::Text);
    }

    #[test]
    fn test_record_accessor() {
        let record = section("cpsc", 95.5);
        assert_eq!(
            record.get(Field::Section(SectionField::Dept)),
            Some(FieldValue::Text("cpsc"))
        );
        assert_eq!(
            record.get(Field::Section(SectionField::Avg)),
            Some(FieldValue::Number(95.5))
        );
        // Room fields do not exist on a section
        assert_eq!(record.get(Field::Room(RoomField::Seats)), None);
    }

    #[test]
    fn test_json_numbers() {
        assert_eq!(number_to_json(2015.0), serde_json::json!(2015));
        assert_eq!(number_to_json(87.25), serde_json::json!(87.25));
        assert_eq!(number_to_json(-3.0), serde_json::json!(-3));
    }

    #[test]
    fn test_kind_round_trip_names() {
        assert_eq!("Rooms".parse::<DatasetKind>().unwrap(), DatasetKind::Rooms);
        assert!("buildings".parse::<DatasetKind>().is_err());
        assert_eq!(
            serde_json::to_value(DatasetKind::Sections).unwrap(),
            serde_json::json!("sections")
        );
    }

    #[test]
    fn test_room_serializes_type_field() {
        let room = Record::Room(Room {
            fullname: "Hugh Dempster Pavilion".to_string(),
            shortname: "DMP".to_string(),
            number: "110".to_string(),
            name: "DMP_110".to_string(),
            address: "6245 Agronomy Road V6T 1Z4".to_string(),
            lat: 49.26125,
            lon: -123.24807,
            seats: 120.0,
            room_type: "Tiered Large Group".to_string(),
            furniture: "Classroom-Fixed Tablets".to_string(),
            href: "http://example.com/DMP-110".to_string(),
        });
        let value = serde_json::to_value(&room).unwrap();
        assert_eq!(value["type"], "Tiered Large Group");

        let back: Record = serde_json::from_value(value).unwrap();
        assert_eq!(back, room);
    }
}
