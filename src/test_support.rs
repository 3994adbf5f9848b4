//! Record builders shared by unit tests.

use crate::storage::record::{Record, Room, Section};

pub fn section(dept: &str, id: &str, instructor: &str, year: f64, avg: f64) -> Record {
    Record::Section(Section {
        uuid: format!("{}{}{}", dept, id, year),
        id: id.to_string(),
        title: format!("{} {}", dept, id),
        instructor: instructor.to_string(),
        dept: dept.to_string(),
        year,
        avg,
        pass: 50.0,
        fail: 2.0,
        audit: 0.0,
    })
}

pub fn room(shortname: &str, number: &str, seats: f64, furniture: &str) -> Record {
    Record::Room(Room {
        fullname: format!("{} Building", shortname),
        shortname: shortname.to_string(),
        number: number.to_string(),
        name: format!("{}_{}", shortname, number),
        address: "2329 West Mall".to_string(),
        lat: 49.26,
        lon: -123.25,
        seats,
        room_type: "Small Group".to_string(),
        furniture: furniture.to_string(),
        href: format!("http://rooms.example.com/{}-{}", shortname, number),
    })
}
