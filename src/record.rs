use serde::Serialize;

use crate::parser::article::RawArticle;
use crate::parser::person;

/// Flattened column names, in declaration order of [`Announcement`].
pub const COLUMNS: [&str; 14] = [
    "location",
    "date",
    "person1.name",
    "person1.age",
    "person1.location",
    "person1.job",
    "person2.name",
    "person2.age",
    "person2.location",
    "person2.job",
    "children",
    "whereMet",
    "imageUrl",
    "url",
];

/// Index of the `url` column, the dedup key.
pub const URL_COLUMN: usize = 13;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Person {
    pub name: String,
    pub age: String,
    pub location: String,
    pub job: String,
}

impl Person {
    fn values(&self) -> [&str; 4] {
        [&self.name, &self.age, &self.location, &self.job]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub location: String,
    pub date: String,
    pub person1: Person,
    pub person2: Person,
    pub children: String,
    pub where_met: String,
    pub image_url: String,
    pub url: String,
}

impl Announcement {
    /// Build the record from an extracted article, parsing both person paragraphs.
    pub fn from_raw(raw: RawArticle) -> Self {
        Self {
            person1: person::parse(&raw.person1),
            person2: person::parse(&raw.person2),
            location: raw.location,
            date: raw.date,
            children: raw.children,
            where_met: raw.where_met,
            image_url: raw.image_url,
            url: raw.url,
        }
    }

    /// Ordered `(dotted-key, value)` pairs; keys match [`COLUMNS`].
    pub fn flatten(&self) -> Vec<(&'static str, &str)> {
        let mut values: Vec<&str> = Vec::with_capacity(COLUMNS.len());
        values.push(&self.location);
        values.push(&self.date);
        values.extend(self.person1.values());
        values.extend(self.person2.values());
        values.push(&self.children);
        values.push(&self.where_met);
        values.push(&self.image_url);
        values.push(&self.url);

        COLUMNS.iter().copied().zip(values).collect()
    }
}
