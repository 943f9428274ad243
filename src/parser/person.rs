use crate::record::Person;

const AGE_OPEN: char = '(';
const AGE_CLOSE: char = ')';
const ORIGIN_TOKEN: &str = "uit ";
const JOB_SEPARATOR: &str = ", ";

/// Parse one biographical sentence of the form `Name (age) uit Place, job`.
///
/// Every field is guarded on its own delimiter. Without an opening `(` the
/// sentence has no recognisable shape and all four fields carry the raw
/// (trimmed) text, so the record still shows what was published.
pub fn parse(sentence: &str) -> Person {
    let raw = sentence.trim();

    let Some((before_age, after_open)) = raw.split_once(AGE_OPEN) else {
        return Person {
            name: raw.to_string(),
            age: raw.to_string(),
            location: raw.to_string(),
            job: raw.to_string(),
        };
    };

    let name = match before_age.trim() {
        "" => raw,
        n => n,
    };

    let age = after_open
        .split(AGE_CLOSE)
        .next()
        .unwrap_or_default()
        .trim();

    let location = raw
        .split_once(ORIGIN_TOKEN)
        .and_then(|(_, rest)| rest.split(',').next())
        .unwrap_or_default()
        .trim();

    let job = raw
        .split_once(JOB_SEPARATOR)
        .and_then(|(_, rest)| rest.split(JOB_SEPARATOR).next())
        .unwrap_or_default()
        .trim();

    Person {
        name: name.to_string(),
        age: age.to_string(),
        location: location.to_string(),
        job: job.to_string(),
    }
}

/// Whether the sentence carries the delimiters the template expects.
pub fn is_templated(sentence: &str) -> bool {
    sentence.contains(AGE_OPEN) && sentence.contains(AGE_CLOSE) && sentence.contains(ORIGIN_TOKEN)
}
