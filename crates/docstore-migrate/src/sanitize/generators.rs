//! Synthetic value generators.

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

const FIRST_NAMES: &[&str] = &[
    "James", "Mary", "Robert", "Patricia", "John", "Jennifer", "Michael", "Linda", "David",
    "Elizabeth", "William", "Barbara", "Richard", "Susan", "Joseph", "Jessica", "Thomas", "Sarah",
    "Carlos", "Aisha", "Wei", "Priya", "Olga", "Kenji",
];

const LAST_NAMES: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Wilson", "Anderson", "Thomas", "Taylor", "Moore", "Jackson",
    "Nguyen", "Patel", "Kim", "Okafor", "Novak", "Sato",
];

const STREET_NAMES: &[&str] = &[
    "Maple", "Oak", "Cedar", "Pine", "Elm", "Washington", "Lake", "Hill", "Park", "Sunset",
    "Ridge", "River", "Highland", "Meadow", "Church",
];

const STREET_SUFFIXES: &[&str] = &["St", "Ave", "Blvd", "Rd", "Ln", "Dr", "Ct", "Way"];

const CITIES: &[&str] = &[
    "Springfield", "Riverside", "Fairview", "Franklin", "Greenville", "Bristol", "Clinton",
    "Georgetown", "Salem", "Madison", "Arlington", "Ashland", "Dover", "Milton", "Newport",
];

const STATES: &[&str] = &[
    "AL", "AZ", "CA", "CO", "FL", "GA", "IL", "MA", "MI", "MN", "NC", "NJ", "NY", "OH", "OR", "PA",
    "TX", "VA", "WA", "WI",
];

const JOB_TITLES: &[&str] = &[
    "Accountant", "Software Engineer", "Nurse", "Project Manager", "Sales Associate",
    "Data Analyst", "Teacher", "Mechanical Engineer", "Pharmacist", "Graphic Designer",
    "Operations Manager", "Paralegal",
];

const BS_VERBS: &[&str] = &[
    "streamline", "leverage", "synergize", "scale", "orchestrate", "reinvent", "optimize",
];
const BS_ADJECTIVES: &[&str] = &[
    "scalable", "end-to-end", "cross-platform", "real-time", "customer-centric", "distributed",
];
const BS_NOUNS: &[&str] = &[
    "platforms", "supply-chains", "workflows", "paradigms", "solutions", "infrastructures",
];

const COMPANY_WORDS: &[&str] = &[
    "Acme", "Globex", "Initech", "Umbrella", "Stark", "Wayne", "Hooli", "Vandelay", "Soylent",
    "Tyrell", "Cyberdyne", "Wonka",
];
const COMPANY_SUFFIXES: &[&str] = &["LLC", "Inc", "Group", "and Sons", "Ltd", "PLC"];

const FREE_EMAIL_DOMAINS: &[&str] = &["example.com", "example.net", "example.org"];

const UNIT_KINDS: &[&str] = &["Apt.", "Suite", "Unit"];

/// Semantic category of a synthetic replacement value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticKind {
    FirstName,
    LastName,
    FullName,
    Ssn,
    PhoneNumber,
    Email,
    CompanyEmail,
    FreeEmail,
    Address,
    StreetAddress,
    SecondaryAddress,
    City,
    State,
    PostalCode,
    JobTitle,
    Department,
    DateOfBirth,
    Uuid,
    Insurance,
    Company,
    AccountNumber,
    RoutingNumber,
    CountyFips,
    RatingArea,
    PayRate,
}

/// A generator could not produce a value.
#[derive(Debug, Error)]
#[error("cannot synthesize {kind:?}: {reason}")]
pub struct SynthesisError {
    pub kind: SyntheticKind,
    pub reason: String,
}

impl SyntheticKind {
    /// Produce a synthetic value of this kind.
    pub fn generate<R: Rng>(self, rng: &mut R) -> Result<Value, SynthesisError> {
        use SyntheticKind::*;

        let value = match self {
            FirstName => Value::String(pick(rng, FIRST_NAMES).to_string()),
            LastName => Value::String(pick(rng, LAST_NAMES).to_string()),
            FullName => Value::String(full_name(rng)),
            Ssn => Value::String(format!(
                "{:03}-{:02}-{:04}",
                rng.gen_range(100..900),
                rng.gen_range(1..100),
                rng.gen_range(1..10_000)
            )),
            PhoneNumber => Value::String(format!(
                "({:03}) {:03}-{:04}",
                rng.gen_range(201..990),
                rng.gen_range(200..1000),
                rng.gen_range(0..10_000)
            )),
            Email | FreeEmail => Value::String(format!(
                "{}.{}{}@{}",
                pick(rng, FIRST_NAMES).to_lowercase(),
                pick(rng, LAST_NAMES).to_lowercase(),
                rng.gen_range(1..100),
                pick(rng, FREE_EMAIL_DOMAINS)
            )),
            CompanyEmail => Value::String(format!(
                "{}.{}@{}.example.com",
                pick(rng, FIRST_NAMES).to_lowercase(),
                pick(rng, LAST_NAMES).to_lowercase(),
                pick(rng, COMPANY_WORDS).to_lowercase()
            )),
            Address => Value::String(format!(
                "{}\n{}, {} {}",
                street_address(rng),
                pick(rng, CITIES),
                pick(rng, STATES),
                postal_code(rng)
            )),
            StreetAddress => Value::String(street_address(rng)),
            SecondaryAddress => Value::String(format!(
                "{} {}",
                pick(rng, UNIT_KINDS),
                rng.gen_range(1..1000)
            )),
            City => Value::String(pick(rng, CITIES).to_string()),
            State => Value::String(pick(rng, STATES).to_string()),
            PostalCode => Value::String(postal_code(rng)),
            JobTitle => Value::String(pick(rng, JOB_TITLES).to_string()),
            Department => Value::String(format!(
                "{} {} {}",
                pick(rng, BS_VERBS),
                pick(rng, BS_ADJECTIVES),
                pick(rng, BS_NOUNS)
            )),
            DateOfBirth => {
                let year = rng.gen_range(1940..2006);
                let month = rng.gen_range(1..=12);
                let day = rng.gen_range(1..=28);
                let date = NaiveDate::from_ymd_opt(year, month, day)
                    .ok_or_else(|| self.error(format!("invalid date {year}-{month}-{day}")))?;
                Value::String(date.format("%Y-%m-%d").to_string())
            }
            Uuid => {
                let bytes: [u8; 16] = rng.gen();
                Value::String(uuid::Builder::from_random_bytes(bytes).into_uuid().to_string())
            }
            Insurance => Value::String(format!(
                "INS-{:04}-{:04}",
                rng.gen_range(0..10_000),
                rng.gen_range(0..10_000)
            )),
            Company => Value::String(format!(
                "{} {}",
                pick(rng, COMPANY_WORDS),
                pick(rng, COMPANY_SUFFIXES)
            )),
            AccountNumber => Value::String(
                (0..18)
                    .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
                    .collect(),
            ),
            RoutingNumber => Value::Number(Number::from(rng.gen_range(100_000_000u64..1_000_000_000))),
            CountyFips => Value::Number(Number::from(rng.gen_range(10_000u64..100_000))),
            RatingArea => Value::Number(Number::from(rng.gen_range(1u64..=5))),
            PayRate => {
                let raw: f64 = rng.gen_range(15.0..=150.0);
                let rounded = (raw * 100.0).round() / 100.0;
                Value::Number(
                    Number::from_f64(rounded)
                        .ok_or_else(|| self.error(format!("non-finite rate {rounded}")))?,
                )
            }
        };

        Ok(value)
    }

    fn error(self, reason: String) -> SynthesisError {
        SynthesisError { kind: self, reason }
    }
}

fn pick<'a, R: Rng>(rng: &mut R, items: &'a [&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn full_name<R: Rng>(rng: &mut R) -> String {
    format!("{} {}", pick(rng, FIRST_NAMES), pick(rng, LAST_NAMES))
}

fn street_address<R: Rng>(rng: &mut R) -> String {
    format!(
        "{} {} {}",
        rng.gen_range(1..10_000),
        pick(rng, STREET_NAMES),
        pick(rng, STREET_SUFFIXES)
    )
}

fn postal_code<R: Rng>(rng: &mut R) -> String {
    format!("{:05}", rng.gen_range(501..100_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_every_kind_generates() {
        use SyntheticKind::*;
        let mut rng = StdRng::seed_from_u64(7);
        for kind in [
            FirstName, LastName, FullName, Ssn, PhoneNumber, Email, CompanyEmail, FreeEmail,
            Address, StreetAddress, SecondaryAddress, City, State, PostalCode, JobTitle,
            Department, DateOfBirth, Uuid, Insurance, Company, AccountNumber, RoutingNumber,
            CountyFips, RatingArea, PayRate,
        ] {
            assert!(kind.generate(&mut rng).is_ok(), "{kind:?} failed");
        }
    }

    #[test]
    fn test_formats() {
        let mut rng = StdRng::seed_from_u64(42);
        let ssn = SyntheticKind::Ssn.generate(&mut rng).unwrap();
        let ssn = ssn.as_str().unwrap();
        assert_eq!(ssn.len(), 11);
        assert_eq!(&ssn[3..4], "-");

        let dob = SyntheticKind::DateOfBirth.generate(&mut rng).unwrap();
        assert!(NaiveDate::parse_from_str(dob.as_str().unwrap(), "%Y-%m-%d").is_ok());

        let id = SyntheticKind::Uuid.generate(&mut rng).unwrap();
        assert!(uuid::Uuid::parse_str(id.as_str().unwrap()).is_ok());

        let routing = SyntheticKind::RoutingNumber.generate(&mut rng).unwrap();
        assert_eq!(routing.as_u64().unwrap().to_string().len(), 9);
    }

    #[test]
    fn test_kind_deserializes_from_snake_case() {
        let kind: SyntheticKind = serde_yaml::from_str("date_of_birth").unwrap();
        assert_eq!(kind, SyntheticKind::DateOfBirth);
    }
}
